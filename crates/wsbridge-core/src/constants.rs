//! Package-level constants.

/// Current version of wsbridge (sourced from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Package name.
pub const NAME: &str = "wsbridge";

/// Prefix of every streaming channel path published by a datasource instance.
pub const CHANNEL_SCOPE: &str = "ds";
