//! Connector and sender doubles shared by the unit tests.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use url::Url;
use wsbridge_core::errors::RelayError;
use wsbridge_core::records::StreamRecord;
use wsbridge_relay::{Connector, StreamSender, UpstreamConnection};

/// Every dial is refused.
pub(crate) struct RefusingConnector;

#[async_trait]
impl Connector for RefusingConnector {
    async fn connect(
        &self,
        _url: &Url,
        _headers: &BTreeMap<String, String>,
    ) -> Result<Box<dyn UpstreamConnection>, RelayError> {
        Err(RelayError::connect("connection refused"))
    }
}

/// Dials succeed; connections never deliver anything.
#[derive(Default)]
pub(crate) struct HoldingConnector {
    dialed: Mutex<Vec<String>>,
    closed: Arc<Mutex<usize>>,
}

impl HoldingConnector {
    pub(crate) fn dialed(&self) -> Vec<String> {
        self.dialed.lock().clone()
    }

    pub(crate) fn closed(&self) -> usize {
        *self.closed.lock()
    }
}

#[async_trait]
impl Connector for HoldingConnector {
    async fn connect(
        &self,
        url: &Url,
        _headers: &BTreeMap<String, String>,
    ) -> Result<Box<dyn UpstreamConnection>, RelayError> {
        self.dialed.lock().push(url.to_string());
        Ok(Box::new(HoldingConnection {
            closed: Arc::clone(&self.closed),
        }))
    }
}

struct HoldingConnection {
    closed: Arc<Mutex<usize>>,
}

#[async_trait]
impl UpstreamConnection for HoldingConnection {
    async fn recv(&mut self) -> Result<String, RelayError> {
        std::future::pending().await
    }

    async fn close(&mut self) {
        *self.closed.lock() += 1;
    }
}

/// Keeps every published record.
#[derive(Default)]
pub(crate) struct RecordingSender {
    records: Mutex<Vec<StreamRecord>>,
}

impl RecordingSender {
    pub(crate) fn records(&self) -> Vec<StreamRecord> {
        self.records.lock().clone()
    }
}

#[async_trait]
impl StreamSender for RecordingSender {
    async fn send(&self, record: StreamRecord) -> Result<(), RelayError> {
        self.records.lock().push(record);
        Ok(())
    }
}
