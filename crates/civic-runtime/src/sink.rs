//! Concrete `TransparencySink`: the adapter that lets `civic-core`'s
//! `MemoryLoggerNode` write to `civic-transparency` without civic-core
//! depending on it directly.

use std::sync::Arc;

use async_trait::async_trait;
use civic_core::nodes::TransparencySink;
use civic_transparency::TransparencyLog;
use civic_types::TransparencyEntry;

pub struct TransparencySinkAdapter {
    log: Arc<TransparencyLog>,
}

impl TransparencySinkAdapter {
    pub fn new(log: Arc<TransparencyLog>) -> Self {
        TransparencySinkAdapter { log }
    }
}

#[async_trait]
impl TransparencySink for TransparencySinkAdapter {
    async fn record(&self, entry: TransparencyEntry) {
        if let Err(error) = self.log.record(entry).await {
            tracing::warn!(error = %error, "failed to record pipeline decision to the transparency log");
        }
    }
}
