use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use eislager_core::{AuditError, AuditRecord, AuditStore};

/// Keeps records in process memory. Clones share the same buffer.
#[derive(Clone, Default)]
pub struct MemoryAuditStore {
    inner: Arc<Mutex<Vec<AuditRecord>>>,
}

impl MemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn list(&self) -> Vec<AuditRecord> {
        self.inner
            .lock()
            .map_or_else(|_| Vec::new(), |guard| guard.clone())
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map_or(0, |guard| guard.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl AuditStore for MemoryAuditStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn insert(&self, record: &AuditRecord) -> Result<(), AuditError> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| AuditError::Backend("memory store lock poisoned".to_string()))?;
        guard.push(record.clone());
        Ok(())
    }
}
