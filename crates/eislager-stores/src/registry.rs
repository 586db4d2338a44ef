use std::sync::Arc;

use eislager_config::AuditStoreConfig;
use eislager_core::{AuditError, AuditStore};

/// Builds the store selected by configuration.
pub fn build_store(config: &AuditStoreConfig) -> Result<Arc<dyn AuditStore>, AuditError> {
    match config {
        #[cfg(feature = "memory")]
        AuditStoreConfig::Memory => Ok(Arc::new(crate::MemoryAuditStore::new())),
        #[cfg(feature = "file")]
        AuditStoreConfig::File { path } => Ok(Arc::new(crate::FileAuditStore::new(path.clone()))),
        #[cfg(feature = "log")]
        AuditStoreConfig::Tracing => Ok(Arc::new(crate::TracingAuditStore)),
        #[allow(unreachable_patterns)]
        other => Err(AuditError::Backend(format!(
            "audit store {other:?} is not compiled into this build"
        ))),
    }
}
