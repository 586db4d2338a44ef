use async_trait::async_trait;
use eislager_core::{AuditError, AuditRecord, AuditStore};
use tracing::info;

/// Emits each record as a structured event under the `eislager::audit` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditStore;

#[async_trait]
impl AuditStore for TracingAuditStore {
    fn name(&self) -> &'static str {
        "tracing"
    }

    async fn insert(&self, record: &AuditRecord) -> Result<(), AuditError> {
        let tags = record.tags.iter().cloned().collect::<Vec<_>>().join(",");
        info!(
            target: "eislager::audit",
            actor_id = record.actor_id.as_deref().unwrap_or("-"),
            actor_role = %record.actor_role,
            session_id = record.session_id.as_deref().unwrap_or("-"),
            action = ?record.action_kind,
            resource = ?record.resource_kind,
            resource_id = record.resource_id.as_deref().unwrap_or("-"),
            endpoint = %record.endpoint,
            status = ?record.status,
            client_ip = record.client_ip.as_deref().unwrap_or("-"),
            tags = %tags,
            created_at_unix_ms = record.created_at_unix_ms,
            "audit record"
        );
        Ok(())
    }
}
