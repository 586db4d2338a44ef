use std::collections::BTreeSet;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionKind {
    Create,
    Read,
    Update,
    Delete,
}

impl ActionKind {
    pub fn from_method(method: &str) -> Self {
        if method.eq_ignore_ascii_case("POST") {
            Self::Create
        } else if method.eq_ignore_ascii_case("PUT") || method.eq_ignore_ascii_case("PATCH") {
            Self::Update
        } else if method.eq_ignore_ascii_case("DELETE") {
            Self::Delete
        } else {
            Self::Read
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResourceKind {
    User,
    System,
    Config,
    Broadcast,
    AuditLog,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditStatus {
    Success,
    Failure,
    Warning,
}

pub const ANONYMOUS_ROLE: &str = "anonymous";

/// Who issued a request. Inserted into request extensions by the auth layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: Option<String>,
    pub role: String,
    pub session_id: Option<String>,
}

impl Actor {
    pub fn anonymous() -> Self {
        Self {
            id: None,
            role: ANONYMOUS_ROLE.to_string(),
            session_id: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub actor_id: Option<String>,
    pub actor_role: String,
    pub session_id: Option<String>,
    pub action_kind: ActionKind,
    pub resource_kind: ResourceKind,
    pub resource_id: Option<String>,
    pub endpoint: String,
    pub status: AuditStatus,
    pub client_ip: Option<String>,
    pub user_agent: Option<String>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_values: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_values: Option<Value>,
    pub created_at_unix_ms: u64,
}

const AUDITED_METHODS: [&str; 3] = ["POST", "PUT", "DELETE"];

/// Decides which completed requests become audit records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditPolicy {
    /// Also record mutations that ended with status >= 400.
    #[serde(default)]
    pub record_failures: bool,
}

impl AuditPolicy {
    pub fn outcome(&self, method: &str, status: u16) -> Option<AuditStatus> {
        let audited = AUDITED_METHODS
            .iter()
            .any(|candidate| candidate.eq_ignore_ascii_case(method));
        if !audited {
            return None;
        }

        match status {
            0..=399 => Some(AuditStatus::Success),
            _ if !self.record_failures => None,
            400..=499 => Some(AuditStatus::Warning),
            _ => Some(AuditStatus::Failure),
        }
    }
}

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("failed to serialize audit record: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("audit store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("audit store error: {0}")]
    Backend(String),
}

/// Append-only sink for audit records.
#[async_trait]
pub trait AuditStore: Send + Sync {
    fn name(&self) -> &'static str;

    async fn insert(&self, record: &AuditRecord) -> Result<(), AuditError>;
}

pub fn current_unix_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default()
}
