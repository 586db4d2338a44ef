mod audit;
mod classify;
mod error;
mod route;

pub use audit::{
    current_unix_ms, ActionKind, Actor, AuditError, AuditPolicy, AuditRecord, AuditStatus,
    AuditStore, ResourceKind, ANONYMOUS_ROLE,
};
pub use classify::{builtin_rules, Classification, ResourceClassifier, ResourceRule};
pub use error::GatewayError;
pub use route::{RouteEntry, RouteError, RouteMatch, RouteTable};
