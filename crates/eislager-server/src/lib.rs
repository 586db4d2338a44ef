pub mod api;
pub mod audit;
pub mod error;
pub mod proxy;

use axum::middleware::from_fn_with_state;
use axum::routing::get;
use axum::Router;

pub use crate::audit::{audit_requests, AuditInterceptor};
pub use crate::error::ApiError;
pub use crate::proxy::AppState;

/// Gateway router: its own endpoints first, everything else proxied. When an
/// interceptor is given it wraps every route, the proxy fallback included.
pub fn build_router(state: AppState, interceptor: Option<AuditInterceptor>) -> Router {
    let router = Router::new()
        .route("/health", get(api::health))
        .route("/routes", get(api::list_routes))
        .fallback(proxy::forward)
        .with_state(state);

    match interceptor {
        Some(interceptor) => router.layer(from_fn_with_state(interceptor, audit_requests)),
        None => router,
    }
}
