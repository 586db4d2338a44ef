use axum::extract::State;
use axum::Json;
use eislager_core::RouteEntry;
use serde::Serialize;

use crate::proxy::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub routes: usize,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        service: "eislager-gateway",
        routes: state.routes.len(),
    })
}

pub async fn list_routes(State(state): State<AppState>) -> Json<Vec<RouteEntry>> {
    Json(state.routes.entries().to_vec())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use eislager_core::{RouteEntry, RouteTable};
    use serde_json::Value;
    use tower::ServiceExt;

    use crate::build_router;
    use crate::proxy::AppState;

    fn app() -> axum::Router {
        let routes = RouteTable::new(vec![
            RouteEntry::new("/api/v1/auth", "http://localhost:3002"),
            RouteEntry::new("/api/v1/admin", "http://localhost:3001"),
        ])
        .unwrap();
        build_router(
            AppState::new(routes, Duration::from_secs(1), 1024).unwrap(),
            None,
        )
    }

    async fn get_json(uri: &str) -> (StatusCode, Value) {
        let response = app()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn health_reports_route_count() {
        let (status, body) = get_json("/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["service"], "eislager-gateway");
        assert_eq!(body["routes"], 2);
    }

    #[tokio::test]
    async fn routes_are_listed_in_declaration_order() {
        let (status, body) = get_json("/routes").await;
        assert_eq!(status, StatusCode::OK);
        let prefixes: Vec<_> = body
            .as_array()
            .unwrap()
            .iter()
            .map(|entry| entry["prefix"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(prefixes, vec!["/api/v1/auth", "/api/v1/admin"]);
        assert_eq!(body[0]["strip_prefix"], true);
    }
}
