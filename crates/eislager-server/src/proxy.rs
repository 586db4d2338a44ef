use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::extract::{ConnectInfo, Request, State};
use axum::http::header::{self, HeaderMap, HeaderName, HeaderValue};
use axum::response::Response;
use eislager_config::GatewayConfig;
use eislager_core::{GatewayError, RouteTable};
use futures::StreamExt;
use tracing::{debug, error};

use crate::error::ApiError;

const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

const X_FORWARDED_FOR: &str = "x-forwarded-for";

#[derive(Clone)]
pub struct AppState {
    pub routes: Arc<RouteTable>,
    pub client: reqwest::Client,
    pub max_body_bytes: usize,
}

impl AppState {
    pub fn new(
        routes: RouteTable,
        upstream_timeout: Duration,
        max_body_bytes: usize,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(upstream_timeout)
            .redirect(reqwest::redirect::Policy::none())
            .tcp_keepalive(Duration::from_secs(30))
            .pool_idle_timeout(Duration::from_secs(90))
            .build()?;

        Ok(Self {
            routes: Arc::new(routes),
            client,
            max_body_bytes,
        })
    }

    pub fn from_config(config: &GatewayConfig) -> anyhow::Result<Self> {
        let routes = config.route_table()?;
        Ok(Self::new(
            routes,
            Duration::from_millis(config.server.upstream_timeout_ms),
            config.server.max_body_bytes,
        )?)
    }
}

/// Fallback handler: forwards anything that is not a gateway endpoint to the
/// upstream owning the first matching prefix.
pub async fn forward(
    State(state): State<AppState>,
    request: Request,
) -> Result<Response, ApiError> {
    let matched = state
        .routes
        .resolve(request.uri().path(), request.uri().query())?;
    let upstream_url = matched.upstream_url;
    let prefix = matched.entry.prefix.clone();

    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());
    let (parts, body) = request.into_parts();
    let body = read_body(&parts.headers, body, state.max_body_bytes).await?;

    let mut headers = strip_hop_by_hop(&parts.headers);
    headers.remove(header::HOST);
    if let Some(ip) = peer {
        append_forwarded_for(&mut headers, &ip.to_string());
    }

    debug!(
        method = %parts.method,
        path = %parts.uri.path(),
        prefix = %prefix,
        upstream = %upstream_url,
        "forwarding request"
    );

    let upstream = state
        .client
        .request(parts.method, upstream_url.as_str())
        .headers(headers)
        .body(body)
        .send()
        .await
        .map_err(|err| {
            error!(
                upstream = %upstream_url,
                prefix = %prefix,
                error = %err,
                "upstream request failed"
            );
            classify_send_error(&upstream_url, &err)
        })?;

    let status = upstream.status();
    let headers = strip_hop_by_hop(upstream.headers());
    let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    Ok(response)
}

/// Buffers the request body, failing fast on a declared `Content-Length`
/// above `limit`. Only an oversized body is a 413; a body stream that breaks
/// off (client disconnect, bad chunking) is reported as unreadable.
async fn read_body(headers: &HeaderMap, body: Body, limit: usize) -> Result<Bytes, GatewayError> {
    let declared = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok());
    if declared.is_some_and(|len| len > limit as u64) {
        return Err(GatewayError::PayloadTooLarge { limit });
    }

    let mut data = body.into_data_stream();
    let mut buffer = Vec::new();
    while let Some(chunk) = data.next().await {
        let chunk = chunk.map_err(|err| GatewayError::RequestBodyUnreadable {
            reason: err.to_string(),
        })?;
        if buffer.len() + chunk.len() > limit {
            return Err(GatewayError::PayloadTooLarge { limit });
        }
        buffer.extend_from_slice(&chunk);
    }
    Ok(Bytes::from(buffer))
}

fn classify_send_error(upstream_url: &str, err: &reqwest::Error) -> GatewayError {
    if err.is_timeout() {
        GatewayError::UpstreamTimeout {
            upstream: upstream_url.to_string(),
        }
    } else if err.is_builder() {
        GatewayError::InvalidUpstreamRequest {
            url: upstream_url.to_string(),
            reason: err.to_string(),
        }
    } else {
        GatewayError::UpstreamUnavailable {
            upstream: upstream_url.to_string(),
            reason: err.to_string(),
        }
    }
}

fn strip_hop_by_hop(source: &HeaderMap) -> HeaderMap {
    let mut headers = source.clone();
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
    headers
}

fn append_forwarded_for(headers: &mut HeaderMap, ip: &str) {
    let chained = match headers
        .get(X_FORWARDED_FOR)
        .and_then(|value| value.to_str().ok())
    {
        Some(existing) if !existing.trim().is_empty() => format!("{existing}, {ip}"),
        _ => ip.to_string(),
    };
    if let Ok(value) = HeaderValue::from_str(&chained) {
        headers.insert(HeaderName::from_static(X_FORWARDED_FOR), value);
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::time::Duration;

    use axum::body::{Body, Bytes};
    use axum::http::{header, HeaderMap, Method, Request, StatusCode, Uri};
    use axum::routing::get;
    use axum::{Json, Router};
    use eislager_core::{RouteEntry, RouteTable};
    use futures::stream;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::{append_forwarded_for, AppState};
    use crate::build_router;

    async fn echo(method: Method, uri: Uri, headers: HeaderMap, body: Bytes) -> Json<Value> {
        Json(json!({
            "method": method.as_str(),
            "path": uri.path(),
            "query": uri.query(),
            "host": headers.get(header::HOST).and_then(|v| v.to_str().ok()),
            "x_flavor": headers.get("x-flavor").and_then(|v| v.to_str().ok()),
            "body": String::from_utf8_lossy(&body),
        }))
    }

    async fn spawn_upstream(router: Router) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        addr
    }

    fn gateway(entries: Vec<RouteEntry>, timeout: Duration, max_body_bytes: usize) -> Router {
        let state = AppState::new(RouteTable::new(entries).unwrap(), timeout, max_body_bytes)
            .expect("client should build");
        build_router(state, None)
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn forwards_method_path_query_headers_and_body() {
        let addr = spawn_upstream(Router::new().fallback(echo)).await;
        let app = gateway(
            vec![RouteEntry::new("/api/v1/auth", format!("http://{addr}"))],
            Duration::from_secs(5),
            1024,
        );

        let request = Request::builder()
            .method("POST")
            .uri("/api/v1/auth/login?remember=true")
            .header(header::HOST, "gateway.eislager.local")
            .header("x-flavor", "pistachio")
            .body(Body::from("credentials"))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["method"], "POST");
        assert_eq!(body["path"], "/login");
        assert_eq!(body["query"], "remember=true");
        assert_eq!(body["host"], addr.to_string());
        assert_eq!(body["x_flavor"], "pistachio");
        assert_eq!(body["body"], "credentials");
    }

    #[tokio::test]
    async fn relays_upstream_status_and_headers_unchanged() {
        let upstream = Router::new().route(
            "/stock",
            get(|| async {
                (
                    StatusCode::IM_A_TEAPOT,
                    [("x-batch", "B-17")],
                    "out of waffle cones",
                )
            }),
        );
        let addr = spawn_upstream(upstream).await;
        let app = gateway(
            vec![RouteEntry::new("/api/v1/inventory", format!("http://{addr}"))],
            Duration::from_secs(5),
            1024,
        );

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/inventory/stock")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::IM_A_TEAPOT);
        assert_eq!(response.headers()["x-batch"], "B-17");
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&bytes[..], b"out of waffle cones");
    }

    #[tokio::test]
    async fn unmatched_path_returns_not_found() {
        let app = gateway(
            vec![RouteEntry::new("/api/v1/auth", "http://127.0.0.1:9")],
            Duration::from_secs(1),
            1024,
        );

        let response = app
            .oneshot(Request::builder().uri("/nowhere").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = json_body(response).await;
        assert!(body["error"].as_str().unwrap().contains("/nowhere"));
    }

    #[tokio::test]
    async fn unreachable_upstream_is_bad_gateway() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let app = gateway(
            vec![RouteEntry::new("/api/v1/sales", format!("http://{addr}"))],
            Duration::from_secs(5),
            1024,
        );
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/sales/orders")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn slow_upstream_is_gateway_timeout() {
        let upstream = Router::new().route(
            "/report",
            get(|| async {
                tokio::time::sleep(Duration::from_millis(500)).await;
                "late"
            }),
        );
        let addr = spawn_upstream(upstream).await;
        let app = gateway(
            vec![RouteEntry::new("/api/v1/admin", format!("http://{addr}"))],
            Duration::from_millis(50),
            1024,
        );

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/admin/report")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    }

    #[tokio::test]
    async fn oversized_body_is_rejected() {
        let app = gateway(
            vec![RouteEntry::new("/api", "http://127.0.0.1:9")],
            Duration::from_secs(1),
            4,
        );

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/upload")
                    .body(Body::from("far too large"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn declared_oversized_body_is_rejected_before_reading() {
        let app = gateway(
            vec![RouteEntry::new("/api", "http://127.0.0.1:9")],
            Duration::from_secs(1),
            4,
        );

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/upload")
                    .header(header::CONTENT_LENGTH, "4096")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn broken_request_body_is_bad_request_not_payload_too_large() {
        let app = gateway(
            vec![RouteEntry::new("/api", "http://127.0.0.1:9")],
            Duration::from_secs(1),
            1024,
        );
        let chunks: Vec<Result<Bytes, std::io::Error>> = vec![
            Ok(Bytes::from_static(b"partial")),
            Err(std::io::Error::other("client went away")),
        ];

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/upload")
                    .body(Body::from_stream(stream::iter(chunks)))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert!(body["error"]
            .as_str()
            .unwrap()
            .contains("failed to read request body"));
    }

    #[test]
    fn forwarded_for_chains_existing_value() {
        let mut headers = axum::http::HeaderMap::new();
        append_forwarded_for(&mut headers, "10.0.0.1");
        assert_eq!(headers["x-forwarded-for"], "10.0.0.1");

        append_forwarded_for(&mut headers, "10.0.0.2");
        assert_eq!(headers["x-forwarded-for"], "10.0.0.1, 10.0.0.2");
    }
}
