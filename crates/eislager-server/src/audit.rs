use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::{Body, Bytes, HttpBody};
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{header, HeaderMap, Method};
use axum::middleware::Next;
use axum::response::Response;
use eislager_config::AuditConfig;
use eislager_core::{
    current_unix_ms, ActionKind, Actor, AuditPolicy, AuditRecord, AuditStatus, AuditStore,
    ResourceClassifier, ResourceKind,
};
use futures::stream::{self, StreamExt};
use serde_json::Value;
use tracing::{debug, warn};

pub const ACTOR_ID_HEADER: &str = "x-actor-id";
pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";
pub const SESSION_ID_HEADER: &str = "x-session-id";

/// Records successful mutations into an injected [`AuditStore`].
///
/// The wrapped handler always runs to completion first; the record is built
/// and written on a spawned task so a slow or failing store never reaches
/// the caller.
#[derive(Clone)]
pub struct AuditInterceptor {
    store: Arc<dyn AuditStore>,
    classifier: Arc<ResourceClassifier>,
    policy: AuditPolicy,
    tags: Arc<BTreeSet<String>>,
    capture_limit_bytes: usize,
    pinned_kind: Option<ResourceKind>,
}

/// What the interceptor knows about a request before handing it on.
#[derive(Debug, Clone)]
struct RequestFacts {
    method: Method,
    path: String,
    actor: Actor,
    client_ip: Option<String>,
    user_agent: Option<String>,
}

impl AuditInterceptor {
    pub fn new(store: Arc<dyn AuditStore>, classifier: ResourceClassifier) -> Self {
        Self {
            store,
            classifier: Arc::new(classifier),
            policy: AuditPolicy::default(),
            tags: Arc::new(BTreeSet::new()),
            capture_limit_bytes: 64 * 1024,
            pinned_kind: None,
        }
    }

    pub fn from_config(store: Arc<dyn AuditStore>, config: &AuditConfig) -> Self {
        Self::new(store, config.classifier())
            .with_policy(config.policy)
            .with_tags(config.tags.iter().cloned())
            .with_capture_limit(config.capture_limit_bytes)
    }

    pub fn with_policy(mut self, policy: AuditPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_tags<I>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        self.tags = Arc::new(tags.into_iter().collect());
        self
    }

    pub fn with_capture_limit(mut self, bytes: usize) -> Self {
        self.capture_limit_bytes = bytes;
        self
    }

    /// Copy of this interceptor that skips path classification and files every
    /// record under `kind`. Meant for `route_layer` on a single route.
    pub fn for_resource(&self, kind: ResourceKind) -> Self {
        let mut pinned = self.clone();
        pinned.pinned_kind = Some(kind);
        pinned
    }

    pub fn store_name(&self) -> &'static str {
        self.store.name()
    }

    pub async fn intercept(&self, request: Request, next: Next) -> Response {
        let facts = RequestFacts::capture(&request);
        let response = next.run(request).await;

        let status = response.status().as_u16();
        let Some(outcome) = self.policy.outcome(facts.method.as_str(), status) else {
            return response;
        };

        let (response, payload) = self.capture_payload(response).await;
        let interceptor = self.clone();
        tokio::spawn(async move {
            let record = interceptor.build_record(facts, outcome, payload);
            match interceptor.store.insert(&record).await {
                Ok(()) => debug!(
                    store = interceptor.store.name(),
                    endpoint = %record.endpoint,
                    "audit record stored"
                ),
                Err(err) => warn!(
                    store = interceptor.store.name(),
                    endpoint = %record.endpoint,
                    error = %err,
                    "audit write failed"
                ),
            }
        });

        response
    }

    /// Buffers small JSON bodies so they can be copied into `new_values`.
    /// The length comes from the body's size hint or, for streamed upstream
    /// bodies, from `Content-Length`. Bodies of unknown or oversized length
    /// pass through untouched. When buffering hits a stream error or more
    /// bytes than declared, the bytes read so far are replayed ahead of the
    /// rest of the stream so the caller sees the original body.
    async fn capture_payload(&self, response: Response) -> (Response, Option<Bytes>) {
        let is_json = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.starts_with("application/json"));
        let declared_len = response
            .body()
            .size_hint()
            .exact()
            .or_else(|| content_length(response.headers()));
        let small = declared_len.is_some_and(|len| len <= self.capture_limit_bytes as u64);
        if !is_json || !small {
            return (response, None);
        }

        let (parts, body) = response.into_parts();
        let mut data = body.into_data_stream();
        let mut chunks: Vec<Bytes> = Vec::new();
        let mut buffered = 0usize;
        while let Some(next) = data.next().await {
            match next {
                Ok(chunk) => {
                    buffered += chunk.len();
                    chunks.push(chunk);
                    if buffered > self.capture_limit_bytes {
                        let replay = stream::iter(chunks.into_iter().map(Ok)).chain(data);
                        return (Response::from_parts(parts, Body::from_stream(replay)), None);
                    }
                }
                Err(err) => {
                    warn!(error = %err, "failed to buffer response for audit capture");
                    let replay = stream::iter(chunks.into_iter().map(Ok))
                        .chain(stream::once(async move { Err(err) }));
                    return (Response::from_parts(parts, Body::from_stream(replay)), None);
                }
            }
        }

        let bytes = Bytes::from(chunks.concat());
        (
            Response::from_parts(parts, Body::from(bytes.clone())),
            Some(bytes),
        )
    }

    fn build_record(
        &self,
        facts: RequestFacts,
        status: AuditStatus,
        payload: Option<Bytes>,
    ) -> AuditRecord {
        let classification = match self.pinned_kind {
            Some(kind) => self.classifier.classify_as(kind, &facts.path),
            None => self.classifier.classify(&facts.path),
        };
        let new_values =
            payload.and_then(|bytes| serde_json::from_slice::<Value>(&bytes).ok());

        AuditRecord {
            actor_id: facts.actor.id,
            actor_role: facts.actor.role,
            session_id: facts.actor.session_id,
            action_kind: ActionKind::from_method(facts.method.as_str()),
            resource_kind: classification.kind,
            resource_id: classification.resource_id,
            endpoint: format!("{} {}", facts.method, facts.path),
            status,
            client_ip: facts.client_ip,
            user_agent: facts.user_agent,
            tags: self.tags.as_ref().clone(),
            old_values: None,
            new_values,
            created_at_unix_ms: current_unix_ms(),
        }
    }
}

impl RequestFacts {
    fn capture(request: &Request) -> Self {
        let headers = request.headers();
        let actor = request
            .extensions()
            .get::<Actor>()
            .cloned()
            .unwrap_or_else(|| actor_from_headers(headers));
        let peer = request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string());

        Self {
            method: request.method().clone(),
            path: request.uri().path().to_string(),
            actor,
            client_ip: forwarded_client_ip(headers).or(peer),
            user_agent: header_string(headers, header::USER_AGENT.as_str()),
        }
    }
}

/// axum middleware entry point, for use with `middleware::from_fn_with_state`.
pub async fn audit_requests(
    State(interceptor): State<AuditInterceptor>,
    request: Request,
    next: Next,
) -> Response {
    interceptor.intercept(request, next).await
}

fn actor_from_headers(headers: &HeaderMap) -> Actor {
    let mut actor = Actor::anonymous();
    actor.id = header_string(headers, ACTOR_ID_HEADER);
    if let Some(role) = header_string(headers, ACTOR_ROLE_HEADER) {
        actor.role = role;
    }
    actor.session_id = header_string(headers, SESSION_ID_HEADER);
    actor
}

fn forwarded_client_ip(headers: &HeaderMap) -> Option<String> {
    header_string(headers, "x-forwarded-for")?
        .split(',')
        .map(str::trim)
        .find(|candidate| !candidate.is_empty())
        .map(ToString::to_string)
}

fn content_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse().ok())
}

fn header_string(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToString::to_string)
}
