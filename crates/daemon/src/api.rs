// HTTP surface: webhook receivers, queue introspection, liveness.

use std::time::Instant;

use axum::{
    body::{Body, Bytes},
    extract::{DefaultBodyLimit, State},
    http::{header::HeaderValue, HeaderMap, Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use gitreload_common::protocol::{MessageBody, QueueSnapshot};
use gitreload_common::ActionKind;
use tracing::{error, info};
use uuid::Uuid;

use crate::git::{CommandExecutor, ProcessCommandExecutor};
use crate::hook::{self, HookError, HookValidator};
use crate::queue::ActionQueue;

pub const MAX_REQUEST_BODY_BYTES: usize = 1024 * 1024;
const REQUEST_ID_HEADER: &str = "x-request-id";

/// Everything a request handler needs, built once at startup.
#[derive(Clone)]
pub struct AppContext<E = ProcessCommandExecutor> {
    queue: ActionQueue,
    validator: HookValidator<E>,
}

impl<E> AppContext<E> {
    pub fn new(queue: ActionQueue, validator: HookValidator<E>) -> Self {
        Self { queue, validator }
    }
}

pub fn router<E>(ctx: AppContext<E>) -> Router
where
    E: CommandExecutor + Clone + 'static,
{
    apply_middleware(
        Router::new()
            .route("/", post(receive_import::<E>))
            .route("/gitreload", post(receive_import::<E>))
            .route("/update", post(receive_update::<E>))
            .route("/queue", get(queue_status::<E>))
            .route("/healthz", get(healthz))
            .with_state(ctx),
    )
}

fn apply_middleware(router: Router) -> Router {
    router
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        .layer(middleware::from_fn(request_context_middleware))
        .layer(middleware::from_fn(panic_handler))
}

// ── Handlers ────────────────────────────────────────────────────────

async fn receive_import<E>(
    State(ctx): State<AppContext<E>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<MessageBody>, HookError>
where
    E: CommandExecutor + Clone + 'static,
{
    let len = enqueue(&ctx, &headers, body, ActionKind::Import).await?;
    Ok(Json(MessageBody::new(format!(
        "Added course import task to queue. Queue size was {len}"
    ))))
}

async fn receive_update<E>(
    State(ctx): State<AppContext<E>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<MessageBody>, HookError>
where
    E: CommandExecutor + Clone + 'static,
{
    let len = enqueue(&ctx, &headers, body, ActionKind::Sync).await?;
    Ok(Json(MessageBody::new(format!("Added git update task to queue. Queue size was {len}"))))
}

/// Screen and validate the hook, then queue an action of `kind`. Returns the
/// queue length after submission.
async fn enqueue<E>(
    ctx: &AppContext<E>,
    headers: &HeaderMap,
    body: Bytes,
    kind: ActionKind,
) -> Result<usize, HookError>
where
    E: CommandExecutor + Clone + 'static,
{
    let payload = hook::screen(headers, &body)?;

    let validator = ctx.validator.clone();
    let action = tokio::task::spawn_blocking(move || validator.action_for(&payload, kind))
        .await
        .map_err(|e| HookError::Internal(format!("validation did not complete: {e}")))??;

    info!(%action, "scheduling action");
    ctx.queue.submit(action).await.map_err(|e| {
        error!(error = %e, "unable to queue action");
        HookError::Internal(e.to_string())
    })
}

async fn queue_status<E>(State(ctx): State<AppContext<E>>) -> Response {
    match ctx.queue.snapshot().await {
        Ok(entries) => Json(QueueSnapshot::from_entries(entries)).into_response(),
        Err(e) => HookError::Internal(e.to_string()).into_response(),
    }
}

async fn healthz() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}

// ── Middleware ──────────────────────────────────────────────────────

async fn panic_handler(request: Request<Body>, next: Next) -> Response {
    match tokio::spawn(async move { next.run(request).await }).await {
        Ok(response) => response,
        Err(join_error) => {
            error!(?join_error, "request handling panicked");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn request_context_middleware(request: Request<Body>, next: Next) -> Response {
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let method = request.method().clone();
    let path = request.uri().path().to_owned();
    let started_at = Instant::now();

    let mut response = next.run(request).await;

    if let Ok(request_id_header) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, request_id_header);
    }

    info!(
        request_id = %request_id,
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        latency_ms = started_at.elapsed().as_millis() as u64,
        "request completed"
    );

    response
}
