//! HTTP surface: slash commands, the Events API, and a health check.

use std::sync::Arc;

use axum::{
    Json, Router,
    body::{Body, Bytes},
    extract::{Form, Request, State},
    http::{HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::commands::CommandService;
use crate::slack::signature::{SIGNATURE_HEADER, TIMESTAMP_HEADER, verify_signature};

/// Route receiving slash commands.
pub const COMMANDS_ROUTE: &str = "/slack/commands";

/// Largest request body accepted from Slack.
const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Header Slack sets when redelivering an event.
const RETRY_HEADER: &str = "x-slack-retry-num";

/// State shared by the Slack handlers.
#[derive(Clone)]
pub struct AppState {
    pub commands: Arc<CommandService>,
    pub signing_secret: SecretString,
    pub command_prefix: String,
}

/// Build the router. Everything except `/health` requires a valid Slack
/// signature.
pub fn slack_routes(state: AppState, events_route: &str) -> Router {
    let signed = Router::new()
        .route(COMMANDS_ROUTE, post(slash_command))
        .route(events_route, post(event))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_signature,
        ))
        .with_state(state);

    Router::new().route("/health", get(health)).merge(signed)
}

// ── Signature ───────────────────────────────────────────────────────────

async fn require_signature(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let (parts, body) = request.into_parts();
    let bytes = match axum::body::to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(error = %e, "Failed to read request body");
            return StatusCode::BAD_REQUEST.into_response();
        }
    };

    let header = |name: &str| {
        parts
            .headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
    };
    if !verify_signature(
        state.signing_secret.expose_secret(),
        header(TIMESTAMP_HEADER),
        &bytes,
        header(SIGNATURE_HEADER),
    ) {
        warn!(path = %parts.uri.path(), "Rejected request with invalid Slack signature");
        return StatusCode::UNAUTHORIZED.into_response();
    }

    next.run(Request::from_parts(parts, Body::from(bytes))).await
}

// ── Health ──────────────────────────────────────────────────────────────

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({"status": "ok", "service": "leave-bot"}))
}

// ── Slash commands ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct SlashCommand {
    command: String,
    #[serde(default)]
    text: String,
    user_id: String,
    #[serde(default)]
    channel_id: String,
}

async fn slash_command(
    State(state): State<AppState>,
    Form(cmd): Form<SlashCommand>,
) -> impl IntoResponse {
    debug!(command = %cmd.command, user_id = %cmd.user_id, channel = %cmd.channel_id, "Slash command");
    let outcome = state
        .commands
        .dispatch(&cmd.command, &state.command_prefix, &cmd.user_id, &cmd.text)
        .await;
    info!(command = %cmd.command, user_id = %cmd.user_id, success = outcome.is_success(), "Command handled");

    Json(serde_json::json!({
        "response_type": "ephemeral",
        "text": outcome.text(),
    }))
}

// ── Events API ──────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum EventPayload {
    UrlVerification { challenge: String },
    EventCallback { event: MessageEvent },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct MessageEvent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    subtype: Option<String>,
    #[serde(default)]
    bot_id: Option<String>,
    #[serde(default)]
    user: Option<String>,
    #[serde(default)]
    channel: Option<String>,
    #[serde(default)]
    text: String,
}

async fn event(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let payload: EventPayload = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(e) => {
            warn!(error = %e, "Malformed event payload");
            return StatusCode::BAD_REQUEST.into_response();
        }
    };

    match payload {
        EventPayload::UrlVerification { challenge } => {
            Json(serde_json::json!({ "challenge": challenge })).into_response()
        }
        EventPayload::EventCallback { event } => {
            if headers.contains_key(RETRY_HEADER) {
                debug!("Ignoring redelivered event");
                return StatusCode::OK.into_response();
            }
            if let Some((user, channel)) = user_message(&event) {
                let commands = Arc::clone(&state.commands);
                let text = event.text;
                tokio::spawn(async move {
                    commands.leave_message(&user, &channel, &text).await;
                });
            }
            StatusCode::OK.into_response()
        }
        EventPayload::Other => StatusCode::OK.into_response(),
    }
}

/// Sender and channel of a plain message written by a person.
fn user_message(event: &MessageEvent) -> Option<(String, String)> {
    if event.kind != "message" || event.subtype.is_some() || event.bot_id.is_some() {
        return None;
    }
    Some((event.user.clone()?, event.channel.clone()?))
}
