//! Channel module - inbound WhatsApp webhook
//!
//! One axum route receives Twilio-style form posts (`Body`, `From`).
//! Command-prefixed bodies (`/help`, `/reset`, `/status`) are handled as
//! direct session operations; everything else goes through the agent loop
//! under a per-sender lock and a wall-clock budget. The session is saved
//! only after the loop fully terminates, so a fatal error leaves persisted
//! history at its pre-request state.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Form, Router};
use serde::Deserialize;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::agent::AgentLoop;
use crate::delivery::Delivery;
use crate::error::RelayError;
use crate::media::ImageHost;
use crate::session::{Message, SessionStore};

/// Generic user-facing notice for any fatal error. Internal diagnostics
/// stay in the logs, never in the conversation.
const FAILURE_NOTICE: &str =
    "Sorry, something went wrong while processing your message. Please try again.";

const EMPTY_RESULT_NOTICE: &str = "Task completed, but there was nothing to report.";

const HELP_TEXT: &str = "Available commands:\n\
    /help - show this message\n\
    /reset - clear your conversation history\n\
    /status - show how many messages are stored\n\n\
    Anything else is sent to the assistant.";

/// Shared state for the webhook handlers.
pub struct AppState {
    pub agent: Arc<AgentLoop>,
    pub sessions: SessionStore,
    pub delivery: Arc<dyn Delivery>,
    pub image_host: Option<Arc<dyn ImageHost>>,
    pub request_timeout: Duration,
}

/// Build the webhook router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/whatsapp", post(whatsapp_webhook))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> &'static str {
    "OK"
}

/// Inbound Twilio webhook form.
#[derive(Debug, Deserialize)]
struct InboundMessage {
    #[serde(rename = "Body", default)]
    body: String,
    #[serde(rename = "From", default)]
    from: String,
}

async fn whatsapp_webhook(
    State(state): State<Arc<AppState>>,
    Form(inbound): Form<InboundMessage>,
) -> impl IntoResponse {
    let from = inbound.from.trim().to_string();
    let text = inbound.body.trim().to_string();

    if from.is_empty() {
        warn!("webhook rejected: missing sender");
        return (StatusCode::BAD_REQUEST, "missing sender");
    }
    if text.is_empty() {
        warn!(from = %from, "webhook rejected: empty body");
        return (StatusCode::BAD_REQUEST, "empty body");
    }

    info!(from = %from, "received message");

    let reply_to = from.clone();

    // Per-sender lock: agent runs and session commands alike serialize on
    // the whole load/run/save window. A /reset arriving during an in-flight
    // run must wait for it, or the run's save would re-persist the history
    // the reset just cleared.
    let lock = state.sessions.key_lock(&from);
    let _guard = lock.lock().await;

    if let Some(command) = text.strip_prefix('/') {
        let reply = handle_command(&state, &from, command).await;
        send(&state, &reply_to, &reply, None).await;
        return (StatusCode::OK, "OK");
    }

    let session = match state.sessions.load(&from).await {
        Ok(session) => session,
        Err(e) => {
            error!(from = %from, error = %e, "session load failed");
            send(&state, &reply_to, FAILURE_NOTICE, None).await;
            return (StatusCode::OK, "OK");
        }
    };
    let prior_len = session.len();

    let run = tokio::time::timeout(
        state.request_timeout,
        state.agent.run(&text, session.messages.clone()),
    )
    .await;

    let outcome = match run {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(e @ RelayError::RoundBudget { .. })) => {
            error!(from = %from, error = %e, "runaway agent loop");
            send(&state, &reply_to, FAILURE_NOTICE, None).await;
            return (StatusCode::OK, "OK");
        }
        Ok(Err(e)) => {
            error!(from = %from, error = %e, "agent run failed");
            send(&state, &reply_to, FAILURE_NOTICE, None).await;
            return (StatusCode::OK, "OK");
        }
        Err(_) => {
            error!(from = %from, timeout = ?state.request_timeout, "agent run timed out");
            send(&state, &reply_to, FAILURE_NOTICE, None).await;
            return (StatusCode::OK, "OK");
        }
    };

    // The loop appends only assistant/tool envelopes; splice the user turn
    // in where this run's appends begin so the persisted transcript replays
    // in true conversation order.
    let mut session = session;
    session.messages = outcome.history;
    session.messages.insert(prior_len, Message::user(&text));
    session.updated_at = chrono::Utc::now();
    if let Err(e) = state.sessions.save(&session).await {
        error!(from = %from, error = %e, "session save failed");
    }

    let media_url = match (&outcome.media, &state.image_host) {
        (Some(image), Some(host)) => match host.upload(image).await {
            Ok(url) => Some(url),
            Err(e) => {
                warn!(error = %e, "media upload failed, sending text only");
                None
            }
        },
        _ => None,
    };

    let reply = outcome.reply.unwrap_or_else(|| EMPTY_RESULT_NOTICE.to_string());
    send(&state, &reply_to, &reply, media_url.as_deref()).await;
    (StatusCode::OK, "OK")
}

async fn handle_command(state: &AppState, key: &str, command: &str) -> String {
    match command.split_whitespace().next().unwrap_or_default() {
        "help" => HELP_TEXT.to_string(),
        "reset" => match state.sessions.reset(key).await {
            Ok(()) => "Conversation history cleared.".to_string(),
            Err(e) => {
                error!(key, error = %e, "reset failed");
                FAILURE_NOTICE.to_string()
            }
        },
        "status" => match state.sessions.describe(key).await {
            Ok(count) => format!("Session has {count} stored message(s)."),
            Err(e) => {
                error!(key, error = %e, "status failed");
                FAILURE_NOTICE.to_string()
            }
        },
        _ => format!("Unknown command.\n\n{HELP_TEXT}"),
    }
}

async fn send(state: &AppState, to: &str, text: &str, media_url: Option<&str>) {
    if let Err(e) = state.delivery.deliver(to, text, media_url).await {
        error!(to, error = %e, "delivery failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{header, Request};
    use serde_json::{json, Value};
    use std::sync::Mutex;
    use tower::ServiceExt;

    use crate::agent::ContextBuilder;
    use crate::error::Result;
    use crate::provider::{ModelClient, ModelTurn};
    use crate::session::ToolCall;
    use crate::tools::{CallerIdentity, ToolInvoker, ToolOutcome};

    struct FixedModel {
        turn: ModelTurn,
    }

    #[async_trait]
    impl ModelClient for FixedModel {
        async fn chat(&self, _messages: &[Message], _tools: &[Value]) -> Result<ModelTurn> {
            Ok(self.turn.clone())
        }
    }

    struct NoopInvoker;

    #[async_trait]
    impl ToolInvoker for NoopInvoker {
        async fn execute(
            &self,
            _name: &str,
            _arguments: Value,
            _identity: &CallerIdentity,
        ) -> Result<ToolOutcome> {
            Ok(ToolOutcome::success(json!({})))
        }
    }

    #[derive(Default)]
    struct RecordingDelivery {
        sent: Mutex<Vec<(String, String, Option<String>)>>,
    }

    #[async_trait]
    impl Delivery for RecordingDelivery {
        async fn deliver(&self, to: &str, text: &str, media_url: Option<&str>) -> Result<()> {
            self.sent.lock().unwrap().push((
                to.to_string(),
                text.to_string(),
                media_url.map(|s| s.to_string()),
            ));
            Ok(())
        }
    }

    fn state_with_model(turn: ModelTurn) -> (Arc<AppState>, Arc<RecordingDelivery>) {
        let delivery = Arc::new(RecordingDelivery::default());
        let agent = AgentLoop::new(
            Arc::new(FixedModel { turn }),
            Arc::new(NoopInvoker),
            ContextBuilder::new("test"),
            CallerIdentity {
                account_id: "acct_1".into(),
                allowed_apps: vec![],
            },
            4,
        );
        let state = Arc::new(AppState {
            agent: Arc::new(agent),
            sessions: SessionStore::new_memory(),
            delivery: delivery.clone(),
            image_host: None,
            request_timeout: Duration::from_secs(5),
        });
        (state, delivery)
    }

    fn form_request(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/whatsapp")
            .header(
                header::CONTENT_TYPE,
                "application/x-www-form-urlencoded",
            )
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn content_turn(text: &str) -> ModelTurn {
        ModelTurn {
            content: Some(text.to_string()),
            tool_call: None,
        }
    }

    #[tokio::test]
    async fn test_webhook_replies_and_persists() {
        let (state, delivery) = state_with_model(content_turn("4"));
        let app = router(state.clone());

        let response = app
            .oneshot(form_request("Body=What+is+2%2B2%3F&From=whatsapp%3A%2B15551234567"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let sent = delivery.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "whatsapp:+15551234567");
        assert_eq!(sent[0].1, "4");

        // Persisted transcript: user turn then assistant reply.
        drop(sent);
        let session = state.sessions.load("whatsapp:+15551234567").await.unwrap();
        assert_eq!(session.len(), 2);
        assert_eq!(session.messages[0], Message::user("What is 2+2?"));
        assert_eq!(session.messages[1], Message::assistant("4"));
    }

    #[tokio::test]
    async fn test_webhook_missing_sender_rejected() {
        let (state, delivery) = state_with_model(content_turn("x"));
        let app = router(state);

        let response = app.oneshot(form_request("Body=hello")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(delivery.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_webhook_empty_body_rejected() {
        let (state, _delivery) = state_with_model(content_turn("x"));
        let app = router(state);

        let response = app
            .oneshot(form_request("Body=++&From=whatsapp%3A%2B15551234567"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_help_command_bypasses_agent() {
        let (state, delivery) = state_with_model(content_turn("should not be used"));
        let app = router(state.clone());

        app.oneshot(form_request("Body=%2Fhelp&From=whatsapp%3A%2B15551234567"))
            .await
            .unwrap();

        let sent = delivery.sent.lock().unwrap();
        assert!(sent[0].1.contains("/reset"));
        drop(sent);
        // The agent never ran: nothing persisted.
        assert_eq!(state.sessions.describe("whatsapp:+15551234567").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_reset_command_clears_history() {
        let (state, delivery) = state_with_model(content_turn("hi"));
        let app = router(state.clone());

        app.clone()
            .oneshot(form_request("Body=hello&From=whatsapp%3A%2B15551234567"))
            .await
            .unwrap();
        assert_eq!(state.sessions.describe("whatsapp:+15551234567").await.unwrap(), 2);

        app.oneshot(form_request("Body=%2Freset&From=whatsapp%3A%2B15551234567"))
            .await
            .unwrap();
        assert_eq!(state.sessions.describe("whatsapp:+15551234567").await.unwrap(), 0);
        let sent = delivery.sent.lock().unwrap();
        assert!(sent.last().unwrap().1.contains("cleared"));
    }

    #[tokio::test]
    async fn test_reset_waits_for_in_flight_run() {
        let (state, _delivery) = state_with_model(content_turn("hi"));
        let app = router(state.clone());

        app.clone()
            .oneshot(form_request("Body=hello&From=whatsapp%3A%2B15551234567"))
            .await
            .unwrap();
        assert_eq!(state.sessions.describe("whatsapp:+15551234567").await.unwrap(), 2);

        // Hold the sender's lock the way an in-flight agent run does.
        let lock = state.sessions.key_lock("whatsapp:+15551234567");
        let guard = lock.lock_owned().await;

        let app2 = app.clone();
        let reset_task = tokio::spawn(async move {
            app2.oneshot(form_request("Body=%2Freset&From=whatsapp%3A%2B15551234567"))
                .await
                .unwrap()
        });

        // The reset is queued behind the run, not racing it.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!reset_task.is_finished());

        drop(guard);
        let response = reset_task.await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        // The reset ran after the in-flight holder released; nothing
        // re-persisted the cleared history.
        assert_eq!(state.sessions.describe("whatsapp:+15551234567").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_status_command_reports_count() {
        let (state, delivery) = state_with_model(content_turn("hi"));
        let app = router(state.clone());

        app.clone()
            .oneshot(form_request("Body=hello&From=whatsapp%3A%2B15551234567"))
            .await
            .unwrap();
        app.oneshot(form_request("Body=%2Fstatus&From=whatsapp%3A%2B15551234567"))
            .await
            .unwrap();

        let sent = delivery.sent.lock().unwrap();
        assert!(sent.last().unwrap().1.contains("2 stored message"));
    }

    #[tokio::test]
    async fn test_runaway_loop_sends_generic_failure_and_keeps_history() {
        // A model that always tool-calls exhausts the budget; the user gets
        // the generic notice and the session stays at its pre-request state.
        let turn = ModelTurn {
            content: None,
            tool_call: Some(ToolCall::new("t1", "REGISTRY_SEARCH_APPS", r#"{"query":"x"}"#)),
        };
        let (state, delivery) = state_with_model(turn);
        let app = router(state.clone());

        app.oneshot(form_request("Body=go&From=whatsapp%3A%2B15551234567"))
            .await
            .unwrap();

        let sent = delivery.sent.lock().unwrap();
        assert_eq!(sent[0].1, FAILURE_NOTICE);
        drop(sent);
        assert_eq!(state.sessions.describe("whatsapp:+15551234567").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_health() {
        let (state, _delivery) = state_with_model(content_turn("x"));
        let app = router(state);

        let response = app
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
