//! Connection handler - one task per client.
//!
//! Reads framed requests strictly one after another, answers each, and
//! closes the connection on disconnect, shutdown, or any protocol violation
//! (oversized frame, malformed JSON, unknown command). Protocol violations
//! get no response bytes.

use crate::fallback::{FallbackReply, CAPABILITIES};
use crate::provider;
use crate::state::AgentState;
use aios_common::frame::{self, FrameError};
use aios_common::ipc::{StatusResponse, SystemSnapshot};
use aios_common::{extract_intent, ActionIntent, ActionResult, Request, Response, ResponseStatus};
use std::sync::Arc;
use tokio::net::UnixStream;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Serve one connection until it closes
pub async fn handle_connection(
    stream: UnixStream,
    state: Arc<AgentState>,
    mut shutdown: watch::Receiver<bool>,
    conn_id: u64,
) {
    let max = state.config.max_message_size;
    let (mut reader, mut writer) = stream.into_split();

    loop {
        if *shutdown.borrow() {
            break;
        }

        let payload = tokio::select! {
            biased;
            Ok(()) = shutdown.changed() => break,
            read = frame::read_frame(&mut reader, max) => read,
        };

        let payload = match payload {
            Ok(Some(payload)) => payload,
            Ok(None) => {
                debug!("Connection {} closed by peer", conn_id);
                break;
            }
            Err(e) if e.is_protocol_violation() => {
                warn!("Connection {}: protocol violation, closing: {}", conn_id, e);
                break;
            }
            Err(e) => {
                debug!("Connection {}: read failed: {}", conn_id, e);
                break;
            }
        };

        let request: Request = match serde_json::from_slice(&payload) {
            Ok(request) => request,
            Err(e) => {
                warn!("Connection {}: malformed request, closing: {}", conn_id, e);
                break;
            }
        };

        debug!("Connection {}: {} request", conn_id, request.name());
        let response = handle_request(&state, request).await;

        if let Err(e) = send(&mut writer, &response, max).await {
            debug!("Connection {}: write failed: {}", conn_id, e);
            break;
        }
    }

    info!("Connection {} closed", conn_id);
}

/// Write a response; one that would not fit in a frame is replaced by an error
async fn send<W>(writer: &mut W, response: &Response, max: usize) -> Result<(), FrameError>
where
    W: tokio::io::AsyncWrite + Unpin,
{
    match frame::write_json(writer, response, max).await {
        Err(FrameError::TooLarge { len, .. }) => {
            warn!("Response of {} bytes exceeds frame limit", len);
            let replacement = Response::error("Response exceeds maximum message size");
            frame::write_json(writer, &replacement, max).await
        }
        other => other,
    }
}

/// Dispatch one decoded request
pub async fn handle_request(state: &AgentState, request: Request) -> Response {
    match request {
        Request::Chat { text } => chat(state, text).await,
        Request::Action { action } => match ActionIntent::from_value(&action) {
            Some(intent) => Response::action(execute(state, intent).await),
            None => Response::error("Invalid action: expected an object with a name"),
        },
        Request::Status => status(state).await,
        Request::Clear => {
            state.history.clear();
            info!("Conversation history cleared");
            Response::ack()
        }
    }
}

async fn chat(state: &AgentState, text: String) -> Response {
    let mut reply = None;
    if let Some(remote) = &state.provider {
        let history = state.history.snapshot();
        match provider::complete_within(
            remote.as_ref(),
            state.config.request_timeout,
            &history,
            &text,
        )
        .await
        {
            Ok(answer) => reply = Some(answer),
            Err(e) => warn!("Provider {} failed, using local fallback: {}", remote.kind(), e),
        }
    }

    let from_provider = reply.is_some();
    let (response_text, intent) = match reply {
        Some(answer) => {
            let intent = extract_intent(&answer);
            (answer, intent)
        }
        None => {
            let fallback = Arc::clone(&state.fallback);
            let input = text.clone();
            let local = blocking(move || fallback.interpret(&input))
                .await
                .unwrap_or_else(|| FallbackReply {
                    text: CAPABILITIES.to_string(),
                    intent: None,
                });
            (local.text, local.intent)
        }
    };

    state.history.append_exchange(text.as_str(), response_text.as_str());

    let action_result = match intent {
        None => None,
        Some(intent) if from_provider && needs_confirmation(state, &intent, &text) => {
            info!("Holding {} from provider until confirmed", intent.name);
            Some(ActionResult::failed(format!(
                "Confirmation required: say \"confirm {}\" to proceed",
                intent.name
            )))
        }
        Some(intent) => Some(execute(state, intent).await),
    };

    Response::chat(response_text, action_result)
}

/// Provider-suggested shutdown/reboot only runs when the user said "confirm"
fn needs_confirmation(state: &AgentState, intent: &ActionIntent, user_text: &str) -> bool {
    state.config.confirm_dangerous
        && intent.is_dangerous()
        && !user_text.to_lowercase().contains("confirm")
}

async fn execute(state: &AgentState, intent: ActionIntent) -> ActionResult {
    let dispatcher = state.dispatcher.clone();
    blocking(move || dispatcher.execute(&intent))
        .await
        .unwrap_or_else(|| ActionResult::failed("Action failed"))
}

async fn status(state: &AgentState) -> Response {
    let hal = Arc::clone(&state.hal);
    let system = match blocking(move || hal.system_info()).await {
        Some(Ok(info)) => Some(SystemSnapshot::from(&info)),
        Some(Err(e)) => {
            warn!("System info unavailable: {}", e);
            None
        }
        None => None,
    };

    Response::Status(StatusResponse {
        status: ResponseStatus::Ok,
        running: true,
        ai_configured: state.provider.is_some(),
        provider: state.provider_kind().as_str().to_string(),
        model: state.model().to_string(),
        history_len: state.history.len(),
        uptime_secs: state.uptime_secs(),
        version: aios_common::VERSION.to_string(),
        system,
    })
}

/// HAL calls are synchronous; keep them off the async workers
async fn blocking<T, F>(f: F) -> Option<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(value) => Some(value),
        Err(e) => {
            error!("Blocking task failed: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AgentConfig;
    use crate::provider::{FakeProvider, ProviderError};
    use aios_common::hal::{Hal, VirtualHal};
    use aios_common::ipc::{ActionResponse, ChatResponse};
    use std::time::Duration;

    fn state_with(
        provider: Option<Arc<FakeProvider>>,
        confirm_dangerous: bool,
    ) -> (Arc<VirtualHal>, AgentState) {
        let hal = Arc::new(VirtualHal::new());
        let config = AgentConfig {
            confirm_dangerous,
            power_action_delay: Duration::from_secs(3600),
            request_timeout: Duration::from_millis(200),
            ..AgentConfig::default()
        };
        let provider = provider.map(|p| p as Arc<dyn crate::provider::ChatProvider>);
        (hal.clone(), AgentState::new(config, hal, provider))
    }

    fn chat_response(response: Response) -> ChatResponse {
        match response {
            Response::Chat(chat) => chat,
            other => panic!("expected chat response, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_chat_without_provider_uses_fallback() {
        let (hal, state) = state_with(None, true);
        let resp = chat_response(handle_request(&state, Request::chat("set brightness to 80")).await);
        assert_eq!(resp.status, ResponseStatus::Ok);
        assert!(resp.response.contains("80"));
        assert!(resp.action_result.unwrap().success);
        assert_eq!(hal.brightness().unwrap(), 80);
        assert_eq!(state.history.len(), 2);
    }

    #[tokio::test]
    async fn test_chat_uses_provider_intent() {
        let fake = Arc::new(FakeProvider::always(
            "Sure, turning it down.\n```json\n{\"action\": \"volume\", \"level\": 20}\n```",
        ));
        let (hal, state) = state_with(Some(fake.clone()), true);
        let resp = chat_response(handle_request(&state, Request::chat("quieter please")).await);
        assert!(resp.response.starts_with("Sure"));
        assert_eq!(resp.action_result.unwrap().message, "Volume set to 20%");
        assert_eq!(hal.volume().unwrap(), 20);
        assert_eq!(fake.call_count(), 1);
    }

    #[tokio::test]
    async fn test_provider_failure_falls_back() {
        let fake = Arc::new(FakeProvider::always_error(ProviderError::Status {
            status: 500,
            body: "boom".to_string(),
        }));
        let (hal, state) = state_with(Some(fake), true);
        let resp = chat_response(handle_request(&state, Request::chat("volume 30")).await);
        assert_eq!(resp.response, "Setting volume to 30%");
        assert_eq!(hal.volume().unwrap(), 30);
    }

    #[tokio::test]
    async fn test_provider_timeout_falls_back() {
        let fake = Arc::new(FakeProvider::always("too late").with_delay(Duration::from_secs(5)));
        let (_, state) = state_with(Some(fake), true);
        let resp = chat_response(handle_request(&state, Request::chat("hello")).await);
        assert_eq!(resp.response, CAPABILITIES);
        assert!(resp.action_result.is_none());
    }

    #[tokio::test]
    async fn test_provider_history_grows() {
        let fake = Arc::new(FakeProvider::always("Hello!"));
        let (_, state) = state_with(Some(fake.clone()), true);
        handle_request(&state, Request::chat("hi")).await;
        handle_request(&state, Request::chat("again")).await;
        let calls = fake.recorded_calls();
        assert_eq!(calls[0].history_len, 0);
        assert_eq!(calls[1].history_len, 2);
        assert_eq!(calls[1].user_text, "again");
    }

    #[tokio::test]
    async fn test_provider_shutdown_needs_confirmation() {
        let fake = Arc::new(FakeProvider::always("OK {\"action\": \"shutdown\"}"));
        let (hal, state) = state_with(Some(fake), true);

        let resp = chat_response(handle_request(&state, Request::chat("turn it off")).await);
        let result = resp.action_result.unwrap();
        assert!(!result.success);
        assert!(result.message.starts_with("Confirmation required"));

        let resp = chat_response(handle_request(&state, Request::chat("confirm shutdown")).await);
        assert!(resp.action_result.unwrap().success);
        // Scheduled an hour out; nothing has happened yet
        assert!(hal.power_events().is_empty());
    }

    #[tokio::test]
    async fn test_chat_cannot_launch_power_binaries() {
        let (hal, state) = state_with(None, true);
        let resp = chat_response(handle_request(&state, Request::chat("start halt")).await);
        let result = resp.action_result.unwrap();
        assert!(!result.success);
        assert!(hal.launched_apps().is_empty());
        assert!(hal.power_events().is_empty());
    }

    #[tokio::test]
    async fn test_action_request() {
        let (hal, state) = state_with(None, true);
        let request: Request = serde_json::from_value(serde_json::json!({
            "cmd": "action",
            "action": {"name": "brightness", "params": {"level": 150}}
        }))
        .unwrap();
        match handle_request(&state, request).await {
            Response::Action(ActionResponse { result, .. }) => assert!(result.success),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(hal.brightness().unwrap(), 100);
        assert!(state.history.is_empty());
    }

    #[tokio::test]
    async fn test_action_without_name_is_error() {
        let (hal, state) = state_with(None, true);
        let request = Request::Action {
            action: serde_json::json!({"level": 3}),
        };
        let resp = handle_request(&state, request).await;
        assert_eq!(resp.status(), ResponseStatus::Error);
        assert_eq!(hal.call_count(), 0);
    }

    #[tokio::test]
    async fn test_status_and_clear() {
        let (_, state) = state_with(None, true);
        handle_request(&state, Request::chat("hello")).await;
        assert_eq!(handle_request(&state, Request::Clear).await, Response::ack());

        match handle_request(&state, Request::Status).await {
            Response::Status(status) => {
                assert!(status.running);
                assert!(!status.ai_configured);
                assert_eq!(status.provider, "none");
                assert_eq!(status.history_len, 0);
                assert_eq!(status.system.unwrap().hostname, "aios-virtual");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_status_survives_hal_failure() {
        let (hal, state) = state_with(None, true);
        hal.set_failing(true);
        match handle_request(&state, Request::Status).await {
            Response::Status(status) => assert!(status.system.is_none()),
            other => panic!("unexpected {:?}", other),
        }
    }
}
