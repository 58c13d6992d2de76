use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use tokio::sync::broadcast::error::RecvError;

use crate::commands::{control as commands, AppState, ClientMessage};
use crate::error::AppError;
use crate::services::wait_for_shutdown;
use crate::sink::EngineEvent;

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Forward broadcast events to the client and answer its commands.
/// Command replies and command errors go to this client only.
async fn handle_socket(mut socket: WebSocket, state: AppState) {
    let mut events = state.events.subscribe();
    let mut shutdown = state.shutdown_signal();
    tracing::info!("Push channel client connected");

    let hello = EngineEvent::Status(commands::get_status(&state));
    if send_event(&mut socket, &hello).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            _ = wait_for_shutdown(&mut shutdown) => {
                let _ = socket.send(Message::Close(None)).await;
                break;
            }
            event = events.recv() => match event {
                Ok(event) => {
                    if send_event(&mut socket, &event).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("Push channel client lagged; dropped {skipped} events");
                }
                Err(RecvError::Closed) => break,
            },
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    let reply = reply_to(&state, text.as_str());
                    if send_event(&mut socket, &reply).await.is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::debug!("Push channel read error: {e}");
                    break;
                }
            },
        }
    }
    tracing::info!("Push channel client disconnected");
}

fn reply_to(state: &AppState, text: &str) -> EngineEvent {
    let result = serde_json::from_str::<ClientMessage>(text)
        .map_err(|e| AppError::InvalidArgument(format!("malformed command: {e}")))
        .and_then(|msg| commands::handle_control(state, &msg));
    match result {
        Ok(status) => EngineEvent::Status(status),
        Err(err) => EngineEvent::Error(err),
    }
}

async fn send_event(socket: &mut WebSocket, event: &EngineEvent) -> Result<(), axum::Error> {
    let text = match serde_json::to_string(event) {
        Ok(text) => text,
        Err(e) => {
            tracing::warn!("Failed to encode push event: {e}");
            return Ok(());
        }
    };
    socket.send(Message::Text(text.into())).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::control::tests::test_state;
    use crate::core::control::TrafficType;

    #[test]
    fn test_reply_to_command_returns_status() {
        let state = test_state();
        match reply_to(&state, r#"{"event":"start","data":{"type":"attack"}}"#) {
            EngineEvent::Status(status) => {
                assert!(status.running);
                assert_eq!(status.traffic_type, TrafficType::Attack);
            }
            other => panic!("expected status, got {other:?}"),
        }
    }

    #[test]
    fn test_reply_to_malformed_json_is_error() {
        let state = test_state();
        match reply_to(&state, "start please") {
            EngineEvent::Error(err) => assert_eq!(err.kind(), "InvalidArgument"),
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[test]
    fn test_reply_to_rejected_command_is_error() {
        let state = test_state();
        let reply = reply_to(&state, r#"{"event":"neutralize"}"#);
        let json = serde_json::to_value(&reply).unwrap();
        assert_eq!(json["event"], "error");
        assert_eq!(json["data"]["kind"], "InvalidTransition");
    }
}
