//! WebSocket handler for real-time event streaming
//!
//! Endpoint `/api/ws`: session and pipeline events, filtered by the topics
//! each client subscribes to, with a 30 s ping heartbeat.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::error::{AppError, Result};
use crate::events::SystemEvent;
use crate::state::AppState;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Client-to-server message
#[derive(Debug, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "lowercase")]
enum ClientMessage {
    Subscribe { topics: Vec<String> },
    Unsubscribe { topics: Vec<String> },
    Ping,
}

/// Per-connection subscription state
#[derive(Debug, Default)]
struct Subscription {
    topics: Vec<String>,
    snapshot_sent: bool,
}

type WsSender = SplitSink<WebSocket, Message>;

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let mut event_rx = state.events.subscribe();
    let mut subscription = Subscription::default();
    let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);

    info!("WebSocket client connected");

    loop {
        tokio::select! {
            msg = receiver.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    if let Err(e) = handle_client_message(&text, &mut subscription.topics) {
                        warn!("Failed to handle client message: {}", e);
                        continue;
                    }

                    // Late subscribers learn the current connection state once
                    if !subscription.snapshot_sent && !subscription.topics.is_empty() {
                        subscription.snapshot_sent = true;
                        if let Some(snapshot) = session_snapshot(&state).await {
                            if should_send_event(&snapshot, &subscription.topics)
                                && !send_event(&mut sender, &snapshot).await
                            {
                                break;
                            }
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | None => {
                    info!("WebSocket client disconnected");
                    break;
                }
                Some(Err(e)) => {
                    warn!("WebSocket receive error: {}", e);
                    break;
                }
                // Ping/pong frames are answered by axum
                Some(Ok(_)) => {}
            },

            event = event_rx.recv() => match event {
                Ok(event) => {
                    if should_send_event(&event, &subscription.topics)
                        && !send_event(&mut sender, &event).await
                    {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("WebSocket client lagged by {} events", n);
                    let lagged = SystemEvent::Error {
                        message: format!("Lagged by {} events", n),
                    };
                    let _ = send_event(&mut sender, &lagged).await;
                }
                Err(broadcast::error::RecvError::Closed) => {
                    warn!("Event bus closed");
                    break;
                }
            },

            _ = heartbeat.tick() => {
                if sender.send(Message::Ping(vec![])).await.is_err() {
                    warn!("Failed to send ping, disconnecting");
                    break;
                }
            }
        }
    }

    debug!("WebSocket handler exiting");
}

/// Serialize and send one event; false when the client is gone
async fn send_event(sender: &mut WsSender, event: &SystemEvent) -> bool {
    let json = match serde_json::to_string(event) {
        Ok(json) => json,
        Err(e) => {
            warn!("Failed to serialize {}: {}", event.event_name(), e);
            return true;
        }
    };

    if sender.send(Message::Text(json)).await.is_err() {
        warn!("Failed to send event to client, disconnecting");
        return false;
    }
    true
}

/// Current connection state of the live session, if one exists
async fn session_snapshot(state: &AppState) -> Option<SystemEvent> {
    let session = state.sessions.peek().await?;
    Some(SystemEvent::SessionStateChanged {
        session_id: session.session_id().to_string(),
        state: session.state(),
    })
}

fn handle_client_message(text: &str, topics: &mut Vec<String>) -> Result<()> {
    let msg: ClientMessage = serde_json::from_str(text)
        .map_err(|e| AppError::BadRequest(format!("Invalid client message: {}", e)))?;

    match msg {
        ClientMessage::Subscribe { topics: new_topics } => {
            info!("Client subscribed to topics: {:?}", new_topics);
            *topics = new_topics;
        }
        ClientMessage::Unsubscribe {
            topics: remove_topics,
        } => {
            topics.retain(|t| !remove_topics.contains(t));
            info!("Client unsubscribed from topics: {:?}", remove_topics);
        }
        ClientMessage::Ping => debug!("Received ping from client"),
    }

    Ok(())
}

/// Nothing is sent until the client subscribes
fn should_send_event(event: &SystemEvent, topics: &[String]) -> bool {
    topics.iter().any(|topic| event.matches_topic(topic))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::{PipelineKind, PipelineState};

    fn pipeline_event() -> SystemEvent {
        SystemEvent::PipelineStateChanged {
            session_id: "s1".to_string(),
            kind: PipelineKind::Video,
            state: PipelineState::Completed,
            units_sent: 3,
            error: None,
        }
    }

    #[test]
    fn test_should_send_event_wildcard() {
        assert!(should_send_event(&pipeline_event(), &["*".to_string()]));
    }

    #[test]
    fn test_should_send_event_prefix() {
        let event = pipeline_event();
        assert!(should_send_event(&event, &["pipeline.*".to_string()]));
        assert!(!should_send_event(&event, &["session.*".to_string()]));
    }

    #[test]
    fn test_should_send_event_exact() {
        let event = pipeline_event();
        assert!(should_send_event(
            &event,
            &["pipeline.state_changed".to_string()]
        ));
        assert!(!should_send_event(&event, &["session.closed".to_string()]));
    }

    #[test]
    fn test_should_send_event_empty_topics() {
        assert!(!should_send_event(&pipeline_event(), &[]));
    }

    #[test]
    fn test_client_messages() {
        let mut topics = Vec::new();
        handle_client_message(
            r#"{"type":"subscribe","payload":{"topics":["session.*","pipeline.*"]}}"#,
            &mut topics,
        )
        .unwrap();
        assert_eq!(topics, vec!["session.*", "pipeline.*"]);

        handle_client_message(
            r#"{"type":"unsubscribe","payload":{"topics":["session.*"]}}"#,
            &mut topics,
        )
        .unwrap();
        assert_eq!(topics, vec!["pipeline.*"]);

        handle_client_message(r#"{"type":"ping"}"#, &mut topics).unwrap();
        assert!(matches!(
            handle_client_message("nonsense", &mut topics),
            Err(AppError::BadRequest(_))
        ));
    }
}
