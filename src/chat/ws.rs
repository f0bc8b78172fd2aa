use std::collections::HashMap;

use axum::{
    debug_handler,
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast::error::RecvError, mpsc};
use tokio::task::JoinHandle;

use crate::AppState;
use crate::chat::broker::{ChatMessage, ChatRoomBroker};
use crate::error::AppError;

#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ClientEvent {
    JoinGroupChat {
        user: String,
        group_id: u64,
    },
    LeaveGroupChat {
        group_id: u64,
        user: String,
    },
    SendMessage {
        user: String,
        group_id: u64,
        message: String,
    },
}

#[derive(Debug, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ServerEvent {
    Connected { data: String },
    JoinedGroupChat { group_id: u64, group_name: String },
    NewMessage { group_id: u64, message: ChatMessage },
    Error { message: String },
}

#[debug_handler]
pub async fn chat_ws(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state.chat))
}

/// One connection, any number of rooms. Outbound frames are funneled
/// through a single writer task; each joined room gets a feed task that
/// copies the room's broadcast stream onto that funnel. Errors go back on
/// the same connection as `error` events, the connection stays open.
async fn handle_socket(socket: WebSocket, broker: ChatRoomBroker) {
    let (mut sink, mut stream) = socket.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<ServerEvent>();

    let write_task = tokio::spawn(async move {
        while let Some(event) = out_rx.recv().await {
            let Ok(text) = serde_json::to_string(&event) else {
                continue;
            };
            if sink.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    tracing::info!("chat client connected");
    let _ = out_tx.send(ServerEvent::Connected {
        data: "Connected to TradeCircle chat server".to_owned(),
    });

    let mut room_feeds: HashMap<u64, JoinHandle<()>> = HashMap::new();

    while let Some(Ok(frame)) = stream.next().await {
        let Message::Text(text) = frame else {
            continue;
        };
        // unparsable frames are ignored
        let Ok(event) = serde_json::from_str::<ClientEvent>(&text) else {
            continue;
        };

        match event {
            ClientEvent::JoinGroupChat { user, group_id } => {
                match broker.join_room(group_id, &user) {
                    Ok((mut feed, group_name)) => {
                        if let Some(stale) = room_feeds.remove(&group_id) {
                            stale.abort();
                        }
                        let feed_out = out_tx.clone();
                        room_feeds.insert(
                            group_id,
                            tokio::spawn(async move {
                                loop {
                                    match feed.recv().await {
                                        Ok(message) => {
                                            if feed_out
                                                .send(ServerEvent::NewMessage { group_id, message })
                                                .is_err()
                                            {
                                                break;
                                            }
                                        }
                                        // dropped some messages, keep going
                                        Err(RecvError::Lagged(_)) => continue,
                                        Err(RecvError::Closed) => break,
                                    }
                                }
                            }),
                        );
                        let _ = out_tx.send(ServerEvent::JoinedGroupChat {
                            group_id,
                            group_name,
                        });
                    }
                    Err(err) => {
                        let _ = out_tx.send(ServerEvent::Error {
                            message: err.to_string(),
                        });
                    }
                }
            }
            ClientEvent::LeaveGroupChat { group_id, user } => {
                if let Some(feed) = room_feeds.remove(&group_id) {
                    feed.abort();
                }
                broker.leave_room(group_id, &user);
            }
            ClientEvent::SendMessage {
                user,
                group_id,
                message,
            } => {
                // delivery to this connection happens via its room feed
                if let Err(err) = broker.post_message(group_id, user, &message, None) {
                    let message = match err {
                        AppError::Forbidden(_) | AppError::NotFound(_) => {
                            "Not authorized to send messages to this group".to_owned()
                        }
                        other => other.to_string(),
                    };
                    let _ = out_tx.send(ServerEvent::Error { message });
                }
            }
        }
    }

    tracing::info!("chat client disconnected");
    for feed in room_feeds.into_values() {
        feed.abort();
    }
    write_task.abort();
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn client_events_deserialize_from_tagged_json() {
        let event: ClientEvent = serde_json::from_value(json!({
            "event": "join_group_chat",
            "user": "alex",
            "group_id": 1,
        }))
        .unwrap();
        assert!(matches!(
            event,
            ClientEvent::JoinGroupChat { ref user, group_id: 1 } if user == "alex"
        ));

        let event: ClientEvent = serde_json::from_value(json!({
            "event": "send_message",
            "user": "alex",
            "group_id": 1,
            "message": "hello",
        }))
        .unwrap();
        assert!(matches!(event, ClientEvent::SendMessage { .. }));
    }

    #[test]
    fn server_events_carry_the_event_tag() {
        let event = ServerEvent::JoinedGroupChat {
            group_id: 1,
            group_name: "FX Traders".to_owned(),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], "joined_group_chat");
        assert_eq!(value["group_name"], "FX Traders");

        let event = ServerEvent::NewMessage {
            group_id: 1,
            message: ChatMessage {
                id: 1,
                user: "alex".to_owned(),
                message: "hello".to_owned(),
                timestamp: "2025-09-30T12:00:00Z".to_owned(),
            },
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], "new_message");
        assert_eq!(value["message"]["id"], 1);
    }
}
