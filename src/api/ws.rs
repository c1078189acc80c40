//! Streaming voice channel
//!
//! Each text frame `{token, audio_base64, language?, context?}` is answered
//! with a voice turn. A missing or invalid token closes the socket with
//! 4401. One live connection per user: a newer one replaces the older.

use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::dialogue::default_language;
use super::ApiState;

/// Close code for a missing or rejected token
pub const UNAUTHORIZED_CLOSE_CODE: u16 = 4401;
/// Close code sent to a connection superseded by a newer one
pub const REPLACED_CLOSE_CODE: u16 = 4000;

struct Connection {
    id: Uuid,
    outbound: mpsc::UnboundedSender<Message>,
}

/// user_id → live connection
#[derive(Default)]
pub struct VoiceConnections {
    connections: RwLock<HashMap<String, Connection>>,
}

impl VoiceConnections {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `id` to `user_id`. Returns true if an older connection was closed.
    pub async fn register(
        &self,
        user_id: &str,
        id: Uuid,
        outbound: mpsc::UnboundedSender<Message>,
    ) -> bool {
        let previous = self
            .connections
            .write()
            .await
            .insert(user_id.to_string(), Connection { id, outbound });

        match previous {
            Some(old) if old.id != id => {
                let _ = old.outbound.send(close_frame(REPLACED_CLOSE_CODE, "replaced"));
                info!(user_id, "Voice connection replaced");
                true
            }
            _ => false,
        }
    }

    /// Drop the binding if it still belongs to `id`.
    pub async fn unregister(&self, user_id: &str, id: Uuid) {
        let mut connections = self.connections.write().await;
        if connections.get(user_id).map(|c| c.id) == Some(id) {
            connections.remove(user_id);
        }
    }

    /// Whether `id` still holds the binding for `user_id`.
    pub async fn is_current(&self, user_id: &str, id: Uuid) -> bool {
        self.connection_id(user_id).await == Some(id)
    }

    pub async fn connection_id(&self, user_id: &str) -> Option<Uuid> {
        self.connections.read().await.get(user_id).map(|c| c.id)
    }

    pub async fn len(&self) -> usize {
        self.connections.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[derive(Debug, Deserialize)]
struct VoiceFrame {
    #[serde(default)]
    token: Option<String>,
    audio_base64: String,
    #[serde(default = "default_language")]
    language: String,
    #[serde(default)]
    context: Option<String>,
}

#[derive(Debug, PartialEq, Eq)]
enum Admission {
    /// First frame for this user on the connection
    Bind,
    Proceed,
    /// A newer connection took over the user
    Superseded,
}

async fn admit(
    connections: &VoiceConnections,
    bound_user: Option<&str>,
    user_id: &str,
    id: Uuid,
) -> Admission {
    if bound_user != Some(user_id) {
        return Admission::Bind;
    }
    if connections.is_current(user_id, id).await {
        Admission::Proceed
    } else {
        Admission::Superseded
    }
}

fn close_frame(code: u16, reason: &'static str) -> Message {
    Message::Close(Some(CloseFrame {
        code,
        reason: reason.into(),
    }))
}

fn error_frame(message: impl Into<String>) -> Message {
    Message::Text(json!({ "error": message.into() }).to_string())
}

pub async fn voice_socket(ws: WebSocketUpgrade, State(state): State<ApiState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: ApiState) {
    let (mut sender, mut receiver) = socket.split();
    let (outbound, mut queue) = mpsc::unbounded_channel::<Message>();
    let connection_id = Uuid::new_v4();

    let send_task = tokio::spawn(async move {
        while let Some(msg) = queue.recv().await {
            let closing = matches!(msg, Message::Close(_));
            if sender.send(msg).await.is_err() || closing {
                break;
            }
        }
    });

    let mut bound_user: Option<String> = None;

    while let Some(result) = receiver.next().await {
        let text = match result {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => break,
            Ok(Message::Binary(_)) => {
                let _ = outbound.send(error_frame("binary frames are not supported"));
                continue;
            }
            Ok(_) => continue,
            Err(e) => {
                warn!(error = %e, "Voice socket error");
                break;
            }
        };

        let frame: VoiceFrame = match serde_json::from_str(&text) {
            Ok(frame) => frame,
            Err(e) => {
                debug!(error = %e, "Malformed voice frame");
                let _ = outbound.send(error_frame(format!("malformed message: {}", e)));
                continue;
            }
        };

        let Some(token) = frame.token.as_deref().filter(|t| !t.trim().is_empty()) else {
            let _ = outbound.send(close_frame(UNAUTHORIZED_CLOSE_CODE, "missing token"));
            break;
        };

        let user = match state.assistant.auth.authenticate(token).await {
            Ok(user) => user,
            Err(e) => {
                warn!(error = %e, "Voice socket token rejected");
                let _ = outbound.send(close_frame(UNAUTHORIZED_CLOSE_CODE, "invalid token"));
                break;
            }
        };

        match admit(
            &state.connections,
            bound_user.as_deref(),
            &user.user_id,
            connection_id,
        )
        .await
        {
            Admission::Proceed => {}
            Admission::Bind => {
                if let Some(previous) = bound_user.take() {
                    state.connections.unregister(&previous, connection_id).await;
                }
                state
                    .connections
                    .register(&user.user_id, connection_id, outbound.clone())
                    .await;
                bound_user = Some(user.user_id.clone());
            }
            Admission::Superseded => {
                debug!(user_id = %user.user_id, "Dropping frame on replaced voice socket");
                break;
            }
        }

        let reply = match state
            .assistant
            .dialogue
            .process_voice_turn(
                &user.user_id,
                &frame.audio_base64,
                &frame.language,
                frame.context.as_deref(),
            )
            .await
        {
            Ok(turn) => match serde_json::to_string(&turn) {
                Ok(body) => Message::Text(body),
                Err(e) => error_frame(e.to_string()),
            },
            Err(e) => error_frame(e.to_string()),
        };

        if outbound.send(reply).is_err() {
            break;
        }
    }

    if let Some(user_id) = bound_user {
        state.connections.unregister(&user_id, connection_id).await;
        debug!(user_id = %user_id, "Voice socket closed");
    }

    drop(outbound);
    let _ = send_task.await;
}
