use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::ChatMessage;

/// Events sent over the WebSocket gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    /// Sent once when a session is accepted.
    #[serde(rename = "connect")]
    Connect {
        session_id: Uuid,
        /// Display name of the identified user, `None` for anonymous sessions.
        user: Option<String>,
    },

    /// A chat message was stored; delivered to every session, sender included.
    #[serde(rename = "chat message")]
    ChatMessage(ChatMessage),
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayCommand {
    #[serde(rename = "sendMessage")]
    SendMessage {
        #[serde(default)]
        text: String,
        /// Client-chosen label; only honoured for anonymous sessions.
        #[serde(default)]
        sender: Option<String>,
    },
}
