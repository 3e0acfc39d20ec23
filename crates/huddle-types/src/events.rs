use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::GroupMessage;

/// Lobby chat line as it travels over the gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatLine {
    pub user: String,
    pub text: String,
    pub time: DateTime<Utc>,
}

/// Events sent over the WebSocket gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum GatewayEvent {
    /// Server confirms the connection is identified
    Ready { user_id: Uuid, username: String },

    /// Full set of currently identified display names
    UserList { usernames: Vec<String> },

    /// A lobby chat line, delivered to every connection
    ChatMessage(ChatLine),

    /// Recent lobby lines replayed to a newly identified connection
    ChatHistory { messages: Vec<ChatLine> },

    /// A message was posted to a group the receiver belongs to
    GroupMessage(GroupMessage),

    /// A command was refused
    Error { message: String },
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum GatewayCommand {
    /// Attach an identity to the connection using the REST bearer token
    Identify { token: String },

    /// Post a line to the lobby chat
    ChatMessage { text: String },
}
