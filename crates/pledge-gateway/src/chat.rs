use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

use pledge_db::Database;
use pledge_types::events::GatewayEvent;
use pledge_types::models::ChatMessage;

use crate::dispatcher::Dispatcher;

pub const ANONYMOUS_SENDER: &str = "Anonymous";

/// Who a chat message is attributed to.
#[derive(Debug, Clone)]
pub enum Author {
    /// A session or request carrying a valid bearer token. The label comes
    /// from the stored user, never from the client.
    User { id: Uuid, name: String },
    /// An unauthenticated socket; its self-chosen label is used as-is.
    Anonymous { label: Option<String> },
}

impl Author {
    fn sender(&self) -> String {
        match self {
            Self::User { name, .. } => name.clone(),
            Self::Anonymous { label } => label
                .as_deref()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .unwrap_or(ANONYMOUS_SENDER)
                .to_string(),
        }
    }

    fn user_id(&self) -> Option<Uuid> {
        match self {
            Self::User { id, .. } => Some(*id),
            Self::Anonymous { .. } => None,
        }
    }
}

/// Persist a chat message, then broadcast it to every connected session.
///
/// Returns `Ok(None)` when the text is empty: nothing is stored or sent.
/// A storage error is returned without broadcasting.
pub async fn publish(
    db: &Arc<Database>,
    dispatcher: &Dispatcher,
    text: String,
    author: Author,
) -> Result<Option<ChatMessage>> {
    if text.trim().is_empty() {
        return Ok(None);
    }

    let message = ChatMessage {
        id: Uuid::new_v4(),
        text,
        sender: author.sender(),
        user_id: author.user_id(),
        timestamp: Utc::now(),
    };

    let db = db.clone();
    let row = message.clone();
    tokio::task::spawn_blocking(move || {
        db.insert_message(
            &row.id.to_string(),
            &row.text,
            &row.sender,
            row.user_id.map(|id| id.to_string()).as_deref(),
            &row.timestamp.to_rfc3339(),
        )
    })
    .await??;

    let delivered = dispatcher.broadcast(&GatewayEvent::ChatMessage(message.clone()));
    debug!("Chat message {} from {} sent to {} sessions", message.id, message.sender, delivered);

    Ok(Some(message))
}
