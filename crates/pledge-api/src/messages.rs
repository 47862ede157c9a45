use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use chrono::DateTime;
use tracing::warn;

use pledge_db::models::MessageRow;
use pledge_gateway::chat::{self, Author};
use pledge_types::api::{Claims, CreateMessageRequest, MessageResponse};
use pledge_types::models::ChatMessage;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// GET /api/messages: the whole history, oldest first.
pub async fn list_messages(
    State(state): State<AppState>,
    Extension(_claims): Extension<Claims>,
) -> ApiResult<Json<Vec<ChatMessage>>> {
    let rows = state.db_call(|db| db.list_messages()).await?;
    Ok(Json(rows.into_iter().map(message_from_row).collect()))
}

/// POST /api/messages: same pipeline as the gateway's `sendMessage`, with
/// the sender taken from the caller's account.
pub async fn create_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateMessageRequest>,
) -> ApiResult<impl IntoResponse> {
    if req.text.trim().is_empty() {
        return Err(ApiError::BadRequest("Missing required fields"));
    }

    let user_id = claims.sub.to_string();
    let name = state
        .db_call(move |db| db.get_user_by_id(&user_id))
        .await?
        .map(|u| u.name)
        .unwrap_or(claims.name);
    let author = Author::User {
        id: claims.sub,
        name,
    };

    chat::publish(&state.db, &state.dispatcher, req.text, author)
        .await?
        .ok_or(ApiError::BadRequest("Missing required fields"))?;

    Ok((
        StatusCode::CREATED,
        Json(MessageResponse::new("Message created successfully")),
    ))
}

fn message_from_row(row: MessageRow) -> ChatMessage {
    ChatMessage {
        id: row.id.parse().unwrap_or_else(|e| {
            warn!("Corrupt message id '{}': {}", row.id, e);
            Default::default()
        }),
        user_id: row.user_id.as_deref().and_then(|id| id.parse().ok()),
        timestamp: DateTime::parse_from_rfc3339(&row.created_at)
            .map(|dt| dt.to_utc())
            .unwrap_or_else(|e| {
                warn!("Corrupt created_at '{}' on message '{}': {}", row.created_at, row.id, e);
                DateTime::default()
            }),
        text: row.text,
        sender: row.sender,
    }
}
