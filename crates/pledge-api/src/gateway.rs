use axum::{
    extract::{Query, State, WebSocketUpgrade},
    response::IntoResponse,
};
use axum_extra::TypedHeader;
use axum_extra::headers::{Authorization, authorization::Bearer};
use serde::Deserialize;

use pledge_gateway::connection::{self, SessionUser};

use crate::error::{ApiError, ApiResult};
use crate::middleware::decode_token;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct GatewayQuery {
    /// Browsers cannot set headers on a WebSocket handshake, so the token
    /// may also ride in the query string.
    pub token: Option<String>,
}

/// GET /gateway: upgrade to the chat socket. Anonymous sessions are allowed;
/// a token that is present but invalid is refused.
pub async fn ws_upgrade(
    State(state): State<AppState>,
    Query(query): Query<GatewayQuery>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    ws: WebSocketUpgrade,
) -> ApiResult<impl IntoResponse> {
    let token = bearer
        .as_ref()
        .map(|TypedHeader(auth)| auth.token())
        .or(query.token.as_deref());
    let user = resolve_session_user(&state, token).await?;

    let dispatcher = state.dispatcher.clone();
    let db = state.db.clone();
    Ok(ws.on_upgrade(move |socket| connection::handle_connection(socket, dispatcher, db, user)))
}

/// Map an optional bearer token to the user the session speaks for. The
/// display name is read from the store so renames apply to new sessions.
pub async fn resolve_session_user(
    state: &AppState,
    token: Option<&str>,
) -> ApiResult<Option<SessionUser>> {
    let Some(token) = token else {
        return Ok(None);
    };
    let claims = decode_token(&state.config.jwt.secret, token)?;

    let user_id = claims.sub.to_string();
    let user = state
        .db_call(move |db| db.get_user_by_id(&user_id))
        .await?
        .ok_or(ApiError::Unauthorized)?;

    Ok(Some(SessionUser {
        id: claims.sub,
        name: user.name,
    }))
}
