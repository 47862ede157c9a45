use axum::{
    Extension, Json,
    extract::{Multipart, State},
};
use tracing::info;

use pledge_db::models::ProfileChanges;
use pledge_types::api::{Claims, ProfileUpdateResponse, UserSummary};

use crate::auth::{hash_password, user_summary};
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use crate::uploads::{MultipartForm, save_upload};

/// GET /api/profile
pub async fn get_profile(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<UserSummary>> {
    let user_id = claims.sub.to_string();
    let user = state
        .db_call(move |db| db.get_user_by_id(&user_id))
        .await?
        .ok_or(ApiError::NotFound("User"))?;

    Ok(Json(user_summary(&user)))
}

/// PUT /api/profile/update: multipart `name`, `password`, `profilePicture`.
/// Only the parts present are changed.
pub async fn update_profile(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    multipart: Multipart,
) -> ApiResult<Json<ProfileUpdateResponse>> {
    let mut form = MultipartForm::read(multipart).await?;

    // Nothing touches the upload directory for an account that is gone
    let user_id = claims.sub.to_string();
    state
        .db_call(move |db| db.get_user_by_id(&user_id))
        .await?
        .ok_or(ApiError::NotFound("User"))?;

    let name = form.text("name").map(str::to_string);
    // Hashed exactly as typed, like at signup
    let password_hash = form.raw("password").map(hash_password).transpose()?;
    let picture_url = match form.take_file("profilePicture") {
        Some(file) => {
            let stored = save_upload(&state.config.upload_dir, &file).await?;
            info!("Stored profile picture {} for user {}", stored, claims.sub);
            Some(state.config.upload_url(&stored))
        }
        None => None,
    };

    let user_id = claims.sub.to_string();
    let user = state
        .db_call(move |db| {
            db.update_profile(
                &user_id,
                &ProfileChanges {
                    name: name.as_deref(),
                    password_hash: password_hash.as_deref(),
                    profile_picture: picture_url.as_deref(),
                },
            )
        })
        .await?
        .ok_or(ApiError::NotFound("User"))?;

    Ok(Json(ProfileUpdateResponse {
        message: "Profile updated successfully".into(),
        user: user_summary(&user),
    }))
}
