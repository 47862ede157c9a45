use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use chrono::Utc;
use jsonwebtoken::{EncodingKey, Header, encode};
use tracing::{info, warn};
use uuid::Uuid;

use pledge_db::models::{IdentityUser, UserRow};
use pledge_types::api::{
    AuthResponse, Claims, IdentityAuthRequest, MessageResponse, SigninRequest, SignupRequest,
    UserSummary,
};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

pub async fn signup(
    State(state): State<AppState>,
    Json(req): Json<SignupRequest>,
) -> ApiResult<impl IntoResponse> {
    let name = req.name.trim().to_string();
    let email = normalize_email(&req.email);
    if name.is_empty() || email.is_empty() || req.password.is_empty() {
        return Err(ApiError::BadRequest("Missing required fields"));
    }

    let password_hash = hash_password(&req.password)?;
    let user_id = Uuid::new_v4().to_string();
    let created_at = Utc::now().to_rfc3339();

    let inserted = state
        .db_call(move |db| db.create_user(&user_id, &name, &email, &password_hash, &created_at))
        .await?;
    if !inserted {
        return Err(ApiError::DuplicateEmail);
    }

    Ok((StatusCode::CREATED, Json(MessageResponse::new("Signup successful"))))
}

pub async fn signin(
    State(state): State<AppState>,
    Json(req): Json<SigninRequest>,
) -> ApiResult<Json<AuthResponse>> {
    let email = normalize_email(&req.email);
    let user = state
        .db_call(move |db| db.get_user_by_email(&email))
        .await?
        .ok_or(ApiError::InvalidCredentials)?;

    // Identity-provider accounts have no password to compare against
    let stored = user.password.as_deref().ok_or(ApiError::InvalidCredentials)?;
    verify_password(&req.password, stored)?;

    let token = issue_token(&state, &user)?;
    Ok(Json(AuthResponse {
        message: "Signin successful".into(),
        token,
        user: user_summary(&user),
    }))
}

pub async fn google_auth(
    State(state): State<AppState>,
    Json(req): Json<IdentityAuthRequest>,
) -> ApiResult<Json<AuthResponse>> {
    let identity = state.identity.verify(&req.credential).await.map_err(|e| {
        warn!("Identity token rejected: {:#}", e);
        ApiError::InvalidIdentityToken
    })?;

    let new_id = Uuid::new_v4().to_string();
    let created_at = Utc::now().to_rfc3339();
    let user = state
        .db_call(move |db| {
            db.find_or_create_identity_user(
                &IdentityUser {
                    id: &new_id,
                    name: &identity.name,
                    email: &normalize_email(&identity.email),
                    google_id: &identity.subject,
                    profile_picture: identity.picture.as_deref(),
                },
                &created_at,
            )
        })
        .await?;
    info!("Identity sign-in for user {}", user.id);

    let token = issue_token(&state, &user)?;
    Ok(Json(AuthResponse {
        message: "Google authentication successful".into(),
        token,
        user: user_summary(&user),
    }))
}

pub fn user_summary(user: &UserRow) -> UserSummary {
    UserSummary {
        name: user.name.clone(),
        email: user.email.clone(),
        profile_picture: user.profile_picture.clone().unwrap_or_default(),
    }
}

/// Hash a password with Argon2id.
pub fn hash_password(password: &str) -> ApiResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("password hashing failed: {e}"))?
        .to_string();
    Ok(hash)
}

fn verify_password(password: &str, stored: &str) -> ApiResult<()> {
    let parsed =
        PasswordHash::new(stored).map_err(|e| anyhow::anyhow!("corrupt password hash: {e}"))?;
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .map_err(|_| ApiError::InvalidCredentials)
}

fn issue_token(state: &AppState, user: &UserRow) -> ApiResult<String> {
    let user_id: Uuid = user
        .id
        .parse()
        .map_err(|e| anyhow::anyhow!("corrupt user id {:?}: {e}", user.id))?;
    let token = create_token(
        &state.config.jwt.secret,
        state.config.jwt.ttl_hours,
        user_id,
        &user.name,
    )?;
    Ok(token)
}

pub fn create_token(
    secret: &str,
    ttl_hours: i64,
    user_id: Uuid,
    name: &str,
) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user_id,
        name: name.to_string(),
        exp: (Utc::now() + chrono::Duration::hours(ttl_hours)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::decode_token;

    #[test]
    fn token_roundtrips_identity() {
        let user_id = Uuid::new_v4();
        let token = create_token("secret", 24, user_id, "Ana").unwrap();

        let claims = decode_token("secret", &token).unwrap();
        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.name, "Ana");
        assert!(decode_token("other-secret", &token).is_err());
    }

    #[test]
    fn expired_token_is_rejected() {
        let token = create_token("secret", -1, Uuid::new_v4(), "Ana").unwrap();
        assert!(matches!(decode_token("secret", &token), Err(ApiError::Unauthorized)));
    }

    #[test]
    fn password_hash_verifies_only_the_original() {
        let hash = hash_password("correct horse").unwrap();
        assert!(verify_password("correct horse", &hash).is_ok());
        assert!(matches!(
            verify_password("battery staple", &hash),
            Err(ApiError::InvalidCredentials)
        ));
    }
}
