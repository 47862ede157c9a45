pub mod auth;
pub mod campaigns;
pub mod config;
pub mod error;
pub mod gateway;
pub mod identity;
pub mod messages;
pub mod middleware;
pub mod profile;
pub mod state;
pub mod uploads;

use axum::{
    Json, Router,
    extract::DefaultBodyLimit,
    http::{HeaderName, HeaderValue, Method, header},
    middleware::from_fn_with_state,
    routing::{get, post, put},
};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::config::Config;
use crate::middleware::require_auth;
use crate::state::AppState;

/// Assemble every route: public auth and listing, bearer-protected
/// profile/campaign/message routes, the chat gateway and static uploads.
pub fn build_router(state: AppState) -> Router {
    let auth_layer = from_fn_with_state(state.clone(), require_auth);

    let protected = Router::new()
        .route("/api/profile", get(profile::get_profile))
        .route("/api/profile/update", put(profile::update_profile))
        .route(
            "/api/campaigns/{id}",
            put(campaigns::update_campaign).delete(campaigns::delete_campaign),
        )
        .route("/api/campaigns/{id}/donate", post(campaigns::donate))
        .route("/api/campaigns/{id}/donations", get(campaigns::list_donations))
        .route(
            "/api/messages",
            get(messages::list_messages).post(messages::create_message),
        )
        .route_layer(auth_layer.clone());

    let public = Router::new()
        .route("/api/signup", post(auth::signup))
        .route("/api/signin", post(auth::signin))
        .route("/api/google-auth", post(auth::google_auth))
        // Listing is public, creating is not
        .route(
            "/api/campaigns",
            get(campaigns::list_campaigns)
                .merge(post(campaigns::create_campaign).route_layer(auth_layer)),
        )
        .route("/gateway", get(gateway::ws_upgrade))
        .route("/health", get(health));

    public
        .merge(protected)
        .nest_service("/uploads", ServeDir::new(&state.config.upload_dir))
        .layer(DefaultBodyLimit::max(state.config.max_body_bytes))
        .layer(SetResponseHeaderLayer::overriding(
            HeaderName::from_static("cross-origin-opener-policy"),
            HeaderValue::from_static("same-origin-allow-popups"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            HeaderName::from_static("cross-origin-embedder-policy"),
            HeaderValue::from_static("require-corp"),
        ))
        .layer(cors_layer(&state.config))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

fn cors_layer(config: &Config) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    if config.allowed_origin == "*" {
        return base.allow_origin(AllowOrigin::any());
    }

    match HeaderValue::from_str(&config.allowed_origin) {
        Ok(origin) => base
            .allow_origin(AllowOrigin::exact(origin))
            .allow_credentials(true),
        Err(e) => {
            warn!(
                "Invalid allowed origin {:?} ({}), allowing any origin without credentials",
                config.allowed_origin, e
            );
            base.allow_origin(AllowOrigin::any())
        }
    }
}
