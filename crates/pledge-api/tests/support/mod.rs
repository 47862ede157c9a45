#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::anyhow;
use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use futures_util::future::BoxFuture;
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;
use uuid::Uuid;

use pledge_api::build_router;
use pledge_api::config::{Config, JwtConfig};
use pledge_api::identity::{IdentityVerifier, VerifiedIdentity};
use pledge_api::state::{AppState, AppStateInner};
use pledge_db::Database;

pub const SECRET: &str = "test-secret";
const BOUNDARY: &str = "pledge-test-boundary";

/// Accepts exactly one credential string.
pub struct FakeVerifier;

impl IdentityVerifier for FakeVerifier {
    fn verify<'a>(&'a self, credential: &'a str) -> BoxFuture<'a, anyhow::Result<VerifiedIdentity>> {
        Box::pin(async move {
            if credential != "valid-google-token" {
                return Err(anyhow!("bad signature"));
            }
            Ok(VerifiedIdentity {
                subject: "google-sub-1".into(),
                email: "gina@example.com".into(),
                name: "Gina".into(),
                picture: Some("https://pics.example.com/gina.png".into()),
            })
        })
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    upload_dir: PathBuf,
}

impl Drop for TestApp {
    fn drop(&mut self) {
        std::fs::remove_dir_all(&self.upload_dir).ok();
    }
}

impl TestApp {
    pub fn new() -> Self {
        let upload_dir = std::env::temp_dir().join(format!("pledge-test-{}", Uuid::new_v4()));
        let config = Config {
            host: "127.0.0.1".into(),
            port: 0,
            db_path: ":memory:".into(),
            jwt: JwtConfig {
                secret: SECRET.into(),
                ttl_hours: 24,
            },
            allowed_origin: "http://localhost:5173".into(),
            public_url: "http://api.test".into(),
            upload_dir: upload_dir.clone(),
            google_client_id: "client-id".into(),
            max_body_bytes: 1024 * 1024,
        };
        let state = AppStateInner::new(
            Database::open_in_memory().unwrap(),
            config,
            Arc::new(FakeVerifier),
        );
        Self {
            router: build_router(state.clone()),
            state,
            upload_dir,
        }
    }

    /// Serve the router on an ephemeral local port.
    pub async fn serve(&self) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let router = self.router.clone();
        tokio::spawn(async move {
            axum::serve(listener, router).await.ok();
        });
        addr
    }

    pub async fn send(&self, req: Request<Body>) -> (StatusCode, Value) {
        let resp = self.router.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    pub async fn json(&self, method: Method, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        let mut req = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            req = req.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        self.send(req.body(Body::from(body.to_string())).unwrap()).await
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        let mut req = Request::builder().uri(uri);
        if let Some(token) = token {
            req = req.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        self.send(req.body(Body::empty()).unwrap()).await
    }

    pub async fn multipart(
        &self,
        method: Method,
        uri: &str,
        token: &str,
        fields: &[(&str, &str)],
        file: Option<(&str, &str, &[u8])>,
    ) -> (StatusCode, Value) {
        let req = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(multipart_body(fields, file)))
            .unwrap();
        self.send(req).await
    }

    /// Sign up and sign in; returns the bearer token.
    pub async fn register(&self, name: &str, email: &str) -> String {
        let (status, _) = self
            .json(
                Method::POST,
                "/api/signup",
                None,
                json!({ "name": name, "email": email, "password": "hunter22" }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) = self
            .json(
                Method::POST,
                "/api/signin",
                None,
                json!({ "email": email, "password": "hunter22" }),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        body["token"].as_str().unwrap().to_string()
    }

    pub async fn create_campaign(&self, token: &str, title: &str) -> String {
        let (status, body) = self
            .multipart(
                Method::POST,
                "/api/campaigns",
                token,
                &campaign_fields(title),
                Some(("poster", "poster.png", b"\x89PNG fake")),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["id"].as_str().unwrap().to_string()
    }
}

pub fn campaign_fields(title: &str) -> Vec<(&str, &str)> {
    vec![
        ("title", title),
        ("description", "Help us build it"),
        ("goal", "1500"),
        ("deadline", "2099-12-31"),
    ]
}

fn multipart_body(fields: &[(&str, &str)], file: Option<(&str, &str, &[u8])>) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    if let Some((name, file_name, bytes)) = file {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}
