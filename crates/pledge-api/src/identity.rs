use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow, bail};
use futures_util::future::BoxFuture;
use jsonwebtoken::jwk::{Jwk, JwkSet};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, decode_header};
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, info};

const GOOGLE_CERTS_URL: &str = "https://www.googleapis.com/oauth2/v3/certs";
const GOOGLE_ISSUERS: &[&str] = &["accounts.google.com", "https://accounts.google.com"];
const KEY_CACHE_TTL: Duration = Duration::from_secs(60 * 60);
/// Unknown `kid`s do not trigger a refetch more often than this.
const MIN_REFETCH_INTERVAL: Duration = Duration::from_secs(60);
const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Identity asserted by a verified provider token.
#[derive(Debug, Clone)]
pub struct VerifiedIdentity {
    /// Provider-scoped stable user id (`sub`).
    pub subject: String,
    pub email: String,
    pub name: String,
    pub picture: Option<String>,
}

/// Verifies third-party ID tokens presented to `/api/google-auth`.
pub trait IdentityVerifier: Send + Sync {
    fn verify<'a>(&'a self, credential: &'a str) -> BoxFuture<'a, Result<VerifiedIdentity>>;
}

#[derive(Debug, Deserialize)]
struct GoogleClaims {
    sub: String,
    email: Option<String>,
    name: Option<String>,
    picture: Option<String>,
}

struct CachedKeys {
    fetched_at: Instant,
    keys: JwkSet,
}

#[derive(Debug)]
enum KeyLookup<'a> {
    Found(&'a Jwk),
    /// Fetched too recently to ask again.
    Unknown,
    Refetch,
}

fn lookup_key<'a>(cached: Option<&'a CachedKeys>, kid: &str) -> KeyLookup<'a> {
    let Some(cached) = cached else {
        return KeyLookup::Refetch;
    };
    let age = cached.fetched_at.elapsed();
    match cached.keys.find(kid) {
        Some(jwk) if age < KEY_CACHE_TTL => KeyLookup::Found(jwk),
        None if age < MIN_REFETCH_INTERVAL => KeyLookup::Unknown,
        _ => KeyLookup::Refetch,
    }
}

/// Checks Google ID tokens against Google's published signing keys.
pub struct GoogleVerifier {
    client_id: String,
    http: reqwest::Client,
    keys: RwLock<Option<CachedKeys>>,
}

impl GoogleVerifier {
    pub fn new(client_id: String) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(FETCH_TIMEOUT).build()?;
        Ok(Self {
            client_id,
            http,
            keys: RwLock::new(None),
        })
    }

    async fn decoding_key(&self, kid: &str) -> Result<DecodingKey> {
        {
            let cache = self.keys.read().await;
            match lookup_key(cache.as_ref(), kid) {
                KeyLookup::Found(jwk) => return Ok(DecodingKey::from_jwk(jwk)?),
                KeyLookup::Unknown => bail!("no provider key with kid {kid}"),
                KeyLookup::Refetch => {}
            }
        }

        // Stale cache or a rotated key: refetch once
        let keys = self.fetch_keys().await?;
        let key = keys
            .find(kid)
            .map(DecodingKey::from_jwk)
            .transpose()?
            .ok_or_else(|| anyhow!("no provider key with kid {kid}"));
        *self.keys.write().await = Some(CachedKeys {
            fetched_at: Instant::now(),
            keys,
        });
        key
    }

    async fn fetch_keys(&self) -> Result<JwkSet> {
        debug!("Fetching identity provider keys from {}", GOOGLE_CERTS_URL);
        let keys = self
            .http
            .get(GOOGLE_CERTS_URL)
            .send()
            .await?
            .error_for_status()?
            .json::<JwkSet>()
            .await
            .context("decoding provider key set")?;
        info!("Loaded {} identity provider keys", keys.keys.len());
        Ok(keys)
    }

    async fn verify_token(&self, credential: &str) -> Result<VerifiedIdentity> {
        if self.client_id.is_empty() {
            bail!("identity provider client id is not configured");
        }

        let header = decode_header(credential)?;
        let kid = header.kid.ok_or_else(|| anyhow!("token header has no kid"))?;
        let key = self.decoding_key(&kid).await?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[self.client_id.as_str()]);
        validation.set_issuer(GOOGLE_ISSUERS);

        let claims = decode::<GoogleClaims>(credential, &key, &validation)?.claims;
        identity_from_claims(claims)
    }
}

impl IdentityVerifier for GoogleVerifier {
    fn verify<'a>(&'a self, credential: &'a str) -> BoxFuture<'a, Result<VerifiedIdentity>> {
        Box::pin(self.verify_token(credential))
    }
}

fn identity_from_claims(claims: GoogleClaims) -> Result<VerifiedIdentity> {
    let email = claims
        .email
        .filter(|e| !e.is_empty())
        .ok_or_else(|| anyhow!("token carries no email"))?;
    let name = claims
        .name
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| email.clone());

    Ok(VerifiedIdentity {
        subject: claims.sub,
        email,
        name,
        picture: claims.picture,
    })
}
