use std::env;
use std::net::{IpAddr, SocketAddr};
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result, bail};
use tracing::info;

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &["change-me-to-a-random-string", "dev-secret-change-me"];

/// Runtime configuration, read from `PLEDGE_*` environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub jwt: JwtConfig,
    /// Origin allowed by CORS; `*` allows any origin without credentials.
    pub allowed_origin: String,
    /// Externally visible base URL, used to build links to uploaded files.
    pub public_url: String,
    pub upload_dir: PathBuf,
    /// Audience expected in identity-provider tokens. Empty disables that sign-in path.
    pub google_client_id: String,
    pub max_body_bytes: usize,
}

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: String,
    pub ttl_hours: i64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();

        let secret = env::var("PLEDGE_JWT_SECRET").unwrap_or_default();
        if secret.is_empty() || PLACEHOLDER_SECRETS.contains(&secret.as_str()) {
            bail!("PLEDGE_JWT_SECRET is unset or still a placeholder");
        }

        Ok(Self {
            host: load("PLEDGE_HOST", "0.0.0.0")?,
            port: load("PLEDGE_PORT", "5000")?,
            db_path: load("PLEDGE_DB_PATH", "pledge.db")?,
            jwt: JwtConfig {
                secret,
                ttl_hours: load("PLEDGE_JWT_TTL_HOURS", "24")?,
            },
            allowed_origin: load("PLEDGE_ALLOWED_ORIGIN", "http://localhost:5173")?,
            public_url: load("PLEDGE_PUBLIC_URL", "http://localhost:5000")?,
            upload_dir: load("PLEDGE_UPLOAD_DIR", "./uploads")?,
            google_client_id: env::var("PLEDGE_GOOGLE_CLIENT_ID").unwrap_or_default(),
            max_body_bytes: load("PLEDGE_MAX_BODY_BYTES", "10485760")?,
        })
    }

    /// Address to bind. Accepts IPv4 and IPv6 hosts alike.
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        let ip: IpAddr = parse_value("PLEDGE_HOST", &self.host)?;
        Ok(SocketAddr::new(ip, self.port))
    }

    /// Public link for a file stored in the upload directory.
    pub fn upload_url(&self, file_name: &str) -> String {
        format!("{}/uploads/{}", self.public_url.trim_end_matches('/'), file_name)
    }
}

fn load<T>(key: &str, default: &str) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    let raw = env::var(key).unwrap_or_else(|_| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    });
    parse_value(key, &raw)
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    raw.trim()
        .parse()
        .map_err(|e: T::Err| anyhow::anyhow!("{e}"))
        .with_context(|| format!("invalid {key} value {raw:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_value_reports_the_key() {
        assert_eq!(parse_value::<u16>("PLEDGE_PORT", " 8080 ").unwrap(), 8080);

        let err = parse_value::<u16>("PLEDGE_PORT", "eighty").unwrap_err();
        assert!(format!("{err:#}").contains("PLEDGE_PORT"));
    }

    fn config(host: &str) -> Config {
        Config {
            host: host.into(),
            port: 5000,
            db_path: "pledge.db".into(),
            jwt: JwtConfig {
                secret: "s".into(),
                ttl_hours: 24,
            },
            allowed_origin: "*".into(),
            public_url: "https://api.example.org/".into(),
            upload_dir: "./uploads".into(),
            google_client_id: String::new(),
            max_body_bytes: 1024,
        }
    }

    #[test]
    fn upload_url_joins_without_double_slash() {
        assert_eq!(
            config("0.0.0.0").upload_url("a.png"),
            "https://api.example.org/uploads/a.png"
        );
    }

    #[test]
    fn socket_addr_handles_ipv6_hosts() {
        assert_eq!(config("::").socket_addr().unwrap().to_string(), "[::]:5000");
        assert_eq!(
            config("127.0.0.1").socket_addr().unwrap().to_string(),
            "127.0.0.1:5000"
        );
        assert!(config("localhost").socket_addr().is_err());
    }
}
