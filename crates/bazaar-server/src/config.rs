//! Server configuration loaded from environment variables.
//!
//! Everything except the token secret has a default suitable for local
//! development.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Result, bail};
use bazaar_gateway::connection::DEFAULT_HEARTBEAT;

/// Secrets copied from sample `.env` files. Refused at startup.
const PLACEHOLDER_SECRETS: &[&str] = &["change-me-to-a-random-string", "dev-secret-change-me"];

#[derive(Debug, Clone)]
pub struct Config {
    /// Env: `BAZAAR_HOST` + `BAZAAR_PORT`. Default: `0.0.0.0:3000`
    pub addr: SocketAddr,

    /// Env: `BAZAAR_DB_PATH`. Default: `bazaar.db`
    pub db_path: PathBuf,

    /// Shared HS256 secret of the auth service.
    /// Env: `BAZAAR_JWT_SECRET` (required)
    pub jwt_secret: String,

    /// Read-only SQLite connections next to the writer.
    /// Env: `BAZAAR_READER_POOL`. Default: `4`
    pub reader_pool: usize,

    /// Env: `BAZAAR_HEARTBEAT_SECS`. Default: `15`
    pub heartbeat: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Unparseable optional values fall back to
    /// their defaults with a warning; a missing or placeholder secret is fatal.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let jwt_secret = lookup("BAZAAR_JWT_SECRET").unwrap_or_default();
        if jwt_secret.trim().is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("BAZAAR_JWT_SECRET is unset or still a placeholder; it must match the auth service's secret");
        }

        let host = lookup("BAZAAR_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port: u16 = parse_or("BAZAAR_PORT", lookup("BAZAAR_PORT"), 3000);
        let addr = match format!("{}:{}", host, port).parse::<SocketAddr>() {
            Ok(addr) => addr,
            Err(_) => {
                tracing::warn!(value = %host, "Invalid BAZAAR_HOST, using 0.0.0.0");
                SocketAddr::from(([0, 0, 0, 0], port))
            }
        };

        let db_path = lookup("BAZAAR_DB_PATH").unwrap_or_else(|| "bazaar.db".into()).into();
        let reader_pool = parse_or("BAZAAR_READER_POOL", lookup("BAZAAR_READER_POOL"), 4usize).max(1);
        let heartbeat_secs = parse_or(
            "BAZAAR_HEARTBEAT_SECS",
            lookup("BAZAAR_HEARTBEAT_SECS"),
            DEFAULT_HEARTBEAT.as_secs(),
        )
        .max(1);

        Ok(Self {
            addr,
            db_path,
            jwt_secret,
            reader_pool,
            heartbeat: Duration::from_secs(heartbeat_secs),
        })
    }
}

fn parse_or<T: std::str::FromStr + Copy>(key: &str, raw: Option<String>, default: T) -> T {
    match raw {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, "Invalid value, using default");
            default
        }),
    }
}
