use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};

/// Secrets that ship in docs and sample env files.
const PLACEHOLDER_SECRETS: &[&str] = &["dev-secret-change-me", "change-me", "secret", "your-secret-here"];

#[derive(Debug, Clone)]
pub struct Config {
    pub jwt_secret: String,
    pub db_path: PathBuf,
    pub host: String,
    pub port: u16,
    pub token_ttl_hours: i64,
    pub history_limit: u32,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let jwt_secret = lookup("HUDDLE_JWT_SECRET")
            .filter(|s| !s.trim().is_empty())
            .context("HUDDLE_JWT_SECRET must be set")?;
        if PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("HUDDLE_JWT_SECRET is a placeholder value; set a real secret");
        }

        let db_path = PathBuf::from(lookup("HUDDLE_DB_PATH").unwrap_or_else(|| "huddle.db".into()));
        let host = lookup("HUDDLE_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port = parse_or(&lookup, "HUDDLE_PORT", 3001)?;
        let token_ttl_hours: i64 = parse_or(&lookup, "HUDDLE_TOKEN_TTL_HOURS", 12)?;
        if token_ttl_hours <= 0 {
            bail!("HUDDLE_TOKEN_TTL_HOURS must be positive");
        }
        let history_limit = parse_or(&lookup, "HUDDLE_HISTORY_LIMIT", 50)?;

        Ok(Self {
            jwt_secret,
            db_path,
            host,
            port,
            token_ttl_hours,
            history_limit,
        })
    }

    pub fn addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("Invalid listen address {}:{}", self.host, self.port))
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid {} '{}': {}", key, raw, e)),
        None => Ok(default),
    }
}
