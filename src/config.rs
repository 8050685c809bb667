use std::net::SocketAddr;

use anyhow::{bail, Context};

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3000";

/// Process-wide settings, read once at startup and handed to the components
/// that need them.
#[derive(Debug, Clone)]
pub struct Config {
    pub token_secret: String,
    pub database_url: String,
    pub bind_addr: SocketAddr,
    pub secure_cookies: bool,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let token_secret = required(&lookup, "JWT_SECRET")?;
        let database_url = required(&lookup, "DATABASE_URL")?;

        let bind_addr = lookup("BIND_ADDR")
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string())
            .parse::<SocketAddr>()
            .context("`BIND_ADDR` is not a valid socket address")?;

        let secure_cookies = lookup("APP_ENV")
            .map(|env| env.eq_ignore_ascii_case("production"))
            .unwrap_or(false);

        Ok(Self {
            token_secret,
            database_url,
            bind_addr,
            secure_cookies,
        })
    }
}

fn required<F>(lookup: &F, key: &str) -> anyhow::Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(value) if !value.trim().is_empty() => Ok(value),
        Some(_) => bail!("`{}` is set but empty", key),
        None => bail!("`{}` must be set", key),
    }
}
