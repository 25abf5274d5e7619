use std::{fmt, str::FromStr};

use anyhow::Context;
use sqlx::postgres::PgConnectOptions;

/// Upper bound for `JWT_TTL_MINUTES` (30 days).
pub const MAX_JWT_TTL_MINUTES: u32 = 60 * 24 * 30;

#[derive(Clone)]
pub struct JwtConfig {
    pub secret: String,
    pub ttl_minutes: u32,
}

impl fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtConfig")
            .field("secret", &"<redacted>")
            .field("ttl_minutes", &self.ttl_minutes)
            .finish()
    }
}

/// Where the Postgres connection comes from: a full URL, or the individual
/// `DB_*` parts.
#[derive(Clone)]
pub enum DatabaseConfig {
    Url(String),
    Parts {
        user: String,
        password: Option<String>,
        host: String,
        port: u16,
        name: String,
    },
}

impl DatabaseConfig {
    pub fn connect_options(&self) -> anyhow::Result<PgConnectOptions> {
        match self {
            DatabaseConfig::Url(url) => {
                PgConnectOptions::from_str(url).context("parse DATABASE_URL")
            }
            DatabaseConfig::Parts {
                user,
                password,
                host,
                port,
                name,
            } => {
                let opts = PgConnectOptions::new()
                    .host(host)
                    .port(*port)
                    .username(user)
                    .database(name);
                Ok(match password {
                    Some(p) => opts.password(p),
                    None => opts,
                })
            }
        }
    }
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatabaseConfig::Url(_) => f.write_str("DatabaseConfig::Url(<redacted>)"),
            DatabaseConfig::Parts {
                user,
                host,
                port,
                name,
                ..
            } => f
                .debug_struct("DatabaseConfig::Parts")
                .field("user", user)
                .field("host", host)
                .field("port", port)
                .field("name", name)
                .finish(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database: DatabaseConfig,
    pub max_connections: u32,
    pub jwt: JwtConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup; `from_env` passes the process
    /// environment.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let host = var("APP_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port: u16 = match var("APP_PORT") {
            Some(p) => p.parse().context("APP_PORT must be a port number")?,
            None => 8080,
        };

        let database = match var("DATABASE_URL") {
            Some(url) => DatabaseConfig::Url(url),
            None => DatabaseConfig::Parts {
                user: var("DB_USER").unwrap_or_else(|| "postgres".into()),
                password: var("DB_PASSWORD"),
                host: var("DB_HOST").unwrap_or_else(|| "localhost".into()),
                port: match var("DB_PORT") {
                    Some(p) => p.parse().context("DB_PORT must be a port number")?,
                    None => 5432,
                },
                name: var("DB_NAME").unwrap_or_else(|| "my_fitness_app".into()),
            },
        };

        let max_connections: u32 = match var("DB_MAX_CONNECTIONS") {
            Some(v) => v
                .parse()
                .context("DB_MAX_CONNECTIONS must be a positive integer")?,
            None => 10,
        };
        anyhow::ensure!(max_connections > 0, "DB_MAX_CONNECTIONS must be at least 1");

        let ttl_minutes: u32 = match var("JWT_TTL_MINUTES") {
            Some(v) => v
                .parse()
                .context("JWT_TTL_MINUTES must be a positive integer")?,
            None => 15,
        };
        anyhow::ensure!(
            (1..=MAX_JWT_TTL_MINUTES).contains(&ttl_minutes),
            "JWT_TTL_MINUTES must be between 1 and {MAX_JWT_TTL_MINUTES}"
        );

        let jwt = JwtConfig {
            secret: var("JWT_SECRET_KEY").context("JWT_SECRET_KEY must be set")?,
            ttl_minutes,
        };

        Ok(Self {
            host,
            port,
            database,
            max_connections,
            jwt,
        })
    }
}
