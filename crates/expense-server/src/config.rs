use std::env;

use anyhow::Context;

const DEFAULT_SESSION_SECRET: &str = "change-me-to-a-random-32-char-string";

#[derive(Debug, Clone)]
pub struct Config {
    pub server_port: u16,
    pub sqlite_path: String,
    pub session_secret: String,
    pub session_ttl_minutes: i64,
    pub cors_origins: Vec<String>,
    pub secure_cookies: bool,
    pub auth_rate_limit: bool,
    pub admin: Option<AdminSeed>,
}

/// Credentials for the admin account created at startup.
#[derive(Debug, Clone)]
pub struct AdminSeed {
    pub name: String,
    pub email: String,
    pub password: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let session_secret = env::var("SESSION_SECRET").unwrap_or_else(|_| {
            tracing::warn!("SESSION_SECRET not set, falling back to the development secret");
            DEFAULT_SESSION_SECRET.to_string()
        });

        let admin = match (env::var("ADMIN_EMAIL"), env::var("ADMIN_PASSWORD")) {
            (Ok(email), Ok(password)) => Some(AdminSeed {
                name: env::var("ADMIN_NAME").unwrap_or_else(|_| "Administrator".to_string()),
                email,
                password,
            }),
            _ => None,
        };

        Ok(Self {
            server_port: env::var("PORT")
                .unwrap_or_else(|_| "5000".to_string())
                .parse()
                .context("PORT must be a valid port number")?,
            sqlite_path: env::var("SQLITE_PATH")
                .unwrap_or_else(|_| "./data/expenses.db".to_string()),
            session_secret,
            session_ttl_minutes: env::var("SESSION_TTL_MINUTES")
                .unwrap_or_else(|_| "60".to_string())
                .parse()
                .context("SESSION_TTL_MINUTES must be a whole number of minutes")?,
            cors_origins: env::var("CORS_ORIGINS")
                .unwrap_or_else(|_| "http://localhost:5173,http://localhost:3000".to_string())
                .split(',')
                .map(|origin| origin.trim().to_string())
                .filter(|origin| !origin.is_empty())
                .collect(),
            secure_cookies: flag("SECURE_COOKIES", false),
            auth_rate_limit: flag("AUTH_RATE_LIMIT", true),
            admin,
        })
    }
}

fn flag(name: &str, default: bool) -> bool {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
