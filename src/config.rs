// src/config.rs

use std::env;
use std::time::Duration;

use dotenvy::dotenv;

use crate::error::AppError;

/// Lower bound (inclusive) of the six-digit room codes handed out to quizzes.
pub const ROOM_CODE_MIN: u32 = 100_000;
/// Upper bound (exclusive) of generated room codes.
pub const ROOM_CODE_MAX: u32 = 1_000_000;
/// How many random codes are tried before quiz creation gives up.
pub const ROOM_CODE_ATTEMPTS: usize = 16;

const DEFAULT_JWT_EXPIRATION: u64 = 7200;
const DEFAULT_MAX_PARTICIPANTS: u32 = 50;
const DEFAULT_TICK_MILLIS: u64 = 1000;

#[derive(Debug, Clone)]
pub struct Config {
    /// Postgres connection string. When absent the in-memory store is used.
    pub database_url: Option<String>,
    pub jwt_secret: String,
    /// Lifetime of issued participant tokens, in seconds.
    pub jwt_expiration: u64,
    pub rust_log: String,
    pub bind_addr: String,
    /// Capacity applied to quizzes created without an explicit limit.
    pub default_max_participants: u32,
    /// Countdown tick interval. One second in production.
    pub tick_interval: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        dotenv().ok();

        let database_url = env::var("DATABASE_URL").ok().filter(|url| !url.is_empty());

        let jwt_secret = env::var("JWT_SECRET")
            .map_err(|_| AppError::InternalServerError("JWT_SECRET must be set".to_string()))?;

        let jwt_expiration = parse_or("JWT_EXPIRATION", DEFAULT_JWT_EXPIRATION)?;

        let rust_log = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());

        let default_max_participants =
            parse_or("DEFAULT_MAX_PARTICIPANTS", DEFAULT_MAX_PARTICIPANTS)?;

        let tick_millis = parse_or("TIMER_TICK_MILLIS", DEFAULT_TICK_MILLIS)?;

        Ok(Self {
            database_url,
            jwt_secret,
            jwt_expiration,
            rust_log,
            bind_addr,
            default_max_participants,
            tick_interval: Duration::from_millis(tick_millis),
        })
    }

    /// Configuration used by tests: in-memory store, fixed secret.
    pub fn for_tests() -> Self {
        Self {
            database_url: None,
            jwt_secret: "test_secret_for_integration_tests".to_string(),
            jwt_expiration: 600,
            rust_log: "error".to_string(),
            bind_addr: "127.0.0.1:0".to_string(),
            default_max_participants: DEFAULT_MAX_PARTICIPANTS,
            tick_interval: Duration::from_millis(DEFAULT_TICK_MILLIS),
        }
    }
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> Result<T, AppError> {
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| AppError::InternalServerError(format!("{} is not a valid number", key))),
        Err(_) => Ok(default),
    }
}
