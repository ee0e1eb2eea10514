// src/config.rs

use std::env;
use std::time::Duration;

use dotenvy::dotenv;
use url::Url;

const DEFAULT_GENERATOR_ENDPOINT: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/gemini-1.5-flash:generateContent";

/// Topic value meaning "every topic of the selected unit".
pub const FULL_UNIT_TOPIC: &str = "Full Unit";

/// Topic label attached to every generated question.
pub const GENERATED_TOPIC: &str = "AI";

/// Length of a session join code.
pub const JOIN_CODE_LENGTH: usize = 6;

/// Settings for the external question generation service.
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    /// `None` disables generation entirely (every request yields zero drafts).
    pub api_key: Option<String>,
    pub endpoint: Url,
    pub timeout: Duration,
}

impl GeneratorConfig {
    pub fn disabled() -> Self {
        Self {
            api_key: None,
            endpoint: default_endpoint(),
            timeout: Duration::from_secs(30),
        }
    }
}

fn default_endpoint() -> Url {
    Url::parse(DEFAULT_GENERATOR_ENDPOINT).expect("default generator endpoint is a valid URL")
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub rust_log: String,
    pub bind_addr: String,
    pub cors_origins: Vec<String>,
    pub generator: GeneratorConfig,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();

        let database_url = env::var("DATABASE_URL")
            .expect("DATABASE_URL must be set");

        let jwt_secret = env::var("JWT_SECRET")
            .expect("JWT_SECRET must be set");

        let rust_log = env::var("RUST_LOG")
            .unwrap_or_else(|_| "info".to_string());

        let bind_addr = env::var("BIND_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:3000".to_string());

        let cors_origins = env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:3000,http://localhost:3001".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let api_key = env::var("GENERATOR_API_KEY")
            .ok()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty());

        let endpoint = env::var("GENERATOR_ENDPOINT")
            .map(|raw| Url::parse(&raw).expect("GENERATOR_ENDPOINT must be a valid URL"))
            .unwrap_or_else(|_| default_endpoint());

        let timeout_secs = env::var("GENERATOR_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(30);

        Self {
            database_url,
            jwt_secret,
            rust_log,
            bind_addr,
            cors_origins,
            generator: GeneratorConfig {
                api_key,
                endpoint,
                timeout: Duration::from_secs(timeout_secs),
            },
        }
    }
}
