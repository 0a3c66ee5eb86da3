/// Server configuration loaded from environment variables.
///
/// All fields have sensible defaults suitable for local development.
/// In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Base URL of the external transfer engine.
    pub engine_url: String,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Graceful shutdown timeout in seconds (default: `30`).
    pub shutdown_timeout_secs: u64,
    /// Topic whitelist reload period in seconds (default: `60`).
    pub topic_reload_secs: u64,
    /// Pause between consumer registration retries (default: `3`).
    pub consumer_retry_backoff_secs: u64,
    /// Registration retry cap. Unset means retry indefinitely.
    pub consumer_retry_max_attempts: Option<u32>,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                       | Default                  |
    /// |-------------------------------|--------------------------|
    /// | `HOST`                        | `0.0.0.0`                |
    /// | `PORT`                        | `3000`                   |
    /// | `ENGINE_URL`                  | `http://localhost:8081`  |
    /// | `CORS_ORIGINS`                | `http://localhost:5173`  |
    /// | `REQUEST_TIMEOUT_SECS`        | `30`                     |
    /// | `SHUTDOWN_TIMEOUT_SECS`       | `30`                     |
    /// | `TOPIC_RELOAD_SECS`           | `60`                     |
    /// | `CONSUMER_RETRY_BACKOFF_SECS` | `3`                      |
    /// | `CONSUMER_RETRY_MAX_ATTEMPTS` | unset (unbounded)        |
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "3000".into())
            .parse()
            .expect("PORT must be a valid u16");

        let engine_url =
            std::env::var("ENGINE_URL").unwrap_or_else(|_| "http://localhost:8081".into());

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs: u64 = std::env::var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("REQUEST_TIMEOUT_SECS must be a valid u64");

        let shutdown_timeout_secs: u64 = std::env::var("SHUTDOWN_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("SHUTDOWN_TIMEOUT_SECS must be a valid u64");

        let topic_reload_secs: u64 = std::env::var("TOPIC_RELOAD_SECS")
            .unwrap_or_else(|_| "60".into())
            .parse()
            .expect("TOPIC_RELOAD_SECS must be a valid u64");

        let consumer_retry_backoff_secs: u64 = std::env::var("CONSUMER_RETRY_BACKOFF_SECS")
            .unwrap_or_else(|_| "3".into())
            .parse()
            .expect("CONSUMER_RETRY_BACKOFF_SECS must be a valid u64");

        let consumer_retry_max_attempts: Option<u32> = std::env::var("CONSUMER_RETRY_MAX_ATTEMPTS")
            .ok()
            .map(|v| {
                v.parse()
                    .expect("CONSUMER_RETRY_MAX_ATTEMPTS must be a valid u32")
            });

        Self {
            host,
            port,
            engine_url,
            cors_origins,
            request_timeout_secs,
            shutdown_timeout_secs,
            topic_reload_secs,
            consumer_retry_backoff_secs,
            consumer_retry_max_attempts,
        }
    }
}
