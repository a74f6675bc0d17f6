use dealchat_core::rating::RatingMode;

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
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// How long shutdown waits for the database pool to drain (default: `30`).
    pub shutdown_timeout_secs: u64,
    /// Who may rate a conversation (default: participants only).
    pub rating_mode: RatingMode,
    /// Blob-store settings for chat attachments.
    pub attachments: AttachmentConfig,
}

/// Where uploaded attachments are stored and how they are addressed.
#[derive(Debug, Clone)]
pub struct AttachmentConfig {
    pub bucket: String,
    pub key_prefix: String,
    /// Base URL objects are served from. `None` means the bucket's
    /// virtual-hosted S3 URL.
    pub public_base_url: Option<String>,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                      | Default                  |
    /// |------------------------------|--------------------------|
    /// | `HOST`                       | `0.0.0.0`                |
    /// | `PORT`                       | `3000`                   |
    /// | `CORS_ORIGINS`               | `http://localhost:5173`  |
    /// | `REQUEST_TIMEOUT_SECS`       | `30`                     |
    /// | `SHUTDOWN_TIMEOUT_SECS`      | `30`                     |
    /// | `CHAT_RATING_MODE`           | `participants`           |
    /// | `ATTACHMENT_BUCKET`          | `dealchat-attachments`   |
    /// | `ATTACHMENT_KEY_PREFIX`      | `chat-attachments`       |
    /// | `ATTACHMENT_PUBLIC_BASE_URL` | unset                    |
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "3000".into())
            .parse()
            .expect("PORT must be a valid u16");

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

        let rating_mode = std::env::var("CHAT_RATING_MODE")
            .ok()
            .map(|v| {
                RatingMode::parse(&v)
                    .expect("CHAT_RATING_MODE must be `participants` or `open`")
            })
            .unwrap_or_default();

        let attachments = AttachmentConfig {
            bucket: std::env::var("ATTACHMENT_BUCKET")
                .unwrap_or_else(|_| "dealchat-attachments".into()),
            key_prefix: std::env::var("ATTACHMENT_KEY_PREFIX")
                .unwrap_or_else(|_| "chat-attachments".into()),
            public_base_url: std::env::var("ATTACHMENT_PUBLIC_BASE_URL")
                .ok()
                .map(|url| url.trim_end_matches('/').to_string())
                .filter(|url| !url.is_empty()),
        };

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            shutdown_timeout_secs,
            rating_mode,
            attachments,
        }
    }
}
