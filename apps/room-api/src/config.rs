/// Deployment environment. Only `Local` and `Dev` expose the debug chat
/// destination that skips persistence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnv {
    Local,
    Dev,
    Production,
}

impl AppEnv {
    fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "local" => Self::Local,
            "dev" | "development" => Self::Dev,
            _ => Self::Production,
        }
    }

    pub fn allows_debug_chat(self) -> bool {
        matches!(self, Self::Local | Self::Dev)
    }
}

/// Room API configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL connection string. Unset means the in-memory directory.
    pub database_url: Option<String>,
    /// Redis connection string. Unset means single-instance presence and broker.
    pub redis_url: Option<String>,
    /// HMAC secret used to verify bearer access tokens.
    pub jwt_secret: String,
    /// Port the HTTP server binds to.
    pub port: u16,
    /// Snowflake worker id; must differ between instances sharing a database.
    pub instance_id: u16,
    pub app_env: AppEnv,
    /// Base URL of the HTTP blob store that receives chat images.
    pub blob_base_url: Option<String>,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Panics with a descriptive message if a required variable is missing.
    pub fn from_env() -> Self {
        Self {
            database_url: optional_var("DATABASE_URL"),
            redis_url: optional_var("REDIS_URL"),
            jwt_secret: required_var("JWT_SECRET"),
            port: std::env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(4100),
            instance_id: std::env::var("INSTANCE_ID")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(0),
            app_env: optional_var("APP_ENV")
                .map(|v| AppEnv::parse(&v))
                .unwrap_or(AppEnv::Production),
            blob_base_url: optional_var("BLOB_BASE_URL"),
        }
    }

    /// Configuration for tests and local runs: in-memory stores, debug chat on.
    pub fn local(jwt_secret: &str) -> Self {
        Self {
            database_url: None,
            redis_url: None,
            jwt_secret: jwt_secret.to_string(),
            port: 0,
            instance_id: 0,
            app_env: AppEnv::Local,
            blob_base_url: None,
        }
    }
}

fn required_var(name: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| panic!("{name} env var is required"))
}

fn optional_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_env_parsing() {
        assert_eq!(AppEnv::parse("LOCAL"), AppEnv::Local);
        assert_eq!(AppEnv::parse("development"), AppEnv::Dev);
        assert_eq!(AppEnv::parse("prod"), AppEnv::Production);
        assert!(AppEnv::Dev.allows_debug_chat());
        assert!(!AppEnv::Production.allows_debug_chat());
    }
}
