use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::env;
use url::Url;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub security: SecurityConfig,
    pub resolver: ResolverConfig,
    pub oauth: OAuthConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    pub secret_key: String,
    pub jwt_expiry: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Ceiling on simultaneously open render sessions; requests beyond it
    /// queue FIFO.
    pub max_concurrent_sessions: usize,
    /// Seconds to wait for navigation to settle.
    pub navigation_timeout: u64,
    /// Milliseconds for a single wait-for-selector precondition.
    pub selector_timeout_ms: u64,
    /// Seconds for a whole resolution before it is abandoned.
    pub resolution_timeout: u64,
    pub user_agent: String,
    pub chrome_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthConfig {
    pub google_client_id: Option<String>,
    pub google_client_secret: Option<String>,
    /// Callback this service registered with Google.
    pub redirect_uri: String,
    /// Frontend URL the callback redirects to, with `?token=` appended.
    pub post_login_redirect: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            // Start with default configuration
            .add_source(File::with_name("config/default"))
            // Add environment-specific config
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Add local config (ignored by git)
            .add_source(File::with_name("config/local").required(false))
            // Add environment variables with prefix "VITRINE_"
            .add_source(Environment::with_prefix("VITRINE").separator("__"))
            .build()?;

        let mut config: AppConfig = s.try_deserialize()?;

        // Add Chrome path from environment if not set
        if config.resolver.chrome_path.is_none() {
            config.resolver.chrome_path = env::var("CHROME_PATH").ok();
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Message(
                "Server port must be greater than 0".into(),
            ));
        }

        if Url::parse(&self.server.base_url).is_err() {
            return Err(ConfigError::Message("Invalid base URL format".into()));
        }

        if self.database.max_connections == 0 {
            return Err(ConfigError::Message(
                "Database max_connections must be greater than 0".into(),
            ));
        }

        if self.database.min_connections > self.database.max_connections {
            return Err(ConfigError::Message(
                "Database min_connections cannot exceed max_connections".into(),
            ));
        }

        if self.security.secret_key.len() < 32 {
            return Err(ConfigError::Message(
                "Security secret_key must be at least 32 characters".into(),
            ));
        }

        if self.security.jwt_expiry == 0 {
            return Err(ConfigError::Message(
                "JWT expiry must be greater than 0".into(),
            ));
        }

        if self.resolver.max_concurrent_sessions == 0 {
            return Err(ConfigError::Message(
                "Resolver max_concurrent_sessions must be greater than 0".into(),
            ));
        }

        if self.resolver.resolution_timeout == 0 {
            return Err(ConfigError::Message(
                "Resolver resolution_timeout must be greater than 0".into(),
            ));
        }

        if Url::parse(&self.oauth.redirect_uri).is_err() {
            return Err(ConfigError::Message(
                "Invalid OAuth redirect_uri format".into(),
            ));
        }

        if Url::parse(&self.oauth.post_login_redirect).is_err() {
            return Err(ConfigError::Message(
                "Invalid OAuth post_login_redirect format".into(),
            ));
        }

        Ok(())
    }
}
