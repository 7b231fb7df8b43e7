use config::{Config, ConfigError, File};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct AnteroomConfig {
    pub service: ServiceConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub access: AccessConfig,
    pub auth: AuthConfig,
    pub completion: CompletionConfig,
    #[serde(default)]
    pub http: HttpConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServiceConfig {
    pub environment: String,
    pub log_level: String,
}

impl ServiceConfig {
    /// Local/dev deployments skip the Secure cookie flag and same-origin
    /// redirect shortcuts; everything else is treated as deployed.
    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AccessConfig {
    /// Shared access code. Empty means unconfigured — the gate refuses
    /// every submission with a server error until it is set.
    pub code: String,
    pub token_ttl_seconds: u64,
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            code: String::new(),
            token_ttl_seconds: 600,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    /// "http" for a real identity provider, "mock" for local development.
    pub mode: String,
    pub base_url: String,
    #[serde(default)]
    pub client_key: String,
    /// Code accepted by the mock provider.
    #[serde(default = "default_mock_code")]
    pub mock_code: String,
    pub access_ttl_seconds: u64,
    pub refresh_ttl_seconds: u64,
}

fn default_mock_code() -> String {
    "dev-code".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct CompletionConfig {
    /// "gemini" or "echo".
    pub backend: String,
    pub model: String,
    #[serde(default)]
    pub api_key: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8780,
        }
    }
}

impl AnteroomConfig {
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name(path))
            .build()?;
        let mut cfg: Self = s.try_deserialize()?;
        cfg.apply_env_overrides();
        Ok(cfg)
    }

    /// Secrets come from the environment in real deployments; the TOML
    /// values are a dev convenience.
    fn apply_env_overrides(&mut self) {
        if let Ok(value) = std::env::var("ACCESS_CODE") {
            self.access.code = value;
        }
        if let Ok(value) = std::env::var("AUTH_CLIENT_KEY") {
            self.auth.client_key = value;
        }
        if let Ok(value) = std::env::var("GOOGLE_API_KEY") {
            self.completion.api_key = value;
        }
        if let Ok(value) = std::env::var("DATABASE_URL") {
            self.database.url = value;
        }
    }
}
