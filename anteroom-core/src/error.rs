use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnteroomError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A required secret or setting is missing. Surfaced to clients as a
    /// generic server error, never with detail.
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid credential: {0}")]
    InvalidCredential(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Upstream failure: {0}")]
    Upstream(String),
}
