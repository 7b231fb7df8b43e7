pub mod completions;
pub mod config;
pub mod db;
pub mod error;
pub mod identity;
pub mod models;

pub use completions::{
    create_backend, ChatTurn, CompletionBackend, CompletionError, EchoCompletionBackend,
    GeminiCompletionClient, TokenStream,
};
pub use config::AnteroomConfig;
pub use error::AnteroomError;
pub use identity::{
    create_provider, HttpIdentityProvider, IdentityError, IdentityProvider, MockIdentityProvider,
};
