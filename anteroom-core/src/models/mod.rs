pub mod conversation;
pub mod message;
pub mod session;
pub mod user;

pub use conversation::Conversation;
pub use message::Message;
pub use session::ProviderSession;
pub use user::AuthUser;
