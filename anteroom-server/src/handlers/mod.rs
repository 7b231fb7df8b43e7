pub mod access;
pub mod callback;
pub mod chat;
pub mod conversations;
pub mod pages;
pub mod session;
