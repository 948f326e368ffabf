pub mod credential;
pub mod handlers;
pub mod session;
