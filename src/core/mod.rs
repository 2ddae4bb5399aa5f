pub mod conversation;
pub mod error;
