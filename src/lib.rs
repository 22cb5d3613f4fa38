pub mod comments;
pub mod config;
pub mod identity;
pub mod notifications;
pub mod shared;
pub mod tests;
pub mod tickets;
