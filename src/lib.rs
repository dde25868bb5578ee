pub mod auth;
pub mod conversation;
pub mod error;
#[cfg(feature = "sqlite-store")]
pub mod migrate;
pub mod models;
pub mod openapi;
pub mod rate_limit;
pub mod repo;
pub mod routes;
pub mod security;
pub mod topics;

// Re-export commonly used items for tests / external users
pub use routes::{config, AppState};
pub use security::SecurityHeaders;
