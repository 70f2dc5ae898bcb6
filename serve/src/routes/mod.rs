pub mod chat;
pub mod health;
pub mod models;
pub mod sessions;
pub mod stats;
pub mod webhooks;
