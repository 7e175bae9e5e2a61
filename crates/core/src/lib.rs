//! docsync core library.
//!
//! This crate provides the foundational components for keeping generated
//! documentation in step with GitHub repositories: configuration, database
//! persistence, the GitHub client and webhook signature verification, the
//! push event processor and per-file sync worker, and the webhook
//! registration lifecycle.

pub mod artifacts;
pub mod config;
pub mod db;
pub mod docgen;
pub mod errors;
pub mod file_policy;
pub mod github;
pub mod lifecycle;
pub mod models;
pub mod recorder;
pub mod sync;

// Re-exports for convenience.
pub use config::AppConfig;
pub use db::Database;
pub use lifecycle::WebhookLifecycle;
pub use sync::{PushProcessor, WebhookIngestor};
