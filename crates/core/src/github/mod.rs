//! GitHub integration: REST client, webhook payloads and signatures.

pub mod client;
pub mod payload;
pub mod signature;

pub use client::{GitHubClient, Hook};
pub use payload::{PushCommit, PushPayload};
pub use signature::verify_signature;
