//! REST API endpoint modules.

pub mod identity;
pub mod manage;
pub mod status;
pub mod webhooks;
