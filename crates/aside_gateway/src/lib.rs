//! HTTP control surface for the auto-responder: the DND webhook, the
//! whitelist management endpoints, and read-only status views.

pub mod server;
pub mod types;

pub use server::{AppState, GatewayServer};
