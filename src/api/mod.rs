//! API module
//!
//! This module provides the HTTP surface of the tasker service: the axum
//! server and a matching reqwest client.

pub mod client;
pub mod server;

// Re-export commonly used types
pub use client::{Client, ClientConfig, ClientError};
pub use server::{router, serve, ServerConfig, TreeEdgeRequest};
