//! Rust adapter for OpenAI-compatible chat completion endpoints.
//!
//! This crate sends chat completion requests over HTTP, forces a single
//! function call when asked to, and classifies failures into network,
//! authentication, throttling and API errors.

/// HTTP client for the `/chat/completions` endpoint.
pub mod client;
/// Error types returned by adapter operations.
pub mod error;
/// Request and response wire types.
pub mod types;

pub use client::OpenAiClient;
pub use error::OpenAiError;
pub use types::*;
