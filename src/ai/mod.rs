//! All AI/LLM functionality

pub mod client;
pub mod factory;

// Re-export main types for convenience
pub use client::{ChatTransport, OpenAiClient, RequestOptions};
pub use factory::ClientFactory;
