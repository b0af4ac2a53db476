//! Chat model client for fixloop.
//!
//! Provides the conversation wire types, the `ProviderAdapter` trait,
//! `LlmClient` with a middleware chain, and an OpenAI chat-completions adapter.

mod client;
mod openai;
mod provider;
mod types;

pub use client::*;
pub use openai::OpenAiAdapter;
pub use provider::*;
pub use types::*;
