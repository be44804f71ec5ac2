//! neuroscreen-providers: LLM provider integrations.
//!
//! Implements the `LlmProvider` trait for Anthropic, OpenAI, and Ollama so
//! assessment questions can be generated by any of these backends, and
//! loads the `neuroscreen.toml` configuration.

pub mod anthropic;
pub mod config;
pub mod error;
pub mod mock;
pub mod ollama;
pub mod openai;

pub use config::{create_provider, load_config, NeuroscreenConfig, ProviderConfig};
pub use error::ProviderError;
