//! Chat and embedding provider abstraction.
//!
//! Providers are consumed through the narrow [`LlmProvider`] trait: one call
//! to complete a chat exchange and one to embed a batch of texts. Every
//! network call is expected to go through [`retry::with_retry`] so that
//! timeouts and rate limits are handled in one place.

pub mod error;
pub mod http;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod openai;
pub mod provider;
pub mod retry;

pub use error::LlmError;
pub use provider::{LlmProvider, Message, Role};
pub use retry::RetryPolicy;
