//! Text generator trait for prompting a language model.

use async_trait::async_trait;

use crate::error::Result;

/// A language model that turns a fully rendered prompt into an answer.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generate a completion for `prompt`.
    async fn generate(&self, prompt: &str) -> Result<String>;
}
