//! Text-generation backends.
//!
//! The pipeline only sees [`GenerationGateway`]: one prompt in, one block of
//! raw text (or a [`GatewayError`]) out. Authentication, model choice and wire
//! format live behind the trait.

mod openrouter;
mod retry;

use std::sync::Arc;

use async_trait::async_trait;

pub use narrascript_shared::GatewayError;
pub use openrouter::{GatewayConfig, OpenRouterGateway};
pub use retry::RetryingGateway;

/// A backend that turns a prompt into text.
#[async_trait]
pub trait GenerationGateway: Send + Sync {
    /// Send one prompt and return the raw (unsanitized) reply.
    async fn generate(&self, prompt: &str) -> Result<String, GatewayError>;
}

#[async_trait]
impl GenerationGateway for Arc<dyn GenerationGateway> {
    async fn generate(&self, prompt: &str) -> Result<String, GatewayError> {
        (**self).generate(prompt).await
    }
}

#[async_trait]
impl GenerationGateway for Box<dyn GenerationGateway> {
    async fn generate(&self, prompt: &str) -> Result<String, GatewayError> {
        (**self).generate(prompt).await
    }
}
