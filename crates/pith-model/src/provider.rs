use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::{CompletionRequest, ResponseEvent};

pub type ResponseStream = Pin<Box<dyn Stream<Item = anyhow::Result<ResponseEvent>> + Send>>;

/// The boundary between the Runtime and a concrete language-model provider.
///
/// Concrete implementations (OpenAI, Anthropic, a local llama.cpp server,
/// ...) are external collaborators; this crate ships only the trait and a
/// [`crate::mock::MockModel`] for tests.
#[async_trait]
pub trait Model: Send + Sync {
    /// Human-readable provider/model name for status display.
    fn name(&self) -> &str;

    /// Send a completion request and return a streaming response.
    ///
    /// Implementations are expected to honour cancellation of the returned
    /// stream (dropping it should stop any in-flight request) so the
    /// Runtime can enforce its per-Model-call timeout by racing the stream
    /// against a deadline.
    async fn complete(&self, req: CompletionRequest) -> anyhow::Result<ResponseStream>;
}
