use crate::core::error::ShuperError;
use crate::core::types::{Attachment, ChatTurn};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

pub mod base_client;
pub mod factory;
pub mod gemini;
pub mod openai_compatible;
pub mod registry;
pub mod stream;

pub use factory::ProviderFactory;
pub use registry::{ProviderDescriptor, ProviderFamily, ProviderRegistry};
pub use stream::{STOPPED_BY_USER, StreamAccumulator, StreamOutcome, UpdateFn};

/// Sampling/reasoning knobs; each family reads the field it understands.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReasoningConfig {
    /// Gemini `thinkingConfig.thinkingBudget`; `Some(0)` disables thinking.
    pub thinking_budget: Option<u32>,
    /// OpenAI-style `reasoning_effort`.
    pub effort: Option<String>,
}

/// Everything one provider call needs. Created per send and dropped afterwards.
#[derive(Debug, Clone)]
pub struct DispatchRequest {
    pub descriptor: ProviderDescriptor,
    pub system_instruction: String,
    /// Prior turns, oldest first.
    pub history: Vec<ChatTurn>,
    pub user_text: String,
    pub attachments: Vec<Attachment>,
    pub reasoning: ReasoningConfig,
    pub cancel: CancellationToken,
}

#[async_trait]
pub trait ChatProvider: Send + Sync {
    fn family(&self) -> ProviderFamily;

    /// Sends the request and streams the reply into `on_update`.
    async fn stream_chat(
        &self,
        request: &DispatchRequest,
        on_update: &mut UpdateFn<'_>,
    ) -> Result<StreamOutcome, ShuperError>;
}
