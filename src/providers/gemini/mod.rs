use crate::core::error::ShuperError;
use crate::providers::stream::{StreamOutcome, UpdateFn};
use crate::providers::registry::AuthScheme;
use crate::providers::{ChatProvider, DispatchRequest, ProviderDescriptor, ProviderFamily};
use async_trait::async_trait;

mod client;
mod types;

pub use client::GeminiClient;

#[derive(Clone, Debug)]
pub struct GeminiProvider {
    client: GeminiClient,
    supports_thinking: bool,
}

impl GeminiProvider {
    pub fn new(descriptor: &ProviderDescriptor, api_key: Option<String>) -> Result<Self, ShuperError> {
        let api_key = api_key
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .ok_or_else(|| ShuperError::MissingCredential("Gemini".to_string()))?;

        let key_param = match descriptor.auth {
            AuthScheme::QueryParam(name) => name,
            AuthScheme::Bearer => "key",
        };

        Ok(Self {
            client: GeminiClient::new(descriptor.endpoint.clone(), key_param, api_key),
            supports_thinking: descriptor.supports_reasoning_budget,
        })
    }
}

#[async_trait]
impl ChatProvider for GeminiProvider {
    fn family(&self) -> ProviderFamily {
        ProviderFamily::Gemini
    }

    async fn stream_chat(
        &self,
        request: &DispatchRequest,
        on_update: &mut UpdateFn<'_>,
    ) -> Result<StreamOutcome, ShuperError> {
        tracing::debug!(
            "Dispatching {} to Gemini ({} prior turns)",
            request.descriptor.model_id,
            request.history.len()
        );
        self.client
            .generate_content_stream(request, self.supports_thinking, on_update)
            .await
    }
}
