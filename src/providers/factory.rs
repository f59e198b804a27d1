use crate::config::ApiKeys;
use crate::core::error::ShuperError;
use crate::providers::gemini::GeminiProvider;
use crate::providers::openai_compatible::OpenAICompatibleProvider;
use crate::providers::{ChatProvider, ProviderDescriptor, ProviderFamily};
use std::collections::HashMap;
use std::sync::Arc;

type ProviderCreator = Box<
    dyn Fn(&ProviderDescriptor, &ApiKeys) -> Result<Arc<dyn ChatProvider>, ShuperError>
        + Send
        + Sync,
>;

/// Builds a provider client for a resolved descriptor.
pub struct ProviderFactory {
    creators: HashMap<ProviderFamily, ProviderCreator>,
}

impl ProviderFactory {
    pub fn new() -> Self {
        let mut creators = HashMap::new();

        creators.insert(
            ProviderFamily::Gemini,
            Box::new(|desc: &ProviderDescriptor, keys: &ApiKeys| {
                let provider = GeminiProvider::new(desc, keys.gemini.clone())?;
                Ok(Arc::new(provider) as Arc<dyn ChatProvider>)
            }) as ProviderCreator,
        );

        creators.insert(
            ProviderFamily::OpenRouter,
            Box::new(|desc: &ProviderDescriptor, keys: &ApiKeys| {
                let provider = OpenAICompatibleProvider::new(
                    desc,
                    keys.openrouter.clone(),
                    keys.openrouter_alt.clone(),
                )?;
                Ok(Arc::new(provider) as Arc<dyn ChatProvider>)
            }) as ProviderCreator,
        );

        creators.insert(
            ProviderFamily::Routeway,
            Box::new(|desc: &ProviderDescriptor, keys: &ApiKeys| {
                let provider = OpenAICompatibleProvider::new(desc, keys.routeway.clone(), None)?;
                Ok(Arc::new(provider) as Arc<dyn ChatProvider>)
            }) as ProviderCreator,
        );

        Self { creators }
    }

    pub fn create(
        &self,
        descriptor: &ProviderDescriptor,
        keys: &ApiKeys,
    ) -> Result<Arc<dyn ChatProvider>, ShuperError> {
        self.creators
            .get(&descriptor.family)
            .ok_or_else(|| {
                ShuperError::Config(format!("Provider not found: {:?}", descriptor.family))
            })
            .and_then(|creator| creator(descriptor, keys))
    }
}

impl Default for ProviderFactory {
    fn default() -> Self {
        Self::new()
    }
}
