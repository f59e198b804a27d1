use crate::config::{Endpoints, ModelsConfig};
use crate::core::error::ShuperError;
use std::collections::HashMap;

pub const GEMINI_MODELS: &[&str] = &[
    "gemini-3-flash-preview",
    "gemini-3-pro-preview",
    "gemini-flash-latest",
    "gemini-flash-lite-latest",
];

pub const OPENROUTER_FREE_MODELS: &[&str] = &[
    "stepfun/step-3.5-flash:free",
    "liquid/lfm-2.5-1.2b-thinking:free",
    "nvidia/nemotron-3-nano-30b-a3b:free",
    "arcee-ai/trinity-mini:free",
    "nvidia/nemotron-nano-12b-v2-vl:free",
    "qwen/qwen3-next-80b-a3b-instruct:free",
    "qwen/qwen3-coder:free",
    "google/gemma-3n-e2b-it:free",
    "mistralai/mistral-small-3.1-24b-instruct:free",
];

pub const ROUTEWAY_MODELS: &[&str] = &[
    "devstral-2512:free",
    "kimi-k2-0905:free",
    "nemotron-nano-9b-v2:free",
    "gpt-oss-120b:free",
    "glm-4.5-air:free",
    "deepseek-r1-0528:free",
    "deepseek-r1:free",
    "deepseek-r1-distill-qwen-32b:free",
    "llama-3.2-3b-instruct:free",
    "llama-3.1-8b-instruct:free",
    "mistral-nemo-instruct:free",
];

const FREE_SUFFIX: &str = ":free";
const GEMINI_PREFIX: &str = "gemini-";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderFamily {
    /// Gemini native API.
    Gemini,
    /// OpenAI-compatible aggregator with a primary and an alternate key.
    OpenRouter,
    /// OpenAI-compatible aggregator with a single key.
    Routeway,
}

impl ProviderFamily {
    pub fn display_name(&self) -> &'static str {
        match self {
            ProviderFamily::Gemini => "Gemini",
            ProviderFamily::OpenRouter => "OpenRouter",
            ProviderFamily::Routeway => "Routeway",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthScheme {
    /// `Authorization: Bearer <key>`
    Bearer,
    /// `?<name>=<key>` on the request URL
    QueryParam(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderDescriptor {
    pub model_id: String,
    pub family: ProviderFamily,
    pub endpoint: String,
    pub auth: AuthScheme,
    pub supports_reasoning_budget: bool,
}

/// Static model-id to provider mapping, built once at startup.
#[derive(Debug, Clone)]
pub struct ProviderRegistry {
    models: HashMap<String, ProviderFamily>,
    endpoints: Endpoints,
}

impl ProviderRegistry {
    pub fn new(models: &ModelsConfig, endpoints: &Endpoints) -> Self {
        let mut map = HashMap::new();

        // Lowest priority first so higher-priority lists win on collisions.
        let lists: [(ProviderFamily, Vec<&str>); 3] = [
            (
                ProviderFamily::Gemini,
                GEMINI_MODELS
                    .iter()
                    .copied()
                    .chain(models.extra_gemini.iter().map(String::as_str))
                    .collect(),
            ),
            (
                ProviderFamily::OpenRouter,
                OPENROUTER_FREE_MODELS
                    .iter()
                    .copied()
                    .chain(models.extra_openrouter.iter().map(String::as_str))
                    .collect(),
            ),
            (
                ProviderFamily::Routeway,
                ROUTEWAY_MODELS
                    .iter()
                    .copied()
                    .chain(models.extra_routeway.iter().map(String::as_str))
                    .collect(),
            ),
        ];

        for (family, ids) in lists {
            for id in ids {
                let id = id.trim();
                if !id.is_empty() {
                    map.insert(id.to_string(), family);
                }
            }
        }

        Self {
            models: map,
            endpoints: endpoints.clone(),
        }
    }

    pub fn resolve(&self, model_id: &str) -> Result<ProviderDescriptor, ShuperError> {
        let model_id = model_id.trim();
        let family = self
            .models
            .get(model_id)
            .copied()
            .or_else(|| Self::pattern_family(model_id))
            .ok_or_else(|| ShuperError::UnknownModel(model_id.to_string()))?;

        Ok(self.describe(model_id, family))
    }

    /// Fallback for ids not claimed by any static list.
    fn pattern_family(model_id: &str) -> Option<ProviderFamily> {
        if model_id.ends_with(FREE_SUFFIX) && model_id.len() > FREE_SUFFIX.len() {
            Some(ProviderFamily::OpenRouter)
        } else if model_id.starts_with(GEMINI_PREFIX) {
            Some(ProviderFamily::Gemini)
        } else {
            None
        }
    }

    fn describe(&self, model_id: &str, family: ProviderFamily) -> ProviderDescriptor {
        let (endpoint, auth) = match family {
            ProviderFamily::Gemini => (self.endpoints.gemini.clone(), AuthScheme::QueryParam("key")),
            ProviderFamily::OpenRouter => (self.endpoints.openrouter.clone(), AuthScheme::Bearer),
            ProviderFamily::Routeway => (self.endpoints.routeway.clone(), AuthScheme::Bearer),
        };

        ProviderDescriptor {
            model_id: model_id.to_string(),
            family,
            endpoint,
            auth,
            supports_reasoning_budget: family == ProviderFamily::Gemini
                && (model_id.contains("gemini-3") || model_id.contains("gemini-2.5")),
        }
    }

    pub fn known_models(&self, family: ProviderFamily) -> Vec<&str> {
        let mut ids: Vec<&str> = self
            .models
            .iter()
            .filter(|(_, f)| **f == family)
            .map(|(id, _)| id.as_str())
            .collect();
        ids.sort_unstable();
        ids
    }
}
