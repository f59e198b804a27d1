//! Web search adapters normalized to one markdown context block.

use crate::config::{Endpoints, SearchConfig};
use crate::core::error::ShuperError;
use crate::providers::base_client::{HttpClient, error_from_response};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

mod exa;
mod scira;
mod tavily;

pub const NO_RESULTS: &str = "No results found.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SearchProvider {
    #[default]
    Scira,
    Exa,
    Tavily,
}

impl SearchProvider {
    pub const ALL: [SearchProvider; 3] = [SearchProvider::Scira, SearchProvider::Exa, SearchProvider::Tavily];

    pub fn display_name(&self) -> &'static str {
        match self {
            SearchProvider::Scira => "Scira",
            SearchProvider::Exa => "Exa",
            SearchProvider::Tavily => "Tavily",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SearchProvider::Scira => "scira",
            SearchProvider::Exa => "exa",
            SearchProvider::Tavily => "tavily",
        }
    }
}

impl fmt::Display for SearchProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SearchProvider {
    type Err = ShuperError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| ShuperError::Input(format!("Unknown search provider: {}", s)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

/// Provider-neutral search result.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchDigest {
    pub answer: Option<String>,
    pub hits: Vec<SearchHit>,
    pub sources: Vec<String>,
}

impl SearchDigest {
    pub fn is_empty(&self) -> bool {
        self.answer.is_none() && self.hits.is_empty() && self.sources.is_empty()
    }

    pub fn to_markdown(&self) -> String {
        if self.is_empty() {
            return NO_RESULTS.to_string();
        }

        let mut sections = Vec::new();
        if let Some(answer) = &self.answer {
            sections.push(format!("### Answer\n{}", answer.trim()));
        }

        if !self.hits.is_empty() {
            let mut block = String::from("### Results");
            for (idx, hit) in self.hits.iter().enumerate() {
                block.push_str(&format!("\n{}. **{}**", idx + 1, hit.title));
                if !hit.url.is_empty() {
                    block.push_str(&format!(" ({})", hit.url));
                }
                let snippet = hit.snippet.trim();
                if !snippet.is_empty() {
                    block.push_str(&format!("\n   {}", snippet.replace('\n', " ")));
                }
            }
            sections.push(block);
        }

        if !self.sources.is_empty() {
            let list: Vec<String> = self.sources.iter().map(|s| format!("- {}", s)).collect();
            sections.push(format!("### Sources\n{}", list.join("\n")));
        }

        sections.join("\n\n")
    }
}

fn str_field(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .trim()
        .to_string()
}

fn non_empty_field(value: &Value, key: &str) -> Option<String> {
    Some(str_field(value, key)).filter(|s| !s.is_empty())
}

/// Direct-call search client with a bounded retry; 400/401 rejections are final.
#[derive(Debug, Clone)]
pub struct SearchClient {
    endpoints: Endpoints,
    config: SearchConfig,
}

impl SearchClient {
    pub fn new(endpoints: Endpoints, config: SearchConfig) -> Self {
        Self { endpoints, config }
    }

    fn base_url(&self, provider: SearchProvider) -> String {
        match provider {
            SearchProvider::Scira => self.endpoints.scira.clone(),
            SearchProvider::Exa => self.endpoints.exa.clone(),
            SearchProvider::Tavily => self.endpoints.tavily.clone(),
        }
    }

    pub async fn search(
        &self,
        query: &str,
        provider: SearchProvider,
        api_key: &str,
    ) -> Result<String, ShuperError> {
        Ok(self.fetch(query, provider, api_key).await?.to_markdown())
    }

    pub async fn fetch(
        &self,
        query: &str,
        provider: SearchProvider,
        api_key: &str,
    ) -> Result<SearchDigest, ShuperError> {
        let api_key = api_key.trim();
        if api_key.is_empty() {
            return Err(ShuperError::MissingKey(provider.display_name().to_string()));
        }
        let query = query.trim();
        if query.chars().count() < 2 {
            return Err(ShuperError::QueryTooShort(query.to_string()));
        }

        let base_url = self.base_url(provider);
        let (client, body) = match provider {
            SearchProvider::Scira => (scira::client(base_url, api_key), scira::body(query)),
            SearchProvider::Exa => (exa::client(base_url, api_key), exa::body(query)),
            SearchProvider::Tavily => (tavily::client(base_url), tavily::body(query, api_key)),
        };

        let json = self.post_with_retry(provider, &client, &body).await?;
        let digest = match provider {
            SearchProvider::Scira => scira::parse(&json),
            SearchProvider::Exa => exa::parse(&json),
            SearchProvider::Tavily => tavily::parse(&json),
        };
        tracing::debug!(
            "{} search returned {} results",
            provider.display_name(),
            digest.hits.len()
        );
        Ok(digest)
    }

    async fn post_with_retry(
        &self,
        provider: SearchProvider,
        client: &HttpClient,
        body: &Value,
    ) -> Result<Value, ShuperError> {
        let max_attempts = self.config.max_attempts.max(1);
        let delay = Duration::from_millis(self.config.retry_delay_ms);
        let mut errors = Vec::new();

        for attempt in 1..=max_attempts {
            match Self::post_once(client, body).await {
                Ok(json) => return Ok(json),
                Err(err) if !err.is_search_retryable() => return Err(err),
                Err(err) => {
                    if attempt < max_attempts {
                        tracing::warn!(
                            "{} search attempt {}/{} failed, retrying: {}",
                            provider.display_name(),
                            attempt,
                            max_attempts,
                            err
                        );
                        tokio::time::sleep(delay).await;
                    }
                    errors.push(err.to_string());
                }
            }
        }

        Err(ShuperError::SearchUnavailable(errors.join(" | ")))
    }

    async fn post_once(client: &HttpClient, body: &Value) -> Result<Value, ShuperError> {
        let response = client.post("search", body).await?;
        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }
        Ok(response.json::<Value>().await?)
    }
}
