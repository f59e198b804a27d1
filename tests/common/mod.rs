#![allow(dead_code)]

use serde_json::{Value, json};
use shuper::config::{ApiKeys, Config, Endpoints, SearchConfig};
use shuper::dispatch::Dispatcher;
use wiremock::{MockServer, Request};

/// Config with every outbound service routed to `server` under its own prefix.
pub fn config_for(server: &MockServer) -> Config {
    let uri = server.uri();
    let mut config = Config::default();
    config.endpoints = Endpoints {
        gemini: uri.clone(),
        openrouter: format!("{}/openrouter", uri),
        routeway: format!("{}/routeway", uri),
        scira: format!("{}/scira", uri),
        exa: format!("{}/exa", uri),
        tavily: format!("{}/tavily", uri),
    };
    config.search = SearchConfig {
        max_attempts: 3,
        retry_delay_ms: 10,
    };
    config
}

pub fn keys() -> ApiKeys {
    ApiKeys {
        gemini: Some("gemini-key".into()),
        openrouter: Some("primary".into()),
        openrouter_alt: Some("alt".into()),
        routeway: Some("routeway-key".into()),
        scira: Some("scira-key".into()),
        exa: Some("exa-key".into()),
        tavily: Some("tavily-key".into()),
    }
}

pub fn dispatcher(server: &MockServer) -> Dispatcher {
    Dispatcher::with_keys(config_for(server), keys())
}

pub fn openai_sse(chunks: &[&str]) -> String {
    let mut body = String::new();
    for chunk in chunks {
        let line = json!({ "choices": [{ "delta": { "content": chunk } }] });
        body.push_str(&format!("data: {}\n\n", line));
    }
    body.push_str("data: [DONE]\n\n");
    body
}

/// `(text, is_thought)` parts, one SSE event each.
pub fn gemini_sse(parts: &[(&str, bool)]) -> String {
    parts
        .iter()
        .map(|(text, thought)| {
            let part = if *thought {
                json!({ "text": text, "thought": true })
            } else {
                json!({ "text": text })
            };
            let line = json!({ "candidates": [{ "content": { "role": "model", "parts": [part] } }] });
            format!("data: {}\n\n", line)
        })
        .collect()
}

pub fn gemini_path(model: &str) -> String {
    format!("/v1beta/models/{}:streamGenerateContent", model)
}

pub async fn requests_to(server: &MockServer, path: &str) -> Vec<Request> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .into_iter()
        .filter(|r| r.url.path() == path)
        .collect()
}

pub fn body_json(request: &Request) -> Value {
    serde_json::from_slice(&request.body).unwrap()
}
