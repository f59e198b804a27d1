use super::{SearchDigest, SearchHit, non_empty_field, str_field};
use crate::providers::base_client::HttpClient;
use serde_json::{Value, json};

/// Tavily authenticates through the body, so the client carries no auth header.
pub fn client(base_url: String) -> HttpClient {
    HttpClient::new(base_url, None, None)
}

pub fn body(query: &str, api_key: &str) -> Value {
    json!({
        "api_key": api_key,
        "query": query,
        "search_depth": "basic",
        "include_answer": true,
        "max_results": 5
    })
}

pub fn parse(json: &Value) -> SearchDigest {
    let hits: Vec<SearchHit> = json
        .get("results")
        .and_then(Value::as_array)
        .map(|results| {
            results
                .iter()
                .map(|r| SearchHit {
                    title: str_field(r, "title"),
                    url: str_field(r, "url"),
                    snippet: str_field(r, "content"),
                })
                .collect()
        })
        .unwrap_or_default();

    let sources = hits
        .iter()
        .filter(|h| !h.url.is_empty())
        .map(|h| h.url.clone())
        .collect();

    SearchDigest {
        answer: non_empty_field(json, "answer"),
        hits,
        sources,
    }
}
