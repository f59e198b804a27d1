use super::{SearchDigest, non_empty_field};
use crate::providers::base_client::HttpClient;
use serde_json::{Value, json};

pub fn client(base_url: String, api_key: &str) -> HttpClient {
    HttpClient::bearer(base_url, api_key, None)
}

pub fn body(query: &str) -> Value {
    json!({ "query": query })
}

/// `{text, sources}` where sources are URLs or `{title, url}` objects.
pub fn parse(json: &Value) -> SearchDigest {
    let sources = json
        .get("sources")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| match item {
                    Value::String(url) => Some(url.trim().to_string()),
                    other => non_empty_field(other, "url").map(|url| {
                        match non_empty_field(other, "title") {
                            Some(title) => format!("[{}]({})", title, url),
                            None => url,
                        }
                    }),
                })
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default();

    SearchDigest {
        answer: non_empty_field(json, "text"),
        hits: Vec::new(),
        sources,
    }
}
