use super::{SearchDigest, SearchHit, str_field};
use crate::providers::base_client::HttpClient;
use serde_json::{Value, json};
use std::collections::HashMap;

const NUM_RESULTS: u32 = 5;
const MAX_CHARACTERS: u32 = 1000;

pub fn client(base_url: String, api_key: &str) -> HttpClient {
    let mut headers = HashMap::new();
    headers.insert("x-api-key".to_string(), api_key.to_string());
    HttpClient::new(base_url, None, Some(headers))
}

pub fn body(query: &str) -> Value {
    json!({
        "query": query,
        "numResults": NUM_RESULTS,
        "contents": { "text": { "maxCharacters": MAX_CHARACTERS } }
    })
}

pub fn parse(json: &Value) -> SearchDigest {
    let hits = json
        .get("results")
        .and_then(Value::as_array)
        .map(|results| {
            results
                .iter()
                .map(|r| {
                    let url = str_field(r, "url");
                    let title = Some(str_field(r, "title"))
                        .filter(|t| !t.is_empty())
                        .unwrap_or_else(|| url.clone());
                    SearchHit {
                        title,
                        url,
                        snippet: str_field(r, "text"),
                    }
                })
                .collect()
        })
        .unwrap_or_default();

    SearchDigest {
        answer: None,
        hits,
        sources: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn untitled_results_fall_back_to_url() {
        let digest = parse(&json!({
            "results": [{"url": "https://x.dev", "text": "body"}]
        }));
        assert_eq!(digest.hits[0].title, "https://x.dev");
        assert_eq!(digest.hits[0].snippet, "body");
    }

    #[test]
    fn request_asks_for_bounded_text() {
        let b = body("rust async");
        assert_eq!(b["numResults"], 5);
        assert_eq!(b["contents"]["text"]["maxCharacters"], 1000);
    }
}
