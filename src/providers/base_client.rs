use crate::core::error::ShuperError;
use reqwest::{Client, Response, StatusCode};
use serde::Serialize;
use std::collections::HashMap;

const ERROR_BODY_PREVIEW: usize = 100;

/// Thin reqwest wrapper carrying a base URL, one auth header and fixed extras.
#[derive(Clone, Debug)]
pub struct HttpClient {
    client: Client,
    base_url: String,
    auth_header: Option<(String, String)>,
    extra_headers: HashMap<String, String>,
    query_params: Vec<(String, String)>,
}

impl HttpClient {
    pub fn new(
        base_url: String,
        auth_header: Option<(String, String)>,
        extra_headers: Option<HashMap<String, String>>,
    ) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            auth_header,
            extra_headers: extra_headers.unwrap_or_default(),
            query_params: Vec::new(),
        }
    }

    pub fn bearer(base_url: String, api_key: &str, extra_headers: Option<HashMap<String, String>>) -> Self {
        Self::new(
            base_url,
            Some(("Authorization".to_string(), format!("Bearer {}", api_key))),
            extra_headers,
        )
    }

    pub fn add_query_param(&mut self, key: &str, value: String) {
        self.query_params.push((key.to_string(), value));
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// POSTs JSON and returns the raw response; status handling is left to the caller.
    pub async fn post<T: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &T,
    ) -> Result<Response, ShuperError> {
        let mut request = self
            .client
            .post(self.url(path))
            .header("Content-Type", "application/json");

        if let Some((name, value)) = &self.auth_header {
            request = request.header(name, value);
        }
        for (key, value) in &self.extra_headers {
            request = request.header(key, value);
        }
        if !self.query_params.is_empty() {
            request = request.query(&self.query_params);
        }

        Ok(request.json(payload).send().await?)
    }
}

/// Builds an error from a non-success response, preferring the provider's own message.
pub async fn error_from_response(response: Response) -> ShuperError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let message = error_message_from_body(&body);

    if status == StatusCode::TOO_MANY_REQUESTS {
        ShuperError::QuotaExceeded(message)
    } else {
        ShuperError::ProviderRejected {
            status: status.as_u16(),
            message,
        }
    }
}

pub fn error_message_from_body(body: &str) -> String {
    if let Ok(json) = serde_json::from_str::<serde_json::Value>(body) {
        let error = &json["error"];
        if let Some(message) = error.get("message").and_then(|m| m.as_str()) {
            return message.to_string();
        }
        if let Some(message) = error.as_str() {
            return message.to_string();
        }
        if let Some(message) = json.get("message").and_then(|m| m.as_str()) {
            return message.to_string();
        }
        return "Unknown error".to_string();
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        "Unknown error".to_string()
    } else {
        trimmed.chars().take(ERROR_BODY_PREVIEW).collect()
    }
}
