use crate::core::error::ShuperError;
use crate::core::types::{Attachment, ChatTurn, Role};
use crate::providers::base_client::{HttpClient, error_from_response};
use crate::providers::stream::{StreamOutcome, UpdateFn, decode_sse, openai_delta_parser};
use crate::providers::{
    ChatProvider, DispatchRequest, ProviderDescriptor, ProviderFamily, StreamAccumulator,
};
use async_trait::async_trait;
use reqwest::{Response, StatusCode};
use serde::Serialize;
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;

pub const APP_REFERER: &str = "https://shuperapp.nafen.sbs";
pub const APP_TITLE: &str = "Shuper Workspace";

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatCompletionMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    reasoning_effort: Option<&'a str>,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
struct ChatCompletionMessage {
    role: &'static str,
    content: String,
}

/// Client for OpenAI-compatible aggregators (`/chat/completions` with SSE).
#[derive(Clone, Debug)]
pub struct OpenAICompatibleProvider {
    family: ProviderFamily,
    base_url: String,
    primary_key: String,
    /// Secondary key tried once when the primary hits its quota.
    fallback_key: Option<String>,
}

impl OpenAICompatibleProvider {
    /// Uses `fallback_key` up front when no primary key is configured.
    pub fn new(
        descriptor: &ProviderDescriptor,
        primary_key: Option<String>,
        fallback_key: Option<String>,
    ) -> Result<Self, ShuperError> {
        let clean = |k: Option<String>| k.map(|k| k.trim().to_string()).filter(|k| !k.is_empty());
        let fallback_key = clean(fallback_key);
        let primary_key = clean(primary_key)
            .or_else(|| fallback_key.clone())
            .ok_or_else(|| {
                ShuperError::MissingCredential(descriptor.family.display_name().to_string())
            })?;

        Ok(Self {
            family: descriptor.family,
            base_url: descriptor.endpoint.clone(),
            primary_key,
            fallback_key,
        })
    }

    fn client(&self, api_key: &str) -> HttpClient {
        let mut extra_headers = HashMap::new();
        extra_headers.insert("HTTP-Referer".to_string(), APP_REFERER.to_string());
        extra_headers.insert("X-Title".to_string(), APP_TITLE.to_string());
        HttpClient::bearer(self.base_url.clone(), api_key, Some(extra_headers))
    }

    /// Returns `None` when cancelled before the response headers arrived.
    async fn post_with_key(
        &self,
        api_key: &str,
        payload: &ChatCompletionRequest<'_>,
        cancel: &CancellationToken,
    ) -> Result<Option<Response>, ShuperError> {
        let client = self.client(api_key);
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Ok(None),
            response = client.post("chat/completions", payload) => response.map(Some),
        }
    }

    /// Sends with the primary key and retries once with the fallback key on 429.
    async fn open_stream(
        &self,
        payload: &ChatCompletionRequest<'_>,
        cancel: &CancellationToken,
    ) -> Result<Option<Response>, ShuperError> {
        let Some(mut response) = self.post_with_key(&self.primary_key, payload, cancel).await?
        else {
            return Ok(None);
        };

        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            if let Some(alt) = self.fallback_key.as_deref().filter(|k| *k != self.primary_key) {
                tracing::warn!(
                    "{} quota hit on primary key, retrying with alternate key",
                    self.family.display_name()
                );
                match self.post_with_key(alt, payload, cancel).await? {
                    Some(retry) => response = retry,
                    None => return Ok(None),
                }
            }
        }

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }
        Ok(Some(response))
    }
}

fn build_messages(request: &DispatchRequest) -> Vec<ChatCompletionMessage> {
    let mut messages = Vec::with_capacity(request.history.len() + 2);
    if !request.system_instruction.trim().is_empty() {
        messages.push(ChatCompletionMessage {
            role: "system",
            content: request.system_instruction.clone(),
        });
    }

    messages.extend(history_messages(&request.history));

    messages.push(ChatCompletionMessage {
        role: "user",
        content: inline_attachments(&request.user_text, &request.attachments),
    });
    messages
}

fn history_messages(history: &[ChatTurn]) -> impl Iterator<Item = ChatCompletionMessage> + '_ {
    history
        .iter()
        .filter(|turn| !turn.text.trim().is_empty())
        .map(|turn| ChatCompletionMessage {
            role: match turn.role {
                Role::User => "user",
                Role::Model => "assistant",
            },
            content: turn.text.clone(),
        })
}

/// These providers take no binary parts: textual attachments are inlined as
/// fenced blocks and anything else is replaced by a short notice.
pub fn inline_attachments(text: &str, attachments: &[Attachment]) -> String {
    let mut content = text.to_string();
    for att in attachments {
        if !content.is_empty() {
            content.push_str("\n\n");
        }
        match att.decode_text() {
            Some(body) => {
                let lang = att
                    .name
                    .rsplit_once('.')
                    .map(|(_, ext)| ext)
                    .unwrap_or_default();
                content.push_str(&format!("File: {}\n```{}\n{}\n```", att.name, lang, body.trim_end()));
            }
            None => content.push_str(&format!(
                "[Attachment {} ({}) omitted: this model only accepts text]",
                att.name, att.mime_type
            )),
        }
    }
    content
}

#[async_trait]
impl ChatProvider for OpenAICompatibleProvider {
    fn family(&self) -> ProviderFamily {
        self.family
    }

    async fn stream_chat(
        &self,
        request: &DispatchRequest,
        on_update: &mut UpdateFn<'_>,
    ) -> Result<StreamOutcome, ShuperError> {
        let payload = ChatCompletionRequest {
            model: &request.descriptor.model_id,
            messages: build_messages(request),
            stream: true,
            reasoning_effort: request.reasoning.effort.as_deref(),
        };

        tracing::debug!(
            "Dispatching {} to {} ({} messages)",
            request.descriptor.model_id,
            self.family.display_name(),
            payload.messages.len()
        );

        let Some(response) = self.open_stream(&payload, &request.cancel).await? else {
            return Ok(StreamOutcome::Cancelled {
                partial: StreamAccumulator::default(),
            });
        };

        decode_sse(
            response.bytes_stream(),
            openai_delta_parser,
            &request.cancel,
            on_update,
        )
        .await
    }
}
