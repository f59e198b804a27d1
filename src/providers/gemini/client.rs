use crate::core::error::ShuperError;
use crate::core::types::{Attachment, ChatTurn, Role};
use crate::providers::base_client::{HttpClient, error_from_response};
use crate::providers::gemini::types::*;
use crate::providers::stream::{StreamOutcome, UpdateFn, decode_sse, gemini_delta_parser};
use crate::providers::{DispatchRequest, StreamAccumulator};

#[derive(Clone, Debug)]
pub struct GeminiClient {
    client: HttpClient,
}

impl GeminiClient {
    pub fn new(base_url: String, key_param: &str, api_key: String) -> Self {
        let mut client = HttpClient::new(base_url, None, None);

        client.add_query_param(key_param, api_key);
        client.add_query_param("alt", "sse".to_string());

        Self { client }
    }

    pub async fn generate_content_stream(
        &self,
        request: &DispatchRequest,
        supports_thinking: bool,
        on_update: &mut UpdateFn<'_>,
    ) -> Result<StreamOutcome, ShuperError> {
        let payload = build_payload(request, supports_thinking);
        let path = format!(
            "v1beta/models/{}:streamGenerateContent",
            request.descriptor.model_id
        );

        let response = tokio::select! {
            biased;
            _ = request.cancel.cancelled() => {
                return Ok(StreamOutcome::Cancelled { partial: StreamAccumulator::default() });
            }
            response = self.client.post(&path, &payload) => response?,
        };

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        decode_sse(
            response.bytes_stream(),
            gemini_delta_parser,
            &request.cancel,
            on_update,
        )
        .await
    }
}

fn attachment_parts(attachments: &[Attachment]) -> impl Iterator<Item = GeminiPart> + '_ {
    attachments
        .iter()
        .filter(|att| !att.data.is_empty())
        .map(|att| GeminiPart::Inline {
            inline_data: InlineData {
                mime_type: att.mime_type.clone(),
                data: att.base64_payload().to_string(),
            },
        })
}

fn turn_parts(text: &str, attachments: &[Attachment]) -> Vec<GeminiPart> {
    let mut parts = Vec::new();
    if !text.trim().is_empty() {
        parts.push(GeminiPart::Text {
            text: text.to_string(),
        });
    }
    parts.extend(attachment_parts(attachments));

    // The API rejects turns without parts.
    if parts.is_empty() {
        parts.push(GeminiPart::Text {
            text: " ".to_string(),
        });
    }
    parts
}

fn history_content(turn: &ChatTurn) -> GeminiContent {
    GeminiContent {
        role: match turn.role {
            Role::User => "user",
            Role::Model => "model",
        },
        parts: turn_parts(&turn.text, &turn.attachments),
    }
}

pub(crate) fn build_payload(request: &DispatchRequest, supports_thinking: bool) -> GeminiRequest {
    let mut contents: Vec<GeminiContent> = request.history.iter().map(history_content).collect();
    contents.push(GeminiContent {
        role: "user",
        parts: turn_parts(&request.user_text, &request.attachments),
    });

    let system = request.system_instruction.trim();
    let system_instruction = (!system.is_empty()).then(|| SystemInstruction {
        parts: vec![GeminiPart::Text {
            text: system.to_string(),
        }],
    });

    let generation_config = request
        .reasoning
        .thinking_budget
        .filter(|_| supports_thinking)
        .map(|thinking_budget| GenerationConfig {
            thinking_config: Some(ThinkingConfig { thinking_budget }),
        });

    GeminiRequest {
        contents,
        system_instruction,
        generation_config,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Endpoints, ModelsConfig};
    use crate::providers::{ProviderRegistry, ReasoningConfig};
    use tokio_util::sync::CancellationToken;

    fn request(budget: Option<u32>) -> DispatchRequest {
        DispatchRequest {
            descriptor: ProviderRegistry::new(&ModelsConfig::default(), &Endpoints::default())
                .resolve("gemini-3-flash-preview")
                .unwrap(),
            system_instruction: "  ".into(),
            history: vec![
                ChatTurn::user("look").with_attachments(vec![Attachment {
                    name: "a.png".into(),
                    mime_type: "image/png".into(),
                    data: "data:image/png;base64,QUJD".into(),
                    size: 3,
                }]),
                ChatTurn::model(""),
            ],
            user_text: String::new(),
            attachments: Vec::new(),
            reasoning: ReasoningConfig {
                thinking_budget: budget,
                effort: None,
            },
            cancel: CancellationToken::new(),
        }
    }

    #[test]
    fn payload_carries_inline_data_and_placeholder_parts() {
        let json = serde_json::to_value(build_payload(&request(None), true)).unwrap();
        let contents = json["contents"].as_array().unwrap();
        assert_eq!(contents.len(), 3);
        assert_eq!(contents[0]["parts"][0]["text"], "look");
        assert_eq!(contents[0]["parts"][1]["inlineData"]["mimeType"], "image/png");
        assert_eq!(contents[0]["parts"][1]["inlineData"]["data"], "QUJD");
        assert_eq!(contents[1]["role"], "model");
        assert_eq!(contents[1]["parts"][0]["text"], " ");
        assert_eq!(contents[2]["parts"][0]["text"], " ");
        assert!(json.get("systemInstruction").is_none());
        assert!(json.get("generationConfig").is_none());
    }

    #[test]
    fn zero_budget_is_sent_explicitly() {
        let json = serde_json::to_value(build_payload(&request(Some(0)), true)).unwrap();
        assert_eq!(json["generationConfig"]["thinkingConfig"]["thinkingBudget"], 0);
    }

    #[test]
    fn budget_dropped_for_models_without_thinking() {
        let json = serde_json::to_value(build_payload(&request(Some(32768)), false)).unwrap();
        assert!(json.get("generationConfig").is_none());
    }
}
