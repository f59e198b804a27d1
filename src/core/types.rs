use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::core::error::ShuperError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

/// A file attached to a user turn. `data` is base64, optionally carrying a
/// `data:<mime>;base64,` prefix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub name: String,
    pub mime_type: String,
    pub data: String,
    pub size: usize,
}

impl Attachment {
    pub fn from_bytes(name: impl Into<String>, mime_type: impl Into<String>, bytes: &[u8]) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            data: STANDARD.encode(bytes),
            size: bytes.len(),
        }
    }

    /// Base64 payload with any data-URL prefix removed.
    pub fn base64_payload(&self) -> &str {
        match self.data.find("base64,") {
            Some(idx) => &self.data[idx + "base64,".len()..],
            None => &self.data,
        }
    }

    pub fn is_textual(&self) -> bool {
        let mime = self.mime_type.to_ascii_lowercase();
        mime.starts_with("text/")
            || matches!(
                mime.as_str(),
                "application/json"
                    | "application/xml"
                    | "application/javascript"
                    | "application/x-yaml"
                    | "application/yaml"
                    | "application/toml"
                    | "application/x-sh"
            )
    }

    /// Decoded UTF-8 contents, or `None` for binary or undecodable payloads.
    pub fn decode_text(&self) -> Option<String> {
        if !self.is_textual() {
            return None;
        }
        let bytes = STANDARD.decode(self.base64_payload().trim()).ok()?;
        String::from_utf8(bytes).ok()
    }
}

/// One role-tagged entry of a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl ChatTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
            attachments: Vec::new(),
            reasoning: None,
            model: None,
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            ..Self::user(text)
        }
    }

    pub fn with_attachments(mut self, attachments: Vec<Attachment>) -> Self {
        self.attachments = attachments;
        self
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionMode {
    #[default]
    Explore,
    Execute,
    Council,
}

impl SessionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionMode::Explore => "explore",
            SessionMode::Execute => "execute",
            SessionMode::Council => "council",
        }
    }
}

impl fmt::Display for SessionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionMode {
    type Err = ShuperError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "explore" => Ok(SessionMode::Explore),
            "execute" => Ok(SessionMode::Execute),
            "council" => Ok(SessionMode::Council),
            other => Err(ShuperError::Input(format!("Unknown mode: {}", other))),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Backlog,
    #[default]
    Todo,
    InProgress,
    NeedsReview,
    Done,
    Cancelled,
    Archive,
}

impl SessionStatus {
    /// Statuses a model may set through a `[[STATUS: ...]]` directive.
    pub const DIRECTIVE_VALUES: [SessionStatus; 6] = [
        SessionStatus::Backlog,
        SessionStatus::Todo,
        SessionStatus::NeedsReview,
        SessionStatus::Done,
        SessionStatus::Cancelled,
        SessionStatus::Archive,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Backlog => "backlog",
            SessionStatus::Todo => "todo",
            SessionStatus::InProgress => "in_progress",
            SessionStatus::NeedsReview => "needs_review",
            SessionStatus::Done => "done",
            SessionStatus::Cancelled => "cancelled",
            SessionStatus::Archive => "archive",
        }
    }

    /// Parses only the values accepted from model directives.
    pub fn from_directive(value: &str) -> Option<Self> {
        let value = value.trim().to_lowercase();
        Self::DIRECTIVE_VALUES
            .into_iter()
            .find(|status| status.as_str() == value)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub color: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentToolKind {
    Mcp,
    ApiLinear,
    ApiGithub,
    ApiCustom,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentTool {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: AgentToolKind,
    pub name: String,
    /// URL or key, depending on the tool kind.
    #[serde(default)]
    pub config: String,
    #[serde(default = "default_true")]
    pub active: bool,
}

fn default_true() -> bool {
    true
}

/// A named persona bound to a base model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,
    pub name: String,
    pub base_model: String,
    pub system_instruction: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub tools: Vec<AgentTool>,
}
