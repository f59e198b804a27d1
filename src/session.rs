//! Chat sessions and the per-session cancellation slots.

use crate::core::types::{ChatTurn, SessionMode, SessionStatus};
use crate::directives::SideEffect;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;

pub const NEW_CHAT_TITLE: &str = "New Chat";
const AUTO_TITLE_CHARS: usize = 30;

pub const REASONING_ONLY_NOTICE: &str = "(The model returned reasoning but no answer text.)";
pub const EMPTY_RESPONSE_ERROR: &str = "Error: The model returned an empty response.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub status: SessionStatus,
    #[serde(default)]
    pub label_ids: Vec<String>,
    #[serde(default)]
    pub mode: SessionMode,
    /// Models consulted in council mode; empty means the configured default set.
    #[serde(default)]
    pub council_models: Vec<String>,
    #[serde(default)]
    pub turns: Vec<ChatTurn>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new(id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            title: NEW_CHAT_TITLE.to_string(),
            status: SessionStatus::default(),
            label_ids: Vec::new(),
            mode: SessionMode::default(),
            council_models: Vec::new(),
            turns: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_generated_id() -> Self {
        Self::new(uuid::Uuid::new_v4().to_string())
    }

    /// Names an untitled session after its first message.
    pub fn auto_title(&mut self, first_message: &str) -> bool {
        let text = first_message.trim();
        if self.title != NEW_CHAT_TITLE || !self.turns.is_empty() || text.is_empty() {
            return false;
        }
        let mut title: String = text.chars().take(AUTO_TITLE_CHARS).collect();
        if text.chars().count() > AUTO_TITLE_CHARS {
            title.push_str("...");
        }
        self.title = title;
        true
    }

    pub fn apply(&mut self, effects: &[SideEffect]) {
        for effect in effects {
            match effect {
                SideEffect::SetStatus(status) => self.status = *status,
                SideEffect::Rename(title) => self.title = title.clone(),
                SideEffect::AddLabel(id) => {
                    if !self.label_ids.contains(id) {
                        self.label_ids.push(id.clone());
                    }
                }
            }
        }
        self.touch();
    }

    pub fn push_user(&mut self, turn: ChatTurn) {
        self.turns.push(turn);
        self.touch();
    }

    /// Appends the model's final reply, substituting a notice for empty text.
    pub fn commit_response(
        &mut self,
        text: &str,
        reasoning: Option<String>,
        model: &str,
        council: bool,
    ) -> &ChatTurn {
        let text = resolve_empty_answer(text, reasoning.as_deref(), council);
        let mut turn = ChatTurn::model(text);
        turn.reasoning = reasoning.filter(|r| !r.trim().is_empty());
        turn.model = Some(model.to_string());
        self.turns.push(turn);
        self.touch();
        &self.turns[self.turns.len() - 1]
    }

    pub fn clear_turns(&mut self) {
        self.turns.clear();
        self.touch();
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

pub fn resolve_empty_answer(text: &str, reasoning: Option<&str>, council: bool) -> String {
    if !text.trim().is_empty() {
        return text.to_string();
    }
    let has_reasoning = reasoning.is_some_and(|r| !r.trim().is_empty());
    match (has_reasoning, council) {
        (true, false) => REASONING_ONLY_NOTICE.to_string(),
        (true, true) => String::new(),
        (false, _) => EMPTY_RESPONSE_ERROR.to_string(),
    }
}

struct Slot {
    generation: u64,
    token: CancellationToken,
}

/// Handle for one in-flight send. Pass it back to [`SessionSlots::finish`].
#[derive(Debug, Clone)]
pub struct SlotTicket {
    pub session_id: String,
    pub generation: u64,
    pub token: CancellationToken,
}

/// At most one live cancellation token per session id.
#[derive(Default)]
pub struct SessionSlots {
    inner: Mutex<SlotsInner>,
}

#[derive(Default)]
struct SlotsInner {
    next_generation: u64,
    slots: HashMap<String, Slot>,
}

impl SessionSlots {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, SlotsInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Cancels any live send for the session and installs a fresh token.
    pub fn begin(&self, session_id: &str) -> SlotTicket {
        let mut inner = self.lock();
        inner.next_generation += 1;
        let generation = inner.next_generation;
        let token = CancellationToken::new();

        if let Some(previous) = inner.slots.insert(
            session_id.to_string(),
            Slot {
                generation,
                token: token.clone(),
            },
        ) {
            tracing::debug!("Cancelling superseded send for session {}", session_id);
            previous.token.cancel();
        }

        SlotTicket {
            session_id: session_id.to_string(),
            generation,
            token,
        }
    }

    /// Releases the slot if it still belongs to `ticket`.
    pub fn finish(&self, ticket: &SlotTicket) {
        let mut inner = self.lock();
        if inner
            .slots
            .get(&ticket.session_id)
            .is_some_and(|slot| slot.generation == ticket.generation)
        {
            inner.slots.remove(&ticket.session_id);
        }
    }

    /// Returns whether a live send was cancelled.
    pub fn cancel(&self, session_id: &str) -> bool {
        match self.lock().slots.remove(session_id) {
            Some(slot) => {
                slot.token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_active(&self, session_id: &str) -> bool {
        self.lock().slots.contains_key(session_id)
    }
}
