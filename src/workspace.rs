//! Session-level send: slot bookkeeping, dispatch, directive post-processing, persistence.

use crate::core::types::{Attachment, ChatTurn, SessionMode};
use crate::directives::{self, SideEffect};
use crate::dispatch::{DispatchOutcome, Dispatcher, SendRequest};
use crate::providers::UpdateFn;
use crate::search::SearchProvider;
use crate::session::{Session, SessionSlots};
use crate::store::SessionStore;
use std::sync::Arc;

/// Per-turn choices that are not part of the session itself.
#[derive(Debug, Clone, Default)]
pub struct TurnOptions {
    pub model: String,
    pub agent: Option<String>,
    pub search: Option<SearchProvider>,
    pub attachments: Vec<Attachment>,
}

#[derive(Debug, Clone)]
pub struct TurnReport {
    pub outcome: DispatchOutcome,
    /// Directive effects applied to the session.
    pub effects: Vec<SideEffect>,
    /// Text as committed to the transcript.
    pub text: String,
}

pub struct Workspace {
    dispatcher: Arc<Dispatcher>,
    slots: SessionSlots,
    store: SessionStore,
}

impl Workspace {
    pub fn new(dispatcher: Arc<Dispatcher>, store: SessionStore) -> Self {
        Self {
            dispatcher,
            slots: SessionSlots::new(),
            store,
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Loads a stored session, or starts a fresh one under `id`.
    pub fn open_session(&self, id: Option<&str>) -> Session {
        match id {
            Some(id) => self.store.load(id).unwrap_or_else(|| Session::new(id)),
            None => Session::with_generated_id(),
        }
    }

    /// Stops the in-flight send for a session, if any.
    pub fn cancel(&self, session_id: &str) -> bool {
        self.slots.cancel(session_id)
    }

    pub fn is_sending(&self, session_id: &str) -> bool {
        self.slots.is_active(session_id)
    }

    pub async fn send_turn(
        &self,
        session: &mut Session,
        text: &str,
        options: TurnOptions,
        on_update: &mut UpdateFn<'_>,
    ) -> TurnReport {
        session.auto_title(text);
        let history = session.turns.clone();
        session.push_user(ChatTurn::user(text).with_attachments(options.attachments.clone()));

        let ticket = self.slots.begin(&session.id);
        let request = SendRequest {
            text: text.to_string(),
            attachments: options.attachments,
            history,
            model: options.model,
            agent: options.agent,
            mode: session.mode,
            search: options.search,
            council_models: session.council_models.clone(),
            cancel: ticket.token.clone(),
        };
        let outcome = self.dispatcher.send(request, on_update).await;
        self.slots.finish(&ticket);

        let extraction =
            directives::extract(&outcome.text, &self.dispatcher.config().workspace.labels);
        session.apply(&extraction.effects);
        let text = session
            .commit_response(
                &extraction.cleaned_text,
                outcome.reasoning.clone(),
                &outcome.model,
                session.mode == SessionMode::Council,
            )
            .text
            .clone();

        if let Err(e) = self.store.save(session) {
            tracing::warn!("Failed to save session {}: {}", session.id, e);
        }

        TurnReport {
            outcome,
            effects: extraction.effects,
            text,
        }
    }

    /// Replaces the session title with a model-generated one.
    /// Holds the session's slot, so [`Workspace::cancel`] stops it.
    pub async fn retitle(&self, session: &mut Session) -> String {
        let ticket = self.slots.begin(&session.id);
        let title = self
            .dispatcher
            .generate_title(&session.turns, &session.title, &ticket.token)
            .await;
        self.slots.finish(&ticket);
        if title == session.title {
            return title;
        }

        session.apply(&[SideEffect::Rename(title.clone())]);
        if let Err(e) = self.store.save(session) {
            tracing::warn!("Failed to save session {}: {}", session.id, e);
        }
        title
    }

    /// Adds model-suggested labels to the session and returns the new ids.
    pub async fn auto_label(&self, session: &mut Session) -> Vec<String> {
        let labels = &self.dispatcher.config().workspace.labels;
        let ticket = self.slots.begin(&session.id);
        let suggested = self
            .dispatcher
            .suggest_labels(&session.turns, labels, &ticket.token)
            .await;
        self.slots.finish(&ticket);

        let added: Vec<String> = suggested
            .into_iter()
            .filter(|id| !session.label_ids.contains(id))
            .collect();
        if added.is_empty() {
            return added;
        }
        let effects: Vec<SideEffect> = added.iter().cloned().map(SideEffect::AddLabel).collect();
        session.apply(&effects);
        if let Err(e) = self.store.save(session) {
            tracing::warn!("Failed to save session {}: {}", session.id, e);
        }
        added
    }
}
