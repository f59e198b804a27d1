pub mod dispatcher;
pub mod handler;
pub mod registry;

use crate::core::types::{Agent, Label};
use crate::providers::ProviderRegistry;
use crate::search::SearchProvider;
use crate::session::Session;
use crate::workspace::TurnOptions;
pub use dispatcher::create_command_registry;

/// Work a slash command needs the async loop to finish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingAction {
    Retitle,
    SuggestLabels,
}

pub struct ChatState {
    pub session: Session,
    pub model: String,
    pub agent: Option<String>,
    pub search: Option<SearchProvider>,
    pub registry: ProviderRegistry,
    pub agents: Vec<Agent>,
    pub labels: Vec<Label>,
    pub should_continue: bool,
    pub pending: Option<PendingAction>,
}

impl ChatState {
    pub fn new(session: Session, model: &str, registry: ProviderRegistry) -> Self {
        Self {
            session,
            model: model.to_string(),
            agent: None,
            search: None,
            registry,
            agents: Vec::new(),
            labels: Vec::new(),
            should_continue: true,
            pending: None,
        }
    }

    pub fn turn_options(&self) -> TurnOptions {
        TurnOptions {
            model: self.model.clone(),
            agent: self.agent.clone(),
            search: self.search,
            attachments: Vec::new(),
        }
    }
}
