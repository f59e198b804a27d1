//! Turns a chat request into provider calls and folds the result into one outcome.

use crate::config::{ApiKeys, Config};
use crate::core::error::ShuperError;
use crate::core::types::{Agent, Attachment, ChatTurn, Label, SessionMode};
use crate::providers::{
    DispatchRequest, ProviderDescriptor, ProviderFactory, ProviderFamily, ProviderRegistry,
    ReasoningConfig, STOPPED_BY_USER, StreamAccumulator, StreamOutcome, UpdateFn,
};
use crate::search::{SearchClient, SearchProvider};
use futures::future::join_all;
use std::fmt;
use tokio_util::sync::CancellationToken;

pub mod council;
pub mod prompt;

use council::{COUNCIL_MODEL_TAG, CouncilMember, CouncilResult};

pub const EXECUTE_THINKING_BUDGET: u32 = 32768;
pub const EXECUTE_REASONING_EFFORT: &str = "high";

/// Lifecycle of one chat turn.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    #[default]
    Idle,
    Sending,
    Streaming,
    Completed,
    Cancelled,
    Errored,
}

impl TurnState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TurnState::Completed | TurnState::Cancelled | TurnState::Errored
        )
    }

    pub fn can_transition_to(self, next: TurnState) -> bool {
        use TurnState::*;
        matches!(
            (self, next),
            (Idle, Sending)
                | (Sending, Streaming)
                | (Sending, Cancelled)
                | (Sending, Errored)
                | (Streaming, Completed)
                | (Streaming, Cancelled)
                | (Streaming, Errored)
        )
    }

    /// Moves to `next` when the transition is legal; illegal moves are logged and ignored.
    pub fn advance(&mut self, next: TurnState) {
        if self.can_transition_to(next) {
            *self = next;
        } else {
            tracing::warn!("Ignoring turn transition {} -> {}", self, next);
        }
    }
}

impl fmt::Display for TurnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TurnState::Idle => "idle",
            TurnState::Sending => "sending",
            TurnState::Streaming => "streaming",
            TurnState::Completed => "completed",
            TurnState::Cancelled => "cancelled",
            TurnState::Errored => "errored",
        };
        f.write_str(name)
    }
}

/// One user submission.
#[derive(Debug, Clone, Default)]
pub struct SendRequest {
    pub text: String,
    pub attachments: Vec<Attachment>,
    /// Prior turns, oldest first.
    pub history: Vec<ChatTurn>,
    /// Raw model selection; ignored when `agent` resolves.
    pub model: String,
    pub agent: Option<String>,
    pub mode: SessionMode,
    pub search: Option<SearchProvider>,
    /// Council members; empty falls back to the configured set.
    pub council_models: Vec<String>,
    pub cancel: CancellationToken,
}

/// Result of a send. Failures are carried as `Error: ...` text, never raised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub text: String,
    pub reasoning: Option<String>,
    /// Model that produced the answer, or `council`.
    pub model: String,
    pub state: TurnState,
}

impl DispatchOutcome {
    pub fn is_error(&self) -> bool {
        self.state == TurnState::Errored
    }
}

pub fn error_text(err: &ShuperError) -> String {
    format!("Error: {}", err)
}

pub struct Dispatcher {
    config: Config,
    keys: ApiKeys,
    registry: ProviderRegistry,
    factory: ProviderFactory,
    search: SearchClient,
}

impl Dispatcher {
    /// Keys missing from the config are taken from the environment.
    pub fn new(config: Config) -> Self {
        let keys = config.api_keys.with_env_fallback();
        Self::with_keys(config, keys)
    }

    pub fn with_keys(config: Config, keys: ApiKeys) -> Self {
        let registry = ProviderRegistry::new(&config.models, &config.endpoints);
        let search = SearchClient::new(config.endpoints.clone(), config.search.clone());
        Self {
            config,
            keys,
            registry,
            factory: ProviderFactory::new(),
            search,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub fn keys(&self) -> &ApiKeys {
        &self.keys
    }

    fn search_key(&self, provider: SearchProvider) -> &str {
        let key = match provider {
            SearchProvider::Scira => &self.keys.scira,
            SearchProvider::Exa => &self.keys.exa,
            SearchProvider::Tavily => &self.keys.tavily,
        };
        key.as_deref().unwrap_or_default()
    }

    /// Resolves the model that will actually serve a turn in `mode`.
    pub fn effective_descriptor(
        &self,
        model_id: &str,
        mode: SessionMode,
    ) -> Result<ProviderDescriptor, ShuperError> {
        let descriptor = self.registry.resolve(model_id)?;
        if mode == SessionMode::Execute
            && descriptor.family == ProviderFamily::Gemini
            && descriptor.model_id != self.config.models.execute
        {
            tracing::debug!(
                "Execute mode: upgrading {} to {}",
                descriptor.model_id,
                self.config.models.execute
            );
            return self.registry.resolve(&self.config.models.execute);
        }
        Ok(descriptor)
    }

    pub fn reasoning_for(descriptor: &ProviderDescriptor, mode: SessionMode) -> ReasoningConfig {
        let execute = mode == SessionMode::Execute;
        match descriptor.family {
            ProviderFamily::Gemini if descriptor.supports_reasoning_budget => ReasoningConfig {
                thinking_budget: Some(if execute { EXECUTE_THINKING_BUDGET } else { 0 }),
                effort: None,
            },
            ProviderFamily::Gemini => ReasoningConfig::default(),
            ProviderFamily::OpenRouter | ProviderFamily::Routeway => ReasoningConfig {
                thinking_budget: None,
                effort: execute.then(|| EXECUTE_REASONING_EFFORT.to_string()),
            },
        }
    }

    fn find_agent(&self, agent: Option<&str>) -> Result<Option<&Agent>, ShuperError> {
        match agent.map(str::trim).filter(|a| !a.is_empty()) {
            None => Ok(None),
            Some(id) => self
                .config
                .find_agent(id)
                .map(Some)
                .ok_or_else(|| ShuperError::Input(format!("Unknown agent: {}", id))),
        }
    }

    /// Runs one model end to end and returns the outcome with the model id used.
    #[allow(clippy::too_many_arguments)]
    async fn run_model(
        &self,
        model_id: &str,
        mode: SessionMode,
        system_instruction: &str,
        history: &[ChatTurn],
        user_text: &str,
        attachments: &[Attachment],
        cancel: &CancellationToken,
        on_update: &mut UpdateFn<'_>,
    ) -> Result<(StreamOutcome, String), ShuperError> {
        let descriptor = self.effective_descriptor(model_id, mode)?;
        let provider = self.factory.create(&descriptor, &self.keys)?;
        let model = descriptor.model_id.clone();
        tracing::info!(
            "Sending to {} via {}",
            model,
            descriptor.family.display_name()
        );

        let request = DispatchRequest {
            reasoning: Self::reasoning_for(&descriptor, mode),
            descriptor,
            system_instruction: system_instruction.to_string(),
            history: history.to_vec(),
            user_text: user_text.to_string(),
            attachments: attachments.to_vec(),
            cancel: cancel.clone(),
        };
        let outcome = provider.stream_chat(&request, on_update).await?;
        Ok((outcome, model))
    }

    /// Runs web search, if requested, and returns `(note, enhanced_text)`.
    /// `None` means the turn was cancelled while searching.
    async fn augment_with_search(
        &self,
        request: &SendRequest,
    ) -> Option<(Option<String>, String)> {
        let Some(provider) = request.search else {
            return Some((None, request.text.clone()));
        };

        let search = self
            .search
            .search(&request.text, provider, self.search_key(provider));
        let result = tokio::select! {
            biased;
            _ = request.cancel.cancelled() => return None,
            result = search => result,
        };

        Some(match result {
            Ok(markdown) => (
                Some(prompt::search_performed_note(provider)),
                prompt::search_context(&markdown, &request.text),
            ),
            Err(e) => {
                tracing::warn!("{} search failed: {}", provider.display_name(), e);
                (
                    Some(prompt::search_failed_note(provider, &e.to_string())),
                    request.text.clone(),
                )
            }
        })
    }

    /// Dispatches one turn. Never fails: errors come back as `Error: ...` text.
    pub async fn send(&self, request: SendRequest, on_update: &mut UpdateFn<'_>) -> DispatchOutcome {
        let mut state = TurnState::Idle;
        state.advance(TurnState::Sending);

        let Some((note, user_text)) = self.augment_with_search(&request).await else {
            tracing::info!("Send cancelled during search");
            state.advance(TurnState::Cancelled);
            return DispatchOutcome {
                text: STOPPED_BY_USER.to_string(),
                reasoning: None,
                model: request.model.clone(),
                state,
            };
        };

        let agent = match self.find_agent(request.agent.as_deref()) {
            Ok(agent) => agent,
            Err(e) => {
                state.advance(TurnState::Errored);
                return DispatchOutcome {
                    text: error_text(&e),
                    reasoning: note,
                    model: request.model.clone(),
                    state,
                };
            }
        };
        let model_id = agent
            .map(|a| a.base_model.clone())
            .unwrap_or_else(|| request.model.clone());
        let system = prompt::system_instruction(&self.config.workspace, agent, request.mode);

        let note_ref = note.as_deref();
        let mut forward = |acc: &StreamAccumulator| {
            let view = StreamAccumulator {
                text: acc.text.clone(),
                reasoning: prompt::combine_reasoning(note_ref, acc.reasoning()).unwrap_or_default(),
            };
            on_update(&view);
        };

        if request.mode == SessionMode::Council {
            return self
                .send_council(&request, &system, &user_text, note_ref, state, &mut forward)
                .await;
        }

        state.advance(TurnState::Streaming);
        let result = self
            .run_model(
                &model_id,
                request.mode,
                &system,
                &request.history,
                &user_text,
                &request.attachments,
                &request.cancel,
                &mut forward,
            )
            .await;

        match result {
            Ok((outcome, model)) => {
                state.advance(if outcome.is_cancelled() {
                    TurnState::Cancelled
                } else {
                    TurnState::Completed
                });
                DispatchOutcome {
                    text: outcome.text().to_string(),
                    reasoning: prompt::combine_reasoning(note_ref, outcome.reasoning()),
                    model,
                    state,
                }
            }
            Err(e) => {
                tracing::warn!("Send to {} failed: {}", model_id, e);
                state.advance(TurnState::Errored);
                DispatchOutcome {
                    text: error_text(&e),
                    reasoning: note.clone(),
                    model: model_id,
                    state,
                }
            }
        }
    }

    async fn send_council(
        &self,
        request: &SendRequest,
        system: &str,
        user_text: &str,
        note: Option<&str>,
        mut state: TurnState,
        on_update: &mut UpdateFn<'_>,
    ) -> DispatchOutcome {
        let models = council::select_members(&request.council_models, &self.config.models.council);
        tracing::info!("Convening council of {} models", models.len());

        let calls = models.iter().map(|model| async move {
            let result = self
                .run_model(
                    model,
                    SessionMode::Explore,
                    system,
                    &request.history,
                    user_text,
                    &request.attachments,
                    &request.cancel,
                    &mut |_: &StreamAccumulator| {},
                )
                .await;
            let text = match result {
                Ok((outcome, _)) => outcome.text().to_string(),
                Err(e) => {
                    tracing::warn!("Council member {} failed: {}", model, e);
                    error_text(&e)
                }
            };
            CouncilMember {
                model: model.clone(),
                text,
            }
        });
        let members = join_all(calls).await;

        state.advance(TurnState::Streaming);
        if request.cancel.is_cancelled() {
            state.advance(TurnState::Cancelled);
            return DispatchOutcome {
                text: STOPPED_BY_USER.to_string(),
                reasoning: note.map(str::to_string),
                model: COUNCIL_MODEL_TAG.to_string(),
                state,
            };
        }

        let synthesis_prompt = council::synthesis_prompt(&request.text, &members);
        let synthesis = self
            .run_model(
                &self.config.models.synthesis,
                SessionMode::Explore,
                system,
                &request.history,
                &synthesis_prompt,
                &[],
                &request.cancel,
                on_update,
            )
            .await;

        let (synthesis_text, reasoning, next) = match synthesis {
            Ok((outcome, _)) => (
                outcome.text().to_string(),
                outcome.reasoning().map(str::to_string),
                if outcome.is_cancelled() {
                    TurnState::Cancelled
                } else {
                    TurnState::Completed
                },
            ),
            Err(e) => {
                tracing::warn!("Council synthesis failed: {}", e);
                (error_text(&e), None, TurnState::Errored)
            }
        };
        state.advance(next);

        let result = CouncilResult {
            members,
            synthesis: synthesis_text,
        };
        DispatchOutcome {
            text: result.merged_text(),
            reasoning: prompt::combine_reasoning(note, reasoning.as_deref()),
            model: COUNCIL_MODEL_TAG.to_string(),
            state,
        }
    }

    /// Collects a whole reply from the utility model without streaming to the caller.
    /// `None` when the request was cancelled.
    async fn complete_utility(
        &self,
        history: &[ChatTurn],
        user_text: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<String>, ShuperError> {
        let (outcome, _) = self
            .run_model(
                &self.config.models.title,
                SessionMode::Explore,
                "",
                history,
                user_text,
                &[],
                cancel,
                &mut |_: &StreamAccumulator| {},
            )
            .await?;
        if outcome.is_cancelled() {
            return Ok(None);
        }
        Ok(Some(outcome.text().trim().to_string()))
    }

    /// Asks the title model for a short title; failure or cancellation keeps `current`.
    pub async fn generate_title(
        &self,
        history: &[ChatTurn],
        current: &str,
        cancel: &CancellationToken,
    ) -> String {
        let start = history.len().saturating_sub(prompt::TITLE_HISTORY_TURNS);
        match self
            .complete_utility(&history[start..], prompt::TITLE_PROMPT, cancel)
            .await
        {
            Ok(Some(title)) if !title.is_empty() => title.trim_matches('"').trim().to_string(),
            Ok(_) => current.to_string(),
            Err(e) => {
                tracing::warn!("Title generation failed: {}", e);
                current.to_string()
            }
        }
    }

    /// Label ids the utility model considers applicable; unknown ids are dropped.
    pub async fn suggest_labels(
        &self,
        history: &[ChatTurn],
        labels: &[Label],
        cancel: &CancellationToken,
    ) -> Vec<String> {
        if labels.is_empty() {
            return Vec::new();
        }
        let start = history.len().saturating_sub(prompt::LABEL_HISTORY_TURNS);
        let reply = match self
            .complete_utility(&history[start..], &prompt::label_prompt(labels), cancel)
            .await
        {
            Ok(Some(reply)) => reply,
            Ok(None) => return Vec::new(),
            Err(e) => {
                tracing::warn!("Label suggestion failed: {}", e);
                return Vec::new();
            }
        };
        parse_label_ids(&reply, labels)
    }
}

/// Pulls a JSON string array out of a reply that may be wrapped in prose or fences.
fn parse_label_ids(reply: &str, labels: &[Label]) -> Vec<String> {
    let (Some(start), Some(end)) = (reply.find('['), reply.rfind(']')) else {
        return Vec::new();
    };
    if end < start {
        return Vec::new();
    }
    let ids: Vec<String> = serde_json::from_str(&reply[start..=end]).unwrap_or_default();
    let mut out: Vec<String> = Vec::new();
    for id in ids {
        if labels.iter().any(|l| l.id == id) && !out.contains(&id) {
            out.push(id);
        }
    }
    out
}
