use super::{ChatState, PendingAction};
use crate::core::error::ShuperError;
use crate::core::types::{SessionMode, SessionStatus};
use crate::directives::SideEffect;
use crate::providers::ProviderFamily;
use crate::search::SearchProvider;

use console::style;

pub trait CommandHandler: Send + Sync {
    fn execute(&self, state: &mut ChatState, args: &[&str]) -> Result<Option<String>, ShuperError>;
    fn help(&self) -> &'static str;
}

pub struct QuitCommand;
pub struct HelpCommand {
    lines: Vec<&'static str>,
}
pub struct ClearCommand;
pub struct ModelCommand;
pub struct ModeCommand;
pub struct SearchCommand;
pub struct AgentCommand;
pub struct StatusCommand;
pub struct TitleCommand;
pub struct LabelCommand;
pub struct CouncilCommand;

impl CommandHandler for QuitCommand {
    fn execute(&self, state: &mut ChatState, _args: &[&str]) -> Result<Option<String>, ShuperError> {
        state.should_continue = false;
        Ok(None)
    }

    fn help(&self) -> &'static str {
        "/quit - Exit the chat session"
    }
}

impl HelpCommand {
    const LINE: &'static str = "/help - Show available commands";

    /// `lines` are the help entries of the other registered commands.
    pub fn new(mut lines: Vec<&'static str>) -> Self {
        lines.push(Self::LINE);
        lines.sort_unstable();
        Self { lines }
    }
}

impl CommandHandler for HelpCommand {
    fn execute(
        &self,
        _state: &mut ChatState,
        _args: &[&str],
    ) -> Result<Option<String>, ShuperError> {
        let title = style("Available Commands").bold().underlined().to_string();
        let body = std::iter::once(title)
            .chain(self.lines.iter().map(|l| style(l).to_string()))
            .collect::<Vec<_>>()
            .join("\n");
        Ok(Some(body))
    }

    fn help(&self) -> &'static str {
        Self::LINE
    }
}

impl CommandHandler for ClearCommand {
    fn execute(&self, state: &mut ChatState, _args: &[&str]) -> Result<Option<String>, ShuperError> {
        state.session.clear_turns();
        Ok(Some("Chat history cleared.".to_string()))
    }

    fn help(&self) -> &'static str {
        "/clear - Clear conversation history"
    }
}

impl CommandHandler for ModelCommand {
    fn execute(&self, state: &mut ChatState, args: &[&str]) -> Result<Option<String>, ShuperError> {
        let Some(model) = args.first() else {
            let mut out = format!("Current model: {}", state.model);
            for family in [
                ProviderFamily::Gemini,
                ProviderFamily::OpenRouter,
                ProviderFamily::Routeway,
            ] {
                out.push_str(&format!(
                    "\n{}: {}",
                    style(family.display_name()).bold(),
                    state.registry.known_models(family).join(", ")
                ));
            }
            return Ok(Some(out));
        };

        let descriptor = state.registry.resolve(model)?;
        state.model = descriptor.model_id;
        Ok(Some(format!(
            "Model changed to: {} ({})",
            state.model,
            descriptor.family.display_name()
        )))
    }

    fn help(&self) -> &'static str {
        "/model <id> - Show or change the current model"
    }
}

impl CommandHandler for ModeCommand {
    fn execute(&self, state: &mut ChatState, args: &[&str]) -> Result<Option<String>, ShuperError> {
        match args.first() {
            None => Ok(Some(format!("Current mode: {}", state.session.mode))),
            Some(mode) => {
                state.session.mode = mode.parse::<SessionMode>()?;
                Ok(Some(format!("Mode changed to: {}", state.session.mode)))
            }
        }
    }

    fn help(&self) -> &'static str {
        "/mode <explore|execute|council> - Show or change the session mode"
    }
}

impl CommandHandler for SearchCommand {
    fn execute(&self, state: &mut ChatState, args: &[&str]) -> Result<Option<String>, ShuperError> {
        match args.first().copied() {
            None => Ok(Some(match state.search {
                Some(p) => format!("Web search: {}", p.display_name()),
                None => "Web search: off".to_string(),
            })),
            Some("off") => {
                state.search = None;
                Ok(Some("Web search disabled.".to_string()))
            }
            Some(name) => {
                let provider = name.parse::<SearchProvider>()?;
                state.search = Some(provider);
                Ok(Some(format!("Web search enabled via {}.", provider.display_name())))
            }
        }
    }

    fn help(&self) -> &'static str {
        "/search <scira|exa|tavily|off> - Toggle web search for the next turns"
    }
}

impl CommandHandler for AgentCommand {
    fn execute(&self, state: &mut ChatState, args: &[&str]) -> Result<Option<String>, ShuperError> {
        match args.first().copied() {
            None if state.agents.is_empty() => Ok(Some("No agents configured.".to_string())),
            None => {
                let lines: Vec<String> = state
                    .agents
                    .iter()
                    .map(|a| {
                        let marker = if state.agent.as_deref() == Some(a.id.as_str()) { "*" } else { " " };
                        format!("{} {} ({}) -> {}", marker, a.id, a.name, a.base_model)
                    })
                    .collect();
                Ok(Some(lines.join("\n")))
            }
            Some("off") => {
                state.agent = None;
                Ok(Some("Agent cleared.".to_string()))
            }
            Some(_) => {
                let wanted = args.join(" ");
                let agent = state
                    .agents
                    .iter()
                    .find(|a| a.id == wanted || a.name.eq_ignore_ascii_case(&wanted))
                    .ok_or_else(|| ShuperError::Input(format!("Unknown agent: {}", wanted)))?;
                state.agent = Some(agent.id.clone());
                Ok(Some(format!("Agent set to {} ({}).", agent.name, agent.base_model)))
            }
        }
    }

    fn help(&self) -> &'static str {
        "/agent <id|off> - List agents or route turns through one"
    }
}

impl CommandHandler for StatusCommand {
    fn execute(&self, state: &mut ChatState, args: &[&str]) -> Result<Option<String>, ShuperError> {
        let Some(value) = args.first() else {
            return Ok(Some(format!("Status: {}", state.session.status)));
        };
        let status = match value.to_lowercase().as_str() {
            "in_progress" => SessionStatus::InProgress,
            other => SessionStatus::from_directive(other)
                .ok_or_else(|| ShuperError::Input(format!("Unknown status: {}", other)))?,
        };
        state.session.apply(&[SideEffect::SetStatus(status)]);
        Ok(Some(format!("Status changed to: {}", status)))
    }

    fn help(&self) -> &'static str {
        "/status <value> - Show or change the session status"
    }
}

impl CommandHandler for TitleCommand {
    fn execute(&self, state: &mut ChatState, args: &[&str]) -> Result<Option<String>, ShuperError> {
        if args.is_empty() {
            state.pending = Some(PendingAction::Retitle);
            return Ok(None);
        }
        let title = args.join(" ");
        state.session.apply(&[SideEffect::Rename(title.clone())]);
        Ok(Some(format!("Renamed to: {}", title)))
    }

    fn help(&self) -> &'static str {
        "/title [text] - Rename the chat, or generate a title when no text is given"
    }
}

impl CommandHandler for LabelCommand {
    fn execute(&self, state: &mut ChatState, args: &[&str]) -> Result<Option<String>, ShuperError> {
        if args.is_empty() {
            state.pending = Some(PendingAction::SuggestLabels);
            return Ok(None);
        }
        let name = args.join(" ");
        let label = state
            .labels
            .iter()
            .find(|l| l.name.eq_ignore_ascii_case(&name))
            .ok_or_else(|| ShuperError::Input(format!("Unknown label: {}", name)))?;
        let message = format!("Label added: {}", label.name);
        state.session.apply(&[SideEffect::AddLabel(label.id.clone())]);
        Ok(Some(message))
    }

    fn help(&self) -> &'static str {
        "/label [name] - Add a label, or let the model suggest labels"
    }
}

impl CommandHandler for CouncilCommand {
    fn execute(&self, state: &mut ChatState, args: &[&str]) -> Result<Option<String>, ShuperError> {
        if args.is_empty() {
            return Ok(Some(if state.session.council_models.is_empty() {
                "Council: configured defaults".to_string()
            } else {
                format!("Council: {}", state.session.council_models.join(", "))
            }));
        }
        for model in args {
            state.registry.resolve(model)?;
        }
        state.session.council_models = args.iter().map(|m| m.to_string()).collect();
        state.session.mode = SessionMode::Council;
        Ok(Some(format!(
            "Council set to: {}",
            state.session.council_models.join(", ")
        )))
    }

    fn help(&self) -> &'static str {
        "/council <model>... - Pick council members and switch to council mode"
    }
}
