use super::{
    ChatState,
    handler::{
        AgentCommand, ClearCommand, CouncilCommand, HelpCommand, LabelCommand, ModeCommand,
        ModelCommand, QuitCommand, SearchCommand, StatusCommand, TitleCommand,
    },
    registry::CommandRegistry,
};
use crate::core::error::ShuperError;
use std::sync::Arc;

#[derive(Clone)]
pub struct CommandDispatcher {
    registry: Arc<CommandRegistry>,
}

impl CommandDispatcher {
    pub fn new(registry: Arc<CommandRegistry>) -> Self {
        Self { registry }
    }

    /// Parses `/name args...` and runs it.
    pub fn execute_line(
        &self,
        line: &str,
        state: &mut ChatState,
    ) -> Result<Option<String>, ShuperError> {
        let parts: Vec<&str> = line.trim_start_matches('/').split_whitespace().collect();
        let Some((command, args)) = parts.split_first() else {
            return Ok(None);
        };
        self.execute(command, args, state)
    }

    pub fn execute(
        &self,
        command: &str,
        args: &[&str],
        state: &mut ChatState,
    ) -> Result<Option<String>, ShuperError> {
        self.registry.execute(command, args, state)
    }

    pub fn get_command_names(&self) -> Vec<String> {
        self.registry.get_command_names()
    }
}

pub fn create_command_registry() -> CommandDispatcher {
    let mut registry = CommandRegistry::new();

    registry.register("quit", QuitCommand);
    registry.register("clear", ClearCommand);
    registry.register("model", ModelCommand);
    registry.register("mode", ModeCommand);
    registry.register("search", SearchCommand);
    registry.register("agent", AgentCommand);
    registry.register("status", StatusCommand);
    registry.register("title", TitleCommand);
    registry.register("label", LabelCommand);
    registry.register("council", CouncilCommand);

    let help = HelpCommand::new(registry.help_lines());
    registry.register("help", help);

    CommandDispatcher::new(Arc::new(registry))
}
