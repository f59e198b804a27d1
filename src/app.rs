use crate::cli::Args;
use is_terminal::IsTerminal;
use shuper::commands::{ChatState, PendingAction, dispatcher::CommandDispatcher};
use shuper::config::Config;
use shuper::core::error::ShuperError;
use shuper::core::types::{Attachment, SessionMode};
use shuper::dispatch::{Dispatcher, council::COUNCIL_MODEL_TAG};
use shuper::display::{self, StreamPrinter};
use shuper::input;
use shuper::providers::{ProviderFamily, StreamAccumulator};
use shuper::session::Session;
use shuper::store::{FileStore, SessionStore};
use shuper::workspace::{TurnOptions, TurnReport, Workspace};
use std::io::{self, Read};
use std::path::Path;
use std::sync::Arc;
use tokio::task::JoinHandle;

pub struct Application {
    pub args: Args,
    pub config: Config,
    pub workspace: Arc<Workspace>,
    pub command_dispatcher: CommandDispatcher,
}

impl Application {
    pub fn new(
        args: Args,
        config: Config,
        command_dispatcher: CommandDispatcher,
    ) -> Result<Self, ShuperError> {
        let store = FileStore::open(Config::data_path())?;
        let dispatcher = Arc::new(Dispatcher::new(config.clone()));
        if !dispatcher.keys().any_present() {
            display::display_info(&format!(
                "No API keys configured. Add them to {} or set GEMINI_API_KEY / OPENROUTER_API_KEY.",
                Config::default_path().display()
            ));
        }
        let workspace = Arc::new(Workspace::new(
            dispatcher,
            SessionStore::new(Arc::new(store)),
        ));
        Ok(Self {
            args,
            config,
            workspace,
            command_dispatcher,
        })
    }

    pub async fn run(&mut self) -> Result<(), ShuperError> {
        let context = if !io::stdin().is_terminal() {
            let mut buffer = String::new();
            io::stdin()
                .read_to_string(&mut buffer)
                .map_err(|e| ShuperError::Input(format!("Failed to read from stdin: {}", e)))?;
            Some(buffer).filter(|b| !b.trim().is_empty())
        } else {
            None
        };

        let result = if self.args.chat {
            self.handle_continuous_chat_mode().await
        } else {
            self.handle_chat_mode(context).await
        };

        self.workspace.store().flush().await?;
        result
    }

    fn open_session(&self) -> Session {
        let mut session = self.workspace.open_session(self.args.session.as_deref());
        if let Some(mode) = self.args.mode {
            session.mode = mode;
        }
        session
    }

    fn initial_model(&self) -> String {
        self.args
            .model
            .clone()
            .or_else(|| {
                self.args
                    .agent
                    .as_deref()
                    .and_then(|id| self.config.find_agent(id))
                    .map(|agent| agent.base_model.clone())
            })
            .unwrap_or_else(|| self.config.models.default.clone())
    }

    /// Ctrl-C cancels whatever the session is currently waiting on.
    fn spawn_interrupt(&self, session_id: &str) -> JoinHandle<()> {
        let workspace = Arc::clone(&self.workspace);
        let session_id = session_id.to_string();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Interrupt received, stopping reply for {}", session_id);
                workspace.cancel(&session_id);
            }
        })
    }

    /// Streams one reply, then swaps the raw stream for the cleaned final text.
    async fn run_turn(&self, session: &mut Session, text: &str, options: TurnOptions) -> TurnReport {
        let header = if session.mode == SessionMode::Council {
            COUNCIL_MODEL_TAG.to_string()
        } else {
            options.model.clone()
        };
        display::display_response_header(&header);

        let interrupt = self.spawn_interrupt(&session.id);
        let mut printer = StreamPrinter::new();
        let mut on_update = |acc: &StreamAccumulator| printer.update(acc);
        let report = self
            .workspace
            .send_turn(session, text, options, &mut on_update)
            .await;
        interrupt.abort();

        printer.clear_streamed();
        display::display_final(&report.text, report.outcome.state);
        display::display_effects(&report.effects, &self.config.workspace.labels);
        report
    }

    async fn handle_chat_mode(&self, context: Option<String>) -> Result<(), ShuperError> {
        let final_query = match (self.args.query.as_deref(), context) {
            (Some(arg_q), Some(stdin_ctx)) => format!("<pipe>{}</pipe>\n\n{}", stdin_ctx, arg_q),
            (None, Some(stdin_ctx)) => format!("<pipe>{}</pipe>", stdin_ctx),
            (Some(arg_q), None) => arg_q.to_string(),
            (None, None) => {
                return Err(ShuperError::Input(
                    "No query provided. Pass a message or use --chat.".to_string(),
                ));
            }
        };

        let mut session = self.open_session();
        let options = TurnOptions {
            model: self.initial_model(),
            agent: self.args.agent.clone(),
            search: self.args.search,
            attachments: load_attachments(&self.args.attachments)?,
        };
        self.run_turn(&mut session, &final_query, options).await;
        Ok(())
    }

    async fn handle_continuous_chat_mode(&mut self) -> Result<(), ShuperError> {
        let registry = self.workspace.dispatcher().registry().clone();
        let models: Vec<String> = [
            ProviderFamily::Gemini,
            ProviderFamily::OpenRouter,
            ProviderFamily::Routeway,
        ]
        .into_iter()
        .flat_map(|family| registry.known_models(family))
        .map(str::to_string)
        .collect();

        let mut state = ChatState::new(self.open_session(), &self.initial_model(), registry);
        state.agent = self.args.agent.clone();
        state.search = self.args.search;
        state.agents = self.config.agents.clone();
        state.labels = self.config.workspace.labels.clone();

        let mut attachments = load_attachments(&self.args.attachments)?;

        println!(
            "Entering chat mode. Type '/help' for available commands. Press Ctrl+D or type /quit to exit."
        );
        display::display_session(&state.session, &state.labels);

        let mut editor = input::create_editor(self.command_dispatcher.clone(), models)?;

        loop {
            let input = match input::read_input(&mut editor, &state.session.title)? {
                Some(input) => input.trim().to_string(),
                None => break,
            };

            if input.is_empty() {
                continue;
            }

            if input.starts_with('/') {
                match self.command_dispatcher.execute_line(&input, &mut state) {
                    Ok(Some(output)) => println!("{}", output),
                    Ok(None) => {}
                    Err(e) => display::display_error(&e.to_string()),
                }
                self.run_pending(&mut state).await;
                if let Err(e) = self.workspace.store().save(&state.session) {
                    tracing::warn!("Failed to save session {}: {}", state.session.id, e);
                }

                if !state.should_continue {
                    break;
                }
                continue;
            }

            let mut options = state.turn_options();
            options.attachments = std::mem::take(&mut attachments);
            self.run_turn(&mut state.session, &input, options).await;
        }

        input::save_history(&mut editor)?;

        Ok(())
    }

    async fn run_pending(&self, state: &mut ChatState) {
        let Some(action) = state.pending.take() else {
            return;
        };
        let interrupt = self.spawn_interrupt(&state.session.id);
        match action {
            PendingAction::Retitle => {
                let title = self.workspace.retitle(&mut state.session).await;
                display::display_info(&format!("Title: {}", title));
            }
            PendingAction::SuggestLabels => {
                let added = self.workspace.auto_label(&mut state.session).await;
                if added.is_empty() {
                    display::display_info("No new labels suggested.");
                } else {
                    let names: Vec<&str> = added
                        .iter()
                        .filter_map(|id| state.labels.iter().find(|l| &l.id == id))
                        .map(|l| l.name.as_str())
                        .collect();
                    display::display_info(&format!("Labels added: {}", names.join(", ")));
                }
            }
        }
        interrupt.abort();
    }
}

fn load_attachments(paths: &[impl AsRef<Path>]) -> Result<Vec<Attachment>, ShuperError> {
    paths
        .iter()
        .map(|path| {
            let path = path.as_ref();
            let bytes = std::fs::read(path).map_err(|e| {
                ShuperError::Input(format!("Failed to read attachment {}: {}", path.display(), e))
            })?;
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());
            Ok(Attachment::from_bytes(name, guess_mime(path), &bytes))
        })
        .collect()
}

fn guess_mime(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "pdf" => "application/pdf",
        "json" => "application/json",
        "xml" => "application/xml",
        "yaml" | "yml" => "application/yaml",
        "toml" => "application/toml",
        "js" => "application/javascript",
        "sh" => "application/x-sh",
        "md" => "text/markdown",
        "csv" => "text/csv",
        "html" | "htm" => "text/html",
        "txt" | "rs" | "py" | "ts" | "tsx" | "go" | "c" | "h" | "log" => "text/plain",
        _ => "application/octet-stream",
    }
}
