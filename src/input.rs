use crate::commands::dispatcher::CommandDispatcher;
use crate::config::Config;
use crate::core::error::ShuperError;

use console::style;
use rustyline::completion::{Completer, FilenameCompleter, Pair};
use rustyline::error::ReadlineError;
use rustyline::highlight::{Highlighter, MatchingBracketHighlighter};
use rustyline::hint::{Hinter, HistoryHinter};
use rustyline::history::FileHistory;
use rustyline::validate::Validator;
use rustyline::{CompletionType, Context, EditMode, Editor, Helper};
use std::borrow::Cow;

/// Completes slash commands, their arguments, and file paths.
pub struct ChatCompleter {
    filename_completer: FilenameCompleter,
    commands: CommandDispatcher,
    models: Vec<String>,
}

impl ChatCompleter {
    pub fn new(commands: CommandDispatcher, models: Vec<String>) -> Self {
        Self {
            filename_completer: FilenameCompleter::new(),
            commands,
            models,
        }
    }

    fn argument_candidates(&self, command: &str) -> Vec<String> {
        let fixed = |values: &[&str]| -> Vec<String> { values.iter().map(|v| v.to_string()).collect() };
        match command {
            "model" | "council" => self.models.clone(),
            "mode" => fixed(&["explore", "execute", "council"]),
            "search" => fixed(&["scira", "exa", "tavily", "off"]),
            "status" => fixed(&[
                "backlog",
                "todo",
                "in_progress",
                "needs_review",
                "done",
                "cancelled",
                "archive",
            ]),
            _ => Vec::new(),
        }
    }
}

fn pairs<'a>(candidates: impl Iterator<Item = &'a String>, prefix: &str) -> Vec<Pair> {
    candidates
        .filter(|c| c.starts_with(prefix))
        .map(|c| Pair {
            display: c.clone(),
            replacement: c.clone(),
        })
        .collect()
}

impl Completer for ChatCompleter {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        if let Some(body) = line[..pos].strip_prefix('/') {
            match body.split_once(' ') {
                None => {
                    let names = self.commands.get_command_names();
                    return Ok((1, pairs(names.iter(), body)));
                }
                Some((command, rest)) => {
                    let word_start = rest.rfind(' ').map(|i| i + 1).unwrap_or(0);
                    let candidates = self.argument_candidates(command);
                    if !candidates.is_empty() {
                        let start = 1 + command.len() + 1 + word_start;
                        return Ok((start, pairs(candidates.iter(), &rest[word_start..])));
                    }
                }
            }
        }

        self.filename_completer.complete(line, pos, ctx)
    }
}

pub struct ChatHelper {
    completer: ChatCompleter,
    highlighter: MatchingBracketHighlighter,
    hinter: HistoryHinter,
}

impl ChatHelper {
    pub fn new(commands: CommandDispatcher, models: Vec<String>) -> Self {
        Self {
            completer: ChatCompleter::new(commands, models),
            highlighter: MatchingBracketHighlighter::new(),
            hinter: HistoryHinter {},
        }
    }
}

impl Helper for ChatHelper {}

impl Completer for ChatHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        self.completer.complete(line, pos, ctx)
    }
}

impl Hinter for ChatHelper {
    type Hint = String;

    fn hint(&self, line: &str, pos: usize, ctx: &Context<'_>) -> Option<String> {
        self.hinter.hint(line, pos, ctx)
    }
}

impl Highlighter for ChatHelper {
    fn highlight<'l>(&self, line: &'l str, pos: usize) -> Cow<'l, str> {
        self.highlighter.highlight(line, pos)
    }

    fn highlight_hint<'h>(&self, hint: &'h str) -> Cow<'h, str> {
        Cow::Owned(style(hint).dim().to_string())
    }

    fn highlight_candidate<'c>(
        &self,
        candidate: &'c str,
        completion: CompletionType,
    ) -> Cow<'c, str> {
        self.highlighter.highlight_candidate(candidate, completion)
    }
}

impl Validator for ChatHelper {}

pub type ChatEditor = Editor<ChatHelper, FileHistory>;

pub fn create_editor(
    commands: CommandDispatcher,
    models: Vec<String>,
) -> Result<ChatEditor, ShuperError> {
    let config = rustyline::Config::builder()
        .history_ignore_space(true)
        .auto_add_history(true)
        .completion_type(CompletionType::List)
        .edit_mode(EditMode::Emacs)
        .build();

    let mut editor = Editor::with_config(config)
        .map_err(|e| ShuperError::Input(format!("Failed to create line editor: {}", e)))?;
    editor.set_helper(Some(ChatHelper::new(commands, models)));

    if let Err(e) = editor.load_history(&Config::history_path()) {
        tracing::debug!("No input history loaded: {}", e);
    }

    Ok(editor)
}

pub fn read_input(editor: &mut ChatEditor, session_title: &str) -> Result<Option<String>, ShuperError> {
    let prompt = format!("{} {} ", style(session_title).dim(), style(">").bold().cyan());
    match editor.readline(&prompt) {
        Ok(line) => Ok(Some(line)),
        Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => {
            println!("Exiting...");
            Ok(None)
        }
        Err(err) => Err(ShuperError::Input(format!("Input error: {}", err))),
    }
}

pub fn save_history(editor: &mut ChatEditor) -> Result<(), ShuperError> {
    let history_path = Config::history_path();
    if let Some(parent) = history_path.parent() {
        if !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }

    editor
        .save_history(&history_path)
        .map_err(|e| ShuperError::Input(format!("Failed to save history: {}", e)))
}
