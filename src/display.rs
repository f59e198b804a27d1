use crate::core::types::Label;
use crate::directives::SideEffect;
use crate::dispatch::{TurnState, council};
use crate::providers::StreamAccumulator;
use crate::session::Session;
use console::style;
use std::io::{self, Write};
use termimad::MadSkin;

/// Prints only the newly arrived part of a growing reply.
/// Answer text goes to stdout, reasoning to stderr.
/// When stdout is not a terminal only reasoning is streamed and the answer is
/// printed once at the end.
#[derive(Debug, Default)]
pub struct StreamPrinter {
    text: String,
    reasoning_len: usize,
    live_text: bool,
}

impl StreamPrinter {
    pub fn new() -> Self {
        Self {
            live_text: console::Term::stdout().is_term(),
            ..Self::default()
        }
    }

    pub fn update(&mut self, acc: &StreamAccumulator) {
        if let Some(fresh) = acc.reasoning.get(self.reasoning_len..).filter(|s| !s.is_empty()) {
            eprint!("{}", style(fresh).dim());
            self.reasoning_len = acc.reasoning.len();
            io::stderr().flush().ok();
        }
        if !self.live_text {
            return;
        }
        if let Some(fresh) = acc.text.get(self.text.len()..).filter(|s| !s.is_empty()) {
            if self.text.is_empty() && self.reasoning_len > 0 {
                eprintln!();
            }
            print!("{}", fresh);
            self.text.push_str(fresh);
            io::stdout().flush().ok();
        }
    }

    /// Erases the raw streamed answer so the final text can be rendered in its place.
    pub fn clear_streamed(&mut self) {
        if self.reasoning_len > 0 {
            eprintln!();
            self.reasoning_len = 0;
        }
        if self.text.is_empty() {
            return;
        }
        let term = console::Term::stdout();
        let width = (term.size().1 as usize).max(1);
        let rows: usize = self
            .text
            .split('\n')
            .map(|line| console::measure_text_width(line).max(1).div_ceil(width))
            .sum();
        term.clear_last_lines(rows.saturating_sub(1)).ok();
        term.clear_line().ok();
        self.text.clear();
    }
}

fn terminal_width() -> usize {
    let term = console::Term::stdout();
    (term.size().1 as usize).clamp(40, 120)
}

pub fn display_markdown(text: &str) {
    let skin = MadSkin::default();
    skin.print_text(text);
}

pub fn display_response_header(model: &str) {
    let name = if model == council::COUNCIL_MODEL_TAG {
        "Council".to_string()
    } else {
        council::display_name(model).to_string()
    };
    println!("\n{}", style(format!("● {}", name)).bold().blue());
    println!("{}", style("─".repeat(terminal_width())).dim());
}

/// Final rendering once the stream has finished.
pub fn display_final(text: &str, state: TurnState) {
    match state {
        TurnState::Errored => eprintln!("{}", style(text).bold().red()),
        TurnState::Cancelled => println!("\n{}", style(text).yellow()),
        _ => display_markdown(text),
    }
}

pub fn display_effects(effects: &[SideEffect], labels: &[Label]) {
    for effect in effects {
        let line = match effect {
            SideEffect::SetStatus(status) => format!("status → {}", status),
            SideEffect::Rename(title) => format!("renamed → {}", title),
            SideEffect::AddLabel(id) => {
                let name = labels
                    .iter()
                    .find(|l| &l.id == id)
                    .map(|l| l.name.as_str())
                    .unwrap_or(id.as_str());
                format!("label + {}", name)
            }
        };
        println!("{} {}", style("⚙").cyan(), style(line).dim());
    }
}

pub fn display_session(session: &Session, labels: &[Label]) {
    let label_names: Vec<&str> = session
        .label_ids
        .iter()
        .filter_map(|id| labels.iter().find(|l| &l.id == id))
        .map(|l| l.name.as_str())
        .collect();
    println!(
        "{} {}  {} {}  {} {}",
        style("session").dim(),
        style(&session.id).bold(),
        style("mode").dim(),
        session.mode,
        style("status").dim(),
        session.status
    );
    println!("{} {}", style("title").dim(), style(&session.title).bold());
    if !label_names.is_empty() {
        println!("{} {}", style("labels").dim(), label_names.join(", "));
    }
}

pub fn display_error(message: &str) {
    eprintln!("{} {}", style("Error:").bold().red(), message);
}

pub fn display_info(message: &str) {
    println!("{}", style(message).dim());
}
