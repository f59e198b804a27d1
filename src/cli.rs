use clap::Parser;
use shuper::core::types::SessionMode;
use shuper::search::SearchProvider;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about = "Multi-provider chat workspace in the terminal", long_about = None)]
pub struct Args {
    /// Message to send. Piped stdin is prepended as context.
    pub query: Option<String>,

    /// Model id (Gemini, OpenRouter or Routeway)
    #[arg(short, long)]
    pub model: Option<String>,

    /// Route the turn through a configured agent
    #[arg(long)]
    pub agent: Option<String>,

    /// Session mode [possible values: explore, execute, council]
    #[arg(long)]
    pub mode: Option<SessionMode>,

    /// Augment the message with a web search [possible values: scira, exa, tavily]
    #[arg(long)]
    pub search: Option<SearchProvider>,

    /// Resume a stored session by id
    #[arg(long)]
    pub session: Option<String>,

    /// Attach a file to the message (repeatable)
    #[arg(long = "attach", value_name = "FILE")]
    pub attachments: Vec<PathBuf>,

    /// Start an interactive chat session
    #[arg(short, long)]
    pub chat: bool,

    /// Config file location (default ~/.shuper/config.yaml)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,
}
