//! Prompt text assembled around a user turn.

use crate::config::WorkspaceConfig;
use crate::core::types::{Agent, AgentToolKind, Label, SessionMode};
use crate::search::SearchProvider;

pub const WORKSPACE_PREAMBLE: &str = "You are running in Shuper, an advanced AI workspace.";

pub const TITLE_PROMPT: &str =
    "Summarize this conversation into a 3-5 word title. Return ONLY the title text, no quotes or punctuation.";

/// Turns of history handed to the title model.
pub const TITLE_HISTORY_TURNS: usize = 6;
pub const LABEL_HISTORY_TURNS: usize = 10;

/// Full system instruction: preamble, persona or base knowledge, then the command grammar.
pub fn system_instruction(
    workspace: &WorkspaceConfig,
    agent: Option<&Agent>,
    mode: SessionMode,
) -> String {
    format!(
        "{}\n{}\n\n{}",
        WORKSPACE_PREAMBLE,
        base_instruction(&workspace.base_knowledge, agent),
        command_grammar(&workspace.user_name, mode, &workspace.labels)
    )
}

fn base_instruction(base_knowledge: &str, agent: Option<&Agent>) -> String {
    let Some(agent) = agent else {
        return base_knowledge.to_string();
    };

    let mut inst = format!(
        "{}\n\nUser Context: {}",
        agent.system_instruction, base_knowledge
    );

    let tools: Vec<String> = agent
        .tools
        .iter()
        .filter(|t| t.active)
        .map(|t| match t.kind {
            AgentToolKind::Mcp => format!("- MCP Server: {} (Connected)", t.config),
            AgentToolKind::ApiLinear => "- Linear API Integration (Connected via Key)".to_string(),
            AgentToolKind::ApiGithub | AgentToolKind::ApiCustom => {
                format!("- {}: {}", t.name, t.config)
            }
        })
        .collect();

    if !tools.is_empty() {
        inst.push_str(&format!(
            "\n\nCONNECTED CAPABILITIES:\nYou have been connected to the following external tools and APIs:\n{}\n\n\
             When the user asks to interact with these services (e.g. \"Create a linear issue\", \"Read craft doc\"), \
             assume you have the capability to do so via function calling or context retrieval.",
            tools.join("\n")
        ));
    }
    inst
}

fn command_grammar(user_name: &str, mode: SessionMode, labels: &[Label]) -> String {
    let formatting = match mode {
        SessionMode::Explore => "Answer directly without a formal plan.",
        _ => "Start your response with a quick list of what you are going to do using hyphens (-).",
    };

    let planning = if mode == SessionMode::Execute {
        "\nEXECUTE MODE (PLANNING):\nBriefly list the steps you will take.\nExample:\n- Look at the request.\n- Prepare the answer.\n[Your answer here]\n"
    } else {
        ""
    };

    let label_list = if labels.is_empty() {
        "No labels available.".to_string()
    } else {
        labels
            .iter()
            .map(|l| format!("- {}", l.name))
            .collect::<Vec<_>>()
            .join("\n")
    };

    format!(
        "IDENTITY:
You are a high-performance assistant operating within the \"Shuper\" workspace environment.
CURRENT MODE: {mode}

STRICT CONVERSATION RULES:
1. NO SIGN-OFFS. Just answer the question.
2. NO META-TALK. Don't explain your thoughts in brackets.
3. BE DIRECT. Get straight to the point.
4. BE PERSONAL. Use the user's name ({user_name}) naturally.
5. FORMATTING. {formatting}
{planning}
AVAILABLE LABELS (TAGS):
{label_list}

CAPABILITIES:
- [[TITLE: New Title]] - Change the chat name. ONLY use this if explicitly asked to rename the chat. DO NOT rename chats automatically.
- [[STATUS: backlog | todo | needs_review | done | cancelled | archive]] - Change chat status.
- [[LABEL: Label Name]] - Add a tag. IMPORTANT: ONLY use existing labels listed above. DO NOT create or invent new ones. If a relevant label is not in the list, do not use the LABEL command.",
        mode = mode.as_str().to_uppercase(),
    )
}

pub fn search_context(result: &str, user_text: &str) -> String {
    format!(
        "CONTEXT FROM WEB SEARCH (Use this to answer the user request):\n{}\n\nUSER QUERY:\n{}",
        result, user_text
    )
}

pub fn search_performed_note(provider: SearchProvider) -> String {
    format!(
        "_**{} Search Performed**_\n\n_Based on your query, I searched for information._\n\n",
        provider.display_name()
    )
}

pub fn search_failed_note(provider: SearchProvider, error: &str) -> String {
    format!("**{} Search Failed**: {}\n\n", provider.display_name(), error)
}

/// Joins the search note and model reasoning with a `---` rule.
pub fn combine_reasoning(note: Option<&str>, reasoning: Option<&str>) -> Option<String> {
    let reasoning = reasoning.filter(|r| !r.is_empty());
    match (note.filter(|n| !n.is_empty()), reasoning) {
        (Some(note), Some(reasoning)) => Some(format!("{}\n---\n{}", note, reasoning)),
        (Some(note), None) => Some(note.to_string()),
        (None, Some(reasoning)) => Some(reasoning.to_string()),
        (None, None) => None,
    }
}

pub fn label_prompt(labels: &[Label]) -> String {
    let context: Vec<String> = labels.iter().map(|l| format!("{}: {}", l.id, l.name)).collect();
    format!(
        "Based on the conversation history provided, which of the following labels apply? \
         Return a JSON array of label IDs only.\nAvailable Labels:\n{}",
        context.join("\n")
    )
}
