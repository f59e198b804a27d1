//! Council mode: parallel member answers reconciled by one synthesis call.

/// Upper bound on concurrently consulted models.
pub const MAX_MEMBERS: usize = 3;
pub const COUNCIL_MODEL_TAG: &str = "council";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CouncilMember {
    pub model: String,
    /// Member answer, or `Error: ...` when the call failed.
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CouncilResult {
    pub members: Vec<CouncilMember>,
    pub synthesis: String,
}

impl CouncilResult {
    /// Synthesis followed by a collapsible record of every member answer.
    pub fn merged_text(&self) -> String {
        let mut out = format!("{}\n\n---\n\n### Council Records\n\n", self.synthesis);
        for member in &self.members {
            out.push_str(&format!(
                "<details><summary><strong>{}</strong></summary>\n\n{}\n\n</details>\n\n",
                display_name(&member.model),
                member.text
            ));
        }
        out
    }
}

/// `provider/model-name:tier` becomes `model-name`.
pub fn display_name(model_id: &str) -> &str {
    let tail = model_id.rsplit('/').next().unwrap_or(model_id);
    let name = tail.split(':').next().unwrap_or(tail);
    if name.is_empty() { model_id } else { name }
}

pub fn synthesis_prompt(user_text: &str, members: &[CouncilMember]) -> String {
    let responses: Vec<String> = members
        .iter()
        .map(|m| format!("Response from [{}]:\n{}", m.model, m.text))
        .collect();

    format!(
        "You are the Council Synthesizer. Review the following responses from different AI models to the user query: \"{}\".\n\
         Resolve conflicts where possible, highlight key differences, and present a final unified answer.\n\
         MANDATORY: Include a comparison table showing where the models agree and disagree.\n\n{}",
        user_text,
        responses.join("\n\n---\n\n")
    )
}

/// Deduplicated member list, capped at [`MAX_MEMBERS`].
pub fn select_members(requested: &[String], fallback: &[String]) -> Vec<String> {
    let source = if requested.iter().any(|m| !m.trim().is_empty()) {
        requested
    } else {
        fallback
    };
    let mut members: Vec<String> = Vec::new();
    for model in source.iter().map(|m| m.trim()).filter(|m| !m.is_empty()) {
        if !members.iter().any(|m| m == model) {
            members.push(model.to_string());
        }
        if members.len() == MAX_MEMBERS {
            break;
        }
    }
    members
}
