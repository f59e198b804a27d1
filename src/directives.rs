//! Inline `[[STATUS: ..]]`, `[[TITLE: ..]]` and `[[LABEL: ..]]` tokens emitted by models.

use crate::core::types::{Label, SessionStatus};
use regex::Regex;
use std::sync::OnceLock;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SideEffect {
    SetStatus(SessionStatus),
    Rename(String),
    /// Label id from the allow-list.
    AddLabel(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    pub cleaned_text: String,
    pub effects: Vec<SideEffect>,
}

#[derive(Clone, Copy)]
enum Directive {
    Status,
    Title,
    Label,
}

impl Directive {
    const ALL: [Directive; 3] = [Directive::Status, Directive::Title, Directive::Label];

    fn regex(self) -> &'static Regex {
        static STATUS: OnceLock<Regex> = OnceLock::new();
        static TITLE: OnceLock<Regex> = OnceLock::new();
        static LABEL: OnceLock<Regex> = OnceLock::new();

        let (cell, pattern) = match self {
            Directive::Status => (&STATUS, r"\[\[STATUS:\s*(.*?)\]\]"),
            Directive::Title => (&TITLE, r"\[\[TITLE:\s*(.*?)\]\]"),
            Directive::Label => (&LABEL, r"\[\[LABEL:\s*(.*?)\]\]"),
        };
        cell.get_or_init(|| Regex::new(pattern).expect("Invalid directive regex"))
    }

    fn first_value(self, text: &str) -> Option<&str> {
        self.regex()
            .captures(text)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().trim())
    }
}

/// Applies the first match of each directive kind and strips every match.
///
/// Values that do not validate (unknown status, unknown label, blank title)
/// produce no effect but are still removed from the visible text.
pub fn extract(text: &str, labels: &[Label]) -> Extraction {
    let mut effects = Vec::new();

    if let Some(status) = Directive::Status
        .first_value(text)
        .and_then(SessionStatus::from_directive)
    {
        effects.push(SideEffect::SetStatus(status));
    }

    if let Some(title) = Directive::Title.first_value(text).filter(|t| !t.is_empty()) {
        effects.push(SideEffect::Rename(title.to_string()));
    }

    if let Some(name) = Directive::Label.first_value(text) {
        match labels.iter().find(|l| l.name.eq_ignore_ascii_case(name)) {
            Some(label) => effects.push(SideEffect::AddLabel(label.id.clone())),
            None => tracing::debug!("Ignoring LABEL directive for unknown label {:?}", name),
        }
    }

    let mut cleaned = text.to_string();
    for directive in Directive::ALL {
        cleaned = directive.regex().replace_all(&cleaned, "").into_owned();
    }

    Extraction {
        cleaned_text: cleaned.trim().to_string(),
        effects,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels() -> Vec<Label> {
        vec![Label {
            id: "1".into(),
            name: "Design".into(),
            color: "#a3a3a3".into(),
        }]
    }

    #[test]
    fn unknown_label_stripped_without_effect() {
        let out = extract("Hello [[STATUS: done]] world [[LABEL: Unknown]]", &labels());
        assert_eq!(out.cleaned_text, "Hello  world");
        assert_eq!(out.effects, vec![SideEffect::SetStatus(SessionStatus::Done)]);
    }

    #[test]
    fn only_first_match_of_each_kind_applies() {
        let out = extract(
            "[[LABEL: design]][[LABEL: Design]] ok [[TITLE:  Plan A ]] [[TITLE: Plan B]]",
            &labels(),
        );
        assert_eq!(out.cleaned_text, "ok");
        assert_eq!(
            out.effects,
            vec![
                SideEffect::Rename("Plan A".into()),
                SideEffect::AddLabel("1".into())
            ]
        );
    }

    #[test]
    fn invalid_status_and_blank_title_ignored() {
        let out = extract("[[STATUS: in_progress]] text [[TITLE: ]]", &labels());
        assert!(out.effects.is_empty());
        assert_eq!(out.cleaned_text, "text");
    }

    #[test]
    fn status_is_case_insensitive() {
        let out = extract("[[STATUS: Needs_Review]]", &[]);
        assert_eq!(out.effects, vec![SideEffect::SetStatus(SessionStatus::NeedsReview)]);
        assert!(out.cleaned_text.is_empty());
    }

    #[test]
    fn plain_text_untouched() {
        let out = extract("  no [brackets] here ", &labels());
        assert_eq!(out.cleaned_text, "no [brackets] here");
        assert!(out.effects.is_empty());
    }
}
