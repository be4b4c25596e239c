use crate::engine::registry::Completion;
use crate::types::Candidate;
use crate::validate::NavCommand;

/// `index -> label` pairs for every candidate whose index starts with `text`.
pub fn index_completions(items: &[Candidate], text: &str) -> Vec<Completion> {
    items
        .iter()
        .enumerate()
        .map(|(idx, item)| ((idx + 1).to_string(), item))
        .filter(|(value, _)| value.starts_with(text))
        .map(|(value, item)| Completion::new(value, item.label()))
        .collect()
}

/// Title search over `items`: `[#i] title` for each case-insensitive
/// substring match.
pub fn title_completions(items: &[Candidate], text: &str) -> Vec<Completion> {
    let needle = text.trim().to_lowercase();
    if needle.is_empty() {
        return Vec::new();
    }
    items
        .iter()
        .enumerate()
        .filter(|(_, item)| item.title.to_lowercase().contains(&needle))
        .map(|(idx, item)| {
            Completion::new((idx + 1).to_string(), format!("[#{}] {}", idx + 1, item.title))
        })
        .collect()
}

/// Step entries first, then the navigation tokens matching `text`.
pub fn merge(step: Vec<Completion>, text: &str, allow_info: bool) -> Vec<Completion> {
    let nav = NavCommand::ALL
        .into_iter()
        .filter(|cmd| allow_info || *cmd != NavCommand::Info)
        .filter(|cmd| cmd.token().starts_with(text))
        .map(|cmd| Completion::new(cmd.token(), cmd.description()));
    step.into_iter().chain(nav).collect()
}
