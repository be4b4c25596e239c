use crate::selection::{is_digits, parse_selection_mask};

pub const GO_BACK: &str = "..";
pub const RETURN_TO_ROOT: &str = "~";
pub const SHOW_INFO: &str = "info";
pub const SHOW_PATH: &str = "history";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validation {
    Valid,
    Invalid(String),
}

impl Validation {
    pub fn is_valid(&self) -> bool {
        matches!(self, Validation::Valid)
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            Validation::Valid => None,
            Validation::Invalid(msg) => Some(msg),
        }
    }
}

/// Tokens accepted at every step regardless of what the step expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavCommand {
    GoBack,
    ReturnToRoot,
    Info,
    Path,
}

impl NavCommand {
    pub const ALL: [NavCommand; 4] = [
        NavCommand::GoBack,
        NavCommand::ReturnToRoot,
        NavCommand::Info,
        NavCommand::Path,
    ];

    /// `info` is only a navigation token in steps that can show details.
    pub fn parse(input: &str, allow_info: bool) -> Option<Self> {
        match input {
            GO_BACK => Some(NavCommand::GoBack),
            RETURN_TO_ROOT => Some(NavCommand::ReturnToRoot),
            SHOW_INFO if allow_info => Some(NavCommand::Info),
            SHOW_PATH => Some(NavCommand::Path),
            _ => None,
        }
    }

    pub fn token(self) -> &'static str {
        match self {
            NavCommand::GoBack => GO_BACK,
            NavCommand::ReturnToRoot => RETURN_TO_ROOT,
            NavCommand::Info => SHOW_INFO,
            NavCommand::Path => SHOW_PATH,
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            NavCommand::GoBack => "Go back to previous state",
            NavCommand::ReturnToRoot => "return to main menu",
            NavCommand::Info => "show full description",
            NavCommand::Path => "Show state history",
        }
    }
}

/// What a step expects from the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputRule {
    /// Exactly one 1-based index into the candidate list.
    PickOne,
    /// An index, a range or a space separated mix of both.
    PickMany,
    /// Anything; the handler decides.
    Any,
}

pub fn validate_index(len: usize, input: &str) -> Validation {
    if !is_digits(input) {
        return Validation::Invalid(format!("expected a number in range 1-{len}"));
    }
    match input.parse::<usize>() {
        Ok(0) => Validation::Invalid("start index should be at 1".to_string()),
        Ok(value) if value <= len => Validation::Valid,
        _ => Validation::Invalid(format!("out of range (max index {len})")),
    }
}

pub fn validate_selection(len: usize, input: &str) -> Validation {
    if input.trim().is_empty() {
        return Validation::Invalid("episode index or slice required".to_string());
    }
    match parse_selection_mask(input, len) {
        Ok(_) => Validation::Valid,
        Err(err) => Validation::Invalid(err.to_string()),
    }
}

/// Pure predicate over the current step: navigation tokens first, then the
/// step's own rule against `len` candidates.
pub fn validate(rule: InputRule, len: usize, input: &str, allow_info: bool) -> Validation {
    if NavCommand::parse(input, allow_info).is_some() {
        return Validation::Valid;
    }
    match rule {
        InputRule::PickOne => validate_index(len, input),
        InputRule::PickMany => validate_selection(len, input),
        InputRule::Any => Validation::Valid,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn navigation_tokens_are_always_valid() {
        for rule in [InputRule::PickOne, InputRule::PickMany, InputRule::Any] {
            assert!(validate(rule, 0, "..", false).is_valid());
            assert!(validate(rule, 0, "~", false).is_valid());
            assert!(validate(rule, 3, "history", false).is_valid());
        }
    }

    #[test]
    fn info_only_where_allowed() {
        assert!(validate(InputRule::PickMany, 3, "info", true).is_valid());
        assert!(!validate(InputRule::PickOne, 3, "info", false).is_valid());
    }

    #[test]
    fn zero_index_has_its_own_message() {
        assert_eq!(
            validate_index(3, "0"),
            Validation::Invalid("start index should be at 1".into())
        );
        assert_eq!(
            validate_index(3, "4"),
            Validation::Invalid("out of range (max index 3)".into())
        );
        assert!(validate_index(3, "3").is_valid());
        assert!(!validate_index(3, "1-2").is_valid());
        assert!(!validate_index(3, "").is_valid());
    }

    #[test]
    fn empty_slice_is_rejected_at_the_prompt() {
        assert_eq!(
            validate_selection(5, "  "),
            Validation::Invalid("episode index or slice required".into())
        );
        assert!(validate_selection(5, "1-3 5").is_valid());
        let msg = validate_selection(5, "3-2");
        assert!(msg.message().unwrap().contains("start must be < end"));
    }
}
