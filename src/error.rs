use thiserror::Error;

/// Failures of the selection mask parser. Always recoverable: the prompt
/// reports the message and stays at the same step.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectionError {
    #[error("{reason}: '{token}'")]
    InvalidSelectionSyntax { token: String, reason: &'static str },
    #[error("'{token}' out of bounds (1..{max})")]
    OutOfRange { token: String, max: usize },
    #[error("bad range '{token}' (start must be < end)")]
    InvalidRange { token: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("route '{0}' already registered")]
    DuplicateRoute(String),
    #[error("alias '{alias}' of route '{route}' already registered")]
    DuplicateAlias { route: String, alias: String },
    #[error("state '{state}' registered twice in route '{route}'")]
    DuplicateState { route: String, state: String },
    #[error("route '{0}' has no states")]
    EmptyRouteDefinition(String),
    #[error("initial state '{state}' is not a state of route '{route}'")]
    InvalidInitialState { route: String, state: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("route '{0}' not found")]
    UnknownRoute(String),
    #[error("state '{state}' not found in route '{route}'")]
    UnknownState { route: String, state: String },
    #[error("no active route")]
    NoActiveRoute,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("command '{0}' already registered")]
    DuplicateCommand(String),
    #[error("alias '{alias}' of command '{command}' already registered")]
    DuplicateAlias { command: String, alias: String },
}
