use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::pin::Pin;

use crate::engine::session::SessionContext;
use crate::error::RegistryError;
use crate::validate::InputRule;

/// What a step handler asks the navigator to do next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Stay at the current step.
    Continue,
    /// Push the current step onto the history and enter `name`.
    NextState(String),
    GoBack,
    /// The anime steps never leave the route on their own; `~` covers that.
    #[cfg_attr(not(test), allow(dead_code))]
    ReturnToRoot,
    /// Leave the route and stop the application. Unused by the anime steps.
    #[cfg_attr(not(test), allow(dead_code))]
    Terminate,
}

impl Transition {
    pub fn next(name: &str) -> Self {
        Transition::NextState(name.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub value: String,
    pub meta: String,
}

impl Completion {
    pub fn new(value: impl Into<String>, meta: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            meta: meta.into(),
        }
    }
}

pub type HandlerFuture<'a> = Pin<Box<dyn Future<Output = anyhow::Result<Transition>> + 'a>>;

/// Step handler: gets the injected services `E`, the session data and the
/// validated raw input.
pub type Handler<E> = for<'a> fn(&'a E, &'a mut SessionContext, &'a str) -> HandlerFuture<'a>;
pub type Hook = fn(&mut SessionContext);
pub type CompletionFn = fn(&SessionContext, &str) -> Vec<Completion>;
pub type InfoFn = fn(&SessionContext) -> Option<String>;

pub struct StateDefinition<E> {
    name: String,
    help: String,
    handler: Handler<E>,
    candidates: Option<&'static str>,
    empty_notice: &'static str,
    rule: InputRule,
    completer: Option<CompletionFn>,
    info: Option<InfoFn>,
    prompt: String,
    on_enter: Option<Hook>,
    on_exit: Option<Hook>,
}

impl<E> StateDefinition<E> {
    pub fn new(name: &str, handler: Handler<E>) -> Self {
        Self {
            name: name.to_string(),
            help: String::new(),
            handler,
            candidates: None,
            empty_notice: "not available",
            rule: InputRule::Any,
            completer: None,
            info: None,
            prompt: format!("{name} "),
            on_enter: None,
            on_exit: None,
        }
    }

    pub fn help(mut self, help: &str) -> Self {
        self.help = help.to_string();
        self
    }

    pub fn prompt(mut self, template: &str) -> Self {
        self.prompt = template.to_string();
        self
    }

    /// Single pick from the list stored under `key`.
    pub fn pick_one(mut self, key: &'static str) -> Self {
        self.candidates = Some(key);
        self.rule = InputRule::PickOne;
        self
    }

    /// Index, range or mixed selection from the list stored under `key`.
    pub fn pick_many(mut self, key: &'static str) -> Self {
        self.candidates = Some(key);
        self.rule = InputRule::PickMany;
        self
    }

    /// Message shown when the navigator refuses to enter this state because
    /// its list is empty.
    pub fn when_empty(mut self, notice: &'static str) -> Self {
        self.empty_notice = notice;
        self
    }

    pub fn completer(mut self, completer: CompletionFn) -> Self {
        self.completer = Some(completer);
        self
    }

    pub fn info(mut self, info: InfoFn) -> Self {
        self.info = Some(info);
        self
    }

    pub fn on_enter(mut self, hook: Hook) -> Self {
        self.on_enter = Some(hook);
        self
    }

    pub fn on_exit(mut self, hook: Hook) -> Self {
        self.on_exit = Some(hook);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn help_text(&self) -> &str {
        &self.help
    }

    pub fn handler(&self) -> Handler<E> {
        self.handler
    }

    pub fn candidates_key(&self) -> Option<&'static str> {
        self.candidates
    }

    pub fn empty_notice(&self) -> &'static str {
        self.empty_notice
    }

    pub fn rule(&self) -> InputRule {
        self.rule
    }

    pub fn custom_completer(&self) -> Option<CompletionFn> {
        self.completer
    }

    pub fn info_fn(&self) -> Option<InfoFn> {
        self.info
    }

    pub fn prompt_template(&self) -> &str {
        &self.prompt
    }

    pub fn enter_hook(&self) -> Option<Hook> {
        self.on_enter
    }

    pub fn exit_hook(&self) -> Option<Hook> {
        self.on_exit
    }
}

pub struct RouteDefinition<E> {
    key: String,
    states: Vec<StateDefinition<E>>,
    initial: String,
}

impl<E> RouteDefinition<E> {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn initial_state(&self) -> &str {
        &self.initial
    }

    /// Exact name match.
    pub fn state(&self, name: &str) -> Option<&StateDefinition<E>> {
        self.states.iter().find(|state| state.name == name)
    }
}

pub struct Registry<E> {
    routes: BTreeMap<String, RouteDefinition<E>>,
    aliases: HashMap<String, String>,
}

impl<E> Default for Registry<E> {
    fn default() -> Self {
        Self {
            routes: BTreeMap::new(),
            aliases: HashMap::new(),
        }
    }
}

impl<E> Registry<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `name` with its ordered states. Nothing is registered when
    /// any check fails.
    pub fn register_route(
        &mut self,
        name: &str,
        states: Vec<StateDefinition<E>>,
        initial_state: &str,
        aliases: &[&str],
    ) -> Result<(), RegistryError> {
        if self.routes.contains_key(name) || self.aliases.contains_key(name) {
            return Err(RegistryError::DuplicateRoute(name.to_string()));
        }
        if states.is_empty() {
            return Err(RegistryError::EmptyRouteDefinition(name.to_string()));
        }
        for (idx, state) in states.iter().enumerate() {
            if states[..idx].iter().any(|prev| prev.name == state.name) {
                return Err(RegistryError::DuplicateState {
                    route: name.to_string(),
                    state: state.name.clone(),
                });
            }
        }
        if !states.iter().any(|state| state.name == initial_state) {
            return Err(RegistryError::InvalidInitialState {
                route: name.to_string(),
                state: initial_state.to_string(),
            });
        }
        for (idx, alias) in aliases.iter().enumerate() {
            let taken = *alias == name
                || self.routes.contains_key(*alias)
                || self.aliases.contains_key(*alias)
                || aliases[..idx].contains(alias);
            if taken {
                return Err(RegistryError::DuplicateAlias {
                    route: name.to_string(),
                    alias: alias.to_string(),
                });
            }
        }

        for alias in aliases {
            self.aliases.insert(alias.to_string(), name.to_string());
        }
        self.routes.insert(
            name.to_string(),
            RouteDefinition {
                key: name.to_string(),
                states,
                initial: initial_state.to_string(),
            },
        );
        Ok(())
    }

    pub fn get_route(&self, key: &str) -> Option<&RouteDefinition<E>> {
        self.routes.get(key).or_else(|| {
            self.aliases
                .get(key)
                .and_then(|route_key| self.routes.get(route_key))
        })
    }

    pub fn route_keys(&self) -> impl Iterator<Item = &str> {
        self.routes.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stay<'a>(_: &'a (), _: &'a mut SessionContext, _: &'a str) -> HandlerFuture<'a> {
        Box::pin(async { Ok(Transition::Continue) })
    }

    fn states(names: &[&str]) -> Vec<StateDefinition<()>> {
        names
            .iter()
            .map(|name| StateDefinition::new(name, stay))
            .collect()
    }

    #[test]
    fn route_lookup_by_key_and_alias() {
        let mut registry = Registry::new();
        registry
            .register_route("search", states(&["step_1", "step_2"]), "step_1", &["s"])
            .unwrap();
        let route = registry.get_route("s").unwrap();
        assert_eq!(route.key(), "search");
        assert_eq!(route.initial_state(), "step_1");
        assert!(route.state("step_2").is_some());
        assert!(route.state("step").is_none());
        assert!(registry.get_route("ongoing").is_none());
    }

    #[test]
    fn alias_collisions_fail_fast() {
        let mut registry = Registry::new();
        registry
            .register_route("search", states(&["step_1"]), "step_1", &["s"])
            .unwrap();
        assert!(matches!(
            registry.register_route("ongoing", states(&["step_1"]), "step_1", &["search"]),
            Err(RegistryError::DuplicateAlias { .. })
        ));
        assert!(matches!(
            registry.register_route("ongoing", states(&["step_1"]), "step_1", &["s"]),
            Err(RegistryError::DuplicateAlias { .. })
        ));
        assert!(registry.get_route("ongoing").is_none());
        assert!(matches!(
            registry.register_route("search", states(&["step_1"]), "step_1", &[]),
            Err(RegistryError::DuplicateRoute(_))
        ));
    }

    #[test]
    fn malformed_routes_are_rejected() {
        let mut registry: Registry<()> = Registry::new();
        assert_eq!(
            registry.register_route("empty", Vec::new(), "step_1", &[]),
            Err(RegistryError::EmptyRouteDefinition("empty".into()))
        );
        assert!(matches!(
            registry.register_route("bad", states(&["step_1"]), "step_9", &[]),
            Err(RegistryError::InvalidInitialState { .. })
        ));
        assert!(matches!(
            registry.register_route("dup", states(&["step_1", "step_1"]), "step_1", &[]),
            Err(RegistryError::DuplicateState { .. })
        ));
    }
}
