use tracing::debug;

use crate::engine::completion::{index_completions, merge};
use crate::engine::prompt::render;
use crate::engine::registry::{Completion, Registry, RouteDefinition, StateDefinition, Transition};
use crate::engine::session::{NavigationHistory, SessionContext};
use crate::error::EngineError;
use crate::validate::{NavCommand, Validation, validate};

/// Prompt variable holding the key of the running route.
pub const ROUTE_NAME: &str = "ROUTE_NAME";

/// Result of feeding one line to the active route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Still at the same step.
    Stay,
    /// Now at another step (or the same one re-entered).
    Moved,
    /// Input failed validation; nothing changed.
    Rejected(String),
    /// The route was left, control is back at the top level.
    Exited,
    Terminate,
}

struct ActiveRoute {
    route: String,
    state: String,
    history: NavigationHistory,
    context: SessionContext,
}

/// Runs one route at a time over the registered definitions. `E` is whatever
/// the step handlers need (provider, sink, stores); it is passed in per call.
pub struct Navigator<E> {
    registry: Registry<E>,
    active: Option<ActiveRoute>,
    notices: Vec<String>,
}

impl<E> Navigator<E> {
    pub fn new(registry: Registry<E>) -> Self {
        Self {
            registry,
            active: None,
            notices: Vec::new(),
        }
    }

    pub fn registry(&self) -> &Registry<E> {
        &self.registry
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn route_key(&self) -> Option<&str> {
        self.active.as_ref().map(|active| active.route.as_str())
    }

    pub fn current_state(&self) -> Option<&str> {
        self.active.as_ref().map(|active| active.state.as_str())
    }

    pub fn history_len(&self) -> usize {
        self.active
            .as_ref()
            .map(|active| active.history.len())
            .unwrap_or(0)
    }

    #[cfg(test)]
    pub fn context(&self) -> Option<&SessionContext> {
        self.active.as_ref().map(|active| &active.context)
    }

    /// Messages produced by steps and transitions since the last call.
    pub fn take_notices(&mut self) -> Vec<String> {
        if let Some(active) = self.active.as_mut() {
            self.notices.extend(active.context.take_notices());
        }
        std::mem::take(&mut self.notices)
    }

    /// Starts `key` (route key or alias) with `seed` as its session data.
    /// A running route is discarded first.
    pub fn start(&mut self, key: &str, mut seed: SessionContext) -> Result<Outcome, EngineError> {
        if self.active.is_some() {
            self.return_to_root();
        }
        let route = self
            .registry
            .get_route(key)
            .ok_or_else(|| EngineError::UnknownRoute(key.to_string()))?;
        let initial = state_of(route, route.initial_state())?;

        if initial
            .candidates_key()
            .is_some_and(|list| seed.candidates(list).is_empty())
        {
            self.notices.push(initial.empty_notice().to_string());
            return Ok(Outcome::Exited);
        }

        seed.set_prompt_var(ROUTE_NAME, route.key());
        if let Some(hook) = initial.enter_hook() {
            hook(&mut seed);
        }
        debug!(route = route.key(), state = initial.name(), "route started");
        self.active = Some(ActiveRoute {
            route: route.key().to_string(),
            state: initial.name().to_string(),
            history: NavigationHistory::default(),
            context: seed,
        });
        Ok(Outcome::Moved)
    }

    /// Forward move: pushes the current step and enters `name`, unless the
    /// list `name` picks from is empty, in which case this goes back instead.
    pub fn next_state(&mut self, name: &str) -> Result<Outcome, EngineError> {
        let active = self.active.as_mut().ok_or(EngineError::NoActiveRoute)?;
        let route = route_of(&self.registry, &active.route)?;
        let target = state_of(route, name)?;

        if target
            .candidates_key()
            .is_some_and(|list| active.context.candidates(list).is_empty())
        {
            debug!(route = %active.route, state = name, "refusing to enter empty step");
            active.context.notice(target.empty_notice());
            return self.go_back();
        }

        let current = state_of(route, &active.state)?;
        active.history.push(active.state.clone());
        enter(active, current, target);
        Ok(Outcome::Moved)
    }

    /// Re-enters `name` without touching the history.
    pub fn jump_to(&mut self, name: &str) -> Result<Outcome, EngineError> {
        let active = self.active.as_mut().ok_or(EngineError::NoActiveRoute)?;
        let route = route_of(&self.registry, &active.route)?;
        let target = state_of(route, name)?;
        let current = state_of(route, &active.state)?;
        enter(active, current, target);
        Ok(Outcome::Moved)
    }

    /// Pops one step. Going back from the first step leaves the route.
    pub fn go_back(&mut self) -> Result<Outcome, EngineError> {
        let active = self.active.as_mut().ok_or(EngineError::NoActiveRoute)?;
        let Some(previous) = active.history.pop() else {
            return Ok(self.return_to_root());
        };
        let route = route_of(&self.registry, &active.route)?;
        if active.history.is_empty() {
            active.context.clear_prompt_vars();
            active.context.set_prompt_var(ROUTE_NAME, route.key());
        }
        let target = state_of(route, &previous)?;
        let current = state_of(route, &active.state)?;
        enter(active, current, target);
        Ok(Outcome::Moved)
    }

    /// Drops the route together with its session data and history.
    pub fn return_to_root(&mut self) -> Outcome {
        if let Some(mut active) = self.active.take() {
            if let Some(hook) = self
                .registry
                .get_route(&active.route)
                .and_then(|route| route.state(&active.state))
                .and_then(StateDefinition::exit_hook)
            {
                hook(&mut active.context);
            }
            self.notices.extend(active.context.take_notices());
            debug!(route = %active.route, state = %active.state, "route exited");
        }
        Outcome::Exited
    }

    /// Rendered prompt of the current step.
    pub fn prompt(&self) -> Option<String> {
        let active = self.active.as_ref()?;
        let state = self.current_definition()?;
        Some(render(
            state.prompt_template(),
            active.context.prompt_vars(),
        ))
    }

    /// Checks `input` against the current step. Anything goes when no route
    /// is running.
    pub fn validate(&self, input: &str) -> Validation {
        let (Some(active), Some(state)) = (self.active.as_ref(), self.current_definition()) else {
            return Validation::Valid;
        };
        let len = state
            .candidates_key()
            .map(|key| active.context.candidates(key).len())
            .unwrap_or(0);
        validate(state.rule(), len, input.trim(), state.info_fn().is_some())
    }

    pub fn completions(&self, text: &str) -> Vec<Completion> {
        let (Some(active), Some(state)) = (self.active.as_ref(), self.current_definition()) else {
            return Vec::new();
        };
        let step = match (state.custom_completer(), state.candidates_key()) {
            (Some(completer), _) => completer(&active.context, text),
            (None, Some(key)) => index_completions(active.context.candidates(key), text),
            (None, None) => Vec::new(),
        };
        merge(step, text, state.info_fn().is_some())
    }

    /// Feeds one line to the current step: navigation tokens, then
    /// validation, then the step handler. A handler error leaves the step
    /// as it was.
    pub async fn handle_input(&mut self, env: &E, input: &str) -> anyhow::Result<Outcome> {
        let input = input.trim();
        let active = self.active.as_mut().ok_or(EngineError::NoActiveRoute)?;
        let route = route_of(&self.registry, &active.route)?;
        let state = state_of(route, &active.state)?;

        if let Some(cmd) = NavCommand::parse(input, state.info_fn().is_some()) {
            debug!(route = %active.route, state = %active.state, token = cmd.token(), "navigation");
            return match cmd {
                NavCommand::GoBack => Ok(self.go_back()?),
                NavCommand::ReturnToRoot => Ok(self.return_to_root()),
                NavCommand::Info => {
                    let text = state
                        .info_fn()
                        .and_then(|info| info(&active.context))
                        .unwrap_or_else(|| "no details available".to_string());
                    active.context.notice(text);
                    let current = active.state.clone();
                    Ok(self.jump_to(&current)?)
                }
                NavCommand::Path => {
                    let path = active.history.path(&active.state);
                    active.context.notice(path);
                    Ok(Outcome::Stay)
                }
            };
        }

        let len = state
            .candidates_key()
            .map(|key| active.context.candidates(key).len())
            .unwrap_or(0);
        if let Validation::Invalid(message) = validate(state.rule(), len, input, false) {
            return Ok(Outcome::Rejected(message));
        }

        let handler = state.handler();
        debug!(route = %active.route, state = %active.state, input, "running step");
        let transition = handler(env, &mut active.context, input).await?;
        debug!(?transition, "step finished");

        let outcome = match transition {
            Transition::Continue => Outcome::Stay,
            Transition::NextState(name) => self.next_state(&name)?,
            Transition::GoBack => self.go_back()?,
            Transition::ReturnToRoot => self.return_to_root(),
            Transition::Terminate => {
                self.return_to_root();
                Outcome::Terminate
            }
        };
        if !self.is_active() && outcome == Outcome::Moved {
            return Ok(Outcome::Exited);
        }
        debug!(?outcome, state = ?self.current_state(), depth = self.history_len(), "input handled");
        Ok(outcome)
    }

    /// Route, step, path and the first session entries; printed when a
    /// step fails.
    pub fn describe(&self, limit: usize) -> Vec<String> {
        let Some(active) = self.active.as_ref() else {
            return vec!["route: <none>".to_string()];
        };
        let state = match self.current_definition().map(StateDefinition::help_text) {
            Some(help) if !help.is_empty() => format!("state: {} ({help})", active.state),
            _ => format!("state: {}", active.state),
        };
        let mut lines = vec![
            format!("route: {}", active.route),
            state,
            format!("path: {}", active.history.path(&active.state)),
            format!("context ({} keys):", active.context.len()),
        ];
        lines.extend(
            active
                .context
                .dump(limit)
                .into_iter()
                .map(|line| format!("  {line}")),
        );
        lines
    }

    fn current_definition(&self) -> Option<&StateDefinition<E>> {
        let active = self.active.as_ref()?;
        self.registry
            .get_route(&active.route)?
            .state(&active.state)
    }
}

fn route_of<'r, E>(registry: &'r Registry<E>, key: &str) -> Result<&'r RouteDefinition<E>, EngineError> {
    registry
        .get_route(key)
        .ok_or_else(|| EngineError::UnknownRoute(key.to_string()))
}

fn state_of<'r, E>(
    route: &'r RouteDefinition<E>,
    name: &str,
) -> Result<&'r StateDefinition<E>, EngineError> {
    route.state(name).ok_or_else(|| EngineError::UnknownState {
        route: route.key().to_string(),
        state: name.to_string(),
    })
}

/// Leaving hook of `from`, then entering hook of `to`.
fn enter<E>(active: &mut ActiveRoute, from: &StateDefinition<E>, to: &StateDefinition<E>) {
    if let Some(hook) = from.exit_hook() {
        hook(&mut active.context);
    }
    if let Some(hook) = to.enter_hook() {
        hook(&mut active.context);
    }
    debug!(route = %active.route, from = from.name(), to = to.name(), "state change");
    active.state = to.name().to_string();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::registry::HandlerFuture;
    use crate::engine::session::Value;
    use crate::types::{Candidate, CandidateKind};

    struct Lists {
        episodes: Vec<Candidate>,
        sources: Vec<Candidate>,
    }

    fn items(kind: CandidateKind, n: usize) -> Vec<Candidate> {
        (1..=n)
            .map(|i| Candidate::new(kind, format!("{} {i}", kind.as_str())))
            .collect()
    }

    fn pick_anime<'a>(env: &'a Lists, ctx: &'a mut SessionContext, input: &'a str) -> HandlerFuture<'a> {
        Box::pin(async move {
            ctx.set_prompt_var("result", format!("anime {input}"));
            ctx.set("episodes", Value::Candidates(env.episodes.clone()));
            Ok(Transition::next("step_2"))
        })
    }

    fn pick_episode<'a>(env: &'a Lists, ctx: &'a mut SessionContext, _: &'a str) -> HandlerFuture<'a> {
        Box::pin(async move {
            ctx.set("sources", Value::Candidates(env.sources.clone()));
            Ok(Transition::next("step_3"))
        })
    }

    fn play<'a>(_: &'a Lists, ctx: &'a mut SessionContext, input: &'a str) -> HandlerFuture<'a> {
        Box::pin(async move {
            if input == "3" {
                anyhow::bail!("provider is down");
            }
            ctx.notice("playing");
            Ok(Transition::GoBack)
        })
    }

    fn count_enter(ctx: &mut SessionContext) {
        let n = ctx.number("entered").unwrap_or(0);
        ctx.set("entered", Value::Number(n + 1));
    }

    fn mark_exit(ctx: &mut SessionContext) {
        ctx.notice("left step_3");
    }

    fn describe_anime(_: &SessionContext) -> Option<String> {
        Some("an anime".to_string())
    }

    fn navigator() -> Navigator<Lists> {
        let mut registry = Registry::new();
        registry
            .register_route(
                "search",
                vec![
                    StateDefinition::new("step_1", pick_anime)
                        .pick_one("results")
                        .prompt("~/{ROUTE_NAME} "),
                    StateDefinition::new("step_2", pick_episode)
                        .pick_many("episodes")
                        .when_empty("not available episodes")
                        .info(describe_anime)
                        .on_enter(count_enter)
                        .prompt("~/{ROUTE_NAME}/{result}/episode "),
                    StateDefinition::new("step_3", play)
                        .pick_one("sources")
                        .when_empty("not available sources")
                        .on_exit(mark_exit),
                ],
                "step_1",
                &["s"],
            )
            .unwrap();
        Navigator::new(registry)
    }

    fn seed() -> SessionContext {
        SessionContext::new().with("results", Value::Candidates(items(CandidateKind::Anime, 3)))
    }

    fn lists(episodes: usize, sources: usize) -> Lists {
        Lists {
            episodes: items(CandidateKind::Episode, episodes),
            sources: items(CandidateKind::Source, sources),
        }
    }

    #[tokio::test]
    async fn forward_and_back() {
        let env = lists(5, 2);
        let mut nav = navigator();
        assert_eq!(nav.start("s", seed()).unwrap(), Outcome::Moved);
        assert_eq!(nav.route_key(), Some("search"));
        assert_eq!(nav.prompt().unwrap(), "~/search ");

        nav.handle_input(&env, "2").await.unwrap();
        assert_eq!(nav.current_state(), Some("step_2"));
        assert_eq!(nav.prompt().unwrap(), "~/search/anime 2/episode ");
        nav.handle_input(&env, "1").await.unwrap();
        assert_eq!(nav.current_state(), Some("step_3"));
        assert_eq!(nav.history_len(), 2);

        assert_eq!(nav.handle_input(&env, "..").await.unwrap(), Outcome::Moved);
        assert_eq!(nav.current_state(), Some("step_2"));
        assert_eq!(nav.history_len(), 1);
        assert_eq!(nav.context().unwrap().number("entered"), Some(2));
        assert_eq!(nav.take_notices(), vec!["left step_3"]);
    }

    #[tokio::test]
    async fn back_to_first_step_forgets_prompt_vars() {
        let env = lists(5, 2);
        let mut nav = navigator();
        nav.start("search", seed()).unwrap();
        nav.handle_input(&env, "3").await.unwrap();
        assert_eq!(nav.prompt().unwrap(), "~/search/anime 3/episode ");

        nav.handle_input(&env, "..").await.unwrap();
        assert_eq!(nav.current_state(), Some("step_1"));
        assert_eq!(nav.prompt().unwrap(), "~/search ");
        let vars = nav.context().unwrap().prompt_vars();
        assert!(!vars.contains_key("result"));
        assert_eq!(render("~/{ROUTE_NAME}/{result}/episode ", vars), "~/search/<unset>/episode ");
    }

    #[tokio::test]
    async fn go_back_pops_exactly_one() {
        let env = lists(5, 2);
        let mut nav = navigator();
        nav.start("search", seed()).unwrap();
        nav.handle_input(&env, "1").await.unwrap();
        nav.handle_input(&env, "1").await.unwrap();
        for expected in ["step_2", "step_1"] {
            let before = nav.history_len();
            nav.handle_input(&env, "..").await.unwrap();
            assert_eq!(nav.history_len(), before - 1);
            assert_eq!(nav.current_state(), Some(expected));
        }
        assert_eq!(nav.handle_input(&env, "..").await.unwrap(), Outcome::Exited);
        assert!(!nav.is_active());
    }

    #[tokio::test]
    async fn return_to_root_from_any_depth() {
        let env = lists(5, 2);
        for depth in 0..3 {
            let mut nav = navigator();
            nav.start("search", seed()).unwrap();
            for _ in 0..depth {
                nav.handle_input(&env, "1").await.unwrap();
            }
            assert_eq!(nav.handle_input(&env, "~").await.unwrap(), Outcome::Exited);
            assert!(!nav.is_active());
            assert!(nav.context().is_none());
            assert_eq!(nav.history_len(), 0);
        }
    }

    #[tokio::test]
    async fn empty_list_forces_go_back() {
        let env = lists(0, 2);
        let mut nav = navigator();
        nav.start("search", seed()).unwrap();
        let outcome = nav.handle_input(&env, "1").await.unwrap();
        assert_eq!(outcome, Outcome::Exited);
        assert_eq!(nav.take_notices(), vec!["not available episodes"]);

        let env = lists(4, 0);
        nav.start("search", seed()).unwrap();
        nav.handle_input(&env, "1").await.unwrap();
        nav.handle_input(&env, "2").await.unwrap();
        assert_eq!(nav.current_state(), Some("step_1"));
        assert_eq!(nav.history_len(), 0);
        assert_eq!(nav.take_notices(), vec!["not available sources"]);
    }

    #[tokio::test]
    async fn rejected_input_keeps_state() {
        let env = lists(5, 2);
        let mut nav = navigator();
        nav.start("search", seed()).unwrap();
        let outcome = nav.handle_input(&env, "0").await.unwrap();
        assert_eq!(outcome, Outcome::Rejected("start index should be at 1".into()));
        assert!(!nav.validate("7").is_valid());
        assert!(!nav.validate("info").is_valid());
        assert_eq!(nav.current_state(), Some("step_1"));
    }

    #[tokio::test]
    async fn info_and_path_do_not_grow_history() {
        let env = lists(5, 2);
        let mut nav = navigator();
        nav.start("search", seed()).unwrap();
        nav.handle_input(&env, "1").await.unwrap();
        assert!(nav.validate("info").is_valid());
        nav.handle_input(&env, "info").await.unwrap();
        assert_eq!(nav.history_len(), 1);
        assert_eq!(nav.current_state(), Some("step_2"));
        assert_eq!(nav.handle_input(&env, "history").await.unwrap(), Outcome::Stay);
        assert_eq!(nav.take_notices(), vec!["an anime", "step_1 -> step_2"]);
    }

    #[tokio::test]
    async fn failing_step_stays_put() {
        let env = lists(5, 3);
        let mut nav = navigator();
        nav.start("search", seed()).unwrap();
        nav.handle_input(&env, "1").await.unwrap();
        nav.handle_input(&env, "1").await.unwrap();
        let err = nav.handle_input(&env, "3").await.unwrap_err();
        assert_eq!(err.to_string(), "provider is down");
        assert_eq!(nav.current_state(), Some("step_3"));
        assert_eq!(nav.history_len(), 2);
        let report = nav.describe(3);
        assert_eq!(report[0], "route: search");
        assert_eq!(report[2], "path: step_1 -> step_2 -> step_3");
    }

    #[test]
    fn completions_list_step_entries_first() {
        let mut nav = navigator();
        nav.start("search", seed()).unwrap();
        let values: Vec<_> = nav.completions("").into_iter().map(|c| c.value).collect();
        assert_eq!(values, vec!["1", "2", "3", "..", "~", "history"]);
    }

    #[test]
    fn unknown_route_is_an_error() {
        let mut nav = navigator();
        assert_eq!(
            nav.start("nope", SessionContext::new()),
            Err(EngineError::UnknownRoute("nope".into()))
        );
        assert_eq!(nav.start("search", SessionContext::new()), Ok(Outcome::Exited));
        assert!(!nav.is_active());
    }
}
