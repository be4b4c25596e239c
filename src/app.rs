use anyhow::{Context, Result};
use dialoguer::{BasicHistory, Completion as LineCompletion, Input, theme::ColorfulTheme};
use std::io::Write;
use tracing::{debug, error};

use crate::commands::{self, CommandRegistry};
use crate::config::Settings;
use crate::engine::{Completion, Navigator, Outcome, Registry, Value};
use crate::player::PlaybackSink;
use crate::providers::ContentProvider;
use crate::routes::{self, QUERY, SAVE_HISTORY, Services};
use crate::types::Candidate;

const ROOT_PROMPT: &str = "~ ";
const PROMPT_HISTORY: usize = 100;
const REPORT_CONTEXT_KEYS: usize = 3;

pub fn theme() -> ColorfulTheme {
    ColorfulTheme::default()
}

/// The interactive shell: top-level commands while idle, route steps while a
/// route runs.
pub struct App<P, S> {
    settings: Settings,
    services: Services<P, S>,
    navigator: Navigator<Services<P, S>>,
    commands: CommandRegistry<App<P, S>>,
    running: bool,
}

impl<P, S> App<P, S>
where
    P: ContentProvider + 'static,
    S: PlaybackSink + 'static,
{
    pub fn new(settings: Settings, services: Services<P, S>) -> Result<Self> {
        let mut registry = Registry::new();
        routes::register(&mut registry)?;
        Ok(Self {
            settings,
            services,
            navigator: Navigator::new(registry),
            commands: commands::build()?,
            running: true,
        })
    }

    pub fn services(&self) -> &Services<P, S> {
        &self.services
    }

    pub fn services_mut(&mut self) -> &mut Services<P, S> {
        &mut self.services
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    pub fn commands(&self) -> &CommandRegistry<App<P, S>> {
        &self.commands
    }

    pub fn navigator(&self) -> &Navigator<Services<P, S>> {
        &self.navigator
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn stop(&mut self) {
        self.running = false;
    }

    /// Enters `route` with `results` as its first list.
    pub fn start_route(
        &mut self,
        route: &str,
        results: Vec<Candidate>,
        save_history: bool,
        query: Option<&str>,
    ) -> Result<()> {
        let mut seed = routes::seed(results, &self.settings, self.services.provider.name())
            .with(SAVE_HISTORY, Value::Flag(save_history));
        if let Some(query) = query {
            seed.set(QUERY, Value::Text(query.to_string()));
        }
        debug!(route, save_history, "starting route");
        self.navigator.start(route, seed)?;
        Ok(())
    }

    pub fn prompt(&self) -> String {
        self.navigator
            .prompt()
            .unwrap_or_else(|| ROOT_PROMPT.to_string())
    }

    pub fn completions(&self, text: &str) -> Vec<Completion> {
        if self.navigator.is_active() {
            self.navigator.completions(text)
        } else {
            self.commands.completions(text)
        }
    }

    /// Runs `initial` (if any), then reads lines until `exit` or a step ends
    /// the session.
    pub async fn run(&mut self, initial: Option<String>) -> Result<()> {
        if let Some(line) = initial {
            self.handle_line(&line).await?;
        }
        let mut history = BasicHistory::new()
            .max_entries(PROMPT_HISTORY)
            .no_duplicates(true);
        while self.is_running() {
            let line = self.read_line(&mut history)?;
            self.handle_line(&line).await?;
        }
        Ok(())
    }

    fn read_line(&self, history: &mut BasicHistory) -> Result<String> {
        let completer = LineCompleter { app: self };
        let line = Input::<String>::with_theme(&theme())
            .with_prompt(self.prompt().trim_end())
            .allow_empty(true)
            .completion_with(&completer)
            .history_with(history)
            .validate_with(|input: &String| -> Result<(), String> {
                let check = self.navigator.validate(input);
                if check.is_valid() {
                    Ok(())
                } else {
                    Err(check.message().unwrap_or("invalid input").to_string())
                }
            })
            .interact_text()
            .context("failed to read input")?;
        Ok(line)
    }

    /// One line of input. Handler failures are reported and the session
    /// goes on; a failure while reporting ends it.
    pub async fn handle_line(&mut self, line: &str) -> Result<()> {
        if let Err(err) = self.dispatch(line.trim()).await {
            self.report_failure(&err)?;
        }
        for notice in self.navigator.take_notices() {
            println!("{notice}");
        }
        Ok(())
    }

    async fn dispatch(&mut self, line: &str) -> Result<()> {
        if self.navigator.is_active() {
            debug!(route = ?self.navigator.route_key(), line, "route input");
            match self.navigator.handle_input(&self.services, line).await? {
                Outcome::Rejected(msg) => println!("{msg}"),
                Outcome::Terminate => self.stop(),
                Outcome::Stay | Outcome::Moved | Outcome::Exited => {}
            }
            return Ok(());
        }
        if line.is_empty() {
            return Ok(());
        }
        match self.commands.resolve(line) {
            Some((handler, args)) => handler(self, &args).await,
            None => {
                println!("Unknown command: {}", commands::split_word(line).0);
                Ok(())
            }
        }
    }

    fn report_failure(&self, err: &anyhow::Error) -> Result<()> {
        error!(error = %format!("{err:#}"), "step failed");
        let mut stderr = std::io::stderr().lock();
        writeln!(stderr, "error: {err:#}")?;
        if self.navigator.is_active() {
            for line in self.navigator.describe(REPORT_CONTEXT_KEYS) {
                writeln!(stderr, "  {line}")?;
            }
        }
        stderr.flush()?;
        Ok(())
    }
}

struct LineCompleter<'a, P, S> {
    app: &'a App<P, S>,
}

impl<P, S> LineCompletion for LineCompleter<'_, P, S>
where
    P: ContentProvider + 'static,
    S: PlaybackSink + 'static,
{
    fn get(&self, input: &str) -> Option<String> {
        self.app
            .completions(input)
            .into_iter()
            .next()
            .map(|c| c.value)
    }
}
