use anyhow::Result;
use dialoguer::Confirm;
use std::future::Future;
use std::pin::Pin;

use crate::app::{App, theme};
use crate::engine::Completion;
use crate::error::CommandError;
use crate::player::PlaybackSink;
use crate::providers::ContentProvider;
use crate::types::Translation;
use crate::view;

pub type CommandFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + 'a>>;
pub type CommandHandler<T> = for<'a> fn(&'a mut T, &'a str) -> CommandFuture<'a>;

pub struct Command<T> {
    key: String,
    help: String,
    aliases: Vec<String>,
    usage: Option<String>,
    handler: CommandHandler<T>,
    subcommands: CommandRegistry<T>,
}

impl<T> Command<T> {
    pub fn new(key: &str, help: &str, handler: CommandHandler<T>) -> Self {
        Self {
            key: key.to_string(),
            help: help.to_string(),
            aliases: Vec::new(),
            usage: None,
            handler,
            subcommands: CommandRegistry::new(),
        }
    }

    pub fn alias(mut self, alias: &str) -> Self {
        self.aliases.push(alias.to_string());
        self
    }

    pub fn usage(mut self, usage: &str) -> Self {
        self.usage = Some(usage.to_string());
        self
    }

    pub fn subcommands(mut self, subcommands: CommandRegistry<T>) -> Self {
        self.subcommands = subcommands;
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    fn matches(&self, word: &str) -> bool {
        self.key == word || self.aliases.iter().any(|a| a == word)
    }

    fn names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.key.as_str()).chain(self.aliases.iter().map(String::as_str))
    }
}

/// Commands in registration order.
pub struct CommandRegistry<T> {
    commands: Vec<Command<T>>,
}

impl<T> Default for CommandRegistry<T> {
    fn default() -> Self {
        Self {
            commands: Vec::new(),
        }
    }
}

impl<T> CommandRegistry<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, command: Command<T>) -> Result<(), CommandError> {
        if self.get(&command.key).is_some() {
            return Err(CommandError::DuplicateCommand(command.key));
        }
        for (idx, alias) in command.aliases.iter().enumerate() {
            if *alias == command.key
                || self.get(alias).is_some()
                || command.aliases[..idx].contains(alias)
            {
                return Err(CommandError::DuplicateAlias {
                    command: command.key.clone(),
                    alias: alias.clone(),
                });
            }
        }
        self.commands.push(command);
        Ok(())
    }

    pub fn get(&self, word: &str) -> Option<&Command<T>> {
        self.commands.iter().find(|cmd| cmd.matches(word))
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Handler and remaining arguments for `line`, following sub-commands
    /// as deep as they match.
    pub fn resolve(&self, line: &str) -> Option<(CommandHandler<T>, String)> {
        let (word, rest) = split_word(line);
        let command = self.get(word)?;
        if let Some(found) = command.subcommands.resolve(rest) {
            return Some(found);
        }
        Some((command.handler, rest.to_string()))
    }

    pub fn completions(&self, text: &str) -> Vec<Completion> {
        let trimmed = text.trim_start();
        match trimmed.split_once(char::is_whitespace) {
            Some((word, rest)) => self
                .get(word)
                .map(|cmd| {
                    cmd.subcommands
                        .completions(rest)
                        .into_iter()
                        .map(|c| Completion::new(format!("{} {}", cmd.key, c.value), c.meta))
                        .collect()
                })
                .unwrap_or_default(),
            None => self
                .commands
                .iter()
                .flat_map(|cmd| cmd.names().map(move |name| (name, cmd)))
                .filter(|(name, _)| name.starts_with(trimmed))
                .map(|(name, cmd)| Completion::new(name, cmd.help.clone()))
                .collect(),
        }
    }

    pub fn overview(&self) -> String {
        let rows: Vec<(String, String)> = self
            .commands
            .iter()
            .map(|cmd| (cmd.names().collect::<Vec<_>>().join(", "), cmd.help.clone()))
            .collect();
        view::rows_table(&rows)
    }

    /// Help of one command: description, usage and sub-commands.
    pub fn describe(&self, line: &str) -> Option<String> {
        let (word, rest) = split_word(line);
        let command = self.get(word)?;
        if !rest.is_empty() {
            if let Some(sub) = command.subcommands.describe(rest) {
                return Some(sub);
            }
        }
        let mut out = format!("{} - {}", command.key, command.help);
        if !command.aliases.is_empty() {
            out.push_str(&format!("\naliases: {}", command.aliases.join(", ")));
        }
        if let Some(usage) = &command.usage {
            out.push_str(&format!("\nusage: {usage}"));
        }
        if !command.subcommands.is_empty() {
            out.push_str("\n\n");
            out.push_str(&command.subcommands.overview());
        }
        Some(out)
    }
}

/// First word and the trimmed remainder.
pub fn split_word(line: &str) -> (&str, &str) {
    let line = line.trim();
    match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    }
}

pub fn build<P, S>() -> Result<CommandRegistry<App<P, S>>, CommandError>
where
    P: ContentProvider + 'static,
    S: PlaybackSink + 'static,
{
    let mut config = CommandRegistry::new();
    config.register(Command::new("info", "show current settings", config_info::<P, S>))?;
    config.register(
        Command::new("quality", "set the preferred video quality", config_quality::<P, S>)
            .usage("config quality <360|480|720|1080>"),
    )?;
    config.register(
        Command::new("m3u-size", "set how many episodes go in one playlist", config_m3u_size::<P, S>)
            .usage("config m3u-size <n>"),
    )?;
    config.register(
        Command::new("translation", "switch between sub and dub", config_translation::<P, S>)
            .usage("config translation <sub|dub>"),
    )?;

    let mut commands = CommandRegistry::new();
    commands.register(
        Command::new("search", "search anime by title", search::<P, S>)
            .alias("s")
            .usage("search <title>"),
    )?;
    commands.register(Command::new("ongoing", "recently updated anime", ongoing::<P, S>).alias("o"))?;
    commands.register(Command::new("history", "recently watched anime", history::<P, S>))?;
    commands.register(
        Command::new("config", "show or change settings for this session", config_info::<P, S>)
            .usage("config <info|quality|m3u-size|translation> [value]")
            .subcommands(config),
    )?;
    commands.register(
        Command::new("help", "list commands or describe one", help::<P, S>)
            .usage("help [command]"),
    )?;
    commands.register(Command::new("clear", "clear the screen", clear::<P, S>).alias("cls"))?;
    commands.register(Command::new("exit", "leave anicli", exit::<P, S>).alias("quit"))?;
    Ok(commands)
}

fn search<'a, P, S>(app: &'a mut App<P, S>, args: &'a str) -> CommandFuture<'a>
where
    P: ContentProvider + 'static,
    S: PlaybackSink + 'static,
{
    Box::pin(async move {
        if args.is_empty() {
            println!("Usage: search <title>");
            return Ok(());
        }
        let results = app.services().provider.search(args).await?;
        app.start_route("search", results, true, Some(args))
    })
}

fn ongoing<'a, P, S>(app: &'a mut App<P, S>, _args: &'a str) -> CommandFuture<'a>
where
    P: ContentProvider + 'static,
    S: PlaybackSink + 'static,
{
    Box::pin(async move {
        let results = app.services().provider.ongoing().await?;
        app.start_route("ongoing", results, true, None)
    })
}

fn history<'a, P, S>(app: &'a mut App<P, S>, _args: &'a str) -> CommandFuture<'a>
where
    P: ContentProvider + 'static,
    S: PlaybackSink + 'static,
{
    Box::pin(async move {
        let services = app.services();
        let watched = services.history.load(services.provider.name())?;
        if watched.is_empty() {
            println!("History is empty.");
            return Ok(());
        }
        app.start_route("history", watched, false, None)
    })
}

fn config_info<'a, P, S>(app: &'a mut App<P, S>, _args: &'a str) -> CommandFuture<'a>
where
    P: ContentProvider + 'static,
    S: PlaybackSink + 'static,
{
    Box::pin(async move {
        println!("{}", view::rows_table(&app.settings().rows()));
        Ok(())
    })
}

fn config_quality<'a, P, S>(app: &'a mut App<P, S>, args: &'a str) -> CommandFuture<'a>
where
    P: ContentProvider + 'static,
    S: PlaybackSink + 'static,
{
    Box::pin(async move {
        app.settings_mut().set("quality", args)?;
        println!("quality: {}p", app.settings().quality);
        Ok(())
    })
}

fn config_m3u_size<'a, P, S>(app: &'a mut App<P, S>, args: &'a str) -> CommandFuture<'a>
where
    P: ContentProvider + 'static,
    S: PlaybackSink + 'static,
{
    Box::pin(async move {
        app.settings_mut().set("m3u-size", args)?;
        println!("m3u_size: {}", app.settings().m3u_size);
        Ok(())
    })
}

fn config_translation<'a, P, S>(app: &'a mut App<P, S>, args: &'a str) -> CommandFuture<'a>
where
    P: ContentProvider + 'static,
    S: PlaybackSink + 'static,
{
    Box::pin(async move {
        app.settings_mut().set("translation", args)?;
        let translation: Translation = app.settings().translation;
        app.services_mut().provider.set_translation(translation);
        println!("translation: {}", translation.label());
        Ok(())
    })
}

fn help<'a, P, S>(app: &'a mut App<P, S>, args: &'a str) -> CommandFuture<'a>
where
    P: ContentProvider + 'static,
    S: PlaybackSink + 'static,
{
    Box::pin(async move {
        if args.is_empty() {
            println!("{}", app.commands().overview());
            let routes: Vec<_> = app.navigator().registry().route_keys().collect();
            println!("\nlists: {}", routes.join(", "));
            println!("inside a list: <n> pick, .. back, ~ main menu, history path, info details");
            return Ok(());
        }
        match app.commands().describe(args) {
            Some(text) => println!("{text}"),
            None => println!("Unknown command: {}", split_word(args).0),
        }
        Ok(())
    })
}

fn clear<'a, P, S>(_app: &'a mut App<P, S>, _args: &'a str) -> CommandFuture<'a>
where
    P: ContentProvider + 'static,
    S: PlaybackSink + 'static,
{
    Box::pin(async move {
        print!("\x1B[2J\x1B[1;1H");
        Ok(())
    })
}

fn exit<'a, P, S>(app: &'a mut App<P, S>, _args: &'a str) -> CommandFuture<'a>
where
    P: ContentProvider + 'static,
    S: PlaybackSink + 'static,
{
    Box::pin(async move {
        let confirmed = Confirm::with_theme(&theme())
            .with_prompt("Exit anicli?")
            .default(true)
            .interact()?;
        if confirmed {
            app.stop();
        }
        Ok(())
    })
}
