//! The anime pick-list: results, episodes, sources, then playback. Search,
//! ongoing and history all run these steps and differ only in seed data.

use anyhow::{Context, Result, anyhow};
use tracing::debug;

use crate::batch::{BatchEvent, VideoSequence, play_batched};
use crate::config::Settings;
use crate::engine::completion::{index_completions, title_completions};
use crate::engine::{
    Completion, HandlerFuture, Registry, SessionContext, StateDefinition, Transition, Value,
};
use crate::error::RegistryError;
use crate::history::HistoryStore;
use crate::player::{PlaybackSink, PlayerOptions};
use crate::providers::{ContentProvider, pick_nearest_quality};
use crate::selection::{is_digits, parse_selection_mask};
use crate::types::{Candidate, PlaybackItem};
use crate::view;

pub const RESULTS: &str = "results";
pub const ANIME: &str = "anime";
pub const EPISODES: &str = "episodes";
pub const EPISODES_NUM: &str = "episodes_num";
pub const EPISODES_MASK: &str = "episodes_mask";
pub const SOURCES: &str = "sources";
pub const VIDEOS: &str = "videos";
pub const DEFAULT_QUALITY: &str = "default_quality";
pub const MPV_OPTS: &str = "mpv_opts";
pub const M3U_SIZE: &str = "m3u_size";
pub const PROVIDER_NAME: &str = "provider_name";
pub const SAVE_HISTORY: &str = "save_history";
pub const QUERY: &str = "query";

pub const ROUTES: [&str; 3] = ["search", "ongoing", "history"];

/// What the steps talk to.
pub struct Services<P, S> {
    pub provider: P,
    pub sink: S,
    pub history: HistoryStore,
}

/// Session data a route starts with.
pub fn seed(results: Vec<Candidate>, settings: &Settings, provider_name: &str) -> SessionContext {
    SessionContext::new()
        .with(RESULTS, Value::Candidates(results))
        .with(DEFAULT_QUALITY, Value::Number(u64::from(settings.quality)))
        .with(MPV_OPTS, Value::Text(settings.mpv_opts.clone()))
        .with(M3U_SIZE, Value::Number(settings.m3u_size as u64))
        .with(PROVIDER_NAME, Value::Text(provider_name.to_string()))
}

pub fn register<P, S>(registry: &mut Registry<Services<P, S>>) -> Result<(), RegistryError>
where
    P: ContentProvider + 'static,
    S: PlaybackSink + 'static,
{
    for route in ROUTES {
        registry.register_route(route, anime_states(), "step_1", &[])?;
    }
    Ok(())
}

fn anime_states<P, S>() -> Vec<StateDefinition<Services<P, S>>>
where
    P: ContentProvider + 'static,
    S: PlaybackSink + 'static,
{
    vec![
        StateDefinition::new("step_1", pick_anime::<P, S>)
            .help("pick a title")
            .prompt("~/{ROUTE_NAME} ")
            .pick_one(RESULTS)
            .when_empty("No results found")
            .completer(result_completions)
            .on_enter(show_results),
        StateDefinition::new("step_2", pick_episodes::<P, S>)
            .help("pick an episode or a slice like 1-3 5")
            .prompt("~/{ROUTE_NAME}/{result}/episode ")
            .pick_many(EPISODES)
            .when_empty("not available episodes")
            .info(anime_info)
            .on_enter(show_episodes),
        StateDefinition::new("step_3", play_one::<P, S>)
            .help("pick a source")
            .prompt("~/{ROUTE_NAME}/{result}/episode/{episode} ")
            .pick_one(SOURCES)
            .when_empty("not available sources")
            .on_enter(show_sources),
        StateDefinition::new("step_3_batched", play_slice::<P, S>)
            .help("pick a source for the whole slice")
            .prompt("~/{ROUTE_NAME}/{result}/episode/{episode} ")
            .pick_one(SOURCES)
            .when_empty("not available sources")
            .on_enter(show_sources),
    ]
}

fn pick_anime<'a, P, S>(
    svc: &'a Services<P, S>,
    ctx: &'a mut SessionContext,
    input: &'a str,
) -> HandlerFuture<'a>
where
    P: ContentProvider + 'static,
    S: PlaybackSink + 'static,
{
    Box::pin(async move {
        let anime = picked(ctx, RESULTS, input)?;
        let episodes = svc.provider.episodes(&anime).await?;
        if !episodes.is_empty() && ctx.flag(SAVE_HISTORY) {
            let provider = ctx.text(PROVIDER_NAME).unwrap_or(svc.provider.name());
            svc.history.save(&anime, provider)?;
        }
        ctx.set_prompt_var("result", &anime.title);
        ctx.set(ANIME, Value::Candidate(anime));
        ctx.set(EPISODES, Value::Candidates(episodes));
        Ok(Transition::next("step_2"))
    })
}

fn pick_episodes<'a, P, S>(
    svc: &'a Services<P, S>,
    ctx: &'a mut SessionContext,
    input: &'a str,
) -> HandlerFuture<'a>
where
    P: ContentProvider + 'static,
    S: PlaybackSink + 'static,
{
    Box::pin(async move {
        if is_digits(input) {
            let episode = picked(ctx, EPISODES, input)?;
            let sources = svc.provider.sources(&episode).await?;
            ctx.set(EPISODES_NUM, Value::Index(index_of(input)?));
            ctx.set_prompt_var("episode", format!("[{input}]"));
            ctx.set(SOURCES, Value::Candidates(sources));
            return Ok(Transition::next("step_3"));
        }

        let episodes = ctx.candidates(EPISODES);
        let mask = parse_selection_mask(input, episodes.len())?;
        debug!(selected = mask.count(), of = mask.len(), "episode slice");
        let Some(first) = mask
            .indices()
            .next()
            .and_then(|idx| episodes.get(idx))
            .cloned()
        else {
            ctx.notice("no episodes selected");
            return Ok(Transition::Continue);
        };
        let sources = svc.provider.sources(&first).await?;
        ctx.set_prompt_var("episode", format!("[{input}]"));
        ctx.set(EPISODES_MASK, Value::Mask(mask));
        ctx.set(SOURCES, Value::Candidates(sources));
        Ok(Transition::next("step_3_batched"))
    })
}

fn play_one<'a, P, S>(
    svc: &'a Services<P, S>,
    ctx: &'a mut SessionContext,
    input: &'a str,
) -> HandlerFuture<'a>
where
    P: ContentProvider + 'static,
    S: PlaybackSink + 'static,
{
    Box::pin(async move {
        let source = picked(ctx, SOURCES, input)?;
        let videos = svc.provider.videos(&source).await?;
        let Some(video) = pick_nearest_quality(&videos, default_quality(ctx)).cloned() else {
            ctx.notice("video not found");
            return Ok(Transition::GoBack);
        };
        let anime = current(ctx, ANIME)?;
        let episode = ctx
            .index(EPISODES_NUM)
            .and_then(|idx| ctx.candidates(EPISODES).get(idx))
            .cloned()
            .ok_or_else(|| anyhow!("no episode picked yet"))?;
        let options = PlayerOptions::from_mpv_opts(ctx.text(MPV_OPTS).unwrap_or_default())?;
        ctx.set(VIDEOS, Value::Candidates(videos));

        let title = format!("{} - {}", anime.title, episode.title);
        println!("Playing {title} [{}]", video.label());
        svc.sink.play(&[PlaybackItem::new(video, title)], &options).await?;
        svc.history.record_episode(&anime.title, &episode, &source)?;
        Ok(Transition::GoBack)
    })
}

fn play_slice<'a, P, S>(
    svc: &'a Services<P, S>,
    ctx: &'a mut SessionContext,
    input: &'a str,
) -> HandlerFuture<'a>
where
    P: ContentProvider + 'static,
    S: PlaybackSink + 'static,
{
    Box::pin(async move {
        let source = picked(ctx, SOURCES, input)?;
        let videos = svc.provider.videos(&source).await?;
        let Some(initial_video) = pick_nearest_quality(&videos, default_quality(ctx)).cloned()
        else {
            ctx.notice("video not found");
            return Ok(Transition::GoBack);
        };
        let anime = current(ctx, ANIME)?;
        let mask = ctx
            .mask(EPISODES_MASK)
            .cloned()
            .ok_or_else(|| anyhow!("no episode slice in session"))?;
        let selected = mask.apply(ctx.candidates(EPISODES));
        let batch_size = ctx.number(M3U_SIZE).map_or(1, |n| n as usize);
        let options = PlayerOptions::from_mpv_opts(ctx.text(MPV_OPTS).unwrap_or_default())?;

        let mut sequence =
            VideoSequence::new(&svc.provider, &anime.title, selected, &source, &initial_video);
        let report = play_batched(&mut sequence, &svc.sink, batch_size, &options, |event| {
            match event {
                BatchEvent::Fetched(title) => println!("Fetch: {title}"),
                BatchEvent::Flush { last: true, .. } => println!("Running final playlist batch"),
                BatchEvent::Flush { batch, .. } => println!("Running playlist batch {batch}"),
            }
        })
        .await?;

        if let Some(episode) = sequence.last_episode() {
            svc.history.record_episode(&anime.title, episode, &source)?;
        }
        if let Some(episode) = &report.stopped_at {
            ctx.notice(format!(
                "{} ({}) is not available for {episode}, stopped",
                source.title,
                source.host()
            ));
        }
        if !report.skipped.is_empty() {
            ctx.notice(format!(
                "skipped, no {} video: {}",
                initial_video.label(),
                report.skipped.join(", ")
            ));
        }
        ctx.set(VIDEOS, Value::Candidates(videos));
        Ok(Transition::GoBack)
    })
}

fn index_of(input: &str) -> Result<usize> {
    let number: usize = input
        .parse()
        .with_context(|| format!("'{input}' is not an index"))?;
    number
        .checked_sub(1)
        .ok_or_else(|| anyhow!("start index should be at 1"))
}

fn picked(ctx: &SessionContext, key: &str, input: &str) -> Result<Candidate> {
    let idx = index_of(input)?;
    ctx.candidates(key)
        .get(idx)
        .cloned()
        .ok_or_else(|| anyhow!("no {key} entry at {input}"))
}

fn current(ctx: &SessionContext, key: &str) -> Result<Candidate> {
    ctx.candidate(key)
        .cloned()
        .ok_or_else(|| anyhow!("no {key} picked yet"))
}

fn default_quality(ctx: &SessionContext) -> u32 {
    ctx.number(DEFAULT_QUALITY)
        .and_then(|q| u32::try_from(q).ok())
        .unwrap_or(1080)
}

fn result_completions(ctx: &SessionContext, text: &str) -> Vec<Completion> {
    let results = ctx.candidates(RESULTS);
    let mut found = title_completions(results, text);
    found.extend(index_completions(results, text));
    found
}

fn anime_info(ctx: &SessionContext) -> Option<String> {
    ctx.candidate(ANIME).map(view::details)
}

fn show_results(ctx: &mut SessionContext) {
    let table = view::candidate_table(ctx.candidates(RESULTS));
    ctx.notice(table);
}

fn show_episodes(ctx: &mut SessionContext) {
    let table = view::candidate_table(ctx.candidates(EPISODES));
    ctx.notice(table);
}

fn show_sources(ctx: &mut SessionContext) {
    let table = view::candidate_table(ctx.candidates(SOURCES));
    ctx.notice(table);
}
