//! In-memory provider and sink for tests.

use anyhow::{Result, bail};
use std::collections::HashMap;
use std::sync::Mutex;

use crate::player::{PlaybackSink, PlayerOptions};
use crate::providers::ContentProvider;
use crate::types::{Candidate, CandidateKind, PlaybackItem, Translation};

pub const HOST: &str = "cdn.example.org";

pub fn anime(title: &str) -> Candidate {
    Candidate::new(CandidateKind::Anime, title)
        .with_url(format!("https://{HOST}/anime/{}", title.replace(' ', "-")))
        .with_detail("description", format!("{title} description"))
}

pub fn episode(n: usize) -> Candidate {
    Candidate::new(CandidateKind::Episode, format!("Episode {n}"))
}

pub fn source(title: &str, host: &str, n: usize) -> Candidate {
    Candidate::new(CandidateKind::Source, title).with_url(format!("https://{host}/{n}/{title}"))
}

pub fn video(source: &Candidate, quality: u32) -> Candidate {
    Candidate::new(CandidateKind::Video, source.title.clone())
        .with_url(format!("{}/{quality}.m3u8", source.url))
        .with_quality(quality)
        .with_header("Referer", format!("https://{HOST}"))
}

/// Serves fixed lists. Episodes are keyed by anime title, sources by episode
/// title and videos by source url.
#[derive(Default)]
pub struct FakeProvider {
    results: Vec<Candidate>,
    ongoing: Vec<Candidate>,
    episodes: HashMap<String, Vec<Candidate>>,
    sources: HashMap<String, Vec<Candidate>>,
    videos: HashMap<String, Vec<Candidate>>,
    failing: Vec<String>,
    calls: Mutex<Vec<String>>,
}

impl FakeProvider {
    /// `titles` as search and ongoing results, each with `episodes` episodes
    /// served by one "Default" source in 720p and 1080p.
    pub fn catalog(titles: &[&str], episodes: usize) -> Self {
        let mut provider = Self::default();
        for title in titles {
            provider.results.push(anime(title));
            provider.episodes.insert(
                title.to_string(),
                (1..=episodes).map(episode).collect(),
            );
        }
        provider.ongoing = provider.results.clone();
        for n in 1..=episodes {
            provider.set_sources(n, vec![source("Default", HOST, n)]);
        }
        provider
    }

    pub fn set_sources(&mut self, n: usize, sources: Vec<Candidate>) {
        for src in &sources {
            self.videos
                .insert(src.url.clone(), vec![video(src, 1080), video(src, 720)]);
        }
        self.sources.insert(format!("Episode {n}"), sources);
    }

    pub fn set_videos(&mut self, source: &Candidate, qualities: &[u32]) {
        let videos = qualities.iter().map(|q| video(source, *q)).collect();
        self.videos.insert(source.url.clone(), videos);
    }

    pub fn set_episodes(&mut self, anime: &str, episodes: Vec<Candidate>) {
        self.episodes.insert(anime.to_string(), episodes);
    }

    /// Calls for `what` (e.g. `"sources"`) fail with a provider error.
    pub fn fail_on(&mut self, what: &str) {
        self.failing.push(what.to_string());
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn record(&self, what: &str, arg: &str) -> Result<()> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(format!("{what}:{arg}"));
        }
        if self.failing.iter().any(|f| f == what) {
            bail!("{what} request failed: connection reset");
        }
        Ok(())
    }
}

impl ContentProvider for FakeProvider {
    fn name(&self) -> &str {
        "fake"
    }

    fn set_translation(&mut self, translation: Translation) {
        if let Ok(calls) = self.calls.get_mut() {
            calls.push(format!("translation:{}", translation.as_str()));
        }
    }

    async fn search(&self, query: &str) -> Result<Vec<Candidate>> {
        self.record("search", query)?;
        let needle = query.to_lowercase();
        Ok(self
            .results
            .iter()
            .filter(|c| c.title.to_lowercase().contains(&needle))
            .cloned()
            .collect())
    }

    async fn ongoing(&self) -> Result<Vec<Candidate>> {
        self.record("ongoing", "")?;
        Ok(self.ongoing.clone())
    }

    async fn episodes(&self, anime: &Candidate) -> Result<Vec<Candidate>> {
        self.record("episodes", &anime.title)?;
        Ok(self.episodes.get(&anime.title).cloned().unwrap_or_default())
    }

    async fn sources(&self, episode: &Candidate) -> Result<Vec<Candidate>> {
        self.record("sources", &episode.title)?;
        Ok(self.sources.get(&episode.title).cloned().unwrap_or_default())
    }

    async fn videos(&self, source: &Candidate) -> Result<Vec<Candidate>> {
        self.record("videos", &source.url)?;
        Ok(self.videos.get(&source.url).cloned().unwrap_or_default())
    }
}

/// Keeps every flushed batch.
#[derive(Default)]
pub struct RecordingSink {
    batches: Mutex<Vec<Vec<PlaybackItem>>>,
}

impl RecordingSink {
    pub fn batches(&self) -> Vec<Vec<PlaybackItem>> {
        self.batches.lock().map(|b| b.clone()).unwrap_or_default()
    }

    /// Titles per batch.
    pub fn titles(&self) -> Vec<Vec<String>> {
        self.batches()
            .into_iter()
            .map(|batch| batch.into_iter().map(|item| item.title).collect())
            .collect()
    }
}

impl PlaybackSink for RecordingSink {
    async fn play(&self, items: &[PlaybackItem], _options: &PlayerOptions) -> Result<()> {
        if let Ok(mut batches) = self.batches.lock() {
            batches.push(items.to_vec());
        }
        Ok(())
    }
}
