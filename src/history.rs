use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use dirs_next::data_dir;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::{debug, warn};

use crate::types::{Candidate, CandidateKind, ProviderToken};

pub const DEFAULT_LIMIT: usize = 50;

fn unknown_episode() -> String {
    "Unknown".to_string()
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SourceRecord {
    pub episode_title: String,
    pub title: String,
    pub url: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct HistoryEntry {
    pub provider: String,
    pub kind: CandidateKind,
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub token: ProviderToken,
    #[serde(default = "unknown_episode")]
    pub episode: String,
    pub watched_at: DateTime<Utc>,
    #[serde(default)]
    pub sources: Vec<SourceRecord>,
}

impl HistoryEntry {
    pub fn from_candidate(item: &Candidate, provider: &str) -> Self {
        Self {
            provider: provider.to_string(),
            kind: item.kind,
            title: item.title.clone(),
            url: item.url.clone(),
            token: item.token.clone(),
            episode: unknown_episode(),
            watched_at: Utc::now(),
            sources: Vec::new(),
        }
    }

    pub fn to_candidate(&self) -> Candidate {
        let mut item = Candidate::new(self.kind, self.title.clone())
            .with_url(self.url.clone())
            .with_detail("last episode", self.episode.clone())
            .with_detail("watched", self.watched_at.format("%Y-%m-%d %H:%M").to_string());
        item.token = self.token.clone();
        item
    }
}

/// Most recent first, one entry per title.
#[derive(Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct History {
    pub entries: Vec<HistoryEntry>,
}

impl History {
    /// A missing file is an empty history; so is one that does not parse.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = fs::read_to_string(path)
            .with_context(|| format!("failed to read history file {}", path.display()))?;
        match serde_json::from_str(&data) {
            Ok(history) => Ok(history),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "ignoring unreadable history file");
                Ok(Self::default())
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed to create history directory {}", parent.display())
            })?;
        }
        let data = serde_json::to_string_pretty(self)?;
        fs::write(path, data)
            .with_context(|| format!("failed to write history file {}", path.display()))?;
        Ok(())
    }

    /// Puts `entry` in front, replacing an older entry with the same title.
    /// Entries beyond `limit` fall off the end.
    pub fn upsert(&mut self, mut entry: HistoryEntry, limit: usize) {
        if let Some(pos) = self.entries.iter().position(|e| e.title == entry.title) {
            let old = self.entries.remove(pos);
            if entry.sources.is_empty() {
                entry.sources = old.sources;
                entry.episode = old.episode;
            }
        }
        self.entries.insert(0, entry);
        self.entries.truncate(limit.max(1));
    }

    pub fn find(&self, title: &str) -> Option<&HistoryEntry> {
        self.entries.iter().find(|e| e.title == title)
    }
}

pub fn history_path() -> Result<PathBuf> {
    let base = data_dir().ok_or_else(|| anyhow!("Could not determine data directory"))?;
    Ok(base.join("anicli").join("history.json"))
}

/// The watch history file the routes read and write.
#[derive(Debug, Clone)]
pub struct HistoryStore {
    path: PathBuf,
    limit: usize,
}

impl HistoryStore {
    pub fn new(path: PathBuf, limit: usize) -> Self {
        Self { path, limit }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remembers `item` as the latest watched title.
    pub fn save(&self, item: &Candidate, provider: &str) -> Result<()> {
        let mut history = History::load(&self.path)?;
        if let Some(previous) = history.find(&item.title) {
            debug!(title = %item.title, last_episode = %previous.episode, "moving title to front");
        }
        history.upsert(HistoryEntry::from_candidate(item, provider), self.limit);
        history.save(&self.path)?;
        debug!(title = %item.title, kind = item.kind.as_str(), "history saved");
        Ok(())
    }

    /// Notes `episode` watched through `source` on the newest entry titled
    /// `anime_title`. Unknown titles are left alone.
    pub fn record_episode(
        &self,
        anime_title: &str,
        episode: &Candidate,
        source: &Candidate,
    ) -> Result<()> {
        let mut history = History::load(&self.path)?;
        let Some(pos) = history.entries.iter().position(|e| e.title == anime_title) else {
            return Ok(());
        };
        let mut entry = history.entries.remove(pos);
        entry.episode = episode.title.clone();
        entry.watched_at = Utc::now();
        entry.sources.retain(|s| s.episode_title != episode.title);
        entry.sources.push(SourceRecord {
            episode_title: episode.title.clone(),
            title: source.title.clone(),
            url: source.url.clone(),
        });
        history.entries.insert(0, entry);
        history.save(&self.path)
    }

    /// Entries written by `provider`, newest first.
    pub fn load(&self, provider: &str) -> Result<Vec<Candidate>> {
        let history = History::load(&self.path)?;
        Ok(history
            .entries
            .iter()
            .filter(|e| e.provider == provider)
            .map(HistoryEntry::to_candidate)
            .collect())
    }
}
