use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use url::Url;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Translation {
    #[default]
    Sub,
    Dub,
}

impl Translation {
    pub fn as_str(self) -> &'static str {
        match self {
            Translation::Sub => "sub",
            Translation::Dub => "dub",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Translation::Sub => "Sub",
            Translation::Dub => "Dub",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "sub" => Some(Translation::Sub),
            "dub" => Some(Translation::Dub),
            _ => None,
        }
    }
}

/// Level of the pick hierarchy a candidate belongs to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CandidateKind {
    Anime,
    Episode,
    Source,
    Video,
}

impl CandidateKind {
    pub fn as_str(self) -> &'static str {
        match self {
            CandidateKind::Anime => "anime",
            CandidateKind::Episode => "episode",
            CandidateKind::Source => "source",
            CandidateKind::Video => "video",
        }
    }
}

/// Provider-owned payload used to fetch the next level. The navigator never
/// looks inside it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderToken(Value);

impl ProviderToken {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }
}

/// One entry of a pickable list: a search result, an episode, a dub/source or
/// a video rendition.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub kind: CandidateKind,
    pub title: String,
    pub url: String,
    pub quality: Option<u32>,
    pub headers: HashMap<String, String>,
    pub details: Vec<(String, String)>,
    pub token: ProviderToken,
}

impl Candidate {
    pub fn new(kind: CandidateKind, title: impl Into<String>) -> Self {
        Self {
            kind,
            title: title.into(),
            url: String::new(),
            quality: None,
            headers: HashMap::new(),
            details: Vec::new(),
            token: ProviderToken::default(),
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn with_quality(mut self, quality: u32) -> Self {
        self.quality = Some(quality);
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn with_detail(mut self, label: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.push((label.into(), value.into()));
        self
    }

    pub fn with_token(mut self, token: Value) -> Self {
        self.token = ProviderToken::new(token);
        self
    }

    pub fn payload(&self) -> &ProviderToken {
        &self.token
    }

    pub fn host(&self) -> String {
        Url::parse(&self.url)
            .ok()
            .and_then(|url| url.host_str().map(str::to_owned))
            .unwrap_or_default()
    }

    /// Comparison key used to find the same dub/provider in another episode.
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint {
            title: self.title.clone(),
            host: self.host(),
        }
    }

    pub fn label(&self) -> String {
        match self.kind {
            CandidateKind::Source => format!("{} ({})", self.title, self.host()),
            CandidateKind::Video => match self.quality {
                Some(q) => format!("{}p {} ({})", q, self.title, self.host()),
                None => format!("{} ({})", self.title, self.host()),
            },
            _ => self.title.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    pub title: String,
    pub host: String,
}

/// A stream queued for the playback sink.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackItem {
    pub video: Candidate,
    pub title: String,
}

impl PlaybackItem {
    pub fn new(video: Candidate, title: impl Into<String>) -> Self {
        Self {
            video,
            title: title.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.video.url
    }
}
