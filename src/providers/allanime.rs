use anyhow::{Context, Result, anyhow, bail};
use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::collections::HashMap;
use tracing::{debug, warn};

use super::ContentProvider;
use crate::types::{Candidate, CandidateKind, Translation};

const ALLANIME_API_URL: &str = "https://api.allanime.day/api";
const ALLANIME_BASE_URL: &str = "https://allanime.day";
const ALLANIME_REFERER: &str = "https://allmanga.to";
const ALLANIME_ORIGIN: &str = "https://allanime.day";
const PREFERRED_PROVIDERS: &[&str] = &["Default", "S-mp4", "Luf-Mp4", "Yt-mp4"];
const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0 Safari/537.36";
const SEARCH_LIMIT: u32 = 25;
const SOURCE_KEY: u8 = 0x38;

pub struct AllAnimeProvider {
    client: Client,
    translation: Translation,
}

impl AllAnimeProvider {
    pub fn new(translation: Translation) -> Result<Self> {
        let client = Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self {
            client,
            translation,
        })
    }

    async fn graphql<T: DeserializeOwned>(
        &self,
        query: &str,
        variables: serde_json::Value,
        what: &str,
    ) -> Result<T> {
        let body = json!({ "query": query, "variables": variables });
        let response = self
            .client
            .post(ALLANIME_API_URL)
            .header("Referer", ALLANIME_REFERER)
            .header("Origin", ALLANIME_ORIGIN)
            .header("Accept", "application/json")
            .json(&body)
            .send()
            .await
            .with_context(|| format!("AllAnime {what} request failed"))?;
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            bail!("AllAnime API HTTP {status}: {text}");
        }
        let envelope: GraphQlEnvelope<T> = serde_json::from_str(&text)
            .with_context(|| format!("failed to parse {what} response"))?;
        extract_data(envelope)
    }

    async fn shows(&self, search: serde_json::Value) -> Result<Vec<Candidate>> {
        let variables = json!({
            "search": search,
            "limit": SEARCH_LIMIT,
            "page": 1,
            "translationType": self.translation.as_str(),
            "countryOrigin": "ALL"
        });
        let payload: SearchPayload = self.graphql(SEARCH_SHOWS_QUERY, variables, "search").await?;
        Ok(payload
            .shows
            .edges
            .into_iter()
            .map(|edge| edge.into_candidate(self.translation))
            .collect())
    }

    async fn fetch_clock_json(&self, url: &str) -> Result<ClockResponse> {
        let response = self
            .client
            .get(url)
            .header("Referer", ALLANIME_REFERER)
            .header("Origin", ALLANIME_ORIGIN)
            .header("Accept", "application/json")
            .send()
            .await
            .with_context(|| format!("request to {url} failed"))?
            .error_for_status()?
            .json::<ClockResponse>()
            .await
            .with_context(|| format!("failed to parse renditions of {url}"))?;
        Ok(response)
    }
}

impl ContentProvider for AllAnimeProvider {
    fn name(&self) -> &str {
        "allanime"
    }

    fn set_translation(&mut self, translation: Translation) {
        debug!(translation = translation.as_str(), "translation switched");
        self.translation = translation;
    }

    async fn search(&self, query: &str) -> Result<Vec<Candidate>> {
        debug!(query, "allanime search");
        self.shows(json!({
            "allowAdult": false,
            "allowUnknown": false,
            "query": query,
        }))
        .await
    }

    async fn ongoing(&self) -> Result<Vec<Candidate>> {
        self.shows(json!({
            "allowAdult": false,
            "allowUnknown": false,
            "sortBy": "Recent",
        }))
        .await
    }

    async fn episodes(&self, anime: &Candidate) -> Result<Vec<Candidate>> {
        let show_id = anime
            .payload()
            .get_str("show_id")
            .ok_or_else(|| anyhow!("'{}' carries no show id", anime.title))?;
        let payload: ShowDetailPayload = self
            .graphql(SHOW_DETAIL_QUERY, json!({ "showId": show_id }), "show detail")
            .await?;
        let detail = payload.show.available_episodes_detail;
        let numbers = match self.translation {
            Translation::Sub => detail.sub,
            Translation::Dub => detail.dub,
        };
        Ok(episode_candidates(show_id, numbers))
    }

    async fn sources(&self, episode: &Candidate) -> Result<Vec<Candidate>> {
        let token = episode.payload();
        let (Some(show_id), Some(number)) = (token.get_str("show_id"), token.get_str("episode"))
        else {
            bail!("'{}' carries no episode reference", episode.title);
        };
        let payload: EpisodePayload = self
            .graphql(
                EPISODE_SOURCES_QUERY,
                json!({
                    "showId": show_id,
                    "translationType": self.translation.as_str(),
                    "episodeString": number
                }),
                "episode",
            )
            .await?;
        Ok(source_candidates(show_id, number, payload.episode.source_urls))
    }

    async fn videos(&self, source: &Candidate) -> Result<Vec<Candidate>> {
        let response = self
            .fetch_clock_json(&source.url)
            .await
            .with_context(|| format!("failed to load videos of source '{}'", source.title))?;
        if response.links.is_empty() {
            warn!(source = %source.title, "source has no playable links");
        }
        let mut videos: Vec<Candidate> = response
            .links
            .into_iter()
            .map(|link| video_candidate(&source.title, link))
            .collect();
        videos.sort_by(|a, b| b.quality.cmp(&a.quality));
        Ok(videos)
    }
}

fn extract_data<T>(envelope: GraphQlEnvelope<T>) -> Result<T> {
    if let Some(errors) = envelope.errors {
        let joined = errors
            .into_iter()
            .map(|e| e.message)
            .collect::<Vec<_>>()
            .join("; ");
        bail!("AllAnime API error: {joined}");
    }
    envelope
        .data
        .ok_or_else(|| anyhow!("AllAnime API returned empty response"))
}

/// Episodes in ascending order; the API lists them newest first.
fn episode_candidates(show_id: &str, mut numbers: Vec<String>) -> Vec<Candidate> {
    numbers.sort_by(|a, b| {
        let a = a.parse::<f64>().unwrap_or(f64::MAX);
        let b = b.parse::<f64>().unwrap_or(f64::MAX);
        a.total_cmp(&b)
    });
    numbers
        .into_iter()
        .map(|number| {
            Candidate::new(CandidateKind::Episode, format!("Episode {number}"))
                .with_token(json!({ "show_id": show_id, "episode": number }))
        })
        .collect()
}

/// Decodable sources only, preferred providers first.
fn source_candidates(show_id: &str, number: &str, sources: Vec<SourceDescriptor>) -> Vec<Candidate> {
    let rank = |name: &str| {
        PREFERRED_PROVIDERS
            .iter()
            .position(|p| *p == name)
            .unwrap_or(PREFERRED_PROVIDERS.len())
    };
    let mut decoded: Vec<_> = sources
        .into_iter()
        .filter_map(|source| {
            let path = decode_provider_path(&source.source_url)?;
            Some((source.source_name, path))
        })
        .collect();
    decoded.sort_by_key(|(name, _)| rank(name));
    decoded
        .into_iter()
        .map(|(name, path)| {
            let url = if path.starts_with("http") {
                path
            } else {
                format!("{ALLANIME_BASE_URL}{path}")
            };
            Candidate::new(CandidateKind::Source, name)
                .with_url(url)
                .with_token(json!({ "show_id": show_id, "episode": number }))
        })
        .collect()
}

fn video_candidate(source_name: &str, link: ClockLink) -> Candidate {
    let label = link.resolution.unwrap_or_else(|| String::from("auto"));
    let mut video = Candidate::new(CandidateKind::Video, source_name)
        .with_url(link.link)
        .with_detail("resolution", label.clone())
        .with_token(json!({ "hls": link.hls }));
    if let Some(quality) = parse_quality(&label) {
        video = video.with_quality(quality);
    }
    if let Some(sub) = link
        .subtitles
        .iter()
        .find(|sub| sub.lang.as_deref() == Some("en") || sub.label.as_deref() == Some("English"))
    {
        video = video.with_detail("subtitle", sub.src.clone());
    }
    for (key, value) in link.headers {
        video = video.with_header(key, value);
    }
    if !video.headers.keys().any(|k| k.eq_ignore_ascii_case("referer")) {
        video = video.with_header("Referer", ALLANIME_REFERER);
    }
    video
}

/// `"1080p"` and `"720"` parse, `"auto"` and `"Mp4"` do not.
fn parse_quality(label: &str) -> Option<u32> {
    label
        .trim()
        .trim_end_matches(['p', 'P'])
        .parse::<u32>()
        .ok()
}

/// Source paths come hex encoded behind a `--` marker, each byte XORed with
/// a fixed key.
fn decode_provider_path(raw: &str) -> Option<String> {
    let hex = raw.strip_prefix("--")?;
    if hex.len() % 2 != 0 {
        return None;
    }
    let bytes = hex
        .as_bytes()
        .chunks(2)
        .map(|pair| {
            let pair = std::str::from_utf8(pair).ok()?;
            u8::from_str_radix(pair, 16).ok().map(|b| b ^ SOURCE_KEY)
        })
        .collect::<Option<Vec<u8>>>()?;
    let mut decoded = String::from_utf8(bytes).ok()?;
    if decoded.contains("/clock") && !decoded.contains(".json") {
        decoded = decoded.replacen("/clock", "/clock.json", 1);
    }
    Some(decoded)
}

#[derive(Debug, Deserialize)]
struct GraphQlEnvelope<T> {
    data: Option<T>,
    errors: Option<Vec<GraphQlError>>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct SearchPayload {
    shows: SearchShows,
}

#[derive(Debug, Deserialize)]
struct SearchShows {
    edges: Vec<SearchEdge>,
}

#[derive(Debug, Deserialize, Clone)]
struct SearchEdge {
    #[serde(rename = "_id")]
    id: String,
    name: String,
    #[serde(rename = "englishName", default)]
    english_name: Option<String>,
    #[serde(rename = "availableEpisodes", default)]
    available_episodes: AvailabilitySnapshot,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

impl SearchEdge {
    fn into_candidate(self, translation: Translation) -> Candidate {
        let count = match translation {
            Translation::Sub => self.available_episodes.sub,
            Translation::Dub => self.available_episodes.dub,
        };
        let mut anime = Candidate::new(CandidateKind::Anime, self.name)
            .with_url(format!("{ALLANIME_BASE_URL}/anime/{}", self.id))
            .with_detail("episodes", format!("{count} ({})", translation.label()))
            .with_token(json!({ "show_id": self.id }));
        if let Some(english) = self.english_name.filter(|name| !name.is_empty()) {
            anime = anime.with_detail("english", english);
        }
        if let Some(status) = self.status {
            anime = anime.with_detail("status", status);
        }
        if let Some(description) = self.description {
            anime = anime.with_detail("description", strip_markup(&description));
        }
        anime
    }
}

fn strip_markup(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut in_tag = false;
    for ch in raw.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => out.push(ch),
            _ => {}
        }
    }
    out.trim().to_string()
}

#[derive(Debug, Deserialize, Clone, Default)]
struct AvailabilitySnapshot {
    #[serde(default)]
    sub: usize,
    #[serde(default)]
    dub: usize,
}

#[derive(Debug, Deserialize)]
struct ShowDetailPayload {
    show: ShowDetail,
}

#[derive(Debug, Deserialize)]
struct ShowDetail {
    #[serde(rename = "availableEpisodesDetail", default)]
    available_episodes_detail: EpisodeDetail,
}

#[derive(Debug, Deserialize, Default)]
struct EpisodeDetail {
    #[serde(default)]
    sub: Vec<String>,
    #[serde(default)]
    dub: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct EpisodePayload {
    episode: EpisodeSources,
}

#[derive(Debug, Deserialize)]
struct EpisodeSources {
    #[serde(rename = "sourceUrls")]
    source_urls: Vec<SourceDescriptor>,
}

#[derive(Debug, Deserialize)]
struct SourceDescriptor {
    #[serde(rename = "sourceUrl")]
    source_url: String,
    #[serde(rename = "sourceName")]
    source_name: String,
}

#[derive(Debug, Deserialize)]
struct ClockResponse {
    #[serde(default)]
    links: Vec<ClockLink>,
}

#[derive(Debug, Deserialize)]
struct ClockLink {
    link: String,
    #[serde(rename = "resolutionStr", default)]
    resolution: Option<String>,
    #[serde(default)]
    hls: bool,
    #[serde(default)]
    subtitles: Vec<ClockSubtitle>,
    #[serde(default)]
    headers: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct ClockSubtitle {
    src: String,
    #[serde(default)]
    lang: Option<String>,
    #[serde(default)]
    label: Option<String>,
}

const SEARCH_SHOWS_QUERY: &str = r#"query($search: SearchInput, $limit: Int, $page: Int, $translationType: VaildTranslationTypeEnumType, $countryOrigin: VaildCountryOriginEnumType) {
  shows(search: $search, limit: $limit, page: $page, translationType: $translationType, countryOrigin: $countryOrigin) {
    edges {
      _id
      name
      englishName
      availableEpisodes
      status
      description
    }
  }
}"#;

const SHOW_DETAIL_QUERY: &str = r#"query($showId: String!) {
  show(_id: $showId) {
    _id
    availableEpisodesDetail
  }
}"#;

const EPISODE_SOURCES_QUERY: &str = r#"query($showId: String!, $translationType: VaildTranslationTypeEnumType!, $episodeString: String!) {
  episode(showId: $showId, translationType: $translationType, episodeString: $episodeString) {
    episodeString
    sourceUrls
  }
}"#;
