use anyhow::Result;
use tracing::{debug, info, warn};

use crate::player::{PlaybackSink, PlayerOptions};
use crate::providers::ContentProvider;
use crate::types::{Candidate, Fingerprint, PlaybackItem};

/// Streams of the selected episodes that match the source and quality the
/// user picked for the first one. Every call to `next` fetches from the
/// provider; a sequence cannot be restarted.
pub struct VideoSequence<'a, P> {
    provider: &'a P,
    anime_title: String,
    episodes: std::vec::IntoIter<Candidate>,
    source: Fingerprint,
    quality: Option<u32>,
    skipped: Vec<String>,
    stopped_at: Option<String>,
    last_episode: Option<Candidate>,
}

impl<'a, P: ContentProvider> VideoSequence<'a, P> {
    pub fn new(
        provider: &'a P,
        anime_title: impl Into<String>,
        selected: Vec<Candidate>,
        initial_source: &Candidate,
        initial_video: &Candidate,
    ) -> Self {
        Self {
            provider,
            anime_title: anime_title.into(),
            episodes: selected.into_iter(),
            source: initial_source.fingerprint(),
            quality: initial_video.quality,
            skipped: Vec::new(),
            stopped_at: None,
            last_episode: None,
        }
    }

    /// Next playable item. An episode without the picked source ends the
    /// sequence; one without the picked quality is skipped.
    pub async fn next(&mut self) -> Result<Option<PlaybackItem>> {
        if self.stopped_at.is_some() {
            return Ok(None);
        }
        for episode in self.episodes.by_ref() {
            let sources = self.provider.sources(&episode).await?;
            let Some(source) = sources.iter().find(|s| s.fingerprint() == self.source) else {
                warn!(
                    episode = %episode.title,
                    source = %self.source.title,
                    host = %self.source.host,
                    "source missing, stopping batch"
                );
                self.stopped_at = Some(episode.title);
                return Ok(None);
            };

            let videos = self.provider.videos(source).await?;
            match videos.into_iter().find(|v| v.quality == self.quality) {
                Some(video) => {
                    let title = format!("{} - {}", self.anime_title, episode.title);
                    self.last_episode = Some(episode);
                    return Ok(Some(PlaybackItem::new(video, title)));
                }
                None => {
                    debug!(episode = %episode.title, quality = ?self.quality, "quality missing, skipping");
                    self.skipped.push(episode.title);
                }
            }
        }
        Ok(None)
    }

    /// Episodes left out because the quality was not offered.
    pub fn skipped(&self) -> &[String] {
        &self.skipped
    }

    /// Episode of the most recent item handed out.
    pub fn last_episode(&self) -> Option<&Candidate> {
        self.last_episode.as_ref()
    }

    /// Episode at which the source disappeared, if it did.
    pub fn stopped_at(&self) -> Option<&str> {
        self.stopped_at.as_deref()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchEvent {
    Fetched(String),
    Flush { batch: usize, items: usize, last: bool },
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BatchReport {
    pub played: usize,
    pub flushes: usize,
    pub skipped: Vec<String>,
    pub stopped_at: Option<String>,
}

/// Drains `sequence` into `sink` in playlists of about `batch_size` items,
/// reporting progress through `on_event`. The first playlist is one item
/// short so playback starts sooner; the remainder goes out at the end.
pub async fn play_batched<P, S>(
    sequence: &mut VideoSequence<'_, P>,
    sink: &S,
    batch_size: usize,
    options: &PlayerOptions,
    mut on_event: impl FnMut(BatchEvent),
) -> Result<BatchReport>
where
    P: ContentProvider,
    S: PlaybackSink,
{
    let batch_size = batch_size.max(1);
    let mut report = BatchReport::default();
    let mut playlist: Vec<PlaybackItem> = Vec::new();
    let mut counter = 1usize;

    while let Some(item) = sequence.next().await? {
        if counter % batch_size == 0 && !playlist.is_empty() {
            report.flushes += 1;
            on_event(BatchEvent::Flush {
                batch: report.flushes,
                items: playlist.len(),
                last: false,
            });
            info!(batch = report.flushes, items = playlist.len(), "flushing playlist");
            sink.play(&playlist, options).await?;
            playlist.clear();
        }
        on_event(BatchEvent::Fetched(item.title.clone()));
        playlist.push(item);
        report.played += 1;
        counter += 1;
    }

    if !playlist.is_empty() {
        report.flushes += 1;
        on_event(BatchEvent::Flush {
            batch: report.flushes,
            items: playlist.len(),
            last: true,
        });
        info!(batch = report.flushes, items = playlist.len(), "flushing final playlist");
        sink.play(&playlist, options).await?;
    }

    report.skipped = sequence.skipped().to_vec();
    report.stopped_at = sequence.stopped_at().map(str::to_owned);
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeProvider, HOST, RecordingSink, episode, source, video};

    fn selected(numbers: &[usize]) -> Vec<Candidate> {
        numbers.iter().map(|n| episode(*n)).collect()
    }

    async fn run(
        provider: &FakeProvider,
        numbers: &[usize],
        batch_size: usize,
        quality: u32,
    ) -> (BatchReport, RecordingSink, Vec<BatchEvent>) {
        let first = source("Default", HOST, numbers[0]);
        let initial_video = video(&first, quality);
        let mut sequence =
            VideoSequence::new(provider, "Lain", selected(numbers), &first, &initial_video);
        let sink = RecordingSink::default();
        let mut events = Vec::new();
        let report = play_batched(
            &mut sequence,
            &sink,
            batch_size,
            &PlayerOptions::default(),
            |event| events.push(event),
        )
        .await
        .unwrap();
        (report, sink, events)
    }

    #[tokio::test]
    async fn missing_source_stops_the_batch() {
        let mut provider = FakeProvider::catalog(&["Lain"], 4);
        provider.set_sources(3, vec![source("Other", HOST, 3)]);

        let (report, sink, _) = run(&provider, &[1, 2, 3, 4], 2, 1080).await;

        assert_eq!(report.flushes, 2);
        assert_eq!(
            sink.titles(),
            vec![vec!["Lain - Episode 1"], vec!["Lain - Episode 2"]]
        );
        assert_eq!(report.stopped_at.as_deref(), Some("Episode 3"));
        assert!(!provider.calls().contains(&"sources:Episode 4".to_string()));
    }

    #[tokio::test]
    async fn missing_quality_is_skipped() {
        let mut provider = FakeProvider::catalog(&["Lain"], 3);
        provider.set_videos(&source("Default", HOST, 2), &[480]);

        let (report, sink, events) = run(&provider, &[1, 2, 3], 10, 1080).await;

        assert_eq!(report.flushes, 1);
        assert_eq!(
            sink.titles(),
            vec![vec!["Lain - Episode 1", "Lain - Episode 3"]]
        );
        assert_eq!(report.skipped, vec!["Episode 2"]);
        assert_eq!(
            events.last(),
            Some(&BatchEvent::Flush {
                batch: 1,
                items: 2,
                last: true
            })
        );
    }

    #[tokio::test]
    async fn host_is_part_of_the_fingerprint() {
        let mut provider = FakeProvider::catalog(&["Lain"], 2);
        provider.set_sources(2, vec![source("Default", "mirror.example.net", 2)]);

        let (report, sink, _) = run(&provider, &[1, 2], 6, 720).await;

        assert_eq!(report.played, 1);
        assert_eq!(sink.titles(), vec![vec!["Lain - Episode 1"]]);
        assert_eq!(sink.batches()[0][0].video.quality, Some(720));
    }

    #[tokio::test]
    async fn flushes_follow_the_counter() {
        let provider = FakeProvider::catalog(&["Lain"], 7);
        let (report, sink, _) = run(&provider, &[1, 2, 3, 4, 5, 6, 7], 3, 1080).await;
        let sizes: Vec<_> = sink.batches().iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![2, 3, 2]);
        assert_eq!(report.played, 7);

        let (report, sink, _) = run(&provider, &[1, 2, 3], 0, 1080).await;
        assert_eq!(report.flushes, 3);
        assert!(sink.batches().iter().all(|b| b.len() == 1));
    }

    #[tokio::test]
    async fn provider_error_propagates() {
        let mut provider = FakeProvider::catalog(&["Lain"], 2);
        provider.fail_on("videos");
        let first = source("Default", HOST, 1);
        let initial_video = video(&first, 1080);
        let mut sequence =
            VideoSequence::new(&provider, "Lain", selected(&[1, 2]), &first, &initial_video);
        let sink = RecordingSink::default();
        let result =
            play_batched(&mut sequence, &sink, 2, &PlayerOptions::default(), |_| {}).await;
        assert!(result.is_err());
        assert!(sink.batches().is_empty());
    }
}
