use crate::types::{Candidate, Translation};
use anyhow::Result;

pub mod allanime;

/// One anime site. Every level of the pick hierarchy is fetched from the
/// candidate picked one level up; nothing matching is `Ok(vec![])`, never an
/// error.
pub trait ContentProvider {
    fn name(&self) -> &str;

    /// Switches between subbed and dubbed listings for later requests.
    fn set_translation(&mut self, _translation: Translation) {}

    async fn search(&self, query: &str) -> Result<Vec<Candidate>>;
    async fn ongoing(&self) -> Result<Vec<Candidate>>;
    async fn episodes(&self, anime: &Candidate) -> Result<Vec<Candidate>>;
    async fn sources(&self, episode: &Candidate) -> Result<Vec<Candidate>>;
    async fn videos(&self, source: &Candidate) -> Result<Vec<Candidate>>;
}

/// Rendition closest to `target`. Videos without a known quality lose every
/// tie.
pub fn pick_nearest_quality(videos: &[Candidate], target: u32) -> Option<&Candidate> {
    videos.iter().min_by_key(|video| {
        video
            .quality
            .map(|q| q.abs_diff(target))
            .unwrap_or(u32::MAX)
    })
}
