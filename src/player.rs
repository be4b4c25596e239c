use anyhow::{Context, Result, anyhow, bail};
use regex::Regex;
use std::io::Write;
use std::path::Path;
use std::sync::LazyLock;
use tokio::process::Command;
use tracing::{debug, info};

use crate::types::PlaybackItem;

pub const PLAYER_ENV_KEY: &str = "ANICLI_PLAYER";

static UNSAFE_TITLE_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[\x00-\x1f\x7f"'`]"#).expect("valid title pattern"));

/// The `ANICLI_PLAYER` environment variable when set, `configured` otherwise.
pub fn detect_player(configured: &str) -> String {
    std::env::var(PLAYER_ENV_KEY)
        .ok()
        .filter(|val| !val.trim().is_empty())
        .unwrap_or_else(|| configured.to_string())
}

/// Extra arguments handed to the player untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlayerOptions {
    pub extra_args: Vec<String>,
}

impl PlayerOptions {
    /// Splits a shell-quoted option string such as `--volume=50 --fs`.
    pub fn from_mpv_opts(raw: &str) -> Result<Self> {
        let extra_args = shlex::split(raw)
            .ok_or_else(|| anyhow!("could not split player options '{raw}'"))?;
        Ok(Self { extra_args })
    }
}

/// Where resolved streams end up. `play` returns once the items were handed
/// over; for mpv that is when the player exits.
pub trait PlaybackSink {
    async fn play(&self, items: &[PlaybackItem], options: &PlayerOptions) -> Result<()>;
}

pub struct MpvSink {
    player: String,
}

impl MpvSink {
    pub fn new(player: impl Into<String>) -> Self {
        Self {
            player: player.into(),
        }
    }
}

impl PlaybackSink for MpvSink {
    async fn play(&self, items: &[PlaybackItem], options: &PlayerOptions) -> Result<()> {
        if items.is_empty() {
            return Ok(());
        }

        // Lives until the player exits; dropping it removes the file.
        let playlist = if items.len() > 1 {
            let mut file = tempfile::Builder::new()
                .prefix("anicli-")
                .suffix(".m3u")
                .tempfile()
                .context("failed to create playlist file")?;
            file.write_all(m3u_playlist(items).as_bytes())
                .context("failed to write playlist file")?;
            Some(file)
        } else {
            None
        };

        let args = build_args(items, options, playlist.as_ref().map(|f| f.path()));
        info!(player = %self.player, items = items.len(), "launching player");
        debug!(?args, "player arguments");

        let status = match Command::new(&self.player).args(&args).status().await {
            Ok(status) => status,
            Err(err) => {
                if err.kind() == std::io::ErrorKind::NotFound {
                    return Err(anyhow!(
                        "Player '{}' not found. Install mpv or set {} to a valid command.",
                        self.player,
                        PLAYER_ENV_KEY
                    ));
                }
                return Err(anyhow!(err).context(format!("failed to launch player '{}'", self.player)));
            }
        };

        if !status.success() {
            bail!("player exited with status {status}");
        }
        Ok(())
    }
}

/// mpv command line for `items`. Headers come from the first item; several
/// items go through the playlist file at `playlist`.
pub fn build_args(
    items: &[PlaybackItem],
    options: &PlayerOptions,
    playlist: Option<&Path>,
) -> Vec<String> {
    let mut args = vec!["--quiet".to_string(), "--terminal=no".to_string()];

    if let Some(first) = items.first() {
        let mut headers: Vec<_> = first.video.headers.iter().collect();
        headers.sort();
        for (key, value) in headers {
            if key.eq_ignore_ascii_case("user-agent") {
                args.push(format!("--user-agent={value}"));
            } else if key.eq_ignore_ascii_case("referer") {
                args.push(format!("--referrer={value}"));
                args.push(format!("--http-header-fields=Referer: {value}"));
            } else {
                args.push(format!("--http-header-fields={key}: {value}"));
            }
        }
    }
    args.extend(options.extra_args.iter().cloned());

    match (items, playlist) {
        ([single], _) => {
            args.push(format!("--force-media-title={}", sanitize_title(&single.title)));
            if let Some((_, sub)) = single.video.details.iter().find(|(k, _)| k == "subtitle") {
                args.push(format!("--sub-file={sub}"));
            }
            args.push(single.url().to_string());
        }
        (_, Some(path)) => args.push(format!("--playlist={}", path.display())),
        (many, None) => args.extend(many.iter().map(|item| item.url().to_string())),
    }
    args
}

pub fn m3u_playlist(items: &[PlaybackItem]) -> String {
    let entries: Vec<String> = items
        .iter()
        .map(|item| format!("#EXTINF:0,{}\n{}", sanitize_title(&item.title), item.url()))
        .collect();
    format!("#EXTM3U\n\n{}\n", entries.join("\n\n"))
}

pub fn sanitize_title(title: &str) -> String {
    UNSAFE_TITLE_CHARS.replace_all(title, "").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Candidate, CandidateKind};

    fn item(title: &str, url: &str) -> PlaybackItem {
        let video = Candidate::new(CandidateKind::Video, "Default")
            .with_url(url)
            .with_header("Referer", "https://allmanga.to")
            .with_header("User-Agent", "anicli");
        PlaybackItem::new(video, title)
    }

    #[test]
    fn single_item_sets_title_and_headers() {
        let options = PlayerOptions::from_mpv_opts("--volume=50 --fs").unwrap();
        let args = build_args(&[item("Lain - Episode 1", "https://cdn/1.mp4")], &options, None);
        assert!(args.contains(&"--referrer=https://allmanga.to".to_string()));
        assert!(args.contains(&"--user-agent=anicli".to_string()));
        assert!(args.contains(&"--volume=50".to_string()));
        assert!(args.contains(&"--force-media-title=Lain - Episode 1".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("https://cdn/1.mp4"));
    }

    #[test]
    fn several_items_use_the_playlist() {
        let items = [item("a", "https://cdn/1.mp4"), item("b", "https://cdn/2.mp4")];
        let args = build_args(&items, &PlayerOptions::default(), Some(Path::new("/tmp/x.m3u")));
        assert_eq!(args.last().map(String::as_str), Some("--playlist=/tmp/x.m3u"));
        assert!(!args.iter().any(|a| a.starts_with("--force-media-title")));
    }

    #[test]
    fn playlist_format() {
        let items = [
            item("Lain - \"Episode 1\"", "https://cdn/1.mp4"),
            item("Lain - Episode 2\n", "https://cdn/2.mp4"),
        ];
        assert_eq!(
            m3u_playlist(&items),
            "#EXTM3U\n\n#EXTINF:0,Lain - Episode 1\nhttps://cdn/1.mp4\n\n#EXTINF:0,Lain - Episode 2\nhttps://cdn/2.mp4\n"
        );
    }

    #[test]
    fn unbalanced_options_are_an_error() {
        assert!(PlayerOptions::from_mpv_opts("--title='oops").is_err());
        assert!(PlayerOptions::from_mpv_opts("").unwrap().extra_args.is_empty());
    }

    #[tokio::test]
    async fn missing_player_is_reported() {
        let sink = MpvSink::new("anicli-test-no-such-player");
        let err = sink
            .play(&[item("a", "https://cdn/1.mp4")], &PlayerOptions::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not found"));
    }
}
