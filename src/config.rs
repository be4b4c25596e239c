use anyhow::{Context, Result, anyhow, bail};
use config::{Config, Environment, File};
use dirs_next::config_dir;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::types::Translation;

pub const ENV_PREFIX: &str = "ANICLI";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub provider: String,
    pub translation: Translation,
    pub quality: u32,
    pub mpv_opts: String,
    pub m3u_size: usize,
    pub history_limit: usize,
    pub player: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            provider: "allanime".to_string(),
            translation: Translation::Sub,
            quality: 1080,
            mpv_opts: String::new(),
            m3u_size: 6,
            history_limit: crate::history::DEFAULT_LIMIT,
            player: "mpv".to_string(),
        }
    }
}

/// Values given on the command line; they win over file and environment.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub dub: bool,
    pub quality: Option<u32>,
    pub m3u_size: Option<usize>,
    pub mpv_opts: Option<String>,
}

pub fn config_path() -> Result<PathBuf> {
    let base = config_dir().ok_or_else(|| anyhow!("Could not determine config directory"))?;
    Ok(base.join("anicli").join("config.toml"))
}

impl Settings {
    /// Defaults, then `path` (written with the defaults when missing), then
    /// `ANICLI_*` variables.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            write_default(path)?;
        }
        Self::load_with(path, Environment::with_prefix(ENV_PREFIX).try_parsing(true))
    }

    fn load_with(path: &Path, env: Environment) -> Result<Self> {
        let settings: Settings = Config::builder()
            .add_source(
                Config::try_from(&Settings::default())
                    .context("failed to build default settings")?,
            )
            .add_source(File::from(path).required(false))
            .add_source(env)
            .build()
            .with_context(|| format!("failed to read config {}", path.display()))?
            .try_deserialize()
            .with_context(|| format!("invalid settings in {}", path.display()))?;
        settings.validate()?;
        debug!(?settings, "settings loaded");
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.m3u_size == 0 {
            bail!("m3u_size must be at least 1");
        }
        if self.quality == 0 {
            bail!("quality must be a positive number like 720 or 1080");
        }
        if self.history_limit == 0 {
            bail!("history_limit must be at least 1");
        }
        shlex::split(&self.mpv_opts)
            .ok_or_else(|| anyhow!("mpv_opts has unbalanced quotes: {}", self.mpv_opts))?;
        Ok(())
    }

    pub fn apply(&mut self, overrides: &CliOverrides) -> Result<()> {
        if overrides.dub {
            self.translation = Translation::Dub;
        }
        if let Some(quality) = overrides.quality {
            self.quality = quality;
        }
        if let Some(size) = overrides.m3u_size {
            self.m3u_size = size;
        }
        if let Some(opts) = &overrides.mpv_opts {
            self.mpv_opts = opts.clone();
        }
        self.validate()
    }

    /// Changes one setting for the rest of the session. Keys match the
    /// `config` sub-commands.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let value = value.trim();
        let mut next = self.clone();
        match key {
            "quality" => {
                next.quality = value
                    .trim_end_matches('p')
                    .parse()
                    .with_context(|| format!("'{value}' is not a quality"))?;
            }
            "m3u-size" | "m3u_size" => {
                next.m3u_size = value
                    .parse()
                    .with_context(|| format!("'{value}' is not a batch size"))?;
            }
            "translation" => {
                next.translation = Translation::parse(value)
                    .ok_or_else(|| anyhow!("translation must be 'sub' or 'dub', got '{value}'"))?;
            }
            other => bail!("unknown setting '{other}'"),
        }
        next.validate()?;
        info!(key, value, "setting changed");
        *self = next;
        Ok(())
    }

    pub fn rows(&self) -> Vec<(String, String)> {
        let mpv_opts = if self.mpv_opts.is_empty() {
            "-".to_string()
        } else {
            self.mpv_opts.clone()
        };
        vec![
            ("provider".into(), self.provider.clone()),
            ("translation".into(), self.translation.label().into()),
            ("quality".into(), format!("{}p", self.quality)),
            ("m3u_size".into(), self.m3u_size.to_string()),
            ("mpv_opts".into(), mpv_opts),
            ("history_limit".into(), self.history_limit.to_string()),
            ("player".into(), self.player.clone()),
        ]
    }
}

fn write_default(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create config directory {}", parent.display()))?;
    }
    let data = toml::to_string_pretty(&Settings::default())?;
    fs::write(path, data)
        .with_context(|| format!("failed to write config file {}", path.display()))?;
    info!(path = %path.display(), "default config written");
    Ok(())
}
