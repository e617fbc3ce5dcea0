use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, ensure};
use config_model::{LiveSettings, PlaybackConfig, RenderConfig, ScreenMessageConfig};
use serde::Deserialize;

/// Environment variable that replaces the primary video player binary.
pub const PLAYER_ENV_OVERRIDE: &str = "LEANFRAME_MPV";

/// Longest accepted `idle-poll-interval`.
pub const IDLE_POLL_INTERVAL_MAX: Duration = Duration::from_secs(1_000_000_000);

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct ScreenOptions {
    /// Windowed width; ignored when fullscreen.
    pub width: Option<u32>,
    /// Windowed height; ignored when fullscreen.
    pub height: Option<u32>,
    pub fullscreen: bool,
    pub cursor_hidden: bool,
}

impl Default for ScreenOptions {
    fn default() -> Self {
        Self {
            width: None,
            height: None,
            fullscreen: true,
            cursor_hidden: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct IndexerOptions {
    /// Watch the library for changes and raise the rescan signal.
    pub watch: bool,
    pub recursive: bool,
    pub ignore_hidden: bool,
}

impl Default for IndexerOptions {
    fn default() -> Self {
        Self {
            watch: true,
            recursive: true,
            ignore_hidden: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct VideoPlayerOptions {
    /// Program and leading arguments; the media path is appended.
    pub primary: Vec<String>,
    pub fallback: Vec<String>,
}

impl Default for VideoPlayerOptions {
    fn default() -> Self {
        Self {
            primary: ["mpv", "--fs", "--no-input-default-bindings", "--really-quiet"]
                .map(String::from)
                .to_vec(),
            fallback: [
                "ffplay",
                "-autoexit",
                "-fs",
                "-hide_banner",
                "-loglevel",
                "error",
            ]
            .map(String::from)
            .to_vec(),
        }
    }
}

impl VideoPlayerOptions {
    /// Primary command with the binary replaced by `LEANFRAME_MPV` when that is set.
    pub fn primary_with_env_override(&self) -> Vec<String> {
        let mut command = self.primary.clone();
        if let Ok(bin) = std::env::var(PLAYER_ENV_OVERRIDE) {
            if !bin.trim().is_empty() {
                match command.first_mut() {
                    Some(first) => *first = bin,
                    None => command.push(bin),
                }
            }
        }
        command
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct Configuration {
    /// Root directory scanned for photos and videos.
    pub library_path: PathBuf,
    /// JSON file holding per-item include/exclude flags.
    pub flags_path: PathBuf,
    /// JSON file holding the last displayed item id.
    pub resume_path: PathBuf,
    pub screen: ScreenOptions,
    pub playback: PlaybackConfig,
    pub render: RenderConfig,
    pub indexer: IndexerOptions,
    /// Size of the background decode pool.
    pub decode_workers: usize,
    /// Number of composed frames kept ready for display.
    pub surface_cache_capacity: usize,
    /// Delay between library rescans while nothing is eligible.
    #[serde(with = "humantime_serde")]
    pub idle_poll_interval: Duration,
    /// Unix socket accepting config pushes; `null` disables it.
    pub control_socket_path: Option<PathBuf>,
    pub video_player: VideoPlayerOptions,
    pub placeholder_screen: ScreenMessageConfig,
}

impl Configuration {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let s = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&s)?)
    }

    /// Validate runtime invariants that cannot be expressed via serde defaults alone.
    pub fn validated(self) -> Result<Self> {
        ensure!(
            !self.library_path.as_os_str().is_empty(),
            "library-path must not be empty"
        );
        ensure!(
            self.decode_workers > 0,
            "decode-workers must be greater than zero"
        );
        ensure!(
            self.surface_cache_capacity > 0,
            "surface-cache-capacity must be greater than zero"
        );
        ensure!(
            !self.idle_poll_interval.is_zero() && self.idle_poll_interval <= IDLE_POLL_INTERVAL_MAX,
            "idle-poll-interval must be within (0s, {}s]",
            IDLE_POLL_INTERVAL_MAX.as_secs()
        );
        ensure!(
            !self.video_player.primary.is_empty(),
            "video-player.primary must name a program"
        );
        if let (Some(w), Some(h)) = (self.screen.width, self.screen.height) {
            ensure!(w > 0 && h > 0, "screen width and height must be positive");
        }
        self.render
            .validate("render")
            .context("invalid render configuration")?;
        self.playback
            .validate("playback")
            .context("invalid playback configuration")?;
        self.placeholder_screen.validate("placeholder-screen")?;
        Ok(self)
    }

    pub fn live_settings(&self) -> LiveSettings {
        LiveSettings::new(self.render, self.playback.clone())
    }

    pub fn placeholder_message(&self) -> String {
        let fallback = format!("No media found in {}", self.library_path.display());
        self.placeholder_screen.message_or(&fallback).into_owned()
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            library_path: PathBuf::from("data/library"),
            flags_path: PathBuf::from("data/flags.json"),
            resume_path: PathBuf::from("data/state/resume.json"),
            screen: ScreenOptions::default(),
            playback: PlaybackConfig::default(),
            render: RenderConfig::default(),
            indexer: IndexerOptions::default(),
            decode_workers: 3,
            surface_cache_capacity: 6,
            idle_poll_interval: Duration::from_secs(2),
            control_socket_path: Some(PathBuf::from("/run/leanframe/control.sock")),
            video_player: VideoPlayerOptions::default(),
            placeholder_screen: ScreenMessageConfig::default(),
        }
    }
}
