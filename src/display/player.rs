//! External video playback: the player owns the screen until its process exits.
use std::path::Path;
use std::process::{Command, Stdio};

use anyhow::{Context, Result, anyhow, ensure};
use tracing::{debug, info, warn};

use crate::config::VideoPlayerOptions;
use crate::error::Error;

pub trait VideoPlayer {
    /// Play `path` to completion. Blocks the calling thread.
    fn play(&mut self, path: &Path) -> Result<(), Error>;
}

/// Runs a primary command and, if that fails, a fallback command, each with the
/// media path appended as the last argument.
#[derive(Debug, Clone)]
pub struct CommandPlayer {
    primary: Vec<String>,
    fallback: Vec<String>,
}

impl CommandPlayer {
    pub fn new(primary: Vec<String>, fallback: Vec<String>) -> Self {
        Self { primary, fallback }
    }

    /// Commands from configuration, honoring the `LEANFRAME_MPV` override.
    pub fn from_options(options: &VideoPlayerOptions) -> Self {
        Self::new(
            options.primary_with_env_override(),
            options.fallback.clone(),
        )
    }
}

impl VideoPlayer for CommandPlayer {
    fn play(&mut self, path: &Path) -> Result<(), Error> {
        let primary_err = match run(&self.primary, path) {
            Ok(()) => return Ok(()),
            Err(err) => err,
        };
        warn!(path = %path.display(), "primary player failed: {primary_err:#}");
        if self.fallback.is_empty() {
            return Err(unavailable(path, primary_err, None));
        }
        match run(&self.fallback, path) {
            Ok(()) => Ok(()),
            Err(fallback_err) => Err(unavailable(path, primary_err, Some(fallback_err))),
        }
    }
}

fn run(command: &[String], path: &Path) -> Result<()> {
    let (program, args) = command
        .split_first()
        .ok_or_else(|| anyhow!("no player command configured"))?;
    info!(program, path = %path.display(), "starting external player");
    let status = Command::new(program)
        .args(args)
        .arg(path)
        .stdin(Stdio::null())
        .status()
        .with_context(|| format!("failed to spawn {program}"))?;
    debug!(program, %status, "external player exited");
    ensure!(status.success(), "{program} exited with {status}");
    Ok(())
}

fn unavailable(path: &Path, primary: anyhow::Error, fallback: Option<anyhow::Error>) -> Error {
    let detail = match fallback {
        Some(fallback) => anyhow!("primary: {primary:#}; fallback: {fallback:#}"),
        None => primary,
    };
    Error::media_unavailable(
        path,
        Error::ExternalPlayer {
            path: path.to_path_buf(),
            source: detail.into(),
        },
    )
}
