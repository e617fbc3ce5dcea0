//! Line-delimited JSON control socket: config pushes and rescan requests.
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use config_model::{ConfigPatch, LiveSettings};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::events::{ControlCommand, ControlReply, LibrarySignal};

#[instrument(skip(path, settings, signal, cancel), fields(socket = %path.display()))]
pub async fn run(
    path: PathBuf,
    settings: watch::Sender<Arc<LiveSettings>>,
    signal: LibrarySignal,
    cancel: CancellationToken,
) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    if path.exists() {
        debug!("removing stale control socket");
        fs::remove_file(&path)
            .with_context(|| format!("failed to remove stale socket {}", path.display()))?;
    }
    let listener = UnixListener::bind(&path)
        .with_context(|| format!("failed to bind control socket {}", path.display()))?;
    info!("control socket listening");

    let settings = Arc::new(settings);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("cancel received; closing control socket");
                break;
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, _)) => {
                    let settings = Arc::clone(&settings);
                    let signal = signal.clone();
                    let cancel = cancel.clone();
                    tokio::spawn(async move {
                        if let Err(err) = serve_client(stream, &settings, &signal, &cancel).await {
                            debug!("control client ended: {err:#}");
                        }
                    });
                }
                Err(err) => warn!("control socket accept failed: {err}"),
            }
        }
    }

    drop(listener);
    if let Err(err) = fs::remove_file(&path) {
        debug!("failed to remove control socket: {err}");
    }
    Ok(())
}

async fn serve_client(
    stream: UnixStream,
    settings: &watch::Sender<Arc<LiveSettings>>,
    signal: &LibrarySignal,
    cancel: &CancellationToken,
) -> Result<()> {
    let (read, mut write) = stream.into_split();
    let mut lines = BufReader::new(read).lines();
    loop {
        let line = tokio::select! {
            _ = cancel.cancelled() => break,
            line = lines.next_line() => line?,
        };
        let Some(line) = line else {
            break;
        };
        if line.trim().is_empty() {
            continue;
        }
        let reply = handle_line(&line, settings, signal);
        let mut out = serde_json::to_string(&reply)?;
        out.push('\n');
        write.write_all(out.as_bytes()).await?;
    }
    Ok(())
}

/// Parse and apply one command line.
pub fn handle_line(
    line: &str,
    settings: &watch::Sender<Arc<LiveSettings>>,
    signal: &LibrarySignal,
) -> ControlReply {
    let command: ControlCommand = match serde_json::from_str(line) {
        Ok(command) => command,
        Err(err) => {
            warn!("rejected control command: {err}");
            return ControlReply::rejected(format!("invalid command: {err}"));
        }
    };
    match command {
        ControlCommand::RescanLibrary => {
            info!("library rescan requested");
            signal.raise();
            ControlReply::ok()
        }
        command @ ControlCommand::ApplyConfig { .. } => {
            let patch = command.into_patch().unwrap_or_default();
            match apply_patch(settings, &patch) {
                Ok(changed) => {
                    info!(changed, "config push applied");
                    ControlReply::ok()
                }
                Err(err) => {
                    warn!("rejected config push: {err:#}");
                    ControlReply::rejected(format!("{err:#}"))
                }
            }
        }
    }
}

/// Validate `patch`, merge it into the live snapshot and publish the result.
/// Returns whether anything changed. Invalid patches leave the snapshot untouched.
pub fn apply_patch(settings: &watch::Sender<Arc<LiveSettings>>, patch: &ConfigPatch) -> Result<bool> {
    let mut outcome = Ok(false);
    settings.send_if_modified(|current| match current.merged(patch) {
        Ok(next) if next != **current => {
            *current = Arc::new(next);
            outcome = Ok(true);
            true
        }
        Ok(_) => false,
        Err(err) => {
            outcome = Err(err);
            false
        }
    });
    outcome
}
