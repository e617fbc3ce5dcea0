use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use notify::event::{CreateKind, ModifyKind, RemoveKind};
use notify::{Event, EventKind, RecursiveMode, Watcher, recommended_watcher};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::events::LibrarySignal;
use crate::library::MediaKind;

/// Raise `signal` whenever media appears, disappears or is renamed under `root`.
///
/// The watcher never touches the index itself; the display thread rescans when
/// it next sees the signal.
#[instrument(skip(root, signal, cancel), fields(root = %root.display()))]
pub async fn run(
    root: PathBuf,
    recursive: bool,
    signal: LibrarySignal,
    cancel: CancellationToken,
) -> Result<()> {
    if !root.is_dir() {
        warn!("library directory missing; relying on idle rescans");
        cancel.cancelled().await;
        return Ok(());
    }

    let (watch_tx, mut watch_rx) = mpsc::channel::<notify::Result<Event>>(128);
    let mut watcher = recommended_watcher(move |res| {
        let _ = watch_tx.blocking_send(res);
    })
    .context("failed to create filesystem watcher")?;
    let mode = if recursive {
        RecursiveMode::Recursive
    } else {
        RecursiveMode::NonRecursive
    };
    watcher
        .watch(&root, mode)
        .with_context(|| format!("failed to watch {}", root.display()))?;
    info!(recursive, "library watcher initialized");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("cancel received; exiting watcher task");
                break;
            }
            Some(res) = watch_rx.recv() => match res {
                Ok(event) => {
                    if is_library_change(&event) {
                        debug!(kind = ?event.kind, paths = ?event.paths, "library changed");
                        signal.raise();
                    } else {
                        debug!(kind = ?event.kind, "fs: ignored");
                    }
                }
                Err(err) => error!("watch error: {err}"),
            }
        }
    }
    Ok(())
}

/// Creations, removals and renames of media files or of directories that may hold them.
pub fn is_library_change(event: &Event) -> bool {
    match event.kind {
        EventKind::Create(CreateKind::Folder) | EventKind::Remove(RemoveKind::Folder) => true,
        EventKind::Create(_) | EventKind::Remove(_) | EventKind::Modify(ModifyKind::Name(_)) => {
            event.paths.iter().any(|p| is_media(p) || p.is_dir())
        }
        _ => false,
    }
}

fn is_media(path: &Path) -> bool {
    MediaKind::from_path(path).is_some()
}
