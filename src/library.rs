//! Media enumeration consumed by the playlist.
//!
//! The display thread owns the index; watcher tasks only raise
//! [`crate::events::LibrarySignal`] and never reach in here.
use std::collections::{BTreeMap, HashMap, HashSet};
use std::ffi::OsStr;
use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use walkdir::{DirEntry, WalkDir};

use crate::config::IndexerOptions;

pub const IMAGE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "webp", "bmp", "heic", "heif", "dng", "cr2", "arw", "nef", "rw2", "orf",
    "raf", "srw", "tiff", "tif", "avif", "proraw",
];

pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "mkv", "avi", "3gp", "m4v", "webm"];

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct MediaId(pub u64);

impl fmt::Display for MediaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Image,
    Video,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl MediaKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path
            .extension()
            .and_then(OsStr::to_str)
            .map(|s| s.to_ascii_lowercase())?;
        if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            Some(Self::Image)
        } else if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
            Some(Self::Video)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaItem {
    pub id: MediaId,
    pub path: PathBuf,
    pub kind: MediaKind,
}

/// Re-queryable enumeration of media plus the purge hook for files found missing.
pub trait MediaLibrary {
    /// Every known item, ascending by id.
    fn items(&self) -> Vec<MediaItem>;

    /// Re-read the backing store.
    fn rescan(&mut self) -> Result<()>;

    /// Forget an item whose file could not be rendered.
    fn purge(&mut self, id: MediaId);

    /// Root used to derive stable flag keys.
    fn root(&self) -> &Path;
}

/// Filesystem-backed index: ids are handed out in first-seen order and stay
/// stable for as long as the file keeps its path.
#[derive(Debug)]
pub struct DirectoryIndex {
    root: PathBuf,
    options: IndexerOptions,
    next_id: u64,
    by_path: HashMap<PathBuf, MediaId>,
    items: BTreeMap<MediaId, MediaItem>,
    /// Purged paths and their mtime at purge time; skipped until the file changes.
    purged: HashMap<PathBuf, Option<SystemTime>>,
}

impl DirectoryIndex {
    pub fn new(root: impl Into<PathBuf>, options: IndexerOptions) -> Self {
        Self {
            root: root.into(),
            options,
            next_id: 1,
            by_path: HashMap::new(),
            items: BTreeMap::new(),
            purged: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn walk(&self) -> Result<Vec<PathBuf>> {
        match fs::metadata(&self.root) {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => anyhow::bail!("library path {} is not a directory", self.root.display()),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!(root = %self.root.display(), "library root missing; treating as empty");
                return Ok(Vec::new());
            }
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to stat library {}", self.root.display()));
            }
        }

        let mut walker = WalkDir::new(&self.root).follow_links(true).sort_by_file_name();
        if !self.options.recursive {
            walker = walker.max_depth(1);
        }
        let ignore_hidden = self.options.ignore_hidden;
        let mut found = Vec::new();
        for entry in walker
            .into_iter()
            .filter_entry(|e| !(ignore_hidden && e.depth() > 0 && is_hidden(e)))
        {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    warn!("library walk error: {err}");
                    continue;
                }
            };
            if entry.file_type().is_file() && MediaKind::from_path(entry.path()).is_some() {
                found.push(entry.into_path());
            }
        }
        Ok(found)
    }
}

impl MediaLibrary for DirectoryIndex {
    fn items(&self) -> Vec<MediaItem> {
        self.items.values().cloned().collect()
    }

    fn rescan(&mut self) -> Result<()> {
        let paths = self.walk()?;
        let seen: HashSet<&PathBuf> = paths.iter().collect();

        let missing: Vec<PathBuf> = self
            .by_path
            .keys()
            .filter(|path| !seen.contains(path))
            .cloned()
            .collect();
        for path in &missing {
            if let Some(id) = self.by_path.remove(path) {
                self.items.remove(&id);
            }
        }
        self.purged.retain(|path, _| seen.contains(path));

        let mut added = 0usize;
        for path in &paths {
            if self.by_path.contains_key(path) {
                continue;
            }
            if let Some(purged_mtime) = self.purged.get(path) {
                if modified(path) == *purged_mtime {
                    continue;
                }
                self.purged.remove(path);
            }
            let Some(kind) = MediaKind::from_path(path) else {
                continue;
            };
            let id = MediaId(self.next_id);
            self.next_id += 1;
            self.by_path.insert(path.clone(), id);
            self.items.insert(
                id,
                MediaItem {
                    id,
                    path: path.clone(),
                    kind,
                },
            );
            added += 1;
        }

        info!(
            total = self.items.len(),
            added,
            removed = missing.len(),
            "library rescan complete"
        );
        Ok(())
    }

    fn purge(&mut self, id: MediaId) {
        if let Some(item) = self.items.remove(&id) {
            self.by_path.remove(&item.path);
            self.purged.insert(item.path.clone(), modified(&item.path));
            info!(%id, path = %item.path.display(), "purged media item");
        }
    }

    fn root(&self) -> &Path {
        &self.root
    }
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|name| name.starts_with('.'))
        .unwrap_or(false)
}

fn modified(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}
