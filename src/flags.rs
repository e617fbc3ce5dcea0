use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;

use anyhow::{Context, Result};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

const SAFE_PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'_').remove(b'.');

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude_from_slideshow: Option<bool>,
}

impl FlagRecord {
    pub fn is_included(&self) -> bool {
        self.include == Some(true)
    }

    pub fn is_excluded(&self) -> bool {
        self.exclude_from_slideshow == Some(true)
    }
}

/// Key of an item in the flags file: its path relative to the library root, each
/// segment percent-escaped and joined with `/`.
pub fn flag_key(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .map(|part| utf8_percent_encode(&part, SAFE_PATH_SEGMENT).to_string())
        .collect::<Vec<_>>()
        .join("/")
}

/// Immutable view of the flags file at one point in time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlagSnapshot(HashMap<String, FlagRecord>);

impl FlagSnapshot {
    /// Missing records read as "no flags".
    pub fn get(&self, key: &str) -> FlagRecord {
        self.0.get(key).copied().unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, FlagRecord)> for FlagSnapshot {
    fn from_iter<I: IntoIterator<Item = (String, FlagRecord)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Cached reader for the externally written flags file.
#[derive(Debug)]
pub struct FlagStore {
    path: PathBuf,
    loaded: bool,
    mtime: Option<SystemTime>,
    snapshot: FlagSnapshot,
}

impl FlagStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            loaded: false,
            mtime: None,
            snapshot: FlagSnapshot::default(),
        }
    }

    pub fn snapshot(&self) -> &FlagSnapshot {
        &self.snapshot
    }

    /// Reload when the file's modification time moved. Returns whether the
    /// snapshot contents changed.
    pub fn refresh(&mut self) -> Result<bool> {
        let mtime = match fs::metadata(&self.path) {
            Ok(meta) => Some(meta.modified().with_context(|| {
                format!("failed to read mtime of {}", self.path.display())
            })?),
            Err(err) if err.kind() == ErrorKind::NotFound => None,
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to stat {}", self.path.display()));
            }
        };
        if self.loaded && mtime == self.mtime {
            return Ok(false);
        }
        self.loaded = true;
        self.mtime = mtime;

        let next = match mtime {
            None => FlagSnapshot::default(),
            Some(_) => match read_flags(&self.path) {
                Ok(snapshot) => snapshot,
                Err(err) => {
                    warn!(path = %self.path.display(), "keeping previous flags: {err:#}");
                    return Ok(false);
                }
            },
        };
        if next == self.snapshot {
            debug!(path = %self.path.display(), "flags file touched without changes");
            return Ok(false);
        }
        info!(records = next.0.len(), "flags reloaded");
        self.snapshot = next;
        Ok(true)
    }
}

fn read_flags(path: &Path) -> Result<FlagSnapshot> {
    let data = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    if data.iter().all(u8::is_ascii_whitespace) {
        return Ok(FlagSnapshot::default());
    }
    let map: HashMap<String, FlagRecord> = serde_json::from_slice(&data)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    Ok(FlagSnapshot(map))
}
