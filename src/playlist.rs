//! Eligible-item ordering: whitelist/blacklist flags, shuffle, loop.
//!
//! Owned by the display thread. Other threads influence it only through the
//! library signal and the config snapshot, both consumed by the display loop.
use std::collections::HashMap;
use std::path::PathBuf;

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use tracing::{debug, info};

use crate::flags::{FlagSnapshot, flag_key};
use crate::library::{MediaId, MediaItem};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebuildReason {
    Startup,
    LibraryChanged,
    FlagsChanged,
    ShuffleChanged,
    Purged,
}

pub struct PlaylistScheduler {
    root: PathBuf,
    items: Vec<MediaItem>,
    by_id: HashMap<MediaId, usize>,
    flags: FlagSnapshot,
    shuffle: bool,
    loop_playlist: bool,
    rng: StdRng,
    playlist: Vec<MediaId>,
    index: HashMap<MediaId, usize>,
    current: Option<MediaId>,
}

impl PlaylistScheduler {
    /// `seed` pins the shuffle sequence (diagnostics and tests); `None` draws
    /// from the OS so every run differs.
    pub fn new(root: impl Into<PathBuf>, shuffle: bool, loop_playlist: bool, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            root: root.into(),
            items: Vec::new(),
            by_id: HashMap::new(),
            flags: FlagSnapshot::default(),
            shuffle,
            loop_playlist,
            rng,
            playlist: Vec::new(),
            index: HashMap::new(),
            current: None,
        }
    }

    /// Replace the raw item rows. Takes effect at the next [`Self::rebuild`].
    pub fn set_items(&mut self, mut items: Vec<MediaItem>) {
        items.sort_by_key(|item| item.id);
        self.by_id = items
            .iter()
            .enumerate()
            .map(|(pos, item)| (item.id, pos))
            .collect();
        self.items = items;
    }

    pub fn set_flags(&mut self, flags: FlagSnapshot) {
        self.flags = flags;
    }

    /// Returns true when the setting actually changed.
    pub fn set_shuffle(&mut self, shuffle: bool) -> bool {
        let changed = self.shuffle != shuffle;
        self.shuffle = shuffle;
        changed
    }

    pub fn set_loop(&mut self, loop_playlist: bool) {
        self.loop_playlist = loop_playlist;
    }

    pub fn rebuild(&mut self, reason: RebuildReason) {
        let mut ids = eligible_ids(&self.items, &self.flags, &self.root);
        if self.shuffle {
            ids.shuffle(&mut self.rng);
        }
        self.index = ids.iter().enumerate().map(|(pos, id)| (*id, pos)).collect();
        self.playlist = ids;

        let keep_current = self
            .current
            .is_some_and(|id| self.index.contains_key(&id));
        if !keep_current {
            self.current = self.playlist.first().copied();
        }
        info!(
            ?reason,
            total = self.items.len(),
            eligible = self.playlist.len(),
            shuffle = self.shuffle,
            "playlist rebuilt"
        );
    }

    /// Entry after `after`. Absent ids restart at the first entry; the end wraps
    /// only when looping.
    pub fn next(&self, after: Option<MediaId>) -> Option<MediaId> {
        let first = self.playlist.first().copied();
        let Some(pos) = after.and_then(|id| self.index.get(&id).copied()) else {
            return first;
        };
        match self.playlist.get(pos + 1) {
            Some(id) => Some(*id),
            None if self.loop_playlist => first,
            None => None,
        }
    }

    /// Entry before `of`, wrapping when looping.
    pub fn previous(&self, of: MediaId) -> Option<MediaId> {
        let pos = *self.index.get(&of)?;
        if pos > 0 {
            self.playlist.get(pos - 1).copied()
        } else if self.loop_playlist && self.playlist.len() > 1 {
            self.playlist.last().copied()
        } else {
            None
        }
    }

    /// Move `current` to the next entry and return it.
    pub fn advance(&mut self) -> Option<MediaId> {
        let next = self.next(self.current);
        if next.is_some() {
            self.current = next;
        }
        next
    }

    pub fn current(&self) -> Option<MediaId> {
        self.current
    }

    /// Point `current` at `id` if it is in the playlist.
    pub fn set_current(&mut self, id: MediaId) -> bool {
        if self.index.contains_key(&id) {
            self.current = Some(id);
            true
        } else {
            false
        }
    }

    /// Drop `id` in place, keeping the order of the remaining entries.
    pub fn remove(&mut self, id: MediaId) {
        if let Some(pos) = self.by_id.remove(&id) {
            self.items.remove(pos);
            for p in self.by_id.values_mut() {
                if *p > pos {
                    *p -= 1;
                }
            }
        }
        if let Some(pos) = self.index.remove(&id) {
            self.playlist.remove(pos);
            for p in self.index.values_mut() {
                if *p > pos {
                    *p -= 1;
                }
            }
        }
        if self.current == Some(id) {
            self.current = None;
        }
        debug!(%id, remaining = self.playlist.len(), "removed from playlist");
    }

    pub fn get(&self, id: MediaId) -> Option<&MediaItem> {
        self.by_id.get(&id).and_then(|pos| self.items.get(*pos))
    }

    pub fn position(&self, id: MediaId) -> Option<usize> {
        self.index.get(&id).copied()
    }

    pub fn playlist(&self) -> &[MediaId] {
        &self.playlist
    }

    pub fn is_empty(&self) -> bool {
        self.playlist.is_empty()
    }

    pub fn len(&self) -> usize {
        self.playlist.len()
    }
}

/// Whitelist mode when any item has `include=true`, blacklist mode otherwise.
/// Exclusion always wins, so an item both included and excluded leaves the
/// whitelist empty.
pub fn eligible_ids(items: &[MediaItem], flags: &FlagSnapshot, root: &std::path::Path) -> Vec<MediaId> {
    let records: Vec<_> = items
        .iter()
        .map(|item| (item.id, flags.get(&flag_key(root, &item.path))))
        .collect();
    let whitelist = records.iter().any(|(_, record)| record.is_included());
    records
        .into_iter()
        .filter(|(_, record)| !record.is_excluded() && (!whitelist || record.is_included()))
        .map(|(id, _)| id)
        .collect()
}
