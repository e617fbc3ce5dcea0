//! Decoder → composer → surface cache, plus neighbor prefetch on the decode pool.
use std::collections::HashSet;
use std::any::Any;
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;

use anyhow::anyhow;
use config_model::RenderConfig;
use tracing::{debug, trace, warn};

use crate::error::Error;
use crate::processing::compose::compose;
use crate::processing::decode::Decoder;
use crate::processing::layout::CanvasSize;
use crate::render::cache::{CacheKey, Surface, SurfaceCache};
use crate::render::pool::DecodePool;

/// Jobs waiting behind busy workers; anything beyond is dropped.
const PREFETCH_QUEUE_DEPTH: usize = 4;

pub struct MediaRenderer {
    shared: Arc<Shared>,
    pool: DecodePool,
}

struct Shared {
    decoder: Decoder,
    state: Mutex<CacheState>,
    ready: Condvar,
    builds: AtomicUsize,
}

struct CacheState {
    cache: SurfaceCache,
    /// Keys currently being built by some thread.
    pending: HashSet<CacheKey>,
}

impl MediaRenderer {
    pub fn new(decoder: Decoder, cache_capacity: usize, workers: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                decoder,
                state: Mutex::new(CacheState {
                    cache: SurfaceCache::new(cache_capacity),
                    pending: HashSet::new(),
                }),
                ready: Condvar::new(),
                builds: AtomicUsize::new(0),
            }),
            pool: DecodePool::new(workers, PREFETCH_QUEUE_DEPTH),
        }
    }

    /// Displayable frame for `path`. Fails with [`Error::MediaUnavailable`] when the
    /// file is gone or undecodable.
    pub fn render(
        &self,
        path: &Path,
        canvas: CanvasSize,
        render: &RenderConfig,
    ) -> Result<Arc<Surface>, Error> {
        let key = cache_key(path, canvas, render)?;
        self.shared.get_or_build(key)
    }

    /// Warm the entries immediately before and after `current`. Best effort:
    /// errors are logged at debug and dropped.
    pub fn prefetch(
        &self,
        items: &[PathBuf],
        current: usize,
        canvas: CanvasSize,
        render: &RenderConfig,
    ) {
        let neighbors = [current.checked_add(1), current.checked_sub(1)];
        for index in neighbors.into_iter().flatten() {
            let Some(path) = items.get(index) else {
                continue;
            };
            if items.get(current) == Some(path) {
                continue;
            }
            let shared = Arc::clone(&self.shared);
            let path = path.clone();
            let render = *render;
            let queued = self.pool.submit(move || {
                let result =
                    cache_key(&path, canvas, &render).and_then(|key| shared.get_or_build(key));
                match result {
                    Ok(_) => trace!(path = %path.display(), "prefetched"),
                    Err(err) => debug!(path = %path.display(), "prefetch failed: {err}"),
                }
            });
            if !queued {
                debug!(index, "prefetch skipped; decode pool busy");
            }
        }
    }

    /// Whether a frame for these inputs is already cached. Leaves recency untouched.
    pub fn is_cached(&self, path: &Path, canvas: CanvasSize, render: &RenderConfig) -> bool {
        match cache_key(path, canvas, render) {
            Ok(key) => self.shared.lock().cache.contains(&key),
            Err(_) => false,
        }
    }

    /// Number of decode+compose runs so far.
    pub fn build_count(&self) -> usize {
        self.shared.builds.load(Ordering::Relaxed)
    }
}

fn cache_key(path: &Path, canvas: CanvasSize, render: &RenderConfig) -> Result<CacheKey, Error> {
    let meta = fs::metadata(path).map_err(|err| Error::media_unavailable(path, err))?;
    let mtime: Option<SystemTime> = meta.modified().ok();
    Ok(CacheKey::new(path, canvas, mtime, render))
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn get_or_build(&self, key: CacheKey) -> Result<Arc<Surface>, Error> {
        self.get_or_build_with(key, |key| self.build(key))
    }

    /// Single-flight build: concurrent callers for `key` wait for the first one.
    /// A panicking `build` surfaces as [`Error::MediaUnavailable`].
    fn get_or_build_with(
        &self,
        key: CacheKey,
        build: impl FnOnce(&CacheKey) -> Result<Arc<Surface>, Error>,
    ) -> Result<Arc<Surface>, Error> {
        let mut state = self.lock();
        loop {
            if let Some(hit) = state.cache.get(&key) {
                return Ok(hit);
            }
            if !state.pending.contains(&key) {
                break;
            }
            state = self
                .ready
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        state.pending.insert(key.clone());
        drop(state);
        let pending = PendingGuard {
            shared: self,
            key: &key,
        };

        let built = panic::catch_unwind(AssertUnwindSafe(|| build(&key))).unwrap_or_else(|payload| {
            let reason = panic_message(payload.as_ref());
            warn!(path = %key.path.display(), "render panicked: {reason}");
            Err(Error::media_unavailable(
                &key.path,
                anyhow!("render panicked: {reason}"),
            ))
        });
        let result =
            built.map(|surface| self.lock().cache.get_or_compute(key.clone(), || surface));
        drop(pending);
        result
    }

    fn build(&self, key: &CacheKey) -> Result<Arc<Surface>, Error> {
        self.builds.fetch_add(1, Ordering::Relaxed);
        let decoded = self.decoder.decode(&key.path, key.canvas)?;
        let render = render_config_of(key);
        let frame = compose(&decoded.pixels, decoded.orientation, key.canvas, &render);
        Ok(Arc::new(Surface::from_rgb(&frame)))
    }
}

/// Clears a pending key and wakes waiters on every exit path.
struct PendingGuard<'a> {
    shared: &'a Shared,
    key: &'a CacheKey,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.shared.lock();
        state.pending.remove(self.key);
        drop(state);
        self.shared.ready.notify_all();
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

fn render_config_of(key: &CacheKey) -> RenderConfig {
    let mut render = RenderConfig::default();
    render.mode = key.mode;
    render.padding.style = key.style;
    render.padding.color = key.color;
    render.padding.blur_amount = f32::from_bits(key.blur_amount_bits);
    render
}
