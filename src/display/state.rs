//! The display thread's state machine.
//!
//! [`DisplayLoop::tick`] never sleeps. Each call advances the machine for the
//! given instant and reports when it wants to run again, so the window's frame
//! clock drives crossfades and the event loop's timers drive holds and idle
//! polling.
use std::sync::Arc;
use std::time::{Duration, Instant};

use config_model::{LiveSettings, RenderConfig};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::config::Configuration;
use crate::display::player::{CommandPlayer, VideoPlayer};
use crate::display::screen::Screen;
use crate::error::Error;
use crate::events::LibrarySignal;
use crate::flags::FlagStore;
use crate::library::{DirectoryIndex, MediaId, MediaItem, MediaKind, MediaLibrary};
use crate::playlist::{PlaylistScheduler, RebuildReason};
use crate::processing::decode::Decoder;
use crate::processing::layout::CanvasSize;
use crate::render::cache::Surface;
use crate::render::renderer::MediaRenderer;
use crate::resume::ResumeStore;

#[derive(Debug, Clone)]
pub enum DisplayState {
    /// Nothing eligible; the placeholder is up and the library is rescanned at `retry_at`.
    Idle { retry_at: Instant },
    /// `item` is fully on screen until `until`.
    Showing { item: MediaId, until: Instant },
    /// Fading from `from` to `to`, which belongs to `item`.
    Transitioning {
        item: MediaId,
        from: Arc<Surface>,
        to: Arc<Surface>,
        started: Instant,
        duration: Duration,
    },
    /// `item` is a video; the next tick hands the screen to the external player.
    ExternalPlayback { item: MediaId },
}

impl DisplayState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle { .. } => "idle",
            Self::Showing { .. } => "showing",
            Self::Transitioning { .. } => "transitioning",
            Self::ExternalPlayback { .. } => "external-playback",
        }
    }

    /// Item that owns the screen, if any.
    pub fn item(&self) -> Option<MediaId> {
        match self {
            Self::Idle { .. } => None,
            Self::Showing { item, .. }
            | Self::Transitioning { item, .. }
            | Self::ExternalPlayback { item } => Some(*item),
        }
    }
}

/// When the owner of the loop should call [`DisplayLoop::tick`] again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wake {
    At(Instant),
    /// A transition is running; tick again on the next vsync.
    NextFrame,
    Exit,
}

/// Everything the display loop owns besides the screen.
pub struct DisplayParts {
    pub library: Box<dyn MediaLibrary>,
    pub player: Box<dyn VideoPlayer>,
    pub renderer: MediaRenderer,
    pub flags: FlagStore,
    pub resume: ResumeStore,
    pub scheduler: PlaylistScheduler,
    pub settings: watch::Receiver<Arc<LiveSettings>>,
    pub library_signal: LibrarySignal,
    pub cancel: CancellationToken,
    pub idle_poll_interval: Duration,
    pub placeholder_message: String,
}

impl DisplayParts {
    /// Production wiring: directory index, external players, and the stores
    /// named in `cfg`.
    pub fn from_config(
        cfg: &Configuration,
        settings: watch::Receiver<Arc<LiveSettings>>,
        library_signal: LibrarySignal,
        cancel: CancellationToken,
        playlist_seed: Option<u64>,
    ) -> Self {
        let library = DirectoryIndex::new(cfg.library_path.clone(), cfg.indexer.clone());
        let scheduler = PlaylistScheduler::new(
            library.root().to_path_buf(),
            cfg.playback.shuffle,
            cfg.playback.loop_playlist,
            playlist_seed,
        );
        Self {
            library: Box::new(library),
            player: Box::new(CommandPlayer::from_options(&cfg.video_player)),
            renderer: MediaRenderer::new(
                Decoder::new(),
                cfg.surface_cache_capacity,
                cfg.decode_workers,
            ),
            flags: FlagStore::new(cfg.flags_path.clone()),
            resume: ResumeStore::new(cfg.resume_path.clone()),
            scheduler,
            settings,
            library_signal,
            cancel,
            idle_poll_interval: cfg.idle_poll_interval,
            placeholder_message: cfg.placeholder_message(),
        }
    }
}

pub struct DisplayLoop<S> {
    screen: S,
    library: Box<dyn MediaLibrary>,
    player: Box<dyn VideoPlayer>,
    renderer: MediaRenderer,
    flags: FlagStore,
    resume: ResumeStore,
    scheduler: PlaylistScheduler,
    settings_rx: watch::Receiver<Arc<LiveSettings>>,
    settings: Arc<LiveSettings>,
    library_signal: LibrarySignal,
    cancel: CancellationToken,
    idle_poll_interval: Duration,
    placeholder_message: String,
    state: DisplayState,
    started: bool,
    on_screen: Option<Arc<Surface>>,
    last_shown: Option<MediaId>,
    /// Set when the item on screen vanished mid-hold: the hold ends on the next
    /// tick and playback continues with the recorded successor.
    vanished_successor: Option<Option<MediaId>>,
}

impl<S: Screen> DisplayLoop<S> {
    pub fn new(screen: S, parts: DisplayParts) -> Self {
        let DisplayParts {
            library,
            player,
            renderer,
            flags,
            resume,
            scheduler,
            mut settings,
            library_signal,
            cancel,
            idle_poll_interval,
            placeholder_message,
        } = parts;
        let current = Arc::clone(&settings.borrow_and_update());
        Self {
            screen,
            library,
            player,
            renderer,
            flags,
            resume,
            scheduler,
            settings_rx: settings,
            settings: current,
            library_signal,
            cancel,
            idle_poll_interval,
            placeholder_message,
            state: DisplayState::Idle {
                retry_at: Instant::now(),
            },
            started: false,
            on_screen: None,
            last_shown: None,
            vanished_successor: None,
        }
    }

    pub fn state(&self) -> &DisplayState {
        &self.state
    }

    pub fn screen(&self) -> &S {
        &self.screen
    }

    pub fn screen_mut(&mut self) -> &mut S {
        &mut self.screen
    }

    pub fn scheduler(&self) -> &PlaylistScheduler {
        &self.scheduler
    }

    pub fn settings(&self) -> &LiveSettings {
        &self.settings
    }

    /// Advance the machine to `now`.
    pub fn tick(&mut self, now: Instant) -> Wake {
        if self.cancel.is_cancelled() {
            return Wake::Exit;
        }
        let before = self.state.name();
        let (state, wake) = if self.started {
            self.poll_inputs();
            let state = std::mem::replace(&mut self.state, DisplayState::Idle { retry_at: now });
            self.step(state, now)
        } else {
            self.start(now)
        };
        if state.name() != before {
            debug!(from = before, to = state.name(), "display state changed");
        }
        self.state = state;
        wake
    }

    #[instrument(skip_all, name = "display_start")]
    fn start(&mut self, now: Instant) -> (DisplayState, Wake) {
        self.started = true;
        if let Err(err) = self.flags.refresh() {
            warn!("failed to read flags: {err:#}");
        }
        self.scheduler.set_flags(self.flags.snapshot().clone());
        self.scheduler.set_shuffle(self.settings.playback.shuffle);
        self.scheduler.set_loop(self.settings.playback.loop_playlist);
        self.library_signal.take();
        self.rescan_library();
        self.scheduler.rebuild(RebuildReason::Startup);

        if self.settings.playback.resume_on_start {
            match self.resume.load() {
                Ok(Some(id)) if self.scheduler.set_current(id) => info!(%id, "resuming"),
                Ok(Some(id)) => debug!(%id, "resume target no longer eligible"),
                Ok(None) => {}
                Err(err) => warn!("failed to read resume state: {err:#}"),
            }
        }

        if self.scheduler.is_empty() {
            self.enter_idle(now)
        } else {
            let first = self.scheduler.current();
            self.present(first, now)
        }
    }

    fn step(&mut self, state: DisplayState, now: Instant) -> (DisplayState, Wake) {
        match state {
            DisplayState::Idle { retry_at } => {
                if self.scheduler.is_empty() {
                    if now < retry_at {
                        return (DisplayState::Idle { retry_at }, Wake::At(retry_at));
                    }
                    self.rescan_library();
                    self.scheduler.rebuild(RebuildReason::LibraryChanged);
                    if self.scheduler.is_empty() {
                        return self.enter_idle(now);
                    }
                }
                let first = self
                    .scheduler
                    .current()
                    .or_else(|| self.scheduler.next(None));
                self.present(first, now)
            }
            DisplayState::Showing { item, until } => {
                let vanished = self.vanished_successor.take();
                if vanished.is_none() && now < until {
                    return (DisplayState::Showing { item, until }, Wake::At(until));
                }
                if self.scheduler.is_empty() {
                    return self.enter_idle(now);
                }
                let next = match vanished {
                    Some(successor) => successor
                        .filter(|id| self.scheduler.position(*id).is_some())
                        .or_else(|| self.scheduler.next(Some(item))),
                    None => self.scheduler.next(Some(item)),
                };
                match next {
                    Some(next) => self.present(Some(next), now),
                    None => self.hold_at_end(item, now),
                }
            }
            DisplayState::Transitioning {
                item,
                from,
                to,
                started,
                duration,
            } => {
                let elapsed = now.saturating_duration_since(started);
                if elapsed >= duration {
                    return self.settle(item, to, now);
                }
                self.screen
                    .blend(&from, &to, crossfade_alpha(elapsed, duration));
                (
                    DisplayState::Transitioning {
                        item,
                        from,
                        to,
                        started,
                        duration,
                    },
                    Wake::NextFrame,
                )
            }
            DisplayState::ExternalPlayback { item } => self.play_video(item, now),
        }
    }

    /// Pick up config pushes, library changes and flag edits. Library and flag
    /// checks wait until no transition is running.
    fn poll_inputs(&mut self) {
        let mut rebuild = None;

        if self.settings_rx.has_changed().unwrap_or(false) {
            let next = Arc::clone(&self.settings_rx.borrow_and_update());
            if self.scheduler.set_shuffle(next.playback.shuffle) {
                rebuild = Some(RebuildReason::ShuffleChanged);
            }
            self.scheduler.set_loop(next.playback.loop_playlist);
            info!(
                mode = ?next.render.mode,
                padding = %next.render.padding.style,
                slide_duration_s = next.playback.slide_duration_s,
                crossfade_ms = next.playback.crossfade_ms,
                "live settings updated"
            );
            self.settings = next;
        }

        if !matches!(self.state, DisplayState::Transitioning { .. }) {
            match self.flags.refresh() {
                Ok(true) => {
                    self.scheduler.set_flags(self.flags.snapshot().clone());
                    rebuild = Some(RebuildReason::FlagsChanged);
                }
                Ok(false) => {}
                Err(err) => warn!("failed to read flags: {err:#}"),
            }
            if self.library_signal.take() {
                let shown = self.state.item();
                let successor = shown.and_then(|id| self.scheduler.next(Some(id)));
                self.rescan_library();
                self.scheduler.rebuild(RebuildReason::LibraryChanged);
                rebuild = None;
                if let Some(id) = shown.filter(|id| self.scheduler.get(*id).is_none()) {
                    info!(%id, "displayed item disappeared; skipping ahead");
                    self.library.purge(id);
                    self.vanished_successor = Some(successor.filter(|next| *next != id));
                }
            }
        }

        if let Some(reason) = rebuild {
            self.scheduler.rebuild(reason);
        }
    }

    fn rescan_library(&mut self) {
        if let Err(err) = self.library.rescan() {
            warn!("library rescan failed: {err:#}");
        }
        self.scheduler.set_items(self.library.items());
    }

    fn enter_idle(&mut self, now: Instant) -> (DisplayState, Wake) {
        self.screen.show_placeholder(&self.placeholder_message);
        self.on_screen = None;
        let retry_at = deadline(now, self.idle_poll_interval);
        (DisplayState::Idle { retry_at }, Wake::At(retry_at))
    }

    /// Non-looping playlist ran out: keep the last item up and check again later.
    fn hold_at_end(&mut self, item: MediaId, now: Instant) -> (DisplayState, Wake) {
        debug!(%item, "end of playlist");
        let until = deadline(now, self.idle_poll_interval);
        (DisplayState::Showing { item, until }, Wake::At(until))
    }

    /// Show `candidate`, skipping and purging anything that cannot be displayed.
    fn present(&mut self, mut candidate: Option<MediaId>, now: Instant) -> (DisplayState, Wake) {
        let mut attempts = self.scheduler.len() + 1;
        while let Some(id) = candidate {
            if attempts == 0 {
                break;
            }
            attempts -= 1;
            let Some(item) = self.scheduler.get(id).cloned() else {
                candidate = self.purge(id);
                continue;
            };
            self.scheduler.set_current(id);
            let outcome = match item.kind {
                MediaKind::Image => self.present_image(&item, now),
                MediaKind::Video => Ok((
                    DisplayState::ExternalPlayback { item: id },
                    Wake::At(now),
                )),
            };
            match outcome {
                Ok(step) => return step,
                Err(err) => {
                    warn!(%id, path = %item.path.display(), "skipping: {err}");
                    candidate = self.purge(id);
                }
            }
        }

        if self.scheduler.is_empty() {
            return self.enter_idle(now);
        }
        match self.last_shown {
            Some(item) => self.hold_at_end(item, now),
            None => self.enter_idle(now),
        }
    }

    fn present_image(
        &mut self,
        item: &MediaItem,
        now: Instant,
    ) -> Result<(DisplayState, Wake), Error> {
        let canvas = self.screen.canvas_size();
        let render = self.settings.render;
        let frame = self.renderer.render(&item.path, canvas, &render)?;
        self.prefetch_around(item.id, canvas, &render);

        let duration = self.settings.playback.crossfade();
        match self.on_screen.clone() {
            Some(from) if !duration.is_zero() && !Arc::ptr_eq(&from, &frame) => {
                self.screen.blend(&from, &frame, 0);
                Ok((
                    DisplayState::Transitioning {
                        item: item.id,
                        from,
                        to: frame,
                        started: now,
                        duration,
                    },
                    Wake::NextFrame,
                ))
            }
            _ => Ok(self.settle(item.id, frame, now)),
        }
    }

    /// Frame fully on screen: persist it and start the hold.
    fn settle(&mut self, item: MediaId, frame: Arc<Surface>, now: Instant) -> (DisplayState, Wake) {
        self.screen.show(&frame);
        self.on_screen = Some(frame);
        self.mark_displayed(item);
        let until = deadline(now, self.settings.playback.slide_duration());
        (DisplayState::Showing { item, until }, Wake::At(until))
    }

    fn play_video(&mut self, id: MediaId, now: Instant) -> (DisplayState, Wake) {
        let Some(item) = self.scheduler.get(id).cloned() else {
            let next = self.scheduler.next(Some(id));
            return self.present(next, now);
        };
        self.screen.release();
        let result = self.player.play(&item.path);
        self.screen.restore();
        if let Some(frame) = &self.on_screen {
            self.screen.show(frame);
        }
        match result {
            Ok(()) => {
                self.mark_displayed(id);
                // Playback took an unknown amount of wall time; advance on the
                // next tick instead of trusting `now`.
                (DisplayState::Showing { item: id, until: now }, Wake::At(now))
            }
            Err(err) => {
                warn!(%id, path = %item.path.display(), "skipping: {err}");
                let next = self.purge(id);
                self.present(next, now)
            }
        }
    }

    fn mark_displayed(&mut self, id: MediaId) {
        self.last_shown = Some(id);
        if let Err(err) = self.resume.save(id) {
            warn!(%id, "failed to persist resume state: {err:#}");
        }
    }

    /// Drop `id` from the library and playlist; returns the entry that followed it.
    fn purge(&mut self, id: MediaId) -> Option<MediaId> {
        let next = self.scheduler.next(Some(id)).filter(|next| *next != id);
        self.library.purge(id);
        self.scheduler.remove(id);
        next
    }

    fn prefetch_around(&self, id: MediaId, canvas: CanvasSize, render: &RenderConfig) {
        let image_path = |id: Option<MediaId>| {
            id.and_then(|id| self.scheduler.get(id))
                .filter(|item| item.kind == MediaKind::Image)
                .map(|item| item.path.clone())
        };
        let Some(current) = image_path(Some(id)) else {
            return;
        };
        let mut window = Vec::with_capacity(3);
        let mut index = 0;
        if let Some(prev) = image_path(self.scheduler.previous(id)) {
            window.push(prev);
            index = 1;
        }
        window.push(current);
        if let Some(next) = image_path(self.scheduler.next(Some(id))) {
            window.push(next);
        }
        self.renderer.prefetch(&window, index, canvas, render);
    }
}

/// Furthest wake-up used when `now + after` does not fit in an [`Instant`].
const FAR_FUTURE: Duration = Duration::from_secs(60 * 60 * 24 * 365 * 30);

/// `now + after`, saturating to a far-future instant instead of overflowing.
pub fn deadline(now: Instant, after: Duration) -> Instant {
    now.checked_add(after)
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}

/// Linear 0..=255 ramp over `duration`.
pub fn crossfade_alpha(elapsed: Duration, duration: Duration) -> u8 {
    let total = duration.as_micros();
    if total == 0 {
        return 255;
    }
    (255 * elapsed.as_micros() / total).min(255) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deadline_saturates_on_overflow() {
        let now = Instant::now();
        assert_eq!(deadline(now, Duration::from_secs(3)), now + Duration::from_secs(3));
        assert_eq!(deadline(now, Duration::MAX), now + FAR_FUTURE);
    }

    #[test]
    fn alpha_ramps_linearly_and_saturates() {
        let d = Duration::from_millis(350);
        assert_eq!(crossfade_alpha(Duration::ZERO, d), 0);
        assert_eq!(crossfade_alpha(Duration::from_millis(175), d), 127);
        assert_eq!(crossfade_alpha(Duration::from_millis(350), d), 255);
        assert_eq!(crossfade_alpha(Duration::from_secs(5), d), 255);
        assert_eq!(crossfade_alpha(Duration::from_millis(1), Duration::ZERO), 255);
    }

    #[test]
    fn state_reports_owning_item() {
        let now = Instant::now();
        assert_eq!(DisplayState::Idle { retry_at: now }.item(), None);
        let showing = DisplayState::Showing {
            item: MediaId(4),
            until: now,
        };
        assert_eq!(showing.item(), Some(MediaId(4)));
        assert_eq!(showing.name(), "showing");
        assert_eq!(
            DisplayState::ExternalPlayback { item: MediaId(2) }.name(),
            "external-playback"
        );
    }
}
