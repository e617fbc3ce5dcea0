use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime};

use anyhow::anyhow;
use config_model::{LiveSettings, PaddingStyle, RenderMode};
use image::{Rgb, RgbImage};
use leanframe::config::IndexerOptions;
use leanframe::display::player::VideoPlayer;
use leanframe::display::screen::Screen;
use leanframe::display::state::{DisplayLoop, DisplayParts, DisplayState, Wake};
use leanframe::error::Error;
use leanframe::events::LibrarySignal;
use leanframe::flags::FlagStore;
use leanframe::library::{DirectoryIndex, MediaId};
use leanframe::playlist::PlaylistScheduler;
use leanframe::processing::decode::Decoder;
use leanframe::processing::layout::CanvasSize;
use leanframe::render::cache::Surface;
use leanframe::render::renderer::MediaRenderer;
use leanframe::resume::ResumeStore;
use tempfile::{TempDir, tempdir};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

const RED: [u8; 3] = [220, 30, 30];
const GREEN: [u8; 3] = [30, 220, 30];
const BLUE: [u8; 3] = [30, 30, 220];
const IDLE_POLL: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tone {
    Red,
    Green,
    Blue,
}

fn tone(surface: &Surface) -> Tone {
    let [r, g, b, _] = surface.pixel(surface.width / 2, surface.height / 2);
    if r > g && r > b {
        Tone::Red
    } else if g > b {
        Tone::Green
    } else {
        Tone::Blue
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Drawn {
    Frame(Tone),
    Blend { from: Tone, to: Tone, alpha: u8 },
    Placeholder(String),
    Release,
    Restore,
}

#[derive(Default)]
struct FakeScreen {
    drawn: Vec<Drawn>,
}

impl FakeScreen {
    fn frames(&self) -> Vec<Tone> {
        self.drawn
            .iter()
            .filter_map(|d| match d {
                Drawn::Frame(t) => Some(*t),
                _ => None,
            })
            .collect()
    }

    fn last(&self) -> Option<&Drawn> {
        self.drawn.last()
    }
}

impl Screen for FakeScreen {
    fn canvas_size(&self) -> CanvasSize {
        CanvasSize::new(32, 24)
    }

    fn show(&mut self, frame: &Arc<Surface>) {
        self.drawn.push(Drawn::Frame(tone(frame)));
    }

    fn blend(&mut self, from: &Arc<Surface>, to: &Arc<Surface>, alpha: u8) {
        self.drawn.push(Drawn::Blend {
            from: tone(from),
            to: tone(to),
            alpha,
        });
    }

    fn show_placeholder(&mut self, message: &str) {
        self.drawn.push(Drawn::Placeholder(message.to_string()));
    }

    fn release(&mut self) {
        self.drawn.push(Drawn::Release);
    }

    fn restore(&mut self) {
        self.drawn.push(Drawn::Restore);
    }
}

#[derive(Clone, Default)]
struct FakePlayer {
    plays: Arc<Mutex<Vec<PathBuf>>>,
    fail: bool,
}

impl VideoPlayer for FakePlayer {
    fn play(&mut self, path: &Path) -> Result<(), Error> {
        self.plays.lock().unwrap().push(path.to_path_buf());
        if self.fail {
            Err(Error::media_unavailable(path, anyhow!("no player could open it")))
        } else {
            Ok(())
        }
    }
}

struct Harness {
    dir: TempDir,
    settings: watch::Sender<Arc<LiveSettings>>,
    settings_rx: watch::Receiver<Arc<LiveSettings>>,
    signal: LibrarySignal,
    cancel: CancellationToken,
    player: FakePlayer,
}

impl Harness {
    fn new(configure: impl FnOnce(&mut LiveSettings)) -> Self {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("library")).unwrap();
        let mut live = LiveSettings::default();
        live.render.mode = RenderMode::Cover;
        live.render.padding.style = PaddingStyle::Solid;
        live.playback.slide_duration_s = 1.0;
        live.playback.shuffle = false;
        live.playback.loop_playlist = true;
        live.playback.crossfade_ms = 0;
        configure(&mut live);
        let (settings, settings_rx) = watch::channel(Arc::new(live));
        Self {
            dir,
            settings,
            settings_rx,
            signal: LibrarySignal::new(),
            cancel: CancellationToken::new(),
            player: FakePlayer::default(),
        }
    }

    fn library(&self) -> PathBuf {
        self.dir.path().join("library")
    }

    fn resume_path(&self) -> PathBuf {
        self.dir.path().join("state/resume.json")
    }

    fn flags_path(&self) -> PathBuf {
        self.dir.path().join("flags.json")
    }

    fn image(&self, name: &str, rgb: [u8; 3]) -> PathBuf {
        let path = self.library().join(name);
        RgbImage::from_pixel(64, 48, Rgb(rgb)).save(&path).unwrap();
        path
    }

    fn video(&self, name: &str) -> PathBuf {
        let path = self.library().join(name);
        fs::write(&path, b"not really a video").unwrap();
        path
    }

    fn display(&self) -> DisplayLoop<FakeScreen> {
        let library = self.library();
        let parts = DisplayParts {
            library: Box::new(DirectoryIndex::new(library.clone(), IndexerOptions::default())),
            player: Box::new(self.player.clone()),
            renderer: MediaRenderer::new(Decoder::new(), 6, 1),
            flags: FlagStore::new(self.flags_path()),
            resume: ResumeStore::new(self.resume_path()),
            scheduler: PlaylistScheduler::new(library.clone(), false, true, Some(7)),
            settings: self.settings_rx.clone(),
            library_signal: self.signal.clone(),
            cancel: self.cancel.clone(),
            idle_poll_interval: IDLE_POLL,
            placeholder_message: format!("No media found in {}", library.display()),
        };
        DisplayLoop::new(FakeScreen::default(), parts)
    }

    fn resumed(&self) -> Option<MediaId> {
        ResumeStore::new(self.resume_path()).load().unwrap()
    }
}

fn shown_item(display: &DisplayLoop<FakeScreen>) -> Option<MediaId> {
    match display.state() {
        DisplayState::Showing { item, .. } => Some(*item),
        _ => None,
    }
}

#[test]
fn empty_library_idles_on_placeholder_until_media_arrives() {
    let h = Harness::new(|_| {});
    let mut display = h.display();
    let t0 = Instant::now();

    assert_eq!(display.tick(t0), Wake::At(t0 + IDLE_POLL));
    assert!(matches!(display.state(), DisplayState::Idle { .. }));
    let expected = format!("No media found in {}", h.library().display());
    assert_eq!(
        display.screen().drawn,
        vec![Drawn::Placeholder(expected.clone())]
    );

    // Nothing new before the poll interval elapses.
    h.image("a.png", RED);
    assert_eq!(
        display.tick(t0 + Duration::from_secs(1)),
        Wake::At(t0 + IDLE_POLL)
    );
    assert_eq!(display.screen().drawn.len(), 1);

    let t1 = t0 + IDLE_POLL;
    assert_eq!(display.tick(t1), Wake::At(t1 + Duration::from_secs(1)));
    assert_eq!(shown_item(&display), Some(MediaId(1)));
    assert_eq!(display.screen().last(), Some(&Drawn::Frame(Tone::Red)));
}

#[test]
fn crossfade_ramps_then_settles_and_persists_resume() {
    let h = Harness::new(|live| live.playback.crossfade_ms = 350);
    h.image("a.png", RED);
    h.image("b.png", BLUE);
    let mut display = h.display();
    let t0 = Instant::now();

    assert_eq!(display.tick(t0), Wake::At(t0 + Duration::from_secs(1)));
    assert_eq!(display.screen().frames(), vec![Tone::Red]);
    assert_eq!(h.resumed(), Some(MediaId(1)));

    let t1 = t0 + Duration::from_secs(1);
    assert_eq!(display.tick(t1), Wake::NextFrame);
    assert!(matches!(display.state(), DisplayState::Transitioning { .. }));
    assert_eq!(
        display.screen().last(),
        Some(&Drawn::Blend {
            from: Tone::Red,
            to: Tone::Blue,
            alpha: 0
        })
    );

    assert_eq!(display.tick(t1 + Duration::from_millis(175)), Wake::NextFrame);
    assert_eq!(
        display.screen().last(),
        Some(&Drawn::Blend {
            from: Tone::Red,
            to: Tone::Blue,
            alpha: 127
        })
    );
    // Resume only moves once the new frame is fully on screen.
    assert_eq!(h.resumed(), Some(MediaId(1)));

    let t2 = t1 + Duration::from_millis(350);
    assert_eq!(display.tick(t2), Wake::At(t2 + Duration::from_secs(1)));
    assert_eq!(display.screen().last(), Some(&Drawn::Frame(Tone::Blue)));
    assert_eq!(shown_item(&display), Some(MediaId(2)));
    assert_eq!(h.resumed(), Some(MediaId(2)));
}

#[test]
fn zero_crossfade_switches_in_one_tick() {
    let h = Harness::new(|_| {});
    h.image("a.png", RED);
    h.image("b.png", BLUE);
    let mut display = h.display();
    let t0 = Instant::now();

    display.tick(t0);
    let t1 = t0 + Duration::from_secs(1);
    assert_eq!(display.tick(t1), Wake::At(t1 + Duration::from_secs(1)));
    assert_eq!(display.screen().frames(), vec![Tone::Red, Tone::Blue]);
    assert!(
        !display
            .screen()
            .drawn
            .iter()
            .any(|d| matches!(d, Drawn::Blend { .. }))
    );

    // Loops back to the first item.
    display.tick(t1 + Duration::from_secs(1));
    assert_eq!(shown_item(&display), Some(MediaId(1)));
}

#[test]
fn resume_starts_at_saved_item() {
    let h = Harness::new(|_| {});
    h.image("a.png", RED);
    h.image("b.png", BLUE);
    h.image("c.png", GREEN);
    // Ids follow first-seen file name order.
    ResumeStore::new(h.resume_path()).save(MediaId(2)).unwrap();

    let mut display = h.display();
    display.tick(Instant::now());
    assert_eq!(shown_item(&display), Some(MediaId(2)));
    assert_eq!(display.screen().frames(), vec![Tone::Blue]);
}

#[test]
fn resume_is_ignored_when_disabled_or_ineligible() {
    let h = Harness::new(|live| live.playback.resume_on_start = false);
    h.image("a.png", RED);
    h.image("b.png", BLUE);
    ResumeStore::new(h.resume_path()).save(MediaId(2)).unwrap();
    let mut display = h.display();
    display.tick(Instant::now());
    assert_eq!(shown_item(&display), Some(MediaId(1)));

    let h = Harness::new(|_| {});
    h.image("a.png", RED);
    ResumeStore::new(h.resume_path()).save(MediaId(42)).unwrap();
    let mut display = h.display();
    display.tick(Instant::now());
    assert_eq!(shown_item(&display), Some(MediaId(1)));
}

#[test]
fn unreadable_item_is_purged_and_skipped() {
    let h = Harness::new(|_| {});
    h.image("a.png", RED);
    let b = h.image("b.png", BLUE);
    h.image("c.png", GREEN);
    let mut display = h.display();
    let t0 = Instant::now();
    display.tick(t0);

    fs::remove_file(&b).unwrap();
    let t1 = t0 + Duration::from_secs(1);
    assert_eq!(display.tick(t1), Wake::At(t1 + Duration::from_secs(1)));
    assert_eq!(shown_item(&display), Some(MediaId(3)));
    assert_eq!(display.screen().frames(), vec![Tone::Red, Tone::Green]);
    assert_eq!(display.scheduler().playlist(), &[MediaId(1), MediaId(3)]);
}

#[test]
fn corrupt_file_is_purged_and_not_rescanned_until_it_changes() {
    let h = Harness::new(|_| {});
    h.image("a.png", RED);
    let bad = h.library().join("b.png");
    fs::write(&bad, b"definitely not a png").unwrap();
    let mut display = h.display();
    let t0 = Instant::now();
    display.tick(t0);

    let t1 = t0 + Duration::from_secs(1);
    display.tick(t1);
    assert_eq!(shown_item(&display), Some(MediaId(1)));
    assert_eq!(display.scheduler().playlist(), &[MediaId(1)]);

    h.signal.raise();
    display.tick(t1 + Duration::from_millis(10));
    assert_eq!(display.scheduler().playlist(), &[MediaId(1)]);
}

#[test]
fn item_deleted_mid_hold_skips_ahead_on_library_signal() {
    let h = Harness::new(|_| {});
    let a = h.image("a.png", RED);
    h.image("b.png", BLUE);
    h.image("c.png", GREEN);
    let mut display = h.display();
    let t0 = Instant::now();
    display.tick(t0);
    assert_eq!(shown_item(&display), Some(MediaId(1)));

    fs::remove_file(&a).unwrap();
    h.signal.raise();
    let t1 = t0 + Duration::from_millis(100);
    assert_eq!(display.tick(t1), Wake::At(t1 + Duration::from_secs(1)));
    assert_eq!(shown_item(&display), Some(MediaId(2)));
    assert_eq!(display.scheduler().playlist(), &[MediaId(2), MediaId(3)]);
}

#[test]
fn new_media_joins_playlist_without_interrupting_hold() {
    let h = Harness::new(|_| {});
    h.image("a.png", RED);
    let mut display = h.display();
    let t0 = Instant::now();
    display.tick(t0);

    h.image("b.png", BLUE);
    h.signal.raise();
    assert_eq!(
        display.tick(t0 + Duration::from_millis(100)),
        Wake::At(t0 + Duration::from_secs(1))
    );
    assert_eq!(shown_item(&display), Some(MediaId(1)));
    assert_eq!(display.scheduler().playlist(), &[MediaId(1), MediaId(2)]);

    display.tick(t0 + Duration::from_secs(1));
    assert_eq!(shown_item(&display), Some(MediaId(2)));
}

#[test]
fn video_releases_screen_and_advances_after_playback() {
    let h = Harness::new(|_| {});
    h.image("a.png", RED);
    let clip = h.video("b.mp4");
    let mut display = h.display();
    let t0 = Instant::now();
    display.tick(t0);

    let t1 = t0 + Duration::from_secs(1);
    assert_eq!(display.tick(t1), Wake::At(t1));
    assert!(matches!(
        display.state(),
        DisplayState::ExternalPlayback { item: MediaId(2) }
    ));

    assert_eq!(display.tick(t1), Wake::At(t1));
    assert_eq!(*h.player.plays.lock().unwrap(), vec![clip]);
    assert_eq!(
        display.screen().drawn[1..],
        [Drawn::Release, Drawn::Restore, Drawn::Frame(Tone::Red)]
    );
    assert_eq!(shown_item(&display), Some(MediaId(2)));
    assert_eq!(h.resumed(), Some(MediaId(2)));

    display.tick(t1);
    assert_eq!(shown_item(&display), Some(MediaId(1)));
}

#[test]
fn failed_video_is_purged() {
    let mut h = Harness::new(|_| {});
    h.player.fail = true;
    h.image("a.png", RED);
    h.video("b.mp4");
    let mut display = h.display();
    let t0 = Instant::now();
    display.tick(t0);

    let t1 = t0 + Duration::from_secs(1);
    display.tick(t1);
    display.tick(t1);
    assert_eq!(h.player.plays.lock().unwrap().len(), 1);
    assert!(display.screen().drawn.contains(&Drawn::Restore));
    assert_eq!(display.scheduler().playlist(), &[MediaId(1)]);
    assert_eq!(shown_item(&display), Some(MediaId(1)));
    assert_eq!(h.resumed(), Some(MediaId(1)));
}

#[test]
fn live_settings_apply_from_the_next_item() {
    let h = Harness::new(|_| {});
    h.image("a.png", RED);
    h.image("b.png", BLUE);
    let mut display = h.display();
    let t0 = Instant::now();
    display.tick(t0);

    let mut next = (**h.settings.borrow()).clone();
    next.playback.slide_duration_s = 30.0;
    h.settings.send(Arc::new(next)).unwrap();

    assert_eq!(
        display.tick(t0 + Duration::from_millis(500)),
        Wake::At(t0 + Duration::from_secs(1))
    );
    assert_eq!(display.settings().playback.slide_duration_s, 30.0);
    assert_eq!(shown_item(&display), Some(MediaId(1)));

    let t1 = t0 + Duration::from_secs(1);
    assert_eq!(display.tick(t1), Wake::At(t1 + Duration::from_secs(30)));
    assert_eq!(shown_item(&display), Some(MediaId(2)));
}

#[test]
fn push_during_crossfade_leaves_running_fade_alone() {
    let h = Harness::new(|live| live.playback.crossfade_ms = 350);
    h.image("a.png", RED);
    h.image("b.png", BLUE);
    let mut display = h.display();
    let t0 = Instant::now();
    display.tick(t0);

    let t1 = t0 + Duration::from_secs(1);
    assert_eq!(display.tick(t1), Wake::NextFrame);

    let mut next = (**h.settings.borrow()).clone();
    next.playback.crossfade_ms = 5000;
    h.settings.send(Arc::new(next)).unwrap();

    assert_eq!(display.tick(t1 + Duration::from_millis(175)), Wake::NextFrame);
    assert_eq!(display.settings().playback.crossfade_ms, 5000);
    assert_eq!(
        display.screen().last(),
        Some(&Drawn::Blend {
            from: Tone::Red,
            to: Tone::Blue,
            alpha: 127
        })
    );
    let t2 = t1 + Duration::from_millis(350);
    assert_eq!(display.tick(t2), Wake::At(t2 + Duration::from_secs(1)));
    assert_eq!(display.screen().last(), Some(&Drawn::Frame(Tone::Blue)));

    // The following transition picks up the new duration.
    let t3 = t2 + Duration::from_secs(1);
    assert_eq!(display.tick(t3), Wake::NextFrame);
    assert_eq!(display.tick(t3 + Duration::from_millis(350)), Wake::NextFrame);
    assert_eq!(
        display.screen().last(),
        Some(&Drawn::Blend {
            from: Tone::Blue,
            to: Tone::Red,
            alpha: 17
        })
    );
}

#[test]
fn shuffle_toggle_rebuilds_the_order() {
    let h = Harness::new(|_| {});
    for name in ["a", "b", "c", "d", "e", "f", "g", "h"] {
        h.image(&format!("{name}.png"), RED);
    }
    let in_order: Vec<MediaId> = (1..=8).map(MediaId).collect();
    let mut display = h.display();
    let t0 = Instant::now();
    display.tick(t0);
    assert_eq!(display.scheduler().playlist(), in_order.as_slice());

    let mut next = (**h.settings.borrow()).clone();
    next.playback.shuffle = true;
    h.settings.send(Arc::new(next.clone())).unwrap();
    display.tick(t0 + Duration::from_millis(100));
    let shuffled = display.scheduler().playlist().to_vec();
    assert_ne!(shuffled, in_order);
    let mut sorted = shuffled.clone();
    sorted.sort();
    assert_eq!(sorted, in_order);
    assert_eq!(shown_item(&display), Some(MediaId(1)));

    next.playback.shuffle = false;
    h.settings.send(Arc::new(next)).unwrap();
    display.tick(t0 + Duration::from_millis(200));
    assert_eq!(display.scheduler().playlist(), in_order.as_slice());
}

#[test]
fn oversized_slide_duration_saturates_instead_of_panicking() {
    let h = Harness::new(|_| {});
    h.image("a.png", RED);
    h.image("b.png", BLUE);
    let mut display = h.display();
    let t0 = Instant::now();
    display.tick(t0);

    let mut next = (**h.settings.borrow()).clone();
    next.playback.slide_duration_s = 1e20;
    h.settings.send(Arc::new(next)).unwrap();

    let t1 = t0 + Duration::from_secs(1);
    assert_eq!(
        display.tick(t1),
        Wake::At(t1 + Duration::from_secs(1_000_000_000))
    );
    assert_eq!(shown_item(&display), Some(MediaId(2)));
}

#[test]
fn flag_edits_rebuild_the_playlist() {
    let h = Harness::new(|_| {});
    h.image("a.png", RED);
    h.image("b.png", BLUE);
    fs::write(h.flags_path(), r#"{"b.png":{"exclude_from_slideshow":true}}"#).unwrap();
    let mut display = h.display();
    let t0 = Instant::now();
    display.tick(t0);
    assert_eq!(display.scheduler().playlist(), &[MediaId(1)]);

    fs::write(h.flags_path(), "{}").unwrap();
    fs::File::options()
        .write(true)
        .open(h.flags_path())
        .unwrap()
        .set_modified(SystemTime::now() + Duration::from_secs(10))
        .unwrap();
    display.tick(t0 + Duration::from_millis(100));
    assert_eq!(display.scheduler().playlist(), &[MediaId(1), MediaId(2)]);
    assert_eq!(shown_item(&display), Some(MediaId(1)));
}

#[test]
fn end_of_non_looping_playlist_holds_last_item() {
    let h = Harness::new(|live| live.playback.loop_playlist = false);
    h.image("a.png", RED);
    h.image("b.png", BLUE);
    let mut display = h.display();
    let t0 = Instant::now();
    display.tick(t0);
    display.tick(t0 + Duration::from_secs(1));

    let t2 = t0 + Duration::from_secs(2);
    assert_eq!(display.tick(t2), Wake::At(t2 + IDLE_POLL));
    assert_eq!(shown_item(&display), Some(MediaId(2)));
    assert_eq!(display.screen().frames(), vec![Tone::Red, Tone::Blue]);
}

#[test]
fn cancellation_exits() {
    let h = Harness::new(|_| {});
    h.image("a.png", RED);
    let mut display = h.display();
    let t0 = Instant::now();
    display.tick(t0);
    h.cancel.cancel();
    assert_eq!(display.tick(t0 + Duration::from_millis(1)), Wake::Exit);
}
