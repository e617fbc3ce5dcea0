//! Binary entrypoint for LeanFrame.
//!
//! Wires the library crate's tasks together; no local modules here.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{Level, debug, error, info};
use tracing_subscriber::{EnvFilter, fmt};

use leanframe::config::Configuration;
use leanframe::display::state::DisplayParts;
use leanframe::events::LibrarySignal;
use leanframe::flags::FlagStore;
use leanframe::library::{DirectoryIndex, MediaLibrary};
use leanframe::playlist::{PlaylistScheduler, RebuildReason};
use leanframe::tasks;

#[derive(Debug, Parser)]
#[command(name = "leanframe", version, about = "Lean photo and video frame")]
struct Cli {
    /// Path to YAML config file
    #[arg(short, long, value_name = "FILE", default_value = "config.yaml")]
    config: PathBuf,

    /// Increase log verbosity (repeatable)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    verbose: u8,

    /// Deterministic RNG seed for playlist shuffling
    #[arg(long = "playlist-seed", value_name = "SEED")]
    playlist_seed: Option<u64>,

    /// Print the playlist order without opening a window
    #[arg(long = "dry-run")]
    dry_run: bool,
}

fn init_tracing(verbosity: u8) -> Result<()> {
    let level = match verbosity {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let filter = EnvFilter::from_default_env()
        .add_directive(format!("leanframe={level}").parse()?)
        .add_directive("wgpu=warn".parse()?)
        .add_directive("winit=warn".parse()?)
        .add_directive("naga=warn".parse()?);
    fmt().with_env_filter(filter).with_target(true).init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose)?;

    let cfg = Configuration::from_yaml_file(&cli.config)
        .with_context(|| format!("failed to load configuration from {}", cli.config.display()))?
        .validated()
        .context("invalid configuration values")?;
    info!(config = %cli.config.display(), library = %cfg.library_path.display(), "loaded configuration");
    debug!("{cfg:#?}");

    if cli.dry_run {
        return run_dry_run(&cfg, cli.playlist_seed);
    }

    let cancel = CancellationToken::new();
    let library_signal = LibrarySignal::new();
    let (settings_tx, settings_rx) = watch::channel(Arc::new(cfg.live_settings()));

    let mut tasks = JoinSet::new();

    tasks.spawn({
        let cancel = cancel.clone();
        async move { wait_for_shutdown(cancel).await.context("signal task failed") }
    });

    if cfg.indexer.watch {
        tasks.spawn({
            let root = cfg.library_path.clone();
            let recursive = cfg.indexer.recursive;
            let signal = library_signal.clone();
            let cancel = cancel.clone();
            async move {
                tasks::watcher::run(root, recursive, signal, cancel)
                    .await
                    .context("watcher task failed")
            }
        });
    }

    if let Some(path) = cfg.control_socket_path.clone() {
        tasks.spawn({
            let settings = settings_tx.clone();
            let signal = library_signal.clone();
            let cancel = cancel.clone();
            async move {
                tasks::control::run(path, settings, signal, cancel)
                    .await
                    .context("control task failed")
            }
        });
    }

    let parts = DisplayParts::from_config(
        &cfg,
        settings_rx,
        library_signal,
        cancel.clone(),
        cli.playlist_seed,
    );

    // The window must live on the main thread; this returns on quit or cancellation.
    if let Err(e) = tasks::viewer::run_windowed(
        cfg.screen.clone(),
        cfg.placeholder_screen.clone(),
        parts,
        cancel.clone(),
    )
    .context("viewer failed")
    {
        error!("{e:?}");
    }
    cancel.cancel();
    drop(settings_tx);

    while let Some(res) = tasks.join_next().await {
        match res {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("task error: {e:?}"),
            Err(e) => error!("join error: {e}"),
        }
    }

    Ok(())
}

async fn wait_for_shutdown(cancel: CancellationToken) -> Result<()> {
    let mut sigterm = signal(SignalKind::terminate()).context("failed to register SIGTERM")?;
    tokio::select! {
        _ = cancel.cancelled() => {}
        res = tokio::signal::ctrl_c() => {
            res.context("ctrl-c handler failed")?;
            info!("ctrl-c received; initiating shutdown");
            cancel.cancel();
        }
        _ = sigterm.recv() => {
            info!("SIGTERM received; initiating shutdown");
            cancel.cancel();
        }
    }
    Ok(())
}

fn run_dry_run(cfg: &Configuration, seed: Option<u64>) -> Result<()> {
    let mut library = DirectoryIndex::new(cfg.library_path.clone(), cfg.indexer.clone());
    library.rescan().context("failed to scan library")?;
    let mut flags = FlagStore::new(cfg.flags_path.clone());
    flags.refresh().context("failed to read flags")?;

    let mut scheduler = PlaylistScheduler::new(
        library.root().to_path_buf(),
        cfg.playback.shuffle,
        cfg.playback.loop_playlist,
        seed,
    );
    scheduler.set_items(library.items());
    scheduler.set_flags(flags.snapshot().clone());
    scheduler.rebuild(RebuildReason::Startup);

    println!(
        "# playlist dry run\n# library: {}\n# items: {}\n# eligible: {}\n# shuffle: {}\n# seed: {}\n",
        cfg.library_path.display(),
        library.len(),
        scheduler.len(),
        cfg.playback.shuffle,
        seed.map_or_else(|| "(random)".to_string(), |s| s.to_string())
    );
    if scheduler.is_empty() {
        println!("{}", cfg.placeholder_message());
        return Ok(());
    }
    for (position, id) in scheduler.playlist().iter().enumerate() {
        if let Some(item) = scheduler.get(*id) {
            println!(
                "{:>4}  {:>6}  {:<5}  {}",
                position + 1,
                id,
                item.kind,
                item.path.display()
            );
        }
    }
    Ok(())
}
