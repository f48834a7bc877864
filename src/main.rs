use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio::time::sleep;
use tracing::{debug, info, warn, Level};
use voicetake::{
    EngineConfig, EngineEvent, FsRecordingStore, RecordingStore, SessionController,
    SimulatedAudioPort,
};

#[derive(Parser)]
#[command(name = "voicetake")]
#[command(about = "Record, review, and save voice takes over a simulated audio port")]
struct Args {
    /// Config file (TOML); built-in defaults apply when omitted
    #[arg(short, long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one full take: record with a pause, replay it, save it
    Demo {
        /// Seconds of audio to record
        #[arg(short, long, default_value = "4")]
        duration: u64,
    },
    /// List saved recordings, newest first
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };

    match args.command {
        Command::Demo { duration } => run_demo(config, duration).await,
        Command::List => list_library(config).await,
    }
}

async fn run_demo(config: EngineConfig, duration: u64) -> Result<()> {
    info!("voicetake demo: {}s take", duration);

    let port = Arc::new(SimulatedAudioPort::new(&config.scratch_dir));
    let store = Arc::new(FsRecordingStore::new(&config.library_dir));
    let (controller, mut events) = SessionController::new(port, store, &config);

    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                EngineEvent::StateChanged(phase) => info!("state -> {}", phase),
                EngineEvent::Duration(secs) => info!("elapsed: {}s", secs),
                EngineEvent::Levels(levels) => {
                    if let Some(level) = levels.last() {
                        debug!("level {:.2} {}", level, "#".repeat((level * 24.0) as usize));
                    }
                }
                EngineEvent::Playback {
                    position_secs,
                    duration_secs,
                    playing,
                } => {
                    if playing {
                        info!("playback: {:.1}s / {:.1}s", position_secs, duration_secs);
                    }
                }
                EngineEvent::Finished(take) => {
                    info!("take ready: {} ({:.1}s)", take.uri, take.duration_secs)
                }
                EngineEvent::Error { kind, message } => warn!("{}: {}", kind, message),
            }
        }
    });

    // Record with a pause in the middle.
    let half = Duration::from_millis(duration * 500);
    controller.record().await?;
    sleep(half).await;
    controller.pause_recording().await?;
    info!("pausing for a second mid-take");
    sleep(Duration::from_secs(1)).await;
    controller.resume_recording().await?;
    sleep(half).await;

    let take = controller.stop_recording().await?;

    // Replay the whole take, then commit it.
    controller.play().await?;
    sleep(Duration::from_secs_f64(take.duration_secs + 0.5)).await;

    let saved = controller.save().await?;
    info!("saved {} -> {}", saved.id, saved.uri);

    drop(controller);
    printer.await?;
    Ok(())
}

async fn list_library(config: EngineConfig) -> Result<()> {
    let store = FsRecordingStore::new(&config.library_dir);
    let recordings = store.list().await?;

    if recordings.is_empty() {
        info!("Library is empty: {}", config.library_dir.display());
        return Ok(());
    }
    for recording in &recordings {
        info!(
            "{}  {:>6.1}s  {}  {}",
            recording.id,
            recording.duration_secs,
            recording.saved_at.format("%Y-%m-%d %H:%M:%S"),
            recording.uri
        );
    }
    Ok(())
}
