// Integration tests for the playback (review) session.
//
// Each test loads a real WAV written into a temp dir, then drives the
// session under a paused tokio clock so the simulated player's status
// frames arrive deterministically.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio::time;
use voicetake::{
    media, EngineEvent, ErrorKind, EventSender, PlaybackSession, PlaybackState,
    SimulatedAudioPort,
};

fn new_session(
    dir: &TempDir,
) -> (
    Arc<SimulatedAudioPort>,
    PlaybackSession,
    mpsc::Receiver<EngineEvent>,
) {
    let port = Arc::new(SimulatedAudioPort::new(dir.path()));
    let (events, rx) = EventSender::channel(1024);
    let session = PlaybackSession::new(port.clone(), events);
    (port, session, rx)
}

fn tone_file(dir: &TempDir, name: &str, millis: u64) -> Result<String> {
    let path = dir.path().join(name);
    media::write_tone_wav(&path, millis, 44_100, 1)?;
    Ok(path.to_string_lossy().into_owned())
}

fn drain(rx: &mut mpsc::Receiver<EngineEvent>) -> Vec<EngineEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn phases(events: &[EngineEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|event| match event {
            EngineEvent::StateChanged(phase) => Some(phase.to_string()),
            _ => None,
        })
        .collect()
}

fn progress_frames(events: &[EngineEvent]) -> Vec<(f64, bool)> {
    events
        .iter()
        .filter_map(|event| match event {
            EngineEvent::Playback {
                position_secs,
                playing,
                ..
            } => Some((*position_secs, *playing)),
            _ => None,
        })
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_load_rests_paused_at_zero() -> Result<()> {
    let dir = TempDir::new()?;
    let (_port, session, mut rx) = new_session(&dir);
    let uri = tone_file(&dir, "take.wav", 1500)?;

    session.load(&uri).await?;

    assert_eq!(session.state().await, PlaybackState::Loaded);
    assert_eq!(session.position_secs().await, 0.0);
    assert!(
        (session.duration_secs().await - 1.5).abs() < 0.01,
        "duration comes from the probed file"
    );

    let events = drain(&mut rx);
    assert_eq!(phases(&events), vec!["reviewing:loading", "reviewing:loaded"]);
    assert_eq!(
        progress_frames(&events),
        vec![(0.0, false)],
        "one resting frame announces the loaded take"
    );

    // Nothing advances until play is requested.
    time::sleep(Duration::from_secs(1)).await;
    tokio::task::yield_now().await;
    assert_eq!(session.position_secs().await, 0.0);
    assert!(progress_frames(&drain(&mut rx)).is_empty());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_play_advances_the_playhead() -> Result<()> {
    let dir = TempDir::new()?;
    let (_port, session, mut rx) = new_session(&dir);
    let uri = tone_file(&dir, "take.wav", 1500)?;

    session.load(&uri).await?;
    drain(&mut rx);

    session.play().await?;
    assert_eq!(session.state().await, PlaybackState::Playing);
    time::sleep(Duration::from_millis(500)).await;
    tokio::task::yield_now().await;

    assert!(
        (session.position_secs().await - 0.5).abs() < 0.001,
        "playhead should sit at ~0.5s, got {:.3}",
        session.position_secs().await
    );
    let frames = progress_frames(&drain(&mut rx));
    assert_eq!(frames.len(), 5, "one frame per 100ms of playback");
    assert!(frames.iter().all(|(_, playing)| *playing));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_pause_holds_the_position() -> Result<()> {
    let dir = TempDir::new()?;
    let (_port, session, mut rx) = new_session(&dir);
    let uri = tone_file(&dir, "take.wav", 1500)?;

    session.load(&uri).await?;
    session.play().await?;
    time::sleep(Duration::from_millis(400)).await;
    tokio::task::yield_now().await;
    session.pause().await?;
    assert_eq!(session.state().await, PlaybackState::Loaded);
    drain(&mut rx);

    // Paused playback is silent: no movement, no frames.
    time::sleep(Duration::from_secs(2)).await;
    tokio::task::yield_now().await;
    assert!((session.position_secs().await - 0.4).abs() < 0.001);
    assert!(progress_frames(&drain(&mut rx)).is_empty());

    // Resuming continues from the held position.
    session.play().await?;
    time::sleep(Duration::from_millis(200)).await;
    tokio::task::yield_now().await;
    assert!((session.position_secs().await - 0.6).abs() < 0.001);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_natural_finish_rewinds_to_start() -> Result<()> {
    let dir = TempDir::new()?;
    let (_port, session, mut rx) = new_session(&dir);
    let uri = tone_file(&dir, "take.wav", 1000)?;

    session.load(&uri).await?;
    drain(&mut rx);

    session.play().await?;
    time::sleep(Duration::from_millis(1200)).await;
    tokio::task::yield_now().await;

    assert_eq!(session.state().await, PlaybackState::Loaded, "finish leaves it replayable");
    assert_eq!(session.position_secs().await, 0.0, "finish rewinds to the start");

    let events = drain(&mut rx);
    let rests = phases(&events)
        .iter()
        .filter(|phase| *phase == "reviewing:loaded")
        .count();
    assert_eq!(rests, 1, "exactly one finish per pass");

    // The take can be played again end to end.
    session.play().await?;
    time::sleep(Duration::from_millis(1200)).await;
    tokio::task::yield_now().await;
    assert_eq!(session.state().await, PlaybackState::Loaded);
    assert_eq!(session.position_secs().await, 0.0);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_seek_clamps_to_the_take() -> Result<()> {
    let dir = TempDir::new()?;
    let (_port, session, _rx) = new_session(&dir);
    let uri = tone_file(&dir, "take.wav", 1000)?;
    session.load(&uri).await?;

    session.seek(5.0).await?;
    assert_eq!(session.position_secs().await, 1.0, "past-the-end clamps to the end");

    session.seek(-3.0).await?;
    assert_eq!(session.position_secs().await, 0.0, "negative positions clamp to zero");
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_play_from_the_end_finishes_immediately() -> Result<()> {
    let dir = TempDir::new()?;
    let (_port, session, mut rx) = new_session(&dir);
    let uri = tone_file(&dir, "take.wav", 1000)?;

    session.load(&uri).await?;
    session.seek(1.0).await?;
    drain(&mut rx);

    session.play().await?;
    time::sleep(Duration::from_millis(200)).await;
    tokio::task::yield_now().await;

    assert_eq!(session.state().await, PlaybackState::Loaded);
    assert_eq!(session.position_secs().await, 0.0);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_load_failure_is_retryable() -> Result<()> {
    let dir = TempDir::new()?;
    let (_port, session, mut rx) = new_session(&dir);

    let missing = dir.path().join("gone.wav").to_string_lossy().into_owned();
    let err = session.load(&missing).await.expect_err("missing file must fail");
    assert_eq!(err.kind(), ErrorKind::PlaybackLoadFailed);
    assert_eq!(session.state().await, PlaybackState::Failed);

    let events = drain(&mut rx);
    assert!(
        events.iter().any(|event| matches!(
            event,
            EngineEvent::Error { kind: ErrorKind::PlaybackLoadFailed, .. }
        )),
        "load failure must be surfaced on the event stream"
    );

    // A good file loads from the failed state without an unload.
    let uri = tone_file(&dir, "take.wav", 1000)?;
    session.load(&uri).await?;
    assert_eq!(session.state().await, PlaybackState::Loaded);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_unload_releases_the_stream() -> Result<()> {
    let dir = TempDir::new()?;
    let (port, session, mut rx) = new_session(&dir);
    let uri = tone_file(&dir, "take.wav", 1500)?;

    session.load(&uri).await?;
    session.play().await?;
    time::sleep(Duration::from_millis(300)).await;
    tokio::task::yield_now().await;

    session.unload().await;
    assert_eq!(session.state().await, PlaybackState::Unloaded);
    assert_eq!(session.position_secs().await, 0.0);
    assert_eq!(session.duration_secs().await, 0.0);
    assert_eq!(port.stats().live(), 0, "unload must release the player stream");
    drain(&mut rx);

    // A released stream reports nothing.
    time::sleep(Duration::from_secs(2)).await;
    tokio::task::yield_now().await;
    assert!(progress_frames(&drain(&mut rx)).is_empty());

    // Unload is idempotent.
    session.unload().await;
    assert_eq!(session.state().await, PlaybackState::Unloaded);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_controls_require_a_loaded_take() -> Result<()> {
    let dir = TempDir::new()?;
    let (_port, session, _rx) = new_session(&dir);

    let err = session.play().await.expect_err("play while unloaded");
    assert_eq!(err.kind(), ErrorKind::InvalidTransition);
    assert_eq!(err.to_string(), "play is not valid while unloaded");
    assert!(session.pause().await.is_err());
    assert!(session.seek(0.5).await.is_err());

    // Loading over a loaded take is rejected too.
    let uri = tone_file(&dir, "take.wav", 1000)?;
    session.load(&uri).await?;
    let err = session.load(&uri).await.expect_err("load while loaded");
    assert_eq!(err.to_string(), "load is not valid while loaded");
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_unload_during_load_wins() -> Result<()> {
    let dir = TempDir::new()?;
    let (port, session, mut rx) = new_session(&dir);
    let uri = tone_file(&dir, "take.wav", 1000)?;
    let session = Arc::new(session);

    let loader = {
        let session = session.clone();
        let uri = uri.clone();
        tokio::spawn(async move { session.load(&uri).await })
    };
    // Let the load task reach the port open, then pull the rug.
    for _ in 0..5 {
        tokio::task::yield_now().await;
    }
    session.unload().await;
    time::sleep(Duration::from_millis(100)).await;
    tokio::task::yield_now().await;

    let result = loader.await?;
    assert!(result.is_ok(), "superseded load resolves cleanly: {result:?}");
    assert_eq!(session.state().await, PlaybackState::Unloaded);
    assert_eq!(port.stats().live(), 0, "the opened stream is disposed, not leaked");

    let events = drain(&mut rx);
    assert!(
        !phases(&events).contains(&"reviewing:loaded".to_string()),
        "the take never reports loaded after an unload"
    );
    Ok(())
}
