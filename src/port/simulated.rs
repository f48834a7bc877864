//! Deterministic in-process audio port.
//!
//! Backs the CLI demo and the test suite. Capture renders a real WAV file
//! whose length matches active (unpaused) recording time, playback probes
//! the source file and advances a synthetic playhead, and every failure the
//! engine must survive can be switched on through a knob.
//!
//! Timekeeping uses `tokio::time`, so sessions driven by a paused test
//! clock see the port advance in lockstep with them. Tickers are anchored
//! when a stream opens; ticks that come due while a task is unpolled
//! replay in order instead of slipping.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::debug;
use uuid::Uuid;

use super::{
    AudioPort, CaptureConfig, OpenPlayback, OpenRecording, Permission, PlaybackStatus,
    PlayerHandle, RecorderHandle, RecordingArtifact,
};
use crate::media;

/// How often the synthetic input meter publishes a new level.
const METER_CADENCE: Duration = Duration::from_millis(50);
/// How often a playing stream reports a status frame.
const STATUS_CADENCE: Duration = Duration::from_millis(100);
/// Simulated latency of the permission prompt.
const PERMISSION_LATENCY: Duration = Duration::from_millis(20);
/// Simulated latency of opening a hardware stream.
const OPEN_LATENCY: Duration = Duration::from_millis(10);
/// Simulated latency of flushing the encoder at stop.
const FINALIZE_LATENCY: Duration = Duration::from_millis(10);

/// Stream accounting snapshot, for asserting that no handle leaked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimulatedPortStats {
    pub streams_opened: usize,
    pub streams_closed: usize,
}

impl SimulatedPortStats {
    /// Streams opened but not yet finalized or disposed.
    pub fn live(&self) -> usize {
        self.streams_opened.saturating_sub(self.streams_closed)
    }
}

/// Simulated hardware audio capability.
///
/// Knobs are sticky: a failure mode stays on until switched off, so a test
/// can exercise retry paths.
pub struct SimulatedAudioPort {
    scratch_dir: PathBuf,
    deny_permission: AtomicBool,
    fail_open_recording: AtomicBool,
    fail_open_playback: AtomicBool,
    fail_finalize: Arc<AtomicBool>,
    discard_output: Arc<AtomicBool>,
    opened: Arc<AtomicUsize>,
    closed: Arc<AtomicUsize>,
}

impl SimulatedAudioPort {
    /// Create a port that writes captured takes under `scratch_dir`.
    pub fn new(scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            scratch_dir: scratch_dir.into(),
            deny_permission: AtomicBool::new(false),
            fail_open_recording: AtomicBool::new(false),
            fail_open_playback: AtomicBool::new(false),
            fail_finalize: Arc::new(AtomicBool::new(false)),
            discard_output: Arc::new(AtomicBool::new(false)),
            opened: Arc::new(AtomicUsize::new(0)),
            closed: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Make permission requests come back denied.
    pub fn set_deny_permission(&self, deny: bool) {
        self.deny_permission.store(deny, Ordering::SeqCst);
    }

    /// Make recorder opens fail.
    pub fn set_fail_open_recording(&self, fail: bool) {
        self.fail_open_recording.store(fail, Ordering::SeqCst);
    }

    /// Make playback opens fail.
    pub fn set_fail_open_playback(&self, fail: bool) {
        self.fail_open_playback.store(fail, Ordering::SeqCst);
    }

    /// Make recorder finalization fail. The stream still counts as closed.
    pub fn set_fail_finalize(&self, fail: bool) {
        self.fail_finalize.store(fail, Ordering::SeqCst);
    }

    /// Make finalization report success without writing the output file.
    pub fn set_discard_output(&self, discard: bool) {
        self.discard_output.store(discard, Ordering::SeqCst);
    }

    pub fn stats(&self) -> SimulatedPortStats {
        SimulatedPortStats {
            streams_opened: self.opened.load(Ordering::SeqCst),
            streams_closed: self.closed.load(Ordering::SeqCst),
        }
    }
}

#[async_trait::async_trait]
impl AudioPort for SimulatedAudioPort {
    async fn request_permission(&self) -> Result<Permission> {
        time::sleep(PERMISSION_LATENCY).await;
        if self.deny_permission.load(Ordering::SeqCst) {
            debug!("Simulated permission prompt: denied");
            return Ok(Permission::Denied);
        }
        Ok(Permission::Granted)
    }

    async fn open_recording(&self, config: &CaptureConfig) -> Result<OpenRecording> {
        time::sleep(OPEN_LATENCY).await;
        if self.fail_open_recording.load(Ordering::SeqCst) {
            bail!("Simulated recorder failed to open");
        }

        std::fs::create_dir_all(&self.scratch_dir).with_context(|| {
            format!("Failed to create scratch dir: {}", self.scratch_dir.display())
        })?;
        let path = self.scratch_dir.join(format!("take-{}.wav", Uuid::new_v4()));

        let paused = Arc::new(AtomicBool::new(false));
        let (meter_tx, meter_rx) = watch::channel(0.0f32);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let meter_task = spawn_meter(meter_tx, shutdown_rx, paused.clone());

        self.opened.fetch_add(1, Ordering::SeqCst);
        debug!("Simulated recorder opened: {}", path.display());

        let handle = SimulatedRecorder {
            path,
            sample_rate: config.sample_rate,
            channels: config.channels,
            started_at: Instant::now(),
            paused_at: None,
            paused_total: Duration::ZERO,
            paused,
            meter_shutdown: shutdown_tx,
            meter_task: Some(meter_task),
            fail_finalize: self.fail_finalize.clone(),
            discard_output: self.discard_output.clone(),
            closed: self.closed.clone(),
            released: false,
        };

        Ok(OpenRecording {
            handle: Box::new(handle),
            meter: meter_rx,
        })
    }

    async fn open_playback(&self, uri: &str) -> Result<OpenPlayback> {
        time::sleep(OPEN_LATENCY).await;
        if self.fail_open_playback.load(Ordering::SeqCst) {
            bail!("Simulated player failed to open");
        }

        let duration_secs = media::probe_duration_secs(uri)?;
        let duration_millis = (duration_secs * 1000.0).round() as u64;

        let playing = Arc::new(AtomicBool::new(false));
        let position = Arc::new(AtomicU64::new(0));
        let (status_tx, status_rx) = mpsc::channel(16);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let status_task = spawn_player_clock(
            status_tx,
            shutdown_rx,
            playing.clone(),
            position.clone(),
            duration_millis,
        );

        self.opened.fetch_add(1, Ordering::SeqCst);
        debug!("Simulated player opened: {} ({}ms)", uri, duration_millis);

        let handle = SimulatedPlayer {
            duration_millis,
            playing,
            position,
            shutdown: shutdown_tx,
            status_task: Some(status_task),
            closed: self.closed.clone(),
            released: false,
        };
        let initial = PlaybackStatus {
            is_loaded: true,
            is_playing: false,
            position_millis: 0,
            duration_millis,
            did_just_finish: false,
        };

        Ok(OpenPlayback {
            handle: Box::new(handle),
            status: status_rx,
            initial,
        })
    }
}

/// Publishes a smooth pseudo-level while the stream is live and unpaused.
fn spawn_meter(
    meter_tx: watch::Sender<f32>,
    mut shutdown: watch::Receiver<bool>,
    paused: Arc<AtomicBool>,
) -> JoinHandle<()> {
    let started = Instant::now();
    let mut ticker = time::interval_at(started + METER_CADENCE, METER_CADENCE);
    tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                _ = ticker.tick() => {
                    if paused.load(Ordering::SeqCst) {
                        continue;
                    }
                    let t = started.elapsed().as_secs_f32();
                    let level = 0.15 + 0.75 * (t * 3.1).sin().abs();
                    if meter_tx.send(level.min(1.0)).is_err() {
                        break;
                    }
                }
                _ = shutdown.changed() => break,
            }
        }
    })
}

/// Advances the playhead while `playing` and reports status frames at the
/// native cadence. Natural completion rewinds to the start and reports
/// `did_just_finish` exactly once per pass.
fn spawn_player_clock(
    status_tx: mpsc::Sender<PlaybackStatus>,
    mut shutdown: watch::Receiver<bool>,
    playing: Arc<AtomicBool>,
    position: Arc<AtomicU64>,
    duration_millis: u64,
) -> JoinHandle<()> {
    let step = STATUS_CADENCE.as_millis() as u64;
    let mut ticker = time::interval_at(Instant::now() + STATUS_CADENCE, STATUS_CADENCE);
    tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                _ = ticker.tick() => {
                    if !playing.load(Ordering::SeqCst) {
                        continue;
                    }
                    let next = position.load(Ordering::SeqCst) + step;
                    let frame = if next >= duration_millis {
                        playing.store(false, Ordering::SeqCst);
                        position.store(0, Ordering::SeqCst);
                        PlaybackStatus {
                            is_loaded: true,
                            is_playing: false,
                            position_millis: duration_millis,
                            duration_millis,
                            did_just_finish: true,
                        }
                    } else {
                        position.store(next, Ordering::SeqCst);
                        PlaybackStatus {
                            is_loaded: true,
                            is_playing: true,
                            position_millis: next,
                            duration_millis,
                            did_just_finish: false,
                        }
                    };
                    if status_tx.send(frame).await.is_err() {
                        break;
                    }
                }
                _ = shutdown.changed() => break,
            }
        }
    })
}

struct SimulatedRecorder {
    path: PathBuf,
    sample_rate: u32,
    channels: u16,
    started_at: Instant,
    paused_at: Option<Instant>,
    paused_total: Duration,
    paused: Arc<AtomicBool>,
    meter_shutdown: watch::Sender<bool>,
    meter_task: Option<JoinHandle<()>>,
    fail_finalize: Arc<AtomicBool>,
    discard_output: Arc<AtomicBool>,
    closed: Arc<AtomicUsize>,
    released: bool,
}

impl SimulatedRecorder {
    /// Recorded time so far, with paused spans excluded.
    fn active_duration(&self) -> Duration {
        let paused_now = self.paused_at.map(|p| p.elapsed()).unwrap_or_default();
        self.started_at
            .elapsed()
            .saturating_sub(self.paused_total + paused_now)
    }

    async fn release(&mut self) {
        self.released = true;
        self.closed.fetch_add(1, Ordering::SeqCst);
        let _ = self.meter_shutdown.send(true);
        if let Some(task) = self.meter_task.take() {
            let _ = task.await;
        }
    }
}

#[async_trait::async_trait]
impl RecorderHandle for SimulatedRecorder {
    async fn pause(&mut self) -> Result<()> {
        if self.paused_at.is_none() {
            self.paused_at = Some(Instant::now());
            self.paused.store(true, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn resume(&mut self) -> Result<()> {
        if let Some(paused_at) = self.paused_at.take() {
            self.paused_total += paused_at.elapsed();
            self.paused.store(false, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn stop(self: Box<Self>) -> Result<RecordingArtifact> {
        let mut this = self;
        let recorded = this.active_duration();
        this.release().await;

        time::sleep(FINALIZE_LATENCY).await;
        if this.fail_finalize.load(Ordering::SeqCst) {
            bail!("Simulated encoder failed to finalize");
        }

        let millis = recorded.as_millis() as u64;
        if this.discard_output.load(Ordering::SeqCst) {
            debug!("Simulated recorder discarded its output file");
        } else {
            media::write_tone_wav(&this.path, millis, this.sample_rate, this.channels)?;
            debug!("Simulated recorder finalized: {} ({}ms)", this.path.display(), millis);
        }

        Ok(RecordingArtifact {
            uri: this.path.display().to_string(),
            final_duration_millis: Some(millis),
        })
    }

    async fn dispose(self: Box<Self>) {
        let mut this = self;
        this.release().await;
        debug!("Simulated recorder disposed, take discarded");
    }
}

impl Drop for SimulatedRecorder {
    fn drop(&mut self) {
        // Backstop for handles dropped without stop() or dispose().
        if !self.released {
            self.closed.fetch_add(1, Ordering::SeqCst);
            let _ = self.meter_shutdown.send(true);
            if let Some(task) = self.meter_task.take() {
                task.abort();
            }
            debug!("Simulated recorder dropped without finalize");
        }
    }
}

struct SimulatedPlayer {
    duration_millis: u64,
    playing: Arc<AtomicBool>,
    position: Arc<AtomicU64>,
    shutdown: watch::Sender<bool>,
    status_task: Option<JoinHandle<()>>,
    closed: Arc<AtomicUsize>,
    released: bool,
}

#[async_trait::async_trait]
impl PlayerHandle for SimulatedPlayer {
    async fn play(&mut self) -> Result<()> {
        self.playing.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn pause(&mut self) -> Result<()> {
        self.playing.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn seek(&mut self, position_millis: u64) -> Result<()> {
        let clamped = position_millis.min(self.duration_millis);
        self.position.store(clamped, Ordering::SeqCst);
        Ok(())
    }

    async fn dispose(self: Box<Self>) {
        let mut this = self;
        this.released = true;
        this.closed.fetch_add(1, Ordering::SeqCst);
        let _ = this.shutdown.send(true);
        if let Some(task) = this.status_task.take() {
            let _ = task.await;
        }
        debug!("Simulated player disposed");
    }
}

impl Drop for SimulatedPlayer {
    fn drop(&mut self) {
        if !self.released {
            self.closed.fetch_add(1, Ordering::SeqCst);
            let _ = self.shutdown.send(true);
            if let Some(task) = self.status_task.take() {
                task.abort();
            }
            debug!("Simulated player dropped without dispose");
        }
    }
}
