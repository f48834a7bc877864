//! Recording session lifecycle.
//!
//! One session manages one take at a time: permission request, an open
//! recorder stream, the duration timer and level sampler that run beside
//! it, and finalization into a [`Take`]. All mutation goes through a single
//! lifecycle lock, so operations are serialized; the timer and sampler
//! tasks hold only cheap clones and never that lock, which lets the
//! session await their shutdown while holding it.
//!
//! Ordering guarantees that follow from the locking:
//! - no duration or level frame is emitted after `pause` or `stop` returns
//! - the recorder stream is released exactly once, by `stop`, `cancel`, or
//!   an abandoned `start`
//! - reaching the duration cap stops the take automatically, exactly once,
//!   even when a manual `stop` races it

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::levels::{LevelSampler, LevelWindow};
use super::timer::{CapHook, DurationTimer};
use super::SessionPhase;
use crate::error::{EngineError, EngineResult};
use crate::event::{EngineEvent, EventSender};
use crate::port::{AudioPort, CaptureConfig, RecorderHandle};

/// Lifecycle states of a recording session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordingState {
    Idle,
    RequestingPermission,
    PermissionDenied,
    Recording,
    Paused,
    Stopping,
    Stopped,
    Failed,
}

impl RecordingState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordingState::Idle => "idle",
            RecordingState::RequestingPermission => "requesting_permission",
            RecordingState::PermissionDenied => "permission_denied",
            RecordingState::Recording => "recording",
            RecordingState::Paused => "paused",
            RecordingState::Stopping => "stopping",
            RecordingState::Stopped => "stopped",
            RecordingState::Failed => "failed",
        }
    }
}

impl std::fmt::Display for RecordingState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A finished, unreviewed capture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Take {
    /// URI of the captured file
    pub uri: String,
    /// Recorded length in seconds
    pub duration_secs: f64,
}

pub struct RecordingSession {
    core: Arc<RecordingCore>,
}

struct RecordingCore {
    port: Arc<dyn AudioPort>,
    events: EventSender,
    capture: CaptureConfig,
    cap_secs: Option<u64>,
    inner: Mutex<RecorderInner>,
    elapsed: Arc<AtomicU64>,
    window: Arc<Mutex<LevelWindow>>,
}

struct RecorderInner {
    state: RecordingState,
    handle: Option<Box<dyn RecorderHandle>>,
    timer: Option<DurationTimer>,
    sampler: Option<LevelSampler>,
    meter: Option<tokio::sync::watch::Receiver<f32>>,
    take: Option<Take>,
}

impl RecordingSession {
    /// Create an idle session. `cap_secs` bounds a single take; `None`
    /// records until stopped.
    pub fn new(
        port: Arc<dyn AudioPort>,
        events: EventSender,
        cap_secs: Option<u64>,
        level_window: usize,
    ) -> Self {
        Self {
            core: Arc::new(RecordingCore {
                port,
                events,
                capture: CaptureConfig::default(),
                cap_secs,
                inner: Mutex::new(RecorderInner {
                    state: RecordingState::Idle,
                    handle: None,
                    timer: None,
                    sampler: None,
                    meter: None,
                    take: None,
                }),
                elapsed: Arc::new(AtomicU64::new(0)),
                window: Arc::new(Mutex::new(LevelWindow::new(level_window))),
            }),
        }
    }

    /// Request permission, open the recorder, and start capture.
    ///
    /// Resolves once recording is live, or with the denial or failure that
    /// prevented it. A `cancel` that lands while this is in flight wins:
    /// the session returns to idle and this call resolves without effect.
    pub async fn start(&self) -> EngineResult<()> {
        let core = &self.core;
        {
            let mut inner = core.inner.lock().await;
            match inner.state {
                RecordingState::Idle | RecordingState::PermissionDenied => {}
                state => return Err(EngineError::invalid("start", state.as_str())),
            }
            core.set_state(&mut inner, RecordingState::RequestingPermission)
                .await;
        }

        // The lock is released across hardware waits so cancel stays
        // responsive; every await is followed by a state recheck.
        let permission = match core.port.request_permission().await {
            Ok(permission) => permission,
            Err(err) => {
                let failed =
                    EngineError::handle_open(err.context("requesting microphone permission"));
                return core.abort_start(failed).await;
            }
        };
        if !permission.is_granted() {
            return core.abort_start(EngineError::PermissionDenied).await;
        }

        let opened = match core.port.open_recording(&core.capture).await {
            Ok(opened) => opened,
            Err(err) => return core.abort_start(EngineError::handle_open(err)).await,
        };

        let mut inner = core.inner.lock().await;
        if inner.state != RecordingState::RequestingPermission {
            drop(inner);
            // cancelled while the stream was opening
            opened.handle.dispose().await;
            return Ok(());
        }

        core.elapsed.store(0, Ordering::SeqCst);
        core.window.lock().await.clear();
        inner.take = None;
        inner.handle = Some(opened.handle);
        inner.sampler = Some(LevelSampler::spawn(
            opened.meter.clone(),
            core.window.clone(),
            core.events.clone(),
        ));
        inner.meter = Some(opened.meter);
        inner.timer = Some(DurationTimer::spawn(
            core.elapsed.clone(),
            core.cap_secs,
            core.events.clone(),
            core.cap_hook(),
        ));
        core.set_state(&mut inner, RecordingState::Recording).await;
        info!("Recording started");
        Ok(())
    }

    /// Suspend capture. The duration counter and level window hold their
    /// values, and no frame is emitted after this returns.
    pub async fn pause(&self) -> EngineResult<()> {
        let core = &self.core;
        let mut inner = core.inner.lock().await;
        if inner.state != RecordingState::Recording {
            return Err(EngineError::invalid("pause", inner.state.as_str()));
        }

        core.stop_tickers(&mut inner).await;
        if let Some(handle) = inner.handle.as_mut() {
            if let Err(err) = handle.pause().await {
                warn!("Recorder pause failed: {err:#}");
            }
        }
        core.set_state(&mut inner, RecordingState::Paused).await;
        Ok(())
    }

    /// Continue a paused take. Duration and levels pick up where they left
    /// off.
    pub async fn resume(&self) -> EngineResult<()> {
        let core = &self.core;
        let mut inner = core.inner.lock().await;
        if inner.state != RecordingState::Paused {
            return Err(EngineError::invalid("resume", inner.state.as_str()));
        }

        if let Some(handle) = inner.handle.as_mut() {
            if let Err(err) = handle.resume().await {
                warn!("Recorder resume failed: {err:#}");
            }
        }
        if let Some(meter) = inner.meter.clone() {
            inner.sampler = Some(LevelSampler::spawn(
                meter,
                core.window.clone(),
                core.events.clone(),
            ));
        }
        inner.timer = Some(DurationTimer::spawn(
            core.elapsed.clone(),
            core.cap_secs,
            core.events.clone(),
            core.cap_hook(),
        ));
        core.set_state(&mut inner, RecordingState::Recording).await;
        Ok(())
    }

    /// Finalize the take. On success the session rests in `Stopped` with
    /// the take available; a finalize failure discards the take and
    /// re-arms the session at `Idle`. A session the duration cap already
    /// stopped hands over its finished take instead of rejecting the call.
    pub async fn stop(&self) -> EngineResult<Take> {
        let core = &self.core;
        let mut inner = core.inner.lock().await;
        match inner.state {
            RecordingState::Recording | RecordingState::Paused => core.finalize(&mut inner).await,
            // The cap's auto-stop can land between a caller's state check
            // and its stop call; the take is finished either way.
            RecordingState::Stopped => match inner.take.clone() {
                Some(take) => Ok(take),
                None => Err(EngineError::invalid("stop", inner.state.as_str())),
            },
            state => Err(EngineError::invalid("stop", state.as_str())),
        }
    }

    /// Abandon whatever is in progress and return to idle. Releases the
    /// recorder stream without finalizing, discarding any capture. Safe to
    /// call in any state.
    pub async fn cancel(&self) {
        let core = &self.core;
        let mut inner = core.inner.lock().await;

        core.stop_tickers(&mut inner).await;
        inner.meter = None;
        if let Some(handle) = inner.handle.take() {
            handle.dispose().await;
            info!("Recording cancelled, take discarded");
        }
        inner.take = None;
        core.elapsed.store(0, Ordering::SeqCst);
        core.window.lock().await.clear();
        core.set_state(&mut inner, RecordingState::Idle).await;
    }

    pub async fn state(&self) -> RecordingState {
        self.core.inner.lock().await.state
    }

    /// The finished take, once the session has stopped.
    pub async fn take(&self) -> Option<Take> {
        self.core.inner.lock().await.take.clone()
    }

    /// Whole seconds of active recording time so far.
    pub fn elapsed_secs(&self) -> u64 {
        self.core.elapsed.load(Ordering::SeqCst)
    }

    /// Snapshot of the rolling level window, oldest first.
    pub async fn levels(&self) -> Vec<f32> {
        self.core.window.lock().await.snapshot()
    }
}

impl RecordingCore {
    async fn set_state(&self, inner: &mut RecorderInner, next: RecordingState) {
        if inner.state == next {
            return;
        }
        debug!("Recording session: {} -> {}", inner.state, next);
        inner.state = next;
        self.events
            .emit(EngineEvent::StateChanged(SessionPhase::Recording(next)))
            .await;
    }

    async fn stop_tickers(&self, inner: &mut RecorderInner) {
        if let Some(timer) = inner.timer.take() {
            timer.stop().await;
        }
        if let Some(sampler) = inner.sampler.take() {
            sampler.stop().await;
        }
    }

    /// Resolve a failed or denied start. If a cancel already moved the
    /// session out of `RequestingPermission`, the cancel wins and the
    /// failure is not surfaced.
    async fn abort_start(&self, err: EngineError) -> EngineResult<()> {
        let mut inner = self.inner.lock().await;
        if inner.state != RecordingState::RequestingPermission {
            return Ok(());
        }
        let next = match err {
            EngineError::PermissionDenied => RecordingState::PermissionDenied,
            _ => RecordingState::Failed,
        };
        self.set_state(&mut inner, next).await;
        self.events.emit_error(&err).await;
        Err(err)
    }

    /// Hook handed to the duration timer; fires off-task when the cap is
    /// reached. Holds only a weak reference so a live timer task cannot
    /// keep a dropped session alive.
    fn cap_hook(self: &Arc<Self>) -> CapHook {
        let core = Arc::downgrade(self);
        Box::new(move || {
            if let Some(core) = core.upgrade() {
                tokio::spawn(async move { core.auto_stop().await });
            }
        })
    }

    async fn auto_stop(self: Arc<Self>) {
        let mut inner = self.inner.lock().await;
        if inner.state != RecordingState::Recording {
            // a manual stop or cancel won the race
            return;
        }
        info!("Maximum duration reached, stopping automatically");
        // nobody awaits this stop; a failure has already been emitted
        let _ = self.finalize(&mut inner).await;
    }

    async fn finalize(&self, inner: &mut RecorderInner) -> EngineResult<Take> {
        self.set_state(inner, RecordingState::Stopping).await;
        self.stop_tickers(inner).await;
        inner.meter = None;

        let handle = match inner.handle.take() {
            Some(handle) => handle,
            None => {
                let err = EngineError::stop_failed(anyhow::anyhow!("no open recorder stream"));
                self.set_state(inner, RecordingState::Failed).await;
                self.events.emit_error(&err).await;
                return Err(err);
            }
        };

        // A stop that "succeeds" without leaving a file behind is a stop
        // failure; the artifact must be reviewable.
        let finalized = match handle.stop().await {
            Ok(artifact) if !std::path::Path::new(&artifact.uri).exists() => {
                Err(EngineError::stop_failed(anyhow::anyhow!(
                    "recorder reported {} but the file does not exist",
                    artifact.uri
                )))
            }
            Ok(artifact) => Ok(artifact),
            Err(err) => Err(EngineError::stop_failed(err)),
        };

        match finalized {
            Ok(artifact) => {
                let timer_secs = self.elapsed.load(Ordering::SeqCst);
                let duration_secs = match artifact.final_duration_millis {
                    Some(millis) => {
                        debug!("Take duration: {}ms native, {}s timed", millis, timer_secs);
                        millis as f64 / 1000.0
                    }
                    None => timer_secs as f64,
                };
                let take = Take {
                    uri: artifact.uri,
                    duration_secs,
                };
                inner.take = Some(take.clone());
                self.set_state(inner, RecordingState::Stopped).await;
                self.events.emit(EngineEvent::Finished(take.clone())).await;
                info!("Recording stopped: {} ({:.1}s)", take.uri, take.duration_secs);
                Ok(take)
            }
            Err(failed) => {
                warn!("Recording finalize failed, take discarded: {failed}");
                // the stream is gone either way; re-arm for a fresh take
                self.set_state(inner, RecordingState::Idle).await;
                self.events.emit_error(&failed).await;
                Err(failed)
            }
        }
    }
}
