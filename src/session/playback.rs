//! Playback session lifecycle.
//!
//! Wraps one player stream at a time. Position and duration are driven by
//! the port's status frames, consumed by a per-load status task; session
//! state stays authoritative for whether playback is nominally running.
//! Natural completion rewinds to the start and returns the session to
//! `Loaded`, ready for another pass.

use std::sync::{Arc, Weak};

use serde::Serialize;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::SessionPhase;
use crate::error::{EngineError, EngineResult};
use crate::event::{EngineEvent, EventSender};
use crate::port::{AudioPort, PlaybackStatus, PlayerHandle};

/// Lifecycle states of a playback session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackState {
    Unloaded,
    Loading,
    Loaded,
    Playing,
    Failed,
}

impl PlaybackState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlaybackState::Unloaded => "unloaded",
            PlaybackState::Loading => "loading",
            PlaybackState::Loaded => "loaded",
            PlaybackState::Playing => "playing",
            PlaybackState::Failed => "failed",
        }
    }

    /// True while the session owns a player stream.
    pub fn is_loaded(&self) -> bool {
        matches!(self, PlaybackState::Loaded | PlaybackState::Playing)
    }
}

impl std::fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

pub struct PlaybackSession {
    core: Arc<PlaybackCore>,
}

struct PlaybackCore {
    port: Arc<dyn AudioPort>,
    events: EventSender,
    inner: Mutex<PlayerInner>,
}

struct PlayerInner {
    state: PlaybackState,
    handle: Option<Box<dyn PlayerHandle>>,
    status_task: Option<JoinHandle<()>>,
    position_secs: f64,
    duration_secs: f64,
    // Bumped on every load and unload; status tasks from earlier loads
    // see the mismatch and exit instead of touching fresh state.
    generation: u64,
}

impl PlaybackSession {
    pub fn new(port: Arc<dyn AudioPort>, events: EventSender) -> Self {
        Self {
            core: Arc::new(PlaybackCore {
                port,
                events,
                inner: Mutex::new(PlayerInner {
                    state: PlaybackState::Unloaded,
                    handle: None,
                    status_task: None,
                    position_secs: 0.0,
                    duration_secs: 0.0,
                    generation: 0,
                }),
            }),
        }
    }

    /// Open a player stream for `uri`, resting at position zero, paused.
    ///
    /// Valid when unloaded or failed; a previous load must be released
    /// through [`unload`](Self::unload) first. An unload that lands while
    /// the stream is opening wins, and this call resolves without effect.
    pub async fn load(&self, uri: &str) -> EngineResult<()> {
        let core = &self.core;
        {
            let mut inner = core.inner.lock().await;
            match inner.state {
                PlaybackState::Unloaded | PlaybackState::Failed => {}
                state => return Err(EngineError::invalid("load", state.as_str())),
            }
            core.set_state(&mut inner, PlaybackState::Loading).await;
        }

        let opened = match core.port.open_playback(uri).await {
            Ok(opened) => opened,
            Err(err) => {
                let failed = EngineError::playback_load(err);
                let mut inner = core.inner.lock().await;
                if inner.state != PlaybackState::Loading {
                    return Ok(());
                }
                core.set_state(&mut inner, PlaybackState::Failed).await;
                core.events.emit_error(&failed).await;
                return Err(failed);
            }
        };

        let mut inner = core.inner.lock().await;
        if inner.state != PlaybackState::Loading {
            drop(inner);
            // unloaded while the stream was opening
            opened.handle.dispose().await;
            return Ok(());
        }

        inner.generation += 1;
        inner.handle = Some(opened.handle);
        inner.position_secs = 0.0;
        inner.duration_secs = opened.initial.duration_millis as f64 / 1000.0;
        inner.status_task = Some(spawn_status(
            Arc::downgrade(core),
            opened.status,
            inner.generation,
        ));
        core.set_state(&mut inner, PlaybackState::Loaded).await;
        let duration_secs = inner.duration_secs;
        drop(inner);

        core.events.emit_tick(EngineEvent::Playback {
            position_secs: 0.0,
            duration_secs,
            playing: false,
        });
        info!("Loaded for review: {} ({:.1}s)", uri, duration_secs);
        Ok(())
    }

    /// Start or continue playing from the current position. No-op when
    /// already playing.
    pub async fn play(&self) -> EngineResult<()> {
        let core = &self.core;
        let mut inner = core.inner.lock().await;
        match inner.state {
            PlaybackState::Playing => return Ok(()),
            PlaybackState::Loaded => {}
            state => return Err(EngineError::invalid("play", state.as_str())),
        }
        if let Some(handle) = inner.handle.as_mut() {
            if let Err(err) = handle.play().await {
                warn!("Player start failed: {err:#}");
            }
        }
        core.set_state(&mut inner, PlaybackState::Playing).await;
        Ok(())
    }

    /// Pause at the current position. No-op when already paused.
    pub async fn pause(&self) -> EngineResult<()> {
        let core = &self.core;
        let mut inner = core.inner.lock().await;
        match inner.state {
            PlaybackState::Loaded => return Ok(()),
            PlaybackState::Playing => {}
            state => return Err(EngineError::invalid("pause", state.as_str())),
        }
        if let Some(handle) = inner.handle.as_mut() {
            if let Err(err) = handle.pause().await {
                warn!("Player pause failed: {err:#}");
            }
        }
        core.set_state(&mut inner, PlaybackState::Loaded).await;
        Ok(())
    }

    /// Jump to a position in seconds. Positions past the end clamp to the
    /// end of the take.
    pub async fn seek(&self, position_secs: f64) -> EngineResult<()> {
        let core = &self.core;
        let mut inner = core.inner.lock().await;
        if !inner.state.is_loaded() {
            return Err(EngineError::invalid("seek", inner.state.as_str()));
        }
        let target = position_secs.clamp(0.0, inner.duration_secs);
        if let Some(handle) = inner.handle.as_mut() {
            if let Err(err) = handle.seek((target * 1000.0) as u64).await {
                warn!("Player seek failed: {err:#}");
            }
        }
        inner.position_secs = target;
        Ok(())
    }

    /// Release the player stream and reset position. Safe in any state;
    /// never fails.
    pub async fn unload(&self) {
        let core = &self.core;
        let (handle, task) = {
            let mut inner = core.inner.lock().await;
            inner.generation += 1;
            inner.position_secs = 0.0;
            inner.duration_secs = 0.0;
            let released = (inner.handle.take(), inner.status_task.take());
            core.set_state(&mut inner, PlaybackState::Unloaded).await;
            released
        };

        // Dispose outside the lock: the status task may be waiting on it
        // and has to observe the generation bump before it can exit.
        if let Some(handle) = handle {
            handle.dispose().await;
            debug!("Player stream released");
        }
        if let Some(task) = task {
            let _ = task.await;
        }
    }

    pub async fn state(&self) -> PlaybackState {
        self.core.inner.lock().await.state
    }

    /// Current playhead position in seconds.
    pub async fn position_secs(&self) -> f64 {
        self.core.inner.lock().await.position_secs
    }

    /// Duration of the loaded take in seconds, `0.0` when unloaded.
    pub async fn duration_secs(&self) -> f64 {
        self.core.inner.lock().await.duration_secs
    }
}

impl PlaybackCore {
    async fn set_state(&self, inner: &mut PlayerInner, next: PlaybackState) {
        if inner.state == next {
            return;
        }
        debug!("Playback session: {} -> {}", inner.state, next);
        inner.state = next;
        self.events
            .emit(EngineEvent::StateChanged(SessionPhase::Reviewing(next)))
            .await;
    }
}

/// Consumes one load's status frames: tracks position, mirrors progress as
/// playback frames, and handles natural completion. Exits when the port
/// closes the channel, the session moves on to another generation, or the
/// session itself is gone.
fn spawn_status(
    core: Weak<PlaybackCore>,
    mut status: mpsc::Receiver<PlaybackStatus>,
    generation: u64,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(frame) = status.recv().await {
            let core = match core.upgrade() {
                Some(core) => core,
                None => break,
            };
            let mut inner = core.inner.lock().await;
            if inner.generation != generation {
                break;
            }
            if frame.duration_millis > 0 {
                inner.duration_secs = frame.duration_millis as f64 / 1000.0;
            }
            let duration_secs = inner.duration_secs;

            if frame.did_just_finish {
                inner.position_secs = 0.0;
                core.set_state(&mut inner, PlaybackState::Loaded).await;
                drop(inner);
                core.events.emit_tick(EngineEvent::Playback {
                    position_secs: 0.0,
                    duration_secs,
                    playing: false,
                });
                info!("Playback reached the end, rewound to start");
            } else {
                inner.position_secs = frame.position_millis as f64 / 1000.0;
                let event = EngineEvent::Playback {
                    position_secs: inner.position_secs,
                    duration_secs,
                    playing: inner.state == PlaybackState::Playing,
                };
                drop(inner);
                core.events.emit_tick(event);
            }
        }
    })
}
