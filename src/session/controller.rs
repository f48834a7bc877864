//! One take, end to end.
//!
//! The controller owns a recording session, a playback session, and a
//! store, and walks a single take through record, review, and save. The
//! sessions validate their own transitions; the controller adds the
//! workflow-level rules: which phase each operation belongs to, when the
//! scratch file is deleted, and when the workflow is finished.
//!
//! Scratch files are the controller's to clean up: a take's capture lives
//! in scratch space until `save` copies it into the library, and `save`,
//! `cancel`, and `reset` all remove it once it can no longer be needed.

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use super::playback::{PlaybackSession, PlaybackState};
use super::recording::{RecordingSession, Take};
use super::SessionPhase;
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::event::{EngineEvent, EventSender, EVENT_CAPACITY};
use crate::port::AudioPort;
use crate::store::{RecordingStore, SavedRecording};

/// Coarse workflow position. The fine-grained state lives in the sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    New,
    Recording,
    Reviewing,
    Saved,
    Cancelled,
}

impl Flow {
    fn as_str(&self) -> &'static str {
        match self {
            Flow::New => "new",
            Flow::Recording => "recording",
            Flow::Reviewing => "reviewing",
            Flow::Saved => "saved",
            Flow::Cancelled => "cancelled",
        }
    }
}

struct FlowInner {
    flow: Flow,
    take: Option<Take>,
    last_saved: Option<SavedRecording>,
}

pub struct SessionController {
    recording: RecordingSession,
    playback: PlaybackSession,
    store: Arc<dyn RecordingStore>,
    events: EventSender,
    flow: Mutex<FlowInner>,
}

impl SessionController {
    /// Build a controller over a port and store, returning the event
    /// stream alongside it. The receiver carries every state change, tick
    /// frame, and error from both sessions and the controller itself.
    pub fn new(
        port: Arc<dyn AudioPort>,
        store: Arc<dyn RecordingStore>,
        config: &EngineConfig,
    ) -> (Self, mpsc::Receiver<EngineEvent>) {
        let (events, receiver) = EventSender::channel(EVENT_CAPACITY);
        let recording = RecordingSession::new(
            port.clone(),
            events.clone(),
            config.max_duration(),
            config.level_window,
        );
        let playback = PlaybackSession::new(port, events.clone());
        let controller = Self {
            recording,
            playback,
            store,
            events,
            flow: Mutex::new(FlowInner {
                flow: Flow::New,
                take: None,
                last_saved: None,
            }),
        };
        (controller, receiver)
    }

    /// Start capturing a take. Valid on a new workflow, and again after a
    /// denial or failure left the recording session re-armed.
    pub async fn record(&self) -> EngineResult<()> {
        {
            let mut inner = self.flow.lock().await;
            match inner.flow {
                Flow::New | Flow::Recording => inner.flow = Flow::Recording,
                flow => return Err(EngineError::invalid("record", flow.as_str())),
            }
        }
        self.recording.start().await
    }

    pub async fn pause_recording(&self) -> EngineResult<()> {
        self.recording.pause().await
    }

    pub async fn resume_recording(&self) -> EngineResult<()> {
        self.recording.resume().await
    }

    /// Finalize the take and load it for review. A take that finalizes but
    /// fails to load stays reviewable in the sense that it can still be
    /// saved; the load failure is reported on the event stream.
    ///
    /// When the duration cap already stopped the session, the session hands
    /// over the finished take instead of stopping again.
    pub async fn stop_recording(&self) -> EngineResult<Take> {
        {
            let inner = self.flow.lock().await;
            if inner.flow != Flow::Recording {
                return Err(EngineError::invalid("stop", inner.flow.as_str()));
            }
        }

        let take = self.recording.stop().await?;
        {
            let mut inner = self.flow.lock().await;
            inner.take = Some(take.clone());
            inner.flow = Flow::Reviewing;
        }
        if let Err(err) = self.playback.load(&take.uri).await {
            warn!("Captured take could not be loaded for review: {err}");
        }
        Ok(take)
    }

    /// (Re)load the captured take into the player, for retrying a failed
    /// review load.
    pub async fn review(&self) -> EngineResult<()> {
        let take = {
            let inner = self.flow.lock().await;
            match (&inner.take, inner.flow) {
                (Some(take), Flow::Reviewing) => take.clone(),
                _ => return Err(EngineError::invalid("review", inner.flow.as_str())),
            }
        };
        self.playback.load(&take.uri).await
    }

    pub async fn play(&self) -> EngineResult<()> {
        self.playback.play().await
    }

    pub async fn pause_playback(&self) -> EngineResult<()> {
        self.playback.pause().await
    }

    pub async fn seek(&self, position_secs: f64) -> EngineResult<()> {
        self.playback.seek(position_secs).await
    }

    /// Commit the reviewed take to the library. On success the player is
    /// released and the scratch file removed; on failure the review stays
    /// intact so the user can retry or discard.
    pub async fn save(&self) -> EngineResult<SavedRecording> {
        let take = {
            let inner = self.flow.lock().await;
            match (&inner.take, inner.flow) {
                (Some(take), Flow::Reviewing) => take.clone(),
                _ => return Err(EngineError::invalid("save", inner.flow.as_str())),
            }
        };

        if self.playback.state().await == PlaybackState::Playing {
            let _ = self.playback.pause().await;
        }

        match self.store.save(&take).await {
            Ok(saved) => {
                self.playback.unload().await;
                discard_scratch(&take);
                let mut inner = self.flow.lock().await;
                inner.take = None;
                inner.last_saved = Some(saved.clone());
                inner.flow = Flow::Saved;
                self.events
                    .emit(EngineEvent::StateChanged(SessionPhase::Saved))
                    .await;
                info!("Take saved to library: {}", saved.id);
                Ok(saved)
            }
            Err(err) => {
                let failed = EngineError::save_failed(err);
                self.events.emit_error(&failed).await;
                Err(failed)
            }
        }
    }

    /// Abandon the workflow: stop and release whatever is active, delete
    /// the scratch take, and settle in `Cancelled`. A no-op once the take
    /// is saved, and safe to call repeatedly.
    pub async fn cancel(&self) {
        {
            let inner = self.flow.lock().await;
            if inner.flow == Flow::Saved {
                return;
            }
        }

        self.recording.cancel().await;
        self.playback.unload().await;

        let mut inner = self.flow.lock().await;
        if let Some(take) = inner.take.take() {
            discard_scratch(&take);
        }
        if inner.flow != Flow::Cancelled {
            inner.flow = Flow::Cancelled;
            self.events
                .emit(EngineEvent::StateChanged(SessionPhase::Cancelled))
                .await;
            info!("Session cancelled");
        }
    }

    /// Arm the controller for another take. Discards an unsaved review.
    /// Not valid while recording; stop or cancel first.
    pub async fn reset(&self) -> EngineResult<()> {
        {
            let inner = self.flow.lock().await;
            if inner.flow == Flow::Recording {
                return Err(EngineError::invalid("reset", inner.flow.as_str()));
            }
        }

        self.playback.unload().await;
        self.recording.cancel().await;

        let mut inner = self.flow.lock().await;
        if let Some(take) = inner.take.take() {
            discard_scratch(&take);
        }
        inner.last_saved = None;
        if inner.flow != Flow::New {
            inner.flow = Flow::New;
            self.events
                .emit(EngineEvent::StateChanged(SessionPhase::New))
                .await;
        }
        Ok(())
    }

    pub async fn phase(&self) -> SessionPhase {
        let flow = self.flow.lock().await.flow;
        match flow {
            Flow::New => SessionPhase::New,
            Flow::Recording => SessionPhase::Recording(self.recording.state().await),
            Flow::Reviewing => SessionPhase::Reviewing(self.playback.state().await),
            Flow::Saved => SessionPhase::Saved,
            Flow::Cancelled => SessionPhase::Cancelled,
        }
    }

    /// The captured, not-yet-saved take.
    pub async fn take(&self) -> Option<Take> {
        self.flow.lock().await.take.clone()
    }

    /// The library entry from the most recent save.
    pub async fn last_saved(&self) -> Option<SavedRecording> {
        self.flow.lock().await.last_saved.clone()
    }

    /// Whole seconds of active recording time.
    pub fn elapsed_secs(&self) -> u64 {
        self.recording.elapsed_secs()
    }

    /// Snapshot of the rolling input level window.
    pub async fn levels(&self) -> Vec<f32> {
        self.recording.levels().await
    }

    pub async fn position_secs(&self) -> f64 {
        self.playback.position_secs().await
    }

    pub async fn duration_secs(&self) -> f64 {
        self.playback.duration_secs().await
    }

    /// Everything in the library, newest first.
    pub async fn saved_recordings(&self) -> anyhow::Result<Vec<SavedRecording>> {
        self.store.list().await
    }
}

/// Remove a scratch capture that is no longer needed. Absence is normal
/// (a failed finalize never produced the file).
fn discard_scratch(take: &Take) {
    match std::fs::remove_file(&take.uri) {
        Ok(()) => debug!("Removed scratch take: {}", take.uri),
        Err(err) => debug!("Scratch take not removed ({}): {}", take.uri, err),
    }
}
