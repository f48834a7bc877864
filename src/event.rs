//! Engine event stream.
//!
//! Sessions report everything observable through a single bounded channel:
//! lifecycle transitions, periodic ticks, terminal errors. The UI layer owns
//! the receiving end and renders from it; nothing in the engine blocks on a
//! slow consumer.

use tokio::sync::mpsc;
use tracing::debug;

use crate::error::{EngineError, ErrorKind};
use crate::session::recording::Take;
use crate::session::SessionPhase;

/// Default capacity of the engine event channel.
pub const EVENT_CAPACITY: usize = 64;

/// Everything a session surfaces to its consumer.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineEvent {
    /// A session moved to a new lifecycle phase.
    StateChanged(SessionPhase),
    /// Elapsed recording time, in whole seconds. One per timer tick.
    Duration(u64),
    /// Snapshot of the rolling input level window, oldest first.
    Levels(Vec<f32>),
    /// Playback progress frame.
    Playback {
        position_secs: f64,
        duration_secs: f64,
        playing: bool,
    },
    /// A take finished recording and is ready for review.
    Finished(Take),
    /// A terminal or operation failure, already reflected in session state.
    Error { kind: ErrorKind, message: String },
}

/// Sending half of the engine event channel.
///
/// Lifecycle events ([`emit`](Self::emit)) wait for capacity so transitions
/// are never lost. Tick events ([`emit_tick`](Self::emit_tick)) are
/// best-effort: a full channel drops the frame rather than stalling a timer
/// task, and the next tick supersedes it anyway.
#[derive(Clone)]
pub struct EventSender {
    tx: mpsc::Sender<EngineEvent>,
}

impl EventSender {
    /// Create a connected sender/receiver pair.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<EngineEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// Deliver a lifecycle event, waiting for channel capacity.
    pub async fn emit(&self, event: EngineEvent) {
        if self.tx.send(event).await.is_err() {
            debug!("event receiver dropped, discarding lifecycle event");
        }
    }

    /// Deliver an error event built from an engine error.
    pub async fn emit_error(&self, err: &EngineError) {
        self.emit(EngineEvent::Error {
            kind: err.kind(),
            message: err.to_string(),
        })
        .await;
    }

    /// Deliver a periodic tick without blocking the ticker task. Returns
    /// `false` once the receiver is gone, so tickers can wind down.
    pub fn emit_tick(&self, event: EngineEvent) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                debug!("event channel full, dropping tick frame");
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }
}
