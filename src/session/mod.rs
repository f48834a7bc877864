//! Session state machines for capture and review.
//!
//! This module provides the building blocks of the take lifecycle:
//! - `RecordingSession` for permissioned capture with pause and auto-stop
//! - `PlaybackSession` for reviewing a finished take
//! - `SessionController` tying both to a store as one record-review-save flow
//! - the `DurationTimer` and `LevelSampler` ticker tasks they run

pub mod controller;
pub mod levels;
pub mod playback;
pub mod recording;
pub mod timer;

use serde::Serialize;

pub use controller::SessionController;
pub use levels::{LevelSampler, LevelWindow, DEFAULT_LEVEL_WINDOW, LEVEL_TICK};
pub use playback::{PlaybackSession, PlaybackState};
pub use recording::{RecordingSession, RecordingState, Take};
pub use timer::{DurationTimer, DURATION_TICK};

/// Where the overall take workflow currently stands.
///
/// Recording and reviewing phases carry the fine-grained state of the
/// session that owns them; the remaining phases belong to the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// No take captured yet.
    New,
    Recording(RecordingState),
    Reviewing(PlaybackState),
    /// The take is persisted in the library.
    Saved,
    /// The workflow was abandoned and all resources released.
    Cancelled,
}

impl SessionPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionPhase::New => "new",
            SessionPhase::Recording(_) => "recording",
            SessionPhase::Reviewing(_) => "reviewing",
            SessionPhase::Saved => "saved",
            SessionPhase::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionPhase::Recording(state) => write!(f, "recording:{}", state),
            SessionPhase::Reviewing(state) => write!(f, "reviewing:{}", state),
            phase => f.write_str(phase.as_str()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_display_includes_inner_state() {
        assert_eq!(SessionPhase::New.to_string(), "new");
        assert_eq!(
            SessionPhase::Recording(RecordingState::Paused).to_string(),
            "recording:paused"
        );
        assert_eq!(
            SessionPhase::Reviewing(PlaybackState::Playing).to_string(),
            "reviewing:playing"
        );
    }

    #[test]
    fn phase_serializes_with_inner_state() {
        let json =
            serde_json::to_string(&SessionPhase::Recording(RecordingState::Recording)).unwrap();
        assert_eq!(json, "{\"recording\":\"recording\"}");

        let json = serde_json::to_string(&SessionPhase::Saved).unwrap();
        assert_eq!(json, "\"saved\"");
    }
}
