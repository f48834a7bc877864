//! Typed engine errors.
//!
//! Every failure a session can surface carries a stable [`ErrorKind`] so
//! the UI layer can branch on category without parsing messages. The
//! messages themselves flatten the underlying cause chain, which is enough
//! for logs and error toasts.

use serde::Serialize;

/// Stable failure categories surfaced alongside error events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    PermissionDenied,
    HandleOpenFailed,
    StopFailed,
    PlaybackLoadFailed,
    SaveFailed,
    InvalidTransition,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::PermissionDenied => "permission_denied",
            ErrorKind::HandleOpenFailed => "handle_open_failed",
            ErrorKind::StopFailed => "stop_failed",
            ErrorKind::PlaybackLoadFailed => "playback_load_failed",
            ErrorKind::SaveFailed => "save_failed",
            ErrorKind::InvalidTransition => "invalid_transition",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failures surfaced by sessions, either as return values or error events.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("microphone permission denied")]
    PermissionDenied,

    #[error("failed to open recorder: {0}")]
    HandleOpenFailed(String),

    #[error("failed to finalize recording: {0}")]
    StopFailed(String),

    #[error("failed to load recording for playback: {0}")]
    PlaybackLoadFailed(String),

    #[error("failed to save recording: {0}")]
    SaveFailed(String),

    #[error("{op} is not valid while {state}")]
    InvalidTransition { op: &'static str, state: String },
}

impl EngineError {
    pub(crate) fn handle_open(err: anyhow::Error) -> Self {
        EngineError::HandleOpenFailed(format!("{err:#}"))
    }

    pub(crate) fn stop_failed(err: anyhow::Error) -> Self {
        EngineError::StopFailed(format!("{err:#}"))
    }

    pub(crate) fn playback_load(err: anyhow::Error) -> Self {
        EngineError::PlaybackLoadFailed(format!("{err:#}"))
    }

    pub(crate) fn save_failed(err: anyhow::Error) -> Self {
        EngineError::SaveFailed(format!("{err:#}"))
    }

    pub(crate) fn invalid(op: &'static str, state: impl Into<String>) -> Self {
        EngineError::InvalidTransition {
            op,
            state: state.into(),
        }
    }

    /// Category of this error, stable across message changes.
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::PermissionDenied => ErrorKind::PermissionDenied,
            EngineError::HandleOpenFailed(_) => ErrorKind::HandleOpenFailed,
            EngineError::StopFailed(_) => ErrorKind::StopFailed,
            EngineError::PlaybackLoadFailed(_) => ErrorKind::PlaybackLoadFailed,
            EngineError::SaveFailed(_) => ErrorKind::SaveFailed,
            EngineError::InvalidTransition { .. } => ErrorKind::InvalidTransition,
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_matches_variant() {
        assert_eq!(EngineError::PermissionDenied.kind(), ErrorKind::PermissionDenied);
        assert_eq!(
            EngineError::stop_failed(anyhow::anyhow!("encoder gone")).kind(),
            ErrorKind::StopFailed
        );
        assert_eq!(
            EngineError::invalid("pause", "idle").kind(),
            ErrorKind::InvalidTransition
        );
    }

    #[test]
    fn invalid_transition_names_op_and_state() {
        let err = EngineError::invalid("pause", "idle");
        assert_eq!(err.to_string(), "pause is not valid while idle");
    }

    #[test]
    fn constructor_flattens_cause_chain() {
        let cause = anyhow::anyhow!("disk full");
        let err = EngineError::save_failed(cause.context("copying take"));
        assert!(err.to_string().contains("copying take"));
        assert!(err.to_string().contains("disk full"));
    }

    #[test]
    fn kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::PlaybackLoadFailed).unwrap();
        assert_eq!(json, "\"playback_load_failed\"");
    }
}
