pub mod config;
pub mod error;
pub mod event;
pub mod media;
pub mod port;
pub mod session;
pub mod store;

pub use config::EngineConfig;
pub use error::{EngineError, EngineResult, ErrorKind};
pub use event::{EngineEvent, EventSender, EVENT_CAPACITY};
pub use port::{
    AudioPort, CaptureConfig, OpenPlayback, OpenRecording, Permission, PlaybackStatus,
    PlayerHandle, RecorderHandle, RecordingArtifact, SimulatedAudioPort, SimulatedPortStats,
};
pub use session::{
    PlaybackSession, PlaybackState, RecordingSession, RecordingState, SessionController,
    SessionPhase, Take,
};
pub use store::{FsRecordingStore, RecordingStore, SavedRecording};
