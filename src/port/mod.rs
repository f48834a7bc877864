//! Hardware audio port: the capability boundary the engine records and
//! plays through.
//!
//! The engine never talks to microphones or speakers directly; it consumes
//! these traits. An adapter wires them to a real platform backend, while
//! [`simulated::SimulatedAudioPort`] provides a deterministic local
//! implementation for tests and the CLI demo.
//!
//! Status flows from a handle to its session as channel messages rather
//! than polled state: a recorder publishes its input meter on a `watch`
//! channel, a player pushes [`PlaybackStatus`] updates on an `mpsc` channel
//! at its own native cadence.

pub mod simulated;

use anyhow::Result;
use tokio::sync::{mpsc, watch};

pub use simulated::{SimulatedAudioPort, SimulatedPortStats};

/// Outcome of a microphone permission request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    Granted,
    Denied,
}

impl Permission {
    pub fn is_granted(&self) -> bool {
        matches!(self, Permission::Granted)
    }
}

/// Capture parameters handed to [`AudioPort::open_recording`].
///
/// These are the engine's fixed defaults, not user-facing settings. The
/// container names the preferred file extension; an adapter may substitute
/// its platform equivalent (the simulated port writes `.wav`).
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
    /// Encoder bit rate in bits per second
    pub bit_rate: u32,
    /// Preferred container extension, without the dot
    pub container: String,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            channels: 2,
            bit_rate: 128_000,
            container: "m4a".to_string(),
        }
    }
}

/// What a recorder handle yields when it finalizes.
#[derive(Debug, Clone)]
pub struct RecordingArtifact {
    /// URI of the finished file
    pub uri: String,
    /// Duration as measured by the hardware, if it reports one
    pub final_duration_millis: Option<u64>,
}

/// One status update from a playback handle.
///
/// Mirrors the callback payload of the original hardware API. `did_just_finish`
/// is reported exactly once per pass, after which the handle has rewound to
/// the start and stopped.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackStatus {
    pub is_loaded: bool,
    pub is_playing: bool,
    pub position_millis: u64,
    pub duration_millis: u64,
    pub did_just_finish: bool,
}

/// An opened recording stream: the exclusive handle plus its live input
/// meter. The meter receiver stays valid after the handle is gone (it keeps
/// returning the last value), so sampler tasks never need the handle itself.
pub struct OpenRecording {
    pub handle: Box<dyn RecorderHandle>,
    pub meter: watch::Receiver<f32>,
}

/// An opened playback stream: the exclusive handle, its status channel, and
/// the initial status (carrying the source duration) captured at open time.
pub struct OpenPlayback {
    pub handle: Box<dyn PlayerHandle>,
    pub status: mpsc::Receiver<PlaybackStatus>,
    pub initial: PlaybackStatus,
}

/// Entry point into the platform audio capability.
///
/// All three operations are suspending calls: they resolve when the
/// platform has finished the request, and they are the only place the
/// engine waits on hardware.
#[async_trait::async_trait]
pub trait AudioPort: Send + Sync {
    /// Ask the platform for microphone access.
    ///
    /// Denial is a normal outcome, not an `Err`; errors mean the request
    /// itself could not be made.
    async fn request_permission(&self) -> Result<Permission>;

    /// Open an exclusive recording stream with the given capture settings.
    async fn open_recording(&self, config: &CaptureConfig) -> Result<OpenRecording>;

    /// Open an exclusive playback stream for a previously recorded URI.
    async fn open_playback(&self, uri: &str) -> Result<OpenPlayback>;
}

/// An open microphone stream, exclusively owned by one recording session.
///
/// Native pause support is part of this contract: an adapter for hardware
/// that can only stop/restart must emulate pause internally (for example by
/// concatenating segments at finalize), so the session always holds exactly
/// one handle per take.
#[async_trait::async_trait]
pub trait RecorderHandle: Send {
    /// Suspend capture without releasing the stream.
    async fn pause(&mut self) -> Result<()>;

    /// Resume a paused stream.
    async fn resume(&mut self) -> Result<()>;

    /// Finalize the recording and release the stream, yielding the file URI.
    async fn stop(self: Box<Self>) -> Result<RecordingArtifact>;

    /// Release the stream and discard anything captured. Must not fail.
    async fn dispose(self: Box<Self>);
}

/// An open playback stream, exclusively owned by one playback session.
#[async_trait::async_trait]
pub trait PlayerHandle: Send {
    /// Start or continue playing from the current position.
    async fn play(&mut self) -> Result<()>;

    /// Pause at the current position.
    async fn pause(&mut self) -> Result<()>;

    /// Jump to a position. Values past the end clamp to the end.
    async fn seek(&mut self, position_millis: u64) -> Result<()>;

    /// Release the stream. Must not fail.
    async fn dispose(self: Box<Self>);
}
