//! Persistence for saved recordings.
//!
//! A take lives in scratch space until it is saved; the store moves it
//! into the durable library and owns its metadata from then on.

pub mod fs;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::session::Take;

pub use fs::FsRecordingStore;

/// A recording that has been committed to the library.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedRecording {
    /// Stable identifier, assigned at save time
    pub id: String,
    /// Location of the stored media file
    pub uri: String,
    /// Recorded length in seconds
    pub duration_secs: f64,
    /// When the recording was saved
    pub saved_at: DateTime<Utc>,
}

/// Where finished takes are persisted.
#[async_trait::async_trait]
pub trait RecordingStore: Send + Sync {
    /// Copy a take into the library and return its catalog entry.
    async fn save(&self, take: &Take) -> Result<SavedRecording>;

    /// All saved recordings, newest first.
    async fn list(&self) -> Result<Vec<SavedRecording>>;
}
