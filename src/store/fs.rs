//! Filesystem-backed recording library.
//!
//! Layout is one media file plus one JSON sidecar per recording:
//!
//! ```text
//! library/
//!   rec-5f3c…a1.wav
//!   rec-5f3c…a1.json
//! ```
//!
//! The sidecar is the catalog entry; listing reads sidecars only and never
//! touches media files.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{RecordingStore, SavedRecording};
use crate::media;
use crate::session::Take;

pub struct FsRecordingStore {
    library_dir: PathBuf,
}

impl FsRecordingStore {
    pub fn new(library_dir: impl Into<PathBuf>) -> Self {
        Self {
            library_dir: library_dir.into(),
        }
    }

    pub fn library_dir(&self) -> &Path {
        &self.library_dir
    }

    fn read_sidecar(path: &Path) -> Result<SavedRecording> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read sidecar: {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse sidecar: {}", path.display()))
    }
}

#[async_trait::async_trait]
impl RecordingStore for FsRecordingStore {
    async fn save(&self, take: &Take) -> Result<SavedRecording> {
        fs::create_dir_all(&self.library_dir).with_context(|| {
            format!("Failed to create library dir: {}", self.library_dir.display())
        })?;

        let source = Path::new(&take.uri);
        let extension = source
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("m4a");
        let id = format!("rec-{}", Uuid::new_v4());
        let dest = self.library_dir.join(format!("{}.{}", id, extension));

        fs::copy(source, &dest).with_context(|| {
            format!("Failed to copy take {} into library", source.display())
        })?;

        let duration_secs = if take.duration_secs > 0.0 {
            take.duration_secs
        } else {
            match media::probe_duration_secs(&dest) {
                Ok(duration) => duration,
                Err(err) => {
                    warn!("Could not probe saved recording duration: {err:#}");
                    0.0
                }
            }
        };

        let record = SavedRecording {
            id,
            uri: dest.display().to_string(),
            duration_secs,
            saved_at: Utc::now(),
        };

        let sidecar = dest.with_extension("json");
        let body = serde_json::to_string_pretty(&record)
            .context("Failed to serialize recording metadata")?;
        fs::write(&sidecar, body)
            .with_context(|| format!("Failed to write sidecar: {}", sidecar.display()))?;

        debug!("Saved recording {} ({:.1}s)", record.id, record.duration_secs);
        Ok(record)
    }

    async fn list(&self) -> Result<Vec<SavedRecording>> {
        if !self.library_dir.exists() {
            return Ok(Vec::new());
        }

        let entries = fs::read_dir(&self.library_dir).with_context(|| {
            format!("Failed to read library dir: {}", self.library_dir.display())
        })?;

        let mut recordings = Vec::new();
        for entry in entries {
            let path = entry.context("Failed to read library entry")?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match Self::read_sidecar(&path) {
                Ok(record) => recordings.push(record),
                Err(err) => warn!("Skipping unreadable sidecar: {err:#}"),
            }
        }

        recordings.sort_by(|a, b| b.saved_at.cmp(&a.saved_at));
        Ok(recordings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn scratch_take(dir: &Path, millis: u64) -> Take {
        let path = dir.join("scratch-take.wav");
        media::write_tone_wav(&path, millis, 44_100, 1).unwrap();
        Take {
            uri: path.display().to_string(),
            duration_secs: millis as f64 / 1000.0,
        }
    }

    #[tokio::test]
    async fn save_copies_media_and_writes_sidecar() {
        let scratch = TempDir::new().unwrap();
        let library = TempDir::new().unwrap();
        let store = FsRecordingStore::new(library.path());

        let take = scratch_take(scratch.path(), 800);
        let saved = store.save(&take).await.unwrap();

        assert!(Path::new(&saved.uri).exists());
        assert!(saved.uri.ends_with(".wav"));
        assert!((saved.duration_secs - 0.8).abs() < 1e-9);
        assert!(saved.id.starts_with("rec-"));

        let listed = store.list().await.unwrap();
        assert_eq!(listed, vec![saved]);
    }

    #[tokio::test]
    async fn save_without_source_file_fails() {
        let library = TempDir::new().unwrap();
        let store = FsRecordingStore::new(library.path());

        let take = Take {
            uri: library.path().join("never-recorded.wav").display().to_string(),
            duration_secs: 1.0,
        };
        assert!(store.save(&take).await.is_err());
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn list_skips_unreadable_sidecars() {
        let scratch = TempDir::new().unwrap();
        let library = TempDir::new().unwrap();
        let store = FsRecordingStore::new(library.path());

        store.save(&scratch_take(scratch.path(), 300)).await.unwrap();
        fs::write(library.path().join("rec-broken.json"), "{not json").unwrap();

        let listed = store.list().await.unwrap();
        assert_eq!(listed.len(), 1);
    }

    #[tokio::test]
    async fn list_on_missing_library_is_empty() {
        let library = TempDir::new().unwrap();
        let store = FsRecordingStore::new(library.path().join("not-created-yet"));
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn zero_duration_take_is_probed_at_save() {
        let scratch = TempDir::new().unwrap();
        let library = TempDir::new().unwrap();
        let store = FsRecordingStore::new(library.path());

        let mut take = scratch_take(scratch.path(), 1200);
        take.duration_secs = 0.0;
        let saved = store.save(&take).await.unwrap();
        assert!((saved.duration_secs - 1.2).abs() < 0.05);
    }
}
