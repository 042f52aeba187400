//! Durable local storage for events that could not be delivered.
//!
//! Layout under the root directory:
//!
//! ```text
//! images/vehicle_{track}_{YYYYmmdd_HHMMSS}.jpg
//! data/vehicle_{track}_{YYYYmmdd_HHMMSS}.json
//! ```
//!
//! Files are written to a `.tmp` sibling, synced and renamed into place, so
//! an interrupted write never leaves a partial file under its final name.
//! The image is committed before the JSON, so every JSON file has its image.

use std::path::{Path, PathBuf};

use lanewatch_models::TrafficEvent;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::error::{DeliveryError, DeliveryResult};

const IMAGES_DIR: &str = "images";
const DATA_DIR: &str = "data";
const TMP_SUFFIX: &str = "tmp";

/// Paths of one stored event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackRecord {
    pub stem: String,
    pub image_path: PathBuf,
    pub data_path: PathBuf,
}

/// Local fallback storage rooted at a directory.
#[derive(Debug, Clone)]
pub struct FallbackStore {
    root: PathBuf,
}

impl FallbackStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn images_dir(&self) -> PathBuf {
        self.root.join(IMAGES_DIR)
    }

    pub fn data_dir(&self) -> PathBuf {
        self.root.join(DATA_DIR)
    }

    fn record_for(&self, stem: &str) -> FallbackRecord {
        FallbackRecord {
            stem: stem.to_string(),
            image_path: self.images_dir().join(format!("{stem}.jpg")),
            data_path: self.data_dir().join(format!("{stem}.json")),
        }
    }

    /// Create both storage directories.
    pub async fn ensure_dirs(&self) -> DeliveryResult<()> {
        fs::create_dir_all(self.images_dir()).await?;
        fs::create_dir_all(self.data_dir()).await?;
        Ok(())
    }

    /// Store an event and its JPEG snapshot.
    pub async fn persist(&self, event: &TrafficEvent, jpeg: &[u8]) -> DeliveryResult<FallbackRecord> {
        self.ensure_dirs().await?;

        let record = self.free_record(&event.file_stem()).await?;
        let json = serde_json::to_vec_pretty(event)?;

        write_atomic(&record.image_path, jpeg).await?;
        write_atomic(&record.data_path, &json).await?;

        debug!(
            track_id = %event.track_id,
            "Stored event locally at {}",
            record.data_path.display()
        );
        Ok(record)
    }

    /// First record name derived from `base` that is not taken yet.
    async fn free_record(&self, base: &str) -> DeliveryResult<FallbackRecord> {
        let mut suffix = 0u32;
        loop {
            let stem = if suffix == 0 {
                base.to_string()
            } else {
                format!("{base}_{suffix}")
            };
            let record = self.record_for(&stem);

            if !fs::try_exists(&record.image_path).await? && !fs::try_exists(&record.data_path).await? {
                return Ok(record);
            }
            suffix += 1;
        }
    }

    /// All complete records (JSON and image both present), sorted by name.
    pub async fn list(&self) -> DeliveryResult<Vec<FallbackRecord>> {
        let data_dir = self.data_dir();
        if !fs::try_exists(&data_dir).await? {
            return Ok(Vec::new());
        }

        let mut records = Vec::new();
        let mut entries = fs::read_dir(&data_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };

            let record = self.record_for(stem);
            if fs::try_exists(&record.image_path).await? {
                records.push(record);
            } else {
                warn!("Fallback data without image, skipping: {}", path.display());
            }
        }

        records.sort_by(|a, b| a.stem.cmp(&b.stem));
        Ok(records)
    }

    /// Read a stored record back.
    pub async fn load(&self, record: &FallbackRecord) -> DeliveryResult<(TrafficEvent, Vec<u8>)> {
        let json = fs::read(&record.data_path).await?;
        let event: TrafficEvent = serde_json::from_slice(&json)
            .map_err(|e| DeliveryError::InvalidRecord(format!("{}: {}", record.stem, e)))?;
        let jpeg = fs::read(&record.image_path).await?;
        Ok((event, jpeg))
    }

    /// Delete a stored record. The JSON goes first so a partial removal never
    /// leaves a JSON file without its image.
    pub async fn remove(&self, record: &FallbackRecord) -> DeliveryResult<()> {
        fs::remove_file(&record.data_path).await?;
        fs::remove_file(&record.image_path).await?;
        Ok(())
    }
}

/// Write `bytes` to `path` via a synced temp file and a rename.
async fn write_atomic(path: &Path, bytes: &[u8]) -> DeliveryResult<()> {
    let tmp = tmp_path(path);

    let result = async {
        let mut file = fs::File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.sync_all().await?;
        drop(file);
        fs::rename(&tmp, path).await
    }
    .await;

    if let Err(e) = result {
        // Best effort cleanup of the partial temp file
        let _ = fs::remove_file(&tmp).await;
        return Err(DeliveryError::Io(e));
    }
    Ok(())
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".");
    name.push(TMP_SUFFIX);
    path.with_file_name(name)
}
