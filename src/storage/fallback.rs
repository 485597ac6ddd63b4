//! Recovery artifacts for aggregates that could not be read or written.
//!
//! Nothing here retries I/O. The manager only makes sure the bytes that were at
//! stake end up somewhere an operator can find them.

use crate::core::Result;
use crate::tag::file::{encode_compound, encode_region};
use crate::tag::{Compound, Compression, RegionCompound};
use chrono::Utc;
use log::{error, warn};
use std::fs;
use std::path::{Path, PathBuf};

/// In-memory state that failed to persist.
#[derive(Debug, Clone)]
pub enum FallbackTag {
    Region(RegionCompound),
    Compound(Compound),
}

impl FallbackTag {
    pub fn encode(&self, compression: Compression) -> Result<Vec<u8>> {
        match self {
            Self::Region(region) => encode_region(region, compression),
            Self::Compound(compound) => encode_compound(compound, compression),
        }
    }
}

/// Implemented by every owner of a persisted aggregate.
pub trait CorruptedDataFallback {
    /// Stable identifier of the unit, e.g. `r.0.-1_region`.
    fn corrupted_data_id(&self) -> String;

    /// File the unit is backed by.
    fn corrupted_data_file(&self) -> PathBuf;

    /// Snapshot of the in-memory tag the unit was persisting.
    fn corrupted_data_tag(&self) -> FallbackTag;

    fn world_name(&self) -> String;
}

#[derive(Debug, Clone)]
pub struct CorruptedDataManager {
    directory: PathBuf,
    compression: Compression,
}

impl CorruptedDataManager {
    pub fn new(directory: impl Into<PathBuf>, compression: Compression) -> Self {
        Self {
            directory: directory.into(),
            compression,
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Save the unit's in-memory tag after a failed write.
    ///
    /// Returns the artifact path, or `None` if even that could not be written.
    pub fn fallback_operation(&self, source: &dyn CorruptedDataFallback) -> Option<PathBuf> {
        let id = source.corrupted_data_id();
        let result = source
            .corrupted_data_tag()
            .encode(self.compression)
            .and_then(|bytes| {
                let path = self.artifact_path(&source.world_name(), &id, "dat")?;
                fs::write(&path, bytes)?;
                Ok(path)
            });

        match result {
            Ok(path) => {
                warn!(
                    "Unsaved data of {} ({}) preserved in {}",
                    id,
                    source.corrupted_data_file().display(),
                    path.display()
                );
                Some(path)
            }
            Err(e) => {
                error!("Fallback for {} failed, in-memory data kept only: {}", id, e);
                None
            }
        }
    }

    /// Copy an unreadable backing file aside before it can be overwritten.
    pub fn preserve_unreadable(&self, source: &dyn CorruptedDataFallback) -> Option<PathBuf> {
        let id = source.corrupted_data_id();
        let file = source.corrupted_data_file();
        let result = self
            .artifact_path(&source.world_name(), &id, "unreadable")
            .and_then(|path| {
                fs::copy(&file, &path)?;
                Ok(path)
            });

        match result {
            Ok(path) => {
                warn!(
                    "Unreadable file {} copied to {}",
                    file.display(),
                    path.display()
                );
                Some(path)
            }
            Err(e) => {
                error!("Could not preserve unreadable {}: {}", file.display(), e);
                None
            }
        }
    }

    fn artifact_path(&self, world: &str, id: &str, extension: &str) -> Result<PathBuf> {
        let dir = self.directory.join(world);
        fs::create_dir_all(&dir)?;
        let stamp = Utc::now().format("%Y%m%dT%H%M%S%.3f");
        let mut path = dir.join(format!("{}-{}.{}", id, stamp, extension));
        let mut n = 1;
        while path.exists() {
            path = dir.join(format!("{}-{}-{}.{}", id, stamp, n, extension));
            n += 1;
        }
        Ok(path)
    }
}
