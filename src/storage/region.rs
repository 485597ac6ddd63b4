use super::chunk::ChunkRegister;
use super::fallback::{CorruptedDataFallback, FallbackTag};
use super::host::ChunkHost;
use super::world::WorldContext;
use crate::core::{BlockKey, ChunkKey, EntityKey, RegionKey};
use crate::tag::file;
use crate::tag::{Compound, RegionCompound};
use dashmap::DashMap;
use log::{debug, error};
use parking_lot::{ReentrantMutex, RwLock};
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Result of a region write-back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The aggregate was encoded to its file.
    Written,
    /// The aggregate was empty and the file was removed.
    Deleted,
    /// The aggregate was empty and no file existed.
    Unchanged,
    /// I/O failed; the fallback manager was invoked.
    Failed,
}

/// One region: its file, its lazily loaded aggregate and its active chunks.
pub struct RegionRegister {
    key: RegionKey,
    path: PathBuf,
    tag: Arc<RwLock<RegionCompound>>,
    chunks: DashMap<ChunkKey, Arc<ChunkRegister>>,
    loading: ReentrantMutex<()>,
    world: Arc<WorldContext>,
}

impl RegionRegister {
    /// Load the region's file if present.
    ///
    /// An unreadable file is logged and copied aside; the region then starts empty.
    pub(crate) fn new(key: RegionKey, world: Arc<WorldContext>) -> Self {
        let path = world.config.region_path(key);
        let region = Self {
            key,
            path,
            tag: Arc::new(RwLock::new(RegionCompound::new())),
            chunks: DashMap::new(),
            loading: ReentrantMutex::new(()),
            world,
        };

        if region.path.exists() {
            match file::read_region_file(&region.path) {
                Ok(tag) => *region.tag.write() = tag,
                Err(e) => {
                    error!(
                        "(Reading) region {} is corrupted -> {}: {}",
                        key,
                        region.path.display(),
                        e
                    );
                    region.world.fallback.preserve_unreadable(&region);
                }
            }
        }

        let mut tag = std::mem::take(&mut *region.tag.write());
        region.world.notify_region_loaded(key, &mut tag);
        debug!("Loaded region {} ({} chunks stored)", key, tag.chunk_count());
        *region.tag.write() = tag;
        region
    }

    pub fn key(&self) -> RegionKey {
        self.key
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Deep copy of the region aggregate.
    pub fn region_tag(&self) -> RegionCompound {
        self.tag.read().clone()
    }

    pub fn set_region_tag(&self, tag: RegionCompound) {
        *self.tag.write() = tag;
    }

    pub fn is_chunk_loaded(&self, chunk: &ChunkKey) -> bool {
        self.chunks.contains_key(chunk)
    }

    pub fn active_chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// The active register for `chunk`, constructing and caching it if needed.
    pub fn load_chunk(&self, chunk: ChunkKey) -> Arc<ChunkRegister> {
        debug_assert_eq!(chunk.region(), self.key, "{} is not inside {}", chunk, self.key);
        if let Some(existing) = self.chunk(&chunk) {
            return existing;
        }
        // Built outside the map so listeners never run under a shard lock.
        let _loading = self.loading.lock();
        if let Some(existing) = self.chunk(&chunk) {
            return existing;
        }
        let register = Arc::new(ChunkRegister::new(
            chunk,
            Arc::clone(&self.tag),
            Arc::clone(&self.world),
        ));
        self.chunks.insert(chunk, Arc::clone(&register));
        register
    }

    pub fn chunk(&self, chunk: &ChunkKey) -> Option<Arc<ChunkRegister>> {
        self.chunks.get(chunk).map(|entry| Arc::clone(entry.value()))
    }

    /// Evict without saving.
    pub fn remove_chunk(&self, chunk: &ChunkKey) -> Option<Arc<ChunkRegister>> {
        self.chunks.remove(chunk).map(|(_, register)| register)
    }

    /// Save the chunk against its live entity set, then evict it.
    pub fn unload_chunk(
        &self,
        chunk: &ChunkKey,
        live_entities: &HashSet<EntityKey>,
    ) -> Option<Arc<ChunkRegister>> {
        let register = self.chunk(chunk)?;
        register.unload(Some(live_entities));
        self.chunks
            .remove_if(chunk, |_, current| Arc::ptr_eq(current, &register))
            .map(|(_, register)| register)
    }

    /// Force-unload every chunk the host no longer reports as loaded.
    ///
    /// Returns true when no active chunk is left, i.e. the region may be written back.
    pub fn can_be_unloaded(&self, host: &dyn ChunkHost) -> bool {
        for register in self.active_chunks() {
            let key = register.key();
            if !host.is_chunk_loaded(key) {
                register.unload(None);
                self.chunks
                    .remove_if(&key, |_, current| Arc::ptr_eq(current, &register));
            }
        }
        self.chunks.is_empty()
    }

    /// Fold every active chunk into the region aggregate.
    pub fn save_chunks(&self, host: &dyn ChunkHost) {
        for register in self.active_chunks() {
            let key = register.key();
            if host.is_chunk_loaded(key) {
                let live = host.live_entities(key);
                register.save_population(Some(&live));
            } else {
                register.save_population(None);
            }
        }
    }

    /// Persist the aggregate: delete the file when empty, otherwise (re)write it.
    pub fn write_region_file(&self) -> WriteOutcome {
        let result = {
            let mut tag = self.tag.write();
            if tag.is_empty(true) {
                drop(tag);
                return self.delete_region_file();
            }
            self.ensure_directory()
                .and_then(|_| file::write_region_file(&self.path, &tag, self.world.config.compression))
        };

        match result {
            Ok(()) => {
                debug!("Wrote region {} to {}", self.key, self.path.display());
                WriteOutcome::Written
            }
            Err(e) => {
                error!(
                    "(Writing) region file is corrupted -> {}: {}",
                    self.path.display(),
                    e
                );
                self.world.fallback.fallback_operation(self);
                WriteOutcome::Failed
            }
        }
    }

    fn delete_region_file(&self) -> WriteOutcome {
        if !self.path.exists() {
            return WriteOutcome::Unchanged;
        }
        match fs::remove_file(&self.path) {
            Ok(()) => {
                debug!("Region {} is empty, removed {}", self.key, self.path.display());
                WriteOutcome::Deleted
            }
            Err(e) => {
                error!("Could not remove empty region file {}: {}", self.path.display(), e);
                WriteOutcome::Failed
            }
        }
    }

    fn ensure_directory(&self) -> crate::core::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(())
    }

    fn active_chunks(&self) -> Vec<Arc<ChunkRegister>> {
        self.chunks
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    pub fn is_block_stored(&self, chunk: ChunkKey, block: &BlockKey) -> bool {
        self.load_chunk(chunk).is_block_stored(block)
    }

    pub fn get_stored_block(&self, chunk: ChunkKey, block: &BlockKey) -> Option<Compound> {
        self.load_chunk(chunk).get_stored_block(block)
    }

    pub fn create_stored_block<R>(
        &self,
        chunk: ChunkKey,
        block: BlockKey,
        f: impl FnOnce(&mut Compound) -> R,
    ) -> R {
        self.load_chunk(chunk).create_stored_block(block, f)
    }

    pub fn is_entity_stored(&self, entity: &EntityKey) -> bool {
        self.world.is_entity_stored_internal(entity)
    }

    pub fn get_stored_entity(&self, entity: &EntityKey) -> Option<Compound> {
        self.world.get_stored_entity_internal(entity)
    }

    pub fn create_stored_entity<R>(&self, entity: EntityKey, f: impl FnOnce(&mut Compound) -> R) -> R {
        self.world.create_stored_entity_internal(entity, f)
    }
}

impl CorruptedDataFallback for RegionRegister {
    fn corrupted_data_id(&self) -> String {
        format!("{}_region", self.key)
    }

    fn corrupted_data_file(&self) -> PathBuf {
        self.path.clone()
    }

    fn corrupted_data_tag(&self) -> FallbackTag {
        FallbackTag::Region(self.region_tag())
    }

    fn world_name(&self) -> String {
        self.world.config.world_name.clone()
    }
}

impl fmt::Debug for RegionRegister {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegionRegister")
            .field("x", &self.key.x)
            .field("z", &self.key.z)
            .field("world", &self.world.config.world_name)
            .field("active_chunks", &self.chunks.len())
            .finish()
    }
}
