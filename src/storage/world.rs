use super::chunk::ChunkRegister;
use super::fallback::{CorruptedDataFallback, CorruptedDataManager, FallbackTag};
use super::host::{ChunkHost, TagLoadListener};
use super::region::{RegionRegister, WriteOutcome};
use crate::config::StoreConfig;
use crate::core::{BlockKey, ChunkKey, EntityKey, RegionKey, Result};
use crate::tag::file;
use crate::tag::{ChunkCompound, Compound, RegionCompound};
use dashmap::DashMap;
use log::{debug, error, info};
use parking_lot::{ReentrantMutex, RwLock};
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{Level, event, info_span};

/// State shared by every register of one world.
///
/// Regions and chunks hold an `Arc` to this instead of a pointer to their parent,
/// so the ownership graph stays a tree.
pub(crate) struct WorldContext {
    pub(crate) config: StoreConfig,
    /// Metadata of every entity owned by an active chunk or currently migrating.
    entities: DashMap<EntityKey, Compound>,
    listeners: RwLock<Vec<Arc<dyn TagLoadListener>>>,
    pub(crate) fallback: CorruptedDataManager,
}

impl WorldContext {
    fn new(config: StoreConfig) -> Self {
        let fallback = CorruptedDataManager::new(config.fallback_path(), config.compression);
        Self {
            config,
            entities: DashMap::new(),
            listeners: RwLock::new(Vec::new()),
            fallback,
        }
    }

    pub(crate) fn load_entity_internal(&self, entity: EntityKey, tag: Compound) {
        self.entities.insert(entity, tag);
    }

    pub(crate) fn is_entity_stored_internal(&self, entity: &EntityKey) -> bool {
        self.entities.contains_key(entity)
    }

    pub(crate) fn get_stored_entity_internal(&self, entity: &EntityKey) -> Option<Compound> {
        self.entities.get(entity).map(|tag| tag.copy())
    }

    pub(crate) fn create_stored_entity_internal<R>(
        &self,
        entity: EntityKey,
        f: impl FnOnce(&mut Compound) -> R,
    ) -> R {
        let mut tag = self.entities.entry(entity).or_default();
        f(tag.value_mut())
    }

    pub(crate) fn unload_entity_internal(&self, entity: &EntityKey) -> Option<Compound> {
        self.entities.remove(entity).map(|(_, tag)| tag)
    }

    fn listeners(&self) -> Vec<Arc<dyn TagLoadListener>> {
        self.listeners.read().clone()
    }

    pub(crate) fn notify_world_loaded(&self, tag: &mut Compound) {
        for listener in self.listeners() {
            listener.on_world_load(&self.config.world_name, tag);
        }
    }

    pub(crate) fn notify_region_loaded(&self, key: RegionKey, tag: &mut RegionCompound) {
        for listener in self.listeners() {
            listener.on_region_load(key, tag);
        }
    }

    pub(crate) fn notify_chunk_loaded(&self, key: ChunkKey, tag: &mut ChunkCompound) {
        for listener in self.listeners() {
            listener.on_chunk_load(key, tag);
        }
    }
}

/// Counters reported by [`WorldRegister::save_all`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaveSummary {
    pub written: usize,
    pub deleted: usize,
    pub failed: usize,
}

impl SaveSummary {
    fn record(&mut self, outcome: WriteOutcome) {
        match outcome {
            WriteOutcome::Written => self.written += 1,
            WriteOutcome::Deleted => self.deleted += 1,
            WriteOutcome::Failed => self.failed += 1,
            WriteOutcome::Unchanged => {}
        }
    }
}

/// Root of the register hierarchy for one world directory.
///
/// Owns the active regions, the world-level entity cache and the world-scoped
/// compound. Regions are loaded on first access and written back by the sweeps.
///
/// # Example
///
/// ```no_run
/// use regiontag::{BlockKey, ChunkKey, StoreConfig, WorldRegister};
///
/// let world = WorldRegister::open(StoreConfig::new("data/tags"))?;
/// world.create_stored_block(ChunkKey::new(0, 0), BlockKey::new(3, 1, 7), |tag| {
///     tag.put_int("v", 42);
/// });
/// # Ok::<(), regiontag::TagError>(())
/// ```
pub struct WorldRegister {
    context: Arc<WorldContext>,
    regions: DashMap<RegionKey, Arc<RegionRegister>>,
    /// Serializes region construction so listeners run with no map shard locked.
    loading: ReentrantMutex<()>,
    world_tag: RwLock<Compound>,
}

impl WorldRegister {
    pub fn open(config: StoreConfig) -> Result<Self> {
        Self::open_with_listeners(config, Vec::new())
    }

    /// Open the world, registering listeners before the world compound is loaded
    /// so they also observe it.
    pub fn open_with_listeners(
        config: StoreConfig,
        listeners: Vec<Arc<dyn TagLoadListener>>,
    ) -> Result<Self> {
        config.validate()?;
        if config.create_directories {
            fs::create_dir_all(&config.directory)?;
        }

        let context = WorldContext::new(config);
        *context.listeners.write() = listeners;

        let world = Self {
            context: Arc::new(context),
            regions: DashMap::new(),
            loading: ReentrantMutex::new(()),
            world_tag: RwLock::new(Compound::new()),
        };
        world.load_world_tag();
        info!(
            "Opened world '{}' at {}",
            world.context.config.world_name,
            world.context.config.directory.display()
        );
        Ok(world)
    }

    fn load_world_tag(&self) {
        let path = self.context.config.world_path();
        if path.exists() {
            match file::read_compound_file(&path) {
                Ok(tag) => *self.world_tag.write() = tag,
                Err(e) => {
                    error!("(Reading) world file is corrupted -> {}: {}", path.display(), e);
                    self.context.fallback.preserve_unreadable(self);
                }
            }
        }
        let mut tag = std::mem::take(&mut *self.world_tag.write());
        self.context.notify_world_loaded(&mut tag);
        *self.world_tag.write() = tag;
    }

    pub fn add_listener(&self, listener: Arc<dyn TagLoadListener>) {
        self.context.listeners.write().push(listener);
    }

    pub fn config(&self) -> &StoreConfig {
        &self.context.config
    }

    /// The region register for `key`, loading it from disk on first access.
    pub fn region(&self, key: RegionKey) -> Arc<RegionRegister> {
        if let Some(existing) = self.region_if_loaded(key) {
            return existing;
        }
        let _loading = self.loading.lock();
        if let Some(existing) = self.region_if_loaded(key) {
            return existing;
        }
        let region = Arc::new(RegionRegister::new(key, Arc::clone(&self.context)));
        self.regions.insert(key, Arc::clone(&region));
        region
    }

    pub fn region_if_loaded(&self, key: RegionKey) -> Option<Arc<RegionRegister>> {
        self.regions.get(&key).map(|entry| Arc::clone(entry.value()))
    }

    pub fn is_region_loaded(&self, key: RegionKey) -> bool {
        self.regions.contains_key(&key)
    }

    pub fn active_region_count(&self) -> usize {
        self.regions.len()
    }

    /// The active register for `chunk`; an already active one is returned as is.
    pub fn load_chunk(&self, chunk: ChunkKey) -> Arc<ChunkRegister> {
        self.region(chunk.region()).load_chunk(chunk)
    }

    /// The register for `chunk` if it is active. Never touches disk.
    pub fn chunk(&self, chunk: ChunkKey) -> Option<Arc<ChunkRegister>> {
        self.region_if_loaded(chunk.region())?.chunk(&chunk)
    }

    pub fn is_chunk_loaded(&self, chunk: ChunkKey) -> bool {
        self.chunk(chunk).is_some()
    }

    /// Save the chunk against its live entities and evict it. False if it was not active.
    pub fn unload_chunk(&self, chunk: ChunkKey, live_entities: &HashSet<EntityKey>) -> bool {
        match self.region_if_loaded(chunk.region()) {
            Some(region) => region.unload_chunk(&chunk, live_entities).is_some(),
            None => false,
        }
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

    pub fn remove_stored_block(&self, chunk: ChunkKey, block: &BlockKey) -> Option<Compound> {
        self.load_chunk(chunk).remove_stored_block(block)
    }

    pub fn is_entity_stored(&self, entity: &EntityKey) -> bool {
        self.context.is_entity_stored_internal(entity)
    }

    pub fn get_stored_entity(&self, entity: &EntityKey) -> Option<Compound> {
        self.context.get_stored_entity_internal(entity)
    }

    /// Get-or-insert the entity's compound in the world cache.
    ///
    /// The entity is not owned by any chunk until one references it; use
    /// [`ChunkRegister::create_stored_entity`] to do both at once.
    pub fn create_stored_entity<R>(&self, entity: EntityKey, f: impl FnOnce(&mut Compound) -> R) -> R {
        self.context.create_stored_entity_internal(entity, f)
    }

    /// Put metadata for an entity arriving from outside the store.
    pub fn load_entity(&self, entity: EntityKey, tag: Compound) {
        self.context.load_entity_internal(entity, tag);
    }

    /// Drop the entity from the world cache, returning its metadata.
    pub fn unload_entity(&self, entity: &EntityKey) -> Option<Compound> {
        self.context.unload_entity_internal(entity)
    }

    pub fn world_tag(&self) -> Compound {
        self.world_tag.read().copy()
    }

    pub fn with_world_tag<R>(&self, f: impl FnOnce(&mut Compound) -> R) -> R {
        f(&mut self.world_tag.write())
    }

    /// Persist the world compound, removing its file when the compound is empty.
    pub fn save_world_tag(&self) -> WriteOutcome {
        let path = self.context.config.world_path();
        let result = {
            let tag = self.world_tag.read();
            if tag.is_empty() {
                None
            } else {
                Some(file::write_compound_file(
                    &path,
                    &tag,
                    self.context.config.compression,
                ))
            }
        };

        match result {
            None if !path.exists() => WriteOutcome::Unchanged,
            None => match fs::remove_file(&path) {
                Ok(()) => WriteOutcome::Deleted,
                Err(e) => {
                    error!("Could not remove empty world file {}: {}", path.display(), e);
                    WriteOutcome::Failed
                }
            },
            Some(Ok(())) => WriteOutcome::Written,
            Some(Err(e)) => {
                error!("(Writing) world file is corrupted -> {}: {}", path.display(), e);
                self.context.fallback.fallback_operation(self);
                WriteOutcome::Failed
            }
        }
    }

    /// Fold every active chunk into its region, then write every region and the world file.
    pub fn save_all(&self, host: &dyn ChunkHost) -> SaveSummary {
        let span = info_span!(
            "world.save_all",
            world = %self.context.config.world_name,
            regions = self.regions.len()
        );
        let _enter = span.enter();

        let mut summary = SaveSummary::default();
        for region in self.active_regions() {
            region.save_chunks(host);
            summary.record(region.write_region_file());
        }
        summary.record(self.save_world_tag());

        if summary.failed > 0 {
            event!(Level::WARN, failed = summary.failed, "world save finished with failures");
        } else {
            event!(
                Level::INFO,
                written = summary.written,
                deleted = summary.deleted,
                "world saved"
            );
        }
        summary
    }

    /// Write back and drop every region whose chunks are all gone from the host.
    ///
    /// Returns how many regions were dropped.
    pub fn unload_regions(&self, host: &dyn ChunkHost) -> usize {
        let span = info_span!("world.unload_regions", world = %self.context.config.world_name);
        let _enter = span.enter();

        let mut unloaded = 0;
        for region in self.active_regions() {
            if !region.can_be_unloaded(host) {
                continue;
            }
            let key = region.key();
            // The file is written while the entry is still held, so a concurrent
            // `region(key)` cannot read the old file in between. A failed write
            // keeps the region resident; the next sweep retries it.
            let removed = self.regions.remove_if(&key, |_, current| {
                if !Arc::ptr_eq(current, &region) || current.active_chunk_count() > 0 {
                    return false;
                }
                current.write_region_file() != WriteOutcome::Failed
            });
            if removed.is_some() {
                debug!("Unloaded region {}", key);
                unloaded += 1;
            }
        }

        event!(
            Level::INFO,
            unloaded,
            remaining = self.regions.len(),
            "region unload sweep finished"
        );
        unloaded
    }

    fn active_regions(&self) -> Vec<Arc<RegionRegister>> {
        self.regions
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }
}

impl CorruptedDataFallback for WorldRegister {
    fn corrupted_data_id(&self) -> String {
        "world".to_string()
    }

    fn corrupted_data_file(&self) -> PathBuf {
        self.context.config.world_path()
    }

    fn corrupted_data_tag(&self) -> FallbackTag {
        FallbackTag::Compound(self.world_tag())
    }

    fn world_name(&self) -> String {
        self.context.config.world_name.clone()
    }
}

impl fmt::Debug for WorldRegister {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorldRegister")
            .field("world", &self.context.config.world_name)
            .field("directory", &self.context.config.directory)
            .field("active_regions", &self.regions.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tag::Compression;
    use tempfile::TempDir;
    use uuid::Uuid;

    struct NoChunks;

    impl ChunkHost for NoChunks {
        fn is_chunk_loaded(&self, _chunk: ChunkKey) -> bool {
            false
        }

        fn live_entities(&self, _chunk: ChunkKey) -> HashSet<EntityKey> {
            HashSet::new()
        }
    }

    fn open(dir: &TempDir) -> WorldRegister {
        WorldRegister::open(StoreConfig::new(dir.path()).compression(Compression::None)).unwrap()
    }

    #[test]
    fn test_region_is_loaded_once() {
        let temp_dir = TempDir::new().unwrap();
        let world = open(&temp_dir);

        let a = world.region(RegionKey::new(0, 0));
        let b = world.region(RegionKey::new(0, 0));
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(world.active_region_count(), 1);
    }

    #[test]
    fn test_chunk_lookup_does_not_load() {
        let temp_dir = TempDir::new().unwrap();
        let world = open(&temp_dir);

        assert!(world.chunk(ChunkKey::new(5, 5)).is_none());
        assert!(!world.is_region_loaded(RegionKey::new(0, 0)));

        world.load_chunk(ChunkKey::new(5, 5));
        assert!(world.is_chunk_loaded(ChunkKey::new(5, 5)));
    }

    #[test]
    fn test_entity_cache_primitives() {
        let temp_dir = TempDir::new().unwrap();
        let world = open(&temp_dir);
        let id = Uuid::new_v4();

        assert!(!world.is_entity_stored(&id));
        world.create_stored_entity(id, |tag| tag.put_string("name", "cow"));
        world.create_stored_entity(id, |tag| tag.put_int("age", 3));

        let tag = world.get_stored_entity(&id).unwrap();
        assert_eq!(tag.get_string("name"), Some("cow"));
        assert_eq!(tag.get_int("age"), Some(3));

        assert!(world.unload_entity(&id).is_some());
        assert!(!world.is_entity_stored(&id));
    }

    #[test]
    fn test_world_tag_file_lifecycle() {
        let temp_dir = TempDir::new().unwrap();
        let world = open(&temp_dir);
        let path = world.config().world_path();

        assert_eq!(world.save_world_tag(), WriteOutcome::Unchanged);

        world.with_world_tag(|tag| tag.put_long("seed", 99));
        assert_eq!(world.save_world_tag(), WriteOutcome::Written);
        assert!(path.exists());

        let reopened = open(&temp_dir);
        assert_eq!(reopened.world_tag().get_long("seed"), Some(99));

        reopened.with_world_tag(|tag| tag.clear());
        assert_eq!(reopened.save_world_tag(), WriteOutcome::Deleted);
        assert!(!path.exists());
    }

    #[test]
    fn test_unload_regions_drops_idle_regions() {
        let temp_dir = TempDir::new().unwrap();
        let world = open(&temp_dir);

        world.create_stored_block(ChunkKey::new(0, 0), BlockKey::new(1, 2, 3), |tag| {
            tag.put_int("v", 1)
        });
        world.load_chunk(ChunkKey::new(40, 40));
        assert_eq!(world.active_region_count(), 2);

        assert_eq!(world.unload_regions(&NoChunks), 2);
        assert_eq!(world.active_region_count(), 0);
        assert!(world.config().region_path(RegionKey::new(0, 0)).exists());
        assert!(!world.config().region_path(RegionKey::new(1, 1)).exists());
    }

    #[test]
    fn test_open_rejects_invalid_config() {
        let temp_dir = TempDir::new().unwrap();
        let config = StoreConfig::new(temp_dir.path()).file_extension("");
        assert!(WorldRegister::open(config).is_err());
    }
}
