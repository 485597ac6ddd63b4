use super::world::WorldContext;
use crate::core::{BlockKey, ChunkKey, EntityKey, RegionKey};
use crate::tag::{ChunkCompound, Compound, RegionCompound};
use log::debug;
use parking_lot::{Mutex, RwLock};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

struct ChunkState {
    tag: ChunkCompound,
    /// Entities this chunk currently answers for; their metadata lives in the
    /// world-level cache while the chunk is active.
    entities: HashSet<EntityKey>,
}

/// Metadata of one active chunk.
///
/// Every read and write goes through a per-chunk mutex, so different chunks never
/// contend with each other.
pub struct ChunkRegister {
    key: ChunkKey,
    state: Mutex<ChunkState>,
    region_tag: Arc<RwLock<RegionCompound>>,
    world: Arc<WorldContext>,
}

impl ChunkRegister {
    pub(crate) fn new(
        key: ChunkKey,
        region_tag: Arc<RwLock<RegionCompound>>,
        world: Arc<WorldContext>,
    ) -> Self {
        let mut tag = region_tag
            .read()
            .get_chunk(&key.local())
            .cloned()
            .unwrap_or_default();

        world.notify_chunk_loaded(key, &mut tag);

        let mut entities = HashSet::with_capacity(tag.entity_count());
        for (id, entity_tag) in tag.entities() {
            world.load_entity_internal(*id, entity_tag.copy());
            entities.insert(*id);
        }
        debug!(
            "Loaded {} ({} blocks, {} entities)",
            key,
            tag.block_count(),
            entities.len()
        );

        Self {
            key,
            state: Mutex::new(ChunkState { tag, entities }),
            region_tag,
            world,
        }
    }

    pub fn key(&self) -> ChunkKey {
        self.key
    }

    pub fn region_key(&self) -> RegionKey {
        self.key.region()
    }

    /// Deep copy of the chunk's aggregate as it stands now.
    pub fn chunk_tag(&self) -> ChunkCompound {
        self.state.lock().tag.copy()
    }

    /// Run `f` against the chunk-scoped compound.
    pub fn with_chunk_compound<R>(&self, f: impl FnOnce(&mut Compound) -> R) -> R {
        f(self.state.lock().tag.chunk_compound_mut())
    }

    pub fn is_block_stored(&self, block: &BlockKey) -> bool {
        self.state.lock().tag.contains_block(block)
    }

    pub fn get_stored_block(&self, block: &BlockKey) -> Option<Compound> {
        self.state.lock().tag.get_block(block).map(Compound::copy)
    }

    /// Get-or-insert the block's compound and run `f` on it.
    ///
    /// The first caller creates the entry; later callers see and extend the same one.
    /// `f` runs inside the chunk's critical section and must not call back into this chunk.
    pub fn create_stored_block<R>(&self, block: BlockKey, f: impl FnOnce(&mut Compound) -> R) -> R {
        f(self.state.lock().tag.block_entry(block))
    }

    pub fn remove_stored_block(&self, block: &BlockKey) -> Option<Compound> {
        self.state.lock().tag.remove_block(block)
    }

    pub fn is_entity_stored(&self, entity: &EntityKey) -> bool {
        self.world.is_entity_stored_internal(entity)
    }

    pub fn get_stored_entity(&self, entity: &EntityKey) -> Option<Compound> {
        self.world.get_stored_entity_internal(entity)
    }

    /// Reference the entity from this chunk, then get-or-insert its compound.
    pub fn create_stored_entity<R>(&self, entity: EntityKey, f: impl FnOnce(&mut Compound) -> R) -> R {
        self.reference_entity(entity);
        self.world.create_stored_entity_internal(entity, f)
    }

    /// Record that the entity now belongs to this chunk, without creating metadata.
    pub fn reference_entity(&self, entity: EntityKey) {
        self.state.lock().entities.insert(entity);
    }

    pub fn stored_entities(&self) -> HashSet<EntityKey> {
        self.state.lock().entities.clone()
    }

    /// Fold the chunk's state back into the region aggregate.
    ///
    /// With `Some(live)`, the chunk's entity map is rebuilt from the world cache for
    /// exactly the live set, which also becomes the chunk's remembered set. With
    /// `None`, every remembered entity is pulled out of the world cache instead.
    pub fn save_population(&self, live_entities: Option<&HashSet<EntityKey>>) {
        let mut state = self.state.lock();
        self.fold_into_region(&mut state, live_entities);
    }

    /// Save, then release this chunk's entities from the world cache.
    pub fn unload(&self, live_entities: Option<&HashSet<EntityKey>>) {
        let mut state = self.state.lock();
        self.fold_into_region(&mut state, live_entities);
        if let Some(live) = live_entities {
            for id in live {
                self.world.unload_entity_internal(id);
            }
        }
        state.entities.clear();
    }

    fn fold_into_region(&self, state: &mut ChunkState, live_entities: Option<&HashSet<EntityKey>>) {
        let ChunkState { tag, entities } = state;

        match live_entities {
            Some(live) => {
                tag.clear_entities();
                for id in live {
                    let stored = self
                        .world
                        .get_stored_entity_internal(id)
                        .filter(|entity_tag| !entity_tag.is_empty());
                    if let Some(entity_tag) = stored {
                        tag.put_entity(*id, entity_tag);
                    }
                }
                entities.clone_from(live);
            }
            None => {
                for id in entities.iter() {
                    if let Some(entity_tag) = self.world.unload_entity_internal(id) {
                        tag.put_entity(*id, entity_tag);
                    }
                }
            }
        }

        let local = self.key.local();
        let mut region = self.region_tag.write();
        if !tag.is_empty(true) {
            region.put_chunk(local, tag.copy());
        } else if region.contains_chunk(&local) {
            region.remove_chunk(&local);
        }
    }
}

impl fmt::Debug for ChunkRegister {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChunkRegister")
            .field("x", &self.key.x)
            .field("z", &self.key.z)
            .field("world", &self.world.config.world_name)
            .finish()
    }
}
