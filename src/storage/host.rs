//! Seams to the embedding world.
//!
//! The store never enumerates chunks or entities itself; the host answers those
//! questions at save time and may observe aggregates as they are loaded.

use crate::core::{ChunkKey, EntityKey, RegionKey};
use crate::tag::{ChunkCompound, Compound, RegionCompound};
use std::collections::HashSet;

/// Live view of the world, consulted during save and unload sweeps.
pub trait ChunkHost {
    /// Whether the chunk is still active in the world.
    fn is_chunk_loaded(&self, chunk: ChunkKey) -> bool;

    /// Entities currently standing in the chunk.
    fn live_entities(&self, chunk: ChunkKey) -> HashSet<EntityKey>;
}

/// Hooks invoked once an aggregate has been loaded and before callers see it.
///
/// Listeners may inspect or mutate the aggregate. All methods default to no-ops.
///
/// Callbacks run on the loading thread with no register map locked, so they may
/// query the world or load other regions and chunks. Loads of the same world
/// (or, for chunks, the same region) are serialized around the callback; a
/// listener must not load the very aggregate it is being notified about.
pub trait TagLoadListener: Send + Sync {
    fn on_world_load(&self, _world_name: &str, _world: &mut Compound) {}

    fn on_region_load(&self, _region: RegionKey, _tag: &mut RegionCompound) {}

    fn on_chunk_load(&self, _chunk: ChunkKey, _tag: &mut ChunkCompound) {}
}
