//! Register hierarchy: world, regions, chunks.
//!
//! A [`WorldRegister`] pages [`RegionRegister`]s in from disk on first access; a
//! region keeps one [`ChunkRegister`] per active chunk. Chunk state is folded back
//! into the region aggregate when the chunk is saved or unloaded, and the region
//! file is written once no chunk of it is active anymore.

pub mod async_map;
pub mod chunk;
pub mod fallback;
pub mod host;
pub mod region;
pub mod world;

pub use async_map::AsyncKeyedMap;
pub use chunk::ChunkRegister;
pub use fallback::{CorruptedDataFallback, CorruptedDataManager, FallbackTag};
pub use host::{ChunkHost, TagLoadListener};
pub use region::{RegionRegister, WriteOutcome};
pub use world::{SaveSummary, WorldRegister};
