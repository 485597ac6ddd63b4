// ============================================================================
// regiontag Library
// ============================================================================

//! Persistent metadata for the cells and entities of a chunked world.
//!
//! Metadata is a tree of [`Tag`]s. Cells are addressed by [`ChunkKey`] + [`BlockKey`],
//! entities by UUID. Chunks are grouped into regions of 32x32 chunks, and every
//! region is stored in its own `r.<x>.<z>.<ext>` file that is loaded on first access
//! and written back when its chunks are unloaded.
//!
//! # Examples
//!
//! ```no_run
//! use regiontag::{BlockKey, ChunkKey, StoreConfig, WorldRegister};
//!
//! # fn main() -> regiontag::Result<()> {
//! let world = WorldRegister::open(StoreConfig::new("data/tags"))?;
//!
//! world.create_stored_block(ChunkKey::new(0, 0), BlockKey::new(3, 1, 7), |tag| {
//!     tag.put_int("v", 42);
//! });
//!
//! let tag = world.get_stored_block(ChunkKey::new(0, 0), &BlockKey::new(3, 1, 7));
//! assert_eq!(tag.and_then(|t| t.get_int("v")), Some(42));
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod core;
pub mod storage;
pub mod tag;

// Re-export main types for convenience
pub use config::StoreConfig;
pub use core::{
    BlockKey, ChunkKey, EntityKey, LocalChunkKey, MAX_DEPTH, REGION_SPAN, RegionKey, Result,
    TagError,
};
pub use storage::{
    AsyncKeyedMap, ChunkHost, ChunkRegister, CorruptedDataFallback, CorruptedDataManager,
    RegionRegister, SaveSummary, TagLoadListener, WorldRegister, WriteOutcome,
};
pub use tag::{ChunkCompound, Compound, Compression, ListTag, RegionCompound, Tag, TagType};
