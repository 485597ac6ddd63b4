pub mod error;
pub mod types;

pub use error::{Result, TagError};
pub use types::{
    BlockKey, CHUNK_SIZE, ChunkKey, EntityKey, LocalChunkKey, MAX_DEPTH, REGION_SPAN, RegionKey,
};
