pub mod chunk;
pub mod compound;
pub mod file;
pub mod io;
pub mod region;

pub use chunk::ChunkCompound;
pub use compound::{Compound, ListTag, Tag, TagType};
pub use file::Compression;
pub use io::{decode, encode};
pub use region::RegionCompound;
