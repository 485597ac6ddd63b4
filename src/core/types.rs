use std::fmt;

/// Number of chunks along one side of a region.
pub const REGION_SPAN: i32 = 32;

/// Side length of a chunk in cells.
pub const CHUNK_SIZE: i32 = 16;

/// Maximum nesting depth accepted while decoding.
pub const MAX_DEPTH: usize = 512;

/// Entities are keyed by their UUID.
pub type EntityKey = uuid::Uuid;

/// Offset of a cell inside its chunk. Only used as a lookup key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockKey {
    pub x: i8,
    pub y: i8,
    pub z: i8,
}

impl BlockKey {
    pub fn new(x: i8, y: i8, z: i8) -> Self {
        Self { x, y, z }
    }

    /// Split absolute cell coordinates into the owning chunk and the in-chunk key.
    ///
    /// Returns `None` when `y` does not fit in a signed byte.
    pub fn from_world(x: i32, y: i32, z: i32) -> Option<(ChunkKey, BlockKey)> {
        let y = i8::try_from(y).ok()?;
        let chunk = ChunkKey::new(x.div_euclid(CHUNK_SIZE), z.div_euclid(CHUNK_SIZE));
        let key = BlockKey::new(
            x.rem_euclid(CHUNK_SIZE) as i8,
            y,
            z.rem_euclid(CHUNK_SIZE) as i8,
        );
        Some((chunk, key))
    }
}

impl fmt::Display for BlockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// Absolute chunk coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkKey {
    pub x: i32,
    pub z: i32,
}

impl ChunkKey {
    pub fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    pub fn region(&self) -> RegionKey {
        RegionKey::new(self.x.div_euclid(REGION_SPAN), self.z.div_euclid(REGION_SPAN))
    }

    pub fn local(&self) -> LocalChunkKey {
        LocalChunkKey {
            x: self.x.rem_euclid(REGION_SPAN) as u8,
            z: self.z.rem_euclid(REGION_SPAN) as u8,
        }
    }
}

impl fmt::Display for ChunkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "chunk[{}, {}]", self.x, self.z)
    }
}

/// Chunk coordinates relative to the owning region, both in `0..REGION_SPAN`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LocalChunkKey {
    pub x: u8,
    pub z: u8,
}

impl LocalChunkKey {
    /// Returns `None` if either coordinate is outside the region span.
    pub fn new(x: u8, z: u8) -> Option<Self> {
        let span = REGION_SPAN as u8;
        (x < span && z < span).then_some(Self { x, z })
    }
}

/// Region coordinates; one region file exists per key that ever held data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegionKey {
    pub x: i32,
    pub z: i32,
}

impl RegionKey {
    pub fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    /// Absolute key of a chunk inside this region.
    pub fn chunk(&self, local: LocalChunkKey) -> ChunkKey {
        ChunkKey::new(
            self.x * REGION_SPAN + i32::from(local.x),
            self.z * REGION_SPAN + i32::from(local.z),
        )
    }

    pub fn file_name(&self, extension: &str) -> String {
        format!("r.{}.{}.{}", self.x, self.z, extension)
    }

    /// Parse `r.<x>.<z>.<ext>`; the inverse of [`RegionKey::file_name`].
    pub fn parse_file_name(name: &str, extension: &str) -> Option<Self> {
        let stem = name.strip_prefix("r.")?.strip_suffix(extension)?.strip_suffix('.')?;
        let (x, z) = stem.split_once('.')?;
        Some(Self::new(x.parse().ok()?, z.parse().ok()?))
    }
}

impl fmt::Display for RegionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r.{}.{}", self.x, self.z)
    }
}
