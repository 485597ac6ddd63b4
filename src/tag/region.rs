use super::chunk::ChunkCompound;
use super::io::{read_u8, write_u8};
use crate::core::{LocalChunkKey, Result, TagError};
use std::collections::HashMap;
use std::collections::hash_map;
use std::io::{Read, Write};

const MARKER_END: u8 = 0;
const MARKER_CHUNK: u8 = 1;

/// Every stored chunk of one region, keyed by region-local chunk coordinates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegionCompound {
    chunks: HashMap<LocalChunkKey, ChunkCompound>,
}

impl RegionCompound {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recursive emptiness; with `remove_empty`, empty chunks are pruned as well.
    pub fn is_empty(&mut self, remove_empty: bool) -> bool {
        if remove_empty {
            self.chunks.retain(|_, chunk| !chunk.is_empty(true));
        }
        self.chunks.values().all(ChunkCompound::is_effectively_empty)
    }

    pub fn contains_chunk(&self, key: &LocalChunkKey) -> bool {
        self.chunks.contains_key(key)
    }

    pub fn get_chunk(&self, key: &LocalChunkKey) -> Option<&ChunkCompound> {
        self.chunks.get(key)
    }

    pub fn get_chunk_mut(&mut self, key: &LocalChunkKey) -> Option<&mut ChunkCompound> {
        self.chunks.get_mut(key)
    }

    pub fn put_chunk(&mut self, key: LocalChunkKey, chunk: ChunkCompound) -> Option<ChunkCompound> {
        self.chunks.insert(key, chunk)
    }

    pub fn remove_chunk(&mut self, key: &LocalChunkKey) -> Option<ChunkCompound> {
        self.chunks.remove(key)
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn chunks(&self) -> hash_map::Iter<'_, LocalChunkKey, ChunkCompound> {
        self.chunks.iter()
    }

    pub fn read<R: Read>(input: &mut R) -> Result<Self> {
        let mut region = RegionCompound::new();
        let mut marker = read_u8(input)?;
        while marker == MARKER_CHUNK {
            let (x, z) = (read_u8(input)?, read_u8(input)?);
            let key = LocalChunkKey::new(x, z).ok_or_else(|| {
                TagError::DecodeFormat(format!("chunk ({}, {}) outside region span", x, z))
            })?;
            let chunk = ChunkCompound::read(input)?;
            region.chunks.insert(key, chunk);
            marker = read_u8(input)?;
        }
        if marker != MARKER_END {
            return Err(TagError::DecodeFormat(format!(
                "unexpected marker {} in region",
                marker
            )));
        }
        Ok(region)
    }

    /// Encode every chunk that still holds data.
    pub fn write<W: Write>(&self, out: &mut W) -> Result<()> {
        for (key, chunk) in &self.chunks {
            if chunk.is_effectively_empty() {
                continue;
            }
            write_u8(out, MARKER_CHUNK)?;
            write_u8(out, key.x)?;
            write_u8(out, key.z)?;
            chunk.write(out)?;
        }
        write_u8(out, MARKER_END)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::BlockKey;

    fn local(x: u8, z: u8) -> LocalChunkKey {
        LocalChunkKey::new(x, z).unwrap()
    }

    #[test]
    fn test_round_trip_skips_empty_chunks() {
        let mut region = RegionCompound::new();
        let mut full = ChunkCompound::new();
        full.block_entry(BlockKey::new(3, 1, 7)).put_int("v", 42);
        region.put_chunk(local(0, 0), full.clone());
        region.put_chunk(local(31, 5), ChunkCompound::new());

        let mut out = Vec::new();
        region.write(&mut out).unwrap();
        let decoded = RegionCompound::read(&mut out.as_slice()).unwrap();

        assert_eq!(decoded.chunk_count(), 1);
        assert_eq!(decoded.get_chunk(&local(0, 0)), Some(&full));
    }

    #[test]
    fn test_is_empty_recursive() {
        let mut region = RegionCompound::new();
        let mut chunk = ChunkCompound::new();
        chunk.block_entry(BlockKey::new(0, 0, 0));
        region.put_chunk(local(1, 1), chunk);

        assert!(region.is_empty(false));
        assert_eq!(region.chunk_count(), 1);
        assert!(region.is_empty(true));
        assert_eq!(region.chunk_count(), 0);
    }

    #[test]
    fn test_out_of_span_rejected() {
        let bytes = [1u8, 40, 0, 0, 0, 0, 0];
        let err = RegionCompound::read(&mut &bytes[..]).unwrap_err();
        assert!(matches!(err, TagError::DecodeFormat(_)));
    }
}
