use super::compound::Compound;
use super::io::{read_i8, read_string, read_u8, write_i8, write_string, write_u8};
use crate::core::{BlockKey, EntityKey, Result, TagError};
use std::collections::HashMap;
use std::collections::hash_map;
use std::io::{Read, Write};

const MARKER_END: u8 = 0;
const MARKER_BLOCK: u8 = 1;
const MARKER_ENTITY: u8 = 2;
const MARKER_CHUNK: u8 = 3;

/// All metadata stored for one chunk: per-cell compounds, per-entity compounds
/// for entities currently listed in the chunk, and one chunk-scoped compound.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChunkCompound {
    blocks: HashMap<BlockKey, Compound>,
    entities: HashMap<EntityKey, Compound>,
    chunk: Compound,
}

impl ChunkCompound {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when nothing worth persisting remains.
    ///
    /// With `remove_empty`, block and entity entries whose compound is empty are
    /// dropped first, so the maps are actually pruned afterwards.
    pub fn is_empty(&mut self, remove_empty: bool) -> bool {
        if remove_empty {
            self.blocks.retain(|_, tag| !tag.is_empty());
            self.entities.retain(|_, tag| !tag.is_empty());
        }
        self.blocks.is_empty() && self.entities.is_empty() && self.chunk.is_empty()
    }

    /// Emptiness without mutating; ignores entries whose compound is empty.
    pub fn is_effectively_empty(&self) -> bool {
        self.blocks.values().all(Compound::is_empty)
            && self.entities.values().all(Compound::is_empty)
            && self.chunk.is_empty()
    }

    pub fn chunk_compound(&self) -> &Compound {
        &self.chunk
    }

    pub fn chunk_compound_mut(&mut self) -> &mut Compound {
        &mut self.chunk
    }

    pub fn clear_blocks(&mut self) {
        self.blocks.clear();
    }

    pub fn clear_entities(&mut self) {
        self.entities.clear();
    }

    pub fn get_block(&self, key: &BlockKey) -> Option<&Compound> {
        self.blocks.get(key)
    }

    pub fn get_block_mut(&mut self, key: &BlockKey) -> Option<&mut Compound> {
        self.blocks.get_mut(key)
    }

    /// Existing block compound, or a freshly inserted empty one.
    pub fn block_entry(&mut self, key: BlockKey) -> &mut Compound {
        self.blocks.entry(key).or_default()
    }

    pub fn put_block(&mut self, key: BlockKey, tag: Compound) -> Option<Compound> {
        self.blocks.insert(key, tag)
    }

    pub fn remove_block(&mut self, key: &BlockKey) -> Option<Compound> {
        self.blocks.remove(key)
    }

    pub fn contains_block(&self, key: &BlockKey) -> bool {
        self.blocks.contains_key(key)
    }

    pub fn get_entity(&self, key: &EntityKey) -> Option<&Compound> {
        self.entities.get(key)
    }

    pub fn put_entity(&mut self, key: EntityKey, tag: Compound) -> Option<Compound> {
        self.entities.insert(key, tag)
    }

    pub fn remove_entity(&mut self, key: &EntityKey) -> Option<Compound> {
        self.entities.remove(key)
    }

    pub fn contains_entity(&self, key: &EntityKey) -> bool {
        self.entities.contains_key(key)
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn blocks(&self) -> hash_map::Iter<'_, BlockKey, Compound> {
        self.blocks.iter()
    }

    pub fn entities(&self) -> hash_map::Iter<'_, EntityKey, Compound> {
        self.entities.iter()
    }

    pub fn copy(&self) -> Self {
        self.clone()
    }

    /// Decode one chunk record. Each member compound is a top-level container
    /// with its own depth budget, exactly as [`ChunkCompound::write`] encodes it.
    pub fn read<R: Read>(input: &mut R) -> Result<Self> {
        let mut chunk = ChunkCompound::new();

        let mut marker = read_u8(input)?;
        while marker == MARKER_BLOCK {
            let key = BlockKey::new(read_i8(input)?, read_i8(input)?, read_i8(input)?);
            let tag = Compound::read(input, 1)?;
            chunk.blocks.insert(key, tag);
            marker = read_u8(input)?;
        }
        expect_end(marker, "block section")?;

        marker = read_u8(input)?;
        while marker == MARKER_ENTITY {
            let id = read_string(input)?;
            let key = EntityKey::parse_str(&id).map_err(|e| {
                TagError::DecodeFormat(format!("invalid entity id '{}': {}", id, e))
            })?;
            let tag = Compound::read(input, 1)?;
            chunk.entities.insert(key, tag);
            marker = read_u8(input)?;
        }
        expect_end(marker, "entity section")?;

        marker = read_u8(input)?;
        if marker == MARKER_CHUNK {
            chunk.chunk = Compound::read(input, 1)?;
            marker = read_u8(input)?;
        }
        expect_end(marker, "chunk section")?;

        Ok(chunk)
    }

    /// Encode, skipping empty member compounds. Absent sections cost one byte.
    pub fn write<W: Write>(&self, out: &mut W) -> Result<()> {
        for (key, tag) in &self.blocks {
            if tag.is_empty() {
                continue;
            }
            write_u8(out, MARKER_BLOCK)?;
            write_i8(out, key.x)?;
            write_i8(out, key.y)?;
            write_i8(out, key.z)?;
            tag.write(out)?;
        }
        write_u8(out, MARKER_END)?;

        for (key, tag) in &self.entities {
            if tag.is_empty() {
                continue;
            }
            write_u8(out, MARKER_ENTITY)?;
            write_string(out, &key.to_string())?;
            tag.write(out)?;
        }
        write_u8(out, MARKER_END)?;

        if !self.chunk.is_empty() {
            write_u8(out, MARKER_CHUNK)?;
            self.chunk.write(out)?;
        }
        write_u8(out, MARKER_END)
    }
}

fn expect_end(marker: u8, section: &str) -> Result<()> {
    if marker != MARKER_END {
        return Err(TagError::DecodeFormat(format!(
            "unexpected marker {} closing {}",
            marker, section
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn decode(bytes: &[u8]) -> Result<ChunkCompound> {
        let mut input = bytes;
        ChunkCompound::read(&mut input)
    }

    fn encode(chunk: &ChunkCompound) -> Vec<u8> {
        let mut out = Vec::new();
        chunk.write(&mut out).unwrap();
        out
    }

    #[test]
    fn test_empty_chunk_is_three_bytes() {
        assert_eq!(encode(&ChunkCompound::new()), vec![0, 0, 0]);
    }

    #[test]
    fn test_round_trip_all_sections() {
        let mut chunk = ChunkCompound::new();
        chunk.block_entry(BlockKey::new(3, 1, 7)).put_int("v", 42);
        chunk.block_entry(BlockKey::new(-1, -128, 15)).put_string("owner", "alex");
        let entity = Uuid::new_v4();
        let mut tag = Compound::new();
        tag.put_long("spawned", 1000);
        chunk.put_entity(entity, tag);
        chunk.chunk_compound_mut().put_bool("claimed", true);

        let decoded = decode(&encode(&chunk)).unwrap();
        assert_eq!(decoded, chunk);
        assert_eq!(decoded.get_entity(&entity).unwrap().get_long("spawned"), Some(1000));
    }

    #[test]
    fn test_member_compounds_get_full_depth() {
        let mut deep = Compound::new();
        deep.put_int("leaf", 1);
        for _ in 1..crate::core::MAX_DEPTH {
            let mut outer = Compound::new();
            outer.put_compound("n", deep);
            deep = outer;
        }
        let mut chunk = ChunkCompound::new();
        *chunk.block_entry(BlockKey::new(0, 0, 0)) = deep;
        chunk.block_entry(BlockKey::new(1, 1, 1)).put_int("v", 42);

        assert_eq!(decode(&encode(&chunk)).unwrap(), chunk);
    }

    #[test]
    fn test_empty_members_not_written() {
        let mut chunk = ChunkCompound::new();
        chunk.block_entry(BlockKey::new(0, 0, 0));
        chunk.put_entity(Uuid::new_v4(), Compound::new());

        assert_eq!(encode(&chunk), vec![0, 0, 0]);
    }

    #[test]
    fn test_is_empty_prunes() {
        let mut chunk = ChunkCompound::new();
        chunk.block_entry(BlockKey::new(1, 2, 3));
        chunk.put_entity(Uuid::new_v4(), Compound::new());

        assert!(!chunk.is_empty(false));
        assert!(chunk.is_effectively_empty());
        assert!(chunk.is_empty(true));
        assert_eq!(chunk.block_count(), 0);
        assert_eq!(chunk.entity_count(), 0);
    }

    #[test]
    fn test_chunk_compound_keeps_chunk_non_empty() {
        let mut chunk = ChunkCompound::new();
        chunk.chunk_compound_mut().put_int("x", 1);
        assert!(!chunk.is_empty(true));
    }

    #[test]
    fn test_bad_marker() {
        assert!(matches!(decode(&[0, 9, 0]), Err(TagError::DecodeFormat(_))));
        assert!(matches!(decode(&[0, 0, 3, 0, 7]), Err(TagError::DecodeFormat(_))));
    }

    #[test]
    fn test_bad_uuid() {
        let mut bytes = vec![0, 2];
        bytes.extend_from_slice(&3u16.to_be_bytes());
        bytes.extend_from_slice(b"abc");
        bytes.extend_from_slice(&[0, 0, 0]);
        assert!(matches!(decode(&bytes), Err(TagError::DecodeFormat(_))));
    }
}
