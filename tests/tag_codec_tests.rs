//! Binary codec through the public API

use regiontag::tag::file::{decode_compound, decode_region, encode_compound, encode_region};
use regiontag::tag::{decode, encode};
use regiontag::{
    BlockKey, ChunkCompound, Compound, Compression, ListTag, LocalChunkKey, MAX_DEPTH,
    RegionCompound, Tag, TagError, TagType,
};
use uuid::Uuid;

fn sample() -> Compound {
    let mut inner = Compound::new();
    inner.put_double("speed", 0.25);
    inner.put_float("scale", 1.5);

    let mut tag = Compound::new();
    tag.put_byte("b", -1);
    tag.put_short("s", 300);
    tag.put_int("i", 42);
    tag.put_long("l", i64::MIN);
    tag.put_string("name", "stone ✓");
    tag.put("bytes", Tag::ByteArray(vec![1, -2, 3]));
    tag.put("ints", Tag::IntArray(vec![i32::MAX, 0]));
    tag.put("longs", Tag::LongArray(vec![-7]));
    tag.put(
        "list",
        ListTag::from_tags(vec![Tag::Int(1), Tag::Int(2)]).unwrap(),
    );
    tag.put_compound("inner", inner);
    tag
}

/// `levels` compounds nested under key "n", the innermost holding one int.
fn nested(levels: usize) -> Compound {
    let mut tag = Compound::new();
    tag.put_int("leaf", 1);
    for _ in 1..levels {
        let mut outer = Compound::new();
        outer.put_compound("n", tag);
        tag = outer;
    }
    tag
}

#[test]
fn test_full_tag_set_round_trip() {
    let tag = sample();
    for compression in [Compression::Gzip, Compression::None] {
        let bytes = encode_compound(&tag, compression).unwrap();
        assert_eq!(decode_compound(&bytes).unwrap(), tag);
    }
}

#[test]
fn test_region_round_trip() {
    let mut chunk = ChunkCompound::new();
    *chunk.block_entry(BlockKey::new(3, 1, 7)) = sample();
    chunk.put_entity(Uuid::new_v4(), sample());
    chunk.chunk_compound_mut().put_int("version", 2);

    let mut region = RegionCompound::new();
    region.put_chunk(LocalChunkKey::new(31, 0).unwrap(), chunk);

    let bytes = encode_region(&region, Compression::Gzip).unwrap();
    assert_eq!(decode_region(&bytes).unwrap(), region);
}

#[test]
fn test_world_file_is_not_a_region_file() {
    let bytes = encode_compound(&sample(), Compression::None).unwrap();
    assert!(matches!(decode_region(&bytes), Err(TagError::DecodeFormat(_))));
}

#[test]
fn test_depth_limit_on_public_codec() {
    let at_limit = encode(&nested(MAX_DEPTH)).unwrap();
    assert!(decode(&at_limit).is_ok());

    // The writer refuses what the reader would refuse
    assert!(matches!(
        encode(&nested(MAX_DEPTH + 1)),
        Err(TagError::Encode(_))
    ));

    // Hand-spliced: wrap the valid stream in one more compound level
    let mut too_deep = vec![TagType::Compound.id(), 0, 1, b'n'];
    too_deep.extend_from_slice(&at_limit);
    too_deep.push(0);
    match decode(&too_deep) {
        Err(TagError::RecursionLimitExceeded { depth, max }) => {
            assert_eq!(depth, MAX_DEPTH + 1);
            assert_eq!(max, MAX_DEPTH);
        }
        other => panic!("expected recursion error, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_region_members_each_get_full_depth() {
    let mut chunk = ChunkCompound::new();
    *chunk.block_entry(BlockKey::new(0, 0, 0)) = nested(MAX_DEPTH);
    chunk.put_entity(Uuid::new_v4(), nested(MAX_DEPTH));
    *chunk.chunk_compound_mut() = nested(MAX_DEPTH);

    let mut region = RegionCompound::new();
    region.put_chunk(LocalChunkKey::new(0, 0).unwrap(), chunk);

    let bytes = encode_region(&region, Compression::None).unwrap();
    assert_eq!(decode_region(&bytes).unwrap(), region);
}

#[test]
fn test_unknown_tag_type_is_rejected() {
    let mut tag = Compound::new();
    tag.put_int("x", 1);
    let mut bytes = encode(&tag).unwrap();
    // First byte is the entry's type id
    bytes[0] = 99;
    assert!(matches!(
        decode(&bytes),
        Err(TagError::DecodeFormat(_))
    ));
    assert_eq!(TagType::from_id(3).unwrap(), TagType::Int);
}
