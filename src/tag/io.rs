//! Big-endian binary codec for tags.
//!
//! A compound is a run of `(type id, name, payload)` entries closed by a `0` id.
//! Depth is the 1-based nesting level of a container; anything deeper than
//! [`MAX_DEPTH`] is rejected before its payload is touched. The writer enforces the
//! same bound, so everything it emits decodes again.

use super::compound::{Compound, ListTag, Tag, TagType};
use crate::core::{MAX_DEPTH, Result, TagError};
use std::io::{Read, Write};

// Upper bound on speculative preallocation for length-prefixed payloads.
const PREALLOC_LIMIT: usize = 1024;

pub(crate) fn check_depth(depth: usize) -> Result<()> {
    if depth > MAX_DEPTH {
        return Err(TagError::RecursionLimitExceeded {
            depth,
            max: MAX_DEPTH,
        });
    }
    Ok(())
}

fn check_write_depth(depth: usize) -> Result<()> {
    if depth > MAX_DEPTH {
        return Err(TagError::Encode(format!(
            "nesting depth {} exceeds {}",
            depth, MAX_DEPTH
        )));
    }
    Ok(())
}

pub(crate) fn read_u8<R: Read>(input: &mut R) -> Result<u8> {
    let mut buf = [0u8; 1];
    input.read_exact(&mut buf)?;
    Ok(buf[0])
}

pub(crate) fn read_i8<R: Read>(input: &mut R) -> Result<i8> {
    Ok(read_u8(input)? as i8)
}

fn read_i16<R: Read>(input: &mut R) -> Result<i16> {
    let mut buf = [0u8; 2];
    input.read_exact(&mut buf)?;
    Ok(i16::from_be_bytes(buf))
}

fn read_u16<R: Read>(input: &mut R) -> Result<u16> {
    let mut buf = [0u8; 2];
    input.read_exact(&mut buf)?;
    Ok(u16::from_be_bytes(buf))
}

fn read_i32<R: Read>(input: &mut R) -> Result<i32> {
    let mut buf = [0u8; 4];
    input.read_exact(&mut buf)?;
    Ok(i32::from_be_bytes(buf))
}

fn read_i64<R: Read>(input: &mut R) -> Result<i64> {
    let mut buf = [0u8; 8];
    input.read_exact(&mut buf)?;
    Ok(i64::from_be_bytes(buf))
}

fn read_len<R: Read>(input: &mut R) -> Result<usize> {
    let len = read_i32(input)?;
    usize::try_from(len)
        .map_err(|_| TagError::DecodeFormat(format!("negative length {}", len)))
}

pub(crate) fn read_string<R: Read>(input: &mut R) -> Result<String> {
    let len = read_u16(input)? as usize;
    let mut buf = vec![0u8; len];
    input.read_exact(&mut buf)?;
    String::from_utf8(buf).map_err(|e| TagError::DecodeFormat(format!("invalid UTF-8: {}", e)))
}

pub(crate) fn write_u8<W: Write>(out: &mut W, value: u8) -> Result<()> {
    out.write_all(&[value])?;
    Ok(())
}

pub(crate) fn write_i8<W: Write>(out: &mut W, value: i8) -> Result<()> {
    write_u8(out, value as u8)
}

pub(crate) fn write_string<W: Write>(out: &mut W, value: &str) -> Result<()> {
    let len = u16::try_from(value.len()).map_err(|_| {
        TagError::Encode(format!("string of {} bytes exceeds 65535", value.len()))
    })?;
    out.write_all(&len.to_be_bytes())?;
    out.write_all(value.as_bytes())?;
    Ok(())
}

fn write_len<W: Write>(out: &mut W, len: usize) -> Result<()> {
    let len = i32::try_from(len)
        .map_err(|_| TagError::Encode(format!("length {} exceeds i32::MAX", len)))?;
    out.write_all(&len.to_be_bytes())?;
    Ok(())
}

fn read_array<R, T, F, const N: usize>(input: &mut R, decode: F) -> Result<Vec<T>>
where
    R: Read,
    F: Fn([u8; N]) -> T,
{
    let len = read_len(input)?;
    let mut items = Vec::with_capacity(len.min(PREALLOC_LIMIT));
    let mut buf = [0u8; N];
    for _ in 0..len {
        input.read_exact(&mut buf)?;
        items.push(decode(buf));
    }
    Ok(items)
}

/// Read the payload of a tag whose type id has already been consumed.
pub fn read_payload<R: Read>(input: &mut R, tag_type: TagType, depth: usize) -> Result<Tag> {
    Ok(match tag_type {
        TagType::End => {
            return Err(TagError::DecodeFormat("END tag has no payload".to_string()));
        }
        TagType::Byte => Tag::Byte(read_i8(input)?),
        TagType::Short => Tag::Short(read_i16(input)?),
        TagType::Int => Tag::Int(read_i32(input)?),
        TagType::Long => Tag::Long(read_i64(input)?),
        TagType::Float => Tag::Float(f32::from_bits(read_i32(input)? as u32)),
        TagType::Double => Tag::Double(f64::from_bits(read_i64(input)? as u64)),
        TagType::ByteArray => Tag::ByteArray(read_array(input, |b: [u8; 1]| b[0] as i8)?),
        TagType::String => Tag::String(read_string(input)?),
        TagType::List => Tag::List(read_list(input, depth)?),
        TagType::Compound => Tag::Compound(Compound::read(input, depth)?),
        TagType::IntArray => Tag::IntArray(read_array(input, |b: [u8; 4]| i32::from_be_bytes(b))?),
        TagType::LongArray => Tag::LongArray(read_array(input, |b: [u8; 8]| i64::from_be_bytes(b))?),
    })
}

fn read_list<R: Read>(input: &mut R, depth: usize) -> Result<ListTag> {
    check_depth(depth)?;
    let element_type = TagType::from_id(read_u8(input)?)?;
    let len = read_len(input)?;
    if element_type == TagType::End && len > 0 {
        return Err(TagError::DecodeFormat(format!(
            "list of END with {} elements",
            len
        )));
    }
    let mut items = Vec::with_capacity(len.min(PREALLOC_LIMIT));
    for _ in 0..len {
        items.push(read_payload(input, element_type, depth + 1)?);
    }
    Ok(ListTag::from_parts(element_type, items))
}

/// Write the payload of `tag`, sitting at nesting level `depth`, without its type id or name.
pub fn write_payload<W: Write>(out: &mut W, tag: &Tag, depth: usize) -> Result<()> {
    match tag {
        Tag::Byte(v) => write_i8(out, *v)?,
        Tag::Short(v) => out.write_all(&v.to_be_bytes())?,
        Tag::Int(v) => out.write_all(&v.to_be_bytes())?,
        Tag::Long(v) => out.write_all(&v.to_be_bytes())?,
        Tag::Float(v) => out.write_all(&v.to_bits().to_be_bytes())?,
        Tag::Double(v) => out.write_all(&v.to_bits().to_be_bytes())?,
        Tag::ByteArray(v) => {
            write_len(out, v.len())?;
            let bytes: Vec<u8> = v.iter().map(|b| *b as u8).collect();
            out.write_all(&bytes)?;
        }
        Tag::String(v) => write_string(out, v)?,
        Tag::List(list) => {
            check_write_depth(depth)?;
            write_u8(out, list.element_type().id())?;
            write_len(out, list.len())?;
            for item in list.iter() {
                write_payload(out, item, depth + 1)?;
            }
        }
        Tag::Compound(c) => c.write_at(out, depth)?,
        Tag::IntArray(v) => {
            write_len(out, v.len())?;
            for item in v {
                out.write_all(&item.to_be_bytes())?;
            }
        }
        Tag::LongArray(v) => {
            write_len(out, v.len())?;
            for item in v {
                out.write_all(&item.to_be_bytes())?;
            }
        }
    }
    Ok(())
}

impl Compound {
    /// Decode a compound body at nesting level `depth`.
    pub fn read<R: Read>(input: &mut R, depth: usize) -> Result<Self> {
        check_depth(depth)?;
        let mut compound = Compound::new();
        loop {
            let tag_type = TagType::from_id(read_u8(input)?)?;
            if tag_type == TagType::End {
                break;
            }
            let name = read_string(input)?;
            let tag = read_payload(input, tag_type, depth + 1)?;
            compound.put(name, tag);
        }
        Ok(compound)
    }

    /// Encode the compound body as a top-level container. Entries holding an empty
    /// compound are skipped.
    pub fn write<W: Write>(&self, out: &mut W) -> Result<()> {
        self.write_at(out, 1)
    }

    fn write_at<W: Write>(&self, out: &mut W, depth: usize) -> Result<()> {
        check_write_depth(depth)?;
        for (name, tag) in self.iter() {
            if matches!(tag, Tag::Compound(child) if child.is_empty()) {
                continue;
            }
            write_u8(out, tag.tag_type().id())?;
            write_string(out, name)?;
            write_payload(out, tag, depth + 1)?;
        }
        write_u8(out, TagType::End.id())
    }
}

pub fn encode(compound: &Compound) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    compound.write(&mut out)?;
    Ok(out)
}

/// Decode a top-level compound; trailing bytes are a format error.
pub fn decode(bytes: &[u8]) -> Result<Compound> {
    let mut input = bytes;
    let compound = Compound::read(&mut input, 1)?;
    if !input.is_empty() {
        return Err(TagError::DecodeFormat(format!(
            "{} trailing bytes after compound",
            input.len()
        )));
    }
    Ok(compound)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Compound {
        let mut inner = Compound::new();
        inner.put_string("name", "lever");
        inner.put_double("angle", 12.5);
        inner.put("bytes", Tag::ByteArray(vec![-1, 0, 1]));

        let mut list_item = Compound::new();
        list_item.put_int("slot", 3);

        let mut c = Compound::new();
        c.put_byte("b", -3);
        c.put_short("s", 300);
        c.put_int("v", 42);
        c.put_long("l", i64::MIN);
        c.put_float("f", 1.5);
        c.put("ints", Tag::IntArray(vec![1, -2, 3]));
        c.put("longs", Tag::LongArray(vec![i64::MAX]));
        c.put(
            "items",
            ListTag::from_tags(vec![Tag::Compound(list_item)]).unwrap(),
        );
        c.put("empty_list", ListTag::new(TagType::End));
        c.put_compound("inner", inner);
        c
    }

    fn nested(levels: usize) -> Vec<u8> {
        // `levels` compounds, each holding the next under key "n".
        let mut out = Vec::new();
        for _ in 1..levels {
            out.push(TagType::Compound.id());
            out.extend_from_slice(&1u16.to_be_bytes());
            out.push(b'n');
        }
        // Innermost compound is empty, then close every level.
        out.extend(std::iter::repeat_n(0u8, levels));
        out
    }

    #[test]
    fn test_round_trip() {
        let c = sample();
        let bytes = encode(&c).unwrap();
        assert_eq!(decode(&bytes).unwrap(), c);
    }

    #[test]
    fn test_empty_compound_is_one_byte() {
        assert_eq!(encode(&Compound::new()).unwrap(), vec![0]);
    }

    #[test]
    fn test_empty_child_compound_skipped() {
        let mut c = Compound::new();
        c.put_compound("empty", Compound::new());
        c.put_int("v", 1);

        let decoded = decode(&encode(&c).unwrap()).unwrap();
        assert!(!decoded.contains_key("empty"));
        assert_eq!(decoded.get_int("v"), Some(1));
    }

    #[test]
    fn test_unknown_discriminant() {
        let bytes = [42u8, 0, 1, b'x', 0];
        assert!(matches!(decode(&bytes), Err(TagError::DecodeFormat(_))));
    }

    #[test]
    fn test_truncated_stream() {
        let bytes = encode(&sample()).unwrap();
        let cut = &bytes[..bytes.len() / 2];
        assert!(matches!(decode(cut), Err(TagError::DecodeFormat(_))));
    }

    #[test]
    fn test_trailing_bytes() {
        assert!(matches!(decode(&[0, 0]), Err(TagError::DecodeFormat(_))));
    }

    #[test]
    fn test_max_depth_accepted() {
        let decoded = decode(&nested(MAX_DEPTH)).unwrap();
        assert!(decoded.contains_key("n"));
    }

    #[test]
    fn test_depth_over_limit_rejected() {
        let err = decode(&nested(MAX_DEPTH + 1)).unwrap_err();
        assert!(matches!(
            err,
            TagError::RecursionLimitExceeded { depth: 513, max: 512 }
        ));
    }

    #[test]
    fn test_encoder_rejects_what_decoder_would() {
        let build = |levels: usize| {
            let mut tag = Compound::new();
            tag.put_int("leaf", 1);
            for _ in 1..levels {
                let mut outer = Compound::new();
                outer.put_compound("n", tag);
                tag = outer;
            }
            tag
        };

        let at_limit = encode(&build(MAX_DEPTH)).unwrap();
        assert_eq!(decode(&at_limit).unwrap(), build(MAX_DEPTH));
        assert!(matches!(encode(&build(MAX_DEPTH + 1)), Err(TagError::Encode(_))));
    }

    #[test]
    fn test_encoder_counts_lists_toward_depth() {
        let mut list = Tag::Int(1);
        for _ in 0..MAX_DEPTH {
            list = Tag::List(ListTag::from_tags(vec![list]).unwrap());
        }
        let mut c = Compound::new();
        c.put("l", list);
        assert!(matches!(encode(&c), Err(TagError::Encode(_))));
    }

    #[test]
    fn test_nested_lists_count_toward_depth() {
        // A list of lists 600 deep never reaches its payload.
        let mut out = Vec::new();
        out.push(TagType::List.id());
        out.extend_from_slice(&1u16.to_be_bytes());
        out.push(b'l');
        for _ in 0..600 {
            out.push(TagType::List.id());
            out.extend_from_slice(&1i32.to_be_bytes());
        }
        let err = decode(&out).unwrap_err();
        assert!(matches!(err, TagError::RecursionLimitExceeded { .. }));
    }

    #[test]
    fn test_negative_length() {
        let mut out = vec![TagType::IntArray.id()];
        out.extend_from_slice(&1u16.to_be_bytes());
        out.push(b'a');
        out.extend_from_slice(&(-1i32).to_be_bytes());
        assert!(matches!(decode(&out), Err(TagError::DecodeFormat(_))));
    }

    #[test]
    fn test_oversized_string_rejected() {
        let mut c = Compound::new();
        c.put_string("big", "x".repeat(70_000));
        assert!(matches!(encode(&c), Err(TagError::Encode(_))));
    }
}
