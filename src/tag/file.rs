//! On-disk framing for region and world files.
//!
//! A file is `kind byte + payload`, optionally wrapped in gzip. Readers sniff the
//! gzip magic, so files written under either compression setting stay readable.

use super::compound::{Compound, TagType};
use super::io::{read_u8, write_u8};
use super::region::RegionCompound;
use crate::core::{Result, TagError};
use flate2::Compression as GzLevel;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{Read, Write};
use std::path::Path;
use tempfile::NamedTempFile;

/// Kind byte of a region file.
pub const REGION_FILE_KIND: u8 = 101;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    #[default]
    Gzip,
    None,
}

fn wrap_payload(payload: Vec<u8>, compression: Compression) -> Result<Vec<u8>> {
    match compression {
        Compression::None => Ok(payload),
        Compression::Gzip => {
            let mut encoder = GzEncoder::new(Vec::new(), GzLevel::default());
            encoder.write_all(&payload)?;
            Ok(encoder.finish()?)
        }
    }
}

fn unwrap_payload(bytes: &[u8]) -> Result<Vec<u8>> {
    if bytes.starts_with(&GZIP_MAGIC) {
        let mut decoder = GzDecoder::new(bytes);
        let mut out = Vec::new();
        decoder
            .read_to_end(&mut out)
            .map_err(|e| TagError::DecodeFormat(format!("bad gzip stream: {}", e)))?;
        Ok(out)
    } else {
        Ok(bytes.to_vec())
    }
}

fn expect_kind<R: Read>(input: &mut R, kind: u8) -> Result<()> {
    let found = read_u8(input)?;
    if found != kind {
        return Err(TagError::DecodeFormat(format!(
            "expected file kind {}, found {}",
            kind, found
        )));
    }
    Ok(())
}

fn expect_consumed(rest: &[u8]) -> Result<()> {
    if !rest.is_empty() {
        return Err(TagError::DecodeFormat(format!(
            "{} trailing bytes in file",
            rest.len()
        )));
    }
    Ok(())
}

pub fn encode_region(region: &RegionCompound, compression: Compression) -> Result<Vec<u8>> {
    let mut payload = Vec::new();
    write_u8(&mut payload, REGION_FILE_KIND)?;
    region.write(&mut payload)?;
    wrap_payload(payload, compression)
}

pub fn decode_region(bytes: &[u8]) -> Result<RegionCompound> {
    let payload = unwrap_payload(bytes)?;
    let mut input = payload.as_slice();
    expect_kind(&mut input, REGION_FILE_KIND)?;
    let region = RegionCompound::read(&mut input)?;
    expect_consumed(input)?;
    Ok(region)
}

pub fn encode_compound(compound: &Compound, compression: Compression) -> Result<Vec<u8>> {
    let mut payload = Vec::new();
    write_u8(&mut payload, TagType::Compound.id())?;
    compound.write(&mut payload)?;
    wrap_payload(payload, compression)
}

pub fn decode_compound(bytes: &[u8]) -> Result<Compound> {
    let payload = unwrap_payload(bytes)?;
    let mut input = payload.as_slice();
    expect_kind(&mut input, TagType::Compound.id())?;
    let compound = Compound::read(&mut input, 1)?;
    expect_consumed(input)?;
    Ok(compound)
}

pub fn read_region_file(path: &Path) -> Result<RegionCompound> {
    decode_region(&fs::read(path)?)
}

pub fn write_region_file(path: &Path, region: &RegionCompound, compression: Compression) -> Result<()> {
    write_atomic(path, &encode_region(region, compression)?)
}

pub fn read_compound_file(path: &Path) -> Result<Compound> {
    decode_compound(&fs::read(path)?)
}

pub fn write_compound_file(path: &Path, compound: &Compound, compression: Compression) -> Result<()> {
    write_atomic(path, &encode_compound(compound, compression)?)
}

/// Write to a temp file beside `path`, sync, then rename over it.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut temp = NamedTempFile::new_in(parent)?;
    temp.write_all(bytes)?;
    temp.flush()?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| TagError::from(e.error))?;
    Ok(())
}
