//! Native `VPSMAP` binary map blob.
//!
//! Format (little-endian):
//! - Header (12 bytes):
//!   - Magic: "VPSMAP" (6 bytes)
//!   - Version: u8
//!   - Reserved: u8
//!   - Point count: u32
//! - Map-to-ECEF transform: 16 x f64, row-major (128 bytes)
//! - Points: count x 3 x f32 (`x, y, z` per point)

use std::path::Path;

use anyhow::Context;
use nalgebra::{Matrix4, Vector3};
use thiserror::Error;

use crate::atlas::MapData;
use crate::geometry::MapToEcef;

/// Magic bytes for the map blob.
pub const MAGIC: &[u8; 6] = b"VPSMAP";

/// Current format version.
pub const VERSION: u8 = 1;

const HEADER_SIZE: usize = 12;
const TRANSFORM_SIZE: usize = 16 * 8;
const POINT_SIZE: usize = 3 * 4;

#[derive(Debug, Error, PartialEq)]
pub enum MapFileError {
    #[error("blob too short: need {needed} bytes, got {got}")]
    Truncated { needed: usize, got: usize },

    #[error("bad magic bytes")]
    BadMagic,

    #[error("unsupported version {found} (expected {expected})")]
    VersionMismatch { expected: u8, found: u8 },

    #[error("{0} trailing bytes after point data")]
    TrailingBytes(usize),

    #[error("invalid transform: {0}")]
    Transform(String),
}

/// Pluggable parser for map sources.
///
/// The registry owns exactly one decoder. Errors are reported to the caller
/// as `MapLoad` with the decoder's message.
pub trait MapDecoder: Send + Sync {
    fn decode(&self, bytes: &[u8]) -> anyhow::Result<MapData>;
}

/// Decoder for the native `VPSMAP` blob.
#[derive(Debug, Default, Clone, Copy)]
pub struct VpsMapDecoder;

impl MapDecoder for VpsMapDecoder {
    fn decode(&self, bytes: &[u8]) -> anyhow::Result<MapData> {
        Ok(decode_map(bytes)?)
    }
}

/// Serialize a map into a `VPSMAP` blob.
pub fn encode_map(data: &MapData) -> Vec<u8> {
    let count = data.points.len();
    let mut out = Vec::with_capacity(HEADER_SIZE + TRANSFORM_SIZE + count * POINT_SIZE);

    out.extend_from_slice(MAGIC);
    out.push(VERSION);
    out.push(0);
    out.extend_from_slice(&(count as u32).to_le_bytes());

    for v in data.map_to_ecef.to_row_major() {
        out.extend_from_slice(&v.to_le_bytes());
    }

    for p in &data.points {
        out.extend_from_slice(&p.x.to_le_bytes());
        out.extend_from_slice(&p.y.to_le_bytes());
        out.extend_from_slice(&p.z.to_le_bytes());
    }

    out
}

/// Parse a `VPSMAP` blob.
pub fn decode_map(bytes: &[u8]) -> Result<MapData, MapFileError> {
    if bytes.len() < HEADER_SIZE {
        return Err(MapFileError::Truncated {
            needed: HEADER_SIZE,
            got: bytes.len(),
        });
    }

    if &bytes[0..6] != MAGIC {
        return Err(MapFileError::BadMagic);
    }

    let version = bytes[6];
    if version != VERSION {
        return Err(MapFileError::VersionMismatch {
            expected: VERSION,
            found: version,
        });
    }

    let count = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize;
    let needed = HEADER_SIZE + TRANSFORM_SIZE + count * POINT_SIZE;
    if bytes.len() < needed {
        return Err(MapFileError::Truncated {
            needed,
            got: bytes.len(),
        });
    }
    if bytes.len() > needed {
        return Err(MapFileError::TrailingBytes(bytes.len() - needed));
    }

    let mut values = [0.0f64; 16];
    for (i, chunk) in bytes[HEADER_SIZE..HEADER_SIZE + TRANSFORM_SIZE]
        .chunks_exact(8)
        .enumerate()
    {
        values[i] = f64::from_le_bytes([
            chunk[0], chunk[1], chunk[2], chunk[3], chunk[4], chunk[5], chunk[6], chunk[7],
        ]);
    }
    let map_to_ecef = MapToEcef::from_matrix(Matrix4::from_row_slice(&values))
        .map_err(|e| MapFileError::Transform(e.to_string()))?;

    let points = bytes[HEADER_SIZE + TRANSFORM_SIZE..]
        .chunks_exact(POINT_SIZE)
        .map(|c| {
            Vector3::new(
                f32::from_le_bytes([c[0], c[1], c[2], c[3]]),
                f32::from_le_bytes([c[4], c[5], c[6], c[7]]),
                f32::from_le_bytes([c[8], c[9], c[10], c[11]]),
            )
        })
        .collect();

    Ok(MapData {
        points,
        map_to_ecef,
    })
}

/// Write a map blob to disk.
pub fn save_map(data: &MapData, path: &Path) -> anyhow::Result<()> {
    std::fs::write(path, encode_map(data))
        .with_context(|| format!("failed to write map file {}", path.display()))
}

/// Read and parse a map blob from disk.
pub fn load_map(path: &Path) -> anyhow::Result<MapData> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("failed to read map file {}", path.display()))?;
    decode_map(&bytes).with_context(|| format!("failed to parse map file {}", path.display()))
}
