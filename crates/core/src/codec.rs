//! Schema-versioned byte encoding for stored embedding vectors.
//!
//! New rows quantize each component to one signed byte; rows created before
//! [`QUANT_SCHEMA_CUTOFF`](crate::constants::QUANT_SCHEMA_CUTOFF) are raw
//! little-endian f32 and stay decodable forever without a backfill. Exactly
//! two formats have ever existed, so decode is a two-case dispatch on the
//! post timestamp rather than a format registry.

use chrono::{DateTime, Utc};

use crate::constants::QUANT_SCHEMA_CUTOFF;
use crate::error::{Error, Result};

/// Quantize a float vector to one signed byte per dimension.
///
/// Components are expected in [-1, 1] (unit-norm embeddings satisfy this);
/// out-of-range components saturate at ±127 rather than wrapping.
pub fn encode(vector: &[f32]) -> Vec<u8> {
    vector
        .iter()
        .map(|&x| {
            let q = (x * 127.0).round();
            q.clamp(-127.0, 127.0) as i8 as u8
        })
        .collect()
}

/// Decode a stored vector, choosing the codec from the post timestamp.
///
/// Posts at or after the cutoff are int8-quantized; older posts are raw
/// little-endian f32. The boundary is inclusive on the int8 side.
pub fn decode(bytes: &[u8], posted_at: DateTime<Utc>) -> Result<Vec<f32>> {
    if posted_at >= *QUANT_SCHEMA_CUTOFF {
        Ok(decode_quantized(bytes))
    } else {
        decode_legacy_f32(bytes)
    }
}

fn decode_quantized(bytes: &[u8]) -> Vec<f32> {
    bytes.iter().map(|&b| b as i8 as f32 / 127.0).collect()
}

fn decode_legacy_f32(bytes: &[u8]) -> Result<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return Err(Error::MalformedData(format!(
            "legacy f32 payload length {} is not a multiple of 4",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}

/// Encode a vector in the legacy raw-f32 format. Only test fixtures and the
/// one-off import tool write this; the pipeline always writes int8.
pub fn encode_legacy_f32(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|x| x.to_le_bytes()).collect()
}
