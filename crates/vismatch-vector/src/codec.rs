//! Byte layout for stored embeddings.
//!
//! A vector of `D` elements is exactly `4 * D` bytes: IEEE-754 single
//! precision, little-endian, elements in order, no header and no padding.
//! This is the persisted and wire format, so it must not change.

use vismatch_core::{Error, Result};

/// Size in bytes of one encoded element.
pub const BYTES_PER_ELEMENT: usize = std::mem::size_of::<f32>();

/// Encode any slice of floats. Never fails.
pub fn encode_f32_le(vector: &[f32]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(vector.len() * BYTES_PER_ELEMENT);
    for value in vector {
        buf.extend_from_slice(&value.to_le_bytes());
    }
    buf
}

/// Decode a buffer of little-endian floats of any length.
///
/// Fails if the buffer length is not a multiple of four.
pub fn decode_f32_le(bytes: &[u8]) -> Result<Vec<f32>> {
    if bytes.len() % BYTES_PER_ELEMENT != 0 {
        return Err(Error::format(format!(
            "buffer length {} is not a multiple of {BYTES_PER_ELEMENT}",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(BYTES_PER_ELEMENT)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

/// Dimension-checked codec for one configured embedding size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VectorCodec {
    dimension: usize,
}

impl VectorCodec {
    /// Create a codec for vectors of `dimension` elements.
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    /// The configured dimension.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Encoded size of one vector.
    pub fn encoded_len(&self) -> usize {
        self.dimension * BYTES_PER_ELEMENT
    }

    /// Encode a vector, rejecting the wrong length.
    pub fn encode(&self, vector: &[f32]) -> Result<Vec<u8>> {
        if vector.len() != self.dimension {
            return Err(Error::dimension(self.dimension, vector.len()));
        }
        Ok(encode_f32_le(vector))
    }

    /// Decode a vector, rejecting malformed buffers and the wrong element count.
    pub fn decode(&self, bytes: &[u8]) -> Result<Vec<f32>> {
        let vector = decode_f32_le(bytes)?;
        if vector.len() != self.dimension {
            return Err(Error::format(format!(
                "expected {} elements, buffer holds {}",
                self.dimension,
                vector.len()
            )));
        }
        Ok(vector)
    }
}

// ============================================================================
// Tests
// ============================================================================
