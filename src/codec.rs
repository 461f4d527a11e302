//! Streaming base64 decoding for the fetch path.
//!
//! `base64 <path>` output arrives as discrete text lines that need not align
//! on 4-character group boundaries, so each line cannot be decoded
//! independently. [`Base64StreamDecoder`] carries the 0–3 trailing characters
//! of every call over to the next one and decodes only whole groups.

use base64::engine::general_purpose::STANDARD;
use base64::{DecodeError, Engine};

/// Incremental base64 decoder with an explicit carry-over remainder.
///
/// Invariant: after consuming `k` input characters in total, the remainder
/// holds exactly `k mod 4` characters. [`finalize`](Self::finalize) verifies
/// the stream ended on a group boundary.
#[derive(Debug, Default)]
pub struct Base64StreamDecoder {
    carry: Vec<u8>,
}

impl Base64StreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode the largest prefix of `carry + chunk` whose length is a
    /// multiple of four; the rest becomes the new carry-over.
    pub fn update(&mut self, chunk: &[u8]) -> Result<Vec<u8>, DecodeError> {
        let mut data = std::mem::take(&mut self.carry);
        data.extend_from_slice(chunk);

        let remainder = data.len() % 4;
        self.carry = data.split_off(data.len() - remainder);

        if data.is_empty() {
            return Ok(Vec::new());
        }
        STANDARD.decode(&data)
    }

    /// Number of characters currently carried over (0–3).
    pub fn carry_len(&self) -> usize {
        self.carry.len()
    }

    /// Validate end-of-stream: any unconsumed remainder means the encoded
    /// stream was truncated or corrupted.
    pub fn finalize(self) -> Result<(), DecodeError> {
        if self.carry.is_empty() {
            Ok(())
        } else {
            Err(DecodeError::InvalidLength(self.carry.len()))
        }
    }
}
