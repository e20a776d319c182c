//! Raw message compression codec
//!
//! Raw RFC 5322 bytes are stored zlib-compressed and base64-encoded so the
//! `raw` column stays plain text. Encoding never fails the caller: an empty
//! string is stored instead, while `rawsize` keeps the original length.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::io::{Read, Write};
use tracing::warn;

use crate::error::{InboxError, Result};

/// Reversible byte compression used for the stored raw message
pub trait Compressor: Send + Sync {
    fn compress(&self, bytes: &[u8]) -> Result<Vec<u8>>;
    fn decompress(&self, bytes: &[u8]) -> Result<Vec<u8>>;
}

/// zlib (deflate) compressor
#[derive(Debug, Clone, Copy)]
pub struct DeflateCompressor {
    level: Compression,
}

impl DeflateCompressor {
    pub fn new(level: u32) -> Self {
        Self {
            level: Compression::new(level.min(9)),
        }
    }
}

impl Default for DeflateCompressor {
    fn default() -> Self {
        Self {
            level: Compression::default(),
        }
    }
}

impl Compressor for DeflateCompressor {
    fn compress(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        let mut encoder = ZlibEncoder::new(Vec::new(), self.level);
        encoder.write_all(bytes)?;
        Ok(encoder.finish()?)
    }

    fn decompress(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        let mut decoder = ZlibDecoder::new(bytes);
        let mut out = Vec::new();
        decoder
            .read_to_end(&mut out)
            .map_err(|e| InboxError::Codec(format!("inflate failed: {}", e)))?;
        Ok(out)
    }
}

/// Compress and base64-encode raw bytes.
///
/// Returns an empty string when compression fails.
pub fn encode(compressor: &dyn Compressor, bytes: &[u8]) -> String {
    match compressor.compress(bytes) {
        Ok(compressed) => BASE64.encode(compressed),
        Err(e) => {
            warn!("Raw message compression failed ({} bytes): {}", bytes.len(), e);
            String::new()
        }
    }
}

/// Inverse of [`encode`].
///
/// An empty input means the raw message was never stored, which is an error
/// here since the caller asked for the exact bytes.
pub fn decode(compressor: &dyn Compressor, encoded: &str) -> Result<Vec<u8>> {
    if encoded.is_empty() {
        return Err(InboxError::Codec("raw message was not stored".to_string()));
    }

    let compressed = BASE64
        .decode(encoded.trim())
        .map_err(|e| InboxError::Codec(format!("invalid base64: {}", e)))?;

    compressor.decompress(&compressed)
}
