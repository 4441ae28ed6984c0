use std::io::Read;

use uzconv_core::codec::{Codec, CodecError};

/// Zstandard block codec (`uzstd` containers).
///
/// Each block is an independent zstd frame compressed at the configured
/// level (default: 3).
pub struct ZstdCodec {
    /// Compression level (1 = fast / larger, 22 = slow / smallest).
    pub level: i32,
}

impl Default for ZstdCodec {
    fn default() -> Self {
        Self { level: 3 }
    }
}

impl ZstdCodec {
    pub fn new(level: i32) -> Self {
        Self { level }
    }
}

impl Codec for ZstdCodec {
    fn name(&self) -> &'static str {
        "zstd"
    }

    fn compress_block(&self, raw: &[u8]) -> Result<Vec<u8>, CodecError> {
        zstd::bulk::compress(raw, self.level).map_err(|e| CodecError::Compression(e.to_string()))
    }

    fn decompress_bounded(&self, compressed: &[u8], limit: usize) -> Result<Vec<u8>, CodecError> {
        let decoder =
            zstd::stream::read::Decoder::new(compressed).map_err(|e| CodecError::Decompression(e.to_string()))?;
        let mut raw = Vec::with_capacity(limit);
        decoder
            .take(limit as u64 + 1)
            .read_to_end(&mut raw)
            .map_err(|e| CodecError::Decompression(e.to_string()))?;
        Ok(raw)
    }
}
