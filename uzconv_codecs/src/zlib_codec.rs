use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use uzconv_core::codec::{Codec, CodecError};

/// zlib block codec (`uzip` containers).
///
/// Blocks are complete zlib streams (RFC 1950). The default level is 9, which
/// is what image builders use for read-mostly media.
pub struct ZlibCodec {
    /// Compression level (0 = store, 9 = smallest).
    pub level: u32,
}

impl Default for ZlibCodec {
    fn default() -> Self {
        Self { level: 9 }
    }
}

impl ZlibCodec {
    pub fn new(level: u32) -> Self {
        Self { level: level.min(9) }
    }
}

impl Codec for ZlibCodec {
    fn name(&self) -> &'static str {
        "zlib"
    }

    fn compress_block(&self, raw: &[u8]) -> Result<Vec<u8>, CodecError> {
        let mut encoder = ZlibEncoder::new(Vec::with_capacity(raw.len() / 2 + 64), Compression::new(self.level));
        encoder
            .write_all(raw)
            .map_err(|e| CodecError::Compression(e.to_string()))?;
        encoder.finish().map_err(|e| CodecError::Compression(e.to_string()))
    }

    fn decompress_bounded(&self, compressed: &[u8], limit: usize) -> Result<Vec<u8>, CodecError> {
        let mut raw = Vec::with_capacity(limit);
        ZlibDecoder::new(compressed)
            .take(limit as u64 + 1)
            .read_to_end(&mut raw)
            .map_err(|e| CodecError::Decompression(e.to_string()))?;
        Ok(raw)
    }
}
