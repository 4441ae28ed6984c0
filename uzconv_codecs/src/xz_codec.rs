use std::io::{Read, Write};

use uzconv_core::codec::{Codec, CodecError};
use xz2::read::XzDecoder;
use xz2::stream::{Check, Stream};
use xz2::write::XzEncoder;

/// xz block codec (`ulzma` containers).
///
/// Each block is a self-contained `.xz` stream (LZMA2, CRC32 check), so any
/// block can be handed to a stock xz decoder on its own.
pub struct XzCodec {
    /// liblzma preset (0 = fastest, 9 = smallest).
    pub preset: u32,
}

impl Default for XzCodec {
    fn default() -> Self {
        Self { preset: 6 }
    }
}

impl XzCodec {
    pub fn new(preset: u32) -> Self {
        Self { preset: preset.min(9) }
    }
}

impl Codec for XzCodec {
    fn name(&self) -> &'static str {
        "xz"
    }

    fn compress_block(&self, raw: &[u8]) -> Result<Vec<u8>, CodecError> {
        let stream =
            Stream::new_easy_encoder(self.preset, Check::Crc32).map_err(|e| CodecError::Compression(e.to_string()))?;
        let mut encoder = XzEncoder::new_stream(Vec::with_capacity(raw.len() / 2 + 64), stream);
        encoder
            .write_all(raw)
            .map_err(|e| CodecError::Compression(e.to_string()))?;
        encoder.finish().map_err(|e| CodecError::Compression(e.to_string()))
    }

    fn decompress_bounded(&self, compressed: &[u8], limit: usize) -> Result<Vec<u8>, CodecError> {
        let mut raw = Vec::with_capacity(limit);
        XzDecoder::new(compressed)
            .take(limit as u64 + 1)
            .read_to_end(&mut raw)
            .map_err(|e| CodecError::Decompression(e.to_string()))?;
        Ok(raw)
    }
}
