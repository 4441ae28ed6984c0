use thiserror::Error;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("compression error: {0}")]
    Compression(String),
    #[error("decompression error: {0}")]
    Decompression(String),
    /// The block decompressed cleanly but to the wrong length, which means
    /// the source block is corrupt.
    #[error("decompressed to {actual} bytes, expected {expected}")]
    SizeMismatch { expected: usize, actual: usize },
    #[error("final block decompressed to {actual} bytes, more than the block size {limit}")]
    TailTooLong { limit: usize, actual: usize },
    #[error("final block decompressed to zero bytes")]
    EmptyTail,
}

/// Plaintext size rule for one block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawLen {
    /// Every block but the last holds exactly one block size of plaintext.
    Exact(usize),
    /// The last block may be short.
    AtMost(usize),
}

/// Block compression capability.
///
/// Each `Codec` implementation:
/// - Compresses and decompresses blocks independently; no cross-block state.
/// - Is shared by every worker thread, so it must be `Send + Sync`. Per-call
///   encoder state lives on the stack of the call.
pub trait Codec: Send + Sync {
    /// Human-readable codec name for logs and CLI display.
    fn name(&self) -> &'static str;

    /// Compress a single block of plaintext.
    fn compress_block(&self, raw: &[u8]) -> Result<Vec<u8>, CodecError>;

    /// Decompress a single block, producing at most `limit + 1` bytes.
    ///
    /// Implementations may stop early once the output exceeds `limit`; the
    /// size checks in [`decompress_block`](Codec::decompress_block) and
    /// [`decompress_tail`](Codec::decompress_tail) reject such output.
    fn decompress_bounded(&self, compressed: &[u8], limit: usize) -> Result<Vec<u8>, CodecError>;

    /// Decompress a block that must yield exactly `expected_len` bytes.
    fn decompress_block(&self, compressed: &[u8], expected_len: usize) -> Result<Vec<u8>, CodecError> {
        let raw = self.decompress_bounded(compressed, expected_len)?;
        if raw.len() != expected_len {
            return Err(CodecError::SizeMismatch {
                expected: expected_len,
                actual: raw.len(),
            });
        }
        Ok(raw)
    }

    /// Decompress the final block, which may be shorter than `max_len` but
    /// never empty.
    fn decompress_tail(&self, compressed: &[u8], max_len: usize) -> Result<Vec<u8>, CodecError> {
        let raw = self.decompress_bounded(compressed, max_len)?;
        if raw.is_empty() {
            return Err(CodecError::EmptyTail);
        }
        if raw.len() > max_len {
            return Err(CodecError::TailTooLong {
                limit: max_len,
                actual: raw.len(),
            });
        }
        Ok(raw)
    }

    /// Decompress according to a [`RawLen`] rule.
    fn decompress_as(&self, compressed: &[u8], len: RawLen) -> Result<Vec<u8>, CodecError> {
        match len {
            RawLen::Exact(n) => self.decompress_block(compressed, n),
            RawLen::AtMost(n) => self.decompress_tail(compressed, n),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Identity codec that truncates at the bound like a real streaming decoder.
    struct Verbatim;

    impl Codec for Verbatim {
        fn name(&self) -> &'static str {
            "verbatim"
        }
        fn compress_block(&self, raw: &[u8]) -> Result<Vec<u8>, CodecError> {
            Ok(raw.to_vec())
        }
        fn decompress_bounded(&self, compressed: &[u8], limit: usize) -> Result<Vec<u8>, CodecError> {
            Ok(compressed[..compressed.len().min(limit + 1)].to_vec())
        }
    }

    #[test]
    fn exact_length_is_enforced() {
        assert_eq!(Verbatim.decompress_block(&[1, 2, 3, 4], 4).unwrap(), [1, 2, 3, 4]);
        assert!(matches!(
            Verbatim.decompress_block(&[1, 2, 3], 4),
            Err(CodecError::SizeMismatch { expected: 4, actual: 3 })
        ));
        assert!(matches!(
            Verbatim.decompress_block(&[0; 10], 4),
            Err(CodecError::SizeMismatch { expected: 4, actual: 5 })
        ));
    }

    #[test]
    fn tail_may_be_short_but_not_empty_or_long() {
        assert_eq!(Verbatim.decompress_tail(&[9; 3], 4).unwrap().len(), 3);
        assert!(matches!(Verbatim.decompress_tail(&[], 4), Err(CodecError::EmptyTail)));
        assert!(matches!(
            Verbatim.decompress_tail(&[0; 6], 4),
            Err(CodecError::TailTooLong { limit: 4, actual: 5 })
        ));
    }
}
