mod xz_codec;
mod zlib_codec;
mod zstd_codec;

pub use xz_codec::XzCodec;
pub use zlib_codec::ZlibCodec;
pub use zstd_codec::ZstdCodec;

use std::sync::Arc;

use uzconv_core::{Codec, ContainerKind};

/// Resolve the block codec for a container kind with its default level.
///
/// Used for the source side, where the kind comes from the file's tag.
pub fn codec_for(kind: ContainerKind) -> Arc<dyn Codec> {
    match kind {
        ContainerKind::Uzip => Arc::new(ZlibCodec::default()),
        ContainerKind::Ulzma => Arc::new(XzCodec::default()),
        ContainerKind::Uzstd => Arc::new(ZstdCodec::default()),
    }
}

/// Resolve the block codec for a container kind at an explicit level.
///
/// The level is clamped to the codec's range (zlib 0-9, xz preset 0-9,
/// zstd 1-22).
pub fn codec_with_level(kind: ContainerKind, level: i32) -> Arc<dyn Codec> {
    match kind {
        ContainerKind::Uzip => Arc::new(ZlibCodec::new(level.clamp(0, 9) as u32)),
        ContainerKind::Ulzma => Arc::new(XzCodec::new(level.clamp(0, 9) as u32)),
        ContainerKind::Uzstd => Arc::new(ZstdCodec::new(level.clamp(1, 22))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uzconv_core::CodecError;

    fn sample(len: usize) -> Vec<u8> {
        let pattern = b"block codecs must round trip exactly. ";
        (0..len).map(|i| pattern[i % pattern.len()]).collect()
    }

    #[test]
    fn every_kind_round_trips() {
        let data = sample(4096);
        for kind in ContainerKind::ALL {
            let codec = codec_for(kind);
            let packed = codec.compress_block(&data).unwrap();
            assert_eq!(codec.decompress_block(&packed, data.len()).unwrap(), data, "{kind}");
        }
    }

    #[test]
    fn short_block_is_size_mismatch() {
        let data = sample(4090);
        for kind in ContainerKind::ALL {
            let codec = codec_for(kind);
            let packed = codec.compress_block(&data).unwrap();
            let err = codec.decompress_block(&packed, 4096).unwrap_err();
            assert!(
                matches!(err, CodecError::SizeMismatch { expected: 4096, actual: 4090 }),
                "{kind}: {err}"
            );
            assert_eq!(codec.decompress_tail(&packed, 4096).unwrap().len(), 4090);
        }
    }

    #[test]
    fn long_block_is_rejected() {
        let data = sample(5000);
        for kind in ContainerKind::ALL {
            let codec = codec_for(kind);
            let packed = codec.compress_block(&data).unwrap();
            assert!(codec.decompress_block(&packed, 4096).is_err(), "{kind}");
            assert!(codec.decompress_tail(&packed, 4096).is_err(), "{kind}");
        }
    }

    #[test]
    fn garbage_is_decompression_error() {
        let junk = [0xffu8; 64];
        for kind in ContainerKind::ALL {
            let err = codec_for(kind).decompress_block(&junk, 4096).unwrap_err();
            assert!(matches!(err, CodecError::Decompression(_)), "{kind}: {err}");
        }
    }

    #[test]
    fn compressible_input_shrinks() {
        let zeros = vec![0u8; 65536];
        let text = sample(65536);
        for kind in ContainerKind::ALL {
            let codec = codec_for(kind);
            assert!(codec.compress_block(&zeros).unwrap().len() < 1024, "{kind}");
            assert!(codec.compress_block(&text).unwrap().len() < 4096, "{kind}");
        }
    }

    #[test]
    fn decoding_stops_one_byte_past_the_limit() {
        let big = vec![0u8; 8 << 20];
        for kind in ContainerKind::ALL {
            let codec = codec_for(kind);
            let packed = codec.compress_block(&big).unwrap();
            assert_eq!(codec.decompress_bounded(&packed, 4096).unwrap().len(), 4097, "{kind}");
            let err = codec.decompress_block(&packed, 4096).unwrap_err();
            assert!(
                matches!(err, CodecError::SizeMismatch { expected: 4096, actual: 4097 }),
                "{kind}: {err}"
            );
        }
    }

    #[test]
    fn xz_level_selects_preset() {
        let text = sample(65536);
        let fast = codec_with_level(ContainerKind::Ulzma, 0).compress_block(&text).unwrap();
        let small = codec_with_level(ContainerKind::Ulzma, 42).compress_block(&text).unwrap();
        let codec = XzCodec::new(9);
        assert_eq!(codec.preset, 9);
        assert_eq!(codec.decompress_block(&fast, text.len()).unwrap(), text);
        assert_eq!(codec.decompress_block(&small, text.len()).unwrap(), text);
    }

    #[test]
    fn empty_input_round_trips_through_tail_rules() {
        for kind in ContainerKind::ALL {
            let codec = codec_for(kind);
            let packed = codec.compress_block(&[]).unwrap();
            assert!(matches!(codec.decompress_tail(&packed, 16), Err(CodecError::EmptyTail)));
        }
    }
}
