use std::io::{self, Read, Seek, SeekFrom};

use tracing::debug;

use crate::codec::RawLen;
use crate::error::{Error, Result};
use crate::format::{decode_offsets, offset_table_len, ContainerKind, Header, HEADER_SIZE, OFFSET_ENTRY_SIZE};

/// Random-access reader for compressed-image containers.
///
/// # Open sequence
/// 1. Measure the stream length.
/// 2. Read the 136-byte header (shebang check, format tag, block size/count).
/// 3. Read the `block_count + 1` entry offset table that follows it. The table
///    and every offset in it must lie within the stream.
///
/// # Access pattern
/// [`read_block`](Reader::read_block) seeks to the block's offset and reads its
/// still-compressed payload. Nothing is cached; every call re-seeks.
pub struct Reader<R> {
    stream: R,
    header: Header,
    offsets: Vec<u64>,
}

impl<R: Read + Seek> Reader<R> {
    /// Parse the header and offset table from `stream`.
    pub fn open(mut stream: R) -> Result<Self> {
        let stream_len = stream.seek(SeekFrom::End(0))?;
        stream.seek(SeekFrom::Start(0))?;

        let mut header_buf = [0u8; HEADER_SIZE as usize];
        read_exact_or(&mut stream, &mut header_buf, "header")?;
        let header = Header::from_bytes(&header_buf)?;

        // checked before allocating: block_count comes straight from the file
        if header.data_start() > stream_len {
            return Err(Error::Format(format!(
                "truncated offset table: {} blocks need {} bytes, stream is {} bytes",
                header.block_count,
                header.data_start(),
                stream_len
            )));
        }
        let mut table = vec![0u8; offset_table_len(header.block_count) * OFFSET_ENTRY_SIZE as usize];
        read_exact_or(&mut stream, &mut table, "offset table")?;
        let offsets = decode_offsets(&table, header.block_count)?;

        let end = offsets[offsets.len() - 1];
        if end > stream_len {
            return Err(Error::Format(format!(
                "offset table ends at {end}, past the end of the {stream_len} byte stream"
            )));
        }

        debug!(
            kind = %header.kind,
            block_size = header.block_size,
            block_count = header.block_count,
            "opened source container"
        );

        Ok(Self {
            stream,
            header,
            offsets,
        })
    }

    /// Read the compressed payload of block `index`.
    pub fn read_block(&mut self, index: u32) -> Result<Vec<u8>> {
        let count = self.block_count();
        if index >= count {
            return Err(Error::Range { index, count });
        }
        let start = self.offsets[index as usize];
        let end = self.offsets[index as usize + 1];

        self.stream.seek(SeekFrom::Start(start))?;
        let mut buf = vec![0u8; (end - start) as usize];
        self.stream.read_exact(&mut buf)?;
        Ok(buf)
    }
}

impl<R> Reader<R> {
    pub fn header(&self) -> &Header {
        &self.header
    }

    #[inline]
    pub fn kind(&self) -> ContainerKind {
        self.header.kind
    }

    #[inline]
    pub fn block_count(&self) -> u32 {
        self.header.block_count
    }

    /// Plaintext bytes per block (the last block may be smaller).
    #[inline]
    pub fn block_size(&self) -> u32 {
        self.header.block_size
    }

    /// The full `block_count + 1` entry offset table.
    pub fn offsets(&self) -> &[u64] {
        &self.offsets
    }

    /// Total compressed payload bytes (excluding header and table).
    pub fn payload_size(&self) -> u64 {
        self.offsets[self.offsets.len() - 1] - self.offsets[0]
    }

    /// Plaintext size rule for block `index`.
    pub fn raw_len(&self, index: u32) -> RawLen {
        let block_size = self.header.block_size as usize;
        if u64::from(index) + 1 == u64::from(self.header.block_count) {
            RawLen::AtMost(block_size)
        } else {
            RawLen::Exact(block_size)
        }
    }

    pub fn into_inner(self) -> R {
        self.stream
    }
}

/// `read_exact` that reports a truncated header region as a format error.
fn read_exact_or<R: Read>(stream: &mut R, buf: &mut [u8], what: &str) -> Result<()> {
    stream.read_exact(buf).map_err(|e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            Error::Format(format!("truncated {what}: need {} bytes", buf.len()))
        } else {
            Error::Io(e)
        }
    })
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::format::{data_start, encode_offsets};

    fn container(payloads: &[&[u8]], block_size: u32) -> Vec<u8> {
        let count = payloads.len() as u32;
        let mut buf = Header {
            kind: ContainerKind::Uzip,
            block_size,
            block_count: count,
        }
        .to_bytes()
        .to_vec();
        let mut offsets = vec![data_start(count)];
        for p in payloads {
            offsets.push(offsets[offsets.len() - 1] + p.len() as u64);
        }
        buf.extend(encode_offsets(&offsets));
        for p in payloads {
            buf.extend_from_slice(p);
        }
        buf
    }

    #[test]
    fn reads_blocks_by_index() {
        let bytes = container(&[b"alpha".as_slice(), b"".as_slice(), b"gamma!".as_slice()], 16);
        let mut r = Reader::open(Cursor::new(bytes)).unwrap();
        assert_eq!(r.block_count(), 3);
        assert_eq!(r.block_size(), 16);
        assert_eq!(r.kind(), ContainerKind::Uzip);
        assert_eq!(r.read_block(2).unwrap(), b"gamma!");
        assert_eq!(r.read_block(0).unwrap(), b"alpha");
        assert!(r.read_block(1).unwrap().is_empty());
        assert_eq!(r.payload_size(), 11);
        assert_eq!(r.raw_len(1), RawLen::Exact(16));
        assert_eq!(r.raw_len(2), RawLen::AtMost(16));
    }

    #[test]
    fn out_of_range_index() {
        let mut r = Reader::open(Cursor::new(container(&[b"x".as_slice()], 4))).unwrap();
        assert!(matches!(r.read_block(1), Err(Error::Range { index: 1, count: 1 })));
    }

    #[test]
    fn short_stream_is_format_error() {
        let bytes = container(&[b"abc".as_slice()], 4);
        let err = Reader::open(Cursor::new(bytes[..100].to_vec())).err().unwrap();
        assert!(matches!(err, Error::Format(_)), "{err}");

        // header intact, offset table cut short
        let err = Reader::open(Cursor::new(bytes[..140].to_vec())).err().unwrap();
        assert!(matches!(err, Error::Format(_)), "{err}");
    }

    #[test]
    fn truncated_payload_is_format_error() {
        let mut bytes = container(&[b"abcdef".as_slice()], 8);
        bytes.truncate(bytes.len() - 2);
        let err = Reader::open(Cursor::new(bytes)).err().unwrap();
        assert!(matches!(err, Error::Format(_)), "{err}");
    }

    #[test]
    fn offset_past_end_of_stream_is_rejected() {
        let mut bytes = container(&[b"abcd".as_slice()], 8);
        let d = data_start(1);
        let table = encode_offsets(&[d, d + (1 << 62)]);
        bytes[HEADER_SIZE as usize..d as usize].copy_from_slice(&table);
        let err = Reader::open(Cursor::new(bytes)).err().unwrap();
        assert!(matches!(err, Error::Format(_)), "{err}");
    }

    #[test]
    fn huge_block_count_is_rejected_before_reading_table() {
        let mut bytes = container(&[b"abcd".as_slice()], 8);
        bytes[132..136].copy_from_slice(&u32::MAX.to_be_bytes());
        let err = Reader::open(Cursor::new(bytes)).err().unwrap();
        assert!(err.to_string().contains("truncated offset table"), "{err}");
    }

    #[test]
    fn trailing_bytes_after_last_block_are_ignored() {
        let mut bytes = container(&[b"abcd".as_slice()], 8);
        bytes.extend_from_slice(b"pad");
        let mut r = Reader::open(Cursor::new(bytes)).unwrap();
        assert_eq!(r.read_block(0).unwrap(), b"abcd");
    }
}
