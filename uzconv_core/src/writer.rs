use std::io::{Seek, SeekFrom, Write};

use tracing::debug;

use crate::error::{Error, Result};
use crate::format::{data_start, encode_offsets, offset_table_len, ContainerKind, Header};

/// Sequential writer for compressed-image containers.
///
/// # Write contract
/// The block count is known up front, so the header and offset table size is
/// too. [`create`](Writer::create) positions the stream at the data region;
/// call [`append`](Writer::append) exactly `block_count` times with the
/// compressed blocks in index order, then [`finish`](Writer::finish) once.
///
/// # Format layout written
/// ```text
/// [HEADER: 136 bytes]                      ← written by finish()
/// [OFFSET TABLE: 8 bytes × (N + 1)]        ← written by finish()
/// [BLOCK 0] [BLOCK 1] ... [BLOCK N-1]      ← written by append()
/// ```
///
/// The writer does not reorder: supplying blocks in index order is the
/// caller's job.
pub struct Writer<W> {
    stream: W,
    header: Header,
    /// `offsets[i]` is the absolute position of block `i`; grows by one entry
    /// per append.
    offsets: Vec<u64>,
    finished: bool,
}

impl<W: Write + Seek> Writer<W> {
    /// Prepare `stream` for a container of `block_count` blocks.
    ///
    /// Nothing is written yet; the stream is only positioned at the start of
    /// the data region.
    pub fn create(mut stream: W, kind: ContainerKind, block_size: u32, block_count: u32) -> Result<Self> {
        let start = data_start(block_count);
        stream.seek(SeekFrom::Start(start))?;

        let mut offsets = Vec::with_capacity(offset_table_len(block_count));
        offsets.push(start);

        Ok(Self {
            stream,
            header: Header {
                kind,
                block_size,
                block_count,
            },
            offsets,
            finished: false,
        })
    }

    /// Write the next block's compressed bytes.
    pub fn append(&mut self, block: &[u8]) -> Result<()> {
        if self.finished {
            return Err(Error::Sequence("append called after finish".into()));
        }
        if self.appended() >= self.header.block_count {
            return Err(Error::Sequence(format!(
                "append beyond declared block count {}",
                self.header.block_count
            )));
        }

        self.stream.write_all(block)?;
        let next = self.offsets[self.offsets.len() - 1] + block.len() as u64;
        self.offsets.push(next);
        Ok(())
    }

    /// Seal the container: write the header and the full offset table.
    pub fn finish(&mut self) -> Result<()> {
        if self.finished {
            return Err(Error::Sequence("finish called twice".into()));
        }
        if self.appended() != self.header.block_count {
            return Err(Error::Sequence(format!(
                "finish after {} of {} blocks",
                self.appended(),
                self.header.block_count
            )));
        }

        self.stream.seek(SeekFrom::Start(0))?;
        self.stream.write_all(&self.header.to_bytes())?;
        self.stream.write_all(&encode_offsets(&self.offsets))?;
        self.stream.flush()?;
        self.finished = true;

        debug!(
            kind = %self.header.kind,
            blocks = self.header.block_count,
            size = self.offsets[self.offsets.len() - 1],
            "finished destination container"
        );
        Ok(())
    }
}

impl<W> Writer<W> {
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Number of blocks appended so far.
    #[inline]
    pub fn appended(&self) -> u32 {
        (self.offsets.len() - 1) as u32
    }

    /// Offset table built so far (`appended() + 1` entries).
    pub fn offsets(&self) -> &[u64] {
        &self.offsets
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn into_inner(self) -> W {
        self.stream
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::format::HEADER_SIZE;

    #[test]
    fn writes_header_table_and_blocks() {
        let mut w = Writer::create(Cursor::new(Vec::new()), ContainerKind::Ulzma, 8, 2).unwrap();
        w.append(b"abc").unwrap();
        w.append(b"defgh").unwrap();
        w.finish().unwrap();
        let bytes = w.into_inner().into_inner();

        let d = data_start(2);
        assert_eq!(bytes.len() as u64, d + 8);
        assert!(bytes.starts_with(b"#!/bin/sh\n#L3.0\n"));
        let table = &bytes[HEADER_SIZE as usize..d as usize];
        assert_eq!(table, encode_offsets(&[d, d + 3, d + 8]).as_slice());
        assert_eq!(&bytes[d as usize..], b"abcdefgh");
    }

    #[test]
    fn empty_container_has_single_offset() {
        let mut w = Writer::create(Cursor::new(Vec::new()), ContainerKind::Uzip, 512, 0).unwrap();
        w.finish().unwrap();
        let bytes = w.into_inner().into_inner();
        assert_eq!(bytes.len() as u64, data_start(0));
        assert_eq!(&bytes[136..144], &data_start(0).to_be_bytes());
    }

    #[test]
    fn misuse_is_sequence_error() {
        let mut w = Writer::create(Cursor::new(Vec::new()), ContainerKind::Uzip, 4, 1).unwrap();
        assert!(matches!(w.finish(), Err(Error::Sequence(_))));
        w.append(b"x").unwrap();
        assert!(matches!(w.append(b"y"), Err(Error::Sequence(_))));
        w.finish().unwrap();
        assert!(matches!(w.append(b"z"), Err(Error::Sequence(_))));
        assert!(matches!(w.finish(), Err(Error::Sequence(_))));
    }
}
