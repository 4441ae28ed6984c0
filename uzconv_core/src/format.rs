use crate::error::{Error, Result};

/// Every container starts with a shell script line so the image can be
/// executed to mount itself.
pub const SHEBANG: &[u8] = b"#!/bin/sh\n";

/// Fixed size of the ASCII preamble (shebang + format tag + NUL padding).
pub const PREAMBLE_LEN: usize = 128;

/// Size of the fixed header in bytes.
///   preamble[128] + block_size:u32 BE + block_count:u32 BE
///   = 128 + 4 + 4 = 136
pub const HEADER_SIZE: u64 = PREAMBLE_LEN as u64 + 4 + 4;

/// Size of one offset table entry (u64 BE).
pub const OFFSET_ENTRY_SIZE: u64 = 8;

// ── Container kinds ────────────────────────────────────────────────────────

/// The container revision, identified by the tag following the shebang line.
///
/// All revisions share the same byte layout; only the block codec differs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContainerKind {
    /// zlib blocks (`#V2.0 Format`).
    Uzip,
    /// xz/LZMA2 blocks (`#L3.0`).
    Ulzma,
    /// zstd blocks (`#Z4.0 Format`).
    Uzstd,
}

impl ContainerKind {
    pub const ALL: [ContainerKind; 3] = [Self::Uzip, Self::Ulzma, Self::Uzstd];

    /// Tag written directly after the shebang line.
    pub fn tag(self) -> &'static [u8] {
        match self {
            Self::Uzip => b"#V2.0 Format\n",
            Self::Ulzma => b"#L3.0\n",
            Self::Uzstd => b"#Z4.0 Format\n",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Uzip => "uzip",
            Self::Ulzma => "ulzma",
            Self::Uzstd => "uzstd",
        }
    }

    pub fn from_name(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "uzip" | "zlib" => Some(Self::Uzip),
            "ulzma" | "lzma" | "xz" => Some(Self::Ulzma),
            "uzstd" | "zstd" => Some(Self::Uzstd),
            _ => None,
        }
    }

    /// Identify the revision from the bytes following the shebang.
    ///
    /// Only the two-byte tag prefix is significant, so older revisions of the
    /// same codec family (e.g. `#V1.0`) are accepted as well.
    fn from_tag(rest: &[u8]) -> Option<Self> {
        match rest.get(..2)? {
            b"#V" => Some(Self::Uzip),
            b"#L" => Some(Self::Ulzma),
            b"#Z" => Some(Self::Uzstd),
            _ => None,
        }
    }
}

impl std::fmt::Display for ContainerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// ── Layout helpers ─────────────────────────────────────────────────────────

/// Number of entries in the offset table for `block_count` blocks.
#[inline]
pub fn offset_table_len(block_count: u32) -> usize {
    block_count as usize + 1
}

/// Absolute byte position of block 0, i.e. header + offset table size.
///
/// This is also the value stored in `offsets[0]`.
#[inline]
pub fn data_start(block_count: u32) -> u64 {
    HEADER_SIZE + OFFSET_ENTRY_SIZE * (u64::from(block_count) + 1)
}

// ── Header ─────────────────────────────────────────────────────────────────

/// Decoded representation of the 136-byte fixed header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub kind: ContainerKind,
    /// Plaintext bytes per block (the last block may be smaller).
    pub block_size: u32,
    pub block_count: u32,
}

impl Header {
    /// Serialize to exactly `HEADER_SIZE` bytes.
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE as usize] {
        let mut buf = [0u8; HEADER_SIZE as usize];
        let tag = self.kind.tag();
        buf[..SHEBANG.len()].copy_from_slice(SHEBANG);
        buf[SHEBANG.len()..SHEBANG.len() + tag.len()].copy_from_slice(tag);
        // rest of the preamble stays NUL
        buf[128..132].copy_from_slice(&self.block_size.to_be_bytes());
        buf[132..136].copy_from_slice(&self.block_count.to_be_bytes());
        buf
    }

    /// Deserialize from `HEADER_SIZE` bytes, checking shebang and tag.
    pub fn from_bytes(buf: &[u8; HEADER_SIZE as usize]) -> Result<Self> {
        if !buf.starts_with(SHEBANG) {
            return Err(Error::Format(
                "missing #!/bin/sh preamble, not a compressed image".into(),
            ));
        }
        let kind = ContainerKind::from_tag(&buf[SHEBANG.len()..PREAMBLE_LEN]).ok_or_else(|| {
            let end = buf[SHEBANG.len()..PREAMBLE_LEN]
                .iter()
                .position(|&b| b == b'\n' || b == 0)
                .map_or(PREAMBLE_LEN, |p| SHEBANG.len() + p);
            Error::Format(format!(
                "unknown format tag {:?}",
                String::from_utf8_lossy(&buf[SHEBANG.len()..end])
            ))
        })?;
        let block_size = u32::from_be_bytes([buf[128], buf[129], buf[130], buf[131]]);
        let block_count = u32::from_be_bytes([buf[132], buf[133], buf[134], buf[135]]);
        if block_size == 0 {
            return Err(Error::Format("block size is zero".into()));
        }
        Ok(Self {
            kind,
            block_size,
            block_count,
        })
    }

    pub fn data_start(&self) -> u64 {
        data_start(self.block_count)
    }
}

// ── Offset table ───────────────────────────────────────────────────────────

/// Encode an offset table as consecutive u64 BE values.
pub fn encode_offsets(offsets: &[u64]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(offsets.len() * OFFSET_ENTRY_SIZE as usize);
    for off in offsets {
        buf.extend_from_slice(&off.to_be_bytes());
    }
    buf
}

/// Decode and validate an offset table for `block_count` blocks.
///
/// The table must start at the data region and never decrease.
pub fn decode_offsets(buf: &[u8], block_count: u32) -> Result<Vec<u64>> {
    let n = offset_table_len(block_count);
    if buf.len() != n * OFFSET_ENTRY_SIZE as usize {
        return Err(Error::Format(format!(
            "offset table is {} bytes, expected {}",
            buf.len(),
            n * OFFSET_ENTRY_SIZE as usize
        )));
    }
    let offsets: Vec<u64> = buf
        .chunks_exact(OFFSET_ENTRY_SIZE as usize)
        .map(|c| u64::from_be_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]))
        .collect();

    let start = data_start(block_count);
    if offsets[0] < start {
        return Err(Error::Format(format!(
            "offsets[0] = {} points inside the header (data starts at {})",
            offsets[0], start
        )));
    }
    if let Some(i) = offsets.windows(2).position(|w| w[1] < w[0]) {
        return Err(Error::Format(format!(
            "offset table decreases at block {}: {} -> {}",
            i,
            offsets[i],
            offsets[i + 1]
        )));
    }
    Ok(offsets)
}
