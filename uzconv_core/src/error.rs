use thiserror::Error;

use crate::codec::CodecError;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while reading, transcoding, or writing a container.
///
/// None of these are retried: any error aborts the whole conversion.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed or truncated header / offset table.
    #[error("format error: {0}")]
    Format(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A codec failed on a specific block.
    #[error("block {index}: {source}")]
    Codec {
        index: u32,
        #[source]
        source: CodecError,
    },

    #[error("block index {index} out of range (total {count})")]
    Range { index: u32, count: u32 },

    /// Writer API misuse.
    #[error("sequence error: {0}")]
    Sequence(String),

    #[error("{0} thread panicked")]
    WorkerPanicked(&'static str),

    /// Every producer stopped before block `index` was delivered.
    #[error("pipeline closed before block {index} was produced")]
    Incomplete { index: u32 },
}
