pub mod codec;
pub mod error;
pub mod format;
pub mod pipeline;
pub mod reader;
pub mod reorder;
pub mod writer;

pub use codec::{Codec, CodecError, RawLen};
pub use error::{Error, Result};
pub use format::{ContainerKind, Header, HEADER_SIZE, SHEBANG};
pub use pipeline::{convert, transcode, TranscodeOptions, TranscodeSummary};
pub use reader::Reader;
pub use reorder::Reorder;
pub use writer::Writer;
