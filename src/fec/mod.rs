//! Forward-error-correction support: block coordinates, the codec
//! interface and registry, and the repairing packet reader.

mod codec;
mod header;
mod reader;

pub use codec::{BlockCodec, CodecError, CodecMap, FecScheme};
pub use header::FecHeader;
pub use reader::{FecReader, FecReaderConfig, FecStats};
