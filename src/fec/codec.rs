//! Block codec interface and scheme registry.
//!
//! The concrete Reed-Solomon and LDPC-Staircase codec bodies are
//! external collaborators; the pipeline consumes them through
//! [`BlockCodec`] and discovers them through [`CodecMap`]. A session
//! configured with an unregistered scheme fails construction.

use std::collections::HashMap;
use std::fmt;

/// Forward-error-correction scheme negotiated for a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FecScheme {
    /// No FEC; the repair path is not built.
    None,
    /// Reed-Solomon over GF(2^8).
    ReedSolomonM8,
    /// LDPC-Staircase.
    LdpcStaircase,
}

impl fmt::Display for FecScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FecScheme::None => write!(f, "none"),
            FecScheme::ReedSolomonM8 => write!(f, "rs8m"),
            FecScheme::LdpcStaircase => write!(f, "ldpc"),
        }
    }
}

/// Codec failure.
#[derive(Debug)]
pub enum CodecError {
    /// Block parameters the codec cannot handle.
    UnsupportedParams,
    /// Symbol size differs from the block's symbol size.
    InvalidSymbolSize,
    /// Symbol index outside the block.
    InvalidSymbolId,
    /// Codec body error with message.
    Other(String),
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecError::UnsupportedParams => write!(f, "unsupported block parameters"),
            CodecError::InvalidSymbolSize => write!(f, "symbol size mismatch"),
            CodecError::InvalidSymbolId => write!(f, "symbol id out of range"),
            CodecError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for CodecError {}

/// One coding block at a time: feed the received symbols, ask for the
/// missing source symbols back.
pub trait BlockCodec {
    /// Reset for a new block of `k` source plus `m` repair symbols,
    /// each `symbol_size` bytes.
    fn begin_block(&mut self, k: usize, m: usize, symbol_size: usize) -> Result<(), CodecError>;

    /// Provide a received symbol. Source symbols have `esi < k`, repair
    /// symbols `k <= esi < k + m`.
    fn add_symbol(&mut self, esi: usize, data: &[u8]) -> Result<(), CodecError>;

    /// Attempt recovery. Returns `(esi, bytes)` for each source symbol
    /// the codec could reconstruct.
    fn repair(&mut self) -> Result<Vec<(usize, Vec<u8>)>, CodecError>;
}

type CodecFactory = Box<dyn Fn() -> Box<dyn BlockCodec>>;

/// Registry mapping schemes to codec constructors.
#[derive(Default)]
pub struct CodecMap {
    factories: HashMap<FecScheme, CodecFactory>,
}

impl CodecMap {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register a codec body for a scheme, replacing any previous one.
    pub fn register<F>(&mut self, scheme: FecScheme, factory: F)
    where
        F: Fn() -> Box<dyn BlockCodec> + 'static,
    {
        self.factories.insert(scheme, Box::new(factory));
    }

    pub fn supports(&self, scheme: FecScheme) -> bool {
        scheme == FecScheme::None || self.factories.contains_key(&scheme)
    }

    pub fn new_codec(&self, scheme: FecScheme) -> Option<Box<dyn BlockCodec>> {
        self.factories.get(&scheme).map(|f| f())
    }
}
