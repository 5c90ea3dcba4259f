use thiserror::Error;

/// Errors raised while parsing or decoding an entropy-coded stream.
///
/// Every variant is fatal for the stream being decoded: the bit cursor is left at an
/// unspecified position and decoding cannot be resumed.
#[derive(Debug, Error)]
pub enum Error {
    #[error("corrupt histogram: {0}")]
    CorruptHistogram(&'static str),

    #[error("invalid shift value {0}")]
    InvalidShift(u32),

    #[error("Invalid histogram count.")]
    InvalidHistogramCount,

    #[error("alphabet size is too long: {size} (max {max})")]
    InvalidAlphabetSize { size: usize, max: usize },

    #[error("invalid HybridUintConfig: split_exponent={split_exponent} msb_in_token={msb_in_token} lsb_in_token={lsb_in_token}")]
    InvalidUintConfig {
        split_exponent: u32,
        msb_in_token: u32,
        lsb_in_token: u32,
    },

    #[error("using LZ77 when explicitly disallowed")]
    Lz77Disallowed,

    #[error("invalid context map: {0}")]
    InvalidContextMap(&'static str),

    #[error("invalid huffman code: {0}")]
    InvalidHuffmanCode(String),

    #[error("truncated bitstream: consumed {consumed} bits out of {available}")]
    TruncatedStream { consumed: usize, available: usize },

    #[error("ANS stream did not end in the signature state (state = {0:#x})")]
    InvalidAnsFinalState(u32),

    #[error("invalid encoder input: {0}")]
    InvalidEncoderInput(String),

    #[error("malformed properties: {0}")]
    Properties(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
