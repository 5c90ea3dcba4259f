pub mod ans;
pub mod bitstreams;
pub mod error;
pub mod huffman;
pub mod properties;
pub mod utils;

pub use ans::{decode_histograms, AnsCode, AnsSymbolReader, DecodedStream, EncoderParams, EntropyEncoder, HybridUintConfig, Lz77Params, Token};
pub use error::{Error, Result};
pub use properties::{DecoderOptions, StreamProperties};
