pub mod alias;
pub mod code;
pub mod context_map;
pub mod encoder;
pub mod histogram;
pub mod hybrid_uint;
pub mod lz77;
pub mod reader;

pub use code::{decode_histograms, AnsCode, HistogramTables};
pub use encoder::{EncoderParams, EntropyEncoder, Token};
pub use hybrid_uint::HybridUintConfig;
pub use lz77::Lz77Params;
pub use reader::{AnsSymbolReader, DecodedStream};

pub const ANS_LOG_TAB_SIZE: u32 = 12;
pub const ANS_TAB_SIZE: u32 = 1 << ANS_LOG_TAB_SIZE;
pub const ANS_TAB_MASK: u32 = ANS_TAB_SIZE - 1;
/// Initial encoder state is `ANS_SIGNATURE << 16`, which is also the final decoder state.
pub const ANS_SIGNATURE: u32 = 0x13;
pub const ANS_MAX_ALPHABET_SIZE: usize = 256;
pub const PREFIX_MAX_ALPHABET_SIZE: usize = 1 << 15;
pub const K_MAX_CLUSTERS: usize = 256;

#[cfg(test)]
mod tests;
