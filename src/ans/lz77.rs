use serde::{Serialize, Deserialize};

use crate::{bitstreams::{BinaryReader, BinaryWriterBuilder}, error::Result, utils::encodings::{read_u32, write_u32, U32Distr}};

use super::hybrid_uint::HybridUintConfig;

pub const WINDOW_SIZE: usize = 1 << 20;
pub const WINDOW_MASK: usize = WINDOW_SIZE - 1;
pub const NUM_SPECIAL_DISTANCES: usize = 120;

/// `(dx, dy)` offsets of the most common spatial neighbours, in code order. A code maps to
/// `dx + dy * distance_multiplier`, with the multiplier usually being the row width.
#[rustfmt::skip]
pub const SPECIAL_DISTANCES: [[i8; 2]; NUM_SPECIAL_DISTANCES] = [
    [0, 1], [1, 0], [1, 1], [-1, 1], [0, 2], [2, 0], [1, 2], [-1, 2], [2, 1], [-2, 1],
    [2, 2], [-2, 2], [0, 3], [3, 0], [1, 3], [-1, 3], [3, 1], [-3, 1], [2, 3], [-2, 3],
    [3, 2], [-3, 2], [0, 4], [4, 0], [1, 4], [-1, 4], [4, 1], [-4, 1], [3, 3], [-3, 3],
    [2, 4], [-2, 4], [4, 2], [-4, 2], [0, 5], [3, 4], [-3, 4], [4, 3], [-4, 3], [5, 0],
    [1, 5], [-1, 5], [5, 1], [-5, 1], [2, 5], [-2, 5], [5, 2], [-5, 2], [4, 4], [-4, 4],
    [3, 5], [-3, 5], [5, 3], [-5, 3], [0, 6], [6, 0], [1, 6], [-1, 6], [6, 1], [-6, 1],
    [2, 6], [-2, 6], [6, 2], [-6, 2], [4, 5], [-4, 5], [5, 4], [-5, 4], [3, 6], [-3, 6],
    [6, 3], [-6, 3], [0, 7], [7, 0], [1, 7], [-1, 7], [5, 5], [-5, 5], [7, 1], [-7, 1],
    [4, 6], [-4, 6], [6, 4], [-6, 4], [2, 7], [-2, 7], [7, 2], [-7, 2], [3, 7], [-3, 7],
    [7, 3], [-7, 3], [5, 6], [-5, 6], [6, 5], [-6, 5], [8, 0], [4, 7], [-4, 7], [7, 4],
    [-7, 4], [8, 1], [8, 2], [6, 6], [-6, 6], [8, 3], [5, 7], [-5, 7], [7, 5], [-7, 5],
    [8, 4], [6, 7], [-6, 7], [7, 6], [-7, 6], [8, 5], [7, 7], [-7, 7], [8, 6], [8, 7],
];

pub const MIN_SYMBOL_DISTR: [U32Distr; 4] = [
    U32Distr::Val(224), U32Distr::Val(512), U32Distr::Val(4096), U32Distr::BitsOffset(15, 8),
];

pub const MIN_LENGTH_DISTR: [U32Distr; 4] = [
    U32Distr::Val(3), U32Distr::Val(4), U32Distr::BitsOffset(2, 5), U32Distr::BitsOffset(8, 9),
];

/// Distance for special code `code` given the row stride `distance_multiplier`, clamped
/// to `1..=u32::MAX`.
#[inline(always)]
pub fn special_distance(code: usize, distance_multiplier: u32) -> u32 {
    let [dx, dy] = SPECIAL_DISTANCES[code];
    let dist = dx as i64 + distance_multiplier as i64 * dy as i64;
    u32::try_from(dist.max(1)).unwrap_or(u32::MAX)
}

#[derive(Clone, Copy, Eq, PartialEq, Serialize, Deserialize, Debug)]
pub struct Lz77Params {
    pub enabled: bool,
    /// Tokens at or above this value are lengths, coded with `length_uint_config`
    /// and offset by `min_length`.
    pub min_symbol: u32,
    pub min_length: u32,
    pub length_uint_config: HybridUintConfig,
    /// Clustered histogram used for distance tokens; not part of the bundle.
    #[serde(skip)]
    pub distance_context: usize,
}

impl Default for Lz77Params {
    fn default() -> Self {
        Self {
            enabled: false,
            min_symbol: 224,
            min_length: 3,
            length_uint_config: HybridUintConfig::new(0, 0, 0),
            distance_context: 0,
        }
    }
}

impl Lz77Params {
    pub fn new(min_symbol: u32, min_length: u32, length_uint_config: HybridUintConfig) -> Self {
        Self { enabled: true, min_symbol, min_length, length_uint_config, distance_context: 0 }
    }

    /// Reads the `enabled` flag and, when set, `min_symbol` and `min_length`.
    ///
    /// The length config is read separately, after the caller has reserved the
    /// extra distance context.
    pub fn read(reader: &mut BinaryReader) -> Self {
        let mut params = Self { enabled: reader.read_bool(), ..Self::default() };
        if !params.enabled {
            return params;
        }

        params.min_symbol = read_u32(&MIN_SYMBOL_DISTR, reader);
        params.min_length = read_u32(&MIN_LENGTH_DISTR, reader);
        params
    }

    pub fn write(&self, writer: &mut BinaryWriterBuilder) -> Result<()> {
        writer.push_bits(self.enabled as u64, 1);
        if !self.enabled {
            return Ok(());
        }

        write_u32(&MIN_SYMBOL_DISTR, self.min_symbol, writer)?;
        write_u32(&MIN_LENGTH_DISTR, self.min_length, writer)
    }
}
