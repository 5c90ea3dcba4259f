pub mod huffman_encoder;
pub mod huffman_decoder;

pub use huffman_decoder::HuffmanDecodingData;
pub use huffman_encoder::HuffmanEncoder;

pub const K_MAX_HUFFMAN_BITS: usize = 15;
pub const K_HUFFMAN_TABLE_BITS: usize = 8;
pub const K_CODE_LENGTH_CODES: usize = 18;
pub const K_DEFAULT_CODE_LENGTH: u8 = 8;
pub const K_CODE_LENGTH_REPEAT_CODE: u8 = 16;

/// Order in which the code-length code lengths are transmitted.
pub const K_CODE_LENGTH_CODE_ORDER: [usize; K_CODE_LENGTH_CODES] =
    [1, 2, 3, 4, 0, 5, 17, 6, 16, 7, 8, 9, 10, 11, 12, 13, 14, 15];

/// A decoding table entry: either a symbol and its length, or, in the root table,
/// a link to a second-level table (`bits > K_HUFFMAN_TABLE_BITS`, `value` = relative offset).
#[derive(Clone, Copy, Default, Debug, Eq, PartialEq)]
pub struct HuffmanCode {
    pub bits: u8,
    pub value: u16,
}

impl HuffmanCode {
    pub const fn new(bits: u8, value: u16) -> Self {
        Self { bits, value }
    }
}

#[derive(Clone, Copy, Default, Debug)]
pub struct HuffmanSymbolInfo {
    pub present: u8,
    pub nbits: u8,
    pub bits: u16,
}

pub trait Huffman {
    /// For a given array of HuffmanSymbolInfo, where only the `present` and `nbits`
    /// fields are set, fill up the `bits` field by building a canonical code.
    ///
    /// The codes are stored bit-reversed, ready to be pushed least-significant bit first,
    /// which is the order the table lookups in [`HuffmanDecodingData`] expect.
    fn compute_symbol_bits(info: &mut [HuffmanSymbolInfo]) {
        let mut syms: Vec<(u8, usize)> = info.iter()
            .enumerate()
            .filter(|(_, inf)| inf.present == 1 && inf.nbits > 0)
            .map(|(i, inf)| (inf.nbits, i))
            .collect();

        syms.sort();

        let mut x: u32 = 0;

        for (s, sym) in syms.iter().enumerate() {
            info[sym.1].bits = reverse_bits(x, sym.0 as u32) as u16;
            x += 1;
            if s + 1 != syms.len() {
                x <<= syms[s + 1].0 - sym.0;
            }
        }
    }
}

#[inline(always)]
pub fn reverse_bits(x: u32, len: u32) -> u32 {
    if len == 0 {
        return 0;
    }
    x.reverse_bits() >> (32 - len)
}
