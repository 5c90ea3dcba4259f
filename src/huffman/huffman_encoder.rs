use std::mem::take;

use crate::{bitstreams::BinaryWriterBuilder, error::{Error, Result}, utils::floor_log2_nonzero};

use super::{Huffman, HuffmanSymbolInfo, K_CODE_LENGTH_CODES, K_CODE_LENGTH_CODE_ORDER, K_MAX_HUFFMAN_BITS};

/// `(bits, nbits)` writing each code-length code length with the static code the
/// decoder peeks 4 bits for.
const CODE_LENGTH_CODE_CODES: [(u64, u64); 6] = [(0, 2), (7, 4), (3, 3), (2, 2), (1, 2), (15, 4)];

const ZERO_RUN_CODE: usize = 17;
const MAX_CODE_LENGTH_CODE_BITS: usize = 5;

/// Computes length-limited code lengths for the given distribution. Uses a (quadratic
/// version of the) package-merge/coin-collector algorithm.
///
/// A single present symbol gets length 0.
pub fn compute_code_lengths(histo: &[u64], max_bits: usize) -> Vec<u8> {
    let mut nbits = vec![0u8; histo.len()];
    let present: Vec<usize> = histo.iter().enumerate().filter(|&(_, &v)| v != 0).map(|(i, _)| i).collect();
    let nzsym = present.len();

    if nzsym <= 1 {
        return nbits;
    }
    assert!(nzsym <= 1 << max_bits, "{nzsym} symbols cannot be coded in {max_bits} bits");

    // Create a list of symbols for any given cost.
    let mut bags = vec![Vec::<(u64, Vec<usize>)>::default(); max_bits];
    for bag in bags.iter_mut() {
        for &s in present.iter() {
            bag.push((histo[s], vec![s]));
        }
    }

    // Pair up symbols (or groups of symbols) of a given bit-length to create
    // symbols of the following bit-length, creating pairs by merging (groups of)
    // symbols consecutively in increasing order of cost.
    for i in 0..(max_bits - 1) {
        bags[i].sort();

        let mut j = 0;
        while j + 1 < bags[i].len() {
            let nf = bags[i][j].0 + bags[i][j + 1].0;

            let mut nsym = take(&mut bags[i][j].1);
            let right = take(&mut bags[i][j + 1].1);
            nsym.extend(right);

            bags[i + 1].push((nf, nsym));

            j += 2;
        }
    }
    bags[max_bits - 1].sort();

    // In the groups of symbols for the highest bit length we need to select the
    // last 2*num_symbols-2 groups, and assign to each symbol one bit of cost for
    // each of its occurrences in these groups.
    for b in bags[max_bits - 1].iter().take(2 * nzsym - 2) {
        for &x in b.1.iter() {
            nbits[x] += 1;
        }
    }

    debug_assert_eq!(
        present.iter().map(|&s| 1u64 << (max_bits - nbits[s] as usize)).sum::<u64>(),
        1 << max_bits
    );

    nbits
}

/// Prefix code for one histogram, written in the format read by
/// [`HuffmanDecodingData::read_from_bitstream`](super::HuffmanDecodingData::read_from_bitstream).
#[derive(Clone, Debug, Default)]
pub struct HuffmanEncoder {
    info: Vec<HuffmanSymbolInfo>,
}

impl Huffman for HuffmanEncoder {}

impl HuffmanEncoder {
    pub fn new(histo: &[u64]) -> Self {
        let nbits = compute_code_lengths(histo, K_MAX_HUFFMAN_BITS);
        let mut info: Vec<HuffmanSymbolInfo> = histo.iter()
            .zip(nbits.iter())
            .map(|(&h, &n)| HuffmanSymbolInfo { present: (h != 0) as u8, nbits: n, bits: 0 })
            .collect();

        HuffmanEncoder::compute_symbol_bits(&mut info);
        Self { info }
    }

    /// Smallest alphabet covering every present symbol.
    pub fn alphabet_size(&self) -> usize {
        self.info.iter().rposition(|i| i.present == 1).map_or(1, |p| p + 1)
    }

    fn present_symbols(&self) -> Vec<usize> {
        let mut syms: Vec<usize> = (0..self.info.len()).filter(|&i| self.info[i].present == 1).collect();
        syms.sort_by_key(|&s| (self.info[s].nbits, s));
        syms
    }

    /// Writes the code description. Nothing is written for a one-symbol alphabet.
    pub fn write_table(&self, writer: &mut BinaryWriterBuilder) {
        let alphabet_size = self.alphabet_size();
        if alphabet_size <= 1 {
            return;
        }

        let syms = self.present_symbols();
        if syms.len() <= 4 {
            self.write_simple_code(&syms, alphabet_size, writer);
        } else {
            self.write_complex_code(alphabet_size, writer);
        }
    }

    fn write_simple_code(&self, syms: &[usize], alphabet_size: usize, writer: &mut BinaryWriterBuilder) {
        let max_bits = floor_log2_nonzero(alphabet_size as u32 - 1) as u64 + 1;

        writer.push_bits(1, 2);
        writer.push_bits(syms.len() as u64 - 1, 2);
        for &s in syms {
            writer.push_bits(s as u64, max_bits);
        }

        if syms.len() == 4 {
            let tree_select = self.info[syms[0]].nbits == 1;
            writer.push_bits(tree_select as u64, 1);
        }
    }

    fn write_complex_code(&self, alphabet_size: usize, writer: &mut BinaryWriterBuilder) {
        let lengths: Vec<u8> = self.info[..alphabet_size].iter().map(|i| i.nbits).collect();
        let tokens = code_length_tokens(&lengths);

        let mut histo = [0u64; K_CODE_LENGTH_CODES];
        for &(sym, _) in tokens.iter() {
            histo[sym] += 1;
        }

        let cl_lengths = compute_code_lengths(&histo, MAX_CODE_LENGTH_CODE_BITS);
        let mut cl_info: Vec<HuffmanSymbolInfo> = histo.iter()
            .zip(cl_lengths.iter())
            .map(|(&h, &n)| HuffmanSymbolInfo { present: (h != 0) as u8, nbits: n, bits: 0 })
            .collect();
        HuffmanEncoder::compute_symbol_bits(&mut cl_info);

        let num_used = histo.iter().filter(|&&h| h != 0).count();
        // A lone code-length symbol is coded in zero bits, signalled by a single non-zero entry.
        let transmitted: Vec<u8> = if num_used == 1 {
            histo.iter().map(|&h| (h != 0) as u8).collect()
        } else {
            cl_lengths
        };

        let mut skip = 0;
        if transmitted[K_CODE_LENGTH_CODE_ORDER[0]] == 0 && transmitted[K_CODE_LENGTH_CODE_ORDER[1]] == 0 {
            skip = 2;
            if transmitted[K_CODE_LENGTH_CODE_ORDER[2]] == 0 {
                skip = 3;
            }
        }
        writer.push_bits(skip as u64, 2);

        let mut space = 32i32;
        for &idx in K_CODE_LENGTH_CODE_ORDER.iter().skip(skip) {
            if space <= 0 {
                break;
            }
            let v = transmitted[idx];
            let (bits, nbits) = CODE_LENGTH_CODE_CODES[v as usize];
            writer.push_bits(bits, nbits);
            if v != 0 {
                space -= 32 >> v;
            }
        }

        for (sym, extra) in tokens {
            let inf = cl_info[sym];
            writer.push_bits(inf.bits as u64, inf.nbits as u64);
            if sym == ZERO_RUN_CODE {
                writer.push_bits(extra as u64, 3);
            }
        }
    }

    /// Writes the code of `symbol`, returning the number of bits written.
    #[inline(always)]
    pub fn write_symbol(&self, symbol: usize, writer: &mut BinaryWriterBuilder) -> Result<u64> {
        match self.info.get(symbol) {
            Some(inf) if inf.present == 1 => Ok(writer.push_bits(inf.bits as u64, inf.nbits as u64)),
            _ => Err(Error::InvalidEncoderInput(format!("symbol {symbol} has no prefix code"))),
        }
    }
}

/// Code-length symbols up to the last non-zero length. Runs of at least three zeros use
/// the zero-run code (3 to 10 zeros per run), split by a literal zero so that consecutive
/// runs are not merged by the decoder.
fn code_length_tokens(lengths: &[u8]) -> Vec<(usize, u32)> {
    let last = lengths.iter().rposition(|&l| l != 0).map_or(0, |p| p + 1);
    let mut tokens = Vec::new();

    let mut i = 0;
    while i < last {
        if lengths[i] != 0 {
            tokens.push((lengths[i] as usize, 0));
            i += 1;
            continue;
        }

        let mut run = lengths[i..last].iter().take_while(|&&l| l == 0).count();
        i += run;
        while run >= 3 {
            let n = run.min(10);
            tokens.push((ZERO_RUN_CODE, n as u32 - 3));
            run -= n;
            if run > 0 {
                tokens.push((0, 0));
                run -= 1;
            }
        }
        for _ in 0..run {
            tokens.push((0, 0));
        }
    }

    tokens
}
