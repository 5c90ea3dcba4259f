use serde::{Serialize, Deserialize};
use tracing::{debug, trace};

use crate::{
    bitstreams::{BinaryWriter, BinaryWriterBuilder},
    error::{Error, Result},
    huffman::HuffmanEncoder,
    utils::{encodings::{UniversalCode, VarLenUint16, VarLenUint8}, floor_log2_nonzero},
};

use super::{
    alias::AliasTable,
    context_map::write_context_map_simple,
    histogram::{create_flat_histogram, population_count_precision, LOGCOUNT_HUFFMAN, RLE_ESCAPE},
    hybrid_uint::HybridUintConfig,
    lz77::{special_distance, Lz77Params, NUM_SPECIAL_DISTANCES},
    ANS_LOG_TAB_SIZE, ANS_SIGNATURE, ANS_TAB_SIZE, K_MAX_CLUSTERS, PREFIX_MAX_ALPHABET_SIZE,
};

/// Shift at which every count is stored exactly.
const EXACT_SHIFT: u32 = ANS_LOG_TAB_SIZE + 1;
const MIN_RLE_RUN: usize = 4;
const MAX_RLE_RUN: usize = 255 + MIN_RLE_RUN;

/// One value to encode in a raw context. LZ77 length tokens carry the copy length
/// minus the minimum length.
#[derive(Clone, Copy, Eq, PartialEq, Serialize, Deserialize, Debug, Default)]
pub struct Token {
    pub context: u32,
    pub value: u32,
    #[serde(default)]
    pub is_lz77_length: bool,
}

impl Token {
    pub fn new(context: u32, value: u32) -> Self {
        Self { context, value, is_lz77_length: false }
    }

    pub fn lz77_length(context: u32, value: u32) -> Self {
        Self { context, value, is_lz77_length: true }
    }
}

#[derive(Clone, Copy, Eq, PartialEq, Serialize, Deserialize, Debug)]
pub struct EncoderParams {
    pub use_prefix_code: bool,
    /// ANS only, between 5 and 8.
    pub log_alpha_size: u32,
    pub uint_config: HybridUintConfig,
    pub lz77: Lz77Params,
    pub distance_multiplier: u32,
}

impl Default for EncoderParams {
    fn default() -> Self {
        Self {
            use_prefix_code: false,
            log_alpha_size: 8,
            uint_config: HybridUintConfig::default(),
            lz77: Lz77Params::default(),
            distance_multiplier: 0,
        }
    }
}

/// rANS coder producing the stream read by `AnsSymbolReader`. Symbols are pushed in
/// reverse order.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct AnsEncoder {
    state: u32,
}

impl Default for AnsEncoder {
    fn default() -> Self {
        Self { state: ANS_SIGNATURE << 16 }
    }
}

impl AnsEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> u32 {
        self.state
    }

    /// Encodes a symbol of frequency `freq` whose `o`-th slot is `slots[o]`. Returns the
    /// 16 bits flushed to keep the state in range, which the decoder reads right after
    /// decoding this symbol.
    #[inline(always)]
    pub fn put_symbol(&mut self, freq: u32, slots: &[u32]) -> Option<u16> {
        debug_assert!(freq > 0);

        let mut flushed = None;
        if self.state >> (32 - ANS_LOG_TAB_SIZE) >= freq {
            flushed = Some(self.state as u16);
            self.state >>= 16;
        }
        self.state = ((self.state / freq) << ANS_LOG_TAB_SIZE) + slots[(self.state % freq) as usize];
        flushed
    }
}

/// Scales `freqs` to sum to `1 << precision_bits`, keeping every present symbol at
/// least at 1. Returns an empty vector for an empty distribution.
pub fn normalize_counts(freqs: &[u64], precision_bits: u32) -> Vec<u32> {
    let target = 1i64 << precision_bits;
    let total: u64 = freqs.iter().sum();
    if total == 0 {
        return Vec::new();
    }

    let mut counts: Vec<u32> = freqs.iter()
        .map(|&f| if f == 0 { 0 } else { ((f as u128 * target as u128 / total as u128) as u32).max(1) })
        .collect();
    let mut sum: i64 = counts.iter().map(|&c| c as i64).sum();

    while sum != target {
        let (idx, &max) = counts.iter().enumerate().max_by_key(|&(i, &c)| (c, std::cmp::Reverse(i))).unwrap_or((0, &0));
        if sum < target {
            counts[idx] += (target - sum) as u32;
            sum = target;
        } else {
            let dec = (sum - target).min(max as i64 - 1);
            assert!(dec > 0, "too many symbols for precision {precision_bits}");
            counts[idx] -= dec as u32;
            sum -= dec;
        }
    }

    let len = counts.iter().rposition(|&c| c != 0).map_or(0, |p| p + 1);
    counts.truncate(len);
    counts
}

/// `(bits, nbits)` of `logcount` in the static logcount code.
fn logcount_code(logcount: u32) -> (u64, u64) {
    LOGCOUNT_HUFFMAN.iter()
        .enumerate()
        .find(|&(_, &(_, lc))| lc as u32 == logcount)
        .map(|(idx, &(nbits, _))| ((idx as u64) & ((1 << nbits) - 1), nbits as u64))
        .unwrap_or((0, 0))
}

fn write_shift(shift: u32, writer: &mut BinaryWriterBuilder) {
    let v = shift + 1;
    let log = floor_log2_nonzero(v);
    let upper_bound_log = floor_log2_nonzero(ANS_LOG_TAB_SIZE + 1);

    writer.push_bits((1 << log) - 1, log as u64);
    if log < upper_bound_log {
        writer.push_bits(0, 1);
    }
    writer.push_bits((v - (1 << log)) as u64, log as u64);
}

/// Writes a histogram summing to `ANS_TAB_SIZE` in the smallest of the simple, flat or
/// general layouts that represents it exactly.
pub fn write_histogram(counts: &[u32], writer: &mut BinaryWriterBuilder) -> Result<()> {
    let len = counts.iter().rposition(|&c| c != 0).map_or(0, |p| p + 1);
    let counts = &counts[..len];
    if counts.iter().sum::<u32>() != ANS_TAB_SIZE {
        return Err(Error::InvalidEncoderInput("histogram does not sum to the table size".into()));
    }

    let nonzero: Vec<usize> = (0..len).filter(|&i| counts[i] != 0).collect();

    if nonzero.len() <= 2 {
        writer.push_bits(1, 1);
        writer.push_bits(nonzero.len() as u64 - 1, 1);
        for &s in nonzero.iter() {
            VarLenUint8::write_next(writer, s as u32);
        }
        if nonzero.len() == 2 {
            writer.push_bits(counts[nonzero[0]] as u64, ANS_LOG_TAB_SIZE as u64);
        }
        return Ok(());
    }

    writer.push_bits(0, 1);
    if counts == create_flat_histogram(len, ANS_TAB_SIZE).as_slice() {
        writer.push_bits(1, 1);
        VarLenUint8::write_next(writer, len as u32 - 1);
        return Ok(());
    }
    writer.push_bits(0, 1);

    let length = len.max(3);
    let mut counts = counts.to_vec();
    counts.resize(length, 0);

    write_shift(EXACT_SHIFT, writer);
    VarLenUint8::write_next(writer, length as u32 - 3);

    let logcounts: Vec<u32> = counts.iter().map(|&c| if c == 0 { 0 } else { floor_log2_nonzero(c) + 1 }).collect();
    let mut omit_pos = 0;
    for (i, &lc) in logcounts.iter().enumerate() {
        if lc > logcounts[omit_pos] {
            omit_pos = i;
        }
    }

    // Runs replicating the preceding count, which must not be the omitted one.
    let mut runs = vec![0usize; length];
    let mut i = 0;
    while i < length {
        if i != omit_pos + 1 {
            let prev = if i == 0 { 0 } else { counts[i - 1] };
            let run = counts[i..].iter().take(MAX_RLE_RUN).take_while(|&&c| c == prev).count();
            if run >= MIN_RLE_RUN {
                runs[i] = run;
                i += run;
                continue;
            }
        }
        i += 1;
    }

    let mut i = 0;
    while i < length {
        if runs[i] != 0 {
            let (bits, nbits) = logcount_code(RLE_ESCAPE);
            writer.push_bits(bits, nbits);
            VarLenUint8::write_next(writer, (runs[i] - MIN_RLE_RUN) as u32);
            i += runs[i];
            continue;
        }
        let (bits, nbits) = logcount_code(logcounts[i]);
        writer.push_bits(bits, nbits);
        i += 1;
    }

    let mut i = 0;
    while i < length {
        if runs[i] != 0 {
            i += runs[i];
            continue;
        }
        let lc = logcounts[i];
        if i != omit_pos && lc > 1 {
            let bitcount = population_count_precision(lc - 1, EXACT_SHIFT);
            let extra = (counts[i] - (1 << (lc - 1))) >> (lc - 1 - bitcount);
            writer.push_bits(extra as u64, bitcount as u64);
        }
        i += 1;
    }

    Ok(())
}

/// LZ77 distance code for `distance` given the row stride.
pub fn distance_code(distance: u32, distance_multiplier: u32) -> u32 {
    if distance_multiplier == 0 {
        return distance - 1;
    }
    (0..NUM_SPECIAL_DISTANCES)
        .find(|&i| special_distance(i, distance_multiplier) == distance)
        .map_or(distance - 1 + NUM_SPECIAL_DISTANCES as u32, |i| i as u32)
}

/// Replaces runs of at least `min_length` values equal to the previous one with a
/// distance-1 copy. Distances go to the extra context `num_contexts`.
pub fn apply_lz77_rle(tokens: &[Token], num_contexts: usize, lz77: &Lz77Params, distance_multiplier: u32) -> Vec<Token> {
    let mut out = Vec::with_capacity(tokens.len());
    let distance = distance_code(1, distance_multiplier);
    let min_length = (lz77.min_length as usize).max(1);

    let mut i = 0;
    while i < tokens.len() {
        if i > 0 {
            let prev = tokens[i - 1].value;
            let run = tokens[i..].iter().take_while(|t| t.value == prev).count();
            if run >= min_length {
                out.push(Token::lz77_length(tokens[i].context, (run - min_length) as u32));
                out.push(Token::new(num_contexts as u32, distance));
                i += run;
                continue;
            }
        }
        out.push(tokens[i]);
        i += 1;
    }

    out
}

#[derive(Clone, Debug)]
enum HistogramCode {
    Ans { counts: Vec<u32>, slots: Vec<Vec<u32>> },
    Prefix(HuffmanEncoder),
}

/// Coded form of a token: `(histogram, symbol, nbits, bits)`.
type CodedToken = (usize, u32, u32, u32);

pub struct EntropyEncoderBuilder {
    num_contexts: usize,
    params: EncoderParams,
}

impl EntropyEncoderBuilder {
    pub fn new(num_contexts: usize) -> Self {
        Self { num_contexts, params: EncoderParams::default() }
    }

    pub fn set_params(mut self, params: EncoderParams) -> Self {
        self.params = params;
        self
    }

    pub fn set_prefix_code(mut self, use_prefix_code: bool) -> Self {
        self.params.use_prefix_code = use_prefix_code;
        self
    }

    pub fn set_log_alpha_size(mut self, log_alpha_size: u32) -> Self {
        self.params.log_alpha_size = log_alpha_size;
        self
    }

    pub fn set_uint_config(mut self, uint_config: HybridUintConfig) -> Self {
        self.params.uint_config = uint_config;
        self
    }

    pub fn set_lz77(mut self, lz77: Lz77Params) -> Self {
        self.params.lz77 = lz77;
        self
    }

    pub fn set_distance_multiplier(mut self, distance_multiplier: u32) -> Self {
        self.params.distance_multiplier = distance_multiplier;
        self
    }

    /// Collects the statistics of `tokens`, applying LZ77 when enabled, and builds one
    /// code per histogram.
    pub fn build(self, tokens: &[Token]) -> Result<EntropyEncoder> {
        let params = self.params;
        if let Some(t) = tokens.iter().find(|t| t.context as usize >= self.num_contexts) {
            return Err(Error::InvalidEncoderInput(format!("context {} out of {}", t.context, self.num_contexts)));
        }

        let num_contexts = self.num_contexts.max(1);
        if params.lz77.enabled {
            let lz77_tokens = apply_lz77_rle(tokens, num_contexts, &params.lz77, params.distance_multiplier);
            Self::build_coded(params, num_contexts + 1, &lz77_tokens)
        } else {
            Self::build_coded(params, num_contexts, tokens)
        }
    }

    /// Like [`build`](Self::build), for tokens that already went through an LZ77 parse:
    /// every length token is followed by its distance code in the extra context
    /// `num_contexts`, as produced by [`distance_code`].
    pub fn build_parsed(self, tokens: &[Token]) -> Result<EntropyEncoder> {
        let params = self.params;
        if !params.lz77.enabled {
            return Err(Error::InvalidEncoderInput("parsed tokens need LZ77".into()));
        }
        let num_contexts = self.num_contexts.max(1) + 1;
        if let Some(t) = tokens.iter().find(|t| t.context as usize >= num_contexts) {
            return Err(Error::InvalidEncoderInput(format!("context {} out of {num_contexts}", t.context)));
        }
        Self::build_coded(params, num_contexts, tokens)
    }

    fn build_coded(params: EncoderParams, num_contexts: usize, tokens: &[Token]) -> Result<EntropyEncoder> {
        if !params.use_prefix_code && !(5..=8).contains(&params.log_alpha_size) {
            return Err(Error::InvalidEncoderInput(format!("log_alpha_size {} not in 5..=8", params.log_alpha_size)));
        }

        let context_map: Vec<u8> = (0..num_contexts).map(|c| c.min(K_MAX_CLUSTERS - 1) as u8).collect();
        let num_histograms = num_contexts.min(K_MAX_CLUSTERS);
        let log_alpha_size = if params.use_prefix_code { crate::huffman::K_MAX_HUFFMAN_BITS as u32 } else { params.log_alpha_size };
        let max_alphabet = if params.use_prefix_code { PREFIX_MAX_ALPHABET_SIZE } else { 1 << log_alpha_size };

        let mut encoder = EntropyEncoder {
            params,
            context_map,
            uint_config: vec![params.uint_config; num_histograms],
            log_alpha_size,
            codes: Vec::new(),
            coded: Vec::with_capacity(tokens.len()),
            num_tokens: tokens.len(),
        };

        let mut freqs = vec![vec![0u64; max_alphabet]; num_histograms];
        for t in tokens.iter() {
            let coded = encoder.code_token(t)?;
            if coded.1 as usize >= max_alphabet {
                return Err(Error::InvalidEncoderInput(format!("token {} does not fit an alphabet of {max_alphabet}", coded.1)));
            }
            freqs[coded.0][coded.1 as usize] += 1;
            encoder.coded.push(coded);
        }

        for (h, f) in freqs.iter_mut().enumerate() {
            // An unused histogram still needs a valid description.
            if f.iter().all(|&x| x == 0) {
                f[0] = 1;
            }
            let code = if params.use_prefix_code {
                HistogramCode::Prefix(HuffmanEncoder::new(f))
            } else {
                let counts = normalize_counts(f, ANS_LOG_TAB_SIZE);
                let table = AliasTable::build(&counts, ANS_TAB_SIZE, log_alpha_size)?;
                let slots = AliasTable::reverse_map(&table, &counts, log_alpha_size);
                HistogramCode::Ans { counts, slots }
            };
            trace!(histogram = h, "built code");
            encoder.codes.push(code);
        }

        debug!(num_contexts, num_histograms, num_tokens = encoder.num_tokens, use_prefix_code = params.use_prefix_code, "built entropy encoder");
        Ok(encoder)
    }
}

/// Entropy coder for one stream: writes the header read by `decode_histograms` and then
/// the tokens read by `AnsSymbolReader`.
pub struct EntropyEncoder {
    params: EncoderParams,
    context_map: Vec<u8>,
    uint_config: Vec<HybridUintConfig>,
    log_alpha_size: u32,
    codes: Vec<HistogramCode>,
    coded: Vec<CodedToken>,
    num_tokens: usize,
}

impl EntropyEncoder {
    pub fn builder(num_contexts: usize) -> EntropyEncoderBuilder {
        EntropyEncoderBuilder::new(num_contexts)
    }

    pub fn context_map(&self) -> &[u8] {
        &self.context_map
    }

    /// Number of coded tokens, LZ77 lengths and distances included.
    pub fn num_tokens(&self) -> usize {
        self.num_tokens
    }

    fn code_token(&self, t: &Token) -> Result<CodedToken> {
        let histo = self.context_map[t.context as usize] as usize;
        let lz77 = &self.params.lz77;

        if t.is_lz77_length {
            if !lz77.enabled {
                return Err(Error::InvalidEncoderInput("LZ77 length without LZ77".into()));
            }
            let (token, nbits, bits) = lz77.length_uint_config.encode(t.value);
            return Ok((histo, token + lz77.min_symbol, nbits, bits));
        }

        let (token, nbits, bits) = self.uint_config[histo].encode(t.value);
        if lz77.enabled && token >= lz77.min_symbol {
            return Err(Error::InvalidEncoderInput(format!("value {} collides with LZ77 lengths", t.value)));
        }
        Ok((histo, token, nbits, bits))
    }

    pub fn write_header(&self, writer: &mut BinaryWriterBuilder) -> Result<()> {
        let lz77 = &self.params.lz77;
        lz77.write(writer)?;
        if lz77.enabled {
            lz77.length_uint_config.write(8, writer);
        }

        if self.context_map.len() > 1 {
            write_context_map(&self.context_map, writer)?;
        }

        writer.push_bits(self.params.use_prefix_code as u64, 1);
        if !self.params.use_prefix_code {
            writer.push_bits(self.log_alpha_size as u64 - 5, 2);
        }

        for cfg in self.uint_config.iter() {
            cfg.write(self.log_alpha_size, writer);
        }

        if self.params.use_prefix_code {
            for code in self.codes.iter() {
                if let HistogramCode::Prefix(huff) = code {
                    VarLenUint16::write_next(writer, huff.alphabet_size() as u32 - 1);
                }
            }
            for code in self.codes.iter() {
                if let HistogramCode::Prefix(huff) = code {
                    huff.write_table(writer);
                }
            }
        } else {
            for code in self.codes.iter() {
                if let HistogramCode::Ans { counts, .. } = code {
                    write_histogram(counts, writer)?;
                }
            }
        }

        Ok(())
    }

    pub fn write_tokens(&self, writer: &mut BinaryWriterBuilder) -> Result<()> {
        if self.params.use_prefix_code {
            for &(histo, token, nbits, bits) in self.coded.iter() {
                if let HistogramCode::Prefix(huff) = &self.codes[histo] {
                    huff.write_symbol(token as usize, writer)?;
                }
                writer.push_bits(bits as u64, nbits as u64);
            }
            return Ok(());
        }

        let mut ans = AnsEncoder::new();
        let mut flushed = vec![None; self.coded.len()];
        for (i, &(histo, token, _, _)) in self.coded.iter().enumerate().rev() {
            if let HistogramCode::Ans { counts, slots } = &self.codes[histo] {
                flushed[i] = ans.put_symbol(counts[token as usize], &slots[token as usize]);
            }
        }

        writer.push_bits(ans.state() as u64, 32);
        for (&(_, _, nbits, bits), out) in self.coded.iter().zip(flushed) {
            if let Some(out) = out {
                writer.push_bits(out as u64, 16);
            }
            writer.push_bits(bits as u64, nbits as u64);
        }

        Ok(())
    }

    pub fn write(&self, writer: &mut BinaryWriterBuilder) -> Result<()> {
        self.write_header(writer)?;
        self.write_tokens(writer)
    }

    /// Encodes a token file: the contexts of `tokens` as a single-context stream, then
    /// the values. Read back by `DecodedStream::decode_tokens`.
    pub fn encode_token_file(tokens: &[Token], num_contexts: usize, params: EncoderParams) -> Result<BinaryWriter> {
        let mut writer = BinaryWriterBuilder::new();

        let contexts: Vec<Token> = tokens.iter().map(|t| Token::new(0, t.context)).collect();
        EntropyEncoder::builder(1).build(&contexts)?.write(&mut writer)?;
        EntropyEncoder::builder(num_contexts).set_params(params).build(tokens)?.write(&mut writer)?;

        writer.zero_pad_to_byte();
        Ok(writer.build())
    }
}

/// Simple layout for up to 8 histograms, otherwise the map is entropy coded.
fn write_context_map(context_map: &[u8], writer: &mut BinaryWriterBuilder) -> Result<()> {
    let num_histograms = context_map.iter().copied().max().map_or(0, |m| m as usize + 1);
    if num_histograms <= 8 {
        return write_context_map_simple(context_map, writer);
    }

    writer.push_bits(0, 1);
    // No move-to-front.
    writer.push_bits(0, 1);
    let tokens: Vec<Token> = context_map.iter().map(|&c| Token::new(0, c as u32)).collect();
    EntropyEncoder::builder(1).build(&tokens)?.write(writer)
}
