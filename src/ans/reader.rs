use tracing::{debug, error};

use crate::{bitstreams::BinaryReader, error::{Error, Result}, properties::DecoderOptions, utils::unpack_signed};

use super::{
    alias::AliasTable,
    code::{decode_histograms, AnsCode, HistogramTables},
    hybrid_uint::HybridUintConfig,
    lz77::{special_distance, NUM_SPECIAL_DISTANCES, WINDOW_MASK, WINDOW_SIZE},
    ANS_LOG_TAB_SIZE, ANS_SIGNATURE, ANS_TAB_MASK, ANS_TAB_SIZE,
};

/// Tokens at or above this value would be LZ77 lengths; unreachable when LZ77 is off.
const LZ77_DISABLED_THRESHOLD: u32 = 1 << 20;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum CopyState {
    Idle,
    Copying { pos: usize, remaining: u32 },
}

/// Decodes the symbols of one entropy-coded stream.
///
/// Borrows the immutable [`AnsCode`] and owns the mutable decoding state: the ANS state,
/// the LZ77 window and the pending copy. Independent readers over the same code can run
/// on separate threads.
pub struct AnsSymbolReader<'a> {
    code: &'a AnsCode,
    state: u32,
    log_entry_size: u32,
    entry_size_minus_1: u32,

    window: Box<[u32]>,
    num_decoded: usize,
    copy: CopyState,
    lz77_threshold: u32,
    lz77_min_length: u32,
    lz77_length_uint: HybridUintConfig,
    lz77_ctx: usize,
    special_distances: [u32; NUM_SPECIAL_DISTANCES],
    num_special_distances: usize,
}

impl<'a> AnsSymbolReader<'a> {
    /// In ANS mode the initial state is read from the next 32 bits.
    pub fn new(code: &'a AnsCode, reader: &mut BinaryReader, distance_multiplier: u32) -> Self {
        let state = if code.use_prefix_code() { ANS_SIGNATURE << 16 } else { reader.read_bits(32) as u32 };
        let log_entry_size = ANS_LOG_TAB_SIZE - code.log_alpha_size.min(ANS_LOG_TAB_SIZE);

        let mut this = Self {
            code,
            state,
            log_entry_size,
            entry_size_minus_1: (1 << log_entry_size) - 1,
            window: vec![0; WINDOW_SIZE].into_boxed_slice(),
            num_decoded: 0,
            copy: CopyState::Idle,
            lz77_threshold: LZ77_DISABLED_THRESHOLD,
            lz77_min_length: 0,
            lz77_length_uint: HybridUintConfig::default(),
            lz77_ctx: 0,
            special_distances: [0; NUM_SPECIAL_DISTANCES],
            num_special_distances: 0,
        };

        if !code.lz77.enabled {
            return this;
        }

        this.lz77_ctx = code.lz77.distance_context;
        this.lz77_length_uint = code.lz77.length_uint_config;
        this.lz77_threshold = code.lz77.min_symbol;
        this.lz77_min_length = code.lz77.min_length;
        if distance_multiplier != 0 {
            this.num_special_distances = NUM_SPECIAL_DISTANCES;
            for (i, d) in this.special_distances.iter_mut().enumerate() {
                *d = special_distance(i, distance_multiplier);
            }
        }

        this
    }

    pub fn num_decoded(&self) -> usize {
        self.num_decoded
    }

    pub fn state(&self) -> u32 {
        self.state
    }

    /// Decodes one token from the clustered histogram `histo`.
    #[inline(always)]
    pub fn read_symbol(&mut self, histo: usize, reader: &mut BinaryReader) -> u32 {
        reader.refill();
        self.read_symbol_without_refill(histo, reader)
    }

    #[inline(always)]
    fn read_symbol_without_refill(&mut self, histo: usize, reader: &mut BinaryReader) -> u32 {
        let code = self.code;
        match &code.tables {
            HistogramTables::Ans(tables) => {
                let table = &tables[histo << code.log_alpha_size..];
                let symbol = AliasTable::lookup(table, self.state & ANS_TAB_MASK, self.log_entry_size, self.entry_size_minus_1);
                self.state = symbol.freq.wrapping_mul(self.state >> ANS_LOG_TAB_SIZE).wrapping_add(symbol.offset);

                if self.state < 1 << 16 {
                    self.state = (self.state << 16) | reader.peek_fixed_bits::<16>() as u32;
                    reader.consume(16);
                }
                symbol.value
            }
            HistogramTables::Prefix(tables) => tables[histo].read_symbol(reader),
        }
    }

    /// `true` when the stream ended in the state the encoder started from.
    pub fn check_final_state(&self) -> bool {
        self.state == ANS_SIGNATURE << 16
    }

    #[inline(always)]
    fn push_to_window(&mut self, value: u32) {
        self.window[self.num_decoded & WINDOW_MASK] = value;
        self.num_decoded += 1;
    }

    /// Decodes one value from the clustered context `ctx`, expanding LZ77 copies.
    ///
    /// While a copy is pending, values come from the window and `ctx` is ignored.
    pub fn read_hybrid_uint_clustered(&mut self, ctx: usize, reader: &mut BinaryReader) -> u32 {
        loop {
            if let CopyState::Copying { pos, remaining } = self.copy {
                if remaining > 0 {
                    let ret = self.window[pos & WINDOW_MASK];
                    self.copy = CopyState::Copying { pos: pos + 1, remaining: remaining - 1 };
                    self.push_to_window(ret);
                    return ret;
                }
                self.copy = CopyState::Idle;
            }

            reader.refill();
            let token = self.read_symbol_without_refill(ctx, reader);

            if token < self.lz77_threshold {
                let ret = self.code.uint_config[ctx].decode(token, reader);
                self.push_to_window(ret);
                return ret;
            }

            let length = self.lz77_length_uint
                .decode(token - self.lz77_threshold, reader)
                .wrapping_add(self.lz77_min_length);

            reader.refill();
            let distance_token = self.read_symbol_without_refill(self.lz77_ctx, reader);
            let raw = self.code.uint_config[self.lz77_ctx].decode(distance_token, reader) as usize;

            let mut distance = if raw < self.num_special_distances {
                self.special_distances[raw] as usize
            } else {
                raw + 1 - self.num_special_distances
            };
            distance = distance.min(self.num_decoded).min(WINDOW_SIZE);

            self.copy = CopyState::Copying { pos: self.num_decoded - distance, remaining: length };
        }
    }

    /// Decodes one value from the raw context `ctx`.
    #[inline(always)]
    pub fn read_hybrid_uint(&mut self, ctx: usize, reader: &mut BinaryReader, context_map: &[u8]) -> u32 {
        self.read_hybrid_uint_clustered(context_map[ctx] as usize, reader)
    }

    /// Like [`read_hybrid_uint`](Self::read_hybrid_uint), mapping the value back to a signed integer.
    pub fn read_hybrid_uint_signed(&mut self, ctx: usize, reader: &mut BinaryReader, context_map: &[u8]) -> i32 {
        unpack_signed(self.read_hybrid_uint(ctx, reader, context_map))
    }

    /// When the histogram of the clustered context `ctx` has a single symbol that is a
    /// literal value, records `count` copies of it in the window and returns it. No bits
    /// are read. Always `None` for prefix codes.
    pub fn is_single_value(&mut self, ctx: usize, count: usize) -> Option<u32> {
        let code = self.code;
        let HistogramTables::Ans(tables) = &code.tables else {
            return None;
        };

        let table = &tables[ctx << code.log_alpha_size..];
        let symbol = AliasTable::lookup(table, self.state & ANS_TAB_MASK, self.log_entry_size, self.entry_size_minus_1);
        if symbol.freq != ANS_TAB_SIZE
            || symbol.value >= code.uint_config[ctx].split_token
            || symbol.value >= self.lz77_threshold
        {
            return None;
        }

        for _ in 0..count {
            self.push_to_window(symbol.value);
        }
        Some(symbol.value)
    }
}

/// A fully decoded stream: its context map and one value per requested context.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct DecodedStream {
    pub context_map: Vec<u8>,
    pub values: Vec<u32>,
}

impl DecodedStream {
    /// Reads the header for `num_contexts` contexts, then one value for each entry of
    /// `contexts` (raw context ids), and verifies the final ANS state.
    pub fn decode_all(reader: &mut BinaryReader, num_contexts: usize, contexts: &[usize], options: &DecoderOptions) -> Result<Self> {
        let (code, context_map) = decode_histograms(reader, num_contexts, options.disallow_lz77)?;
        let mut symbols = AnsSymbolReader::new(&code, reader, options.distance_multiplier);

        let mut values = Vec::with_capacity(contexts.len());
        for &ctx in contexts {
            if ctx >= num_contexts {
                return Err(Error::InvalidEncoderInput(format!("context {ctx} out of {num_contexts}")));
            }
            values.push(symbols.read_hybrid_uint(ctx, reader, &context_map));
        }

        if !symbols.check_final_state() {
            error!(state = symbols.state(), "ANS final state mismatch");
            return Err(Error::InvalidAnsFinalState(symbols.state()));
        }
        reader.check_in_bounds()?;

        debug!(num_values = values.len(), num_histograms = code.num_histograms(), bits = reader.total_bits_consumed(), "decoded stream");
        Ok(Self { context_map, values })
    }

    /// Decodes a token file: the context of every token, coded as a single-context
    /// stream, followed by the values.
    pub fn decode_tokens(reader: &mut BinaryReader, num_contexts: usize, num_tokens: usize, options: &DecoderOptions) -> Result<(Vec<usize>, Self)> {
        let ctx_options = DecoderOptions { distance_multiplier: 0, ..*options };
        let contexts = Self::decode_all(reader, 1, &vec![0; num_tokens], &ctx_options)?;
        let contexts: Vec<usize> = contexts.values.into_iter().map(|c| c as usize).collect();

        let stream = Self::decode_all(reader, num_contexts, &contexts, options)?;
        Ok((contexts, stream))
    }
}
