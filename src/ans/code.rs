use tracing::{debug, error, trace};

use crate::{bitstreams::BinaryReader, error::{Error, Result}, huffman::HuffmanDecodingData, utils::encodings::decode_varlen_u16};

use super::{
    alias::{AliasEntry, AliasTable},
    context_map::decode_context_map,
    histogram::read_histogram,
    hybrid_uint::{decode_uint_configs, HybridUintConfig},
    lz77::Lz77Params,
    ANS_LOG_TAB_SIZE, ANS_MAX_ALPHABET_SIZE, ANS_TAB_SIZE, PREFIX_MAX_ALPHABET_SIZE,
};

/// Per-histogram decoding tables: alias tables, all `1 << log_alpha_size` entries long
/// and concatenated in histogram order, or one prefix code per histogram.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum HistogramTables {
    Ans(Vec<AliasEntry>),
    Prefix(Vec<HuffmanDecodingData>),
}

/// Everything needed to decode the symbols of a stream. Immutable once built.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AnsCode {
    pub tables: HistogramTables,
    pub uint_config: Vec<HybridUintConfig>,
    pub lz77: Lz77Params,
    pub log_alpha_size: u32,
}

impl AnsCode {
    pub fn use_prefix_code(&self) -> bool {
        matches!(self.tables, HistogramTables::Prefix(_))
    }

    pub fn num_histograms(&self) -> usize {
        self.uint_config.len()
    }
}

/// Reads the entropy-code header for `num_contexts` raw contexts, returning the code and
/// the context map from raw context to histogram.
///
/// When LZ77 is enabled an extra context, the last one, is reserved for distances.
pub fn decode_histograms(reader: &mut BinaryReader, num_contexts: usize, disallow_lz77: bool) -> Result<(AnsCode, Vec<u8>)> {
    let mut num_contexts = num_contexts;
    let mut lz77 = Lz77Params::read(reader);
    if lz77.enabled {
        num_contexts += 1;
        lz77.length_uint_config = HybridUintConfig::read(8, reader)?;
    }
    if lz77.enabled && disallow_lz77 {
        error!("LZ77 enabled in a stream that disallows it");
        return Err(Error::Lz77Disallowed);
    }
    debug!(enabled = lz77.enabled, min_symbol = lz77.min_symbol, min_length = lz77.min_length, "lz77 params");

    let mut context_map = vec![0u8; num_contexts];
    let mut num_histograms = 1;
    if num_contexts > 1 {
        (context_map, num_histograms) = decode_context_map(reader, num_contexts)?;
    }
    lz77.distance_context = context_map.last().copied().unwrap_or(0) as usize;

    let use_prefix_code = reader.read_bool();
    let log_alpha_size = if use_prefix_code {
        crate::huffman::K_MAX_HUFFMAN_BITS as u32
    } else {
        reader.read_bits(2) as u32 + 5
    };
    debug!(num_contexts, num_histograms, use_prefix_code, log_alpha_size, "histogram header");

    let uint_config = decode_uint_configs(log_alpha_size, num_histograms, reader)?;

    let tables = if use_prefix_code {
        HistogramTables::Prefix(read_prefix_codes(num_histograms, PREFIX_MAX_ALPHABET_SIZE, reader)?)
    } else {
        HistogramTables::Ans(read_alias_tables(num_histograms, log_alpha_size, reader)?)
    };

    Ok((AnsCode { tables, uint_config, lz77, log_alpha_size }, context_map))
}

fn read_prefix_codes(num_histograms: usize, max_alphabet_size: usize, reader: &mut BinaryReader) -> Result<Vec<HuffmanDecodingData>> {
    let mut alphabet_sizes = Vec::with_capacity(num_histograms);
    for _ in 0..num_histograms {
        let size = decode_varlen_u16(reader) as usize + 1;
        if size > max_alphabet_size {
            error!(size, max_alphabet_size, "prefix code alphabet too large");
            return Err(Error::InvalidAlphabetSize { size, max: max_alphabet_size });
        }
        alphabet_sizes.push(size);
    }

    // The code descriptions are parsed by a byte-fed sub-reader positioned at the
    // current bit; the outer reader then skips what it consumed.
    reader.splice_byte_aligned(|sub| {
        let mut codes = Vec::with_capacity(num_histograms);
        for (c, &size) in alphabet_sizes.iter().enumerate() {
            let data = if size > 1 {
                HuffmanDecodingData::read_from_bitstream(size, sub).map_err(|e| {
                    error!(histogram = c, alphabet_size = size, "invalid prefix code");
                    e
                })?
            } else {
                HuffmanDecodingData::trivial()
            };
            trace!(histogram = c, alphabet_size = size, table_size = data.table.len(), "prefix code");
            codes.push(data);
        }

        if !sub.is_healthy() {
            error!("prefix code descriptions run past the end of the stream");
            return Err(Error::InvalidHuffmanCode("Invalid huffman code bitstream".into()));
        }
        Ok(codes)
    })
}

fn read_alias_tables(num_histograms: usize, log_alpha_size: u32, reader: &mut BinaryReader) -> Result<Vec<AliasEntry>> {
    let max_alphabet_size = (1usize << log_alpha_size).min(ANS_MAX_ALPHABET_SIZE);
    let mut tables = Vec::with_capacity(num_histograms << log_alpha_size);

    for c in 0..num_histograms {
        let counts = read_histogram(ANS_LOG_TAB_SIZE, reader).map_err(|e| {
            error!(histogram = c, "invalid histogram: {e}");
            e
        })?;
        if counts.len() > max_alphabet_size {
            error!(histogram = c, size = counts.len(), "histogram alphabet too large");
            return Err(Error::InvalidAlphabetSize { size: counts.len(), max: max_alphabet_size });
        }
        trace!(histogram = c, alphabet_size = counts.len(), "histogram");

        tables.extend(AliasTable::build(&counts, ANS_TAB_SIZE, log_alpha_size)?);
    }

    Ok(tables)
}
