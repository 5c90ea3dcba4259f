use crate::{bitstreams::BinaryReader, error::{Error, Result}, utils::{encodings::decode_varlen_u8, floor_log2_nonzero}};

use super::ANS_LOG_TAB_SIZE;

/// Logcount value signalling a run of repeated counts.
pub const RLE_ESCAPE: u32 = ANS_LOG_TAB_SIZE + 1;

/// Static prefix code for logcounts, indexed by the next 7 bits: `(nbits, logcount)`.
#[rustfmt::skip]
pub const LOGCOUNT_HUFFMAN: [(u8, u8); 128] = [
    (3, 10), (7, 12), (3, 7), (4, 3), (3, 6), (3, 8), (3, 9), (4, 5),
    (3, 10), (4, 4),  (3, 7), (4, 1), (3, 6), (3, 8), (3, 9), (4, 2),
    (3, 10), (5, 0),  (3, 7), (4, 3), (3, 6), (3, 8), (3, 9), (4, 5),
    (3, 10), (4, 4),  (3, 7), (4, 1), (3, 6), (3, 8), (3, 9), (4, 2),
    (3, 10), (6, 11), (3, 7), (4, 3), (3, 6), (3, 8), (3, 9), (4, 5),
    (3, 10), (4, 4),  (3, 7), (4, 1), (3, 6), (3, 8), (3, 9), (4, 2),
    (3, 10), (5, 0),  (3, 7), (4, 3), (3, 6), (3, 8), (3, 9), (4, 5),
    (3, 10), (4, 4),  (3, 7), (4, 1), (3, 6), (3, 8), (3, 9), (4, 2),
    (3, 10), (7, 13), (3, 7), (4, 3), (3, 6), (3, 8), (3, 9), (4, 5),
    (3, 10), (4, 4),  (3, 7), (4, 1), (3, 6), (3, 8), (3, 9), (4, 2),
    (3, 10), (5, 0),  (3, 7), (4, 3), (3, 6), (3, 8), (3, 9), (4, 5),
    (3, 10), (4, 4),  (3, 7), (4, 1), (3, 6), (3, 8), (3, 9), (4, 2),
    (3, 10), (6, 11), (3, 7), (4, 3), (3, 6), (3, 8), (3, 9), (4, 5),
    (3, 10), (4, 4),  (3, 7), (4, 1), (3, 6), (3, 8), (3, 9), (4, 2),
    (3, 10), (5, 0),  (3, 7), (4, 3), (3, 6), (3, 8), (3, 9), (4, 5),
    (3, 10), (4, 4),  (3, 7), (4, 1), (3, 6), (3, 8), (3, 9), (4, 2),
];

/// Number of explicitly stored bits below the leading one of a count whose floor log2 is
/// `logcount`; the remaining low bits are implicitly zero.
#[inline(always)]
pub fn population_count_precision(logcount: u32, shift: u32) -> u32 {
    let r = (logcount as i32).min(shift as i32 - ((ANS_LOG_TAB_SIZE - logcount) >> 1) as i32);
    r.max(0) as u32
}

/// Uniform histogram over `length` symbols; the remainder goes one each to the first symbols.
pub fn create_flat_histogram(length: usize, total_count: u32) -> Vec<u32> {
    assert!(length > 0);
    assert!(length as u32 <= total_count);

    let count = total_count / length as u32;
    let rem_counts = (total_count % length as u32) as usize;

    let mut result = vec![count; length];
    for c in result.iter_mut().take(rem_counts) {
        *c += 1;
    }
    result
}

/// Parses one symbol-frequency histogram whose counts sum to `1 << precision_bits`.
pub fn read_histogram(precision_bits: u32, reader: &mut BinaryReader) -> Result<Vec<u32>> {
    let total = 1u32 << precision_bits;

    if reader.read_bool() {
        return read_simple_histogram(precision_bits, reader);
    }

    if reader.read_bool() {
        let alphabet_size = decode_varlen_u8(reader) as usize + 1;
        return Ok(create_flat_histogram(alphabet_size, total));
    }

    let shift = read_shift(reader)?;
    let length = decode_varlen_u8(reader) as usize + 3;

    let mut logcounts = vec![0u32; length];
    // Run length covering each position that starts an RLE run, zero elsewhere.
    let mut same = vec![0usize; length];
    let mut omit: Option<(u32, usize)> = None;

    let mut i = 0;
    while i < length {
        reader.refill();
        let (nbits, logcount) = LOGCOUNT_HUFFMAN[reader.peek_fixed_bits::<7>() as usize];
        reader.consume(nbits as usize);
        logcounts[i] = logcount as u32;

        if logcounts[i] == RLE_ESCAPE {
            let rle_length = decode_varlen_u8(reader) as usize;
            same[i] = rle_length + 4;
            i += rle_length + 4;
            continue;
        }

        // Strict comparison: the first maximum wins.
        if omit.map_or(true, |(log, _)| logcounts[i] > log) {
            omit = Some((logcounts[i], i));
        }
        i += 1;
    }

    let Some((_, omit_pos)) = omit else {
        return Err(Error::CorruptHistogram("no symbol to omit"));
    };
    if omit_pos + 1 < length && logcounts[omit_pos + 1] == RLE_ESCAPE {
        return Err(Error::CorruptHistogram("RLE run right after the omitted symbol"));
    }

    let mut counts = vec![0u32; length];
    let mut total_count = 0u32;
    let mut prev = 0;
    let mut numsame = 0;

    for i in 0..length {
        if same[i] != 0 {
            numsame = same[i];
            prev = if i > 0 { counts[i - 1] } else { 0 };
        }

        if numsame > 0 {
            counts[i] = prev;
            numsame -= 1;
        } else {
            let code = logcounts[i];
            if i == omit_pos || code == 0 {
                continue;
            } else if code == 1 {
                counts[i] = 1;
            } else {
                let bitcount = population_count_precision(code - 1, shift);
                counts[i] = (1 << (code - 1)) + ((reader.read_bits(bitcount as usize) as u32) << (code - 1 - bitcount));
            }
        }

        total_count += counts[i];
    }

    if total_count >= total {
        tracing::error!(total_count, total, "over-subscribed histogram");
        return Err(Error::InvalidHistogramCount);
    }
    counts[omit_pos] = total - total_count;

    Ok(counts)
}

fn read_simple_histogram(precision_bits: u32, reader: &mut BinaryReader) -> Result<Vec<u32>> {
    let num_symbols = reader.read_bits(1) as usize + 1;
    let mut symbols = [0usize; 2];
    for s in symbols.iter_mut().take(num_symbols) {
        *s = decode_varlen_u8(reader) as usize;
    }

    let max_symbol = symbols[..num_symbols].iter().copied().max().unwrap_or(0);
    let mut counts = vec![0u32; max_symbol + 1];

    if num_symbols == 1 {
        counts[symbols[0]] = 1 << precision_bits;
    } else {
        if symbols[0] == symbols[1] {
            return Err(Error::CorruptHistogram("corrupt data"));
        }
        let first = reader.read_bits(precision_bits as usize) as u32;
        counts[symbols[0]] = first;
        counts[symbols[1]] = (1 << precision_bits) - first;
    }

    Ok(counts)
}

/// Unary-prefixed exponent: at most `floor(log2(ANS_LOG_TAB_SIZE + 1))` one bits, then
/// that many payload bits below an implicit leading one, minus one.
fn read_shift(reader: &mut BinaryReader) -> Result<u32> {
    let upper_bound_log = floor_log2_nonzero(ANS_LOG_TAB_SIZE + 1);
    let mut log = 0;
    while log < upper_bound_log {
        if reader.read_bits(1) == 0 {
            break;
        }
        log += 1;
    }

    let shift = (reader.read_bits(log as usize) as u32 | (1 << log)) - 1;
    if shift > ANS_LOG_TAB_SIZE + 1 {
        return Err(Error::InvalidShift(shift));
    }
    Ok(shift)
}
