use crate::{bitstreams::{BinaryReader, BinaryWriterBuilder}, error::{Error, Result}, utils::ceil_log2_nonzero};

use super::{code::decode_histograms, reader::AnsSymbolReader, K_MAX_CLUSTERS};

/// Reads the map from each of `num_contexts` raw contexts to its histogram, returning it
/// with the number of histograms.
///
/// Simple maps store every entry in a fixed number of bits; the others are themselves
/// entropy coded as a single-context stream, optionally move-to-front transformed.
pub fn decode_context_map(reader: &mut BinaryReader, num_contexts: usize) -> Result<(Vec<u8>, usize)> {
    let mut context_map = vec![0u8; num_contexts];

    if reader.read_bool() {
        let bits_per_entry = reader.read_bits(2) as usize;
        if bits_per_entry != 0 {
            for entry in context_map.iter_mut() {
                *entry = reader.read_bits(bits_per_entry) as u8;
            }
        }
    } else {
        let use_mtf = reader.read_bool();
        // Two entries never need LZ77; refusing it also bounds the nesting depth.
        let (code, sub_map) = decode_histograms(reader, 1, num_contexts <= 2)?;
        let mut symbols = AnsSymbolReader::new(&code, reader, 0);

        for entry in context_map.iter_mut() {
            let sym = symbols.read_hybrid_uint(0, reader, &sub_map);
            if sym as usize >= K_MAX_CLUSTERS {
                return Err(Error::InvalidContextMap("Invalid cluster ID"));
            }
            *entry = sym as u8;
        }

        if !symbols.check_final_state() {
            return Err(Error::InvalidContextMap("Invalid context map"));
        }

        if use_mtf {
            inverse_move_to_front(&mut context_map);
        }
    }

    let num_histograms = verify_context_map(&context_map)?;
    Ok((context_map, num_histograms))
}

/// Number of histograms, provided every id below the maximum is used.
pub fn verify_context_map(context_map: &[u8]) -> Result<usize> {
    let num_histograms = context_map.iter().copied().max().map_or(0, |m| m as usize + 1);
    if num_histograms > K_MAX_CLUSTERS {
        return Err(Error::InvalidContextMap("too many clusters"));
    }

    let mut seen = vec![false; num_histograms];
    for &c in context_map {
        seen[c as usize] = true;
    }
    if seen.iter().any(|&s| !s) {
        return Err(Error::InvalidContextMap("Incomplete context map."));
    }

    Ok(num_histograms)
}

pub fn move_to_front(v: &mut [u8]) {
    let mut mtf: [u8; 256] = std::array::from_fn(|i| i as u8);
    for x in v.iter_mut() {
        let index = mtf.iter().position(|&m| m == *x).unwrap_or(0);
        *x = index as u8;
        mtf[..=index].rotate_right(1);
    }
}

pub fn inverse_move_to_front(v: &mut [u8]) {
    let mut mtf: [u8; 256] = std::array::from_fn(|i| i as u8);
    for x in v.iter_mut() {
        let index = *x as usize;
        *x = mtf[index];
        if index != 0 {
            mtf[..=index].rotate_right(1);
        }
    }
}

/// Writes `context_map` in the simple layout. Needs at most 8 histograms.
pub fn write_context_map_simple(context_map: &[u8], writer: &mut BinaryWriterBuilder) -> Result<()> {
    let num_histograms = verify_context_map(context_map)?;
    let bits_per_entry = if num_histograms > 1 { ceil_log2_nonzero(num_histograms as u32) } else { 0 };
    if bits_per_entry > 3 {
        return Err(Error::InvalidEncoderInput(format!("{num_histograms} histograms need a coded context map")));
    }

    writer.push_bits(1, 1);
    writer.push_bits(bits_per_entry as u64, 2);
    for &c in context_map {
        writer.push_bits(c as u64, bits_per_entry as u64);
    }
    Ok(())
}
