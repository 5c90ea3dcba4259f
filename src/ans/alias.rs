use crate::error::{Error, Result};

use super::ANS_TAB_SIZE;

/// One bucket of the alias table.
///
/// Slot positions below `cutoff` belong to the bucket's own symbol, the rest to
/// `right_value`, whose offsets continue from `offsets1 + cutoff`.
#[derive(Clone, Copy, Default, Debug, Eq, PartialEq)]
pub struct AliasEntry {
    pub cutoff: u16,
    pub right_value: u16,
    pub freq0: u16,
    pub offsets1: u16,
    pub freq1_xor_freq0: u16,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct AliasSymbol {
    pub value: u32,
    /// Rank of the slot among all slots of `value`, in `0..freq`.
    pub offset: u32,
    pub freq: u32,
}

pub struct AliasTable;

impl AliasTable {
    /// Builds the `1 << log_alpha_size` buckets for a distribution summing to `range`.
    pub fn build(counts: &[u32], range: u32, log_alpha_size: u32) -> Result<Vec<AliasEntry>> {
        let table_size = 1usize << log_alpha_size;
        debug_assert!(table_size as u32 <= range);
        let entry_size = range >> log_alpha_size;

        let trimmed = counts.iter().rposition(|&c| c != 0).map_or(0, |p| p + 1);
        let full = [range];
        let distribution = if trimmed == 0 { &full[..] } else { &counts[..trimmed] };

        if distribution.len() > table_size {
            return Err(Error::InvalidAlphabetSize { size: distribution.len(), max: table_size });
        }
        if distribution.iter().sum::<u32>() != range {
            return Err(Error::InvalidHistogramCount);
        }

        let mut table = vec![AliasEntry::default(); table_size];

        if let Some(symbol) = distribution.iter().position(|&c| c == range) {
            // The state is left untouched: every slot maps to itself.
            for (i, entry) in table.iter_mut().enumerate() {
                *entry = AliasEntry {
                    cutoff: 0,
                    right_value: symbol as u16,
                    freq0: 0,
                    offsets1: (entry_size as usize * i) as u16,
                    freq1_xor_freq0: range as u16,
                };
            }
            return Ok(table);
        }

        let mut cutoffs = vec![0u32; table_size];
        let mut underfull = Vec::with_capacity(table_size);
        let mut overfull = Vec::with_capacity(table_size);

        for (i, cutoff) in cutoffs.iter_mut().enumerate() {
            *cutoff = distribution.get(i).copied().unwrap_or(0);
            if *cutoff > entry_size {
                overfull.push(i);
            } else if *cutoff < entry_size {
                underfull.push(i);
            }
        }

        while let Some(o) = overfull.pop() {
            let Some(u) = underfull.pop() else {
                return Err(Error::InvalidHistogramCount);
            };

            cutoffs[o] -= entry_size - cutoffs[u];
            table[u].right_value = o as u16;
            table[u].offsets1 = cutoffs[o] as u16;

            if cutoffs[o] < entry_size {
                underfull.push(o);
            } else if cutoffs[o] > entry_size {
                overfull.push(o);
            }
        }

        for (i, entry) in table.iter_mut().enumerate() {
            if cutoffs[i] == entry_size {
                entry.right_value = i as u16;
                entry.offsets1 = 0;
                entry.cutoff = 0;
            } else {
                entry.offsets1 = entry.offsets1.wrapping_sub(cutoffs[i] as u16);
                entry.cutoff = cutoffs[i] as u16;
            }

            let freq0 = distribution.get(i).copied().unwrap_or(0);
            let freq1 = distribution.get(entry.right_value as usize).copied().unwrap_or(0);
            entry.freq0 = freq0 as u16;
            entry.freq1_xor_freq0 = (freq1 ^ freq0) as u16;
        }

        Ok(table)
    }

    #[inline(always)]
    pub fn lookup(table: &[AliasEntry], slot: u32, log_entry_size: u32, entry_size_minus_1: u32) -> AliasSymbol {
        let i = (slot >> log_entry_size) as usize;
        let pos = slot & entry_size_minus_1;
        let entry = table[i];

        let greater = pos >= entry.cutoff as u32;
        let value = if greater { entry.right_value as u32 } else { i as u32 };
        let freq = entry.freq0 as u32 ^ if greater { entry.freq1_xor_freq0 as u32 } else { 0 };
        let offset = pos + if greater { entry.offsets1 as u32 } else { 0 };

        AliasSymbol { value, offset, freq }
    }

    /// For every symbol, the slot holding each of its offsets: `result[s][o]` is the slot
    /// whose lookup yields `(s, o)`. Used by the encoder to invert [`lookup`](Self::lookup).
    pub fn reverse_map(table: &[AliasEntry], counts: &[u32], log_alpha_size: u32) -> Vec<Vec<u32>> {
        let log_entry_size = super::ANS_LOG_TAB_SIZE - log_alpha_size;
        let entry_size_minus_1 = (1 << log_entry_size) - 1;

        let mut map: Vec<Vec<u32>> = counts.iter().map(|&c| vec![0; c as usize]).collect();
        for slot in 0..ANS_TAB_SIZE {
            let s = Self::lookup(table, slot, log_entry_size, entry_size_minus_1);
            if let Some(slots) = map.get_mut(s.value as usize) {
                if let Some(dst) = slots.get_mut(s.offset as usize) {
                    *dst = slot;
                }
            }
        }
        map
    }
}
