use crate::{bitstreams::{BinaryReader, ByteAlignedReader}, error::{Error, Result}, utils::floor_log2_nonzero};

use super::{HuffmanCode, K_CODE_LENGTH_CODES, K_CODE_LENGTH_CODE_ORDER, K_CODE_LENGTH_REPEAT_CODE, K_DEFAULT_CODE_LENGTH, K_HUFFMAN_TABLE_BITS, K_MAX_HUFFMAN_BITS};

/// Static code for the code-length code lengths, indexed by the next 4 bits.
const CODE_LENGTH_CODE_TABLE: [HuffmanCode; 16] = [
    HuffmanCode::new(2, 0), HuffmanCode::new(2, 4), HuffmanCode::new(2, 3), HuffmanCode::new(3, 2),
    HuffmanCode::new(2, 0), HuffmanCode::new(2, 4), HuffmanCode::new(2, 3), HuffmanCode::new(4, 1),
    HuffmanCode::new(2, 0), HuffmanCode::new(2, 4), HuffmanCode::new(2, 3), HuffmanCode::new(3, 2),
    HuffmanCode::new(2, 0), HuffmanCode::new(2, 4), HuffmanCode::new(2, 3), HuffmanCode::new(4, 5),
];

/// Two-level decoding table of one prefix code: an 8-bit root table followed by the
/// second-level tables it links to.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct HuffmanDecodingData {
    pub table: Vec<HuffmanCode>,
}

impl HuffmanDecodingData {
    /// Table for an alphabet with a single symbol, which takes no bits.
    pub fn trivial() -> Self {
        Self { table: vec![HuffmanCode::default(); 1 << K_HUFFMAN_TABLE_BITS] }
    }

    /// Parses either a simple code (1 to 4 symbols) or a complex one described by code
    /// lengths, themselves coded with a code-length code.
    pub fn read_from_bitstream(alphabet_size: usize, reader: &mut ByteAlignedReader) -> Result<Self> {
        if alphabet_size > 1 << K_MAX_HUFFMAN_BITS {
            return Err(Error::InvalidHuffmanCode(format!("alphabet size {alphabet_size} too large")));
        }

        // 1 means simple code; 0, 2 and 3 are the number of skipped code-length codes.
        let simple_code_or_skip = reader.read_bits(2) as usize;
        if simple_code_or_skip == 1 {
            return read_simple_code(alphabet_size, reader);
        }

        let mut code_length_code_lengths = [0u8; K_CODE_LENGTH_CODES];
        let mut space = 32i32;
        let mut num_codes = 0;

        for &idx in K_CODE_LENGTH_CODE_ORDER.iter().skip(simple_code_or_skip) {
            if space <= 0 {
                break;
            }

            let p = CODE_LENGTH_CODE_TABLE[reader.peek(4) as usize];
            reader.drop_bits(p.bits as usize);
            let v = p.value as u8;
            code_length_code_lengths[idx] = v;
            if v != 0 {
                space -= 32 >> v;
                num_codes += 1;
            }
        }

        if num_codes != 1 && space != 0 {
            return Err(Error::InvalidHuffmanCode("incomplete code-length code".into()));
        }

        let code_lengths = read_code_lengths(&code_length_code_lengths, alphabet_size, reader)?;

        let mut counts = [0u16; K_MAX_HUFFMAN_BITS + 1];
        for &len in code_lengths.iter() {
            counts[len as usize] += 1;
        }

        let table = build_huffman_table(K_HUFFMAN_TABLE_BITS, &code_lengths, &mut counts)?;
        Ok(Self { table })
    }

    /// Decodes one symbol.
    #[inline(always)]
    pub fn read_symbol(&self, reader: &mut BinaryReader) -> u32 {
        let mut idx = reader.peek_fixed_bits::<K_HUFFMAN_TABLE_BITS>() as usize;
        let mut entry = self.table[idx];
        let nbits = entry.bits as usize;

        if nbits > K_HUFFMAN_TABLE_BITS {
            reader.consume(K_HUFFMAN_TABLE_BITS);
            idx += entry.value as usize;
            idx += reader.peek_bits(nbits - K_HUFFMAN_TABLE_BITS) as usize;
            entry = self.table[idx];
        }

        reader.consume(entry.bits as usize);
        entry.value as u32
    }
}

fn read_simple_code(alphabet_size: usize, reader: &mut ByteAlignedReader) -> Result<HuffmanDecodingData> {
    let max_bits = if alphabet_size > 1 { floor_log2_nonzero(alphabet_size as u32 - 1) as usize + 1 } else { 0 };
    let mut num_symbols = reader.read_bits(2) as usize + 1;

    let mut symbols = [0u16; 4];
    for s in symbols.iter_mut().take(num_symbols) {
        let symbol = reader.read_bits(max_bits) as usize;
        if symbol >= alphabet_size {
            return Err(Error::InvalidHuffmanCode(format!("symbol {symbol} outside alphabet of {alphabet_size}")));
        }
        *s = symbol as u16;
    }

    for i in 0..num_symbols {
        if symbols[i + 1..num_symbols].contains(&symbols[i]) {
            return Err(Error::InvalidHuffmanCode("repeated symbol in simple code".into()));
        }
    }

    // Four symbols can be either a flat code or lengths 1, 2, 3, 3.
    if num_symbols == 4 {
        num_symbols += reader.read_bits(1) as usize;
    }

    let mut table = vec![HuffmanCode::default(); 1 << K_HUFFMAN_TABLE_BITS];
    let table_size = match num_symbols {
        1 => {
            table[0] = HuffmanCode::new(0, symbols[0]);
            1
        }
        2 => {
            symbols[..2].sort_unstable();
            table[0] = HuffmanCode::new(1, symbols[0]);
            table[1] = HuffmanCode::new(1, symbols[1]);
            2
        }
        3 => {
            symbols[1..3].sort_unstable();
            table[0] = HuffmanCode::new(1, symbols[0]);
            table[2] = HuffmanCode::new(1, symbols[0]);
            table[1] = HuffmanCode::new(2, symbols[1]);
            table[3] = HuffmanCode::new(2, symbols[2]);
            4
        }
        4 => {
            symbols.sort_unstable();
            table[0] = HuffmanCode::new(2, symbols[0]);
            table[2] = HuffmanCode::new(2, symbols[1]);
            table[1] = HuffmanCode::new(2, symbols[2]);
            table[3] = HuffmanCode::new(2, symbols[3]);
            4
        }
        _ => {
            symbols[2..4].sort_unstable();
            table[0] = HuffmanCode::new(1, symbols[0]);
            table[1] = HuffmanCode::new(2, symbols[1]);
            table[2] = HuffmanCode::new(1, symbols[0]);
            table[3] = HuffmanCode::new(3, symbols[2]);
            table[4] = HuffmanCode::new(1, symbols[0]);
            table[5] = HuffmanCode::new(2, symbols[1]);
            table[6] = HuffmanCode::new(1, symbols[0]);
            table[7] = HuffmanCode::new(3, symbols[3]);
            8
        }
    };

    let mut size = table_size;
    while size != table.len() {
        table.copy_within(0..size, size);
        size <<= 1;
    }

    Ok(HuffmanDecodingData { table })
}

/// Reads `num_symbols` code lengths; literal lengths 0 to 15, 16 repeats the previous
/// non-zero length and 17 repeats zero. Consecutive repeat codes extend each other.
fn read_code_lengths(code_length_code_lengths: &[u8; K_CODE_LENGTH_CODES], num_symbols: usize, reader: &mut ByteAlignedReader) -> Result<Vec<u8>> {
    let mut counts = [0u16; K_MAX_HUFFMAN_BITS + 1];
    for &len in code_length_code_lengths.iter() {
        counts[len as usize] += 1;
    }
    let table = build_huffman_table(5, code_length_code_lengths, &mut counts)?;

    let mut code_lengths = vec![0u8; num_symbols];
    let mut symbol = 0;
    let mut prev_code_len = K_DEFAULT_CODE_LENGTH;
    let mut repeat = 0usize;
    let mut repeat_code_len = 0u8;
    let mut space = 1i32 << 15;

    while symbol < num_symbols && space > 0 {
        let p = table[reader.peek(5) as usize];
        reader.drop_bits(p.bits as usize);
        let code_len = p.value as u8;

        if code_len < K_CODE_LENGTH_REPEAT_CODE {
            repeat = 0;
            code_lengths[symbol] = code_len;
            symbol += 1;
            if code_len != 0 {
                prev_code_len = code_len;
                space -= 32768 >> code_len;
            }
            continue;
        }

        let extra_bits = (code_len - 14) as usize;
        let new_len = if code_len == K_CODE_LENGTH_REPEAT_CODE { prev_code_len } else { 0 };
        if repeat_code_len != new_len {
            repeat = 0;
            repeat_code_len = new_len;
        }

        let old_repeat = repeat;
        if repeat > 0 {
            repeat -= 2;
            repeat <<= extra_bits;
        }
        repeat += reader.read_bits(extra_bits) as usize + 3;
        let repeat_delta = repeat - old_repeat;

        if symbol + repeat_delta > num_symbols {
            return Err(Error::InvalidHuffmanCode("code length repeat past the alphabet".into()));
        }
        code_lengths[symbol..symbol + repeat_delta].fill(repeat_code_len);
        symbol += repeat_delta;
        if repeat_code_len != 0 {
            space -= (repeat_delta << (15 - repeat_code_len)) as i32;
        }
    }

    if space != 0 {
        return Err(Error::InvalidHuffmanCode("code lengths do not form a complete code".into()));
    }

    Ok(code_lengths)
}

/// Next key in bit-reversed order for a code of length `len`.
#[inline(always)]
fn get_next_key(key: usize, len: usize) -> usize {
    let mut step = 1 << (len - 1);
    while key & step != 0 {
        step >>= 1;
    }
    (key & (step.wrapping_sub(1))) + step
}

/// Stores `code` at `table[base + end - step]`, `table[base + end - 2 * step]`, down to `table[base]`.
#[inline(always)]
fn replicate_value(table: &mut [HuffmanCode], base: usize, step: usize, mut end: usize, code: HuffmanCode) {
    loop {
        end -= step;
        table[base + end] = code;
        if end == 0 {
            break;
        }
    }
}

/// Bit width of the second-level table starting at code length `len`.
#[inline(always)]
fn next_table_bit_size(count: &[u16], mut len: usize, root_bits: usize) -> usize {
    let mut left = 1i32 << (len - root_bits);
    while len < K_MAX_HUFFMAN_BITS {
        if left <= count[len] as i32 {
            break;
        }
        left -= count[len] as i32;
        len += 1;
        left <<= 1;
    }
    len - root_bits
}

/// Builds the root table (`root_bits` wide) followed by the second-level tables.
///
/// `count[len]` is the number of symbols with code length `len` and is consumed.
pub fn build_huffman_table(root_bits: usize, code_lengths: &[u8], count: &mut [u16; K_MAX_HUFFMAN_BITS + 1]) -> Result<Vec<HuffmanCode>> {
    if code_lengths.len() > 1 << K_MAX_HUFFMAN_BITS {
        return Err(Error::InvalidHuffmanCode("too many code lengths".into()));
    }

    let mut offset = [0usize; K_MAX_HUFFMAN_BITS + 1];
    let mut max_length = 0;
    let mut sum = 0;
    for len in 1..=K_MAX_HUFFMAN_BITS {
        offset[len] = sum;
        if count[len] != 0 {
            sum += count[len] as usize;
            max_length = len;
        }
    }

    let mut sorted = vec![0u16; code_lengths.len()];
    for (symbol, &len) in code_lengths.iter().enumerate() {
        if len != 0 {
            sorted[offset[len as usize]] = symbol as u16;
            offset[len as usize] += 1;
        }
    }

    let mut total_size = 1 << root_bits;
    let mut table = vec![HuffmanCode::default(); total_size];

    // Only one value: it takes no bits.
    if offset[K_MAX_HUFFMAN_BITS] == 1 {
        table.fill(HuffmanCode::new(0, sorted[0]));
        return Ok(table);
    }
    if sum == 0 {
        return Err(Error::InvalidHuffmanCode("empty code".into()));
    }

    let mut table_bits = root_bits.min(max_length);
    let mut table_size = 1 << table_bits;
    let mut key = 0;
    let mut symbol = 0;
    let mut step = 2;

    for bits in 1..=table_bits {
        while count[bits] != 0 {
            let code = HuffmanCode::new(bits as u8, sorted[symbol]);
            symbol += 1;
            replicate_value(&mut table, key, step, table_size, code);
            key = get_next_key(key, bits);
            count[bits] -= 1;
        }
        step <<= 1;
    }

    // Replicate the partial root table when the longest code is shorter than root_bits.
    while total_size != table_size {
        table.copy_within(0..table_size, table_size);
        table_size <<= 1;
    }

    let mask = total_size - 1;
    let mut low = usize::MAX;
    let mut sub_table = 0;
    step = 2;
    for len in root_bits + 1..=max_length {
        while count[len] != 0 {
            if key & mask != low {
                sub_table += table_size;
                table_bits = next_table_bit_size(&count[..], len, root_bits);
                table_size = 1 << table_bits;
                total_size += table_size;
                table.resize(total_size, HuffmanCode::default());
                low = key & mask;
                table[low] = HuffmanCode::new((table_bits + root_bits) as u8, (sub_table - low) as u16);
            }

            let code = HuffmanCode::new((len - root_bits) as u8, sorted[symbol]);
            symbol += 1;
            replicate_value(&mut table, sub_table + (key >> root_bits), step, table_size, code);
            key = get_next_key(key, len);
            count[len] -= 1;
        }
        step <<= 1;
    }

    Ok(table)
}
