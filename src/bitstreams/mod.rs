use serde::{Serialize, Deserialize};

use crate::error::{Error, Result};

#[inline(always)]
fn mask(len: usize) -> u64 {
    (1u64 << len) - 1
}

#[derive(Clone, Eq, PartialEq, Serialize, Deserialize, Debug, Default)]
pub struct BinaryWriter {
    pub os: Box<[u8]>,
}

/// Bit writer producing the least-significant-bit-first layout read by [`BinaryReader`].
#[derive(Default, Debug)]
pub struct BinaryWriterBuilder {
    os: Vec<u8>,
    pub written_bits: usize,
    current: u64,
    used: usize,
}

impl BinaryWriterBuilder {
    pub fn build(mut self) -> BinaryWriter {
        if self.used > 0 {
            self.write(self.current);
        }

        BinaryWriter {
            os: self.os.into_boxed_slice()
        }
    }

    pub fn new() -> Self {
        Self::default()
    }

    #[inline(always)]
    pub fn write(&mut self, b: u64) {
        self.os.push(b as u8);
    }

    #[inline(always)]
    pub fn push_bits(&mut self, x: u64, len: u64) -> u64 {
        assert!(len <= 56, "Cannot write {} bits at once", len);

        if len == 0 {
            return 0;
        }

        self.current |= (x & mask(len as usize)) << self.used;
        self.used += len as usize;

        while self.used >= 8 {
            self.write(self.current);
            self.current >>= 8;
            self.used -= 8;
        }

        self.written_bits += len as usize;
        len
    }

    /// Pads the stream with zero bits up to the next byte boundary.
    pub fn zero_pad_to_byte(&mut self) {
        if self.used > 0 {
            let pad = 8 - self.used as u64;
            self.push_bits(0, pad);
        }
    }
}

/// Sequential bit reader over an in-memory byte buffer.
///
/// Bits are consumed least-significant first. The internal buffer is refilled a byte at
/// a time so that at least 32 bits are always available after [`refill`](Self::refill);
/// bytes past the end of the input read as zero, and [`is_in_bounds`](Self::is_in_bounds)
/// reports whether any of them has actually been consumed.
#[derive(Clone, Eq, PartialEq, Serialize, Deserialize, Debug)]
pub struct BinaryReader {
    is: Box<[u8]>,
    position: usize,
    read_bits: usize,
    current: u64,
    fill: usize,
}

impl BinaryReader {
    pub fn new(input_stream: Box<[u8]>) -> Self {
        BinaryReader {
            is: input_stream,
            position: 0,
            read_bits: 0,
            current: 0,
            fill: 0
        }
    }

    #[inline(always)]
    fn read(&mut self) -> u64 {
        let byte = self.is.get(self.position).copied().unwrap_or(0);
        self.position += 1;
        byte as u64
    }

    /// Loads whole bytes until more than 56 bits are buffered.
    #[inline(always)]
    pub fn refill(&mut self) -> usize {
        while self.fill <= 56 {
            let byte = self.read();
            self.current |= byte << self.fill;
            self.fill += 8;
        }

        self.fill
    }

    #[inline(always)]
    pub fn peek_bits(&mut self, len: usize) -> u64 {
        debug_assert!(len <= 32);

        if self.fill < len {
            self.refill();
        }

        self.current & mask(len)
    }

    #[inline(always)]
    pub fn peek_fixed_bits<const N: usize>(&mut self) -> u64 {
        self.peek_bits(N)
    }

    #[inline(always)]
    pub fn consume(&mut self, len: usize) {
        debug_assert!(len <= self.fill);

        // `len` reaches 64 when a full buffer is skipped.
        self.current = self.current.checked_shr(len as u32).unwrap_or(0);
        self.fill -= len;
        self.read_bits += len;
    }

    #[inline(always)]
    pub fn read_bits(&mut self, len: usize) -> u64 {
        let x = self.peek_bits(len);
        self.consume(len);
        x
    }

    #[inline(always)]
    pub fn read_fixed_bits<const N: usize>(&mut self) -> u64 {
        self.read_bits(N)
    }

    #[inline(always)]
    pub fn read_bool(&mut self) -> bool {
        self.read_bits(1) == 1
    }

    pub fn skip_bits(&mut self, len: usize) {
        if len <= self.fill {
            self.consume(len);
            return;
        }

        let rest = len - self.fill;
        self.read_bits += self.fill;
        self.current = 0;
        self.fill = 0;

        self.position += rest >> 3;
        self.read_bits += rest & !7;

        if rest & 7 != 0 {
            self.refill();
            self.consume(rest & 7);
        }
    }

    #[inline(always)]
    pub fn total_bits_consumed(&self) -> usize {
        self.read_bits
    }

    #[inline(always)]
    pub fn total_bytes(&self) -> usize {
        self.is.len()
    }

    #[inline(always)]
    pub fn data(&self) -> &[u8] {
        &self.is
    }

    #[inline(always)]
    pub fn is_in_bounds(&self) -> bool {
        self.read_bits <= self.is.len() * 8
    }

    pub fn check_in_bounds(&self) -> Result<()> {
        if self.is_in_bounds() {
            Ok(())
        } else {
            Err(Error::TruncatedStream { consumed: self.read_bits, available: self.is.len() * 8 })
        }
    }

    /// Runs a byte-oriented sub-decoder over the bytes starting at the current cursor and
    /// then advances this reader by exactly the number of bits the sub-decoder consumed.
    ///
    /// The sub-reader starts at byte `pos / 8` and has the first `pos % 8` bits already
    /// dropped, so both readers observe the same bit sequence.
    pub fn splice_byte_aligned<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&mut ByteAlignedReader<'_>) -> Result<T>,
    {
        let pos = self.total_bits_consumed();
        let size = self.total_bytes();
        if pos > size * 8 {
            return Err(Error::TruncatedStream { consumed: pos, available: size * 8 });
        }

        let (ret, consumed) = {
            let mut sub = ByteAlignedReader::new(&self.is[pos >> 3..]);
            sub.read_bits(pos & 7);
            let ret = f(&mut sub)?;
            (ret, sub.bits_consumed() - (pos & 7))
        };

        self.skip_bits(consumed);
        Ok(ret)
    }
}

/// Byte-fed bit reader used by the legacy prefix-code table parser.
#[derive(Debug)]
pub struct ByteAlignedReader<'a> {
    data: &'a [u8],
    next_byte: usize,
    val: u64,
    num_bits: usize,
}

impl<'a> ByteAlignedReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, next_byte: 0, val: 0, num_bits: 0 }
    }

    #[inline(always)]
    fn fill(&mut self, len: usize) {
        while self.num_bits < len {
            let byte = self.data.get(self.next_byte).copied().unwrap_or(0);
            self.next_byte += 1;
            self.val |= (byte as u64) << self.num_bits;
            self.num_bits += 8;
        }
    }

    #[inline(always)]
    pub fn peek(&mut self, len: usize) -> u32 {
        debug_assert!(len <= 32);
        self.fill(len);
        (self.val & mask(len)) as u32
    }

    #[inline(always)]
    pub fn drop_bits(&mut self, len: usize) {
        debug_assert!(len <= self.num_bits);
        self.val >>= len;
        self.num_bits -= len;
    }

    #[inline(always)]
    pub fn read_bits(&mut self, len: usize) -> u32 {
        let x = self.peek(len);
        self.drop_bits(len);
        x
    }

    /// Bits consumed since construction, not counting buffered but unused ones.
    #[inline(always)]
    pub fn bits_consumed(&self) -> usize {
        self.next_byte * 8 - self.num_bits
    }

    /// `false` once a consumed bit lies past the end of the data.
    #[inline(always)]
    pub fn is_healthy(&self) -> bool {
        self.bits_consumed() <= self.data.len() * 8
    }
}
