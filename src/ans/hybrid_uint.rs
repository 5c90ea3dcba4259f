use serde::{Serialize, Deserialize};

use crate::{bitstreams::{BinaryReader, BinaryWriterBuilder}, error::{Error, Result}, utils::{ceil_log2_nonzero, floor_log2_nonzero}};

/// Split-token integer code.
///
/// Values below `split_token = 2^split_exponent` are their own token. Larger values
/// `N` with `2^n <= N < 2^(n+1)` and mantissa `m = N - 2^n` carry, in the token, the
/// exponent `n`, the `msb_in_token` bits right below the leading one and the
/// `lsb_in_token` lowest bits; the remaining middle bits are written raw.
///
/// With `(4, 2, 0)`:
/// ```text
/// N = 0 - 15      token = N,  nbits = 0
/// N = 16 (10000)  token = 16, nbits = 2, bits = 00
/// N = 20 (10100)  token = 17, nbits = 2, bits = 00
/// N = 32 (100000) token = 20, nbits = 3, bits = 000
/// N = 65535       token = 63, nbits = 13
/// ```
#[derive(Clone, Copy, Eq, PartialEq, Serialize, Deserialize, Debug)]
pub struct HybridUintConfig {
    pub split_exponent: u32,
    pub split_token: u32,
    pub msb_in_token: u32,
    pub lsb_in_token: u32,
}

impl Default for HybridUintConfig {
    fn default() -> Self {
        Self::new(4, 2, 0)
    }
}

impl HybridUintConfig {
    pub fn new(split_exponent: u32, msb_in_token: u32, lsb_in_token: u32) -> Self {
        assert!(split_exponent >= msb_in_token + lsb_in_token);
        Self {
            split_exponent,
            split_token: 1 << split_exponent,
            msb_in_token,
            lsb_in_token,
        }
    }

    /// Returns `(token, nbits, bits)`.
    #[inline(always)]
    pub fn encode(&self, value: u32) -> (u32, u32, u32) {
        if value < self.split_token {
            return (value, 0, 0);
        }

        let n = floor_log2_nonzero(value);
        let m = value - (1 << n);

        let token = self.split_token +
            ((n - self.split_exponent) << (self.msb_in_token + self.lsb_in_token)) +
            ((m >> (n - self.msb_in_token)) << self.lsb_in_token) +
            (m & ((1 << self.lsb_in_token) - 1));
        let nbits = n - self.msb_in_token - self.lsb_in_token;
        let bits = (value >> self.lsb_in_token) & ((1u64 << nbits) - 1) as u32;
        (token, nbits, bits)
    }

    /// Reads the raw bits implied by `token` and reassembles the value.
    #[inline(always)]
    pub fn decode(&self, token: u32, reader: &mut BinaryReader) -> u32 {
        if token < self.split_token {
            return token;
        }

        let in_token = self.msb_in_token + self.lsb_in_token;
        // A valid stream never needs more than 29 raw bits; larger counts are masked
        // instead of rejected to keep this path branch-free.
        let nbits = (self.split_exponent - in_token + ((token - self.split_token) >> in_token)) & 31;
        let low = (token & ((1 << self.lsb_in_token) - 1)) as u64;
        let token = (token >> self.lsb_in_token) as u64;

        let bits = reader.read_bits(nbits as usize);
        let ret = (((((1u64 << self.msb_in_token) | (token & ((1u64 << self.msb_in_token) - 1)))
            << nbits) |
            bits)
            << self.lsb_in_token) |
            low;
        ret as u32
    }

    pub fn read(log_alpha_size: u32, reader: &mut BinaryReader) -> Result<Self> {
        reader.refill();
        let split_exponent = reader.read_bits(ceil_log2_nonzero(log_alpha_size + 1) as usize) as u32;
        let mut msb_in_token = 0;
        let mut lsb_in_token = 0;

        // With split_exponent == log_alpha_size every token is a literal.
        if split_exponent != log_alpha_size {
            let nbits = ceil_log2_nonzero(split_exponent + 1) as usize;
            msb_in_token = reader.read_bits(nbits) as u32;
            if msb_in_token > split_exponent {
                return Err(Error::InvalidUintConfig { split_exponent, msb_in_token, lsb_in_token });
            }
            let nbits = ceil_log2_nonzero(split_exponent - msb_in_token + 1) as usize;
            lsb_in_token = reader.read_bits(nbits) as u32;
        }

        if msb_in_token + lsb_in_token > split_exponent {
            return Err(Error::InvalidUintConfig { split_exponent, msb_in_token, lsb_in_token });
        }

        Ok(Self::new(split_exponent, msb_in_token, lsb_in_token))
    }

    pub fn write(&self, log_alpha_size: u32, writer: &mut BinaryWriterBuilder) {
        assert!(self.split_exponent <= log_alpha_size);

        writer.push_bits(self.split_exponent as u64, ceil_log2_nonzero(log_alpha_size + 1) as u64);
        if self.split_exponent != log_alpha_size {
            writer.push_bits(self.msb_in_token as u64, ceil_log2_nonzero(self.split_exponent + 1) as u64);
            writer.push_bits(
                self.lsb_in_token as u64,
                ceil_log2_nonzero(self.split_exponent - self.msb_in_token + 1) as u64,
            );
        }
    }

    /// Number of distinct tokens needed to represent every value up to `max_value`.
    pub fn alphabet_size_for(&self, max_value: u32) -> u32 {
        self.encode(max_value).0 + 1
    }
}

/// Reads one config per histogram, in histogram order.
pub fn decode_uint_configs(log_alpha_size: u32, num_histograms: usize, reader: &mut BinaryReader) -> Result<Vec<HybridUintConfig>> {
    (0..num_histograms)
        .map(|_| HybridUintConfig::read(log_alpha_size, reader))
        .collect()
}
