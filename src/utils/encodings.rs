use crate::bitstreams::{BinaryReader, BinaryWriterBuilder};
use crate::error::{Error, Result};
use crate::utils::floor_log2_nonzero;

/// A self-delimiting code for small non-negative integers.
pub trait UniversalCode {
    fn read_next(reader: &mut BinaryReader) -> u32;
    fn write_next(writer: &mut BinaryWriterBuilder, x: u32) -> u64;
}

/// Presence bit, then an `EXP_BITS`-wide exponent `n`: `0` decodes to 1, anything else to
/// `(1 << n) + n raw bits`.
pub struct VarLenUint<const EXP_BITS: usize>;

/// Range `[0, 255]`, 1 to 11 bits.
pub type VarLenUint8 = VarLenUint<3>;
/// Range `[0, 65535]`, 1 to 20 bits.
pub type VarLenUint16 = VarLenUint<4>;

impl<const EXP_BITS: usize> UniversalCode for VarLenUint<EXP_BITS> {
    #[inline(always)]
    fn read_next(reader: &mut BinaryReader) -> u32 {
        if !reader.read_bool() {
            return 0;
        }

        let nbits = reader.read_bits(EXP_BITS) as usize;
        if nbits == 0 {
            return 1;
        }

        reader.read_bits(nbits) as u32 + (1 << nbits)
    }

    #[inline(always)]
    fn write_next(writer: &mut BinaryWriterBuilder, x: u32) -> u64 {
        assert!(x < 1 << ((1 << EXP_BITS) as u32), "Value {x} out of range for VarLenUint<{EXP_BITS}>");

        if x == 0 {
            return writer.push_bits(0, 1);
        }

        let written = writer.push_bits(1, 1);
        if x == 1 {
            return written + writer.push_bits(0, EXP_BITS as u64);
        }

        let nbits = floor_log2_nonzero(x) as u64;
        written + writer.push_bits(nbits, EXP_BITS as u64) + writer.push_bits((x - (1 << nbits)) as u64, nbits)
    }
}

#[inline(always)]
pub fn decode_varlen_u8(reader: &mut BinaryReader) -> u32 {
    VarLenUint8::read_next(reader)
}

#[inline(always)]
pub fn decode_varlen_u16(reader: &mut BinaryReader) -> u32 {
    VarLenUint16::read_next(reader)
}

/// One of the four alternatives of a selector-coded 32-bit header field.
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum U32Distr {
    Val(u32),
    BitsOffset(u32, u32),
}

impl U32Distr {
    fn can_encode(&self, value: u32) -> bool {
        match *self {
            U32Distr::Val(v) => v == value,
            U32Distr::BitsOffset(bits, offset) => value >= offset && ((value - offset) as u64) < (1u64 << bits),
        }
    }
}

/// A 2-bit selector picks one of four [`U32Distr`], which may read further bits.
pub fn read_u32(dists: &[U32Distr; 4], reader: &mut BinaryReader) -> u32 {
    let selector = reader.read_bits(2) as usize;
    match dists[selector] {
        U32Distr::Val(v) => v,
        U32Distr::BitsOffset(bits, offset) => (reader.read_bits(bits as usize) as u32).wrapping_add(offset),
    }
}

/// Writes `value` using the first alternative able to represent it.
pub fn write_u32(dists: &[U32Distr; 4], value: u32, writer: &mut BinaryWriterBuilder) -> Result<()> {
    let selector = dists.iter()
        .position(|d| d.can_encode(value))
        .ok_or_else(|| Error::InvalidEncoderInput(format!("{value} cannot be represented by {dists:?}")))?;

    writer.push_bits(selector as u64, 2);
    if let U32Distr::BitsOffset(bits, offset) = dists[selector] {
        writer.push_bits((value - offset) as u64, bits as u64);
    }

    Ok(())
}
