pub mod encodings;

/// Maps non-negative `x` to `2 * x` and negative `x` to `-2 * x - 1`.
#[inline(always)]
pub fn pack_signed(value: i32) -> u32 {
    ((value as u32) << 1) ^ (((!value) as u32 >> 31).wrapping_sub(1))
}

/// Inverse of [`pack_signed`]: even values map to `value / 2`, odd ones to `-(value + 1) / 2`.
#[inline(always)]
pub fn unpack_signed(value: u32) -> i32 {
    ((value >> 1) ^ ((!value & 1).wrapping_sub(1))) as i32
}

#[inline(always)]
pub fn floor_log2_nonzero(x: u32) -> u32 {
    debug_assert!(x != 0);
    u32::BITS - 1 - x.leading_zeros()
}

#[inline(always)]
pub fn ceil_log2_nonzero(x: u32) -> u32 {
    let floor = floor_log2_nonzero(x);
    if x & (x - 1) == 0 { floor } else { floor + 1 }
}
