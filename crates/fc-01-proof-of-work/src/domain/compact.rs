//! Compact difficulty encoding
//!
//! A 256-bit target is packed into 32 bits as `mantissa << 8 | exponent`:
//!
//! - `exponent` is the byte length of the target's magnitude
//! - `mantissa` is its three most significant magnitude bytes
//!
//! Precision is limited to the mantissa, so targets with more than three
//! significant bytes lose their low-order bytes on the way through.

use primitive_types::U256;

/// Encode a target into compact bits. Zero encodes to zero.
pub fn compact(target: U256) -> u32 {
    if target.is_zero() {
        return 0;
    }

    let size = (target.bits() + 7) / 8;
    let mantissa = if size <= 3 {
        target << (8 * (3 - size))
    } else {
        target >> (8 * (size - 3))
    };

    // mantissa < 2^24 and size <= 32, so both fit
    (mantissa.low_u32() << 8) | size as u32
}

/// Decode compact bits back into a target.
pub fn expand(bits: u32) -> U256 {
    let size = (bits & 0xff) as usize;
    let mantissa = U256::from(bits >> 8);

    if size <= 3 {
        mantissa >> (8 * (3 - size))
    } else {
        mantissa << (8 * (size - 3))
    }
}

/// Expected number of hashes to find a block under `bits`: `2^256 / (target + 1)`.
///
/// Zero when the target is zero.
pub fn workload(bits: u32) -> U256 {
    let target = expand(bits);
    if target.is_zero() {
        return U256::zero();
    }

    // 2^256 does not fit in 256 bits; (2^256 - t - 1) / (t + 1) + 1 is equal
    match target.checked_add(U256::one()) {
        Some(divisor) => (!target) / divisor + U256::one(),
        None => U256::one(),
    }
}
