//! Fixed-point arithmetic for the Obol engine.
//!
//! All ratios, rates and prices in the protocol are unsigned 1e18
//! fixed-point values carried in [`U256`]. Intermediate products are widened
//! to 512 bits, so a single [`mul_div`] primitive underpins every scaled
//! multiplication in the crate.

use primitive_types::{U256, U512};

/// 1e18, the fixed-point unit. Also the value of `100%` for fee rates.
pub const ONE: U256 = U256([1_000_000_000_000_000_000, 0, 0, 0]);

/// 5e17, used for half-up rounding in [`dec_mul`].
pub const HALF_ONE: U256 = U256([500_000_000_000_000_000, 0, 0, 0]);

/// 1e9, the stability-pool rescaling factor.
pub const SCALE_FACTOR: U256 = U256([1_000_000_000, 0, 0, 0]);

/// 1e20, the scale of the nominal collateral ratio (`collateral * 1e20 / debt`),
/// chosen so a price of 1 oUSD per unit yields NCR == CR.
pub const NCR_SCALE: U256 = U256([7_766_279_631_452_241_920, 5, 0, 0]);

/// 1e18 per percent: collateral ratios are expressed as `110e18` == 110%.
pub const PERCENT: U256 = ONE;

/// Seconds in a (non-leap) year, the denominator of per-second interest.
pub const SECONDS_IN_YEAR: u64 = 31_536_000;

/// Computes `a * b / c` with a 512-bit intermediate product.
///
/// # Panics
/// Panics when `c` is zero or the result does not fit in 256 bits. Both
/// indicate a bug in the calling code, never a user-reachable condition.
pub fn mul_div(a: U256, b: U256, c: U256) -> U256 {
    assert!(!c.is_zero(), "mul_div: division by zero");
    let wide = a.full_mul(b) / U512::from(c);
    U256::try_from(wide).expect("mul_div: result exceeds 256 bits")
}

/// Fixed-point product `a * b / 1e18`, rounded half-up.
pub fn dec_mul(a: U256, b: U256) -> U256 {
    let wide = a.full_mul(b) + U512::from(HALF_ONE);
    U256::try_from(wide / U512::from(ONE)).expect("dec_mul: result exceeds 256 bits")
}

/// Fixed-point quotient `a * 1e18 / b`.
pub fn dec_div(a: U256, b: U256) -> U256 {
    mul_div(a, ONE, b)
}

/// Raises the 1e18 fixed-point `base` to the integer power `exp` by repeated
/// squaring. The exponent is an elapsed-seconds count when used for interest
/// compounding.
pub fn dec_pow(base: U256, mut exp: u64) -> U256 {
    if exp == 0 {
        return ONE;
    }

    let mut x = base;
    let mut y = ONE;

    while exp > 1 {
        if exp % 2 == 0 {
            x = dec_mul(x, x);
            exp /= 2;
        } else {
            y = dec_mul(x, y);
            x = dec_mul(x, x);
            exp = (exp - 1) / 2;
        }
    }

    dec_mul(x, y)
}
