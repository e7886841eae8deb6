// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2025.

//! Multisynth divider arithmetic.
//!
//! Both the PLL feedback divider (MSN) and the four output dividers (MS0..MS3)
//! are fractional dividers `a + b/c`. The chip does not store `a`, `b` and `c`
//! but three derived parameters:
//!
//! ```text
//! p1 = floor((a*c + b) * 128 / c) - 512
//! p2 = (b * 128) mod c
//! p3 = c
//! ```
//!
//! with `p1` 18 bits wide and `p2`, `p3` 30 bits wide. [`encode`] and [`decode`]
//! convert between the two representations. Fractions whose denominator does
//! not fit 30 bits are reduced by dropping low bits of both terms, which
//! trades exactness for range.
//!
//! [`calculate_divider`] turns a frequency ratio into a divider the hardware
//! accepts: integer part in `[4, 567]`, never 5 or 7. Corrections are reported
//! through [`Divider::adjustment`] and logged, they are never errors.

use log::{debug, warn};

use crate::errorcode::ErrorCode;

/// Lowest PLL VCO frequency in Hz.
pub const FVCO_MIN: u64 = 2_200_000_000;
/// Highest PLL VCO frequency in Hz.
pub const FVCO_MAX: u64 = 2_840_000_000;
/// Smallest integer part of a multisynth divider.
pub const MSINT_MIN: u64 = 4;
/// Largest integer part of a multisynth divider.
pub const MSINT_MAX: u64 = 567;

const P1_LIMIT: u64 = 1 << 18;
const P3_LIMIT: u64 = 1 << 30;

/// A non-negative rational `int + num/den`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Ratio {
    /// Integer part
    pub int: u64,
    /// Numerator of the fractional part
    pub num: u64,
    /// Denominator of the fractional part, never 0
    pub den: u64,
}

impl Ratio {
    /// What all-zero hardware parameters decode to.
    pub const UNINITIALIZED: Ratio = Ratio {
        int: 0,
        num: 0,
        den: 1,
    };

    pub const fn new(int: u64, num: u64, den: u64) -> Self {
        Self { int, num, den }
    }

    pub const fn integer(int: u64) -> Self {
        Self {
            int,
            num: 0,
            den: 1,
        }
    }

    /// The ratio as the single fraction `(int*den + num) / den`, numerator only.
    pub fn scaled(&self) -> u64 {
        self.int * self.den + self.num
    }

    /// True for the ratio that stands for "never programmed".
    pub fn is_uninitialized(&self) -> bool {
        self.scaled() == 0
    }

    /// `rate * self`, rounded down.
    pub fn multiply(&self, rate: u64) -> u64 {
        if self.den == 0 {
            return 0;
        }
        (u128::from(rate) * u128::from(self.scaled()) / u128::from(self.den)) as u64
    }

    /// `rate / self`, rounded down. Zero for an uninitialized ratio.
    pub fn divide(&self, rate: u64) -> u64 {
        let scaled = self.scaled();
        if scaled == 0 {
            return 0;
        }
        (u128::from(rate) * u128::from(self.den) / u128::from(scaled)) as u64
    }

    /// `rate * self` as a whole part plus the reduced remainder fraction.
    pub fn multiply_exact(&self, rate: u64) -> (u64, u64, u64) {
        split(u128::from(rate) * u128::from(self.scaled()), self.den)
    }

    /// `rate / self` as a whole part plus the reduced remainder fraction.
    pub fn divide_exact(&self, rate: u64) -> (u64, u64, u64) {
        split(u128::from(rate) * u128::from(self.den), self.scaled())
    }
}

fn split(num: u128, den: u64) -> (u64, u64, u64) {
    if den == 0 {
        return (0, 0, 1);
    }
    let den_wide = u128::from(den);
    let whole = (num / den_wide) as u64;
    let rem = (num % den_wide) as u64;
    match remove_common_factor(rem, den) {
        Ok((num, den, _)) => (whole, num, den),
        Err(_) => (whole, 0, 1),
    }
}

/// Hardware encoding of a multisynth divider.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HwParams {
    pub p1: u32,
    pub p2: u32,
    pub p3: u32,
    /// False until the parameters were read from or written to the chip.
    pub valid: bool,
}

impl HwParams {
    pub const fn new(p1: u32, p2: u32, p3: u32) -> Self {
        Self {
            p1,
            p2,
            p3,
            valid: false,
        }
    }
}

/// How [`calculate_divider`] had to deviate from the exact ratio.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Adjustment {
    /// The denominator was zero, the largest divider was substituted
    Degenerate,
    /// Low bits of the fraction were dropped to fit 30 bits
    Truncated,
    /// The integer part was raised to 4
    ClampedLow,
    /// The divider was lowered to exactly 567
    ClampedHigh,
    /// The integer part was 5 or 7 and got bumped to 6 or 8
    Forbidden,
}

/// A divider the multisynth hardware can be programmed with.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Divider {
    pub ratio: Ratio,
    /// The last correction applied, `None` if the ratio is exact
    pub adjustment: Option<Adjustment>,
}

impl Divider {
    pub fn is_exact(&self) -> bool {
        self.adjustment.is_none()
    }
}

/// Reduce `num/den` by their greatest common divisor.
///
/// Returns the reduced pair and whether anything changed. A zero numerator
/// reduces to `0/1`.
///
/// # Errors
///
/// + [Err]\([ErrorCode::DEGENERATE]\): `den` is zero
pub fn remove_common_factor(num: u64, den: u64) -> Result<(u64, u64, bool), ErrorCode> {
    if den == 0 {
        return Err(ErrorCode::DEGENERATE);
    }
    if num == 0 {
        return Ok((0, 1, true));
    }

    let mut a = num.max(den);
    let mut b = num.min(den);
    let mut r = b;
    while r > 1 {
        r = a - b * (a / b);
        if r == 0 {
            return Ok((num / b, den / b, true));
        }
        a = b;
        b = r;
    }

    Ok((num, den, false))
}

/// Convert a ratio to hardware parameters.
///
/// The fraction is normalised first: halved while the denominator needs more
/// than 30 bits or while both terms are even, and replaced by `0/1` when it is
/// empty. Integer parts outside `[4, 2051]` do not fit `p1` and saturate.
pub fn encode(ratio: Ratio) -> HwParams {
    let (mut b, mut c) = (ratio.num, ratio.den);

    if b != 0 && c != 0 {
        while c >= P3_LIMIT || (b | c) & 1 == 0 {
            b >>= 1;
            c >>= 1;
        }
    }
    if b == 0 || c == 0 {
        b = 0;
        c = 1;
    }

    let scaled = (u128::from(ratio.int) * u128::from(c) + u128::from(b)) << 7;
    let quotient = scaled / u128::from(c);
    let p1 = if quotient < 512 {
        warn!("Multisynth ratio {} below {}, saturating", ratio.int, MSINT_MIN);
        0
    } else if quotient - 512 >= u128::from(P1_LIMIT) {
        warn!("Multisynth ratio {} does not fit P1, saturating", ratio.int);
        P1_LIMIT - 1
    } else {
        (quotient - 512) as u64
    };
    let p2 = (b << 7) % c;

    HwParams::new(p1 as u32, p2 as u32, c as u32)
}

/// Convert hardware parameters back to a ratio.
///
/// All-zero parameters decode to [`Ratio::UNINITIALIZED`].
pub fn decode(params: &HwParams) -> Ratio {
    if params.p1 == 0 && params.p2 == 0 && params.p3 == 0 {
        return Ratio::UNINITIALIZED;
    }

    let c = if params.p3 == 0 {
        debug!("Multisynth P3 is zero, assuming 1");
        1
    } else {
        u64::from(params.p3)
    };
    let b = ((u64::from(params.p1) & 0x7f) * c + u64::from(params.p2)) >> 7;
    let a = (u64::from(params.p1) >> 7) + 4;

    Ratio::new(a, b, c)
}

/// Closest valid multisynth divider for `numerator / denominator`.
///
/// The integer part is clamped into `[4, 567]` and moved off the forbidden
/// values 5 and 7. Clamping to 567 also drops the fraction.
pub fn calculate_divider(numerator: u64, denominator: u64) -> Divider {
    if denominator == 0 {
        warn!("Multisynth ratio {}/0, using {}", numerator, MSINT_MAX);
        return Divider {
            ratio: Ratio::integer(MSINT_MAX),
            adjustment: Some(Adjustment::Degenerate),
        };
    }

    let mut adjustment = None;
    let mut int = numerator / denominator;
    let mut num = numerator - int * denominator;
    let mut den = denominator;

    while den >= P3_LIMIT {
        den >>= 1;
        num >>= 1;
        adjustment = Some(Adjustment::Truncated);
    }
    if let Ok((n, d, _)) = remove_common_factor(num, den) {
        num = n;
        den = d;
    }

    if int < MSINT_MIN {
        warn!("Multisynth ratio is too low: {} < {}", int, MSINT_MIN);
        int = MSINT_MIN;
        adjustment = Some(Adjustment::ClampedLow);
    } else if int >= MSINT_MAX && (int > MSINT_MAX || num != 0) {
        warn!("Multisynth ratio is too high: {} > {}", int, MSINT_MAX);
        int = MSINT_MAX;
        num = 0;
        den = 1;
        adjustment = Some(Adjustment::ClampedHigh);
    }
    if int == 5 || int == 7 {
        warn!("Multisynth ratio {} is invalid, using {}", int, int + 1);
        int += 1;
        adjustment = Some(Adjustment::Forbidden);
    }

    debug!("Multisynth divider: {}+{}/{}", int, num, den);

    Divider {
        ratio: Ratio::new(int, num, den),
        adjustment,
    }
}
