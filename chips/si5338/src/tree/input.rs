// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2025.

//! Crystal, external inputs and the input multiplexers with their
//! pre-dividers.

use log::{debug, error};

use super::{ClockId, ClockTree};
use crate::errorcode::ErrorCode;
use crate::field::{read_field, write_field};
use crate::hil::RegisterMap;
use crate::registers::{FB_MUX, FB_MUX1, IN_MUX, IN_MUX1, P1DIV, P2DIV, XTAL_FREQ};

const XTAL_MIN: u64 = 8_000_000;
const XTAL_MAX: u64 = 30_000_000;
const INPUT_MIN: u64 = 5_000_000;
/// IN1/IN2 and IN5/IN6
const INPUT_MAX_DIFF: u64 = 710_000_000;
/// IN3 and IN4
const INPUT_MAX_SE: u64 = 200_000_000;
/// Highest rate the phase detector accepts behind a pre-divider
const PFD_MAX: u64 = 40_000_000;
const PDIV_MAX_SHIFT: u32 = 5;

/// `IN_MUX1` value for each REFCLK source.
const IN_MUX1_VAL: [u64; 3] = [0, 2, 5];
/// `FB_MUX` and `FB_MUX1` values for each FBCLK source.
const FB_MUX_VAL: [(u64, u64); 3] = [(1, 1), (0, 0), (2, 0)];

/// Power-of-two shift that brings `rate` to at most 40 MHz, capped at 32.
pub(super) fn pdiv_shift(rate: u64) -> u32 {
    (0..PDIV_MAX_SHIFT)
        .find(|&shift| rate >> shift <= PFD_MAX)
        .unwrap_or(PDIV_MAX_SHIFT)
}

/// Crystal drive setting for a crystal of `rate` Hz.
fn xtal_mode(rate: u64) -> u64 {
    if rate > 26_000_000 {
        3
    } else if rate > 19_000_000 {
        2
    } else if rate > 11_000_000 {
        1
    } else {
        0
    }
}

impl<M: RegisterMap> ClockTree<M> {
    pub(super) fn xtal_prepare(&self) -> Result<(), ErrorCode> {
        let rate = self.xtal_rate;
        if !(XTAL_MIN..=XTAL_MAX).contains(&rate) {
            error!(
                "Si5338: crystal rate {} outside {}..={}",
                rate, XTAL_MIN, XTAL_MAX
            );
            return Err(ErrorCode::RANGE);
        }
        write_field(&self.regs, XTAL_FREQ, xtal_mode(rate))
    }

    pub(super) fn input_recalc(&self, input: usize) -> Result<u64, ErrorCode> {
        let rate = self.input_rates[input];
        if rate == 0 {
            return Ok(0);
        }
        let max = match input {
            1 | 2 => INPUT_MAX_SE,
            _ => INPUT_MAX_DIFF,
        };
        if !(INPUT_MIN..=max).contains(&rate) {
            error!(
                "Si5338: input {} rate {} outside {}..={}",
                input, rate, INPUT_MIN, max
            );
            return Err(ErrorCode::RANGE);
        }
        Ok(rate)
    }

    /// Program the pre-divider of DIVREFCLK or DIVFBCLK for the current rate
    /// of its mux.
    pub(super) fn pdiv_prepare(&self, id: ClockId) -> Result<(), ErrorCode> {
        let (source, field) = match id {
            ClockId::DivRefClk => (ClockId::RefClk, P1DIV),
            _ => (ClockId::FbClk, P2DIV),
        };
        let shift = pdiv_shift(self.rate(source));
        debug!("Si5338: {:?} divides by {}", id, 1u32 << shift);
        write_field(&self.regs, field, shift.into())
    }

    pub(super) fn refclk_select(&self, index: u8) -> Result<(), ErrorCode> {
        let index = usize::from(index);
        write_field(&self.regs, IN_MUX, index as u64)?;
        write_field(&self.regs, IN_MUX1, IN_MUX1_VAL[index])
    }

    pub(super) fn refclk_selected(&self) -> Result<u8, ErrorCode> {
        read_field(&self.regs, IN_MUX).map(|value| value as u8)
    }

    pub(super) fn fbclk_select(&self, index: u8) -> Result<(), ErrorCode> {
        let (mux, mux1) = FB_MUX_VAL[usize::from(index)];
        write_field(&self.regs, FB_MUX, mux)?;
        write_field(&self.regs, FB_MUX1, mux1)
    }

    pub(super) fn fbclk_selected(&self) -> Result<u8, ErrorCode> {
        // IN4 and IN5/IN6 are swapped in the register
        read_field(&self.regs, FB_MUX).map(|value| match value {
            0 => 1,
            1 => 0,
            other => other as u8,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn predivider_keeps_pfd_below_40mhz() {
        assert_eq!(pdiv_shift(0), 0);
        assert_eq!(pdiv_shift(40_000_000), 0);
        assert_eq!(pdiv_shift(40_000_001), 1);
        assert_eq!(pdiv_shift(156_250_000), 2);
        assert_eq!(pdiv_shift(710_000_000), 5);
        assert_eq!(pdiv_shift(u64::MAX), 5);
    }

    #[test]
    fn crystal_modes() {
        assert_eq!(xtal_mode(8_000_000), 0);
        assert_eq!(xtal_mode(11_000_001), 1);
        assert_eq!(xtal_mode(19_440_000), 2);
        assert_eq!(xtal_mode(25_000_000), 2);
        assert_eq!(xtal_mode(27_000_000), 3);
    }
}
