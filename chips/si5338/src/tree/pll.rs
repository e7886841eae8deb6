// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2025.

//! The PLL: phase detector input selection, loop filter and the MSN feedback
//! divider that sets the VCO frequency.

use log::{debug, error, warn};

use super::{ClockId, ClockTree};
use crate::errorcode::ErrorCode;
use crate::field::{read_field, write_field};
use crate::hil::RegisterMap;
use crate::registers::{
    LoopFilter as LoopFilterField, LoopFilterVal, MSCAL, MSN, MS_PEC, PFD_REF, PLL_EN, PLL_KPHI,
    VCO_GAIN_RSEL_BWSEL,
};
use crate::synth::{calculate_divider, decode, encode, Divider, FVCO_MAX, FVCO_MIN};

const KPHI_MIN: i64 = 1;
const KPHI_MAX: i64 = 127;
const MSCAL_MAX: i64 = 63;

/// Loop filter settings for one phase detector and VCO frequency.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LoopFilter {
    pub kphi: u8,
    pub rsel: u8,
    pub bwsel: u8,
    pub vco_gain: u8,
    pub mscal: u8,
}

impl LoopFilter {
    /// Compute the loop filter from the phase detector frequency `fpfd` and
    /// the VCO frequency `fvco`, both in Hz. Out of range coefficients are
    /// clamped.
    pub fn compute(fpfd: u64, fvco: u64) -> Self {
        let fpfd_mhz = (fpfd / 1_000_000) as i64;
        let fvco_mhz = (fvco / 1_000_000) as i64;

        let (k, rsel, bwsel) = if fpfd_mhz >= 15 {
            (925, 0, 0)
        } else if fpfd_mhz >= 8 {
            (325, 1, 1)
        } else {
            (185, 3, 2)
        };
        let (q, vco_gain) = if fvco_mhz > 2425 { (3, 0) } else { (4, 1) };

        let num = k * 2500 * 2500 * 2500;
        let den = 533 * q * fpfd_mhz * fvco_mhz * fvco_mhz;
        let kphi = if den == 0 {
            KPHI_MAX + 1
        } else {
            (num + den / 2) / den
        };
        if !(KPHI_MIN..=KPHI_MAX).contains(&kphi) {
            warn!("Si5338: PLL_KPHI {} does not fit 1..=127", kphi);
        }

        let mscal = (2_067_000 - 667 * fvco_mhz + 50_000).div_euclid(100_000);
        if !(0..=MSCAL_MAX).contains(&mscal) {
            warn!("Si5338: MSCAL {} does not fit 0..=63", mscal);
        }

        LoopFilter {
            kphi: kphi.clamp(KPHI_MIN, KPHI_MAX) as u8,
            rsel,
            bwsel,
            vco_gain,
            mscal: mscal.clamp(0, MSCAL_MAX) as u8,
        }
    }

    /// VCO_GAIN, RSEL and BWSEL packed as register 49 expects them.
    pub fn selectors(&self) -> u8 {
        let mut val = LoopFilterVal::new(0);
        val.modify(
            LoopFilterField::VCO_GAIN.val(self.vco_gain)
                + LoopFilterField::RSEL.val(self.rsel)
                + LoopFilterField::BWSEL.val(self.bwsel),
        );
        val.get()
    }
}

impl<M: RegisterMap> ClockTree<M> {
    pub(super) fn pll_prepare(&self) -> Result<(), ErrorCode> {
        let fpfd = self.parent_rate(ClockId::Pll);
        if fpfd == 0 {
            error!("Si5338: PLL has no input clock");
            return Err(ErrorCode::RANGE);
        }
        let fvco = self.rate(ClockId::Pll);
        if fvco == 0 {
            error!("Si5338: PLL rate is not set");
            return Err(ErrorCode::RANGE);
        }

        let filter = LoopFilter::compute(fpfd, fvco);
        debug!(
            "Si5338: PLL_KPHI={} RSEL={} BWSEL={} VCO_GAIN={} MSCAL={}",
            filter.kphi, filter.rsel, filter.bwsel, filter.vco_gain, filter.mscal
        );

        write_field(&self.regs, PLL_KPHI, filter.kphi.into())?;
        write_field(&self.regs, VCO_GAIN_RSEL_BWSEL, filter.selectors().into())?;
        write_field(&self.regs, MSCAL, filter.mscal.into())?;
        write_field(&self.regs, MS_PEC, 7)?;
        write_field(&self.regs, PLL_EN, 3)
    }

    pub(super) fn pll_select(&self, index: u8) -> Result<(), ErrorCode> {
        write_field(&self.regs, PFD_REF, index.into())
    }

    pub(super) fn pll_selected(&self) -> Result<u8, ErrorCode> {
        read_field(&self.regs, PFD_REF).map(|value| value as u8)
    }

    pub(super) fn pll_recalc(&self, parent_rate: u64) -> Result<u64, ErrorCode> {
        let params = self.load_params(ClockId::Pll, &MSN)?;
        let ratio = decode(&params);
        if ratio.is_uninitialized() {
            return Ok(0);
        }

        let (rate, num, den) = ratio.multiply_exact(parent_rate);
        debug!("Si5338: PLL rate {}+{}/{} Hz", rate, num, den);
        Ok(rate)
    }

    /// Feedback divider for a VCO as close to `rate` as the band allows.
    fn pll_divider(&self, rate: u64) -> Result<Divider, ErrorCode> {
        let parent_rate = self.parent_rate(ClockId::Pll);
        if parent_rate == 0 {
            error!("Si5338: PLL has no input clock");
            return Err(ErrorCode::RANGE);
        }
        let vco = rate.clamp(FVCO_MIN, FVCO_MAX);
        if vco != rate {
            warn!("Si5338: PLL rate {} outside the VCO band, using {}", rate, vco);
        }
        Ok(calculate_divider(vco, parent_rate))
    }

    pub(super) fn pll_round_rate(&self, rate: u64) -> Result<u64, ErrorCode> {
        let divider = self.pll_divider(rate)?;
        let ratio = decode(&encode(divider.ratio));
        Ok(ratio.multiply(self.parent_rate(ClockId::Pll)))
    }

    pub(super) fn pll_set_rate(&self, rate: u64) -> Result<(), ErrorCode> {
        let divider = self.pll_divider(rate)?;
        self.commit_params(ClockId::Pll, &MSN, encode(divider.ratio), None)?;
        if let Some(adjustment) = divider.adjustment {
            warn!("Si5338: PLL feedback divider adjusted ({:?})", adjustment);
        }
        self.update(ClockId::Pll, |node| node.adjustment = divider.adjustment);
        self.propagate(ClockId::Pll)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fast_pfd_high_vco() {
        let filter = LoopFilter::compute(25_000_000, 2_500_000_000);
        assert_eq!(
            filter,
            LoopFilter {
                kphi: 58,
                rsel: 0,
                bwsel: 0,
                vco_gain: 0,
                mscal: 4,
            }
        );
        assert_eq!(filter.selectors(), 0x00);
    }

    #[test]
    fn medium_pfd_low_vco() {
        let filter = LoopFilter::compute(10_000_000, 2_300_000_000);
        assert_eq!(filter.kphi, 45);
        assert_eq!(filter.mscal, 5);
        assert_eq!(filter.selectors(), 0x15);
    }

    #[test]
    fn slow_pfd_selectors() {
        let filter = LoopFilter::compute(5_000_000, 2_840_000_000);
        assert_eq!((filter.rsel, filter.bwsel, filter.vco_gain), (3, 2, 0));
        assert_eq!(filter.selectors(), 0x0e);
    }

    #[test]
    fn kphi_is_clamped() {
        // Below 1 MHz the phase detector term vanishes
        assert_eq!(LoopFilter::compute(500_000, 2_500_000_000).kphi, 127);
    }
}
