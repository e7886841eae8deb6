// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2025.

//! Output multisynths MS0..MS3, and the parameter cache shared with the PLL
//! feedback divider.
//!
//! A multisynth normally divides whatever the PLL runs at. The one configured
//! as master may instead retune the PLL: it searches for the integer output
//! divider and PLL feedback divider pair that hits the requested rate with the
//! VCO inside its band, preferring the VCO closest to the band center.

use log::{debug, error, warn};

use super::{ms_id, ClockId, ClockTree};
use crate::errorcode::ErrorCode;
use crate::field::{read_field, write_field, write_flag};
use crate::hil::RegisterMap;
use crate::registers::{FieldDescriptor, MultisynthFields, MS, MS_HS, MS_PDN};
use crate::synth::{
    calculate_divider, decode, encode, Adjustment, Divider, HwParams, Ratio, FVCO_MAX, FVCO_MIN,
    MSINT_MAX, MSINT_MIN,
};

const FVCO_CENTER: u64 = (FVCO_MIN + FVCO_MAX) / 2;
/// `p1` of a divider below 8, which only the high speed mode can run.
const HS_P1_LIMIT: u32 = 512;
/// Denominator bits kept when computing a multisynth rate.
const RECALC_DEN_LIMIT: u64 = 0x1000;

/// A divider pair found by [`search_master`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MasterDivider {
    /// PLL feedback divider
    pub in_div: u64,
    /// Multisynth divider
    pub out_div: u64,
    /// Resulting VCO frequency
    pub vco: u64,
    /// Resulting output rate
    pub rate: u64,
}

fn is_valid_integer_divider(div: u64) -> bool {
    (MSINT_MIN..=MSINT_MAX).contains(&div) && div != 5 && div != 7
}

/// Find integer dividers producing `rate` from a PLL input of `pll_in` Hz.
///
/// Every output divider is tried. The smallest error wins, ties go to the VCO
/// closest to the middle of the band. `None` if no divider puts the VCO in
/// the band.
pub fn search_master(pll_in: u64, rate: u64) -> Option<MasterDivider> {
    if pll_in == 0 || rate == 0 {
        return None;
    }

    let mut best: Option<(MasterDivider, u64, u64)> = None;
    for out_div in MSINT_MIN..=MSINT_MAX {
        if !is_valid_integer_divider(out_div) {
            continue;
        }
        let Some(target) = rate.checked_mul(out_div) else {
            break;
        };
        if !(FVCO_MIN..=FVCO_MAX).contains(&target) {
            continue;
        }
        let in_div = (target + pll_in / 2) / pll_in;
        let vco = pll_in * in_div;
        if !is_valid_integer_divider(in_div) || !(FVCO_MIN..=FVCO_MAX).contains(&vco) {
            continue;
        }

        let synth_out = (vco + out_div / 2) / out_div;
        let err = synth_out.abs_diff(rate);
        let center = vco.abs_diff(FVCO_CENTER);
        let better = match best {
            None => true,
            Some((_, best_err, best_center)) => {
                err < best_err || (err == best_err && center < best_center)
            }
        };
        if better {
            let candidate = MasterDivider {
                in_div,
                out_div,
                vco,
                rate: synth_out,
            };
            best = Some((candidate, err, center));
        }
    }

    best.map(|(divider, _, _)| divider)
}

/// Force a divider below 8 onto the exact 4 or 6 the high speed mode supports.
/// Returns the parameters to write and whether the mode is needed.
fn high_speed(params: HwParams) -> (HwParams, bool) {
    if params.p1 >= HS_P1_LIMIT {
        return (params, false);
    }
    let p1 = if params.p1 < 128 { 0 } else { 256 };
    (HwParams::new(p1, 0, 1), true)
}

/// What `set_rate` on a multisynth is about to program.
struct Plan {
    /// New PLL rate, for the master
    vco: Option<u64>,
    params: HwParams,
    high_speed: bool,
    rate: u64,
    adjustment: Option<Adjustment>,
}

impl<M: RegisterMap> ClockTree<M> {
    /// Cached divider parameters of `id`, read from the chip if not valid.
    pub(super) fn load_params(
        &self,
        id: ClockId,
        fields: &MultisynthFields,
    ) -> Result<HwParams, ErrorCode> {
        if let Some(params) = self.node(id).params {
            if params.valid {
                return Ok(params);
            }
        }

        let mut params = HwParams::new(
            read_field(&self.regs, fields.p1)? as u32,
            read_field(&self.regs, fields.p2)? as u32,
            read_field(&self.regs, fields.p3)? as u32,
        );
        params.valid = true;
        self.update(id, |node| node.params = Some(params));
        Ok(params)
    }

    /// Write divider parameters and cache them. They stay marked invalid
    /// unless every write succeeds.
    pub(super) fn commit_params(
        &self,
        id: ClockId,
        fields: &MultisynthFields,
        params: HwParams,
        high_speed: Option<(FieldDescriptor, bool)>,
    ) -> Result<(), ErrorCode> {
        self.invalidate_params(id);

        if let Some((field, set)) = high_speed {
            write_flag(&self.regs, field, set)?;
        }
        write_field(&self.regs, fields.p1, params.p1.into())?;
        write_field(&self.regs, fields.p2, params.p2.into())?;
        write_field(&self.regs, fields.p3, params.p3.into())?;

        debug!(
            "Si5338: {:?} P1={} P2={} P3={}",
            id, params.p1, params.p2, params.p3
        );
        let mut params = params;
        params.valid = true;
        self.update(id, |node| node.params = Some(params));
        Ok(())
    }

    pub(super) fn ms_power(&self, n: usize, on: bool) -> Result<(), ErrorCode> {
        write_field(&self.regs, MS_PDN[n], u64::from(!on))
    }

    pub(super) fn ms_recalc(&self, n: usize, parent_rate: u64) -> Result<u64, ErrorCode> {
        let id = ms_id(n);
        let params = self.load_params(id, &MS[n])?;
        let mut ratio = decode(&params);
        if ratio.is_uninitialized() {
            return Ok(0);
        }

        while ratio.den >= RECALC_DEN_LIMIT {
            ratio.num >>= 1;
            ratio.den >>= 1;
        }
        let (rate, num, den) = ratio.divide_exact(parent_rate);
        debug!("Si5338: MS{} rate {}+{}/{} Hz", n, rate, num, den);
        Ok(rate)
    }

    fn ms_plan(&self, n: usize, rate: u64) -> Result<Option<Plan>, ErrorCode> {
        let (vco, divider) = if self.master == Some(n) {
            let pll_in = self.parent_rate(ClockId::Pll);
            if pll_in == 0 {
                error!("Si5338: PLL has no input clock");
                return Err(ErrorCode::RANGE);
            }
            let Some(divider) = search_master(pll_in, rate) else {
                warn!("Si5338: no VCO rate gives MS{} {} Hz", n, rate);
                return Ok(None);
            };
            debug!(
                "Si5338: MS{} master, PLL {}x, MS {}",
                n, divider.in_div, divider.out_div
            );
            let ratio = Ratio::integer(divider.out_div);
            (Some(divider.vco), Divider { ratio, adjustment: None })
        } else {
            let pll_rate = self.rate(ClockId::Pll);
            if pll_rate == 0 || rate == 0 {
                error!("Si5338: MS{} has no input clock or no rate", n);
                return Err(ErrorCode::RANGE);
            }
            (None, calculate_divider(pll_rate, rate))
        };

        let (params, high_speed) = high_speed(encode(divider.ratio));
        let pll_rate = vco.unwrap_or_else(|| self.rate(ClockId::Pll));
        Ok(Some(Plan {
            vco,
            params,
            high_speed,
            rate: decode(&params).divide(pll_rate),
            adjustment: divider.adjustment,
        }))
    }

    pub(super) fn ms_round_rate(&self, n: usize, rate: u64) -> Result<u64, ErrorCode> {
        match self.ms_plan(n, rate)? {
            Some(plan) => Ok(plan.rate),
            None => Ok(self.rate(ms_id(n))),
        }
    }

    pub(super) fn ms_set_rate(&self, n: usize, rate: u64) -> Result<(), ErrorCode> {
        let id = ms_id(n);
        let rate = if rate == 0 {
            self.rate(ClockId::Pll).div_ceil(MSINT_MAX)
        } else {
            rate
        };

        let Some(plan) = self.ms_plan(n, rate)? else {
            return Ok(());
        };
        if let Some(vco) = plan.vco {
            self.pll_set_rate(vco)?;
        }
        self.commit_params(id, &MS[n], plan.params, Some((MS_HS[n], plan.high_speed)))?;
        if let Some(adjustment) = plan.adjustment {
            warn!(
                "Si5338: MS{} divider adjusted ({:?}), {} Hz instead of {}",
                n, adjustment, plan.rate, rate
            );
        }
        self.update(id, |node| node.adjustment = plan.adjustment);
        self.propagate(id)
    }
}
