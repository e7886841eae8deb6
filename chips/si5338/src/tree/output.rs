// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2025.

//! Output stages: source mux, power-of-two R divider, driver power and gate.

use log::warn;

use super::{ms_id, out_id, ClockId, ClockTree, NodeKind};
use crate::errorcode::ErrorCode;
use crate::field::{read_field, write_field};
use crate::hil::RegisterMap;
use crate::registers::{DRV_PDN, OUT_DIS, RDIV, RDIV_IN};
use crate::synth::{FVCO_MAX, MSINT_MAX};

/// Largest R divider setting, dividing by 32.
const R_DIV_MAX_SHIFT: u32 = 5;

/// Slowest rate a multisynth produces from the fastest VCO.
const MS_RATE_MIN: u64 = FVCO_MAX / MSINT_MAX;

/// R divider setting (as a shift) that brings `parent_rate` closest to
/// `rate`. Ties go to the smaller divider.
pub fn closest_r_div(parent_rate: u64, rate: u64) -> u32 {
    let mut best = 0;
    let mut best_err = parent_rate.abs_diff(rate);
    for shift in 1..=R_DIV_MAX_SHIFT {
        let err = (parent_rate >> shift).abs_diff(rate);
        if err < best_err {
            best = shift;
            best_err = err;
        }
    }
    best
}

/// Rate to request from a multisynth feeding an output that should run at
/// `rate`: the smallest power-of-two multiple, up to 32, that a multisynth
/// can reach.
pub fn upstream_request(rate: u64) -> u64 {
    let mut scaled = rate;
    for _ in 0..R_DIV_MAX_SHIFT {
        if scaled >= MS_RATE_MIN {
            break;
        }
        scaled <<= 1;
    }
    if scaled < MS_RATE_MIN {
        warn!(
            "Si5338: {} Hz is below what an output can divide down to",
            rate
        );
        MS_RATE_MIN
    } else {
        scaled
    }
}

impl<M: RegisterMap> ClockTree<M> {
    pub(super) fn output_power(&self, n: usize, on: bool) -> Result<(), ErrorCode> {
        write_field(&self.regs, DRV_PDN[n], u64::from(!on))
    }

    pub(super) fn output_gate(&self, n: usize, open: bool) -> Result<(), ErrorCode> {
        write_field(&self.regs, OUT_DIS[n], u64::from(!open))
    }

    pub(super) fn output_select(&self, n: usize, index: u8) -> Result<(), ErrorCode> {
        write_field(&self.regs, RDIV_IN[n], index.into())
    }

    pub(super) fn output_selected(&self, n: usize) -> Result<u8, ErrorCode> {
        read_field(&self.regs, RDIV_IN[n]).map(|value| value as u8)
    }

    pub(super) fn output_recalc(&self, n: usize, parent_rate: u64) -> Result<u64, ErrorCode> {
        let shift = read_field(&self.regs, RDIV[n])? as u32;
        if shift > R_DIV_MAX_SHIFT {
            warn!("Si5338: output {} has invalid R divider setting {}", n, shift);
            return Ok(0);
        }
        Ok(parent_rate >> shift)
    }

    /// The multisynth feeding output `n`, if any.
    fn feeding_multisynth(&self, n: usize) -> Option<usize> {
        match self.parent(out_id(n)).map(ClockId::kind) {
            Some(NodeKind::Multisynth(ms)) => Some(ms),
            _ => None,
        }
    }

    pub(super) fn output_round_rate(&self, n: usize, rate: u64) -> Result<u64, ErrorCode> {
        let parent_rate = match self.feeding_multisynth(n) {
            Some(ms) => self.ms_round_rate(ms, upstream_request(rate))?,
            None => self.parent_rate(out_id(n)),
        };
        Ok(parent_rate >> closest_r_div(parent_rate, rate))
    }

    pub(super) fn output_set_rate(&self, n: usize, rate: u64) -> Result<(), ErrorCode> {
        let parent_rate = match self.feeding_multisynth(n) {
            Some(ms) => {
                self.ms_set_rate(ms, upstream_request(rate))?;
                self.rate(ms_id(ms))
            }
            None => self.parent_rate(out_id(n)),
        };

        let shift = closest_r_div(parent_rate, rate);
        write_field(&self.regs, RDIV[n], shift.into())?;
        self.propagate(out_id(n))
    }
}
