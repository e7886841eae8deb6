// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2025.

//! Power-on programming procedure of the Si5338.
//!
//! Bringing the chip up is split in three steps around the clock tree
//! configuration:
//!
//! 1. [`pre_init`] masks interrupts, applies the register fixups of the
//!    reference manual, disables every output, powers down the multisynths
//!    and disconnects the PLL inputs.
//! 2. [`configure_topology`] programs the multiplexers, drivers and disabled
//!    states from a [`Config`]. Rates are then set through the [`ClockTree`].
//! 3. [`post_init`] waits for the inputs, soft-resets the PLL, waits for lock,
//!    freezes the frequency calibration, resets the multisynths and finally
//!    lets the outputs run.
//!
//! Waiting is bounded: the status register is polled at most
//! [`INIT_TIMEOUT`] times, [`POLL_INTERVAL_MS`] apart, before giving up with
//! [`ErrorCode::TIMEOUT`].

use log::{debug, error};

use crate::config::{Config, OutputSource};
use crate::errorcode::ErrorCode;
use crate::field::{read_field, read_flag, write_field, write_flag};
use crate::hil::{Delay, RegisterMap};
use crate::registers::{
    Status, StatusVal, DIS_LOS, FCAL, FCAL_OVRD, FCAL_OVRD_EN, INT_MASK, MISC, MS_PDN, MS_RESET,
    OUT_ALL_DIS, OUT_DIS, OUT_DIS_STATE, PFD_EXTFB, PFD_FB, PFD_REF, RDIV_IN, REG241, REG47_72,
    SOFT_RESET, STATUS,
};
use crate::tree::{ClockId, ClockTree};

/// Status polls before giving up.
pub const INIT_TIMEOUT: usize = 10;
pub const POLL_INTERVAL_MS: u32 = 100;
pub const SOFT_RESET_SETTLE_MS: u32 = 25;
pub const MS_RESET_SETTLE_MS: u32 = 20;

const INT_MASK_ALL: u64 = 0x1d;
/// Register 241 value that re-enables loss of lock detection.
const REG241_LOL_ENABLE: u64 = 0x65;
const REG47_FCAL: u64 = 0b00_0101;
const PFD_NOCLK: u64 = 5;

// PFD_FB encoding
const PFD_FB_FBCLK: u64 = 0;
const PFD_FB_REFCLK: u64 = 1;
const PFD_FB_DIVFBCLK: u64 = 2;
const PFD_FB_DIVREFCLK: u64 = 3;

/// Put the chip in a quiet state before configuration.
pub fn pre_init<M: RegisterMap + ?Sized>(regs: &M) -> Result<(), ErrorCode> {
    write_field(regs, INT_MASK, INT_MASK_ALL)?;

    for (field, value) in MISC.iter() {
        write_field(regs, *field, *value)?;
    }

    write_flag(regs, OUT_ALL_DIS, true)?;
    // Pause loss of lock detection until the PLL is set up
    write_flag(regs, DIS_LOS, true)?;

    for channel in 0..4 {
        write_flag(regs, MS_PDN[channel], true)?;
        write_flag(regs, OUT_DIS[channel], true)?;
    }

    write_field(regs, PFD_REF, PFD_NOCLK)?;
    write_field(regs, PFD_FB, PFD_NOCLK)
}

/// Program multiplexers, output drivers and disabled states from `config`.
pub fn configure_topology<M: RegisterMap>(
    tree: &ClockTree<M>,
    config: &Config,
) -> Result<(), ErrorCode> {
    tree.set_parent(ClockId::RefClk, config.ref_source as u8)?;
    tree.set_parent(ClockId::FbClk, config.fb_source as u8)?;
    tree.set_parent(ClockId::Pll, config.pll_source as u8)?;

    for (channel, output) in config.outputs.iter().enumerate() {
        let id = ClockId::output(channel).ok_or(ErrorCode::INVALID_SELECTOR)?;
        tree.set_parent(id, output.source as u8)?;
        output.drive.apply(tree.regs(), channel)?;
        write_field(
            tree.regs(),
            OUT_DIS_STATE[channel],
            output.disable_state as u64,
        )?;
        debug!(
            "Si5338: output {} from {:?}, {}",
            channel, output.source, output.drive.name
        );
    }

    Ok(())
}

/// Loss of signal bits that matter for the current PLL input selection.
pub fn los_mask<M: RegisterMap + ?Sized>(regs: &M) -> Result<StatusVal, ErrorCode> {
    let mut mask = StatusVal::new(0);

    match read_field(regs, PFD_REF)? {
        // REFCLK, DIVREFCLK, XOCLK
        0 | 2 | 4 => mask.modify(Status::LOS_CLKIN::SET),
        // FBCLK, DIVFBCLK
        1 | 3 => mask.modify(Status::LOS_FDBK::SET),
        _ => {}
    }

    if read_flag(regs, PFD_EXTFB)? {
        match read_field(regs, PFD_FB)? {
            PFD_FB_REFCLK | PFD_FB_DIVREFCLK => mask.modify(Status::LOS_CLKIN::SET),
            PFD_FB_FBCLK | PFD_FB_DIVFBCLK => mask.modify(Status::LOS_FDBK::SET),
            _ => {}
        }
    }

    Ok(mask)
}

/// Poll the status register until none of the bits in `mask` is set.
///
/// # Errors
///
/// + [Err]\([ErrorCode::TIMEOUT]\): the bits were still set after
/// [`INIT_TIMEOUT`] polls; carries the last status read
/// + [Err]\([ErrorCode::IO]\): the status register could not be read
pub fn wait_for_status<M: RegisterMap + ?Sized, D: Delay + ?Sized>(
    regs: &M,
    delay: &D,
    mask: StatusVal,
) -> Result<StatusVal, ErrorCode> {
    let mut status = StatusVal::new(0);

    for poll in 0..INIT_TIMEOUT {
        status = StatusVal::new(read_field(regs, STATUS)? as u8);
        if status.get() & mask.get() == 0 {
            debug!(
                "Si5338: status {:#04x} clear of {:#04x} after {} polls",
                status.get(),
                mask.get(),
                poll + 1
            );
            return Ok(status);
        }
        delay.delay_ms(POLL_INTERVAL_MS);
    }

    error!(
        "Si5338: timeout, status={:#04x} mask={:#04x}",
        status.get(),
        mask.get()
    );
    Err(ErrorCode::TIMEOUT {
        status: status.get(),
    })
}

fn reset_ms<M: RegisterMap + ?Sized, D: Delay + ?Sized>(
    regs: &M,
    delay: &D,
) -> Result<(), ErrorCode> {
    write_flag(regs, MS_RESET, true)?;
    delay.delay_ms(MS_RESET_SETTLE_MS);
    write_flag(regs, MS_RESET, false)
}

/// Power up the multisynths some output is routed from, power down the rest.
fn power_up_down_needed_ms<M: RegisterMap + ?Sized>(regs: &M) -> Result<(), ErrorCode> {
    let mut used = [false; 4];
    for channel in 0..4 {
        let source = read_field(regs, RDIV_IN[channel])?;
        if source == OutputSource::Ms0 as u64 {
            used[0] = true;
        } else if source == OutputSource::MsN as u64 {
            used[channel] = true;
        }
    }

    for (channel, used) in used.iter().enumerate() {
        write_flag(regs, MS_PDN[channel], !used)?;
    }
    Ok(())
}

/// Lock the PLL and start the outputs.
///
/// # Errors
///
/// + [Err]\([ErrorCode::TIMEOUT]\): the PLL inputs never showed up, or the PLL
/// did not lock
/// + [Err]\([ErrorCode::IO]\): register access failed
pub fn post_init<M: RegisterMap + ?Sized, D: Delay + ?Sized>(
    regs: &M,
    delay: &D,
) -> Result<(), ErrorCode> {
    let mut mask = los_mask(regs)?;
    wait_for_status(regs, delay, mask)?;
    debug!("Si5338: input clocks valid");

    write_flag(regs, FCAL_OVRD_EN, false)?;
    // The chip may not acknowledge the soft reset
    if let Err(e) = write_flag(regs, SOFT_RESET, true) {
        debug!("Si5338: soft reset not acknowledged: {}", e);
    }
    delay.delay_ms(SOFT_RESET_SETTLE_MS);

    write_field(regs, REG241, REG241_LOL_ENABLE)?;
    mask.modify(Status::PLL_LOL::SET + Status::SYS_CAL::SET);
    wait_for_status(regs, delay, mask)?;
    debug!("Si5338: PLL locked");

    let fcal = read_field(regs, FCAL)?;
    write_field(regs, FCAL_OVRD, fcal)?;
    debug!("Si5338: copied FCAL {:#x}", fcal);
    write_field(regs, REG47_72, REG47_FCAL)?;
    write_flag(regs, FCAL_OVRD_EN, true)?;

    reset_ms(regs, delay)?;

    write_flag(regs, OUT_ALL_DIS, false)?;
    if let Err(e) = write_flag(regs, SOFT_RESET, false) {
        debug!("Si5338: clearing soft reset failed: {}", e);
    }

    power_up_down_needed_ms(regs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DisableState, OutputConfig, PllSource, RefSource};
    use crate::drive::DriveProfile;
    use crate::registers::{DRV_FMT, DRV_VDDO, IN_MUX};
    use crate::test::{FakeDelay, FakeRegisterMap};

    const LOS_CLKIN: u8 = 0x04;
    const LOS_FDBK: u8 = 0x08;

    fn clkin() -> StatusVal {
        StatusVal::new(LOS_CLKIN)
    }

    #[test]
    fn pre_init_quiets_the_chip() {
        let regs = FakeRegisterMap::si5338();
        pre_init(&regs).unwrap();

        assert_eq!(read_field(&regs, INT_MASK), Ok(0x1d));
        assert_eq!(read_flag(&regs, OUT_ALL_DIS), Ok(true));
        assert_eq!(read_flag(&regs, DIS_LOS), Ok(true));
        for channel in 0..4 {
            assert_eq!(read_flag(&regs, MS_PDN[channel]), Ok(true));
            assert_eq!(read_flag(&regs, OUT_DIS[channel]), Ok(true));
        }
        assert_eq!(read_field(&regs, PFD_REF), Ok(5));
        assert_eq!(read_field(&regs, PFD_FB), Ok(5));
        assert_eq!(read_field(&regs, REG47_72), Ok(5));
    }

    #[test]
    fn pre_init_stops_on_first_failure() {
        let regs = FakeRegisterMap::si5338();
        regs.fail_writes_after(0);
        assert_eq!(pre_init(&regs), Err(ErrorCode::IO));
        assert!(regs.writes().is_empty());
    }

    #[test]
    fn status_clears_on_third_poll() {
        let regs = FakeRegisterMap::si5338();
        let delay = FakeDelay::new();
        regs.script_status(&[LOS_CLKIN, LOS_CLKIN, 0x00]);

        let status = wait_for_status(&regs, &delay, clkin()).unwrap();
        assert_eq!(status.get(), 0);
        assert_eq!(regs.status_reads(), 3);
        assert_eq!(delay.delays(), vec![100, 100]);
    }

    #[test]
    fn unrelated_status_bits_are_ignored() {
        let regs = FakeRegisterMap::si5338();
        let delay = FakeDelay::new();
        regs.script_status(&[LOS_FDBK]);

        let status = wait_for_status(&regs, &delay, clkin()).unwrap();
        assert!(status.is_set(Status::LOS_FDBK));
        assert_eq!(regs.status_reads(), 1);
        assert!(delay.delays().is_empty());
    }

    #[test]
    fn status_never_clears() {
        let regs = FakeRegisterMap::si5338();
        let delay = FakeDelay::new();
        regs.script_status(&[LOS_CLKIN]);

        assert!(matches!(
            wait_for_status(&regs, &delay, clkin()),
            Err(ErrorCode::TIMEOUT { status: LOS_CLKIN })
        ));
        assert_eq!(regs.status_reads(), INIT_TIMEOUT);
        assert_eq!(delay.delays(), vec![100; INIT_TIMEOUT]);
    }

    #[test]
    fn loss_of_signal_mask() {
        let regs = FakeRegisterMap::si5338();

        write_field(&regs, PFD_REF, PllSource::Xtal as u64).unwrap();
        assert_eq!(los_mask(&regs).unwrap().get(), LOS_CLKIN);

        write_field(&regs, PFD_REF, PllSource::DivFbClk as u64).unwrap();
        assert_eq!(los_mask(&regs).unwrap().get(), LOS_FDBK);

        write_field(&regs, PFD_REF, PllSource::NoClk as u64).unwrap();
        assert_eq!(los_mask(&regs).unwrap().get(), 0);

        // External feedback from REFCLK adds the reference input
        write_field(&regs, PFD_REF, PllSource::FbClk as u64).unwrap();
        write_flag(&regs, PFD_EXTFB, true).unwrap();
        write_field(&regs, PFD_FB, PFD_FB_REFCLK).unwrap();
        assert_eq!(los_mask(&regs).unwrap().get(), LOS_CLKIN | LOS_FDBK);
    }

    #[test]
    fn post_init_sequence() {
        let regs = FakeRegisterMap::si5338();
        let delay = FakeDelay::new();
        write_field(&regs, PFD_REF, PllSource::Xtal as u64).unwrap();
        write_field(&regs, RDIV_IN[0], OutputSource::Ms0 as u64).unwrap();
        write_field(&regs, RDIV_IN[1], OutputSource::Xtal as u64).unwrap();
        write_field(&regs, RDIV_IN[2], OutputSource::MsN as u64).unwrap();
        write_field(&regs, RDIV_IN[3], OutputSource::NoClk as u64).unwrap();
        write_flag(&regs, OUT_ALL_DIS, true).unwrap();
        // FCAL readback
        regs.set(0xeb, 0x12);
        regs.set(0xec, 0x34);
        regs.set(0xed, 0xfe);
        // Inputs fine at once, then two polls waiting for lock
        regs.script_status(&[0x00, 0x11, 0x01, 0x00]);

        post_init(&regs, &delay).unwrap();

        assert_eq!(delay.delays(), vec![25, 100, 100, 20]);
        assert_eq!(regs.status_reads(), 4);
        assert_eq!(read_field(&regs, FCAL_OVRD), Ok(0x2_3412));
        assert_eq!(regs.get(0x2f), (0b00_0101 << 2) | 0x02);
        assert_eq!(read_flag(&regs, FCAL_OVRD_EN), Ok(true));
        assert_eq!(regs.get(0xf1), 0x65);
        assert_eq!(read_flag(&regs, MS_RESET), Ok(false));
        assert_eq!(read_flag(&regs, OUT_ALL_DIS), Ok(false));
        assert_eq!(read_flag(&regs, SOFT_RESET), Ok(false));
        assert_eq!(read_flag(&regs, MS_PDN[0]), Ok(false));
        assert_eq!(read_flag(&regs, MS_PDN[1]), Ok(true));
        assert_eq!(read_flag(&regs, MS_PDN[2]), Ok(false));
        assert_eq!(read_flag(&regs, MS_PDN[3]), Ok(true));

        // MS_RESET pulsed high then low
        let resets: std::vec::Vec<u8> = regs
            .writes()
            .iter()
            .filter(|(reg, _)| *reg == 0xe2)
            .map(|(_, value)| value & 0x04)
            .collect();
        assert_eq!(resets, vec![0x04, 0x00]);
    }

    #[test]
    fn post_init_without_input_clock() {
        let regs = FakeRegisterMap::si5338();
        let delay = FakeDelay::new();
        write_field(&regs, PFD_REF, PllSource::RefClk as u64).unwrap();
        regs.script_status(&[LOS_CLKIN]);

        assert_eq!(
            post_init(&regs, &delay),
            Err(ErrorCode::TIMEOUT { status: LOS_CLKIN })
        );
        assert_eq!(read_flag(&regs, OUT_ALL_DIS), Ok(false));
        assert_eq!(delay.delays().len(), INIT_TIMEOUT);
    }

    #[test]
    fn topology_from_config() {
        let regs = FakeRegisterMap::si5338();
        let lvds = DriveProfile::find("3V3_LVDS").unwrap();
        let config = Config {
            ref_source: RefSource::Xtal,
            pll_source: PllSource::Xtal,
            xtal_rate: 25_000_000,
            outputs: [
                OutputConfig::new(OutputSource::Ms0, lvds),
                OutputConfig::new(OutputSource::MsN, lvds).with_disable_state(DisableState::Low),
                OutputConfig::unused(),
                OutputConfig::new(OutputSource::Xtal, lvds),
            ],
            ..Config::default()
        };
        let tree = ClockTree::new(&regs, &config).unwrap();

        configure_topology(&tree, &config).unwrap();

        assert_eq!(read_field(&regs, IN_MUX), Ok(2));
        assert_eq!(read_field(&regs, PFD_REF), Ok(4));
        assert_eq!(tree.parent(ClockId::Out1), Some(ClockId::Ms1));
        assert_eq!(tree.parent(ClockId::Out2), None);
        assert_eq!(tree.rate(ClockId::Out3), 25_000_000);
        assert_eq!(read_field(&regs, RDIV_IN[1]), Ok(6));
        assert_eq!(read_field(&regs, OUT_DIS_STATE[1]), Ok(1));
        assert_eq!(read_field(&regs, DRV_FMT[3]), Ok(lvds.format.into()));
        assert_eq!(read_field(&regs, DRV_VDDO[3]), Ok(lvds.vddo.into()));
    }
}
