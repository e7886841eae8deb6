// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2025.

//! The Si5338 device.
//!
//! [`Si5338::attach`] runs the whole bring-up: it checks the chip identity,
//! quiets it, builds the [`ClockTree`], programs the board topology and the
//! requested output rates, locks the PLL and finally enables the outputs the
//! configuration asks for. Afterwards the tree is available through
//! [`Si5338::tree`] for runtime rate changes.
//!
//! # Usage
//!
//! ```rust,ignore
//! let si5338 = Si5338::attach(I2cRegisterMap::new(bus), delay, config)?;
//! si5338.tree().set_rate(ClockId::Out1, 25_000_000)?;
//! let out1 = si5338.output(1)?;
//! ```

use log::{debug, error};

use crate::bringup;
use crate::config::{Config, DisableState, OutputSource};
use crate::drive::{DriveProfile, DriveSettings};
use crate::errorcode::ErrorCode;
use crate::field::{read_field, read_flag};
use crate::hil::{Delay, RegisterMap};
use crate::registers::{
    DEV_CONFIG2, DEV_CONFIG2_VAL, DRV_PDN, MS_PDN, OUT_ALL_DIS, OUT_DIS, OUT_DIS_STATE, RDIV,
    RDIV_IN,
};
use crate::tree::{ClockId, ClockTree};

/// State of one output as found in the registers.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OutputReadback {
    /// Source mux, `None` if the register holds an invalid value
    pub source: Option<OutputSource>,
    /// R divider setting; the output divides by `1 << r_div`
    pub r_div: u8,
    pub driver_powered: bool,
    /// Power of the multisynth with the same number
    pub ms_powered: bool,
    pub disabled: bool,
    pub all_disabled: bool,
    pub disable_state: DisableState,
    pub drive: DriveSettings,
    /// The catalog profile matching `drive`, if any
    pub profile: Option<&'static DriveProfile>,
    /// Rate in Hz as computed by the clock tree
    pub rate: u64,
}

pub struct Si5338<M: RegisterMap, D: Delay> {
    tree: ClockTree<M>,
    delay: D,
    config: Config,
}

impl<M: RegisterMap, D: Delay> Si5338<M, D> {
    /// Bring the chip up according to `config`.
    ///
    /// # Errors
    ///
    /// + [Err]\([ErrorCode::NODEVICE]\): the chip does not identify as Si5338
    /// + [Err]\([ErrorCode::INVALID_SELECTOR]\), [Err]\([ErrorCode::RANGE]\):
    /// `config` is inconsistent
    /// + [Err]\([ErrorCode::TIMEOUT]\): inputs missing or the PLL did not lock
    /// + [Err]\([ErrorCode::IO]\): register access failed
    pub fn attach(regs: M, delay: D, mut config: Config) -> Result<Self, ErrorCode> {
        config.validate()?;

        let device = read_field(&regs, DEV_CONFIG2)?;
        if device != DEV_CONFIG2_VAL {
            error!("Si5338: unexpected device id {}", device);
            return Err(ErrorCode::NODEVICE);
        }

        bringup::pre_init(&regs)?;
        let tree = ClockTree::new(regs, &config)?;
        bringup::configure_topology(&tree, &config)?;

        if config.pll_vco != 0 {
            tree.set_rate(ClockId::Pll, config.pll_vco)?;
        }

        // The master output goes first so the PLL has a rate for the others
        let master = config.master_output();
        let order = master
            .into_iter()
            .chain((0..config.outputs.len()).filter(|channel| Some(*channel) != master));
        for channel in order {
            let output = &config.outputs[channel];
            if output.rate == 0 {
                continue;
            }
            let id = ClockId::output(channel).ok_or(ErrorCode::INVALID_SELECTOR)?;
            tree.set_rate(id, output.rate)?;
            tree.prepare(id)?;
            debug!(
                "Si5338: output {} at {} Hz (asked {})",
                channel,
                tree.rate(id),
                output.rate
            );
        }

        bringup::post_init(tree.regs(), &delay)?;

        for (channel, output) in config.outputs.iter().enumerate() {
            if output.rate == 0 {
                continue;
            }
            let id = ClockId::output(channel).ok_or(ErrorCode::INVALID_SELECTOR)?;
            if output.enabled {
                tree.enable(id)?;
            } else {
                tree.unprepare(id)?;
            }
        }

        Ok(Self {
            tree,
            delay,
            config,
        })
    }

    pub fn tree(&self) -> &ClockTree<M> {
        &self.tree
    }

    /// The configuration after validation.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Read back the state of output `channel`.
    pub fn output(&self, channel: usize) -> Result<OutputReadback, ErrorCode> {
        let id = ClockId::output(channel).ok_or(ErrorCode::INVALID_SELECTOR)?;
        let regs = self.tree.regs();

        let drive = DriveSettings::read(regs, channel)?;
        let source = OutputSource::try_from(read_field(regs, RDIV_IN[channel])? as u8).ok();
        let disable_state =
            DisableState::try_from(read_field(regs, OUT_DIS_STATE[channel])? as u8)?;

        Ok(OutputReadback {
            source,
            r_div: read_field(regs, RDIV[channel])? as u8,
            driver_powered: !read_flag(regs, DRV_PDN[channel])?,
            ms_powered: !read_flag(regs, MS_PDN[channel])?,
            disabled: read_flag(regs, OUT_DIS[channel])?,
            all_disabled: read_flag(regs, OUT_ALL_DIS)?,
            disable_state,
            drive,
            profile: drive.profile(),
            rate: self.tree.rate(id),
        })
    }

    /// Release the register map and the delay.
    pub fn detach(self) -> (M, D) {
        (self.tree.into_regs(), self.delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{OutputConfig, PllSource, RefSource};
    use crate::test::{FakeDelay, FakeRegisterMap};

    fn config() -> Config {
        let lvds = DriveProfile::find("3V3_LVDS").unwrap();
        let cmos = DriveProfile::find("3V3_CMOS_A+").unwrap();
        Config {
            ref_source: RefSource::Xtal,
            pll_source: PllSource::Xtal,
            xtal_rate: 25_000_000,
            outputs: [
                OutputConfig::new(OutputSource::Ms0, lvds)
                    .with_rate(156_250_000)
                    .enabled(),
                OutputConfig::new(OutputSource::MsN, cmos).with_rate(100_000_000),
                OutputConfig::unused(),
                OutputConfig::unused(),
            ],
            ..Config::default()
        }
    }

    #[test]
    fn attach_brings_outputs_up() {
        let regs = FakeRegisterMap::si5338();
        let delay = FakeDelay::new();
        let si5338 = Si5338::attach(&regs, &delay, config()).unwrap();

        let tree = si5338.tree();
        assert_eq!(tree.rate(ClockId::Pll), 2_500_000_000);
        assert_eq!(tree.rate(ClockId::Out0), 156_250_000);
        assert_eq!(tree.rate(ClockId::Out1), 100_000_000);
        assert!(tree.node(ClockId::Out0).enabled);
        assert!(!tree.node(ClockId::Out1).prepared);

        let out0 = si5338.output(0).unwrap();
        assert_eq!(out0.source, Some(OutputSource::Ms0));
        assert_eq!(out0.r_div, 0);
        assert!(out0.driver_powered);
        assert!(out0.ms_powered);
        assert!(!out0.disabled);
        assert!(!out0.all_disabled);
        assert_eq!(out0.profile.map(|p| p.name), Some("3V3_LVDS"));

        let out1 = si5338.output(1).unwrap();
        assert!(!out1.driver_powered);
        assert!(out1.disabled);
        assert_eq!(out1.profile.map(|p| p.name), Some("3V3_CMOS_A+"));

        assert_eq!(si5338.output(4), Err(ErrorCode::INVALID_SELECTOR));
        assert_eq!(delay.delays(), vec![25, 20]);
    }

    #[test]
    fn wrong_chip_is_rejected() {
        let regs = FakeRegisterMap::new();
        regs.set(2, 37);
        let delay = FakeDelay::new();
        assert!(matches!(
            Si5338::attach(&regs, &delay, config()),
            Err(ErrorCode::NODEVICE)
        ));
        assert!(regs.writes().is_empty());
    }

    #[test]
    fn invalid_config_is_rejected_before_any_access() {
        let regs = FakeRegisterMap::si5338();
        let delay = FakeDelay::new();
        let mut config = config();
        config.pll_source = PllSource::NoClk;
        assert!(matches!(
            Si5338::attach(&regs, &delay, config),
            Err(ErrorCode::INVALID_SELECTOR)
        ));
        assert!(regs.writes().is_empty());
    }

    #[test]
    fn detach_returns_the_resources() {
        let regs = FakeRegisterMap::si5338();
        let delay = FakeDelay::new();
        let si5338 = Si5338::attach(&regs, &delay, config()).unwrap();
        let (regs_back, delay_back) = si5338.detach();
        assert!(core::ptr::eq(regs_back, &regs));
        assert!(core::ptr::eq(delay_back, &delay));
    }

    #[test]
    fn master_on_a_later_output() {
        let regs = FakeRegisterMap::si5338();
        let delay = FakeDelay::new();
        let lvds = DriveProfile::find("3V3_LVDS").unwrap();
        let config = Config {
            pll_master: 1,
            outputs: [
                OutputConfig::new(OutputSource::MsN, lvds)
                    .with_rate(100_000_000)
                    .enabled(),
                OutputConfig::new(OutputSource::MsN, lvds)
                    .with_rate(156_250_000)
                    .enabled(),
                OutputConfig::unused(),
                OutputConfig::unused(),
            ],
            ..config()
        };
        let si5338 = Si5338::attach(&regs, &delay, config).unwrap();

        let tree = si5338.tree();
        assert_eq!(tree.rate(ClockId::Pll), 2_500_000_000);
        assert_eq!(tree.rate(ClockId::Ms0), 100_000_000);
        assert_eq!(tree.rate(ClockId::Ms1), 156_250_000);
        assert_eq!(tree.rate(ClockId::Out0), 100_000_000);
        assert_eq!(tree.rate(ClockId::Out1), 156_250_000);
        // MS0 divides by 25, MS1 by 16
        let p1 = |id| tree.node(id).params.map(|params| params.p1);
        assert_eq!(p1(ClockId::Ms0), Some((25 - 4) * 128));
        assert_eq!(p1(ClockId::Ms1), Some((16 - 4) * 128));
    }
}
