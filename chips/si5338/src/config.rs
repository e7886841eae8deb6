// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2025.

//! Board-level configuration of the clock generator.
//!
//! A [`Config`] describes how the chip is wired on the board (which inputs
//! carry a clock, at what rate) and how it should be set up at attach time:
//! the multiplexer selections of the input stage and the PLL, and for every
//! output its source, driver profile, disabled-state behaviour and initial rate.
//!
//! The multiplexer enums carry the selector value used by the clock tree
//! (`set_parent` indices), so `PllSource::DivRefClk as u8` is the index to
//! pass to the PLL node.

use log::error;

use crate::drive::DriveProfile;
use crate::errorcode::ErrorCode;
use crate::synth::{FVCO_MAX, FVCO_MIN};

macro_rules! selector {
    ($(#[$meta:meta])* $name:ident { $($(#[$vmeta:meta])* $variant:ident = $value:literal,)+ }) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq)]
        #[repr(u8)]
        pub enum $name {
            $($(#[$vmeta])* $variant = $value,)+
        }

        impl TryFrom<u8> for $name {
            type Error = ErrorCode;

            fn try_from(value: u8) -> Result<Self, Self::Error> {
                match value {
                    $($value => Ok($name::$variant),)+
                    _ => Err(ErrorCode::INVALID_SELECTOR),
                }
            }
        }
    };
}

selector!(
    /// Source of REFCLK
    RefSource {
        /// Differential input IN1/IN2
        In12 = 0,
        /// Single-ended input IN3
        In3 = 1,
        /// Crystal oscillator
        Xtal = 2,
    }
);

selector!(
    /// Source of FBCLK
    FbSource {
        /// Single-ended input IN4
        In4 = 0,
        /// Differential input IN5/IN6
        In56 = 1,
        NoClk = 2,
    }
);

selector!(
    /// Source of the PLL phase detector reference input
    PllSource {
        RefClk = 0,
        FbClk = 1,
        DivRefClk = 2,
        DivFbClk = 3,
        Xtal = 4,
        NoClk = 5,
    }
);

selector!(
    /// Source of an output's R divider
    OutputSource {
        FbClk = 0,
        RefClk = 1,
        DivFbClk = 2,
        DivRefClk = 3,
        Xtal = 4,
        /// Multisynth 0, available to every output
        Ms0 = 5,
        /// The output's own multisynth (MS1 for output 1, ...)
        MsN = 6,
        NoClk = 7,
    }
);

selector!(
    /// What a disabled output drives
    DisableState {
        HiZ = 0,
        Low = 1,
        High = 2,
        /// The output can not be disabled
        AlwaysOn = 3,
    }
);

/// Attach-time setup of one output.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OutputConfig {
    pub source: OutputSource,
    pub drive: &'static DriveProfile,
    pub disable_state: DisableState,
    /// Initial rate in Hz, 0 to leave the output untouched
    pub rate: u64,
    /// Enable the output after bring-up; otherwise it is left unprepared
    pub enabled: bool,
}

impl OutputConfig {
    pub const fn new(source: OutputSource, drive: &'static DriveProfile) -> Self {
        Self {
            source,
            drive,
            disable_state: DisableState::HiZ,
            rate: 0,
            enabled: false,
        }
    }

    /// An output that is not used.
    pub const fn unused() -> Self {
        Self::new(OutputSource::NoClk, &DriveProfile::DEFAULT)
    }

    pub const fn with_rate(mut self, rate: u64) -> Self {
        self.rate = rate;
        self
    }

    pub const fn with_disable_state(mut self, state: DisableState) -> Self {
        self.disable_state = state;
        self
    }

    pub const fn enabled(mut self) -> Self {
        self.enabled = true;
        self
    }
}

/// Complete attach-time configuration of the chip.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Config {
    pub ref_source: RefSource,
    pub fb_source: FbSource,
    pub pll_source: PllSource,
    /// Fixed PLL VCO frequency in Hz, 0 to let an output multisynth pick it
    pub pll_vco: u64,
    /// Multisynth allowed to choose the VCO frequency when `pll_vco` is 0
    pub pll_master: usize,
    /// Crystal frequency in Hz, 0 if no crystal is fitted
    pub xtal_rate: u64,
    /// Rates of IN1/IN2, IN3, IN4 and IN5/IN6 in Hz, 0 if not connected
    pub input_rates: [u64; 4],
    pub outputs: [OutputConfig; 4],
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ref_source: RefSource::In12,
            fb_source: FbSource::NoClk,
            pll_source: PllSource::NoClk,
            pll_vco: 0,
            pll_master: 0,
            xtal_rate: 0,
            input_rates: [0; 4],
            outputs: [OutputConfig::unused(); 4],
        }
    }
}

#[derive(Default)]
struct Requirements {
    xtal: bool,
    refclk: bool,
    fbclk: bool,
    pll: bool,
}

impl Config {
    /// The multisynth that sets the PLL rate, if any.
    pub fn master(&self) -> Option<usize> {
        if self.pll_vco == 0 {
            Some(self.pll_master)
        } else {
            None
        }
    }

    /// Check the configuration for consistency and normalise it.
    ///
    /// Outputs routed to `NoClk` get their rate cleared. A `pll_vco` outside the
    /// VCO band is dropped in favour of the master multisynth.
    ///
    /// # Errors
    ///
    /// + [Err]\([ErrorCode::INVALID_SELECTOR]\): a required block has no source,
    /// the master multisynth does not exist or feeds no output, or IN1/IN2 and
    /// the crystal are both needed (they share pins)
    /// + [Err]\([ErrorCode::RANGE]\): a required input has no rate, or PLL
    /// outputs ask for a rate while the master output does not
    pub fn validate(&mut self) -> Result<(), ErrorCode> {
        let mut need = Requirements::default();

        for output in self.outputs.iter_mut() {
            match output.source {
                OutputSource::NoClk => output.rate = 0,
                OutputSource::RefClk | OutputSource::DivRefClk => need.refclk = true,
                OutputSource::FbClk | OutputSource::DivFbClk => need.fbclk = true,
                OutputSource::Xtal => need.xtal = true,
                OutputSource::Ms0 | OutputSource::MsN => {}
            }
        }
        need.pll = self.uses_pll();

        if need.pll {
            match self.pll_source {
                PllSource::Xtal => need.xtal = true,
                PllSource::RefClk | PllSource::DivRefClk => need.refclk = true,
                PllSource::FbClk | PllSource::DivFbClk => need.fbclk = true,
                PllSource::NoClk => {
                    error!("Si5338: outputs need the PLL but it has no source");
                    return Err(ErrorCode::INVALID_SELECTOR);
                }
            }
        }

        if need.refclk {
            if self.ref_source == RefSource::Xtal {
                need.xtal = true;
            } else if self.ref_source == RefSource::In12 && need.xtal {
                error!("Si5338: IN1/IN2 and XTAL are mutually exclusive");
                return Err(ErrorCode::INVALID_SELECTOR);
            }
            let rate = match self.ref_source {
                RefSource::In12 => self.input_rates[0],
                RefSource::In3 => self.input_rates[1],
                RefSource::Xtal => self.xtal_rate,
            };
            if rate == 0 {
                error!("Si5338: refclk source {:?} has no rate", self.ref_source);
                return Err(ErrorCode::RANGE);
            }
        }

        if need.fbclk {
            let rate = match self.fb_source {
                FbSource::In4 => self.input_rates[2],
                FbSource::In56 => self.input_rates[3],
                FbSource::NoClk => {
                    error!("Si5338: fbclk is required but has no source");
                    return Err(ErrorCode::INVALID_SELECTOR);
                }
            };
            if rate == 0 {
                error!("Si5338: fbclk source {:?} has no rate", self.fb_source);
                return Err(ErrorCode::RANGE);
            }
        }

        if need.xtal && self.xtal_rate == 0 {
            error!("Si5338: XTAL is required but has no rate");
            return Err(ErrorCode::RANGE);
        }

        if self.pll_master > 3 {
            error!("Si5338: invalid PLL master MS{}", self.pll_master);
            return Err(ErrorCode::INVALID_SELECTOR);
        }

        if need.pll && self.pll_vco != 0 && !(FVCO_MIN < self.pll_vco && self.pll_vco < FVCO_MAX) {
            error!("Si5338: ignoring PLL VCO rate {} outside the VCO band", self.pll_vco);
            self.pll_vco = 0;
        }

        if need.pll && self.pll_vco == 0 {
            let Some(channel) = self.master_output() else {
                error!("Si5338: PLL master MS{} drives no output", self.pll_master);
                return Err(ErrorCode::INVALID_SELECTOR);
            };
            let rated = self.outputs.iter().any(|output| {
                output.rate != 0 && matches!(output.source, OutputSource::Ms0 | OutputSource::MsN)
            });
            if rated && self.outputs[channel].rate == 0 {
                error!("Si5338: output {} sets the PLL rate but has none", channel);
                return Err(ErrorCode::RANGE);
            }
        }

        Ok(())
    }

    /// The first output fed by the master multisynth, if the PLL rate is not fixed.
    pub fn master_output(&self) -> Option<usize> {
        let master = self.master()?;
        self.outputs
            .iter()
            .enumerate()
            .position(|(channel, output)| match output.source {
                OutputSource::Ms0 => master == 0,
                OutputSource::MsN => channel == master,
                _ => false,
            })
    }

    /// Whether any output is routed through the PLL.
    pub fn uses_pll(&self) -> bool {
        self.outputs
            .iter()
            .any(|output| matches!(output.source, OutputSource::Ms0 | OutputSource::MsN))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lvds() -> &'static DriveProfile {
        DriveProfile::find("3V3_LVDS").unwrap()
    }

    fn xtal_config() -> Config {
        Config {
            ref_source: RefSource::Xtal,
            pll_source: PllSource::Xtal,
            xtal_rate: 25_000_000,
            outputs: [
                OutputConfig::new(OutputSource::Ms0, lvds()).with_rate(156_250_000),
                OutputConfig::unused(),
                OutputConfig::unused(),
                OutputConfig::unused(),
            ],
            ..Config::default()
        }
    }

    #[test]
    fn unused_outputs_in_const_context() {
        const IDLE: [OutputConfig; 4] = [OutputConfig::unused(); 4];
        assert_eq!(Config::default().outputs, IDLE);
        assert_eq!(IDLE[3].source, OutputSource::NoClk);
        assert_eq!(IDLE[3].rate, 0);
        assert_eq!(IDLE[3].drive.name, "3V3_CMOS_A+");
    }

    #[test]
    fn selectors_from_raw() {
        assert_eq!(PllSource::try_from(2), Ok(PllSource::DivRefClk));
        assert_eq!(OutputSource::try_from(6), Ok(OutputSource::MsN));
        assert_eq!(OutputSource::try_from(8), Err(ErrorCode::INVALID_SELECTOR));
        assert_eq!(FbSource::try_from(3), Err(ErrorCode::INVALID_SELECTOR));
        assert_eq!(DisableState::AlwaysOn as u8, 3);
    }

    #[test]
    fn valid_crystal_setup() {
        let mut config = xtal_config();
        assert_eq!(config.validate(), Ok(()));
        assert_eq!(config.master(), Some(0));
        assert!(config.uses_pll());
    }

    #[test]
    fn noclk_output_loses_its_rate() {
        let mut config = xtal_config();
        config.outputs[2] = OutputConfig::unused().with_rate(10_000_000);
        config.validate().unwrap();
        assert_eq!(config.outputs[2].rate, 0);
    }

    #[test]
    fn pll_needs_a_source() {
        let mut config = xtal_config();
        config.pll_source = PllSource::NoClk;
        assert_eq!(config.validate(), Err(ErrorCode::INVALID_SELECTOR));
    }

    #[test]
    fn in12_excludes_crystal() {
        let mut config = xtal_config();
        config.ref_source = RefSource::In12;
        config.pll_source = PllSource::RefClk;
        config.input_rates[0] = 100_000_000;
        config.outputs[1] = OutputConfig::new(OutputSource::Xtal, lvds());
        assert_eq!(config.validate(), Err(ErrorCode::INVALID_SELECTOR));
    }

    #[test]
    fn required_input_needs_a_rate() {
        let mut config = xtal_config();
        config.pll_source = PllSource::DivFbClk;
        config.fb_source = FbSource::In56;
        assert_eq!(config.validate(), Err(ErrorCode::RANGE));

        config.input_rates[3] = 200_000_000;
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn out_of_band_vco_is_dropped() {
        let mut config = xtal_config();
        config.pll_vco = 3_000_000_000;
        config.validate().unwrap();
        assert_eq!(config.pll_vco, 0);

        config.pll_vco = 2_500_000_000;
        config.validate().unwrap();
        assert_eq!(config.master(), None);
    }

    #[test]
    fn master_must_exist() {
        let mut config = xtal_config();
        config.pll_master = 4;
        assert_eq!(config.validate(), Err(ErrorCode::INVALID_SELECTOR));
    }

    #[test]
    fn master_must_drive_an_output() {
        let mut config = xtal_config();
        config.pll_master = 2;
        assert_eq!(config.validate(), Err(ErrorCode::INVALID_SELECTOR));

        config.outputs[3] = OutputConfig::new(OutputSource::MsN, lvds());
        assert_eq!(config.validate(), Err(ErrorCode::INVALID_SELECTOR));

        config.outputs[2] = OutputConfig::new(OutputSource::MsN, lvds());
        assert_eq!(config.validate(), Err(ErrorCode::RANGE));

        config.outputs[2] = config.outputs[2].with_rate(125_000_000);
        assert_eq!(config.validate(), Ok(()));
        assert_eq!(config.master_output(), Some(2));

        config.pll_vco = 2_500_000_000;
        config.pll_master = 1;
        assert_eq!(config.validate(), Ok(()));
        assert_eq!(config.master_output(), None);
    }

    #[test]
    fn master_output_follows_the_mux() {
        let mut config = xtal_config();
        assert_eq!(config.master_output(), Some(0));

        config.outputs[0] = OutputConfig::unused();
        config.outputs[3] = OutputConfig::new(OutputSource::Ms0, lvds()).with_rate(50_000_000);
        assert_eq!(config.master_output(), Some(3));
        assert_eq!(config.validate(), Ok(()));

        config.pll_master = 1;
        assert_eq!(config.master_output(), None);
        assert_eq!(config.validate(), Err(ErrorCode::INVALID_SELECTOR));
    }
}
