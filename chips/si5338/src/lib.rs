// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2025.

//! Driver for the Skyworks (Silicon Labs) Si5338 I²C-programmable clock generator.
//!
//! The Si5338 turns a crystal or up to two external reference clocks into four
//! independent outputs. Internally it is a small clock tree:
//!
//! ```text
//!  XTAL ─┐
//!  IN1/2 ┼─ REFCLK ── DIVREFCLK ─┐
//!  IN3  ─┘                       ├─ PLL (MSN) ─┬─ MS0 ─┐
//!  IN4  ─┬─ FBCLK ─── DIVFBCLK ──┘             ├─ MS1 ─┼─ OUT0..OUT3 (R divider, driver)
//!  IN5/6 ┘                                     ├─ MS2 ─┤
//!                                              └─ MS3 ─┘
//! ```
//!
//! Every setting of that tree lives in bit fields scattered over 348 byte-wide
//! registers split across two pages. This crate is organised in layers:
//!
//! + [`hil`]: the interfaces the driver consumes (register access, delays, I²C)
//! + [`regmap`]: a paged and cached register map on top of an I²C bus
//! + [`field`]: packing of multi-register bit fields
//! + [`synth`]: the rational divider arithmetic of the multisynth blocks
//! + [`tree`]: the clock nodes and their `prepare`/`enable`/`set_rate`/... operations
//! + [`bringup`]: the power-on programming procedure from the reference manual
//! + [`si5338`]: the device object tying all of the above together
//!
//! # Usage
//!
//! ```rust,ignore
//! let config = Config {
//!     ref_source: RefSource::Xtal,
//!     pll_source: PllSource::Xtal,
//!     xtal_rate: 25_000_000,
//!     outputs: [
//!         OutputConfig::new(OutputSource::Ms0, DriveProfile::find("3V3_LVDS")?)
//!             .with_rate(156_250_000)
//!             .enabled(),
//!         OutputConfig::unused(),
//!         OutputConfig::unused(),
//!         OutputConfig::unused(),
//!     ],
//!     ..Config::default()
//! };
//! let regs = I2cRegisterMap::new(i2c);
//! let si5338 = Si5338::attach(regs, delay, config)?;
//! let rate = si5338.tree().rate(ClockId::Out0);
//! ```

#![no_std]
#![forbid(unsafe_code)]

#[cfg(test)]
#[macro_use]
extern crate std;

pub mod bringup;
pub mod config;
pub mod drive;
pub mod errorcode;
pub mod field;
pub mod hil;
pub mod registers;
pub mod regmap;
pub mod si5338;
pub mod synth;
pub mod tree;


#[doc(inline)]
pub use crate::config::{
    Config, DisableState, FbSource, OutputConfig, OutputSource, PllSource, RefSource,
};
#[doc(inline)]
pub use crate::drive::DriveProfile;
#[doc(inline)]
pub use crate::errorcode::ErrorCode;
#[doc(inline)]
pub use crate::si5338::{OutputReadback, Si5338};
#[doc(inline)]
pub use crate::tree::{ClockId, ClockTree};
