// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2025.

//! Output driver profiles.
//!
//! Each output driver is configured by a signal format, a supply voltage
//! (VDDO), an impedance trim and two polarity bits. Only a fixed set of
//! combinations is meaningful; they are listed in [`PROFILES`] under the names
//! used by the vendor's configuration tool, for example `"3V3_CMOS_A+B-"` or
//! `"2V5_LVDS"`.
//!
//! For single-ended formats only one of the two polarity bits matters. The
//! catalog marks the other one as don't-care, so that reading a driver back
//! with [`DriveSettings::profile`] finds the profile regardless of its value.

use crate::errorcode::ErrorCode;
use crate::field::{read_field, write_field};
use crate::hil::RegisterMap;
use crate::registers::{DRV_FMT, DRV_INV, DRV_TRIM, DRV_VDDO};

/// A named output driver configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DriveProfile {
    /// Name as used by the configuration tool
    pub name: &'static str,
    /// Signal format, 3 bits
    pub format: u8,
    /// Supply voltage selector, 2 bits
    pub vddo: u8,
    /// Impedance trim, 5 bits
    pub trim: u8,
    // Bits 1:0 are the polarity, bits 3:2 mark bit 1 and 0 as don't-care.
    invert: u8,
}

impl DriveProfile {
    /// Profile given to outputs that are not used, first entry of [`PROFILES`].
    pub const DEFAULT: DriveProfile = DriveProfile::new("3V3_CMOS_A+", 1, 0, 0x17, 0b1000);

    const fn new(name: &'static str, format: u8, vddo: u8, trim: u8, invert: u8) -> Self {
        Self {
            name,
            format,
            vddo,
            trim,
            invert,
        }
    }

    /// Polarity bits written to the chip.
    pub fn invert(&self) -> u8 {
        self.invert & 0b11
    }

    /// Whether the polarity bits read from a driver agree with this profile.
    pub fn matches_invert(&self, invert: u8) -> bool {
        let dont_care = self.invert >> 2;
        (dont_care | (invert & 0b11)) == (dont_care | self.invert())
    }

    /// Look a profile up by name.
    ///
    /// # Errors
    ///
    /// + [Err]\([ErrorCode::INVALID_SELECTOR]\): no profile with that name
    pub fn find(name: &str) -> Result<&'static DriveProfile, ErrorCode> {
        PROFILES
            .iter()
            .find(|profile| profile.name == name)
            .ok_or(ErrorCode::INVALID_SELECTOR)
    }

    /// Program output `channel` with this profile.
    pub fn apply<M: RegisterMap + ?Sized>(
        &self,
        regs: &M,
        channel: usize,
    ) -> Result<(), ErrorCode> {
        if channel >= 4 {
            return Err(ErrorCode::INVALID_SELECTOR);
        }
        write_field(regs, DRV_FMT[channel], self.format.into())?;
        write_field(regs, DRV_VDDO[channel], self.vddo.into())?;
        write_field(regs, DRV_TRIM[channel], self.trim.into())?;
        write_field(regs, DRV_INV[channel], self.invert().into())
    }
}

/// Raw driver settings of one output as found in the registers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DriveSettings {
    pub format: u8,
    pub vddo: u8,
    pub trim: u8,
    pub invert: u8,
}

impl DriveSettings {
    /// Read the driver settings of output `channel`.
    pub fn read<M: RegisterMap + ?Sized>(regs: &M, channel: usize) -> Result<Self, ErrorCode> {
        if channel >= 4 {
            return Err(ErrorCode::INVALID_SELECTOR);
        }
        Ok(Self {
            format: read_field(regs, DRV_FMT[channel])? as u8,
            vddo: read_field(regs, DRV_VDDO[channel])? as u8,
            trim: read_field(regs, DRV_TRIM[channel])? as u8,
            invert: read_field(regs, DRV_INV[channel])? as u8,
        })
    }

    /// The first catalog profile these settings correspond to, if any.
    pub fn profile(&self) -> Option<&'static DriveProfile> {
        PROFILES.iter().find(|profile| {
            profile.format == self.format
                && profile.vddo == self.vddo
                && profile.trim == self.trim
                && profile.matches_invert(self.invert)
        })
    }
}

/// All supported driver profiles.
pub static PROFILES: [DriveProfile; 61] = [
    DriveProfile::DEFAULT,
    DriveProfile::new("3V3_CMOS_A-", 1, 0, 0x17, 0b1001),
    DriveProfile::new("3V3_CMOS_B+", 2, 0, 0x17, 0b0100),
    DriveProfile::new("3V3_CMOS_B-", 2, 0, 0x17, 0b0110),
    DriveProfile::new("3V3_CMOS_A+B+", 3, 0, 0x17, 0b1000),
    DriveProfile::new("3V3_CMOS_A-B+", 3, 0, 0x17, 0b1001),
    DriveProfile::new("3V3_CMOS_A+B-", 3, 0, 0x17, 0b0100),
    DriveProfile::new("3V3_CMOS_A-B-", 3, 0, 0x17, 0b0110),
    DriveProfile::new("2V5_CMOS_A+", 1, 1, 0x13, 0b1000),
    DriveProfile::new("2V5_CMOS_A-", 1, 1, 0x13, 0b1001),
    DriveProfile::new("2V5_CMOS_B+", 2, 1, 0x13, 0b0100),
    DriveProfile::new("2V5_CMOS_B-", 2, 1, 0x13, 0b0110),
    DriveProfile::new("2V5_CMOS_A+B+", 3, 1, 0x13, 0b1000),
    DriveProfile::new("2V5_CMOS_A-B+", 3, 1, 0x13, 0b1001),
    DriveProfile::new("2V5_CMOS_A+B-", 3, 1, 0x13, 0b0100),
    DriveProfile::new("2V5_CMOS_A-B-", 3, 1, 0x13, 0b0110),
    DriveProfile::new("1V8_CMOS_A+", 1, 2, 0x15, 0b1000),
    DriveProfile::new("1V8_CMOS_A-", 1, 2, 0x15, 0b1001),
    DriveProfile::new("1V8_CMOS_B+", 2, 2, 0x15, 0b0100),
    DriveProfile::new("1V8_CMOS_B-", 2, 2, 0x15, 0b0110),
    DriveProfile::new("1V8_CMOS_A+B+", 3, 2, 0x15, 0b1000),
    DriveProfile::new("1V8_CMOS_A-B+", 3, 2, 0x15, 0b1001),
    DriveProfile::new("1V8_CMOS_A+B-", 3, 2, 0x15, 0b0100),
    DriveProfile::new("1V8_CMOS_A-B-", 3, 2, 0x15, 0b0110),
    DriveProfile::new("1V5_HSTL_A+", 1, 3, 0x1f, 0b1000),
    DriveProfile::new("1V5_HSTL_A-", 1, 3, 0x1f, 0b1001),
    DriveProfile::new("1V5_HSTL_B+", 2, 3, 0x1f, 0b0100),
    DriveProfile::new("1V5_HSTL_B-", 2, 3, 0x1f, 0b0110),
    DriveProfile::new("1V5_HSTL_A+B+", 3, 3, 0x1f, 0b1000),
    DriveProfile::new("1V5_HSTL_A-B+", 3, 3, 0x1f, 0b1001),
    DriveProfile::new("1V5_HSTL_A+B-", 3, 3, 0x1f, 0b0100),
    DriveProfile::new("1V5_HSTL_A-B-", 3, 3, 0x1f, 0b0110),
    DriveProfile::new("3V3_SSTL_A+", 1, 0, 0x04, 0b1000),
    DriveProfile::new("3V3_SSTL_A-", 1, 0, 0x04, 0b1001),
    DriveProfile::new("3V3_SSTL_B+", 2, 0, 0x04, 0b0100),
    DriveProfile::new("3V3_SSTL_B-", 2, 0, 0x04, 0b0110),
    DriveProfile::new("3V3_SSTL_A+B+", 3, 0, 0x04, 0b1000),
    DriveProfile::new("3V3_SSTL_A-B+", 3, 0, 0x04, 0b1001),
    DriveProfile::new("3V3_SSTL_A+B-", 3, 0, 0x04, 0b0101),
    DriveProfile::new("3V3_SSTL_A-B-", 3, 0, 0x04, 0b0110),
    DriveProfile::new("2V5_SSTL_A+", 1, 1, 0x0d, 0b1000),
    DriveProfile::new("2V5_SSTL_A-", 1, 1, 0x0d, 0b1001),
    DriveProfile::new("2V5_SSTL_B+", 2, 1, 0x0d, 0b0100),
    DriveProfile::new("2V5_SSTL_B-", 2, 1, 0x0d, 0b0110),
    DriveProfile::new("2V5_SSTL_A+B+", 3, 1, 0x0d, 0b1000),
    DriveProfile::new("2V5_SSTL_A-B+", 3, 1, 0x0d, 0b1001),
    DriveProfile::new("2V5_SSTL_A+B-", 3, 1, 0x0d, 0b0101),
    DriveProfile::new("2V5_SSTL_A-B-", 3, 1, 0x0d, 0b0110),
    DriveProfile::new("1V8_SSTL_A+", 1, 2, 0x17, 0b1000),
    DriveProfile::new("1V8_SSTL_A-", 1, 2, 0x17, 0b1001),
    DriveProfile::new("1V8_SSTL_B+", 2, 2, 0x17, 0b0100),
    DriveProfile::new("1V8_SSTL_B-", 2, 2, 0x17, 0b0110),
    DriveProfile::new("1V8_SSTL_A+B+", 3, 2, 0x17, 0b1000),
    DriveProfile::new("1V8_SSTL_A-B+", 3, 2, 0x17, 0b1001),
    DriveProfile::new("1V8_SSTL_A+B-", 3, 2, 0x17, 0b0100),
    DriveProfile::new("1V8_SSTL_A-B-", 3, 2, 0x17, 0b0110),
    DriveProfile::new("3V3_LVPECL", 4, 0, 0x0f, 0b1100),
    DriveProfile::new("2V5_LVPECL", 4, 1, 0x10, 0b1100),
    DriveProfile::new("3V3_LVDS", 6, 0, 0x03, 0b1100),
    DriveProfile::new("2V5_LVDS", 6, 1, 0x04, 0b1100),
    DriveProfile::new("1V8_LVDS", 6, 2, 0x04, 0b1100),
];
