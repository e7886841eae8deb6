// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2025.

//! Register and bit field layout of the Si5338.
//!
//! Most settings of the chip are narrow bit fields, and the wide ones (the
//! multisynth parameters, the calibration value, the driver trim of output 1)
//! are spread over several registers. Each field is described by a
//! [`FieldDescriptor`]: an ordered list of `(register, mask)` segments, least
//! significant segment first. [`crate::field`] reads and writes them.
//!
//! Single-register fields which are decoded as a whole (the status register and
//! the PLL loop filter selectors) are additionally described with
//! `register_bitfields!` so they can be inspected with a `LocalRegisterCopy`.

use tock_registers::{register_bitfields, LocalRegisterCopy};

/// One contiguous run of bits inside a single register.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Segment {
    /// Register address, 0..=347
    pub reg: u16,
    /// Contiguous mask of 1 to 8 bits
    pub mask: u8,
}

impl Segment {
    /// Number of value bits carried by this segment.
    pub const fn width(&self) -> u32 {
        self.mask.count_ones()
    }

    /// Position of the lowest bit of the mask.
    pub const fn shift(&self) -> u32 {
        self.mask.trailing_zeros()
    }
}

/// An unsigned value split over one or more register segments.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FieldDescriptor(pub &'static [Segment]);

impl FieldDescriptor {
    /// The segments of the field, least significant first.
    pub const fn segments(&self) -> &'static [Segment] {
        self.0
    }

    /// Total width of the field in bits.
    pub fn width(&self) -> u32 {
        self.0.iter().map(Segment::width).sum()
    }
}

macro_rules! field {
    ($(($reg:expr, $mask:expr)),+ $(,)?) => {
        FieldDescriptor(&[$(Segment { reg: $reg, mask: $mask }),+])
    };
}

/// Page select register, bit 0 selects registers 256..=347
pub const PAGE: u16 = 255;
/// Highest register address
pub const LAST_REG: u16 = 347;

/// Device configuration register holding the part number
pub const DEV_CONFIG2: FieldDescriptor = field!((2, 0x3f));
/// Last two digits of the part number
pub const DEV_CONFIG2_VAL: u64 = 38;

/// Interrupt mask
pub const INT_MASK: FieldDescriptor = field!((6, 0x1d));

// Input stage
pub const IN_MUX: FieldDescriptor = field!((0x1d, 0x18));
pub const IN_MUX1: FieldDescriptor = field!((0x1c, 0x1c));
pub const FB_MUX: FieldDescriptor = field!((0x1e, 0x18));
pub const FB_MUX1: FieldDescriptor = field!((0x1c, 0x20));
pub const XTAL_FREQ: FieldDescriptor = field!((0x1c, 0x03));
pub const PFD_REF: FieldDescriptor = field!((0x1d, 0xe0));
pub const PFD_FB: FieldDescriptor = field!((0x1e, 0xe0));
pub const P1DIV: FieldDescriptor = field!((0x1d, 0x07));
pub const P2DIV: FieldDescriptor = field!((0x1e, 0x07));
pub const PFD_EXTFB: FieldDescriptor = field!((0x30, 0x80));

// Per output channel
pub const DRV_PDN: [FieldDescriptor; 4] = [
    field!((0x1f, 0x01)),
    field!((0x20, 0x01)),
    field!((0x21, 0x01)),
    field!((0x22, 0x01)),
];
pub const MS_PDN: [FieldDescriptor; 4] = [
    field!((0x1f, 0x02)),
    field!((0x20, 0x02)),
    field!((0x21, 0x02)),
    field!((0x22, 0x02)),
];
pub const RDIV: [FieldDescriptor; 4] = [
    field!((0x1f, 0x1c)),
    field!((0x20, 0x1c)),
    field!((0x21, 0x1c)),
    field!((0x22, 0x1c)),
];
pub const RDIV_IN: [FieldDescriptor; 4] = [
    field!((0x1f, 0xe0)),
    field!((0x20, 0xe0)),
    field!((0x21, 0xe0)),
    field!((0x22, 0xe0)),
];
pub const DRV_VDDO: [FieldDescriptor; 4] = [
    field!((0x23, 0x03)),
    field!((0x23, 0x0c)),
    field!((0x23, 0x30)),
    field!((0x23, 0xc0)),
];
pub const DRV_FMT: [FieldDescriptor; 4] = [
    field!((0x24, 0x07)),
    field!((0x25, 0x07)),
    field!((0x26, 0x07)),
    field!((0x27, 0x07)),
];
pub const DRV_INV: [FieldDescriptor; 4] = [
    field!((0x24, 0x18)),
    field!((0x25, 0x18)),
    field!((0x26, 0x18)),
    field!((0x27, 0x18)),
];
/// Driver impedance trim; output 1 straddles registers 40 and 41
pub const DRV_TRIM: [FieldDescriptor; 4] = [
    field!((0x28, 0x1f)),
    field!((0x28, 0xe0), (0x29, 0x03)),
    field!((0x29, 0x7c)),
    field!((0x2a, 0x1f)),
];
pub const OUT_DIS_STATE: [FieldDescriptor; 4] = [
    field!((0x6e, 0xc0)),
    field!((0x72, 0xc0)),
    field!((0x76, 0xc0)),
    field!((0x7a, 0xc0)),
];
pub const OUT_DIS: [FieldDescriptor; 4] = [
    field!((0xe6, 0x01)),
    field!((0xe6, 0x02)),
    field!((0xe6, 0x04)),
    field!((0xe6, 0x08)),
];
pub const OUT_ALL_DIS: FieldDescriptor = field!((0xe6, 0x10));

// PLL
pub const FCAL_OVRD: FieldDescriptor = field!((0x2d, 0xff), (0x2e, 0xff), (0x2f, 0x03));
pub const REG47_72: FieldDescriptor = field!((0x2f, 0xfc));
pub const PLL_KPHI: FieldDescriptor = field!((0x30, 0x7f));
pub const FCAL_OVRD_EN: FieldDescriptor = field!((0x31, 0x80));
pub const VCO_GAIN_RSEL_BWSEL: FieldDescriptor = field!((0x31, 0x7f));
pub const PLL_EN: FieldDescriptor = field!((0x32, 0xc0));
pub const MSCAL: FieldDescriptor = field!((0x32, 0x3f));
pub const MS_PEC: FieldDescriptor = field!((0x33, 0x07));
/// High speed divider mode of MS0..MS3
pub const MS_HS: [FieldDescriptor; 4] = [
    field!((0x33, 0x10)),
    field!((0x33, 0x20)),
    field!((0x33, 0x40)),
    field!((0x33, 0x80)),
];

/// P1, P2 and P3 of one multisynth block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MultisynthFields {
    /// 18-bit P1
    pub p1: FieldDescriptor,
    /// 30-bit P2
    pub p2: FieldDescriptor,
    /// 30-bit P3
    pub p3: FieldDescriptor,
}

macro_rules! multisynth {
    ($base:expr) => {
        MultisynthFields {
            p1: field!(($base, 0xff), ($base + 1, 0xff), ($base + 2, 0x03)),
            p2: field!(
                ($base + 2, 0xfc),
                ($base + 3, 0xff),
                ($base + 4, 0xff),
                ($base + 5, 0xff),
            ),
            p3: field!(
                ($base + 6, 0xff),
                ($base + 7, 0xff),
                ($base + 8, 0xff),
                ($base + 9, 0x3f),
            ),
        }
    };
}

/// Output multisynths MS0..MS3
pub const MS: [MultisynthFields; 4] = [
    multisynth!(0x35),
    multisynth!(0x40),
    multisynth!(0x4b),
    multisynth!(0x56),
];
/// PLL feedback multisynth
pub const MSN: MultisynthFields = multisynth!(0x61);

// Status and control
pub const STATUS: FieldDescriptor = field!((0xda, 0xff));
pub const MS_RESET: FieldDescriptor = field!((0xe2, 0x04));
pub const FCAL: FieldDescriptor = field!((0xeb, 0xff), (0xec, 0xff), (0xed, 0x03));
pub const DIS_LOS: FieldDescriptor = field!((0xf1, 0x80));
pub const REG241: FieldDescriptor = field!((0xf1, 0xff));
pub const SOFT_RESET: FieldDescriptor = field!((0xf6, 0x02));

/// Register fixups from the reference manual, applied before configuration.
pub const MISC: [(FieldDescriptor, u64); 7] = [
    (field!((0x2f, 0xfc)), 0x5),
    (field!((0x6a, 0x80)), 0x1),
    (field!((0x74, 0x80)), 0x1),
    (field!((0x2a, 0x20)), 0x1),
    (field!((0x06, 0xe0)), 0x0),
    (field!((0x06, 0x02)), 0x0),
    (field!((0x1c, 0xc0)), 0x0),
];

register_bitfields![u8,
    /// Register 218, alarm status
    pub Status [
        /// Device calibration in progress
        SYS_CAL OFFSET(0) NUMBITS(1) [],
        /// Loss of signal on the reference input
        LOS_CLKIN OFFSET(2) NUMBITS(1) [],
        /// Loss of signal on the feedback input
        LOS_FDBK OFFSET(3) NUMBITS(1) [],
        /// PLL loss of lock
        PLL_LOL OFFSET(4) NUMBITS(1) [],
    ],

    /// Register 49, bits 6:0, PLL loop filter selectors
    pub LoopFilter [
        BWSEL OFFSET(0) NUMBITS(2) [],
        RSEL OFFSET(2) NUMBITS(2) [],
        VCO_GAIN OFFSET(4) NUMBITS(3) [],
    ]
];

/// A snapshot of the status register
pub type StatusVal = LocalRegisterCopy<u8, Status::Register>;
/// The packed loop filter selectors
pub type LoopFilterVal = LocalRegisterCopy<u8, LoopFilter::Register>;
