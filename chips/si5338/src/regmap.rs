// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2025.

//! [`RegisterMap`] on top of an I²C bus.
//!
//! The chip exposes 256 byte addresses over I²C. Registers 256..=347 are
//! reached by setting bit 0 of the page register (255) and using the address
//! minus 256. The currently selected page is remembered so a page switch is
//! only issued when needed.
//!
//! Non-volatile registers are cached after the first read or write. The status
//! register, the soft reset register and the FCAL readback registers change on
//! their own and always go to the bus.
//!
//! Writes are checked against the table of registers the chip documents as
//! writeable. The check is per register: the bring-up sequence clears
//! reserved bits of some partially writeable registers, so whole bytes go out
//! as given.
//!
//! # Usage
//!
//! ```rust,ignore
//! let regs = I2cRegisterMap::new(bus);
//! let id = regs.read(2)?;
//! ```

use core::cell::Cell;

use crate::errorcode::ErrorCode;
use crate::hil::{I2cBus, RegisterMap};
use crate::registers::{LAST_REG, PAGE};

const NUM_REGS: usize = LAST_REG as usize + 1;

/// Registers whose value is changed by the chip itself.
const VOLATILE: [u16; 5] = [218, 235, 236, 237, 246];

/// Registers the chip accepts writes to, sorted.
static WRITEABLE: [u16; 240] = [
    0x006, 0x01b, 0x01c, 0x01d, 0x01e, 0x01f, 0x020, 0x021, 0x022, 0x023, 0x024, 0x025,
    0x026, 0x027, 0x028, 0x029, 0x02a, 0x02d, 0x02e, 0x02f, 0x030, 0x031, 0x032, 0x033,
    0x034, 0x035, 0x036, 0x037, 0x038, 0x039, 0x03a, 0x03b, 0x03c, 0x03d, 0x03e, 0x03f,
    0x040, 0x041, 0x042, 0x043, 0x044, 0x045, 0x046, 0x047, 0x048, 0x049, 0x04a, 0x04b,
    0x04c, 0x04d, 0x04e, 0x04f, 0x050, 0x051, 0x052, 0x053, 0x054, 0x055, 0x056, 0x057,
    0x058, 0x059, 0x05a, 0x05b, 0x05c, 0x05d, 0x05e, 0x05f, 0x061, 0x062, 0x063, 0x064,
    0x065, 0x066, 0x067, 0x068, 0x069, 0x06a, 0x06b, 0x06c, 0x06d, 0x06e, 0x06f, 0x070,
    0x071, 0x072, 0x073, 0x074, 0x075, 0x076, 0x077, 0x078, 0x079, 0x07a, 0x07b, 0x07c,
    0x07d, 0x07e, 0x07f, 0x080, 0x081, 0x082, 0x083, 0x084, 0x085, 0x086, 0x087, 0x088,
    0x089, 0x08a, 0x08b, 0x08c, 0x08d, 0x08e, 0x08f, 0x090, 0x098, 0x099, 0x09a, 0x09b,
    0x09c, 0x09d, 0x09e, 0x09f, 0x0a0, 0x0a1, 0x0a2, 0x0a3, 0x0a4, 0x0a5, 0x0a6, 0x0a7,
    0x0a8, 0x0a9, 0x0aa, 0x0ab, 0x0ac, 0x0ad, 0x0ae, 0x0af, 0x0b0, 0x0b1, 0x0b2, 0x0b3,
    0x0b4, 0x0b5, 0x0b6, 0x0b7, 0x0b8, 0x0b9, 0x0ba, 0x0bb, 0x0bc, 0x0bd, 0x0be, 0x0bf,
    0x0c0, 0x0c1, 0x0c2, 0x0c3, 0x0c4, 0x0c5, 0x0c6, 0x0c7, 0x0c8, 0x0c9, 0x0ca, 0x0cb,
    0x0cc, 0x0cd, 0x0ce, 0x0cf, 0x0d0, 0x0d1, 0x0d2, 0x0d3, 0x0d4, 0x0d5, 0x0d6, 0x0d7,
    0x0d8, 0x0d9, 0x0e2, 0x0e6, 0x0f1, 0x0f2, 0x0f6, 0x0ff, 0x11f, 0x120, 0x121, 0x122,
    0x123, 0x124, 0x125, 0x126, 0x127, 0x128, 0x129, 0x12a, 0x12b, 0x12f, 0x130, 0x131,
    0x132, 0x133, 0x134, 0x135, 0x136, 0x137, 0x138, 0x139, 0x13a, 0x13b, 0x13f, 0x140,
    0x141, 0x142, 0x143, 0x144, 0x145, 0x146, 0x147, 0x148, 0x149, 0x14a, 0x14b, 0x14f,
    0x150, 0x151, 0x152, 0x153, 0x154, 0x155, 0x156, 0x157, 0x158, 0x159, 0x15a, 0x15b,
];

/// Whether `addr` accepts writes. Reserved bits inside a writeable register
/// are written as given.
pub fn is_writeable(addr: u16) -> bool {
    WRITEABLE.binary_search(&addr).is_ok()
}

pub fn is_volatile(addr: u16) -> bool {
    VOLATILE.contains(&addr)
}

pub struct I2cRegisterMap<B: I2cBus> {
    bus: B,
    page: Cell<Option<u8>>,
    cache: [Cell<Option<u8>>; NUM_REGS],
}

impl<B: I2cBus> I2cRegisterMap<B> {
    pub fn new(bus: B) -> Self {
        Self {
            bus,
            page: Cell::new(None),
            cache: core::array::from_fn(|_| Cell::new(None)),
        }
    }

    /// Give back the bus.
    pub fn into_inner(self) -> B {
        self.bus
    }

    /// Forget all cached values, e.g. after the chip was reset behind our back.
    pub fn invalidate_cache(&self) {
        for entry in self.cache.iter() {
            entry.set(None);
        }
        self.page.set(None);
    }

    /// Switch to the page holding `addr` and return the in-page offset.
    fn select_page(&self, addr: u16) -> Result<u8, ErrorCode> {
        let page = (addr >> 8) as u8;
        if self.page.get() != Some(page) {
            // Register 255 is mapped on both pages.
            if let Err(e) = self.bus.write(&[PAGE as u8, page]) {
                self.page.set(None);
                return Err(e);
            }
            self.page.set(Some(page));
            self.cache[PAGE as usize].set(Some(page));
        }
        Ok((addr & 0xff) as u8)
    }
}

impl<B: I2cBus> RegisterMap for I2cRegisterMap<B> {
    fn read(&self, addr: u16) -> Result<u8, ErrorCode> {
        if addr > LAST_REG {
            return Err(ErrorCode::RANGE);
        }
        let volatile = is_volatile(addr);
        if !volatile {
            if let Some(value) = self.cache[addr as usize].get() {
                return Ok(value);
            }
        }

        let offset = self.select_page(addr)?;
        let mut buffer = [0u8; 1];
        self.bus.write_read(&[offset], &mut buffer)?;

        if !volatile {
            self.cache[addr as usize].set(Some(buffer[0]));
        }
        Ok(buffer[0])
    }

    fn write(&self, addr: u16, value: u8) -> Result<(), ErrorCode> {
        if addr > LAST_REG {
            return Err(ErrorCode::RANGE);
        }
        if !is_writeable(addr) {
            return Err(ErrorCode::NOSUPPORT);
        }

        let offset = self.select_page(addr)?;
        if let Err(e) = self.bus.write(&[offset, value]) {
            self.cache[addr as usize].set(None);
            if addr == PAGE {
                self.page.set(None);
            }
            return Err(e);
        }

        if addr == PAGE {
            self.page.set(Some(value & 1));
        }
        if !is_volatile(addr) {
            self.cache[addr as usize].set(Some(value));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::vec::Vec;

    /// Two pages of 256 bytes behind a page register, recording every transfer.
    struct FakeBus {
        mem: RefCell<[[u8; 256]; 2]>,
        page: Cell<usize>,
        transfers: RefCell<Vec<Vec<u8>>>,
        fail: Cell<bool>,
    }

    impl FakeBus {
        fn new() -> Self {
            Self {
                mem: RefCell::new([[0; 256]; 2]),
                page: Cell::new(0),
                transfers: RefCell::new(Vec::new()),
                fail: Cell::new(false),
            }
        }

        fn poke(&self, addr: u16, value: u8) {
            self.mem.borrow_mut()[usize::from(addr >> 8)][usize::from(addr & 0xff)] = value;
        }

        fn peek(&self, addr: u16) -> u8 {
            self.mem.borrow()[usize::from(addr >> 8)][usize::from(addr & 0xff)]
        }

        fn transfers(&self) -> Vec<Vec<u8>> {
            self.transfers.borrow().clone()
        }
    }

    impl I2cBus for &FakeBus {
        fn write(&self, data: &[u8]) -> Result<(), ErrorCode> {
            if self.fail.get() {
                return Err(ErrorCode::IO);
            }
            self.transfers.borrow_mut().push(data.to_vec());
            let offset = usize::from(data[0]);
            if offset == 255 {
                self.page.set(usize::from(data[1] & 1));
            }
            self.mem.borrow_mut()[self.page.get()][offset] = data[1];
            Ok(())
        }

        fn write_read(&self, data: &[u8], buffer: &mut [u8]) -> Result<(), ErrorCode> {
            if self.fail.get() {
                return Err(ErrorCode::IO);
            }
            self.transfers.borrow_mut().push(data.to_vec());
            buffer[0] = self.mem.borrow()[self.page.get()][usize::from(data[0])];
            Ok(())
        }
    }

    #[test]
    fn writeable_table_lookup() {
        assert!(is_writeable(6));
        assert!(is_writeable(0x11f));
        assert!(is_writeable(0x15b));
        assert!(is_writeable(PAGE));
        assert!(!is_writeable(218));
        assert!(!is_writeable(0));
        assert!(!is_writeable(0x15c));
        assert!(WRITEABLE.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn written_fields_are_writeable() {
        use crate::registers::*;

        let mut fields = vec![
            INT_MASK, IN_MUX, IN_MUX1, FB_MUX, FB_MUX1, XTAL_FREQ, PFD_REF, PFD_FB, P1DIV, P2DIV,
            PFD_EXTFB, OUT_ALL_DIS, FCAL_OVRD, REG47_72, PLL_KPHI, FCAL_OVRD_EN,
            VCO_GAIN_RSEL_BWSEL, PLL_EN, MSCAL, MS_PEC, MS_RESET, DIS_LOS, REG241, SOFT_RESET,
        ];
        for channel in 0..4 {
            fields.extend([
                DRV_PDN[channel],
                MS_PDN[channel],
                RDIV[channel],
                RDIV_IN[channel],
                DRV_VDDO[channel],
                DRV_FMT[channel],
                DRV_INV[channel],
                DRV_TRIM[channel],
                OUT_DIS_STATE[channel],
                OUT_DIS[channel],
                MS_HS[channel],
            ]);
        }
        for ms in MS.iter().chain([&MSN]) {
            fields.extend([ms.p1, ms.p2, ms.p3]);
        }
        fields.extend(MISC.iter().map(|&(field, _)| field));

        for field in fields {
            for segment in field.segments() {
                assert!(is_writeable(segment.reg), "register {:#x}", segment.reg);
            }
        }
        for field in [DEV_CONFIG2, STATUS, FCAL] {
            assert!(field.segments().iter().all(|segment| !is_writeable(segment.reg)));
        }
    }

    #[test]
    fn reserved_bits_are_written_as_given() {
        let bus = FakeBus::new();
        bus.poke(6, 0xff);
        let regs = I2cRegisterMap::new(&bus);

        // Register 6 only documents bits 0 and 2..=4, bring-up clears the rest
        regs.update(6, 0xe2, 0).unwrap();
        assert_eq!(bus.peek(6), 0x1d);
        regs.write(0x2f, 0x14).unwrap();
        assert_eq!(bus.peek(0x2f), 0x14);
    }

    #[test]
    fn upper_page_is_selected_once() {
        let bus = FakeBus::new();
        bus.poke(0x100 + 44, 0x5a);
        bus.poke(0x100 + 45, 0xa5);
        let regs = I2cRegisterMap::new(&bus);

        assert_eq!(regs.read(300), Ok(0x5a));
        assert_eq!(regs.read(301), Ok(0xa5));
        assert_eq!(bus.transfers(), vec![vec![255, 1], vec![44], vec![45]]);

        assert_eq!(regs.read(2), Ok(0));
        assert_eq!(bus.transfers()[3], vec![255, 0]);
    }

    #[test]
    fn cached_registers_are_read_once() {
        let bus = FakeBus::new();
        bus.poke(0x1c, 0x12);
        let regs = I2cRegisterMap::new(&bus);

        assert_eq!(regs.read(0x1c), Ok(0x12));
        bus.poke(0x1c, 0x34);
        assert_eq!(regs.read(0x1c), Ok(0x12));

        regs.invalidate_cache();
        assert_eq!(regs.read(0x1c), Ok(0x34));
    }

    #[test]
    fn volatile_registers_always_hit_the_bus() {
        let bus = FakeBus::new();
        let regs = I2cRegisterMap::new(&bus);

        bus.poke(218, 0x11);
        assert_eq!(regs.read(218), Ok(0x11));
        bus.poke(218, 0x00);
        assert_eq!(regs.read(218), Ok(0x00));

        bus.poke(235, 0x42);
        assert_eq!(regs.read(235), Ok(0x42));
    }

    #[test]
    fn writes_are_cached_and_paged() {
        let bus = FakeBus::new();
        let regs = I2cRegisterMap::new(&bus);

        regs.write(0x120, 0x77).unwrap();
        assert_eq!(bus.peek(0x120), 0x77);
        assert_eq!(regs.read(0x120), Ok(0x77));
        assert_eq!(bus.transfers(), vec![vec![255, 1], vec![0x20, 0x77]]);
    }

    #[test]
    fn update_only_touches_masked_bits() {
        let bus = FakeBus::new();
        bus.poke(0x1d, 0b1010_1010);
        let regs = I2cRegisterMap::new(&bus);

        regs.update(0x1d, 0x07, 0x05).unwrap();
        assert_eq!(bus.peek(0x1d), 0b1010_1101);
    }

    #[test]
    fn rejected_accesses() {
        let bus = FakeBus::new();
        let regs = I2cRegisterMap::new(&bus);

        assert_eq!(regs.read(348), Err(ErrorCode::RANGE));
        assert_eq!(regs.write(348, 0), Err(ErrorCode::RANGE));
        assert_eq!(regs.write(218, 0), Err(ErrorCode::NOSUPPORT));
        assert!(bus.transfers().is_empty());
    }

    #[test]
    fn bus_failure_forgets_the_page() {
        let bus = FakeBus::new();
        let regs = I2cRegisterMap::new(&bus);

        assert_eq!(regs.read(300), Ok(0));
        bus.fail.set(true);
        assert_eq!(regs.write(0x1c, 1), Err(ErrorCode::IO));

        bus.fail.set(false);
        regs.write(0x1c, 1).unwrap();
        assert_eq!(bus.transfers().last(), Some(&vec![0x1c, 1]));
        assert_eq!(bus.peek(0x1c), 1);
    }
}
