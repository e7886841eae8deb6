// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2025.

//! Interfaces consumed by the Si5338 driver.
//!
//! The driver never touches a bus directly. Instead, it is generic over a
//! [`RegisterMap`], which hides the chip's paging and caching, and over a
//! [`Delay`] used for the fixed waits of the bring-up procedure. A ready-made
//! [`RegisterMap`] for I²C lives in [`crate::regmap`] and only needs an
//! implementation of [`I2cBus`].
//!
//! All operations are synchronous: a call returns once the transfer completed
//! or failed. Callers sharing the bus with other users must hold their own lock
//! across multi-register operations, as intermediate states are observable on
//! the chip.

use crate::errorcode::ErrorCode;

/// Byte-addressed access to the 348 registers of the chip.
///
/// Addresses above 255 live on the second register page. Implementations are
/// responsible for page selection and must bypass any cache for the volatile
/// registers (status, soft reset and calibration readback).
pub trait RegisterMap {
    /// Read the register at `addr`.
    ///
    /// # Errors
    ///
    /// + [Err]\([ErrorCode::IO]\): the transport failed
    /// + [Err]\([ErrorCode::RANGE]\): `addr` is not a register of the chip
    fn read(&self, addr: u16) -> Result<u8, ErrorCode>;

    /// Write the full register at `addr`.
    ///
    /// # Errors
    ///
    /// + [Err]\([ErrorCode::IO]\): the transport failed
    /// + [Err]\([ErrorCode::RANGE]\): `addr` is not a register of the chip
    /// + [Err]\([ErrorCode::NOSUPPORT]\): the register is read-only
    fn write(&self, addr: u16, value: u8) -> Result<(), ErrorCode>;

    /// Replace the bits under `mask` in the register at `addr` with the
    /// corresponding bits of `value`, leaving the other bits untouched.
    fn update(&self, addr: u16, mask: u8, value: u8) -> Result<(), ErrorCode> {
        let old = self.read(addr)?;
        self.write(addr, (old & !mask) | (value & mask))
    }
}

impl<T: RegisterMap + ?Sized> RegisterMap for &T {
    fn read(&self, addr: u16) -> Result<u8, ErrorCode> {
        (**self).read(addr)
    }

    fn write(&self, addr: u16, value: u8) -> Result<(), ErrorCode> {
        (**self).write(addr, value)
    }

    fn update(&self, addr: u16, mask: u8, value: u8) -> Result<(), ErrorCode> {
        (**self).update(addr, mask, value)
    }
}

/// Blocking millisecond delays.
///
/// In a cooperative environment an implementation may yield, but it must not
/// return before the requested time has elapsed.
pub trait Delay {
    /// Wait for at least `ms` milliseconds.
    fn delay_ms(&self, ms: u32);
}

impl<T: Delay + ?Sized> Delay for &T {
    fn delay_ms(&self, ms: u32) {
        (**self).delay_ms(ms)
    }
}

/// A synchronous I²C master already bound to the chip's bus address.
pub trait I2cBus {
    /// Write `data` to the device.
    fn write(&self, data: &[u8]) -> Result<(), ErrorCode>;

    /// Write `data` to the device, then read `buffer.len()` bytes back with a
    /// repeated start.
    fn write_read(&self, data: &[u8], buffer: &mut [u8]) -> Result<(), ErrorCode>;
}
