// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2025.

//! Reading and writing values split over several registers.
//!
//! A [`FieldDescriptor`] lists `(register, mask)` segments, least significant
//! first. Reading a field concatenates the masked bits of each register;
//! writing a field hands each segment the next `popcount(mask)` low bits of the
//! value. Full-register segments are written directly, partial ones with a
//! read-modify-write.
//!
//! A field is not written atomically. If a transfer fails in the middle of a
//! field, the segments already written keep their new value, the error is
//! returned, and no further register is touched.

use crate::errorcode::ErrorCode;
use crate::hil::RegisterMap;
use crate::registers::FieldDescriptor;

/// Read the unsigned value of `field`.
pub fn read_field<M: RegisterMap + ?Sized>(
    regs: &M,
    field: FieldDescriptor,
) -> Result<u64, ErrorCode> {
    let mut value = 0u64;
    let mut position = 0;

    for segment in field.segments() {
        if segment.mask == 0 {
            continue;
        }
        let byte = regs.read(segment.reg)?;
        let bits = (byte & segment.mask) >> segment.shift();
        value |= u64::from(bits) << position;
        position += segment.width();
    }

    Ok(value)
}

/// Write `value` into `field`. Bits of `value` beyond the width of the field
/// are ignored.
pub fn write_field<M: RegisterMap + ?Sized>(
    regs: &M,
    field: FieldDescriptor,
    value: u64,
) -> Result<(), ErrorCode> {
    let mut remaining = value;

    for segment in field.segments() {
        if segment.mask == 0 {
            continue;
        }
        // Bits shifted past the top of the mask are cut off by it.
        let byte = ((remaining & 0xff) as u8) << segment.shift();
        remaining >>= segment.width();

        if segment.mask == 0xff {
            regs.write(segment.reg, byte)?;
        } else {
            regs.update(segment.reg, segment.mask, byte & segment.mask)?;
        }
    }

    Ok(())
}

/// Read a field that holds a flag.
pub fn read_flag<M: RegisterMap + ?Sized>(
    regs: &M,
    field: FieldDescriptor,
) -> Result<bool, ErrorCode> {
    read_field(regs, field).map(|value| value != 0)
}

/// Set or clear a flag field.
pub fn write_flag<M: RegisterMap + ?Sized>(
    regs: &M,
    field: FieldDescriptor,
    set: bool,
) -> Result<(), ErrorCode> {
    write_field(regs, field, u64::from(set))
}
