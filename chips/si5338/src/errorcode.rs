// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2025.

//! Standard error enum for the Si5338 driver

use core::fmt;

/// Errors reported by the Si5338 driver.
///
/// Arithmetic corner cases of the divider math (zero fractions, out of range
/// dividers) are not errors: they are corrected and logged where they occur.
/// [`ErrorCode::DEGENERATE`] only escapes from
/// [`remove_common_factor`](crate::synth::remove_common_factor).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[allow(non_camel_case_types)]
pub enum ErrorCode {
    /// The register transport failed
    IO,
    /// A rate or parameter is outside the range the chip accepts
    RANGE,
    /// An enumerated choice is outside the valid set for that node
    INVALID_SELECTOR,
    /// Polling the status register ran out of attempts
    TIMEOUT {
        /// Last value read from the status register
        status: u8,
    },
    /// A fraction with a zero denominator
    DEGENERATE,
    /// The operation is not supported by this clock node or register
    NOSUPPORT,
    /// The clock node is not prepared
    OFF,
    /// The device did not identify itself as an Si5338
    NODEVICE,
}

impl From<ErrorCode> for usize {
    fn from(err: ErrorCode) -> usize {
        match err {
            ErrorCode::IO => 1,
            ErrorCode::RANGE => 2,
            ErrorCode::INVALID_SELECTOR => 3,
            ErrorCode::TIMEOUT { .. } => 4,
            ErrorCode::DEGENERATE => 5,
            ErrorCode::NOSUPPORT => 6,
            ErrorCode::OFF => 7,
            ErrorCode::NODEVICE => 8,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCode::IO => f.write_str("register access failed"),
            ErrorCode::RANGE => f.write_str("value out of range"),
            ErrorCode::INVALID_SELECTOR => f.write_str("invalid selector"),
            ErrorCode::TIMEOUT { status } => {
                write!(f, "timeout, last status 0x{:02x}", status)
            }
            ErrorCode::DEGENERATE => f.write_str("zero denominator"),
            ErrorCode::NOSUPPORT => f.write_str("operation not supported"),
            ErrorCode::OFF => f.write_str("clock not prepared"),
            ErrorCode::NODEVICE => f.write_str("no Si5338 found"),
        }
    }
}
