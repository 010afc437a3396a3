// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! API crate for the UP Board I/O header CPLD.
//!
//! The CPLD holds a single configuration register that controls header pin
//! direction, the I2C/ADC mux switches, and three LEDs. Everything that wants
//! to change that register goes through [`CpldRegister::set_bit`]; this crate
//! holds the vocabulary shared by the register store and its consumers.

#![cfg_attr(not(test), no_std)]

use num_derive::FromPrimitive;

/// Widest register the store can represent.
pub const MAX_REGISTER_WIDTH: u8 = 64;

/// A bit offset within the CPLD configuration register.
///
/// Offsets are only range-checked against the register width at the point of
/// use, since the width is a property of the store and not of the offset.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CpldBit(pub u8);

impl CpldBit {
    /// Single-bit mask for this offset, or 0 if it cannot fit in a `u64`.
    pub const fn mask(self) -> u64 {
        match 1u64.checked_shl(self.0 as u32) {
            Some(m) => m,
            None => 0,
        }
    }
}

impl From<u8> for CpldBit {
    fn from(offset: u8) -> Self {
        Self(offset)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CpldError {
    /// The value clocked back out of the CPLD did not match what was shifted
    /// in. The hardware state is indeterminate; the store kept `expected` out
    /// of its logical value.
    VerifyMismatch { expected: u64, actual: u64 },
    /// One of the control lines reported an error while being driven or
    /// sampled.
    SignalLine,
    /// The requested offset is outside the configured register width.
    OffsetOutOfRange(u8),
    /// A register width of zero or more than [`MAX_REGISTER_WIDTH`] bits.
    BadWidth(u8),
}

/// The one operation through which every consumer mutates the CPLD register.
///
/// Implementations must fully serialize calls: the register is a single
/// indivisible resource, and a call for one bit must never observe a
/// partially applied call for another.
pub trait CpldRegister {
    /// Sets bit `offset` to `value` and makes the hardware match.
    ///
    /// If the bit already holds `value` no hardware cycle is performed.
    fn set_bit(&self, offset: CpldBit, value: bool) -> Result<(), CpldError>;
}

impl<R: CpldRegister + ?Sized> CpldRegister for &R {
    fn set_bit(&self, offset: CpldBit, value: bool) -> Result<(), CpldError> {
        (**self).set_bit(offset, value)
    }
}

/// Direction of a header pin, as encoded in its CPLD direction-control bit.
#[derive(Copy, Clone, Debug, PartialEq, Eq, FromPrimitive)]
#[repr(u8)]
pub enum PinDirection {
    Output = 0,
    Input = 1,
}

impl PinDirection {
    pub const fn from_input(input: bool) -> Self {
        if input {
            PinDirection::Input
        } else {
            PinDirection::Output
        }
    }

    pub const fn bit(self) -> bool {
        matches!(self, PinDirection::Input)
    }
}

/// Mux selection for pins that share a header position with an alternate
/// function, as encoded in the CPLD mux-control bit.
#[derive(Copy, Clone, Debug, PartialEq, Eq, FromPrimitive)]
#[repr(u8)]
pub enum PinMux {
    Gpio = 0,
    Function = 1,
}

impl PinMux {
    pub const fn bit(self) -> bool {
        matches!(self, PinMux::Function)
    }
}
