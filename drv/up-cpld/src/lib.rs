// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Driver for the UP Board I/O header CPLD.
//!
//! The UP Board routes its 40-pin header through buffers and mux switches
//! that translate between the SoC's 1.8V I/O and the 3.3V levels at the
//! header. Those buffers need to know the direction of every GPIO, which
//! mux switches are on, and which LEDs are lit; all of that lives in one
//! configuration register inside a CPLD, loaded over a four-wire serial
//! protocol (see [`transport`]).
//!
//! [`Cpld`] owns both the logical register value and the transport, and is
//! the only thing allowed to touch either. Consumers (pin control, GPIO,
//! LEDs) get a reference to it at construction and go through
//! [`CpldRegister::set_bit`].
//!
//! To use this driver,
//!
//! 1. Wire up a [`transport::Signals`] and wrap it in a [`BitBang`].
//! 2. Call [`Cpld::new`] with a [`Config`]. This loads the initial value and
//!    only then enables the CPLD outputs.
//! 3. Hand `&Cpld` to the consumers.
//!
//! Dropping the `Cpld` disables the CPLD outputs again.

#![cfg_attr(not(test), no_std)]

pub mod transport;

pub use drv_up_cpld_api::{CpldBit, CpldError, CpldRegister};
pub use transport::{BitBang, Signals, Transport};

use drv_up_cpld_api::MAX_REGISTER_WIDTH;
use ringbuf::*;
use spin::Mutex;

/// Register parameters for a particular board.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// Number of bits in the CPLD configuration register.
    pub width: u8,
    /// Value loaded at construction. Bits above `width` are ignored.
    pub initial: u64,
}

#[derive(Copy, Clone, Debug, PartialEq)]
enum Trace {
    None,
    Loaded(u64),
    SetBit { offset: u8, value: bool },
    Unchanged,
    Updated(u64),
    UpdateFailed(CpldError),
    OutputsEnabled,
    OutputEnableFailed { enabled: bool, err: CpldError },
    OutputsDisabled,
}

ringbuf!(Trace, 32, Trace::None);

// Output-enable transitions only, kept apart from register traffic.
ringbuf!(OUTPUTS, Trace, 16, Trace::None);

fn output_enable<T: Transport>(
    transport: &mut T,
    enabled: bool,
) -> Result<(), CpldError> {
    transport.set_output_enable(enabled).inspect_err(|&err| {
        ringbuf_entry!(OUTPUTS, Trace::OutputEnableFailed { enabled, err });
    })
}

struct Inner<T> {
    reg: u64,
    transport: T,
}

/// The shared CPLD configuration register.
pub struct Cpld<T: Transport> {
    width: u8,
    inner: Mutex<Inner<T>>,
}

const fn width_mask(width: u8) -> u64 {
    if width >= 64 {
        !0
    } else {
        (1u64 << width) - 1
    }
}

impl<T: Transport> Cpld<T> {
    /// Loads `config.initial` into the CPLD and, once it has been verified,
    /// enables the CPLD outputs.
    ///
    /// If the initial load fails the outputs are left disabled and the
    /// transport is dropped.
    pub fn new(config: &Config, mut transport: T) -> Result<Self, CpldError> {
        if config.width == 0 || config.width > MAX_REGISTER_WIDTH {
            return Err(CpldError::BadWidth(config.width));
        }
        let reg = config.initial & width_mask(config.width);

        output_enable(&mut transport, false)?;
        if let Err(e) = transport.update(reg, config.width) {
            ringbuf_entry!(Trace::UpdateFailed(e));
            return Err(e);
        }
        output_enable(&mut transport, true)?;
        ringbuf_entry!(OUTPUTS, Trace::OutputsEnabled);
        ringbuf_entry!(Trace::Loaded(reg));

        Ok(Self {
            width: config.width,
            inner: Mutex::new(Inner { reg, transport }),
        })
    }

    pub fn width(&self) -> u8 {
        self.width
    }

    /// The register value as last successfully written.
    pub fn value(&self) -> u64 {
        self.inner.lock().reg
    }

    /// Pushes the current logical value to the hardware again.
    ///
    /// After a failed update the hardware state is indeterminate; this is
    /// the way back to a known state. Nothing calls it automatically.
    pub fn resync(&self) -> Result<(), CpldError> {
        let mut inner = self.inner.lock();
        let reg = inner.reg;
        inner.transport.update(reg, self.width).inspect_err(|&e| {
            ringbuf_entry!(Trace::UpdateFailed(e));
        })
    }
}

impl<T: Transport> CpldRegister for Cpld<T> {
    fn set_bit(&self, offset: CpldBit, value: bool) -> Result<(), CpldError> {
        if offset.0 >= self.width {
            return Err(CpldError::OffsetOutOfRange(offset.0));
        }
        ringbuf_entry!(Trace::SetBit {
            offset: offset.0,
            value
        });

        // The lock is held across the whole shift; the protocol is not
        // re-entrant and a second writer would corrupt the register.
        let mut inner = self.inner.lock();
        let next = if value {
            inner.reg | offset.mask()
        } else {
            inner.reg & !offset.mask()
        };

        if next == inner.reg {
            ringbuf_entry!(Trace::Unchanged);
            return Ok(());
        }

        match inner.transport.update(next, self.width) {
            Ok(()) => {
                inner.reg = next;
                ringbuf_entry!(Trace::Updated(next));
                Ok(())
            }
            Err(e) => {
                ringbuf_entry!(Trace::UpdateFailed(e));
                Err(e)
            }
        }
    }
}

impl<T: Transport> Drop for Cpld<T> {
    fn drop(&mut self) {
        // Nothing more to do with a failure on the way out; it is traced.
        if output_enable(&mut self.inner.get_mut().transport, false).is_ok() {
            ringbuf_entry!(OUTPUTS, Trace::OutputsDisabled);
        }
    }
}
