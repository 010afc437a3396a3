// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! GPIO access to the UP Board I/O header.
//!
//! Each header line is an SoC GPIO seen through a CPLD level shifter. Values
//! go straight to the SoC pin; direction changes go to the SoC pin first and
//! then to the CPLD buffer via [`Pinctrl`]. Interrupts belong to the SoC
//! pin and are passed through unchanged.

#![cfg_attr(not(test), no_std)]

use drv_up_cpld_api::{CpldRegister, PinDirection};
use drv_up_pinctrl::{PinId, Pinctrl, PinctrlError};
use num_derive::FromPrimitive;
use ringbuf::*;
use spin::Mutex;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum GpioError {
    NoSuchPin,
    /// An SoC pin or its interrupt could not be obtained.
    Unavailable,
    /// The SoC GPIO layer reported a failure.
    Soc,
    Pinctrl(PinctrlError),
}

impl From<PinctrlError> for GpioError {
    fn from(e: PinctrlError) -> Self {
        match e {
            PinctrlError::NoSuchPin => Self::NoSuchPin,
            e => Self::Pinctrl(e),
        }
    }
}

impl From<SocError> for GpioError {
    fn from(_: SocError) -> Self {
        Self::Soc
    }
}

/// Failure reported by the SoC GPIO or interrupt layer.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SocError;

/// Interrupt number in the SoC GPIO controller's space.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ParentIrq(pub u32);

/// Trigger types, numbered as the SoC interrupt layer numbers them.
#[derive(Copy, Clone, Debug, PartialEq, Eq, FromPrimitive)]
pub enum IrqTrigger {
    None = 0,
    EdgeRising = 1,
    EdgeFalling = 2,
    EdgeBoth = 3,
    LevelHigh = 4,
    LevelLow = 8,
}

impl IrqTrigger {
    pub fn from_raw(raw: u32) -> Option<Self> {
        num_traits::FromPrimitive::from_u32(raw)
    }
}

/// One SoC GPIO, as handed out by the SoC GPIO layer.
pub trait SocPin {
    fn direction(&self) -> Result<PinDirection, SocError>;
    fn set_input(&self) -> Result<(), SocError>;
    fn set_output(&self, value: bool) -> Result<(), SocError>;
    fn read(&self) -> Result<bool, SocError>;
    fn write(&self, value: bool);
    fn request(&self) -> Result<(), SocError>;
    fn free(&self);
    fn to_irq(&self) -> Option<ParentIrq>;
}

/// The SoC interrupt controller that owns the header pins' interrupts.
pub trait IrqParent {
    fn request(&self, irq: ParentIrq) -> Result<(), SocError>;
    fn free(&self, irq: ParentIrq);
    fn enable(&self, irq: ParentIrq);
    fn disable(&self, irq: ParentIrq);
    fn mask(&self, irq: ParentIrq);
    fn unmask(&self, irq: ParentIrq);
    fn ack(&self, irq: ParentIrq);
    fn set_type(
        &self,
        irq: ParentIrq,
        trigger: IrqTrigger,
    ) -> Result<(), SocError>;
}

#[derive(Copy, Clone, Debug, PartialEq)]
enum Trace {
    None,
    Request(u8),
    RequestFailed(u8, GpioError),
    Free(u8),
    Input(u8),
    Output(u8, bool),
    IrqStartup(u8),
    IrqStartupFailed(u8),
    IrqShutdown(u8),
    SpuriousIrq(u32),
}

ringbuf!(Trace, 32, Trace::None);

/// GPIO controller for the `N` header lines.
pub struct UpGpio<'a, R, S, P, const N: usize>
where
    R: CpldRegister,
    S: SocPin,
    P: IrqParent,
{
    pinctrl: &'a Pinctrl<'a, R, N>,
    irq_parent: &'a P,
    soc: [S; N],
    irqs: [ParentIrq; N],
    started: Mutex<[bool; N]>,
}

impl<'a, R, S, P, const N: usize> UpGpio<'a, R, S, P, N>
where
    R: CpldRegister,
    S: SocPin,
    P: IrqParent,
{
    /// Takes ownership of the SoC pins backing the header lines, in header
    /// order, and maps each one's interrupt.
    pub fn new(
        pinctrl: &'a Pinctrl<'a, R, N>,
        irq_parent: &'a P,
        soc: [S; N],
    ) -> Result<Self, GpioError> {
        let irqs: [ParentIrq; N] = array_init::try_array_init(|i: usize| {
            soc[i].to_irq().ok_or(GpioError::Unavailable)
        })?;
        Ok(Self {
            pinctrl,
            irq_parent,
            soc,
            irqs,
            started: Mutex::new([false; N]),
        })
    }

    pub fn line_count(&self) -> usize {
        N
    }

    fn line(&self, offset: usize) -> Result<(PinId, &S), GpioError> {
        let id = self.pinctrl.pin_id(offset)?;
        let soc = self.soc.get(offset).ok_or(GpioError::NoSuchPin)?;
        Ok((id, soc))
    }

    /// Claims a header line for GPIO use.
    ///
    /// The CPLD buffer is pointed the same way the SoC pin currently is
    /// before the SoC pin itself is requested.
    pub fn request(&self, offset: usize) -> Result<(), GpioError> {
        let (id, soc) = self.line(offset)?;
        ringbuf_entry!(Trace::Request(id.index() as u8));
        self.claim(id, soc).inspect_err(|&e| {
            ringbuf_entry!(Trace::RequestFailed(id.index() as u8, e));
        })
    }

    fn claim(&self, id: PinId, soc: &S) -> Result<(), GpioError> {
        self.pinctrl.gpio_request_enable(id)?;
        let input = soc.direction()? == PinDirection::Input;
        self.pinctrl.gpio_set_direction(id, input)?;
        soc.request()?;
        Ok(())
    }

    /// Releases a header line. The SoC pin is freed first; then the
    /// alternate function, if one had been selected, gets the pin back.
    pub fn free(&self, offset: usize) -> Result<(), GpioError> {
        let (id, soc) = self.line(offset)?;
        ringbuf_entry!(Trace::Free(id.index() as u8));
        soc.free();
        self.pinctrl.gpio_disable_free(id);
        Ok(())
    }

    pub fn get_direction(
        &self,
        offset: usize,
    ) -> Result<PinDirection, GpioError> {
        let (_, soc) = self.line(offset)?;
        Ok(soc.direction()?)
    }

    pub fn direction_input(&self, offset: usize) -> Result<(), GpioError> {
        let (id, soc) = self.line(offset)?;
        ringbuf_entry!(Trace::Input(id.index() as u8));
        soc.set_input()?;
        self.pinctrl.gpio_set_direction(id, true)?;
        Ok(())
    }

    /// Drives a line. The SoC pin is switched (and `value` applied) before
    /// the CPLD buffer is turned around.
    pub fn direction_output(
        &self,
        offset: usize,
        value: bool,
    ) -> Result<(), GpioError> {
        let (id, soc) = self.line(offset)?;
        ringbuf_entry!(Trace::Output(id.index() as u8, value));
        soc.set_output(value)?;
        self.pinctrl.gpio_set_direction(id, false)?;
        Ok(())
    }

    pub fn get(&self, offset: usize) -> Result<bool, GpioError> {
        let (_, soc) = self.line(offset)?;
        Ok(soc.read()?)
    }

    pub fn set(&self, offset: usize, value: bool) -> Result<(), GpioError> {
        let (_, soc) = self.line(offset)?;
        soc.write(value);
        Ok(())
    }

    fn irq(&self, offset: usize) -> Result<ParentIrq, GpioError> {
        self.irqs.get(offset).copied().ok_or(GpioError::NoSuchPin)
    }

    /// Requests the parent interrupt for a header line.
    pub fn irq_startup(&self, offset: usize) -> Result<(), GpioError> {
        let irq = self.irq(offset)?;
        let mut started = self.started.lock();
        if started[offset] {
            return Ok(());
        }
        if let Err(e) = self.irq_parent.request(irq) {
            ringbuf_entry!(Trace::IrqStartupFailed(offset as u8));
            return Err(e.into());
        }
        started[offset] = true;
        ringbuf_entry!(Trace::IrqStartup(offset as u8));
        Ok(())
    }

    /// Frees the parent interrupt for a header line.
    pub fn irq_shutdown(&self, offset: usize) -> Result<(), GpioError> {
        let irq = self.irq(offset)?;
        let mut started = self.started.lock();
        if started[offset] {
            self.irq_parent.free(irq);
            started[offset] = false;
            ringbuf_entry!(Trace::IrqShutdown(offset as u8));
        }
        Ok(())
    }

    pub fn irq_enable(&self, offset: usize) -> Result<(), GpioError> {
        self.irq_parent.enable(self.irq(offset)?);
        Ok(())
    }

    pub fn irq_disable(&self, offset: usize) -> Result<(), GpioError> {
        self.irq_parent.disable(self.irq(offset)?);
        Ok(())
    }

    pub fn irq_mask(&self, offset: usize) -> Result<(), GpioError> {
        self.irq_parent.mask(self.irq(offset)?);
        Ok(())
    }

    pub fn irq_unmask(&self, offset: usize) -> Result<(), GpioError> {
        self.irq_parent.unmask(self.irq(offset)?);
        Ok(())
    }

    pub fn irq_ack(&self, offset: usize) -> Result<(), GpioError> {
        self.irq_parent.ack(self.irq(offset)?);
        Ok(())
    }

    pub fn irq_set_type(
        &self,
        offset: usize,
        trigger: IrqTrigger,
    ) -> Result<(), GpioError> {
        Ok(self.irq_parent.set_type(self.irq(offset)?, trigger)?)
    }

    /// Maps a parent interrupt that fired back to the header line it
    /// belongs to. Only lines whose interrupt has been started match.
    pub fn dispatch(&self, irq: ParentIrq) -> Option<usize> {
        let started = self.started.lock();
        let line = self
            .irqs
            .iter()
            .zip(started.iter())
            .position(|(&i, &on)| on && i == irq);
        if line.is_none() {
            ringbuf_entry!(Trace::SpuriousIrq(irq.0));
        }
        line
    }
}

impl<R, S, P, const N: usize> Drop for UpGpio<'_, R, S, P, N>
where
    R: CpldRegister,
    S: SocPin,
    P: IrqParent,
{
    fn drop(&mut self) {
        let started = self.started.get_mut();
        for (on, &irq) in started.iter_mut().zip(self.irqs.iter()) {
            if *on {
                self.irq_parent.free(irq);
                *on = false;
            }
        }
    }
}
