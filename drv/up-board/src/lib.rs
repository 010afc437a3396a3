// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! UP Board I/O header bring-up.
//!
//! [`Board::bring_up`] takes the header's SoC GPIOs and the CPLD control
//! lines from the SoC GPIO layer, loads the default CPLD configuration and
//! enables the CPLD outputs. The consumers are then built on top of the
//! board's [`UpCpld`]:
//!
//! ```ignore
//! let Board { cpld, header } = Board::bring_up(&soc)?;
//! let pinctrl = header_pinctrl(&cpld)?;
//! let gpio = header_gpio(&pinctrl, &irq_parent, header)?;
//! let leds = header_leds(&cpld);
//! ```
//!
//! Teardown is drop order: the GPIO controller releases any interrupts it
//! started, and dropping the `UpCpld` turns the CPLD outputs off again.

#![cfg_attr(not(test), no_std)]

pub mod tables;

use drv_up_cpld::{BitBang, Cpld, CpldError, Signals};
use drv_up_cpld_api::CpldRegister;
use drv_up_gpio::{GpioError, IrqParent, SocError, SocPin, UpGpio};
use drv_up_leds::UpLeds;
use drv_up_pinctrl::{Pinctrl, PinctrlError};
use embedded_hal::digital::v2::{InputPin, OutputPin};
use num_derive::FromPrimitive;
use ringbuf::*;

use tables::{
    SocGpio, CPLD_CONFIG, CPLD_WIRING, HEADER_GPIOS, HEADER_PINS, LEDS,
    PINS, TABLES,
};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BoardError {
    /// An SoC GPIO could not be acquired.
    Unavailable,
    Gpio(GpioError),
    Cpld(CpldError),
}

impl From<CpldError> for BoardError {
    fn from(e: CpldError) -> Self {
        Self::Cpld(e)
    }
}

impl From<GpioError> for BoardError {
    fn from(e: GpioError) -> Self {
        Self::Gpio(e)
    }
}

impl From<PinctrlError> for BoardError {
    fn from(e: PinctrlError) -> Self {
        Self::Gpio(e.into())
    }
}

impl From<SocError> for BoardError {
    fn from(e: SocError) -> Self {
        Self::Gpio(e.into())
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
enum Trace {
    None,
    Acquire(SocGpio),
    AcquireFailed(SocGpio),
    HeaderReady,
    LoadFailed(CpldError),
    Up(u64),
}

ringbuf!(Trace, 64, Trace::None);

/// The board's LEDs, in [`tables::LEDS`] order.
#[derive(Copy, Clone, Debug, PartialEq, Eq, FromPrimitive)]
pub enum Led {
    Yellow = 0,
    Green = 1,
    Red = 2,
}

impl Led {
    pub fn from_index(index: usize) -> Option<Self> {
        num_traits::FromPrimitive::from_usize(index)
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        LEDS[self.index()].name
    }
}

/// Hands out SoC GPIOs by controller name and offset.
pub trait SocGpioProvider {
    type Pin: SocPin;

    fn acquire(&self, gpio: SocGpio) -> Result<Self::Pin, SocError>;
}

/// An SoC GPIO driving (or sensing) one of the CPLD control lines.
pub struct SocLine<P>(P);

impl<P: SocPin> OutputPin for SocLine<P> {
    type Error = SocError;

    fn set_low(&mut self) -> Result<(), SocError> {
        self.0.write(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), SocError> {
        self.0.write(true);
        Ok(())
    }
}

impl<P: SocPin> InputPin for SocLine<P> {
    type Error = SocError;

    fn is_high(&self) -> Result<bool, SocError> {
        self.0.read()
    }

    fn is_low(&self) -> Result<bool, SocError> {
        self.0.read().map(|v| !v)
    }
}

pub type UpCpld<P> = Cpld<BitBang<SocLine<P>, SocLine<P>>>;

pub struct Board<P: SocPin> {
    pub cpld: UpCpld<P>,
    /// SoC GPIOs behind the header pins, in header order, all inputs.
    pub header: [P; HEADER_PINS],
}

fn acquire<G: SocGpioProvider>(
    soc: &G,
    gpio: SocGpio,
) -> Result<G::Pin, BoardError> {
    ringbuf_entry!(Trace::Acquire(gpio));
    soc.acquire(gpio).map_err(|_| {
        ringbuf_entry!(Trace::AcquireFailed(gpio));
        BoardError::Unavailable
    })
}

fn output<G: SocGpioProvider>(
    soc: &G,
    gpio: SocGpio,
) -> Result<SocLine<G::Pin>, BoardError> {
    let pin = acquire(soc, gpio)?;
    pin.set_output(false)?;
    Ok(SocLine(pin))
}

fn input<G: SocGpioProvider>(
    soc: &G,
    gpio: SocGpio,
) -> Result<SocLine<G::Pin>, BoardError> {
    let pin = acquire(soc, gpio)?;
    pin.set_input()?;
    Ok(SocLine(pin))
}

impl<P: SocPin> Board<P> {
    /// Brings the header up.
    ///
    /// The header GPIOs are made inputs first so nothing is driven into the
    /// CPLD buffers while they are being configured. Then the CPLD control
    /// lines are taken (outputs low), the default configuration is loaded
    /// and verified, and only then are the CPLD outputs enabled. Anything
    /// acquired before a failure is dropped again on the way out.
    pub fn bring_up<G>(soc: &G) -> Result<Self, BoardError>
    where
        G: SocGpioProvider<Pin = P>,
    {
        let header: [P; HEADER_PINS] =
            array_init::try_array_init(|i: usize| {
                let pin = acquire(soc, HEADER_GPIOS[i])?;
                pin.set_input()?;
                Ok::<_, BoardError>(pin)
            })?;
        ringbuf_entry!(Trace::HeaderReady);

        let w = &CPLD_WIRING;
        let strobe = output(soc, w.strobe)?;
        let reset = output(soc, w.reset)?;
        let data_in = output(soc, w.data_in)?;
        let data_out = input(soc, w.data_out)?;
        let output_enable = output(soc, w.output_enable)?;

        let transport = BitBang::new(Signals {
            reset,
            strobe,
            data_in,
            data_out,
            output_enable,
        })?;
        let cpld = Cpld::new(&CPLD_CONFIG, transport).inspect_err(|&e| {
            ringbuf_entry!(Trace::LoadFailed(e));
        })?;
        ringbuf_entry!(Trace::Up(cpld.value()));

        Ok(Self { cpld, header })
    }
}

/// Pin control for the header, over any register.
pub fn header_pinctrl<R: CpldRegister>(
    cpld: &R,
) -> Result<Pinctrl<'_, R, HEADER_PINS>, BoardError> {
    Ok(Pinctrl::new(cpld, PINS, TABLES)?)
}

pub fn header_gpio<'a, R, P, I>(
    pinctrl: &'a Pinctrl<'a, R, HEADER_PINS>,
    irq_parent: &'a I,
    header: [P; HEADER_PINS],
) -> Result<UpGpio<'a, R, P, I, HEADER_PINS>, BoardError>
where
    R: CpldRegister,
    P: SocPin,
    I: IrqParent,
{
    Ok(UpGpio::new(pinctrl, irq_parent, header)?)
}

pub fn header_leds<R: CpldRegister>(cpld: &R) -> UpLeds<'_, R, 3> {
    UpLeds::new(cpld, &LEDS)
}
