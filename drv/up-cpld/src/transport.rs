// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Bit-serial transport for the CPLD configuration register.
//!
//! The CPLD has no addressable-bit interface: every update clocks the whole
//! register in through DATA_IN, clocks it straight back out through DATA_OUT
//! for verification, and then takes one more STROBE edge to latch it.

use drv_up_cpld_api::CpldError;
use embedded_hal::digital::v2::{InputPin, OutputPin};
use ringbuf::*;

#[derive(Copy, Clone, Debug, PartialEq)]
enum Trace {
    None,
    Shift { value: u64, width: u8 },
    Mismatch { expected: u64, actual: u64 },
    LineFault,
    OutputEnable(bool),
}

ringbuf!(Trace, 16, Trace::None);

/// Anything that can push a full register value into the CPLD.
pub trait Transport {
    /// Shifts the low `width` bits of `value` into the CPLD, reads them back,
    /// and latches them if (and only if) the readback matches.
    fn update(&mut self, value: u64, width: u8) -> Result<(), CpldError>;

    /// Drives the CPLD output-enable line.
    fn set_output_enable(&mut self, enabled: bool) -> Result<(), CpldError>;
}

/// The control lines wired from the SoC to the CPLD.
pub struct Signals<O, I> {
    /// Active-low reset of the CPLD shift counters.
    pub reset: O,
    /// Shift clock; DATA_IN is sampled and DATA_OUT updated on rising edges.
    pub strobe: O,
    pub data_in: O,
    pub data_out: I,
    /// Enables the CPLD's header-side buffers.
    pub output_enable: O,
}

/// Drives the CPLD protocol by toggling GPIO lines directly.
pub struct BitBang<O, I> {
    signals: Signals<O, I>,
}

fn drive<O: OutputPin>(line: &mut O, high: bool) -> Result<(), CpldError> {
    let r = if high { line.set_high() } else { line.set_low() };
    r.map_err(|_| {
        ringbuf_entry!(Trace::LineFault);
        CpldError::SignalLine
    })
}

impl<O: OutputPin, I: InputPin> BitBang<O, I> {
    /// Takes ownership of the control lines and parks every output low, with
    /// the CPLD outputs disabled.
    pub fn new(mut signals: Signals<O, I>) -> Result<Self, CpldError> {
        drive(&mut signals.output_enable, false)?;
        drive(&mut signals.reset, false)?;
        drive(&mut signals.strobe, false)?;
        drive(&mut signals.data_in, false)?;
        Ok(Self { signals })
    }

    /// Gives the control lines back.
    pub fn release(self) -> Signals<O, I> {
        self.signals
    }

    fn pulse_strobe(&mut self) -> Result<(), CpldError> {
        drive(&mut self.signals.strobe, false)?;
        drive(&mut self.signals.strobe, true)
    }
}

impl<O: OutputPin, I: InputPin> Transport for BitBang<O, I> {
    fn update(&mut self, value: u64, width: u8) -> Result<(), CpldError> {
        ringbuf_entry!(Trace::Shift { value, width });

        // Clear the CPLD's internal counters.
        drive(&mut self.signals.reset, false)?;
        drive(&mut self.signals.reset, true)?;

        // DATA_IN is sampled on each rising edge of STROBE, MSB first.
        for i in (0..width).rev() {
            drive(&mut self.signals.strobe, false)?;
            drive(&mut self.signals.data_in, (value >> i) & 1 != 0)?;
            drive(&mut self.signals.strobe, true)?;
        }

        // DATA_OUT is updated on each rising edge of STROBE, MSB first.
        let mut actual = 0u64;
        for i in (0..width).rev() {
            self.pulse_strobe()?;
            let bit = self.signals.data_out.is_high().map_err(|_| {
                ringbuf_entry!(Trace::LineFault);
                CpldError::SignalLine
            })?;
            actual |= u64::from(bit) << i;
        }

        if actual != value {
            ringbuf_entry!(Trace::Mismatch {
                expected: value,
                actual
            });
            return Err(CpldError::VerifyMismatch {
                expected: value,
                actual,
            });
        }

        // One more strobe latches the new configuration.
        self.pulse_strobe()
    }

    fn set_output_enable(&mut self, enabled: bool) -> Result<(), CpldError> {
        ringbuf_entry!(Trace::OutputEnable(enabled));
        drive(&mut self.signals.output_enable, enabled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drv_mock_up_cpld::{Line, SimHandle, SimLine};

    fn bitbang(sim: &SimHandle) -> BitBang<SimLine, SimLine> {
        let l = sim.lines();
        BitBang::new(Signals {
            reset: l.reset,
            strobe: l.strobe,
            data_in: l.data_in,
            data_out: l.data_out,
            output_enable: l.output_enable,
        })
        .unwrap()
    }

    #[test]
    fn shifts_width_bits_msb_first() {
        let sim = SimHandle::new(34);
        let mut bb = bitbang(&sim);
        let value = 0x2_8000_0001u64;

        bb.update(value, 34).unwrap();

        let expected: Vec<bool> =
            (0..34).rev().map(|i| (value >> i) & 1 != 0).collect();
        let samples = sim.samples();
        assert_eq!(samples.len(), 34);
        assert_eq!(samples, expected);
        // MSB (bit 33) goes first, LSB last.
        assert!(samples[0]);
        assert!(!samples[1]);
        assert!(samples[33]);
        assert_eq!(sim.latched(), value);
    }

    #[test]
    fn asymmetric_pattern_catches_bit_order() {
        let sim = SimHandle::new(34);
        let mut bb = bitbang(&sim);
        // Only bit 0 set; a reversed shift would deliver it first.
        bb.update(1, 34).unwrap();
        let samples = sim.samples();
        assert_eq!(samples.iter().filter(|b| **b).count(), 1);
        assert_eq!(samples.last(), Some(&true));
    }

    #[test]
    fn mismatch_is_not_latched() {
        let sim = SimHandle::new(34);
        let mut bb = bitbang(&sim);
        bb.update(0x0_0fff_ffff, 34).unwrap();
        assert_eq!(sim.latches(), 1);

        sim.set_stuck_bit(Some((33, true)));
        assert_eq!(
            bb.update(0x0_0fff_fffe, 34),
            Err(CpldError::VerifyMismatch {
                expected: 0x0_0fff_fffe,
                actual: 0x2_0fff_fffe,
            })
        );
        assert_eq!(sim.latches(), 1);
        assert_eq!(sim.latched(), 0x0_0fff_ffff);
    }

    #[test]
    fn new_parks_lines_low() {
        let sim = SimHandle::new(34);
        sim.drive(Line::OutputEnable, true).unwrap();
        let mut bb = bitbang(&sim);
        assert!(!sim.outputs_enabled());
        bb.set_output_enable(true).unwrap();
        assert!(sim.outputs_enabled());
    }

    #[test]
    fn line_fault_is_reported() {
        let sim = SimHandle::new(34);
        let mut bb = bitbang(&sim);
        sim.set_faulty_line(Some(Line::DataOut));
        assert_eq!(bb.update(5, 34), Err(CpldError::SignalLine));
    }
}
