// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Host-side model of the UP Board I/O header CPLD.
//!
//! The model reacts to the five control lines the same way the real part
//! does: holding RESET low clears its internal counters, the first `width`
//! rising edges of STROBE shift DATA_IN into the register MSB-first, the next
//! `width` rising edges present the shifted value on DATA_OUT MSB-first, and
//! one more rising edge latches the value into effect.
//!
//! Lines are handed out as [`SimLine`]s implementing the `embedded-hal`
//! digital traits, so the real bit-bang transport can be pointed at them.

use embedded_hal::digital::v2::{InputPin, OutputPin};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Line {
    Reset,
    Strobe,
    DataIn,
    DataOut,
    OutputEnable,
}

/// Error returned by a [`SimLine`] that has had a fault injected.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct LineFault(pub Line);

#[derive(Debug)]
pub struct SimCpld {
    width: u8,
    reset: bool,
    strobe: bool,
    data_in: bool,
    data_out: bool,
    output_enable: bool,

    edges: u32,
    shift: u64,
    latched: u64,
    latches: u32,
    cycles: u32,
    samples: Vec<bool>,

    stuck: Option<(u8, bool)>,
    faulty: Option<Line>,
}

impl SimCpld {
    fn mask(&self) -> u64 {
        if self.width >= 64 {
            !0
        } else {
            (1u64 << self.width) - 1
        }
    }

    fn readback(&self) -> u64 {
        match self.stuck {
            Some((bit, true)) => self.shift | (1 << bit),
            Some((bit, false)) => self.shift & !(1 << bit),
            None => self.shift,
        }
    }

    fn drive(&mut self, line: Line, level: bool) -> Result<(), LineFault> {
        if self.faulty == Some(line) {
            return Err(LineFault(line));
        }
        match line {
            Line::Reset => {
                if !level {
                    self.edges = 0;
                    self.shift = 0;
                    self.samples.clear();
                } else if !self.reset {
                    self.cycles += 1;
                }
                self.reset = level;
            }
            Line::Strobe => {
                let rising = level && !self.strobe;
                self.strobe = level;
                if rising && self.reset {
                    self.clock();
                }
            }
            Line::DataIn => self.data_in = level,
            Line::OutputEnable => self.output_enable = level,
            Line::DataOut => {}
        }
        Ok(())
    }

    fn clock(&mut self) {
        let width = u32::from(self.width);
        self.edges += 1;
        let k = self.edges;
        if k <= width {
            self.shift =
                ((self.shift << 1) | u64::from(self.data_in)) & self.mask();
            self.samples.push(self.data_in);
        } else if k <= 2 * width {
            let bit = 2 * width - k;
            self.data_out = (self.readback() >> bit) & 1 != 0;
        } else if k == 2 * width + 1 {
            self.latched = self.shift;
            self.latches += 1;
        }
    }

    fn sample(&self, line: Line) -> Result<bool, LineFault> {
        if self.faulty == Some(line) {
            return Err(LineFault(line));
        }
        Ok(match line {
            Line::Reset => self.reset,
            Line::Strobe => self.strobe,
            Line::DataIn => self.data_in,
            Line::DataOut => self.data_out,
            Line::OutputEnable => self.output_enable,
        })
    }
}

/// Shared handle onto a simulated CPLD.
#[derive(Clone, Debug)]
pub struct SimHandle(Arc<Mutex<SimCpld>>);

impl SimHandle {
    pub fn new(width: u8) -> Self {
        Self(Arc::new(Mutex::new(SimCpld {
            width,
            reset: false,
            strobe: false,
            data_in: false,
            data_out: false,
            output_enable: false,
            edges: 0,
            shift: 0,
            latched: 0,
            latches: 0,
            cycles: 0,
            samples: Vec::new(),
            stuck: None,
            faulty: None,
        })))
    }

    fn state(&self) -> MutexGuard<'_, SimCpld> {
        // A panicking test thread poisons the lock; the model state is still
        // usable for the remaining assertions.
        self.0.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn line(&self, line: Line) -> SimLine {
        SimLine {
            sim: self.clone(),
            line,
        }
    }

    pub fn lines(&self) -> SimLines {
        SimLines {
            reset: self.line(Line::Reset),
            strobe: self.line(Line::Strobe),
            data_in: self.line(Line::DataIn),
            data_out: self.line(Line::DataOut),
            output_enable: self.line(Line::OutputEnable),
        }
    }

    pub fn drive(&self, line: Line, level: bool) -> Result<(), LineFault> {
        self.state().drive(line, level)
    }

    pub fn sample(&self, line: Line) -> Result<bool, LineFault> {
        self.state().sample(line)
    }

    /// The configuration currently latched into effect.
    pub fn latched(&self) -> u64 {
        self.state().latched
    }

    /// Number of latch pulses seen.
    pub fn latches(&self) -> u32 {
        self.state().latches
    }

    /// Number of complete reset pulses, i.e. shift cycles started.
    pub fn cycles(&self) -> u32 {
        self.state().cycles
    }

    /// DATA_IN levels sampled on each write-phase strobe since the last
    /// reset, in the order they were clocked in.
    pub fn samples(&self) -> Vec<bool> {
        self.state().samples.clone()
    }

    pub fn outputs_enabled(&self) -> bool {
        self.state().output_enable
    }

    /// Forces one bit of the readback to a fixed level.
    pub fn set_stuck_bit(&self, stuck: Option<(u8, bool)>) {
        self.state().stuck = stuck;
    }

    /// Makes every access to `line` fail.
    pub fn set_faulty_line(&self, line: Option<Line>) {
        self.state().faulty = line;
    }
}

/// One control line of a [`SimHandle`].
#[derive(Clone, Debug)]
pub struct SimLine {
    sim: SimHandle,
    line: Line,
}

impl SimLine {
    pub fn which(&self) -> Line {
        self.line
    }
}

impl OutputPin for SimLine {
    type Error = LineFault;

    fn set_low(&mut self) -> Result<(), LineFault> {
        self.sim.drive(self.line, false)
    }

    fn set_high(&mut self) -> Result<(), LineFault> {
        self.sim.drive(self.line, true)
    }
}

impl InputPin for SimLine {
    type Error = LineFault;

    fn is_high(&self) -> Result<bool, LineFault> {
        self.sim.sample(self.line)
    }

    fn is_low(&self) -> Result<bool, LineFault> {
        self.sim.sample(self.line).map(|v| !v)
    }
}

/// The five lines of a simulated CPLD, ready to be wired to a transport.
#[derive(Debug)]
pub struct SimLines {
    pub reset: SimLine,
    pub strobe: SimLine,
    pub data_in: SimLine,
    pub data_out: SimLine,
    pub output_enable: SimLine,
}
