// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! LEDs hanging off the UP Board CPLD. Each one is a single register bit;
//! there is no dimming.

#![cfg_attr(not(test), no_std)]

use drv_up_cpld_api::{CpldBit, CpldError, CpldRegister};
use ringbuf::*;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LedError {
    NoSuchLed,
    Cpld(CpldError),
}

impl From<CpldError> for LedError {
    fn from(e: CpldError) -> Self {
        Self::Cpld(e)
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
enum Trace {
    None,
    Brightness(u8, bool),
    Failed(u8, CpldError),
}

ringbuf!(Trace, 16, Trace::None);

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct LedConfig {
    pub name: &'static str,
    pub offset: CpldBit,
}

pub struct UpLed<'a, R: CpldRegister> {
    cpld: &'a R,
    config: LedConfig,
}

impl<'a, R: CpldRegister> UpLed<'a, R> {
    pub fn new(cpld: &'a R, config: LedConfig) -> Self {
        Self { cpld, config }
    }

    pub fn name(&self) -> &'static str {
        self.config.name
    }

    pub fn max_brightness(&self) -> u8 {
        1
    }

    pub fn set(&self, on: bool) -> Result<(), LedError> {
        ringbuf_entry!(Trace::Brightness(self.config.offset.0, on));
        self.cpld.set_bit(self.config.offset, on)?;
        Ok(())
    }

    /// Any non-zero level is "on". Failures are traced and dropped, as a
    /// brightness change has nobody to report to.
    pub fn brightness_set(&self, level: u8) {
        if let Err(LedError::Cpld(e)) = self.set(level != 0) {
            ringbuf_entry!(Trace::Failed(self.config.offset.0, e));
        }
    }
}

/// A board's full set of CPLD LEDs.
pub struct UpLeds<'a, R: CpldRegister, const N: usize> {
    leds: [UpLed<'a, R>; N],
}

impl<'a, R: CpldRegister, const N: usize> UpLeds<'a, R, N> {
    pub fn new(cpld: &'a R, configs: &[LedConfig; N]) -> Self {
        Self {
            leds: array_init::array_init(|i| UpLed::new(cpld, configs[i])),
        }
    }

    pub fn get(&self, index: usize) -> Result<&UpLed<'a, R>, LedError> {
        self.leds.get(index).ok_or(LedError::NoSuchLed)
    }

    pub fn by_name(&self, name: &str) -> Result<&UpLed<'a, R>, LedError> {
        self.leds
            .iter()
            .find(|l| l.name() == name)
            .ok_or(LedError::NoSuchLed)
    }

    pub fn iter(&self) -> impl Iterator<Item = &UpLed<'a, R>> {
        self.leds.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::{Cell, RefCell};

    #[derive(Default)]
    struct Reg {
        value: Cell<u64>,
        calls: RefCell<Vec<(u8, bool)>>,
        fail: Cell<bool>,
    }

    impl CpldRegister for Reg {
        fn set_bit(
            &self,
            offset: CpldBit,
            value: bool,
        ) -> Result<(), CpldError> {
            self.calls.borrow_mut().push((offset.0, value));
            if self.fail.get() {
                return Err(CpldError::VerifyMismatch {
                    expected: 1,
                    actual: 0,
                });
            }
            let v = self.value.get();
            self.value.set(if value {
                v | offset.mask()
            } else {
                v & !offset.mask()
            });
            Ok(())
        }
    }

    const LEDS: [LedConfig; 3] = [
        LedConfig {
            name: "upboard:yellow:",
            offset: CpldBit(31),
        },
        LedConfig {
            name: "upboard:green:",
            offset: CpldBit(32),
        },
        LedConfig {
            name: "upboard:red:",
            offset: CpldBit(33),
        },
    ];

    #[test]
    fn any_nonzero_level_is_on() {
        let reg = Reg::default();
        let leds = UpLeds::new(&reg, &LEDS);
        let green = leds.by_name("upboard:green:").unwrap();

        green.brightness_set(200);
        assert_eq!(reg.value.get(), 1 << 32);
        green.brightness_set(1);
        assert_eq!(reg.value.get(), 1 << 32);
        green.brightness_set(0);
        assert_eq!(reg.value.get(), 0);
        assert_eq!(*reg.calls.borrow(), [(32, true), (32, true), (32, false)]);
    }

    #[test]
    fn each_led_owns_one_bit() {
        let reg = Reg::default();
        let leds = UpLeds::new(&reg, &LEDS);
        for led in leds.iter() {
            led.set(true).unwrap();
        }
        assert_eq!(reg.value.get(), 0b111 << 31);
        leds.get(0).unwrap().set(false).unwrap();
        assert_eq!(reg.value.get(), 0b110 << 31);
    }

    #[test]
    fn failures_are_swallowed_by_brightness_set() {
        let reg = Reg::default();
        let leds = UpLeds::new(&reg, &LEDS);
        reg.fail.set(true);
        let red = leds.get(2).unwrap();
        red.brightness_set(1);
        assert_eq!(reg.value.get(), 0);
        assert!(matches!(red.set(true), Err(LedError::Cpld(_))));
    }

    #[test]
    fn lookup() {
        let reg = Reg::default();
        let leds = UpLeds::new(&reg, &LEDS);
        assert_eq!(leds.get(1).unwrap().name(), "upboard:green:");
        assert_eq!(leds.get(1).unwrap().max_brightness(), 1);
        assert!(matches!(leds.get(3), Err(LedError::NoSuchLed)));
        assert!(matches!(
            leds.by_name("upboard:blue:"),
            Err(LedError::NoSuchLed)
        ));
    }
}
