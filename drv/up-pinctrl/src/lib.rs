// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Pin control for the UP Board I/O header.
//!
//! Header pins are either driven by an SoC peripheral (UART, I2C, SPI, ...)
//! or used as plain GPIO. Switching between the two means setting the pin's
//! CPLD direction bit to whatever the peripheral needs and, for the few pins
//! that have one, flipping the CPLD mux switch. This crate owns the per-pin
//! table describing those bits and the static group/function tables, and
//! turns "select function F" or "use pin P as GPIO" into CPLD bit updates.

#![cfg_attr(not(test), no_std)]

use drv_up_cpld_api::{CpldBit, CpldError, CpldRegister, PinDirection, PinMux};
use ringbuf::*;
use spin::Mutex;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PinctrlError {
    NoSuchPin,
    NoSuchGroup,
    NoSuchFunction,
    GroupNotInFunction,
    NotSupported,
    Cpld(CpldError),
}

impl From<CpldError> for PinctrlError {
    fn from(e: CpldError) -> Self {
        Self::Cpld(e)
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
enum Trace {
    None,
    Group { function: usize, group: usize },
    PinFunction(u8),
    GpioClaim(u8),
    GpioRelease(u8),
    ReleaseFailed(u8, CpldError),
    Direction(u8, PinDirection),
    NoDirectionControl(u8),
}

ringbuf!(Trace, 32, Trace::None);

/// CPLD parameters for one header pin.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PinDescriptor {
    /// Direction-control bit, if the pin's buffer direction is switchable.
    pub dir_ctrl: Option<CpldBit>,
    /// Mux-control bit, if the pin shares a mux switch.
    pub mux_ctrl: Option<CpldBit>,
    /// Direction to apply when the alternate function is selected.
    pub func_dir: Option<PinDirection>,
    /// Whether the alternate function is currently selected.
    pub func_enabled: bool,
}

impl PinDescriptor {
    /// A pin with both a direction bit and a mux switch.
    pub const fn muxed(dir: u8, mux: u8, func_dir: PinDirection) -> Self {
        Self {
            dir_ctrl: Some(CpldBit(dir)),
            mux_ctrl: Some(CpldBit(mux)),
            func_dir: Some(func_dir),
            func_enabled: false,
        }
    }

    /// A pin with a direction bit only.
    pub const fn direct(dir: u8, func_dir: Option<PinDirection>) -> Self {
        Self {
            dir_ctrl: Some(CpldBit(dir)),
            mux_ctrl: None,
            func_dir,
            func_enabled: false,
        }
    }
}

/// Name of a header pin as seen by pin control consumers.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PinDesc {
    pub number: u8,
    pub name: &'static str,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PinGroup {
    pub name: &'static str,
    pub pins: &'static [u8],
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PinFunction {
    pub name: &'static str,
    pub groups: &'static [&'static str],
}

/// The static description of a header: pin names, groups, and functions.
#[derive(Copy, Clone, Debug)]
pub struct Tables {
    pub descs: &'static [PinDesc],
    pub groups: &'static [PinGroup],
    pub functions: &'static [PinFunction],
}

/// Index of a pin in a [`PinTable`], checked on creation.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct PinId(u8);

impl PinId {
    pub fn index(self) -> usize {
        usize::from(self.0)
    }
}

/// Descriptors for `N` header pins, addressed by [`PinId`].
#[derive(Copy, Clone, Debug)]
pub struct PinTable<const N: usize> {
    pins: [PinDescriptor; N],
}

impl<const N: usize> PinTable<N> {
    pub const fn new(pins: [PinDescriptor; N]) -> Self {
        Self { pins }
    }

    pub fn id(&self, pin: usize) -> Result<PinId, PinctrlError> {
        match u8::try_from(pin) {
            Ok(p) if pin < N => Ok(PinId(p)),
            _ => Err(PinctrlError::NoSuchPin),
        }
    }

    pub fn get(&self, pin: PinId) -> Option<&PinDescriptor> {
        self.pins.get(pin.index())
    }

    fn get_mut(&mut self, pin: PinId) -> Option<&mut PinDescriptor> {
        self.pins.get_mut(pin.index())
    }
}

/// Pin controller for `N` header pins sharing one CPLD register.
pub struct Pinctrl<'a, R: CpldRegister, const N: usize> {
    cpld: &'a R,
    pins: Mutex<PinTable<N>>,
    tables: Tables,
}

impl<'a, R: CpldRegister, const N: usize> Pinctrl<'a, R, N> {
    /// Builds a controller over `pins`, checking that every group only
    /// names pins in the table and every function only names known groups.
    pub fn new(
        cpld: &'a R,
        pins: PinTable<N>,
        tables: Tables,
    ) -> Result<Self, PinctrlError> {
        for d in tables.descs {
            pins.id(usize::from(d.number))?;
        }
        for g in tables.groups {
            for &p in g.pins {
                pins.id(usize::from(p))?;
            }
        }
        for f in tables.functions {
            for name in f.groups {
                if !tables.groups.iter().any(|g| g.name == *name) {
                    return Err(PinctrlError::NoSuchGroup);
                }
            }
        }
        Ok(Self {
            cpld,
            pins: Mutex::new(pins),
            tables,
        })
    }

    pub fn pin_id(&self, pin: usize) -> Result<PinId, PinctrlError> {
        self.pins.lock().id(pin)
    }

    pub fn pin_count(&self) -> usize {
        N
    }

    /// Snapshot of a pin's table entry.
    pub fn descriptor(
        &self,
        pin: PinId,
    ) -> Result<PinDescriptor, PinctrlError> {
        self.pins
            .lock()
            .get(pin)
            .copied()
            .ok_or(PinctrlError::NoSuchPin)
    }

    pub fn pin_name(&self, pin: PinId) -> Option<&'static str> {
        self.tables
            .descs
            .iter()
            .find(|d| d.number == pin.0)
            .map(|d| d.name)
    }

    pub fn groups_count(&self) -> usize {
        self.tables.groups.len()
    }

    pub fn group_name(
        &self,
        group: usize,
    ) -> Result<&'static str, PinctrlError> {
        self.group(group).map(|g| g.name)
    }

    pub fn group_pins(
        &self,
        group: usize,
    ) -> Result<&'static [u8], PinctrlError> {
        self.group(group).map(|g| g.pins)
    }

    pub fn group_by_name(&self, name: &str) -> Result<usize, PinctrlError> {
        self.tables
            .groups
            .iter()
            .position(|g| g.name == name)
            .ok_or(PinctrlError::NoSuchGroup)
    }

    pub fn functions_count(&self) -> usize {
        self.tables.functions.len()
    }

    pub fn function_name(
        &self,
        function: usize,
    ) -> Result<&'static str, PinctrlError> {
        self.function(function).map(|f| f.name)
    }

    pub fn function_groups(
        &self,
        function: usize,
    ) -> Result<&'static [&'static str], PinctrlError> {
        self.function(function).map(|f| f.groups)
    }

    pub fn function_by_name(&self, name: &str) -> Result<usize, PinctrlError> {
        self.tables
            .functions
            .iter()
            .position(|f| f.name == name)
            .ok_or(PinctrlError::NoSuchFunction)
    }

    fn group(&self, group: usize) -> Result<&'static PinGroup, PinctrlError> {
        self.tables.groups.get(group).ok_or(PinctrlError::NoSuchGroup)
    }

    fn function(
        &self,
        function: usize,
    ) -> Result<&'static PinFunction, PinctrlError> {
        self.tables
            .functions
            .get(function)
            .ok_or(PinctrlError::NoSuchFunction)
    }

    /// Routes the pins of `group` to `function`.
    ///
    /// A CPLD failure part way through leaves the pins handled so far
    /// switched over; nothing is rolled back. Selecting the same function
    /// again completes the job.
    pub fn set_mux(
        &self,
        function: usize,
        group: usize,
    ) -> Result<(), PinctrlError> {
        let f = self.function(function)?;
        let g = self.group(group)?;
        if !f.groups.contains(&g.name) {
            return Err(PinctrlError::GroupNotInFunction);
        }
        ringbuf_entry!(Trace::Group { function, group });
        self.apply_group(g)
    }

    /// Routes every group of the named function. Same partial-failure
    /// caveat as [`Pinctrl::set_mux`].
    pub fn select_function(&self, name: &str) -> Result<(), PinctrlError> {
        let function = self.function_by_name(name)?;
        for gname in self.function(function)?.groups {
            let group = self.group_by_name(gname)?;
            ringbuf_entry!(Trace::Group { function, group });
            self.apply_group(self.group(group)?)?;
        }
        Ok(())
    }

    fn apply_group(&self, g: &PinGroup) -> Result<(), PinctrlError> {
        let mut pins = self.pins.lock();
        for &p in g.pins {
            let id = pins.id(usize::from(p))?;
            let pin = pins.get_mut(id).ok_or(PinctrlError::NoSuchPin)?;
            if let (Some(bit), Some(dir)) = (pin.dir_ctrl, pin.func_dir) {
                self.cpld.set_bit(bit, dir.bit())?;
            }
            if let Some(bit) = pin.mux_ctrl {
                self.cpld.set_bit(bit, PinMux::Function.bit())?;
            }
            pin.func_enabled = true;
            ringbuf_entry!(Trace::PinFunction(p));
        }
        Ok(())
    }

    /// Switches a pin's mux (if it has one) over to GPIO.
    pub fn gpio_request_enable(&self, pin: PinId) -> Result<(), PinctrlError> {
        ringbuf_entry!(Trace::GpioClaim(pin.0));
        if let Some(bit) = self.descriptor(pin)?.mux_ctrl {
            self.cpld.set_bit(bit, PinMux::Gpio.bit())?;
        }
        Ok(())
    }

    /// Hands a pin back to its alternate function if one had been
    /// selected. Failures are traced and otherwise ignored; there is no one
    /// to report them to on the release path.
    pub fn gpio_disable_free(&self, pin: PinId) {
        ringbuf_entry!(Trace::GpioRelease(pin.0));
        let pins = self.pins.lock();
        let desc = match pins.get(pin) {
            Some(d) if d.func_enabled => *d,
            _ => return,
        };
        if let (Some(bit), Some(dir)) = (desc.dir_ctrl, desc.func_dir) {
            if let Err(e) = self.cpld.set_bit(bit, dir.bit()) {
                ringbuf_entry!(Trace::ReleaseFailed(pin.0, e));
            }
        }
        if let Some(bit) = desc.mux_ctrl {
            if let Err(e) = self.cpld.set_bit(bit, PinMux::Function.bit()) {
                ringbuf_entry!(Trace::ReleaseFailed(pin.0, e));
            }
        }
    }

    /// Sets the CPLD buffer direction for a pin in GPIO use.
    pub fn gpio_set_direction(
        &self,
        pin: PinId,
        input: bool,
    ) -> Result<(), PinctrlError> {
        let dir = PinDirection::from_input(input);
        match self.descriptor(pin)?.dir_ctrl {
            Some(bit) => {
                ringbuf_entry!(Trace::Direction(pin.0, dir));
                self.cpld.set_bit(bit, dir.bit())?;
            }
            None => ringbuf_entry!(Trace::NoDirectionControl(pin.0)),
        }
        Ok(())
    }

    /// Pin configuration (bias, drive strength, ...) is owned by the SoC
    /// pin controller; the CPLD has nothing to report.
    pub fn pin_config_get(&self, pin: PinId) -> Result<u32, PinctrlError> {
        let _ = pin;
        Err(PinctrlError::NotSupported)
    }

    /// Accepts and ignores configuration for the same reason.
    pub fn pin_config_set(
        &self,
        pin: PinId,
        configs: &[u32],
    ) -> Result<(), PinctrlError> {
        let _ = (pin, configs);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::{Cell, RefCell};
    use proptest::prelude::*;

    /// Register double: applies bits to a model value, remembers every call
    /// that would have shifted, and can be told to fail the n-th one.
    struct Model {
        reg: Cell<u64>,
        shifts: RefCell<Vec<(u8, bool)>>,
        fail_at: Cell<Option<usize>>,
    }

    impl Model {
        fn new(reg: u64) -> Self {
            Self {
                reg: Cell::new(reg),
                shifts: RefCell::new(Vec::new()),
                fail_at: Cell::new(None),
            }
        }

        fn bit(&self, b: u8) -> bool {
            self.reg.get() & (1 << b) != 0
        }
    }

    impl CpldRegister for Model {
        fn set_bit(
            &self,
            offset: CpldBit,
            value: bool,
        ) -> Result<(), CpldError> {
            let old = self.reg.get();
            let new = if value {
                old | offset.mask()
            } else {
                old & !offset.mask()
            };
            if new == old {
                return Ok(());
            }
            let n = self.shifts.borrow().len();
            self.shifts.borrow_mut().push((offset.0, value));
            if self.fail_at.get() == Some(n) {
                return Err(CpldError::VerifyMismatch {
                    expected: new,
                    actual: old,
                });
            }
            self.reg.set(new);
            Ok(())
        }
    }

    const DEFAULT: u64 = 0x0_0fff_ffff;

    const PINS: PinTable<8> = PinTable::new([
        PinDescriptor::muxed(9, 28, PinDirection::Output),
        PinDescriptor::muxed(23, 28, PinDirection::Output),
        PinDescriptor::muxed(0, 29, PinDirection::Output),
        PinDescriptor::muxed(1, 29, PinDirection::Output),
        PinDescriptor::muxed(2, 30, PinDirection::Input),
        PinDescriptor::direct(10, Some(PinDirection::Output)),
        PinDescriptor::direct(11, None),
        PinDescriptor::direct(22, Some(PinDirection::Input)),
    ]);

    const DESCS: &[PinDesc] = &[
        PinDesc { number: 0, name: "I2C0_SDA" },
        PinDesc { number: 1, name: "I2C0_SCL" },
        PinDesc { number: 5, name: "GPIO5" },
    ];

    const GROUPS: &[PinGroup] = &[
        PinGroup { name: "i2c0_grp", pins: &[0, 1] },
        PinGroup { name: "i2c1_grp", pins: &[2, 3] },
        PinGroup { name: "adc0_grp", pins: &[4] },
        PinGroup { name: "gpio5_grp", pins: &[5] },
        PinGroup { name: "mixed_grp", pins: &[6, 7] },
    ];

    const FUNCTIONS: &[PinFunction] = &[
        PinFunction { name: "i2c0", groups: &["i2c0_grp"] },
        PinFunction { name: "i2c1", groups: &["i2c1_grp"] },
        PinFunction { name: "adc0", groups: &["adc0_grp"] },
        PinFunction { name: "aux", groups: &["gpio5_grp"] },
        PinFunction { name: "both", groups: &["i2c0_grp", "i2c1_grp"] },
        PinFunction { name: "mixed", groups: &["mixed_grp"] },
    ];

    const TABLES: Tables = Tables {
        descs: DESCS,
        groups: GROUPS,
        functions: FUNCTIONS,
    };

    fn pinctrl(model: &Model) -> Pinctrl<'_, Model, 8> {
        Pinctrl::new(model, PINS, TABLES).unwrap()
    }

    #[test]
    fn direction_only_pin_sets_no_mux_bit() {
        let model = Model::new(DEFAULT);
        let pc = pinctrl(&model);

        pc.select_function("aux").unwrap();

        assert_eq!(*model.shifts.borrow(), [(10, false)]);
        assert!(!model.bit(10));
        assert!(pc.descriptor(pc.pin_id(5).unwrap()).unwrap().func_enabled);
    }

    #[test]
    fn i2c0_sets_direction_and_mux() {
        let model = Model::new(DEFAULT);
        let pc = pinctrl(&model);

        pc.select_function("i2c0").unwrap();

        assert_eq!(
            *model.shifts.borrow(),
            [(9, false), (28, true), (23, false)]
        );
        assert_eq!(model.reg.get(), DEFAULT & !(1 << 9 | 1 << 23) | 1 << 28);
    }

    #[test]
    fn pin_without_function_direction_only_marks_enabled() {
        let model = Model::new(DEFAULT);
        let pc = pinctrl(&model);
        pc.select_function("mixed").unwrap();
        // Pin 6 has no function direction; pin 7's is already input.
        assert!(model.shifts.borrow().is_empty());
        assert!(pc.descriptor(pc.pin_id(6).unwrap()).unwrap().func_enabled);
        assert!(pc.descriptor(pc.pin_id(7).unwrap()).unwrap().func_enabled);
    }

    #[test]
    fn selecting_twice_is_idempotent() {
        let model = Model::new(DEFAULT);
        let pc = pinctrl(&model);
        pc.select_function("both").unwrap();
        let once = model.reg.get();
        let shifts = model.shifts.borrow().len();
        pc.select_function("both").unwrap();
        assert_eq!(model.reg.get(), once);
        assert_eq!(model.shifts.borrow().len(), shifts);
    }

    #[test]
    fn set_mux_checks_membership() {
        let model = Model::new(DEFAULT);
        let pc = pinctrl(&model);
        let i2c0 = pc.function_by_name("i2c0").unwrap();
        let i2c1_grp = pc.group_by_name("i2c1_grp").unwrap();
        assert_eq!(
            pc.set_mux(i2c0, i2c1_grp),
            Err(PinctrlError::GroupNotInFunction)
        );
        assert!(model.shifts.borrow().is_empty());

        let i2c0_grp = pc.group_by_name("i2c0_grp").unwrap();
        pc.set_mux(i2c0, i2c0_grp).unwrap();
        assert!(model.bit(28));
    }

    #[test]
    fn unknown_names_have_no_effect() {
        let model = Model::new(DEFAULT);
        let pc = pinctrl(&model);
        assert_eq!(
            pc.select_function("uart9"),
            Err(PinctrlError::NoSuchFunction)
        );
        assert_eq!(pc.set_mux(0, 99), Err(PinctrlError::NoSuchGroup));
        assert_eq!(pc.set_mux(99, 0), Err(PinctrlError::NoSuchFunction));
        assert_eq!(pc.pin_id(8), Err(PinctrlError::NoSuchPin));
        assert!(model.shifts.borrow().is_empty());
    }

    #[test]
    fn mid_group_failure_is_not_rolled_back() {
        let model = Model::new(DEFAULT);
        let pc = pinctrl(&model);
        // Fail the third shift: pin 0 is done, pin 1's direction is not.
        model.fail_at.set(Some(2));

        let r = pc.select_function("i2c0");
        assert!(matches!(
            r,
            Err(PinctrlError::Cpld(CpldError::VerifyMismatch { .. }))
        ));
        assert!(!model.bit(9));
        assert!(model.bit(28));
        assert!(model.bit(23));
        assert!(pc.descriptor(pc.pin_id(0).unwrap()).unwrap().func_enabled);
        assert!(!pc.descriptor(pc.pin_id(1).unwrap()).unwrap().func_enabled);

        // Reapplying finishes the job.
        model.fail_at.set(None);
        pc.select_function("i2c0").unwrap();
        assert!(!model.bit(23));
        assert!(pc.descriptor(pc.pin_id(1).unwrap()).unwrap().func_enabled);
    }

    #[test]
    fn gpio_claim_and_release() {
        let model = Model::new(DEFAULT);
        let pc = pinctrl(&model);
        let adc = pc.pin_id(4).unwrap();

        // Never selected as a function: release changes nothing.
        pc.gpio_request_enable(adc).unwrap();
        pc.gpio_set_direction(adc, false).unwrap();
        pc.gpio_disable_free(adc);
        assert!(!model.bit(2));
        assert!(!model.bit(30));

        pc.select_function("adc0").unwrap();
        assert!(model.bit(30));
        pc.gpio_request_enable(adc).unwrap();
        assert!(!model.bit(30));
        pc.gpio_set_direction(adc, false).unwrap();
        assert!(!model.bit(2));

        pc.gpio_disable_free(adc);
        assert!(model.bit(2));
        assert!(model.bit(30));
    }

    #[test]
    fn release_swallows_failures() {
        let model = Model::new(DEFAULT);
        let pc = pinctrl(&model);
        let adc = pc.pin_id(4).unwrap();
        pc.select_function("adc0").unwrap();
        pc.gpio_request_enable(adc).unwrap();
        pc.gpio_set_direction(adc, false).unwrap();

        let n = model.shifts.borrow().len();
        model.fail_at.set(Some(n));
        pc.gpio_disable_free(adc);
        // The direction restore failed but the mux restore was still tried.
        assert!(!model.bit(2));
        assert!(model.bit(30));
    }

    #[test]
    fn unmuxed_gpio_claim_touches_nothing() {
        let model = Model::new(DEFAULT);
        let pc = pinctrl(&model);
        pc.gpio_request_enable(pc.pin_id(5).unwrap()).unwrap();
        assert!(model.shifts.borrow().is_empty());
    }

    #[test]
    fn tables_are_checked() {
        let model = Model::new(DEFAULT);
        const BAD_GROUPS: &[PinGroup] =
            &[PinGroup { name: "far_grp", pins: &[40] }];
        let r = Pinctrl::new(
            &model,
            PINS,
            Tables {
                descs: &[],
                groups: BAD_GROUPS,
                functions: &[],
            },
        );
        assert!(matches!(r, Err(PinctrlError::NoSuchPin)));

        const BAD_FUNCTIONS: &[PinFunction] =
            &[PinFunction { name: "ghost", groups: &["nope_grp"] }];
        let r = Pinctrl::new(
            &model,
            PINS,
            Tables {
                descs: &[],
                groups: GROUPS,
                functions: BAD_FUNCTIONS,
            },
        );
        assert!(matches!(r, Err(PinctrlError::NoSuchGroup)));
    }

    #[test]
    fn introspection() {
        let model = Model::new(DEFAULT);
        let pc = pinctrl(&model);
        assert_eq!(pc.groups_count(), 5);
        assert_eq!(pc.functions_count(), 6);
        assert_eq!(pc.group_name(1), Ok("i2c1_grp"));
        assert_eq!(pc.group_pins(0), Ok(&[0u8, 1][..]));
        assert_eq!(pc.function_name(4), Ok("both"));
        assert_eq!(pc.function_groups(4), Ok(&["i2c0_grp", "i2c1_grp"][..]));
        assert_eq!(pc.pin_name(pc.pin_id(1).unwrap()), Some("I2C0_SCL"));
        assert_eq!(pc.pin_name(pc.pin_id(2).unwrap()), None);
        assert_eq!(pc.pin_count(), 8);
    }

    #[test]
    fn pin_config() {
        let model = Model::new(DEFAULT);
        let pc = pinctrl(&model);
        let p = pc.pin_id(0).unwrap();
        assert_eq!(pc.pin_config_get(p), Err(PinctrlError::NotSupported));
        assert_eq!(pc.pin_config_set(p, &[1, 2, 3]), Ok(()));
    }

    proptest! {
        #[test]
        fn any_selection_sequence_is_idempotent(
            picks in proptest::collection::vec(0..FUNCTIONS.len(), 1..8)
        ) {
            let model = Model::new(DEFAULT);
            let pc = pinctrl(&model);
            for &f in &picks {
                pc.select_function(FUNCTIONS[f].name).unwrap();
            }
            let settled = model.reg.get();
            let last = *picks.last().unwrap();
            pc.select_function(FUNCTIONS[last].name).unwrap();
            prop_assert_eq!(model.reg.get(), settled);
        }
    }
}
