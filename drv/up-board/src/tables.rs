// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Wiring of the UP Board (UP-CHT01) I/O header.

use drv_up_cpld::Config;
use drv_up_cpld_api::{CpldBit, PinDirection};
use drv_up_leds::LedConfig;
use drv_up_pinctrl::{
    PinDesc, PinDescriptor, PinFunction, PinGroup, PinTable, Tables,
};
use static_assertions::const_assert;

use drv_up_cpld_api::PinDirection::{Input as IN, Output as OUT};

pub const HEADER_PINS: usize = 28;

pub const CPLD_CONFIG: Config = Config {
    width: 34,
    // Every header buffer pointed at the SoC, mux switches on GPIO, LEDs off.
    initial: 0x0_0fff_ffff,
};

/// An SoC GPIO, named by controller and line offset.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SocGpio {
    pub chip: &'static str,
    pub offset: u16,
}

const fn sw(offset: u16) -> SocGpio {
    SocGpio {
        chip: "INT33FF:00",
        offset,
    }
}

const fn n(offset: u16) -> SocGpio {
    SocGpio {
        chip: "INT33FF:01",
        offset,
    }
}

const fn e(offset: u16) -> SocGpio {
    SocGpio {
        chip: "INT33FF:02",
        offset,
    }
}

const fn se(offset: u16) -> SocGpio {
    SocGpio {
        chip: "INT33FF:03",
        offset,
    }
}

/// SoC GPIOs behind each header pin, in header order.
pub const HEADER_GPIOS: [SocGpio; HEADER_PINS] = [
    sw(33),
    sw(37),
    sw(32),
    sw(35),
    e(18),
    e(21),
    e(12),
    se(48),
    se(7),
    se(3),
    se(6),
    se(4),
    se(5),
    se(1),
    sw(13),
    sw(9),
    sw(11),
    sw(8),
    sw(50),
    sw(54),
    sw(52),
    sw(55),
    se(12),
    se(15),
    se(18),
    se(11),
    se(14),
    se(8),
];

/// SoC GPIOs wired to the CPLD's programming interface.
#[derive(Copy, Clone, Debug)]
pub struct CpldWiring {
    pub strobe: SocGpio,
    pub reset: SocGpio,
    pub data_in: SocGpio,
    pub data_out: SocGpio,
    pub output_enable: SocGpio,
}

pub const CPLD_WIRING: CpldWiring = CpldWiring {
    strobe: n(21),
    reset: e(15),
    data_in: e(13),
    data_out: e(23),
    output_enable: sw(43),
};

const fn mux(dir: u8, mux: u8, func: PinDirection) -> PinDescriptor {
    PinDescriptor::muxed(dir, mux, func)
}

const fn pin(dir: u8, func: PinDirection) -> PinDescriptor {
    PinDescriptor::direct(dir, Some(func))
}

const fn gpio_only(dir: u8) -> PinDescriptor {
    PinDescriptor::direct(dir, None)
}

pub const PIN_INFO: [PinDescriptor; HEADER_PINS] = [
    mux(9, 28, OUT),
    mux(23, 28, OUT),
    mux(0, 29, OUT),
    mux(1, 29, OUT),
    mux(2, 30, IN),
    gpio_only(10),
    gpio_only(11),
    gpio_only(22),
    pin(21, OUT),
    pin(7, IN),
    pin(6, OUT),
    pin(8, OUT),
    pin(24, OUT),
    pin(12, OUT),
    pin(15, OUT),
    pin(16, IN),
    pin(25, IN),
    pin(3, OUT),
    pin(17, OUT),
    pin(13, OUT),
    pin(26, IN),
    pin(27, OUT),
    pin(5, OUT),
    pin(18, OUT),
    pin(19, OUT),
    pin(20, OUT),
    pin(14, OUT),
    pin(4, OUT),
];

pub const PINS: PinTable<HEADER_PINS> = PinTable::new(PIN_INFO);

const fn desc(number: u8, name: &'static str) -> PinDesc {
    PinDesc { number, name }
}

pub const PIN_DESCS: [PinDesc; HEADER_PINS] = [
    desc(0, "I2C0_SDA"),
    desc(1, "I2C0_SCL"),
    desc(2, "I2C1_SDA"),
    desc(3, "I2C1_SCL"),
    desc(4, "ADC"),
    desc(5, "GPIO5"),
    desc(6, "GPIO6"),
    desc(7, "SPI_CS1"),
    desc(8, "SPI_CS0"),
    desc(9, "SPI_MISO"),
    desc(10, "SPI_MOSI"),
    desc(11, "SPI_CLK"),
    desc(12, "PWM0"),
    desc(13, "PWM1"),
    desc(14, "UART1_TX"),
    desc(15, "UART1_RX"),
    desc(16, "UART1_CTS"),
    desc(17, "UART1_RTS"),
    desc(18, "I2S_CLK"),
    desc(19, "I2S_FRM"),
    desc(20, "I2S_DIN"),
    desc(21, "I2S_DOUT"),
    desc(22, "GPIO22"),
    desc(23, "GPIO23"),
    desc(24, "GPIO24"),
    desc(25, "GPIO25"),
    desc(26, "GPIO26"),
    desc(27, "GPIO27"),
];

pub const GROUPS: [PinGroup; 9] = [
    PinGroup {
        name: "uart1_grp",
        pins: &[14, 15, 16, 17],
    },
    PinGroup {
        name: "uart2_grp",
        pins: &[25, 27],
    },
    PinGroup {
        name: "i2c0_grp",
        pins: &[0, 1],
    },
    PinGroup {
        name: "i2c1_grp",
        pins: &[2, 3],
    },
    PinGroup {
        name: "spi2_grp",
        pins: &[8, 9, 10, 11],
    },
    PinGroup {
        name: "i2s2_grp",
        pins: &[18, 19, 20, 21],
    },
    PinGroup {
        name: "pwm0_grp",
        pins: &[12],
    },
    PinGroup {
        name: "pwm1_grp",
        pins: &[13],
    },
    PinGroup {
        name: "adc0_grp",
        pins: &[4],
    },
];

pub const FUNCTIONS: [PinFunction; 9] = [
    PinFunction {
        name: "uart1",
        groups: &["uart1_grp"],
    },
    PinFunction {
        name: "uart2",
        groups: &["uart2_grp"],
    },
    PinFunction {
        name: "i2c0",
        groups: &["i2c0_grp"],
    },
    PinFunction {
        name: "i2c1",
        groups: &["i2c1_grp"],
    },
    PinFunction {
        name: "spi2",
        groups: &["spi2_grp"],
    },
    PinFunction {
        name: "i2s2",
        groups: &["i2s2_grp"],
    },
    PinFunction {
        name: "pwm0",
        groups: &["pwm0_grp"],
    },
    PinFunction {
        name: "pwm1",
        groups: &["pwm1_grp"],
    },
    PinFunction {
        name: "adc0",
        groups: &["adc0_grp"],
    },
];

pub const TABLES: Tables = Tables {
    descs: &PIN_DESCS,
    groups: &GROUPS,
    functions: &FUNCTIONS,
};

pub const LEDS: [LedConfig; 3] = [
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

const fn bit_fits(bit: Option<CpldBit>, width: u8) -> bool {
    match bit {
        Some(b) => b.0 < width,
        None => true,
    }
}

const fn pins_fit(pins: &[PinDescriptor], width: u8) -> bool {
    let mut i = 0;
    while i < pins.len() {
        if !bit_fits(pins[i].dir_ctrl, width)
            || !bit_fits(pins[i].mux_ctrl, width)
        {
            return false;
        }
        i += 1;
    }
    true
}

const fn groups_fit(groups: &[PinGroup]) -> bool {
    let mut g = 0;
    while g < groups.len() {
        let mut p = 0;
        while p < groups[g].pins.len() {
            if groups[g].pins[p] as usize >= HEADER_PINS {
                return false;
            }
            p += 1;
        }
        g += 1;
    }
    true
}

const fn leds_fit(leds: &[LedConfig], width: u8) -> bool {
    let mut i = 0;
    while i < leds.len() {
        if leds[i].offset.0 >= width {
            return false;
        }
        i += 1;
    }
    true
}

const_assert!(pins_fit(&PIN_INFO, CPLD_CONFIG.width));
const_assert!(groups_fit(&GROUPS));
const_assert!(leds_fit(&LEDS, CPLD_CONFIG.width));
const_assert!(CPLD_CONFIG.initial >> CPLD_CONFIG.width == 0);
