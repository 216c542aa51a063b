// Licensed under the Apache-2.0 license

//! Board configuration tables.
//!
//! Each board lists its buses in the order applications index them; the
//! controller field inside each entry is the hardware instance.

/// Digilent chipKIT WiFire (PIC32MZ2048EFG100).
pub mod wifire {
    use crate::flash::FlashGeometry;
    use crate::gpio::{Pin, Port};
    use crate::i2c::common::{I2cConf, I2cSpeed};
    use crate::memory_map::Family;
    use crate::spi::SpiConf;
    use fugit::HertzU32;

    pub const FAMILY: Family = Family::Pic32mz;
    pub const SYSTEM_CLOCK: HertzU32 = HertzU32::MHz(200);
    pub const PERIPHERAL_CLOCK: HertzU32 = HertzU32::MHz(100);

    // I2C1 is absent: its SDA pin only reaches the WiFi module.
    pub const I2C: [I2cConf; 3] = [
        // J7 and J10
        I2cConf {
            controller: 2,
            scl: Pin::new(Port::A, 2),
            sda: Pin::new(Port::A, 3),
            speed: I2cSpeed::Normal,
        },
        // J10
        I2cConf {
            controller: 3,
            scl: Pin::new(Port::F, 8),
            sda: Pin::new(Port::F, 2),
            speed: I2cSpeed::Normal,
        },
        // J6 and J8
        I2cConf {
            controller: 4,
            scl: Pin::new(Port::G, 8),
            sda: Pin::new(Port::G, 7),
            speed: I2cSpeed::Normal,
        },
    ];

    pub const SPI: [SpiConf; 2] = [
        // J10: SCK on RD1
        SpiConf {
            controller: 1,
            mosi: Pin::new(Port::E, 5),
            miso: Pin::new(Port::D, 2),
            mosi_mux: 0xBF80_1614, // RPE5R
            mosi_af: 0b0101,
            miso_mux: 0xBF80_149C, // SDI1R
            miso_af: 0b0000,
        },
        // J9: SCK on RG6
        SpiConf {
            controller: 2,
            mosi: Pin::new(Port::F, 0),
            miso: Pin::new(Port::D, 11),
            mosi_mux: 0xBF80_1640, // RPF0R
            mosi_af: 0b0110,
            miso_mux: 0xBF80_14A8, // SDI2R
            miso_af: 0b0011,
        },
    ];

    pub const FLASH: FlashGeometry = FlashGeometry {
        family: FAMILY,
        base: 0xBD00_0000,
        page_size: 16 * 1024,
        page_count: 128,
        row_size: 2048,
    };
}

/// MikroElektronika 6LoWPAN Clicker (PIC32MX470F512H).
pub mod clicker {
    use crate::flash::FlashGeometry;
    use crate::gpio::{Pin, Port};
    use crate::memory_map::Family;
    use crate::spi::SpiConf;
    use fugit::HertzU32;

    pub const FAMILY: Family = Family::Pic32mx;
    pub const SYSTEM_CLOCK: HertzU32 = HertzU32::MHz(96);
    pub const PERIPHERAL_CLOCK: HertzU32 = HertzU32::MHz(96);

    pub const SPI: [SpiConf; 2] = [
        // mikroBUS: SCK on RD2
        SpiConf {
            controller: 1,
            mosi: Pin::new(Port::D, 4),
            miso: Pin::new(Port::D, 3),
            mosi_mux: 0xBF80_FBD0, // RPD4R
            mosi_af: 0b1000,
            miso_mux: 0xBF80_FA84, // SDI1R
            miso_af: 0b0000,
        },
        // 6LoWPAN radio: SCK on RG6
        SpiConf {
            controller: 2,
            mosi: Pin::new(Port::G, 8),
            miso: Pin::new(Port::G, 7),
            mosi_mux: 0xBF80_FCA0, // RPG8R
            mosi_af: 0b0110,
            miso_mux: 0xBF80_FA90, // SDI2R
            miso_af: 0b0001,
        },
    ];

    pub const FLASH: FlashGeometry = FlashGeometry {
        family: FAMILY,
        base: 0xBD00_0000,
        page_size: 4096,
        page_count: 128,
        row_size: 512,
    };
}
