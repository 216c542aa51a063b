// Licensed under the Apache-2.0 license

//! Special function register addresses for the supported chip families.
//!
//! Addresses are KSEG1 (uncached) virtual addresses. Controller numbers
//! follow the datasheets and start at 1.

/// Supported PIC32 families.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Family {
    Pic32mx,
    Pic32mz,
}

/// Per-family placement of the peripherals this crate drives.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct MemoryMap {
    pub family: Family,
    pub i2c1_base: u32,
    pub i2c_spacing: u32,
    pub i2c_count: u8,
    pub spi1_base: u32,
    pub spi_spacing: u32,
    pub spi_count: u8,
    pub port_a_base: u32,
    pub port_spacing: u32,
    pub nvm_base: u32,
    pub devid: u32,
    pub syskey: u32,
    pub pmd5: u32,
    pub pmd6: u32,
    pub wdt_base: u32,
    pub rtc_base: u32,
    /// PRECON on PIC32MZ, CHECON on PIC32MX.
    pub prefetch_base: u32,
    /// Only PIC32MZ parts carry the RNG block.
    pub rng_base: Option<u32>,
}

/// Bit of PMD5 that disables SPI1; SPIn is `SPI1MD << (n - 1)`.
pub const PMD5_SPI1MD: u32 = 1 << 8;
/// Bit of PMD6 that disables the RTCC.
pub const PMD6_RTCCMD: u32 = 1 << 0;

pub const PIC32MX: MemoryMap = MemoryMap {
    family: Family::Pic32mx,
    i2c1_base: 0xBF80_5000,
    i2c_spacing: 0x100,
    i2c_count: 2,
    spi1_base: 0xBF80_5800,
    spi_spacing: 0x200,
    spi_count: 2,
    port_a_base: 0xBF88_6000,
    port_spacing: 0x100,
    nvm_base: 0xBF80_F400,
    devid: 0xBF80_F220,
    syskey: 0xBF80_F230,
    pmd5: 0xBF80_F280,
    pmd6: 0xBF80_F290,
    wdt_base: 0xBF80_0000,
    rtc_base: 0xBF80_0200,
    prefetch_base: 0xBF88_4000,
    rng_base: None,
};

pub const PIC32MZ: MemoryMap = MemoryMap {
    family: Family::Pic32mz,
    i2c1_base: 0xBF82_0000,
    i2c_spacing: 0x200,
    i2c_count: 5,
    spi1_base: 0xBF82_1000,
    spi_spacing: 0x200,
    spi_count: 6,
    port_a_base: 0xBF86_0000,
    port_spacing: 0x100,
    nvm_base: 0xBF80_0600,
    devid: 0xBF80_0020,
    syskey: 0xBF80_0030,
    pmd5: 0xBF80_0100,
    pmd6: 0xBF80_0110,
    wdt_base: 0xBF80_0800,
    rtc_base: 0xBF80_0C00,
    prefetch_base: 0xBF8E_0000,
    rng_base: Some(0xBF8E_6000),
};

impl Family {
    #[must_use]
    pub const fn memory_map(self) -> &'static MemoryMap {
        match self {
            Family::Pic32mx => &PIC32MX,
            Family::Pic32mz => &PIC32MZ,
        }
    }
}

impl MemoryMap {
    /// Register base of I2C controller `controller` (1-based).
    #[must_use]
    pub fn i2c_base(&self, controller: u8) -> Option<u32> {
        Self::instance(self.i2c1_base, self.i2c_spacing, self.i2c_count, controller)
    }

    /// Register base of SPI controller `controller` (1-based).
    #[must_use]
    pub fn spi_base(&self, controller: u8) -> Option<u32> {
        Self::instance(self.spi1_base, self.spi_spacing, self.spi_count, controller)
    }

    fn instance(first: u32, spacing: u32, count: u8, controller: u8) -> Option<u32> {
        if controller == 0 || controller > count {
            return None;
        }
        Some(first + u32::from(controller - 1) * spacing)
    }
}
