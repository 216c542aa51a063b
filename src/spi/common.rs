// Licensed under the Apache-2.0 license

//! Shared SPI types: modes, clock rates, chip-select, board records and
//! errors.

use crate::common::BoundsPolicy;
use crate::gpio::Pin;
use crate::poll::Timeout;
use core::convert::Infallible;
use fugit::HertzU32;

/// Clock polarity and phase, numbered the usual way.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SpiMode {
    Mode0,
    Mode1,
    Mode2,
    Mode3,
}

impl SpiMode {
    /// Clock idles high (CKP).
    #[must_use]
    pub const fn clock_idle_high(self) -> bool {
        matches!(self, SpiMode::Mode2 | SpiMode::Mode3)
    }

    /// Clock edge select (CKE).
    #[must_use]
    pub const fn clock_edge(self) -> bool {
        matches!(self, SpiMode::Mode1 | SpiMode::Mode3)
    }
}

impl TryFrom<u8> for SpiMode {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Error> {
        match value {
            0 => Ok(SpiMode::Mode0),
            1 => Ok(SpiMode::Mode1),
            2 => Ok(SpiMode::Mode2),
            3 => Ok(SpiMode::Mode3),
            _ => Err(Error::NoMode),
        }
    }
}

impl From<embedded_hal::spi::Mode> for SpiMode {
    fn from(mode: embedded_hal::spi::Mode) -> Self {
        use embedded_hal::spi::{Phase, Polarity};
        match (mode.polarity, mode.phase) {
            (Polarity::IdleLow, Phase::CaptureOnFirstTransition) => SpiMode::Mode0,
            (Polarity::IdleLow, Phase::CaptureOnSecondTransition) => SpiMode::Mode1,
            (Polarity::IdleHigh, Phase::CaptureOnFirstTransition) => SpiMode::Mode2,
            (Polarity::IdleHigh, Phase::CaptureOnSecondTransition) => SpiMode::Mode3,
        }
    }
}

/// Standard bus clock rates.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum SpiClock {
    Khz100 = 100_000,
    Khz400 = 400_000,
    Mhz1 = 1_000_000,
    Mhz5 = 5_000_000,
    Mhz10 = 10_000_000,
}

impl From<SpiClock> for HertzU32 {
    fn from(clock: SpiClock) -> Self {
        HertzU32::from_raw(clock as u32)
    }
}

/// Chip-select line of a transfer.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum SpiCs {
    /// No line is driven; the caller frames the device itself.
    #[default]
    Undefined,
    /// Active-low GPIO.
    Pin(Pin),
}

/// Board description of one SPI bus.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SpiConf {
    /// Hardware controller number, starting at 1.
    pub controller: u8,
    pub mosi: Pin,
    pub miso: Pin,
    /// Output remap register of the MOSI pin.
    pub mosi_mux: u32,
    pub mosi_af: u8,
    /// Input remap register of the controller's SDI.
    pub miso_mux: u32,
    pub miso_af: u8,
}

#[derive(Copy, Clone, Debug, Default)]
pub struct SpiConfig {
    pub timeout: Timeout,
    pub bounds: BoundsPolicy,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Error {
    NoSuchBus,
    TooManyBuses,
    /// Mode value outside 0..=3.
    NoMode,
    /// Clock rate the baud-rate generator cannot produce.
    InvalidClock,
    /// `init_cs` called without a chip-select line.
    NoCs,
    /// A bounded wait expired mid-transfer.
    Timeout,
}

impl From<Infallible> for Error {
    fn from(never: Infallible) -> Self {
        match never {}
    }
}

impl embedded_hal::spi::Error for Error {
    fn kind(&self) -> embedded_hal::spi::ErrorKind {
        embedded_hal::spi::ErrorKind::Other
    }
}

/// Largest value the SPIxBRG field holds.
pub const MAX_BRG: u32 = 0x1FFF;

/// Baud-rate generator value: `pclk / (2 * clock) - 1`.
///
/// # Errors
///
/// [`Error::InvalidClock`] for a zero clock, a clock above `pclk / 2`, or
/// one too slow for the divisor field.
pub fn spi_divisor(pclk: HertzU32, clock: HertzU32) -> Result<u32, Error> {
    let clock = clock.raw();
    if clock == 0 {
        return Err(Error::InvalidClock);
    }
    let ratio = pclk.raw() / clock.saturating_mul(2);
    let brg = ratio.checked_sub(1).ok_or(Error::InvalidClock)?;
    if brg > MAX_BRG {
        return Err(Error::InvalidClock);
    }
    Ok(brg)
}
