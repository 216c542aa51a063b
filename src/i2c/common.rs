// Licensed under the Apache-2.0 license

//! Common types for the PIC32 I2C master driver.
//!
//! This module holds the bus speed table, transfer framing flags, the
//! driver configuration builder, the error type and the baud-rate divisor
//! computation shared by the engine and the bus arena.

use crate::common::BoundsPolicy;
use crate::gpio::Pin;
use crate::poll::Timeout;
use core::ops::{BitOr, BitOrAssign};
use fugit::HertzU32;

/// Nominal I2C bus speeds.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum I2cSpeed {
    Low = 10_000,
    Normal = 100_000,
    Fast = 400_000,
    FastPlus = 1_000_000,
    /// 3.4 MHz high-speed mode. The controller cannot generate it.
    High = 3_400_000,
}

impl I2cSpeed {
    /// Bus frequency the controller can be programmed for, if any.
    #[must_use]
    pub fn frequency(self) -> Option<HertzU32> {
        match self {
            I2cSpeed::High => None,
            other => Some(HertzU32::from_raw(other as u32)),
        }
    }
}

/// Transfer direction, encoded as the R/W bit of the address byte.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Direction {
    Write = 0,
    Read = 1,
}

/// Framing flags for a single transfer.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Flags(u8);

impl Flags {
    pub const NONE: Self = Self(0);
    /// Continue the frame left open by a previous `NO_STOP` transfer in the
    /// same direction instead of generating a START.
    pub const NO_START: Self = Self(1 << 0);
    /// Keep the bus after the last byte.
    pub const NO_STOP: Self = Self(1 << 1);
    /// 10-bit target address. Not supported by this driver.
    pub const ADDR10: Self = Self(1 << 2);
    /// Register addresses are 16 bits wide, sent MSB first.
    pub const REG16: Self = Self(1 << 3);
    /// NACK the last byte of a `NO_STOP` read so the held frame can turn
    /// around into a write after a repeated START.
    pub const NACK_LAST: Self = Self(1 << 4);

    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    #[must_use]
    pub const fn without(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }
}

impl BitOr for Flags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for Flags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// Board description of one I2C bus.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct I2cConf {
    /// Hardware controller number, starting at 1.
    pub controller: u8,
    pub scl: Pin,
    pub sda: Pin,
    pub speed: I2cSpeed,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Error {
    /// The bus index is not in the board table.
    NoSuchBus,
    /// The board table names more buses than the arena can hold.
    TooManyBuses,
    /// The requested speed yields a divisor the controller cannot use.
    InvalidSpeed,
    /// The framing flags describe a bus sequence the driver does not
    /// generate. Nothing was sent.
    Unsupported,
    /// A transfer stopped early after `transferred` bytes.
    Incomplete { transferred: usize },
}

impl embedded_hal::i2c::Error for Error {
    fn kind(&self) -> embedded_hal::i2c::ErrorKind {
        use embedded_hal::i2c::{ErrorKind, NoAcknowledgeSource};
        match self {
            Error::Incomplete { .. } => ErrorKind::NoAcknowledge(NoAcknowledgeSource::Unknown),
            _ => ErrorKind::Other,
        }
    }
}

pub struct I2cConfig {
    pub timeout: Timeout,
    pub bounds: BoundsPolicy,
    /// Use SMBus input thresholds on SCL/SDA.
    pub smbus_levels: bool,
}

pub struct I2cConfigBuilder {
    timeout: Timeout,
    bounds: BoundsPolicy,
    smbus_levels: bool,
}

impl Default for I2cConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl I2cConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            timeout: Timeout::Never,
            bounds: BoundsPolicy::Error,
            smbus_levels: true,
        }
    }
    #[must_use]
    pub fn timeout(mut self, timeout: Timeout) -> Self {
        self.timeout = timeout;
        self
    }
    #[must_use]
    pub fn bounds(mut self, policy: BoundsPolicy) -> Self {
        self.bounds = policy;
        self
    }
    #[must_use]
    pub fn smbus_levels(mut self, enabled: bool) -> Self {
        self.smbus_levels = enabled;
        self
    }
    #[must_use]
    pub fn build(self) -> I2cConfig {
        I2cConfig {
            timeout: self.timeout,
            bounds: self.bounds,
            smbus_levels: self.smbus_levels,
        }
    }
}

/// Input filter delay subtracted from the half period, in nanoseconds.
pub const PULSE_GOBBLER_DELAY_NS: u64 = 104;

const NS_PER_S: u64 = 1_000_000_000;

/// Baud-rate generator reload value for `speed` at peripheral clock `pclk`.
///
/// `BRG = ((10^9 / (2 * speed) - PGD) * pclk) / 10^9 - 2`, evaluated in
/// 64-bit integer arithmetic.
///
/// # Errors
///
/// [`Error::InvalidSpeed`] for a zero speed, for a result that would be
/// negative, and for the electrically invalid values 0 and 1.
pub fn baud_divisor(pclk: HertzU32, speed: HertzU32) -> Result<u32, Error> {
    let speed = u64::from(speed.raw());
    if speed == 0 {
        return Err(Error::InvalidSpeed);
    }
    let half_period_ns = (NS_PER_S / (2 * speed))
        .checked_sub(PULSE_GOBBLER_DELAY_NS)
        .ok_or(Error::InvalidSpeed)?;
    let ticks = half_period_ns * u64::from(pclk.raw()) / NS_PER_S;
    let brg = ticks.checked_sub(2).ok_or(Error::InvalidSpeed)?;
    if brg < 2 {
        return Err(Error::InvalidSpeed);
    }
    u32::try_from(brg).map_err(|_| Error::InvalidSpeed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_hal::i2c::Error as _;
    use fugit::RateExtU32;

    #[test]
    fn divisor_matches_reference_equation() {
        assert_eq!(baud_divisor(100.MHz(), 100.kHz()), Ok(487));
        assert_eq!(baud_divisor(100.MHz(), 400.kHz()), Ok(112));
        assert_eq!(baud_divisor(96.MHz(), 10.kHz()), Ok(4788));
    }

    #[test]
    fn degenerate_divisors_are_rejected() {
        assert_eq!(baud_divisor(100.MHz(), 0.Hz()), Err(Error::InvalidSpeed));
        // 1 MHz at 8 MHz: (500 - 104) * 8 / 1000 = 3, minus 2 leaves 1.
        assert_eq!(baud_divisor(8.MHz(), 1.MHz()), Err(Error::InvalidSpeed));
        // Half period shorter than the gobbler delay.
        assert_eq!(baud_divisor(100.MHz(), 5.MHz()), Err(Error::InvalidSpeed));
        assert_eq!(baud_divisor(1.MHz(), 1.MHz()), Err(Error::InvalidSpeed));
    }

    #[test]
    fn high_speed_has_no_frequency() {
        assert_eq!(I2cSpeed::High.frequency(), None);
        assert_eq!(I2cSpeed::Fast.frequency(), Some(400.kHz()));
    }

    #[test]
    fn flags_compose() {
        let flags = Flags::NO_START | Flags::REG16;
        assert!(flags.contains(Flags::NO_START));
        assert!(!flags.contains(Flags::NO_STOP));
        assert_eq!(flags.without(Flags::NO_START), Flags::REG16);
        assert!(Flags::NONE.contains(Flags::NONE));
    }

    #[test]
    fn incomplete_maps_to_no_acknowledge() {
        use embedded_hal::i2c::{ErrorKind, NoAcknowledgeSource};
        assert_eq!(
            Error::Incomplete { transferred: 1 }.kind(),
            ErrorKind::NoAcknowledge(NoAcknowledgeSource::Unknown)
        );
        assert_eq!(Error::Unsupported.kind(), ErrorKind::Other);
    }
}
