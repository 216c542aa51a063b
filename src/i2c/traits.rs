// Licensed under the Apache-2.0 license

//! # I2C Master Traits
//!
//! Two composable layers:
//!
//! ```text
//! I2cHardwareCore (power control, error type)
//!     └── I2cMaster (framed byte transfers + register helpers)
//! ```
//!
//! Transfers report how many data bytes went over the wire. A count short
//! of the requested length means the target NACKed, the bus collided or
//! the bus never went idle; the traits deliberately do not tell these
//! apart. `Err` is reserved for requests the driver refuses before it
//! touches the bus.

use crate::i2c::common::{Direction, Flags};
use core::slice;

/// Foundation every I2C controller provides.
pub trait I2cHardwareCore {
    /// Hardware-specific error type that implements embedded-hal error traits
    type Error: embedded_hal::i2c::Error + core::fmt::Debug;

    /// Set the module-enable bit.
    fn power_on(&mut self);

    /// Clear the module-enable bit. No protocol state survives this.
    fn power_off(&mut self);
}

/// 7-bit master transfers.
///
/// # Examples
///
/// ```rust,ignore
/// use pic32_ddk::i2c::{Flags, I2cMaster};
///
/// fn read_temperature<T: I2cMaster>(i2c: &mut T) -> Option<u16> {
///     let mut raw = [0u8; 2];
///     match i2c.read_regs(0x48, 0x00, &mut raw, Flags::NONE) {
///         Ok(2) => Some(u16::from_be_bytes(raw)),
///         _ => None,
///     }
/// }
/// ```
pub trait I2cMaster: I2cHardwareCore {
    /// Receive `buffer.len()` bytes from `addr`.
    ///
    /// Every byte but the last is ACKed; the last is NACKed unless
    /// `NO_STOP` keeps the frame open.
    ///
    /// # Errors
    ///
    /// Unsupported framing flags or an unknown bus.
    fn read_bytes(&mut self, addr: u8, buffer: &mut [u8], flags: Flags)
        -> Result<usize, Self::Error>;

    /// Send `data` to `addr`.
    ///
    /// # Errors
    ///
    /// Unsupported framing flags or an unknown bus.
    fn write_bytes(&mut self, addr: u8, data: &[u8], flags: Flags) -> Result<usize, Self::Error>;

    fn read_byte(&mut self, addr: u8, byte: &mut u8, flags: Flags) -> Result<usize, Self::Error> {
        self.read_bytes(addr, slice::from_mut(byte), flags)
    }

    fn write_byte(&mut self, addr: u8, byte: u8, flags: Flags) -> Result<usize, Self::Error> {
        self.write_bytes(addr, slice::from_ref(&byte), flags)
    }

    /// Write the register address, then read `buffer.len()` bytes after a
    /// repeated start. Returns the number of data bytes read; 0 if the
    /// register address was not accepted.
    fn read_regs(
        &mut self,
        addr: u8,
        reg: u16,
        buffer: &mut [u8],
        flags: Flags,
    ) -> Result<usize, Self::Error> {
        let reg_bytes = reg.to_be_bytes();
        let reg_bytes = register_address(&reg_bytes, flags);
        let sent = self.write_bytes(addr, reg_bytes, flags | Flags::NO_STOP)?;
        if sent != reg_bytes.len() {
            return Ok(0);
        }
        self.read_bytes(addr, buffer, flags.without(Flags::NO_START))
    }

    /// Write the register address followed by `data` in a single frame.
    /// Returns the number of data bytes written.
    fn write_regs(
        &mut self,
        addr: u8,
        reg: u16,
        data: &[u8],
        flags: Flags,
    ) -> Result<usize, Self::Error> {
        let reg_bytes = reg.to_be_bytes();
        let reg_bytes = register_address(&reg_bytes, flags);
        let sent = self.write_bytes(addr, reg_bytes, flags | Flags::NO_STOP)?;
        if sent != reg_bytes.len() {
            return Ok(0);
        }
        self.write_bytes(addr, data, flags | Flags::NO_START)
    }

    fn read_reg(
        &mut self,
        addr: u8,
        reg: u16,
        byte: &mut u8,
        flags: Flags,
    ) -> Result<usize, Self::Error> {
        self.read_regs(addr, reg, slice::from_mut(byte), flags)
    }

    fn write_reg(&mut self, addr: u8, reg: u16, byte: u8, flags: Flags) -> Result<usize, Self::Error> {
        self.write_regs(addr, reg, slice::from_ref(&byte), flags)
    }
}

/// The address byte for a 7-bit transfer.
#[must_use]
pub const fn address_byte(addr: u8, direction: Direction) -> u8 {
    (addr << 1) | (direction as u8 & 1)
}

fn register_address(be: &[u8; 2], flags: Flags) -> &[u8] {
    if flags.contains(Flags::REG16) {
        be.as_slice()
    } else {
        be.get(1..).unwrap_or(be.as_slice())
    }
}
