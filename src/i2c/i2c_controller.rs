// Licensed under the Apache-2.0 license

//! `embedded-hal` I2C adapter.
//!
//! Wraps any [`I2cMaster`] (usually an acquired bus guard) and exposes the
//! `embedded_hal::i2c::I2c` trait. A short transfer becomes
//! [`Error::Incomplete`], reported as a NACK of unknown source.

use crate::common::{Logger, NoOpLogger};
use crate::i2c::common::{Error, Flags};
use crate::i2c::traits::I2cMaster;
use embedded_hal::i2c::{Operation, SevenBitAddress};

pub struct I2cController<H: I2cMaster, L: Logger = NoOpLogger> {
    pub hardware: H,
    pub logger: L,
}

impl<H: I2cMaster<Error = Error>> I2cController<H> {
    pub fn new(hardware: H) -> Self {
        Self {
            hardware,
            logger: NoOpLogger,
        }
    }
}

impl<H: I2cMaster<Error = Error>, L: Logger> I2cController<H, L> {
    pub fn with_logger(hardware: H, logger: L) -> Self {
        Self { hardware, logger }
    }

    pub fn into_inner(self) -> H {
        self.hardware
    }

    fn complete(&self, addr: u8, expected: usize, transferred: usize) -> Result<(), Error> {
        if transferred == expected {
            Ok(())
        } else {
            self.logger.debug(format_args!(
                "i2c 0x{addr:02x}: {transferred} of {expected} bytes"
            ));
            Err(Error::Incomplete { transferred })
        }
    }
}

impl<H: I2cMaster<Error = Error>, L: Logger> embedded_hal::i2c::ErrorType for I2cController<H, L> {
    type Error = Error;
}

impl<H: I2cMaster<Error = Error>, L: Logger> embedded_hal::i2c::I2c for I2cController<H, L> {
    fn read(&mut self, addr: SevenBitAddress, buffer: &mut [u8]) -> Result<(), Self::Error> {
        let n = self.hardware.read_bytes(addr, buffer, Flags::NONE)?;
        self.complete(addr, buffer.len(), n)
    }

    fn write(&mut self, addr: SevenBitAddress, bytes: &[u8]) -> Result<(), Self::Error> {
        let n = self.hardware.write_bytes(addr, bytes, Flags::NONE)?;
        self.complete(addr, bytes.len(), n)
    }

    fn write_read(
        &mut self,
        addr: SevenBitAddress,
        bytes: &[u8],
        buffer: &mut [u8],
    ) -> Result<(), Self::Error> {
        let n = self.hardware.write_bytes(addr, bytes, Flags::NO_STOP)?;
        self.complete(addr, bytes.len(), n)?;
        let n = self.hardware.read_bytes(addr, buffer, Flags::NONE)?;
        self.complete(addr, buffer.len(), n)
    }

    /// Adjacent operations of the same kind share one frame. A change of
    /// direction is a repeated START; a read that precedes a write NACKs
    /// its last byte first. Only the final operation sends STOP.
    fn transaction(
        &mut self,
        addr: SevenBitAddress,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        let count = operations.len();
        let mut previous_was_read: Option<bool> = None;
        for index in 0..count {
            let next_is_read = match operations.get(index + 1) {
                Some(Operation::Read(_)) => Some(true),
                Some(Operation::Write(_)) => Some(false),
                None => None,
            };
            let Some(op) = operations.get_mut(index) else {
                break;
            };
            let is_read = matches!(op, Operation::Read(_));
            let mut flags = Flags::NONE;
            if previous_was_read == Some(is_read) {
                flags |= Flags::NO_START;
            }
            let keep_open = next_is_read.is_some();
            if keep_open {
                flags |= Flags::NO_STOP;
            }
            if is_read && next_is_read == Some(false) {
                flags |= Flags::NACK_LAST;
            }
            match op {
                Operation::Read(buffer) => {
                    let n = self.hardware.read_bytes(addr, buffer, flags)?;
                    self.complete(addr, buffer.len(), n)?;
                }
                Operation::Write(bytes) => {
                    let n = self.hardware.write_bytes(addr, bytes, flags)?;
                    self.complete(addr, bytes.len(), n)?;
                }
            }
            previous_was_read = if keep_open { Some(is_read) } else { None };
        }
        Ok(())
    }
}
