// Licensed under the Apache-2.0 license

//! PIC32 SPI master engine.
//!
//! 8-bit master transfers over one controller. The module is power-gated
//! through PMD5 whenever no guard holds it; [`Pic32Spi::configure`] ungates
//! it and [`Pic32Spi::shutdown`] gates it again.
//!
//! The shift register only advances when a byte is written, so a transfer
//! without an output buffer writes [`FILLER`] for every byte it clocks.
//! [`Pic32Spi::transfer`] takes its length from the buffers;
//! [`Pic32Spi::clock`] shifts a given number of filler bytes with no
//! buffers at all.

use crate::common::{Logger, NoOpLogger};
use crate::gpio::Gpio;
use crate::poll::{self, ready_when, Timeout};
use crate::register_block;
use crate::regs::{Reg, RegisterAccess};
use crate::spi::common::{Error, SpiCs, SpiMode};
use core::convert::Infallible;

register_block! {
    /// SPI controller registers.
    pub struct SpiRegs {
        con = 0x00,
        stat = 0x10,
        buf = 0x20,
        brg = 0x30,
        con2 = 0x40,
    }
}

pub mod con {
    pub const MSTEN: u32 = 1 << 5;
    pub const CKP: u32 = 1 << 6;
    pub const CKE: u32 = 1 << 8;
    pub const ON: u32 = 1 << 15;
}

pub mod stat {
    pub const SPIRBF: u32 = 1 << 0;
    pub const SPITBE: u32 = 1 << 3;
    pub const SPIROV: u32 = 1 << 6;
}

/// Byte shifted out when the caller supplies no output buffer.
pub const FILLER: u8 = 0x00;

pub struct Pic32Spi<R, G, L: Logger = NoOpLogger> {
    regs: SpiRegs<R>,
    gpio: G,
    /// PMD5 register address and this controller's module-disable bit.
    pmd: (u32, u32),
    controller: u8,
    timeout: Timeout,
    logger: L,
}

impl<R: RegisterAccess, G: Gpio, L: Logger> Pic32Spi<R, G, L> {
    pub fn new(
        regs: SpiRegs<R>,
        gpio: G,
        pmd: (u32, u32),
        controller: u8,
        timeout: Timeout,
        logger: L,
    ) -> Self {
        Self {
            regs,
            gpio,
            pmd,
            controller,
            timeout,
            logger,
        }
    }

    fn pmd5(&self) -> Reg<'_, R> {
        Reg::new(self.regs.bus(), self.pmd.0)
    }

    /// Gate the module clock off.
    pub fn power_down(&self) {
        self.pmd5().set_bits(self.pmd.1);
    }

    /// Ungate the module and start it as master in `mode` with divisor
    /// `brg`. Any stale receive byte and overflow flag are discarded.
    pub fn configure(&mut self, mode: SpiMode, brg: u32) {
        self.pmd5().clear_bits(self.pmd.1);
        self.regs.con().write(0);
        self.regs.con2().write(0);
        let _ = self.regs.buf().read();

        let con = self.regs.con();
        if mode.clock_idle_high() {
            con.set_bits(con::CKP);
        } else {
            con.clear_bits(con::CKP);
        }
        if mode.clock_edge() {
            con.set_bits(con::CKE);
        } else {
            con.clear_bits(con::CKE);
        }

        self.regs.brg().write(brg);
        self.regs.stat().clear_bits(stat::SPIROV);
        self.regs.con().set_bits(con::ON | con::MSTEN);
        self.logger.debug(format_args!(
            "spi{}: {:?}, brg {}",
            self.controller, mode, brg
        ));
    }

    /// Stop the module and gate it off.
    pub fn shutdown(&mut self) {
        self.regs.con().write(0);
        self.power_down();
    }

    fn tx_empty(&self) -> nb::Result<(), Infallible> {
        ready_when(self.regs.stat().is_set(stat::SPITBE))
    }

    fn rx_full(&self) -> nb::Result<(), Infallible> {
        ready_when(self.regs.stat().is_set(stat::SPIRBF))
    }

    fn block_on(&self, ready: fn(&Self) -> nb::Result<(), Infallible>) -> Result<(), Error> {
        poll::wait(self.timeout, || ready(self)).map_err(|_| {
            self.logger
                .error(format_args!("spi{}: transfer timed out", self.controller));
            Error::Timeout
        })
    }

    /// Shift one byte out and return the byte shifted in.
    pub fn exchange(&mut self, out: u8) -> Result<u8, Error> {
        self.regs.buf().write(u32::from(out));
        self.block_on(Self::tx_empty)?;
        self.block_on(Self::rx_full)?;
        Ok(self.regs.buf().read() as u8)
    }

    pub fn select(&self, cs: SpiCs) {
        if let SpiCs::Pin(pin) = cs {
            self.gpio.clear(pin);
        }
    }

    pub fn deselect(&self, cs: SpiCs) {
        if let SpiCs::Pin(pin) = cs {
            self.gpio.set(pin);
        }
    }

    /// Full-duplex transfer of `len` bytes framed by `cs`.
    ///
    /// `out` bytes are shifted out, or [`FILLER`] when `out` is `None`;
    /// received bytes land in `input` when given. The chip select is
    /// asserted before the first byte and released after the last unless
    /// `cont` is set. It is released on a timeout as well.
    ///
    /// # Panics
    ///
    /// If both buffers are given with different lengths.
    pub fn transfer(
        &mut self,
        cs: SpiCs,
        cont: bool,
        out: Option<&[u8]>,
        mut input: Option<&mut [u8]>,
    ) -> Result<(), Error> {
        let len = match (out, input.as_deref()) {
            (Some(o), Some(i)) => {
                assert_eq!(o.len(), i.len(), "transmit and receive lengths differ");
                o.len()
            }
            (Some(o), None) => o.len(),
            (None, Some(i)) => i.len(),
            (None, None) => 0,
        };

        self.select(cs);
        let result = self.shift(len, out, input.as_deref_mut());
        if !cont || result.is_err() {
            self.deselect(cs);
        }
        result
    }

    /// Shift `len` [`FILLER`] bytes framed by `cs`, discarding what comes
    /// back. Chip select handling matches [`transfer`](Self::transfer).
    ///
    /// # Errors
    ///
    /// [`Error::Timeout`] only under a bounded [`Timeout`].
    pub fn clock(&mut self, cs: SpiCs, cont: bool, len: usize) -> Result<(), Error> {
        self.select(cs);
        let result = self.shift(len, None, None);
        if !cont || result.is_err() {
            self.deselect(cs);
        }
        result
    }

    fn shift(
        &mut self,
        len: usize,
        out: Option<&[u8]>,
        mut input: Option<&mut [u8]>,
    ) -> Result<(), Error> {
        for index in 0..len {
            let byte = out.and_then(|o| o.get(index)).copied().unwrap_or(FILLER);
            let rx = self.exchange(byte)?;
            if let Some(slot) = input.as_deref_mut().and_then(|i| i.get_mut(index)) {
                *slot = rx;
            }
        }
        Ok(())
    }
}
