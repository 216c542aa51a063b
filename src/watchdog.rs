// Licensed under the Apache-2.0 license

//! Watchdog timer.
//!
//! The timeout prescaler is fixed by the device configuration bits, so the
//! driver only switches the timer and clears it.

use crate::common::{Logger, NoOpLogger};
use crate::memory_map::{Family, MemoryMap};
use crate::register_block;
use crate::regs::RegisterAccess;
use fugit::MillisDurationU32;

register_block! {
    pub struct WdtRegs {
        con = 0x00,
    }
}

pub mod con {
    pub const WDTCLR: u32 = 1 << 0;
    pub const ON: u32 = 1 << 15;
}

/// Written to the upper half of WDTCON to clear the PIC32MZ timer.
pub const WDT_CLEAR_KEY: u16 = 0x5743;

pub struct Watchdog<R, L: Logger = NoOpLogger> {
    regs: WdtRegs<R>,
    family: Family,
    logger: L,
}

impl<R: RegisterAccess, L: Logger> Watchdog<R, L> {
    pub fn new(bus: R, map: &MemoryMap, logger: L) -> Self {
        Self {
            regs: WdtRegs::new(bus, map.wdt_base),
            family: map.family,
            logger,
        }
    }

    pub fn start(&self) {
        self.regs.con().set_bits(con::ON);
    }

    pub fn stop(&self) {
        self.regs.con().clear_bits(con::ON);
    }

    pub fn kick(&self) {
        match self.family {
            Family::Pic32mx => self.regs.con().set_bits(con::WDTCLR),
            Family::Pic32mz => self.regs.con().write_upper_half(WDT_CLEAR_KEY),
        }
    }

    /// The reboot window cannot be changed at run time; the request is
    /// logged and otherwise ignored.
    pub fn setup_reboot(&self, min: MillisDurationU32, max: MillisDurationU32) {
        self.logger.warn(format_args!(
            "wdt: ignoring window {min}..{max}, prescaler is set in configuration bits"
        ));
    }
}
