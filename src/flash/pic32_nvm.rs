// Licensed under the Apache-2.0 license

//! NVM controller and its unlock-arm-trigger-poll sequence.

use crate::flash::FlashError;
use crate::irq::InterruptControl;
use crate::memory_map::{Family, MemoryMap};
use crate::poll::{self, ready_when};
use crate::register_block;
use crate::regs::RegisterAccess;
use core::convert::Infallible;

register_block! {
    /// NVM controller registers common to both families. NVMSRCADDR moves
    /// between families and is reached through [`NvmRegs::at`].
    pub struct NvmRegs {
        con = 0x00,
        key = 0x10,
        addr = 0x20,
        data = 0x30,
    }
}

pub mod con {
    pub const NVMOP_MASK: u32 = 0xF;
    pub const LVDERR: u32 = 1 << 12;
    pub const WRERR: u32 = 1 << 13;
    pub const WREN: u32 = 1 << 14;
    pub const WR: u32 = 1 << 15;

    pub const ERRORS: u32 = WRERR | LVDERR;
}

pub mod op {
    pub const NOP: u32 = 0x0;
    pub const WORD_PROGRAM: u32 = 0x1;
    pub const ROW_PROGRAM: u32 = 0x3;
    pub const ERASE_PAGE: u32 = 0x4;
}

pub const NVM_KEY1: u32 = 0xAA99_6655;
pub const NVM_KEY2: u32 = 0x5566_99AA;

const fn srcaddr_offset(family: Family) -> u32 {
    match family {
        Family::Pic32mx => 0x40,
        Family::Pic32mz => 0x70,
    }
}

pub struct Nvm<R, I> {
    regs: NvmRegs<R>,
    srcaddr: u32,
    irq: I,
}

impl<R: RegisterAccess, I: InterruptControl> Nvm<R, I> {
    pub fn new(bus: R, map: &MemoryMap, irq: I) -> Self {
        Self {
            regs: NvmRegs::new(bus, map.nvm_base),
            srcaddr: srcaddr_offset(map.family),
            irq,
        }
    }

    pub fn bus(&self) -> &R {
        self.regs.bus()
    }

    fn write_done(&self) -> nb::Result<(), Infallible> {
        ready_when(!self.regs.con().is_set(con::WR))
    }

    /// Unlock, arm and trigger `operation`, then wait for the controller.
    ///
    /// Interrupts stay masked from the key writes until WR clears and are
    /// then restored to their prior state.
    fn arm(&self, operation: u32) {
        let state = self.irq.disable();
        self.regs
            .con()
            .write(con::WREN | (operation & con::NVMOP_MASK));
        self.regs.key().write(0);
        self.regs.key().write(NVM_KEY1);
        self.regs.key().write(NVM_KEY2);
        self.regs.con().set_bits(con::WR);
        poll::block(|| self.write_done());
        self.irq.restore(state);
        self.regs.con().clear_bits(con::WREN);
    }

    fn status(&self) -> Result<(), FlashError> {
        let value = self.regs.con().read();
        if value & con::WRERR != 0 {
            Err(FlashError::WriteError)
        } else if value & con::LVDERR != 0 {
            Err(FlashError::LowVoltage)
        } else {
            Ok(())
        }
    }

    /// Run `operation` and report the error flags it latched.
    ///
    /// # Errors
    ///
    /// [`FlashError::WriteError`] or [`FlashError::LowVoltage`].
    pub fn perform(&self, operation: u32) -> Result<(), FlashError> {
        self.arm(operation);
        self.status()
    }

    /// Clear error flags left by an earlier failure; a NOP operation is
    /// the only way to reset them.
    pub fn clear_errors(&self) {
        if self.regs.con().is_set(con::ERRORS) {
            self.arm(op::NOP);
        }
    }

    /// # Errors
    ///
    /// See [`perform`](Self::perform).
    pub fn erase_page(&self, phys: u32) -> Result<(), FlashError> {
        self.regs.addr().write(phys);
        self.perform(op::ERASE_PAGE)
    }

    /// # Errors
    ///
    /// See [`perform`](Self::perform).
    pub fn program_word(&self, phys: u32, word: u32) -> Result<(), FlashError> {
        self.regs.data().write(word);
        self.regs.addr().write(phys);
        self.perform(op::WORD_PROGRAM)
    }

    /// Program one row at `phys` from the row at physical `source`.
    ///
    /// # Errors
    ///
    /// See [`perform`](Self::perform).
    pub fn program_row(&self, phys: u32, source: u32) -> Result<(), FlashError> {
        self.regs.at(self.srcaddr).write(source);
        self.regs.addr().write(phys);
        self.perform(op::ROW_PROGRAM)
    }
}
