// Licensed under the Apache-2.0 license

//! Internal program flash.
//!
//! [`Flash`] erases and programs whole pages, or arbitrary word-aligned
//! ranges with [`Flash::write_raw`], through the NVM controller. Full,
//! row-aligned rows are programmed in one row operation; everything else
//! goes a word at a time.
//!
//! The engine takes `&mut self` and holds no lock. Programming is meant
//! to run from one context (a bootloader or a maintenance thread). The
//! NVM and RTC unlock keys share one system-wide sequence that nothing
//! serializes either.

pub mod flash_controller;
pub mod pic32_nvm;
pub mod storage;

pub use flash_controller::Flash;
pub use pic32_nvm::{Nvm, NvmRegs};
pub use storage::{FlashStorage, StorageError};

use crate::memory_map::Family;

/// Smallest unit `write_raw` accepts.
pub const RAW_BLOCK_SIZE: u32 = 4;
/// Alignment `write_raw` requires of both source and destination.
pub const RAW_ALIGNMENT: u32 = 4;

/// Value of an erased flash word.
pub const ERASED_WORD: u32 = 0xFFFF_FFFF;

/// Layout of the program flash of one part.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FlashGeometry {
    pub family: Family,
    /// Virtual address of page 0.
    pub base: u32,
    pub page_size: u32,
    pub page_count: u32,
    /// Bytes programmed by one row operation.
    pub row_size: u32,
}

impl FlashGeometry {
    /// Total bytes covered by the pages.
    #[must_use]
    pub const fn size(&self) -> u32 {
        self.page_size * self.page_count
    }

    /// One past the last flash byte.
    #[must_use]
    pub const fn end(&self) -> u32 {
        self.base + self.size()
    }

    /// Start address of `page`, if it exists.
    #[must_use]
    pub const fn page_address(&self, page: u32) -> Option<u32> {
        if page < self.page_count {
            Some(self.base + page * self.page_size)
        } else {
            None
        }
    }

    /// Page holding `addr`, if any.
    #[must_use]
    pub const fn page_of(&self, addr: u32) -> Option<u32> {
        if addr < self.base || addr >= self.end() {
            None
        } else {
            Some((addr - self.base) / self.page_size)
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FlashError {
    /// NVMCON.WRERR: the operation was refused or did not complete.
    WriteError,
    /// NVMCON.LVDERR: supply dropped during the operation.
    LowVoltage,
    /// Read-back differs from the expected data at this byte offset
    /// within the page.
    Mismatch { offset: u32 },
}
