// Licensed under the Apache-2.0 license

//! `embedded-storage` NOR flash view of the program flash.
//!
//! Offsets are relative to page 0. One erase block is one flash page, so
//! the page size is a const parameter checked against the geometry at
//! construction.

use crate::common::Logger;
use crate::flash::{Flash, FlashError, RAW_BLOCK_SIZE};
use crate::irq::InterruptControl;
use crate::regs::RegisterAccess;
use embedded_storage::nor_flash::{
    ErrorType, NorFlash, NorFlashError, NorFlashErrorKind, ReadNorFlash,
};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum StorageError {
    /// Offset or length is not a multiple of the operation's unit.
    NotAligned,
    /// The range is not inside the flash.
    OutOfBounds,
    /// The NVM controller reported an error.
    Flash(FlashError),
}

impl From<FlashError> for StorageError {
    fn from(error: FlashError) -> Self {
        StorageError::Flash(error)
    }
}

impl NorFlashError for StorageError {
    fn kind(&self) -> NorFlashErrorKind {
        match self {
            StorageError::NotAligned => NorFlashErrorKind::NotAligned,
            StorageError::OutOfBounds => NorFlashErrorKind::OutOfBounds,
            StorageError::Flash(_) => NorFlashErrorKind::Other,
        }
    }
}

/// Word staging buffer for sources that are not word aligned.
#[repr(C, align(4))]
struct WordBuffer([u8; RAW_BLOCK_SIZE as usize]);

pub struct FlashStorage<R, I, L: Logger, const PAGE: usize> {
    flash: Flash<R, I, L>,
}

impl<R: RegisterAccess, I: InterruptControl, L: Logger, const PAGE: usize>
    FlashStorage<R, I, L, PAGE>
{
    /// # Panics
    ///
    /// If `PAGE` is not the page size of `flash`.
    pub fn new(flash: Flash<R, I, L>) -> Self {
        assert_eq!(
            flash.geometry().page_size as usize,
            PAGE,
            "erase size must match the flash page size"
        );
        Self { flash }
    }

    pub fn into_inner(self) -> Flash<R, I, L> {
        self.flash
    }

    fn check_alignment(offset: u32, len: usize, unit: usize) -> Result<(), StorageError> {
        if offset as usize % unit != 0 || len % unit != 0 {
            return Err(StorageError::NotAligned);
        }
        Ok(())
    }

    fn check_bounds(&self, offset: u32, len: usize) -> Result<(), StorageError> {
        let end = (offset as usize).checked_add(len);
        if end.is_some_and(|end| end <= self.capacity()) {
            Ok(())
        } else {
            Err(StorageError::OutOfBounds)
        }
    }

    fn address(&self, offset: u32) -> u32 {
        self.flash.geometry().base + offset
    }
}

impl<R, I, L, const PAGE: usize> ErrorType for FlashStorage<R, I, L, PAGE>
where
    R: RegisterAccess,
    I: InterruptControl,
    L: Logger,
{
    type Error = StorageError;
}

impl<R, I, L, const PAGE: usize> ReadNorFlash for FlashStorage<R, I, L, PAGE>
where
    R: RegisterAccess,
    I: InterruptControl,
    L: Logger,
{
    const READ_SIZE: usize = RAW_BLOCK_SIZE as usize;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), StorageError> {
        Self::check_alignment(offset, bytes.len(), Self::READ_SIZE)?;
        self.check_bounds(offset, bytes.len())?;
        self.flash.read_raw(self.address(offset), bytes);
        Ok(())
    }

    fn capacity(&self) -> usize {
        self.flash.geometry().size() as usize
    }
}

impl<R, I, L, const PAGE: usize> NorFlash for FlashStorage<R, I, L, PAGE>
where
    R: RegisterAccess,
    I: InterruptControl,
    L: Logger,
{
    const WRITE_SIZE: usize = RAW_BLOCK_SIZE as usize;
    const ERASE_SIZE: usize = PAGE;

    fn erase(&mut self, from: u32, to: u32) -> Result<(), StorageError> {
        let len = to.checked_sub(from).ok_or(StorageError::OutOfBounds)? as usize;
        Self::check_alignment(from, len, Self::ERASE_SIZE)?;
        self.check_bounds(from, len)?;
        let page_size = PAGE as u32;
        for page in from / page_size..to / page_size {
            self.flash.erase(page)?;
        }
        Ok(())
    }

    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), StorageError> {
        Self::check_alignment(offset, bytes.len(), Self::WRITE_SIZE)?;
        self.check_bounds(offset, bytes.len())?;
        let addr = self.address(offset);
        if bytes.as_ptr() as usize % Self::WRITE_SIZE == 0 {
            self.flash.write_raw(addr, bytes)?;
            return Ok(());
        }
        for (word_addr, chunk) in (addr..)
            .step_by(Self::WRITE_SIZE)
            .zip(bytes.chunks_exact(Self::WRITE_SIZE))
        {
            let mut word = WordBuffer([0; RAW_BLOCK_SIZE as usize]);
            word.0.copy_from_slice(chunk);
            self.flash.write_raw(word_addr, &word.0)?;
        }
        Ok(())
    }
}
