// Licensed under the Apache-2.0 license

//! Page-level flash programming.

use crate::common::{Logger, NoOpLogger};
use crate::flash::pic32_nvm::Nvm;
use crate::flash::{FlashError, FlashGeometry, ERASED_WORD, RAW_ALIGNMENT, RAW_BLOCK_SIZE};
use crate::irq::{CriticalSectionIrq, InterruptControl};
use crate::memory_map::MemoryMap;
use crate::regs::{virt_to_phys, RegisterAccess};
use zerocopy::byteorder::little_endian::U32;
use zerocopy::{FromBytes, IntoBytes};

const WORD: u32 = 4;

pub struct Flash<R, I = CriticalSectionIrq, L: Logger = NoOpLogger> {
    nvm: Nvm<R, I>,
    geometry: FlashGeometry,
    logger: L,
}

impl<R: RegisterAccess, I: InterruptControl, L: Logger> Flash<R, I, L> {
    pub fn new(bus: R, map: &MemoryMap, geometry: FlashGeometry, irq: I, logger: L) -> Self {
        Self {
            nvm: Nvm::new(bus, map, irq),
            geometry,
            logger,
        }
    }

    pub fn geometry(&self) -> &FlashGeometry {
        &self.geometry
    }

    /// Start address of `page`.
    ///
    /// # Panics
    ///
    /// If `page` is not below the page count.
    pub fn page_address(&self, page: u32) -> u32 {
        match self.geometry.page_address(page) {
            Some(addr) => addr,
            None => panic!(
                "flash page {page} out of range ({} pages)",
                self.geometry.page_count
            ),
        }
    }

    /// Page containing `addr`, if it lies in flash.
    pub fn page_of(&self, addr: u32) -> Option<u32> {
        self.geometry.page_of(addr)
    }

    /// Erase `page`.
    ///
    /// # Errors
    ///
    /// [`FlashError::WriteError`] or [`FlashError::LowVoltage`].
    ///
    /// # Panics
    ///
    /// If `page` is out of range.
    pub fn erase(&mut self, page: u32) -> Result<(), FlashError> {
        let addr = self.page_address(page);
        self.logger.debug(format_args!("flash: erase page {page} at {addr:#010x}"));
        self.nvm.clear_errors();
        self.nvm.erase_page(virt_to_phys(addr))
    }

    /// Erase `page`, then program it from `data` unless `data` is `None`.
    ///
    /// Programming stops at the first chunk that latches an NVM error.
    ///
    /// # Errors
    ///
    /// [`FlashError::WriteError`] or [`FlashError::LowVoltage`].
    ///
    /// # Panics
    ///
    /// If `page` is out of range, `data` is not exactly one page, or
    /// `data` is not word aligned.
    pub fn write(&mut self, page: u32, data: Option<&[u8]>) -> Result<(), FlashError> {
        let addr = self.page_address(page);
        if let Some(data) = data {
            assert_eq!(
                data.len(),
                self.geometry.page_size as usize,
                "page data must be exactly one page"
            );
            self.check_raw(addr, data);
        }
        self.erase(page)?;
        match data {
            Some(data) => self.write_raw(addr, data),
            None => Ok(()),
        }
    }

    /// Program `data` at `target` without erasing first.
    ///
    /// Full rows go through the row operation when both `data` and
    /// `target` sit on a row boundary; the rest is programmed word by
    /// word.
    ///
    /// # Errors
    ///
    /// [`FlashError::WriteError`] or [`FlashError::LowVoltage`] from the
    /// first failing chunk; later chunks are not attempted.
    ///
    /// # Panics
    ///
    /// Before any register access, if the length is not a multiple of
    /// [`RAW_BLOCK_SIZE`], if `target` or `data` is not aligned to
    /// [`RAW_ALIGNMENT`], or if the range leaves the flash.
    pub fn write_raw(&mut self, target: u32, data: &[u8]) -> Result<(), FlashError> {
        self.check_raw(target, data);
        self.nvm.clear_errors();
        let row = self.geometry.row_size;
        let mut dst = target;
        let mut rest = data;
        while !rest.is_empty() {
            let row_aligned = dst % row == 0 && rest.as_ptr() as usize % row as usize == 0;
            let row_chunk = if row_aligned {
                rest.split_at_checked(row as usize)
            } else {
                None
            };
            if let Some((chunk, tail)) = row_chunk {
                let source = self.nvm.bus().source_address(chunk);
                self.logger
                    .debug(format_args!("flash: row of {row} bytes to {dst:#010x}"));
                self.nvm.program_row(virt_to_phys(dst), source)?;
                dst += row;
                rest = tail;
            } else {
                let Ok((word, tail)) = U32::read_from_prefix(rest) else {
                    break;
                };
                self.nvm.program_word(virt_to_phys(dst), word.get())?;
                dst += WORD;
                rest = tail;
            }
        }
        Ok(())
    }

    fn check_raw(&self, target: u32, data: &[u8]) {
        let len = u32::try_from(data.len()).unwrap_or(u32::MAX);
        assert!(
            len % RAW_BLOCK_SIZE == 0,
            "flash write length {len} is not a multiple of {RAW_BLOCK_SIZE}"
        );
        assert!(
            target % RAW_ALIGNMENT == 0 && data.as_ptr() as usize % RAW_ALIGNMENT as usize == 0,
            "flash write source and destination must be {RAW_ALIGNMENT}-byte aligned"
        );
        assert!(
            target >= self.geometry.base
                && target
                    .checked_add(len)
                    .is_some_and(|end| end <= self.geometry.end()),
            "flash write {target:#010x}+{len} leaves the flash"
        );
    }

    /// Copy `buf.len()` bytes starting at `addr` out of flash.
    ///
    /// # Panics
    ///
    /// If `addr` or the length is not word aligned, or the range leaves
    /// the flash.
    pub fn read_raw(&self, addr: u32, buf: &mut [u8]) {
        let len = u32::try_from(buf.len()).unwrap_or(u32::MAX);
        assert!(
            addr % WORD == 0 && len % WORD == 0,
            "flash read must be word aligned"
        );
        assert!(
            addr >= self.geometry.base
                && addr.checked_add(len).is_some_and(|end| end <= self.geometry.end()),
            "flash read {addr:#010x}+{len} leaves the flash"
        );
        for (chunk, word_addr) in buf.chunks_exact_mut(WORD as usize).zip((addr..).step_by(4)) {
            let word = U32::new(self.nvm.bus().read(word_addr));
            chunk.copy_from_slice(word.as_bytes());
        }
    }

    /// Copy `page` into `buf`.
    ///
    /// # Panics
    ///
    /// If `page` is out of range or `buf` is not exactly one page.
    pub fn read(&self, page: u32, buf: &mut [u8]) {
        assert_eq!(
            buf.len(),
            self.geometry.page_size as usize,
            "page buffer must be exactly one page"
        );
        self.read_raw(self.page_address(page), buf);
    }

    /// True when every word of `page` reads back erased.
    ///
    /// # Panics
    ///
    /// If `page` is out of range.
    pub fn is_erased(&self, page: u32) -> bool {
        let addr = self.page_address(page);
        (addr..addr + self.geometry.page_size)
            .step_by(4)
            .all(|a| self.nvm.bus().read(a) == ERASED_WORD)
    }

    /// Compare `page` against `data`, word by word from its start.
    ///
    /// # Errors
    ///
    /// [`FlashError::Mismatch`] with the byte offset of the first word
    /// that differs.
    ///
    /// # Panics
    ///
    /// If `page` is out of range, `data` is longer than a page, or its
    /// length is not a multiple of four.
    pub fn verify(&self, page: u32, data: &[u8]) -> Result<(), FlashError> {
        let addr = self.page_address(page);
        assert!(
            data.len() <= self.geometry.page_size as usize && data.len() % WORD as usize == 0,
            "verify data must be whole words within one page"
        );
        for (offset, chunk) in (0u32..).step_by(4).zip(data.chunks_exact(WORD as usize)) {
            let expected = U32::read_from_bytes(chunk).ok().map(U32::get);
            if expected != Some(self.nvm.bus().read(addr + offset)) {
                self.logger
                    .debug(format_args!("flash: page {page} differs at {offset:#x}"));
                return Err(FlashError::Mismatch { offset });
            }
        }
        Ok(())
    }

    /// [`write`](Self::write) then [`verify`](Self::verify).
    ///
    /// # Errors
    ///
    /// The first error of either step.
    pub fn write_and_verify(&mut self, page: u32, data: &[u8]) -> Result<(), FlashError> {
        self.write(page, Some(data))?;
        self.verify(page, data)
    }
}
