// Licensed under the Apache-2.0 license

//! PIC32MZ random number generator.
//!
//! The block pairs a true-random source (TRNG) with a 64-bit LFSR
//! pseudo-random generator (PRNG). [`HwRng::init`] seeds the PRNG from the
//! TRNG, or from fixed constants on parts whose TRNG does not work, and
//! leaves it free-running. Reads then pull one PRNG word per
//! tap-length delay.
//!
//! The RNG registers have no SET/CLR aliases; every bit change here is a
//! read-modify-write.

use crate::common::{Logger, NoOpLogger};
use crate::memory_map::MemoryMap;
use crate::poll::{self, ready_when, spin_cycles};
use crate::register_block;
use crate::regs::{Reg, RegisterAccess};
use core::convert::Infallible;

register_block! {
    pub struct RngRegs {
        con = 0x04,
        poly1 = 0x08,
        poly2 = 0x0C,
        numgen1 = 0x10,
        numgen2 = 0x14,
        cnt = 0x20,
    }
}

pub mod con {
    pub const PLEN_MASK: u32 = 0x7F;
    pub const TRNGEN: u32 = 1 << 8;
    pub const PRNGEN: u32 = 1 << 9;
    pub const CONT: u32 = 1 << 10;
    pub const LOAD: u32 = 1 << 12;
}

/// DEVID (revision bits masked) of the PIC32MZ2048ECG100, whose TRNG
/// never produces entropy. Fitted to WiFire revisions A and B.
pub const DEFECTIVE_TRNG_ID: u32 = 0x0510_E053;
const DEVID_MASK: u32 = 0x0FFF_FFFF;

/// PRNG seed used when the TRNG is unusable.
pub const FALLBACK_SEED: [u32; 2] = [0x090A_0B0C, 0x0D0E_0F10];

pub const POLYNOMIAL: [u32; 2] = [0x00C0_0003, 0x0000_0000];
pub const TAP_LENGTH: u32 = 42;

/// Entropy bits the TRNG must collect before its output seeds the PRNG.
const SEED_BITS: u32 = 64;

pub struct HwRng<R, L: Logger = NoOpLogger> {
    regs: RngRegs<R>,
    devid: u32,
    logger: L,
}

impl<R: RegisterAccess, L: Logger> HwRng<R, L> {
    /// `None` on families without the RNG block.
    pub fn new(bus: R, map: &MemoryMap, logger: L) -> Option<Self> {
        let base = map.rng_base?;
        Some(Self {
            regs: RngRegs::new(bus, base),
            devid: map.devid,
            logger,
        })
    }

    fn entropy_ready(&self) -> nb::Result<(), Infallible> {
        ready_when(self.regs.cnt().read() >= SEED_BITS)
    }

    fn seed_loaded(&self) -> nb::Result<(), Infallible> {
        ready_when(!self.regs.con().is_set(con::LOAD))
    }

    fn trng_defective(&self) -> bool {
        let id = Reg::new(self.regs.bus(), self.devid).read();
        id & DEVID_MASK == DEFECTIVE_TRNG_ID
    }

    /// Seed the PRNG and start it in continuous mode.
    pub fn init(&mut self) {
        if self.trng_defective() {
            self.logger
                .warn(format_args!("hwrng: TRNG not working on PIC32MZ2048ECG100"));
            self.logger
                .warn(format_args!("hwrng: initializing PRNG with fixed seeds"));
            let [seed1, seed2] = FALLBACK_SEED;
            self.regs.numgen1().write(seed1);
            self.regs.numgen2().write(seed2);
        } else {
            self.regs.con().write(con::TRNGEN);
            poll::block(|| self.entropy_ready());
            self.regs.con().modify(|v| v | con::LOAD);
            poll::block(|| self.seed_loaded());
            self.regs.con().modify(|v| v & !con::TRNGEN);
        }

        let [poly1, poly2] = POLYNOMIAL;
        self.regs.poly1().write(poly1);
        self.regs.poly2().write(poly2);
        self.regs.con().modify(|v| v | TAP_LENGTH);
        self.regs.con().modify(|v| v | con::CONT);
    }

    fn wait_tap_length(&self) {
        spin_cycles(self.regs.con().read() & con::PLEN_MASK);
    }

    /// Fill `buf` from the PRNG.
    ///
    /// Each 8-byte group takes NUMGEN1 then NUMGEN2 after one tap-length
    /// delay; each trailing byte takes the low byte of NUMGEN1 after its
    /// own delay.
    pub fn read(&mut self, buf: &mut [u8]) {
        self.regs.con().modify(|v| v | con::PRNGEN);

        let mut groups = buf.chunks_exact_mut(8);
        for group in &mut groups {
            self.wait_tap_length();
            let (low, high) = group.split_at_mut(4);
            low.copy_from_slice(&self.regs.numgen1().read().to_le_bytes());
            high.copy_from_slice(&self.regs.numgen2().read().to_le_bytes());
        }
        for byte in groups.into_remainder() {
            self.wait_tap_length();
            *byte = self.regs.numgen1().read() as u8;
        }

        self.regs.con().modify(|v| v & !con::PRNGEN);
    }
}

impl<R: RegisterAccess, L: Logger> rand_core::RngCore for HwRng<R, L> {
    fn next_u32(&mut self) -> u32 {
        let mut bytes = [0u8; 4];
        self.read(&mut bytes);
        u32::from_le_bytes(bytes)
    }

    fn next_u64(&mut self) -> u64 {
        let mut bytes = [0u8; 8];
        self.read(&mut bytes);
        u64::from_le_bytes(bytes)
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.read(dest);
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand_core::Error> {
        self.read(dest);
        Ok(())
    }
}
