// Licensed under the Apache-2.0 license

//! Flash prefetch cache setup.

use crate::memory_map::{Family, MemoryMap};
use crate::regs::{Reg, RegisterAccess};
use fugit::HertzU32;

/// Fastest clock at which program flash answers without wait states.
pub const FLASH_CLOCK: HertzU32 = HertzU32::MHz(30);

pub const PFMWS_MASK: u32 = 0x7;
/// PRECON: predictive prefetch for CPU instructions only.
pub const PRECON_PREFEN_INSTRUCTIONS: u32 = 0b01 << 4;
/// CHECON: predictive prefetch for all regions.
pub const CHECON_PREFEN_ALL: u32 = 0b11 << 4;
/// CHECON: one data cache line.
pub const CHECON_DCSZ_ONE_LINE: u32 = 0b01 << 8;

/// Program flash wait states needed at `system_clock`.
#[must_use]
pub fn wait_states(system_clock: HertzU32) -> u32 {
    (system_clock.raw() / FLASH_CLOCK.raw()).saturating_sub(1)
}

/// Program the flash wait states for `system_clock` and turn on
/// prefetching when the flash is slower than the core. At low clocks
/// prefetching only costs power, so it stays off.
pub fn init<R: RegisterAccess>(bus: &R, map: &MemoryMap, system_clock: HertzU32) {
    let reg = Reg::new(bus, map.prefetch_base);
    let ws = wait_states(system_clock);
    reg.write(ws & PFMWS_MASK);
    if ws == 0 {
        return;
    }
    match map.family {
        Family::Pic32mz => reg.set_bits(PRECON_PREFEN_INSTRUCTIONS),
        Family::Pic32mx => reg.set_bits(CHECON_PREFEN_ALL | CHECON_DCSZ_ONE_LINE),
    }
}
