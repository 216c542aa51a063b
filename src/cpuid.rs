// Licensed under the Apache-2.0 license

//! Device identification.

use crate::memory_map::MemoryMap;
use crate::regs::{Reg, RegisterAccess};

pub const CPUID_LEN: usize = 4;

/// Raw DEVID register: revision in bits 28..32, device id below.
pub fn device_id<R: RegisterAccess>(bus: &R, map: &MemoryMap) -> u32 {
    Reg::new(bus, map.devid).read()
}

/// The DEVID register as it sits in memory.
pub fn cpuid_get<R: RegisterAccess>(bus: &R, map: &MemoryMap) -> [u8; CPUID_LEN] {
    device_id(bus, map).to_le_bytes()
}
