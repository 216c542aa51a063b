// Licensed under the Apache-2.0 license

// Enforce Copilot coding guidelines - prevent panic-prone patterns in production code only
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::indexing_slicing))]
#![cfg_attr(not(test), warn(clippy::expect_used))]
#![cfg_attr(not(test), no_std)]
pub mod board;
pub mod common;
pub mod cpuid;
pub mod flash;
pub mod gpio;
pub mod i2c;
pub mod irq;
pub mod memory_map;
pub mod pcache;
pub mod poll;
pub mod regs;
pub mod rng;
pub mod rtc;
pub mod spi;
pub mod sync;
#[cfg(test)]
mod tests;
pub mod watchdog;
