// Licensed under the Apache-2.0 license

//! PIC32 SPI master driver: byte-synchronous, full-duplex transfers with
//! GPIO chip selects.

pub mod common;
pub mod hardware_instantiation;
pub mod pic32_spi;

pub use common::{spi_divisor, Error, SpiClock, SpiConf, SpiConfig, SpiCs, SpiMode};
pub use hardware_instantiation::{SpiBusId, SpiBuses, SpiGuard};
pub use pic32_spi::Pic32Spi;
