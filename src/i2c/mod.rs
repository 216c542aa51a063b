// Licensed under the Apache-2.0 license

//! PIC32 I2C master driver.
//!
//! Blocking, polled, 7-bit master transfers over the PIC32 I2C
//! controllers, with a per-bus lock arena built from the board table and an
//! `embedded-hal` adapter on top.

pub mod common;
pub mod hardware_instantiation;
pub mod i2c_controller;
pub mod pic32_i2c;
pub mod traits;

pub use common::{
    baud_divisor, Direction, Error, Flags, I2cConf, I2cConfig, I2cConfigBuilder, I2cSpeed,
};
pub use hardware_instantiation::{I2cBusId, I2cBuses, I2cGuard};
pub use i2c_controller::I2cController;
pub use pic32_i2c::Pic32I2c;
pub use traits::{I2cHardwareCore, I2cMaster};
