// Licensed under the Apache-2.0 license

//! Minimal pin primitive used for chip-select lines and bus pin setup.

use crate::memory_map::MemoryMap;
use crate::register_block;
use crate::regs::RegisterAccess;
use core::convert::Infallible;

/// GPIO port letter.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Port {
    A = 0,
    B = 1,
    C = 2,
    D = 3,
    E = 4,
    F = 5,
    G = 6,
    H = 7,
    J = 8,
    K = 9,
}

/// A pin, encoded as `port << 4 | number`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Pin(u8);

impl Pin {
    #[must_use]
    pub const fn new(port: Port, number: u8) -> Self {
        Self(((port as u8) << 4) | (number & 0xF))
    }

    #[must_use]
    pub const fn raw(self) -> u8 {
        self.0
    }

    /// Port index (A = 0).
    #[must_use]
    pub const fn port(self) -> u8 {
        self.0 >> 4
    }

    #[must_use]
    pub const fn number(self) -> u8 {
        self.0 & 0xF
    }

    #[must_use]
    pub const fn mask(self) -> u32 {
        1 << self.number()
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PinMode {
    Input,
    Output,
}

/// Pin drive primitive.
pub trait Gpio {
    /// Make `pin` a digital pin in `mode`.
    fn init(&self, pin: Pin, mode: PinMode);
    /// Drive high.
    fn set(&self, pin: Pin);
    /// Drive low.
    fn clear(&self, pin: Pin);
}

impl<G: Gpio + ?Sized> Gpio for &G {
    fn init(&self, pin: Pin, mode: PinMode) {
        (**self).init(pin, mode);
    }

    fn set(&self, pin: Pin) {
        (**self).set(pin);
    }

    fn clear(&self, pin: Pin) {
        (**self).clear(pin);
    }
}

register_block! {
    /// One GPIO port.
    pub struct PortRegs {
        ansel = 0x00,
        tris = 0x10,
        port = 0x20,
        lat = 0x30,
    }
}

/// GPIO through the port registers.
#[derive(Clone, Debug)]
pub struct PortGpio<R> {
    bus: R,
    port_a: u32,
    spacing: u32,
}

impl<R: RegisterAccess + Clone> PortGpio<R> {
    pub fn new(bus: R, map: &MemoryMap) -> Self {
        Self {
            bus,
            port_a: map.port_a_base,
            spacing: map.port_spacing,
        }
    }

    fn regs(&self, pin: Pin) -> PortRegs<&R> {
        PortRegs::new(&self.bus, self.port_a + u32::from(pin.port()) * self.spacing)
    }

    /// Level currently seen on the pin.
    pub fn read(&self, pin: Pin) -> bool {
        self.regs(pin).port().is_set(pin.mask())
    }
}

impl<R: RegisterAccess + Clone> Gpio for PortGpio<R> {
    fn init(&self, pin: Pin, mode: PinMode) {
        let regs = self.regs(pin);
        regs.ansel().clear_bits(pin.mask());
        match mode {
            PinMode::Input => regs.tris().set_bits(pin.mask()),
            PinMode::Output => regs.tris().clear_bits(pin.mask()),
        }
    }

    fn set(&self, pin: Pin) {
        self.regs(pin).lat().set_bits(pin.mask());
    }

    fn clear(&self, pin: Pin) {
        self.regs(pin).lat().clear_bits(pin.mask());
    }
}

/// A chip-select line as an `embedded-hal` output pin.
pub struct CsPin<G> {
    gpio: G,
    pin: Pin,
}

impl<G: Gpio> CsPin<G> {
    /// Configure `pin` as an output, idle high.
    pub fn new(gpio: G, pin: Pin) -> Self {
        gpio.init(pin, PinMode::Output);
        gpio.set(pin);
        Self { gpio, pin }
    }
}

impl<G: Gpio> embedded_hal::digital::ErrorType for CsPin<G> {
    type Error = Infallible;
}

impl<G: Gpio> embedded_hal::digital::OutputPin for CsPin<G> {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.gpio.clear(self.pin);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.gpio.set(self.pin);
        Ok(())
    }
}
