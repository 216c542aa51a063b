// Licensed under the Apache-2.0 license

//! # I2C Bus Arena
//!
//! The board table lists every I2C bus the board wires up. [`I2cBuses`]
//! turns that table into a fixed-capacity arena: one slot per entry, each
//! with its controller base address and its own bus lock. Callers name a
//! bus with an [`I2cBusId`], a 0-based index into the board table; the
//! hardware controller number lives in the table entry.
//!
//! ## Lifecycle
//!
//! ```text
//! I2cBuses::new(table)          once, at startup
//!   ├── init(bus)               pins + divisor, before first use
//!   ├── power_on(bus)
//!   └── acquire(bus) -> I2cGuard
//!         ├── read_bytes / write_bytes / read_regs / write_regs ...
//!         └── drop / release()  STOP if a frame is still open, unlock
//! ```
//!
//! Two guards for the same bus never coexist: `acquire` blocks on the
//! bus lock. Guards for different buses are independent. `init`,
//! `power_on` and `power_off` take the same lock for their register
//! writes, so they wait for an outstanding guard; calling them while the
//! current thread holds a guard for that bus deadlocks.
//!
//! ## Bounds checking
//!
//! An index past the end of the table either returns
//! [`Error::NoSuchBus`] or panics, per [`BoundsPolicy`] in the
//! [`I2cConfig`].

use crate::common::{BoundsPolicy, Logger, NoOpLogger};
use crate::gpio::{Gpio, PinMode};
use crate::i2c::common::{Error, Flags, I2cConf, I2cConfig, I2cSpeed};
use crate::i2c::pic32_i2c::{I2cRegs, Pic32I2c};
use crate::i2c::traits::{I2cHardwareCore, I2cMaster};
use crate::memory_map::MemoryMap;
use crate::regs::RegisterAccess;
use crate::sync::{RawBusLock, SpinBusLock};
use fugit::HertzU32;

/// Index of a bus in the board table.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct I2cBusId(pub u8);

struct Slot<K> {
    conf: I2cConf,
    base: u32,
    lock: K,
}

pub struct I2cBuses<R, G, const N: usize, L: Logger = NoOpLogger, K: RawBusLock = SpinBusLock> {
    bus: R,
    gpio: G,
    pclk: HertzU32,
    config: I2cConfig,
    slots: heapless::Vec<Slot<K>, N>,
    logger: L,
}

impl<R, G, const N: usize, L, K> I2cBuses<R, G, N, L, K>
where
    R: RegisterAccess + Clone,
    G: Gpio,
    L: Logger,
    K: RawBusLock,
{
    /// Build the arena from a board table.
    ///
    /// # Errors
    ///
    /// [`Error::NoSuchBus`] if an entry names a controller the family does
    /// not have, [`Error::TooManyBuses`] if the table is longer than `N`.
    pub fn new(
        bus: R,
        gpio: G,
        map: &MemoryMap,
        pclk: HertzU32,
        table: &[I2cConf],
        config: I2cConfig,
        logger: L,
    ) -> Result<Self, Error> {
        let mut slots = heapless::Vec::new();
        for conf in table {
            let base = map.i2c_base(conf.controller).ok_or(Error::NoSuchBus)?;
            slots
                .push(Slot {
                    conf: *conf,
                    base,
                    lock: K::INIT,
                })
                .map_err(|_| Error::TooManyBuses)?;
        }
        Ok(Self {
            bus,
            gpio,
            pclk,
            config,
            slots,
            logger,
        })
    }

    /// Number of buses in the board table.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    fn slot(&self, id: I2cBusId) -> Result<&Slot<K>, Error> {
        match self.slots.get(usize::from(id.0)) {
            Some(slot) => Ok(slot),
            None => match self.config.bounds {
                BoundsPolicy::Error => Err(Error::NoSuchBus),
                BoundsPolicy::Assert => panic!("I2C bus {} is not in the board table", id.0),
            },
        }
    }

    fn engine(&self, slot: &Slot<K>) -> Pic32I2c<R, &L> {
        Pic32I2c::new(
            I2cRegs::new(self.bus.clone(), slot.base),
            slot.conf.controller,
            self.config.timeout,
            &self.logger,
        )
    }

    /// Run `f` on the bus engine with the bus lock held.
    fn locked<T>(&self, slot: &Slot<K>, f: impl FnOnce(&mut Pic32I2c<R, &L>) -> T) -> T {
        slot.lock.lock();
        let result = f(&mut self.engine(slot));
        slot.lock.unlock();
        result
    }

    /// Set up pins and the baud-rate generator at the table's speed.
    ///
    /// # Errors
    ///
    /// [`Error::NoSuchBus`] or [`Error::InvalidSpeed`]; in the latter case
    /// no register has been written.
    pub fn init(&self, id: I2cBusId) -> Result<(), Error> {
        let speed = self.slot(id)?.conf.speed;
        self.init_with_speed(id, speed)
    }

    /// Like [`init`](Self::init) with an explicit speed.
    ///
    /// # Errors
    ///
    /// See [`init`](Self::init).
    pub fn init_with_speed(&self, id: I2cBusId, speed: I2cSpeed) -> Result<(), Error> {
        let slot = self.slot(id)?;
        let Some(frequency) = speed.frequency() else {
            self.logger
                .error(format_args!("i2c{}: {:?} not supported", slot.conf.controller, speed));
            return Err(Error::InvalidSpeed);
        };
        crate::i2c::common::baud_divisor(self.pclk, frequency)?;
        self.locked(slot, |engine| {
            self.gpio.init(slot.conf.scl, PinMode::Output);
            self.gpio.init(slot.conf.sda, PinMode::Output);
            engine.configure(self.pclk, frequency, self.config.smbus_levels)
        })
    }

    /// # Errors
    ///
    /// [`Error::NoSuchBus`].
    pub fn power_on(&self, id: I2cBusId) -> Result<(), Error> {
        let slot = self.slot(id)?;
        self.locked(slot, |engine| engine.power_on());
        Ok(())
    }

    /// # Errors
    ///
    /// [`Error::NoSuchBus`].
    pub fn power_off(&self, id: I2cBusId) -> Result<(), Error> {
        let slot = self.slot(id)?;
        self.locked(slot, |engine| engine.power_off());
        Ok(())
    }

    /// Block until the bus is free and take it.
    ///
    /// # Errors
    ///
    /// [`Error::NoSuchBus`].
    pub fn acquire(&self, id: I2cBusId) -> Result<I2cGuard<'_, R, L, K>, Error> {
        let slot = self.slot(id)?;
        slot.lock.lock();
        Ok(I2cGuard {
            engine: self.engine(slot),
            lock: &slot.lock,
        })
    }

    /// Take the bus only if nobody holds it.
    ///
    /// # Errors
    ///
    /// [`Error::NoSuchBus`].
    pub fn try_acquire(&self, id: I2cBusId) -> Result<Option<I2cGuard<'_, R, L, K>>, Error> {
        let slot = self.slot(id)?;
        if !slot.lock.try_lock() {
            return Ok(None);
        }
        Ok(Some(I2cGuard {
            engine: self.engine(slot),
            lock: &slot.lock,
        }))
    }
}

/// Exclusive use of one bus for the guard's lifetime.
pub struct I2cGuard<'a, R: RegisterAccess, L: Logger, K: RawBusLock> {
    engine: Pic32I2c<R, &'a L>,
    lock: &'a K,
}

impl<R: RegisterAccess, L: Logger, K: RawBusLock> I2cGuard<'_, R, L, K> {
    /// Give the bus back. Same as dropping the guard.
    pub fn release(self) {}
}

impl<R: RegisterAccess, L: Logger, K: RawBusLock> Drop for I2cGuard<'_, R, L, K> {
    fn drop(&mut self) {
        self.engine.close();
        self.lock.unlock();
    }
}

impl<R: RegisterAccess, L: Logger, K: RawBusLock> I2cHardwareCore for I2cGuard<'_, R, L, K> {
    type Error = Error;

    fn power_on(&mut self) {
        self.engine.power_on();
    }

    fn power_off(&mut self) {
        self.engine.power_off();
    }
}

impl<R: RegisterAccess, L: Logger, K: RawBusLock> I2cMaster for I2cGuard<'_, R, L, K> {
    fn read_bytes(&mut self, addr: u8, buffer: &mut [u8], flags: Flags) -> Result<usize, Error> {
        self.engine.read_bytes(addr, buffer, flags)
    }

    fn write_bytes(&mut self, addr: u8, data: &[u8], flags: Flags) -> Result<usize, Error> {
        self.engine.write_bytes(addr, data, flags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::wifire;
    use crate::gpio::{Pin, Port};
    use crate::i2c::common::I2cConfigBuilder;
    use crate::memory_map::PIC32MZ;
    use crate::tests::sim::{GpioCall, I2cEvent, SimBus, SimGpio, SimTarget};
    use core::sync::atomic::{AtomicBool, Ordering};
    use fugit::RateExtU32;
    use std::time::Duration;

    const I2C2: u32 = 0xBF82_0200;

    fn buses<'a>(
        sim: &'a SimBus,
        gpio: &'a SimGpio,
        bounds: BoundsPolicy,
    ) -> I2cBuses<&'a SimBus, &'a SimGpio, 4> {
        I2cBuses::new(
            sim,
            gpio,
            &PIC32MZ,
            wifire::PERIPHERAL_CLOCK,
            &wifire::I2C,
            I2cConfigBuilder::new().bounds(bounds).build(),
            NoOpLogger,
        )
        .unwrap()
    }

    #[test]
    fn table_entries_map_to_controller_bases() {
        let sim = SimBus::new();
        let gpio = SimGpio::default();
        let i2c = buses(&sim, &gpio, BoundsPolicy::Error);
        assert_eq!(i2c.len(), 3);
        i2c.power_on(I2cBusId(0)).unwrap();
        assert_eq!(sim.writes_to(I2C2 + 0x08), vec![1 << 15]);
    }

    #[test]
    fn init_configures_pins_then_divisor() {
        let sim = SimBus::new();
        let gpio = SimGpio::default();
        let i2c = buses(&sim, &gpio, BoundsPolicy::Error);
        i2c.init(I2cBusId(0)).unwrap();
        assert_eq!(
            gpio.calls(),
            vec![
                GpioCall::Init(Pin::new(Port::A, 2), PinMode::Output),
                GpioCall::Init(Pin::new(Port::A, 3), PinMode::Output),
            ]
        );
        assert_eq!(sim.writes_to(I2C2 + 0x40), vec![487]);
    }

    #[test]
    fn unsupported_speed_fails_before_hardware() {
        let sim = SimBus::new();
        let gpio = SimGpio::default();
        let i2c = buses(&sim, &gpio, BoundsPolicy::Error);
        assert_eq!(
            i2c.init_with_speed(I2cBusId(1), I2cSpeed::High),
            Err(Error::InvalidSpeed)
        );
        assert!(gpio.calls().is_empty());
        assert!(sim.log().is_empty());
    }

    #[test]
    fn out_of_range_bus_returns_error() {
        let sim = SimBus::new();
        let gpio = SimGpio::default();
        let i2c = buses(&sim, &gpio, BoundsPolicy::Error);
        assert!(matches!(i2c.acquire(I2cBusId(3)), Err(Error::NoSuchBus)));
        assert_eq!(i2c.init(I2cBusId(9)), Err(Error::NoSuchBus));
    }

    #[test]
    #[should_panic(expected = "not in the board table")]
    fn out_of_range_bus_asserts_when_configured() {
        let sim = SimBus::new();
        let gpio = SimGpio::default();
        let i2c = buses(&sim, &gpio, BoundsPolicy::Assert);
        let _ = i2c.power_on(I2cBusId(3));
    }

    #[test]
    fn table_larger_than_arena_is_rejected() {
        let sim = SimBus::new();
        let gpio = SimGpio::default();
        let result: Result<I2cBuses<&SimBus, &SimGpio, 2>, Error> = I2cBuses::new(
            &sim,
            &gpio,
            &PIC32MZ,
            100.MHz(),
            &wifire::I2C,
            I2cConfigBuilder::new().build(),
            NoOpLogger,
        );
        assert!(matches!(result, Err(Error::TooManyBuses)));
    }

    #[test]
    fn guard_holds_lock_until_dropped() {
        let sim = SimBus::new();
        let gpio = SimGpio::default();
        let i2c = buses(&sim, &gpio, BoundsPolicy::Error);
        let guard = i2c.acquire(I2cBusId(0)).unwrap();
        assert!(i2c.try_acquire(I2cBusId(0)).unwrap().is_none());
        assert!(i2c.try_acquire(I2cBusId(1)).unwrap().is_some());
        guard.release();
        assert!(i2c.try_acquire(I2cBusId(0)).unwrap().is_some());
    }

    #[test]
    fn power_off_waits_for_the_guard() {
        let sim = SimBus::new();
        let gpio = SimGpio::default();
        let i2c = buses(&sim, &gpio, BoundsPolicy::Error);
        i2c.power_on(I2cBusId(0)).unwrap();
        let done = AtomicBool::new(false);
        let guard = i2c.acquire(I2cBusId(0)).unwrap();
        std::thread::scope(|s| {
            let worker = s.spawn(|| {
                i2c.power_off(I2cBusId(0)).unwrap();
                done.store(true, Ordering::SeqCst);
            });
            std::thread::sleep(Duration::from_millis(20));
            assert!(!done.load(Ordering::SeqCst));
            assert_ne!(sim.read_raw(I2C2) & (1 << 15), 0);
            guard.release();
            worker.join().unwrap();
        });
        assert!(done.load(Ordering::SeqCst));
        assert_eq!(sim.read_raw(I2C2) & (1 << 15), 0);
        assert!(i2c.try_acquire(I2cBusId(0)).unwrap().is_some());
    }

    #[test]
    fn dropping_guard_closes_open_frame() {
        let sim = SimBus::new();
        sim.add_i2c(I2C2);
        sim.add_i2c_target(I2C2, 0x50, SimTarget::default());
        let gpio = SimGpio::default();
        let i2c = buses(&sim, &gpio, BoundsPolicy::Error);
        {
            let mut guard = i2c.acquire(I2cBusId(0)).unwrap();
            assert_eq!(guard.write_bytes(0x50, &[7], Flags::NO_STOP), Ok(1));
        }
        assert_eq!(sim.i2c_events(I2C2).last(), Some(&I2cEvent::Stop));
    }
}
