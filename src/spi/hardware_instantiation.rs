// Licensed under the Apache-2.0 license

//! # SPI Bus Arena
//!
//! Same shape as the I2C arena: one slot per board-table entry, addressed
//! by a 0-based [`SpiBusId`], each with its own lock. A bus is
//! power-gated except while an [`SpiGuard`] holds it.
//!
//! ```text
//! SpiBuses::new(table)
//!   ├── init(bus)                          gate off, route pins
//!   ├── init_cs(bus, cs)                   chip select idles high
//!   └── acquire(bus, cs, mode, clk) -> SpiGuard
//!         ├── transfer_bytes / transfer_reg / SpiBus ...
//!         └── drop / release()             controller off, gate, unlock
//! ```
//!
//! Mode and clock are validated before the lock is taken, so a rejected
//! `acquire` leaves both the lock and the hardware untouched.

use crate::common::{BoundsPolicy, Logger, NoOpLogger};
use crate::gpio::{Gpio, PinMode};
use crate::memory_map::{MemoryMap, PMD5_SPI1MD};
use crate::regs::{Reg, RegisterAccess};
use crate::spi::common::{spi_divisor, Error, SpiConf, SpiConfig, SpiCs, SpiMode};
use crate::spi::pic32_spi::{Pic32Spi, SpiRegs, FILLER};
use crate::sync::{RawBusLock, SpinBusLock};
use fugit::HertzU32;

/// Index of a bus in the board table.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SpiBusId(pub u8);

struct Slot<K> {
    conf: SpiConf,
    base: u32,
    lock: K,
}

pub struct SpiBuses<R, G, const N: usize, L: Logger = NoOpLogger, K: RawBusLock = SpinBusLock> {
    bus: R,
    gpio: G,
    pclk: HertzU32,
    pmd5: u32,
    config: SpiConfig,
    slots: heapless::Vec<Slot<K>, N>,
    logger: L,
}

impl<R, G, const N: usize, L, K> SpiBuses<R, G, N, L, K>
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
    /// [`Error::NoSuchBus`] for a controller the family lacks,
    /// [`Error::TooManyBuses`] if the table is longer than `N`.
    pub fn new(
        bus: R,
        gpio: G,
        map: &MemoryMap,
        pclk: HertzU32,
        table: &[SpiConf],
        config: SpiConfig,
        logger: L,
    ) -> Result<Self, Error> {
        let mut slots = heapless::Vec::new();
        for conf in table {
            let base = map.spi_base(conf.controller).ok_or(Error::NoSuchBus)?;
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
            pmd5: map.pmd5,
            config,
            slots,
            logger,
        })
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    fn slot(&self, id: SpiBusId) -> Result<&Slot<K>, Error> {
        match self.slots.get(usize::from(id.0)) {
            Some(slot) => Ok(slot),
            None => match self.config.bounds {
                BoundsPolicy::Error => Err(Error::NoSuchBus),
                BoundsPolicy::Assert => panic!("SPI bus {} is not in the board table", id.0),
            },
        }
    }

    fn engine(&self, slot: &Slot<K>) -> Pic32Spi<R, &G, &L> {
        let disable_bit = PMD5_SPI1MD << (slot.conf.controller.saturating_sub(1));
        Pic32Spi::new(
            SpiRegs::new(self.bus.clone(), slot.base),
            &self.gpio,
            (self.pmd5, disable_bit),
            slot.conf.controller,
            self.config.timeout,
            &self.logger,
        )
    }

    /// Gate the module off and route its pins. The controller stays
    /// unpowered until the first `acquire`.
    ///
    /// # Errors
    ///
    /// [`Error::NoSuchBus`].
    pub fn init(&self, id: SpiBusId) -> Result<(), Error> {
        let slot = self.slot(id)?;
        slot.lock.lock();
        self.engine(slot).power_down();
        slot.lock.unlock();
        self.init_pins(id)
    }

    /// MOSI as output and MISO as input, then program both pin-mux
    /// selectors from the board table.
    ///
    /// # Errors
    ///
    /// [`Error::NoSuchBus`].
    pub fn init_pins(&self, id: SpiBusId) -> Result<(), Error> {
        let conf = self.slot(id)?.conf;
        self.gpio.init(conf.mosi, PinMode::Output);
        self.gpio.init(conf.miso, PinMode::Input);
        Reg::new(&self.bus, conf.mosi_mux).write(u32::from(conf.mosi_af));
        Reg::new(&self.bus, conf.miso_mux).write(u32::from(conf.miso_af));
        Ok(())
    }

    /// Make `cs` an output idling high.
    ///
    /// # Errors
    ///
    /// [`Error::NoSuchBus`], or [`Error::NoCs`] for [`SpiCs::Undefined`].
    pub fn init_cs(&self, id: SpiBusId, cs: SpiCs) -> Result<(), Error> {
        self.slot(id)?;
        let SpiCs::Pin(pin) = cs else {
            return Err(Error::NoCs);
        };
        self.gpio.init(pin, PinMode::Output);
        self.gpio.set(pin);
        Ok(())
    }

    /// Take the bus, power the controller and start it in `mode` at
    /// `clock`.
    ///
    /// # Errors
    ///
    /// [`Error::NoSuchBus`], [`Error::NoMode`] or [`Error::InvalidClock`].
    /// All three are reported before the lock is taken.
    pub fn acquire<M>(
        &self,
        id: SpiBusId,
        cs: SpiCs,
        mode: M,
        clock: impl Into<HertzU32>,
    ) -> Result<SpiGuard<'_, R, G, L, K>, Error>
    where
        M: TryInto<SpiMode>,
        Error: From<M::Error>,
    {
        let slot = self.slot(id)?;
        let (mode, brg) = self.validate(slot, mode, clock.into())?;
        slot.lock.lock();
        Ok(self.start(slot, cs, mode, brg))
    }

    /// Like [`acquire`](Self::acquire) but returns `Ok(None)` instead of
    /// blocking when the bus is held.
    ///
    /// # Errors
    ///
    /// See [`acquire`](Self::acquire).
    pub fn try_acquire<M>(
        &self,
        id: SpiBusId,
        cs: SpiCs,
        mode: M,
        clock: impl Into<HertzU32>,
    ) -> Result<Option<SpiGuard<'_, R, G, L, K>>, Error>
    where
        M: TryInto<SpiMode>,
        Error: From<M::Error>,
    {
        let slot = self.slot(id)?;
        let (mode, brg) = self.validate(slot, mode, clock.into())?;
        if !slot.lock.try_lock() {
            return Ok(None);
        }
        Ok(Some(self.start(slot, cs, mode, brg)))
    }

    fn validate<M>(&self, slot: &Slot<K>, mode: M, clock: HertzU32) -> Result<(SpiMode, u32), Error>
    where
        M: TryInto<SpiMode>,
        Error: From<M::Error>,
    {
        let mode = mode.try_into().map_err(Error::from).map_err(|e| {
            self.logger
                .error(format_args!("spi{}: no such mode", slot.conf.controller));
            e
        })?;
        let brg = spi_divisor(self.pclk, clock).map_err(|e| {
            self.logger.error(format_args!(
                "spi{}: cannot clock at {} Hz",
                slot.conf.controller,
                clock.raw()
            ));
            e
        })?;
        Ok((mode, brg))
    }

    fn start<'a>(&'a self, slot: &'a Slot<K>, cs: SpiCs, mode: SpiMode, brg: u32) -> SpiGuard<'a, R, G, L, K> {
        let mut engine = self.engine(slot);
        engine.configure(mode, brg);
        SpiGuard {
            engine,
            cs,
            lock: &slot.lock,
        }
    }
}

/// Exclusive, powered use of one bus for the guard's lifetime.
pub struct SpiGuard<'a, R: RegisterAccess, G: Gpio, L: Logger, K: RawBusLock> {
    engine: Pic32Spi<R, &'a G, &'a L>,
    cs: SpiCs,
    lock: &'a K,
}

impl<R: RegisterAccess, G: Gpio, L: Logger, K: RawBusLock> SpiGuard<'_, R, G, L, K> {
    /// Chip select named at acquire time.
    pub fn cs(&self) -> SpiCs {
        self.cs
    }

    /// Assert the acquire-time chip select, for use around the
    /// `embedded_hal::spi::SpiBus` methods which never touch it.
    pub fn select(&self) {
        self.engine.select(self.cs);
    }

    pub fn deselect(&self) {
        self.engine.deselect(self.cs);
    }

    /// Full-duplex transfer; see [`Pic32Spi::transfer`].
    ///
    /// # Errors
    ///
    /// [`Error::Timeout`] only under a bounded [`crate::poll::Timeout`].
    pub fn transfer_bytes(
        &mut self,
        cs: SpiCs,
        cont: bool,
        out: Option<&[u8]>,
        input: Option<&mut [u8]>,
    ) -> Result<(), Error> {
        self.engine.transfer(cs, cont, out, input)
    }

    /// Clock `len` dummy bytes; see [`Pic32Spi::clock`].
    ///
    /// # Errors
    ///
    /// See [`transfer_bytes`](Self::transfer_bytes).
    pub fn clock_bytes(&mut self, cs: SpiCs, cont: bool, len: usize) -> Result<(), Error> {
        self.engine.clock(cs, cont, len)
    }

    /// # Errors
    ///
    /// See [`transfer_bytes`](Self::transfer_bytes).
    pub fn transfer_byte(&mut self, cs: SpiCs, cont: bool, out: u8) -> Result<u8, Error> {
        let mut rx = [0u8; 1];
        self.engine.transfer(cs, cont, Some(&[out]), Some(&mut rx))?;
        let [byte] = rx;
        Ok(byte)
    }

    /// Send `reg`, then exchange one byte, under one chip select.
    ///
    /// # Errors
    ///
    /// See [`transfer_bytes`](Self::transfer_bytes).
    pub fn transfer_reg(&mut self, cs: SpiCs, reg: u8, out: u8) -> Result<u8, Error> {
        self.transfer_byte(cs, true, reg)?;
        self.transfer_byte(cs, false, out)
    }

    /// Send `reg`, then transfer a block, under one chip select.
    ///
    /// # Errors
    ///
    /// See [`transfer_bytes`](Self::transfer_bytes).
    pub fn transfer_regs(
        &mut self,
        cs: SpiCs,
        reg: u8,
        out: Option<&[u8]>,
        input: Option<&mut [u8]>,
    ) -> Result<(), Error> {
        self.transfer_byte(cs, true, reg)?;
        self.engine.transfer(cs, false, out, input)
    }

    /// Give the bus back. Same as dropping the guard.
    pub fn release(self) {}
}

impl<R: RegisterAccess, G: Gpio, L: Logger, K: RawBusLock> Drop for SpiGuard<'_, R, G, L, K> {
    fn drop(&mut self) {
        self.engine.shutdown();
        self.lock.unlock();
    }
}

impl<R: RegisterAccess, G: Gpio, L: Logger, K: RawBusLock> embedded_hal::spi::ErrorType
    for SpiGuard<'_, R, G, L, K>
{
    type Error = Error;
}

impl<R: RegisterAccess, G: Gpio, L: Logger, K: RawBusLock> embedded_hal::spi::SpiBus<u8>
    for SpiGuard<'_, R, G, L, K>
{
    fn read(&mut self, words: &mut [u8]) -> Result<(), Error> {
        self.engine.transfer(SpiCs::Undefined, true, None, Some(words))
    }

    fn write(&mut self, words: &[u8]) -> Result<(), Error> {
        self.engine.transfer(SpiCs::Undefined, true, Some(words), None)
    }

    fn transfer(&mut self, read: &mut [u8], write: &[u8]) -> Result<(), Error> {
        for index in 0..read.len().max(write.len()) {
            let byte = self.engine.exchange(write.get(index).copied().unwrap_or(FILLER))?;
            if let Some(slot) = read.get_mut(index) {
                *slot = byte;
            }
        }
        Ok(())
    }

    fn transfer_in_place(&mut self, words: &mut [u8]) -> Result<(), Error> {
        for word in words.iter_mut() {
            *word = self.engine.exchange(*word)?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), Error> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::wifire;
    use crate::gpio::{Pin, Port};
    use crate::memory_map::PIC32MZ;
    use crate::spi::common::SpiClock;
    use crate::tests::sim::{GpioCall, SimBus, SimGpio};
    use embedded_hal::spi::SpiBus;

    const SPI1: u32 = 0xBF82_1000;
    const SPI2: u32 = 0xBF82_1200;
    const PMD5: u32 = 0xBF80_0100;
    const CS: SpiCs = SpiCs::Pin(Pin::new(Port::D, 9));

    fn buses<'a>(
        sim: &'a SimBus,
        gpio: &'a SimGpio,
    ) -> SpiBuses<&'a SimBus, &'a SimGpio, 2> {
        sim.add_spi(SPI1);
        sim.add_spi(SPI2);
        SpiBuses::new(
            sim,
            gpio,
            &PIC32MZ,
            wifire::PERIPHERAL_CLOCK,
            &wifire::SPI,
            SpiConfig::default(),
            NoOpLogger,
        )
        .unwrap()
    }

    #[test]
    fn init_gates_module_and_routes_pins() {
        let sim = SimBus::new();
        let gpio = SimGpio::default();
        let spi = buses(&sim, &gpio);
        spi.init(SpiBusId(1)).unwrap();
        assert_eq!(sim.writes_to(PMD5 + 0x8), vec![1 << 9]);
        assert_eq!(
            gpio.calls(),
            vec![
                GpioCall::Init(Pin::new(Port::F, 0), PinMode::Output),
                GpioCall::Init(Pin::new(Port::D, 11), PinMode::Input),
            ]
        );
        assert_eq!(sim.writes_to(0xBF80_1640), vec![0b0110]);
        assert_eq!(sim.writes_to(0xBF80_14A8), vec![0b0011]);
    }

    #[test]
    fn init_cs_needs_a_pin() {
        let sim = SimBus::new();
        let gpio = SimGpio::default();
        let spi = buses(&sim, &gpio);
        assert_eq!(spi.init_cs(SpiBusId(0), SpiCs::Undefined), Err(Error::NoCs));
        spi.init_cs(SpiBusId(0), CS).unwrap();
        let SpiCs::Pin(pin) = CS else { unreachable!() };
        assert_eq!(
            gpio.calls(),
            vec![GpioCall::Init(pin, PinMode::Output), GpioCall::Set(pin)]
        );
    }

    #[test]
    fn bad_mode_is_rejected_before_any_access() {
        let sim = SimBus::new();
        let gpio = SimGpio::default();
        let spi = buses(&sim, &gpio);
        sim.clear_log();
        assert!(matches!(
            spi.acquire(SpiBusId(0), CS, 7u8, SpiClock::Mhz1),
            Err(Error::NoMode)
        ));
        assert!(matches!(
            spi.acquire(SpiBusId(0), CS, 0u8, fugit::HertzU32::from_raw(0)),
            Err(Error::InvalidClock)
        ));
        assert!(sim.log().is_empty());
        assert!(spi
            .try_acquire(SpiBusId(0), CS, SpiMode::Mode0, SpiClock::Mhz1)
            .unwrap()
            .is_some());
    }

    #[test]
    fn acquire_powers_and_release_gates() {
        let sim = SimBus::new();
        let gpio = SimGpio::default();
        let spi = buses(&sim, &gpio);
        let guard = spi
            .acquire(SpiBusId(0), CS, embedded_hal::spi::MODE_3, SpiClock::Mhz10)
            .unwrap();
        assert_eq!(sim.writes_to(PMD5 + 0x4), vec![1 << 8]);
        assert_eq!(sim.read_raw(SPI1 + 0x30), 4);
        assert!(spi
            .try_acquire(SpiBusId(0), CS, 0u8, SpiClock::Mhz1)
            .unwrap()
            .is_none());
        guard.release();
        assert_eq!(sim.read_raw(SPI1), 0);
        assert_eq!(sim.writes_to(PMD5 + 0x8), vec![1 << 8]);
        assert!(spi
            .try_acquire(SpiBusId(0), CS, 0u8, SpiClock::Mhz1)
            .unwrap()
            .is_some());
    }

    #[test]
    fn register_helpers_keep_cs_low_between_bytes() {
        let sim = SimBus::new();
        let gpio = SimGpio::default();
        let spi = buses(&sim, &gpio);
        let mut guard = spi.acquire(SpiBusId(0), CS, 0u8, SpiClock::Mhz1).unwrap();
        sim.spi_queue_miso(SPI1, &[0x00, 0x42]);
        assert_eq!(guard.transfer_reg(CS, 0x80 | 0x0F, 0x00), Ok(0x42));
        let SpiCs::Pin(pin) = CS else { unreachable!() };
        let framing: Vec<GpioCall> = gpio
            .calls()
            .into_iter()
            .filter(|c| matches!(c, GpioCall::Set(_) | GpioCall::Clear(_)))
            .collect();
        assert_eq!(
            framing,
            vec![GpioCall::Clear(pin), GpioCall::Clear(pin), GpioCall::Set(pin)]
        );
        assert_eq!(sim.spi_sent(SPI1), vec![0x8F, 0x00]);
    }

    #[test]
    fn spi_bus_transfer_pads_the_shorter_buffer() {
        let sim = SimBus::new();
        let gpio = SimGpio::default();
        let spi = buses(&sim, &gpio);
        let mut guard = spi.acquire(SpiBusId(1), CS, 0u8, SpiClock::Mhz5).unwrap();
        sim.spi_queue_miso(SPI2, &[1, 2, 3]);
        let mut read = [0u8; 3];
        guard.transfer(&mut read, &[0xAA]).unwrap();
        assert_eq!(read, [1, 2, 3]);
        assert_eq!(sim.spi_sent(SPI2), vec![0xAA, FILLER, FILLER]);

        let mut words = [9u8, 8];
        guard.transfer_in_place(&mut words).unwrap();
        assert_eq!(words, [9, 8]);
        guard.write(&[5]).unwrap();
        assert!(gpio.calls().is_empty());
    }
}
