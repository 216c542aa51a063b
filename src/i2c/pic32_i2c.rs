// Licensed under the Apache-2.0 license

//! PIC32 I2C master engine.
//!
//! Drives one controller through its CON/STAT/BRG/TRN/RCV registers. Each
//! hardware condition the engine waits for is a named predicate that
//! `poll::wait` spins on, so bounded waits only change the configured
//! [`Timeout`].
//!
//! ## Failure handling
//!
//! Any failure after a START condition (NACK, bus collision, wait timeout)
//! ends the frame with a STOP before the short count is returned, in both
//! directions and regardless of `NO_STOP`. The bus is therefore never left
//! held by a failed transfer.

use crate::common::{Logger, NoOpLogger};
use crate::i2c::common::{baud_divisor, Direction, Error, Flags};
use crate::i2c::traits::{address_byte, I2cHardwareCore, I2cMaster};
use crate::poll::{self, ready_when, Timeout};
use crate::register_block;
use crate::regs::RegisterAccess;
use core::convert::Infallible;
use fugit::HertzU32;

register_block! {
    /// I2C controller registers.
    pub struct I2cRegs {
        con = 0x00,
        stat = 0x10,
        brg = 0x40,
        trn = 0x50,
        rcv = 0x60,
    }
}

pub mod con {
    pub const SEN: u32 = 1 << 0;
    pub const RSEN: u32 = 1 << 1;
    pub const PEN: u32 = 1 << 2;
    pub const RCEN: u32 = 1 << 3;
    pub const ACKEN: u32 = 1 << 4;
    pub const ACKDT: u32 = 1 << 5;
    pub const SMEN: u32 = 1 << 8;
    pub const ON: u32 = 1 << 15;

    /// Any bus sequence still in progress.
    pub const PENDING: u32 = SEN | RSEN | PEN | RCEN | ACKEN;
}

pub mod stat {
    pub const TBF: u32 = 1 << 0;
    pub const RBF: u32 = 1 << 1;
    pub const BCL: u32 = 1 << 10;
    pub const TRSTAT: u32 = 1 << 14;
    pub const ACKSTAT: u32 = 1 << 15;
}

/// Why a byte-level primitive gave up.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Fault {
    Nack,
    Collision,
    Timeout,
}

pub struct Pic32I2c<R, L: Logger = NoOpLogger> {
    regs: I2cRegs<R>,
    controller: u8,
    timeout: Timeout,
    held: Option<Direction>,
    logger: L,
}

impl<R: RegisterAccess, L: Logger> Pic32I2c<R, L> {
    pub fn new(regs: I2cRegs<R>, controller: u8, timeout: Timeout, logger: L) -> Self {
        Self {
            regs,
            controller,
            timeout,
            held: None,
            logger,
        }
    }

    /// Direction of the frame left open by a `NO_STOP` transfer.
    pub fn held(&self) -> Option<Direction> {
        self.held
    }

    /// Program the baud-rate generator for `speed`.
    ///
    /// The divisor is validated first; on error no register is touched.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidSpeed`] if `speed` cannot be generated from `pclk`.
    pub fn configure(&mut self, pclk: HertzU32, speed: HertzU32, smbus: bool) -> Result<(), Error> {
        let brg = baud_divisor(pclk, speed).map_err(|e| {
            self.logger.error(format_args!(
                "i2c{}: no divisor for {} Hz at {} Hz",
                self.controller,
                speed.raw(),
                pclk.raw()
            ));
            e
        })?;
        self.regs.con().write(0);
        self.regs.brg().write(brg);
        if smbus {
            self.regs.con().set_bits(con::SMEN);
        }
        self.held = None;
        Ok(())
    }

    fn bus_idle(&self) -> nb::Result<(), Infallible> {
        ready_when(
            !self.regs.con().is_set(con::PENDING) && !self.regs.stat().is_set(stat::TRSTAT),
        )
    }

    fn start_done(&self) -> nb::Result<(), Infallible> {
        ready_when(!self.regs.con().is_set(con::SEN))
    }

    fn restart_done(&self) -> nb::Result<(), Infallible> {
        ready_when(!self.regs.con().is_set(con::RSEN))
    }

    fn stop_done(&self) -> nb::Result<(), Infallible> {
        ready_when(!self.regs.con().is_set(con::PEN))
    }

    fn tx_drained(&self) -> nb::Result<(), Infallible> {
        ready_when(!self.regs.stat().is_set(stat::TBF))
    }

    fn rx_full(&self) -> nb::Result<(), Infallible> {
        ready_when(self.regs.stat().is_set(stat::RBF))
    }

    fn block_on(&self, ready: fn(&Self) -> nb::Result<(), Infallible>) -> Result<(), Fault> {
        poll::wait(self.timeout, || ready(self)).map_err(|_| Fault::Timeout)
    }

    fn send_start(&mut self) -> Result<(), Fault> {
        self.regs.con().set_bits(con::SEN);
        self.block_on(Self::start_done)
    }

    fn send_restart(&mut self) -> Result<(), Fault> {
        self.regs.con().set_bits(con::RSEN);
        self.block_on(Self::restart_done)
    }

    fn send_stop(&mut self) -> Result<(), Fault> {
        self.held = None;
        self.regs.con().set_bits(con::PEN);
        self.block_on(Self::stop_done)
    }

    fn send_byte(&mut self, byte: u8) -> Result<(), Fault> {
        self.regs.trn().write(u32::from(byte));
        self.block_on(Self::bus_idle)?;
        self.block_on(Self::tx_drained)?;
        let status = self.regs.stat().read();
        if status & stat::BCL != 0 {
            return Err(Fault::Collision);
        }
        if status & stat::ACKSTAT != 0 {
            return Err(Fault::Nack);
        }
        Ok(())
    }

    fn receive_byte(&mut self, nack: bool) -> Result<u8, Fault> {
        self.regs.con().set_bits(con::RCEN);
        self.block_on(Self::bus_idle)?;
        self.block_on(Self::rx_full)?;
        if self.regs.stat().is_set(stat::BCL) {
            return Err(Fault::Collision);
        }
        if nack {
            self.regs.con().set_bits(con::ACKDT);
        } else {
            self.regs.con().clear_bits(con::ACKDT);
        }
        self.regs.con().set_bits(con::ACKEN);
        self.block_on(Self::bus_idle)?;
        Ok(self.regs.rcv().read() as u8)
    }

    fn send_address(&mut self, addr: u8, direction: Direction) -> Result<(), Fault> {
        self.send_byte(address_byte(addr, direction))
    }

    /// START (or repeated START while a frame is held) plus address byte.
    fn open(&mut self, addr: u8, direction: Direction) -> Result<(), Fault> {
        if self.held.is_some() {
            self.send_restart()?;
        } else {
            self.send_start()?;
        }
        self.held = Some(direction);
        self.send_address(addr, direction)
    }

    /// End a failed frame. Returns `transferred` for the caller to report.
    fn abort(&mut self, addr: u8, transferred: usize, fault: Fault) -> usize {
        self.logger.debug(format_args!(
            "i2c{}: {:?} at 0x{:02x} after {} bytes",
            self.controller, fault, addr, transferred
        ));
        if fault == Fault::Collision {
            self.regs.stat().clear_bits(stat::BCL);
        }
        if self.send_stop().is_err() {
            self.logger.error(format_args!("i2c{}: stop never completed", self.controller));
        }
        transferred
    }

    fn finish(&mut self, direction: Direction, flags: Flags) {
        if flags.contains(Flags::NO_STOP) {
            self.held = Some(direction);
        } else if self.send_stop().is_err() {
            self.logger.error(format_args!("i2c{}: stop never completed", self.controller));
        }
    }

    /// Reject framings the engine does not generate. Runs before any
    /// register access.
    fn check_framing(&self, direction: Direction, flags: Flags) -> Result<(), Error> {
        if flags.contains(Flags::ADDR10) {
            return Err(Error::Unsupported);
        }
        if flags.contains(Flags::NO_START) && self.held != Some(direction) {
            return Err(Error::Unsupported);
        }
        Ok(())
    }

    fn close_if_empty(&mut self, direction: Direction, flags: Flags) {
        if self.held == Some(direction)
            && !flags.contains(Flags::NO_STOP)
            && self.send_stop().is_err()
        {
            self.logger.error(format_args!("i2c{}: stop never completed", self.controller));
        }
    }

    /// Release the bus if a `NO_STOP` frame is still open.
    pub fn close(&mut self) {
        if self.held.is_some() && self.send_stop().is_err() {
            self.logger.error(format_args!("i2c{}: stop never completed", self.controller));
        }
    }
}

impl<R: RegisterAccess, L: Logger> I2cHardwareCore for Pic32I2c<R, L> {
    type Error = Error;

    fn power_on(&mut self) {
        self.regs.con().set_bits(con::ON);
    }

    fn power_off(&mut self) {
        self.regs.con().clear_bits(con::ON);
        self.held = None;
    }
}

impl<R: RegisterAccess, L: Logger> I2cMaster for Pic32I2c<R, L> {
    fn read_bytes(&mut self, addr: u8, buffer: &mut [u8], flags: Flags) -> Result<usize, Error> {
        self.check_framing(Direction::Read, flags)?;
        if buffer.is_empty() {
            self.close_if_empty(Direction::Read, flags);
            return Ok(0);
        }
        if !flags.contains(Flags::NO_START) {
            if let Err(fault) = self.open(addr, Direction::Read) {
                return Ok(self.abort(addr, 0, fault));
            }
        }
        let last = buffer.len() - 1;
        let nack_last = !flags.contains(Flags::NO_STOP) || flags.contains(Flags::NACK_LAST);
        for (index, slot) in buffer.iter_mut().enumerate() {
            let nack = index == last && nack_last;
            match self.receive_byte(nack) {
                Ok(byte) => *slot = byte,
                Err(fault) => return Ok(self.abort(addr, index, fault)),
            }
        }
        self.finish(Direction::Read, flags);
        Ok(buffer.len())
    }

    fn write_bytes(&mut self, addr: u8, data: &[u8], flags: Flags) -> Result<usize, Error> {
        self.check_framing(Direction::Write, flags)?;
        if data.is_empty() {
            self.close_if_empty(Direction::Write, flags);
            return Ok(0);
        }
        if !flags.contains(Flags::NO_START) {
            if let Err(fault) = self.open(addr, Direction::Write) {
                return Ok(self.abort(addr, 0, fault));
            }
        }
        for (sent, &byte) in data.iter().enumerate() {
            if let Err(fault) = self.send_byte(byte) {
                return Ok(self.abort(addr, sent, fault));
            }
        }
        self.finish(Direction::Write, flags);
        Ok(data.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::sim::{Access, I2cEvent, SimBus, SimTarget};
    use fugit::RateExtU32;

    const BASE: u32 = 0xBF82_0200;

    fn engine(sim: &SimBus) -> Pic32I2c<&SimBus> {
        sim.add_i2c(BASE);
        Pic32I2c::new(I2cRegs::new(sim, BASE), 2, Timeout::Never, NoOpLogger)
    }

    #[test]
    fn configure_writes_divisor_then_smbus() {
        let sim = SimBus::new();
        let mut i2c = engine(&sim);
        i2c.configure(100.MHz(), 100.kHz(), true).unwrap();
        assert_eq!(sim.writes_to(BASE), vec![0]);
        assert_eq!(sim.writes_to(BASE + 0x40), vec![487]);
        assert_eq!(sim.writes_to(BASE + 0x08), vec![con::SMEN]);
    }

    #[test]
    fn invalid_speed_leaves_hardware_untouched() {
        let sim = SimBus::new();
        let mut i2c = engine(&sim);
        assert_eq!(i2c.configure(100.MHz(), 0.Hz(), true), Err(Error::InvalidSpeed));
        assert!(sim.log().is_empty());
    }

    #[test]
    fn address_byte_reaches_transmit_register() {
        let sim = SimBus::new();
        let mut i2c = engine(&sim);
        sim.add_i2c_target(BASE, 0x3C, SimTarget::default());
        sim.add_i2c_target(BASE, 0x51, SimTarget::responding(&[0x99]));

        assert_eq!(i2c.write_bytes(0x3C, &[0x00], Flags::NONE), Ok(1));
        let mut byte = 0;
        assert_eq!(i2c.read_byte(0x51, &mut byte, Flags::NONE), Ok(1));
        let trn = sim.writes_to(BASE + 0x50);
        assert_eq!(trn, vec![0x78, 0x00, 0xA3]);
        assert_eq!(byte, 0x99);
    }

    #[test]
    fn write_frame_on_the_wire() {
        let sim = SimBus::new();
        let mut i2c = engine(&sim);
        sim.add_i2c_target(BASE, 0x50, SimTarget::default());
        assert_eq!(i2c.write_bytes(0x50, &[1, 2, 3], Flags::NONE), Ok(3));
        assert_eq!(
            sim.i2c_events(BASE),
            vec![
                I2cEvent::Start,
                I2cEvent::Address(0xA0),
                I2cEvent::Tx(1),
                I2cEvent::Tx(2),
                I2cEvent::Tx(3),
                I2cEvent::Stop,
            ]
        );
        assert_eq!(sim.i2c_target(BASE, 0x50).received, vec![1, 2, 3]);
        assert_eq!(i2c.held(), None);
    }

    #[test]
    fn nack_at_byte_k_returns_k_and_stops() {
        for k in 0..4 {
            let sim = SimBus::new();
            let mut i2c = engine(&sim);
            sim.add_i2c_target(
                BASE,
                0x50,
                SimTarget {
                    nack_at: Some(k),
                    ..SimTarget::default()
                },
            );
            assert_eq!(i2c.write_bytes(0x50, &[10, 11, 12, 13], Flags::NONE), Ok(k));
            let events = sim.i2c_events(BASE);
            let sent = events.iter().filter(|e| matches!(e, I2cEvent::Tx(_))).count();
            assert_eq!(sent, k + 1, "no byte attempted after the failing one");
            assert_eq!(events.last(), Some(&I2cEvent::Stop));
        }
    }

    #[test]
    fn collision_counts_as_short_transfer() {
        let sim = SimBus::new();
        let mut i2c = engine(&sim);
        sim.add_i2c_target(
            BASE,
            0x50,
            SimTarget {
                collide_at: Some(1),
                ..SimTarget::default()
            },
        );
        assert_eq!(i2c.write_bytes(0x50, &[1, 2, 3], Flags::NONE), Ok(1));
        assert_eq!(sim.read_raw(BASE + 0x10) & stat::BCL, 0);
    }

    #[test]
    fn read_collision_at_byte_k_returns_k_and_stops() {
        for k in 0..3 {
            let sim = SimBus::new();
            let mut i2c = engine(&sim);
            sim.add_i2c_target(
                BASE,
                0x68,
                SimTarget {
                    collide_at: Some(k),
                    ..SimTarget::responding(&[1, 2, 3, 4])
                },
            );
            let mut buf = [0u8; 4];
            assert_eq!(i2c.read_bytes(0x68, &mut buf, Flags::NONE), Ok(k));
            assert_eq!(&buf[..k], &[1u8, 2, 3][..k]);
            let events = sim.i2c_events(BASE);
            let received = events.iter().filter(|e| matches!(e, I2cEvent::Rx(_))).count();
            assert_eq!(received, k + 1, "no receive enabled after the collision");
            let rcen_writes = sim
                .writes_to(BASE + 0x08)
                .iter()
                .filter(|v| **v & con::RCEN != 0)
                .count();
            assert_eq!(rcen_writes, k + 1);
            assert_eq!(events.last(), Some(&I2cEvent::Stop));
            assert_eq!(sim.read_raw(BASE + 0x10) & stat::BCL, 0);
            assert_eq!(i2c.held(), None);
        }
    }

    #[test]
    fn nack_last_ends_held_read_with_nack() {
        let sim = SimBus::new();
        let mut i2c = engine(&sim);
        sim.add_i2c_target(BASE, 0x68, SimTarget::responding(&[7, 8]));
        let mut buf = [0u8; 2];
        assert_eq!(
            i2c.read_bytes(0x68, &mut buf, Flags::NO_STOP | Flags::NACK_LAST),
            Ok(2)
        );
        assert_eq!(i2c.held(), Some(Direction::Read));
        assert_eq!(i2c.write_bytes(0x68, &[9], Flags::NONE), Ok(1));
        assert_eq!(
            sim.i2c_events(BASE),
            vec![
                I2cEvent::Start,
                I2cEvent::Address(0xD1),
                I2cEvent::Rx(7),
                I2cEvent::Ack,
                I2cEvent::Rx(8),
                I2cEvent::Nack,
                I2cEvent::Restart,
                I2cEvent::Address(0xD0),
                I2cEvent::Tx(9),
                I2cEvent::Stop,
            ]
        );
    }

    #[test]
    fn missing_target_sends_stop_after_address() {
        let sim = SimBus::new();
        let mut i2c = engine(&sim);
        let mut buf = [0u8; 2];
        assert_eq!(i2c.read_bytes(0x20, &mut buf, Flags::NONE), Ok(0));
        assert_eq!(
            sim.i2c_events(BASE),
            vec![I2cEvent::Start, I2cEvent::Address(0x41), I2cEvent::Stop]
        );
    }

    #[test]
    fn last_read_byte_is_nacked() {
        let sim = SimBus::new();
        let mut i2c = engine(&sim);
        sim.add_i2c_target(BASE, 0x68, SimTarget::responding(&[1, 2, 3, 4]));
        let mut buf = [0u8; 4];
        assert_eq!(i2c.read_bytes(0x68, &mut buf, Flags::NONE), Ok(4));
        assert_eq!(buf, [1, 2, 3, 4]);
        let acks: Vec<I2cEvent> = sim
            .i2c_events(BASE)
            .into_iter()
            .filter(|e| matches!(e, I2cEvent::Ack | I2cEvent::Nack))
            .collect();
        assert_eq!(
            acks,
            vec![I2cEvent::Ack, I2cEvent::Ack, I2cEvent::Ack, I2cEvent::Nack]
        );
    }

    #[test]
    fn no_start_no_stop_on_idle_bus_is_rejected_without_bus_access() {
        let sim = SimBus::new();
        let mut i2c = engine(&sim);
        sim.add_i2c_target(BASE, 0x50, SimTarget::default());
        assert_eq!(
            i2c.write_bytes(0x50, &[1], Flags::NO_START | Flags::NO_STOP),
            Err(Error::Unsupported)
        );
        assert_eq!(
            i2c.write_bytes(0x50, &[1], Flags::ADDR10),
            Err(Error::Unsupported)
        );
        assert!(sim.log().is_empty());
    }

    #[test]
    fn held_frame_continues_without_start() {
        let sim = SimBus::new();
        let mut i2c = engine(&sim);
        sim.add_i2c_target(BASE, 0x50, SimTarget::default());
        assert_eq!(i2c.write_bytes(0x50, &[1], Flags::NO_STOP), Ok(1));
        assert_eq!(i2c.held(), Some(Direction::Write));
        assert_eq!(
            i2c.write_bytes(0x50, &[2], Flags::NO_START | Flags::NO_STOP),
            Ok(1)
        );
        assert_eq!(i2c.write_bytes(0x50, &[3], Flags::NO_START), Ok(1));
        assert_eq!(
            sim.i2c_events(BASE),
            vec![
                I2cEvent::Start,
                I2cEvent::Address(0xA0),
                I2cEvent::Tx(1),
                I2cEvent::Tx(2),
                I2cEvent::Tx(3),
                I2cEvent::Stop,
            ]
        );
    }

    #[test]
    fn register_read_uses_repeated_start() {
        let sim = SimBus::new();
        let mut i2c = engine(&sim);
        sim.add_i2c_target(BASE, 0x1D, SimTarget::responding(&[0xAA, 0xBB]));
        let mut buf = [0u8; 2];
        assert_eq!(i2c.read_regs(0x1D, 0x0F, &mut buf, Flags::NONE), Ok(2));
        assert_eq!(buf, [0xAA, 0xBB]);
        assert_eq!(
            sim.i2c_events(BASE),
            vec![
                I2cEvent::Start,
                I2cEvent::Address(0x3A),
                I2cEvent::Tx(0x0F),
                I2cEvent::Restart,
                I2cEvent::Address(0x3B),
                I2cEvent::Rx(0xAA),
                I2cEvent::Ack,
                I2cEvent::Rx(0xBB),
                I2cEvent::Nack,
                I2cEvent::Stop,
            ]
        );
    }

    #[test]
    fn sixteen_bit_register_write_is_one_frame() {
        let sim = SimBus::new();
        let mut i2c = engine(&sim);
        sim.add_i2c_target(BASE, 0x50, SimTarget::default());
        assert_eq!(
            i2c.write_regs(0x50, 0x0102, &[0xDE, 0xAD], Flags::REG16),
            Ok(2)
        );
        assert_eq!(
            sim.i2c_events(BASE),
            vec![
                I2cEvent::Start,
                I2cEvent::Address(0xA0),
                I2cEvent::Tx(0x01),
                I2cEvent::Tx(0x02),
                I2cEvent::Tx(0xDE),
                I2cEvent::Tx(0xAD),
                I2cEvent::Stop,
            ]
        );
    }

    #[test]
    fn register_nack_reports_zero_data_bytes() {
        let sim = SimBus::new();
        let mut i2c = engine(&sim);
        sim.add_i2c_target(
            BASE,
            0x50,
            SimTarget {
                nack_at: Some(0),
                ..SimTarget::default()
            },
        );
        assert_eq!(i2c.write_reg(0x50, 0x10, 0x55, Flags::NONE), Ok(0));
        assert_eq!(i2c.held(), None);
    }

    #[test]
    fn wedged_start_times_out_as_short_count() {
        let sim = SimBus::new();
        sim.add_i2c(BASE);
        sim.wedge_i2c(BASE);
        let mut i2c = Pic32I2c::new(I2cRegs::new(&sim, BASE), 2, Timeout::Spins(8), NoOpLogger);
        assert_eq!(i2c.write_bytes(0x50, &[1, 2], Flags::NONE), Ok(0));
        let trn_writes = sim
            .log()
            .iter()
            .filter(|a| matches!(a, Access::Write { addr, .. } if *addr == BASE + 0x50))
            .count();
        assert_eq!(trn_writes, 0);
    }

    #[derive(Default)]
    struct CountErrors(std::cell::Cell<usize>);

    impl Logger for CountErrors {
        fn debug(&self, _args: core::fmt::Arguments<'_>) {}
        fn warn(&self, _args: core::fmt::Arguments<'_>) {}
        fn error(&self, _args: core::fmt::Arguments<'_>) {
            self.0.set(self.0.get() + 1);
        }
    }

    #[test]
    fn empty_transfer_closing_a_frame_logs_stuck_stop() {
        let sim = SimBus::new();
        sim.add_i2c(BASE);
        sim.add_i2c_target(BASE, 0x50, SimTarget::default());
        let errors = CountErrors::default();
        let mut i2c = Pic32I2c::new(I2cRegs::new(&sim, BASE), 2, Timeout::Spins(8), &errors);
        assert_eq!(i2c.write_bytes(0x50, &[1], Flags::NO_STOP), Ok(1));
        sim.wedge_i2c_stop(BASE);
        assert_eq!(i2c.write_bytes(0x50, &[], Flags::NONE), Ok(0));
        assert_eq!(errors.0.get(), 1);
        assert_eq!(i2c.held(), None);
    }

    #[test]
    fn power_toggles_module_enable() {
        let sim = SimBus::new();
        let mut i2c = engine(&sim);
        i2c.power_on();
        assert!(sim.read_raw(BASE) & con::ON != 0);
        i2c.power_off();
        assert_eq!(sim.read_raw(BASE) & con::ON, 0);
    }
}
