// Licensed under the Apache-2.0 license

use crate::board::wifire;
use crate::common::NoOpLogger;
use crate::i2c::{Flags, I2cBusId, I2cBuses, I2cConfigBuilder, I2cMaster};
use crate::memory_map::PIC32MZ;
use crate::tests::sim::{Access, SimBus, SimGpio, SimTarget};
use std::thread::ThreadId;

const I2C2: u32 = 0xBF82_0200;
const I2C3: u32 = 0xBF82_0400;
const CONSET: u32 = I2C2 + 0x08;
const SEN: u32 = 1 << 0;
const PEN: u32 = 1 << 2;
const ROUNDS: u8 = 25;

fn arena<'a>(sim: &'a SimBus, gpio: &'a SimGpio) -> I2cBuses<&'a SimBus, &'a SimGpio, 3> {
    I2cBuses::new(
        sim,
        gpio,
        &PIC32MZ,
        wifire::PERIPHERAL_CLOCK,
        &wifire::I2C,
        I2cConfigBuilder::new().build(),
        NoOpLogger,
    )
    .unwrap()
}

/// Every START..STOP window on the controller belongs to a single thread.
fn assert_frames_not_interleaved(log: &[Access]) {
    let mut owner: Option<ThreadId> = None;
    let mut frames = 0;
    for access in log {
        let Some(addr) = access.addr() else { continue };
        if !(I2C2..I2C2 + 0x70).contains(&addr) {
            continue;
        }
        if let Some(thread) = owner {
            assert_eq!(access.thread(), thread, "foreign access inside a frame");
        }
        if let Access::Write { addr: CONSET, value, thread } = *access {
            if value & SEN != 0 {
                assert!(owner.is_none(), "START inside an open frame");
                owner = Some(thread);
                frames += 1;
            }
            if value & PEN != 0 {
                owner = None;
            }
        }
    }
    assert_eq!(frames, 2 * usize::from(ROUNDS));
}

#[test]
fn transfers_on_one_bus_never_interleave() {
    let sim = SimBus::new();
    sim.add_i2c(I2C2);
    sim.add_i2c_target(I2C2, 0x50, SimTarget::default());
    let gpio = SimGpio::default();
    let i2c = arena(&sim, &gpio);

    std::thread::scope(|s| {
        for tag in [0xA0u8, 0xB0] {
            let i2c = &i2c;
            s.spawn(move || {
                for round in 0..ROUNDS {
                    let mut guard = i2c.acquire(I2cBusId(0)).unwrap();
                    let frame = [tag, tag + 1, tag + 2, round];
                    assert_eq!(guard.write_bytes(0x50, &frame, Flags::NONE), Ok(4));
                }
            });
        }
    });

    assert_frames_not_interleaved(&sim.log());
    let received = sim.i2c_target(I2C2, 0x50).received;
    assert_eq!(received.len(), 4 * 2 * usize::from(ROUNDS));
    for frame in received.chunks_exact(4) {
        assert_eq!(frame[1], frame[0] + 1);
        assert_eq!(frame[2], frame[0] + 2);
    }
}

#[test]
fn other_buses_stay_available_while_one_is_held() {
    let sim = SimBus::new();
    sim.add_i2c(I2C2);
    sim.add_i2c(I2C3);
    sim.add_i2c_target(I2C3, 0x21, SimTarget::default());
    let gpio = SimGpio::default();
    let i2c = arena(&sim, &gpio);

    let held = i2c.acquire(I2cBusId(0)).unwrap();
    std::thread::scope(|s| {
        s.spawn(|| {
            assert!(i2c.try_acquire(I2cBusId(0)).unwrap().is_none());
            let mut other = i2c.acquire(I2cBusId(1)).unwrap();
            assert_eq!(other.write_byte(0x21, 0x5A, Flags::NONE), Ok(1));
        });
    });
    held.release();

    assert_eq!(sim.i2c_target(I2C3, 0x21).received, vec![0x5A]);
    assert!(i2c.try_acquire(I2cBusId(0)).unwrap().is_some());
}
