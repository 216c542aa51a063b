// Licensed under the Apache-2.0 license

//! Start-up sequence of the 6LoWPAN Clicker against the simulated SoC.

use crate::board::clicker;
use crate::common::NoOpLogger;
use crate::flash::pic32_nvm::op;
use crate::flash::Flash;
use crate::gpio::{Pin, Port};
use crate::pcache;
use crate::spi::{SpiBusId, SpiBuses, SpiClock, SpiConfig, SpiCs, SpiMode};
use crate::tests::sim::{SimBus, SimGpio};
use crate::watchdog::Watchdog;

const SPI2: u32 = 0xBF80_5A00;
const PMD5: u32 = 0xBF80_F280;
const CHECON: u32 = 0xBF88_4000;
const NVMCON: u32 = 0xBF80_F400;
const RADIO_CS: SpiCs = SpiCs::Pin(Pin::new(Port::B, 2));

#[repr(C, align(512))]
struct Page([u8; 4096]);

#[test]
fn clicker_bringup() {
    let sim = SimBus::new();
    let gpio = SimGpio::default();
    let map = clicker::FAMILY.memory_map();

    pcache::init(&sim, map, clicker::SYSTEM_CLOCK);
    assert_eq!(sim.read_raw(CHECON), 2 | 0b11 << 4 | 0b01 << 8);

    let wdt = Watchdog::new(&sim, map, NoOpLogger);
    wdt.start();
    wdt.kick();

    // Radio register read over SPI2.
    sim.add_spi(SPI2);
    let spi: SpiBuses<_, _, 2> = SpiBuses::new(
        &sim,
        &gpio,
        map,
        clicker::PERIPHERAL_CLOCK,
        &clicker::SPI,
        SpiConfig::default(),
        NoOpLogger,
    )
    .unwrap();
    spi.init(SpiBusId(1)).unwrap();
    spi.init_cs(SpiBusId(1), RADIO_CS).unwrap();
    assert_eq!(sim.writes_to(0xBF80_FCA0), vec![0b0110]);
    {
        let mut radio = spi
            .acquire(SpiBusId(1), RADIO_CS, SpiMode::Mode0, SpiClock::Mhz1)
            .unwrap();
        sim.spi_queue_miso(SPI2, &[0x00, 0x42]);
        assert_eq!(radio.transfer_reg(RADIO_CS, 0x2A, 0x00), Ok(0x42));
    }
    assert_eq!(sim.writes_to(SPI2 + 0x30), vec![47]);
    assert_eq!(sim.spi_sent(SPI2), vec![0x2A, 0x00]);
    assert_eq!(sim.read_raw(PMD5) & 1 << 9, 1 << 9);

    // Configuration page in flash.
    sim.add_nvm(NVMCON, 0x40, 512, 4096, clicker::FLASH.base, 4096 * 128);
    let mut flash = Flash::new(&sim, map, clicker::FLASH, sim.irq(), NoOpLogger);
    let mut page = Page([0; 4096]);
    for (i, byte) in page.0.iter_mut().enumerate() {
        *byte = (i / 16) as u8;
    }
    flash.write_and_verify(127, &page.0).unwrap();
    let ops = sim.nvm_ops();
    assert_eq!(ops.len(), 1 + 4096 / 512);
    assert_eq!(ops[0].op, op::ERASE_PAGE);
    assert_eq!(ops[0].phys_addr, 0x1D07_F000);
    assert!(ops[1..].iter().all(|o| o.op == op::ROW_PROGRAM));
}
