// Licensed under the Apache-2.0 license

//! Real-time clock and calendar (RTCC).
//!
//! Time and date live in BCD registers with a two-digit year, so the
//! calendar covers 2000 through 2099. RTCCON writes need the SYSKEY unlock
//! sequence followed by RTCWREN; the alarm registers do not.
//!
//! SYSKEY is shared with other system unlock sequences and is not guarded
//! by any lock here.

use crate::irq::{with_masked, CriticalSectionIrq, InterruptControl};
use crate::memory_map::{MemoryMap, PMD6_RTCCMD};
use crate::poll::{self, ready_when};
use crate::register_block;
use crate::regs::{Reg, RegisterAccess};
use core::convert::Infallible;

register_block! {
    pub struct RtcRegs {
        con = 0x00,
        alrm = 0x10,
        time = 0x20,
        date = 0x30,
        alrmtime = 0x40,
        alrmdate = 0x50,
    }
}

pub mod con {
    pub const RTCSYNC: u32 = 1 << 2;
    pub const RTCWREN: u32 = 1 << 3;
    pub const RTCCLKON: u32 = 1 << 6;
    pub const ON: u32 = 1 << 15;
}

pub mod alrm {
    pub const ARPT_MASK: u32 = 0xFF;
    pub const AMASK_MASK: u32 = 0xF << 8;
    /// Alarm fires once a day, matching hours, minutes and seconds.
    pub const AMASK_DAILY: u32 = 0x6 << 8;
    pub const ALRMSYNC: u32 = 1 << 12;
    pub const CHIME: u32 = 1 << 14;
    pub const ALRMEN: u32 = 1 << 15;

    pub const SETTINGS: u32 = ALRMEN | CHIME | AMASK_MASK | ARPT_MASK;
}

pub const SYSKEY1: u32 = 0xAA99_6655;
pub const SYSKEY2: u32 = 0x5566_99AA;

const YEAR_BASE: u16 = 2000;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Error {
    /// A field is out of range, or the hardware holds a value that is not
    /// a calendar date.
    InvalidDateTime,
}

/// Calendar time as kept by the RTCC.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct DateTime {
    /// 2000 to 2099.
    pub year: u16,
    /// 1 to 12.
    pub month: u8,
    /// 1 to 31.
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

fn to_bcd(value: u8) -> u32 {
    (u32::from(value / 10) << 4) | u32::from(value % 10)
}

fn from_bcd(field: u32) -> Option<u8> {
    let tens = (field >> 4) & 0xF;
    let ones = field & 0xF;
    if tens > 9 || ones > 9 {
        return None;
    }
    u8::try_from(tens * 10 + ones).ok()
}

fn field(register: u32, shift: u32) -> Option<u8> {
    from_bcd((register >> shift) & 0xFF)
}

impl DateTime {
    fn validate(&self) -> Result<(), Error> {
        let valid = (YEAR_BASE..YEAR_BASE + 100).contains(&self.year)
            && (1..=12).contains(&self.month)
            && (1..=31).contains(&self.day)
            && self.hour < 24
            && self.minute < 60
            && self.second < 60;
        if valid {
            Ok(())
        } else {
            Err(Error::InvalidDateTime)
        }
    }

    /// RTCTIME / ALRMTIME layout.
    fn time_bits(&self) -> u32 {
        (to_bcd(self.hour) << 24) | (to_bcd(self.minute) << 16) | (to_bcd(self.second) << 8)
    }

    /// RTCDATE / ALRMDATE layout, weekday left zero.
    fn date_bits(&self) -> u32 {
        let year = (self.year - YEAR_BASE) as u8;
        (to_bcd(year) << 24) | (to_bcd(self.month) << 16) | (to_bcd(self.day) << 8)
    }

    fn decode(time: u32, date: u32) -> Option<Self> {
        Some(Self {
            year: YEAR_BASE + u16::from(field(date, 24)?),
            month: field(date, 16)?,
            day: field(date, 8)?,
            hour: field(time, 24)?,
            minute: field(time, 16)?,
            second: field(time, 8)?,
        })
    }

    fn from_registers(time: u32, date: u32) -> Result<Self, Error> {
        let decoded = Self::decode(time, date).ok_or(Error::InvalidDateTime)?;
        decoded.validate()?;
        Ok(decoded)
    }
}

pub struct Rtc<R, I = CriticalSectionIrq> {
    regs: RtcRegs<R>,
    syskey: u32,
    pmd6: u32,
    irq: I,
}

impl<R: RegisterAccess, I: InterruptControl> Rtc<R, I> {
    pub fn new(bus: R, map: &MemoryMap, irq: I) -> Self {
        Self {
            regs: RtcRegs::new(bus, map.rtc_base),
            syskey: map.syskey,
            pmd6: map.pmd6,
            irq,
        }
    }

    fn syskey(&self) -> Reg<'_, R> {
        Reg::new(self.regs.bus(), self.syskey)
    }

    fn pmd6(&self) -> Reg<'_, R> {
        Reg::new(self.regs.bus(), self.pmd6)
    }

    fn unlock(&self) {
        with_masked(&self.irq, || {
            self.syskey().write(0);
            self.syskey().write(SYSKEY1);
            self.syskey().write(SYSKEY2);
            self.regs.con().set_bits(con::RTCWREN);
            self.syskey().write(0);
        });
    }

    fn lock(&self) {
        self.regs.con().clear_bits(con::RTCWREN);
    }

    fn clock_running(&self) -> nb::Result<(), Infallible> {
        ready_when(self.regs.con().is_set(con::RTCCLKON))
    }

    fn time_stable(&self) -> nb::Result<(), Infallible> {
        ready_when(!self.regs.con().is_set(con::RTCSYNC))
    }

    fn alarm_stable(&self) -> nb::Result<(), Infallible> {
        ready_when(!self.regs.alrm().is_set(alrm::ALRMSYNC))
    }

    /// Power the module, disable the alarm and start the clock.
    pub fn init(&self) {
        self.pmd6().clear_bits(PMD6_RTCCMD);
        self.unlock();
        self.regs.alrm().write(0);
        self.regs.con().set_bits(con::ON);
        self.lock();
        poll::block(|| self.clock_running());
    }

    /// # Errors
    ///
    /// [`Error::InvalidDateTime`] before any register is touched.
    pub fn set_time(&self, time: &DateTime) -> Result<(), Error> {
        time.validate()?;
        poll::block(|| self.time_stable());
        self.unlock();
        self.regs.date().write(time.date_bits());
        self.regs.time().write(time.time_bits());
        self.lock();
        Ok(())
    }

    /// # Errors
    ///
    /// [`Error::InvalidDateTime`] if the clock was never set.
    pub fn get_time(&self) -> Result<DateTime, Error> {
        poll::block(|| self.time_stable());
        let date = self.regs.date().read();
        let time = self.regs.time().read();
        DateTime::from_registers(time, date)
    }

    /// Arm a daily alarm at the time of day in `time`, replacing any
    /// previous alarm. The hardware matches hours, minutes and seconds.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidDateTime`] before any register is touched.
    pub fn set_alarm(&self, time: &DateTime) -> Result<(), Error> {
        time.validate()?;
        poll::block(|| self.alarm_stable());
        self.regs.alrm().clear_bits(alrm::SETTINGS);
        self.regs.alrmtime().write(time.time_bits());
        self.regs.alrmdate().write(time.date_bits());
        self.regs.alrm().set_bits(alrm::AMASK_DAILY);
        self.regs.alrm().set_bits(alrm::ALRMEN);
        Ok(())
    }

    /// # Errors
    ///
    /// [`Error::InvalidDateTime`] if no alarm was ever set.
    pub fn get_alarm(&self) -> Result<DateTime, Error> {
        let date = self.regs.alrmdate().read();
        let time = self.regs.alrmtime().read();
        DateTime::from_registers(time, date)
    }

    pub fn clear_alarm(&self) {
        self.regs.alrm().clear_bits(alrm::ALRMEN);
    }

    pub fn power_on(&self) {
        self.pmd6().clear_bits(PMD6_RTCCMD);
        self.unlock();
        self.regs.con().set_bits(con::ON);
        self.lock();
    }

    pub fn power_off(&self) {
        self.unlock();
        self.regs.con().clear_bits(con::ON);
        self.lock();
        self.pmd6().set_bits(PMD6_RTCCMD);
    }
}
