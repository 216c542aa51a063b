// Licensed under the Apache-2.0 license

//! Blocking waits on hardware status.
//!
//! Each condition a driver waits for is written as a small predicate
//! returning `nb::Result<(), Infallible>`: `Ok(())` once the hardware is
//! ready, `Err(nb::Error::WouldBlock)` while it is not. [`wait`] drives the
//! predicate under a [`Timeout`]. The default, [`Timeout::Never`], spins
//! until the hardware answers.

use core::convert::Infallible;

/// How long a blocking wait may spin.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum Timeout {
    /// Spin until the condition holds.
    #[default]
    Never,
    /// Give up after this many unsuccessful polls.
    Spins(u32),
}

/// A bounded wait ran out of polls.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TimedOut;

/// Poll `ready` until it reports completion.
///
/// # Errors
///
/// Returns [`TimedOut`] if `timeout` is [`Timeout::Spins`] and the budget
/// is exhausted first.
pub fn wait<F>(timeout: Timeout, mut ready: F) -> Result<(), TimedOut>
where
    F: FnMut() -> nb::Result<(), Infallible>,
{
    let mut remaining = match timeout {
        Timeout::Never => None,
        Timeout::Spins(n) => Some(n),
    };
    loop {
        match ready() {
            Ok(()) => return Ok(()),
            Err(nb::Error::WouldBlock) => {}
            Err(nb::Error::Other(never)) => match never {},
        }
        if let Some(left) = remaining.as_mut() {
            if *left == 0 {
                return Err(TimedOut);
            }
            *left -= 1;
        }
        core::hint::spin_loop();
    }
}

/// Poll `ready` with no budget. For sequences that must not be abandoned
/// halfway, such as an armed NVM operation.
pub fn block<F>(mut ready: F)
where
    F: FnMut() -> nb::Result<(), Infallible>,
{
    loop {
        match ready() {
            Ok(()) => return,
            Err(nb::Error::WouldBlock) => core::hint::spin_loop(),
            Err(nb::Error::Other(never)) => match never {},
        }
    }
}

/// Turn a boolean condition into a poll result.
#[inline]
pub fn ready_when(done: bool) -> nb::Result<(), Infallible> {
    if done {
        Ok(())
    } else {
        Err(nb::Error::WouldBlock)
    }
}

/// Burn roughly `cycles` iterations without touching any register.
#[inline]
pub fn spin_cycles(cycles: u32) {
    for _ in 0..cycles {
        core::hint::spin_loop();
    }
}
