// Licensed under the Apache-2.0 license

//! Types shared by every driver: logging hooks and the bus-index
//! bounds policy.

use core::fmt;

/// Diagnostic sink used by the drivers.
///
/// Logging is advisory. No driver result depends on what a logger does.
pub trait Logger {
    fn debug(&self, args: fmt::Arguments<'_>);
    fn warn(&self, args: fmt::Arguments<'_>);
    fn error(&self, args: fmt::Arguments<'_>);
}

impl<L: Logger + ?Sized> Logger for &L {
    fn debug(&self, args: fmt::Arguments<'_>) {
        (**self).debug(args);
    }

    fn warn(&self, args: fmt::Arguments<'_>) {
        (**self).warn(args);
    }

    fn error(&self, args: fmt::Arguments<'_>) {
        (**self).error(args);
    }
}

/// Discards everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoOpLogger;

impl Logger for NoOpLogger {
    fn debug(&self, _args: fmt::Arguments<'_>) {}
    fn warn(&self, _args: fmt::Arguments<'_>) {}
    fn error(&self, _args: fmt::Arguments<'_>) {}
}

/// Forwards to the `log` facade under the `pic32_ddk` target.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogLogger;

impl Logger for LogLogger {
    fn debug(&self, args: fmt::Arguments<'_>) {
        log::debug!(target: "pic32_ddk", "{args}");
    }

    fn warn(&self, args: fmt::Arguments<'_>) {
        log::warn!(target: "pic32_ddk", "{args}");
    }

    fn error(&self, args: fmt::Arguments<'_>) {
        log::error!(target: "pic32_ddk", "{args}");
    }
}

/// What a bus arena does when handed an index past the end of its board
/// table.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum BoundsPolicy {
    /// Return the driver's "no such bus" error.
    #[default]
    Error,
    /// Treat the index as a programming error and panic.
    Assert,
}
