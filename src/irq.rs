// Licensed under the Apache-2.0 license

//! Interrupt masking around unlock sequences.

/// Disable interrupts and later put them back the way they were.
pub trait InterruptControl {
    /// Opaque record of the interrupt state before `disable`.
    type State;

    fn disable(&self) -> Self::State;

    /// Restore the state saved by the matching `disable`. Must not enable
    /// interrupts that were already masked before that call.
    fn restore(&self, state: Self::State);
}

impl<I: InterruptControl + ?Sized> InterruptControl for &I {
    type State = I::State;

    fn disable(&self) -> Self::State {
        (**self).disable()
    }

    fn restore(&self, state: Self::State) {
        (**self).restore(state);
    }
}

/// Interrupt control through the `critical-section` implementation linked
/// into the final binary.
#[derive(Clone, Copy, Debug, Default)]
pub struct CriticalSectionIrq;

impl InterruptControl for CriticalSectionIrq {
    type State = critical_section::RestoreState;

    fn disable(&self) -> Self::State {
        // SAFETY: every `acquire` here is paired with exactly one `release`
        // by the caller through `restore`, in LIFO order.
        unsafe { critical_section::acquire() }
    }

    fn restore(&self, state: Self::State) {
        // SAFETY: `state` came from the matching `disable` above.
        unsafe { critical_section::release(state) }
    }
}

/// Run `f` with interrupts masked.
pub fn with_masked<I: InterruptControl, T>(irq: &I, f: impl FnOnce() -> T) -> T {
    let state = irq.disable();
    let out = f();
    irq.restore(state);
    out
}
