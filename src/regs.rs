// Licensed under the Apache-2.0 license

//! Register access layer.
//!
//! Every driver in this crate talks to hardware through [`RegisterAccess`]:
//! a capability over the 32-bit special function register space. Register
//! blocks are generated with [`register_block!`] and carry a base address
//! plus documented offsets, so bus-index-to-address mapping lives in one
//! place and a simulated register file can stand in for silicon.
//!
//! PIC32 peripherals expose three write-only aliases next to most
//! registers: `CLR` (+0x4), `SET` (+0x8) and `INV` (+0xC). [`Reg`] wraps
//! them as `clear_bits`, `set_bits` and `invert_bits`.

/// Mask that strips the KSEG bits from a virtual address.
pub const PHYS_ADDR_MASK: u32 = 0x1FFF_FFFF;

const CLR_OFFSET: u32 = 0x4;
const SET_OFFSET: u32 = 0x8;
const INV_OFFSET: u32 = 0xC;

/// Translate a KSEG0/KSEG1 virtual address to the physical address used by
/// bus masters such as the NVM controller.
#[must_use]
pub const fn virt_to_phys(addr: u32) -> u32 {
    addr & PHYS_ADDR_MASK
}

/// Raw access to the special function register space.
pub trait RegisterAccess {
    /// Read the 32-bit register at `addr`.
    fn read(&self, addr: u32) -> u32;

    /// Write `value` to the 32-bit register at `addr`.
    fn write(&self, addr: u32, value: u32);

    /// Write a 16-bit half of a register. Needed where the hardware keys a
    /// write on the upper half-word only.
    fn write_u16(&self, addr: u32, value: u16);

    /// Physical address a bus master fetches `data` from.
    fn source_address(&self, data: &[u8]) -> u32;
}

impl<T: RegisterAccess + ?Sized> RegisterAccess for &T {
    fn read(&self, addr: u32) -> u32 {
        (**self).read(addr)
    }

    fn write(&self, addr: u32, value: u32) {
        (**self).write(addr, value);
    }

    fn write_u16(&self, addr: u32, value: u16) {
        (**self).write_u16(addr, value);
    }

    fn source_address(&self, data: &[u8]) -> u32 {
        (**self).source_address(data)
    }
}

/// Volatile memory-mapped access to the real register space.
#[derive(Clone, Copy, Debug)]
pub struct Mmio {
    _private: (),
}

impl Mmio {
    /// # Safety
    ///
    /// Every address later passed to this handle is dereferenced as a
    /// volatile pointer. The caller must only create it on a PIC32 target
    /// where the register blocks of this crate are mapped.
    #[must_use]
    pub const unsafe fn new() -> Self {
        Self { _private: () }
    }
}

impl RegisterAccess for Mmio {
    fn read(&self, addr: u32) -> u32 {
        // SAFETY: `Mmio::new` requires a target where `addr` is a mapped register.
        unsafe { core::ptr::read_volatile(addr as usize as *const u32) }
    }

    fn write(&self, addr: u32, value: u32) {
        // SAFETY: see `read`.
        unsafe { core::ptr::write_volatile(addr as usize as *mut u32, value) }
    }

    fn write_u16(&self, addr: u32, value: u16) {
        // SAFETY: see `read`.
        unsafe { core::ptr::write_volatile(addr as usize as *mut u16, value) }
    }

    fn source_address(&self, data: &[u8]) -> u32 {
        virt_to_phys(data.as_ptr() as usize as u32)
    }
}

/// Handle on a single register.
#[derive(Clone, Copy, Debug)]
pub struct Reg<'a, R: ?Sized> {
    bus: &'a R,
    addr: u32,
}

impl<'a, R: RegisterAccess + ?Sized> Reg<'a, R> {
    pub fn new(bus: &'a R, addr: u32) -> Self {
        Self { bus, addr }
    }

    #[must_use]
    pub fn addr(&self) -> u32 {
        self.addr
    }

    #[must_use]
    pub fn read(&self) -> u32 {
        self.bus.read(self.addr)
    }

    pub fn write(&self, value: u32) {
        self.bus.write(self.addr, value);
    }

    /// Write the upper 16 bits of the register.
    pub fn write_upper_half(&self, value: u16) {
        self.bus.write_u16(self.addr + 2, value);
    }

    pub fn set_bits(&self, mask: u32) {
        self.bus.write(self.addr + SET_OFFSET, mask);
    }

    pub fn clear_bits(&self, mask: u32) {
        self.bus.write(self.addr + CLR_OFFSET, mask);
    }

    pub fn invert_bits(&self, mask: u32) {
        self.bus.write(self.addr + INV_OFFSET, mask);
    }

    /// Read-modify-write, for registers without SET/CLR aliases.
    pub fn modify(&self, f: impl FnOnce(u32) -> u32) {
        self.write(f(self.read()));
    }

    /// True when any bit of `mask` reads back set.
    #[must_use]
    pub fn is_set(&self, mask: u32) -> bool {
        self.read() & mask != 0
    }
}

/// Declare a register block: a base address plus named offsets.
///
/// ```ignore
/// register_block! {
///     /// Doc for the block.
///     pub struct FooRegs {
///         con = 0x00,
///         stat = 0x10,
///     }
/// }
/// ```
///
/// generates `FooRegs<R>` with `FooRegs::CON` / `FooRegs::STAT` offsets and
/// `con()` / `stat()` accessors returning [`Reg`].
#[macro_export]
macro_rules! register_block {
    (
        $(#[$meta:meta])*
        pub struct $name:ident {
            $( $(#[$rmeta:meta])* $reg:ident = $off:expr ),* $(,)?
        }
    ) => {
        paste::paste! {
            $(#[$meta])*
            #[derive(Clone, Debug)]
            pub struct $name<R> {
                bus: R,
                base: u32,
            }

            impl<R: $crate::regs::RegisterAccess> $name<R> {
                $(
                    pub const [<$reg:upper>]: u32 = $off;
                )*

                pub fn new(bus: R, base: u32) -> Self {
                    Self { bus, base }
                }

                #[must_use]
                pub fn base(&self) -> u32 {
                    self.base
                }

                pub fn bus(&self) -> &R {
                    &self.bus
                }

                /// Register at an offset not named in the block.
                pub fn at(&self, offset: u32) -> $crate::regs::Reg<'_, R> {
                    $crate::regs::Reg::new(&self.bus, self.base + offset)
                }

                $(
                    $(#[$rmeta])*
                    pub fn $reg(&self) -> $crate::regs::Reg<'_, R> {
                        $crate::regs::Reg::new(&self.bus, self.base + $off)
                    }
                )*
            }
        }
    };
}
