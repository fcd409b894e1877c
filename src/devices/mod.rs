//! Memory-mapped devices and the instrumented VCS address bus.
//!
//! This module provides the memory mapping architecture that attaches the VCS
//! hardware (TIA registers, RIOT RAM and I/O, the cartridge and any cartridge
//! peripherals) to the 6507 address space, plus the debugger hooks that sit on
//! every emulated access.
//!
//! # Architecture
//!
//! - **Device trait**: interface for memory-mapped hardware components. Every
//!   device is also [`Serializable`] so the whole machine can be rewound.
//! - **AddressBus**: routes accesses to registered devices by address range and
//!   carries the breakpoint/trap tables, per-address access flags and the
//!   bankswitch lock.
//!
//! # Emulated vs. inspection accesses
//!
//! Accesses made by the CPU go through [`MemoryBus`] and are checked against
//! the trap tables and tagged with access flags. Accesses made by the debugger
//! go through [`AddressBus::peek`] and [`AddressBus::poke`], which never fire
//! traps or tag flags. Bank switching is suppressed for any access while the
//! bus is locked (see [`AddressBus::lock_guard`]).
//!
//! # Example
//!
//! ```rust
//! use vcs_debug::{AddressBus, MemoryBus, RamDevice};
//!
//! let mut bus = AddressBus::new();
//! bus.add_device(0x0080, Box::new(RamDevice::new(128))).unwrap();
//!
//! bus.toggle_write_trap(0x0080);
//! bus.write(0x0080, 0x42);
//!
//! let hit = bus.take_trap_hit().unwrap();
//! assert_eq!(hit.address, 0x0080);
//! assert!(bus.take_trap_hit().is_none());
//! ```

use std::any::Any;
use std::ops::{BitOr, BitOrAssign, Deref, DerefMut};

use log::debug;
use thiserror::Error;

use crate::serializer::Serializable;
use crate::MemoryBus;

pub mod cartridge;
pub mod eeprom;
pub mod ram;
pub mod tia;

pub use cartridge::{BankScheme, Cartridge};
pub use eeprom::I2cEeprom;
pub use ram::RamDevice;
pub use tia::Tia;

/// Abstract interface for memory-mapped hardware devices.
///
/// The bus calls these methods with offset-based addressing (0 to size-1), so
/// a device never knows where it is mapped.
///
/// `read` is the emulated access and may have side effects (a cartridge
/// switches banks when a hotspot is read). `peek` must be free of side effects
/// and is what the debugger uses to look at memory.
///
/// # Examples
///
/// ```rust
/// use std::any::Any;
/// use vcs_debug::Device;
/// use vcs_debug::serializer::{Deserializer, Serializable, Serializer, StateError};
///
/// struct Latch(u8);
///
/// impl Serializable for Latch {
///     fn name(&self) -> &'static str { "Latch" }
///     fn save(&self, out: &mut Serializer) -> Result<(), StateError> {
///         out.put_u8(self.0);
///         Ok(())
///     }
///     fn load(&mut self, input: &mut Deserializer<'_>) -> Result<(), StateError> {
///         self.0 = input.get_u8()?;
///         Ok(())
///     }
/// }
///
/// impl Device for Latch {
///     fn peek(&self, _offset: u16) -> u8 { self.0 }
///     fn write(&mut self, _offset: u16, value: u8) { self.0 = value; }
///     fn size(&self) -> u16 { 1 }
///     fn as_any(&self) -> &dyn Any { self }
///     fn as_any_mut(&mut self) -> &mut dyn Any { self }
/// }
/// ```
pub trait Device: Serializable + Any {
    /// Emulated read at `offset`. Defaults to [`Device::peek`].
    fn read(&mut self, offset: u16) -> u8 {
        self.peek(offset)
    }

    /// Side-effect-free read at `offset`.
    fn peek(&self, offset: u16) -> u8;

    /// Write byte to device at offset relative to device base address.
    fn write(&mut self, offset: u16, value: u8);

    /// Return size of device's address space in bytes.
    fn size(&self) -> u16;

    /// Advance device-internal time by `cycles` CPU cycles.
    fn tick(&mut self, cycles: u32) {
        let _ = cycles;
    }

    /// Enable or disable address-triggered bank switching.
    fn set_bank_locked(&mut self, locked: bool) {
        let _ = locked;
    }

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Per-address classification of prior accesses.
///
/// Flags accumulate: setting flags ORs them into whatever is already recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct AccessFlags(u8);

impl AccessFlags {
    pub const NONE: AccessFlags = AccessFlags(0x00);
    /// Executed as an instruction.
    pub const CODE: AccessFlags = AccessFlags(0x80);
    /// Reached only through a traced (not yet executed) code path.
    pub const TCODE: AccessFlags = AccessFlags(0x40);
    /// Graphics data.
    pub const GFX: AccessFlags = AccessFlags(0x20);
    /// Playfield graphics data.
    pub const PGFX: AccessFlags = AccessFlags(0x10);
    /// Read as an instruction operand.
    pub const DATA: AccessFlags = AccessFlags(0x08);
    /// Unclassified row of bytes.
    pub const ROW: AccessFlags = AccessFlags(0x04);
    /// Written by the CPU.
    pub const WRITE: AccessFlags = AccessFlags(0x02);
    /// Referenced by an instruction operand.
    pub const REFERENCED: AccessFlags = AccessFlags(0x01);

    pub const fn from_bits(bits: u8) -> Self {
        AccessFlags(bits)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn contains(self, other: AccessFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for AccessFlags {
    type Output = AccessFlags;

    fn bitor(self, rhs: AccessFlags) -> AccessFlags {
        AccessFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for AccessFlags {
    fn bitor_assign(&mut self, rhs: AccessFlags) {
        self.0 |= rhs.0;
    }
}

/// Fixed-size set of 16-bit addresses packed one bit per address.
///
/// Membership tests and toggles are O(1) and never allocate after
/// construction.
pub struct PackedBitArray {
    words: Box<[u64; 1024]>,
}

impl PackedBitArray {
    pub fn new() -> Self {
        Self {
            words: Box::new([0; 1024]),
        }
    }

    #[inline]
    fn locate(addr: u16) -> (usize, u64) {
        ((addr >> 6) as usize, 1u64 << (addr & 0x3F))
    }

    #[inline]
    pub fn is_set(&self, addr: u16) -> bool {
        let (word, mask) = Self::locate(addr);
        self.words[word] & mask != 0
    }

    #[inline]
    pub fn set(&mut self, addr: u16, value: bool) {
        let (word, mask) = Self::locate(addr);
        if value {
            self.words[word] |= mask;
        } else {
            self.words[word] &= !mask;
        }
    }

    /// Flip membership of `addr`, returning the new membership.
    #[inline]
    pub fn toggle(&mut self, addr: u16) -> bool {
        let (word, mask) = Self::locate(addr);
        self.words[word] ^= mask;
        self.words[word] & mask != 0
    }

    pub fn clear_all(&mut self) {
        self.words.fill(0);
    }

    pub fn count(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Set addresses in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = u16> + '_ {
        self.words.iter().enumerate().flat_map(|(i, &word)| {
            (0..64u16)
                .filter(move |bit| word & (1u64 << bit) != 0)
                .map(move |bit| ((i as u16) << 6) | bit)
        })
    }
}

impl Default for PackedBitArray {
    fn default() -> Self {
        Self::new()
    }
}

/// Which kind of access fired a trap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrapKind {
    Read,
    Write,
}

/// A trap that fired during emulation and has not been consumed yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrapHit {
    pub address: u16,
    pub kind: TrapKind,
}

/// Error returned when device registration fails.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceError {
    /// Address range overlaps with an existing device.
    #[error(
        "device address range overlap: new device at 0x{new_base:04X} (size 0x{new_size:X}) overlaps existing device at 0x{existing_base:04X} (size 0x{existing_size:X})"
    )]
    Overlap {
        new_base: u16,
        new_size: u16,
        existing_base: u16,
        existing_size: u16,
    },

    /// A device with no address space cannot be mapped.
    #[error("device at 0x{0:04X} has zero size")]
    EmptyDevice(u16),
}

/// A window of addresses that decodes to another window.
#[derive(Debug, Clone, Copy)]
struct Mirror {
    base: u16,
    size: u16,
    target: u16,
}

/// Internal mapping of a device to a base address.
struct DeviceMapping {
    base_addr: u16,
    device: Box<dyn Device>,
}

impl DeviceMapping {
    #[inline]
    fn contains(&self, addr: u16) -> bool {
        let end = self.base_addr as u32 + self.device.size() as u32;
        addr >= self.base_addr && (addr as u32) < end
    }
}

/// Instrumented memory mapper for the VCS address space.
///
/// `AddressBus` dispatches accesses to registered devices by address range.
/// Unmapped reads return 0xFF; unmapped writes are ignored.
///
/// # Examples
///
/// ```rust
/// use vcs_debug::{AddressBus, MemoryBus, RamDevice};
///
/// let mut bus = AddressBus::new();
/// bus.add_device(0x0080, Box::new(RamDevice::new(128))).unwrap();
///
/// bus.write(0x0085, 0x42);
/// assert_eq!(bus.read(0x0085), 0x42);
///
/// // Unmapped address returns 0xFF
/// assert_eq!(bus.read(0x8000), 0xFF);
/// ```
pub struct AddressBus {
    devices: Vec<DeviceMapping>,
    mirrors: Vec<Mirror>,
    unmapped_value: u8,
    breakpoints: PackedBitArray,
    read_traps: PackedBitArray,
    write_traps: PackedBitArray,
    access_flags: Box<[u8; 65536]>,
    bank_locked: bool,
    trap_hit: Option<TrapHit>,
}

impl AddressBus {
    /// Create a new bus with no devices and empty debug tables.
    pub fn new() -> Self {
        Self {
            devices: Vec::new(),
            mirrors: Vec::new(),
            unmapped_value: 0xFF,
            breakpoints: PackedBitArray::new(),
            read_traps: PackedBitArray::new(),
            write_traps: PackedBitArray::new(),
            access_flags: Box::new([0; 65536]),
            bank_locked: false,
            trap_hit: None,
        }
    }

    /// Register a device at the specified base address.
    ///
    /// The device occupies `base_addr .. base_addr + device.size()`.
    /// Registration fails if that range overlaps any existing device. Devices
    /// added while the bus is locked start out locked.
    ///
    /// ```rust
    /// use vcs_debug::{AddressBus, RamDevice};
    ///
    /// let mut bus = AddressBus::new();
    /// bus.add_device(0x0080, Box::new(RamDevice::new(128))).unwrap();
    ///
    /// let result = bus.add_device(0x00C0, Box::new(RamDevice::new(16)));
    /// assert!(result.is_err());
    /// ```
    pub fn add_device(
        &mut self,
        base_addr: u16,
        mut device: Box<dyn Device>,
    ) -> Result<(), DeviceError> {
        let new_size = device.size();
        if new_size == 0 {
            return Err(DeviceError::EmptyDevice(base_addr));
        }
        let new_start = base_addr as u32;
        let new_end = new_start + new_size as u32;

        for mapping in &self.devices {
            let existing_start = mapping.base_addr as u32;
            let existing_end = existing_start + mapping.device.size() as u32;

            if new_start < existing_end && new_end > existing_start {
                return Err(DeviceError::Overlap {
                    new_base: base_addr,
                    new_size,
                    existing_base: mapping.base_addr,
                    existing_size: mapping.device.size(),
                });
            }
        }

        if self.bank_locked {
            device.set_bank_locked(true);
        }
        debug!(
            "mapped device '{}' at 0x{:04X}-0x{:04X}",
            device.name(),
            base_addr,
            new_end - 1
        );
        self.devices.push(DeviceMapping { base_addr, device });
        Ok(())
    }

    /// Make `base .. base + size` decode to `target .. target + size`.
    ///
    /// Traps and access flags still see the address the CPU used.
    ///
    /// ```rust
    /// use vcs_debug::{AddressBus, MemoryBus, RamDevice};
    ///
    /// let mut bus = AddressBus::new();
    /// bus.add_device(0x0080, Box::new(RamDevice::new(128))).unwrap();
    /// bus.add_mirror(0x0180, 0x80, 0x0080);
    ///
    /// bus.write(0x01FD, 0x12);
    /// assert_eq!(bus.peek(0x00FD), 0x12);
    /// ```
    pub fn add_mirror(&mut self, base: u16, size: u16, target: u16) {
        self.mirrors.push(Mirror { base, size, target });
    }

    #[inline]
    fn decode(&self, addr: u16) -> u16 {
        for mirror in &self.mirrors {
            let offset = addr.wrapping_sub(mirror.base);
            if addr >= mirror.base && offset < mirror.size {
                return mirror.target.wrapping_add(offset);
            }
        }
        addr
    }

    fn find_device(&mut self, addr: u16) -> Option<(&mut dyn Device, u16)> {
        let addr = self.decode(addr);
        for mapping in &mut self.devices {
            if mapping.contains(addr) {
                let offset = addr - mapping.base_addr;
                return Some((mapping.device.as_mut(), offset));
            }
        }
        None
    }

    fn find_device_immut(&self, addr: u16) -> Option<(&dyn Device, u16)> {
        let addr = self.decode(addr);
        for mapping in &self.devices {
            if mapping.contains(addr) {
                let offset = addr - mapping.base_addr;
                return Some((mapping.device.as_ref(), offset));
            }
        }
        None
    }

    /// First registered device of type `T`.
    pub fn device<T: Device>(&self) -> Option<&T> {
        self.devices
            .iter()
            .find_map(|m| m.device.as_any().downcast_ref::<T>())
    }

    /// First registered device of type `T`, mutably.
    pub fn device_mut<T: Device>(&mut self) -> Option<&mut T> {
        self.devices
            .iter_mut()
            .find_map(|m| m.device.as_any_mut().downcast_mut::<T>())
    }

    /// Registered devices in registration order.
    pub fn devices(&self) -> impl Iterator<Item = &dyn Device> + '_ {
        self.devices.iter().map(|m| m.device.as_ref())
    }

    /// Registered devices in registration order, mutably.
    pub fn devices_mut(&mut self) -> impl Iterator<Item = &mut dyn Device> + '_ {
        self.devices.iter_mut().map(|m| m.device.as_mut() as &mut dyn Device)
    }

    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    /// Advance every device by `cycles` CPU cycles.
    pub fn tick(&mut self, cycles: u32) {
        for mapping in &mut self.devices {
            mapping.device.tick(cycles);
        }
    }

    /// Inspect the byte at `addr` without side effects, traps or flag tagging.
    pub fn peek(&self, addr: u16) -> u8 {
        match self.find_device_immut(addr) {
            Some((device, offset)) => device.peek(offset),
            None => self.unmapped_value,
        }
    }

    /// Little-endian word at `addr` read with [`AddressBus::peek`].
    pub fn dpeek(&self, addr: u16) -> u16 {
        u16::from_le_bytes([self.peek(addr), self.peek(addr.wrapping_add(1))])
    }

    /// Store `value` at `addr` on behalf of the debugger.
    ///
    /// No trap fires and no access flag is recorded. Cartridge hotspots still
    /// respond unless the bus is locked.
    pub fn poke(&mut self, addr: u16, value: u8) {
        if let Some((device, offset)) = self.find_device(addr) {
            device.write(offset, value);
        }
    }

    // ========== Breakpoints and traps ==========

    /// Flip the breakpoint at `addr`, returning whether it is now set.
    pub fn toggle_breakpoint(&mut self, addr: u16) -> bool {
        let set = self.breakpoints.toggle(addr);
        debug!("breakpoint at 0x{:04X} {}", addr, on_off(set));
        set
    }

    pub fn set_breakpoint(&mut self, addr: u16, enabled: bool) {
        self.breakpoints.set(addr, enabled);
    }

    #[inline]
    pub fn breakpoint(&self, addr: u16) -> bool {
        self.breakpoints.is_set(addr)
    }

    pub fn breakpoints(&self) -> &PackedBitArray {
        &self.breakpoints
    }

    pub fn clear_all_breakpoints(&mut self) {
        self.breakpoints.clear_all();
        debug!("all breakpoints cleared");
    }

    /// Flip the read trap at `addr`, returning whether it is now set.
    pub fn toggle_read_trap(&mut self, addr: u16) -> bool {
        let set = self.read_traps.toggle(addr);
        debug!("read trap at 0x{:04X} {}", addr, on_off(set));
        set
    }

    /// Flip the write trap at `addr`, returning whether it is now set.
    pub fn toggle_write_trap(&mut self, addr: u16) -> bool {
        let set = self.write_traps.toggle(addr);
        debug!("write trap at 0x{:04X} {}", addr, on_off(set));
        set
    }

    /// Flip both the read and the write trap at `addr`.
    pub fn toggle_trap(&mut self, addr: u16) {
        self.toggle_read_trap(addr);
        self.toggle_write_trap(addr);
    }

    #[inline]
    pub fn read_trap(&self, addr: u16) -> bool {
        self.read_traps.is_set(addr)
    }

    #[inline]
    pub fn write_trap(&self, addr: u16) -> bool {
        self.write_traps.is_set(addr)
    }

    pub fn read_traps(&self) -> &PackedBitArray {
        &self.read_traps
    }

    pub fn write_traps(&self) -> &PackedBitArray {
        &self.write_traps
    }

    /// Remove every read and write trap and drop any pending hit.
    pub fn clear_all_traps(&mut self) {
        self.read_traps.clear_all();
        self.write_traps.clear_all();
        self.trap_hit = None;
        debug!("all traps cleared");
    }

    /// Consume the pending trap hit, if any.
    pub fn take_trap_hit(&mut self) -> Option<TrapHit> {
        self.trap_hit.take()
    }

    #[inline]
    fn note_trap(&mut self, address: u16, kind: TrapKind) {
        // First hit wins until the stepping loop consumes it
        if self.trap_hit.is_none() {
            self.trap_hit = Some(TrapHit { address, kind });
        }
    }

    // ========== Access flags ==========

    pub fn access_flags(&self, addr: u16) -> AccessFlags {
        AccessFlags(self.access_flags[addr as usize])
    }

    /// OR `flags` into whatever is already recorded for `addr`.
    pub fn set_access_flags(&mut self, addr: u16, flags: AccessFlags) {
        self.access_flags[addr as usize] |= flags.0;
    }

    pub fn clear_access_flags(&mut self) {
        self.access_flags.fill(0);
    }

    // ========== Bankswitch lock ==========

    /// Suspend address-triggered bank switching on every device.
    ///
    /// Locking an already locked bus does nothing.
    pub fn lock_bankswitch_state(&mut self) {
        if self.bank_locked {
            return;
        }
        self.bank_locked = true;
        for mapping in &mut self.devices {
            mapping.device.set_bank_locked(true);
        }
    }

    /// Resume bank switching. Always fully releases the lock.
    pub fn unlock_bankswitch_state(&mut self) {
        self.bank_locked = false;
        for mapping in &mut self.devices {
            mapping.device.set_bank_locked(false);
        }
    }

    pub fn is_bank_locked(&self) -> bool {
        self.bank_locked
    }

    /// Lock bank switching for the lifetime of the returned guard.
    ///
    /// If the bus was already locked the guard leaves it locked on drop.
    ///
    /// ```rust
    /// use vcs_debug::AddressBus;
    ///
    /// let mut bus = AddressBus::new();
    /// {
    ///     let guard = bus.lock_guard();
    ///     assert!(guard.is_bank_locked());
    /// }
    /// assert!(!bus.is_bank_locked());
    /// ```
    pub fn lock_guard(&mut self) -> BankswitchLock<'_> {
        let acquired = !self.bank_locked;
        self.lock_bankswitch_state();
        BankswitchLock {
            bus: self,
            acquired,
        }
    }
}

impl Default for AddressBus {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBus for AddressBus {
    fn read(&mut self, addr: u16) -> u8 {
        if self.read_traps.is_set(addr) {
            self.note_trap(addr, TrapKind::Read);
        }
        let unmapped = self.unmapped_value;
        match self.find_device(addr) {
            Some((device, offset)) => device.read(offset),
            None => unmapped,
        }
    }

    fn write(&mut self, addr: u16, value: u8) {
        if self.write_traps.is_set(addr) {
            self.note_trap(addr, TrapKind::Write);
        }
        self.access_flags[addr as usize] |= AccessFlags::WRITE.0;
        if let Some((device, offset)) = self.find_device(addr) {
            device.write(offset, value);
        }
    }

    fn read_flagged(&mut self, addr: u16, flags: AccessFlags) -> u8 {
        self.access_flags[addr as usize] |= flags.0;
        self.read(addr)
    }
}

/// Scoped bankswitch lock over an [`AddressBus`].
///
/// Dereferences to the bus. Dropping the guard releases the lock on every exit
/// path, unless the bus was already locked when the guard was taken.
pub struct BankswitchLock<'a> {
    bus: &'a mut AddressBus,
    acquired: bool,
}

impl Deref for BankswitchLock<'_> {
    type Target = AddressBus;

    fn deref(&self) -> &AddressBus {
        self.bus
    }
}

impl DerefMut for BankswitchLock<'_> {
    fn deref_mut(&mut self) -> &mut AddressBus {
        self.bus
    }
}

impl Drop for BankswitchLock<'_> {
    fn drop(&mut self) {
        if self.acquired {
            self.bus.unlock_bankswitch_state();
        }
    }
}

fn on_off(set: bool) -> &'static str {
    if set {
        "set"
    } else {
        "cleared"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serializer::{Deserializer, Serializer, StateError};

    // Simple test device that counts side-effecting reads
    struct TestDevice {
        data: Vec<u8>,
        reads: u32,
        locked: bool,
    }

    impl TestDevice {
        fn new(size: u16) -> Self {
            Self {
                data: vec![0; size as usize],
                reads: 0,
                locked: false,
            }
        }
    }

    impl Serializable for TestDevice {
        fn name(&self) -> &'static str {
            "Test"
        }

        fn save(&self, out: &mut Serializer) -> Result<(), StateError> {
            out.put_bytes(&self.data);
            Ok(())
        }

        fn load(&mut self, input: &mut Deserializer<'_>) -> Result<(), StateError> {
            input.get_into(&mut self.data)
        }
    }

    impl Device for TestDevice {
        fn read(&mut self, offset: u16) -> u8 {
            self.reads += 1;
            self.data[offset as usize]
        }

        fn peek(&self, offset: u16) -> u8 {
            self.data[offset as usize]
        }

        fn write(&mut self, offset: u16, value: u8) {
            self.data[offset as usize] = value;
        }

        fn size(&self) -> u16 {
            self.data.len() as u16
        }

        fn set_bank_locked(&mut self, locked: bool) {
            self.locked = locked;
        }

        fn as_any(&self) -> &dyn Any {
            self
        }

        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    #[test]
    fn test_empty_bus_reads_floating() {
        let mut bus = AddressBus::new();
        assert_eq!(bus.read(0x0000), 0xFF);
        assert_eq!(bus.peek(0xFFFF), 0xFF);
    }

    #[test]
    fn test_overlap_detection() {
        let mut bus = AddressBus::new();
        bus.add_device(0x1000, Box::new(TestDevice::new(256)))
            .unwrap();

        assert!(bus
            .add_device(0x1080, Box::new(TestDevice::new(256)))
            .is_err());
        assert!(bus
            .add_device(0x0F80, Box::new(TestDevice::new(256)))
            .is_err());
        // Exactly adjacent is fine
        assert!(bus
            .add_device(0x0F00, Box::new(TestDevice::new(256)))
            .is_ok());
    }

    #[test]
    fn test_device_at_top_of_address_space() {
        let mut bus = AddressBus::new();
        bus.add_device(0xF000, Box::new(TestDevice::new(0x1000)))
            .unwrap();
        bus.write(0xFFFF, 0x12);
        assert_eq!(bus.peek(0xFFFF), 0x12);
        assert!(bus
            .add_device(0xFFF0, Box::new(TestDevice::new(4)))
            .is_err());
    }

    #[test]
    fn test_breakpoint_toggle_is_involution() {
        let mut bus = AddressBus::new();
        assert!(!bus.breakpoint(0xF000));
        assert!(bus.toggle_breakpoint(0xF000));
        assert!(bus.breakpoint(0xF000));
        assert!(!bus.toggle_breakpoint(0xF000));
        assert!(!bus.breakpoint(0xF000));
    }

    #[test]
    fn test_read_trap_fires_once_per_take() {
        let mut bus = AddressBus::new();
        bus.add_device(0x0080, Box::new(TestDevice::new(128)))
            .unwrap();
        bus.toggle_read_trap(0x0081);

        bus.read(0x0080);
        assert_eq!(bus.take_trap_hit(), None);

        bus.read(0x0081);
        bus.read(0x0081);
        assert_eq!(
            bus.take_trap_hit(),
            Some(TrapHit {
                address: 0x0081,
                kind: TrapKind::Read
            })
        );
        assert_eq!(bus.take_trap_hit(), None);
    }

    #[test]
    fn test_inspection_skips_traps_and_flags() {
        let mut bus = AddressBus::new();
        bus.add_device(0x0080, Box::new(TestDevice::new(128)))
            .unwrap();
        bus.toggle_trap(0x0090);

        bus.poke(0x0090, 7);
        assert_eq!(bus.peek(0x0090), 7);
        assert_eq!(bus.take_trap_hit(), None);
        assert!(bus.access_flags(0x0090).is_empty());
        assert_eq!(bus.device::<TestDevice>().unwrap().reads, 0);
    }

    #[test]
    fn test_access_flags_accumulate() {
        let mut bus = AddressBus::new();
        bus.add_device(0x0080, Box::new(TestDevice::new(128)))
            .unwrap();

        bus.read_flagged(0x0080, AccessFlags::CODE);
        bus.write(0x0080, 1);
        let flags = bus.access_flags(0x0080);
        assert!(flags.contains(AccessFlags::CODE | AccessFlags::WRITE));

        bus.set_access_flags(0x0100, AccessFlags::GFX);
        bus.set_access_flags(0x0100, AccessFlags::ROW);
        assert_eq!(bus.access_flags(0x0100).bits(), 0x24);
    }

    #[test]
    fn test_lock_is_not_nested() {
        let mut bus = AddressBus::new();
        bus.add_device(0x0080, Box::new(TestDevice::new(128)))
            .unwrap();

        bus.lock_bankswitch_state();
        bus.lock_bankswitch_state();
        assert!(bus.device::<TestDevice>().unwrap().locked);

        bus.unlock_bankswitch_state();
        assert!(!bus.is_bank_locked());
        assert!(!bus.device::<TestDevice>().unwrap().locked);
    }

    #[test]
    fn test_guard_respects_outer_lock() {
        let mut bus = AddressBus::new();
        bus.lock_bankswitch_state();
        {
            let _guard = bus.lock_guard();
        }
        assert!(bus.is_bank_locked());
    }

    #[test]
    fn test_packed_bit_array_iter() {
        let mut bits = PackedBitArray::new();
        bits.set(0xFFFF, true);
        bits.set(0x0000, true);
        bits.set(0x0041, true);
        assert_eq!(bits.iter().collect::<Vec<_>>(), vec![0x0000, 0x0041, 0xFFFF]);
        assert_eq!(bits.count(), 3);
    }
}
