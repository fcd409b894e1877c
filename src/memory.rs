//! # Memory Bus Abstraction
//!
//! This module provides the `MemoryBus` trait that decouples the CPU from the
//! concrete address space it runs against. Two implementations ship with the
//! crate:
//!
//! - [`FlatMemory`]: 64KB of plain RAM, used for CPU unit tests
//! - [`AddressBus`](crate::AddressBus): the device-mapped VCS bus carrying the
//!   debugger's breakpoint, trap and access-flag bookkeeping
//!
//! ## Design Principles
//!
//! The MemoryBus trait follows 6502 hardware behavior:
//! - No bus errors - reads/writes always succeed
//! - Reads take `&mut self` because a read can have side effects on real
//!   hardware (cartridge hotspots switch banks when their address is touched)
//! - Every access is tagged with the kind of access that produced it so a
//!   debugging bus can classify memory as code or data

use crate::devices::AccessFlags;

/// Memory bus trait for CPU to read/write bytes.
///
/// The CPU accesses all memory (RAM, ROM, chip registers) through this
/// abstraction. These are *emulated* accesses: a debugging implementation is
/// free to check breakpoints, fire traps and record access flags here. Debugger
/// inspection goes through separate side-effect-free paths on the concrete bus.
///
/// # Examples
///
/// ```
/// use vcs_debug::{FlatMemory, MemoryBus};
///
/// let mut mem = FlatMemory::new();
/// mem.write(0x1234, 0x42);
/// assert_eq!(mem.read(0x1234), 0x42);
/// ```
pub trait MemoryBus {
    /// Reads a byte from the specified 16-bit address.
    ///
    /// This method must never panic. Unmapped addresses return whatever the
    /// implementation considers floating-bus garbage.
    fn read(&mut self, addr: u16) -> u8;

    /// Writes a byte to the specified 16-bit address.
    ///
    /// Writes to read-only or unmapped addresses are ignored.
    fn write(&mut self, addr: u16, value: u8);

    /// Reads a byte and tags the address with `flags`.
    ///
    /// The CPU uses this for opcode fetches (`CODE`) and operand loads
    /// (`DATA`). Implementations without access-flag tracking simply read.
    fn read_flagged(&mut self, addr: u16, flags: AccessFlags) -> u8 {
        let _ = flags;
        self.read(addr)
    }
}

/// Simple 64KB flat memory implementation.
///
/// All 65536 addresses are writable RAM initialized to 0x00. Useful for CPU
/// tests that don't need the VCS memory map.
///
/// # Examples
///
/// ```
/// use vcs_debug::{CPU, FlatMemory, MemoryBus};
///
/// let mut memory = FlatMemory::new();
/// memory.write(0xFFFC, 0x00);
/// memory.write(0xFFFD, 0xF0);
///
/// let cpu = CPU::new(&mut memory);
/// assert_eq!(cpu.pc(), 0xF000);
/// ```
pub struct FlatMemory {
    /// 64KB contiguous memory array
    data: Box<[u8; 65536]>,
}

impl FlatMemory {
    /// Creates a new FlatMemory instance with all bytes initialized to zero.
    pub fn new() -> Self {
        Self {
            data: Box::new([0; 65536]),
        }
    }

    /// Copy `bytes` into memory starting at `addr`, wrapping at 0xFFFF.
    pub fn load(&mut self, addr: u16, bytes: &[u8]) {
        for (i, byte) in bytes.iter().enumerate() {
            self.data[addr.wrapping_add(i as u16) as usize] = *byte;
        }
    }
}

impl Default for FlatMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBus for FlatMemory {
    fn read(&mut self, addr: u16) -> u8 {
        self.data[addr as usize]
    }

    fn write(&mut self, addr: u16, value: u8) {
        self.data[addr as usize] = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flat_memory_read_write() {
        let mut mem = FlatMemory::new();

        // Initially all zeros
        assert_eq!(mem.read(0x0000), 0x00);
        assert_eq!(mem.read(0xFFFF), 0x00);

        mem.write(0x1234, 0x42);
        assert_eq!(mem.read(0x1234), 0x42);

        // Neighbours unchanged
        assert_eq!(mem.read(0x1233), 0x00);
        assert_eq!(mem.read(0x1235), 0x00);
    }

    #[test]
    fn test_flat_memory_load_wraps() {
        let mut mem = FlatMemory::new();
        mem.load(0xFFFF, &[0x11, 0x22]);
        assert_eq!(mem.read(0xFFFF), 0x11);
        assert_eq!(mem.read(0x0000), 0x22);
    }

    #[test]
    fn test_read_flagged_defaults_to_read() {
        let mut mem = FlatMemory::new();
        mem.write(0x0080, 0x7F);
        assert_eq!(mem.read_flagged(0x0080, AccessFlags::CODE), 0x7F);
    }
}
