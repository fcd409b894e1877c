//! # Atari 2600 Debugger Core
//!
//! The machinery behind an interactive VCS debugger: an instrumented address
//! bus, a rewind stack of whole-machine snapshots, an expression language for
//! querying live hardware by name, and the bit-level I2C EEPROM found on
//! save-game peripherals.
//!
//! ## Quick Start
//!
//! ```rust
//! use vcs_debug::{Cartridge, Debugger, DebuggerConfig, System};
//!
//! // 4K cartridge: LDA #$07 ; STA $80 ; then NOPs
//! let mut rom = vec![0xEA; 4096];
//! rom[..4].copy_from_slice(&[0xA9, 0x07, 0x85, 0x80]);
//! rom[0xFFC] = 0x00; // reset vector -> $F000
//! rom[0xFFD] = 0xF0;
//!
//! let system = System::new(Cartridge::new(rom, false).unwrap()).unwrap();
//! let mut dbg = Debugger::new(system, DebuggerConfig::default()).unwrap();
//!
//! dbg.step().unwrap();
//! dbg.step().unwrap();
//! assert_eq!(dbg.evaluate("*$80 + a").unwrap(), 14);
//!
//! // Undo the store
//! dbg.rewind_state().unwrap();
//! assert_eq!(dbg.evaluate("*$80").unwrap(), 0);
//! ```
//!
//! ## Architecture
//!
//! - **Modularity**: the CPU never owns memory; it steps against any [`MemoryBus`]
//! - **Explicit context**: parsing and evaluation take their tables and the
//!   machine as arguments, there is no global debugger
//! - **Transactional state**: snapshots are captured whole and restored
//!   all-or-nothing
//! - **WebAssembly portability**: no OS dependencies outside the EEPROM's
//!   optional backing file
//!
//! ## Modules
//!
//! - `cpu` - 6507 registers and the single-step primitive
//! - `memory` - MemoryBus trait and flat memory
//! - `devices` - Device trait, instrumented AddressBus, VCS chips, I2C EEPROM
//! - `serializer` / `state` - snapshot encoding and whole-machine capture
//! - `rewind` - bounded rewind stack
//! - `expression` - lexer, parser and evaluator for debugger expressions
//! - `system` - the standard VCS memory map
//! - `debugger` - session orchestration

use thiserror::Error;

pub mod cpu;
pub mod debugger;
pub mod devices;
pub mod expression;
pub mod memory;
pub mod rewind;
pub mod serializer;
pub mod state;
pub mod system;

#[cfg(feature = "wasm")]
pub mod wasm;

// Re-export public API
pub use cpu::CPU;
pub use debugger::{Debugger, DebuggerConfig, DebuggerError, StopReason, WatchValue};
pub use devices::{
    AccessFlags, AddressBus, BankScheme, BankswitchLock, Cartridge, Device, DeviceError,
    I2cEeprom, PackedBitArray, RamDevice, Tia, TrapHit, TrapKind,
};
pub use expression::{Base, EvalError, Expression, ParseError};
pub use memory::{FlatMemory, MemoryBus};
pub use rewind::{RewindConfig, RewindError, RewindManager, Snapshot};
pub use serializer::StateError;
pub use system::System;

#[cfg(feature = "wasm")]
pub use wasm::WasmDebugger;

/// Errors that can occur during CPU execution.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionError {
    /// The opcode is outside the supported instruction subset.
    ///
    /// Contains the opcode byte value for debugging purposes.
    #[error("opcode 0x{0:02X} is not implemented")]
    UnimplementedOpcode(u8),
}
