//! Named read-only views of CPU, cartridge and TIA state.
//!
//! Each accessor holds a plain function pointer into the chip it inspects, so
//! an expression node never owns or caches hardware state.

use super::{EvalError, Inspect};
use crate::devices::{Cartridge, Tia};
use crate::CPU;

/// A named, typed read of one piece of hardware state.
#[derive(Debug, Clone, Copy)]
pub enum Accessor {
    Cpu {
        name: &'static str,
        read: fn(&CPU) -> i32,
    },
    Cartridge {
        name: &'static str,
        read: fn(&Cartridge) -> i32,
    },
    Tia {
        name: &'static str,
        read: fn(&Tia) -> i32,
    },
}

impl Accessor {
    pub fn name(&self) -> &'static str {
        match self {
            Accessor::Cpu { name, .. }
            | Accessor::Cartridge { name, .. }
            | Accessor::Tia { name, .. } => name,
        }
    }

    /// Register and flag accessors, as opposed to chip-internal counters.
    pub fn is_cpu(&self) -> bool {
        matches!(self, Accessor::Cpu { .. })
    }

    /// Read the current value from `machine`.
    pub fn read(&self, machine: &dyn Inspect) -> Result<i32, EvalError> {
        match self {
            Accessor::Cpu { read, .. } => Ok(read(machine.cpu())),
            Accessor::Cartridge { name, read } => machine
                .cartridge()
                .map(read)
                .ok_or(EvalError::MissingChip(name, "cartridge")),
            Accessor::Tia { name, read } => machine
                .tia()
                .map(read)
                .ok_or(EvalError::MissingChip(name, "TIA")),
        }
    }
}

impl PartialEq for Accessor {
    fn eq(&self, other: &Self) -> bool {
        self.name() == other.name()
    }
}

impl Eq for Accessor {}

/// Every accessor name the expression language understands.
pub struct AccessorTable {
    entries: Vec<Accessor>,
}

impl AccessorTable {
    /// Build the standard table: CPU, then cartridge, then TIA names.
    pub fn new() -> Self {
        use Accessor::{Cartridge as Cart, Cpu, Tia as Chip};

        let entries = vec![
            Cpu { name: "a", read: |c| c.a() as i32 },
            Cpu { name: "x", read: |c| c.x() as i32 },
            Cpu { name: "y", read: |c| c.y() as i32 },
            Cpu { name: "pc", read: |c| c.pc() as i32 },
            Cpu { name: "sp", read: |c| c.sp() as i32 },
            Cpu { name: "c", read: |c| c.flag_c() as i32 },
            Cpu { name: "z", read: |c| c.flag_z() as i32 },
            Cpu { name: "n", read: |c| c.flag_n() as i32 },
            Cpu { name: "v", read: |c| c.flag_v() as i32 },
            Cpu { name: "d", read: |c| c.flag_d() as i32 },
            Cpu { name: "i", read: |c| c.flag_i() as i32 },
            Cpu { name: "b", read: |c| c.flag_b() as i32 },
            Cart { name: "_bank", read: |c| c.bank() as i32 },
            Cart { name: "_rwport", read: |c| c.read_from_write_port() as i32 },
            Chip { name: "_scan", read: |t| t.scanlines() as i32 },
            Chip { name: "_fcount", read: |t| t.frame_count() as i32 },
            Chip { name: "_fcycles", read: |t| t.frame_cycles() as i32 },
            Chip { name: "_cyclesLo", read: |t| (t.total_cycles() & 0xFFFF) as i32 },
            Chip { name: "_cyclesHi", read: |t| ((t.total_cycles() >> 16) & 0xFFFF) as i32 },
            Chip { name: "_cclocks", read: |t| t.clocks_this_line() as i32 },
            Chip { name: "_vsync", read: |t| t.vsync() as i32 },
            Chip { name: "_vblank", read: |t| t.vblank() as i32 },
        ];
        Self { entries }
    }

    /// Case-insensitive lookup.
    pub fn lookup(&self, name: &str) -> Option<Accessor> {
        self.entries
            .iter()
            .find(|acc| acc.name().eq_ignore_ascii_case(name))
            .copied()
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.iter().map(|acc| acc.name())
    }
}

impl Default for AccessorTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_ignores_case() {
        let table = AccessorTable::new();
        assert_eq!(table.lookup("PC").unwrap().name(), "pc");
        assert_eq!(table.lookup("_CYCLESLO").unwrap().name(), "_cyclesLo");
        assert!(table.lookup("q").is_none());
    }

    #[test]
    fn test_cpu_accessors_are_tagged() {
        let table = AccessorTable::new();
        assert!(table.lookup("sp").unwrap().is_cpu());
        assert!(!table.lookup("_bank").unwrap().is_cpu());
        assert!(!table.lookup("_scan").unwrap().is_cpu());
    }

    #[test]
    fn test_names_are_unique() {
        let table = AccessorTable::new();
        let mut names: Vec<_> = table.names().map(str::to_ascii_lowercase).collect();
        let total = names.len();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), total);
    }
}
