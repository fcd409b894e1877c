//! Symbol table management for address labels
//!
//! Labels are matched case-insensitively and keep the spelling they were
//! defined with for display.

use std::collections::BTreeMap;

/// An address label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub name: String,
    pub address: u16,
}

/// TIA write registers, TIA read registers and RIOT ports.
const VCS_EQUATES: &[(&str, u16)] = &[
    ("VSYNC", 0x00),
    ("VBLANK", 0x01),
    ("WSYNC", 0x02),
    ("RSYNC", 0x03),
    ("NUSIZ0", 0x04),
    ("NUSIZ1", 0x05),
    ("COLUP0", 0x06),
    ("COLUP1", 0x07),
    ("COLUPF", 0x08),
    ("COLUBK", 0x09),
    ("CTRLPF", 0x0A),
    ("REFP0", 0x0B),
    ("REFP1", 0x0C),
    ("PF0", 0x0D),
    ("PF1", 0x0E),
    ("PF2", 0x0F),
    ("RESP0", 0x10),
    ("RESP1", 0x11),
    ("RESM0", 0x12),
    ("RESM1", 0x13),
    ("RESBL", 0x14),
    ("AUDC0", 0x15),
    ("AUDC1", 0x16),
    ("AUDF0", 0x17),
    ("AUDF1", 0x18),
    ("AUDV0", 0x19),
    ("AUDV1", 0x1A),
    ("GRP0", 0x1B),
    ("GRP1", 0x1C),
    ("ENAM0", 0x1D),
    ("ENAM1", 0x1E),
    ("ENABL", 0x1F),
    ("HMP0", 0x20),
    ("HMP1", 0x21),
    ("HMM0", 0x22),
    ("HMM1", 0x23),
    ("HMBL", 0x24),
    ("VDELP0", 0x25),
    ("VDELP1", 0x26),
    ("VDELBL", 0x27),
    ("RESMP0", 0x28),
    ("RESMP1", 0x29),
    ("HMOVE", 0x2A),
    ("HMCLR", 0x2B),
    ("CXCLR", 0x2C),
    ("CXM0P", 0x00),
    ("CXM1P", 0x01),
    ("CXP0FB", 0x02),
    ("CXP1FB", 0x03),
    ("CXM0FB", 0x04),
    ("CXM1FB", 0x05),
    ("CXBLPF", 0x06),
    ("CXPPMM", 0x07),
    ("INPT0", 0x08),
    ("INPT1", 0x09),
    ("INPT2", 0x0A),
    ("INPT3", 0x0B),
    ("INPT4", 0x0C),
    ("INPT5", 0x0D),
    ("SWCHA", 0x0280),
    ("SWACNT", 0x0281),
    ("SWCHB", 0x0282),
    ("SWBCNT", 0x0283),
    ("INTIM", 0x0284),
    ("TIMINT", 0x0285),
    ("TIM1T", 0x0294),
    ("TIM8T", 0x0295),
    ("TIM64T", 0x0296),
    ("T1024T", 0x0297),
];

/// Symbol table for address labels.
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    /// Keyed by lowercase name
    symbols: BTreeMap<String, Symbol>,
}

impl SymbolTable {
    /// Create a new empty symbol table
    pub fn new() -> Self {
        Self {
            symbols: BTreeMap::new(),
        }
    }

    /// Create a table holding the standard VCS register names.
    pub fn with_vcs_equates() -> Self {
        let mut table = Self::new();
        for (name, address) in VCS_EQUATES {
            table.add_symbol(name, *address);
        }
        table
    }

    /// Define or redefine a label, returning the address it had before.
    pub fn add_symbol(&mut self, name: &str, address: u16) -> Option<u16> {
        self.symbols
            .insert(
                name.to_ascii_lowercase(),
                Symbol {
                    name: name.to_string(),
                    address,
                },
            )
            .map(|old| old.address)
    }

    pub fn remove_symbol(&mut self, name: &str) -> bool {
        self.symbols.remove(&name.to_ascii_lowercase()).is_some()
    }

    /// Look up a symbol by name
    pub fn lookup_symbol(&self, name: &str) -> Option<&Symbol> {
        self.symbols.get(&name.to_ascii_lowercase())
    }

    pub fn address(&self, name: &str) -> Option<u16> {
        self.lookup_symbol(name).map(|s| s.address)
    }

    /// All symbols, sorted by lowercase name.
    pub fn symbols(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols.values()
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbol_table_add_lookup() {
        let mut table = SymbolTable::new();
        assert_eq!(table.add_symbol("Start", 0xF000), None);
        assert_eq!(table.address("start"), Some(0xF000));
        assert_eq!(table.lookup_symbol("START").unwrap().name, "Start");
    }

    #[test]
    fn test_redefinition_returns_previous() {
        let mut table = SymbolTable::new();
        table.add_symbol("loop", 0xF010);
        assert_eq!(table.add_symbol("LOOP", 0xF020), Some(0xF010));
        assert_eq!(table.address("loop"), Some(0xF020));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_vcs_equates() {
        let table = SymbolTable::with_vcs_equates();
        assert_eq!(table.address("swcha"), Some(0x0280));
        assert_eq!(table.address("INPT4"), Some(0x0C));
        assert_eq!(table.address("WSYNC"), Some(0x02));
    }

    #[test]
    fn test_remove() {
        let mut table = SymbolTable::with_vcs_equates();
        assert!(table.remove_symbol("swchb"));
        assert!(!table.remove_symbol("swchb"));
        assert_eq!(table.address("SWCHB"), None);
    }
}
