//! Fuzz target for the expression parser and evaluator.
//!
//! Arbitrary text is parsed against the standard tables and, when it parses,
//! evaluated against a live machine. Neither step may panic.

#![no_main]

use libfuzzer_sys::fuzz_target;
use vcs_debug::{Cartridge, Debugger, DebuggerConfig, System};

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    let mut rom = vec![0xEA; 4096];
    rom[0xFFC] = 0x00;
    rom[0xFFD] = 0xF0;
    let Ok(cart) = Cartridge::new(rom, false) else {
        return;
    };
    let Ok(system) = System::new(cart) else {
        return;
    };
    let Ok(mut dbg) = Debugger::new(system, DebuggerConfig::default()) else {
        return;
    };

    // Self-referencing function to exercise the call depth limit
    let _ = dbg.add_function("fz", "1");
    let _ = dbg.add_function("fz", text);

    if let Ok(expr) = dbg.parse(text) {
        let _ = dbg.evaluate_expression(&expr);
        // Evaluation only reads memory; the bank lock must be released again
        assert!(!dbg.system().bus().is_bank_locked());
    }
});
