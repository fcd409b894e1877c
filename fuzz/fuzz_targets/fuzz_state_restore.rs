//! Fuzz target for snapshot restore.
//!
//! Arbitrary bytes fed to `load_state` must either restore cleanly or leave
//! the machine byte-for-byte as it was.

#![no_main]

use libfuzzer_sys::fuzz_target;
use vcs_debug::{Cartridge, System};

fuzz_target!(|data: &[u8]| {
    let mut rom = vec![0xEA; 4096];
    rom[0xFFC] = 0x00;
    rom[0xFFD] = 0xF0;
    let Ok(cart) = Cartridge::new(rom, false) else {
        return;
    };
    let Ok(mut system) = System::new(cart) else {
        return;
    };
    let Ok(before) = system.save_state() else {
        return;
    };

    if system.load_state(data).is_err() {
        assert_eq!(system.save_state().ok(), Some(before));
    }
});
