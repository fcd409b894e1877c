//! Fuzz target for the I2C EEPROM line protocol.
//!
//! Every input byte is one write to the bus register (bit 0 SDA, bit 1 SCL)
//! or, with bit 7 set, a tick of the busy timer.

#![no_main]

use libfuzzer_sys::fuzz_target;
use vcs_debug::devices::eeprom::EEPROM_SIZE;
use vcs_debug::{Device, I2cEeprom};

fuzz_target!(|data: &[u8]| {
    let mut chip = I2cEeprom::new();

    for &byte in data {
        if byte & 0x80 != 0 {
            chip.tick((byte & 0x7F) as u32 * 64);
        } else {
            chip.write(0, byte & 0x03);
        }
        let level = chip.peek(0);
        assert!(level <= 0x03);
        assert!((chip.address() as usize) < EEPROM_SIZE);
    }
    assert_eq!(chip.data().len(), EEPROM_SIZE);
});
