//! Cartridge ROM with hotspot bankswitching.
//!
//! VCS cartridges larger than 4K switch which 4K bank is visible by watching
//! the address bus: touching a "hotspot" address near the top of the cartridge
//! window (read or write) selects a bank. Supported layouts:
//!
//! | Scheme    | Image size | Hotspots            | Start bank |
//! |-----------|-----------|---------------------|------------|
//! | `Plain4K` | 2K / 4K   | none                | 0          |
//! | `F8`      | 8K        | `$FFF8`, `$FFF9`    | 1          |
//! | `F6`      | 16K       | `$FFF6` - `$FFF9`   | 0          |
//!
//! Any of them may carry Superchip RAM: 128 bytes written through `$F000-$F07F`
//! and read back through `$F080-$F0FF`. Reading the write port is a program bug
//! on real hardware; the cartridge remembers the address so the debugger can
//! break on it.
//!
//! While bank-locked, hotspot accesses do not switch banks.

use std::any::Any;

use log::debug;
use thiserror::Error;

use super::Device;
use crate::serializer::{Deserializer, Serializable, Serializer, StateError};

/// Size of one bank and of the cartridge window on the bus.
pub const BANK_SIZE: usize = 0x1000;

const SC_RAM_SIZE: usize = 0x80;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CartridgeError {
    #[error("unsupported cartridge image size: {0} bytes")]
    InvalidSize(usize),
}

/// Bankswitching scheme, chosen from the image size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BankScheme {
    Plain4K,
    F8,
    F6,
}

impl BankScheme {
    pub fn bank_count(self) -> u8 {
        match self {
            BankScheme::Plain4K => 1,
            BankScheme::F8 => 2,
            BankScheme::F6 => 4,
        }
    }

    fn start_bank(self) -> u8 {
        match self {
            BankScheme::F8 => 1,
            _ => 0,
        }
    }

    /// Bank selected by touching window offset `offset`, if it is a hotspot.
    fn hotspot(self, offset: u16) -> Option<u8> {
        match (self, offset) {
            (BankScheme::F8, 0x0FF8..=0x0FF9) => Some((offset - 0x0FF8) as u8),
            (BankScheme::F6, 0x0FF6..=0x0FF9) => Some((offset - 0x0FF6) as u8),
            _ => None,
        }
    }
}

/// A VCS cartridge mapped at `$F000-$FFFF`.
///
/// ```rust
/// use vcs_debug::{Cartridge, BankScheme, Device};
///
/// let mut image = vec![0u8; 8192];
/// image[0x0000] = 0xAA; // bank 0
/// image[0x1000] = 0xBB; // bank 1
///
/// let mut cart = Cartridge::new(image, false).unwrap();
/// assert_eq!(cart.scheme(), BankScheme::F8);
/// assert_eq!(cart.peek(0x000), 0xBB);
///
/// cart.read(0xFF8); // hotspot: select bank 0
/// assert_eq!(cart.bank(), 0);
/// assert_eq!(cart.peek(0x000), 0xAA);
/// ```
pub struct Cartridge {
    image: Vec<u8>,
    scheme: BankScheme,
    bank: u8,
    ram: Option<Vec<u8>>,
    bank_locked: bool,
    rw_port_address: u16,
}

impl Cartridge {
    /// Build a cartridge from a ROM image, picking the scheme from its size.
    ///
    /// A 2K image is mirrored to fill the 4K window.
    pub fn new(image: Vec<u8>, superchip: bool) -> Result<Self, CartridgeError> {
        let (image, scheme) = match image.len() {
            2048 => {
                let mut doubled = image.clone();
                doubled.extend_from_slice(&image);
                (doubled, BankScheme::Plain4K)
            }
            4096 => (image, BankScheme::Plain4K),
            8192 => (image, BankScheme::F8),
            16384 => (image, BankScheme::F6),
            other => return Err(CartridgeError::InvalidSize(other)),
        };

        debug!(
            "cartridge: {:?}, {} bytes, superchip {}",
            scheme,
            image.len(),
            superchip
        );

        Ok(Self {
            image,
            scheme,
            bank: scheme.start_bank(),
            ram: superchip.then(|| vec![0; SC_RAM_SIZE]),
            bank_locked: false,
            rw_port_address: 0,
        })
    }

    pub fn scheme(&self) -> BankScheme {
        self.scheme
    }

    /// Currently visible bank.
    pub fn bank(&self) -> u8 {
        self.bank
    }

    pub fn bank_count(&self) -> u8 {
        self.scheme.bank_count()
    }

    pub fn has_superchip(&self) -> bool {
        self.ram.is_some()
    }

    /// Select `bank` directly. Refused while locked or out of range.
    pub fn set_bank(&mut self, bank: u8) -> bool {
        if self.bank_locked || bank >= self.bank_count() {
            return false;
        }
        self.bank = bank;
        true
    }

    /// Bus address of the most recent read from the Superchip write port
    /// during the current instruction, or 0.
    pub fn read_from_write_port(&self) -> u16 {
        self.rw_port_address
    }

    /// Forget the recorded write-port read. Called at each instruction start.
    pub fn clear_write_port_read(&mut self) {
        self.rw_port_address = 0;
    }

    /// Permanently change the byte at `address` in the visible bank.
    ///
    /// Addresses inside the Superchip window patch RAM instead of ROM.
    pub fn patch(&mut self, address: u16, value: u8) -> bool {
        let offset = (address as usize) & (BANK_SIZE - 1);
        if let Some(ram) = self.ram.as_mut() {
            if offset < 2 * SC_RAM_SIZE {
                ram[offset & (SC_RAM_SIZE - 1)] = value;
                return true;
            }
        }
        let index = self.bank as usize * BANK_SIZE + offset;
        self.image[index] = value;
        debug!("patched bank {} offset 0x{:03X} = 0x{:02X}", self.bank, offset, value);
        true
    }

    #[inline]
    fn rom_byte(&self, offset: u16) -> u8 {
        self.image[self.bank as usize * BANK_SIZE + offset as usize]
    }

    fn check_hotspot(&mut self, offset: u16) {
        if self.bank_locked {
            return;
        }
        if let Some(bank) = self.scheme.hotspot(offset) {
            self.bank = bank;
        }
    }
}

impl Serializable for Cartridge {
    fn name(&self) -> &'static str {
        "Cartridge"
    }

    fn save(&self, out: &mut Serializer) -> Result<(), StateError> {
        out.put_u8(self.bank);
        out.put_u16(self.rw_port_address);
        out.put_blob(&self.image);
        if let Some(ram) = &self.ram {
            out.put_bytes(ram);
        }
        Ok(())
    }

    fn load(&mut self, input: &mut Deserializer<'_>) -> Result<(), StateError> {
        let bank = input.get_u8()?;
        if bank >= self.bank_count() {
            return Err(StateError::InvalidValue {
                field: "cartridge bank",
                value: bank as u32,
            });
        }
        let rw_port_address = input.get_u16()?;
        let image = input.get_blob()?;
        if image.len() != self.image.len() {
            return Err(StateError::InvalidValue {
                field: "cartridge image size",
                value: image.len() as u32,
            });
        }
        let ram = match &self.ram {
            Some(ram) => Some(input.get_bytes(ram.len())?),
            None => None,
        };

        self.bank = bank;
        self.rw_port_address = rw_port_address;
        self.image.copy_from_slice(image);
        if let (Some(dest), Some(src)) = (self.ram.as_mut(), ram) {
            dest.copy_from_slice(src);
        }
        Ok(())
    }
}

impl Device for Cartridge {
    fn read(&mut self, offset: u16) -> u8 {
        if let Some(ram) = &self.ram {
            let index = offset as usize;
            if index < SC_RAM_SIZE {
                if !self.bank_locked {
                    self.rw_port_address = 0xF000 | offset;
                }
                return ram[index];
            }
            if index < 2 * SC_RAM_SIZE {
                return ram[index - SC_RAM_SIZE];
            }
        }
        self.check_hotspot(offset);
        self.rom_byte(offset)
    }

    fn peek(&self, offset: u16) -> u8 {
        if let Some(ram) = &self.ram {
            let index = offset as usize;
            if index < 2 * SC_RAM_SIZE {
                return ram[index & (SC_RAM_SIZE - 1)];
            }
        }
        self.rom_byte(offset)
    }

    fn write(&mut self, offset: u16, value: u8) {
        if let Some(ram) = self.ram.as_mut() {
            if (offset as usize) < SC_RAM_SIZE {
                ram[offset as usize] = value;
                return;
            }
        }
        self.check_hotspot(offset);
    }

    fn size(&self) -> u16 {
        BANK_SIZE as u16
    }

    fn set_bank_locked(&mut self, locked: bool) {
        self.bank_locked = locked;
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn banked(size: usize) -> Vec<u8> {
        // First byte of every bank holds the bank number
        let mut image = vec![0u8; size];
        for bank in 0..size / BANK_SIZE {
            image[bank * BANK_SIZE] = bank as u8;
        }
        image
    }

    #[test]
    fn test_scheme_from_size() {
        assert_eq!(
            Cartridge::new(vec![0; 2048], false).unwrap().scheme(),
            BankScheme::Plain4K
        );
        assert_eq!(
            Cartridge::new(vec![0; 16384], false).unwrap().scheme(),
            BankScheme::F6
        );
        assert_eq!(
            Cartridge::new(vec![0; 3000], false).err(),
            Some(CartridgeError::InvalidSize(3000))
        );
    }

    #[test]
    fn test_2k_image_is_mirrored() {
        let mut image = vec![0u8; 2048];
        image[0x010] = 0x99;
        let cart = Cartridge::new(image, false).unwrap();
        assert_eq!(cart.peek(0x010), 0x99);
        assert_eq!(cart.peek(0x810), 0x99);
    }

    #[test]
    fn test_f6_hotspots_on_read_and_write() {
        let mut cart = Cartridge::new(banked(16384), false).unwrap();
        assert_eq!(cart.peek(0), 0);

        cart.read(0xFF8);
        assert_eq!(cart.bank(), 2);
        assert_eq!(cart.peek(0), 2);

        cart.write(0xFF9, 0);
        assert_eq!(cart.bank(), 3);
    }

    #[test]
    fn test_peek_never_switches() {
        let mut cart = Cartridge::new(banked(8192), false).unwrap();
        cart.peek(0xFF8);
        assert_eq!(cart.bank(), 1);
    }

    #[test]
    fn test_lock_suppresses_hotspots() {
        let mut cart = Cartridge::new(banked(8192), false).unwrap();
        cart.set_bank_locked(true);
        cart.read(0xFF8);
        assert_eq!(cart.bank(), 1);
        assert!(!cart.set_bank(0));

        cart.set_bank_locked(false);
        cart.read(0xFF8);
        assert_eq!(cart.bank(), 0);
    }

    #[test]
    fn test_superchip_ports() {
        let mut cart = Cartridge::new(banked(8192), true).unwrap();
        cart.write(0x005, 0x42);
        assert_eq!(cart.read(0x085), 0x42);
        assert_eq!(cart.read_from_write_port(), 0);

        assert_eq!(cart.read(0x005), 0x42);
        assert_eq!(cart.read_from_write_port(), 0xF005);
        cart.clear_write_port_read();
        assert_eq!(cart.read_from_write_port(), 0);
    }

    #[test]
    fn test_patch_targets_visible_bank() {
        let mut cart = Cartridge::new(banked(8192), false).unwrap();
        cart.patch(0xF123, 0x77);
        assert_eq!(cart.peek(0x123), 0x77);
        cart.set_bank(0);
        assert_eq!(cart.peek(0x123), 0x00);
    }

    #[test]
    fn test_state_round_trip_restores_bank_and_patch() {
        let mut cart = Cartridge::new(banked(8192), true).unwrap();
        cart.write(0x000, 0x11);

        let mut out = Serializer::new();
        cart.save(&mut out).unwrap();
        let saved = out.into_bytes();

        cart.read(0xFF8);
        cart.patch(0xF200, 0xEE);
        cart.write(0x000, 0x22);

        cart.load(&mut Deserializer::new(&saved)).unwrap();
        assert_eq!(cart.bank(), 1);
        assert_eq!(cart.peek(0x200), 0x00);
        assert_eq!(cart.peek(0x080), 0x11);
    }
}
