//! RAM device implementation.
//!
//! Provides readable and writable memory storage via the Device trait. The VCS
//! uses it for the 128 bytes of RIOT RAM and, filled with a fixed value, for
//! the RIOT I/O port block.

use std::any::Any;

use super::Device;
use crate::serializer::{Deserializer, Serializable, Serializer, StateError};

/// Simple RAM device with readable and writable storage.
///
/// # Examples
///
/// ```rust
/// use vcs_debug::{RamDevice, Device};
///
/// let mut ram = RamDevice::new(128);
///
/// ram.write(0x42, 0xAA);
/// assert_eq!(ram.peek(0x42), 0xAA);
/// ```
pub struct RamDevice {
    name: &'static str,
    data: Vec<u8>,
}

impl RamDevice {
    /// Create a new zero-filled RAM device named `"RAM"`.
    pub fn new(size: u16) -> Self {
        Self::named("RAM", size, 0x00)
    }

    /// Create a RAM device with its own state tag and initial fill byte.
    ///
    /// ```rust
    /// use vcs_debug::{RamDevice, Device};
    ///
    /// let io = RamDevice::named("RIOT-IO", 0x20, 0xFF);
    /// assert_eq!(io.peek(0x00), 0xFF);
    /// ```
    pub fn named(name: &'static str, size: u16, fill: u8) -> Self {
        Self {
            name,
            data: vec![fill; size as usize],
        }
    }

    /// Load bytes into RAM at the specified offset.
    ///
    /// Bytes that would fall past the end of the device are dropped.
    ///
    /// ```rust
    /// use vcs_debug::{RamDevice, Device};
    ///
    /// let mut ram = RamDevice::new(128);
    /// ram.load_bytes(0x10, &[0x01, 0x02, 0x03]);
    ///
    /// assert_eq!(ram.peek(0x10), 0x01);
    /// assert_eq!(ram.peek(0x12), 0x03);
    /// ```
    pub fn load_bytes(&mut self, offset: u16, bytes: &[u8]) {
        let start = (offset as usize).min(self.data.len());
        let end = (start + bytes.len()).min(self.data.len());
        self.data[start..end].copy_from_slice(&bytes[..end - start]);
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }
}

impl Serializable for RamDevice {
    fn name(&self) -> &'static str {
        self.name
    }

    fn save(&self, out: &mut Serializer) -> Result<(), StateError> {
        out.put_bytes(&self.data);
        Ok(())
    }

    fn load(&mut self, input: &mut Deserializer<'_>) -> Result<(), StateError> {
        input.get_into(&mut self.data)
    }
}

impl Device for RamDevice {
    fn peek(&self, offset: u16) -> u8 {
        self.data[offset as usize]
    }

    fn write(&mut self, offset: u16, value: u8) {
        self.data[offset as usize] = value;
    }

    fn size(&self) -> u16 {
        self.data.len() as u16
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

    #[test]
    fn test_ram_new() {
        let ram = RamDevice::new(128);
        assert_eq!(ram.size(), 128);
        assert_eq!(ram.name(), "RAM");
        assert!(ram.as_slice().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_ram_read_write() {
        let mut ram = RamDevice::new(128);
        ram.write(0, 0xAA);
        ram.write(127, 0xBB);
        assert_eq!(ram.read(0), 0xAA);
        assert_eq!(ram.peek(127), 0xBB);
    }

    #[test]
    fn test_load_bytes_clips_at_end() {
        let mut ram = RamDevice::new(4);
        ram.load_bytes(2, &[1, 2, 3, 4]);
        assert_eq!(ram.as_slice(), &[0, 0, 1, 2]);
    }

    #[test]
    fn test_state_round_trip() {
        let mut ram = RamDevice::named("RIOT", 8, 0x00);
        ram.load_bytes(0, &[1, 2, 3, 4, 5, 6, 7, 8]);

        let mut out = Serializer::new();
        ram.save(&mut out).unwrap();
        let bytes = out.into_bytes();

        let mut other = RamDevice::named("RIOT", 8, 0xFF);
        other.load(&mut Deserializer::new(&bytes)).unwrap();
        assert_eq!(other.as_slice(), ram.as_slice());
    }

    #[test]
    fn test_short_state_leaves_ram_untouched() {
        let mut ram = RamDevice::named("RIOT", 8, 0x55);
        let short = [0u8; 4];
        assert!(ram.load(&mut Deserializer::new(&short)).is_err());
        assert!(ram.as_slice().iter().all(|&b| b == 0x55));
    }
}
