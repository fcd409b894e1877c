//! Two-wire serial EEPROM (24LC256 class) driven bit by bit.
//!
//! The chip sees nothing but the clock (SCL) and data (SDA) lines. Bytes,
//! commands and addresses are inferred from individual transitions:
//!
//! - SDA falling while SCL is high is a **start** condition.
//! - SDA rising while SCL is high is a **stop** condition.
//! - Bits move on **falling** SCL edges.
//!
//! A write transaction is `start, 0xA0, addr-hi, addr-lo, data..., stop`; the
//! data is committed on stop, truncated at the 64-byte page boundary. A read
//! is `start, 0xA0, addr-hi, addr-lo, start, 0xA1, data (ACK)..., data (NAK),
//! stop`, or just `start, 0xA1, ...` to continue from the current address.
//!
//! SDA is open drain: the level on the wire is the AND of what the master and
//! the chip drive, which is what [`I2cEeprom::read_sda`] reports.
//!
//! On the bus the chip shows up as a one-byte register: writes drive SDA from
//! bit 0 and SCL from bit 1 (data line first), reads return the wire level in
//! bit 0 and the clock level in bit 1.
//!
//! The 32K store is loaded from a backing file when one of exactly the right
//! size exists and written back by [`I2cEeprom::flush`] and on drop. Without a
//! usable file the store starts from a fixed pattern.

use std::any::Any;
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, trace, warn};
use thiserror::Error;

use super::Device;
use crate::serializer::{Deserializer, Serializable, Serializer, StateError};

/// Capacity of the store in bytes.
pub const EEPROM_SIZE: usize = 32768;

/// Bytes per write page.
pub const PAGE_SIZE: usize = 64;

/// Number of write pages.
pub const PAGE_COUNT: usize = EEPROM_SIZE / PAGE_SIZE;

/// Largest transaction (command, two address bytes and data) the chip buffers.
pub const PACKET_SIZE: usize = 70;

/// CPU cycles the chip stays busy after committing a write (5 ms at 1.19 MHz).
pub const WRITE_CYCLE: u32 = 5966;

const SIZE_MASK: u16 = (EEPROM_SIZE - 1) as u16;
const PAGE_MASK: u16 = (PAGE_SIZE - 1) as u16;

const CMD_WRITE: u16 = 0x1A0;
const CMD_READ: u16 = 0x1A1;

#[derive(Debug, Error)]
pub enum EepromError {
    #[error("no backing file configured")]
    NoBackingFile,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Protocol state of the chip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusState {
    /// No transaction.
    Idle = 0,
    /// A byte is being clocked into the chip.
    WritingByte = 1,
    /// The chip is acknowledging a received byte.
    Acknowledging = 2,
    /// A byte is being clocked out of the chip.
    ReadingByte = 3,
    /// The chip waits for the master to ACK or NAK a sent byte.
    AwaitingAck = 4,
}

impl BusState {
    fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            0 => BusState::Idle,
            1 => BusState::WritingByte,
            2 => BusState::Acknowledging,
            3 => BusState::ReadingByte,
            4 => BusState::AwaitingAck,
            _ => return None,
        })
    }
}

/// A 32K I2C EEPROM such as the one inside an AtariVox or SaveKey.
pub struct I2cEeprom {
    data: Box<[u8; EEPROM_SIZE]>,
    state: BusState,
    master_sda: bool,
    master_scl: bool,
    device_sda: bool,
    /// Bits shifted so far, framed by a leading marker bit
    shift: u16,
    packet: [u8; PACKET_SIZE],
    packet_len: usize,
    address: u16,
    address_known: bool,
    busy_cycles: u32,
    pages_used: [bool; PAGE_COUNT],
    path: Option<PathBuf>,
}

impl I2cEeprom {
    /// Create a chip with no backing file.
    pub fn new() -> Self {
        let mut data = Box::new([0u8; EEPROM_SIZE]);
        fill_pattern(&mut data);
        Self {
            data,
            state: BusState::Idle,
            master_sda: true,
            master_scl: true,
            device_sda: true,
            shift: 0,
            packet: [0; PACKET_SIZE],
            packet_len: 0,
            address: 0,
            address_known: false,
            busy_cycles: 0,
            pages_used: [false; PAGE_COUNT],
            path: None,
        }
    }

    /// Create a chip persisted to `path`.
    ///
    /// The file is used only if it holds exactly [`EEPROM_SIZE`] bytes; a
    /// missing or differently sized file is not an error.
    pub fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let mut eeprom = Self::new();
        match fs::read(&path) {
            Ok(bytes) if bytes.len() == EEPROM_SIZE => {
                eeprom.data.copy_from_slice(&bytes);
                debug!("eeprom: loaded {}", path.display());
            }
            Ok(bytes) => debug!(
                "eeprom: ignoring {} ({} bytes, expected {})",
                path.display(),
                bytes.len(),
                EEPROM_SIZE
            ),
            Err(err) => debug!("eeprom: no data in {}: {}", path.display(), err),
        }
        eeprom.path = Some(path);
        eeprom
    }

    /// Write the whole store to the backing file.
    pub fn flush(&self) -> Result<(), EepromError> {
        let path = self.path.as_ref().ok_or(EepromError::NoBackingFile)?;
        fs::write(path, &self.data[..])?;
        debug!("eeprom: flushed {}", path.display());
        Ok(())
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn data(&self) -> &[u8] {
        &self.data[..]
    }

    pub fn state(&self) -> BusState {
        self.state
    }

    pub fn address(&self) -> u16 {
        self.address
    }

    pub fn address_known(&self) -> bool {
        self.address_known
    }

    pub fn is_busy(&self) -> bool {
        self.busy_cycles > 0
    }

    // ========== Line interface ==========

    /// Level on the data line: low if either side pulls it low.
    pub fn read_sda(&self) -> bool {
        self.master_sda && self.device_sda
    }

    /// Master drives the data line.
    pub fn write_sda(&mut self, high: bool) {
        if self.master_scl && self.device_sda {
            if high && !self.master_sda {
                self.data_stop();
            } else if !high && self.master_sda {
                self.data_start();
            }
        }
        self.master_sda = high;
    }

    /// Master drives the clock line.
    pub fn write_scl(&mut self, high: bool) {
        if !high && self.master_scl {
            self.clock_fall();
        }
        self.master_scl = high;
    }

    // ========== Page bookkeeping ==========

    /// Whether `page` was read or written during this session.
    pub fn is_page_used(&self, page: usize) -> bool {
        self.pages_used.get(page).copied().unwrap_or(false)
    }

    /// Whether any page was read or written during this session.
    pub fn is_page_detected(&self) -> bool {
        self.pages_used.iter().any(|&used| used)
    }

    /// Reset every byte to the erased value 0xFF.
    pub fn erase_all(&mut self) {
        self.data.fill(0xFF);
        debug!("eeprom: erased all pages");
    }

    /// Erase only the pages used during this session.
    pub fn erase_current(&mut self) {
        let pages = self.data.chunks_mut(PAGE_SIZE).zip(self.pages_used.iter());
        for (page, used) in pages {
            if *used {
                page.fill(0xFF);
            }
        }
        debug!("eeprom: erased pages used this session");
    }

    fn mark_page(&mut self, address: u16) {
        self.pages_used[(address & SIZE_MASK) as usize / PAGE_SIZE] = true;
    }

    // ========== Protocol ==========

    fn data_start(&mut self) {
        if self.state == BusState::WritingByte && (self.shift != 1 || self.packet_len != 3) {
            warn!("eeprom: start condition abandoned a write");
            self.address_known = false;
        }
        if self.state == BusState::ReadingByte {
            warn!("eeprom: start condition abandoned a read");
        }
        if self.is_busy() {
            debug!("eeprom: start while busy, ignored");
            self.state = BusState::Idle;
        } else {
            trace!("eeprom: start");
            self.state = BusState::Acknowledging;
        }
        self.packet_len = 0;
        self.shift = 0;
        self.packet[0] = 0;
    }

    fn data_stop(&mut self) {
        if self.state == BusState::WritingByte && self.shift != 1 {
            warn!("eeprom: stop condition abandoned a write");
            self.address_known = false;
        }
        if self.state == BusState::ReadingByte {
            warn!("eeprom: stop condition abandoned a read");
            self.address_known = false;
        }

        if self.state == BusState::WritingByte && self.shift == 1 && self.packet_len > 3 {
            self.commit();
        } else {
            trace!("eeprom: stop");
        }
        self.state = BusState::Idle;
    }

    /// Write buffered data bytes at the captured address, within one page.
    fn commit(&mut self) {
        self.busy_cycles = WRITE_CYCLE;

        let mut end = self.packet_len;
        let last = self.address.wrapping_add((end - 4) as u16);
        if (last ^ self.address) & !PAGE_MASK != 0 {
            end = 4 + PAGE_MASK as usize - (self.address & PAGE_MASK) as usize;
            debug!(
                "eeprom: write at {:04X} crosses a page, truncated to {} bytes",
                self.address,
                end - 3
            );
        }

        debug!(
            "eeprom: write {} bytes at {:04X}",
            end - 3,
            self.address
        );
        for i in 3..end {
            self.mark_page(self.address);
            self.data[self.address as usize] = self.packet[i];
            self.address = (self.address + 1) & SIZE_MASK;
            if self.address & PAGE_MASK == 0 {
                break;
            }
        }
        self.address_known = false;
    }

    fn clock_fall(&mut self) {
        match self.state {
            BusState::WritingByte => {
                self.shift = (self.shift << 1) | self.master_sda as u16;
                if self.shift & 0x100 != 0 {
                    if self.packet_len == 0 {
                        self.packet[0] = self.shift as u8;
                        match self.shift {
                            CMD_WRITE => {
                                trace!("eeprom: write command");
                                self.state = BusState::Acknowledging;
                                self.device_sda = false;
                            }
                            CMD_READ => {
                                trace!("eeprom: read command at {:04X}", self.address);
                                self.state = BusState::AwaitingAck;
                                self.device_sda = false;
                            }
                            other => {
                                debug!("eeprom: unexpected first byte {:02X}", other & 0xFF);
                                self.state = BusState::Idle;
                            }
                        }
                    } else {
                        self.state = BusState::Acknowledging;
                        self.device_sda = false;
                    }
                }
            }

            BusState::Acknowledging => {
                if self.shift != 0 {
                    if self.packet_len == 0 {
                        self.packet[0] = self.shift as u8;
                        self.packet_len = 1;
                    } else if self.packet_len < PACKET_SIZE {
                        self.packet[self.packet_len] = self.shift as u8;
                        self.packet_len += 1;
                        self.address = ((self.packet[1] as u16) << 8 | self.packet[2] as u16)
                            & SIZE_MASK;
                        if self.packet_len > 2 {
                            self.address_known = true;
                        }
                    } else {
                        debug!("eeprom: packet buffer full, byte dropped");
                    }
                }
                self.device_sda = true;
                self.shift = 1;
                self.state = BusState::WritingByte;
            }

            BusState::AwaitingAck => {
                if self.master_sda && self.device_sda {
                    trace!("eeprom: read NAK");
                    self.state = BusState::Idle;
                    return;
                }
                self.mark_page(self.address);
                self.shift = (self.data[self.address as usize] as u16) << 1 | 1;
                self.state = BusState::ReadingByte;
                self.shift_out();
            }

            BusState::ReadingByte => self.shift_out(),

            BusState::Idle => {}
        }
        trace!(
            "eeprom: clock fall, master {} chip {}",
            self.master_sda as u8,
            self.device_sda as u8
        );
    }

    fn shift_out(&mut self) {
        self.device_sda = self.shift & 0x100 != 0;
        self.shift <<= 1;
        if self.shift & 0x1FE == 0 {
            self.state = BusState::AwaitingAck;
            self.device_sda = true;
            self.address = (self.address + 1) & SIZE_MASK;
        }
    }
}

impl Default for I2cEeprom {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for I2cEeprom {
    fn drop(&mut self) {
        if self.path.is_none() {
            return;
        }
        if let Err(err) = self.flush() {
            warn!("eeprom: failed to save data: {}", err);
        }
    }
}

fn fill_pattern(data: &mut [u8; EEPROM_SIZE]) {
    for j in 0..EEPROM_SIZE / 256 {
        for i in 0..256 {
            data[i + j * 256] = ((i + 1) * (j + 1)) as u8;
        }
    }
}

impl Serializable for I2cEeprom {
    fn name(&self) -> &'static str {
        "EEPROM"
    }

    fn save(&self, out: &mut Serializer) -> Result<(), StateError> {
        out.put_u8(self.state as u8);
        out.put_bool(self.master_sda);
        out.put_bool(self.master_scl);
        out.put_bool(self.device_sda);
        out.put_u16(self.shift);
        out.put_bytes(&self.packet);
        out.put_u8(self.packet_len as u8);
        out.put_u16(self.address);
        out.put_bool(self.address_known);
        out.put_u32(self.busy_cycles);
        for used in &self.pages_used {
            out.put_bool(*used);
        }
        out.put_bytes(&self.data[..]);
        Ok(())
    }

    fn load(&mut self, input: &mut Deserializer<'_>) -> Result<(), StateError> {
        let raw_state = input.get_u8()?;
        let state = BusState::from_u8(raw_state).ok_or(StateError::InvalidValue {
            field: "eeprom state",
            value: raw_state as u32,
        })?;
        let master_sda = input.get_bool()?;
        let master_scl = input.get_bool()?;
        let device_sda = input.get_bool()?;
        let shift = input.get_u16()?;
        let mut packet = [0u8; PACKET_SIZE];
        input.get_into(&mut packet)?;
        let packet_len = input.get_u8()? as usize;
        if packet_len > PACKET_SIZE {
            return Err(StateError::InvalidValue {
                field: "eeprom packet length",
                value: packet_len as u32,
            });
        }
        let address = input.get_u16()? & SIZE_MASK;
        let address_known = input.get_bool()?;
        let busy_cycles = input.get_u32()?;
        let mut pages_used = [false; PAGE_COUNT];
        for used in pages_used.iter_mut() {
            *used = input.get_bool()?;
        }
        let data = input.get_bytes(EEPROM_SIZE)?;

        self.state = state;
        self.master_sda = master_sda;
        self.master_scl = master_scl;
        self.device_sda = device_sda;
        self.shift = shift;
        self.packet = packet;
        self.packet_len = packet_len;
        self.address = address;
        self.address_known = address_known;
        self.busy_cycles = busy_cycles;
        self.pages_used = pages_used;
        self.data.copy_from_slice(data);
        Ok(())
    }
}

impl Device for I2cEeprom {
    fn peek(&self, _offset: u16) -> u8 {
        (self.read_sda() as u8) | (self.master_scl as u8) << 1
    }

    fn write(&mut self, _offset: u16, value: u8) {
        self.write_sda(value & 0x01 != 0);
        self.write_scl(value & 0x02 != 0);
    }

    fn size(&self) -> u16 {
        1
    }

    fn tick(&mut self, cycles: u32) {
        self.busy_cycles = self.busy_cycles.saturating_sub(cycles);
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

    fn start(chip: &mut I2cEeprom) {
        chip.write_sda(true);
        chip.write_scl(true);
        chip.write_sda(false);
        chip.write_scl(false);
    }

    fn stop(chip: &mut I2cEeprom) {
        chip.write_sda(false);
        chip.write_scl(true);
        chip.write_sda(true);
    }

    fn send(chip: &mut I2cEeprom, byte: u8) -> bool {
        for bit in (0..8).rev() {
            chip.write_sda(byte >> bit & 1 != 0);
            chip.write_scl(true);
            chip.write_scl(false);
        }
        chip.write_sda(true);
        chip.write_scl(true);
        let ack = !chip.read_sda();
        chip.write_scl(false);
        ack
    }

    #[test]
    fn test_initial_pattern() {
        let chip = I2cEeprom::new();
        assert_eq!(chip.data()[0], 1);
        assert_eq!(chip.data()[1], 2);
        assert_eq!(chip.data()[256], 2);
        assert_eq!(chip.data()[3 + 2 * 256], 12);
        assert_eq!(chip.state(), BusState::Idle);
        assert!(chip.read_sda());
    }

    #[test]
    fn test_write_command_acknowledged() {
        let mut chip = I2cEeprom::new();
        start(&mut chip);
        assert_eq!(chip.state(), BusState::WritingByte);
        assert!(send(&mut chip, 0xA0));
        assert!(send(&mut chip, 0x01));
        assert!(!chip.address_known());
        assert!(send(&mut chip, 0x23));
        assert!(chip.address_known());
        assert_eq!(chip.address(), 0x0123);
    }

    #[test]
    fn test_unknown_device_code_is_ignored() {
        let mut chip = I2cEeprom::new();
        start(&mut chip);
        assert!(!send(&mut chip, 0x50));
        assert_eq!(chip.state(), BusState::Idle);
    }

    #[test]
    fn test_address_is_masked_to_size() {
        let mut chip = I2cEeprom::new();
        start(&mut chip);
        send(&mut chip, 0xA0);
        send(&mut chip, 0xFF);
        send(&mut chip, 0xFF);
        assert_eq!(chip.address(), 0x7FFF);
    }

    #[test]
    fn test_commit_sets_busy_until_ticked() {
        let mut chip = I2cEeprom::new();
        start(&mut chip);
        send(&mut chip, 0xA0);
        send(&mut chip, 0x00);
        send(&mut chip, 0x10);
        send(&mut chip, 0x5A);
        stop(&mut chip);

        assert_eq!(chip.data()[0x10], 0x5A);
        assert!(chip.is_busy());
        assert!(chip.is_page_used(0));
        assert!(!chip.is_page_used(1));

        chip.tick(WRITE_CYCLE);
        assert!(!chip.is_busy());
    }

    #[test]
    fn test_bus_register_drives_lines() {
        let mut chip = I2cEeprom::new();
        // SDA high, SCL high
        chip.write(0, 0x03);
        assert_eq!(chip.peek(0), 0x03);
        // SDA low while SCL high: start
        chip.write(0, 0x02);
        chip.write(0, 0x00);
        assert_eq!(chip.state(), BusState::WritingByte);
    }

    #[test]
    fn test_erase_current_only_touches_used_pages() {
        let mut chip = I2cEeprom::new();
        start(&mut chip);
        send(&mut chip, 0xA0);
        send(&mut chip, 0x00);
        send(&mut chip, 0x40);
        send(&mut chip, 0x99);
        stop(&mut chip);

        chip.erase_current();
        assert!(chip.data()[0x40..0x80].iter().all(|&b| b == 0xFF));
        assert_eq!(chip.data()[0x00], 1);

        chip.erase_all();
        assert!(chip.data().iter().all(|&b| b == 0xFF));
    }
}
