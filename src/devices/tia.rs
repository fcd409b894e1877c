//! TIA register window and beam counters.
//!
//! This is not a video renderer. The TIA here stores register writes, answers
//! the input-port reads programs poll, and keeps the beam position the
//! debugger reports: scanline, frame number, colour clocks into the line and
//! CPU cycles since the frame began.
//!
//! Timing: one CPU cycle is three colour clocks and a scanline is 228 colour
//! clocks (76 CPU cycles). A frame starts when a program turns VSYNC off.

use std::any::Any;

use super::Device;
use crate::serializer::{Deserializer, Serializable, Serializer, StateError};

/// Colour clocks per scanline.
pub const CLOCKS_PER_LINE: u32 = 228;

/// Colour clocks per CPU cycle.
pub const CLOCKS_PER_CYCLE: u32 = 3;

/// Write register offsets used by the counters.
pub const VSYNC: u16 = 0x00;
pub const VBLANK: u16 = 0x01;
pub const WSYNC: u16 = 0x02;

/// First of the six input port read registers (INPT0).
pub const INPT0: u16 = 0x08;

const WRITE_REGS: usize = 0x40;
const INPUT_PORTS: usize = 6;

/// Television Interface Adaptor mapped at `$0000-$007F`.
#[derive(Debug, Clone)]
pub struct Tia {
    regs: [u8; WRITE_REGS],
    inputs: [u8; INPUT_PORTS],
    clocks_in_line: u32,
    scanline: u32,
    frame_count: u32,
    frame_cycles: u32,
    total_cycles: u64,
    wsync_pending: bool,
}

impl Tia {
    pub fn new() -> Self {
        Self {
            regs: [0; WRITE_REGS],
            // Paddles discharged, fire buttons released
            inputs: [0x00, 0x00, 0x00, 0x00, 0x80, 0x80],
            clocks_in_line: 0,
            scanline: 0,
            frame_count: 0,
            frame_cycles: 0,
            total_cycles: 0,
            wsync_pending: false,
        }
    }

    /// Set the value read back from input port `port` (0-5).
    pub fn set_input(&mut self, port: usize, value: u8) {
        if let Some(slot) = self.inputs.get_mut(port) {
            *slot = value;
        }
    }

    /// Press or release a joystick fire button (0 = left, 1 = right).
    pub fn set_fire_button(&mut self, player: usize, pressed: bool) {
        self.set_input(4 + player, if pressed { 0x00 } else { 0x80 });
    }

    /// Last value written to register `offset`.
    pub fn register(&self, offset: u16) -> u8 {
        self.regs[(offset as usize) & (WRITE_REGS - 1)]
    }

    pub fn scanlines(&self) -> u32 {
        self.scanline
    }

    pub fn frame_count(&self) -> u32 {
        self.frame_count
    }

    pub fn frame_cycles(&self) -> u32 {
        self.frame_cycles
    }

    pub fn total_cycles(&self) -> u64 {
        self.total_cycles
    }

    /// Colour clocks elapsed in the current scanline.
    pub fn clocks_this_line(&self) -> u32 {
        self.clocks_in_line
    }

    pub fn vsync(&self) -> bool {
        self.regs[VSYNC as usize] & 0x02 != 0
    }

    pub fn vblank(&self) -> bool {
        self.regs[VBLANK as usize] & 0x02 != 0
    }

    /// Consume a pending WSYNC strobe.
    pub fn take_wsync(&mut self) -> bool {
        std::mem::take(&mut self.wsync_pending)
    }

    /// CPU cycles until the beam reaches the start of the next scanline.
    pub fn cycles_to_line_end(&self) -> u32 {
        if self.clocks_in_line == 0 {
            return 0;
        }
        (CLOCKS_PER_LINE - self.clocks_in_line).div_ceil(CLOCKS_PER_CYCLE)
    }

    fn start_frame(&mut self) {
        self.frame_count = self.frame_count.wrapping_add(1);
        self.scanline = 0;
        self.frame_cycles = 0;
    }
}

impl Default for Tia {
    fn default() -> Self {
        Self::new()
    }
}

impl Serializable for Tia {
    fn name(&self) -> &'static str {
        "TIA"
    }

    fn save(&self, out: &mut Serializer) -> Result<(), StateError> {
        out.put_bytes(&self.regs);
        out.put_bytes(&self.inputs);
        out.put_u32(self.clocks_in_line);
        out.put_u32(self.scanline);
        out.put_u32(self.frame_count);
        out.put_u32(self.frame_cycles);
        out.put_u64(self.total_cycles);
        out.put_bool(self.wsync_pending);
        Ok(())
    }

    fn load(&mut self, input: &mut Deserializer<'_>) -> Result<(), StateError> {
        let mut regs = [0u8; WRITE_REGS];
        input.get_into(&mut regs)?;
        let mut inputs = [0u8; INPUT_PORTS];
        input.get_into(&mut inputs)?;
        let clocks_in_line = input.get_u32()?;
        if clocks_in_line >= CLOCKS_PER_LINE {
            return Err(StateError::InvalidValue {
                field: "tia colour clock",
                value: clocks_in_line,
            });
        }
        let scanline = input.get_u32()?;
        let frame_count = input.get_u32()?;
        let frame_cycles = input.get_u32()?;
        let total_cycles = input.get_u64()?;
        let wsync_pending = input.get_bool()?;

        *self = Tia {
            regs,
            inputs,
            clocks_in_line,
            scanline,
            frame_count,
            frame_cycles,
            total_cycles,
            wsync_pending,
        };
        Ok(())
    }
}

impl Device for Tia {
    fn peek(&self, offset: u16) -> u8 {
        match offset & 0x0F {
            port @ 0x08..=0x0D => self.inputs[(port - INPT0) as usize],
            // Collision latches are not modelled
            _ => 0x00,
        }
    }

    fn write(&mut self, offset: u16, value: u8) {
        let reg = offset & (WRITE_REGS as u16 - 1);
        match reg {
            VSYNC => {
                let was_on = self.vsync();
                self.regs[VSYNC as usize] = value;
                if was_on && !self.vsync() {
                    self.start_frame();
                }
            }
            WSYNC => self.wsync_pending = true,
            _ => self.regs[reg as usize] = value,
        }
    }

    fn size(&self) -> u16 {
        0x80
    }

    fn tick(&mut self, cycles: u32) {
        self.total_cycles += cycles as u64;
        self.frame_cycles = self.frame_cycles.wrapping_add(cycles);

        let clocks = self.clocks_in_line + cycles * CLOCKS_PER_CYCLE;
        self.scanline += clocks / CLOCKS_PER_LINE;
        self.clocks_in_line = clocks % CLOCKS_PER_LINE;
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
    fn test_scanline_advances_every_76_cycles() {
        let mut tia = Tia::new();
        tia.tick(75);
        assert_eq!(tia.scanlines(), 0);
        assert_eq!(tia.clocks_this_line(), 225);
        tia.tick(1);
        assert_eq!(tia.scanlines(), 1);
        assert_eq!(tia.clocks_this_line(), 0);
        tia.tick(76 * 10);
        assert_eq!(tia.scanlines(), 11);
    }

    #[test]
    fn test_vsync_falling_edge_starts_frame() {
        let mut tia = Tia::new();
        tia.tick(1000);
        tia.write(VSYNC, 0x02);
        assert!(tia.vsync());
        assert_eq!(tia.frame_count(), 0);

        tia.write(VSYNC, 0x00);
        assert_eq!(tia.frame_count(), 1);
        assert_eq!(tia.scanlines(), 0);
        assert_eq!(tia.frame_cycles(), 0);
        assert_eq!(tia.total_cycles(), 1000);
    }

    #[test]
    fn test_wsync_stall_length() {
        let mut tia = Tia::new();
        tia.tick(10);
        tia.write(WSYNC, 0);
        assert!(tia.take_wsync());
        assert!(!tia.take_wsync());
        assert_eq!(tia.cycles_to_line_end(), 66);
    }

    #[test]
    fn test_input_ports() {
        let mut tia = Tia::new();
        assert_eq!(tia.peek(0x0C), 0x80);
        tia.set_fire_button(0, true);
        assert_eq!(tia.peek(0x0C), 0x00);
        // Read registers mirror every 16 bytes
        assert_eq!(tia.peek(0x1C), 0x00);
    }

    #[test]
    fn test_load_rejects_bad_clock() {
        let mut tia = Tia::new();
        let mut out = Serializer::new();
        tia.save(&mut out).unwrap();
        let mut bytes = out.into_bytes();
        // clocks_in_line follows the register and input blocks
        let at = WRITE_REGS + INPUT_PORTS;
        bytes[at..at + 4].copy_from_slice(&500u32.to_le_bytes());

        tia.tick(5);
        assert!(tia.load(&mut Deserializer::new(&bytes)).is_err());
        assert_eq!(tia.total_cycles(), 5);
    }
}
