//! # CPU State and Execution
//!
//! This module contains the CPU struct representing the 6507 processor state
//! and the fetch-decode-execute step.
//!
//! ## CPU State
//!
//! The CPU maintains:
//! - **Registers**: Accumulator (A), index registers (X, Y)
//! - **Program counter** (PC): 16-bit address of next instruction
//! - **Stack pointer** (SP): 8-bit offset into stack page (0x0100-0x01FF)
//! - **Status flags**: N, V, B, D, I, Z, C (individual bool fields)
//! - **Cycle counter**: u64 monotonically increasing cycle count
//!
//! ## Execution Model
//!
//! The CPU does not own its memory. `step()` takes the bus it runs against, so
//! the same register file can be driven over a [`FlatMemory`](crate::FlatMemory)
//! in tests or the instrumented [`AddressBus`](crate::AddressBus) of a
//! [`System`](crate::System).
//!
//! The instruction set covers loads, stores, transfers, increments and
//! decrements, flag operations, compares, binary-mode ADC/SBC, logic
//! operations, BIT, branches, JMP/JSR/RTS and the stack push/pull of A. Any
//! other opcode fails with [`ExecutionError::UnimplementedOpcode`] and leaves
//! the CPU at the faulting instruction.

use crate::devices::AccessFlags;
use crate::serializer::{Deserializer, Serializable, Serializer, StateError};
use crate::{ExecutionError, MemoryBus};

/// Address of the little-endian reset vector.
pub const RESET_VECTOR: u16 = 0xFFFC;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Immediate,
    ZeroPage,
    ZeroPageX,
    Absolute,
    AbsoluteX,
    AbsoluteY,
}

/// 6507 CPU state.
///
/// # Examples
///
/// ```
/// use vcs_debug::{CPU, FlatMemory, MemoryBus};
///
/// let mut memory = FlatMemory::new();
/// memory.write(0xFFFC, 0x00);
/// memory.write(0xFFFD, 0xF0);
/// memory.load(0xF000, &[0xA9, 0x42]); // LDA #$42
///
/// let mut cpu = CPU::new(&mut memory);
/// assert_eq!(cpu.pc(), 0xF000);
/// assert_eq!(cpu.sp(), 0xFD);
///
/// let cycles = cpu.step(&mut memory).unwrap();
/// assert_eq!(cycles, 2);
/// assert_eq!(cpu.a(), 0x42);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CPU {
    /// Accumulator register
    pub(crate) a: u8,

    /// X index register
    pub(crate) x: u8,

    /// Y index register
    pub(crate) y: u8,

    /// Program counter (address of next instruction)
    pub(crate) pc: u16,

    /// Stack pointer (0x0100 + sp gives full stack address)
    pub(crate) sp: u8,

    pub(crate) flag_n: bool,
    pub(crate) flag_v: bool,
    pub(crate) flag_b: bool,
    pub(crate) flag_d: bool,
    pub(crate) flag_i: bool,
    pub(crate) flag_z: bool,
    pub(crate) flag_c: bool,

    /// Total CPU cycles executed
    pub(crate) cycles: u64,
}

impl CPU {
    /// Creates a CPU in the power-on reset state, loading PC from the reset
    /// vector at 0xFFFC/0xFFFD.
    pub fn new<M: MemoryBus>(bus: &mut M) -> Self {
        let mut cpu = Self {
            a: 0x00,
            x: 0x00,
            y: 0x00,
            pc: 0x0000,
            sp: 0xFD,
            flag_n: false,
            flag_v: false,
            flag_b: false,
            flag_d: false,
            flag_i: true,
            flag_z: false,
            flag_c: false,
            cycles: 0,
        };
        cpu.reset(bus);
        cpu
    }

    /// Return to the power-on state and reload PC from the reset vector.
    pub fn reset<M: MemoryBus>(&mut self, bus: &mut M) {
        let low = bus.read(RESET_VECTOR) as u16;
        let high = bus.read(RESET_VECTOR + 1) as u16;
        self.a = 0;
        self.x = 0;
        self.y = 0;
        self.sp = 0xFD;
        self.set_status(0x24);
        self.pc = (high << 8) | low;
        self.cycles = 0;
    }

    /// Executes one instruction, returning the cycles it took.
    pub fn step<M: MemoryBus>(&mut self, bus: &mut M) -> Result<u32, ExecutionError> {
        let start = self.pc;
        let opcode = bus.read_flagged(start, AccessFlags::CODE);
        self.pc = start.wrapping_add(1);

        let cycles = match opcode {
            // Loads
            0xA9 => self.load_register(bus, Mode::Immediate, Reg::A),
            0xA5 => self.load_register(bus, Mode::ZeroPage, Reg::A),
            0xB5 => self.load_register(bus, Mode::ZeroPageX, Reg::A),
            0xAD => self.load_register(bus, Mode::Absolute, Reg::A),
            0xBD => self.load_register(bus, Mode::AbsoluteX, Reg::A),
            0xB9 => self.load_register(bus, Mode::AbsoluteY, Reg::A),
            0xA2 => self.load_register(bus, Mode::Immediate, Reg::X),
            0xA6 => self.load_register(bus, Mode::ZeroPage, Reg::X),
            0xAE => self.load_register(bus, Mode::Absolute, Reg::X),
            0xA0 => self.load_register(bus, Mode::Immediate, Reg::Y),
            0xA4 => self.load_register(bus, Mode::ZeroPage, Reg::Y),
            0xAC => self.load_register(bus, Mode::Absolute, Reg::Y),

            // Stores
            0x85 => self.store(bus, Mode::ZeroPage, Reg::A),
            0x95 => self.store(bus, Mode::ZeroPageX, Reg::A),
            0x8D => self.store(bus, Mode::Absolute, Reg::A),
            0x9D => self.store(bus, Mode::AbsoluteX, Reg::A),
            0x99 => self.store(bus, Mode::AbsoluteY, Reg::A),
            0x86 => self.store(bus, Mode::ZeroPage, Reg::X),
            0x8E => self.store(bus, Mode::Absolute, Reg::X),
            0x84 => self.store(bus, Mode::ZeroPage, Reg::Y),
            0x8C => self.store(bus, Mode::Absolute, Reg::Y),

            // Transfers
            0xAA => self.transfer(self.a, Reg::X),
            0xA8 => self.transfer(self.a, Reg::Y),
            0x8A => self.transfer(self.x, Reg::A),
            0x98 => self.transfer(self.y, Reg::A),
            0xBA => self.transfer(self.sp, Reg::X),
            0x9A => {
                self.sp = self.x;
                2
            }

            // Increments and decrements
            0xE8 => self.transfer(self.x.wrapping_add(1), Reg::X),
            0xC8 => self.transfer(self.y.wrapping_add(1), Reg::Y),
            0xCA => self.transfer(self.x.wrapping_sub(1), Reg::X),
            0x88 => self.transfer(self.y.wrapping_sub(1), Reg::Y),
            0xE6 => self.modify(bus, Mode::ZeroPage, |v| v.wrapping_add(1)),
            0xEE => self.modify(bus, Mode::Absolute, |v| v.wrapping_add(1)),
            0xC6 => self.modify(bus, Mode::ZeroPage, |v| v.wrapping_sub(1)),
            0xCE => self.modify(bus, Mode::Absolute, |v| v.wrapping_sub(1)),

            // Flags
            0x18 => self.flag(|cpu| cpu.flag_c = false),
            0x38 => self.flag(|cpu| cpu.flag_c = true),
            0x58 => self.flag(|cpu| cpu.flag_i = false),
            0x78 => self.flag(|cpu| cpu.flag_i = true),
            0xB8 => self.flag(|cpu| cpu.flag_v = false),
            0xD8 => self.flag(|cpu| cpu.flag_d = false),
            0xF8 => self.flag(|cpu| cpu.flag_d = true),

            // Compares
            0xC9 => self.compare(bus, Mode::Immediate, self.a),
            0xC5 => self.compare(bus, Mode::ZeroPage, self.a),
            0xCD => self.compare(bus, Mode::Absolute, self.a),
            0xE0 => self.compare(bus, Mode::Immediate, self.x),
            0xC0 => self.compare(bus, Mode::Immediate, self.y),

            // Arithmetic and logic
            0x69 => self.arith(bus, Mode::Immediate, false),
            0x65 => self.arith(bus, Mode::ZeroPage, false),
            0xE9 => self.arith(bus, Mode::Immediate, true),
            0xE5 => self.arith(bus, Mode::ZeroPage, true),
            0x29 => self.logic(bus, Mode::Immediate, |a, v| a & v),
            0x09 => self.logic(bus, Mode::Immediate, |a, v| a | v),
            0x49 => self.logic(bus, Mode::Immediate, |a, v| a ^ v),
            0x24 => self.bit(bus, Mode::ZeroPage),
            0x2C => self.bit(bus, Mode::Absolute),

            // Branches
            0x10 => self.branch(bus, !self.flag_n),
            0x30 => self.branch(bus, self.flag_n),
            0x50 => self.branch(bus, !self.flag_v),
            0x70 => self.branch(bus, self.flag_v),
            0x90 => self.branch(bus, !self.flag_c),
            0xB0 => self.branch(bus, self.flag_c),
            0xD0 => self.branch(bus, !self.flag_z),
            0xF0 => self.branch(bus, self.flag_z),

            // Control flow
            0x4C => {
                self.pc = self.fetch_word(bus);
                3
            }
            0x20 => {
                let target = self.fetch_word(bus);
                let ret = self.pc.wrapping_sub(1);
                self.push(bus, (ret >> 8) as u8);
                self.push(bus, ret as u8);
                self.pc = target;
                6
            }
            0x60 => {
                let low = self.pull(bus) as u16;
                let high = self.pull(bus) as u16;
                self.pc = ((high << 8) | low).wrapping_add(1);
                6
            }
            0x48 => {
                self.push(bus, self.a);
                3
            }
            0x68 => {
                let value = self.pull(bus);
                self.transfer(value, Reg::A);
                4
            }
            0xEA => 2,

            _ => {
                self.pc = start;
                return Err(ExecutionError::UnimplementedOpcode(opcode));
            }
        };

        self.cycles += cycles as u64;
        Ok(cycles)
    }

    // ========== Operand helpers ==========

    fn fetch_byte<M: MemoryBus>(&mut self, bus: &mut M) -> u8 {
        let value = bus.read_flagged(self.pc, AccessFlags::CODE);
        self.pc = self.pc.wrapping_add(1);
        value
    }

    fn fetch_word<M: MemoryBus>(&mut self, bus: &mut M) -> u16 {
        let low = self.fetch_byte(bus) as u16;
        let high = self.fetch_byte(bus) as u16;
        (high << 8) | low
    }

    /// Effective address for `mode` and whether indexing crossed a page.
    fn address<M: MemoryBus>(&mut self, bus: &mut M, mode: Mode) -> (u16, bool) {
        match mode {
            Mode::Immediate => {
                let addr = self.pc;
                self.pc = self.pc.wrapping_add(1);
                (addr, false)
            }
            Mode::ZeroPage => (self.fetch_byte(bus) as u16, false),
            Mode::ZeroPageX => (self.fetch_byte(bus).wrapping_add(self.x) as u16, false),
            Mode::Absolute => (self.fetch_word(bus), false),
            Mode::AbsoluteX | Mode::AbsoluteY => {
                let base = self.fetch_word(bus);
                let index = if mode == Mode::AbsoluteX { self.x } else { self.y };
                let addr = base.wrapping_add(index as u16);
                (addr, (base & 0xFF00) != (addr & 0xFF00))
            }
        }
    }

    fn operand<M: MemoryBus>(&mut self, bus: &mut M, mode: Mode) -> (u8, bool) {
        let (addr, crossed) = self.address(bus, mode);
        let flags = if mode == Mode::Immediate {
            AccessFlags::CODE
        } else {
            AccessFlags::DATA
        };
        (bus.read_flagged(addr, flags), crossed)
    }

    fn read_cycles(mode: Mode, crossed: bool) -> u32 {
        let base = match mode {
            Mode::Immediate => 2,
            Mode::ZeroPage => 3,
            Mode::ZeroPageX | Mode::Absolute | Mode::AbsoluteX | Mode::AbsoluteY => 4,
        };
        base + crossed as u32
    }

    fn set_nz(&mut self, value: u8) {
        self.flag_z = value == 0;
        self.flag_n = value & 0x80 != 0;
    }

    // ========== Instruction groups ==========

    fn load_register<M: MemoryBus>(&mut self, bus: &mut M, mode: Mode, reg: Reg) -> u32 {
        let (value, crossed) = self.operand(bus, mode);
        self.transfer(value, reg);
        Self::read_cycles(mode, crossed)
    }

    fn store<M: MemoryBus>(&mut self, bus: &mut M, mode: Mode, reg: Reg) -> u32 {
        let (addr, _) = self.address(bus, mode);
        let value = match reg {
            Reg::A => self.a,
            Reg::X => self.x,
            Reg::Y => self.y,
        };
        bus.write(addr, value);
        match mode {
            Mode::ZeroPage => 3,
            Mode::AbsoluteX | Mode::AbsoluteY => 5,
            _ => 4,
        }
    }

    /// Load `value` into `reg`, updating N and Z. Always 2 cycles.
    fn transfer(&mut self, value: u8, reg: Reg) -> u32 {
        match reg {
            Reg::A => self.a = value,
            Reg::X => self.x = value,
            Reg::Y => self.y = value,
        }
        self.set_nz(value);
        2
    }

    fn modify<M: MemoryBus>(&mut self, bus: &mut M, mode: Mode, op: fn(u8) -> u8) -> u32 {
        let (addr, _) = self.address(bus, mode);
        let value = op(bus.read_flagged(addr, AccessFlags::DATA));
        bus.write(addr, value);
        self.set_nz(value);
        if mode == Mode::ZeroPage {
            5
        } else {
            6
        }
    }

    fn flag(&mut self, op: fn(&mut CPU)) -> u32 {
        op(self);
        2
    }

    fn compare<M: MemoryBus>(&mut self, bus: &mut M, mode: Mode, register: u8) -> u32 {
        let (value, crossed) = self.operand(bus, mode);
        self.flag_c = register >= value;
        self.set_nz(register.wrapping_sub(value));
        Self::read_cycles(mode, crossed)
    }

    /// Binary-mode ADC, or SBC when `subtract` is set.
    fn arith<M: MemoryBus>(&mut self, bus: &mut M, mode: Mode, subtract: bool) -> u32 {
        let (operand, crossed) = self.operand(bus, mode);
        let value = if subtract { !operand } else { operand };
        let sum = self.a as u16 + value as u16 + self.flag_c as u16;
        let result = sum as u8;
        self.flag_c = sum > 0xFF;
        self.flag_v = (self.a ^ result) & (value ^ result) & 0x80 != 0;
        self.a = result;
        self.set_nz(result);
        Self::read_cycles(mode, crossed)
    }

    fn logic<M: MemoryBus>(&mut self, bus: &mut M, mode: Mode, op: fn(u8, u8) -> u8) -> u32 {
        let (value, crossed) = self.operand(bus, mode);
        let result = op(self.a, value);
        self.transfer(result, Reg::A);
        Self::read_cycles(mode, crossed)
    }

    fn bit<M: MemoryBus>(&mut self, bus: &mut M, mode: Mode) -> u32 {
        let (value, crossed) = self.operand(bus, mode);
        self.flag_z = self.a & value == 0;
        self.flag_n = value & 0x80 != 0;
        self.flag_v = value & 0x40 != 0;
        Self::read_cycles(mode, crossed)
    }

    fn branch<M: MemoryBus>(&mut self, bus: &mut M, taken: bool) -> u32 {
        let offset = self.fetch_byte(bus) as i8;
        if !taken {
            return 2;
        }
        let target = self.pc.wrapping_add_signed(offset as i16);
        let crossed = (self.pc & 0xFF00) != (target & 0xFF00);
        self.pc = target;
        3 + crossed as u32
    }

    fn push<M: MemoryBus>(&mut self, bus: &mut M, value: u8) {
        bus.write(0x0100 | self.sp as u16, value);
        self.sp = self.sp.wrapping_sub(1);
    }

    fn pull<M: MemoryBus>(&mut self, bus: &mut M) -> u8 {
        self.sp = self.sp.wrapping_add(1);
        bus.read(0x0100 | self.sp as u16)
    }

    // ========== Register access ==========

    pub fn a(&self) -> u8 {
        self.a
    }

    pub fn x(&self) -> u8 {
        self.x
    }

    pub fn y(&self) -> u8 {
        self.y
    }

    pub fn pc(&self) -> u16 {
        self.pc
    }

    pub fn sp(&self) -> u8 {
        self.sp
    }

    /// Packed status register (NV-BDIZC). Bit 5 always reads as 1.
    pub fn status(&self) -> u8 {
        (self.flag_n as u8) << 7
            | (self.flag_v as u8) << 6
            | 1 << 5
            | (self.flag_b as u8) << 4
            | (self.flag_d as u8) << 3
            | (self.flag_i as u8) << 2
            | (self.flag_z as u8) << 1
            | self.flag_c as u8
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn flag_n(&self) -> bool {
        self.flag_n
    }

    pub fn flag_v(&self) -> bool {
        self.flag_v
    }

    pub fn flag_b(&self) -> bool {
        self.flag_b
    }

    pub fn flag_d(&self) -> bool {
        self.flag_d
    }

    pub fn flag_i(&self) -> bool {
        self.flag_i
    }

    pub fn flag_z(&self) -> bool {
        self.flag_z
    }

    pub fn flag_c(&self) -> bool {
        self.flag_c
    }

    pub fn set_a(&mut self, value: u8) {
        self.a = value;
    }

    pub fn set_x(&mut self, value: u8) {
        self.x = value;
    }

    pub fn set_y(&mut self, value: u8) {
        self.y = value;
    }

    pub fn set_pc(&mut self, value: u16) {
        self.pc = value;
    }

    pub fn set_sp(&mut self, value: u8) {
        self.sp = value;
    }

    /// Unpack NV-BDIZC into the individual flags.
    pub fn set_status(&mut self, value: u8) {
        self.flag_n = value & 0x80 != 0;
        self.flag_v = value & 0x40 != 0;
        self.flag_b = value & 0x10 != 0;
        self.flag_d = value & 0x08 != 0;
        self.flag_i = value & 0x04 != 0;
        self.flag_z = value & 0x02 != 0;
        self.flag_c = value & 0x01 != 0;
    }

    /// Account for cycles spent outside instruction execution (WSYNC stalls).
    pub fn add_cycles(&mut self, cycles: u32) {
        self.cycles += cycles as u64;
    }
}

#[derive(Debug, Clone, Copy)]
enum Reg {
    A,
    X,
    Y,
}

impl Serializable for CPU {
    fn name(&self) -> &'static str {
        "M6502"
    }

    fn save(&self, out: &mut Serializer) -> Result<(), StateError> {
        out.put_u8(self.a);
        out.put_u8(self.x);
        out.put_u8(self.y);
        out.put_u16(self.pc);
        out.put_u8(self.sp);
        out.put_u8(self.status());
        out.put_u64(self.cycles);
        Ok(())
    }

    fn load(&mut self, input: &mut Deserializer<'_>) -> Result<(), StateError> {
        let a = input.get_u8()?;
        let x = input.get_u8()?;
        let y = input.get_u8()?;
        let pc = input.get_u16()?;
        let sp = input.get_u8()?;
        let status = input.get_u8()?;
        let cycles = input.get_u64()?;

        self.a = a;
        self.x = x;
        self.y = y;
        self.pc = pc;
        self.sp = sp;
        self.set_status(status);
        self.cycles = cycles;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FlatMemory;

    fn setup(program: &[u8]) -> (CPU, FlatMemory) {
        let mut mem = FlatMemory::new();
        mem.write(0xFFFC, 0x00);
        mem.write(0xFFFD, 0xF0);
        mem.load(0xF000, program);
        let cpu = CPU::new(&mut mem);
        (cpu, mem)
    }

    #[test]
    fn test_cpu_initialization() {
        let (cpu, _) = setup(&[]);
        assert_eq!(cpu.pc(), 0xF000);
        assert_eq!(cpu.sp(), 0xFD);
        assert_eq!(cpu.a(), 0);
        assert!(cpu.flag_i());
        assert_eq!(cpu.cycles(), 0);
        assert_eq!(cpu.status(), 0x24);
    }

    #[test]
    fn test_status_register_packing() {
        let (mut cpu, _) = setup(&[]);
        cpu.set_status(0xC3);
        assert!(cpu.flag_n() && cpu.flag_v() && cpu.flag_z() && cpu.flag_c());
        assert!(!cpu.flag_i());
        assert_eq!(cpu.status(), 0xE3);
    }

    #[test]
    fn test_step_unimplemented_stays_put() {
        let (mut cpu, mut mem) = setup(&[0x02]);
        assert_eq!(
            cpu.step(&mut mem),
            Err(ExecutionError::UnimplementedOpcode(0x02))
        );
        assert_eq!(cpu.pc(), 0xF000);
        assert_eq!(cpu.cycles(), 0);
    }

    #[test]
    fn test_store_and_increment() {
        // LDA #$7F; STA $80; INC $80
        let (mut cpu, mut mem) = setup(&[0xA9, 0x7F, 0x85, 0x80, 0xE6, 0x80]);
        let cycles: u32 = (0..3).map(|_| cpu.step(&mut mem).unwrap()).sum();
        assert_eq!(cycles, 10);
        assert_eq!(cpu.cycles(), 10);
        assert_eq!(mem.read(0x80), 0x80);
        assert!(cpu.flag_n());
    }

    #[test]
    fn test_countdown_loop() {
        // LDX #3; loop: DEX; BNE loop; NOP
        let (mut cpu, mut mem) = setup(&[0xA2, 0x03, 0xCA, 0xD0, 0xFD, 0xEA]);
        for _ in 0..7 {
            cpu.step(&mut mem).unwrap();
        }
        assert_eq!(cpu.x(), 0);
        assert_eq!(cpu.pc(), 0xF005);
        // LDX 2 + 3 * DEX 2 + 2 taken branches 3 + final branch 2
        assert_eq!(cpu.cycles(), 2 + 6 + 6 + 2);
    }

    #[test]
    fn test_jsr_rts() {
        // JSR $F010; NOP ... $F010: LDY #1; RTS
        let mut program = vec![0x20, 0x10, 0xF0, 0xEA];
        program.resize(0x10, 0xEA);
        program.extend_from_slice(&[0xA0, 0x01, 0x60]);
        let (mut cpu, mut mem) = setup(&program);

        cpu.step(&mut mem).unwrap();
        assert_eq!(cpu.pc(), 0xF010);
        assert_eq!(cpu.sp(), 0xFB);
        cpu.step(&mut mem).unwrap();
        cpu.step(&mut mem).unwrap();
        assert_eq!(cpu.pc(), 0xF003);
        assert_eq!(cpu.y(), 1);
        assert_eq!(cpu.sp(), 0xFD);
    }

    #[test]
    fn test_adc_sets_carry_and_overflow() {
        // CLC; LDA #$7F; ADC #$01
        let (mut cpu, mut mem) = setup(&[0x18, 0xA9, 0x7F, 0x69, 0x01]);
        for _ in 0..3 {
            cpu.step(&mut mem).unwrap();
        }
        assert_eq!(cpu.a(), 0x80);
        assert!(cpu.flag_v());
        assert!(!cpu.flag_c());
    }

    #[test]
    fn test_state_round_trip() {
        let (mut cpu, mut mem) = setup(&[0xA9, 0x55]);
        cpu.step(&mut mem).unwrap();

        let mut out = Serializer::new();
        cpu.save(&mut out).unwrap();
        let bytes = out.into_bytes();

        let (mut other, _) = setup(&[]);
        Serializable::load(&mut other, &mut Deserializer::new(&bytes)).unwrap();
        assert_eq!(other, cpu);
    }
}
