//! # Debugger Session
//!
//! [`Debugger`] owns a [`System`] and everything a debugging session adds on
//! top of it: the rewind stack, the expression tables, conditional breaks and
//! in-memory save slots.
//!
//! Every action that changes machine state (stepping, patching, resetting,
//! loading a slot, ...) first pushes a snapshot tagged with a short message,
//! so [`Debugger::rewind_state`] can undo it. Actions that turn out to
//! change nothing (an undecodable opcode, a refused bank switch) leave the
//! rewind stack alone.
//!
//! Watch expressions are re-evaluated whenever a stepping operation returns;
//! [`Debugger::watch_values`] reports them as of that stop.
//!
//! Stepping operations stop at the first of:
//!
//! - a breakpoint at the PC about to execute (not checked for the very first
//!   instruction after resuming, so continuing from a breakpoint works),
//! - a read or write trap fired by the instruction just executed,
//! - a conditional break whose expression is non-zero,
//! - the requested amount of execution being done,
//! - [`DebuggerConfig::max_run_cycles`] elapsed.
//!
//! ```
//! use vcs_debug::{Cartridge, Debugger, DebuggerConfig, StopReason, System};
//!
//! let mut rom = vec![0xEA; 4096]; // NOPs
//! rom[0xFFC] = 0x00;
//! rom[0xFFD] = 0xF0;
//! let system = System::new(Cartridge::new(rom, false).unwrap()).unwrap();
//! let mut dbg = Debugger::new(system, DebuggerConfig::default()).unwrap();
//!
//! dbg.toggle_breakpoint(0xF004);
//! assert_eq!(dbg.run().unwrap(), StopReason::Breakpoint(0xF004));
//! assert_eq!(dbg.evaluate("pc").unwrap(), 0xF004);
//!
//! assert_eq!(dbg.rewind_state().unwrap(), "run");
//! assert_eq!(dbg.evaluate("pc").unwrap(), 0xF000);
//! ```

use std::fmt;

use log::{debug, info, warn};
use thiserror::Error;

use crate::devices::{AccessFlags, DeviceError, TrapHit, TrapKind};
use crate::expression::{
    self, builtin_help, AccessorTable, Base, EvalContext, EvalError, Expression, FunctionError,
    FunctionTable, Inspect, ParseContext, ParseError, SymbolTable, BUILTIN_FUNCTIONS,
};
use crate::rewind::{RewindConfig, RewindError, RewindManager, Snapshot};
use crate::serializer::StateError;
use crate::{state, ExecutionError, System};

/// Number of in-memory save slots.
pub const SAVE_SLOTS: usize = 10;

/// Message reported by [`Debugger::parse_error`] before anything has failed.
pub const NO_ERROR: &str = "(no error)";

const JSR: u8 = 0x20;

/// Session settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebuggerConfig {
    pub rewind: RewindConfig,
    /// Radix for literals without a prefix.
    pub default_base: Base,
    /// Upper bound on CPU cycles for any single run, trace or frame advance.
    pub max_run_cycles: u64,
}

impl Default for DebuggerConfig {
    fn default() -> Self {
        Self {
            rewind: RewindConfig::default(),
            default_base: Base::Hex,
            // One minute of NTSC frames
            max_run_cycles: 60 * 60 * 262 * 76,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DebuggerError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Eval(#[from] EvalError),

    #[error(transparent)]
    Function(#[from] FunctionError),

    #[error(transparent)]
    Rewind(#[from] RewindError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Execution(#[from] ExecutionError),

    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error("this machine has no {0}")]
    MissingDevice(&'static str),

    #[error("unknown register '{0}'")]
    UnknownRegister(String),

    #[error("save slot {0} does not exist")]
    InvalidSlot(usize),

    #[error("save slot {0} is empty")]
    EmptySlot(usize),

    #[error("no conditional break #{0}")]
    NoSuchBreak(usize),

    #[error("no watch #{0}")]
    NoSuchWatch(usize),
}

/// Why a stepping operation returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// The requested execution finished normally.
    Completed,
    Breakpoint(u16),
    Trap(TrapHit),
    ConditionalBreak { index: usize, condition: String },
    CycleLimit,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::Completed => write!(f, "done"),
            StopReason::Breakpoint(addr) => write!(f, "breakpoint at ${:04X}", addr),
            StopReason::Trap(hit) => {
                let kind = match hit.kind {
                    TrapKind::Read => "read",
                    TrapKind::Write => "write",
                };
                write!(f, "{} trap at ${:04X}", kind, hit.address)
            }
            StopReason::ConditionalBreak { index, condition } => {
                write!(f, "break #{}: {}", index, condition)
            }
            StopReason::CycleLimit => write!(f, "cycle limit reached"),
        }
    }
}

struct ConditionalBreak {
    source: String,
    expression: Expression,
}

struct Watch {
    source: String,
    expression: Expression,
    value: Option<i32>,
    changed: bool,
}

/// A watch expression as evaluated at the last stop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchValue {
    pub expression: String,
    /// `None` if the expression could not be evaluated.
    pub value: Option<i32>,
    /// The value differs from the one at the previous stop.
    pub changed: bool,
}

impl fmt::Display for WatchValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.value {
            Some(value) => write!(f, "{} = ${:02X} #{}", self.expression, value, value)?,
            None => write!(f, "{} = ?", self.expression)?,
        }
        if self.changed {
            write!(f, " (changed)")?;
        }
        Ok(())
    }
}

/// A debugging session over one machine.
pub struct Debugger {
    system: System,
    rewind: RewindManager,
    symbols: SymbolTable,
    accessors: AccessorTable,
    functions: FunctionTable,
    breaks: Vec<ConditionalBreak>,
    watches: Vec<Watch>,
    slots: Vec<Option<Vec<u8>>>,
    base: Base,
    max_run_cycles: u64,
    parse_error: String,
    active: bool,
}

impl Debugger {
    /// Start a session, installing the standard labels and builtin functions.
    pub fn new(system: System, config: DebuggerConfig) -> Result<Self, DebuggerError> {
        let mut dbg = Self {
            system,
            rewind: RewindManager::new(config.rewind),
            symbols: SymbolTable::with_vcs_equates(),
            accessors: AccessorTable::new(),
            functions: FunctionTable::new(),
            breaks: Vec::new(),
            watches: Vec::new(),
            slots: vec![None; SAVE_SLOTS],
            base: config.default_base,
            max_run_cycles: config.max_run_cycles,
            parse_error: NO_ERROR.to_string(),
            active: false,
        };

        for builtin in BUILTIN_FUNCTIONS {
            let expr = dbg.parse(builtin.definition)?;
            dbg.functions
                .add(builtin.name, builtin.definition, expr, true)?;
        }
        Ok(dbg)
    }

    pub fn system(&self) -> &System {
        &self.system
    }

    pub fn system_mut(&mut self) -> &mut System {
        &mut self.system
    }

    pub fn into_system(self) -> System {
        self.system
    }

    // ========== Session ==========

    /// Enter debug mode. Returns false if already active.
    pub fn enter(&mut self, message: &str) -> bool {
        if self.active {
            return false;
        }
        self.active = true;
        info!("debugger entered: {}", message);
        true
    }

    pub fn leave(&mut self) {
        if self.active {
            self.active = false;
            info!("debugger left");
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    // ========== Rewind and save slots ==========

    /// Snapshot the machine under `message`.
    pub fn save_old_state(&mut self, message: &str) -> Result<(), RewindError> {
        self.rewind.add_state(&self.system, message)
    }

    /// Like [`Debugger::save_old_state`], but a failed capture only logs.
    fn checkpoint(&mut self, message: &str) {
        let pending = self.pending_checkpoint(message);
        self.commit_checkpoint(pending);
    }

    /// Capture a rewind point to push only if the coming action changes the
    /// machine. A failed capture only logs.
    fn pending_checkpoint(&self, message: &str) -> Option<Snapshot> {
        match self.rewind.capture(&self.system, message) {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!("no rewind point for '{}': {}", message, err);
                None
            }
        }
    }

    fn commit_checkpoint(&mut self, snapshot: Option<Snapshot>) {
        if let Some(snapshot) = snapshot {
            self.rewind.push(snapshot);
        }
    }

    /// Undo the most recent state-changing action, returning its message.
    pub fn rewind_state(&mut self) -> Result<String, DebuggerError> {
        Ok(self.rewind.rewind_state(&mut self.system)?)
    }

    pub fn rewind(&self) -> &RewindManager {
        &self.rewind
    }

    pub fn clear_rewind(&mut self) {
        self.rewind.clear();
    }

    pub fn save_state(&mut self, slot: usize) -> Result<(), DebuggerError> {
        let entry = self.slots.get_mut(slot).ok_or(DebuggerError::InvalidSlot(slot))?;
        *entry = Some(state::capture(&self.system)?);
        info!("state saved to slot {}", slot);
        Ok(())
    }

    pub fn load_state(&mut self, slot: usize) -> Result<(), DebuggerError> {
        let blob = self
            .slots
            .get(slot)
            .ok_or(DebuggerError::InvalidSlot(slot))?
            .clone()
            .ok_or(DebuggerError::EmptySlot(slot))?;
        let pending = self.pending_checkpoint("load state");
        state::restore(&mut self.system, &blob)?;
        self.commit_checkpoint(pending);
        info!("state loaded from slot {}", slot);
        Ok(())
    }

    // ========== Execution ==========

    /// Execute one instruction.
    pub fn step(&mut self) -> Result<StopReason, DebuggerError> {
        self.execute("step", |dbg| {
            dbg.system.step()?;
            Ok(match dbg.system.bus_mut().take_trap_hit() {
                Some(hit) => StopReason::Trap(hit),
                None => StopReason::Completed,
            })
        })
    }

    /// Execute one instruction, running a subroutine call to its return.
    pub fn trace(&mut self) -> Result<StopReason, DebuggerError> {
        let pc = self.system.cpu().pc();
        if self.system.bus().peek(pc) != JSR {
            return self.step();
        }
        let return_pc = pc.wrapping_add(3);
        self.execute("trace", move |dbg| {
            dbg.run_until(move |sys| sys.cpu().pc() == return_pc)
        })
    }

    /// Run until something stops execution.
    pub fn run(&mut self) -> Result<StopReason, DebuggerError> {
        self.execute("run", |dbg| dbg.run_until(|_| false))
    }

    /// Run until the beam has moved down `lines` scanlines.
    pub fn next_scanline(&mut self, lines: u32) -> Result<StopReason, DebuggerError> {
        let mut last = self
            .system
            .tia()
            .ok_or(DebuggerError::MissingDevice("TIA"))?
            .scanlines();
        if lines == 0 {
            return Ok(StopReason::Completed);
        }
        let message = if lines == 1 { "scanline" } else { "scanlines" };

        let mut remaining = lines;
        self.execute(message, move |dbg| {
            dbg.run_until(move |sys| {
                let now = sys.tia().map_or(last, |tia| tia.scanlines());
                if now != last {
                    last = now;
                    remaining -= 1;
                }
                remaining == 0
            })
        })
    }

    /// Run until `frames` new frames have started.
    pub fn next_frame(&mut self, frames: u32) -> Result<StopReason, DebuggerError> {
        let start = self
            .system
            .tia()
            .ok_or(DebuggerError::MissingDevice("TIA"))?
            .frame_count();
        if frames == 0 {
            return Ok(StopReason::Completed);
        }
        let message = if frames == 1 { "frame" } else { "frames" };

        self.execute(message, move |dbg| {
            dbg.run_until(move |sys| {
                sys.tia()
                    .is_some_and(|tia| tia.frame_count().wrapping_sub(start) >= frames)
            })
        })
    }

    /// Run a stepping operation under a rewind point, then refresh watches.
    ///
    /// The rewind point is kept only if at least one instruction executed: a
    /// failing opcode leaves the CPU untouched.
    fn execute<F>(&mut self, message: &str, op: F) -> Result<StopReason, DebuggerError>
    where
        F: FnOnce(&mut Self) -> Result<StopReason, DebuggerError>,
    {
        let pending = self.pending_checkpoint(message);
        let start = self.system.cpu().cycles();
        let result = op(self);
        if result.is_err() {
            // The failed fetch may still have tripped a read trap
            self.system.bus_mut().take_trap_hit();
        }
        if result.is_ok() || self.system.cpu().cycles() != start {
            self.commit_checkpoint(pending);
        }
        self.update_watches();
        result
    }

    fn run_until<F>(&mut self, mut done: F) -> Result<StopReason, DebuggerError>
    where
        F: FnMut(&System) -> bool,
    {
        let start = self.system.cpu().cycles();
        let mut resuming = true;
        loop {
            let pc = self.system.cpu().pc();
            if !resuming && self.system.bus().breakpoint(pc) {
                info!("breakpoint at 0x{:04X}", pc);
                return Ok(StopReason::Breakpoint(pc));
            }
            resuming = false;

            self.system.step()?;

            if let Some(hit) = self.system.bus_mut().take_trap_hit() {
                let reason = StopReason::Trap(hit);
                info!("{}", reason);
                return Ok(reason);
            }
            if let Some(reason) = self.check_breaks() {
                return Ok(reason);
            }
            if done(&self.system) {
                return Ok(StopReason::Completed);
            }
            if self.system.cpu().cycles().wrapping_sub(start) >= self.max_run_cycles {
                debug!("cycle limit reached after {} cycles", self.max_run_cycles);
                return Ok(StopReason::CycleLimit);
            }
        }
    }

    fn check_breaks(&mut self) -> Option<StopReason> {
        for (index, cond) in self.breaks.iter().enumerate() {
            let mut ctx = EvalContext::new(&mut self.system, &self.functions);
            match cond.expression.evaluate(&mut ctx) {
                Ok(0) => {}
                Ok(_) => {
                    info!("conditional break #{}: {}", index, cond.source);
                    return Some(StopReason::ConditionalBreak {
                        index,
                        condition: cond.source.clone(),
                    });
                }
                Err(err) => debug!("conditional break '{}' not evaluated: {}", cond.source, err),
            }
        }
        None
    }

    // ========== Machine state ==========

    pub fn reset(&mut self) {
        self.checkpoint("reset");
        self.system.reset();
    }

    /// Byte at `addr`, read with bank switching locked.
    pub fn peek(&mut self, addr: u16) -> u8 {
        Inspect::peek(&mut self.system, addr)
    }

    /// Little-endian word at `addr`, read with bank switching locked.
    pub fn dpeek(&mut self, addr: u16) -> u16 {
        self.system.bus_mut().lock_guard().dpeek(addr)
    }

    pub fn poke(&mut self, addr: u16, value: u8) {
        self.checkpoint("poke");
        self.system.bus_mut().poke(addr, value);
    }

    /// Store `values` at consecutive addresses from `addr`.
    pub fn set_ram(&mut self, addr: u16, values: &[u8]) {
        self.checkpoint("set RAM");
        let bus = self.system.bus_mut();
        for (i, &value) in values.iter().enumerate() {
            bus.poke(addr.wrapping_add(i as u16), value);
        }
    }

    /// Change a ROM byte in the visible bank. Returns false without a cartridge.
    pub fn patch_rom(&mut self, addr: u16, value: u8) -> bool {
        if self.system.cartridge().is_none() {
            return false;
        }
        let pending = self.pending_checkpoint("patch ROM");
        let patched = self
            .system
            .cartridge_mut()
            .is_some_and(|cart| cart.patch(addr, value));
        if patched {
            self.commit_checkpoint(pending);
        }
        patched
    }

    pub fn bank(&self) -> Option<u8> {
        self.system.cartridge().map(|cart| cart.bank())
    }

    /// Select a cartridge bank. Refused while bank switching is locked.
    pub fn set_bank(&mut self, bank: u8) -> Result<bool, DebuggerError> {
        if self.system.cartridge().is_none() {
            return Err(DebuggerError::MissingDevice("cartridge"));
        }
        let pending = self.pending_checkpoint("bank");
        let switched = self
            .system
            .cartridge_mut()
            .is_some_and(|cart| cart.set_bank(bank));
        if switched {
            self.commit_checkpoint(pending);
        }
        Ok(switched)
    }

    /// Set `a`, `x`, `y`, `sp`, `ps` (status) or `pc`.
    pub fn set_register(&mut self, name: &str, value: u16) -> Result<(), DebuggerError> {
        let name = name.to_ascii_lowercase();
        if !matches!(name.as_str(), "a" | "x" | "y" | "sp" | "ps" | "pc") {
            return Err(DebuggerError::UnknownRegister(name));
        }
        self.checkpoint("set register");
        let cpu = self.system.cpu_mut();
        let byte = value as u8;
        match name.as_str() {
            "a" => cpu.set_a(byte),
            "x" => cpu.set_x(byte),
            "y" => cpu.set_y(byte),
            "sp" => cpu.set_sp(byte),
            "ps" => cpu.set_status(byte),
            _ => cpu.set_pc(value),
        }
        Ok(())
    }

    // ========== Breakpoints, traps and flags ==========

    pub fn toggle_breakpoint(&mut self, addr: u16) -> bool {
        self.system.bus_mut().toggle_breakpoint(addr)
    }

    pub fn breakpoint(&self, addr: u16) -> bool {
        self.system.bus().breakpoint(addr)
    }

    pub fn clear_all_breakpoints(&mut self) {
        self.system.bus_mut().clear_all_breakpoints();
    }

    pub fn toggle_read_trap(&mut self, addr: u16) -> bool {
        self.system.bus_mut().toggle_read_trap(addr)
    }

    pub fn toggle_write_trap(&mut self, addr: u16) -> bool {
        self.system.bus_mut().toggle_write_trap(addr)
    }

    pub fn toggle_trap(&mut self, addr: u16) {
        self.system.bus_mut().toggle_trap(addr);
    }

    pub fn clear_all_traps(&mut self) {
        self.system.bus_mut().clear_all_traps();
    }

    pub fn access_flags(&self, addr: u16) -> AccessFlags {
        self.system.bus().access_flags(addr)
    }

    pub fn set_access_flags(&mut self, addr: u16, flags: AccessFlags) {
        self.system.bus_mut().set_access_flags(addr, flags);
    }

    pub fn lock_bankswitch_state(&mut self) {
        self.system.bus_mut().lock_bankswitch_state();
    }

    pub fn unlock_bankswitch_state(&mut self) {
        self.system.bus_mut().unlock_bankswitch_state();
    }

    /// Stop `run` whenever `condition` evaluates non-zero. Returns its index.
    pub fn add_break_if(&mut self, condition: &str) -> Result<usize, DebuggerError> {
        let expression = self.parse(condition)?;
        self.breaks.push(ConditionalBreak {
            source: condition.to_string(),
            expression,
        });
        Ok(self.breaks.len() - 1)
    }

    pub fn remove_break_if(&mut self, index: usize) -> Result<String, DebuggerError> {
        if index >= self.breaks.len() {
            return Err(DebuggerError::NoSuchBreak(index));
        }
        Ok(self.breaks.remove(index).source)
    }

    pub fn break_ifs(&self) -> impl Iterator<Item = &str> {
        self.breaks.iter().map(|b| b.source.as_str())
    }

    pub fn clear_break_ifs(&mut self) {
        self.breaks.clear();
    }

    // ========== Watches ==========

    /// Evaluate `expression` at every stop. Returns its index.
    pub fn add_watch(&mut self, expression: &str) -> Result<usize, DebuggerError> {
        let parsed = self.parse(expression)?;
        let value = self.evaluate_expression(&parsed).ok();
        self.watches.push(Watch {
            source: expression.to_string(),
            expression: parsed,
            value,
            changed: false,
        });
        Ok(self.watches.len() - 1)
    }

    pub fn del_watch(&mut self, index: usize) -> Result<String, DebuggerError> {
        if index >= self.watches.len() {
            return Err(DebuggerError::NoSuchWatch(index));
        }
        Ok(self.watches.remove(index).source)
    }

    pub fn watches(&self) -> impl Iterator<Item = &str> {
        self.watches.iter().map(|w| w.source.as_str())
    }

    pub fn clear_watches(&mut self) {
        self.watches.clear();
    }

    /// Every watch as evaluated when the last stepping operation stopped.
    pub fn watch_values(&self) -> Vec<WatchValue> {
        self.watches
            .iter()
            .map(|w| WatchValue {
                expression: w.source.clone(),
                value: w.value,
                changed: w.changed,
            })
            .collect()
    }

    /// One line per watch, numbered, or an empty string without watches.
    pub fn show_watches(&self) -> String {
        self.watch_values()
            .iter()
            .enumerate()
            .map(|(index, watch)| format!("watch #{}: {}\n", index, watch))
            .collect()
    }

    fn update_watches(&mut self) {
        for watch in &mut self.watches {
            let mut ctx = EvalContext::new(&mut self.system, &self.functions);
            let value = watch.expression.evaluate(&mut ctx).ok();
            watch.changed = value != watch.value;
            watch.value = value;
            if watch.changed {
                debug!("watch '{}' now {:?}", watch.source, value);
            }
        }
    }

    // ========== Expressions ==========

    pub fn base(&self) -> Base {
        self.base
    }

    pub fn set_base(&mut self, base: Base) {
        self.base = base;
    }

    /// Parse `text` against the current labels, functions and base.
    ///
    /// On failure the message is also kept for [`Debugger::parse_error`].
    pub fn parse(&mut self, text: &str) -> Result<Expression, DebuggerError> {
        self.parse_error = NO_ERROR.to_string();
        let ctx = ParseContext {
            symbols: &self.symbols,
            accessors: &self.accessors,
            functions: &self.functions,
            base: self.base,
        };
        let result = expression::parse(text, &ctx);
        result.map_err(|err| {
            self.parse_error = err.to_string();
            err.into()
        })
    }

    /// Message from the last failed parse, or `"(no error)"`.
    pub fn parse_error(&self) -> &str {
        &self.parse_error
    }

    pub fn evaluate_expression(&mut self, expr: &Expression) -> Result<i32, DebuggerError> {
        let mut ctx = EvalContext::new(&mut self.system, &self.functions);
        Ok(expr.evaluate(&mut ctx)?)
    }

    /// Parse and evaluate `text` once.
    pub fn evaluate(&mut self, text: &str) -> Result<i32, DebuggerError> {
        let expr = self.parse(text)?;
        self.evaluate_expression(&expr)
    }

    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    pub fn add_label(&mut self, name: &str, address: u16) -> Option<u16> {
        self.symbols.add_symbol(name, address)
    }

    pub fn remove_label(&mut self, name: &str) -> bool {
        self.symbols.remove_symbol(name)
    }

    // ========== Functions ==========

    /// Define or redefine a user function.
    pub fn add_function(&mut self, name: &str, definition: &str) -> Result<(), DebuggerError> {
        if self.functions.is_builtin(name) {
            return Err(FunctionError::BuiltinRedefinition(name.to_string()).into());
        }
        let expr = self.parse(definition)?;
        self.functions.add(name, definition, expr, false)?;
        debug!("function {} = {}", name, definition);
        Ok(())
    }

    pub fn del_function(&mut self, name: &str) -> Result<(), DebuggerError> {
        Ok(self.functions.remove(name)?)
    }

    pub fn functions(&self) -> &FunctionTable {
        &self.functions
    }

    /// Source text of function `name`.
    pub fn function_def(&self, name: &str) -> Option<&str> {
        self.functions.definition(name)
    }

    pub fn is_builtin_function(&self, name: &str) -> bool {
        self.functions.is_builtin(name)
    }

    /// `(name, source)` of every user function, for persisting.
    pub fn function_defs(&self) -> Vec<(String, String)> {
        self.functions
            .user_definitions()
            .map(|(name, source)| (name.to_string(), source.to_string()))
            .collect()
    }

    /// Re-define functions saved by [`Debugger::function_defs`].
    ///
    /// Definitions that fail are skipped and returned with their error.
    pub fn load_function_defs<I, N, S>(&mut self, defs: I) -> Vec<(String, DebuggerError)>
    where
        I: IntoIterator<Item = (N, S)>,
        N: AsRef<str>,
        S: AsRef<str>,
    {
        let mut failures = Vec::new();
        for (name, source) in defs {
            let name = name.as_ref();
            if let Err(err) = self.add_function(name, source.as_ref()) {
                warn!("could not load function '{}': {}", name, err);
                failures.push((name.to_string(), err));
            }
        }
        failures
    }

    pub fn builtin_help(&self) -> String {
        builtin_help()
    }

    /// Function and label names starting with `prefix`, ignoring case.
    pub fn completions(&self, prefix: &str) -> Vec<String> {
        let prefix = prefix.to_ascii_lowercase();
        let mut names: Vec<String> = self
            .functions
            .names()
            .map(str::to_string)
            .chain(self.symbols.symbols().map(|s| s.name.clone()))
            .filter(|name| name.to_ascii_lowercase().starts_with(&prefix))
            .collect();
        names.sort_by_key(|name| name.to_ascii_lowercase());
        names.dedup_by(|a, b| a.eq_ignore_ascii_case(b));
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::Cartridge;

    fn debugger(program: &[u8]) -> Debugger {
        let mut rom = vec![0xEA; 4096];
        rom[..program.len()].copy_from_slice(program);
        rom[0xFFC] = 0x00;
        rom[0xFFD] = 0xF0;
        let system = System::new(Cartridge::new(rom, false).unwrap()).unwrap();
        Debugger::new(system, DebuggerConfig::default()).unwrap()
    }

    #[test]
    fn test_builtins_installed() {
        let dbg = debugger(&[]);
        for builtin in BUILTIN_FUNCTIONS {
            assert!(dbg.is_builtin_function(builtin.name));
        }
        assert!(dbg.function_defs().is_empty());
    }

    #[test]
    fn test_step_is_rewindable() {
        let mut dbg = debugger(&[0xA9, 0x42]); // LDA #$42
        dbg.step().unwrap();
        assert_eq!(dbg.system().cpu().a(), 0x42);
        assert_eq!(dbg.rewind_state().unwrap(), "step");
        assert_eq!(dbg.system().cpu().a(), 0);
        assert_eq!(dbg.system().cpu().pc(), 0xF000);
    }

    #[test]
    fn test_parse_error_is_retained() {
        let mut dbg = debugger(&[]);
        assert_eq!(dbg.parse_error(), NO_ERROR);
        assert!(dbg.parse("1 +").is_err());
        assert_eq!(dbg.parse_error(), "unexpected end of expression");
        dbg.parse("1").unwrap();
        assert_eq!(dbg.parse_error(), NO_ERROR);
    }

    #[test]
    fn test_set_register() {
        let mut dbg = debugger(&[]);
        dbg.set_register("X", 0x12).unwrap();
        assert_eq!(dbg.evaluate("x").unwrap(), 0x12);
        assert!(matches!(
            dbg.set_register("q", 1),
            Err(DebuggerError::UnknownRegister(_))
        ));
    }

    #[test]
    fn test_save_slots() {
        let mut dbg = debugger(&[]);
        assert_eq!(dbg.load_state(3), Err(DebuggerError::EmptySlot(3)));
        assert_eq!(dbg.save_state(SAVE_SLOTS), Err(DebuggerError::InvalidSlot(SAVE_SLOTS)));

        dbg.set_ram(0x80, &[1, 2, 3]);
        dbg.save_state(3).unwrap();
        dbg.set_ram(0x80, &[9, 9, 9]);
        dbg.load_state(3).unwrap();
        assert_eq!(dbg.peek(0x81), 2);
        assert_eq!(dbg.rewind_state().unwrap(), "load state");
        assert_eq!(dbg.peek(0x81), 9);
    }

    #[test]
    fn test_trace_steps_over_subroutine() {
        // JSR $F010 ; NOP ... $F010: LDX #$05 ; RTS
        let mut program = vec![0x20, 0x10, 0xF0];
        program.resize(0x10, 0xEA);
        program.extend_from_slice(&[0xA2, 0x05, 0x60]);
        let mut dbg = debugger(&program);

        assert_eq!(dbg.trace().unwrap(), StopReason::Completed);
        assert_eq!(dbg.system().cpu().pc(), 0xF003);
        assert_eq!(dbg.system().cpu().x(), 5);
        assert_eq!(dbg.rewind().len(), 1);
    }

    #[test]
    fn test_completions() {
        let mut dbg = debugger(&[]);
        dbg.add_function("joyCount", "1").unwrap();
        assert_eq!(dbg.completions("_joy0b"), vec!["_joy0button".to_string()]);
        assert_eq!(dbg.completions("JOYC"), vec!["joyCount".to_string()]);
        assert_eq!(
            dbg.completions("swc"),
            vec!["SWCHA".to_string(), "SWCHB".to_string()]
        );
    }

    #[test]
    fn test_unsupported_opcode_surfaces() {
        let mut dbg = debugger(&[0x02]);
        assert_eq!(
            dbg.step(),
            Err(DebuggerError::Execution(ExecutionError::UnimplementedOpcode(0x02)))
        );
        assert_eq!(dbg.system().cpu().pc(), 0xF000);
    }
}
