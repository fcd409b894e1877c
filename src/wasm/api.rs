//! WASM API for the debugger.
//!
//! Provides JavaScript-callable interfaces for execution control, breakpoints,
//! rewind and expression evaluation.

use wasm_bindgen::prelude::*;

use crate::{Cartridge, Debugger, DebuggerConfig, System};

/// JavaScript-compatible error wrapper
#[wasm_bindgen]
#[derive(Debug, Clone)]
pub struct JsError {
    message: String,
}

#[wasm_bindgen]
impl JsError {
    #[wasm_bindgen(constructor)]
    pub fn new(message: &str) -> JsError {
        JsError {
            message: message.to_string(),
        }
    }

    #[wasm_bindgen(getter)]
    pub fn message(&self) -> String {
        self.message.clone()
    }
}

fn js_error(err: impl std::fmt::Display) -> JsError {
    JsError::new(&err.to_string())
}

/// Debugger handle for JavaScript
#[wasm_bindgen]
pub struct WasmDebugger {
    debugger: Debugger,
}

#[wasm_bindgen]
impl WasmDebugger {
    /// Load a 2K, 4K, 8K or 16K cartridge image.
    #[wasm_bindgen(constructor)]
    pub fn new(rom: &[u8], superchip: bool) -> Result<WasmDebugger, JsError> {
        let cartridge = Cartridge::new(rom.to_vec(), superchip).map_err(js_error)?;
        let system = System::new(cartridge).map_err(js_error)?;
        let debugger = Debugger::new(system, DebuggerConfig::default()).map_err(js_error)?;
        Ok(WasmDebugger { debugger })
    }

    /// Execute a single instruction, returning why execution stopped
    pub fn step(&mut self) -> Result<String, JsError> {
        self.debugger.step().map(|r| r.to_string()).map_err(js_error)
    }

    /// Step over a subroutine call
    pub fn trace(&mut self) -> Result<String, JsError> {
        self.debugger.trace().map(|r| r.to_string()).map_err(js_error)
    }

    /// Run until a breakpoint, trap, conditional break or the cycle limit
    pub fn run(&mut self) -> Result<String, JsError> {
        self.debugger.run().map(|r| r.to_string()).map_err(js_error)
    }

    pub fn next_frame(&mut self, frames: u32) -> Result<String, JsError> {
        self.debugger
            .next_frame(frames)
            .map(|r| r.to_string())
            .map_err(js_error)
    }

    pub fn next_scanline(&mut self, lines: u32) -> Result<String, JsError> {
        self.debugger
            .next_scanline(lines)
            .map(|r| r.to_string())
            .map_err(js_error)
    }

    /// Undo the last state-changing action, returning its description
    pub fn rewind(&mut self) -> Result<String, JsError> {
        self.debugger.rewind_state().map_err(js_error)
    }

    pub fn reset(&mut self) {
        self.debugger.reset();
    }

    // Expressions

    pub fn evaluate(&mut self, expression: &str) -> Result<i32, JsError> {
        self.debugger.evaluate(expression).map_err(js_error)
    }

    pub fn add_function(&mut self, name: &str, definition: &str) -> Result<(), JsError> {
        self.debugger.add_function(name, definition).map_err(js_error)
    }

    pub fn break_if(&mut self, condition: &str) -> Result<usize, JsError> {
        self.debugger.add_break_if(condition).map_err(js_error)
    }

    pub fn add_watch(&mut self, expression: &str) -> Result<usize, JsError> {
        self.debugger.add_watch(expression).map_err(js_error)
    }

    pub fn del_watch(&mut self, index: usize) -> Result<String, JsError> {
        self.debugger.del_watch(index).map_err(js_error)
    }

    /// Watch values as of the last stop, one per line
    pub fn show_watches(&self) -> String {
        self.debugger.show_watches()
    }

    /// Function and label names starting with `prefix`
    pub fn completions(&self, prefix: &str) -> js_sys::Array {
        self.debugger
            .completions(prefix)
            .into_iter()
            .map(JsValue::from)
            .collect()
    }

    pub fn builtin_help(&self) -> String {
        self.debugger.builtin_help()
    }

    // Breakpoints and traps

    pub fn toggle_breakpoint(&mut self, addr: u16) -> bool {
        self.debugger.toggle_breakpoint(addr)
    }

    pub fn toggle_read_trap(&mut self, addr: u16) -> bool {
        self.debugger.toggle_read_trap(addr)
    }

    pub fn toggle_write_trap(&mut self, addr: u16) -> bool {
        self.debugger.toggle_write_trap(addr)
    }

    pub fn clear_all_breakpoints(&mut self) {
        self.debugger.clear_all_breakpoints();
    }

    pub fn clear_all_traps(&mut self) {
        self.debugger.clear_all_traps();
    }

    // Register getters
    #[wasm_bindgen(getter)]
    pub fn a(&self) -> u8 {
        self.debugger.system().cpu().a()
    }

    #[wasm_bindgen(getter)]
    pub fn x(&self) -> u8 {
        self.debugger.system().cpu().x()
    }

    #[wasm_bindgen(getter)]
    pub fn y(&self) -> u8 {
        self.debugger.system().cpu().y()
    }

    #[wasm_bindgen(getter)]
    pub fn pc(&self) -> u16 {
        self.debugger.system().cpu().pc()
    }

    #[wasm_bindgen(getter)]
    pub fn sp(&self) -> u8 {
        self.debugger.system().cpu().sp()
    }

    #[wasm_bindgen(getter)]
    pub fn status(&self) -> u8 {
        self.debugger.system().cpu().status()
    }

    /// Cycle count (as f64 for JavaScript compatibility)
    #[wasm_bindgen(getter)]
    pub fn cycles(&self) -> f64 {
        self.debugger.system().cpu().cycles() as f64
    }

    // Memory access methods

    /// Read a single byte without side effects
    pub fn read_memory(&mut self, addr: u16) -> u8 {
        self.debugger.peek(addr)
    }

    /// Read a 256-byte page (for efficient display)
    pub fn get_memory_page(&mut self, page: u8) -> Vec<u8> {
        let start = (page as u16) << 8;
        (0..256).map(|i| self.debugger.peek(start + i)).collect()
    }

    /// Access flags recorded for `addr`
    pub fn access_flags(&self, addr: u16) -> u8 {
        self.debugger.access_flags(addr).bits()
    }

    /// Press or release a joystick fire button (0 = left, 1 = right)
    pub fn set_fire_button(&mut self, player: usize, pressed: bool) {
        if let Some(tia) = self.debugger.system_mut().tia_mut() {
            tia.set_fire_button(player, pressed);
        }
    }
}
