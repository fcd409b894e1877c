//! WebAssembly bindings for the debugger core.
//!
//! This module exposes a JavaScript-callable handle over a [`Debugger`](crate::Debugger)
//! so a browser front end can load a cartridge, step it and query it with
//! expressions.

#[cfg(feature = "wasm")]
pub mod api;

#[cfg(feature = "wasm")]
pub use api::WasmDebugger;
