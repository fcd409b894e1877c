//! # Debugger Expression Language
//!
//! Short textual expressions that are parsed once into a tree and evaluated
//! against the *live* machine every time they are asked for a value:
//!
//! ```text
//! *SWCHA & $40          byte at the SWCHA label, masked
//! a + #10               accumulator plus decimal ten
//! _scan > #200 && !_vblank
//! @$FFFC                little-endian word at the reset vector
//! ```
//!
//! ## Pipeline
//!
//! 1. **Lexing** ([`lexer`]): a hand-rolled four-state scanner turns text into
//!    [`Token`]s. Identifiers are resolved while lexing, in this order: label,
//!    CPU register/flag, cartridge state, TIA state, function, and finally a
//!    number in the current default [`Base`].
//! 2. **Parsing** ([`parser`]): recursive descent over the token list, building
//!    an owned [`Expression`] tree.
//! 3. **Evaluation** ([`ast`]): the tree reads hardware state through an
//!    [`EvalContext`] that carries the machine and the function table.
//!
//! Nothing here touches global state: parsing takes a [`ParseContext`] and
//! evaluation an [`EvalContext`].
//!
//! ## Literals
//!
//! | Prefix | Base        | Example    |
//! |--------|-------------|------------|
//! | `$`    | hexadecimal | `$1A`      |
//! | `#`    | decimal     | `#26`      |
//! | `\`    | binary      | `\11010`   |
//! | none   | default     | `1a` (hex) |

use thiserror::Error;

use crate::devices::{Cartridge, Tia};
use crate::CPU;

pub mod accessors;
pub mod ast;
pub mod functions;
pub mod lexer;
pub mod parser;
pub mod symbol_table;

pub use accessors::{Accessor, AccessorTable};
pub use ast::{BinaryOp, Expression, UnaryOp};
pub use functions::{
    builtin_help, BuiltinFunction, FunctionError, FunctionTable, BUILTIN_FUNCTIONS,
};
pub use lexer::{tokenize, Lexer, Token};
pub use parser::{parse, ParseError, MAX_NESTING};
pub use symbol_table::SymbolTable;

/// Function calls nested deeper than this fail with [`EvalError::RecursionLimit`].
pub const MAX_CALL_DEPTH: usize = 32;

/// Radix used for literals without a prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Base {
    Binary,
    Decimal,
    #[default]
    Hex,
}

impl Base {
    pub fn radix(self) -> u32 {
        match self {
            Base::Binary => 2,
            Base::Decimal => 10,
            Base::Hex => 16,
        }
    }
}

/// Read access to the hardware an expression can look at.
pub trait Inspect {
    fn cpu(&self) -> &CPU;

    fn tia(&self) -> Option<&Tia>;

    fn cartridge(&self) -> Option<&Cartridge>;

    /// Byte at `addr`, read without emulated side effects.
    fn peek(&mut self, addr: u16) -> u8;
}

/// Everything the lexer needs to classify an identifier.
#[derive(Clone, Copy)]
pub struct ParseContext<'a> {
    pub symbols: &'a SymbolTable,
    pub accessors: &'a AccessorTable,
    pub functions: &'a FunctionTable,
    pub base: Base,
}

/// Live state an expression is evaluated against.
pub struct EvalContext<'a> {
    machine: &'a mut dyn Inspect,
    functions: &'a FunctionTable,
    depth: usize,
}

impl<'a> EvalContext<'a> {
    pub fn new(machine: &'a mut dyn Inspect, functions: &'a FunctionTable) -> Self {
        Self {
            machine,
            functions,
            depth: 0,
        }
    }

    pub(crate) fn machine(&mut self) -> &mut dyn Inspect {
        &mut *self.machine
    }

    /// Evaluate the body of function `name` one call level deeper.
    pub(crate) fn call(&mut self, name: &str) -> Result<i32, EvalError> {
        let functions = self.functions;
        let body = functions
            .get(name)
            .ok_or_else(|| EvalError::UndefinedFunction(name.to_string()))?;
        if self.depth >= MAX_CALL_DEPTH {
            return Err(EvalError::RecursionLimit(name.to_string()));
        }
        self.depth += 1;
        let result = body.evaluate(self);
        self.depth -= 1;
        result
    }
}

/// Failures while computing an expression's value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvalError {
    #[error("undefined function '{0}'")]
    UndefinedFunction(String),

    #[error("function '{0}' nests too deeply")]
    RecursionLimit(String),

    #[error("'{0}' needs a {1}, which this machine does not have")]
    MissingChip(&'static str, &'static str),
}
