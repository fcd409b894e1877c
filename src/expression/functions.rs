//! Named expressions that other expressions can reference.
//!
//! A function is stored both as its parsed tree and as the source text it was
//! defined from, so definitions can be listed and reloaded later. Builtins are
//! installed once and can be neither redefined nor removed.

use std::collections::BTreeMap;

use thiserror::Error;

use super::Expression;

/// A function every debugger starts with.
#[derive(Debug, Clone, Copy)]
pub struct BuiltinFunction {
    pub name: &'static str,
    pub definition: &'static str,
    pub help: &'static str,
}

/// Joystick and console switch helpers.
///
/// Inputs on the VCS are active low, so most of these invert the tested bit.
pub const BUILTIN_FUNCTIONS: &[BuiltinFunction] = &[
    BuiltinFunction { name: "_joy0left", definition: "!(*SWCHA & $40)", help: "Left joystick moved left" },
    BuiltinFunction { name: "_joy0right", definition: "!(*SWCHA & $80)", help: "Left joystick moved right" },
    BuiltinFunction { name: "_joy0up", definition: "!(*SWCHA & $10)", help: "Left joystick moved up" },
    BuiltinFunction { name: "_joy0down", definition: "!(*SWCHA & $20)", help: "Left joystick moved down" },
    BuiltinFunction { name: "_joy0button", definition: "!(*INPT4 & $80)", help: "Left joystick button pressed" },
    BuiltinFunction { name: "_joy1left", definition: "!(*SWCHA & $04)", help: "Right joystick moved left" },
    BuiltinFunction { name: "_joy1right", definition: "!(*SWCHA & $08)", help: "Right joystick moved right" },
    BuiltinFunction { name: "_joy1up", definition: "!(*SWCHA & $01)", help: "Right joystick moved up" },
    BuiltinFunction { name: "_joy1down", definition: "!(*SWCHA & $02)", help: "Right joystick moved down" },
    BuiltinFunction { name: "_joy1button", definition: "!(*INPT5 & $80)", help: "Right joystick button pressed" },
    BuiltinFunction { name: "_select", definition: "!(*SWCHB & $02)", help: "Game Select pressed" },
    BuiltinFunction { name: "_reset", definition: "!(*SWCHB & $01)", help: "Game Reset pressed" },
    BuiltinFunction { name: "_color", definition: "*SWCHB & $08", help: "Color/BW set to Color" },
    BuiltinFunction { name: "_bw", definition: "!(*SWCHB & $08)", help: "Color/BW set to BW" },
    BuiltinFunction { name: "_diff0b", definition: "!(*SWCHB & $40)", help: "Left diff. set to B (easy)" },
    BuiltinFunction { name: "_diff0a", definition: "*SWCHB & $40", help: "Left diff. set to A (hard)" },
    BuiltinFunction { name: "_diff1b", definition: "!(*SWCHB & $80)", help: "Right diff. set to B (easy)" },
    BuiltinFunction { name: "_diff1a", definition: "*SWCHB & $80", help: "Right diff. set to A (hard)" },
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FunctionError {
    #[error("'{0}' is a builtin function and cannot be redefined")]
    BuiltinRedefinition(String),

    #[error("'{0}' is a builtin function and cannot be removed")]
    BuiltinRemoval(String),

    #[error("no function named '{0}'")]
    NotFound(String),
}

#[derive(Debug, Clone)]
struct FunctionDef {
    expression: Expression,
    source: String,
    builtin: bool,
}

/// Function name to definition, ordered by name.
#[derive(Debug, Clone, Default)]
pub struct FunctionTable {
    entries: BTreeMap<String, FunctionDef>,
}

impl FunctionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Define `name`. A user definition replaces any earlier user definition;
    /// a builtin name can only be installed once.
    pub fn add(
        &mut self,
        name: &str,
        source: &str,
        expression: Expression,
        builtin: bool,
    ) -> Result<(), FunctionError> {
        if self.is_builtin(name) {
            return Err(FunctionError::BuiltinRedefinition(name.to_string()));
        }
        self.entries.insert(
            name.to_string(),
            FunctionDef {
                expression,
                source: source.to_string(),
                builtin,
            },
        );
        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> Result<(), FunctionError> {
        match self.entries.get(name) {
            None => Err(FunctionError::NotFound(name.to_string())),
            Some(def) if def.builtin => Err(FunctionError::BuiltinRemoval(name.to_string())),
            Some(_) => {
                self.entries.remove(name);
                Ok(())
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&Expression> {
        self.entries.get(name).map(|def| &def.expression)
    }

    /// Source text `name` was defined from.
    pub fn definition(&self, name: &str) -> Option<&str> {
        self.entries.get(name).map(|def| def.source.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn is_builtin(&self, name: &str) -> bool {
        self.entries.get(name).is_some_and(|def| def.builtin)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// `(name, source)` for every user-defined function.
    pub fn user_definitions(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .filter(|(_, def)| !def.builtin)
            .map(|(name, def)| (name.as_str(), def.source.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Formatted table of every builtin with its definition and description.
pub fn builtin_help() -> String {
    let name_width = BUILTIN_FUNCTIONS.iter().map(|f| f.name.len()).max().unwrap_or(0);
    let def_width = BUILTIN_FUNCTIONS
        .iter()
        .map(|f| f.definition.len())
        .max()
        .unwrap_or(0);

    let mut out = String::from("Built-in functions:\n");
    for f in BUILTIN_FUNCTIONS {
        out.push_str(&format!(
            "{:<nw$}  {{{:<dw$}}}  {}\n",
            f.name,
            f.definition,
            f.help,
            nw = name_width,
            dw = def_width
        ));
    }
    out
}
