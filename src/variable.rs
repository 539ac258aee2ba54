//! Variables: named, typed mutable cells scoped to one run.
//!
//! A [`Graph`](crate::Graph) carries [`Variable`] declarations (name plus
//! initial value); at runtime the [`Runner`](crate::Runner) seeds a
//! [`VariableStore`] from them, scoped to exactly one run. Lookups are
//! case-sensitive; writes get-or-create, reads coerce.

use core::fmt;

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

/// A typed variable value.
///
/// Reads coerce between kinds where a lossless-enough conversion exists
/// (int/float interchange, string parsing, bool as 0/1). Reads that cannot
/// coerce return `None` rather than failing the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    /// Boolean.
    Bool(bool),
    /// 64-bit signed integer.
    Int(i64),
    /// 64-bit float.
    Float(f64),
    /// UTF-8 string.
    Str(String),
}

impl Value {
    /// Reads the value as a bool.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::Int(i) => Some(*i != 0),
            Value::Float(_) => None,
            Value::Str(s) => s.parse().ok(),
        }
    }

    /// Reads the value as an integer.
    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Bool(b) => Some(i64::from(*b)),
            Value::Int(i) => Some(*i),
            Value::Float(f) => Some(*f as i64),
            Value::Str(s) => s.parse().ok(),
        }
    }

    /// Reads the value as a float.
    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Bool(_) => None,
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Str(s) => s.parse().ok(),
        }
    }

    /// Reads the value as a string.
    #[must_use]
    pub fn as_str(&self) -> String {
        match self {
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Str(s) => s.clone(),
        }
    }

    /// Returns the kind name for diagnostics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Str(s) => write!(f, "{s}"),
        }
    }
}

/// A serialized variable declaration: the name and its initial value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    /// Lookup key within one graph, case-sensitive.
    pub name: String,
    /// Initial value; also fixes the declared type.
    pub value: Value,
}

impl Variable {
    /// Creates a new variable declaration.
    #[must_use]
    pub fn new(name: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

/// Mutable variable cells for one run.
///
/// Created on first write via get-or-create; variables are never implicitly
/// deleted during a run.
#[derive(Debug, Default)]
pub struct VariableStore {
    cells: HashMap<String, Value>,
}

impl VariableStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store seeded from graph declarations.
    #[must_use]
    pub fn seeded<'a>(declarations: impl IntoIterator<Item = &'a Variable>) -> Self {
        let mut store = Self::new();
        for decl in declarations {
            store.set(&decl.name, decl.value.clone());
        }
        store
    }

    /// Returns the raw value of a variable, if present.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.cells.get(name)
    }

    /// Reads a variable as a bool.
    #[must_use]
    pub fn get_bool(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(Value::as_bool)
    }

    /// Reads a variable as an integer.
    #[must_use]
    pub fn get_int(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(Value::as_int)
    }

    /// Reads a variable as a float.
    #[must_use]
    pub fn get_float(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(Value::as_float)
    }

    /// Writes a variable, creating the cell on first write.
    pub fn set(&mut self, name: &str, value: Value) {
        match self.cells.get_mut(name) {
            Some(cell) => *cell = value,
            None => {
                self.cells.insert(name.to_owned(), value);
            }
        }
    }

    /// Number of cells in the store.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Returns true if no variable has been declared or written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}
