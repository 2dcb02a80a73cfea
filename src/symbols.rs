//! The symbol table: a flat searchable list of name/value bindings.
//!
//! Lookups are a linear scan that rejects on length before comparing
//! bytes; tables are small (a script's globals plus the built-in
//! constants), so this beats hashing in practice. Removal compacts by
//! swapping the last entry into the hole, so iteration order is not
//! preserved across removals.

use crate::error::ScriptErrorKind;
use crate::value::Value;

#[derive(Debug)]
pub struct SymbolEntry {
    pub name: String,
    pub value: Value,
    pub constant: bool,
}

#[derive(Debug, Default)]
pub struct SymbolTable {
    entries: Vec<SymbolEntry>,
}

/// The well-known constants installed into every fresh table.
pub const BUILTIN_CONSTANTS: [&str; 7] = ["T", "F", "NULL", "PI", "E", "INF", "NAN"];

impl SymbolTable {
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    /// A table pre-loaded with `T F NULL PI E INF NAN`.
    pub fn with_builtins() -> Self {
        let mut table = Self::new();
        table.install_constant("T", Value::logical(true));
        table.install_constant("F", Value::logical(false));
        table.install_constant("NULL", Value::null());
        table.install_constant("PI", Value::float(std::f64::consts::PI));
        table.install_constant("E", Value::float(std::f64::consts::E));
        table.install_constant("INF", Value::float(f64::INFINITY));
        table.install_constant("NAN", Value::float(f64::NAN));
        table
    }

    fn find(&self, name: &str) -> Option<usize> {
        // length check first; most misses die here without a byte compare
        self.entries
            .iter()
            .position(|e| e.name.len() == name.len() && e.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.find(name).is_some()
    }

    pub fn get(&self, name: &str) -> Result<&Value, ScriptErrorKind> {
        self.find(name)
            .map(|idx| &self.entries[idx].value)
            .ok_or_else(|| ScriptErrorKind::UndefinedIdentifier(name.to_string()))
    }

    /// Never fails; unknown names read as NULL.
    pub fn get_or_null(&self, name: &str) -> Value {
        self.find(name)
            .map(|idx| self.entries[idx].value.clone())
            .unwrap_or_else(Value::null)
    }

    pub fn is_constant(&self, name: &str) -> bool {
        self.find(name).map(|idx| self.entries[idx].constant).unwrap_or(false)
    }

    /// Bind a variable, replacing any existing variable binding. The stored
    /// copy has its invisible flag cleared so visibility never leaks into
    /// the table.
    pub fn set_variable(&mut self, name: &str, value: Value) -> Result<(), ScriptErrorKind> {
        let value = if value.invisible() { value.copy() } else { value };
        match self.find(name) {
            Some(idx) => {
                if self.entries[idx].constant {
                    return Err(ScriptErrorKind::ConstantModified(name.to_string()));
                }
                self.entries[idx].value = value;
            }
            None => self.entries.push(SymbolEntry {
                name: name.to_string(),
                value,
                constant: false,
            }),
        }
        Ok(())
    }

    /// Bind a constant; the name must be unused.
    pub fn set_constant(&mut self, name: &str, value: Value) -> Result<(), ScriptErrorKind> {
        if self.contains(name) {
            return Err(ScriptErrorKind::SymbolRedefined(name.to_string()));
        }
        let value = if value.invisible() { value.copy() } else { value };
        self.entries.push(SymbolEntry {
            name: name.to_string(),
            value,
            constant: true,
        });
        Ok(())
    }

    /// Zero-copy installation of a pre-built constant during table
    /// construction. Reusing a name is a host programming error.
    pub fn install_constant(&mut self, name: &str, value: Value) {
        assert!(
            !self.contains(name),
            "install_constant: symbol {} already present",
            name
        );
        self.entries.push(SymbolEntry {
            name: name.to_string(),
            value,
            constant: true,
        });
    }

    /// Mutable access for in-place subscript assignment; constants reject.
    pub fn get_mut_variable(&mut self, name: &str) -> Result<&mut Value, ScriptErrorKind> {
        match self.find(name) {
            Some(idx) => {
                if self.entries[idx].constant {
                    return Err(ScriptErrorKind::ConstantModified(name.to_string()));
                }
                Ok(&mut self.entries[idx].value)
            }
            None => Err(ScriptErrorKind::UndefinedIdentifier(name.to_string())),
        }
    }

    pub fn remove(&mut self, name: &str) -> Result<(), ScriptErrorKind> {
        let idx = self
            .find(name)
            .ok_or_else(|| ScriptErrorKind::UndefinedIdentifier(name.to_string()))?;
        if self.entries[idx].constant {
            return Err(ScriptErrorKind::ConstantModified(name.to_string()));
        }
        self.entries.swap_remove(idx);
        Ok(())
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.name.as_str()).collect()
    }

    pub fn variable_names(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|e| !e.constant)
            .map(|e| e.name.as_str())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
