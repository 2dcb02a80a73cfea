//! Typed vector values for the scripting language.
//!
//! Every value is a homogeneous vector of one of six element types. There
//! are no scalars; a "singleton" is a vector of length one. The declaration
//! order of [`ValueType`] is the promotion order used by binary operators,
//! with NULL never promotable and object never mixing with other types.

use std::fmt;

use crate::error::ScriptErrorKind;
use crate::object::{ObjectRef, ObjectValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ValueType {
    Null,
    Logical,
    Integer,
    Float,
    Str,
    Object,
}

impl ValueType {
    pub fn name(self) -> &'static str {
        match self {
            ValueType::Null => "NULL",
            ValueType::Logical => "logical",
            ValueType::Integer => "integer",
            ValueType::Float => "float",
            ValueType::Str => "string",
            ValueType::Object => "object",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A value resulting from script evaluation.
///
/// The `invisible` bit on NULL marks results the console should not
/// auto-print (assignments, bare statements, `if` without `else`); it is
/// cleared by [`Value::copy`] and never installed into a symbol table.
#[derive(Debug, Clone)]
pub enum Value {
    Null { invisible: bool },
    Logical(Vec<bool>),
    Integer(Vec<i64>),
    Float(Vec<f64>),
    Str(Vec<String>),
    Object(ObjectValue),
}

impl Value {
    pub fn null() -> Value {
        Value::Null { invisible: false }
    }

    pub fn null_invisible() -> Value {
        Value::Null { invisible: true }
    }

    pub fn logical(b: bool) -> Value {
        Value::Logical(vec![b])
    }

    pub fn integer(i: i64) -> Value {
        Value::Integer(vec![i])
    }

    pub fn float(f: f64) -> Value {
        Value::Float(vec![f])
    }

    pub fn string(s: impl Into<String>) -> Value {
        Value::Str(vec![s.into()])
    }

    pub fn object(element: ObjectRef) -> Value {
        Value::Object(ObjectValue::with_element(element))
    }

    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Null { .. } => ValueType::Null,
            Value::Logical(_) => ValueType::Logical,
            Value::Integer(_) => ValueType::Integer,
            Value::Float(_) => ValueType::Float,
            Value::Str(_) => ValueType::Str,
            Value::Object(_) => ValueType::Object,
        }
    }

    pub fn count(&self) -> usize {
        match self {
            Value::Null { .. } => 0,
            Value::Logical(v) => v.len(),
            Value::Integer(v) => v.len(),
            Value::Float(v) => v.len(),
            Value::Str(v) => v.len(),
            Value::Object(o) => o.count(),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null { .. })
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Integer(_) | Value::Float(_))
    }

    pub fn invisible(&self) -> bool {
        matches!(self, Value::Null { invisible: true })
    }

    /// Deep copy with the invisible bit cleared.
    pub fn copy(&self) -> Value {
        match self {
            Value::Null { .. } => Value::null(),
            other => other.clone(),
        }
    }

    /// An empty vector of the given element type.
    pub fn empty_of(t: ValueType) -> Value {
        match t {
            ValueType::Null => Value::null(),
            ValueType::Logical => Value::Logical(Vec::new()),
            ValueType::Integer => Value::Integer(Vec::new()),
            ValueType::Float => Value::Float(Vec::new()),
            ValueType::Str => Value::Str(Vec::new()),
            ValueType::Object => Value::Object(ObjectValue::new()),
        }
    }

    /// An empty value of the same element type.
    pub fn new_matching_type(&self) -> Value {
        match self {
            Value::Null { .. } => Value::null(),
            Value::Logical(_) => Value::Logical(Vec::new()),
            Value::Integer(_) => Value::Integer(Vec::new()),
            Value::Float(_) => Value::Float(Vec::new()),
            Value::Str(_) => Value::Str(Vec::new()),
            Value::Object(_) => Value::Object(ObjectValue::new()),
        }
    }

    /// A new one-element value of the same type, holding element `idx`.
    /// For objects the contained element is shared, not copied.
    pub fn get_at(&self, idx: usize) -> Result<Value, ScriptErrorKind> {
        self.check_index(idx)?;
        Ok(match self {
            Value::Null { .. } => Value::null(),
            Value::Logical(v) => Value::logical(v[idx]),
            Value::Integer(v) => Value::integer(v[idx]),
            Value::Float(v) => Value::float(v[idx]),
            Value::Str(v) => Value::string(v[idx].clone()),
            Value::Object(o) => Value::object(o.element(idx).clone()),
        })
    }

    /// Overwrite element `idx` with the first element of `source`,
    /// converting its type where a conversion is defined.
    pub fn set_at(&mut self, idx: usize, source: &Value) -> Result<(), ScriptErrorKind> {
        self.check_index(idx)?;
        match self {
            Value::Null { .. } => {
                return Err(ScriptErrorKind::OperandTypeNotSupported {
                    operator: "[]=",
                    operand: ValueType::Null,
                })
            }
            Value::Logical(v) => v[idx] = source.logical_at(0)?,
            Value::Integer(v) => v[idx] = source.integer_at(0)?,
            Value::Float(v) => v[idx] = source.float_at(0)?,
            Value::Str(v) => v[idx] = source.string_at(0)?,
            Value::Object(o) => o.set_element(idx, source.element_at(0)?)?,
        }
        Ok(())
    }

    /// Append element `idx` of `source`, converting where defined. Used by
    /// subsetting and concatenation.
    pub fn push_from(&mut self, idx: usize, source: &Value) -> Result<(), ScriptErrorKind> {
        match self {
            Value::Null { .. } => {
                return Err(ScriptErrorKind::OperandTypeNotSupported {
                    operator: "c",
                    operand: ValueType::Null,
                })
            }
            Value::Logical(v) => v.push(source.logical_at(idx)?),
            Value::Integer(v) => v.push(source.integer_at(idx)?),
            Value::Float(v) => v.push(source.float_at(idx)?),
            Value::Str(v) => v.push(source.string_at(idx)?),
            Value::Object(o) => o.push_element(source.element_at(idx)?)?,
        }
        Ok(())
    }

    // Type-coerced element reads. Requesting a read the value cannot
    // produce is fatal.

    pub fn logical_at(&self, idx: usize) -> Result<bool, ScriptErrorKind> {
        self.check_index(idx)?;
        match self {
            Value::Logical(v) => Ok(v[idx]),
            Value::Integer(v) => Ok(v[idx] != 0),
            Value::Float(v) => Ok(v[idx] != 0.0),
            Value::Str(v) => Ok(!v[idx].is_empty()),
            _ => Err(self.conversion_error(ValueType::Logical)),
        }
    }

    pub fn integer_at(&self, idx: usize) -> Result<i64, ScriptErrorKind> {
        self.check_index(idx)?;
        match self {
            Value::Logical(v) => Ok(v[idx] as i64),
            Value::Integer(v) => Ok(v[idx]),
            Value::Float(v) => Ok(v[idx] as i64),
            Value::Str(v) => Ok(v[idx].trim().parse().unwrap_or(0)),
            _ => Err(self.conversion_error(ValueType::Integer)),
        }
    }

    pub fn float_at(&self, idx: usize) -> Result<f64, ScriptErrorKind> {
        self.check_index(idx)?;
        match self {
            Value::Logical(v) => Ok(if v[idx] { 1.0 } else { 0.0 }),
            Value::Integer(v) => Ok(v[idx] as f64),
            Value::Float(v) => Ok(v[idx]),
            Value::Str(v) => Ok(v[idx].trim().parse().unwrap_or(0.0)),
            _ => Err(self.conversion_error(ValueType::Float)),
        }
    }

    pub fn string_at(&self, idx: usize) -> Result<String, ScriptErrorKind> {
        self.check_index(idx)?;
        match self {
            Value::Logical(v) => Ok(if v[idx] { "T" } else { "F" }.to_string()),
            Value::Integer(v) => Ok(v[idx].to_string()),
            Value::Float(v) => Ok(v[idx].to_string()),
            Value::Str(v) => Ok(v[idx].clone()),
            _ => Err(self.conversion_error(ValueType::Str)),
        }
    }

    pub fn element_at(&self, idx: usize) -> Result<ObjectRef, ScriptErrorKind> {
        match self {
            Value::Object(o) => {
                self.check_index(idx)?;
                Ok(o.element(idx).clone())
            }
            _ => Err(self.conversion_error(ValueType::Object)),
        }
    }

    pub fn as_object(&self) -> Result<&ObjectValue, ScriptErrorKind> {
        match self {
            Value::Object(o) => Ok(o),
            _ => Err(self.conversion_error(ValueType::Object)),
        }
    }

    fn check_index(&self, idx: usize) -> Result<(), ScriptErrorKind> {
        if idx >= self.count() {
            return Err(ScriptErrorKind::IndexOutOfRange(idx as i64));
        }
        Ok(())
    }

    fn conversion_error(&self, to: ValueType) -> ScriptErrorKind {
        ScriptErrorKind::CannotConvert { from: self.value_type(), to }
    }
}

/// Compare element `i1` of `v1` against element `i2` of `v2` after
/// promoting both to the higher of the two types. NULL operands are the
/// caller's problem; comparison against NULL produces `logical(0)` at the
/// operator level and never reaches here.
pub fn compare_elements(
    v1: &Value,
    i1: usize,
    v2: &Value,
    i2: usize,
) -> Result<std::cmp::Ordering, ScriptErrorKind> {
    let t1 = v1.value_type();
    let t2 = v2.value_type();

    if t1 == ValueType::Object || t2 == ValueType::Object {
        return Err(ScriptErrorKind::ObjectsCannotBeOrdered);
    }

    if t1 == ValueType::Str || t2 == ValueType::Str {
        Ok(v1.string_at(i1)?.cmp(&v2.string_at(i2)?))
    } else if t1 == ValueType::Float || t2 == ValueType::Float {
        let f1 = v1.float_at(i1)?;
        let f2 = v2.float_at(i2)?;
        Ok(f1.partial_cmp(&f2).unwrap_or(std::cmp::Ordering::Equal))
    } else if t1 == ValueType::Integer || t2 == ValueType::Integer {
        Ok(v1.integer_at(i1)?.cmp(&v2.integer_at(i2)?))
    } else {
        Ok(v1.logical_at(i1)?.cmp(&v2.logical_at(i2)?))
    }
}

/// Element identity equality, the only comparison defined for objects.
pub fn elements_identical(v1: &Value, i1: usize, v2: &Value, i2: usize) -> Result<bool, ScriptErrorKind> {
    let e1 = v1.element_at(i1)?;
    let e2 = v2.element_at(i2)?;
    Ok(e1.borrow().identity() == e2.borrow().identity()
        && e1.borrow().element_type() == e2.borrow().element_type())
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null { .. } => write!(f, "NULL"),
            Value::Object(o) => {
                if o.count() == 0 {
                    write!(f, "object(0)")
                } else {
                    write!(f, "<object: {}>", o.element_type_name())
                }
            }
            other => {
                let n = other.count();
                if n == 0 {
                    return write!(f, "{}(0)", other.value_type().name());
                }
                for idx in 0..n {
                    if idx > 0 {
                        write!(f, " ")?;
                    }
                    match other {
                        Value::Str(v) => write!(f, "\"{}\"", v[idx])?,
                        _ => write!(f, "{}", other.string_at(idx).map_err(|_| fmt::Error)?)?,
                    }
                }
                Ok(())
            }
        }
    }
}

/// Elementwise equality used by tests and by symbol-table copy semantics.
/// Objects compare by element identity.
impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        if self.value_type() != other.value_type() || self.count() != other.count() {
            return false;
        }
        match (self, other) {
            (Value::Null { .. }, Value::Null { .. }) => true,
            (Value::Logical(a), Value::Logical(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Object(_), Value::Object(_)) => (0..self.count())
                .all(|i| elements_identical(self, i, other, i).unwrap_or(false)),
            _ => false,
        }
    }
}
