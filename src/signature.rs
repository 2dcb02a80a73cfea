//! Declarative call signatures for built-in functions and object methods.
//!
//! A mask is a bitfield over the six value element types plus flag bits.
//! Masks are additive; admitting NULL is expressed by including the NULL
//! type bit. Signatures never change after registration, so the builder
//! asserts its ordering rules instead of returning errors.

use crate::error::ScriptErrorKind;
use crate::value::{Value, ValueType};

pub mod masks {
    pub const NONE: u32 = 0x0000_0000;
    pub const NULL: u32 = 0x0000_0001;
    pub const LOGICAL: u32 = 0x0000_0002;
    pub const INT: u32 = 0x0000_0004;
    pub const FLOAT: u32 = 0x0000_0008;
    pub const STRING: u32 = 0x0000_0010;
    pub const OBJECT: u32 = 0x0000_0020;

    pub const OPTIONAL: u32 = 0x8000_0000;
    pub const SINGLETON: u32 = 0x4000_0000;
    pub const FLAG_STRIP: u32 = 0x3FFF_FFFF;

    pub const NUMERIC: u32 = INT | FLOAT;
    pub const LOGICAL_EQUIV: u32 = LOGICAL | INT | FLOAT;
    pub const ANY_BASE: u32 = NULL | LOGICAL_EQUIV | STRING;
    pub const ANY: u32 = ANY_BASE | OBJECT;
}

fn type_bit(t: ValueType) -> u32 {
    match t {
        ValueType::Null => masks::NULL,
        ValueType::Logical => masks::LOGICAL,
        ValueType::Integer => masks::INT,
        ValueType::Float => masks::FLOAT,
        ValueType::Str => masks::STRING,
        ValueType::Object => masks::OBJECT,
    }
}

#[derive(Debug, Clone)]
pub struct Signature {
    pub name: String,
    pub return_mask: u32,
    pub arg_masks: Vec<u32>,
    pub has_ellipsis: bool,
    pub is_class_method: bool,
    pub is_instance_method: bool,
}

impl Signature {
    pub fn function(name: impl Into<String>, return_mask: u32) -> Self {
        Self {
            name: name.into(),
            return_mask,
            arg_masks: Vec::new(),
            has_ellipsis: false,
            is_class_method: false,
            is_instance_method: false,
        }
    }

    pub fn class_method(name: impl Into<String>, return_mask: u32) -> Self {
        let mut sig = Self::function(name, return_mask);
        sig.is_class_method = true;
        sig
    }

    pub fn instance_method(name: impl Into<String>, return_mask: u32) -> Self {
        let mut sig = Self::function(name, return_mask);
        sig.is_instance_method = true;
        sig
    }

    /// Append one argument mask. Once an optional argument is declared,
    /// every later argument must also be optional; nothing may follow an
    /// ellipsis.
    pub fn arg(mut self, mask: u32) -> Self {
        assert!(
            !self.has_ellipsis,
            "signature {}: no arguments may follow an ellipsis",
            self.name
        );
        if mask & masks::OPTIONAL == 0 {
            let optional_seen = self.arg_masks.iter().any(|m| m & masks::OPTIONAL != 0);
            assert!(
                !optional_seen,
                "signature {}: required argument after an optional argument",
                self.name
            );
        }
        self.arg_masks.push(mask);
        self
    }

    pub fn ellipsis(mut self) -> Self {
        assert!(
            !self.has_ellipsis,
            "signature {}: at most one ellipsis",
            self.name
        );
        self.has_ellipsis = true;
        self
    }

    fn mask_admits(mask: u32, value: &Value) -> bool {
        type_bit(value.value_type()) & mask & masks::FLAG_STRIP != 0
    }

    /// Validate an argument list against this signature. Missing trailing
    /// arguments are legal for optional slots only.
    pub fn check_arguments(&self, args: &[Value]) -> Result<(), ScriptErrorKind> {
        if !self.has_ellipsis && args.len() > self.arg_masks.len() {
            return Err(ScriptErrorKind::TooManyArguments {
                callee: self.name.clone(),
                max: self.arg_masks.len(),
            });
        }

        for (index, &mask) in self.arg_masks.iter().enumerate() {
            let arg = match args.get(index) {
                Some(arg) => arg,
                None => {
                    if mask & masks::OPTIONAL != 0 {
                        continue;
                    }
                    return Err(ScriptErrorKind::MissingArgument {
                        callee: self.name.clone(),
                        index,
                    });
                }
            };

            if !Self::mask_admits(mask, arg) {
                return Err(ScriptErrorKind::InvalidArgumentType {
                    callee: self.name.clone(),
                    index,
                    got: arg.value_type(),
                });
            }
            if mask & masks::SINGLETON != 0 && arg.count() != 1 {
                return Err(ScriptErrorKind::ArgumentNotSingleton {
                    callee: self.name.clone(),
                    index,
                });
            }
        }

        Ok(())
    }

    /// Validate a returned value. A NULL return is always permitted, so
    /// functions can signal exceptional outcomes without every signature
    /// enumerating NULL.
    pub fn check_return(&self, ret: &Value) -> Result<(), ScriptErrorKind> {
        if ret.is_null() {
            return Ok(());
        }
        if !Self::mask_admits(self.return_mask, ret) {
            return Err(ScriptErrorKind::InvalidReturnType {
                callee: self.name.clone(),
                got: ret.value_type(),
            });
        }
        if self.return_mask & masks::SINGLETON != 0 && ret.count() != 1 {
            return Err(ScriptErrorKind::ReturnNotSingleton { callee: self.name.clone() });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masks_admit_additively() {
        let sig = Signature::function("f", masks::ANY).arg(masks::NUMERIC);
        assert!(sig.check_arguments(&[Value::integer(1)]).is_ok());
        assert!(sig.check_arguments(&[Value::float(1.0)]).is_ok());
        assert!(sig.check_arguments(&[Value::string("x")]).is_err());
        assert!(sig.check_arguments(&[Value::null()]).is_err());
    }

    #[test]
    fn null_is_admitted_only_with_the_null_bit() {
        let with_null = Signature::function("f", masks::ANY).arg(masks::NUMERIC | masks::NULL);
        assert!(with_null.check_arguments(&[Value::null()]).is_ok());
    }

    #[test]
    fn singleton_flag_requires_count_one() {
        let sig = Signature::function("f", masks::ANY).arg(masks::INT | masks::SINGLETON);
        assert!(sig.check_arguments(&[Value::integer(3)]).is_ok());
        assert!(sig.check_arguments(&[Value::Integer(vec![1, 2])]).is_err());
    }

    #[test]
    fn missing_arguments_require_the_optional_flag() {
        let sig = Signature::function("f", masks::ANY)
            .arg(masks::INT)
            .arg(masks::STRING | masks::OPTIONAL);
        assert!(sig.check_arguments(&[Value::integer(1)]).is_ok());
        assert!(sig.check_arguments(&[]).is_err());
    }

    #[test]
    fn argument_count_is_bounded_without_ellipsis() {
        let sig = Signature::function("f", masks::ANY).arg(masks::INT);
        assert!(sig
            .check_arguments(&[Value::integer(1), Value::integer(2)])
            .is_err());

        let varargs = Signature::function("g", masks::ANY).arg(masks::INT).ellipsis();
        assert!(varargs
            .check_arguments(&[Value::integer(1), Value::string("x"), Value::logical(true)])
            .is_ok());
    }

    #[test]
    fn return_check_always_permits_null() {
        let sig = Signature::function("f", masks::INT | masks::SINGLETON);
        assert!(sig.check_return(&Value::null()).is_ok());
        assert!(sig.check_return(&Value::integer(1)).is_ok());
        assert!(sig.check_return(&Value::Integer(vec![1, 2])).is_err());
        assert!(sig.check_return(&Value::string("x")).is_err());
    }

    #[test]
    #[should_panic(expected = "required argument after an optional argument")]
    fn builder_rejects_required_after_optional() {
        let _ = Signature::function("f", masks::ANY)
            .arg(masks::INT | masks::OPTIONAL)
            .arg(masks::INT);
    }

    #[test]
    #[should_panic(expected = "no arguments may follow an ellipsis")]
    fn builder_rejects_arguments_after_ellipsis() {
        let _ = Signature::function("f", masks::ANY).ellipsis().arg(masks::INT);
    }
}
