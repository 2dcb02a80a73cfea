//! The protocol between script values and native simulation entities.
//!
//! An object value is a bag of shared element handles. Elements obey
//! sharing semantics: many object values may refer to the same element, and
//! elements never copy themselves. Script-created elements (a filesystem
//! path, say) own their state and die with their last handle; kernel-owned
//! entities (mutations) are reached through lightweight proxy elements, so
//! dropping script references can never free simulator state.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::error::ScriptErrorKind;
use crate::signature::Signature;
use crate::value::Value;

pub type ObjectRef = Rc<RefCell<dyn ObjectElement>>;

/// One native entity as seen by the scripting language.
pub trait ObjectElement {
    /// The class name, e.g. `"Mutation"`.
    fn element_type(&self) -> &'static str;

    /// A stable identity used for `==` on object values: pool index for
    /// proxied kernel entities, allocation address for internal elements.
    fn identity(&self) -> u64;

    fn read_only_members(&self) -> &'static [&'static str];
    fn read_write_members(&self) -> &'static [&'static str];

    fn get_member(&self, name: &str) -> Result<Value, ScriptErrorKind>;
    fn set_member(&mut self, name: &str, value: &Value) -> Result<(), ScriptErrorKind>;

    fn methods(&self) -> &'static [&'static str];
    fn method_signature(&self, name: &str) -> Option<Signature>;

    /// Instance methods run once per element; the dispatcher concatenates
    /// the per-element results.
    fn execute_instance_method(
        &self,
        name: &str,
        args: &[Value],
    ) -> Result<Value, ScriptErrorKind>;

    /// Class methods run once for the whole receiver vector.
    fn execute_class_method(
        &self,
        name: &str,
        targets: &ObjectValue,
        args: &[Value],
    ) -> Result<Value, ScriptErrorKind> {
        let _ = targets;
        let _ = args;
        Err(ScriptErrorKind::UnknownMethod {
            class: self.element_type().to_string(),
            method: name.to_string(),
        })
    }

    fn unknown_member(&self, name: &str) -> ScriptErrorKind {
        ScriptErrorKind::UnknownMember {
            class: self.element_type().to_string(),
            member: name.to_string(),
        }
    }
}

/// A vector of shared object elements, all of one class.
#[derive(Clone, Default)]
pub struct ObjectValue {
    elements: Vec<ObjectRef>,
}

impl ObjectValue {
    pub fn new() -> Self {
        Self { elements: Vec::new() }
    }

    pub fn with_element(element: ObjectRef) -> Self {
        Self { elements: vec![element] }
    }

    pub fn from_elements(elements: Vec<ObjectRef>) -> Result<Self, ScriptErrorKind> {
        let mut value = Self::new();
        for element in elements {
            value.push_element(element)?;
        }
        Ok(value)
    }

    pub fn count(&self) -> usize {
        self.elements.len()
    }

    pub fn element(&self, idx: usize) -> &ObjectRef {
        &self.elements[idx]
    }

    pub fn elements(&self) -> &[ObjectRef] {
        &self.elements
    }

    pub fn element_type_name(&self) -> String {
        match self.elements.first() {
            Some(e) => e.borrow().element_type().to_string(),
            None => "undefined".to_string(),
        }
    }

    fn check_class(&self, element: &ObjectRef) -> Result<(), ScriptErrorKind> {
        if let Some(first) = self.elements.first() {
            let have = first.borrow().element_type();
            let got = element.borrow().element_type();
            if have != got {
                return Err(ScriptErrorKind::MixedObjectElementTypes(
                    have.to_string(),
                    got.to_string(),
                ));
            }
        }
        Ok(())
    }

    pub fn push_element(&mut self, element: ObjectRef) -> Result<(), ScriptErrorKind> {
        self.check_class(&element)?;
        self.elements.push(element);
        Ok(())
    }

    pub fn set_element(&mut self, idx: usize, element: ObjectRef) -> Result<(), ScriptErrorKind> {
        self.check_class(&element)?;
        self.elements[idx] = element;
        Ok(())
    }

    fn first(&self) -> Result<&ObjectRef, ScriptErrorKind> {
        self.elements.first().ok_or(ScriptErrorKind::UnknownMember {
            class: "undefined".to_string(),
            member: "(no elements)".to_string(),
        })
    }

    /// Member reads produce exactly one value per element; the per-element
    /// singletons are concatenated in element order.
    pub fn get_member(&self, name: &str) -> Result<Value, ScriptErrorKind> {
        let first = self.first()?;
        let mut result = first.borrow().get_member(name)?;
        for element in &self.elements[1..] {
            let piece = element.borrow().get_member(name)?;
            result.push_from(0, &piece)?;
        }
        Ok(result)
    }

    /// Member writes broadcast a singleton rvalue, or map one rvalue
    /// element per receiver element.
    pub fn set_member(&self, name: &str, value: &Value) -> Result<(), ScriptErrorKind> {
        let n = self.elements.len();
        if value.count() == 1 {
            for element in &self.elements {
                element.borrow_mut().set_member(name, value)?;
            }
        } else if value.count() == n {
            for (idx, element) in self.elements.iter().enumerate() {
                let piece = value.get_at(idx)?;
                element.borrow_mut().set_member(name, &piece)?;
            }
        } else {
            return Err(ScriptErrorKind::AssignmentSizeMismatch);
        }
        Ok(())
    }

    pub fn method_signature(&self, name: &str) -> Result<Signature, ScriptErrorKind> {
        let first = self.first()?;
        let sig = first.borrow().method_signature(name);
        sig.ok_or_else(|| ScriptErrorKind::UnknownMethod {
            class: self.element_type_name(),
            method: name.to_string(),
        })
    }

    /// Dispatch a method call. Arguments are assumed already checked
    /// against the signature by the caller; the return is validated here.
    pub fn execute_method(&self, name: &str, args: &[Value]) -> Result<Value, ScriptErrorKind> {
        let signature = self.method_signature(name)?;
        signature.check_arguments(args)?;

        let result = if signature.is_class_method {
            self.first()?.borrow().execute_class_method(name, self, args)?
        } else {
            // instance method: once per element, results concatenated
            let mut result: Option<Value> = None;
            for element in &self.elements {
                let piece = element.borrow().execute_instance_method(name, args)?;
                match &mut result {
                    None => result = Some(piece),
                    Some(acc) if acc.is_null() => *acc = piece,
                    Some(acc) => {
                        if !piece.is_null() {
                            for idx in 0..piece.count() {
                                acc.push_from(idx, &piece)?;
                            }
                        }
                    }
                }
            }
            result.unwrap_or_else(Value::null_invisible)
        };

        signature.check_return(&result)?;
        Ok(result)
    }
}

impl fmt::Debug for ObjectValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectValue<{}>[{}]", self.element_type_name(), self.count())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::signature::{masks, Signature};

    /// A minimal element used by unit tests across the crate.
    pub struct Counter {
        pub label: &'static str,
        pub count: i64,
    }

    impl ObjectElement for Counter {
        fn element_type(&self) -> &'static str {
            "Counter"
        }

        fn identity(&self) -> u64 {
            self as *const Counter as u64
        }

        fn read_only_members(&self) -> &'static [&'static str] {
            &["label"]
        }

        fn read_write_members(&self) -> &'static [&'static str] {
            &["count"]
        }

        fn get_member(&self, name: &str) -> Result<Value, ScriptErrorKind> {
            match name {
                "label" => Ok(Value::string(self.label)),
                "count" => Ok(Value::integer(self.count)),
                _ => Err(self.unknown_member(name)),
            }
        }

        fn set_member(&mut self, name: &str, value: &Value) -> Result<(), ScriptErrorKind> {
            match name {
                "count" => {
                    self.count = value.integer_at(0)?;
                    Ok(())
                }
                "label" => Err(ScriptErrorKind::ReadOnlyMember {
                    class: "Counter".to_string(),
                    member: name.to_string(),
                }),
                _ => Err(self.unknown_member(name)),
            }
        }

        fn methods(&self) -> &'static [&'static str] {
            &["increment"]
        }

        fn method_signature(&self, name: &str) -> Option<Signature> {
            match name {
                "increment" => Some(
                    Signature::instance_method("increment", masks::INT)
                        .arg(masks::INT | masks::SINGLETON | masks::OPTIONAL),
                ),
                _ => None,
            }
        }

        fn execute_instance_method(
            &self,
            name: &str,
            args: &[Value],
        ) -> Result<Value, ScriptErrorKind> {
            match name {
                "increment" => {
                    let by = match args.first() {
                        Some(v) if !v.is_null() => v.integer_at(0)?,
                        _ => 1,
                    };
                    Ok(Value::integer(self.count + by))
                }
                _ => Err(ScriptErrorKind::UnknownMethod {
                    class: "Counter".to_string(),
                    method: name.to_string(),
                }),
            }
        }
    }

    pub fn counter(label: &'static str, count: i64) -> ObjectRef {
        Rc::new(RefCell::new(Counter { label, count }))
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::counter;
    use super::*;

    #[test]
    fn member_reads_concatenate_one_value_per_element() {
        let obj = ObjectValue::from_elements(vec![counter("a", 1), counter("b", 2)]).unwrap();
        let counts = obj.get_member("count").unwrap();
        assert_eq!(counts, Value::Integer(vec![1, 2]));
        let labels = obj.get_member("label").unwrap();
        assert_eq!(labels, Value::Str(vec!["a".into(), "b".into()]));
    }

    #[test]
    fn member_writes_broadcast_or_map_one_to_one() {
        let obj = ObjectValue::from_elements(vec![counter("a", 0), counter("b", 0)]).unwrap();
        obj.set_member("count", &Value::integer(9)).unwrap();
        assert_eq!(obj.get_member("count").unwrap(), Value::Integer(vec![9, 9]));

        obj.set_member("count", &Value::Integer(vec![1, 2])).unwrap();
        assert_eq!(obj.get_member("count").unwrap(), Value::Integer(vec![1, 2]));

        let err = obj.set_member("count", &Value::Integer(vec![1, 2, 3]));
        assert!(err.is_err());
    }

    #[test]
    fn read_only_members_reject_writes() {
        let obj = ObjectValue::with_element(counter("a", 0));
        assert!(obj.set_member("label", &Value::string("x")).is_err());
    }

    #[test]
    fn instance_methods_run_per_element() {
        let obj = ObjectValue::from_elements(vec![counter("a", 10), counter("b", 20)]).unwrap();
        let result = obj.execute_method("increment", &[Value::integer(5)]).unwrap();
        assert_eq!(result, Value::Integer(vec![15, 25]));
    }

    #[test]
    fn unknown_methods_are_resolution_errors() {
        let obj = ObjectValue::with_element(counter("a", 0));
        assert!(obj.execute_method("frobnicate", &[]).is_err());
    }

    #[test]
    fn sharing_semantics_alias_the_same_element() {
        let shared = counter("a", 0);
        let obj1 = ObjectValue::with_element(shared.clone());
        let obj2 = ObjectValue::with_element(shared);
        obj1.set_member("count", &Value::integer(3)).unwrap();
        assert_eq!(obj2.get_member("count").unwrap(), Value::integer(3));
    }
}
