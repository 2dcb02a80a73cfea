//! A filesystem path proxy: the script-created, script-owned kind of
//! object element. Unlike kernel entities reached through pool handles,
//! a `Path` owns its state outright and is freed when the last script
//! reference drops it.

use std::cell::RefCell;
use std::rc::Rc;

use crate::error::ScriptErrorKind;
use crate::object::{ObjectElement, ObjectRef};
use crate::signature::{masks, Signature};
use crate::value::Value;

pub struct PathElement {
    base: String,
}

/// Wrap a base path for scripts.
pub fn path_object(base: impl Into<String>) -> ObjectRef {
    Rc::new(RefCell::new(PathElement { base: base.into() }))
}

impl PathElement {
    fn resolve(&self, file: &str) -> std::path::PathBuf {
        std::path::Path::new(&self.base).join(file)
    }

    fn io_error(err: std::io::Error) -> ScriptErrorKind {
        ScriptErrorKind::FileOperation(err.to_string())
    }
}

impl ObjectElement for PathElement {
    fn element_type(&self) -> &'static str {
        "Path"
    }

    fn identity(&self) -> u64 {
        self as *const PathElement as u64
    }

    fn read_only_members(&self) -> &'static [&'static str] {
        &[]
    }

    fn read_write_members(&self) -> &'static [&'static str] {
        &["path"]
    }

    fn get_member(&self, name: &str) -> Result<Value, ScriptErrorKind> {
        match name {
            "path" => Ok(Value::string(self.base.clone())),
            _ => Err(self.unknown_member(name)),
        }
    }

    fn set_member(&mut self, name: &str, value: &Value) -> Result<(), ScriptErrorKind> {
        match name {
            "path" => {
                self.base = value.string_at(0)?;
                Ok(())
            }
            _ => Err(self.unknown_member(name)),
        }
    }

    fn methods(&self) -> &'static [&'static str] {
        &["files", "readFile", "writeFile"]
    }

    fn method_signature(&self, name: &str) -> Option<Signature> {
        match name {
            "files" => Some(Signature::instance_method("files", masks::STRING)),
            "readFile" => Some(
                Signature::instance_method("readFile", masks::STRING)
                    .arg(masks::STRING | masks::SINGLETON),
            ),
            "writeFile" => Some(
                Signature::instance_method("writeFile", masks::NONE)
                    .arg(masks::STRING | masks::SINGLETON)
                    .arg(masks::STRING),
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
            "files" => {
                let entries = std::fs::read_dir(&self.base).map_err(Self::io_error)?;
                let mut names = Vec::new();
                for entry in entries {
                    let entry = entry.map_err(Self::io_error)?;
                    names.push(entry.file_name().to_string_lossy().into_owned());
                }
                names.sort_unstable();
                Ok(Value::Str(names))
            }
            "readFile" => {
                let file = args[0].string_at(0)?;
                let contents =
                    std::fs::read_to_string(self.resolve(&file)).map_err(Self::io_error)?;
                let lines: Vec<String> =
                    contents.lines().map(str::to_string).collect();
                Ok(Value::Str(lines))
            }
            "writeFile" => {
                let file = args[0].string_at(0)?;
                let lines = &args[1];
                let mut contents = String::new();
                for idx in 0..lines.count() {
                    contents.push_str(&lines.string_at(idx)?);
                    contents.push('\n');
                }
                std::fs::write(self.resolve(&file), contents).map_err(Self::io_error)?;
                Ok(Value::null_invisible())
            }
            _ => Err(ScriptErrorKind::UnknownMethod {
                class: "Path".to_string(),
                method: name.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::ObjectValue;

    #[test]
    fn write_then_read_round_trips_lines() {
        let dir = tempfile::tempdir().unwrap();
        let object = ObjectValue::with_element(path_object(dir.path().to_string_lossy()));

        object
            .execute_method(
                "writeFile",
                &[Value::string("out.txt"), Value::Str(vec!["a".into(), "b".into()])],
            )
            .unwrap();
        let lines = object
            .execute_method("readFile", &[Value::string("out.txt")])
            .unwrap();
        assert_eq!(lines, Value::Str(vec!["a".into(), "b".into()]));

        let files = object.execute_method("files", &[]).unwrap();
        assert_eq!(files, Value::Str(vec!["out.txt".into()]));
    }

    #[test]
    fn missing_files_surface_io_errors() {
        let dir = tempfile::tempdir().unwrap();
        let object = ObjectValue::with_element(path_object(dir.path().to_string_lossy()));
        let err = object.execute_method("readFile", &[Value::string("absent.txt")]);
        assert!(err.is_err());
    }

    #[test]
    fn path_member_is_read_write() {
        let object = ObjectValue::with_element(path_object("/tmp"));
        assert_eq!(object.get_member("path").unwrap(), Value::string("/tmp"));
        object.set_member("path", &Value::string("/var")).unwrap();
        assert_eq!(object.get_member("path").unwrap(), Value::string("/var"));
    }

    #[test]
    fn last_reference_owns_the_element() {
        let shared = path_object("/tmp");
        let second = Rc::clone(&shared);
        assert_eq!(Rc::strong_count(&shared), 2);
        drop(second);
        assert_eq!(Rc::strong_count(&shared), 1);
    }
}
