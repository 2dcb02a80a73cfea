//! The built-in function registry.
//!
//! Each entry pairs a declarative [`Signature`] with an implementation.
//! The registry is built once at warm-up and never changes afterwards;
//! concurrent readers on a thread share one instance.

use std::collections::HashMap;
use std::rc::Rc;

use crate::error::ScriptErrorKind;
use crate::interpreter::Interpreter;
use crate::signature::{masks, Signature};
use crate::value::{Value, ValueType};

pub type BuiltinImpl = fn(&mut Interpreter, &[Value]) -> Result<Value, ScriptErrorKind>;

pub struct FunctionDef {
    pub signature: Signature,
    pub body: BuiltinImpl,
}

#[derive(Default)]
pub struct FunctionRegistry {
    map: HashMap<String, FunctionDef>,
}

/// Meta-functions that can reach arbitrary symbols; a script block that
/// calls one of these must be assumed to touch everything.
pub const WILDCARD_FUNCTIONS: [&str; 2] = ["ls", "rm"];

thread_local! {
    static STANDARD: Rc<FunctionRegistry> = Rc::new(FunctionRegistry::standard());
}

/// The shared per-thread standard registry.
pub fn standard_registry() -> Rc<FunctionRegistry> {
    STANDARD.with(Rc::clone)
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, signature: Signature, body: BuiltinImpl) {
        let name = signature.name.clone();
        let previous = self.map.insert(name.clone(), FunctionDef { signature, body });
        assert!(previous.is_none(), "function {} registered twice", name);
    }

    pub fn get(&self, name: &str) -> Option<&FunctionDef> {
        self.map.get(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.map.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn standard() -> Self {
        let mut reg = Self::new();

        // construction
        reg.register(Signature::function("c", masks::ANY).ellipsis(), builtin_c);
        reg.register(
            Signature::function("rep", masks::ANY)
                .arg(masks::ANY)
                .arg(masks::INT | masks::SINGLETON),
            builtin_rep,
        );
        reg.register(
            Signature::function("repEach", masks::ANY)
                .arg(masks::ANY)
                .arg(masks::INT | masks::SINGLETON),
            builtin_rep_each,
        );
        reg.register(
            Signature::function("seq", masks::NUMERIC)
                .arg(masks::NUMERIC | masks::SINGLETON)
                .arg(masks::NUMERIC | masks::SINGLETON)
                .arg(masks::NUMERIC | masks::SINGLETON | masks::OPTIONAL),
            builtin_seq,
        );
        reg.register(
            Signature::function("seqAlong", masks::INT).arg(masks::ANY),
            builtin_seq_along,
        );

        // queries
        reg.register(
            Signature::function("size", masks::INT | masks::SINGLETON).arg(masks::ANY),
            builtin_size,
        );
        reg.register(
            Signature::function("any", masks::LOGICAL | masks::SINGLETON).arg(masks::LOGICAL),
            builtin_any,
        );
        reg.register(
            Signature::function("all", masks::LOGICAL | masks::SINGLETON).arg(masks::LOGICAL),
            builtin_all,
        );

        // math
        reg.register(Signature::function("abs", masks::NUMERIC).arg(masks::NUMERIC), builtin_abs);
        reg.register(
            Signature::function("sum", masks::NUMERIC).arg(masks::LOGICAL_EQUIV),
            builtin_sum,
        );
        reg.register(Signature::function("floor", masks::FLOAT).arg(masks::NUMERIC), builtin_floor);
        reg.register(Signature::function("ceil", masks::FLOAT).arg(masks::NUMERIC), builtin_ceil);
        reg.register(Signature::function("round", masks::FLOAT).arg(masks::NUMERIC), builtin_round);
        reg.register(Signature::function("trunc", masks::FLOAT).arg(masks::NUMERIC), builtin_trunc);
        reg.register(Signature::function("sqrt", masks::FLOAT).arg(masks::NUMERIC), builtin_sqrt);
        reg.register(Signature::function("exp", masks::FLOAT).arg(masks::NUMERIC), builtin_exp);
        reg.register(Signature::function("log", masks::FLOAT).arg(masks::NUMERIC), builtin_log);

        // conversion
        reg.register(
            Signature::function("asLogical", masks::LOGICAL)
                .arg(masks::LOGICAL_EQUIV | masks::STRING),
            builtin_as_logical,
        );
        reg.register(
            Signature::function("asInteger", masks::INT).arg(masks::LOGICAL_EQUIV | masks::STRING),
            builtin_as_integer,
        );
        reg.register(
            Signature::function("asFloat", masks::FLOAT).arg(masks::LOGICAL_EQUIV | masks::STRING),
            builtin_as_float,
        );
        reg.register(
            Signature::function("asString", masks::STRING)
                .arg(masks::LOGICAL_EQUIV | masks::STRING),
            builtin_as_string,
        );

        // output
        reg.register(Signature::function("print", masks::NONE).arg(masks::ANY), builtin_print);
        reg.register(
            Signature::function("cat", masks::NONE)
                .arg(masks::ANY)
                .arg(masks::STRING | masks::SINGLETON | masks::OPTIONAL),
            builtin_cat,
        );

        // console / symbol table
        reg.register(Signature::function("ls", masks::NONE), builtin_ls);
        reg.register(
            Signature::function("rm", masks::NONE).arg(masks::STRING | masks::OPTIONAL),
            builtin_rm,
        );

        // filesystem proxies
        reg.register(
            Signature::function("Path", masks::OBJECT | masks::SINGLETON)
                .arg(masks::STRING | masks::SINGLETON | masks::OPTIONAL),
            builtin_path,
        );

        // randomness
        reg.register(
            Signature::function("setSeed", masks::NONE).arg(masks::INT | masks::SINGLETON),
            builtin_set_seed,
        );
        reg.register(
            Signature::function("getSeed", masks::INT | masks::SINGLETON),
            builtin_get_seed,
        );
        reg.register(
            Signature::function("runif", masks::FLOAT).arg(masks::INT | masks::SINGLETON),
            builtin_runif,
        );

        reg
    }
}

fn function_error(callee: &str, message: impl Into<String>) -> ScriptErrorKind {
    ScriptErrorKind::InFunction { callee: callee.to_string(), message: message.into() }
}

// ----- construction -----

fn builtin_c(_interp: &mut Interpreter, args: &[Value]) -> Result<Value, ScriptErrorKind> {
    let mut promoted: Option<ValueType> = None;
    for arg in args {
        let t = arg.value_type();
        if t == ValueType::Null {
            continue;
        }
        promoted = Some(match promoted {
            None => t,
            Some(prev) => {
                if (prev == ValueType::Object) != (t == ValueType::Object) {
                    return Err(ScriptErrorKind::OperandCombinationNotSupported {
                        operator: "c",
                        left: prev,
                        right: t,
                    });
                }
                prev.max(t)
            }
        });
    }

    let Some(result_type) = promoted else {
        return Ok(Value::null());
    };

    let mut result = Value::empty_of(result_type);
    for arg in args {
        if arg.is_null() {
            continue;
        }
        for idx in 0..arg.count() {
            result.push_from(idx, arg)?;
        }
    }
    Ok(result)
}

fn builtin_rep(_interp: &mut Interpreter, args: &[Value]) -> Result<Value, ScriptErrorKind> {
    let x = &args[0];
    let count = args[1].integer_at(0)?;
    if count < 0 {
        return Err(function_error("rep", "count must be non-negative"));
    }
    let mut result = x.new_matching_type();
    for _ in 0..count {
        for idx in 0..x.count() {
            result.push_from(idx, x)?;
        }
    }
    Ok(result)
}

fn builtin_rep_each(_interp: &mut Interpreter, args: &[Value]) -> Result<Value, ScriptErrorKind> {
    let x = &args[0];
    let count = args[1].integer_at(0)?;
    if count < 0 {
        return Err(function_error("repEach", "count must be non-negative"));
    }
    let mut result = x.new_matching_type();
    for idx in 0..x.count() {
        for _ in 0..count {
            result.push_from(idx, x)?;
        }
    }
    Ok(result)
}

fn builtin_seq(_interp: &mut Interpreter, args: &[Value]) -> Result<Value, ScriptErrorKind> {
    let from = &args[0];
    let to = &args[1];
    let by = args.get(2).filter(|v| !v.is_null());

    let all_integer = from.value_type() == ValueType::Integer
        && to.value_type() == ValueType::Integer
        && by.map(|v| v.value_type() == ValueType::Integer).unwrap_or(true);

    if all_integer {
        let from = from.integer_at(0)?;
        let to = to.integer_at(0)?;
        let by = match by {
            Some(v) => v.integer_at(0)?,
            None => if to >= from { 1 } else { -1 },
        };
        if by == 0 || (by > 0) != (to >= from) && from != to {
            return Err(function_error("seq", "by has the wrong sign for the requested sequence"));
        }
        let mut values = Vec::new();
        let mut cur = from;
        while (by > 0 && cur <= to) || (by < 0 && cur >= to) {
            values.push(cur);
            if values.len() > crate::MAX_RANGE_LENGTH {
                return Err(ScriptErrorKind::RangeTooWide);
            }
            cur += by;
        }
        Ok(Value::Integer(values))
    } else {
        let from = from.float_at(0)?;
        let to = to.float_at(0)?;
        let by = match by {
            Some(v) => v.float_at(0)?,
            None => if to >= from { 1.0 } else { -1.0 },
        };
        if by == 0.0 || (by > 0.0) != (to >= from) && from != to {
            return Err(function_error("seq", "by has the wrong sign for the requested sequence"));
        }
        let mut values = Vec::new();
        let mut cur = from;
        while (by > 0.0 && cur <= to) || (by < 0.0 && cur >= to) {
            values.push(cur);
            if values.len() > crate::MAX_RANGE_LENGTH {
                return Err(ScriptErrorKind::RangeTooWide);
            }
            let next = cur + by;
            if next == cur {
                return Err(ScriptErrorKind::RangeUnderflow);
            }
            cur = next;
        }
        Ok(Value::Float(values))
    }
}

fn builtin_seq_along(_interp: &mut Interpreter, args: &[Value]) -> Result<Value, ScriptErrorKind> {
    Ok(Value::Integer((0..args[0].count() as i64).collect()))
}

// ----- queries -----

fn builtin_size(_interp: &mut Interpreter, args: &[Value]) -> Result<Value, ScriptErrorKind> {
    Ok(Value::integer(args[0].count() as i64))
}

fn builtin_any(_interp: &mut Interpreter, args: &[Value]) -> Result<Value, ScriptErrorKind> {
    let x = &args[0];
    for idx in 0..x.count() {
        if x.logical_at(idx)? {
            return Ok(Value::logical(true));
        }
    }
    Ok(Value::logical(false))
}

fn builtin_all(_interp: &mut Interpreter, args: &[Value]) -> Result<Value, ScriptErrorKind> {
    let x = &args[0];
    for idx in 0..x.count() {
        if !x.logical_at(idx)? {
            return Ok(Value::logical(false));
        }
    }
    Ok(Value::logical(true))
}

// ----- math -----

fn builtin_abs(_interp: &mut Interpreter, args: &[Value]) -> Result<Value, ScriptErrorKind> {
    match &args[0] {
        Value::Integer(v) => Ok(Value::Integer(v.iter().map(|x| x.wrapping_abs()).collect())),
        Value::Float(v) => Ok(Value::Float(v.iter().map(|x| x.abs()).collect())),
        other => Err(ScriptErrorKind::OperandTypeNotSupported {
            operator: "abs",
            operand: other.value_type(),
        }),
    }
}

fn builtin_sum(_interp: &mut Interpreter, args: &[Value]) -> Result<Value, ScriptErrorKind> {
    match &args[0] {
        Value::Logical(v) => Ok(Value::integer(v.iter().filter(|&&b| b).count() as i64)),
        Value::Integer(v) => Ok(Value::integer(v.iter().fold(0i64, |a, &x| a.wrapping_add(x)))),
        Value::Float(v) => Ok(Value::float(v.iter().sum())),
        other => Err(ScriptErrorKind::OperandTypeNotSupported {
            operator: "sum",
            operand: other.value_type(),
        }),
    }
}

fn float_map(args: &[Value], f: fn(f64) -> f64) -> Result<Value, ScriptErrorKind> {
    let x = &args[0];
    let mut values = Vec::with_capacity(x.count());
    for idx in 0..x.count() {
        values.push(f(x.float_at(idx)?));
    }
    Ok(Value::Float(values))
}

fn builtin_floor(_i: &mut Interpreter, args: &[Value]) -> Result<Value, ScriptErrorKind> {
    float_map(args, f64::floor)
}

fn builtin_ceil(_i: &mut Interpreter, args: &[Value]) -> Result<Value, ScriptErrorKind> {
    float_map(args, f64::ceil)
}

fn builtin_round(_i: &mut Interpreter, args: &[Value]) -> Result<Value, ScriptErrorKind> {
    float_map(args, f64::round)
}

fn builtin_trunc(_i: &mut Interpreter, args: &[Value]) -> Result<Value, ScriptErrorKind> {
    float_map(args, f64::trunc)
}

fn builtin_sqrt(_i: &mut Interpreter, args: &[Value]) -> Result<Value, ScriptErrorKind> {
    float_map(args, f64::sqrt)
}

fn builtin_exp(_i: &mut Interpreter, args: &[Value]) -> Result<Value, ScriptErrorKind> {
    float_map(args, f64::exp)
}

fn builtin_log(_i: &mut Interpreter, args: &[Value]) -> Result<Value, ScriptErrorKind> {
    float_map(args, f64::ln)
}

// ----- conversion -----

fn builtin_as_logical(_i: &mut Interpreter, args: &[Value]) -> Result<Value, ScriptErrorKind> {
    let x = &args[0];
    let mut values = Vec::with_capacity(x.count());
    for idx in 0..x.count() {
        values.push(x.logical_at(idx)?);
    }
    Ok(Value::Logical(values))
}

fn builtin_as_integer(_i: &mut Interpreter, args: &[Value]) -> Result<Value, ScriptErrorKind> {
    let x = &args[0];
    let mut values = Vec::with_capacity(x.count());
    for idx in 0..x.count() {
        values.push(x.integer_at(idx)?);
    }
    Ok(Value::Integer(values))
}

fn builtin_as_float(_i: &mut Interpreter, args: &[Value]) -> Result<Value, ScriptErrorKind> {
    let x = &args[0];
    let mut values = Vec::with_capacity(x.count());
    for idx in 0..x.count() {
        values.push(x.float_at(idx)?);
    }
    Ok(Value::Float(values))
}

fn builtin_as_string(_i: &mut Interpreter, args: &[Value]) -> Result<Value, ScriptErrorKind> {
    let x = &args[0];
    let mut values = Vec::with_capacity(x.count());
    for idx in 0..x.count() {
        values.push(x.string_at(idx)?);
    }
    Ok(Value::Str(values))
}

// ----- output -----

fn builtin_print(interp: &mut Interpreter, args: &[Value]) -> Result<Value, ScriptErrorKind> {
    interp.output.push_str(&args[0].to_string());
    interp.output.push('\n');
    Ok(Value::null_invisible())
}

fn builtin_cat(interp: &mut Interpreter, args: &[Value]) -> Result<Value, ScriptErrorKind> {
    let x = &args[0];
    let sep = match args.get(1).filter(|v| !v.is_null()) {
        Some(v) => v.string_at(0)?,
        None => " ".to_string(),
    };
    for idx in 0..x.count() {
        if idx > 0 {
            interp.output.push_str(&sep);
        }
        interp.output.push_str(&x.string_at(idx)?);
    }
    Ok(Value::null_invisible())
}

// ----- console / symbol table -----

fn builtin_ls(interp: &mut Interpreter, _args: &[Value]) -> Result<Value, ScriptErrorKind> {
    let mut names: Vec<String> =
        interp.symbols.variable_names().iter().map(|s| s.to_string()).collect();
    names.sort_unstable();
    for name in names {
        interp.output.push_str(&name);
        interp.output.push('\n');
    }
    Ok(Value::null_invisible())
}

fn builtin_rm(interp: &mut Interpreter, args: &[Value]) -> Result<Value, ScriptErrorKind> {
    let names: Vec<String> = match args.first().filter(|v| !v.is_null()) {
        Some(v) => {
            let mut names = Vec::with_capacity(v.count());
            for idx in 0..v.count() {
                names.push(v.string_at(idx)?);
            }
            names
        }
        None => interp.symbols.variable_names().iter().map(|s| s.to_string()).collect(),
    };
    for name in names {
        interp.symbols.remove(&name)?;
    }
    Ok(Value::null_invisible())
}

// ----- filesystem proxies -----

fn builtin_path(_interp: &mut Interpreter, args: &[Value]) -> Result<Value, ScriptErrorKind> {
    let base = match args.first().filter(|v| !v.is_null()) {
        Some(v) => v.string_at(0)?,
        None => ".".to_string(),
    };
    Ok(Value::object(crate::paths::path_object(base)))
}

// ----- randomness -----

fn builtin_set_seed(interp: &mut Interpreter, args: &[Value]) -> Result<Value, ScriptErrorKind> {
    interp.rng.reseed(args[0].integer_at(0)? as u64);
    Ok(Value::null_invisible())
}

fn builtin_get_seed(interp: &mut Interpreter, _args: &[Value]) -> Result<Value, ScriptErrorKind> {
    Ok(Value::integer(interp.rng.seed() as i64))
}

fn builtin_runif(interp: &mut Interpreter, args: &[Value]) -> Result<Value, ScriptErrorKind> {
    let n = args[0].integer_at(0)?;
    if n < 0 {
        return Err(function_error("runif", "n must be non-negative"));
    }
    Ok(Value::Float((0..n).map(|_| interp.rng.uniform()).collect()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::Interpreter;

    fn scratch() -> Interpreter {
        Interpreter::new()
    }

    #[test]
    fn standard_registry_resolves_every_name() {
        let reg = FunctionRegistry::standard();
        for name in [
            "c", "rep", "repEach", "seq", "seqAlong", "size", "any", "all", "abs", "sum",
            "floor", "ceil", "round", "trunc", "sqrt", "exp", "log", "asLogical", "asInteger",
            "asFloat", "asString", "print", "cat", "ls", "rm", "Path", "setSeed", "getSeed",
            "runif",
        ] {
            assert!(reg.get(name).is_some(), "missing builtin {}", name);
        }
        assert!(reg.get("frobnicate").is_none());
    }

    #[test]
    fn wildcard_functions_are_registered() {
        let reg = FunctionRegistry::standard();
        for name in WILDCARD_FUNCTIONS {
            assert!(reg.get(name).is_some());
        }
    }

    #[test]
    fn c_promotes_to_the_highest_type_and_drops_null() {
        let mut interp = scratch();
        let result = builtin_c(
            &mut interp,
            &[Value::integer(1), Value::null(), Value::Float(vec![2.5])],
        )
        .unwrap();
        assert_eq!(result, Value::Float(vec![1.0, 2.5]));

        assert!(builtin_c(&mut interp, &[]).unwrap().is_null());
    }

    #[test]
    fn rep_and_rep_each_differ_in_element_order() {
        let mut interp = scratch();
        let x = Value::Integer(vec![1, 2]);
        let rep = builtin_rep(&mut interp, &[x.clone(), Value::integer(2)]).unwrap();
        assert_eq!(rep, Value::Integer(vec![1, 2, 1, 2]));
        let rep_each = builtin_rep_each(&mut interp, &[x, Value::integer(2)]).unwrap();
        assert_eq!(rep_each, Value::Integer(vec![1, 1, 2, 2]));
    }

    #[test]
    fn seq_matches_integer_and_float_forms() {
        let mut interp = scratch();
        let ints =
            builtin_seq(&mut interp, &[Value::integer(5), Value::integer(1), Value::integer(-2)])
                .unwrap();
        assert_eq!(ints, Value::Integer(vec![5, 3, 1]));

        let floats =
            builtin_seq(&mut interp, &[Value::integer(1), Value::integer(2), Value::float(0.5)])
                .unwrap();
        assert_eq!(floats, Value::Float(vec![1.0, 1.5, 2.0]));

        assert!(builtin_seq(
            &mut interp,
            &[Value::integer(1), Value::integer(5), Value::integer(-1)]
        )
        .is_err());
    }

    #[test]
    fn sum_respects_element_type() {
        let mut interp = scratch();
        assert_eq!(
            builtin_sum(&mut interp, &[Value::Logical(vec![true, false, true])]).unwrap(),
            Value::integer(2)
        );
        assert_eq!(
            builtin_sum(&mut interp, &[Value::Integer(vec![1, 2, 3])]).unwrap(),
            Value::integer(6)
        );
    }

    #[test]
    fn print_and_cat_write_to_the_interpreter_output() {
        let mut interp = scratch();
        builtin_print(&mut interp, &[Value::Integer(vec![1, 2])]).unwrap();
        builtin_cat(&mut interp, &[Value::Str(vec!["a".into(), "b".into()]), Value::string("-")])
            .unwrap();
        assert_eq!(interp.output, "1 2\na-b");
    }

    #[test]
    fn runif_is_deterministic_under_a_fixed_seed() {
        let mut interp = scratch();
        builtin_set_seed(&mut interp, &[Value::integer(11)]).unwrap();
        let first = builtin_runif(&mut interp, &[Value::integer(3)]).unwrap();
        builtin_set_seed(&mut interp, &[Value::integer(11)]).unwrap();
        let second = builtin_runif(&mut interp, &[Value::integer(3)]).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.count(), 3);
    }
}
