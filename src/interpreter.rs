//! Tree-walking evaluator for parsed scripts.
//!
//! Evaluation is a depth-first post-order walk with explicit handling for
//! short-circuiting and control flow. Three flags are shared across
//! frames: `next` and `break` unwind to the enclosing loop, `return`
//! unwinds all the way to the enclosing script block.

use std::rc::Rc;

use crate::ast::AstNode;
use crate::error::{ScriptErrorKind, ScriptResult};
use crate::functions::{standard_registry, FunctionRegistry};
use crate::lexer::Lexer;
use crate::object::ObjectValue;
use crate::parser::{number_literal_value, Parser};
use crate::rng::SimRng;
use crate::symbols::SymbolTable;
use crate::token::{Span, TokenKind};
use crate::value::{compare_elements, elements_identical, Value, ValueType};

fn at<T>(result: Result<T, ScriptErrorKind>, span: Span) -> ScriptResult<T> {
    result.map_err(|kind| kind.at(span))
}

pub struct Interpreter {
    pub symbols: SymbolTable,
    pub output: String,
    pub rng: SimRng,
    registry: Rc<FunctionRegistry>,
    next_hit: bool,
    break_hit: bool,
    return_hit: bool,
    return_value: Option<Value>,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpreter {
    pub fn new() -> Self {
        Self::with_symbols(SymbolTable::with_builtins())
    }

    /// Evaluate against a caller-built symbol table; the table can be
    /// recovered with [`Interpreter::into_symbols`] and reused.
    pub fn with_symbols(symbols: SymbolTable) -> Self {
        Self {
            symbols,
            output: String::new(),
            rng: SimRng::new(),
            registry: standard_registry(),
            next_hit: false,
            break_hit: false,
            return_hit: false,
            return_value: None,
        }
    }

    pub fn into_symbols(self) -> SymbolTable {
        self.symbols
    }

    pub fn take_output(&mut self) -> String {
        std::mem::take(&mut self.output)
    }

    /// Tokenize, parse, and evaluate free-standing statements.
    pub fn run_source(&mut self, source: &str) -> ScriptResult<Value> {
        let tokens = Lexer::new(source).tokenize()?;
        let root = Parser::new(&tokens).parse_interpreter_block()?;
        self.evaluate_interpreter_block(&root)
    }

    /// Evaluate an interpreter block: the result is the value of the last
    /// statement, or the value of an explicit `return`.
    pub fn evaluate_interpreter_block(&mut self, root: &AstNode) -> ScriptResult<Value> {
        let mut result = Value::null_invisible();
        for child in &root.children {
            result = self.eval(child)?;
            self.check_stray_loop_flags(child)?;
            if self.return_hit {
                self.return_hit = false;
                return Ok(self.return_value.take().unwrap_or_else(Value::null_invisible));
            }
        }
        Ok(result)
    }

    /// Evaluate the compound-statement body of a script block. An explicit
    /// `return` supplies the block's value.
    pub fn evaluate_block_body(&mut self, body: &AstNode) -> ScriptResult<Value> {
        let mut result = self.eval(body)?;
        self.check_stray_loop_flags(body)?;
        if self.return_hit {
            self.return_hit = false;
            result = self.return_value.take().unwrap_or_else(Value::null_invisible);
        }
        Ok(result)
    }

    fn check_stray_loop_flags(&mut self, node: &AstNode) -> ScriptResult<()> {
        if self.next_hit {
            self.next_hit = false;
            return Err(ScriptErrorKind::LoopControlOutsideLoop("next").at(node.token.span));
        }
        if self.break_hit {
            self.break_hit = false;
            return Err(ScriptErrorKind::LoopControlOutsideLoop("break").at(node.token.span));
        }
        Ok(())
    }

    fn flow_interrupted(&self) -> bool {
        self.next_hit || self.break_hit || self.return_hit
    }

    // ----- node dispatch -----

    fn eval(&mut self, node: &AstNode) -> ScriptResult<Value> {
        if crate::log_evaluation() {
            tracing::trace!(target: "genic::interp", node = %node.token, span = ?node.token.span);
        }

        match node.kind() {
            TokenKind::Semicolon => Ok(Value::null_invisible()),
            TokenKind::LBrace | TokenKind::InterpreterBlock => self.eval_compound(node),
            TokenKind::Colon => self.eval_range(node),
            TokenKind::LBracket => self.eval_subset(node),
            TokenKind::Dot => self.eval_member(node),
            TokenKind::LParen => self.eval_call(node),
            TokenKind::Plus => self.eval_plus(node),
            TokenKind::Minus => self.eval_minus(node),
            TokenKind::Mult => self.eval_mult(node),
            TokenKind::Div => self.eval_div(node),
            TokenKind::Mod => self.eval_mod(node),
            TokenKind::Exp => self.eval_exp(node),
            TokenKind::And => self.eval_and_or(node, true),
            TokenKind::Or => self.eval_and_or(node, false),
            TokenKind::Not => self.eval_not(node),
            TokenKind::Assign => self.eval_assign(node),
            TokenKind::Eq | TokenKind::NotEq => self.eval_equality(node),
            TokenKind::Lt | TokenKind::LtEq | TokenKind::Gt | TokenKind::GtEq => {
                self.eval_ordering(node)
            }
            TokenKind::Number | TokenKind::Str => self.eval_literal(node),
            TokenKind::Identifier => {
                at(self.symbols.get(&node.token.lexeme).cloned(), node.token.span)
            }
            TokenKind::If => self.eval_if(node),
            TokenKind::Do => self.eval_do_while(node),
            TokenKind::While => self.eval_while(node),
            TokenKind::For => self.eval_for(node),
            TokenKind::Next => {
                self.next_hit = true;
                Ok(Value::null_invisible())
            }
            TokenKind::Break => {
                self.break_hit = true;
                Ok(Value::null_invisible())
            }
            TokenKind::Return => {
                let value = match node.children.first() {
                    Some(expr) => self.eval(expr)?,
                    None => Value::null_invisible(),
                };
                self.return_value = Some(value);
                self.return_hit = true;
                Ok(Value::null_invisible())
            }
            other => Err(ScriptErrorKind::UnexpectedToken { found: other, context: "evaluation" }
                .at(node.token.span)),
        }
    }

    fn eval_literal(&mut self, node: &AstNode) -> ScriptResult<Value> {
        if let Some(constant) = &node.constant {
            return Ok(constant.clone());
        }
        match node.kind() {
            TokenKind::Str => Ok(Value::string(node.token.lexeme.clone())),
            _ => number_literal_value(&node.token),
        }
    }

    fn eval_compound(&mut self, node: &AstNode) -> ScriptResult<Value> {
        let mut result = Value::null_invisible();
        for child in &node.children {
            result = self.eval(child)?;
            // next, break, or return exits immediately, out to the
            // enclosing loop or block evaluator
            if self.flow_interrupted() {
                break;
            }
        }
        Ok(result)
    }

    // ----- arithmetic -----

    fn eval_operands(&mut self, node: &AstNode) -> ScriptResult<(Value, Value)> {
        let a = self.eval(&node.children[0])?;
        let b = self.eval(&node.children[1])?;
        Ok((a, b))
    }

    /// Broadcast length for a binary vector operator: equal lengths, or a
    /// length-1 operand against any length.
    fn broadcast_len(
        a: &Value,
        b: &Value,
        op: &'static str,
        span: Span,
    ) -> ScriptResult<usize> {
        let (m, n) = (a.count(), b.count());
        if m == n {
            Ok(m)
        } else if m == 1 {
            Ok(n)
        } else if n == 1 {
            Ok(m)
        } else {
            Err(ScriptErrorKind::SizeMismatch(op).at(span))
        }
    }

    fn pick(i: usize, len: usize) -> usize {
        if len == 1 { 0 } else { i }
    }

    fn require_numeric(value: &Value, op: &'static str, span: Span) -> ScriptResult<()> {
        if !value.is_numeric() {
            return Err(ScriptErrorKind::OperandTypeNotSupported {
                operator: op,
                operand: value.value_type(),
            }
            .at(span));
        }
        Ok(())
    }

    fn eval_plus(&mut self, node: &AstNode) -> ScriptResult<Value> {
        let span = node.token.span;
        if node.children.len() == 1 {
            // unary plus is a no-op, legal only for numeric operands
            let value = self.eval(&node.children[0])?;
            Self::require_numeric(&value, "+", span)?;
            return Ok(value);
        }

        let (a, b) = self.eval_operands(node)?;
        let len = Self::broadcast_len(&a, &b, "+", span)?;
        let (ta, tb) = (a.value_type(), b.value_type());

        if ta == ValueType::Str || tb == ValueType::Str {
            // either operand string means concatenation, promoting the other side
            let mut values = Vec::with_capacity(len);
            for i in 0..len {
                let left = at(a.string_at(Self::pick(i, a.count())), span)?;
                let right = at(b.string_at(Self::pick(i, b.count())), span)?;
                values.push(format!("{}{}", left, right));
            }
            return Ok(Value::Str(values));
        }

        if !a.is_numeric() || !b.is_numeric() {
            return Err(ScriptErrorKind::OperandCombinationNotSupported {
                operator: "+",
                left: ta,
                right: tb,
            }
            .at(span));
        }

        if ta == ValueType::Integer && tb == ValueType::Integer {
            let mut values = Vec::with_capacity(len);
            for i in 0..len {
                let x = at(a.integer_at(Self::pick(i, a.count())), span)?;
                let y = at(b.integer_at(Self::pick(i, b.count())), span)?;
                values.push(x.wrapping_add(y));
            }
            Ok(Value::Integer(values))
        } else {
            let mut values = Vec::with_capacity(len);
            for i in 0..len {
                let x = at(a.float_at(Self::pick(i, a.count())), span)?;
                let y = at(b.float_at(Self::pick(i, b.count())), span)?;
                values.push(x + y);
            }
            Ok(Value::Float(values))
        }
    }

    fn eval_minus(&mut self, node: &AstNode) -> ScriptResult<Value> {
        let span = node.token.span;
        if node.children.len() == 1 {
            let value = self.eval(&node.children[0])?;
            Self::require_numeric(&value, "-", span)?;
            return Ok(match value {
                Value::Integer(v) => Value::Integer(v.iter().map(|x| x.wrapping_neg()).collect()),
                Value::Float(v) => Value::Float(v.iter().map(|x| -x).collect()),
                _ => unreachable!(),
            });
        }

        let (a, b) = self.eval_operands(node)?;
        Self::require_numeric(&a, "-", span)?;
        Self::require_numeric(&b, "-", span)?;
        let len = Self::broadcast_len(&a, &b, "-", span)?;

        if a.value_type() == ValueType::Integer && b.value_type() == ValueType::Integer {
            let mut values = Vec::with_capacity(len);
            for i in 0..len {
                let x = at(a.integer_at(Self::pick(i, a.count())), span)?;
                let y = at(b.integer_at(Self::pick(i, b.count())), span)?;
                values.push(x.wrapping_sub(y));
            }
            Ok(Value::Integer(values))
        } else {
            let mut values = Vec::with_capacity(len);
            for i in 0..len {
                let x = at(a.float_at(Self::pick(i, a.count())), span)?;
                let y = at(b.float_at(Self::pick(i, b.count())), span)?;
                values.push(x - y);
            }
            Ok(Value::Float(values))
        }
    }

    fn eval_mult(&mut self, node: &AstNode) -> ScriptResult<Value> {
        let span = node.token.span;
        let (a, b) = self.eval_operands(node)?;
        Self::require_numeric(&a, "*", span)?;
        Self::require_numeric(&b, "*", span)?;
        let len = Self::broadcast_len(&a, &b, "*", span)?;

        if a.value_type() == ValueType::Integer && b.value_type() == ValueType::Integer {
            let mut values = Vec::with_capacity(len);
            for i in 0..len {
                let x = at(a.integer_at(Self::pick(i, a.count())), span)?;
                let y = at(b.integer_at(Self::pick(i, b.count())), span)?;
                values.push(x.wrapping_mul(y));
            }
            Ok(Value::Integer(values))
        } else {
            let mut values = Vec::with_capacity(len);
            for i in 0..len {
                let x = at(a.float_at(Self::pick(i, a.count())), span)?;
                let y = at(b.float_at(Self::pick(i, b.count())), span)?;
                values.push(x * y);
            }
            Ok(Value::Float(values))
        }
    }

    /// Division always produces float; an all-integer division with a zero
    /// divisor is fatal, while float division by zero yields an infinity.
    fn eval_div(&mut self, node: &AstNode) -> ScriptResult<Value> {
        let span = node.token.span;
        let (a, b) = self.eval_operands(node)?;
        Self::require_numeric(&a, "/", span)?;
        Self::require_numeric(&b, "/", span)?;
        let len = Self::broadcast_len(&a, &b, "/", span)?;

        if a.value_type() == ValueType::Integer && b.value_type() == ValueType::Integer {
            for i in 0..b.count() {
                if at(b.integer_at(i), span)? == 0 {
                    return Err(ScriptErrorKind::IntegerDivisionByZero.at(span));
                }
            }
        }

        let mut values = Vec::with_capacity(len);
        for i in 0..len {
            let x = at(a.float_at(Self::pick(i, a.count())), span)?;
            let y = at(b.float_at(Self::pick(i, b.count())), span)?;
            values.push(x / y);
        }
        Ok(Value::Float(values))
    }

    /// Modulo is always float modulo; modulo by zero yields NaN.
    fn eval_mod(&mut self, node: &AstNode) -> ScriptResult<Value> {
        let span = node.token.span;
        let (a, b) = self.eval_operands(node)?;
        Self::require_numeric(&a, "%", span)?;
        Self::require_numeric(&b, "%", span)?;
        let len = Self::broadcast_len(&a, &b, "%", span)?;

        let mut values = Vec::with_capacity(len);
        for i in 0..len {
            let x = at(a.float_at(Self::pick(i, a.count())), span)?;
            let y = at(b.float_at(Self::pick(i, b.count())), span)?;
            values.push(x % y);
        }
        Ok(Value::Float(values))
    }

    fn eval_exp(&mut self, node: &AstNode) -> ScriptResult<Value> {
        let span = node.token.span;
        let (a, b) = self.eval_operands(node)?;
        Self::require_numeric(&a, "^", span)?;
        Self::require_numeric(&b, "^", span)?;
        let len = Self::broadcast_len(&a, &b, "^", span)?;

        let mut values = Vec::with_capacity(len);
        for i in 0..len {
            let x = at(a.float_at(Self::pick(i, a.count())), span)?;
            let y = at(b.float_at(Self::pick(i, b.count())), span)?;
            values.push(x.powf(y));
        }
        Ok(Value::Float(values))
    }

    /// The range operator: both endpoints singleton numeric; integer
    /// endpoints produce an integer sequence stepping by ±1, otherwise a
    /// float sequence with an underflow guard. Capped at
    /// [`crate::MAX_RANGE_LENGTH`] entries.
    fn eval_range(&mut self, node: &AstNode) -> ScriptResult<Value> {
        let span = node.token.span;
        let (a, b) = self.eval_operands(node)?;
        Self::require_numeric(&a, ":", span)?;
        Self::require_numeric(&b, ":", span)?;
        if a.count() != 1 || b.count() != 1 {
            return Err(ScriptErrorKind::RangeOperandNotSingleton.at(span));
        }

        if a.value_type() == ValueType::Integer && b.value_type() == ValueType::Integer {
            let first = at(a.integer_at(0), span)?;
            let second = at(b.integer_at(0), span)?;
            let width = first.abs_diff(second) as u128 + 1;
            if width > crate::MAX_RANGE_LENGTH as u128 {
                return Err(ScriptErrorKind::RangeTooWide.at(span));
            }
            let values: Vec<i64> = if first <= second {
                (first..=second).collect()
            } else {
                (second..=first).rev().collect()
            };
            Ok(Value::Integer(values))
        } else {
            let first = at(a.float_at(0), span)?;
            let second = at(b.float_at(0), span)?;
            let mut values = Vec::new();
            let ascending = first <= second;
            let mut cur = first;
            loop {
                if ascending && cur > second {
                    break;
                }
                if !ascending && cur < second {
                    break;
                }
                values.push(cur);
                if values.len() > crate::MAX_RANGE_LENGTH {
                    return Err(ScriptErrorKind::RangeTooWide.at(span));
                }
                let next = if ascending { cur + 1.0 } else { cur - 1.0 };
                if next == cur {
                    return Err(ScriptErrorKind::RangeUnderflow.at(span));
                }
                cur = next;
            }
            Ok(Value::Float(values))
        }
    }

    // ----- comparison and logic -----

    fn eval_equality(&mut self, node: &AstNode) -> ScriptResult<Value> {
        let span = node.token.span;
        let negate = node.kind() == TokenKind::NotEq;
        let (a, b) = self.eval_operands(node)?;

        // comparing against NULL yields a zero-length logical, not an error
        if a.is_null() || b.is_null() {
            return Ok(Value::Logical(Vec::new()));
        }

        let op: &'static str = if negate { "!=" } else { "==" };
        let len = Self::broadcast_len(&a, &b, op, span)?;
        let a_is_object = a.value_type() == ValueType::Object;
        let b_is_object = b.value_type() == ValueType::Object;
        if a_is_object != b_is_object {
            return Err(ScriptErrorKind::OperandCombinationNotSupported {
                operator: op,
                left: a.value_type(),
                right: b.value_type(),
            }
            .at(span));
        }

        let mut values = Vec::with_capacity(len);
        for i in 0..len {
            let ia = Self::pick(i, a.count());
            let ib = Self::pick(i, b.count());
            let equal = if a_is_object {
                at(elements_identical(&a, ia, &b, ib), span)?
            } else {
                at(compare_elements(&a, ia, &b, ib), span)? == std::cmp::Ordering::Equal
            };
            values.push(equal != negate);
        }
        Ok(Value::Logical(values))
    }

    fn eval_ordering(&mut self, node: &AstNode) -> ScriptResult<Value> {
        let span = node.token.span;
        let (a, b) = self.eval_operands(node)?;

        if a.is_null() || b.is_null() {
            return Ok(Value::Logical(Vec::new()));
        }
        if a.value_type() == ValueType::Object || b.value_type() == ValueType::Object {
            return Err(ScriptErrorKind::ObjectsCannotBeOrdered.at(span));
        }

        let kind = node.kind();
        let op: &'static str = match kind {
            TokenKind::Lt => "<",
            TokenKind::LtEq => "<=",
            TokenKind::Gt => ">",
            _ => ">=",
        };
        let len = Self::broadcast_len(&a, &b, op, span)?;

        let mut values = Vec::with_capacity(len);
        for i in 0..len {
            let ordering = at(
                compare_elements(&a, Self::pick(i, a.count()), &b, Self::pick(i, b.count())),
                span,
            )?;
            values.push(match kind {
                TokenKind::Lt => ordering == std::cmp::Ordering::Less,
                TokenKind::LtEq => ordering != std::cmp::Ordering::Greater,
                TokenKind::Gt => ordering == std::cmp::Ordering::Greater,
                _ => ordering != std::cmp::Ordering::Less,
            });
        }
        Ok(Value::Logical(values))
    }

    fn logic_operand_check(value: &Value, op: &'static str, span: Span) -> ScriptResult<()> {
        match value.value_type() {
            ValueType::Logical | ValueType::Integer | ValueType::Float | ValueType::Str => Ok(()),
            other => {
                Err(ScriptErrorKind::OperandTypeNotSupported { operator: op, operand: other }
                    .at(span))
            }
        }
    }

    /// Elementwise `&` / `|` over two or more operands. The accumulated
    /// result grows as needed when a length-1 operand meets a longer one.
    fn eval_and_or(&mut self, node: &AstNode, is_and: bool) -> ScriptResult<Value> {
        let span = node.token.span;
        let op: &'static str = if is_and { "&" } else { "|" };
        let mut acc: Option<Vec<bool>> = None;

        for child in &node.children {
            let value = self.eval(child)?;
            Self::logic_operand_check(&value, op, span)?;
            let n = value.count();

            match &mut acc {
                None => {
                    let mut first = Vec::with_capacity(n);
                    for i in 0..n {
                        first.push(at(value.logical_at(i), span)?);
                    }
                    acc = Some(first);
                }
                Some(result) => {
                    let m = result.len();
                    if m != n && m != 1 && n != 1 {
                        return Err(ScriptErrorKind::SizeMismatch(op).at(span));
                    }
                    if n == 1 {
                        let bit = at(value.logical_at(0), span)?;
                        if is_and && !bit {
                            result.iter_mut().for_each(|b| *b = false);
                        } else if !is_and && bit {
                            result.iter_mut().for_each(|b| *b = true);
                        }
                    } else if m == 1 {
                        let bit = result[0];
                        let mut grown = Vec::with_capacity(n);
                        for i in 0..n {
                            let other = at(value.logical_at(i), span)?;
                            grown.push(if is_and { bit && other } else { bit || other });
                        }
                        *result = grown;
                    } else {
                        for (i, b) in result.iter_mut().enumerate() {
                            let other = at(value.logical_at(i), span)?;
                            *b = if is_and { *b && other } else { *b || other };
                        }
                    }
                }
            }
        }

        Ok(Value::Logical(acc.unwrap_or_default()))
    }

    fn eval_not(&mut self, node: &AstNode) -> ScriptResult<Value> {
        let span = node.token.span;
        let value = self.eval(&node.children[0])?;
        Self::logic_operand_check(&value, "!", span)?;
        let mut values = Vec::with_capacity(value.count());
        for i in 0..value.count() {
            values.push(!at(value.logical_at(i), span)?);
        }
        Ok(Value::Logical(values))
    }

    // ----- subscript, member, call -----

    fn eval_subset(&mut self, node: &AstNode) -> ScriptResult<Value> {
        let span = node.token.span;
        let base = self.eval(&node.children[0])?;
        if base.is_null() {
            return Ok(Value::null());
        }
        let index = self.eval(&node.children[1])?;

        match index.value_type() {
            ValueType::Null => Ok(base.new_matching_type()),
            ValueType::Logical => {
                if index.count() != base.count() {
                    return Err(ScriptErrorKind::LogicalIndexSizeMismatch.at(span));
                }
                let mut result = base.new_matching_type();
                for i in 0..base.count() {
                    if at(index.logical_at(i), span)? {
                        at(result.push_from(i, &base), span)?;
                    }
                }
                Ok(result)
            }
            ValueType::Integer | ValueType::Float => {
                let mut result = base.new_matching_type();
                for i in 0..index.count() {
                    let idx = at(index.integer_at(i), span)?;
                    if idx < 0 || idx as usize >= base.count() {
                        return Err(ScriptErrorKind::IndexOutOfRange(idx).at(span));
                    }
                    at(result.push_from(idx as usize, &base), span)?;
                }
                Ok(result)
            }
            other => Err(
                ScriptErrorKind::OperandTypeNotSupported { operator: "[]", operand: other }
                    .at(span),
            ),
        }
    }

    fn member_name<'n>(node: &'n AstNode) -> ScriptResult<&'n str> {
        let member = &node.children[1];
        if member.kind() != TokenKind::Identifier {
            return Err(ScriptErrorKind::MemberNameNotIdentifier.at(member.token.span));
        }
        Ok(&member.token.lexeme)
    }

    fn eval_member(&mut self, node: &AstNode) -> ScriptResult<Value> {
        let receiver = self.eval(&node.children[0])?;
        let object = at(receiver.as_object().cloned(), node.token.span)?;
        let name = Self::member_name(node)?;
        at(object.get_member(name), node.children[1].token.span)
    }

    fn eval_call(&mut self, node: &AstNode) -> ScriptResult<Value> {
        let callee = &node.children[0];

        match callee.kind() {
            TokenKind::Identifier => {
                // arguments evaluate left to right before the callee runs
                let mut args = Vec::with_capacity(node.children.len() - 1);
                for child in &node.children[1..] {
                    args.push(self.eval(child)?);
                }

                let name = callee.token.lexeme.clone();
                let registry = Rc::clone(&self.registry);
                let def = registry.get(&name).ok_or_else(|| {
                    ScriptErrorKind::UnknownFunction(name.clone()).at(callee.token.span)
                })?;
                at(def.signature.check_arguments(&args), node.token.span)?;
                let result = at((def.body)(self, &args), node.token.span)?;
                at(def.signature.check_return(&result), node.token.span)?;
                Ok(result)
            }
            TokenKind::Dot => {
                let receiver = self.eval(&callee.children[0])?;
                let object = at(receiver.as_object().cloned(), callee.token.span)?;
                let name = Self::member_name(callee)?;

                let mut args = Vec::with_capacity(node.children.len() - 1);
                for child in &node.children[1..] {
                    args.push(self.eval(child)?);
                }
                at(object.execute_method(name, &args), callee.children[1].token.span)
            }
            other => Err(ScriptErrorKind::UnexpectedToken {
                found: other,
                context: "function call",
            }
            .at(callee.token.span)),
        }
    }

    // ----- assignment -----

    fn eval_assign(&mut self, node: &AstNode) -> ScriptResult<Value> {
        let rvalue = self.eval(&node.children[1])?;
        self.assign_to_lvalue(&node.children[0], rvalue)?;
        // assignment deliberately yields no usable value, so `if (x = 3)`
        // fails instead of silently testing 3
        Ok(Value::null_invisible())
    }

    fn assign_to_lvalue(&mut self, lvalue: &AstNode, rvalue: Value) -> ScriptResult<()> {
        match lvalue.kind() {
            TokenKind::Identifier => {
                at(self.symbols.set_variable(&lvalue.token.lexeme, rvalue), lvalue.token.span)
            }
            TokenKind::Dot => {
                let receiver = self.eval(&lvalue.children[0])?;
                let object = at(receiver.as_object().cloned(), lvalue.token.span)?;
                let name = Self::member_name(lvalue)?;
                at(object.set_member(name, &rvalue), lvalue.children[1].token.span)
            }
            TokenKind::LBracket => self.assign_through_subscript(lvalue, rvalue),
            _ => Err(ScriptErrorKind::InvalidAssignmentTarget.at(lvalue.token.span)),
        }
    }

    fn assign_through_subscript(&mut self, lvalue: &AstNode, rvalue: Value) -> ScriptResult<()> {
        let span = lvalue.token.span;
        let (base, member, indices) = self.resolve_subscript_target(lvalue)?;
        let rvalue_count = rvalue.count();
        let index_count = indices.len();

        match member {
            None => {
                let AssignBase::Symbol(name) = base else {
                    return Err(ScriptErrorKind::InvalidAssignmentTarget.at(span));
                };

                {
                    let dest = at(self.symbols.get(&name), span)?;
                    if !assignment_compatible(&rvalue, dest) {
                        return Err(ScriptErrorKind::AssignmentTypeMismatch {
                            value_source: rvalue.value_type(),
                            destination: dest.value_type(),
                        }
                        .at(span));
                    }
                }

                let dest = at(self.symbols.get_mut_variable(&name), span)?;
                if rvalue_count == 1 {
                    // multiplex assignment of one value to every index
                    for &idx in &indices {
                        at(dest.set_at(idx, &rvalue), span)?;
                    }
                } else if rvalue_count == index_count {
                    for (k, &idx) in indices.iter().enumerate() {
                        let piece = at(rvalue.get_at(k), span)?;
                        at(dest.set_at(idx, &piece), span)?;
                    }
                } else {
                    return Err(ScriptErrorKind::AssignmentSizeMismatch.at(span));
                }
                Ok(())
            }
            Some(member_name) => {
                // host.member[indices] rewrites to host[indices].member,
                // which is equivalent under element sharing semantics
                let AssignBase::Object(object) = base else {
                    return Err(ScriptErrorKind::InvalidAssignmentTarget.at(span));
                };

                if rvalue_count == 1 {
                    for &idx in &indices {
                        let element = ObjectValue::with_element(object.element(idx).clone());
                        at(element.set_member(&member_name, &rvalue), span)?;
                    }
                } else if rvalue_count == index_count {
                    for (k, &idx) in indices.iter().enumerate() {
                        let piece = at(rvalue.get_at(k), span)?;
                        let element = ObjectValue::with_element(object.element(idx).clone());
                        at(element.set_member(&member_name, &piece), span)?;
                    }
                } else {
                    return Err(ScriptErrorKind::AssignmentSizeMismatch.at(span));
                }
                Ok(())
            }
        }
    }

    /// Resolve the ultimate container, member-name-if-any, and flattened
    /// index set of an lvalue without producing a new value. Nested
    /// subscripts compose by indexing into the already-selected index set.
    fn resolve_subscript_target(
        &mut self,
        node: &AstNode,
    ) -> ScriptResult<(AssignBase, Option<String>, Vec<usize>)> {
        match node.kind() {
            TokenKind::LBracket => {
                let (base, member, base_indices) =
                    self.resolve_subscript_target(&node.children[0])?;
                let index = self.eval(&node.children[1])?;
                let span = node.children[1].token.span;

                let selected = match index.value_type() {
                    ValueType::Logical => {
                        if index.count() != base_indices.len() {
                            return Err(ScriptErrorKind::LogicalIndexSizeMismatch.at(span));
                        }
                        let mut keep = Vec::new();
                        for (i, &idx) in base_indices.iter().enumerate() {
                            if at(index.logical_at(i), span)? {
                                keep.push(idx);
                            }
                        }
                        keep
                    }
                    ValueType::Integer | ValueType::Float => {
                        let mut keep = Vec::with_capacity(index.count());
                        for i in 0..index.count() {
                            let pos = at(index.integer_at(i), span)?;
                            if pos < 0 || pos as usize >= base_indices.len() {
                                return Err(ScriptErrorKind::IndexOutOfRange(pos).at(span));
                            }
                            keep.push(base_indices[pos as usize]);
                        }
                        keep
                    }
                    ValueType::Null => Vec::new(),
                    other => {
                        return Err(ScriptErrorKind::OperandTypeNotSupported {
                            operator: "[]",
                            operand: other,
                        }
                        .at(span))
                    }
                };
                Ok((base, member, selected))
            }
            TokenKind::Dot => {
                let receiver = self.eval(&node.children[0])?;
                let object = at(receiver.as_object().cloned(), node.token.span)?;
                let name = Self::member_name(node)?.to_string();
                let indices = (0..object.count()).collect();
                Ok((AssignBase::Object(object), Some(name), indices))
            }
            TokenKind::Identifier => {
                let name = node.token.lexeme.clone();
                let count = at(self.symbols.get(&name), node.token.span)?.count();
                Ok((AssignBase::Symbol(name), None, (0..count).collect()))
            }
            _ => Err(ScriptErrorKind::InvalidAssignmentTarget.at(node.token.span)),
        }
    }

    // ----- flow control -----

    fn singleton_condition(&mut self, node: &AstNode, what: &'static str) -> ScriptResult<bool> {
        let value = self.eval(node)?;
        if value.count() != 1 {
            return Err(ScriptErrorKind::ConditionNotSingleton(what).at(node.token.span));
        }
        at(value.logical_at(0), node.token.span)
    }

    fn eval_if(&mut self, node: &AstNode) -> ScriptResult<Value> {
        if self.singleton_condition(&node.children[0], "if")? {
            self.eval(&node.children[1])
        } else if let Some(else_branch) = node.children.get(2) {
            self.eval(else_branch)
        } else {
            Ok(Value::null_invisible())
        }
    }

    /// Run a loop body; returns true when the loop should terminate.
    fn loop_body_interrupts(&mut self, body: &AstNode) -> ScriptResult<bool> {
        self.eval(body)?;
        if self.next_hit {
            self.next_hit = false;
        }
        if self.break_hit {
            self.break_hit = false;
            return Ok(true);
        }
        Ok(self.return_hit)
    }

    fn eval_do_while(&mut self, node: &AstNode) -> ScriptResult<Value> {
        loop {
            if self.loop_body_interrupts(&node.children[0])? {
                break;
            }
            if !self.singleton_condition(&node.children[1], "do-while")? {
                break;
            }
        }
        Ok(Value::null_invisible())
    }

    fn eval_while(&mut self, node: &AstNode) -> ScriptResult<Value> {
        loop {
            if !self.singleton_condition(&node.children[0], "while")? {
                break;
            }
            if self.loop_body_interrupts(&node.children[1])? {
                break;
            }
        }
        Ok(Value::null_invisible())
    }

    fn eval_for(&mut self, node: &AstNode) -> ScriptResult<Value> {
        let ident = &node.children[0];
        let sequence = self.eval(&node.children[1])?;

        for i in 0..sequence.count() {
            let element = at(sequence.get_at(i), node.children[1].token.span)?;
            at(self.symbols.set_variable(&ident.token.lexeme, element), ident.token.span)?;
            if self.loop_body_interrupts(&node.children[2])? {
                break;
            }
        }
        Ok(Value::null_invisible())
    }
}

enum AssignBase {
    Symbol(String),
    Object(ObjectValue),
}

/// Codifies which promotions may occur in assignment: identical types
/// always; NULL never assigns into anything; objects only into objects
/// (element classes are checked at the write site); otherwise the
/// destination type must be strictly higher in the promotion order.
fn assignment_compatible(source: &Value, destination: &Value) -> bool {
    let src = source.value_type();
    let dst = destination.value_type();
    let src_is_object = src == ValueType::Object;
    let dst_is_object = dst == ValueType::Object;

    if src_is_object && dst_is_object {
        return true;
    }
    if src_is_object || dst_is_object {
        return false;
    }
    if src == dst {
        return true;
    }
    if src == ValueType::Null {
        return false;
    }
    dst > src
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::test_support::counter;

    fn run(source: &str) -> Value {
        Interpreter::new().run_source(source).unwrap()
    }

    fn run_err(source: &str) -> crate::error::ScriptError {
        Interpreter::new().run_source(source).unwrap_err()
    }

    #[test]
    fn literals_and_constants_evaluate() {
        assert_eq!(run("3;"), Value::integer(3));
        assert_eq!(run("3e2;"), Value::integer(300));
        assert_eq!(run("3.1;"), Value::float(3.1));
        assert_eq!(run("\"foo\";"), Value::string("foo"));
        assert_eq!(run("T;"), Value::logical(true));
        assert!(run("NULL;").is_null());
    }

    #[test]
    fn broadcast_applies_on_either_side() {
        assert_eq!(run("(0:2)+10;"), Value::Integer(vec![10, 11, 12]));
        assert_eq!(run("10+(0:2);"), Value::Integer(vec![10, 11, 12]));
        assert_eq!(run("(15:13)+(0:2);"), Value::Integer(vec![15, 15, 15]));
        assert!(Interpreter::new().run_source("(15:12)+(0:2);").is_err());
    }

    #[test]
    fn string_plus_concatenates_with_promotion() {
        assert_eq!(run("\"a\" + 1;"), Value::string("a1"));
        assert_eq!(run("1.5 + \"b\";"), Value::string("1.5b"));
        assert_eq!(
            run("\"x\" + (1:3);"),
            Value::Str(vec!["x1".into(), "x2".into(), "x3".into()])
        );
    }

    #[test]
    fn division_is_always_float_but_integer_zero_divisor_is_fatal() {
        assert_eq!(run("7/2;"), Value::float(3.5));
        assert_eq!(run("6/0.0;"), Value::float(f64::INFINITY));
        let err = run_err("6/0;");
        assert!(matches!(err.kind, ScriptErrorKind::IntegerDivisionByZero));
    }

    #[test]
    fn modulo_is_float_and_yields_nan_on_zero() {
        assert_eq!(run("7%3;"), Value::float(1.0));
        let result = run("7%0;");
        match result {
            Value::Float(v) => assert!(v[0].is_nan()),
            other => panic!("expected float, got {:?}", other),
        }
    }

    #[test]
    fn ranges_step_by_one_in_either_direction() {
        assert_eq!(run("1:5;"), Value::Integer(vec![1, 2, 3, 4, 5]));
        assert_eq!(run("5:1;"), Value::Integer(vec![5, 4, 3, 2, 1]));
        assert_eq!(run("1.5:4;"), Value::Float(vec![1.5, 2.5, 3.5]));
        assert!(Interpreter::new().run_source("1:200000;").is_err());
        assert!(Interpreter::new().run_source("(1:3):5;").is_err());
    }

    #[test]
    fn comparison_with_null_yields_empty_logical() {
        assert_eq!(run("1 == NULL;"), Value::Logical(vec![]));
        assert_eq!(run("NULL < 3;"), Value::Logical(vec![]));
    }

    #[test]
    fn logical_operators_broadcast_per_element() {
        assert_eq!(
            run("c(T,F,T) & c(T,T,F);"),
            Value::Logical(vec![true, false, false])
        );
        assert_eq!(run("T & c(T,F);"), Value::Logical(vec![true, false]));
        assert_eq!(run("c(T,F) | F;"), Value::Logical(vec![true, false]));
        assert_eq!(run("!c(T,F);"), Value::Logical(vec![false, true]));
    }

    #[test]
    fn subscripts_mask_index_and_accept_null() {
        assert_eq!(run("x = 10:14; x[c(0,4)];"), Value::Integer(vec![10, 14]));
        assert_eq!(run("x = 1:4; x[x % 2 == 0];"), Value::Integer(vec![2, 4]));
        assert_eq!(run("x = 1:4; x[NULL];"), Value::Integer(vec![]));
        assert!(Interpreter::new().run_source("x = 1:4; x[4];").is_err());
        assert!(Interpreter::new().run_source("x = 1:4; x[c(T,F)];").is_err());
    }

    #[test]
    fn assignment_yields_invisible_null_and_binds() {
        let mut interp = Interpreter::new();
        let result = interp.run_source("x = 3;").unwrap();
        assert!(result.invisible());
        assert_eq!(interp.symbols.get("x").unwrap(), &Value::integer(3));
        assert!(interp.run_source("if (x = 4) 1;").is_err());
    }

    #[test]
    fn subscripted_assignment_broadcasts_or_maps() {
        assert_eq!(run("x = 1:5; x[x % 2 == 1] = 10; x;"), Value::Integer(vec![10, 2, 10, 4, 10]));
        assert_eq!(run("x = 1:4; x[c(0,1)] = c(9,8); x;"), Value::Integer(vec![9, 8, 3, 4]));
        assert!(Interpreter::new().run_source("x = 1:4; x[0:2] = c(1,2);").is_err());
        assert!(Interpreter::new().run_source("x = 1:4; x[0] = NULL;").is_err());
        assert!(Interpreter::new().run_source("x = 1:4; x[0] = 1.5;").is_err());
    }

    #[test]
    fn nested_subscript_assignment_composes_index_sets() {
        assert_eq!(run("x = 1:6; x[2:5][c(0,2)] = 0; x;"), Value::Integer(vec![1, 2, 0, 4, 0, 6]));
    }

    #[test]
    fn constants_reject_assignment() {
        assert!(Interpreter::new().run_source("T = F;").is_err());
        assert!(Interpreter::new().run_source("PI[0] = 3.0;").is_err());
    }

    #[test]
    fn member_access_and_member_assignment_share_elements() {
        let mut interp = Interpreter::new();
        let shared = counter("a", 1);
        interp
            .symbols
            .set_variable("obj", Value::object(shared))
            .unwrap();
        assert_eq!(interp.run_source("obj.count;").unwrap(), Value::integer(1));
        interp.run_source("obj.count = 5;").unwrap();
        assert_eq!(interp.run_source("obj.count;").unwrap(), Value::integer(5));
        interp.run_source("obj.count[0] = 7;").unwrap();
        assert_eq!(interp.run_source("obj.count;").unwrap(), Value::integer(7));
        assert!(interp.run_source("obj.missing;").is_err());
        assert!(interp.run_source("obj < obj;").is_err());
        assert_eq!(interp.run_source("obj == obj;").unwrap(), Value::logical(true));
    }

    #[test]
    fn method_calls_dispatch_through_signatures() {
        let mut interp = Interpreter::new();
        interp
            .symbols
            .set_variable("obj", Value::object(counter("a", 10)))
            .unwrap();
        assert_eq!(interp.run_source("obj.increment();").unwrap(), Value::integer(11));
        assert_eq!(interp.run_source("obj.increment(5);").unwrap(), Value::integer(15));
        assert!(interp.run_source("obj.increment(\"x\");").is_err());
        assert!(interp.run_source("obj.increment(1, 2);").is_err());
    }

    #[test]
    fn if_requires_a_singleton_condition() {
        assert_eq!(run("if (T) 1; else 2;"), Value::integer(1));
        assert_eq!(run("if (F) 1; else 2;"), Value::integer(2));
        assert!(run("if (F) 1;").invisible());
        assert!(Interpreter::new().run_source("if (c(T,T)) 1;").is_err());
    }

    #[test]
    fn loops_run_with_next_and_break() {
        assert_eq!(run("s = 0; for (i in 1:10) { if (i % 2 == 0) next; s = s + i; } s;"),
            Value::integer(25));
        assert_eq!(run("s = 0; for (i in 1:10) { if (i == 4) break; s = s + i; } s;"),
            Value::integer(6));
        assert_eq!(run("i = 0; while (i < 5) i = i + 1; i;"), Value::integer(5));
        assert_eq!(run("i = 10; do i = i + 1; while (i < 5); i;"), Value::integer(11));
    }

    #[test]
    fn for_binds_each_element_in_index_order() {
        assert_eq!(run("x = 0; for (v in c(3, 5, 9)) x = v; x;"), Value::integer(9));
        assert_eq!(run("last = \"\"; for (s in c(\"a\",\"b\")) last = s; last;"),
            Value::string("b"));
    }

    #[test]
    fn return_unwinds_to_the_block_entry() {
        assert_eq!(run("for (i in 1:10) { if (i == 3) return 99; } 1;"), Value::integer(99));
        assert_eq!(run("return;"), Value::null_invisible());
    }

    #[test]
    fn loop_control_outside_a_loop_is_fatal() {
        let err = run_err("next;");
        assert!(matches!(err.kind, ScriptErrorKind::LoopControlOutsideLoop("next")));
        let err = run_err("break;");
        assert!(matches!(err.kind, ScriptErrorKind::LoopControlOutsideLoop("break")));
    }

    #[test]
    fn unknown_identifiers_and_functions_are_fatal() {
        assert!(matches!(run_err("frq;").kind, ScriptErrorKind::UndefinedIdentifier(_)));
        assert!(matches!(run_err("frq(1);").kind, ScriptErrorKind::UnknownFunction(_)));
    }

    #[test]
    fn symbol_table_survives_across_evaluations() {
        let mut interp = Interpreter::new();
        interp.run_source("x = 41;").unwrap();
        assert_eq!(interp.run_source("x + 1;").unwrap(), Value::integer(42));
        let symbols = interp.into_symbols();
        let mut reused = Interpreter::with_symbols(symbols);
        assert_eq!(reused.run_source("x;").unwrap(), Value::integer(41));
    }
}
