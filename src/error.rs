use thiserror::Error;

use crate::token::{Span, TokenKind};
use crate::value::ValueType;

pub type ScriptResult<T> = Result<T, ScriptError>;

/// A fatal script error: what went wrong and where in the source.
///
/// Everything is fatal at the point of detection; there is no catch in the
/// scripting language. Batch hosts exit, interactive hosts report and
/// re-enter.
#[derive(Debug, Clone)]
pub struct ScriptError {
    pub kind: ScriptErrorKind,
    pub span: Span,
}

impl ScriptError {
    pub fn new(kind: ScriptErrorKind, span: Span) -> Self {
        Self { kind, span }
    }

    /// Render as `ERROR (...): message` plus the offending source line with
    /// a caret underline.
    pub fn display_with_source(&self, source: &str) -> String {
        let anchor = self.span.start.min(source.len());
        let before = &source[..anchor];

        // everything up to the anchor tells us which line we are on and
        // where it begins; the line runs to the next newline or EOF
        let row = 1 + before.matches('\n').count();
        let bol = before.rfind('\n').map_or(0, |nl| nl + 1);
        let line = source[bol..].split('\n').next().unwrap_or("");

        let col = anchor - bol;
        let width = (self.span.end.saturating_sub(self.span.start)).max(1);
        let underline = format!("{}{}", " ".repeat(col), "^".repeat(width));

        format!(
            "ERROR ({}): {}\n{:4} | {}\n     | {}",
            self.kind.stage(),
            self.kind,
            row,
            line,
            underline
        )
    }
}

impl std::fmt::Display for ScriptError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "ERROR ({}): {} (at {}..{})",
            self.kind.stage(),
            self.kind,
            self.span.start,
            self.span.end
        )
    }
}

impl std::error::Error for ScriptError {}

#[derive(Debug, Clone, Error)]
pub enum ScriptErrorKind {
    // Lexical
    #[error("unrecognized character '{0}'")]
    UnexpectedCharacter(char),
    #[error("unexpected end of input in string literal")]
    UnterminatedString,
    #[error("illegal newline in string literal")]
    NewlineInString,
    #[error("illegal escape sequence '\\{0}' in string literal")]
    BadEscape(char),
    #[error("malformed numeric literal \"{0}\"")]
    MalformedNumber(String),

    // Syntactic
    #[error("unexpected token {found:?} in {context}")]
    UnexpectedToken { found: TokenKind, context: &'static str },
    #[error("expected {expected:?} but found {found:?} in {context}")]
    ExpectedToken { expected: TokenKind, found: TokenKind, context: &'static str },
    #[error("a mutation type id is required in fitness() callback definitions")]
    MissingMutationTypeId,
    #[error("a subpopulation id is expected after a comma in callback definitions")]
    MissingSubpopulationId,
    #[error("malformed script block id \"{0}\"; expected a string of the form \"s<number>\"")]
    MalformedBlockId(String),

    // Semantic: typing
    #[error("operand type {operand:?} is not supported by the '{operator}' operator")]
    OperandTypeNotSupported { operator: &'static str, operand: ValueType },
    #[error("the combination of operand types {left:?} and {right:?} is not supported by the binary '{operator}' operator")]
    OperandCombinationNotSupported { operator: &'static str, left: ValueType, right: ValueType },
    #[error("object values may be tested for equality but cannot be ordered")]
    ObjectsCannotBeOrdered,
    #[error("type mismatch in assignment: cannot assign {value_source:?} into {destination:?}")]
    AssignmentTypeMismatch { value_source: ValueType, destination: ValueType },
    #[error("cannot convert value of type {from:?} to {to:?}")]
    CannotConvert { from: ValueType, to: ValueType },
    #[error("mixed object element types: {0} and {1}")]
    MixedObjectElementTypes(String, String),
    #[error("argument {index} of {callee}() has type {got:?}, which is not permitted")]
    InvalidArgumentType { callee: String, index: usize, got: ValueType },
    #[error("argument {index} of {callee}() must be a singleton (size() == 1)")]
    ArgumentNotSingleton { callee: String, index: usize },
    #[error("missing required argument {index} of {callee}()")]
    MissingArgument { callee: String, index: usize },
    #[error("too many arguments for {callee}(); at most {max} accepted")]
    TooManyArguments { callee: String, max: usize },
    #[error("return value of {callee}() has type {got:?}, which violates its signature")]
    InvalidReturnType { callee: String, got: ValueType },
    #[error("return value of {callee}() must be a singleton (size() == 1)")]
    ReturnNotSingleton { callee: String },

    // Semantic: resolution
    #[error("undefined identifier {0}")]
    UndefinedIdentifier(String),
    #[error("member {member} is not defined for class {class}")]
    UnknownMember { class: String, member: String },
    #[error("member {member} of class {class} is read-only")]
    ReadOnlyMember { class: String, member: String },
    #[error("method {method}() is not defined for class {class}")]
    UnknownMethod { class: String, method: String },
    #[error("unknown function {0}()")]
    UnknownFunction(String),

    // Semantic: runtime
    #[error("out-of-range index {0} used with the '[]' operator")]
    IndexOutOfRange(i64),
    #[error("the '{0}' operator requires that either both operands have the same size(), or one operand has size() == 1")]
    SizeMismatch(&'static str),
    #[error("the size() of a logical index operand must match the size() of the indexed operand")]
    LogicalIndexSizeMismatch,
    #[error("operands of the ':' operator must have size() == 1")]
    RangeOperandNotSingleton,
    #[error("a range with more than 100000 entries cannot be constructed")]
    RangeTooWide,
    #[error("the floating-point range operand underflowed its stride")]
    RangeUnderflow,
    #[error("integer divide by zero")]
    IntegerDivisionByZero,
    #[error("condition for {0} statement must be a singleton logical value")]
    ConditionNotSingleton(&'static str),
    #[error("a '{0}' statement encountered outside of any loop")]
    LoopControlOutsideLoop(&'static str),
    #[error("the rvalue of a subscripted assignment must be a singleton or match the size() of the lvalue index set")]
    AssignmentSizeMismatch,
    #[error("lvalue required as the target of an assignment")]
    InvalidAssignmentTarget,
    #[error("the '.' operator requires its right operand to be an identifier")]
    MemberNameNotIdentifier,
    #[error("trait index {0} is out of range for this species")]
    TraitIndexOutOfRange(i64),
    #[error("file operation failed: {0}")]
    FileOperation(String),
    #[error("in function {callee}(): {message}")]
    InFunction { callee: String, message: String },

    // Invariant
    #[error("identifier {0} is a constant and cannot be redefined or modified")]
    ConstantModified(String),
    #[error("identifier {0} is already defined and cannot be redefined as a constant")]
    SymbolRedefined(String),
}

impl ScriptErrorKind {
    /// Attach a source position, producing a reportable error.
    pub fn at(self, span: Span) -> ScriptError {
        ScriptError::new(self, span)
    }

    /// The processing stage used in the `ERROR (...)` prefix.
    pub fn stage(&self) -> &'static str {
        use ScriptErrorKind::*;
        match self {
            UnexpectedCharacter(_) | UnterminatedString | NewlineInString | BadEscape(_)
            | MalformedNumber(_) => "Tokenize",
            UnexpectedToken { .. } | ExpectedToken { .. } | MissingMutationTypeId
            | MissingSubpopulationId | MalformedBlockId(_) => "Parse",
            _ => "Evaluate",
        }
    }
}
