//! Core of a forward-time, individual-based population genetic simulator:
//! the embedded scripting language (tokenizer, parser, interpreter, typed
//! vector values, symbol table, signatures and host-object dispatch), the
//! mutation data model, and the sparse interaction array.
//!
//! The tick scheduler and demography layers are collaborators: they call
//! in here to evaluate scripts and to build and query interaction data.

use std::sync::atomic::{AtomicBool, Ordering};

/// Hard cap on the number of entries the `:` operator and `seq()` will
/// construct.
pub const MAX_RANGE_LENGTH: usize = 100_000;

// Diagnostic toggles, consulted by the lexer, parser, and interpreter
// respectively. Output goes through `tracing` at TRACE level.
static LOG_TOKENS: AtomicBool = AtomicBool::new(false);
static LOG_AST: AtomicBool = AtomicBool::new(false);
static LOG_EVALUATION: AtomicBool = AtomicBool::new(false);

pub fn set_log_tokens(on: bool) {
    LOG_TOKENS.store(on, Ordering::Relaxed);
}

pub fn log_tokens() -> bool {
    LOG_TOKENS.load(Ordering::Relaxed)
}

pub fn set_log_ast(on: bool) {
    LOG_AST.store(on, Ordering::Relaxed);
}

pub fn log_ast() -> bool {
    LOG_AST.load(Ordering::Relaxed)
}

pub fn set_log_evaluation(on: bool) {
    LOG_EVALUATION.store(on, Ordering::Relaxed);
}

pub fn log_evaluation() -> bool {
    LOG_EVALUATION.load(Ordering::Relaxed)
}

pub mod ast;
pub mod block;
pub mod error;
pub mod functions;
pub mod interpreter;
pub mod lexer;
pub mod mutation;
pub mod object;
pub mod parser;
pub mod paths;
pub mod repl;
pub mod rng;
pub mod script;
pub mod signature;
pub mod sparse;
pub mod symbols;
pub mod token;
pub mod value;

pub use ast::AstNode;
pub use block::{BlockKind, ScriptBlock, UseSummary};
pub use error::{ScriptError, ScriptErrorKind, ScriptResult};
pub use functions::{standard_registry, FunctionRegistry};
pub use interpreter::Interpreter;
pub use lexer::Lexer;
pub use mutation::{Dominance, Mutation, MutationIndex, MutationPool, MutationState};
pub use object::{ObjectElement, ObjectRef, ObjectValue};
pub use parser::Parser;
pub use rng::SimRng;
pub use script::Script;
pub use signature::Signature;
pub use sparse::{PerRowSparseArray, SparseArray};
pub use symbols::SymbolTable;
pub use token::{Span, Token, TokenKind};
pub use value::{Value, ValueType};
