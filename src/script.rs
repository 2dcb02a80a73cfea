//! A script and its tokenization/parsing baggage: source text, token
//! stream, and parse root, owned together so the AST's tokens and the
//! stream they were cloned from share one lifetime.

use crate::ast::AstNode;
use crate::error::ScriptResult;
use crate::lexer::{add_optional_semicolon, Lexer};
use crate::parser::Parser;
use crate::token::Token;

pub struct Script {
    source: String,
    /// Offset of this script within an enclosing document, for hosts that
    /// carve blocks out of a larger file.
    start_offset: usize,
    tokens: Vec<Token>,
    root: Option<AstNode>,
}

impl Script {
    pub fn new(source: impl Into<String>) -> Self {
        Self::with_offset(source, 0)
    }

    pub fn with_offset(source: impl Into<String>, start_offset: usize) -> Self {
        Self { source: source.into(), start_offset, tokens: Vec::new(), root: None }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn start_offset(&self) -> usize {
        self.start_offset
    }

    /// Generate the token stream from the source.
    pub fn tokenize(&mut self, keep_nonsignificant: bool) -> ScriptResult<()> {
        let mut lexer = if keep_nonsignificant {
            Lexer::keeping_nonsignificant(&self.source)
        } else {
            Lexer::new(&self.source)
        };
        self.tokens = lexer.tokenize()?;
        Ok(())
    }

    /// Forgive a missing trailing `;` on console input like `6+7`.
    pub fn add_optional_semicolon(&mut self) {
        add_optional_semicolon(&mut self.tokens);
    }

    pub fn parse_sim_file(&mut self) -> ScriptResult<()> {
        self.root = Some(Parser::new(&self.tokens).parse_sim_file()?);
        Ok(())
    }

    pub fn parse_interpreter_block(&mut self) -> ScriptResult<()> {
        self.root = Some(Parser::new(&self.tokens).parse_interpreter_block()?);
        Ok(())
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    pub fn ast(&self) -> Option<&AstNode> {
        self.root.as_ref()
    }

    /// Surrender the parse root, e.g. to split a simulation file into
    /// script blocks that own their subtrees.
    pub fn take_ast(&mut self) -> Option<AstNode> {
        self.root.take()
    }

    pub fn print_tokens(&self) -> String {
        let mut out = String::new();
        for token in &self.tokens {
            out.push_str(&token.to_string());
            out.push('\n');
        }
        out
    }

    pub fn print_ast(&self) -> String {
        self.root.as_ref().map(|root| root.print_tree()).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::TokenKind;

    #[test]
    fn tokenize_then_parse_populates_the_script() {
        let mut script = Script::new("x = 3 + 4;");
        script.tokenize(false).unwrap();
        assert_eq!(script.tokens().last().unwrap().kind, TokenKind::Eof);
        script.parse_interpreter_block().unwrap();
        assert!(script.ast().is_some());
        assert!(!script.print_ast().is_empty());
        assert!(script.print_tokens().contains('='));
    }

    #[test]
    fn optional_semicolon_repairs_console_input() {
        let mut script = Script::new("6+7");
        script.tokenize(false).unwrap();
        assert!(script.parse_interpreter_block().is_err());
        script.add_optional_semicolon();
        script.parse_interpreter_block().unwrap();
    }

    #[test]
    fn take_ast_surrenders_ownership() {
        let mut script = Script::new("1 { 1; }");
        script.tokenize(false).unwrap();
        script.parse_sim_file().unwrap();
        let root = script.take_ast().unwrap();
        assert_eq!(root.kind(), TokenKind::SimFile);
        assert!(script.ast().is_none());
    }

    #[test]
    fn lexical_errors_surface_through_tokenize() {
        let mut script = Script::new("x = @;");
        assert!(script.tokenize(false).is_err());
    }
}
