use std::fmt::Write as _;

use crate::token::{Token, TokenKind};
use crate::value::Value;

/// A node in the parse tree.
///
/// Nodes own their children and their token unconditionally; tokens cloned
/// out of the stream and parser-synthesized virtual tokens get identical
/// treatment, so nothing leaks and the subtree is a strict tree by
/// construction. `constant` caches a pre-evaluated literal value for
/// number and string tokens so the evaluator skips re-parsing lexemes.
#[derive(Debug)]
pub struct AstNode {
    pub token: Token,
    pub children: Vec<AstNode>,
    pub constant: Option<Value>,
}

impl AstNode {
    pub fn new(token: Token) -> Self {
        Self { token, children: Vec::new(), constant: None }
    }

    pub fn with_child(token: Token, child: AstNode) -> Self {
        Self { token, children: vec![child], constant: None }
    }

    pub fn add_child(&mut self, child: AstNode) {
        self.children.push(child);
    }

    /// Fix up a virtual container token so its span covers the source
    /// range of the children it summarizes.
    pub fn replace_token(&mut self, token: Token) {
        self.token = token;
    }

    pub fn kind(&self) -> TokenKind {
        self.token.kind
    }

    pub fn print_tree(&self) -> String {
        let mut out = String::new();
        self.print_with_indent(&mut out, 0);
        out
    }

    fn print_with_indent(&self, out: &mut String, indent: usize) {
        let _ = writeln!(out, "{}{}", "  ".repeat(indent), self.token);
        for child in &self.children {
            child.print_with_indent(out, indent + 1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::Span;

    fn ident(name: &str) -> AstNode {
        AstNode::new(Token::new(TokenKind::Identifier, name, Span::default()))
    }

    #[test]
    fn nodes_own_their_children() {
        let mut plus = AstNode::new(Token::new(TokenKind::Plus, "+", Span::new(2, 3)));
        plus.add_child(ident("a"));
        plus.add_child(ident("b"));
        assert_eq!(plus.children.len(), 2);
        assert_eq!(plus.children[0].token.lexeme, "a");
    }

    #[test]
    fn replace_token_rewrites_virtual_spans() {
        let mut block = AstNode::new(Token::virtual_token(TokenKind::InterpreterBlock));
        block.add_child(ident("x"));
        block.replace_token(Token::new(TokenKind::InterpreterBlock, "", Span::new(0, 10)));
        assert_eq!(block.token.span, Span::new(0, 10));
        assert_eq!(block.children.len(), 1);
    }

    #[test]
    fn tree_printing_indents_children() {
        let mut plus = AstNode::new(Token::new(TokenKind::Plus, "+", Span::default()));
        plus.add_child(ident("a"));
        plus.add_child(ident("b"));
        let printed = plus.print_tree();
        assert_eq!(printed, "+\n  a\n  b\n");
    }
}
