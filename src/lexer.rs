//! Single-pass tokenizer for script source text.

use crate::error::{ScriptErrorKind, ScriptResult};
use crate::token::{Span, Token, TokenKind};

pub struct Lexer<'a> {
    source: &'a str,
    bytes: &'a [u8],
    pos: usize,
    /// Retain whitespace and comment tokens instead of discarding them;
    /// used by tooling that needs full-fidelity streams.
    keep_nonsignificant: bool,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            bytes: source.as_bytes(),
            pos: 0,
            keep_nonsignificant: false,
        }
    }

    pub fn keeping_nonsignificant(source: &'a str) -> Self {
        let mut lexer = Self::new(source);
        lexer.keep_nonsignificant = true;
        lexer
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    /// Tokenize the whole source, appending an explicit EOF token so that
    /// parsing never walks off the end.
    pub fn tokenize(&mut self) -> ScriptResult<Vec<Token>> {
        let mut tokens = Vec::new();

        while self.pos < self.bytes.len() {
            let token = self.next_token()?;
            let significant =
                !matches!(token.kind, TokenKind::Whitespace | TokenKind::Comment);
            if significant || self.keep_nonsignificant {
                if crate::log_tokens() {
                    tracing::trace!(target: "genic::lexer", token = %token, span = ?token.span);
                }
                tokens.push(token);
            }
        }

        tokens.push(Token::new(
            TokenKind::Eof,
            "",
            Span::new(self.bytes.len(), self.bytes.len()),
        ));
        Ok(tokens)
    }

    fn next_token(&mut self) -> ScriptResult<Token> {
        let start = self.pos;
        let c = self.bytes[self.pos];

        let single = |kind: TokenKind| Some((kind, 1));
        let simple: Option<(TokenKind, usize)> = match c {
            b' ' | b'\t' | b'\n' | b'\r' => {
                let mut len = 1;
                while matches!(self.peek_at(len), Some(b' ' | b'\t' | b'\n' | b'\r')) {
                    len += 1;
                }
                Some((TokenKind::Whitespace, len))
            }
            b';' => single(TokenKind::Semicolon),
            b':' => single(TokenKind::Colon),
            b',' => single(TokenKind::Comma),
            b'{' => single(TokenKind::LBrace),
            b'}' => single(TokenKind::RBrace),
            b'(' => single(TokenKind::LParen),
            b')' => single(TokenKind::RParen),
            b'[' => single(TokenKind::LBracket),
            b']' => single(TokenKind::RBracket),
            b'.' => single(TokenKind::Dot),
            b'+' => single(TokenKind::Plus),
            b'-' => single(TokenKind::Minus),
            b'*' => single(TokenKind::Mult),
            b'%' => single(TokenKind::Mod),
            b'^' => single(TokenKind::Exp),
            b'&' => single(TokenKind::And),
            b'|' => single(TokenKind::Or),
            b'/' => {
                if self.peek_at(1) == Some(b'/') {
                    let mut len = 2;
                    while !matches!(self.peek_at(len), None | Some(b'\n')) {
                        len += 1;
                    }
                    Some((TokenKind::Comment, len))
                } else {
                    single(TokenKind::Div)
                }
            }
            b'=' => {
                if self.peek_at(1) == Some(b'=') {
                    Some((TokenKind::Eq, 2))
                } else {
                    single(TokenKind::Assign)
                }
            }
            b'<' => {
                if self.peek_at(1) == Some(b'=') {
                    Some((TokenKind::LtEq, 2))
                } else {
                    single(TokenKind::Lt)
                }
            }
            b'>' => {
                if self.peek_at(1) == Some(b'=') {
                    Some((TokenKind::GtEq, 2))
                } else {
                    single(TokenKind::Gt)
                }
            }
            b'!' => {
                if self.peek_at(1) == Some(b'=') {
                    Some((TokenKind::NotEq, 2))
                } else {
                    single(TokenKind::Not)
                }
            }
            _ => None,
        };

        if let Some((kind, len)) = simple {
            self.pos += len;
            let span = Span::new(start, self.pos);
            return Ok(Token::new(kind, &self.source[start..self.pos], span));
        }

        if c.is_ascii_digit() {
            return self.lex_number();
        }
        if c == b'"' {
            return self.lex_string();
        }
        if c.is_ascii_alphabetic() || c == b'_' {
            return self.lex_identifier();
        }

        Err(ScriptErrorKind::UnexpectedCharacter(self.source[start..].chars().next().unwrap())
            .at(Span::new(start, start + 1)))
    }

    /// Numeric literal: digits, optional '.' plus digits, optional exponent
    /// with optional sign. Whether the token becomes an integer or a float
    /// is the interpreter's decision when it reads the lexeme.
    fn lex_number(&mut self) -> ScriptResult<Token> {
        let start = self.pos;

        while matches!(self.peek(), Some(b) if b.is_ascii_digit()) {
            self.pos += 1;
        }
        if self.peek() == Some(b'.') {
            self.pos += 1;
            while matches!(self.peek(), Some(b) if b.is_ascii_digit()) {
                self.pos += 1;
            }
        }
        if matches!(self.peek(), Some(b'e' | b'E')) {
            self.pos += 1;
            if matches!(self.peek(), Some(b'+' | b'-')) {
                self.pos += 1;
            }
            if !matches!(self.peek(), Some(b) if b.is_ascii_digit()) {
                let lexeme = &self.source[start..self.pos];
                return Err(ScriptErrorKind::MalformedNumber(lexeme.to_string())
                    .at(Span::new(start, self.pos)));
            }
            while matches!(self.peek(), Some(b) if b.is_ascii_digit()) {
                self.pos += 1;
            }
        }

        let span = Span::new(start, self.pos);
        Ok(Token::new(TokenKind::Number, &self.source[start..self.pos], span))
    }

    fn lex_string(&mut self) -> ScriptResult<Token> {
        let start = self.pos;
        self.pos += 1; // opening quote
        let mut value = String::new();

        loop {
            match self.peek() {
                None => {
                    return Err(
                        ScriptErrorKind::UnterminatedString.at(Span::new(start, self.pos))
                    )
                }
                Some(b'\n') => {
                    return Err(
                        ScriptErrorKind::NewlineInString.at(Span::new(self.pos, self.pos + 1))
                    )
                }
                Some(b'"') => {
                    self.pos += 1;
                    break;
                }
                Some(b'\\') => {
                    let escaped = self.peek_at(1).ok_or_else(|| {
                        ScriptErrorKind::UnterminatedString.at(Span::new(start, self.pos + 1))
                    })?;
                    match escaped {
                        b't' => value.push('\t'),
                        b'r' => value.push('\r'),
                        b'n' => value.push('\n'),
                        b'"' => value.push('"'),
                        b'\\' => value.push('\\'),
                        other => {
                            return Err(ScriptErrorKind::BadEscape(other as char)
                                .at(Span::new(self.pos, self.pos + 2)))
                        }
                    }
                    self.pos += 2;
                }
                Some(_) => {
                    // multi-byte UTF-8 sequences pass through untouched
                    let ch = self.source[self.pos..].chars().next().unwrap();
                    value.push(ch);
                    self.pos += ch.len_utf8();
                }
            }
        }

        Ok(Token::new(TokenKind::Str, value, Span::new(start, self.pos)))
    }

    fn lex_identifier(&mut self) -> ScriptResult<Token> {
        let start = self.pos;
        while matches!(self.peek(), Some(b) if b.is_ascii_alphanumeric() || b == b'_') {
            self.pos += 1;
        }
        let lexeme = &self.source[start..self.pos];
        let kind = TokenKind::keyword(lexeme).unwrap_or(TokenKind::Identifier);
        Ok(Token::new(kind, lexeme, Span::new(start, self.pos)))
    }
}

/// Forgive a missing terminator on interactive input like `6+7`: if the
/// last significant token is neither `}` nor `;`, insert a synthetic `;`
/// immediately before EOF.
pub fn add_optional_semicolon(tokens: &mut Vec<Token>) {
    let mut idx = tokens.len();
    while idx > 0 {
        idx -= 1;
        match tokens[idx].kind {
            TokenKind::Eof | TokenKind::Whitespace | TokenKind::Comment => continue,
            TokenKind::Semicolon | TokenKind::RBrace => return,
            _ => {
                let at = tokens[idx].span.end;
                let insert_at = idx + 1;
                tokens.insert(
                    insert_at,
                    Token::new(TokenKind::Semicolon, ";", Span::new(at, at)),
                );
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        Lexer::new(source)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn empty_input_yields_only_eof() {
        assert_eq!(kinds(""), vec![TokenKind::Eof]);
    }

    #[test]
    fn whitespace_and_comments_are_discarded() {
        assert_eq!(
            kinds("x = 3; // trailing comment\n"),
            vec![
                TokenKind::Identifier,
                TokenKind::Assign,
                TokenKind::Number,
                TokenKind::Semicolon,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn nonsignificant_tokens_can_be_retained() {
        let tokens = Lexer::keeping_nonsignificant("x //c").tokenize().unwrap();
        let kinds: Vec<_> = tokens.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::Identifier,
                TokenKind::Whitespace,
                TokenKind::Comment,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn two_character_operators_need_one_char_lookahead() {
        assert_eq!(
            kinds("== <= >= != = < > !"),
            vec![
                TokenKind::Eq,
                TokenKind::LtEq,
                TokenKind::GtEq,
                TokenKind::NotEq,
                TokenKind::Assign,
                TokenKind::Lt,
                TokenKind::Gt,
                TokenKind::Not,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn numeric_literals_cover_the_grammar() {
        for src in ["3", "3.", "3.25", "3e2", "3.1e-2", "7E+10"] {
            let tokens = Lexer::new(src).tokenize().unwrap();
            assert_eq!(tokens[0].kind, TokenKind::Number, "source {}", src);
            assert_eq!(tokens[0].lexeme, src);
        }
    }

    #[test]
    fn exponent_without_digits_is_malformed() {
        assert!(Lexer::new("3e;").tokenize().is_err());
        assert!(Lexer::new("3e+;").tokenize().is_err());
    }

    #[test]
    fn identifiers_rewrite_to_keywords() {
        let tokens = Lexer::new("while whilex _x").tokenize().unwrap();
        assert_eq!(tokens[0].kind, TokenKind::While);
        assert_eq!(tokens[1].kind, TokenKind::Identifier);
        assert_eq!(tokens[2].kind, TokenKind::Identifier);
    }

    #[test]
    fn string_escapes_are_decoded() {
        let tokens = Lexer::new(r#""a\tb\n\"q\"\\";"#).tokenize().unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Str);
        assert_eq!(tokens[0].lexeme, "a\tb\n\"q\"\\");
    }

    #[test]
    fn string_errors_are_fatal() {
        assert!(Lexer::new("\"abc").tokenize().is_err());
        assert!(Lexer::new("\"ab\ncd\"").tokenize().is_err());
        assert!(Lexer::new(r#""a\qb""#).tokenize().is_err());
    }

    #[test]
    fn unrecognized_characters_report_their_position() {
        let err = Lexer::new("x = $;").tokenize().unwrap_err();
        assert_eq!(err.span.start, 4);
    }

    #[test]
    fn optional_semicolon_is_inserted_only_when_needed() {
        let mut tokens = Lexer::new("6+7").tokenize().unwrap();
        add_optional_semicolon(&mut tokens);
        let kinds: Vec<_> = tokens.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::Number,
                TokenKind::Plus,
                TokenKind::Number,
                TokenKind::Semicolon,
                TokenKind::Eof
            ]
        );

        let mut terminated = Lexer::new("x = 1;").tokenize().unwrap();
        let before = terminated.len();
        add_optional_semicolon(&mut terminated);
        assert_eq!(terminated.len(), before);

        let mut braced = Lexer::new("if (T) { 1; }").tokenize().unwrap();
        let before = braced.len();
        add_optional_semicolon(&mut braced);
        assert_eq!(braced.len(), before);
    }

    #[test]
    fn token_spans_index_the_source() {
        let tokens = Lexer::new("ab + cd").tokenize().unwrap();
        assert_eq!(tokens[0].span, Span::new(0, 2));
        assert_eq!(tokens[1].span, Span::new(3, 4));
        assert_eq!(tokens[2].span, Span::new(5, 7));
    }

    // Lexical round-trip: tokenizing a token's printed lexeme produces a
    // single token of the same kind and lexeme.
    #[test]
    fn lexical_round_trip_per_token_kind() {
        let samples = [
            ";", ":", ",", "{", "}", "(", ")", "[", "]", ".", "+", "-", "%", "*", "/", "^",
            "&", "|", "=", "==", "!=", "<", "<=", ">", ">=", "!", "42", "3.5", "name", "if",
            "else", "do", "while", "for", "in", "next", "break", "return", "fitness",
            "mateChoice", "modifyChild",
        ];
        for src in samples {
            let first = Lexer::new(src).tokenize().unwrap();
            assert_eq!(first.len(), 2, "source {}", src);
            let reparsed = Lexer::new(&first[0].lexeme).tokenize().unwrap();
            assert_eq!(reparsed[0].kind, first[0].kind, "source {}", src);
            assert_eq!(reparsed[0].lexeme, first[0].lexeme, "source {}", src);
        }
    }
}
