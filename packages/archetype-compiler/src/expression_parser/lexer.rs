//! Tokenizer for the condition mini-language (§4.2.1).
//!
//! Surface grammar, informally:
//!
//! ```text
//! expr       := or_expr
//! or_expr    := and_expr ( '||' and_expr )*
//! and_expr   := unary ( '&&' unary )*
//! unary      := '!' unary | comparison
//! comparison := operand ( cmp_op operand )?
//! cmp_op     := '==' | '!=' | 'contains' | '>' | '>=' | '<' | '<='
//! operand    := var | string | bool | call | '(' expr ')'
//! var        := '${' ident '}'
//! call       := ('as_int'|'as_list'|'as_string'|'sizeof') '(' expr ')'
//! ```
//!
//! Tokens carry byte offsets into the source so the parser can report
//! locations in error messages. Bare identifiers double as both function
//! names (`sizeof`, `contains`) and integer literals (`3`); the parser
//! decides which based on position.

use crate::chars;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    Var(String),
    String(String),
    Bool(bool),
    Ident(String),
    AndAnd,
    OrOr,
    Bang,
    EqEq,
    NotEq,
    Gt,
    Ge,
    Lt,
    Le,
    LParen,
    RParen,
    Eof,
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub start: usize,
    pub end: usize,
}

impl Token {
    pub fn is_error(&self) -> bool {
        matches!(self.kind, TokenKind::Error(_))
    }

    pub fn is_eof(&self) -> bool {
        matches!(self.kind, TokenKind::Eof)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.kind)
    }
}

pub struct Lexer<'a> {
    source: &'a str,
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Lexer {
            source,
            bytes: source.as_bytes(),
            pos: 0,
        }
    }

    fn peek(&self) -> u8 {
        *self.bytes.get(self.pos).unwrap_or(&0)
    }

    fn peek_at(&self, offset: usize) -> u8 {
        *self.bytes.get(self.pos + offset).unwrap_or(&0)
    }

    fn advance(&mut self) -> u8 {
        let c = self.peek();
        self.pos += 1;
        c
    }

    fn skip_whitespace(&mut self) {
        while chars::is_whitespace(self.peek() as char) {
            self.pos += 1;
        }
    }

    /// Produce the full token stream, ending with a single `Eof` token.
    pub fn tokenize(mut self) -> Vec<Token> {
        let mut tokens = Vec::new();
        loop {
            let tok = self.next_token();
            let done = tok.is_eof();
            tokens.push(tok);
            if done {
                break;
            }
        }
        tokens
    }

    fn next_token(&mut self) -> Token {
        self.skip_whitespace();
        let start = self.pos;
        if self.pos >= self.bytes.len() {
            return Token {
                kind: TokenKind::Eof,
                start,
                end: start,
            };
        }
        let c = self.peek();
        match c {
            b'$' if self.peek_at(1) == b'{' => self.lex_var(start),
            b'\'' => self.lex_string(start),
            b'(' => {
                self.advance();
                self.tok(TokenKind::LParen, start)
            }
            b')' => {
                self.advance();
                self.tok(TokenKind::RParen, start)
            }
            b'!' if self.peek_at(1) == b'=' => {
                self.pos += 2;
                self.tok(TokenKind::NotEq, start)
            }
            b'!' => {
                self.advance();
                self.tok(TokenKind::Bang, start)
            }
            b'=' if self.peek_at(1) == b'=' => {
                self.pos += 2;
                self.tok(TokenKind::EqEq, start)
            }
            b'&' if self.peek_at(1) == b'&' => {
                self.pos += 2;
                self.tok(TokenKind::AndAnd, start)
            }
            b'|' if self.peek_at(1) == b'|' => {
                self.pos += 2;
                self.tok(TokenKind::OrOr, start)
            }
            b'>' if self.peek_at(1) == b'=' => {
                self.pos += 2;
                self.tok(TokenKind::Ge, start)
            }
            b'>' => {
                self.advance();
                self.tok(TokenKind::Gt, start)
            }
            b'<' if self.peek_at(1) == b'=' => {
                self.pos += 2;
                self.tok(TokenKind::Le, start)
            }
            b'<' => {
                self.advance();
                self.tok(TokenKind::Lt, start)
            }
            c if chars::is_ascii_letter(c as char) || c == b'_' || chars::is_digit(c as char) => {
                self.lex_ident(start)
            }
            _ => {
                self.advance();
                Token {
                    kind: TokenKind::Error(format!("unexpected character '{}'", c as char)),
                    start,
                    end: self.pos,
                }
            }
        }
    }

    fn tok(&self, kind: TokenKind, start: usize) -> Token {
        Token {
            kind,
            start,
            end: self.pos,
        }
    }

    fn lex_var(&mut self, start: usize) -> Token {
        self.pos += 2; // consume "${"
        let name_start = self.pos;
        while self.peek() != b'}' && self.pos < self.bytes.len() {
            self.pos += 1;
        }
        if self.peek() != b'}' {
            return Token {
                kind: TokenKind::Error("unterminated '${' variable reference".into()),
                start,
                end: self.pos,
            };
        }
        let name = self.source[name_start..self.pos].to_string();
        self.pos += 1; // consume '}'
        self.tok(TokenKind::Var(name), start)
    }

    fn lex_string(&mut self, start: usize) -> Token {
        self.advance(); // opening quote
        let mut value = String::new();
        loop {
            if self.pos >= self.bytes.len() {
                return Token {
                    kind: TokenKind::Error("unterminated string literal".into()),
                    start,
                    end: self.pos,
                };
            }
            let c = self.advance();
            match c {
                b'\'' => break,
                b'\\' if self.peek() == b'\'' => {
                    value.push('\'');
                    self.advance();
                }
                b'\\' if self.peek() == b'\\' => {
                    value.push('\\');
                    self.advance();
                }
                other => value.push(other as char),
            }
        }
        self.tok(TokenKind::String(value), start)
    }

    /// Lexes both identifiers (`sizeof`, `contains`, `true`) and bare
    /// integer literals (`3`) as `Ident`/`Bool` tokens; the parser treats
    /// a numeric-looking `Ident` as an integer literal.
    fn lex_ident(&mut self, start: usize) -> Token {
        let s = self.pos;
        while chars::is_identifier_part(self.peek() as char) {
            self.pos += 1;
        }
        let word = &self.source[s..self.pos];
        let kind = match word {
            "true" => TokenKind::Bool(true),
            "false" => TokenKind::Bool(false),
            _ => TokenKind::Ident(word.to_string()),
        };
        self.tok(kind, start)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        Lexer::new(src)
            .tokenize()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn tokenizes_variable_reference() {
        assert_eq!(
            kinds("${flavor}"),
            vec![TokenKind::Var("flavor".into()), TokenKind::Eof]
        );
    }

    #[test]
    fn tokenizes_equality_condition() {
        assert_eq!(
            kinds("${flavor}=='se'"),
            vec![
                TokenKind::Var("flavor".into()),
                TokenKind::EqEq,
                TokenKind::String("se".into()),
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn tokenizes_boolean_combinators() {
        assert_eq!(
            kinds("${a} && !${b}"),
            vec![
                TokenKind::Var("a".into()),
                TokenKind::AndAnd,
                TokenKind::Bang,
                TokenKind::Var("b".into()),
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn tokenizes_contains_and_function_call() {
        assert_eq!(
            kinds("sizeof(${list}) >= 1"),
            vec![
                TokenKind::Ident("sizeof".into()),
                TokenKind::LParen,
                TokenKind::Var("list".into()),
                TokenKind::RParen,
                TokenKind::Ge,
                TokenKind::Ident("1".into()),
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn reports_unterminated_string() {
        let toks = Lexer::new("'abc").tokenize();
        assert!(toks[0].is_error());
    }
}
