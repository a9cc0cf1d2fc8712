//! Lexical analysis: source text to a token stream.
//!
//! Whitespace and comment tokens are produced (not discarded) so the full
//! source can be reconstructed from the token stream; the parser is
//! responsible for skipping trivia.

use crate::ast::{Location, Position, Token, TokenKind};
use crate::compiler::error::CompileError;
use crate::debug;

const SYMBOL_EXTRA: &str = "#!$%&*+-./:<=>?@^_~";

fn is_symbol_char(c: char) -> bool {
    c.is_alphanumeric() || SYMBOL_EXTRA.contains(c)
}

fn is_delimiter(c: char) -> bool {
    c.is_whitespace() || "()';\"".contains(c)
}

struct Lexer<'s> {
    chars: Vec<char>,
    index: usize,
    pos: Position,
}

impl<'s> Lexer<'s> {
    fn new(source: &'s str) -> Self {
        Self {
            chars: source.chars().collect(),
            index: 0,
            pos: Position::start(),
        }
    }

    fn current(&self) -> Option<char> {
        self.chars.get(self.index).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.current()?;
        self.index += 1;
        self.pos.advance(c);
        Some(c)
    }

    fn single(&mut self, kind: TokenKind) -> Token {
        let start = self.pos;
        let c = self.advance().expect("single() called at EOF");
        Token::new(kind, c.to_string(), Location {
            start,
            end: self.pos,
        })
    }

    fn whitespace(&mut self) -> Token {
        let start = self.pos;
        let mut lexeme = String::new();
        while let Some(c) = self.current() {
            if !c.is_whitespace() {
                break;
            }
            lexeme.push(c);
            self.advance();
        }
        Token::new(TokenKind::Whitespace, lexeme, Location {
            start,
            end: self.pos,
        })
    }

    fn comment(&mut self) -> Token {
        let start = self.pos;
        let mut lexeme = String::new();
        while let Some(c) = self.current() {
            if c == '\n' {
                break;
            }
            lexeme.push(c);
            self.advance();
        }
        Token::new(TokenKind::Comment, lexeme, Location {
            start,
            end: self.pos,
        })
    }

    fn string(&mut self) -> Token {
        let start = self.pos;
        let mut lexeme = String::new();
        lexeme.push(self.advance().unwrap()); // opening quote
        loop {
            match self.current() {
                None => {
                    return Token::new(
                        TokenKind::Error,
                        "Unterminated string literal",
                        Location {
                            start,
                            end: self.pos,
                        },
                    );
                }
                Some('"') => {
                    lexeme.push(self.advance().unwrap());
                    break;
                }
                Some(c) => {
                    lexeme.push(c);
                    self.advance();
                }
            }
        }
        Token::new(TokenKind::String, lexeme, Location {
            start,
            end: self.pos,
        })
    }

    fn symbol_or_number(&mut self) -> Token {
        let start = self.pos;
        let mut lexeme = String::new();
        while let Some(c) = self.current() {
            if is_delimiter(c) {
                break;
            }
            if !c.is_ascii_digit() && c != '+' && c != '-' && !is_symbol_char(c) {
                break;
            }
            lexeme.push(c);
            self.advance();
        }

        let location = Location {
            start,
            end: self.pos,
        };

        let is_number = lexeme != "+"
            && lexeme != "-"
            && lexeme.parse::<f64>().is_ok()
            && lexeme.chars().any(|c| c.is_ascii_digit());

        if is_number {
            Token::new(TokenKind::Number, lexeme, location)
        } else {
            Token::new(TokenKind::Symbol, lexeme, location)
        }
    }

    fn error(&mut self) -> Token {
        let start = self.pos;
        let c = self.advance().unwrap();
        Token::new(
            TokenKind::Error,
            c.to_string(),
            Location {
                start,
                end: self.pos,
            },
        )
    }

    fn next_token(&mut self) -> Token {
        match self.current() {
            None => {
                let p = self.pos;
                Token::new(TokenKind::Eof, "", Location::single(p))
            }
            Some(c) if c.is_whitespace() => self.whitespace(),
            Some(';') => self.comment(),
            Some('(') => self.single(TokenKind::LParen),
            Some(')') => self.single(TokenKind::RParen),
            Some('\'') => self.single(TokenKind::Quote),
            Some('"') => self.string(),
            Some(c) if c.is_ascii_digit() || c == '+' || c == '-' || is_symbol_char(c) => {
                self.symbol_or_number()
            }
            Some(_) => self.error(),
        }
    }
}

/// Tokenizes an entire source string, returning every token including
/// trivia and the final `Eof`. Illegal characters and unterminated
/// strings surface as `TokenKind::Error` tokens rather than aborting the
/// scan; lexing always runs to completion.
pub fn tokenize(source: &str) -> Result<Vec<Token>, CompileError> {
    let timer = debug::PerfTimer::new("lex");
    let mut lexer = Lexer::new(source);
    let mut tokens = Vec::new();

    loop {
        let tok = lexer.next_token();
        let is_eof = tok.kind == TokenKind::Eof;
        if tok.kind == TokenKind::Error {
            debug::log_lexer(&format!(
                "error at [{}]: {}",
                tok.location.start, tok.lexeme
            ));
        }
        tokens.push(tok);
        if is_eof {
            break;
        }
    }

    debug::log_lexer(&format!("produced {} tokens", tokens.len()));
    timer.finish();
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        tokenize(src)
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn tokenizes_simple_call() {
        assert_eq!(
            kinds("(+ 1 2)"),
            vec![
                TokenKind::LParen,
                TokenKind::Symbol,
                TokenKind::Whitespace,
                TokenKind::Number,
                TokenKind::Whitespace,
                TokenKind::Number,
                TokenKind::RParen,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn negative_number_vs_minus_symbol() {
        let toks = tokenize("-5 -").unwrap();
        assert_eq!(toks[0].kind, TokenKind::Number);
        assert_eq!(toks[0].lexeme, "-5");
        assert_eq!(toks[2].kind, TokenKind::Symbol);
        assert_eq!(toks[2].lexeme, "-");
    }

    #[test]
    fn float_literal() {
        let toks = tokenize("3.14").unwrap();
        assert_eq!(toks[0].kind, TokenKind::Number);
    }

    #[test]
    fn comment_is_preserved_as_trivia() {
        let toks = tokenize("; hello\n42").unwrap();
        assert_eq!(toks[0].kind, TokenKind::Comment);
        assert_eq!(toks[0].lexeme, "; hello");
    }

    #[test]
    fn unterminated_string_is_error() {
        let toks = tokenize("\"abc").unwrap();
        assert_eq!(toks[0].kind, TokenKind::Error);
    }

    #[test]
    fn illegal_character_is_error() {
        let toks = tokenize("[").unwrap();
        assert_eq!(toks[0].kind, TokenKind::Error);
    }

    #[test]
    fn quote_and_parens_are_single_char() {
        let toks = tokenize("'(a)").unwrap();
        assert_eq!(
            toks.iter().map(|t| t.kind).collect::<Vec<_>>(),
            vec![
                TokenKind::Quote,
                TokenKind::LParen,
                TokenKind::Symbol,
                TokenKind::RParen,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn tracks_line_and_column_across_newlines() {
        let toks = tokenize("(a\n  b)").unwrap();
        let b = toks.iter().find(|t| t.lexeme == "b").unwrap();
        assert_eq!(b.location.start.line, 2);
        assert_eq!(b.location.start.col, 3);
    }
}
