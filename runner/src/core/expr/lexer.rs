//! Tokenizer for the expression mini-language.

use crate::core::expr::error::ExprError;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Number(f64),
    Str(String),
    Ident(String),
    True,
    False,
    Null,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Dot,
    Question,
    Colon,
    Arrow,
    Bang,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Less,
    LessEq,
    Greater,
    GreaterEq,
    Eq,
    NotEq,
    AndAnd,
    OrOr,
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// Byte offset of the token start.
    pub pos: usize,
}

pub fn tokenize(src: &str) -> Result<Vec<Token>, ExprError> {
    let mut lexer = Lexer {
        src,
        chars: src.char_indices().peekable(),
        tokens: Vec::new(),
    };
    lexer.run()?;
    Ok(lexer.tokens)
}

struct Lexer<'src> {
    src: &'src str,
    chars: std::iter::Peekable<std::str::CharIndices<'src>>,
    tokens: Vec<Token>,
}

impl Lexer<'_> {
    fn run(&mut self) -> Result<(), ExprError> {
        while let Some((pos, ch)) = self.chars.next() {
            let kind = match ch {
                c if c.is_whitespace() => continue,
                '(' => TokenKind::LParen,
                ')' => TokenKind::RParen,
                '[' => TokenKind::LBracket,
                ']' => TokenKind::RBracket,
                ',' => TokenKind::Comma,
                '.' => TokenKind::Dot,
                '?' => TokenKind::Question,
                ':' => TokenKind::Colon,
                '+' => TokenKind::Plus,
                '-' => TokenKind::Minus,
                '*' => TokenKind::Star,
                '/' => TokenKind::Slash,
                '%' => TokenKind::Percent,
                '<' => self.with_eq(TokenKind::LessEq, TokenKind::Less),
                '>' => self.with_eq(TokenKind::GreaterEq, TokenKind::Greater),
                '=' => {
                    if self.eat('>') {
                        TokenKind::Arrow
                    } else if self.eat('=') {
                        self.eat('=');
                        TokenKind::Eq
                    } else {
                        return Err(ExprError::syntax(pos, "assignment is not allowed"));
                    }
                }
                '!' => {
                    if self.eat('=') {
                        self.eat('=');
                        TokenKind::NotEq
                    } else {
                        TokenKind::Bang
                    }
                }
                '&' if self.eat('&') => TokenKind::AndAnd,
                '|' if self.eat('|') => TokenKind::OrOr,
                '\'' | '"' => self.string(pos, ch)?,
                c if c.is_ascii_digit() => self.number(pos)?,
                c if c.is_alphabetic() || c == '_' || c == '$' => self.word(pos),
                other => {
                    return Err(ExprError::syntax(pos, format!("unexpected character '{other}'")));
                }
            };
            self.tokens.push(Token { kind, pos });
        }
        self.tokens.push(Token {
            kind: TokenKind::Eof,
            pos: self.src.len(),
        });
        Ok(())
    }

    fn eat(&mut self, expected: char) -> bool {
        self.chars.next_if(|(_, ch)| *ch == expected).is_some()
    }

    fn with_eq(&mut self, with: TokenKind, without: TokenKind) -> TokenKind {
        if self.eat('=') { with } else { without }
    }

    fn string(&mut self, start: usize, quote: char) -> Result<TokenKind, ExprError> {
        let mut out = String::new();
        while let Some((_, ch)) = self.chars.next() {
            match ch {
                c if c == quote => return Ok(TokenKind::Str(out)),
                '\\' => match self.chars.next() {
                    Some((_, 'n')) => out.push('\n'),
                    Some((_, 't')) => out.push('\t'),
                    Some((_, escaped)) => out.push(escaped),
                    None => break,
                },
                c => out.push(c),
            }
        }
        Err(ExprError::syntax(start, "unterminated string literal"))
    }

    fn number(&mut self, start: usize) -> Result<TokenKind, ExprError> {
        let mut end = start + 1;
        while let Some((pos, ch)) = self
            .chars
            .next_if(|(_, ch)| ch.is_ascii_digit() || *ch == '.' || *ch == '_')
        {
            end = pos + ch.len_utf8();
        }
        let text = self.src[start..end].replace('_', "");
        text.parse::<f64>()
            .map(TokenKind::Number)
            .map_err(|_| ExprError::syntax(start, format!("invalid number '{text}'")))
    }

    fn word(&mut self, start: usize) -> TokenKind {
        let mut end = self.src[start..]
            .chars()
            .next()
            .map_or(start, |ch| start + ch.len_utf8());
        while let Some((pos, ch)) = self
            .chars
            .next_if(|(_, ch)| ch.is_alphanumeric() || *ch == '_' || *ch == '$')
        {
            end = pos + ch.len_utf8();
        }
        match &self.src[start..end] {
            "true" => TokenKind::True,
            "false" => TokenKind::False,
            "null" | "undefined" => TokenKind::Null,
            other => TokenKind::Ident(other.to_string()),
        }
    }
}
