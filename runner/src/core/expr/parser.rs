//! Recursive-descent parser for the expression mini-language.
//!
//! Precedence (lowest -> highest):
//! 1. `cond ? a : b`
//! 2. `||`
//! 3. `&&`
//! 4. `===`, `!==` (`==`/`!=` are synonyms)
//! 5. `<`, `<=`, `>`, `>=`
//! 6. `+`, `-`
//! 7. `*`, `/`, `%`
//! 8. unary `!`, `-`
//! 9. `.name`, `.method(args)`, `[index]`
//!
//! The only callable function is `get(path)`.

use serde_json::Value;

use crate::core::expr::ast::{BinOp, Expr, UnaryOp};
use crate::core::expr::error::ExprError;
use crate::core::expr::lexer::{Token, TokenKind};

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
    max_depth: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>, max_depth: usize) -> Self {
        Self {
            tokens,
            pos: 0,
            depth: 0,
            max_depth,
        }
    }

    /// Parse a complete expression; trailing tokens are an error.
    pub fn parse(mut self) -> Result<Expr, ExprError> {
        let expr = self.parse_expression()?;
        match self.peek() {
            TokenKind::Eof => Ok(expr),
            other => Err(ExprError::syntax(
                self.current_pos(),
                format!("unexpected token {other:?}"),
            )),
        }
    }

    fn parse_expression(&mut self) -> Result<Expr, ExprError> {
        self.enter()?;
        let result = self.parse_conditional();
        self.depth -= 1;
        result
    }

    fn enter(&mut self) -> Result<(), ExprError> {
        self.depth += 1;
        if self.depth > self.max_depth {
            self.depth -= 1;
            return Err(ExprError::TooDeep(self.max_depth));
        }
        Ok(())
    }

    fn parse_conditional(&mut self) -> Result<Expr, ExprError> {
        let test = self.parse_binary(0)?;
        if !self.eat(&TokenKind::Question) {
            return Ok(test);
        }
        let then = self.parse_expression()?;
        self.expect(&TokenKind::Colon, "':' in conditional")?;
        let otherwise = self.parse_expression()?;
        Ok(Expr::Conditional {
            test: Box::new(test),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        })
    }

    /// Precedence climbing over the binary operator levels.
    fn parse_binary(&mut self, level: usize) -> Result<Expr, ExprError> {
        const LEVELS: &[&[BinOp]] = &[
            &[BinOp::Or],
            &[BinOp::And],
            &[BinOp::Eq, BinOp::NotEq],
            &[BinOp::Less, BinOp::LessEq, BinOp::Greater, BinOp::GreaterEq],
            &[BinOp::Add, BinOp::Sub],
            &[BinOp::Mul, BinOp::Div, BinOp::Mod],
        ];
        let Some(ops) = LEVELS.get(level) else {
            return self.parse_unary();
        };
        let base = self.depth;
        let result = self.fold_binary(ops, level);
        self.depth = base;
        result
    }

    /// Left-associative fold; every operator nests the tree one level deeper.
    fn fold_binary(&mut self, ops: &[BinOp], level: usize) -> Result<Expr, ExprError> {
        let mut left = self.parse_binary(level + 1)?;
        while let Some(op) = binary_op(self.peek()).filter(|op| ops.contains(op)) {
            self.advance();
            self.enter()?;
            let right = self.parse_binary(level + 1)?;
            left = Expr::Binary {
                left: Box::new(left),
                op,
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, ExprError> {
        let op = match self.peek() {
            TokenKind::Bang => UnaryOp::Not,
            TokenKind::Minus => UnaryOp::Neg,
            _ => return self.parse_postfix(),
        };
        self.advance();
        self.enter()?;
        let operand = self.parse_unary();
        self.depth -= 1;
        Ok(Expr::Unary {
            op,
            operand: Box::new(operand?),
        })
    }

    fn parse_postfix(&mut self) -> Result<Expr, ExprError> {
        let base = self.depth;
        let result = self.fold_postfix();
        self.depth = base;
        result
    }

    /// Suffix chain; each `.name`, `.method()` or `[index]` counts as one level.
    fn fold_postfix(&mut self) -> Result<Expr, ExprError> {
        let mut expr = self.parse_primary()?;
        loop {
            if matches!(self.peek(), TokenKind::Dot | TokenKind::LBracket) {
                self.enter()?;
            }
            if self.eat(&TokenKind::Dot) {
                let name = self.expect_ident("property name after '.'")?;
                if self.eat(&TokenKind::LParen) {
                    let args = self.parse_args()?;
                    expr = Expr::Method {
                        object: Box::new(expr),
                        name,
                        args,
                    };
                } else {
                    expr = Expr::Member {
                        object: Box::new(expr),
                        property: name,
                    };
                }
            } else if self.eat(&TokenKind::LBracket) {
                let index = self.parse_expression()?;
                self.expect(&TokenKind::RBracket, "']'")?;
                expr = Expr::Index {
                    object: Box::new(expr),
                    index: Box::new(index),
                };
            } else {
                return Ok(expr);
            }
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, ExprError> {
        let pos = self.current_pos();
        let token = self.advance();
        match token {
            TokenKind::Number(n) => Ok(Expr::Literal(number(n))),
            TokenKind::Str(s) => Ok(Expr::Literal(Value::String(s))),
            TokenKind::True => Ok(Expr::Literal(Value::Bool(true))),
            TokenKind::False => Ok(Expr::Literal(Value::Bool(false))),
            TokenKind::Null => Ok(Expr::Literal(Value::Null)),
            TokenKind::LBracket => {
                let mut items = Vec::new();
                if !self.eat(&TokenKind::RBracket) {
                    loop {
                        items.push(self.parse_expression()?);
                        if self.eat(&TokenKind::RBracket) {
                            break;
                        }
                        self.expect(&TokenKind::Comma, "',' or ']' in array")?;
                    }
                }
                Ok(Expr::Array(items))
            }
            TokenKind::LParen => {
                if let (TokenKind::Ident(param), TokenKind::RParen, TokenKind::Arrow) =
                    (self.peek_at(0), self.peek_at(1), self.peek_at(2))
                {
                    let param = param.clone();
                    self.pos += 3;
                    return self.parse_lambda_body(param);
                }
                let inner = self.parse_expression()?;
                self.expect(&TokenKind::RParen, "')'")?;
                Ok(inner)
            }
            TokenKind::Ident(name) => {
                if self.eat(&TokenKind::Arrow) {
                    return self.parse_lambda_body(name);
                }
                if self.eat(&TokenKind::LParen) {
                    if name != "get" {
                        return Err(ExprError::UnknownFunction(name));
                    }
                    let mut args = self.parse_args()?;
                    if args.len() != 1 {
                        return Err(ExprError::syntax(pos, "get(path) takes exactly one argument"));
                    }
                    return Ok(Expr::Get(Box::new(args.remove(0))));
                }
                Ok(Expr::Ident(name))
            }
            other => Err(ExprError::syntax(pos, format!("unexpected token {other:?}"))),
        }
    }

    fn parse_lambda_body(&mut self, param: String) -> Result<Expr, ExprError> {
        let body = self.parse_expression()?;
        Ok(Expr::Lambda {
            param,
            body: Box::new(body),
        })
    }

    /// Arguments after an already consumed `(`.
    fn parse_args(&mut self) -> Result<Vec<Expr>, ExprError> {
        let mut args = Vec::new();
        if self.eat(&TokenKind::RParen) {
            return Ok(args);
        }
        loop {
            args.push(self.parse_expression()?);
            if self.eat(&TokenKind::RParen) {
                return Ok(args);
            }
            self.expect(&TokenKind::Comma, "',' or ')' in arguments")?;
        }
    }

    fn peek(&self) -> &TokenKind {
        self.peek_at(0)
    }

    fn peek_at(&self, offset: usize) -> &TokenKind {
        self.tokens
            .get(self.pos + offset)
            .or_else(|| self.tokens.last())
            .map_or(&TokenKind::Eof, |token| &token.kind)
    }

    fn current_pos(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map_or(0, |token| token.pos)
    }

    fn advance(&mut self) -> TokenKind {
        let kind = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        kind
    }

    fn eat(&mut self, expected: &TokenKind) -> bool {
        if self.peek() == expected {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: &TokenKind, what: &str) -> Result<(), ExprError> {
        if self.eat(expected) {
            Ok(())
        } else {
            Err(ExprError::syntax(self.current_pos(), format!("expected {what}")))
        }
    }

    fn expect_ident(&mut self, what: &str) -> Result<String, ExprError> {
        let pos = self.current_pos();
        match self.advance() {
            TokenKind::Ident(name) => Ok(name),
            _ => Err(ExprError::syntax(pos, format!("expected {what}"))),
        }
    }
}

fn binary_op(kind: &TokenKind) -> Option<BinOp> {
    Some(match kind {
        TokenKind::OrOr => BinOp::Or,
        TokenKind::AndAnd => BinOp::And,
        TokenKind::Eq => BinOp::Eq,
        TokenKind::NotEq => BinOp::NotEq,
        TokenKind::Less => BinOp::Less,
        TokenKind::LessEq => BinOp::LessEq,
        TokenKind::Greater => BinOp::Greater,
        TokenKind::GreaterEq => BinOp::GreaterEq,
        TokenKind::Plus => BinOp::Add,
        TokenKind::Minus => BinOp::Sub,
        TokenKind::Star => BinOp::Mul,
        TokenKind::Slash => BinOp::Div,
        TokenKind::Percent => BinOp::Mod,
        _ => return None,
    })
}

/// Numbers are stored as integers when they have no fractional part.
pub fn number(n: f64) -> Value {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 9.0e15 {
        Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n).map_or(Value::Null, Value::Number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::expr::lexer::tokenize;

    fn parse(src: &str) -> Result<Expr, ExprError> {
        Parser::new(tokenize(src).expect("tokens"), 16).parse()
    }

    #[test]
    fn and_binds_tighter_than_or() {
        let expr = parse("a || b && c").expect("expr");
        let Expr::Binary { op, right, .. } = expr else {
            panic!("expected binary");
        };
        assert_eq!(op, BinOp::Or);
        assert!(matches!(*right, Expr::Binary { op: BinOp::And, .. }));
    }

    #[test]
    fn get_is_the_only_function() {
        assert!(matches!(parse("get('vars.x')"), Ok(Expr::Get(_))));
        assert_eq!(
            parse("require('fs')"),
            Err(ExprError::UnknownFunction("require".to_string()))
        );
        assert!(parse("get('a', 'b')").is_err());
    }

    #[test]
    fn lambdas_parse_in_both_forms() {
        for src in ["xs.some(x => x > 1)", "xs.some((x) => x > 1)"] {
            let Ok(Expr::Method { name, args, .. }) = parse(src) else {
                panic!("expected method call for {src}");
            };
            assert_eq!(name, "some");
            assert!(matches!(&args[0], Expr::Lambda { param, .. } if param == "x"));
        }
    }

    #[test]
    fn nesting_depth_is_limited() {
        let deep = format!("{}1{}", "(".repeat(40), ")".repeat(40));
        assert_eq!(parse(&deep), Err(ExprError::TooDeep(16)));
    }

    #[test]
    fn long_operator_chains_count_toward_depth() {
        let sum = format!("1{}", " + 1".repeat(1000));
        assert_eq!(parse(&sum), Err(ExprError::TooDeep(16)));
        let members = format!("get('world'){}", ".a".repeat(1000));
        assert_eq!(parse(&members), Err(ExprError::TooDeep(16)));
        let indexes = format!("xs{}", "[0]".repeat(1000));
        assert_eq!(parse(&indexes), Err(ExprError::TooDeep(16)));
    }

    #[test]
    fn short_chains_stay_within_depth() {
        assert!(parse("1 + 2 + 3 - 4 * 5 * 6").is_ok());
        assert!(parse("a.b.c[0].d.trim()").is_ok());
    }

    #[test]
    fn trailing_tokens_are_rejected() {
        assert!(matches!(parse("1 2"), Err(ExprError::Syntax { .. })));
    }
}
