//! Recursive-descent parser for guard expressions.

use super::error::{ExprError, ExprResult};
use super::lexer::{Token, TokenKind, tokenize};
use super::{Expr, Literal, MAX_NESTING_DEPTH};

/// Parse guard expression text.
pub fn parse(text: &str) -> ExprResult<Expr> {
    let tokens = tokenize(text)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let expr = parser.parse_or()?;
    match parser.peek() {
        None => Ok(expr),
        Some(token) => Err(ExprError::UnexpectedToken {
            found: token.kind.describe(),
            expected: "end of expression",
            offset: token.offset,
        }),
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self, expected: &'static str) -> ExprResult<Token> {
        let token = self
            .tokens
            .get(self.pos)
            .cloned()
            .ok_or(ExprError::UnexpectedEnd { expected })?;
        self.pos += 1;
        Ok(token)
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.peek().is_some_and(|t| &t.kind == kind) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn enter(&mut self) -> ExprResult<()> {
        self.depth += 1;
        if self.depth > MAX_NESTING_DEPTH {
            return Err(ExprError::TooDeep {
                limit: MAX_NESTING_DEPTH,
            });
        }
        Ok(())
    }

    fn parse_or(&mut self) -> ExprResult<Expr> {
        let mut left = self.parse_and()?;
        while self.eat(&TokenKind::OrOr) {
            let right = self.parse_and()?;
            left = Expr::or(left, right);
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> ExprResult<Expr> {
        let mut left = self.parse_unary()?;
        while self.eat(&TokenKind::AndAnd) {
            let right = self.parse_unary()?;
            left = Expr::and(left, right);
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> ExprResult<Expr> {
        if self.eat(&TokenKind::Bang) {
            self.enter()?;
            let inner = self.parse_unary()?;
            self.depth -= 1;
            return Ok(Expr::not(inner));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> ExprResult<Expr> {
        let token = self.next("a comparison, constant or '('")?;
        match token.kind {
            TokenKind::LParen => {
                self.enter()?;
                let inner = self.parse_or()?;
                self.depth -= 1;
                let close = self.next("')'")?;
                if close.kind != TokenKind::RParen {
                    return Err(ExprError::UnexpectedToken {
                        found: close.kind.describe(),
                        expected: "')'",
                        offset: close.offset,
                    });
                }
                Ok(inner)
            }
            TokenKind::True => Ok(Expr::Const(true)),
            TokenKind::False => Ok(Expr::Const(false)),
            TokenKind::Ident(variable) => {
                let op_token = self.next("a comparison operator")?;
                let TokenKind::Op(op) = op_token.kind else {
                    return Err(ExprError::UnexpectedToken {
                        found: op_token.kind.describe(),
                        expected: "a comparison operator",
                        offset: op_token.offset,
                    });
                };
                let value_token = self.next("a literal")?;
                let value = match value_token.kind {
                    TokenKind::Number(v) => Literal::Number(v),
                    TokenKind::Str(s) => Literal::Str(s),
                    TokenKind::True => Literal::Bool(true),
                    TokenKind::False => Literal::Bool(false),
                    other => {
                        return Err(ExprError::UnexpectedToken {
                            found: other.describe(),
                            expected: "a literal",
                            offset: value_token.offset,
                        });
                    }
                };
                Ok(Expr::Compare {
                    variable,
                    op,
                    value,
                })
            }
            other => Err(ExprError::UnexpectedToken {
                found: other.describe(),
                expected: "a comparison, constant or '('",
                offset: token.offset,
            }),
        }
    }
}
