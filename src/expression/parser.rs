//! Recursive descent parser for debugger expressions
//!
//! Binary operators, from loosest to tightest binding:
//!
//! | Level | Operators              | Associativity |
//! |-------|------------------------|---------------|
//! | 1     | `+` `-`                | left          |
//! | 2     | `*` `/` `%`            | left          |
//! | 3     | `\|\|`                 | left          |
//! | 4     | `&&`                   | left          |
//! | 5     | `\|` `^`               | left          |
//! | 6     | `&`                    | left          |
//! | 7     | `<<` `>>`              | left          |
//! | 8     | `<` `>` `<=` `>=` `==` `!=` | none     |
//!
//! Prefix operators (`-` `+` `~` `!` `*` `@` `<` `>`) bind tighter than any
//! binary operator, and postfix indexing `e[i]` binds tightest of all.
//! Note that `+` and `-` bind *loosest*, so `1 + 2 == 3` is `1 + (2 == 3)`.

use thiserror::Error;

use super::ast::{BinaryOp, Expression, UnaryOp};
use super::lexer::{tokenize, Token};
use super::ParseContext;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("empty expression")]
    Empty,

    #[error("unexpected end of expression")]
    UnexpectedEnd,

    #[error("unexpected '{0}'")]
    UnexpectedToken(String),

    #[error("invalid number or unknown name '{0}'")]
    InvalidIdentifier(String),

    #[error("comparison operators cannot be chained")]
    ChainedComparison,

    #[error("expression nested deeper than {0} levels")]
    TooDeep(usize),
}

/// Deepest run of brackets and prefix operators accepted.
pub const MAX_NESTING: usize = 64;

/// Parse `source` into an owned expression tree.
pub fn parse(source: &str, ctx: &ParseContext<'_>) -> Result<Expression, ParseError> {
    let tokens = tokenize(source, ctx);
    if tokens.is_empty() {
        return Err(ParseError::Empty);
    }

    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let expr = parser.additive()?;
    match parser.peek() {
        None => Ok(expr),
        Some(tok) => Err(ParseError::UnexpectedToken(tok.to_string())),
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

fn comparison_op(tok: &Token) -> Option<BinaryOp> {
    match tok {
        Token::Op('<') => Some(BinaryOp::Less),
        Token::Op('>') => Some(BinaryOp::Greater),
        Token::LessEq => Some(BinaryOp::LessEq),
        Token::GreaterEq => Some(BinaryOp::GreaterEq),
        Token::Equal => Some(BinaryOp::Equal),
        Token::NotEqual => Some(BinaryOp::NotEqual),
        _ => None,
    }
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Result<Token, ParseError> {
        let tok = self.tokens.get(self.pos).cloned().ok_or(ParseError::UnexpectedEnd)?;
        self.pos += 1;
        Ok(tok)
    }

    fn expect(&mut self, want: char) -> Result<(), ParseError> {
        match self.next()? {
            Token::Op(c) if c == want => Ok(()),
            other => Err(ParseError::UnexpectedToken(other.to_string())),
        }
    }

    /// Run `inner` one nesting level down.
    fn nested(
        &mut self,
        inner: fn(&mut Self) -> Result<Expression, ParseError>,
    ) -> Result<Expression, ParseError> {
        if self.depth >= MAX_NESTING {
            return Err(ParseError::TooDeep(MAX_NESTING));
        }
        self.depth += 1;
        let result = inner(self);
        self.depth -= 1;
        result
    }

    /// One left-associative level: `next ( op next )*`.
    fn left_assoc(
        &mut self,
        operand: fn(&mut Self) -> Result<Expression, ParseError>,
        op_for: fn(&Token) -> Option<BinaryOp>,
    ) -> Result<Expression, ParseError> {
        let mut lhs = operand(self)?;
        while let Some(op) = self.peek().and_then(op_for) {
            self.pos += 1;
            let rhs = operand(self)?;
            lhs = Expression::binary(op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn additive(&mut self) -> Result<Expression, ParseError> {
        self.left_assoc(Self::multiplicative, |t| match t {
            Token::Op('+') => Some(BinaryOp::Add),
            Token::Op('-') => Some(BinaryOp::Sub),
            _ => None,
        })
    }

    fn multiplicative(&mut self) -> Result<Expression, ParseError> {
        self.left_assoc(Self::logical_or, |t| match t {
            Token::Op('*') => Some(BinaryOp::Mul),
            Token::Op('/') => Some(BinaryOp::Div),
            Token::Op('%') => Some(BinaryOp::Mod),
            _ => None,
        })
    }

    fn logical_or(&mut self) -> Result<Expression, ParseError> {
        self.left_assoc(Self::logical_and, |t| {
            matches!(t, Token::LogOr).then_some(BinaryOp::LogOr)
        })
    }

    fn logical_and(&mut self) -> Result<Expression, ParseError> {
        self.left_assoc(Self::bit_or, |t| {
            matches!(t, Token::LogAnd).then_some(BinaryOp::LogAnd)
        })
    }

    fn bit_or(&mut self) -> Result<Expression, ParseError> {
        self.left_assoc(Self::bit_and, |t| match t {
            Token::Op('|') => Some(BinaryOp::BitOr),
            Token::Op('^') => Some(BinaryOp::BitXor),
            _ => None,
        })
    }

    fn bit_and(&mut self) -> Result<Expression, ParseError> {
        self.left_assoc(Self::shift, |t| {
            matches!(t, Token::Op('&')).then_some(BinaryOp::BitAnd)
        })
    }

    fn shift(&mut self) -> Result<Expression, ParseError> {
        self.left_assoc(Self::comparison, |t| match t {
            Token::ShiftLeft => Some(BinaryOp::Shl),
            Token::ShiftRight => Some(BinaryOp::Shr),
            _ => None,
        })
    }

    fn comparison(&mut self) -> Result<Expression, ParseError> {
        let lhs = self.unary()?;
        let Some(op) = self.peek().and_then(comparison_op) else {
            return Ok(lhs);
        };
        self.pos += 1;
        let rhs = self.unary()?;
        if self.peek().and_then(comparison_op).is_some() {
            return Err(ParseError::ChainedComparison);
        }
        Ok(Expression::binary(op, lhs, rhs))
    }

    fn unary(&mut self) -> Result<Expression, ParseError> {
        let op = match self.peek() {
            Some(Token::Op('+')) => {
                self.pos += 1;
                return self.nested(Self::unary);
            }
            Some(Token::Op('-')) => UnaryOp::Negate,
            Some(Token::Op('~')) => UnaryOp::BitNot,
            Some(Token::Op('!')) => UnaryOp::LogNot,
            Some(Token::Op('*')) => UnaryOp::ByteDeref,
            Some(Token::Op('@')) => UnaryOp::WordDeref,
            Some(Token::Op('<')) => UnaryOp::LowByte,
            Some(Token::Op('>')) => UnaryOp::HighByte,
            _ => return self.postfix(),
        };
        self.pos += 1;
        Ok(Expression::unary(op, self.nested(Self::unary)?))
    }

    fn postfix(&mut self) -> Result<Expression, ParseError> {
        let mut expr = self.primary()?;
        while let Some(Token::Op('[')) = self.peek() {
            self.pos += 1;
            let index = self.nested(Self::additive)?;
            self.expect(']')?;
            expr = Expression::binary(BinaryOp::Index, expr, index);
        }
        Ok(expr)
    }

    fn primary(&mut self) -> Result<Expression, ParseError> {
        match self.next()? {
            Token::Number(value) => Ok(Expression::Constant(value)),
            Token::Label { address, .. } => Ok(Expression::Constant(address as i32)),
            Token::Register(acc) => Ok(Expression::Register(acc)),
            Token::ChipState(acc) => Ok(Expression::ChipState(acc)),
            Token::Function(name) => Ok(Expression::Function(name)),
            Token::Invalid(word) => Err(ParseError::InvalidIdentifier(word)),
            Token::Op('(') => {
                let inner = self.nested(Self::additive)?;
                self.expect(')')?;
                Ok(inner)
            }
            other => Err(ParseError::UnexpectedToken(other.to_string())),
        }
    }
}
