//! Expression trees and their evaluation.
//!
//! All arithmetic is on `i32` and wraps. Division or modulo by zero yields 0
//! instead of failing, and relational and logical operators yield 0 or 1.

use super::{Accessor, EvalContext, EvalError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// `-e`
    Negate,
    /// `~e`
    BitNot,
    /// `!e`
    LogNot,
    /// `*e`, byte at address `e`
    ByteDeref,
    /// `@e`, little-endian word at address `e`
    WordDeref,
    /// `<e`
    LowByte,
    /// `>e`
    HighByte,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    BitAnd,
    BitOr,
    BitXor,
    LogAnd,
    LogOr,
    Shl,
    Shr,
    Less,
    Greater,
    LessEq,
    GreaterEq,
    Equal,
    NotEqual,
    /// `a[b]`, byte at address `a + b`
    Index,
}

/// A parsed expression. Owns its children; holds no hardware state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expression {
    Constant(i32),
    /// CPU register or flag
    Register(Accessor),
    /// Cartridge or TIA internal state
    ChipState(Accessor),
    /// Reference to a named function, resolved at evaluation time
    Function(String),
    Unary(UnaryOp, Box<Expression>),
    Binary(BinaryOp, Box<Expression>, Box<Expression>),
}

impl Expression {
    pub fn unary(op: UnaryOp, operand: Expression) -> Self {
        Expression::Unary(op, Box::new(operand))
    }

    pub fn binary(op: BinaryOp, lhs: Expression, rhs: Expression) -> Self {
        Expression::Binary(op, Box::new(lhs), Box::new(rhs))
    }

    /// Compute the current value against live machine state.
    pub fn evaluate(&self, ctx: &mut EvalContext<'_>) -> Result<i32, EvalError> {
        match self {
            Expression::Constant(value) => Ok(*value),
            Expression::Register(acc) | Expression::ChipState(acc) => acc.read(ctx.machine()),
            Expression::Function(name) => ctx.call(name),
            Expression::Unary(op, operand) => {
                let value = operand.evaluate(ctx)?;
                Ok(match op {
                    UnaryOp::Negate => value.wrapping_neg(),
                    UnaryOp::BitNot => !value,
                    UnaryOp::LogNot => (value == 0) as i32,
                    UnaryOp::ByteDeref => ctx.machine().peek(value as u16) as i32,
                    UnaryOp::WordDeref => {
                        let addr = value as u16;
                        let lo = ctx.machine().peek(addr) as i32;
                        let hi = ctx.machine().peek(addr.wrapping_add(1)) as i32;
                        lo | (hi << 8)
                    }
                    UnaryOp::LowByte => value & 0xFF,
                    UnaryOp::HighByte => (value >> 8) & 0xFF,
                })
            }
            Expression::Binary(BinaryOp::LogAnd, lhs, rhs) => {
                Ok((lhs.evaluate(ctx)? != 0 && rhs.evaluate(ctx)? != 0) as i32)
            }
            Expression::Binary(BinaryOp::LogOr, lhs, rhs) => {
                Ok((lhs.evaluate(ctx)? != 0 || rhs.evaluate(ctx)? != 0) as i32)
            }
            Expression::Binary(op, lhs, rhs) => {
                let a = lhs.evaluate(ctx)?;
                let b = rhs.evaluate(ctx)?;
                Ok(match op {
                    BinaryOp::Add => a.wrapping_add(b),
                    BinaryOp::Sub => a.wrapping_sub(b),
                    BinaryOp::Mul => a.wrapping_mul(b),
                    BinaryOp::Div if b == 0 => 0,
                    BinaryOp::Div => a.wrapping_div(b),
                    BinaryOp::Mod if b == 0 => 0,
                    BinaryOp::Mod => a.wrapping_rem(b),
                    BinaryOp::BitAnd => a & b,
                    BinaryOp::BitOr => a | b,
                    BinaryOp::BitXor => a ^ b,
                    // Shift counts wrap modulo 32
                    BinaryOp::Shl => a.wrapping_shl(b as u32),
                    BinaryOp::Shr => a.wrapping_shr(b as u32),
                    BinaryOp::Less => (a < b) as i32,
                    BinaryOp::Greater => (a > b) as i32,
                    BinaryOp::LessEq => (a <= b) as i32,
                    BinaryOp::GreaterEq => (a >= b) as i32,
                    BinaryOp::Equal => (a == b) as i32,
                    BinaryOp::NotEqual => (a != b) as i32,
                    BinaryOp::Index => ctx.machine().peek(a.wrapping_add(b) as u16) as i32,
                    BinaryOp::LogAnd | BinaryOp::LogOr => unreachable!("handled above"),
                })
            }
        }
    }
}
