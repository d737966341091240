//! Restriction expressions over parameter names.
//!
//! Restrictions are compiled once, when the search space is built, into an
//! expression tree whose identifiers are already resolved to parameter
//! indices. Evaluation is a pure walk of that tree: there is no access to
//! anything but the configuration under test.

mod lexer;
mod parser;

use std::cmp::Ordering;
use std::fmt;

use kt_types::{ParamValue, RestrictionError};
use tracing::trace;

use lexer::Lexer;
use parser::Parser;

/// Runtime value produced while evaluating an expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
}

impl Value {
    fn from_param(value: &ParamValue) -> Self {
        match value {
            ParamValue::Int(v) => Self::Int(*v),
            ParamValue::Float(v) => Self::Float(*v),
            ParamValue::Str(v) => Self::Str(v.clone()),
        }
    }

    pub fn truthy(&self) -> bool {
        match self {
            Self::Int(v) => *v != 0,
            Self::Float(v) => *v != 0.0,
            Self::Bool(v) => *v,
            Self::Str(v) => !v.is_empty(),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Bool(_) => "bool",
            Self::Str(_) => "str",
        }
    }

    /// Integer view, with booleans counting as 0/1.
    fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            Self::Bool(v) => Some(*v as i64),
            _ => None,
        }
    }

    fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            other => other.as_int().map(|v| v as f64),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UnaryOp {
    Neg,
    Pos,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Expr {
    Literal(Value),
    Param(usize),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Compare {
        first: Box<Expr>,
        rest: Vec<(CompareOp, Expr)>,
    },
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
}

impl Expr {
    pub(crate) fn binary(op: BinaryOp, left: Expr, right: Expr) -> Self {
        Self::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    fn eval(&self, values: &[ParamValue]) -> Result<Value, RestrictionError> {
        match self {
            Self::Literal(v) => Ok(v.clone()),
            Self::Param(index) => values
                .get(*index)
                .map(Value::from_param)
                .ok_or_else(|| RestrictionError::Type {
                    message: format!("no value for parameter #{index}"),
                }),
            Self::Unary { op, operand } => unary(*op, operand.eval(values)?),
            Self::Binary { op, left, right } => {
                binary(*op, left.eval(values)?, right.eval(values)?)
            }
            Self::Compare { first, rest } => {
                let mut left = first.eval(values)?;
                for (op, expr) in rest {
                    let right = expr.eval(values)?;
                    if !compare(*op, &left, &right)? {
                        return Ok(Value::Bool(false));
                    }
                    left = right;
                }
                Ok(Value::Bool(true))
            }
            Self::Not(inner) => Ok(Value::Bool(!inner.eval(values)?.truthy())),
            Self::And(left, right) => Ok(Value::Bool(
                left.eval(values)?.truthy() && right.eval(values)?.truthy(),
            )),
            Self::Or(left, right) => Ok(Value::Bool(
                left.eval(values)?.truthy() || right.eval(values)?.truthy(),
            )),
        }
    }
}

fn type_error(message: String) -> RestrictionError {
    RestrictionError::Type { message }
}

fn overflow(op: BinaryOp) -> RestrictionError {
    type_error(format!("integer overflow in {op:?}"))
}

fn unary(op: UnaryOp, value: Value) -> Result<Value, RestrictionError> {
    match (op, &value) {
        (_, Value::Str(_)) => Err(type_error(format!("bad operand type for unary {op:?}: str"))),
        (UnaryOp::Pos, Value::Float(v)) => Ok(Value::Float(*v)),
        (UnaryOp::Neg, Value::Float(v)) => Ok(Value::Float(-v)),
        (UnaryOp::Pos, other) => Ok(Value::Int(other.as_int().unwrap_or_default())),
        (UnaryOp::Neg, other) => other
            .as_int()
            .unwrap_or_default()
            .checked_neg()
            .map(Value::Int)
            .ok_or_else(|| type_error("integer overflow in negation".to_string())),
    }
}

fn floor_div(a: i64, b: i64) -> Option<i64> {
    let q = a.checked_div(b)?;
    if a.checked_rem(b)? != 0 && ((a < 0) != (b < 0)) {
        q.checked_sub(1)
    } else {
        Some(q)
    }
}

fn floor_mod(a: i64, b: i64) -> Option<i64> {
    let r = a.checked_rem(b)?;
    if r != 0 && ((r < 0) != (b < 0)) {
        Some(r + b)
    } else {
        Some(r)
    }
}

fn binary(op: BinaryOp, left: Value, right: Value) -> Result<Value, RestrictionError> {
    if let (Value::Str(a), Value::Str(b), BinaryOp::Add) = (&left, &right, op) {
        return Ok(Value::Str(format!("{a}{b}")));
    }

    if let (Some(a), Some(b)) = (left.as_int(), right.as_int()) {
        return match op {
            BinaryOp::Add => a.checked_add(b).map(Value::Int).ok_or_else(|| overflow(op)),
            BinaryOp::Sub => a.checked_sub(b).map(Value::Int).ok_or_else(|| overflow(op)),
            BinaryOp::Mul => a.checked_mul(b).map(Value::Int).ok_or_else(|| overflow(op)),
            BinaryOp::Div if b == 0 => Err(RestrictionError::DivisionByZero),
            BinaryOp::Div => Ok(Value::Float(a as f64 / b as f64)),
            BinaryOp::FloorDiv | BinaryOp::Mod if b == 0 => Err(RestrictionError::DivisionByZero),
            BinaryOp::FloorDiv => floor_div(a, b).map(Value::Int).ok_or_else(|| overflow(op)),
            BinaryOp::Mod => floor_mod(a, b).map(Value::Int).ok_or_else(|| overflow(op)),
            BinaryOp::Pow if b >= 0 => u32::try_from(b)
                .ok()
                .and_then(|exp| a.checked_pow(exp))
                .map(Value::Int)
                .ok_or_else(|| overflow(op)),
            BinaryOp::Pow => Ok(Value::Float((a as f64).powf(b as f64))),
        };
    }

    let (Some(a), Some(b)) = (left.as_float(), right.as_float()) else {
        return Err(type_error(format!(
            "unsupported operand types for {op:?}: {} and {}",
            left.kind(),
            right.kind()
        )));
    };
    let result = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div | BinaryOp::FloorDiv | BinaryOp::Mod if b == 0.0 => {
            return Err(RestrictionError::DivisionByZero)
        }
        BinaryOp::Div => a / b,
        BinaryOp::FloorDiv => (a / b).floor(),
        BinaryOp::Mod => a - b * (a / b).floor(),
        BinaryOp::Pow => a.powf(b),
    };
    Ok(Value::Float(result))
}

fn compare(op: CompareOp, left: &Value, right: &Value) -> Result<bool, RestrictionError> {
    let ordering = match (left, right) {
        (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
        (Value::Str(_), _) | (_, Value::Str(_)) => {
            // Mixed string/number values are never equal and never ordered.
            return match op {
                CompareOp::Eq => Ok(false),
                CompareOp::Ne => Ok(true),
                _ => Err(type_error(format!(
                    "cannot order {} and {}",
                    left.kind(),
                    right.kind()
                ))),
            };
        }
        _ => match (left.as_int(), right.as_int()) {
            (Some(a), Some(b)) => Some(a.cmp(&b)),
            _ => left
                .as_float()
                .zip(right.as_float())
                .and_then(|(a, b)| a.partial_cmp(&b)),
        },
    };

    // NaN compares unequal to everything.
    let Some(ordering) = ordering else {
        return Ok(op == CompareOp::Ne);
    };
    Ok(match op {
        CompareOp::Eq => ordering == Ordering::Equal,
        CompareOp::Ne => ordering != Ordering::Equal,
        CompareOp::Lt => ordering == Ordering::Less,
        CompareOp::Le => ordering != Ordering::Greater,
        CompareOp::Gt => ordering == Ordering::Greater,
        CompareOp::Ge => ordering != Ordering::Less,
    })
}

/// A compiled boolean constraint over a configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Restriction {
    source: String,
    expr: Expr,
}

impl Restriction {
    /// Compile `source` against the ordered parameter names of a space.
    pub fn compile(source: &str, names: &[String]) -> Result<Self, RestrictionError> {
        let tokens = Lexer::new(source).tokenize()?;
        let expr = Parser::new(source, tokens, names).parse()?;
        Ok(Self {
            source: source.to_string(),
            expr,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluate against positional parameter values.
    pub fn evaluate(&self, values: &[ParamValue]) -> Result<Value, RestrictionError> {
        self.expr.eval(values)
    }

    /// Whether the restriction holds. Evaluation failures count as violations.
    pub fn is_satisfied(&self, values: &[ParamValue]) -> bool {
        match self.evaluate(values) {
            Ok(value) => value.truthy(),
            Err(e) => {
                trace!("Restriction \"{}\" failed to evaluate: {}", self.source, e);
                false
            }
        }
    }
}

impl fmt::Display for Restriction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Compile every restriction, failing on the first malformed one.
pub fn compile_all(sources: &[String], names: &[String]) -> Result<Vec<Restriction>, RestrictionError> {
    sources
        .iter()
        .map(|source| Restriction::compile(source, names))
        .collect()
}

/// Whether `values` satisfies all `restrictions`.
pub fn check_restrictions(restrictions: &[Restriction], values: &[ParamValue]) -> bool {
    restrictions.iter().all(|r| r.is_satisfied(values))
}
