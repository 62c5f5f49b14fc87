/*
 * Copyright (c) 2019 Geoffroy Couprie <contact@geoffroycouprie.com> and Contributors to the Eclipse Foundation.
 * SPDX-License-Identifier: Apache-2.0
 */
//! the expression evaluator (C2)
//!
//! unlike the donor's stack-based bytecode (`Vec<Op>`, built that way for
//! compact wire encoding — out of scope here), expressions here are an
//! immutable tree and evaluation is a recursive post-order walk, per the
//! design notes in `spec.md` §9.
use std::fmt;

use crate::datalog::{Binding, Term, Value};
use crate::error::EvalError;

/// a single-operand operator (§4.2)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unary {
    /// identity; kept only so a parenthesized sub-expression round-trips
    /// through `Display` the way it was written
    Parens,
    Negate,
    Length,
}

/// a two-operand operator (§4.2)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binary {
    Equal,
    LessThan,
    GreaterThan,
    LessOrEqual,
    GreaterOrEqual,
    Add,
    Sub,
    Mul,
    Div,
    And,
    Or,
    Prefix,
    Suffix,
    Contains,
    Intersection,
    Union,
    /// always fails: regex matching is an explicit non-goal (§1), kept as a
    /// named variant so a `Regex` expression fails with a specific
    /// diagnostic instead of not parsing at all
    Regex,
}

/// an immutable expression tree (C2). A leaf is a [`Term`]; internal nodes
/// are [`Unary`]/[`Binary`] operators over sub-expressions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expression {
    Value(Term),
    Unary(Unary, Box<Expression>),
    Binary(Binary, Box<Expression>, Box<Expression>),
}

impl Expression {
    pub fn value(term: impl Into<Term>) -> Expression {
        Expression::Value(term.into())
    }

    pub fn unary(op: Unary, inner: Expression) -> Expression {
        Expression::Unary(op, Box::new(inner))
    }

    pub fn binary(op: Binary, left: Expression, right: Expression) -> Expression {
        Expression::Binary(op, Box::new(left), Box::new(right))
    }

    /// recursive post-order evaluation against a single candidate binding.
    /// both operands of a `Binary` node are always evaluated before the
    /// operator runs, even for `And`/`Or` — evaluation is strict, not
    /// short-circuiting (§4.2, §9).
    pub fn evaluate(&self, binding: &Binding) -> Result<Value, EvalError> {
        match self {
            Expression::Value(Term::Value(v)) => Ok(v.clone()),
            Expression::Value(Term::Variable(name)) => binding
                .get(name)
                .cloned()
                .ok_or_else(|| EvalError::UnboundVariable(name.clone())),
            Expression::Unary(op, inner) => op.apply(inner.evaluate(binding)?),
            Expression::Binary(op, left, right) => {
                let l = left.evaluate(binding)?;
                let r = right.evaluate(binding)?;
                op.apply(l, r)
            }
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Value(t) => write!(f, "{t}"),
            Expression::Unary(Unary::Parens, inner) => write!(f, "({inner})"),
            Expression::Unary(Unary::Negate, inner) => write!(f, "!{inner}"),
            Expression::Unary(Unary::Length, inner) => write!(f, "{inner}.length()"),
            Expression::Binary(op, l, r) => write!(f, "{l} {op} {r}"),
        }
    }
}

impl fmt::Display for Binary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            Binary::Equal => "==",
            Binary::LessThan => "<",
            Binary::GreaterThan => ">",
            Binary::LessOrEqual => "<=",
            Binary::GreaterOrEqual => ">=",
            Binary::Add => "+",
            Binary::Sub => "-",
            Binary::Mul => "*",
            Binary::Div => "/",
            Binary::And => "&&",
            Binary::Or => "||",
            Binary::Prefix => "starts_with",
            Binary::Suffix => "ends_with",
            Binary::Contains => "contains",
            Binary::Intersection => "intersection",
            Binary::Union => "union",
            Binary::Regex => "matches",
        };
        write!(f, "{symbol}")
    }
}

impl Unary {
    fn apply(self, value: Value) -> Result<Value, EvalError> {
        match (self, value) {
            (Unary::Parens, v) => Ok(v),
            (Unary::Negate, Value::Bool(b)) => Ok(Value::Bool(!b)),
            (Unary::Length, Value::Str(s)) => Ok(Value::Integer(s.chars().count() as i64)),
            (Unary::Length, Value::Bytes(b)) => Ok(Value::Integer(b.len() as i64)),
            (Unary::Length, Value::Set(s)) => Ok(Value::Integer(s.len() as i64)),
            _ => Err(EvalError::TypeMismatch),
        }
    }
}

impl Binary {
    fn apply(self, lhs: Value, rhs: Value) -> Result<Value, EvalError> {
        use Value::*;

        match self {
            Binary::Regex => return Err(EvalError::UnsupportedRegex),
            Binary::Equal => {
                return like_typed_eq(&lhs, &rhs)
                    .map(Bool)
                    .ok_or(EvalError::TypeMismatch)
            }
            _ => {}
        }

        match (self, lhs, rhs) {
            (Binary::LessThan, Integer(a), Integer(b)) => Ok(Bool(a < b)),
            (Binary::GreaterThan, Integer(a), Integer(b)) => Ok(Bool(a > b)),
            (Binary::LessOrEqual, Integer(a), Integer(b)) => Ok(Bool(a <= b)),
            (Binary::GreaterOrEqual, Integer(a), Integer(b)) => Ok(Bool(a >= b)),

            (Binary::LessThan, Date(a), Date(b)) => Ok(Bool(a < b)),
            (Binary::GreaterThan, Date(a), Date(b)) => Ok(Bool(a > b)),
            (Binary::LessOrEqual, Date(a), Date(b)) => Ok(Bool(a <= b)),
            (Binary::GreaterOrEqual, Date(a), Date(b)) => Ok(Bool(a >= b)),

            (Binary::Add, Integer(a), Integer(b)) => {
                a.checked_add(b).map(Integer).ok_or(EvalError::TypeMismatch)
            }
            (Binary::Sub, Integer(a), Integer(b)) => {
                a.checked_sub(b).map(Integer).ok_or(EvalError::TypeMismatch)
            }
            (Binary::Mul, Integer(a), Integer(b)) => {
                a.checked_mul(b).map(Integer).ok_or(EvalError::TypeMismatch)
            }
            (Binary::Div, Integer(a), Integer(b)) => {
                if b == 0 {
                    Err(EvalError::DivByZero)
                } else {
                    a.checked_div(b).map(Integer).ok_or(EvalError::TypeMismatch)
                }
            }

            (Binary::And, Bool(a), Bool(b)) => Ok(Bool(a && b)),
            (Binary::Or, Bool(a), Bool(b)) => Ok(Bool(a || b)),

            (Binary::Prefix, Str(a), Str(b)) => Ok(Bool(a.starts_with(&b))),
            (Binary::Suffix, Str(a), Str(b)) => Ok(Bool(a.ends_with(&b))),

            (Binary::Contains, Set(a), Set(b)) => Ok(Bool(a.is_superset(&b))),
            (Binary::Contains, Set(a), scalar) => {
                if matches!(scalar, Set(_)) {
                    Err(EvalError::TypeMismatch)
                } else {
                    Ok(Bool(a.contains(&scalar)))
                }
            }
            (Binary::Intersection, Set(a), Set(b)) => {
                Ok(Set(a.intersection(&b).cloned().collect()))
            }
            (Binary::Union, Set(a), Set(b)) => Ok(Set(a.union(&b).cloned().collect())),

            _ => Err(EvalError::TypeMismatch),
        }
    }
}

/// `Equal` only ever compares a like-typed pair from the seven value kinds;
/// any other pairing is a type mismatch, not a `false` result (§4.2).
fn like_typed_eq(a: &Value, b: &Value) -> Option<bool> {
    use Value::*;
    match (a, b) {
        (Symbol(x), Symbol(y)) => Some(x == y),
        (Integer(x), Integer(y)) => Some(x == y),
        (Str(x), Str(y)) => Some(x == y),
        (Date(x), Date(y)) => Some(x == y),
        (Bytes(x), Bytes(y)) => Some(x == y),
        (Bool(x), Bool(y)) => Some(x == y),
        (Set(x), Set(y)) => Some(x == y),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datalog::Value;

    fn binding_of(pairs: &[(&str, Value)]) -> Binding {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn unbound_variable_is_a_fault() {
        let expr = Expression::value(Term::Variable("x".to_string()));
        let err = expr.evaluate(&Binding::new()).unwrap_err();
        assert_eq!(err, EvalError::UnboundVariable("x".to_string()));
    }

    #[test]
    fn equal_requires_like_types() {
        let expr = Expression::binary(
            Binary::Equal,
            Expression::value(Value::Integer(1)),
            Expression::value(Value::Str("1".to_string())),
        );
        assert_eq!(
            expr.evaluate(&Binding::new()).unwrap_err(),
            EvalError::TypeMismatch
        );
    }

    #[test]
    fn division_by_zero_is_a_fault_not_a_panic() {
        let expr = Expression::binary(
            Binary::Div,
            Expression::value(Value::Integer(4)),
            Expression::value(Value::Integer(0)),
        );
        assert_eq!(
            expr.evaluate(&Binding::new()).unwrap_err(),
            EvalError::DivByZero
        );
    }

    #[test]
    fn and_evaluates_both_sides_even_when_left_is_false() {
        // strict evaluation: if short-circuiting happened, the unbound
        // right-hand side would never be touched and this would succeed
        let expr = Expression::binary(
            Binary::And,
            Expression::value(Value::Bool(false)),
            Expression::value(Term::Variable("missing".to_string())),
        );
        assert_eq!(
            expr.evaluate(&Binding::new()).unwrap_err(),
            EvalError::UnboundVariable("missing".to_string())
        );
    }

    #[test]
    fn set_contains_scalar() {
        let set = Value::set([Value::Integer(1), Value::Integer(2)]).unwrap();
        let binding = binding_of(&[("s", set)]);
        let expr = Expression::binary(
            Binary::Contains,
            Expression::value(Term::Variable("s".to_string())),
            Expression::value(Value::Integer(2)),
        );
        assert_eq!(expr.evaluate(&binding).unwrap(), Value::Bool(true));
    }

    #[test]
    fn regex_always_fails() {
        let expr = Expression::binary(
            Binary::Regex,
            Expression::value(Value::Str("abc".to_string())),
            Expression::value(Value::Str("a.*".to_string())),
        );
        assert_eq!(
            expr.evaluate(&Binding::new()).unwrap_err(),
            EvalError::UnsupportedRegex
        );
    }
}
