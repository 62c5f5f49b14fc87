/*
 * Copyright (c) 2019 Geoffroy Couprie <contact@geoffroycouprie.com> and Contributors to the Eclipse Foundation.
 * SPDX-License-Identifier: Apache-2.0
 */
//! the Datalog term model and fixpoint engine (components C1-C5)
use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::convert::TryFrom;
use std::fmt;

use crate::error::ConstructionError;

pub mod expression;
pub mod world;

pub use expression::{Binary, Expression, Unary};
pub use world::{apply_rule, compute_all_facts, match_predicate, Rule, World};

/// a concrete datum the engine can reason about (§3): a closed tagged union
/// over symbol, integer, string, timestamp, bytes, boolean and set-of-value.
/// there is no floating point and no regex value — both are deliberately
/// absent from this type, not merely unsupported by the evaluator.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Value {
    /// an interned atom, compared and unified by identity of its text —
    /// distinct from `Str`, which is arbitrary request/fact data
    Symbol(String),
    Integer(i64),
    Str(String),
    /// seconds since the Unix epoch
    Date(u64),
    Bytes(Vec<u8>),
    Bool(bool),
    Set(BTreeSet<Value>),
}

impl Value {
    /// the only way to build a `Value::Set`: rejects elements that are
    /// themselves sets, since "the set variant is not permitted inside
    /// another set" (§3).
    pub fn set(elements: impl IntoIterator<Item = Value>) -> Result<Value, ConstructionError> {
        let set: BTreeSet<Value> = elements.into_iter().collect();
        if set.iter().any(|v| matches!(v, Value::Set(_))) {
            return Err(ConstructionError::NestedSet);
        }
        Ok(Value::Set(set))
    }

    /// convenience constructor for `Value::Date` from a human-readable
    /// RFC 3339 timestamp, the way the donor's `builder::date` helper turns
    /// surface-syntax dates into the wire's Unix-epoch-seconds
    /// representation. The core itself only ever stores and compares the
    /// `u64`; this is the one place that needs calendar parsing, so it is
    /// the crate's only user of the `time` dependency.
    pub fn date_from_rfc3339(s: &str) -> Result<Value, ConstructionError> {
        time::OffsetDateTime::parse(s, &time::format_description::well_known::Rfc3339)
            .map(|dt| Value::Date(dt.unix_timestamp().max(0) as u64))
            .map_err(|_| ConstructionError::InvalidDate(s.to_string()))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Symbol(_) => "symbol",
            Value::Integer(_) => "integer",
            Value::Str(_) => "string",
            Value::Date(_) => "date",
            Value::Bytes(_) => "bytes",
            Value::Bool(_) => "bool",
            Value::Set(_) => "set",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Symbol(s) => write!(f, "#{s}"),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Str(s) => write!(f, "\"{s}\""),
            Value::Date(d) => write!(f, "{d}"),
            Value::Bytes(b) => {
                write!(f, "hex:")?;
                for byte in b {
                    write!(f, "{byte:02x}")?;
                }
                Ok(())
            }
            Value::Bool(b) => write!(f, "{b}"),
            Value::Set(set) => {
                write!(f, "{{")?;
                for (i, v) in set.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{v}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

/// either a ground [`Value`] or a [`Variable`](Term::Variable). Variables
/// only ever appear in rule heads, rule bodies and expression leaves — never
/// in a [`Fact`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Term {
    Value(Value),
    Variable(String),
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Value(v) => write!(f, "{v}"),
            Term::Variable(name) => write!(f, "${name}"),
        }
    }
}

impl From<Value> for Term {
    fn from(value: Value) -> Self {
        Term::Value(value)
    }
}

/// a name plus an ordered list of terms, used for rule heads and bodies,
/// where some terms may still be variables. Predicate equality is
/// structural: name and arity together define a relation (§3).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Predicate {
    pub name: String,
    pub terms: Vec<Term>,
}

impl Predicate {
    pub fn new(name: impl Into<String>, terms: Vec<Term>) -> Self {
        Predicate {
            name: name.into(),
            terms,
        }
    }

    pub fn arity(&self) -> usize {
        self.terms.len()
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        for (i, term) in self.terms.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{term}")?;
        }
        write!(f, ")")
    }
}

/// a predicate whose terms are all ground values — the only thing the
/// fixpoint can derive or store. Constructing one from a [`Predicate`] that
/// still has a variable in it is rejected rather than silently truncated.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fact {
    pub name: String,
    pub terms: Vec<Value>,
}

impl Fact {
    pub fn new(name: impl Into<String>, terms: Vec<Value>) -> Self {
        Fact {
            name: name.into(),
            terms,
        }
    }

    pub fn as_predicate(&self) -> Predicate {
        Predicate {
            name: self.name.clone(),
            terms: self.terms.iter().cloned().map(Term::Value).collect(),
        }
    }
}

impl TryFrom<Predicate> for Fact {
    type Error = ConstructionError;

    fn try_from(predicate: Predicate) -> Result<Self, Self::Error> {
        let mut terms = Vec::with_capacity(predicate.terms.len());
        for term in predicate.terms {
            match term {
                Term::Value(v) => terms.push(v),
                Term::Variable(_) => return Err(ConstructionError::VariableInFact),
            }
        }
        Ok(Fact {
            name: predicate.name,
            terms,
        })
    }
}

impl fmt::Display for Fact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.as_predicate().fmt(f)
    }
}

/// a concrete assignment of values to a rule's or query's variables (§3). Map
/// keys are unique by construction; `BTreeMap` also gives deterministic
/// iteration order, which keeps test assertions and diagnostics stable.
pub type Binding = BTreeMap<String, Value>;
