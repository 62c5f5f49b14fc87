/*
 * Copyright (c) 2019 Geoffroy Couprie <contact@geoffroycouprie.com> and Contributors to the Eclipse Foundation.
 * SPDX-License-Identifier: Apache-2.0
 */
//! error types for the authorization core
//!
//! three classes, with distinct propagation policy (see the module-level
//! docs on `authorizer`):
//!
//! - [`EvalError`]: faults inside a single expression evaluation. These
//!   never escape the engine on their own; they cause the enclosing rule
//!   solution or check/policy query to be rejected as "not satisfied".
//! - [`ExecutionError`]: what `authorize` can return. Either a fatal
//!   resource error, or an [`AuthorizationError`] describing a completed but
//!   unsuccessful authorization.
//! - [`AuthorizationError`]: "this token doesn't authorize this request",
//!   with diagnostic payloads.
use std::fmt;

use crate::check::MatchedQuery;
use crate::datalog::Predicate;

/// a fault raised while evaluating a single [`crate::datalog::Expression`]
///
/// expression faults are filters, not errors: they never propagate out of
/// `authorize`. A rule whose filter expression raises one of these has its
/// candidate solution discarded; a check/policy query whose expression
/// raises one simply does not count as a solution.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EvalError {
    #[error("unbound variable ${0}")]
    UnboundVariable(String),
    #[error("type mismatch")]
    TypeMismatch,
    #[error("division by zero")]
    DivByZero,
    #[error("regex is not supported")]
    UnsupportedRegex,
}

/// rejects constructing a fact, set, or rule that would violate the term
/// hierarchy described in §4.1 of the specification: values inside facts and
/// set elements can never be variables, and sets cannot nest.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConstructionError {
    #[error("a fact cannot contain a variable")]
    VariableInFact,
    #[error("a set cannot contain another set")]
    NestedSet,
    #[error("a rule head uses variable ${0} that is not bound by the rule body")]
    UnsafeHead(String),
    #[error("a rule body must contain at least one predicate")]
    EmptyBody,
    #[error("a check or policy must have at least one query")]
    EmptyDisjunction,
    #[error("could not parse {0:?} as an RFC 3339 timestamp")]
    InvalidDate(String),
}

/// which check failed, and where it came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOrigin {
    Authority,
    Block(usize),
    Authorizer,
}

impl fmt::Display for CheckOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckOrigin::Authority => write!(f, "authority"),
            CheckOrigin::Block(i) => write!(f, "block {i}"),
            CheckOrigin::Authorizer => write!(f, "authorizer"),
        }
    }
}

/// a single check that did not pass, carried alongside the failing
/// predicate for diagnostics. `failed_checks` (§3, `ComputeState`) only ever
/// grows over the lifetime of one authorization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedCheck {
    pub origin: CheckOrigin,
    pub check_id: usize,
    /// the first predicate of the first query in the failing check, kept
    /// for human-readable diagnostics
    pub head: Predicate,
}

impl fmt::Display for FailedCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "check {} failed in {}: {}",
            self.check_id, self.origin, self.head
        )
    }
}

/// the normal "this token doesn't authorize this request" outcomes (§7,
/// class 2). Computed only once the state machine has finished all of its
/// non-fatal work.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthorizationError {
    #[error("no policy matched: {0:?}")]
    NoPoliciesMatched(Vec<FailedCheck>),
    #[error("a deny policy matched: {1:?}")]
    DenyRuleMatched(Vec<FailedCheck>, MatchedQuery),
    #[error("checks failed: {0:?}")]
    FailedChecks(Vec<FailedCheck>),
}

impl AuthorizationError {
    pub fn failed_checks(&self) -> &[FailedCheck] {
        match self {
            AuthorizationError::NoPoliciesMatched(c) => c,
            AuthorizationError::DenyRuleMatched(c, _) => c,
            AuthorizationError::FailedChecks(c) => c,
        }
    }
}

/// everything `authorize` can return on the error path (§6, §7 class 1 and
/// 2). Fatal resource errors abort immediately with no partial state; the
/// `Unauthorized` variant carries a completed, non-fatal classification.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExecutionError {
    #[error("too many facts were generated during the fixpoint computation")]
    TooManyFacts,
    #[error("too many iterations were needed to compute the fixpoint")]
    TooManyIterations,
    #[error("authorization did not complete within the allotted time")]
    Timeout,
    #[error("a non-authority block is not allowed to carry rules or facts")]
    UntrustedBlockContent,
    #[error(transparent)]
    Unauthorized(#[from] AuthorizationError),
}
