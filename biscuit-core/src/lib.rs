/*
 * Copyright (c) 2019 Geoffroy Couprie <contact@geoffroycouprie.com> and Contributors to the Eclipse Foundation.
 * SPDX-License-Identifier: Apache-2.0
 */
//! the scoped Datalog authorization engine behind Biscuit tokens
//!
//! this crate is the part of Biscuit that decides, given a set of trusted
//! facts, a set of less-trusted attenuation blocks, and an authorizer's own
//! policy program, whether a request is authorized. It has no opinion on
//! how a token got to you:
//!
//! Non goals:
//!
//! * cryptography: no signing, no verification, no key handling. A
//!   [`Block`](crate::authorizer::Block) is handed to this crate already
//!   trusted or not trusted, by whatever verified (or chose not to verify)
//!   its signature.
//! * serialization and parsing: there is no wire format and no surface
//!   Datalog syntax here. Callers build [`Fact`](crate::datalog::Fact),
//!   [`Rule`](crate::datalog::Rule), [`Check`](crate::check::Check) and
//!   [`Policy`](crate::check::Policy) values directly.
//! * CLI or token packaging of any kind.
//!
//! # Usage
//!
//! ```rust
//! use biscuit_core::authorizer::{authorize, Authorizer, Limits};
//! use biscuit_core::check::{Policy, PolicyKind, Query};
//! use biscuit_core::datalog::{Fact, Predicate, Term, Value};
//!
//! let mut authorizer = Authorizer::new();
//! authorizer.authority.facts.push(Fact::new(
//!     "right",
//!     vec![Value::Str("/a/file1.txt".to_string()), Value::Str("read".to_string())],
//! ));
//!
//! let wants_read = Predicate::new(
//!     "right",
//!     vec![
//!         Term::Value(Value::Str("/a/file1.txt".to_string())),
//!         Term::Value(Value::Str("read".to_string())),
//!     ],
//! );
//! authorizer.policies.push(
//!     Policy::new(PolicyKind::Allow, vec![Query::new(vec![wants_read], vec![]).unwrap()]).unwrap(),
//! );
//!
//! let success = authorize(&authorizer, &Limits::default());
//! assert!(success.is_ok());
//! ```
//!
//! # Concepts
//!
//! ## Trust boundary
//!
//! A token is a chain of blocks: one authority block, trusted, followed by
//! zero or more attenuation blocks, each of which can only narrow what the
//! token already grants. The fixpoint computes two fact sets:
//! `authority_facts`, derived only from the authority block and the
//! authorizer's own program, and `all_facts`, the same computation
//! extended with every attenuation block folded in. `authority_facts` is
//! always a subset of `all_facts`, but a block's own contributions never
//! flow back into `authority_facts` — an attenuation block cannot forge a
//! right the authority never granted.
//!
//! That boundary only holds because of when policies and checks are
//! decided, not just which facts they see: the policy list and the
//! authority/authorizer checks are evaluated exactly once, against
//! `authority_facts`, before any attenuation block is folded in. A block's
//! checks are evaluated afterwards against `all_facts`, but a block can
//! never cause a policy to match, or an authority/authorizer check to pass,
//! that would not already have matched or passed at the end of the
//! authority phase.
//!
//! ## Checks and policies
//!
//! A [`Check`](crate::check::Check) is a non-empty disjunction of queries;
//! it passes if any one of them has a solution against the current facts.
//! All checks — from every block, and from the authorizer — must pass.
//!
//! An authorizer also carries an ordered list of
//! [`Policy`](crate::check::Policy) values, each either `allow` or `deny`.
//! They are tried in order and the first one whose query matches decides
//! the outcome — an explicit `deny` overrides everything after it, and a
//! matching `allow` only succeeds if every check also passed.
//!
//! ## Error classes
//!
//! Three distinct classes of failure, with distinct propagation (see
//! [`error`]):
//!
//! * [`error::EvalError`] — a fault evaluating one expression. Silently
//!   rejects the candidate solution or query it occurred in; never
//!   propagates out of [`authorizer::authorize`].
//! * [`error::ExecutionError`] — what `authorize` returns on any error
//!   path: either a fatal resource error (too many facts, too many
//!   iterations, a timeout, untrusted block content), or a completed
//!   [`error::AuthorizationError`].
//! * [`error::AuthorizationError`] — "this token doesn't authorize this
//!   request", carrying the failed checks and, where relevant, which deny
//!   policy matched.
pub mod authorizer;
pub mod check;
pub mod datalog;
pub mod error;

pub use authorizer::{
    authorize, value_for, values_for, Authorizer, AuthorizationSuccess, Block, FeatureFlags, Limits,
};
pub use check::{Check, MatchedQuery, Policy, PolicyKind, Query};
pub use datalog::{Binding, Binary, Expression, Fact, Predicate, Rule, Term, Unary, Value};
pub use error::{AuthorizationError, CheckOrigin, ConstructionError, EvalError, ExecutionError, FailedCheck};
