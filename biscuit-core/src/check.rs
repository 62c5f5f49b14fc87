/*
 * Copyright (c) 2019 Geoffroy Couprie <contact@geoffroycouprie.com> and Contributors to the Eclipse Foundation.
 * SPDX-License-Identifier: Apache-2.0
 */
//! the check/policy evaluator (C6)
//!
//! a [`Check`] or [`Policy`] is a non-empty disjunction of queries; each
//! query is a rule body plus filter expressions, evaluated against the
//! current fact set the same way a rule body is (they share the solver in
//! [`crate::datalog::world`]). A check passes as soon as any one of its
//! queries has at least one solution — the rest are not even evaluated.
use std::collections::HashSet;
use std::fmt;

use crate::datalog::world::solve;
use crate::datalog::{Binding, Expression, Fact, Predicate};
use crate::error::ConstructionError;

/// one disjunct of a [`Check`] or [`Policy`]: a rule body with filter
/// expressions and no head, since a query never derives a fact — it only
/// asks "does this pattern have a solution?" (§3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub body: Vec<Predicate>,
    pub expressions: Vec<Expression>,
}

impl Query {
    pub fn new(body: Vec<Predicate>, expressions: Vec<Expression>) -> Result<Query, ConstructionError> {
        if body.is_empty() {
            return Err(ConstructionError::EmptyBody);
        }
        Ok(Query { body, expressions })
    }

    fn solutions(&self, facts: &HashSet<Fact>) -> Vec<Binding> {
        solve(&self.body, &self.expressions, facts)
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, predicate) in self.body.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{predicate}")?;
        }
        for expression in &self.expressions {
            write!(f, ", {expression}")?;
        }
        Ok(())
    }
}

/// a non-empty disjunction of queries (§3). `check_passes` is true as soon
/// as any query has a solution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Check {
    pub queries: Vec<Query>,
}

impl Check {
    pub fn new(queries: Vec<Query>) -> Result<Check, ConstructionError> {
        if queries.is_empty() {
            return Err(ConstructionError::EmptyDisjunction);
        }
        Ok(Check { queries })
    }

    /// the first query with a solution, if any — used both to decide
    /// pass/fail and, on failure, to build a [`crate::error::FailedCheck`]
    /// diagnostic from `self.queries[0]`.
    pub fn first_match(&self, facts: &HashSet<Fact>) -> Option<MatchedQuery> {
        first_match(&self.queries, facts)
    }

    pub fn passes(&self, facts: &HashSet<Fact>) -> bool {
        self.first_match(facts).is_some()
    }
}

/// `allow` or `deny` (§3): an ordered policy list is evaluated top to
/// bottom, and the first one with a matching query decides the outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyKind {
    Allow,
    Deny,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Policy {
    pub kind: PolicyKind,
    pub queries: Vec<Query>,
}

impl Policy {
    pub fn new(kind: PolicyKind, queries: Vec<Query>) -> Result<Policy, ConstructionError> {
        if queries.is_empty() {
            return Err(ConstructionError::EmptyDisjunction);
        }
        Ok(Policy { kind, queries })
    }

    pub fn first_match(&self, facts: &HashSet<Fact>) -> Option<MatchedQuery> {
        first_match(&self.queries, facts)
    }
}

fn first_match(queries: &[Query], facts: &HashSet<Fact>) -> Option<MatchedQuery> {
    for (query_index, query) in queries.iter().enumerate() {
        let mut solutions = query.solutions(facts);
        if let Some(binding) = solutions.drain(..).next() {
            return Some(MatchedQuery {
                query_index,
                binding,
            });
        }
    }
    None
}

/// the query (within a check or policy) that matched, and the binding that
/// satisfied it — the diagnostic payload carried by
/// [`crate::error::AuthorizationError::DenyRuleMatched`] and by a passing
/// policy's success value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchedQuery {
    pub query_index: usize,
    pub binding: Binding,
}

/// evaluates an ordered policy list against the current facts (C6, §4.6):
/// the first policy with a matching query decides the outcome, whether it
/// is `allow` or `deny`. Returns `None` if no policy matched at all.
pub fn evaluate_policies<'a>(
    policies: &'a [Policy],
    facts: &HashSet<Fact>,
) -> Option<(usize, &'a Policy, MatchedQuery)> {
    for (policy_index, policy) in policies.iter().enumerate() {
        if let Some(matched) = policy.first_match(facts) {
            return Some((policy_index, policy, matched));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datalog::{Term, Value};

    fn fact(name: &str, terms: Vec<Value>) -> Fact {
        Fact::new(name, terms)
    }

    fn var(name: &str) -> Term {
        Term::Variable(name.to_string())
    }

    #[test]
    fn check_passes_when_any_query_matches() {
        let failing = Query::new(vec![Predicate::new("missing", vec![var("x")])], vec![]).unwrap();
        let passing = Query::new(vec![Predicate::new("right", vec![var("x")])], vec![]).unwrap();
        let check = Check::new(vec![failing, passing]).unwrap();

        let mut facts = HashSet::new();
        facts.insert(fact("right", vec![Value::Str("file1".to_string())]));

        assert!(check.passes(&facts));
    }

    #[test]
    fn check_fails_when_no_query_matches() {
        let query = Query::new(vec![Predicate::new("missing", vec![var("x")])], vec![]).unwrap();
        let check = Check::new(vec![query]).unwrap();
        assert!(!check.passes(&HashSet::new()));
    }

    #[test]
    fn first_policy_match_wins_even_if_a_later_one_also_matches() {
        let deny = Policy::new(
            PolicyKind::Deny,
            vec![Query::new(vec![Predicate::new("blocked", vec![])], vec![]).unwrap()],
        )
        .unwrap();
        let allow = Policy::new(
            PolicyKind::Allow,
            vec![Query::new(vec![Predicate::new("right", vec![var("x")])], vec![]).unwrap()],
        )
        .unwrap();

        let mut facts = HashSet::new();
        facts.insert(fact("blocked", vec![]));
        facts.insert(fact("right", vec![Value::Str("file1".to_string())]));

        let (index, policy, _) = evaluate_policies(&[deny, allow], &facts).unwrap();
        assert_eq!(index, 0);
        assert_eq!(policy.kind, PolicyKind::Deny);
    }

    #[test]
    fn no_policy_matches_returns_none() {
        let allow = Policy::new(
            PolicyKind::Allow,
            vec![Query::new(vec![Predicate::new("right", vec![var("x")])], vec![]).unwrap()],
        )
        .unwrap();
        assert!(evaluate_policies(&[allow], &HashSet::new()).is_none());
    }
}
