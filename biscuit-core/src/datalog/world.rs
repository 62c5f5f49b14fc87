/*
 * Copyright (c) 2019 Geoffroy Couprie <contact@geoffroycouprie.com> and Contributors to the Eclipse Foundation.
 * SPDX-License-Identifier: Apache-2.0
 */
//! the unifier (C3), rule applicator (C4) and bounded fixpoint (C5)
use std::collections::HashSet;
use std::time::Instant;

use crate::authorizer::Limits;
use crate::datalog::{Binding, Expression, Fact, Predicate, Term, Value};
use crate::error::{ConstructionError, ExecutionError};

/// `head :- body, expressions` (§3). Constructing a `Rule` validates safety:
/// every variable in the head must be bound by some predicate in the body
/// (§4.1(b)), and the body must be non-empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub head: Predicate,
    pub body: Vec<Predicate>,
    pub expressions: Vec<Expression>,
}

impl Rule {
    pub fn new(
        head: Predicate,
        body: Vec<Predicate>,
        expressions: Vec<Expression>,
    ) -> Result<Rule, ConstructionError> {
        if body.is_empty() {
            return Err(ConstructionError::EmptyBody);
        }

        let bound = variables_in_predicates(&body);
        for term in &head.terms {
            if let Term::Variable(name) = term {
                if !bound.contains(name.as_str()) {
                    return Err(ConstructionError::UnsafeHead(name.clone()));
                }
            }
        }

        Ok(Rule {
            head,
            body,
            expressions,
        })
    }
}

fn variables_in_predicates(predicates: &[Predicate]) -> HashSet<&str> {
    predicates
        .iter()
        .flat_map(|p| p.terms.iter())
        .filter_map(|t| match t {
            Term::Variable(name) => Some(name.as_str()),
            Term::Value(_) => None,
        })
        .collect()
}

/// the unifier (C3): matches one predicate against one fact, producing a
/// binding if the predicate's constant terms agree with the fact and its
/// repeated variables are bound consistently. Returns `None` on any
/// disagreement — there is no partial match.
pub fn match_predicate(predicate: &Predicate, fact: &Fact) -> Option<Binding> {
    if predicate.name != fact.name || predicate.terms.len() != fact.terms.len() {
        return None;
    }

    let mut binding = Binding::new();
    for (term, value) in predicate.terms.iter().zip(fact.terms.iter()) {
        match term {
            Term::Variable(name) => match binding.get(name) {
                Some(existing) if existing != value => return None,
                Some(_) => {}
                None => {
                    binding.insert(name.clone(), value.clone());
                }
            },
            Term::Value(v) => {
                if v != value {
                    return None;
                }
            }
        }
    }
    Some(binding)
}

fn candidate_bindings(predicate: &Predicate, facts: &HashSet<Fact>) -> Vec<Binding> {
    facts
        .iter()
        .filter_map(|fact| match_predicate(predicate, fact))
        .collect()
}

fn merge(parts: &[&Binding]) -> Option<Binding> {
    let mut merged = Binding::new();
    for part in parts {
        for (key, value) in part.iter() {
            match merged.get(key) {
                Some(existing) if existing != value => return None,
                _ => {
                    merged.insert(key.clone(), value.clone());
                }
            }
        }
    }
    Some(merged)
}

/// naive cartesian product over each body predicate's candidate bindings,
/// kept deliberately simple (no join-order optimization) so the fixpoint's
/// correctness is easy to see, per the design notes in `spec.md` §9.
fn cartesian_product(sets: &[Vec<Binding>]) -> Vec<Vec<Binding>> {
    sets.iter().fold(vec![Vec::new()], |acc, set| {
        let mut next = Vec::with_capacity(acc.len() * set.len().max(1));
        for prefix in &acc {
            for binding in set {
                let mut combo = prefix.clone();
                combo.push(binding.clone());
                next.push(combo);
            }
        }
        next
    })
}

fn substitute_head(head: &Predicate, binding: &Binding) -> Option<Fact> {
    let mut terms = Vec::with_capacity(head.terms.len());
    for term in &head.terms {
        match term {
            Term::Value(v) => terms.push(v.clone()),
            Term::Variable(name) => terms.push(binding.get(name)?.clone()),
        }
    }
    Some(Fact {
        name: head.name.clone(),
        terms,
    })
}

/// the shared body/expression solver underneath both the rule applicator
/// (C4) and check/policy query evaluation (C6): every binding that
/// satisfies the body's join and passes every filter expression. A body
/// predicate with zero candidate matches makes the whole body produce no
/// solutions (the join is empty), rather than being treated as "no
/// constraint". An expression fault silently drops just that candidate
/// binding (§7 class 3), never the whole solve.
pub(crate) fn solve(
    body: &[Predicate],
    expressions: &[Expression],
    facts: &HashSet<Fact>,
) -> Vec<Binding> {
    let candidate_sets: Vec<Vec<Binding>> = body
        .iter()
        .map(|predicate| candidate_bindings(predicate, facts))
        .collect();

    if candidate_sets.iter().any(|c| c.is_empty()) {
        return Vec::new();
    }

    let mut solutions = Vec::new();
    for combo in cartesian_product(&candidate_sets) {
        let refs: Vec<&Binding> = combo.iter().collect();
        let merged = match merge(&refs) {
            Some(b) => b,
            None => continue,
        };

        let mut satisfies_filters = true;
        for expression in expressions {
            match expression.evaluate(&merged) {
                Ok(Value::Bool(true)) => {}
                _ => {
                    satisfies_filters = false;
                    break;
                }
            }
        }
        if satisfies_filters {
            solutions.push(merged);
        }
    }
    solutions
}

/// the rule applicator (C4): given the current fact set, produces every
/// fact the rule derives in a single round.
pub fn apply_rule(rule: &Rule, facts: &HashSet<Fact>) -> HashSet<Fact> {
    solve(&rule.body, &rule.expressions, facts)
        .into_iter()
        .filter_map(|binding| substitute_head(&rule.head, &binding))
        .collect()
}

/// everything the fixpoint needs: the facts already known plus the rules
/// that can derive more of them.
#[derive(Debug, Clone, Default)]
pub struct World {
    pub facts: HashSet<Fact>,
    pub rules: Vec<Rule>,
}

impl World {
    pub fn new() -> World {
        World::default()
    }

    pub fn extend(&mut self, other: World) {
        self.facts.extend(other.facts);
        self.rules.extend(other.rules);
    }
}

/// the bounded fixpoint (C5): repeatedly applies every rule to the current
/// fact set, adding what's new, until a round produces nothing new or a
/// resource limit is hit.
///
/// the limit checks run *after* each round's expansion is folded in and the
/// iteration counter incremented — "check after increment" is the resolved
/// reading of the one open question `spec.md` leaves explicit, so a round
/// that both reaches the fixpoint and crosses `max_iterations` on the same
/// round is reported as `TooManyIterations`, not success.
pub fn compute_all_facts(
    world: &World,
    mut current_facts: HashSet<Fact>,
    limits: &Limits,
    deadline: Option<Instant>,
) -> Result<(HashSet<Fact>, u64), ExecutionError> {
    let mut iterations: u64 = 0;

    loop {
        if let Some(deadline) = deadline {
            if Instant::now() >= deadline {
                return Err(ExecutionError::Timeout);
            }
        }

        let mut new_facts = HashSet::new();
        for rule in &world.rules {
            for fact in apply_rule(rule, &current_facts) {
                if !current_facts.contains(&fact) {
                    new_facts.insert(fact);
                }
            }
        }
        let reached_fixpoint = new_facts.is_empty();

        current_facts.extend(new_facts);
        current_facts.extend(world.facts.iter().cloned());
        iterations += 1;

        if current_facts.len() as u64 >= limits.max_facts {
            return Err(ExecutionError::TooManyFacts);
        }
        if iterations >= limits.max_iterations {
            return Err(ExecutionError::TooManyIterations);
        }

        if reached_fixpoint {
            return Ok((current_facts, iterations));
        }
    }
}
