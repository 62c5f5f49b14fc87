/*
 * Copyright (c) 2019 Geoffroy Couprie <contact@geoffroycouprie.com> and Contributors to the Eclipse Foundation.
 * SPDX-License-Identifier: Apache-2.0
 */
//! the authorization state machine (C7) and post-hoc querying (§4.8)
//!
//! `authorize` walks: `Init -> AuthorityLoaded -> AuthorityEvaluated ->
//! BlockEvaluated* -> Classified`. The trust boundary is a single snapshot:
//! `authority_facts` is computed once, from the authority block and the
//! authorizer's own facts/rules only, and is never touched again. Every
//! attenuation block is folded into a second, larger fixpoint —
//! `all_facts` — that `authority_facts` is a subset of by construction
//! (the fixpoint only ever adds facts), but a block can never get its own
//! contributions promoted back into the trusted snapshot.
use std::collections::HashSet;
use std::time::{Duration, Instant};

use crate::check::{evaluate_policies, Check, MatchedQuery, Policy, PolicyKind, Query};
use crate::datalog::world::{compute_all_facts, solve, World};
use crate::datalog::{Binding, Fact, Rule, Value};
use crate::error::{AuthorizationError, CheckOrigin, ExecutionError, FailedCheck};

/// one block of Datalog content: the authority block of a token, one of
/// its attenuation blocks, or (conceptually) the authorizer's own
/// facts/rules/checks (§3). `revocation_id` is opaque to the engine — it is
/// never interpreted, only injected as a `revocation_id(index, bytes)` fact
/// so that policies and checks can reference it.
#[derive(Debug, Clone, Default)]
pub struct Block {
    pub facts: Vec<Fact>,
    pub rules: Vec<Rule>,
    pub checks: Vec<Check>,
    pub revocation_id: Vec<u8>,
}

/// resource caps enforced by the bounded fixpoint and by `authorize` itself
/// (§4.5, §4.7). Exceeding any of them is a fatal resource error, not an
/// authorization failure — the caller gets `ExecutionError`, not a
/// diagnosed `AuthorizationError`.
#[derive(Debug, Clone)]
pub struct Limits {
    pub max_facts: u64,
    pub max_iterations: u64,
    pub max_time: Duration,
    pub feature_flags: FeatureFlags,
}

impl Default for Limits {
    fn default() -> Limits {
        Limits {
            max_facts: 1000,
            max_iterations: 100,
            max_time: Duration::from_millis(1),
            feature_flags: FeatureFlags::default(),
        }
    }
}

/// by default only the authority block (and the authorizer's own program)
/// may carry rules or facts at all; an attenuation block is meant to
/// restrict what a token can do, never to extend the Datalog program it
/// runs. Setting either flag relaxes that restriction; attempting to fold
/// in a non-authority block's facts/rules while the corresponding flag is
/// off is `ExecutionError::UntrustedBlockContent`.
#[derive(Debug, Clone, Copy)]
pub struct FeatureFlags {
    pub allow_non_authority_rules: bool,
    pub allow_non_authority_facts: bool,
}

impl Default for FeatureFlags {
    fn default() -> FeatureFlags {
        FeatureFlags {
            allow_non_authority_rules: false,
            allow_non_authority_facts: false,
        }
    }
}

/// the ordered policy list, facts and rules the authorizer itself
/// contributes (trusted the same as the authority block — these come from
/// the verifier, not the token), and the checks it wants enforced.
#[derive(Debug, Clone, Default)]
pub struct Authorizer {
    pub authority: Block,
    pub blocks: Vec<Block>,
    pub facts: Vec<Fact>,
    pub rules: Vec<Rule>,
    pub checks: Vec<Check>,
    pub policies: Vec<Policy>,
}

impl Authorizer {
    pub fn new() -> Authorizer {
        Authorizer::default()
    }
}

/// what a successful `authorize` call returns: which policy/query matched,
/// the trust-boundary snapshot, the full derived fact set, and how many
/// fixpoint rounds it took in total.
#[derive(Debug, Clone)]
pub struct AuthorizationSuccess {
    pub matched_policy_index: usize,
    pub matched_query: MatchedQuery,
    pub authority_facts: HashSet<Fact>,
    pub all_facts: HashSet<Fact>,
    pub iterations: u64,
}

/// runs the full C7 state machine against one authorizer and its token
/// blocks, in order, and classifies the outcome (§4.7).
pub fn authorize(authorizer: &Authorizer, limits: &Limits) -> Result<AuthorizationSuccess, ExecutionError> {
    let deadline = Instant::now() + limits.max_time;

    // Init -> AuthorityLoaded: seed the trusted world from the authority
    // block and the authorizer's own program only, plus the revocation_id
    // facts for *every* block (authority is index 0, extra blocks 1..N) —
    // the only facts injected from outside rule derivation, and seeded
    // before the authority phase runs so authority-time checks can already
    // see an extra block's revocation identifier.
    let mut world = World::new();
    world.facts.extend(authorizer.authority.facts.iter().cloned());
    world.rules.extend(authorizer.authority.rules.iter().cloned());
    world.facts.extend(authorizer.facts.iter().cloned());
    world.rules.extend(authorizer.rules.iter().cloned());
    world.facts.insert(revocation_fact(0, &authorizer.authority.revocation_id));
    for (index, block) in authorizer.blocks.iter().enumerate() {
        world
            .facts
            .insert(revocation_fact(index as i64 + 1, &block.revocation_id));
    }

    let seed = world.facts.clone();
    let (authority_facts, mut iterations) = compute_all_facts(&world, seed, limits, Some(deadline))?;

    // AuthorityEvaluated: checks and the policy list are both decided here,
    // against the trust-boundary snapshot, before any block content is
    // folded in. `policy_result` is a `ComputeState` invariant assigned
    // exactly once, during this phase — a block can add facts to
    // `all_facts` afterward, but it can never be consulted when deciding
    // which policy matched (spec.md §8 scenario 4: a block cannot forge a
    // right the authority never granted, not even through the policy
    // list).
    let mut failed_checks = Vec::new();
    evaluate_checks(
        &authorizer.authority.checks,
        &authority_facts,
        CheckOrigin::Authority,
        &mut failed_checks,
    );
    evaluate_checks(
        &authorizer.checks,
        &authority_facts,
        CheckOrigin::Authorizer,
        &mut failed_checks,
    );
    let policy_result = evaluate_policies(&authorizer.policies, &authority_facts);

    // BlockEvaluated*: fold in each attenuation block, in order. Each
    // block's fixpoint runs against a *fresh* world built from only that
    // block's own facts and rules — a block's rules never see an earlier
    // (or the authority's) rules, only the cumulative fact set they left
    // behind. `authority_facts` above is never recomputed or overwritten —
    // it stays the trust boundary for the whole run. Blocks may still add
    // to `failed_checks` (§4.7 step 3), just never touch `policy_result`.
    let mut all_facts = authority_facts.clone();
    for (index, block) in authorizer.blocks.iter().enumerate() {
        if !block.facts.is_empty() && !limits.feature_flags.allow_non_authority_facts {
            return Err(ExecutionError::UntrustedBlockContent);
        }
        if !block.rules.is_empty() && !limits.feature_flags.allow_non_authority_rules {
            return Err(ExecutionError::UntrustedBlockContent);
        }

        let mut block_world = World::new();
        block_world.facts.extend(block.facts.iter().cloned());
        block_world.rules.extend(block.rules.iter().cloned());

        let seed = all_facts.clone();
        let (next_facts, round_iterations) = compute_all_facts(&block_world, seed, limits, Some(deadline))?;
        all_facts = next_facts;

        iterations += round_iterations;
        if iterations >= limits.max_iterations {
            return Err(ExecutionError::TooManyIterations);
        }

        evaluate_checks(&block.checks, &all_facts, CheckOrigin::Block(index), &mut failed_checks);
    }

    // Classified: the policy result decided back in the authority phase
    // stands; a failing check (from any phase) overrides even a matched
    // allow policy, since `FailedChecks` takes precedence over reporting
    // success.
    match policy_result {
        Some((_, policy, matched)) if policy.kind == PolicyKind::Deny => Err(
            ExecutionError::Unauthorized(AuthorizationError::DenyRuleMatched(failed_checks, matched)),
        ),
        Some((index, _, matched)) => {
            if !failed_checks.is_empty() {
                return Err(ExecutionError::Unauthorized(AuthorizationError::FailedChecks(
                    failed_checks,
                )));
            }
            Ok(AuthorizationSuccess {
                matched_policy_index: index,
                matched_query: matched,
                authority_facts,
                all_facts,
                iterations,
            })
        }
        None => Err(ExecutionError::Unauthorized(AuthorizationError::NoPoliciesMatched(
            failed_checks,
        ))),
    }
}

fn revocation_fact(index: i64, id: &[u8]) -> Fact {
    Fact::new("revocation_id", vec![Value::Integer(index), Value::Bytes(id.to_vec())])
}

fn evaluate_checks(
    checks: &[Check],
    facts: &HashSet<Fact>,
    origin: CheckOrigin,
    failed_checks: &mut Vec<FailedCheck>,
) {
    for (check_id, check) in checks.iter().enumerate() {
        if !check.passes(facts) {
            failed_checks.push(FailedCheck {
                origin: origin.clone(),
                check_id,
                head: check.queries[0].body[0].clone(),
            });
        }
    }
}

/// §4.8: post-authorization querying. A caller holding an
/// [`AuthorizationSuccess`] (or simply a fact set, for diagnostics after a
/// failure) can run an arbitrary query against it the same way a check
/// would, to project out values bound during the decision.
pub fn query_authorizer_facts(facts: &HashSet<Fact>, query: &Query) -> Vec<Binding> {
    solve(&query.body, &query.expressions, facts)
}

/// query only what was reachable trusting the authority block and the
/// authorizer's own program — never an attenuation block's contribution.
pub fn query_authority_facts(success: &AuthorizationSuccess, query: &Query) -> Vec<Binding> {
    query_authorizer_facts(&success.authority_facts, query)
}

/// query everything the fixpoint derived, authority and blocks alike.
pub fn query_all_facts(success: &AuthorizationSuccess, query: &Query) -> Vec<Binding> {
    query_authorizer_facts(&success.all_facts, query)
}

/// §4.8: every distinct value a named variable took across a set of
/// bindings — e.g. every resource a query matched, deduplicated.
pub fn values_for(bindings: &[Binding], name: &str) -> HashSet<Value> {
    bindings.iter().filter_map(|b| b.get(name).cloned()).collect()
}

/// §4.8: the single value a named variable took, if the bindings agree on
/// exactly one — `None` if the variable is unbound in every binding, or if
/// more than one distinct value was produced.
pub fn value_for(bindings: &[Binding], name: &str) -> Option<Value> {
    let mut values = values_for(bindings, name).into_iter();
    let first = values.next()?;
    if values.next().is_some() {
        None
    } else {
        Some(first)
    }
}
