/*
 * Copyright (c) 2019 Geoffroy Couprie <contact@geoffroycouprie.com> and Contributors to the Eclipse Foundation.
 * SPDX-License-Identifier: Apache-2.0
 */
//! end-to-end exercises of the C7 state machine, mirroring the donor's
//! `biscuit-auth/tests/rights.rs` style: build an `Authorizer` by hand,
//! call `authorize`, and assert on the classification.
use std::time::Duration;

use biscuit_core::authorizer::{authorize, Authorizer, Block, FeatureFlags, Limits};
use biscuit_core::check::{Check, Policy, PolicyKind, Query};
use biscuit_core::datalog::{Binary, Expression, Fact, Predicate, Rule, Term, Value};
use biscuit_core::error::{AuthorizationError, ExecutionError};

fn limits() -> Limits {
    Limits {
        max_facts: 1000,
        max_iterations: 100,
        max_time: Duration::from_millis(100),
        feature_flags: FeatureFlags::default(),
    }
}

fn var(name: &str) -> Term {
    Term::Variable(name.to_string())
}

fn str_value(s: &str) -> Term {
    Term::Value(Value::Str(s.to_string()))
}

fn fact(name: &str, terms: Vec<Value>) -> Fact {
    Fact::new(name, terms)
}

fn query(predicates: Vec<Predicate>) -> Query {
    Query::new(predicates, vec![]).unwrap()
}

#[test]
fn a_right_the_authority_granted_is_allowed() {
    let mut authorizer = Authorizer::new();
    authorizer
        .authority
        .facts
        .push(fact("right", vec![Value::Str("/a/file1.txt".to_string()), Value::Str("read".to_string())]));
    authorizer.facts.push(fact("resource", vec![Value::Str("/a/file1.txt".to_string())]));
    authorizer.facts.push(fact("operation", vec![Value::Str("read".to_string())]));

    authorizer.policies.push(
        Policy::new(
            PolicyKind::Allow,
            vec![query(vec![
                Predicate::new("resource", vec![var("res")]),
                Predicate::new("operation", vec![var("op")]),
                Predicate::new("right", vec![var("res"), var("op")]),
            ])],
        )
        .unwrap(),
    );

    let success = authorize(&authorizer, &limits()).expect("authority grant should be honored");
    assert_eq!(success.matched_policy_index, 0);
}

#[test]
fn an_explicit_deny_overrides_a_later_allow() {
    let mut authorizer = Authorizer::new();
    authorizer.authority.facts.push(fact("revoked", vec![Value::Str("t1".to_string())]));
    authorizer.authority.facts.push(fact("right", vec![Value::Str("/a/file1.txt".to_string())]));

    authorizer
        .policies
        .push(Policy::new(PolicyKind::Deny, vec![query(vec![Predicate::new("revoked", vec![str_value("t1")])])]).unwrap());
    authorizer
        .policies
        .push(Policy::new(PolicyKind::Allow, vec![query(vec![Predicate::new("right", vec![var("x")])])]).unwrap());

    let err = authorize(&authorizer, &limits()).unwrap_err();
    match err {
        ExecutionError::Unauthorized(AuthorizationError::DenyRuleMatched(_, matched)) => {
            assert_eq!(matched.query_index, 0);
        }
        other => panic!("expected a matched deny, got {other:?}"),
    }
}

#[test]
fn a_failing_check_overrides_an_otherwise_matching_allow() {
    let mut authorizer = Authorizer::new();
    authorizer.authority.facts.push(fact("right", vec![Value::Str("/a/file1.txt".to_string())]));
    authorizer.authority.checks.push(
        Check::new(vec![query(vec![Predicate::new("expiration", vec![var("_")])])]).unwrap(),
    );

    authorizer
        .policies
        .push(Policy::new(PolicyKind::Allow, vec![query(vec![Predicate::new("right", vec![var("x")])])]).unwrap());

    let err = authorize(&authorizer, &limits()).unwrap_err();
    assert!(matches!(
        err,
        ExecutionError::Unauthorized(AuthorizationError::FailedChecks(_))
    ));
}

#[test]
fn an_attenuation_block_cannot_forge_an_authority_right() {
    // spec.md §8 scenario 4, literally: the policy list is decided during
    // the authority phase, before this block is even loaded, so a policy
    // that only a block's forged fact could satisfy must see
    // `NoPoliciesMatched`, not succeed.
    let mut authorizer = Authorizer::new();
    authorizer.authority.facts.push(fact("right", vec![Value::Str("/a/file1.txt".to_string())]));

    let mut forged_block = Block::default();
    forged_block.facts.push(fact("right", vec![Value::Str("/b/secret.txt".to_string())]));
    authorizer.blocks.push(forged_block);

    authorizer.policies.push(
        Policy::new(
            PolicyKind::Allow,
            vec![query(vec![Predicate::new("right", vec![str_value("/b/secret.txt")])])],
        )
        .unwrap(),
    );

    let mut limits = limits();
    limits.feature_flags.allow_non_authority_facts = true;

    let err = authorize(&authorizer, &limits).unwrap_err();
    assert!(matches!(
        err,
        ExecutionError::Unauthorized(AuthorizationError::NoPoliciesMatched(_))
    ));
}

#[test]
fn exceeding_max_facts_is_a_fatal_resource_error_not_a_denial() {
    let mut authorizer = Authorizer::new();
    for i in 0..10 {
        authorizer.authority.facts.push(fact("item", vec![Value::Integer(i)]));
    }
    authorizer
        .policies
        .push(Policy::new(PolicyKind::Allow, vec![query(vec![Predicate::new("item", vec![var("x")])])]).unwrap());

    let mut limits = limits();
    limits.max_facts = 3;

    let err = authorize(&authorizer, &limits).unwrap_err();
    assert_eq!(err, ExecutionError::TooManyFacts);
}

#[test]
fn a_deny_policy_can_reject_a_revoked_tokens_revocation_id() {
    // spec.md's glossary: a revocation identifier is seeded as a fact "so
    // that policies can deny known-bad tokens" — the authorizer supplies
    // its own denylist as facts and a deny policy that joins against the
    // engine-seeded `revocation_id(index, bytes)`.
    let mut authorizer = Authorizer::new();
    authorizer.authority.revocation_id = vec![0xAA];
    authorizer.authority.facts.push(fact("right", vec![Value::Str("/a/file1.txt".to_string())]));
    authorizer.facts.push(fact("revoked", vec![Value::Bytes(vec![0xAA])]));

    authorizer.policies.push(
        Policy::new(
            PolicyKind::Deny,
            vec![query(vec![
                Predicate::new("revocation_id", vec![var("index"), var("id")]),
                Predicate::new("revoked", vec![var("id")]),
            ])],
        )
        .unwrap(),
    );
    authorizer
        .policies
        .push(Policy::new(PolicyKind::Allow, vec![query(vec![Predicate::new("right", vec![var("x")])])]).unwrap());

    let err = authorize(&authorizer, &limits()).unwrap_err();
    assert!(matches!(
        err,
        ExecutionError::Unauthorized(AuthorizationError::DenyRuleMatched(_, _))
    ));
}

#[test]
fn a_deny_policy_does_not_fire_when_the_revocation_id_is_not_on_the_denylist() {
    let mut authorizer = Authorizer::new();
    authorizer.authority.revocation_id = vec![0xCC];
    authorizer.authority.facts.push(fact("right", vec![Value::Str("/a/file1.txt".to_string())]));
    authorizer.facts.push(fact("revoked", vec![Value::Bytes(vec![0xAA])]));

    authorizer.policies.push(
        Policy::new(
            PolicyKind::Deny,
            vec![query(vec![
                Predicate::new("revocation_id", vec![var("index"), var("id")]),
                Predicate::new("revoked", vec![var("id")]),
            ])],
        )
        .unwrap(),
    );
    authorizer
        .policies
        .push(Policy::new(PolicyKind::Allow, vec![query(vec![Predicate::new("right", vec![var("x")])])]).unwrap());

    let success = authorize(&authorizer, &limits()).expect("revocation id not on the denylist should still authorize");
    assert_eq!(success.matched_policy_index, 1);
}

#[test]
fn revocation_ids_are_seeded_before_the_authority_phase_even_for_extra_blocks() {
    // spec.md §8 scenario 6: the authority's and every extra block's
    // revocation_id is visible to an authorizer-level check, because
    // seeding happens once, up front, before the authority fixpoint runs —
    // not when that block is folded in during BlockEvaluated.
    let mut authorizer = Authorizer::new();
    authorizer.authority.revocation_id = vec![0xAA];
    authorizer.blocks.push(Block {
        revocation_id: vec![0xBB],
        ..Block::default()
    });

    let seeded_for_block_one = Predicate::new(
        "revocation_id",
        vec![Term::Value(Value::Integer(1)), Term::Value(Value::Bytes(vec![0xBB]))],
    );
    authorizer
        .checks
        .push(Check::new(vec![query(vec![seeded_for_block_one])]).unwrap());

    let any_revocation_id = Predicate::new("revocation_id", vec![var("index"), var("id")]);
    authorizer
        .policies
        .push(Policy::new(PolicyKind::Allow, vec![query(vec![any_revocation_id])]).unwrap());

    let success = authorize(&authorizer, &limits()).expect("both revocation facts should be visible at authority time");
    assert!(success
        .authority_facts
        .contains(&fact("revocation_id", vec![Value::Integer(0), Value::Bytes(vec![0xAA])])));
    assert!(success
        .authority_facts
        .contains(&fact("revocation_id", vec![Value::Integer(1), Value::Bytes(vec![0xBB])])));
}

#[test]
fn a_blocks_fixpoint_cannot_see_the_authoritys_rules() {
    // spec.md §4.7: "Build world from *only* that block's facts and rules
    // (block rules cannot see other blocks' rules)" — an authority rule
    // must not fire against a fact injected by a later block.
    let mut authorizer = Authorizer::new();
    authorizer.authority.rules.push(
        Rule::new(
            Predicate::new("derived", vec![var("x")]),
            vec![Predicate::new("seed", vec![var("x")])],
            vec![],
        )
        .unwrap(),
    );

    let mut block = Block::default();
    block.facts.push(fact("seed", vec![Value::Integer(1)]));
    authorizer.blocks.push(block);

    authorizer
        .policies
        .push(Policy::new(PolicyKind::Allow, vec![query(vec![Predicate::new("derived", vec![var("x")])])]).unwrap());

    let mut limits = limits();
    limits.feature_flags.allow_non_authority_facts = true;

    let err = authorize(&authorizer, &limits).unwrap_err();
    assert!(matches!(
        err,
        ExecutionError::Unauthorized(AuthorizationError::NoPoliciesMatched(_))
    ));
}

#[test]
fn a_blocks_fixpoint_cannot_see_an_earlier_blocks_rules() {
    let mut authorizer = Authorizer::new();

    let mut first_block = Block::default();
    first_block.rules.push(
        Rule::new(
            Predicate::new("derived", vec![var("x")]),
            vec![Predicate::new("seed", vec![var("x")])],
            vec![],
        )
        .unwrap(),
    );
    authorizer.blocks.push(first_block);

    let mut second_block = Block::default();
    second_block.facts.push(fact("seed", vec![Value::Integer(1)]));
    authorizer.blocks.push(second_block);

    authorizer
        .policies
        .push(Policy::new(PolicyKind::Allow, vec![query(vec![Predicate::new("derived", vec![var("x")])])]).unwrap());

    let mut limits = limits();
    limits.feature_flags.allow_non_authority_facts = true;
    limits.feature_flags.allow_non_authority_rules = true;

    let err = authorize(&authorizer, &limits).unwrap_err();
    assert!(matches!(
        err,
        ExecutionError::Unauthorized(AuthorizationError::NoPoliciesMatched(_))
    ));
}

#[test]
fn monotonicity_adding_a_fact_can_only_unlock_more_solutions() {
    let rule_body = vec![Predicate::new("member", vec![var("group")])];
    let derived = Rule::new(
        Predicate::new("can_read", vec![var("group")]),
        rule_body,
        vec![Expression::binary(
            Binary::Equal,
            Expression::value(var("group")),
            Expression::value(Value::Str("staff".to_string())),
        )],
    )
    .unwrap();

    let mut without_membership = Authorizer::new();
    without_membership.authority.rules.push(derived.clone());
    without_membership
        .policies
        .push(Policy::new(PolicyKind::Allow, vec![query(vec![Predicate::new("can_read", vec![var("g")])])]).unwrap());

    assert!(authorize(&without_membership, &limits()).is_err());

    let mut with_membership = Authorizer::new();
    with_membership.authority.rules.push(derived);
    with_membership
        .authority
        .facts
        .push(fact("member", vec![Value::Str("staff".to_string())]));
    with_membership
        .policies
        .push(Policy::new(PolicyKind::Allow, vec![query(vec![Predicate::new("can_read", vec![var("g")])])]).unwrap());

    assert!(authorize(&with_membership, &limits()).is_ok());
}
