mod common;

use common::{fixture, violation, ANCESTORS, ORDER_CUSTOMER};
use graphguard_core::{rule_engine, CachePool, Rule, RuleType, UserLogLevel, Violation};

fn normalized(violations: &[Violation<'_>]) -> Vec<(String, String, String)> {
    let mut rows: Vec<(String, String, String)> = violations
        .iter()
        .map(|violation| {
            (
                violation.rule().id().to_string(),
                violation.src().to_string(),
                violation.tgt().to_string(),
            )
        })
        .collect();
    rows.sort();
    rows
}

#[test]
fn check_rule_is_empty_iff_conjuncts_are_empty() {
    let fx = fixture();
    let rule = fx.runtime.model().rule("orderHasCustomer").unwrap();
    assert!(rule.check_rule(&fx.runtime, true).is_empty());

    fx.storage.seed_atom("Order", "o1");
    fx.storage.seed_atom("Order", "o2");
    let violations = rule.check_rule(&fx.runtime, true);
    assert_eq!(violations.len(), 2);
    assert_eq!(violations[0].message(), "Order o1 has no customer");

    fx.storage.seed_link("customer[Order*Customer]", "o1", "c1");
    fx.storage.seed_link("customer[Order*Customer]", "o2", "c1");
    assert!(rule.check_rule(&fx.runtime, true).is_empty());
}

#[test]
fn batched_lookup_matches_per_rule_evaluation() {
    let fx = fixture();
    fx.storage.seed_atom("Order", "o1");
    fx.storage.seed_link("parent[Node*Node]", "a", "b");
    // Stale hit for one conjunct, miss for the others.
    fx.pool
        .save(ORDER_CUSTOMER, &[violation(ORDER_CUSTOMER, "o9", "o9")])
        .unwrap();

    let rules: Vec<&Rule> = fx.runtime.model().rules().iter().collect();
    let per_rule = rule_engine::get_violations(&fx.runtime, &rules);
    fx.runtime.cache().discard();
    let batched = rule_engine::get_violations_from_cache(&fx.runtime, &rules).unwrap();

    assert_eq!(normalized(&batched), normalized(&per_rule));
    assert_eq!(
        normalized(&batched),
        vec![
            ("assignWalkIn".to_string(), "o9".to_string(), "o9".to_string()),
            ("computeAncestors".to_string(), "a".to_string(), "b".to_string()),
            ("orderHasCustomer".to_string(), "o9".to_string(), "o9".to_string()),
        ]
    );
}

#[test]
fn batched_lookup_reads_hits_in_one_bulk_call() {
    let fx = fixture();
    fx.pool
        .save(ORDER_CUSTOMER, &[violation(ORDER_CUSTOMER, "o1", "o1")])
        .unwrap();
    fx.pool.save(ANCESTORS, &[]).unwrap();

    let rules: Vec<&Rule> = fx.runtime.model().rules().iter().collect();
    let violations = rule_engine::get_violations_from_cache(&fx.runtime, &rules).unwrap();

    assert_eq!(fx.pool.bulk_reads(), 1);
    // Only the uncached uniqueness conjunct is evaluated.
    assert_eq!(fx.storage.queries(), 1);
    // One violation per rule sharing the cached conjunct.
    assert_eq!(violations.len(), 2);
}

#[test]
fn failing_conjunct_makes_rule_vacuously_hold() {
    let fx = fixture();
    fx.storage.seed_atom("Order", "o1");
    fx.storage.fail_queries(true);
    let rule = fx.runtime.model().rule("orderHasCustomer").unwrap();

    assert!(rule.try_check_rule(&fx.runtime, true).is_err());
    assert!(rule.check_rule(&fx.runtime, true).is_empty());
    assert_eq!(fx.runtime.user_log().count(UserLogLevel::Error), 1);
}

#[test]
fn report_rows_carry_rule_metadata() {
    let fx = fixture();
    fx.storage.seed_atom("Order", "o1");
    let rule = fx.runtime.model().rule("orderHasCustomer").unwrap();

    let violations = rule.check_rule(&fx.runtime, false);
    let report = rule_engine::report(&violations);

    assert_eq!(report.len(), 1);
    assert_eq!(report[0].rule_id, "orderHasCustomer");
    assert_eq!(report[0].kind, RuleType::Invariant);
    assert_eq!(report[0].heading, "Every order needs a customer");
    assert_eq!(report[0].message, "Order o1 has no customer");
}
