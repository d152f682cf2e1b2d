mod common;

use common::{fixture, fixture_with_settings, violation, ORDER_CUSTOMER, UNI_CUSTOMER};
use graphguard_core::{CachePool, EngineSettings};

#[test]
fn repeated_unforced_reads_hit_the_cache() {
    let fx = fixture();
    fx.storage.seed_atom("Order", "o1");
    let conjunct = fx.runtime.model().conjunct(ORDER_CUSTOMER).unwrap();

    let first = conjunct.get_violations(&fx.runtime, false).unwrap();
    let second = conjunct.get_violations(&fx.runtime, false).unwrap();
    let third = conjunct.get_violations(&fx.runtime, false).unwrap();

    assert_eq!(first, vec![violation(ORDER_CUSTOMER, "o1", "o1")]);
    assert_eq!(first, second);
    assert_eq!(second, third);
    assert_eq!(fx.storage.queries(), 1);
}

#[test]
fn forced_reads_always_query() {
    let fx = fixture();
    let conjunct = fx.runtime.model().conjunct(ORDER_CUSTOMER).unwrap();
    fx.pool
        .save(ORDER_CUSTOMER, &[violation(ORDER_CUSTOMER, "stale", "stale")])
        .unwrap();

    for expected_queries in 1..=3 {
        let violations = conjunct.get_violations(&fx.runtime, true).unwrap();
        assert!(violations.is_empty());
        assert_eq!(fx.storage.queries(), expected_queries);
    }
}

#[test]
fn forced_evaluation_refreshes_stale_entry() {
    let fx = fixture();
    fx.pool
        .save(ORDER_CUSTOMER, &[violation(ORDER_CUSTOMER, "A", "B")])
        .unwrap();
    let rule = fx.runtime.model().rule("orderHasCustomer").unwrap();

    let cached = rule.check_rule(&fx.runtime, false);
    assert_eq!(cached.len(), 1);
    assert_eq!(cached[0].rule().id(), "orderHasCustomer");
    assert_eq!((cached[0].src(), cached[0].tgt()), ("A", "B"));
    assert_eq!(fx.storage.queries(), 0);

    let conjunct = fx.runtime.model().conjunct(ORDER_CUSTOMER).unwrap();
    assert!(conjunct.get_violations(&fx.runtime, true).unwrap().is_empty());
    assert!(conjunct.get_violations(&fx.runtime, false).unwrap().is_empty());
    assert!(rule.check_rule(&fx.runtime, false).is_empty());
    assert_eq!(fx.storage.queries(), 1);
}

#[test]
fn evaluation_is_staged_until_committed() {
    let fx = fixture();
    fx.storage.seed_atom("Order", "o1");
    let conjunct = fx.runtime.model().conjunct(ORDER_CUSTOMER).unwrap();

    conjunct.evaluate(&fx.runtime).unwrap();
    assert!(fx.runtime.cache().is_staged(ORDER_CUSTOMER));
    assert!(fx.pool.get(ORDER_CUSTOMER).unwrap().is_none());

    fx.runtime.cache().commit([ORDER_CUSTOMER]).unwrap();
    assert_eq!(
        fx.pool.get(ORDER_CUSTOMER).unwrap(),
        Some(vec![violation(ORDER_CUSTOMER, "o1", "o1")])
    );
}

#[test]
fn uni_and_inj_conjuncts_are_skipped_when_configured() {
    let fx = fixture_with_settings(EngineSettings {
        skip_uni_inj_conjuncts: true,
        ..EngineSettings::default()
    });
    fx.storage.seed_link("customer[Order*Customer]", "o1", "c1");
    fx.storage.seed_link("customer[Order*Customer]", "o1", "c2");
    let conjunct = fx.runtime.model().conjunct(UNI_CUSTOMER).unwrap();

    assert!(conjunct.get_violations(&fx.runtime, true).unwrap().is_empty());
    assert_eq!(fx.storage.queries(), 0);
}

#[test]
fn uni_conjunct_is_evaluated_by_default() {
    let fx = fixture();
    fx.storage.seed_link("customer[Order*Customer]", "o1", "c1");
    fx.storage.seed_link("customer[Order*Customer]", "o1", "c2");
    let conjunct = fx.runtime.model().conjunct(UNI_CUSTOMER).unwrap();

    assert_eq!(
        conjunct.get_violations(&fx.runtime, true).unwrap(),
        vec![violation(UNI_CUSTOMER, "o1", "o1")]
    );
}
