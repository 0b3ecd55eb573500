use bounter_rs::factory::{make_counter, Counter, LogCounting};

#[test]
fn s6_cardinality_only_counter_rejects_get_but_tracks_cardinality() {
    let mut counter = make_counter(None, true, false, None).unwrap();
    counter.increment(b"foo").unwrap();
    counter.increment(b"foo").unwrap();
    counter.increment(b"bar").unwrap();

    assert!(counter.get(b"foo").is_err());
    assert_eq!(counter.cardinality(), 2);
}

#[test]
fn need_counts_true_requires_size_mb() {
    assert!(make_counter(None, true, true, None).is_err());
    assert!(make_counter(None, false, true, None).is_err());
}

#[test]
fn need_iteration_with_log_counting_is_rejected() {
    assert!(make_counter(Some(4), true, true, Some(LogCounting::Log8)).is_err());
}

#[test]
fn need_iteration_true_returns_hash_table_engine() {
    let counter = make_counter(Some(4), true, true, None).unwrap();
    assert!(matches!(counter, Counter::HashTable(_)));
}

#[test]
fn need_iteration_false_returns_sketch_engine_with_requested_variant() {
    let mut counter = make_counter(Some(4), false, true, Some(LogCounting::Log8)).unwrap();
    counter.increment(b"hot").unwrap();
    assert!(matches!(counter, Counter::Sketch(_)));
    assert!(counter.get(b"hot").unwrap() >= 1);
}

#[test]
fn default_sketch_variant_is_conservative() {
    let counter = make_counter(Some(1), false, true, None).unwrap();
    match counter {
        Counter::Sketch(cms) => assert_eq!(cms.variant(), bounter_rs::countmin::CellVariant::Conservative),
        _ => panic!("expected a sketch"),
    }
}
