//! Property and scenario tests for range lock tables

use dtx_lock::{
    KeyRange, LockMode, LockRequest, PendingClaims, SegmentView, TableResource, TxnId,
};
use dtx_primitives::OrderedF64;
use proptest::prelude::*;

fn r(l: i32, h: i32) -> KeyRange<i32> {
    KeyRange::new(l, h).unwrap()
}

/// Granted segments are sorted, disjoint and well formed
fn check_segments<K: Ord + Clone + std::fmt::Debug>(segments: &[SegmentView<K>]) {
    for pair in segments.windows(2) {
        assert!(
            pair[0].range.hi() <= pair[1].range.lo(),
            "overlapping segments {:?} and {:?}",
            pair[0].range,
            pair[1].range
        );
    }
    for segment in segments {
        assert!(!segment.holders.is_empty());
        if segment.mode == LockMode::Exclusive {
            assert_eq!(segment.holders.len(), 1);
        }
        for waiter in &segment.waiters {
            assert!(segment.range.contains(&waiter.range));
            assert!(!segment.holders.contains(&waiter.txn));
        }
    }
}

/// Every unit of `range` is either held by `txn` in at least `mode` or
/// queued for it, never both
fn check_coverage(segments: &[SegmentView<i32>], txn: TxnId, l: i32, h: i32, mode: LockMode) {
    for k in l..h {
        let unit = r(k, k + 1);
        let held = segments.iter().any(|s| {
            s.range.contains(&unit) && s.holders.contains(&txn) && s.mode >= mode
        });
        let queued = segments.iter().any(|s| {
            s.waiters
                .iter()
                .any(|w| w.txn == txn && w.range.contains(&unit) && w.mode == mode)
        });
        assert!(held ^ queued, "{} key {} held={} queued={}", txn, k, held, queued);
    }
}

fn waiter_count(segments: &[SegmentView<i32>], txn: TxnId) -> usize {
    segments
        .iter()
        .map(|s| s.waiters.iter().filter(|w| w.txn == txn).count())
        .sum()
}

fn arb_request() -> impl Strategy<Value = (i32, i32, bool)> {
    (0i32..30, 1i32..10, any::<bool>())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn prop_table_invariants(
        requests in prop::collection::vec(arb_request(), 1..12),
        release_picks in prop::collection::vec(any::<prop::sample::Index>(), 12),
    ) {
        let table = TableResource::<i32>::new("prop");
        let mut ledger = PendingClaims::new();
        let mut live: Vec<(TxnId, i32, i32, LockMode)> = Vec::new();

        for (i, (l, len, exclusive)) in requests.iter().enumerate() {
            let txn = TxnId::new(i as u64 + 1);
            let mode = if *exclusive { LockMode::Exclusive } else { LockMode::Shared };
            table.apply_for(txn, &LockRequest::new(r(*l, l + len), mode), &mut ledger);
            live.push((txn, *l, l + len, mode));

            let segments = table.segments();
            check_segments(&segments);
            for (txn, l, h, mode) in &live {
                check_coverage(&segments, *txn, *l, *h, *mode);
                prop_assert_eq!(ledger.pending(*txn), waiter_count(&segments, *txn));
            }
        }

        for pick in release_picks {
            if live.is_empty() {
                break;
            }
            let (txn, ..) = live.remove(pick.index(live.len()));
            table.release(txn, &mut ledger);

            prop_assert!(!table.holds(txn));
            prop_assert!(!table.is_waiting(txn));
            prop_assert_eq!(ledger.pending(txn), 0);

            let segments = table.segments();
            check_segments(&segments);
            for (txn, l, h, mode) in &live {
                check_coverage(&segments, *txn, *l, *h, *mode);
                prop_assert_eq!(ledger.pending(*txn), waiter_count(&segments, *txn));
            }
        }

        for (txn, ..) in live.drain(..) {
            table.release(txn, &mut ledger);
        }
        prop_assert!(table.is_empty());
        prop_assert!(ledger.is_settled());
    }

    #[test]
    fn prop_release_twice_is_noop(
        requests in prop::collection::vec(arb_request(), 1..8),
        victim in any::<prop::sample::Index>(),
    ) {
        let table = TableResource::<i32>::new("prop");
        let mut ledger = PendingClaims::new();
        for (i, (l, len, exclusive)) in requests.iter().enumerate() {
            let mode = if *exclusive { LockMode::Exclusive } else { LockMode::Shared };
            table.apply_for(TxnId::new(i as u64 + 1), &LockRequest::new(r(*l, l + len), mode), &mut ledger);
        }
        let txn = TxnId::new(victim.index(requests.len()) as u64 + 1);

        table.release(txn, &mut ledger);
        let before = table.segments();
        let second = table.release(txn, &mut ledger);

        prop_assert_eq!(second.freed + second.replayed + second.dropped, 0);
        prop_assert_eq!(before, table.segments());
    }
}

// ==================== Scenario Tests ====================

#[test]
fn test_queued_shared_is_merged_after_release() {
    let table = TableResource::<i32>::new("user");
    let mut ledger = PendingClaims::new();
    let (t1, t2) = (TxnId::new(1), TxnId::new(2));

    table.apply_for(t1, &LockRequest::new(r(10, 30), LockMode::Exclusive), &mut ledger);
    table.apply_for(t2, &LockRequest::new(r(20, 50), LockMode::Shared), &mut ledger);

    let segments = table.segments();
    assert_eq!(segments.len(), 2);
    assert_eq!(segments[0].waiters[0].range, r(20, 30));
    assert_eq!(segments[1].range, r(30, 50));

    table.release(t1, &mut ledger);

    let segments = table.segments();
    assert_eq!(segments.len(), 1);
    assert_eq!(segments[0].range, r(20, 50));
    assert_eq!(segments[0].holders, vec![t2]);
    assert_eq!(ledger.take_runnable(), vec![t2]);
}

#[test]
fn test_third_request_interleaves_after_release() {
    let table = TableResource::<i32>::new("user");
    let mut ledger = PendingClaims::new();
    let (t1, t2, t3) = (TxnId::new(1), TxnId::new(2), TxnId::new(3));

    table.apply_for(t1, &LockRequest::new(r(10, 30), LockMode::Exclusive), &mut ledger);
    table.apply_for(t2, &LockRequest::new(r(20, 50), LockMode::Shared), &mut ledger);
    table.apply_for(t3, &LockRequest::new(r(25, 40), LockMode::Exclusive), &mut ledger);

    assert_eq!(ledger.pending(t3), 2);

    table.release(t1, &mut ledger);
    assert_eq!(ledger.take_runnable(), vec![t2]);

    table.release(t2, &mut ledger);
    assert_eq!(ledger.take_runnable(), vec![t3]);
    assert_eq!(table.held_ranges(t3), vec![r(25, 40)]);
}

#[test]
fn test_fifo_across_split_segments() {
    let table = TableResource::<i32>::new("user");
    let mut ledger = PendingClaims::new();
    let ids: Vec<TxnId> = (1..=4).map(TxnId::new).collect();

    table.apply_for(ids[0], &LockRequest::new(r(0, 10), LockMode::Exclusive), &mut ledger);
    table.apply_for(ids[1], &LockRequest::new(r(0, 10), LockMode::Exclusive), &mut ledger);
    table.apply_for(ids[2], &LockRequest::new(r(5, 10), LockMode::Exclusive), &mut ledger);
    table.apply_for(ids[3], &LockRequest::new(r(0, 5), LockMode::Exclusive), &mut ledger);

    table.release(ids[0], &mut ledger);
    assert_eq!(ledger.take_runnable(), vec![ids[1]]);

    table.release(ids[1], &mut ledger);
    let mut runnable = ledger.take_runnable();
    runnable.sort();
    assert_eq!(runnable, vec![ids[2], ids[3]]);
}

#[test]
fn test_string_keys() {
    let table = TableResource::<String>::new("accounts");
    let mut ledger = PendingClaims::new();
    let range = |l: &str, h: &str| KeyRange::new(l.to_string(), h.to_string()).unwrap();

    table.apply_for(TxnId::new(1), &LockRequest::new(range("alice", "carol"), LockMode::Exclusive), &mut ledger);
    let outcome = table.apply_for(
        TxnId::new(2),
        &LockRequest::new(KeyRange::point("bob".to_string()), LockMode::Shared),
        &mut ledger,
    );

    assert_eq!(outcome.queued, 1);
    table.release(TxnId::new(1), &mut ledger);
    assert_eq!(ledger.take_runnable(), vec![TxnId::new(2)]);
    assert_eq!(table.len(), 1);
}

#[test]
fn test_float_keys() {
    let table = TableResource::<OrderedF64>::new("prices");
    let mut ledger = PendingClaims::new();
    let f = |v: f64| OrderedF64::new(v).unwrap();

    table.apply_for(TxnId::new(1), &LockRequest::new(KeyRange::new(f(0.5), f(1.5)).unwrap(), LockMode::Shared), &mut ledger);
    let outcome = table.apply_for(
        TxnId::new(2),
        &LockRequest::new(KeyRange::new(f(1.0), f(2.0)).unwrap(), LockMode::Shared),
        &mut ledger,
    );

    assert!(outcome.is_granted());
    assert_eq!(table.len(), 3);
}
