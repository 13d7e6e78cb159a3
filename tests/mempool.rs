use std::collections::HashSet;
use std::sync::Arc;

use qsim::common::*;
use qsim::core::WorldStateW;
use qsim::mempool::{Mempool, MempoolOrder};
use qsim::state::AccountStore;
use qsim::tx::{GasFee, Transaction, TxRequest};
use qsim::SimError;

fn funded(names: &[&str]) -> (AccountStore, Vec<Addr>) {
    let mut store = AccountStore::new();
    let addrs: Vec<Addr> = names.iter().map(|n| Addr::from_label(n)).collect();
    for a in addrs.iter() {
        store.set_balance(a, &ether(100));
    }
    (store, addrs)
}

fn tx(from: &Addr, nonce: u64, tip_gwei: u64) -> Transaction {
    TxRequest::new(from).to(&Addr::from_label("sink")).fill(
        nonce,
        21000,
        GasFee::Dynamic {
            max_fee: gwei(1000),
            priority_fee: gwei(tip_gwei),
        },
    )
}

#[test]
fn test_priority_order() {
    let (store, a) = funded(&["t1", "t2", "t3"]);
    let pool = Mempool::new(MempoolOrder::Priority, gwei(1));
    let t1 = pool.submit(tx(&a[0], 0, 10), &store).unwrap();
    let t2 = pool.submit(tx(&a[1], 0, 20), &store).unwrap();
    // same tip as t1 but later
    let t3 = pool.submit(tx(&a[2], 0, 10), &store).unwrap();

    let peek: Vec<Hash> = pool.pending_snapshot().iter().map(|t| t.hash().clone()).collect();
    assert_eq!(peek, vec![t2.hash().clone(), t1.hash().clone(), t3.hash().clone()]);
    assert_eq!(pool.len(), 3);

    let drained = pool.drain(2);
    assert_eq!(drained.len(), 2);
    assert_eq!(drained[0].hash(), t2.hash());
    assert_eq!(drained[1].hash(), t1.hash());
    assert!(drained[0].seq() > drained[1].seq());
    assert_eq!(pool.len(), 1);
}

#[test]
fn test_fifo_order() {
    let (store, a) = funded(&["t1", "t2"]);
    let pool = Mempool::new(MempoolOrder::Fifo, gwei(1));
    let t1 = pool.submit(tx(&a[0], 0, 1), &store).unwrap();
    let t2 = pool.submit(tx(&a[1], 0, 50), &store).unwrap();
    let order: Vec<Hash> = pool.drain(10).iter().map(|e| e.hash().clone()).collect();
    assert_eq!(order, vec![t1.hash().clone(), t2.hash().clone()]);
    assert!(pool.is_empty());

    let t1 = pool.submit(tx(&a[0], 1, 1), &store);
    assert!(matches!(t1, Err(SimError::InvalidNonce { expected: 0, got: 1, .. })));
    let t1 = pool.submit(tx(&a[0], 0, 1), &store).unwrap();
    let t2 = pool.submit(tx(&a[1], 0, 50), &store).unwrap();
    // switching the policy reorders what is already queued
    pool.set_order(MempoolOrder::Priority);
    assert_eq!(pool.order(), MempoolOrder::Priority);
    let peek = pool.pending_snapshot();
    assert_eq!(peek[0].hash(), t2.hash());
    assert_eq!(peek[1].hash(), t1.hash());
}

#[test]
fn test_sender_nonce_order() {
    let (store, a) = funded(&["rich", "other"]);
    let pool = Mempool::new(MempoolOrder::Priority, gwei(1));
    // a low tip head keeps the sender's high tip follow-up behind it
    let n0 = pool.submit(tx(&a[0], 0, 1), &store).unwrap();
    let n1 = pool.submit(tx(&a[0], 1, 100), &store).unwrap();
    let o0 = pool.submit(tx(&a[1], 0, 50), &store).unwrap();
    assert_eq!(pool.queued(&a[0]), 2);

    let order: Vec<Hash> = pool.pending_snapshot().iter().map(|t| t.hash().clone()).collect();
    assert_eq!(order, vec![o0.hash().clone(), n0.hash().clone(), n1.hash().clone()]);

    assert!(matches!(
        pool.submit(tx(&a[0], 1, 1), &store),
        Err(SimError::InvalidNonce { expected: 2, got: 1, .. })
    ));
    assert!(matches!(
        pool.submit(Transaction::new(n1.body().clone()), &store),
        Err(SimError::AlreadyKnown(_))
    ));
}

#[test]
fn test_balance_precheck() {
    let (mut store, a) = funded(&["poor"]);
    store.set_balance(&a[0], &gwei(1));
    let pool = Mempool::new(MempoolOrder::Priority, gwei(1));
    assert!(matches!(
        pool.submit(tx(&a[0], 0, 1), &store),
        Err(SimError::InsufficientBalance { .. })
    ));
    assert!(pool.is_empty());
}

#[test]
fn test_remove_with_dependents() {
    let (store, a) = funded(&["a", "b"]);
    let pool = Mempool::new(MempoolOrder::Priority, gwei(1));
    let txs: Vec<_> = (0..3)
        .map(|n| pool.submit(tx(&a[0], n, 1), &store).unwrap())
        .collect();
    let other = pool.submit(tx(&a[1], 0, 1), &store).unwrap();

    let removed = pool.remove(txs[1].hash()).unwrap();
    let removed: Vec<&Hash> = removed.iter().map(|t| t.hash()).collect();
    assert_eq!(removed, vec![txs[1].hash(), txs[2].hash()]);
    assert_eq!(pool.len(), 2);
    assert!(pool.get(txs[0].hash()).is_some());
    assert!(pool.get(other.hash()).is_some());
    assert!(matches!(
        pool.remove(txs[2].hash()),
        Err(SimError::UnknownTransaction(_))
    ));
    // the nonce gap is free again
    pool.submit(tx(&a[0], 1, 2), &store).unwrap();
}

#[test]
fn test_requeue_keeps_arrival() {
    let (store, a) = funded(&["a", "b"]);
    let pool = Mempool::new(MempoolOrder::Fifo, gwei(1));
    let first = pool.submit(tx(&a[0], 0, 1), &store).unwrap();
    let drained = pool.drain(1);
    let second = pool.submit(tx(&a[1], 0, 1), &store).unwrap();
    pool.requeue(drained);
    let order = pool.pending_snapshot();
    assert_eq!(order[0].hash(), first.hash());
    assert_eq!(order[1].hash(), second.hash());
}

#[test]
fn test_concurrent_submitters() {
    let names: Vec<String> = (0..8).map(|i| format!("sender{}", i)).collect();
    let refs: Vec<&str> = names.iter().map(|s| s.as_str()).collect();
    let (store, addrs) = funded(&refs);
    let store = Arc::new(store);
    let pool = Arc::new(Mempool::new(MempoolOrder::Fifo, gwei(1)));

    let handles: Vec<_> = addrs
        .into_iter()
        .map(|addr| {
            let pool = pool.clone();
            let store = store.clone();
            std::thread::spawn(move || {
                for n in 0..50 {
                    pool.submit(tx(&addr, n, 1), &*store).unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let entries = pool.drain(usize::MAX);
    assert_eq!(entries.len(), 8 * 50);
    let seqs: HashSet<u64> = entries.iter().map(|e| e.seq()).collect();
    assert_eq!(seqs.len(), entries.len());
    // FIFO hands them out in arrival order
    assert!(entries.windows(2).all(|w| w[0].seq() < w[1].seq()));
}
