use std::time::Duration;

use qsim::common::*;
use qsim::config::SimConfig;
use qsim::sim::{Simulator, Submitted};
use qsim::tx::TxRequest;
use qsim::SimError;

fn manual_sim(config: SimConfig) -> Simulator {
    let _ = env_logger::builder().is_test(true).try_init();
    let sim = Simulator::new(config).unwrap();
    sim.set_automine(false);
    sim
}

#[tokio::test]
async fn test_interval_mining() {
    let sim = manual_sim(SimConfig::default());
    let accounts = sim.accounts();
    let miner = sim
        .start_interval_mining(Some(Duration::from_millis(20)))
        .unwrap();

    let sent = sim
        .call(&accounts[0], &accounts[1], Bytes::empty(), ether(1))
        .unwrap();
    assert!(matches!(sent, Submitted::Pending(_)));

    let block = tokio::time::timeout(Duration::from_secs(5), sim.wait_for_block(1))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(block.number, 1);
    assert!(block.tx_hashes().any(|h| h == sent.hash()));
    assert!(sim.receipt(sent.hash()).unwrap().succeeded());

    // empty blocks keep coming
    tokio::time::timeout(Duration::from_secs(5), sim.wait_for_block(3))
        .await
        .unwrap()
        .unwrap();

    miner.stop();
    let height = sim.block_number();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(sim.block_number(), height);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_interval_from_config() {
    let mut config = SimConfig::default();
    config.mining.interval = Some(10);
    let sim = manual_sim(config);
    let _miner = sim.start_interval_mining(None).unwrap();
    let block = tokio::time::timeout(Duration::from_secs(5), sim.wait_for_block(2))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(block.number, 2);

    // without an interval there is nothing to start
    let sim = manual_sim(SimConfig::default());
    assert!(sim.start_interval_mining(None).is_none());
}

#[tokio::test]
async fn test_wait_for_mined_block() {
    let sim = manual_sim(SimConfig::default());
    sim.mine_blocks(2).unwrap();
    let block = sim.wait_for_block(1).await.unwrap();
    assert_eq!(block.number, 1);
}

#[test]
fn test_block_gas_capacity() {
    let mut config = SimConfig::default();
    config.block_gas_limit = 100_000;
    config.gas = 60_000;
    let sim = manual_sim(config);
    let a = sim.accounts();
    let to = Addr::from_label("sink");
    let send = |from: &Addr| sim.call(from, &to, Bytes::empty(), gwei(1)).unwrap();

    let t1 = send(&a[0]);
    let t2 = send(&a[1]);
    // does not fit after t1 and t2, and holds back the sender's next one
    let t3 = send(&a[2]);
    let t4 = sim
        .send_transaction(TxRequest::new(&a[2]).to(&to).gas_limit(21_000))
        .unwrap();
    let t5 = sim
        .send_transaction(TxRequest::new(&a[3]).to(&to).gas_limit(21_000))
        .unwrap();

    let block = sim.mine_blocks(1).unwrap().remove(0);
    let included: Vec<&Hash> = block.tx_hashes().collect();
    assert_eq!(included, vec![t1.hash(), t2.hash(), t5.hash()]);
    assert_eq!(block.gas_used, 3 * 21_000);
    assert_eq!(block.receipts.last().unwrap().cumulative_gas_used, 3 * 21_000);

    let pending: Vec<Hash> = sim.inspect_pending().iter().map(|t| t.hash().clone()).collect();
    assert_eq!(pending, vec![t3.hash().clone(), t4.hash().clone()]);
    assert!(sim.rejection(t3.hash()).is_none());

    let block = sim.mine_blocks(1).unwrap().remove(0);
    let included: Vec<&Hash> = block.tx_hashes().collect();
    assert_eq!(included, vec![t3.hash(), t4.hash()]);
    assert_eq!(sim.get_nonce(&a[2], None).unwrap(), 2);
}

#[test]
fn test_rejected_at_inclusion() {
    let sim = manual_sim(SimConfig::default());
    let a = sim.accounts();
    let sent = sim
        .call(&a[0], &a[1], Bytes::empty(), ether(5000))
        .unwrap();
    // the balance disappears between submission and inclusion
    sim.set_balance(&a[0], ether(1));
    let block = sim.mine_blocks(1).unwrap().remove(0);
    assert!(block.transactions.is_empty());
    assert!(matches!(
        sim.rejection(sent.hash()),
        Some(SimError::InsufficientBalance { .. })
    ));
    assert!(sim.inspect_pending().is_empty());
    assert!(sim.receipt(sent.hash()).is_none());
    assert_eq!(sim.get_nonce(&a[0], None).unwrap(), 0);

    // with automine the rejection comes back to the sender
    sim.set_automine(true);
    let err = sim
        .send_transaction(TxRequest::new(&a[1]).to(&a[2]).gas_limit(20_000))
        .unwrap_err();
    assert!(matches!(err, SimError::IntrinsicGasTooLow { required: 21000, limit: 20000 }));
    let err = sim
        .send_transaction(TxRequest::new(&a[1]).to(&a[2]).gas_limit(100_000_000))
        .unwrap_err();
    assert!(matches!(err, SimError::GasLimitExceedsBlock { .. }));
    assert_eq!(sim.block_number(), 3);
}

#[test]
fn test_dropped_transaction() {
    let sim = manual_sim(SimConfig::default());
    let a = sim.accounts();
    let t0 = sim.call(&a[0], &a[1], Bytes::empty(), gwei(1)).unwrap();
    let t1 = sim.call(&a[0], &a[1], Bytes::empty(), gwei(1)).unwrap();
    let dropped = sim.drop_transaction(t0.hash()).unwrap();
    assert_eq!(dropped.len(), 2);
    assert!(sim.transaction(t1.hash()).is_none());
    assert!(matches!(
        sim.drop_transaction(t0.hash()),
        Err(SimError::UnknownTransaction(_))
    ));
    // nonces are reused after the drop
    let again = sim.call(&a[0], &a[1], Bytes::empty(), gwei(2)).unwrap();
    assert_eq!(sim.transaction(again.hash()).unwrap().nonce, 0);
}

#[test]
fn test_concurrent_sends_from_one_account() {
    let mut config = SimConfig::default();
    config.gas = 21_000;
    let sim = manual_sim(config);
    let from = sim.accounts()[0].clone();
    let to = Addr::from_label("sink");

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let sim = sim.clone();
            let (from, to) = (from.clone(), to.clone());
            std::thread::spawn(move || {
                (0..25)
                    .map(|_| {
                        sim.call(&from, &to, Bytes::empty(), gwei(1))
                            .unwrap()
                            .hash()
                            .clone()
                    })
                    .collect::<Vec<Hash>>()
            })
        })
        .collect();
    let mut sent = Vec::new();
    for h in handles {
        sent.extend(h.join().unwrap());
    }

    // every send got its own nonce, with no gaps
    let mut nonces: Vec<u64> = sent
        .iter()
        .map(|h| sim.transaction(h).unwrap().nonce)
        .collect();
    nonces.sort_unstable();
    assert_eq!(nonces, (0..200).collect::<Vec<u64>>());

    let block = sim.mine_blocks(1).unwrap().remove(0);
    assert_eq!(block.transactions.len(), 200);
    assert_eq!(sim.get_nonce(&from, None).unwrap(), 200);
}
