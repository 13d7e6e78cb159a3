use qsim::asm::{initcode, Asm};
use qsim::common::*;
use qsim::config::SimConfig;
use qsim::core::opcode::Opcode::*;
use qsim::core::{panic_data, ArithMode, ExecError, PANIC_ARITHMETIC_OVERFLOW};
use qsim::mempool::MempoolOrder;
use qsim::sim::{Simulator, Submitted};
use qsim::tx::{Receipt, TxRequest};
use qsim::SimError;

fn new_sim() -> Simulator {
    let _ = env_logger::builder().is_test(true).try_init();
    Simulator::new(SimConfig::default()).unwrap()
}

fn deploy(sim: &Simulator, from: &Addr, runtime: Asm, mode: ArithMode) -> Addr {
    let runtime = runtime.assemble().unwrap();
    sim.deploy(from, &initcode(&[], &runtime).unwrap(), &[], mode)
        .unwrap()
}

fn mined(s: Submitted) -> Receipt {
    match s {
        Submitted::Mined(r) => r,
        Submitted::Pending(tx) => panic!("{} still pending", tx.hash()),
    }
}

fn slot(n: u64) -> Hash {
    Hash::from(n)
}

/// `RETURN` the word on top of the stack.
fn ret_word(asm: Asm) -> Asm {
    asm.push(0u64)
        .op(MStore)
        .push(32u64)
        .push(0u64)
        .op(Return)
}

/// `CALL(gas, to, value, in = mem[0..in_len], out = none)`
fn call_to(asm: Asm, to: &Addr, in_len: u64, value_from_stack: bool) -> Asm {
    let asm = asm.push(0u64).push(0u64).push(in_len).push(0u64);
    let asm = if value_from_stack {
        asm.op(CallValue)
    } else {
        asm.push(0u64)
    };
    asm.push_addr(to).op(GasLeft).op(Call)
}

#[test]
fn test_plain_transfer() {
    let sim = new_sim();
    let accounts = sim.accounts();
    let (a, b) = (&accounts[0], &accounts[1]);
    let before = sim.get_balance(a, None).unwrap();
    let r = mined(sim.call(a, b, Bytes::empty(), ether(1)).unwrap());
    assert!(r.succeeded());
    assert_eq!(r.gas_used, 21000);
    assert_eq!(r.block_number, 1);
    assert_eq!(sim.get_balance(b, None).unwrap(), ether(10001));
    let fee = r.effective_gas_price.times_gas(r.gas_used);
    let spent = ether(1).checked_add(&fee).unwrap();
    assert_eq!(
        sim.get_balance(a, None).unwrap(),
        before.checked_sub(&spent).unwrap()
    );
    assert_eq!(sim.get_nonce(a, None).unwrap(), 1);
    // history
    assert_eq!(sim.get_balance(b, Some(0)).unwrap(), ether(10000));
    assert_eq!(sim.get_nonce(a, Some(0)).unwrap(), 0);
    assert!(matches!(
        sim.get_balance(b, Some(5)),
        Err(SimError::BlockNotFound(5))
    ));
    let tx = sim.transaction(&r.tx_hash).unwrap();
    assert_eq!(tx.value, ether(1));
    assert_eq!(sim.receipt(&r.tx_hash), Some(r));
}

#[test]
fn test_reentrancy_drains_bank() {
    let sim = new_sim();
    let accounts = sim.accounts();
    let (deployer, user1, user2, attacker) =
        (&accounts[0], &accounts[1], &accounts[2], &accounts[3]);

    // empty calldata: deposit; anything else: withdraw everything, paying before zeroing the
    // balance
    let bank_code = Asm::new()
        .op(CallDataSize)
        .jumpi("withdraw")
        .op(Caller)
        .op(SLoad)
        .op(CallValue)
        .op(Add)
        .op(Caller)
        .op(SStore)
        .op(Stop)
        .label("withdraw")
        .op(Caller)
        .op(SLoad)
        .op(Dup1)
        .op(IsZero)
        .jumpi("done")
        .push(0u64)
        .push(0u64)
        .push(0u64)
        .push(0u64)
        .op(Dup5)
        .op(Caller)
        .op(GasLeft)
        .op(Call)
        .op(Pop)
        .push(0u64)
        .op(Caller)
        .op(SStore)
        .label("done")
        .op(Stop);
    let bank = deploy(&sim, deployer, bank_code, ArithMode::Checked);

    for user in [user1, user2] {
        let r = mined(sim.call(user, &bank, Bytes::empty(), ether(5)).unwrap());
        assert!(r.succeeded());
    }
    assert_eq!(sim.get_balance(&bank, None).unwrap(), ether(10));

    // with calldata: deposit the call value and withdraw; on receiving funds: withdraw again while
    // the bank still holds anything
    let receive = Asm::new()
        .op(CallDataSize)
        .jumpi("attack")
        .push_addr(&bank)
        .op(Balance)
        .op(IsZero)
        .jumpi("end");
    let reenter = call_to(receive, &bank, 1, false)
        .op(Pop)
        .label("end")
        .op(Stop)
        .label("attack");
    let deposit = call_to(reenter, &bank, 0, true).op(Pop);
    let attack_code = call_to(deposit, &bank, 1, false).op(Pop).op(Stop);
    let attacker_contract = deploy(&sim, attacker, attack_code, ArithMode::Wrapping);

    let r = mined(
        sim.call(attacker, &attacker_contract, vec![1u8].into(), ether(1))
            .unwrap(),
    );
    assert!(r.succeeded());
    assert_eq!(sim.get_balance(&bank, None).unwrap(), Wei::default());
    assert_eq!(
        sim.get_balance(&attacker_contract, None).unwrap(),
        ether(11)
    );
    // the bank's books still credit the users
    assert_eq!(
        sim.get_storage(&bank, &Hash::from(U256::from(user1.clone())), None)
            .unwrap(),
        U256::from(ether(5))
    );
}

#[test]
fn test_frontrun_with_higher_tip() {
    let sim = new_sim();
    let accounts = sim.accounts();
    let (deployer, victim, attacker) = (&accounts[0], &accounts[1], &accounts[2]);

    // the first caller to get here is recorded in slot 0
    let race = deploy(
        &sim,
        deployer,
        Asm::new()
            .push(0u64)
            .op(SLoad)
            .jumpi("taken")
            .op(Caller)
            .push(0u64)
            .op(SStore)
            .label("taken")
            .op(Stop),
        ArithMode::Wrapping,
    );

    sim.set_automine(false);
    let pending = sim.call(victim, &race, Bytes::empty(), Wei::default()).unwrap();
    assert!(matches!(pending, Submitted::Pending(_)));

    let seen = sim.inspect_pending();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].to.as_ref(), Some(&race));
    let tip = seen[0].fee.priority(&gwei(1));
    let front = sim
        .send_transaction(
            TxRequest::new(attacker)
                .to(&race)
                .dynamic_fee(gwei(100), tip.checked_add(&gwei(1)).unwrap()),
        )
        .unwrap();

    // peeking consumes nothing, and the attacker now comes first
    let seen = sim.inspect_pending();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0].hash(), front.hash());

    let blocks = sim.mine_blocks(1).unwrap();
    let block = &blocks[0];
    assert_eq!(block.transactions.len(), 2);
    assert_eq!(&block.transactions[0].from, attacker);
    assert_eq!(
        sim.get_storage(&race, &slot(0), None).unwrap(),
        U256::from(attacker.clone())
    );
    assert!(sim.receipt(pending.hash()).unwrap().succeeded());
    assert!(sim.inspect_pending().is_empty());
}

#[test]
fn test_fifo_ignores_tip() {
    let sim = new_sim();
    let accounts = sim.accounts();
    sim.set_automine(false);
    sim.set_mempool_order(MempoolOrder::Fifo);
    let first = sim
        .call(&accounts[0], &accounts[5], Bytes::empty(), gwei(1))
        .unwrap();
    sim.send_transaction(
        TxRequest::new(&accounts[1])
            .to(&accounts[5])
            .dynamic_fee(gwei(100), gwei(50)),
    )
    .unwrap();
    let block = sim.mine_blocks(1).unwrap().remove(0);
    assert_eq!(block.transactions[0].hash(), first.hash());
}

#[test]
fn test_block_hash_window() {
    let sim = new_sim();
    let accounts = sim.accounts();
    let reader = Addr::from_label("blockhash reader");
    sim.set_code(
        &reader,
        ret_word(Asm::new().push(1u64).op(BlockHash)).assemble().unwrap(),
        ArithMode::Wrapping,
    );

    let h1 = sim.mine_blocks(1).unwrap()[0].hash.clone();
    assert!(!h1.is_zero());
    assert_eq!(sim.get_block_hash(1), h1);
    // neither the current nor a future block
    assert!(sim.get_block_hash(2).is_zero());
    assert!(sim.get_block_hash(1000).is_zero());

    sim.mine_blocks(255).unwrap();
    assert_eq!(sim.block_number(), 256);
    assert_eq!(sim.get_block_hash(1), h1);
    assert_eq!(
        sim.view_word(&accounts[0], &reader, Bytes::empty()).unwrap(),
        U256::from(h1.clone())
    );

    sim.mine_blocks(1).unwrap();
    assert!(sim.get_block_hash(1).is_zero());
    assert!(sim
        .view_word(&accounts[0], &reader, Bytes::empty())
        .unwrap()
        .is_zero());
    // the block itself is still there
    assert_eq!(sim.block(1).unwrap().hash, h1);
    assert_eq!(sim.block_by_hash(&h1).unwrap().number, 1);
}

#[test]
fn test_revert_keeps_gas_and_state() {
    let sim = new_sim();
    let accounts = sim.accounts();
    let c = deploy(
        &sim,
        &accounts[0],
        Asm::new()
            .push(1u64)
            .push(0u64)
            .op(SStore)
            .push(0u64)
            .push(0u64)
            .op(Revert),
        ArithMode::Wrapping,
    );
    let sender = &accounts[1];
    let before = sim.get_balance(sender, None).unwrap();
    let r = mined(sim.call(sender, &c, Bytes::empty(), gwei(1)).unwrap());
    assert!(!r.succeeded());
    assert_eq!(r.error, Some(ExecError::Reverted));
    assert!(r.gas_used > 21000);
    assert!(r.gas_used < 100_000);
    assert!(sim.get_storage(&c, &slot(0), None).unwrap().is_zero());
    assert_eq!(sim.get_balance(&c, None).unwrap(), Wei::default());
    // the nonce moves and the used gas is paid anyway
    assert_eq!(sim.get_nonce(sender, None).unwrap(), 1);
    let fee = r.effective_gas_price.times_gas(r.gas_used);
    assert_eq!(
        sim.get_balance(sender, None).unwrap(),
        before.checked_sub(&fee).unwrap()
    );
}

#[test]
fn test_out_of_gas_loop() {
    let sim = new_sim();
    let accounts = sim.accounts();
    let c = deploy(
        &sim,
        &accounts[0],
        Asm::new().label("top").jump("top"),
        ArithMode::Wrapping,
    );
    let r = mined(
        sim.send_transaction(TxRequest::new(&accounts[1]).to(&c).gas_limit(100_000))
            .unwrap(),
    );
    assert_eq!(r.error, Some(ExecError::OutOfGas));
    assert_eq!(r.gas_used, 100_000);
}

#[test]
fn test_checked_and_wrapping_arithmetic() {
    let sim = new_sim();
    let accounts = sim.accounts();
    let code = || {
        Asm::new()
            .push(0u64)
            .op(Not)
            .push(2u64)
            .op(Add)
            .push(0u64)
            .op(SStore)
            .op(Stop)
    };
    let wrapping = deploy(&sim, &accounts[0], code(), ArithMode::Wrapping);
    let checked = deploy(&sim, &accounts[0], code(), ArithMode::Checked);

    let r = mined(sim.call(&accounts[1], &wrapping, Bytes::empty(), Wei::default()).unwrap());
    assert!(r.succeeded());
    assert_eq!(sim.get_storage(&wrapping, &slot(0), None).unwrap(), U256::one());

    let r = mined(sim.call(&accounts[1], &checked, Bytes::empty(), Wei::default()).unwrap());
    assert_eq!(r.error, Some(ExecError::ArithmeticOverflow));
    assert_eq!(r.output, panic_data(PANIC_ARITHMETIC_OVERFLOW));
    assert!(r.gas_used < 100_000);
    assert!(sim.get_storage(&checked, &slot(0), None).unwrap().is_zero());
}

#[test]
fn test_invalid_opcode_burns_gas() {
    let sim = new_sim();
    let accounts = sim.accounts();
    let c = Addr::from_label("broken");
    sim.set_code(&c, vec![0x0cu8].into(), ArithMode::Wrapping);
    let r = mined(
        sim.send_transaction(TxRequest::new(&accounts[0]).to(&c).gas_limit(50_000))
            .unwrap(),
    );
    assert_eq!(r.error, Some(ExecError::InvalidOpcode));
    assert_eq!(r.gas_used, 50_000);
}

#[test]
fn test_direct_and_protected_calls() {
    let sim = new_sim();
    let accounts = sim.accounts();
    let from = &accounts[0];
    let callee = deploy(
        &sim,
        from,
        Asm::new()
            .push(42u64)
            .push(0u64)
            .op(MStore)
            .push(32u64)
            .push(0u64)
            .op(Revert),
        ArithMode::Wrapping,
    );
    let caller = |op| {
        Asm::new()
            .push(0u64)
            .push(0u64)
            .push(0u64)
            .push(0u64)
            .push(0u64)
            .push_addr(&callee)
            .op(GasLeft)
            .op(op)
            .push(1u64)
            .op(SStore)
            .push(7u64)
            .push(2u64)
            .op(SStore)
            .op(Stop)
    };
    let protected = deploy(&sim, from, caller(Call), ArithMode::Wrapping);
    let direct = deploy(&sim, from, caller(DirectCall), ArithMode::Wrapping);

    let r = mined(sim.call(from, &protected, Bytes::empty(), Wei::default()).unwrap());
    assert!(r.succeeded());
    assert!(sim.get_storage(&protected, &slot(1), None).unwrap().is_zero());
    assert_eq!(sim.get_storage(&protected, &slot(2), None).unwrap(), U256::from(7));

    let r = mined(sim.call(from, &direct, Bytes::empty(), Wei::default()).unwrap());
    assert!(!r.succeeded());
    assert_eq!(r.error, Some(ExecError::Reverted));
    assert_eq!(r.output.to_vec(), encode_word(&U256::from(42)).to_vec());
    assert!(r.gas_used < 200_000);
    assert!(sim.get_storage(&direct, &slot(2), None).unwrap().is_zero());
}

#[test]
fn test_direct_call_out_of_gas_consumes_all() {
    let sim = new_sim();
    let accounts = sim.accounts();
    let from = &accounts[0];
    let looping = deploy(
        &sim,
        from,
        Asm::new().label("top").jump("top"),
        ArithMode::Wrapping,
    );
    let caller = |op| {
        Asm::new()
            .push(0u64)
            .push(0u64)
            .push(0u64)
            .push(0u64)
            .push(0u64)
            .push_addr(&looping)
            .op(GasLeft)
            .op(op)
            .push(1u64)
            .op(SStore)
            .op(Stop)
    };
    let protected = deploy(&sim, from, caller(Call), ArithMode::Wrapping);
    let direct = deploy(&sim, from, caller(DirectCall), ArithMode::Wrapping);
    let limit = 1_000_000;

    // the caller keeps its 1/64 share and finishes
    let r = mined(
        sim.send_transaction(TxRequest::new(from).to(&protected).gas_limit(limit))
            .unwrap(),
    );
    assert!(r.succeeded());
    assert!(r.gas_used < limit);

    // a propagated out-of-gas burns the caller's share too
    let r = mined(
        sim.send_transaction(TxRequest::new(from).to(&direct).gas_limit(limit))
            .unwrap(),
    );
    assert_eq!(r.error, Some(ExecError::OutOfGas));
    assert_eq!(r.gas_used, limit);
    assert!(r.output.is_empty());
}

#[test]
fn test_constructor_argument_and_private_slot() {
    let sim = new_sim();
    let accounts = sim.accounts();
    // copy the last word of the creation code (the argument) into slot 0
    let ctor = Asm::new()
        .push(32u64)
        .push(32u64)
        .op(CodeSize)
        .op(Sub)
        .push(0u64)
        .op(CodeCopy)
        .push(0u64)
        .op(MLoad)
        .push(0u64)
        .op(SStore)
        .assemble()
        .unwrap();
    let runtime = ret_word(Asm::new().push(0u64).op(SLoad))
        .assemble()
        .unwrap();
    let code = initcode(&ctor, &runtime).unwrap();
    let c = sim
        .deploy(&accounts[0], &code, &[U256::from(42)], ArithMode::Checked)
        .unwrap();
    assert_eq!(c, create_addr(&accounts[0], 0));
    assert_eq!(sim.get_code(&c).to_vec(), runtime.to_vec());
    assert_eq!(sim.get_storage(&c, &slot(0), None).unwrap(), U256::from(42));
    assert_eq!(
        sim.view_word(&accounts[1], &c, Bytes::empty()).unwrap(),
        U256::from(42)
    );
    let acc = sim.get_account(&c).unwrap();
    assert_eq!(acc.nonce, 1);
    assert_eq!(acc.code.arith(), ArithMode::Checked);
}

#[test]
fn test_failing_constructor() {
    let sim = new_sim();
    let accounts = sim.accounts();
    let ctor = Asm::new().push(0u64).push(0u64).op(Revert).assemble().unwrap();
    let code = initcode(&ctor, &[0x00]).unwrap();
    match sim.deploy(&accounts[0], &code, &[], ArithMode::Wrapping) {
        Err(SimError::ExecutionFailed { error, .. }) => {
            assert_eq!(error, ExecError::Reverted)
        }
        r => panic!("unexpected {:?}", r),
    }
    assert!(sim.get_code(&create_addr(&accounts[0], 0)).is_empty());
}

#[test]
fn test_logs_in_receipt() {
    let sim = new_sim();
    let accounts = sim.accounts();
    let c = deploy(
        &sim,
        &accounts[0],
        Asm::new()
            .push(42u64)
            .push(0u64)
            .op(MStore)
            .push(7u64)
            .push(32u64)
            .push(0u64)
            .op(Log1)
            .op(Stop),
        ArithMode::Wrapping,
    );
    let r = mined(sim.call(&accounts[1], &c, Bytes::empty(), Wei::default()).unwrap());
    assert_eq!(r.logs.len(), 1);
    assert_eq!(r.logs[0].address, c);
    assert_eq!(r.logs[0].topics, vec![Hash::from(7u64)]);
    assert_eq!(r.logs[0].data.to_vec(), encode_word(&U256::from(42)).to_vec());
}

#[test]
fn test_time_travel() {
    let sim = new_sim();
    let accounts = sim.accounts();
    let c = deploy(
        &sim,
        &accounts[0],
        Asm::new().op(Timestamp).push(0u64).op(SStore).op(Stop),
        ArithMode::Wrapping,
    );
    let head = sim.latest_block().timestamp;
    let next = sim.increase_time(3600);
    assert_eq!(next, head + 1 + 3600);
    let r = mined(sim.call(&accounts[1], &c, Bytes::empty(), Wei::default()).unwrap());
    assert_eq!(sim.block(r.block_number).unwrap().timestamp, next);
    assert_eq!(sim.get_storage(&c, &slot(0), None).unwrap(), U256::from(next));

    // the increase is used up by one block
    let block = sim.mine_blocks(1).unwrap().remove(0);
    assert_eq!(block.timestamp, next + 1);

    assert!(matches!(
        sim.set_next_block_timestamp(block.timestamp),
        Err(SimError::InvalidTimestamp { .. })
    ));
    sim.set_next_block_timestamp(block.timestamp + 100).unwrap();
    assert_eq!(
        sim.mine_blocks(1).unwrap()[0].timestamp,
        block.timestamp + 100
    );
}

#[test]
fn test_switch_network() {
    let sim = new_sim();
    let accounts = sim.accounts();
    let reader = Addr::from_label("chain id reader");
    let code = ret_word(Asm::new().op(ChainId)).assemble().unwrap();
    sim.set_code(&reader, code.clone(), ArithMode::Wrapping);
    assert_eq!(
        sim.view_word(&accounts[0], &reader, Bytes::empty()).unwrap(),
        U256::from(31337)
    );
    sim.mine_blocks(3).unwrap();

    let mut config = SimConfig::default();
    config.chain_id = 5;
    sim.switch_network(config).unwrap();
    assert_eq!(sim.chain_id(), 5);
    assert_eq!(sim.block_number(), 0);
    assert!(sim.get_code(&reader).is_empty());

    sim.set_code(&reader, code, ArithMode::Wrapping);
    assert_eq!(
        sim.view_word(&accounts[0], &reader, Bytes::empty()).unwrap(),
        U256::from(5)
    );

    let mut bad = SimConfig::default();
    bad.block_gas_limit = 0;
    assert!(matches!(
        sim.switch_network(bad),
        Err(SimError::InvalidConfig(_))
    ));
    assert_eq!(sim.chain_id(), 5);
}

#[test]
fn test_storage_history() {
    let sim = new_sim();
    let accounts = sim.accounts();
    let c = deploy(
        &sim,
        &accounts[0],
        Asm::new()
            .push(0u64)
            .op(CallDataLoad)
            .push(0u64)
            .op(SStore)
            .op(Stop),
        ArithMode::Wrapping,
    );
    let mut blocks = Vec::new();
    for v in 1..=3u64 {
        let data = Bytes::from(encode_word(&U256::from(v)).to_vec());
        let r = mined(sim.call(&accounts[1], &c, data, Wei::default()).unwrap());
        blocks.push(r.block_number);
    }
    for (i, n) in blocks.iter().enumerate() {
        assert_eq!(
            sim.get_storage(&c, &slot(0), Some(*n)).unwrap(),
            U256::from(i as u64 + 1)
        );
    }
    assert!(sim.get_storage(&c, &slot(0), Some(blocks[0] - 1)).unwrap().is_zero());
}

#[test]
fn test_admin_overrides() {
    let sim = new_sim();
    let accounts = sim.accounts();
    let nobody = Addr::from_label("nobody");
    assert!(matches!(
        sim.get_account(&nobody),
        Err(SimError::UnknownAccount(_))
    ));

    sim.set_balance(&nobody, ether(3));
    assert_eq!(sim.get_balance(&nobody, None).unwrap(), ether(3));
    let r = mined(sim.call(&nobody, &accounts[0], Bytes::empty(), ether(1)).unwrap());
    assert!(r.succeeded());

    sim.set_storage(&nobody, &slot(9), U256::from(99));
    assert_eq!(sim.get_storage(&nobody, &slot(9), None).unwrap(), U256::from(99));

    sim.set_nonce(&nobody, 10).unwrap();
    assert!(matches!(
        sim.set_nonce(&nobody, 2),
        Err(SimError::InvalidNonce { expected: 10, got: 2, .. })
    ));
    let r = mined(sim.call(&nobody, &accounts[0], Bytes::empty(), Wei::default()).unwrap());
    assert!(r.succeeded());
    assert_eq!(sim.get_nonce(&nobody, None).unwrap(), 11);

    // too poor to pay for the gas
    let poor = Addr::from_label("poor");
    sim.set_balance(&poor, Wei::from(1u64));
    assert!(matches!(
        sim.call(&poor, &accounts[0], Bytes::empty(), Wei::default()),
        Err(SimError::InsufficientBalance { .. })
    ));
}

#[test]
fn test_created_code_inherits_arithmetic() {
    let sim = new_sim();
    let accounts = sim.accounts();
    let overflow = Asm::new()
        .push(0u64)
        .op(Not)
        .push(2u64)
        .op(Add)
        .push(0u64)
        .op(SStore)
        .op(Stop)
        .assemble()
        .unwrap();
    let child = initcode(&[], &overflow).unwrap();
    // copy the child creation code from the end of our own code, CREATE it and keep the address
    let factory = Asm::new()
        .push_bytes(&(child.len() as u16).to_be_bytes())
        .op(Dup1)
        .op(CodeSize)
        .op(Sub)
        .push(0u64)
        .op(CodeCopy)
        .push(0u64)
        .push(0u64)
        .op(Create)
        .push(0u64)
        .op(SStore)
        .op(Stop)
        .raw(&child);

    for (mode, ok) in [(ArithMode::Checked, false), (ArithMode::Wrapping, true)] {
        let f = deploy(&sim, &accounts[0], factory.clone(), mode);
        let r = mined(sim.call(&accounts[1], &f, Bytes::empty(), Wei::default()).unwrap());
        assert!(r.succeeded());
        let created = Addr::from(sim.get_storage(&f, &slot(0), None).unwrap());
        assert_eq!(created, create_addr(&f, 1));
        assert_eq!(sim.get_account(&created).unwrap().code.arith(), mode);

        let r = mined(sim.call(&accounts[1], &created, Bytes::empty(), Wei::default()).unwrap());
        assert_eq!(r.succeeded(), ok);
    }
}

#[test]
fn test_disasm_of_deployed_code() {
    let sim = new_sim();
    let accounts = sim.accounts();
    let c = deploy(
        &sim,
        &accounts[0],
        Asm::new().push(42u64).op(Pop).op(Stop),
        ArithMode::Wrapping,
    );
    let text = qsim::asm::disasm(&sim.get_code(&c));
    assert_eq!(text, "0000: PUSH1 0x2a\n0002: POP\n0003: STOP\n");
}

#[test]
fn test_coinbase_tip_overflow_keeps_the_block() {
    let sim = new_sim();
    let accounts = sim.accounts();
    let coinbase = sim.config().coinbase;
    let full = Wei::from(U256::MAX);
    sim.set_balance(&coinbase, full.clone());

    let r = mined(sim.call(&accounts[0], &accounts[1], Bytes::empty(), ether(1)).unwrap());
    assert!(r.succeeded());
    assert_eq!(r.gas_used, 21000);
    // the tip does not fit and is dropped, the sender still gets its refund
    assert_eq!(sim.get_balance(&coinbase, None).unwrap(), full);
    assert_eq!(sim.get_balance(&accounts[1], None).unwrap(), ether(10001));
    let fee = r.effective_gas_price.times_gas(r.gas_used);
    let spent = ether(1).checked_add(&fee).unwrap();
    assert_eq!(
        sim.get_balance(&accounts[0], None).unwrap(),
        ether(10000).checked_sub(&spent).unwrap()
    );
}
