mod common;

use bigdecimal::BigDecimal;
use common::{Harness, COUNTER};
use stampchain::codec::Value;
use stampchain::crypto::Keypair;
use stampchain::runtime::metering::balance_of;
use stampchain::runtime::{EngineConfig, Status};

fn metered(balance: i64) -> (Harness, Keypair, String) {
    let config = EngineConfig { metering: true, ..EngineConfig::default() };
    let mut h = Harness::new(config);
    h.install("counter", COUNTER);
    let kp = Keypair::generate();
    let key = format!("currency.balances:{}", kp.public_hex());
    h.driver.set(&key, &Value::Int(balance));
    h.driver.commit().unwrap();
    (h, kp, key)
}

fn expected_balance(start: i64, used: u64) -> BigDecimal {
    BigDecimal::from(start) - BigDecimal::from(used) / BigDecimal::from(20)
}

#[test]
fn test_success_deducts_used_over_rate() {
    let (mut h, kp, key) = metered(100);
    h.stamps = Some(1_000);
    let out = h.call(&kp, "counter", "spin", &[("n", Value::Int(3))]);
    assert_eq!(out.status, Status::Success);
    assert_eq!(out.result, Value::Int(3));

    let used = out.cost.unwrap();
    assert!(used > 0);
    assert!(out.updates.contains_key(&key));
    assert_eq!(balance_of(&h.driver, &key).unwrap(), expected_balance(100, used));
}

#[test]
fn test_cost_is_deterministic() {
    let (mut h, kp, _) = metered(1_000);
    h.stamps = Some(1_000);
    let a = h.call(&kp, "counter", "spin", &[("n", Value::Int(10))]).cost;
    let b = h.call(&kp, "counter", "spin", &[("n", Value::Int(10))]).cost;
    assert_eq!(a, b);
    let more = h.call(&kp, "counter", "spin", &[("n", Value::Int(11))]).cost;
    assert!(more > a);
}

#[test]
fn test_out_of_stamps() {
    let (mut h, kp, key) = metered(100);
    h.stamps = Some(200);
    h.call(&kp, "counter", "set", &[("v", Value::Int(1))]);
    let before = balance_of(&h.driver, &key).unwrap();

    let out = h.call(&kp, "counter", "spin", &[("n", Value::Int(1_000_000))]);
    assert_eq!(out.status, Status::OutOfStamps);
    let used = out.cost.unwrap();
    assert!(used <= 200 && used > 150, "used {}", used);

    // only the deduction survives the rollback
    assert_eq!(out.updates.len(), 1);
    assert!(out.updates.contains_key(&key));
    assert_eq!(
        balance_of(&h.driver, &key).unwrap(),
        before - BigDecimal::from(used) / BigDecimal::from(20)
    );
    assert_eq!(h.driver.get("counter.x").unwrap(), Some(Value::Int(1)));
}

#[test]
fn test_insufficient_stamps_does_not_execute() {
    let (mut h, kp, key) = metered(1);
    h.stamps = Some(100);
    let out = h.call(&kp, "counter", "set", &[("v", Value::Int(1))]);
    assert_eq!(out.status, Status::InsufficientStamps);
    assert_eq!(out.cost, Some(0));
    assert!(out.updates.is_empty());
    assert_eq!(h.driver.get("counter.x").unwrap(), None);
    assert_eq!(balance_of(&h.driver, &key).unwrap(), BigDecimal::from(1));
}

#[test]
fn test_unfunded_sender_is_insufficient() {
    let (mut h, _, _) = metered(100);
    let stranger = Keypair::generate();
    let out = h.call(&stranger, "counter", "get", &[]);
    assert_eq!(out.status, Status::InsufficientStamps);
}

#[test]
fn test_payload_must_carry_stamps() {
    let (mut h, kp, _) = metered(100);
    h.stamps = None;
    assert_eq!(h.call(&kp, "counter", "get", &[]).status, Status::MalformedTx);
}

#[test]
fn test_unmetered_runs_are_still_bounded() {
    let config = EngineConfig { unmetered_budget: 1_000, ..EngineConfig::default() };
    let mut h = Harness::new(config);
    h.install("counter", COUNTER);
    let kp = Keypair::generate();
    let out = h.call(&kp, "counter", "spin", &[("n", Value::Int(1_000_000))]);
    assert_eq!(out.status, Status::OutOfStamps);
    assert_eq!(out.cost, None);
    assert_eq!(h.call(&kp, "counter", "spin", &[("n", Value::Int(5))]).result, Value::Int(5));
}

#[test]
fn test_draining_the_payer_reverts_the_call() {
    let (mut h, kp, key) = metered(100);
    h.install("currency", "hash balances = 0;\nexport fn burn() { balances[ctx.signer] = 0; }");
    h.stamps = Some(1_000);

    let out = h.call(&kp, "currency", "burn", &[]);
    assert_eq!(out.status, Status::InsufficientStamps);
    assert!(out.result.to_string().contains("cannot cover"));
    let used = out.cost.unwrap();
    assert!(used > 0);

    // the burn is gone; the fee comes out of the balance held before the call
    assert_eq!(out.updates.len(), 1);
    assert!(out.updates.contains_key(&key));
    let balance = balance_of(&h.driver, &key).unwrap();
    assert_eq!(balance, expected_balance(100, used));
    assert!(balance > BigDecimal::from(0));
}

#[test]
fn test_growing_values_pay_for_their_size() {
    let (mut h, kp, _) = metered(100_000);
    h.install("grow", "export fn double() { let s = 'x'; while true { s = s + s; } }");
    h.stamps = Some(100_000);
    let out = h.call(&kp, "grow", "double", &[]);
    // about twenty doublings; the size charge runs out the budget first
    assert_eq!(out.status, Status::OutOfStamps);
    assert!(out.cost.unwrap() <= 100_000);

    let config = EngineConfig { unmetered_budget: u64::MAX, ..EngineConfig::default() };
    let mut free = common::Harness::new(config);
    free.install("grow", "export fn double() { let s = 'x'; while true { s = s + s; } }");
    let out = free.call(&kp, "grow", "double", &[]);
    assert_eq!(out.status, Status::RuntimeException);
    assert!(out.result.to_string().contains("value too large"));
}
