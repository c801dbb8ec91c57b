//! Stamp metering.
//!
//! Every executed instruction charges the cost of its class from a versioned
//! schedule. A charge that would cross the budget fails and leaves the counter
//! at the last in-budget value.
//!
//! Schedule v2 adds a size charge: every value an instruction materializes costs
//! one extra stamp per `bytes_per_stamp` bytes, so memory grows only as fast as
//! stamps are spent.

use crate::codec::Value;
use crate::runtime::runtime_types::VmError;
use crate::state::StateDriver;
use anyhow::{anyhow, Result};
use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};

/// Default stamps bought by one unit of currency.
pub const STAMPS_PER_UNIT: u64 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CostClass {
    Op,
    Builtin,
    Hash,
    StateRead,
    StateWrite,
    ExternalCall,
    Deploy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostSchedule {
    pub version: u16,
    pub op: u64,
    pub builtin: u64,
    pub hash: u64,
    pub state_read: u64,
    pub state_write: u64,
    pub external_call: u64,
    pub deploy: u64,
    /// bytes of produced value per extra stamp; 0 disables the size charge
    #[serde(default)]
    pub bytes_per_stamp: u64,
}

impl CostSchedule {
    pub const V1: CostSchedule = CostSchedule {
        version: 1,
        op: 1,
        builtin: 5,
        hash: 20,
        state_read: 10,
        state_write: 25,
        external_call: 50,
        deploy: 500,
        bytes_per_stamp: 0,
    };

    pub const V2: CostSchedule = CostSchedule { version: 2, bytes_per_stamp: 16, ..CostSchedule::V1 };

    pub fn cost(&self, class: CostClass) -> u64 {
        match class {
            CostClass::Op => self.op,
            CostClass::Builtin => self.builtin,
            CostClass::Hash => self.hash,
            CostClass::StateRead => self.state_read,
            CostClass::StateWrite => self.state_write,
            CostClass::ExternalCall => self.external_call,
            CostClass::Deploy => self.deploy,
        }
    }
}

impl Default for CostSchedule {
    fn default() -> Self {
        Self::V2
    }
}

#[derive(Debug, Clone)]
pub struct Meter {
    schedule: CostSchedule,
    used: u64,
    budget: u64,
}

impl Meter {
    pub fn new(schedule: CostSchedule) -> Self {
        Self { schedule, used: 0, budget: 0 }
    }

    pub fn begin(&mut self, budget: u64) {
        self.used = 0;
        self.budget = budget;
    }

    pub fn charge(&mut self, class: CostClass) -> Result<(), VmError> {
        self.charge_stamps(self.schedule.cost(class))
    }

    /// Size charge for a value of `bytes` bytes.
    pub fn charge_bytes(&mut self, bytes: usize) -> Result<(), VmError> {
        match self.schedule.bytes_per_stamp {
            0 => Ok(()),
            per => self.charge_stamps(bytes as u64 / per),
        }
    }

    fn charge_stamps(&mut self, stamps: u64) -> Result<(), VmError> {
        let next = self.used.saturating_add(stamps);
        if next > self.budget {
            return Err(VmError::OutOfStamps { used: self.used, budget: self.budget });
        }
        self.used = next;
        Ok(())
    }

    pub fn used(&self) -> u64 {
        self.used
    }

    pub fn budget(&self) -> u64 {
        self.budget
    }

    pub fn schedule(&self) -> &CostSchedule {
        &self.schedule
    }
}

/// Read a currency balance; absent means zero.
pub fn balance_of(driver: &StateDriver, balance_key: &str) -> Result<BigDecimal> {
    match driver.get(balance_key)? {
        None | Some(Value::Null) => Ok(BigDecimal::from(0)),
        Some(v) => v
            .as_decimal()
            .ok_or_else(|| anyhow!("balance at {} is not a number: {}", balance_key, v)),
    }
}

/// `balance * rate >= stamps`
pub fn can_afford(balance: &BigDecimal, rate: u64, stamps: u64) -> bool {
    balance.clone() * BigDecimal::from(rate) >= BigDecimal::from(stamps)
}

/// Deduct `used / rate` from the balance and return the new balance. A balance
/// that cannot cover the deduction is an error and is left untouched.
pub fn settle(driver: &mut StateDriver, balance_key: &str, rate: u64, used: u64) -> Result<Value> {
    let balance = balance_of(driver, balance_key)?;
    if !can_afford(&balance, rate.max(1), used) {
        return Err(anyhow!("balance {} at {} cannot cover {} stamps", balance, balance_key, used));
    }
    let spent = BigDecimal::from(used) / BigDecimal::from(rate.max(1));
    let remaining = Value::decimal(balance - spent)?;
    driver.set(balance_key, &remaining);
    Ok(remaining)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemKvStore;
    use std::sync::Arc;

    #[test]
    fn test_charge_stops_at_budget() {
        let mut m = Meter::new(CostSchedule::V1);
        m.begin(12);
        m.charge(CostClass::StateRead).unwrap();
        m.charge(CostClass::Op).unwrap();
        let err = m.charge(CostClass::StateRead).unwrap_err();
        assert_eq!(err, VmError::OutOfStamps { used: 11, budget: 12 });
        assert_eq!(m.used(), 11);
        m.charge(CostClass::Op).unwrap();
        assert_eq!(m.used(), 12);
    }

    #[test]
    fn test_begin_resets() {
        let mut m = Meter::new(CostSchedule::V1);
        m.begin(100);
        m.charge(CostClass::Deploy).unwrap_err();
        m.charge(CostClass::ExternalCall).unwrap();
        m.begin(5);
        assert_eq!(m.used(), 0);
        assert_eq!(m.budget(), 5);
    }

    #[test]
    fn test_size_charge_follows_schedule() {
        let mut m = Meter::new(CostSchedule::V2);
        m.begin(1_000);
        m.charge_bytes(15).unwrap();
        assert_eq!(m.used(), 0);
        m.charge_bytes(160).unwrap();
        assert_eq!(m.used(), 10);
        assert!(m.charge_bytes(1 << 20).is_err());
        assert_eq!(m.used(), 10);

        let mut flat = Meter::new(CostSchedule::V1);
        flat.begin(1);
        flat.charge_bytes(1 << 20).unwrap();
        assert_eq!(flat.used(), 0);
    }

    #[test]
    fn test_settle_never_goes_negative() {
        let mut d = StateDriver::new(Arc::new(MemKvStore::new()));
        d.set("currency.balances:abc", &Value::Int(1));
        assert!(settle(&mut d, "currency.balances:abc", 20, 21).is_err());
        assert_eq!(d.get("currency.balances:abc").unwrap(), Some(Value::Int(1)));
        settle(&mut d, "currency.balances:abc", 20, 20).unwrap();
        assert_eq!(balance_of(&d, "currency.balances:abc").unwrap(), BigDecimal::from(0));
    }

    #[test]
    fn test_affordability() {
        assert!(can_afford(&BigDecimal::from(5), 20, 100));
        assert!(!can_afford(&BigDecimal::from(4), 20, 100));
    }

    #[test]
    fn test_settle_deducts_used_over_rate() {
        let mut d = StateDriver::new(Arc::new(MemKvStore::new()));
        d.set("currency.balances:abc", &Value::Int(10));
        let left = settle(&mut d, "currency.balances:abc", 20, 30).unwrap();
        assert_eq!(left, Value::parse_decimal("8.5").unwrap());
        assert_eq!(balance_of(&d, "currency.balances:abc").unwrap(), "8.5".parse::<BigDecimal>().unwrap());
    }
}
