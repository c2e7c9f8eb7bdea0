//! GLYPHS balance ledger.
//!
//! Owns the in-memory balance map. Debits fail rather than going negative;
//! the only bypass is the admin `set`, which may write any value. The ledger
//! itself is persistence-agnostic: callers snapshot it into the coalescing
//! store writer after mutations.

use glyphmine_types::{Balances, GameError, Result, UserId};

#[derive(Clone, Debug, Default)]
pub struct Ledger {
    balances: Balances,
}

impl Ledger {
    pub fn new(balances: Balances) -> Self {
        Self { balances }
    }

    /// Current balance, zero for unknown users.
    pub fn get(&self, user: &str) -> u64 {
        self.balances.get(user).copied().unwrap_or(0)
    }

    /// Credit GLYPHS, returning the new balance.
    pub fn credit(&mut self, user: &str, amount: u64) -> u64 {
        let entry = self.balances.entry(user.to_string()).or_insert(0);
        *entry = entry.saturating_add(amount);
        *entry
    }

    /// Debit GLYPHS, failing without mutation when the balance is short.
    pub fn debit(&mut self, user: &str, amount: u64) -> Result<u64> {
        let balance = self.get(user);
        if amount > balance {
            return Err(GameError::InsufficientFunds {
                balance,
                required: amount,
            });
        }
        let updated = balance - amount;
        self.balances.insert(user.to_string(), updated);
        Ok(updated)
    }

    /// Admin override: set a balance to an arbitrary value.
    pub fn set(&mut self, user: &str, amount: u64) -> u64 {
        self.balances.insert(user.to_string(), amount);
        amount
    }

    /// Wipe every balance.
    pub fn reset(&mut self) {
        self.balances.clear();
    }

    /// Sum of all balances.
    pub fn total(&self) -> u64 {
        self.balances.values().fold(0u64, |acc, v| acc.saturating_add(*v))
    }

    pub fn accounts(&self) -> usize {
        self.balances.len()
    }

    pub fn balances(&self) -> &Balances {
        &self.balances
    }

    pub fn users(&self) -> impl Iterator<Item = &UserId> {
        self.balances.keys()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credit_and_get() {
        let mut ledger = Ledger::default();
        assert_eq!(ledger.get("alice"), 0);
        assert_eq!(ledger.credit("alice", 100), 100);
        assert_eq!(ledger.credit("alice", 50), 150);
        assert_eq!(ledger.get("alice"), 150);
    }

    #[test]
    fn test_debit_insufficient_funds_leaves_balance_untouched() {
        let mut ledger = Ledger::default();
        ledger.credit("bob", 40);
        let err = ledger.debit("bob", 41).unwrap_err();
        assert_eq!(
            err,
            GameError::InsufficientFunds {
                balance: 40,
                required: 41
            }
        );
        assert_eq!(ledger.get("bob"), 40);
    }

    #[test]
    fn test_debit_exact_balance() {
        let mut ledger = Ledger::default();
        ledger.credit("bob", 40);
        assert_eq!(ledger.debit("bob", 40).unwrap(), 0);
        assert_eq!(ledger.get("bob"), 0);
    }

    #[test]
    fn test_admin_set_and_reset() {
        let mut ledger = Ledger::default();
        ledger.set("carol", 9_999);
        assert_eq!(ledger.get("carol"), 9_999);
        ledger.reset();
        assert_eq!(ledger.get("carol"), 0);
        assert_eq!(ledger.accounts(), 0);
    }

    #[test]
    fn test_total() {
        let mut ledger = Ledger::default();
        ledger.credit("a", 1);
        ledger.credit("b", 2);
        ledger.credit("c", 3);
        assert_eq!(ledger.total(), 6);
        assert_eq!(ledger.accounts(), 3);
    }
}
