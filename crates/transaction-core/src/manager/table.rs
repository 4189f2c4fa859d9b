//! Keyed storage for live transactions.
//!
//! The engine owns the table outright. No locks: every lookup and
//! mutation happens on the engine's own task.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::transaction::{Transaction, TransactionKey};

/// All live transactions, keyed by their RFC 3261 identifier.
#[derive(Default)]
pub struct TransactionTable {
    entries: HashMap<TransactionKey, Transaction>,
}

impl TransactionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a transaction. The key must not already be present.
    pub fn insert(&mut self, tx: Transaction) -> Result<()> {
        let key = tx.key().clone();
        if self.entries.contains_key(&key) {
            return Err(Error::TransactionExists(key));
        }
        self.entries.insert(key, tx);
        Ok(())
    }

    pub fn get_mut(&mut self, key: &TransactionKey) -> Option<&mut Transaction> {
        self.entries.get_mut(key)
    }

    pub fn contains(&self, key: &TransactionKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn remove(&mut self, key: &TransactionKey) -> Option<Transaction> {
        self.entries.remove(key)
    }

    /// Drains every entry, used on shutdown to notify the TU.
    pub fn drain(&mut self) -> Vec<TransactionKey> {
        self.entries.drain().map(|(key, _)| key).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{invite_request, peer_addr};
    use ringline_sip_transport::TransportKind;

    fn sample(branch: &str) -> Transaction {
        let request = invite_request(branch);
        let key = TransactionKey::from_request(&request).unwrap();
        Transaction::new_server(key, request, peer_addr(), TransportKind::Udp)
    }

    #[test]
    fn test_insert_and_lookup() {
        let mut table = TransactionTable::new();
        let tx = sample("z9hG4bK-tbl-1");
        let key = tx.key().clone();
        table.insert(tx).unwrap();

        assert!(table.contains(&key));
        assert_eq!(table.len(), 1);
        assert!(table.get_mut(&key).is_some());
    }

    #[test]
    fn test_duplicate_insert_rejected() {
        let mut table = TransactionTable::new();
        table.insert(sample("z9hG4bK-tbl-2")).unwrap();

        let result = table.insert(sample("z9hG4bK-tbl-2"));
        assert!(matches!(result, Err(Error::TransactionExists(_))));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_remove() {
        let mut table = TransactionTable::new();
        let tx = sample("z9hG4bK-tbl-3");
        let key = tx.key().clone();
        table.insert(tx).unwrap();

        assert!(table.remove(&key).is_some());
        assert!(!table.contains(&key));
        assert!(table.remove(&key).is_none());
        assert!(table.is_empty());
    }

    #[test]
    fn test_drain_empties_the_table() {
        let mut table = TransactionTable::new();
        table.insert(sample("z9hG4bK-tbl-4")).unwrap();
        table.insert(sample("z9hG4bK-tbl-5")).unwrap();

        let keys = table.drain();
        assert_eq!(keys.len(), 2);
        assert!(table.is_empty());
    }
}
