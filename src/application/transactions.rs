//! Transaction context store
//!
//! Maps an OCPP transaction id to the runtime context needed later in the
//! transaction's life: the internal session id handed back by the sessions
//! service, the user behind it, the starting meter reading, and the
//! connector the vehicle is plugged into. Created by StartTransaction,
//! consulted by MeterValues, consumed by StopTransaction.

use dashmap::DashMap;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransactionContext {
    pub session_id: i64,
    pub user_id: i64,
    pub meter_start: i64,
    pub connector_id: i64,
}

pub struct TransactionStore {
    data: DashMap<String, TransactionContext>,
}

impl TransactionStore {
    pub fn new() -> Self {
        Self {
            data: DashMap::new(),
        }
    }

    pub fn set(&self, transaction_id: &str, ctx: TransactionContext) {
        self.data.insert(transaction_id.to_string(), ctx);
    }

    pub fn get(&self, transaction_id: &str) -> Option<TransactionContext> {
        self.data.get(transaction_id).map(|c| c.clone())
    }

    /// Remove and return the context, ending the transaction's runtime life.
    pub fn take(&self, transaction_id: &str) -> Option<TransactionContext> {
        self.data.remove(transaction_id).map(|(_, ctx)| ctx)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl Default for TransactionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_get_take_lifecycle() {
        let store = TransactionStore::new();
        let ctx = TransactionContext {
            session_id: 42,
            user_id: 7,
            meter_start: 1_000,
            connector_id: 2,
        };
        store.set("tx-1", ctx.clone());

        assert_eq!(store.get("tx-1"), Some(ctx.clone()));
        assert_eq!(store.take("tx-1"), Some(ctx));
        assert_eq!(store.get("tx-1"), None);
        assert!(store.is_empty());
    }

    #[test]
    fn take_unknown_returns_none() {
        let store = TransactionStore::new();
        assert_eq!(store.take("missing"), None);
    }
}
