//! The embedding entry point: a store plus a caller identity.

use std::sync::Arc;

use factdb_core::Item;
use factdb_replicate::Replicator;
use factdb_storage::Store;

use crate::transaction::Transaction;
use crate::{ClientError, Result};

/// A caller of the store, identified by a `"<client>:<user>"` string.
///
/// Clients are cheap handles: they share the store (and replicator) behind
/// `Arc`s and mint transactions on demand.
#[derive(Clone)]
pub struct Client {
    name: String,
    user: String,
    store: Arc<dyn Store>,
    replicator: Option<Arc<Replicator>>,
    auto_push: bool,
}

impl Client {
    /// Creates a client. The identifier must be `"<client>:<user>"`.
    pub fn new(store: Arc<dyn Store>, client: &str) -> Result<Self> {
        let Some((name, user)) = client.split_once(':') else {
            return Err(ClientError::InvalidClient(client.to_owned()));
        };
        if name.is_empty() || user.is_empty() {
            return Err(ClientError::InvalidClient(client.to_owned()));
        }
        Ok(Self {
            name: name.to_owned(),
            user: user.to_owned(),
            store,
            replicator: None,
            auto_push: false,
        })
    }

    /// Attaches a replicator. `auto_push` makes every commit push through
    /// it; the `REPLICATE` action runs it either way.
    pub fn with_replicator(mut self, replicator: Arc<Replicator>, auto_push: bool) -> Self {
        self.replicator = Some(replicator);
        self.auto_push = auto_push;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    /// The full `"<client>:<user>"` identifier stamped on changesets.
    pub fn client_id(&self) -> String {
        format!("{}:{}", self.name, self.user)
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Opens a fresh transaction.
    pub fn new_transaction(&self) -> Transaction {
        Transaction::new(
            self.store.clone(),
            self.replicator.clone(),
            self.auto_push,
            self.client_id(),
        )
    }

    /// One-shot query: a fresh transaction, dispatched and committed.
    pub fn query(&self, query: &str) -> Result<Vec<Item>> {
        self.new_transaction().q(query)
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("name", &self.name)
            .field("user", &self.user)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use factdb_storage::SqliteStore;

    fn store() -> Arc<dyn Store> {
        Arc::new(SqliteStore::open_in_memory(None).unwrap())
    }

    #[test]
    fn client_id_requires_colon() {
        assert!(Client::new(store(), "repl:becky").is_ok());
        assert!(matches!(
            Client::new(store(), "justrepl"),
            Err(ClientError::InvalidClient(_))
        ));
        assert!(Client::new(store(), ":user").is_err());
        assert!(Client::new(store(), "repl:").is_err());
    }

    #[test]
    fn client_id_round_trips() {
        let c = Client::new(store(), "repl:becky").unwrap();
        assert_eq!(c.name(), "repl");
        assert_eq!(c.user(), "becky");
        assert_eq!(c.client_id(), "repl:becky");
    }
}
