//! Runtime context for command execution.
//!
//! Built once in `main` after CLI parsing: resolved `.factdb/` directory,
//! loaded configuration, caller identity, and output flags. Commands open
//! the store and client through it.

use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context as _, Result};

use factdb_client::Client;
use factdb_config::{Config, find_factdb_dir, load_config};
use factdb_replicate::{Replicator, SqliteLog};
use factdb_storage::{SqliteStore, Store};

use crate::cli::GlobalArgs;

/// Runtime context passed to every command handler.
pub struct RuntimeContext {
    /// The discovered `.factdb/` directory, when one exists.
    pub factdb_dir: Option<PathBuf>,

    /// Loaded configuration (defaults when no directory or file exists).
    pub config: Config,

    /// Explicit store file override from `--db`.
    pub db_override: Option<PathBuf>,

    /// `"<client>:<user>"` stamped on changesets.
    pub client_id: String,

    pub json: bool,
    pub verbose: bool,
    pub quiet: bool,
}

impl RuntimeContext {
    /// Build a context from parsed global arguments.
    pub fn from_global_args(global: &GlobalArgs) -> Result<Self> {
        let factdb_dir = env::current_dir()
            .ok()
            .and_then(|cwd| find_factdb_dir(&cwd));

        let config = match &factdb_dir {
            Some(dir) => load_config(dir)?,
            None => Config::default(),
        };

        let client = global
            .client
            .clone()
            .unwrap_or_else(|| config.client.clone());
        let user = resolve_user(global.user.as_deref(), config.user.as_deref());

        Ok(Self {
            factdb_dir,
            db_override: global.db.as_ref().map(PathBuf::from),
            client_id: format!("{client}:{user}"),
            config,
            json: global.json,
            verbose: global.verbose,
            quiet: global.quiet,
        })
    }

    /// The resolved store database path.
    pub fn store_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.db_override {
            return Ok(path.clone());
        }
        let dir = self
            .factdb_dir
            .as_deref()
            .context("no .factdb directory found (run 'fq init' first)")?;
        Ok(self.config.store_path(dir))
    }

    /// Opens the store at the resolved path.
    pub fn open_store(&self) -> Result<Arc<SqliteStore>> {
        let path = self.store_path()?;
        Ok(Arc::new(SqliteStore::open(&path, None)?))
    }

    /// Opens the configured replication log, when one is set.
    pub fn open_replicator(&self, store: Arc<dyn Store>) -> Result<Option<Arc<Replicator>>> {
        let Some(dir) = self.factdb_dir.as_deref() else {
            return Ok(None);
        };
        let Some(log_path) = self.config.replication_log_path(dir) else {
            return Ok(None);
        };
        let log = SqliteLog::open(&log_path)?;
        Ok(Some(Arc::new(Replicator::new(store, Box::new(log)))))
    }

    /// Builds a client over the store, wired to the replicator when
    /// configured.
    pub fn build_client(&self) -> Result<Client> {
        let store = self.open_store()?;
        let store: Arc<dyn Store> = store;
        let mut client = Client::new(store.clone(), &self.client_id)?;
        if let Some(replicator) = self.open_replicator(store)? {
            // Push-on-commit only when replication is enabled; the
            // REPLICATE action works whenever a log is configured.
            client = client.with_replicator(replicator, self.config.replication.enabled);
        }
        Ok(client)
    }
}

/// Resolves the user half of the client identity.
///
/// Priority: `--user` flag (or `FACTDB_USER` via clap) > config file >
/// `$USER` > `"user"`.
fn resolve_user(flag_value: Option<&str>, config_value: Option<&str>) -> String {
    if let Some(user) = flag_value {
        if !user.is_empty() {
            return user.to_owned();
        }
    }
    if let Some(user) = config_value {
        if !user.is_empty() {
            return user.to_owned();
        }
    }
    if let Ok(user) = env::var("USER").or_else(|_| env::var("USERNAME")) {
        if !user.is_empty() {
            return user;
        }
    }
    "user".to_owned()
}
