//! Economy handlers: purchase, use, transfer and the read-only queries.
//!
//! Every mutating handler holds the per-account lock of each account it
//! writes for the whole read-validate-write cycle. Queries take no lock.

mod purchase;
mod query;
mod transfer;
mod use_item;

use std::sync::Arc;

use crate::config::EconomyConfig;
use crate::locks::UserLocks;
use crate::model::format_amount;
use crate::notify::Notifier;
use crate::store::StateStore;

pub struct Economy {
    store: Arc<StateStore>,
    locks: Arc<UserLocks>,
    notifier: Option<Arc<Notifier>>,
    config: EconomyConfig,
}

impl Economy {
    pub fn new(
        store: Arc<StateStore>,
        locks: Arc<UserLocks>,
        notifier: Option<Arc<Notifier>>,
        config: EconomyConfig,
    ) -> Self {
        Self {
            store,
            locks,
            notifier,
            config,
        }
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub fn config(&self) -> &EconomyConfig {
        &self.config
    }

    /// `1,500갈레온`
    fn money(&self, amount: i64) -> String {
        format!("{}{}", format_amount(amount), self.config.currency)
    }
}
