//! Reactive connection handling.
//!
//! Welcome and key-package events are unsolicited bids from a counterparty to
//! open an encrypted group. Both are handled the same way: try to join, log
//! the result, and drop the event on failure. A failed bid never stops the
//! process; the counterparty's attempt simply times out on their side.

use std::sync::Arc;

use dashmap::DashMap;
use selfkit_lib::event::{KeyPackageEvent, WelcomeEvent};
use selfkit_lib::{Account, Address};
use tracing::{info, warn};

use crate::stats::DispatchStats;

/// Accepts inbound connection bids and remembers who we are connected to.
pub struct ConnectionLifecycle {
    account: Arc<dyn Account>,
    /// Counterparty address -> group address.
    connections: DashMap<Address, Address>,
    stats: Option<Arc<DispatchStats>>,
}

impl ConnectionLifecycle {
    pub fn new(account: Arc<dyn Account>) -> Self {
        Self {
            account,
            connections: DashMap::new(),
            stats: None,
        }
    }

    /// Count accepted and failed bids in `stats`.
    pub fn with_stats(mut self, stats: Arc<DispatchStats>) -> Self {
        self.stats = Some(stats);
        self
    }

    /// Join the group a welcome invites us into.
    pub async fn on_welcome(&self, event: &WelcomeEvent) -> Option<Address> {
        match self
            .account
            .connection_accept(&event.to, &event.welcome)
            .await
        {
            Ok(group) => {
                info!(from = %event.from, %group, "accepted connection encrypted group");
                self.record(event.from, group);
                Some(group)
            }
            Err(error) => {
                warn!(from = %event.from, %error, "failed to accept connection to encrypted group");
                self.record_failure();
                None
            }
        }
    }

    /// Establish a group using key material the counterparty sent us.
    pub async fn on_key_package(&self, event: &KeyPackageEvent) -> Option<Address> {
        match self
            .account
            .connection_establish(&event.to, &event.key_package)
            .await
        {
            Ok(group) => {
                info!(from = %event.from, %group, "established connection with counterparty");
                self.record(event.from, group);
                Some(group)
            }
            Err(error) => {
                warn!(from = %event.from, %error, "failed to establish connection");
                self.record_failure();
                None
            }
        }
    }

    /// Record a connection opened by some other path (e.g. a discovery we answered).
    pub fn record(&self, counterparty: Address, group: Address) {
        if let Some(stats) = &self.stats {
            stats.record_connection_accepted();
        }
        self.connections.insert(counterparty, group);
    }

    pub fn is_connected(&self, counterparty: &Address) -> bool {
        self.connections.contains_key(counterparty)
    }

    pub fn group_for(&self, counterparty: &Address) -> Option<Address> {
        self.connections.get(counterparty).map(|group| *group)
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    fn record_failure(&self) {
        if let Some(stats) = &self.stats {
            stats.record_connection_failure();
        }
    }
}
