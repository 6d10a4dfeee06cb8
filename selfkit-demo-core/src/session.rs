//! Session bootstrap
//!
//! Opens an account, registers the identity's inbox, wires the dispatcher to a
//! [`SessionHandler`] and starts the event pump. The pump dispatches one event
//! at a time, in arrival order, so a welcome is always accepted before any
//! message that travelled behind it.

use anyhow::{Context, Result};
use selfkit_interactive::{
    CommandRouter, ConnectionLifecycle, CredentialExchangeOrchestrator, DiscoveryHandshake,
    DispatchStats, EventDispatcher, EventHandler, PendingRequestRegistry, Responder,
    ResponseEvent, SessionHandler,
};
use selfkit_lib::event::InboundEvent;
use selfkit_lib::{Account, Address};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::agreement::PlainTextTerms;
use crate::config::DemoConfig;
use crate::identity::Identity;
use crate::loopback::{EventReceiver, LoopbackAccount, LoopbackNetwork};

/// Which unsolicited requests the session reacts to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionOptions {
    /// Answer discovery, presentation and verification requests.
    pub answer_requests: bool,
    /// Run rounds for chat commands sent by counterparties.
    pub serve_commands: bool,
}

/// A running account session.
pub struct DemoSession {
    account: Arc<LoopbackAccount>,
    inbox: Address,
    config: DemoConfig,
    registry: PendingRequestRegistry<ResponseEvent>,
    stats: Arc<DispatchStats>,
    lifecycle: Arc<ConnectionLifecycle>,
    orchestrator: Arc<CredentialExchangeOrchestrator>,
    handler: Arc<SessionHandler>,
    pump: JoinHandle<()>,
}

impl DemoSession {
    /// Open a session for `identity` on `network`. Must run inside a tokio runtime.
    pub fn open(
        network: &LoopbackNetwork,
        config: &DemoConfig,
        identity: &Identity,
        options: SessionOptions,
    ) -> Result<Self> {
        let (account, events) = LoopbackAccount::open(network, config.account_config());
        let inbox = account
            .adopt(identity)
            .context("Failed to open inbox")?;

        let dyn_account: Arc<dyn Account> = account.clone();
        let registry = PendingRequestRegistry::new();
        let stats = Arc::new(DispatchStats::new());
        let lifecycle = Arc::new(
            ConnectionLifecycle::new(dyn_account.clone()).with_stats(Arc::clone(&stats)),
        );
        let orchestrator = Arc::new(CredentialExchangeOrchestrator::new(
            dyn_account.clone(),
            registry.clone(),
            inbox,
            config.exchange_config(),
        ));

        let mut handler = SessionHandler::new(dyn_account.clone(), Arc::clone(&lifecycle));
        if options.answer_requests {
            handler = handler
                .with_responder(Responder::new(dyn_account).with_lifecycle(Arc::clone(&lifecycle)));
        }
        if options.serve_commands {
            handler = handler.with_commands(CommandRouter::new(
                Arc::clone(&orchestrator),
                Arc::new(PlainTextTerms::default()),
            ));
        }

        let handler = Arc::new(handler);
        let dispatcher =
            EventDispatcher::with_stats(registry.clone(), Arc::clone(&handler), Arc::clone(&stats));
        let pump = spawn_event_pump(dispatcher, events);

        info!(%inbox, "session ready");
        Ok(Self {
            account,
            inbox,
            config: config.clone(),
            registry,
            stats,
            lifecycle,
            orchestrator,
            handler,
            pump,
        })
    }

    pub fn account(&self) -> &Arc<LoopbackAccount> {
        &self.account
    }

    pub fn inbox(&self) -> Address {
        self.inbox
    }

    pub fn config(&self) -> &DemoConfig {
        &self.config
    }

    pub fn registry(&self) -> &PendingRequestRegistry<ResponseEvent> {
        &self.registry
    }

    pub fn stats(&self) -> &Arc<DispatchStats> {
        &self.stats
    }

    pub fn lifecycle(&self) -> &Arc<ConnectionLifecycle> {
        &self.lifecycle
    }

    pub fn orchestrator(&self) -> Arc<CredentialExchangeOrchestrator> {
        Arc::clone(&self.orchestrator)
    }

    pub fn handler(&self) -> &Arc<SessionHandler> {
        &self.handler
    }

    /// A fresh discovery handshake bound to this session's inbox.
    pub fn handshake(&self) -> DiscoveryHandshake {
        DiscoveryHandshake::new(
            self.account.clone(),
            self.registry.clone(),
            self.inbox,
            self.config.discovery_expiry,
        )
    }

    /// Abort running command rounds, close the account and wait for the event
    /// pump to drain.
    pub async fn close(self) -> Result<()> {
        self.handler.abort_rounds();
        self.account
            .close()
            .await
            .context("Failed to close account")?;
        self.pump.await.context("Event pump panicked")?;
        debug!(stats = ?self.stats.snapshot(), "session closed");
        Ok(())
    }
}

/// Dispatch events one at a time until the account disconnects.
pub fn spawn_event_pump<H>(dispatcher: EventDispatcher<H>, mut events: EventReceiver) -> JoinHandle<()>
where
    H: EventHandler + ?Sized + 'static,
{
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            let last = matches!(event, InboundEvent::Disconnect { .. });
            dispatcher.dispatch(event).await;
            if last {
                break;
            }
        }
        debug!("event pump stopped");
    })
}
