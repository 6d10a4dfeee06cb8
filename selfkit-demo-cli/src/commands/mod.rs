//! CLI command implementations

use anyhow::{Context, Result};
use selfkit_demo_core::{
    DemoConfig, DemoSession, Identity, IdentityManager, LoopbackNetwork, PeerMode,
    SessionOptions, SimulatedPeer, StorageKeySource,
};
use selfkit_interactive::DiscoveryHandshake;
use selfkit_lib::Address;
use std::future::Future;
use std::path::PathBuf;
use tracing::debug;

use crate::ui;

pub mod agreement;
pub mod chat;
pub mod credentials;
pub mod list;
pub mod serve;
pub mod setup;
pub mod whoami;

/// Identity name used when none has been set up.
pub const DEFAULT_IDENTITY: &str = "default";

/// Flags shared by every subcommand.
#[derive(Debug, Clone, Default)]
pub struct GlobalArgs {
    pub storage_dir: Option<PathBuf>,
    pub no_peer: bool,
    pub verbose: bool,
    /// Discovery rounds to run; `None` runs until Ctrl-C.
    pub rounds: Option<u32>,
}

impl GlobalArgs {
    pub fn config(&self) -> Result<DemoConfig> {
        let config = DemoConfig::from_env(self.storage_dir.clone())?;
        let peer = if self.no_peer {
            PeerMode::None
        } else {
            config.peer
        };
        Ok(config.with_peer(peer))
    }
}

pub fn identity_manager(config: &DemoConfig) -> IdentityManager {
    IdentityManager::new(config.identities_dir(), &config.storage_key)
}

/// Load or create the current identity.
///
/// Without a configured storage key nothing saved could be read back, so the
/// identity is ephemeral.
fn session_identity(config: &DemoConfig, verbose: bool) -> Result<Identity> {
    if config.storage_key_source == StorageKeySource::Generated {
        ui::warning("SELFKIT_STORAGE_KEY is not set; using a random storage key");
        ui::warning("Account state from this run will not be readable next time");
        return Ok(Identity::generate().with_nickname(DEFAULT_IDENTITY));
    }

    let (identity, created) = identity_manager(config)
        .load_or_create(DEFAULT_IDENTITY)
        .context("Failed to load identity")?;
    if created || verbose {
        ui::info(&format!(
            "Using identity {} ({})",
            identity.nickname.as_deref().unwrap_or(DEFAULT_IDENTITY),
            identity.address()
        ));
    }
    Ok(identity)
}

/// A running demo: the local session and, if enabled, the simulated peer.
pub struct Demo {
    pub config: DemoConfig,
    pub session: DemoSession,
    pub peer: Option<SimulatedPeer>,
    rounds: Option<u32>,
}

impl Demo {
    pub async fn start(args: &GlobalArgs, options: SessionOptions) -> Result<Self> {
        let config = args.config()?;
        debug!(storage_dir = %config.storage_dir.display(), peer = ?config.peer, "starting demo");
        let identity = session_identity(&config, args.verbose)?;
        let network = LoopbackNetwork::new();

        let session = DemoSession::open(&network, &config, &identity, options)?;
        let peer = match config.peer {
            PeerMode::Simulated => Some(SimulatedPeer::start(&network, &config).await?),
            PeerMode::None => None,
        };

        Ok(Self {
            config,
            session,
            peer,
            rounds: args.rounds,
        })
    }

    /// Discover a counterparty and run `round` against it, over and over,
    /// until the round limit is reached. Returns the number of rounds run.
    ///
    /// One handshake serves every round; it is reset once a round completes.
    pub async fn run_rounds<F, Fut>(&self, mut round: F) -> Result<u32>
    where
        F: FnMut(Address) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let mut handshake = self.session.handshake();
        let mut completed = 0;
        while self.rounds.map_or(true, |limit| completed < limit) {
            if completed > 0 {
                println!();
                ui::info(&format!("Starting round {}", completed + 1));
            }
            let responder = self.discover(&mut handshake).await?;
            round(responder).await?;
            handshake.reset();
            completed += 1;
        }
        debug!(completed, "demo rounds finished");
        Ok(completed)
    }

    /// Run a discovery round on `handshake` and return the responder's address.
    pub async fn discover(&self, handshake: &mut DiscoveryHandshake) -> Result<Address> {
        let ticket = handshake
            .begin()
            .await
            .context("Failed to create discovery request")?;

        ui::header("Discovery");
        ui::info("Scan this code with the Self app to connect:");
        ui::qr_code(&ticket.code)?;
        ui::key_value("Expires", &ticket.expires.to_rfc3339());

        if let Some(peer) = &self.peer {
            ui::info("Simulated peer will scan the code");
            peer.scan_after_delay(ticket.code);
        }

        let spinner = ui::spinner("Waiting for response to discovery request...");
        let responder = handshake
            .await_responder(self.config.discovery_timeout())
            .await;
        spinner.finish_and_clear();

        let responder = responder.context("Discovery failed")?;
        ui::success(&format!("Connected to {}", responder));
        Ok(responder)
    }

    /// Shut down, then report how the demo round ended.
    pub async fn finish<T>(self, round: Result<Option<T>>) -> Result<()> {
        self.shutdown().await?;
        round.map(|_| ())
    }

    /// Close the peer and the local session.
    pub async fn shutdown(self) -> Result<()> {
        if let Some(peer) = self.peer {
            peer.close().await?;
        }
        self.session.close().await
    }
}

/// Race `round` against Ctrl-C. `None` means the user interrupted.
pub async fn interruptible<T>(round: impl Future<Output = Result<T>>) -> Result<Option<T>> {
    tokio::select! {
        result = round => result.map(Some),
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for Ctrl-C")?;
            println!();
            ui::warning("Interrupted");
            Ok(None)
        }
    }
}
