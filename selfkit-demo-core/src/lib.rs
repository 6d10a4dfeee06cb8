//! Selfkit Demo Core Library
//!
//! Shared plumbing for the selfkit demo applications: configuration, persisted
//! inbox identities, the in-process loopback SDK, a simulated counterparty and
//! session bootstrap.

pub mod agreement;
pub mod config;
pub mod identity;
pub mod loopback;
pub mod peer;
pub mod session;

pub use agreement::PlainTextTerms;
pub use config::{DemoConfig, PeerMode, StorageKeySource};
pub use identity::{Identity, IdentityManager};
pub use loopback::{LoopbackAccount, LoopbackNetwork};
pub use peer::SimulatedPeer;
pub use session::{DemoSession, SessionOptions};

/// Result type for demo operations
pub type Result<T> = anyhow::Result<T>;
