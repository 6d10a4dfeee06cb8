//! In-process stand-in for the identity/messaging SDK.
//!
//! A [`LoopbackNetwork`] routes inbound events between the accounts opened on
//! it. Each [`LoopbackAccount`] implements [`Account`] with real ed25519
//! signatures, so credential and presentation validation behaves like the
//! hosted service: a document validates only when signed by its issuer or
//! holder and left untouched since.
//!
//! Events reach an account through the unbounded receiver returned by
//! [`LoopbackAccount::open`]. Per-sender ordering is preserved.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use selfkit_lib::credential::{UnsignedCredential, UnsignedPresentation};
use selfkit_lib::message::ContentSummary;
use selfkit_lib::prelude::*;
use selfkit_lib::Proof;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info};

use crate::identity::Identity;

/// Receiving end of an account's inbound event stream.
pub type EventReceiver = mpsc::UnboundedReceiver<InboundEvent>;

/// Shared router between loopback accounts.
#[derive(Clone, Default)]
pub struct LoopbackNetwork {
    inner: Arc<NetworkInner>,
}

#[derive(Default)]
struct NetworkInner {
    /// Inbox address -> owning account's event sender.
    routes: DashMap<Address, mpsc::UnboundedSender<InboundEvent>>,
    /// Group address -> the two member inboxes (creator, invitee).
    groups: DashMap<Address, (Address, Address)>,
    objects: DashMap<String, Object>,
}

impl LoopbackNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    fn route(&self, inbox: Address, events: mpsc::UnboundedSender<InboundEvent>) {
        self.inner.routes.insert(inbox, events);
    }

    fn unroute(&self, inbox: &Address) {
        self.inner.routes.remove(inbox);
    }

    pub fn is_routed(&self, inbox: &Address) -> bool {
        self.inner.routes.contains_key(inbox)
    }

    fn deliver(&self, to: &Address, event: InboundEvent) -> Result<()> {
        let sender = self
            .inner
            .routes
            .get(to)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| SelfkitError::not_found("inbox", to.to_string()))?;
        sender
            .send(event)
            .map_err(|_| SelfkitError::Transport(format!("inbox {} is closed", to)))
    }

    /// Hand an out-of-band discovery code to `scanner` as if its user scanned it.
    ///
    /// The decoded request is delivered as a message from the key package owner.
    pub fn scan(&self, code: &str, scanner: &Address) -> Result<()> {
        let content = AnonymousMessage::decode(code)?.into_content();
        if content.content_type() != ContentType::DiscoveryRequest {
            return Err(SelfkitError::WrongContentType {
                expected: ContentType::DiscoveryRequest.to_string(),
                actual: content.content_type().to_string(),
            });
        }
        let request: DiscoveryRequest = content.decode()?;
        let from = *request.key_package().owner();

        debug!(%scanner, %from, "scanned discovery code");
        self.deliver(
            scanner,
            InboundEvent::Message(MessageEvent::new(from, *scanner, content)),
        )
    }
}

/// One account session on a [`LoopbackNetwork`].
pub struct LoopbackAccount {
    network: LoopbackNetwork,
    config: AccountConfig,
    events: mpsc::UnboundedSender<InboundEvent>,
    keys: DashMap<Address, SigningKey>,
    /// Counterparty inbox -> (local inbox, group).
    connections: DashMap<Address, (Address, Address)>,
    credentials: Mutex<Vec<VerifiableCredential>>,
    tokens: Mutex<Vec<Token>>,
    closed: AtomicBool,
}

impl LoopbackAccount {
    /// Open a session. The receiver yields every event addressed to the
    /// account's inboxes, starting with a connect event.
    pub fn open(network: &LoopbackNetwork, config: AccountConfig) -> (Arc<Self>, EventReceiver) {
        let (events, receiver) = mpsc::unbounded_channel();
        // The receiver is alive, so this cannot fail.
        let _ = events.send(InboundEvent::Connect);

        info!(
            environment = config.environment.as_str(),
            storage = %config.storage_path.display(),
            "account session opened"
        );

        let account = Arc::new(Self {
            network: network.clone(),
            config,
            events,
            keys: DashMap::new(),
            connections: DashMap::new(),
            credentials: Mutex::new(Vec::new()),
            tokens: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        });
        (account, receiver)
    }

    pub fn config(&self) -> &AccountConfig {
        &self.config
    }

    /// Register a persisted identity as an inbox of this account.
    pub fn adopt(&self, identity: &Identity) -> Result<Address> {
        self.ensure_open()?;
        Ok(self.register(identity.signing_key().clone()))
    }

    /// Whether this account has a connection with `counterparty`.
    pub fn is_connected(&self, counterparty: &Address) -> bool {
        self.connections.contains_key(counterparty)
    }

    pub async fn tokens(&self) -> Vec<Token> {
        self.tokens.lock().await.clone()
    }

    fn register(&self, key: SigningKey) -> Address {
        let address = Address::from_bytes(key.verifying_key().to_bytes());
        self.keys.insert(address, key);
        self.network.route(address, self.events.clone());
        address
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(SelfkitError::Session("account is closed".into()));
        }
        Ok(())
    }

    fn ensure_inbox(&self, inbox: &Address) -> Result<()> {
        if !self.keys.contains_key(inbox) {
            return Err(SelfkitError::not_found("inbox", inbox.to_string()));
        }
        Ok(())
    }

    fn sign(&self, signer: &Address, digest: &[u8; 32]) -> Result<Proof> {
        let key = self
            .keys
            .get(signer)
            .ok_or_else(|| SelfkitError::Signing(format!("no key for {}", signer)))?;
        Ok(Proof {
            verification_method: *signer,
            created: Utc::now(),
            signature: hex::encode(key.sign(digest).to_bytes()),
        })
    }

    fn connect(&self, local: Address, counterparty: Address, group: Address) {
        debug!(%local, %counterparty, %group, "connection recorded");
        self.connections.insert(counterparty, (local, group));
    }
}

/// Check `signature` over `digest` against the key behind `signer`.
fn verify_signature(signer: &Address, digest: &[u8; 32], signature: &str) -> Result<()> {
    let key = VerifyingKey::from_bytes(signer.as_bytes())
        .map_err(|e| SelfkitError::ValidationFailed(format!("invalid signer key: {}", e)))?;
    let bytes: [u8; 64] = hex::decode(signature)
        .ok()
        .and_then(|bytes| bytes.try_into().ok())
        .ok_or_else(|| SelfkitError::ValidationFailed("malformed signature".into()))?;
    key.verify(digest, &Signature::from_bytes(&bytes))
        .map_err(|_| SelfkitError::ValidationFailed("signature does not verify".into()))
}

fn random_bytes<const N: usize>() -> [u8; N] {
    use rand::RngCore;

    let mut bytes = [0u8; N];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    bytes
}

#[async_trait]
impl Account for LoopbackAccount {
    async fn inbox_open(&self) -> Result<Address> {
        self.ensure_open()?;
        let address = self.register(SigningKey::from_bytes(&random_bytes()));
        info!(inbox = %address, "inbox opened");
        Ok(address)
    }

    async fn inbox_list(&self) -> Result<Vec<Address>> {
        self.ensure_open()?;
        Ok(self.keys.iter().map(|entry| *entry.key()).collect())
    }

    async fn connection_negotiate_out_of_band(
        &self,
        as_address: &Address,
        expires: DateTime<Utc>,
    ) -> Result<KeyPackage> {
        self.ensure_open()?;
        self.ensure_inbox(as_address)?;
        Ok(KeyPackage::new(
            *as_address,
            expires,
            random_bytes::<32>().to_vec(),
        ))
    }

    async fn connection_negotiate(
        &self,
        as_address: &Address,
        with_address: &Address,
        expires: DateTime<Utc>,
    ) -> Result<()> {
        let key_package = self
            .connection_negotiate_out_of_band(as_address, expires)
            .await?;
        self.network.deliver(
            with_address,
            InboundEvent::KeyPackage(KeyPackageEvent {
                from: *as_address,
                to: *with_address,
                key_package,
            }),
        )
    }

    async fn connection_establish(
        &self,
        as_address: &Address,
        key_package: &KeyPackage,
    ) -> Result<Address> {
        self.ensure_open()?;
        self.ensure_inbox(as_address)?;

        let owner = *key_package.owner();
        if key_package.is_expired_at(Utc::now()) {
            return Err(SelfkitError::Connection {
                target: owner.to_string(),
                reason: "key package expired".into(),
            });
        }

        let group = Address::from_bytes(random_bytes());
        self.network
            .inner
            .groups
            .insert(group, (*as_address, owner));
        self.connect(*as_address, owner, group);

        self.network
            .deliver(
                &owner,
                InboundEvent::Welcome(WelcomeEvent {
                    from: *as_address,
                    to: owner,
                    welcome: Welcome {
                        group,
                        bytes: random_bytes::<16>().to_vec(),
                    },
                }),
            )
            .map_err(|e| {
                self.network.inner.groups.remove(&group);
                self.connections.remove(&owner);
                SelfkitError::Connection {
                    target: owner.to_string(),
                    reason: e.to_string(),
                }
            })?;
        Ok(group)
    }

    async fn connection_accept(&self, as_address: &Address, welcome: &Welcome) -> Result<Address> {
        self.ensure_open()?;
        self.ensure_inbox(as_address)?;

        let (creator, invitee) = self
            .network
            .inner
            .groups
            .get(&welcome.group)
            .map(|entry| *entry.value())
            .ok_or_else(|| SelfkitError::Connection {
                target: welcome.group.to_string(),
                reason: "unknown group".into(),
            })?;
        if invitee != *as_address {
            return Err(SelfkitError::Connection {
                target: welcome.group.to_string(),
                reason: "welcome addressed to another inbox".into(),
            });
        }

        self.connect(*as_address, creator, welcome.group);
        Ok(welcome.group)
    }

    async fn message_send(&self, to_address: &Address, content: &Content) -> Result<()> {
        self.ensure_open()?;
        let (local, _group) = self
            .connections
            .get(to_address)
            .map(|entry| *entry.value())
            .ok_or_else(|| SelfkitError::Connection {
                target: to_address.to_string(),
                reason: "no connection with recipient".into(),
            })?;

        debug!(to = %to_address, request_id = %content.id(), kind = %content.content_type(), "sending message");
        self.network.deliver(
            to_address,
            InboundEvent::Message(MessageEvent::new(local, *to_address, content.clone())),
        )
    }

    async fn notification_send(
        &self,
        to_address: &Address,
        summary: &ContentSummary,
    ) -> Result<()> {
        self.ensure_open()?;
        if !self.network.is_routed(to_address) {
            return Err(SelfkitError::not_found("inbox", to_address.to_string()));
        }
        debug!(to = %to_address, description = %summary.description, "push notification");
        Ok(())
    }

    async fn credential_issue(
        &self,
        credential: &UnsignedCredential,
    ) -> Result<VerifiableCredential> {
        self.ensure_open()?;
        let proof = self.sign(&credential.issuer, &credential.signing_digest()?)?;
        Ok(VerifiableCredential::from_parts(credential.clone(), proof))
    }

    async fn presentation_issue(
        &self,
        presentation: &UnsignedPresentation,
    ) -> Result<VerifiablePresentation> {
        self.ensure_open()?;
        let proof = self.sign(&presentation.holder, &presentation.signing_digest()?)?;
        Ok(VerifiablePresentation::from_parts(
            presentation.clone(),
            proof,
        ))
    }

    fn credential_validate(&self, credential: &VerifiableCredential) -> Result<()> {
        let proof = credential.proof();
        if !proof.verification_method.matches(credential.issuer()) {
            return Err(SelfkitError::ValidationFailed(
                "credential was not signed by its issuer".into(),
            ));
        }
        verify_signature(
            &proof.verification_method,
            &credential.unsigned().signing_digest()?,
            &proof.signature,
        )
    }

    fn presentation_validate(&self, presentation: &VerifiablePresentation) -> Result<()> {
        let proof = presentation.proof();
        if !proof.verification_method.matches(presentation.holder()) {
            return Err(SelfkitError::ValidationFailed(
                "presentation was not signed by its holder".into(),
            ));
        }
        verify_signature(
            &proof.verification_method,
            &presentation.unsigned().signing_digest()?,
            &proof.signature,
        )
    }

    async fn credential_store(&self, credential: &VerifiableCredential) -> Result<()> {
        self.ensure_open()?;
        self.credentials.lock().await.push(credential.clone());
        Ok(())
    }

    async fn credentials_list(&self) -> Result<Vec<VerifiableCredential>> {
        self.ensure_open()?;
        Ok(self
            .credentials
            .lock()
            .await
            .iter()
            .filter(|c| self.keys.contains_key(c.subject()))
            .cloned()
            .collect())
    }

    async fn object_upload(&self, as_address: &Address, object: &Object) -> Result<()> {
        self.ensure_open()?;
        self.ensure_inbox(as_address)?;
        if !object.is_intact() {
            return Err(SelfkitError::invalid_data("object", "hash does not match data"));
        }
        self.network
            .inner
            .objects
            .insert(object.id().to_string(), object.clone());
        Ok(())
    }

    async fn object_download(&self, object_id: &str) -> Result<Object> {
        self.ensure_open()?;
        self.network
            .inner
            .objects
            .get(object_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| SelfkitError::not_found("object", object_id))
    }

    async fn token_store(&self, token: &Token) -> Result<()> {
        self.ensure_open()?;
        self.tokens.lock().await.push(token.clone());
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        for entry in self.keys.iter() {
            self.network.unroute(entry.key());
        }
        let _ = self.events.send(InboundEvent::Disconnect { error: None });
        info!("account session closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use selfkit_lib::credential::{CredentialBuilder, PresentationBuilder};
    use selfkit_lib::message::{Chat, ContentPayload};

    fn open(network: &LoopbackNetwork) -> (Arc<LoopbackAccount>, EventReceiver) {
        LoopbackAccount::open(network, AccountConfig::new("./test", [0u8; 32]))
    }

    async fn issue(account: &LoopbackAccount, inbox: Address) -> VerifiableCredential {
        let unsigned = CredentialBuilder::new()
            .credential_type(["VerifiableCredential", "EmailCredential"])
            .subject(inbox)
            .issuer(inbox)
            .claim("emailAddress", "a@example.com")
            .valid_from(Utc::now())
            .finish()
            .unwrap();
        account.credential_issue(&unsigned).await.unwrap()
    }

    #[tokio::test]
    async fn test_open_emits_connect() {
        let network = LoopbackNetwork::new();
        let (_account, mut events) = open(&network);
        assert!(matches!(events.recv().await, Some(InboundEvent::Connect)));
    }

    #[tokio::test]
    async fn test_credential_signature_roundtrip() {
        let network = LoopbackNetwork::new();
        let (alice, _) = open(&network);
        let (bob, _) = open(&network);
        let inbox = alice.inbox_open().await.unwrap();

        let credential = issue(&alice, inbox).await;
        // Any account can validate; only the key matters.
        bob.credential_validate(&credential).unwrap();

        let presentation = alice
            .presentation_issue(
                &PresentationBuilder::new()
                    .holder(inbox)
                    .credential_add(credential)
                    .finish()
                    .unwrap(),
            )
            .await
            .unwrap();
        bob.presentation_validate(&presentation).unwrap();
    }

    #[tokio::test]
    async fn test_tampered_credential_fails_validation() {
        let network = LoopbackNetwork::new();
        let (alice, _) = open(&network);
        let inbox = alice.inbox_open().await.unwrap();
        let credential = issue(&alice, inbox).await;

        let mut unsigned = credential.unsigned().clone();
        unsigned
            .credential_subject
            .claims
            .insert("emailAddress".into(), "mallory@example.com".into());
        let forged = VerifiableCredential::from_parts(unsigned, credential.proof().clone());

        assert!(matches!(
            alice.credential_validate(&forged),
            Err(SelfkitError::ValidationFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_establish_delivers_welcome_and_enables_messaging() {
        let network = LoopbackNetwork::new();
        let (alice, mut alice_events) = open(&network);
        let (bob, _bob_events) = open(&network);
        let a = alice.inbox_open().await.unwrap();
        let b = bob.inbox_open().await.unwrap();
        alice_events.recv().await;

        let package = alice
            .connection_negotiate_out_of_band(&a, Utc::now() + chrono::Duration::minutes(5))
            .await
            .unwrap();
        let group = bob.connection_establish(&b, &package).await.unwrap();

        let welcome = match alice_events.recv().await {
            Some(InboundEvent::Welcome(event)) => event,
            other => panic!("expected welcome, got {:?}", other),
        };
        assert_eq!(welcome.from, b);
        assert_eq!(welcome.welcome.group, group);

        // Not connected yet on alice's side.
        let chat = Chat::new("hi").into_content().unwrap();
        assert!(alice.message_send(&b, &chat).await.is_err());

        alice.connection_accept(&a, &welcome.welcome).await.unwrap();
        alice.message_send(&b, &chat).await.unwrap();
        assert!(alice.is_connected(&b));
    }

    #[tokio::test]
    async fn test_expired_key_package_is_refused() {
        let network = LoopbackNetwork::new();
        let (alice, _) = open(&network);
        let (bob, _) = open(&network);
        let a = alice.inbox_open().await.unwrap();
        let b = bob.inbox_open().await.unwrap();

        let package = KeyPackage::new(a, Utc::now() - chrono::Duration::seconds(1), vec![]);
        assert!(matches!(
            bob.connection_establish(&b, &package).await,
            Err(SelfkitError::Connection { .. })
        ));
    }

    #[tokio::test]
    async fn test_closed_account_rejects_calls() {
        let network = LoopbackNetwork::new();
        let (alice, mut events) = open(&network);
        let inbox = alice.inbox_open().await.unwrap();
        alice.close().await.unwrap();

        assert!(!network.is_routed(&inbox));
        assert!(matches!(
            alice.inbox_open().await,
            Err(SelfkitError::Session(_))
        ));
        assert!(matches!(events.recv().await, Some(InboundEvent::Connect)));
        assert!(matches!(
            events.recv().await,
            Some(InboundEvent::Disconnect { error: None })
        ));
    }

    #[tokio::test]
    async fn test_objects_are_shared_across_accounts() {
        let network = LoopbackNetwork::new();
        let (alice, _) = open(&network);
        let (bob, _) = open(&network);
        let inbox = alice.inbox_open().await.unwrap();

        let object = Object::new("text/plain", b"terms".to_vec());
        alice.object_upload(&inbox, &object).await.unwrap();
        let downloaded = bob.object_download(object.id()).await.unwrap();
        assert_eq!(downloaded.data(), b"terms");
    }
}
