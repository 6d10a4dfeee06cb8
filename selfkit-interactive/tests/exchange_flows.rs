//! End-to-end rounds between two mock accounts, with events relayed by hand.


use chrono::{Duration, Utc};
use mock_implementations::MockAccount;
use selfkit_interactive::{
    ChatCommand, CommandRouter, ConnectionLifecycle, CredentialExchangeOrchestrator,
    DiscoveryHandshake, DispatchOutcome, EventDispatcher, ExchangeConfig, HandshakePhase,
    InteractiveError, PendingRequestRegistry, RejectionReason, Responder, ResponseEvent,
    RoundTimeout, SessionHandler, SessionStatus,
};
use selfkit_interactive::exchange::AgreementTerms;
use selfkit_lib::credential::predicate::Predicate;
use selfkit_lib::credential::{
    CredentialBuilder, PresentationBuilder, CREDENTIAL_TYPE_AGREEMENT, CREDENTIAL_TYPE_CUSTOMER,
    CREDENTIAL_TYPE_EMAIL, CREDENTIAL_TYPE_VERIFIABLE, PRESENTATION_TYPE_CUSTOM,
};
use selfkit_lib::event::{InboundEvent, MessageEvent, WelcomeEvent};
use selfkit_lib::message::{
    AnonymousMessage, Chat, Content, ContentPayload, ContentType, CredentialPresentationRequest,
    CredentialPresentationResponse, CredentialVerificationRequest, Introduction, ResponseStatus,
};
use selfkit_lib::{Account, Address, Object, Token, Welcome};
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// One side of a conversation: account, inbox, registry and dispatcher.
struct Party {
    account: Arc<MockAccount>,
    inbox: Address,
    registry: PendingRequestRegistry<ResponseEvent>,
    dispatcher: EventDispatcher<SessionHandler>,
    lifecycle: Arc<ConnectionLifecycle>,
}

impl Party {
    fn new() -> Self {
        let account = Arc::new(MockAccount::new());
        let inbox = account.open_inbox();
        let registry = PendingRequestRegistry::new();
        let dyn_account: Arc<dyn Account> = account.clone();
        let lifecycle = Arc::new(ConnectionLifecycle::new(dyn_account.clone()));
        let handler = SessionHandler::new(dyn_account.clone(), lifecycle.clone())
            .with_responder(Responder::new(dyn_account).with_lifecycle(lifecycle.clone()));
        let dispatcher = EventDispatcher::new(registry.clone(), Arc::new(handler));
        Self {
            account,
            inbox,
            registry,
            dispatcher,
            lifecycle,
        }
    }

    fn orchestrator(&self, config: ExchangeConfig) -> CredentialExchangeOrchestrator {
        CredentialExchangeOrchestrator::new(
            self.account.clone(),
            self.registry.clone(),
            self.inbox,
            config,
        )
    }

    /// Wait for the `n`th outbound message (0-based).
    async fn sent(&self, n: usize) -> (Address, Content) {
        for _ in 0..200 {
            if let Some(entry) = self.account.sent().get(n) {
                return entry.clone();
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        panic!("message {} was never sent", n);
    }

    /// Deliver content `from` another party into this party's dispatcher.
    async fn deliver(&self, from: &Party, content: Content) -> DispatchOutcome {
        self.dispatcher
            .dispatch(InboundEvent::Message(MessageEvent::new(
                from.inbox,
                self.inbox,
                content,
            )))
            .await
    }

    /// Relay this party's `n`th outbound message to `to`.
    async fn relay(&self, n: usize, to: &Party) -> DispatchOutcome {
        let (recipient, content) = self.sent(n).await;
        assert_eq!(recipient, to.inbox);
        to.deliver(self, content).await
    }

    async fn store_credential(&self, credential_type: &str, claim: (&str, &str)) {
        let unsigned = CredentialBuilder::new()
            .credential_type([CREDENTIAL_TYPE_VERIFIABLE, credential_type])
            .subject(self.inbox)
            .issuer(self.inbox)
            .claim(claim.0, claim.1)
            .valid_from(Utc::now() - Duration::minutes(1))
            .finish()
            .unwrap();
        let credential = self.account.credential_issue(&unsigned).await.unwrap();
        self.account.credential_store(&credential).await.unwrap();
    }
}

struct FixedTerms;

impl AgreementTerms for FixedTerms {
    fn document(&self, issuer: &Address, counterparty: &Address) -> Object {
        Object::new(
            "text/plain",
            format!("{} agrees with {}", issuer, counterparty).into_bytes(),
        )
    }
}

#[tokio::test]
async fn test_discovery_handshake_resolves_responder() {
    let alice = Party::new();
    let bob = Party::new();

    let mut handshake = DiscoveryHandshake::new(
        alice.account.clone(),
        alice.registry.clone(),
        alice.inbox,
        Duration::minutes(5),
    );
    let ticket = handshake.begin().await.unwrap();
    assert_eq!(handshake.phase(), HandshakePhase::RequestSent);
    assert!(alice.registry.contains(&ticket.request_id));

    // Bob scans the code.
    let request = AnonymousMessage::decode(&ticket.code).unwrap().into_content();
    assert_eq!(request.id(), &ticket.request_id);
    assert_eq!(bob.deliver(&alice, request).await, DispatchOutcome::Handled);
    assert!(bob.lifecycle.is_connected(&alice.inbox));

    assert!(matches!(
        bob.relay(0, &alice).await,
        DispatchOutcome::Resolved { .. }
    ));

    let responder = handshake
        .await_responder(Some(std::time::Duration::from_secs(1)))
        .await
        .unwrap();
    assert_eq!(responder, bob.inbox);
    assert_eq!(handshake.phase(), HandshakePhase::Resolved);
    assert_eq!(handshake.responder(), Some(&bob.inbox));

    handshake.reset();
    assert_eq!(handshake.phase(), HandshakePhase::Idle);
}

#[tokio::test]
async fn test_discovery_handshake_rejects_second_begin() {
    let alice = Party::new();
    let mut handshake = DiscoveryHandshake::new(
        alice.account.clone(),
        alice.registry.clone(),
        alice.inbox,
        Duration::minutes(5),
    );
    handshake.begin().await.unwrap();
    assert!(matches!(
        handshake.begin().await,
        Err(InteractiveError::Protocol(_))
    ));
}

#[tokio::test]
async fn test_expired_discovery_request_is_not_answered() {
    let alice = Party::new();
    let bob = Party::new();

    let package = alice
        .account
        .connection_negotiate_out_of_band(&alice.inbox, Utc::now() - Duration::seconds(1))
        .await
        .unwrap();
    let request = selfkit_lib::message::DiscoveryRequest::builder(package)
        .expires(Utc::now() - Duration::seconds(1))
        .finish()
        .unwrap();

    assert_eq!(bob.deliver(&alice, request).await, DispatchOutcome::Handled);
    assert!(bob.account.sent().is_empty());
    assert!(!bob.lifecycle.is_connected(&alice.inbox));
}

#[tokio::test]
async fn test_presentation_round_accepts_matching_credential() {
    let alice = Party::new();
    let bob = Party::new();
    bob.store_credential(CREDENTIAL_TYPE_EMAIL, ("emailAddress", "bob@example.com"))
        .await;

    let orchestrator = alice.orchestrator(ExchangeConfig::default());
    let counterparty = bob.inbox;
    let round = tokio::spawn(async move {
        orchestrator
            .request_presentations(counterparty, vec![Predicate::email()])
            .await
    });

    assert_eq!(alice.relay(0, &bob).await, DispatchOutcome::Handled);
    assert!(matches!(
        bob.relay(0, &alice).await,
        DispatchOutcome::Resolved { .. }
    ));

    let outcome = round.await.unwrap().unwrap();
    assert!(outcome.is_accepted());
    assert_eq!(outcome.session.status, SessionStatus::Accepted);
    assert_eq!(outcome.response_status, ResponseStatus::Accepted);
    assert!(outcome.rejections.is_empty());

    let claims = outcome.verified_claims();
    assert_eq!(claims.len(), 1);
    assert_eq!(claims[0].1["emailAddress"], "bob@example.com");
    assert!(alice.registry.is_empty());
}

#[tokio::test]
async fn test_presentation_round_without_match_is_rejected() {
    let alice = Party::new();
    let bob = Party::new();
    bob.store_credential(CREDENTIAL_TYPE_CUSTOMER, ("name", "Bob")).await;

    let orchestrator = alice.orchestrator(ExchangeConfig::default());
    let counterparty = bob.inbox;
    let round = tokio::spawn(async move {
        orchestrator
            .request_presentations(counterparty, vec![Predicate::passport()])
            .await
    });

    alice.relay(0, &bob).await;
    bob.relay(0, &alice).await;

    let outcome = round.await.unwrap().unwrap();
    assert!(!outcome.is_accepted());
    assert_eq!(outcome.response_status, ResponseStatus::NotFound);
    assert_eq!(outcome.session.status, SessionStatus::Rejected);
}

/// Answer alice's outstanding presentation request with a hand-built response.
async fn answer_with(
    alice: &Party,
    bob: &Party,
    holder: Address,
    valid_from: chrono::DateTime<Utc>,
) -> DispatchOutcome {
    let (_, request) = alice.sent(0).await;
    assert_eq!(
        request.content_type(),
        ContentType::CredentialPresentationRequest
    );
    let _: CredentialPresentationRequest = request.decode().unwrap();

    let unsigned = CredentialBuilder::new()
        .credential_type([CREDENTIAL_TYPE_VERIFIABLE, CREDENTIAL_TYPE_EMAIL])
        .subject(holder)
        .issuer(holder)
        .claim("emailAddress", "someone@example.com")
        .valid_from(valid_from)
        .finish()
        .unwrap();
    let credential = bob.account.credential_issue(&unsigned).await.unwrap();
    let presentation = bob
        .account
        .presentation_issue(
            &PresentationBuilder::new()
                .presentation_type([PRESENTATION_TYPE_CUSTOM])
                .holder(holder)
                .credential_add(credential)
                .finish()
                .unwrap(),
        )
        .await
        .unwrap();

    let response = CredentialPresentationResponse::new(
        request.id().clone(),
        ResponseStatus::Accepted,
        vec![presentation],
    )
    .into_content()
    .unwrap();
    alice.deliver(bob, response).await
}

#[tokio::test]
async fn test_presentation_from_wrong_holder_is_rejected() {
    let alice = Party::new();
    let bob = Party::new();
    let stranger = bob.account.open_inbox();

    let orchestrator = alice.orchestrator(ExchangeConfig::default());
    let counterparty = bob.inbox;
    let round = tokio::spawn(async move {
        orchestrator
            .request_presentations(counterparty, vec![Predicate::email()])
            .await
    });

    answer_with(&alice, &bob, stranger, Utc::now()).await;

    let outcome = round.await.unwrap().unwrap();
    assert!(!outcome.is_accepted());
    assert_eq!(outcome.rejections.len(), 1);
    assert_eq!(
        outcome.rejections[0].reason,
        RejectionReason::HolderMismatch {
            expected: bob.inbox,
            actual: stranger
        }
    );
}

#[tokio::test]
async fn test_future_dated_credential_is_rejected() {
    let alice = Party::new();
    let bob = Party::new();

    let orchestrator = alice.orchestrator(ExchangeConfig::default());
    let counterparty = bob.inbox;
    let round = tokio::spawn(async move {
        orchestrator
            .request_presentations(counterparty, vec![Predicate::email()])
            .await
    });

    let valid_from = Utc::now() + Duration::days(1);
    answer_with(&alice, &bob, bob.inbox, valid_from).await;

    let outcome = round.await.unwrap().unwrap();
    assert!(!outcome.is_accepted());
    assert!(matches!(
        outcome.rejections[0].reason,
        RejectionReason::NotYetValid { .. }
    ));
    assert_eq!(outcome.rejections[0].reason.predicate(), "valid_from_not_future");
}

#[tokio::test]
async fn test_agreement_round_is_countersigned_and_stored() {
    let alice = Party::new();
    let bob = Party::new();

    let orchestrator = alice.orchestrator(ExchangeConfig::default());
    let counterparty = bob.inbox;
    let terms = FixedTerms.document(&alice.inbox, &bob.inbox);
    let terms_id = terms.id().to_string();
    let round = tokio::spawn(async move { orchestrator.run_agreement(counterparty, terms).await });

    let (_, request) = alice.sent(0).await;
    let decoded: CredentialVerificationRequest = request.decode().unwrap();
    assert_eq!(decoded.evidence().len(), 1);
    assert_eq!(decoded.proof().len(), 1);

    assert_eq!(alice.relay(0, &bob).await, DispatchOutcome::Handled);
    assert!(matches!(
        bob.relay(0, &alice).await,
        DispatchOutcome::Resolved { .. }
    ));

    let outcome = round.await.unwrap().unwrap();
    assert!(outcome.is_accepted());
    assert_eq!(outcome.accepted.len(), 2);
    assert!(outcome
        .accepted
        .iter()
        .all(|c| c.has_type(CREDENTIAL_TYPE_AGREEMENT)));
    assert!(outcome.accepted.iter().any(|c| c.issuer() == &bob.inbox));
    assert!(outcome.session.issued_credential.is_some());

    assert_eq!(alice.account.stored_credentials().len(), 2);
    assert!(alice.account.objects.lock().unwrap().contains_key(&terms_id));
}

#[tokio::test]
async fn test_agreement_upload_failure_does_not_abort_round() {
    let alice = Party::new();
    let bob = Party::new();
    alice.account.fail_upload.store(true, Ordering::SeqCst);

    let orchestrator = alice.orchestrator(ExchangeConfig::default());
    let counterparty = bob.inbox;
    let terms = FixedTerms.document(&alice.inbox, &bob.inbox);
    let round = tokio::spawn(async move { orchestrator.run_agreement(counterparty, terms).await });

    alice.relay(0, &bob).await;
    bob.relay(0, &alice).await;

    assert!(round.await.unwrap().unwrap().is_accepted());
}

#[tokio::test]
async fn test_round_times_out_when_unanswered() {
    let alice = Party::new();
    let config = ExchangeConfig {
        round_timeout: RoundTimeout::After(std::time::Duration::from_millis(20)),
        ..ExchangeConfig::default()
    };
    let orchestrator = alice.orchestrator(config);

    let result = orchestrator
        .request_presentations(Address::from_bytes([9; 32]), vec![Predicate::liveness()])
        .await;

    match result {
        Err(error @ InteractiveError::Timeout { .. }) => assert!(!error.is_fatal()),
        other => panic!("expected timeout, got {:?}", other.map(|o| o.response_status)),
    }
    assert!(alice.registry.is_empty());
}

#[tokio::test]
async fn test_custom_credential_is_stored_by_recipient() {
    let alice = Party::new();
    let bob = Party::new();

    let orchestrator = alice.orchestrator(ExchangeConfig::default());
    let issued = orchestrator
        .issue_custom_credential(bob.inbox, "Test Name")
        .await
        .unwrap();
    assert_eq!(issued.subject(), &bob.inbox);

    assert_eq!(alice.relay(0, &bob).await, DispatchOutcome::Handled);
    let stored = bob.account.stored_credentials();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].subject_claims()["name"], "Test Name");
}

#[tokio::test]
async fn test_command_router_runs_custom_credential_command() {
    let alice = Party::new();
    let bob = Party::new();
    let router = CommandRouter::new(
        Arc::new(alice.orchestrator(ExchangeConfig::default())),
        Arc::new(FixedTerms),
    );

    let msg = MessageEvent::new(
        bob.inbox,
        alice.inbox,
        Chat::new("REQUEST_GET_CUSTOM_CREDENTIAL").into_content().unwrap(),
    );
    let chat = Chat::new(ChatCommand::RequestGetCustomCredential.as_str());
    router.route(&msg, &chat).unwrap().await.unwrap();

    let (to, content) = alice.sent(0).await;
    assert_eq!(to, bob.inbox);
    assert_eq!(content.content_type(), ContentType::Credential);

    assert!(router.route(&msg, &Chat::new("hello there")).is_none());
}

#[tokio::test]
async fn test_session_handler_aborts_unfinished_command_rounds() {
    let alice = Party::new();
    let bob = Party::new();
    let config = ExchangeConfig {
        round_timeout: RoundTimeout::Never,
        ..ExchangeConfig::default()
    };
    let dyn_account: Arc<dyn Account> = alice.account.clone();
    let handler = Arc::new(
        SessionHandler::new(dyn_account, alice.lifecycle.clone()).with_commands(
            CommandRouter::new(Arc::new(alice.orchestrator(config)), Arc::new(FixedTerms)),
        ),
    );
    let dispatcher = EventDispatcher::new(alice.registry.clone(), Arc::clone(&handler));

    let chat = Chat::new(ChatCommand::RequestCredentialAuth.as_str())
        .into_content()
        .unwrap();
    let event = InboundEvent::Message(MessageEvent::new(bob.inbox, alice.inbox, chat));
    assert_eq!(dispatcher.dispatch(event).await, DispatchOutcome::Handled);

    // The request is out and nobody will answer it.
    let (to, content) = alice.sent(0).await;
    assert_eq!(to, bob.inbox);
    assert_eq!(content.content_type(), ContentType::CredentialPresentationRequest);
    assert_eq!(alice.registry.len(), 1);
    assert_eq!(handler.active_rounds(), 1);

    assert_eq!(handler.abort_rounds(), 1);
    assert_eq!(handler.active_rounds(), 0);
    for _ in 0..200 {
        if alice.registry.is_empty() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }
    assert!(alice.registry.is_empty());
    assert_eq!(handler.abort_rounds(), 0);
}

#[tokio::test]
async fn test_failed_welcome_is_dropped() {
    let alice = Party::new();
    alice.account.fail_connections.store(true, Ordering::SeqCst);

    let event = InboundEvent::Welcome(WelcomeEvent {
        from: Address::from_bytes([4; 32]),
        to: alice.inbox,
        welcome: Welcome {
            group: Address::from_bytes([5; 32]),
            bytes: vec![],
        },
    });
    assert_eq!(alice.dispatcher.dispatch(event).await, DispatchOutcome::Handled);
    assert_eq!(alice.lifecycle.connection_count(), 0);

    alice.account.fail_connections.store(false, Ordering::SeqCst);
    let event = InboundEvent::Welcome(WelcomeEvent {
        from: Address::from_bytes([4; 32]),
        to: alice.inbox,
        welcome: Welcome {
            group: Address::from_bytes([5; 32]),
            bytes: vec![],
        },
    });
    alice.dispatcher.dispatch(event).await;
    assert_eq!(
        alice.lifecycle.group_for(&Address::from_bytes([4; 32])),
        Some(Address::from_bytes([5; 32]))
    );
}

#[tokio::test]
async fn test_introduction_stops_at_first_token_failure() {
    let alice = Party::new();
    let bob = Party::new();
    let tokens = vec![
        Token {
            issuer: bob.inbox,
            bytes: vec![1],
        },
        Token {
            issuer: bob.inbox,
            bytes: vec![2],
        },
    ];

    alice.account.fail_token_store.store(true, Ordering::SeqCst);
    let content = Introduction::new(tokens.clone()).into_content().unwrap();
    assert_eq!(alice.deliver(&bob, content).await, DispatchOutcome::Handled);
    assert!(alice.account.tokens.lock().unwrap().is_empty());

    alice.account.fail_token_store.store(false, Ordering::SeqCst);
    let content = Introduction::new(tokens).into_content().unwrap();
    alice.deliver(&bob, content).await;
    assert_eq!(alice.account.tokens.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn test_chat_helper_sends_notification() {
    let alice = Party::new();
    let bob = Party::new();

    let id = selfkit_interactive::chat::send_with_notification(
        alice.account.as_ref(),
        &bob.inbox,
        "Hello!",
    )
    .await
    .unwrap();

    let (_, content) = alice.sent(0).await;
    assert_eq!(content.id(), &id);
    let notifications = alice.account.notifications.lock().unwrap().clone();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].1.description, "Hello!");
}
