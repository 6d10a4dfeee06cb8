//! Full demo rounds over the loopback network with a simulated peer.

use std::time::Duration;

use selfkit_demo_core::{
    DemoConfig, DemoSession, LoopbackAccount, LoopbackNetwork, SessionOptions, SimulatedPeer,
};
use selfkit_demo_core::{Identity, PlainTextTerms};
use selfkit_interactive::{AgreementTerms, HandshakePhase, RoundTimeout};
use selfkit_lib::credential::predicate::Predicate;
use selfkit_lib::credential::{CREDENTIAL_TYPE_AGREEMENT, CREDENTIAL_TYPE_CUSTOMER};
use selfkit_lib::Account;

fn test_config(dir: &tempfile::TempDir) -> DemoConfig {
    let mut config = DemoConfig::ephemeral(dir.path())
        .with_round_timeout(RoundTimeout::After(Duration::from_secs(5)));
    config.peer_delay = Duration::from_millis(10);
    config
}

async fn connected_pair(
    network: &LoopbackNetwork,
    config: &DemoConfig,
    options: SessionOptions,
) -> (DemoSession, SimulatedPeer) {
    let session = DemoSession::open(network, config, &Identity::generate(), options).unwrap();
    let peer = SimulatedPeer::start(network, config).await.unwrap();

    let mut handshake = session.handshake();
    let ticket = handshake.begin().await.unwrap();
    peer.scan_after_delay(ticket.code);
    let responder = handshake
        .await_responder(config.discovery_timeout())
        .await
        .unwrap();
    assert_eq!(responder, peer.inbox());

    (session, peer)
}

async fn customer_credentials(account: &LoopbackAccount) -> usize {
    account
        .credentials_list()
        .await
        .unwrap()
        .into_iter()
        .filter(|c| c.credential_type().iter().any(|t| t == CREDENTIAL_TYPE_CUSTOMER))
        .count()
}

#[tokio::test]
async fn test_discovery_connects_both_sides() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&dir);
    let network = LoopbackNetwork::new();

    let (session, peer) = connected_pair(&network, &config, SessionOptions::default()).await;

    assert!(session.account().is_connected(&peer.inbox()));
    assert!(peer.session().account().is_connected(&session.inbox()));
    assert!(session.registry().is_empty());

    peer.close().await.unwrap();
    session.close().await.unwrap();
}

#[tokio::test]
async fn test_handshake_is_reused_across_rounds() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&dir);
    let network = LoopbackNetwork::new();
    let session =
        DemoSession::open(&network, &config, &Identity::generate(), SessionOptions::default())
            .unwrap();
    let peer = SimulatedPeer::start(&network, &config).await.unwrap();

    let mut handshake = session.handshake();
    let mut request_ids = Vec::new();
    for _ in 0..2 {
        let ticket = handshake.begin().await.unwrap();
        request_ids.push(ticket.request_id.clone());
        peer.scan_after_delay(ticket.code);
        let responder = handshake
            .await_responder(config.discovery_timeout())
            .await
            .unwrap();
        assert_eq!(responder, peer.inbox());

        let outcome = session
            .orchestrator()
            .request_presentations(peer.inbox(), vec![Predicate::liveness()])
            .await
            .unwrap();
        assert!(outcome.is_accepted());

        handshake.reset();
        assert_eq!(handshake.phase(), HandshakePhase::Idle);
    }

    assert_ne!(request_ids[0], request_ids[1]);
    assert!(session.registry().is_empty());
    assert_eq!(session.stats().snapshot().resolved, 4);

    peer.close().await.unwrap();
    session.close().await.unwrap();
}

#[tokio::test]
async fn test_presentation_round_against_peer() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&dir);
    let network = LoopbackNetwork::new();
    let (session, peer) = connected_pair(&network, &config, SessionOptions::default()).await;

    let outcome = session
        .orchestrator()
        .request_presentations(peer.inbox(), vec![Predicate::email()])
        .await
        .unwrap();

    assert!(outcome.is_accepted());
    let claims = outcome.verified_claims();
    assert_eq!(claims.len(), 1);
    assert_eq!(claims[0].1["emailAddress"], "peer@example.com");

    peer.close().await.unwrap();
    session.close().await.unwrap();
}

#[tokio::test]
async fn test_agreement_round_against_peer() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&dir);
    let network = LoopbackNetwork::new();
    let (session, peer) = connected_pair(&network, &config, SessionOptions::default()).await;

    let terms = PlainTextTerms::default().document(&session.inbox(), &peer.inbox());
    let outcome = session
        .orchestrator()
        .run_agreement(peer.inbox(), terms)
        .await
        .unwrap();
    assert!(outcome.is_accepted());

    let stored = session.account().credentials_list().await.unwrap();
    assert!(stored
        .iter()
        .all(|c| c.credential_type().iter().any(|t| t == CREDENTIAL_TYPE_AGREEMENT)));
    assert!(!stored.is_empty());

    peer.close().await.unwrap();
    session.close().await.unwrap();
}

#[tokio::test]
async fn test_served_command_issues_custom_credential() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&dir);
    let network = LoopbackNetwork::new();
    let options = SessionOptions {
        answer_requests: false,
        serve_commands: true,
    };
    let (session, peer) = connected_pair(&network, &config, options).await;

    assert_eq!(customer_credentials(peer.session().account()).await, 1);

    peer.send_chat(&session.inbox(), "REQUEST_GET_CUSTOM_CREDENTIAL")
        .await
        .unwrap();

    let mut received = false;
    for _ in 0..100 {
        if customer_credentials(peer.session().account()).await == 2 {
            received = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(received, "peer never stored the issued credential");

    peer.close().await.unwrap();
    session.close().await.unwrap();
}

#[tokio::test]
async fn test_close_stops_event_pump() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&dir);
    let network = LoopbackNetwork::new();
    let session =
        DemoSession::open(&network, &config, &Identity::generate(), SessionOptions::default())
            .unwrap();
    let inbox = session.inbox();
    let account = session.account().clone();

    tokio::time::timeout(Duration::from_secs(2), session.close())
        .await
        .expect("close hung")
        .unwrap();
    assert!(!network.is_routed(&inbox));
    assert!(account.inbox_list().await.is_err());
}
