// SPDX-License-Identifier: MIT

use alloy::primitives::{Address, U256};
use alloy::signers::local::PrivateKeySigner;
use equilibra::common::metrics::EngineStats;
use equilibra::domain::error::AppError;
use equilibra::domain::proposal::{ProposalDraft, ProposalKind, ProposalStatus};
use equilibra::infrastructure::data::{MemoryStore, ProposalStore, ProposalUpdate};
use equilibra::infrastructure::network::relayer::{ReceiptPolicy, Relayer};
use equilibra::services::rebalance::notifier::ProposalEvent;
use equilibra::services::rebalance::{MultiSig, ProposalService, ServiceDefaults};
use std::sync::Arc;
use tokio::sync::mpsc;

const RPC: &str = "http://localhost:8545";

fn owner(marker: u8) -> Address {
    Address::new([marker; 20])
}

fn defaults() -> ServiceDefaults {
    ServiceDefaults {
        token: Address::new([0x11; 20]),
        strategy: Address::new([0x22; 20]),
    }
}

fn dry_run_relayer() -> Arc<Relayer> {
    let provider = equilibra::infrastructure::network::provider::ConnectionFactory::http(RPC)
        .expect("provider");
    Arc::new(
        Relayer::new(
            RPC,
            provider,
            PrivateKeySigner::random(),
            Address::new([0x33; 20]),
            ReceiptPolicy {
                poll_ms: 100,
                timeout_ms: 1_000,
                confirm_blocks: 1,
            },
            true, // dry run: no chain traffic
        )
        .expect("relayer"),
    )
}

struct Harness {
    service: Arc<ProposalService<MemoryStore>>,
    store: Arc<MemoryStore>,
    relayer: Arc<Relayer>,
    events: mpsc::UnboundedReceiver<ProposalEvent>,
}

fn harness(owners: Vec<Address>, with_relayer: bool, auto_execute: bool) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let multisig = if owners.is_empty() {
        None
    } else {
        Some(MultiSig::new(owners, store.clone()))
    };
    let relayer = dry_run_relayer();
    let (tx, rx) = mpsc::unbounded_channel();
    let service = Arc::new(ProposalService::new(
        store.clone(),
        multisig,
        with_relayer.then(|| relayer.clone()),
        tx,
        Arc::new(EngineStats::default()),
        defaults(),
        auto_execute,
    ));
    Harness {
        service,
        store,
        relayer,
        events: rx,
    }
}

fn draft(amount: &str) -> ProposalDraft {
    ProposalDraft {
        kind: Some(ProposalKind::Deposit),
        token: None,
        amount: Some(amount.to_string()),
        strategy: None,
        reason: Some("integration test".to_string()),
        execution_time: None,
    }
}

#[tokio::test]
async fn created_proposals_start_pending_with_defaults() {
    let mut h = harness(vec![], false, false);
    let p = h.service.create(draft("1000")).await.unwrap();

    assert_eq!(p.status, ProposalStatus::Pending);
    assert_eq!(p.token, defaults().token);
    assert_eq!(p.strategy, defaults().strategy);
    assert_eq!(p.amount, U256::from(1000u64));
    assert!(p.tx_hash.is_none());

    let listed = h.service.proposals().await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0], p);

    assert!(matches!(h.events.try_recv(), Ok(ProposalEvent::Created(_))));
}

#[tokio::test]
async fn creation_roundtrip_preserves_every_field() {
    let h = harness(vec![], false, false);
    let mut d = draft("42");
    d.execution_time = Some(1_800_000_000_000);
    let created = h.service.create(d).await.unwrap();

    let read_back = h.service.proposal(&created.id).await.unwrap();
    assert_eq!(read_back, created);
    assert_eq!(read_back.execution_time, Some(1_800_000_000_000));
}

#[tokio::test]
async fn confirmations_drive_quorum_and_approval() {
    let owners = vec![owner(1), owner(2), owner(3)];
    let mut h = harness(owners, false, false);
    let p = h.service.create(draft("1000")).await.unwrap();

    let after_one = h.service.confirm(&p.id, owner(1)).await.unwrap();
    assert_eq!(after_one.status, ProposalStatus::Pending);

    // Re-confirming the same owner does not advance quorum.
    let again = h.service.confirm(&p.id, owner(1)).await.unwrap();
    assert_eq!(again.status, ProposalStatus::Pending);

    let after_two = h.service.confirm(&p.id, owner(2)).await.unwrap();
    assert_eq!(after_two.status, ProposalStatus::Approved);

    let mut saw_approved = false;
    while let Ok(event) = h.events.try_recv() {
        if matches!(event, ProposalEvent::Approved { .. }) {
            saw_approved = true;
        }
    }
    assert!(saw_approved);
}

#[tokio::test]
async fn non_owner_confirmation_is_rejected() {
    let h = harness(vec![owner(1), owner(2), owner(3)], false, false);
    let p = h.service.create(draft("1000")).await.unwrap();

    let err = h.service.confirm(&p.id, owner(9)).await.unwrap_err();
    assert!(matches!(err, AppError::NotAnOwner(_)));
}

#[tokio::test]
async fn approved_proposal_executes_and_records_hash() {
    let owners = vec![owner(1), owner(2), owner(3)];
    let h = harness(owners, true, false);
    let p = h.service.create(draft("1000")).await.unwrap();

    h.service.confirm(&p.id, owner(1)).await.unwrap();
    h.service.confirm(&p.id, owner(2)).await.unwrap();

    let tx_hash = h.service.execute(&p.id).await.unwrap();
    assert!(tx_hash.starts_with("0x"));
    assert_eq!(h.relayer.submission_count(), 1);

    let done = h.service.proposal(&p.id).await.unwrap();
    assert_eq!(done.status, ProposalStatus::Executed);
    assert_eq!(done.tx_hash.as_deref(), Some(tx_hash.as_str()));

    // Confirmation record is cleared once terminal.
    assert!(h.store.confirmations(&p.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn quorum_gated_proposal_cannot_skip_approval() {
    let h = harness(vec![owner(1), owner(2), owner(3)], true, false);
    let p = h.service.create(draft("1000")).await.unwrap();

    let err = h.service.execute(&p.id).await.unwrap_err();
    assert!(matches!(
        err,
        AppError::InvalidTransition {
            from: ProposalStatus::Pending,
            to: ProposalStatus::Executed,
            ..
        }
    ));
    assert_eq!(h.relayer.submission_count(), 0);
}

#[tokio::test]
async fn single_key_deployment_approves_then_executes() {
    // No owner set configured: the service approves explicitly before
    // executing, so the state machine still never skips a state.
    let h = harness(vec![], true, false);
    let p = h.service.create(draft("1000")).await.unwrap();

    let tx_hash = h.service.execute(&p.id).await.unwrap();
    assert!(!tx_hash.is_empty());

    let done = h.service.proposal(&p.id).await.unwrap();
    assert_eq!(done.status, ProposalStatus::Executed);
}

#[tokio::test]
async fn execution_requires_a_configured_relayer() {
    let h = harness(vec![], false, false);
    let p = h.service.create(draft("1000")).await.unwrap();

    assert!(!h.service.execution_enabled());
    let err = h.service.execute(&p.id).await.unwrap_err();
    assert!(matches!(err, AppError::Validation { field, .. } if field == "relayer"));
}

#[tokio::test]
async fn failed_proposal_is_terminal() {
    let h = harness(vec![], true, false);
    let p = h.service.create(draft("1000")).await.unwrap();
    h.store
        .update(&p.id, ProposalUpdate::status(ProposalStatus::Failed))
        .await
        .unwrap();

    let err = h.service.execute(&p.id).await.unwrap_err();
    assert!(matches!(
        err,
        AppError::InvalidTransition {
            from: ProposalStatus::Failed,
            ..
        }
    ));

    let err = h.service.confirm(&p.id, owner(1)).await.unwrap_err();
    assert!(matches!(err, AppError::Validation { .. } | AppError::InvalidTransition { .. }));
}

#[tokio::test]
async fn scheduled_proposals_wait_for_their_execution_time() {
    let h = harness(vec![], true, false);
    let mut d = draft("1000");
    // Far enough in the future to stay scheduled for the test's lifetime.
    d.execution_time = Some(4_102_444_800_000);
    let p = h.service.create(d).await.unwrap();

    let err = h.service.execute(&p.id).await.unwrap_err();
    assert!(matches!(err, AppError::Validation { field, .. } if field == "executionTime"));
    assert_eq!(h.relayer.submission_count(), 0);
}

#[tokio::test]
async fn concurrent_executes_submit_exactly_once() {
    let h = harness(vec![], true, false);
    let p = h.service.create(draft("1000")).await.unwrap();

    let (a, b) = tokio::join!(h.service.execute(&p.id), h.service.execute(&p.id));

    // Exactly one underlying submission; the loser observes either the
    // winner's result or an explicit already-executing error.
    assert_eq!(h.relayer.submission_count(), 1);
    let winner_hash = h
        .service
        .proposal(&p.id)
        .await
        .unwrap()
        .tx_hash
        .expect("winner recorded a hash");

    for outcome in [a, b] {
        match outcome {
            Ok(hash) => assert_eq!(hash, winner_hash),
            Err(AppError::AlreadyExecuting(id)) => assert_eq!(id, p.id),
            Err(other) => panic!("unexpected outcome: {other}"),
        }
    }
}

#[tokio::test]
async fn auto_execute_fires_on_quorum() {
    let owners = vec![owner(1), owner(2), owner(3)];
    let h = harness(owners, true, true);
    let p = h.service.create(draft("1000")).await.unwrap();

    h.service.confirm(&p.id, owner(1)).await.unwrap();
    let after_quorum = h.service.confirm(&p.id, owner(2)).await.unwrap();

    assert_eq!(after_quorum.status, ProposalStatus::Executed);
    assert_eq!(h.relayer.submission_count(), 1);
}
