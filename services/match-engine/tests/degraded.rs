//! Engine behaviour when its collaborators misbehave
//!
//! Covers:
//! - A notification sink that rejects everything
//! - An abort whose status write fails
//! - Settlement requested from an engine that never ran the match

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use match_engine::{EngineConfig, MatchEngine};
use rust_decimal::Decimal;
use settlement::repository::{
    LedgerRepository, MatchRecord, MatchRepository, ParticipantRecord, SettlementCommit,
};
use settlement::InMemoryStore;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use types::errors::{ConflictError, MatchError, NotifyError, StorageError};
use types::events::{MatchEvent, NotificationSink, RecordingSink};
use types::ids::{MatchId, ParticipantId, UserId};
use types::league::League;
use types::ledger::{Currency, LedgerEntry, LedgerParty, SettlementRecord, Wallet};
use types::roster::RosterEntry;
use types::status::{HeatNumber, HeatStatus, MatchStatus};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// Seven live seats then three ghosts.
fn roster() -> Vec<RosterEntry> {
    let buyin = League::Street.buyin();
    (0..10)
        .map(|i| {
            if i < 7 {
                RosterEntry::live(UserId::new(), format!("driver-{}", i), buyin)
            } else {
                RosterEntry::ghost(format!("ghost-{}", i), format!("replay-{}", i), buyin)
            }
        })
        .collect()
}

async fn wait_for_active(engine: &MatchEngine, match_id: MatchId, heat: u8) {
    for _ in 0..1_000 {
        let state = engine.snapshot(match_id).unwrap();
        if state.current_heat == heat && state.heat_status == HeatStatus::Active {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("heat {} never became active", heat);
}

/// Rejects every event.
struct FailingSink {
    attempts: AtomicUsize,
}

#[async_trait]
impl NotificationSink for FailingSink {
    async fn publish(&self, _event: MatchEvent) -> Result<(), NotifyError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(NotifyError {
            reason: "push gateway down".to_string(),
        })
    }
}

/// In-memory store whose `Aborted` status writes fail while `fail_aborts`
/// is set.
struct AbortFailStore {
    inner: InMemoryStore,
    fail_aborts: AtomicBool,
}

#[async_trait]
impl MatchRepository for AbortFailStore {
    async fn create_match(&self, record: MatchRecord, participants: Vec<ParticipantRecord>) -> Result<(), MatchError> {
        self.inner.create_match(record, participants).await
    }

    async fn get_match(&self, match_id: MatchId) -> Result<Option<MatchRecord>, MatchError> {
        self.inner.get_match(match_id).await
    }

    async fn update_match_status(&self, match_id: MatchId, status: MatchStatus, at: DateTime<Utc>) -> Result<(), MatchError> {
        if status == MatchStatus::Aborted && self.fail_aborts.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable {
                reason: "primary unreachable".to_string(),
            }
            .into());
        }
        self.inner.update_match_status(match_id, status, at).await
    }

    async fn list_participants(&self, match_id: MatchId) -> Result<Vec<ParticipantRecord>, MatchError> {
        self.inner.list_participants(match_id).await
    }

    async fn record_heat_score(
        &self,
        match_id: MatchId,
        participant_id: ParticipantId,
        heat: HeatNumber,
        score: Decimal,
    ) -> Result<(), MatchError> {
        self.inner.record_heat_score(match_id, participant_id, heat, score).await
    }
}

#[async_trait]
impl LedgerRepository for AbortFailStore {
    async fn append_entries(&self, entries: Vec<LedgerEntry>) -> Result<(), MatchError> {
        self.inner.append_entries(entries).await
    }

    async fn ledger_balance(&self, party: LedgerParty, currency: Currency) -> Result<Decimal, MatchError> {
        self.inner.ledger_balance(party, currency).await
    }

    async fn entries_for_reference(&self, match_id: MatchId) -> Result<Vec<LedgerEntry>, MatchError> {
        self.inner.entries_for_reference(match_id).await
    }

    async fn entries_for_party(&self, party: LedgerParty) -> Result<Vec<LedgerEntry>, MatchError> {
        self.inner.entries_for_party(party).await
    }

    async fn wallet(&self, user_id: UserId) -> Result<Option<Wallet>, MatchError> {
        self.inner.wallet(user_id).await
    }

    async fn put_wallet(&self, wallet: Wallet) -> Result<(), MatchError> {
        self.inner.put_wallet(wallet).await
    }

    async fn settlement_exists(&self, match_id: MatchId) -> Result<bool, MatchError> {
        self.inner.settlement_exists(match_id).await
    }

    async fn commit_settlement(&self, commit: SettlementCommit) -> Result<SettlementRecord, MatchError> {
        self.inner.commit_settlement(commit).await
    }
}

#[tokio::test(start_paused = true)]
async fn test_dead_sink_never_stalls_match_or_settlement() {
    init_tracing();
    let store = Arc::new(InMemoryStore::new());
    let sink = Arc::new(FailingSink {
        attempts: AtomicUsize::new(0),
    });
    let engine = MatchEngine::new(EngineConfig::default(), store.clone(), sink.clone());
    let created = engine.create_match(League::Street, roster()).await.unwrap();
    let id = created.match_id;

    for heat in 1..=3u8 {
        wait_for_active(&engine, id, heat).await;
        tokio::time::sleep(Duration::from_secs(10)).await;
        for pid in &created.participants[..7] {
            engine.lock_score(id, *pid, Decimal::from(40)).await.unwrap();
        }
    }

    let mut settled = false;
    for _ in 0..1_000 {
        if store.settlement_exists(id).await.unwrap() {
            settled = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(settled, "settlement never committed");

    let record = store.get_match(id).await.unwrap().unwrap();
    assert_eq!(record.status, MatchStatus::Completed);
    assert!(!store.entries_for_reference(id).await.unwrap().is_empty());
    // three starts, three ends, then settlement events
    assert!(sink.attempts.load(Ordering::SeqCst) > 6);
}

#[tokio::test(start_paused = true)]
async fn test_unpersisted_abort_leaves_match_running() {
    init_tracing();
    let store = Arc::new(AbortFailStore {
        inner: InMemoryStore::new(),
        fail_aborts: AtomicBool::new(true),
    });
    let engine = MatchEngine::new(EngineConfig::default(), store.clone(), Arc::new(RecordingSink::new()));
    let sweeper = engine.spawn_timeout_sweeper();
    let created = engine.create_match(League::Street, roster()).await.unwrap();
    let id = created.match_id;
    wait_for_active(&engine, id, 1).await;

    let err = engine.abort_match(id).await.unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(engine.snapshot(id).unwrap().status, MatchStatus::InProgress);
    assert_eq!(store.get_match(id).await.unwrap().unwrap().status, MatchStatus::InProgress);

    // sweeps leave a running match alone
    tokio::time::sleep(Duration::from_millis(2_500)).await;
    assert!(engine.snapshot(id).is_ok());

    store.fail_aborts.store(false, Ordering::SeqCst);
    engine.abort_match(id).await.unwrap();
    assert_eq!(store.get_match(id).await.unwrap().unwrap().status, MatchStatus::Aborted);
    tokio::time::sleep(Duration::from_millis(2_500)).await;
    assert!(engine.snapshot(id).is_err());

    let err = engine.settle(id).await.unwrap_err();
    assert!(matches!(
        err,
        MatchError::Conflict(ConflictError::MatchNotComplete {
            status: MatchStatus::Aborted,
            ..
        })
    ));
    assert_eq!(store.inner.entry_count().unwrap(), 0);
    sweeper.abort();
}

#[tokio::test(start_paused = true)]
async fn test_settle_without_local_state_refused() {
    let store = Arc::new(InMemoryStore::new());
    let runner = MatchEngine::new(EngineConfig::default(), store.clone(), Arc::new(RecordingSink::new()));
    let created = runner.create_match(League::Street, roster()).await.unwrap();

    // a second engine over the same storage never saw the heats
    let bystander = MatchEngine::new(EngineConfig::default(), store.clone(), Arc::new(RecordingSink::new()));
    let err = bystander.settle(created.match_id).await.unwrap_err();
    assert!(matches!(
        err,
        MatchError::Conflict(ConflictError::MatchNotComplete {
            status: MatchStatus::InProgress,
            ..
        })
    ));
    assert!(!store.settlement_exists(created.match_id).await.unwrap());
    assert_eq!(store.entry_count().unwrap(), 0);

    let err = bystander.settle(MatchId::new()).await.unwrap_err();
    assert!(matches!(err, MatchError::Conflict(ConflictError::MatchNotFound { .. })));
}
