//! Whole-match tests on tokio's paused clock
//!
//! Covers:
//! - Three heats with early ends, automatic settlement, ghost on the podium
//! - Physics ceiling boundary and the anti-cheat rejection
//! - Early heat end once every live seat is done, ghosts or not
//! - Write-once locks, forfeits, abort, and the timeout sweeper

use race_core::PhysicsModel;
use rust_decimal::Decimal;
use settlement::ledger::Ledger;
use settlement::repository::{LedgerRepository, MatchRepository};
use settlement::{InMemoryStore, SettlementOutcome};
use match_engine::{EngineConfig, MatchEngine};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use types::errors::{AntiCheatError, ConflictError, MatchError, ValidationError};
use types::events::RecordingSink;
use types::ids::{MatchId, UserId};
use types::league::League;
use types::ledger::{Currency, SystemWallet};
use types::numeric::checked_sum;
use types::roster::RosterEntry;
use types::status::{HeatNumber, HeatStatus, MatchStatus};

fn d(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

struct Rig {
    engine: Arc<MatchEngine>,
    store: Arc<InMemoryStore>,
    sink: Arc<RecordingSink>,
}

fn rig() -> Rig {
    let store = Arc::new(InMemoryStore::new());
    let sink = Arc::new(RecordingSink::new());
    let engine = MatchEngine::new(EngineConfig::default(), store.clone(), sink.clone());
    Rig { engine, store, sink }
}

/// Seat name, ghost flag, score locked every heat.
const SEATS: [(&str, bool, &str); 10] = [
    ("alice", false, "300"),
    ("ghost-1", true, "290"),
    ("bob", false, "280"),
    ("carol", false, "270"),
    ("dave", false, "260"),
    ("erin", false, "250"),
    ("ghost-2", true, "240"),
    ("frank", false, "230"),
    ("ghost-3", true, "220"),
    ("grace", false, "210"),
];

fn street_roster() -> (Vec<RosterEntry>, Vec<Option<UserId>>) {
    let buyin = League::Street.buyin();
    let roster: Vec<RosterEntry> = SEATS
        .iter()
        .map(|(name, ghost, _)| {
            if *ghost {
                RosterEntry::ghost(*name, format!("replay-{}", name), buyin)
            } else {
                RosterEntry::live(UserId::new(), *name, buyin)
            }
        })
        .collect();
    let users = roster.iter().map(|e| e.user_id).collect();
    (roster, users)
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

async fn wait_for_settled(store: &InMemoryStore, match_id: MatchId) {
    for _ in 0..1_000 {
        let record = store.get_match(match_id).await.unwrap().unwrap();
        if record.status == MatchStatus::Completed {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("match {} never settled", match_id);
}

async fn settle_a_little() {
    tokio::time::sleep(Duration::from_millis(100)).await;
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test(start_paused = true)]
async fn test_full_street_match_settles_automatically() {
    init_tracing();
    let rig = rig();
    let (roster, users) = street_roster();
    let created = rig.engine.create_match(League::Street, roster).await.unwrap();
    let id = created.match_id;
    assert_eq!(created.rake_amount, d("40"));
    assert_eq!(created.prize_pool, d("460"));
    assert_eq!(created.commit_hash.len(), 64);

    for heat in 1..=3u8 {
        wait_for_active(&rig.engine, id, heat).await;
        tokio::time::sleep(Duration::from_secs(20)).await;
        for (pid, (_, _, score)) in created.participants.iter().zip(SEATS.iter()) {
            let receipt = rig.engine.lock_score(id, *pid, d(score)).await.unwrap();
            assert_eq!(receipt.heat.get(), heat);
        }
    }

    wait_for_settled(&rig.store, id).await;
    settle_a_little().await;

    let ledger = Ledger::new(rig.store.clone());
    let alice = users[0].unwrap();
    let bob = users[2].unwrap();
    let dave = users[4].unwrap();
    let erin = users[5].unwrap();
    assert_eq!(ledger.user_balance(alice, Currency::Fuel).await.unwrap(), d("230"));
    assert_eq!(ledger.user_balance(alice, Currency::Burn).await.unwrap(), d("50"));
    assert_eq!(ledger.user_balance(bob, Currency::Fuel).await.unwrap(), d("92"));
    assert_eq!(ledger.user_balance(bob, Currency::Burn).await.unwrap(), d("20"));
    assert_eq!(ledger.user_balance(dave, Currency::Burn).await.unwrap(), d("5"));
    assert_eq!(ledger.user_balance(erin, Currency::Burn).await.unwrap(), Decimal::ZERO);
    assert_eq!(ledger.system_balance(SystemWallet::Rake, Currency::Fuel).await.unwrap(), d("40"));
    assert_eq!(ledger.system_balance(SystemWallet::House, Currency::Burn).await.unwrap(), d("-85"));

    for currency in [Currency::Fuel, Currency::Burn] {
        let entries = rig.store.entries_for_reference(id).await.unwrap();
        let net = checked_sum(entries.iter().filter(|e| e.currency == currency).map(|e| e.amount)).unwrap();
        assert_eq!(net, Decimal::ZERO, "{:?}", currency);
    }

    let participants = rig.store.list_participants(id).await.unwrap();
    assert_eq!(participants[0].final_rank, Some(1));
    assert_eq!(participants[1].final_rank, Some(2));
    assert_eq!(participants[1].prize, d("138"));
    assert_eq!(participants[1].burn_reward, Decimal::ZERO);
    assert_eq!(participants[0].scores.heat(HeatNumber::LAST), Some(d("300")));
    assert_eq!(participants[0].total_score, d("900"));

    assert!(rig.engine.snapshot(id).is_err());
    assert_eq!(rig.sink.count("heat_started"), 3);
    assert_eq!(rig.sink.count("heat_ended"), 3);
    assert_eq!(rig.sink.count("match_settled"), 1);
    assert_eq!(rig.sink.count("balance_updated"), 7);

    // worker already settled it
    let again = rig.engine.settle(id).await.unwrap();
    assert_eq!(again, SettlementOutcome::AlreadySettled);
}

#[tokio::test(start_paused = true)]
async fn test_score_at_ceiling_accepted_above_rejected() {
    init_tracing();
    let rig = rig();
    let (roster, _) = street_roster();
    let created = rig.engine.create_match(League::Street, roster).await.unwrap();
    let id = created.match_id;

    // countdown plus ten seconds of heat
    tokio::time::sleep(Duration::from_millis(13_000)).await;
    let ceiling = PhysicsModel::default().max_score_at(10.0 + 0.1).unwrap();

    let receipt = rig.engine.lock_score(id, created.participants[0], ceiling).await.unwrap();
    assert_eq!(receipt.score, ceiling);
    assert_eq!(receipt.heat_rank, 1);

    let err = rig
        .engine
        .lock_score(id, created.participants[1], ceiling + d("0.01"))
        .await
        .unwrap_err();
    assert!(err.is_anti_cheat());
    assert!(matches!(
        err,
        MatchError::AntiCheat(AntiCheatError::ScoreExceedsCeiling { heat_time_ms: 10_000, .. })
    ));

    let state = rig.engine.snapshot(id).unwrap();
    let rejected = state.player(created.participants[1]).unwrap();
    assert!(!rejected.locked);
    assert_eq!(rejected.scores.heat(HeatNumber::FIRST), None);
}

#[tokio::test(start_paused = true)]
async fn test_lock_during_countdown_rejected() {
    let rig = rig();
    let (roster, _) = street_roster();
    let created = rig.engine.create_match(League::Street, roster).await.unwrap();

    tokio::time::sleep(Duration::from_millis(1_000)).await;
    let err = rig
        .engine
        .lock_score(created.match_id, created.participants[0], d("1"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        MatchError::Conflict(ConflictError::HeatNotActive {
            status: HeatStatus::Countdown
        })
    ));
}

#[tokio::test(start_paused = true)]
async fn test_second_lock_keeps_first_score() {
    let rig = rig();
    let (roster, _) = street_roster();
    let created = rig.engine.create_match(League::Street, roster).await.unwrap();
    let id = created.match_id;
    let pid = created.participants[2];

    wait_for_active(&rig.engine, id, 1).await;
    tokio::time::sleep(Duration::from_secs(15)).await;

    rig.engine.lock_score(id, pid, d("120.50")).await.unwrap();
    let err = rig.engine.lock_score(id, pid, d("150")).await.unwrap_err();
    assert!(matches!(err, MatchError::Conflict(ConflictError::AlreadyLocked { heat: 1, .. })));

    let state = rig.engine.snapshot(id).unwrap();
    assert_eq!(state.player(pid).unwrap().scores.heat(HeatNumber::FIRST), Some(d("120.50")));

    settle_a_little().await;
    let persisted = rig.store.list_participants(id).await.unwrap();
    assert_eq!(persisted[2].scores.heat(HeatNumber::FIRST), Some(d("120.50")));
}

#[tokio::test(start_paused = true)]
async fn test_negative_score_and_unknown_match() {
    let rig = rig();
    let (roster, _) = street_roster();
    let created = rig.engine.create_match(League::Street, roster).await.unwrap();
    wait_for_active(&rig.engine, created.match_id, 1).await;

    let err = rig
        .engine
        .lock_score(created.match_id, created.participants[0], d("-1"))
        .await
        .unwrap_err();
    assert!(matches!(err, MatchError::Validation(ValidationError::NegativeScore { .. })));

    let err = rig
        .engine
        .lock_score(MatchId::new(), created.participants[0], d("1"))
        .await
        .unwrap_err();
    assert!(matches!(err, MatchError::Conflict(ConflictError::MatchNotFound { .. })));
}

#[tokio::test(start_paused = true)]
async fn test_forfeit_lets_heat_end_early() {
    let rig = rig();
    let (roster, _) = street_roster();
    let created = rig.engine.create_match(League::Street, roster).await.unwrap();
    let id = created.match_id;
    wait_for_active(&rig.engine, id, 1).await;
    tokio::time::sleep(Duration::from_secs(5)).await;

    let crashed = created.participants[9];
    rig.engine.forfeit(id, crashed).await.unwrap();
    let err = rig.engine.lock_score(id, crashed, d("10")).await.unwrap_err();
    assert!(matches!(err, MatchError::Conflict(ConflictError::PlayerNotAlive { .. })));

    let live = created.participants[..9].iter().zip(SEATS.iter()).filter(|(_, (_, ghost, _))| !*ghost);
    for (pid, _) in live {
        rig.engine.lock_score(id, *pid, d("20")).await.unwrap();
    }
    settle_a_little().await;

    let state = rig.engine.snapshot(id).unwrap();
    assert_eq!(state.current_heat, 1);
    assert_eq!(state.heat_status, HeatStatus::Intermission);
    assert_eq!(rig.sink.count("heat_ended"), 1);
    assert_eq!(state.player(crashed).unwrap().scores.heat(HeatNumber::FIRST), None);

    // heat 2 restores the crashed player
    tokio::time::sleep(Duration::from_millis(5_100)).await;
    let state = rig.engine.snapshot(id).unwrap();
    assert_eq!(state.current_heat, 2);
    assert!(state.player(crashed).unwrap().alive);
}

#[tokio::test(start_paused = true)]
async fn test_idle_ghosts_do_not_hold_heat_open() {
    let rig = rig();
    let (roster, _) = street_roster();
    let created = rig.engine.create_match(League::Street, roster).await.unwrap();
    let id = created.match_id;
    wait_for_active(&rig.engine, id, 1).await;
    tokio::time::sleep(Duration::from_secs(6)).await;

    let seats: Vec<_> = created.participants.iter().zip(SEATS.iter()).collect();
    for (pid, _) in seats.iter().filter(|(_, (_, ghost, _))| !*ghost) {
        rig.engine.lock_score(id, **pid, d("30")).await.unwrap();
    }
    settle_a_little().await;

    let state = rig.engine.snapshot(id).unwrap();
    assert_eq!(state.current_heat, 1);
    assert_eq!(state.heat_status, HeatStatus::Intermission);
    assert_eq!(rig.sink.count("heat_ended"), 1);
    for (pid, _) in seats.iter().filter(|(_, (_, ghost, _))| *ghost) {
        assert_eq!(state.player(**pid).unwrap().scores.heat(HeatNumber::FIRST), None);
    }

    // a ghost arriving after the early end is turned away
    let late = rig.engine.lock_score(id, created.participants[1], d("30")).await.unwrap_err();
    assert!(matches!(
        late,
        MatchError::Conflict(ConflictError::HeatNotActive {
            status: HeatStatus::Intermission
        })
    ));
}

#[tokio::test(start_paused = true)]
async fn test_aborted_match_never_settles() {
    let rig = rig();
    let (roster, users) = street_roster();
    let created = rig.engine.create_match(League::Street, roster).await.unwrap();
    let id = created.match_id;

    wait_for_active(&rig.engine, id, 1).await;
    rig.engine.abort_match(id).await.unwrap();
    tokio::time::sleep(Duration::from_secs(120)).await;

    assert_eq!(rig.sink.count("heat_ended"), 0);
    assert_eq!(rig.sink.count("match_settled"), 0);
    let record = rig.store.get_match(id).await.unwrap().unwrap();
    assert_eq!(record.status, MatchStatus::Aborted);
    assert!(!record.seed_revealed);

    let err = rig.engine.settle(id).await.unwrap_err();
    assert!(matches!(err, MatchError::Conflict(ConflictError::MatchNotComplete { .. })));
    assert_eq!(rig.store.entry_count().unwrap(), 0);

    let ledger = Ledger::new(rig.store.clone());
    assert_eq!(ledger.user_balance(users[0].unwrap(), Currency::Fuel).await.unwrap(), Decimal::ZERO);

    assert!(rig.engine.abort_match(id).await.is_err());
}

#[tokio::test(start_paused = true)]
async fn test_settle_before_final_heat_rejected() {
    let rig = rig();
    let (roster, _) = street_roster();
    let created = rig.engine.create_match(League::Street, roster).await.unwrap();

    let err = rig.engine.settle(created.match_id).await.unwrap_err();
    assert!(matches!(
        err,
        MatchError::Conflict(ConflictError::MatchNotComplete {
            status: MatchStatus::InProgress,
            ..
        })
    ));
    assert!(!rig.store.settlement_exists(created.match_id).await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn test_invalid_roster_rejected() {
    let rig = rig();
    let (mut roster, _) = street_roster();
    roster.pop();

    let err = rig.engine.create_match(League::Street, roster).await.unwrap_err();
    assert!(matches!(
        err,
        MatchError::Validation(ValidationError::RosterSize { expected: 10, actual: 9 })
    ));
    assert!(rig.engine.active_matches().is_empty());
    assert_eq!(rig.sink.count("heat_started"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_sweeper_purges_aborted_matches() {
    let rig = rig();
    let sweeper = rig.engine.spawn_timeout_sweeper();
    let (roster, _) = street_roster();
    let created = rig.engine.create_match(League::Street, roster).await.unwrap();
    assert_eq!(rig.engine.active_matches(), vec![created.match_id]);

    rig.engine.abort_match(created.match_id).await.unwrap();
    tokio::time::sleep(Duration::from_millis(2_500)).await;

    assert!(matches!(
        rig.engine.snapshot(created.match_id),
        Err(MatchError::Conflict(ConflictError::MatchNotFound { .. }))
    ));
    sweeper.abort();
}
