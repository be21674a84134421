//! In-memory match state
//!
//! Snapshots of these structs are what callers of the state store see.
//! Only the store mutates them.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use types::events::{HeatResult, ParticipantView, Standing, TargetKind, TargetLine};
use types::ids::{MatchId, ParticipantId, UserId};
use types::league::League;
use types::roster::RosterEntry;
use types::scoring::{compare_final, sort_heat, HeatEntry, ScoreCard};
use types::status::{HeatNumber, HeatStatus, MatchStatus, HEATS_PER_MATCH};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerState {
    pub participant_id: ParticipantId,
    pub seat: u8,
    pub user_id: Option<UserId>,
    pub display_name: String,
    pub is_ghost: bool,
    pub ghost_replay_source_id: Option<String>,
    pub scores: ScoreCard,
    /// Cleared on crash or forfeit for the current heat
    pub alive: bool,
    /// Set once a score is recorded for the current heat
    pub locked: bool,
    pub locked_at: Option<DateTime<Utc>>,
    /// Placing within each completed heat
    pub heat_ranks: [Option<u32>; HEATS_PER_MATCH as usize],
    pub final_rank: Option<u32>,
}

impl PlayerState {
    pub fn from_roster(seat: u8, entry: &RosterEntry) -> Self {
        Self {
            participant_id: ParticipantId::new(),
            seat,
            user_id: entry.user_id,
            display_name: entry.display_name.clone(),
            is_ghost: entry.is_ghost,
            ghost_replay_source_id: entry.ghost_replay_source_id.clone(),
            scores: ScoreCard::new(),
            alive: true,
            locked: false,
            locked_at: None,
            heat_ranks: [None; HEATS_PER_MATCH as usize],
            final_rank: None,
        }
    }

    pub fn total_score(&self) -> Decimal {
        self.scores.total()
    }

    /// Live player still expected to act in the current heat. Ghosts may
    /// lock while the heat is open but never hold it open.
    pub fn is_pending(&self) -> bool {
        !self.is_ghost && self.alive && !self.locked
    }

    pub(crate) fn heat_entry(&self, heat: HeatNumber) -> HeatEntry {
        HeatEntry {
            score: self.scores.heat(heat),
            locked_at: self.locked_at,
        }
    }

    fn reset_for_heat(&mut self) {
        self.alive = true;
        self.locked = false;
        self.locked_at = None;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchState {
    pub match_id: MatchId,
    pub league: League,
    pub status: MatchStatus,
    /// 0 before heat 1 starts
    pub current_heat: u8,
    pub heat_status: HeatStatus,
    pub heat_started_at: Option<DateTime<Utc>>,
    pub heat_ended_at: Option<DateTime<Utc>>,
    pub players: Vec<PlayerState>,
    pub created_at: DateTime<Utc>,
}

impl MatchState {
    pub fn new(match_id: MatchId, league: League, players: Vec<PlayerState>, now: DateTime<Utc>) -> Self {
        Self {
            match_id,
            league,
            status: MatchStatus::Forming,
            current_heat: 0,
            heat_status: HeatStatus::Waiting,
            heat_started_at: None,
            heat_ended_at: None,
            players,
            created_at: now,
        }
    }

    /// Current heat, `None` before heat 1.
    pub fn heat(&self) -> Option<HeatNumber> {
        HeatNumber::new(self.current_heat).ok()
    }

    pub fn player(&self, participant_id: ParticipantId) -> Option<&PlayerState> {
        self.players.iter().find(|p| p.participant_id == participant_id)
    }

    pub(crate) fn player_mut(&mut self, participant_id: ParticipantId) -> Option<&mut PlayerState> {
        self.players.iter_mut().find(|p| p.participant_id == participant_id)
    }

    /// True once every live player has locked or dropped out of the heat.
    pub fn heat_resolved(&self) -> bool {
        !self.players.iter().any(PlayerState::is_pending)
    }

    pub(crate) fn begin_heat(&mut self, heat: HeatNumber, now: DateTime<Utc>) {
        self.current_heat = heat.get();
        self.heat_status = HeatStatus::Countdown;
        self.heat_started_at = Some(now);
        self.heat_ended_at = None;
        for player in &mut self.players {
            player.reset_for_heat();
        }
    }

    /// Store each player's placing for `heat`.
    pub(crate) fn rank_heat(&mut self, heat: HeatNumber) {
        let mut order: Vec<usize> = (0..self.players.len()).collect();
        sort_heat(&mut order, |&i| self.players[i].heat_entry(heat));
        for (i, rank) in order.into_iter().zip(1u32..) {
            self.players[i].heat_ranks[heat.index()] = Some(rank);
        }
    }

    pub(crate) fn rank_final(&mut self) {
        let mut order: Vec<usize> = (0..self.players.len()).collect();
        order.sort_by(|&a, &b| compare_final(&self.players[a].scores, &self.players[b].scores));
        for (i, rank) in order.into_iter().zip(1u32..) {
            self.players[i].final_rank = Some(rank);
        }
    }

    /// Placing `participant_id` would hold among same-heat scores right now.
    ///
    /// Counts every other player whose heat score is at least as high, so a
    /// fresh lock ranks behind earlier equal locks.
    pub fn provisional_heat_rank(&self, participant_id: ParticipantId, heat: HeatNumber) -> Option<u32> {
        let mine = self.player(participant_id)?.scores.heat(heat)?;
        let ahead = self
            .players
            .iter()
            .filter(|p| p.participant_id != participant_id)
            .filter_map(|p| p.scores.heat(heat))
            .filter(|score| *score >= mine)
            .count();
        Some(ahead as u32 + 1)
    }

    // ───────────────────────── Notification views ─────────────────────────

    pub fn participant_views(&self) -> Vec<ParticipantView> {
        self.players
            .iter()
            .map(|p| ParticipantView {
                participant_id: p.participant_id,
                display_name: p.display_name.clone(),
                is_ghost: p.is_ghost,
                total_score: p.total_score(),
            })
            .collect()
    }

    /// Line shown on the track: heat 1's winner in heat 2, the overall
    /// leader in heat 3, nothing in heat 1.
    pub fn target_line(&self, heat: HeatNumber) -> Option<TargetLine> {
        match heat.get() {
            2 => {
                let first = HeatNumber::FIRST;
                let winner = self
                    .players
                    .iter()
                    .find(|p| p.heat_ranks[first.index()] == Some(1))?;
                Some(TargetLine {
                    kind: TargetKind::PreviousHeatWinner,
                    participant_id: winner.participant_id,
                    display_name: winner.display_name.clone(),
                    score: winner.scores.heat(first)?,
                })
            }
            3 => {
                let leader = self.standings().into_iter().next()?;
                Some(TargetLine {
                    kind: TargetKind::OverallLeader,
                    participant_id: leader.participant_id,
                    display_name: leader.display_name,
                    score: leader.total_score,
                })
            }
            _ => None,
        }
    }

    /// Heat results best-first. Call after the heat is ranked.
    pub fn heat_results(&self, heat: HeatNumber) -> Vec<HeatResult> {
        let mut results: Vec<HeatResult> = self
            .players
            .iter()
            .map(|p| HeatResult {
                participant_id: p.participant_id,
                display_name: p.display_name.clone(),
                score: p.scores.heat(heat),
                position: p.heat_ranks[heat.index()].unwrap_or(u32::MAX),
                crashed: !p.alive,
            })
            .collect();
        results.sort_by_key(|r| r.position);
        results
    }

    /// Running standings by total with the final tie-break rules.
    pub fn standings(&self) -> Vec<Standing> {
        let mut order: Vec<&PlayerState> = self.players.iter().collect();
        order.sort_by(|a, b| compare_final(&a.scores, &b.scores));
        order
            .into_iter()
            .zip(1u32..)
            .map(|(p, rank)| Standing {
                participant_id: p.participant_id,
                display_name: p.display_name.clone(),
                total_score: p.total_score(),
                rank,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use proptest::prelude::*;
    use std::str::FromStr;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn state(n: usize) -> MatchState {
        let players = (0..n)
            .map(|i| {
                let entry = RosterEntry::live(UserId::new(), format!("p{}", i), d("50"));
                PlayerState::from_roster(i as u8, &entry)
            })
            .collect();
        MatchState::new(MatchId::new(), League::Street, players, Utc::now())
    }

    fn lock(state: &mut MatchState, idx: usize, heat: HeatNumber, score: &str, at: DateTime<Utc>) {
        let player = &mut state.players[idx];
        player.scores.record(heat, d(score));
        player.locked = true;
        player.locked_at = Some(at);
    }

    #[test]
    fn test_heat_rank_tie_goes_to_earlier_lock() {
        let mut s = state(3);
        let t0 = Utc::now();
        let heat = HeatNumber::FIRST;
        s.begin_heat(heat, t0);
        lock(&mut s, 0, heat, "120", t0 + Duration::seconds(9));
        lock(&mut s, 1, heat, "120", t0 + Duration::seconds(7));
        lock(&mut s, 2, heat, "150", t0 + Duration::seconds(12));
        s.rank_heat(heat);

        assert_eq!(s.players[2].heat_ranks[0], Some(1));
        assert_eq!(s.players[1].heat_ranks[0], Some(2));
        assert_eq!(s.players[0].heat_ranks[0], Some(3));
    }

    #[test]
    fn test_unscored_players_rank_last() {
        let mut s = state(3);
        let heat = HeatNumber::FIRST;
        s.begin_heat(heat, Utc::now());
        lock(&mut s, 2, heat, "10", Utc::now());
        s.players[0].alive = false;
        s.rank_heat(heat);

        assert_eq!(s.players[2].heat_ranks[0], Some(1));
        // unscored keep seat order
        assert_eq!(s.players[0].heat_ranks[0], Some(2));
        assert_eq!(s.players[1].heat_ranks[0], Some(3));

        let results = s.heat_results(heat);
        assert_eq!(results[0].score, Some(d("10")));
        assert!(results[1].crashed);
        assert!(!results[2].crashed);
    }

    #[test]
    fn test_provisional_rank_counts_equal_scores_ahead() {
        let mut s = state(3);
        let heat = HeatNumber::FIRST;
        s.begin_heat(heat, Utc::now());
        lock(&mut s, 0, heat, "100", Utc::now());
        lock(&mut s, 1, heat, "100", Utc::now());
        let id = s.players[1].participant_id;
        assert_eq!(s.provisional_heat_rank(id, heat), Some(2));
        let loner = s.players[2].participant_id;
        assert_eq!(s.provisional_heat_rank(loner, heat), None);
    }

    #[test]
    fn test_target_lines() {
        let mut s = state(2);
        let h1 = HeatNumber::FIRST;
        s.begin_heat(h1, Utc::now());
        lock(&mut s, 0, h1, "80", Utc::now());
        lock(&mut s, 1, h1, "95.5", Utc::now());
        s.rank_heat(h1);

        assert!(s.target_line(h1).is_none());
        let h2 = HeatNumber::new(2).unwrap();
        let line = s.target_line(h2).unwrap();
        assert_eq!(line.kind, TargetKind::PreviousHeatWinner);
        assert_eq!(line.score, d("95.5"));
        assert_eq!(line.participant_id, s.players[1].participant_id);

        s.begin_heat(h2, Utc::now());
        lock(&mut s, 0, h2, "200", Utc::now());
        s.rank_heat(h2);
        let line = s.target_line(HeatNumber::LAST).unwrap();
        assert_eq!(line.kind, TargetKind::OverallLeader);
        assert_eq!(line.score, d("280"));
    }

    #[test]
    fn test_begin_heat_resets_flags() {
        let mut s = state(2);
        let h1 = HeatNumber::FIRST;
        s.begin_heat(h1, Utc::now());
        lock(&mut s, 0, h1, "50", Utc::now());
        s.players[1].alive = false;
        assert!(s.heat_resolved());

        s.begin_heat(HeatNumber::new(2).unwrap(), Utc::now());
        assert!(s.players.iter().all(|p| p.alive && !p.locked && p.locked_at.is_none()));
        assert_eq!(s.players[0].scores.heat(h1), Some(d("50")));
        assert!(!s.heat_resolved());
    }

    #[test]
    fn test_idle_ghosts_do_not_hold_heat_open() {
        let mut s = state(2);
        let ghost = RosterEntry::ghost("ghost-0", "replay-0", d("50"));
        s.players.push(PlayerState::from_roster(2, &ghost));
        let heat = HeatNumber::FIRST;
        s.begin_heat(heat, Utc::now());

        assert!(!s.players[2].is_pending());
        lock(&mut s, 0, heat, "40", Utc::now());
        assert!(!s.heat_resolved());
        s.players[1].alive = false;
        assert!(s.heat_resolved());
    }

    proptest! {
        #[test]
        fn prop_final_ranks_are_a_permutation(scores in proptest::collection::vec((0u32..500, 0u32..500, 0u32..500), 10)) {
            let mut s = state(10);
            let t0 = Utc::now();
            for (i, (a, b, c)) in scores.iter().enumerate() {
                for (heat, v) in [(1u8, a), (2, b), (3, c)] {
                    s.players[i].scores.record(HeatNumber::new(heat).unwrap(), Decimal::from(*v));
                }
            }
            s.begin_heat(HeatNumber::LAST, t0);
            s.rank_final();

            let mut ranks: Vec<u32> = s.players.iter().map(|p| p.final_rank.unwrap()).collect();
            ranks.sort_unstable();
            prop_assert_eq!(ranks, (1..=10).collect::<Vec<u32>>());

            let standings = s.standings();
            for pair in standings.windows(2) {
                prop_assert!(pair[0].total_score >= pair[1].total_score);
            }
        }
    }
}
