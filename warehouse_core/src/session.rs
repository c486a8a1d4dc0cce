//! Score, reputation and the persistent leaderboard.

use serde::{Deserialize, Serialize};

use crate::{
    config::{CustomerConfig, ScoringConfig},
    environment::Outcome,
};

/// Upper bound for reputation.
pub const MAX_REPUTATION: i32 = 100;

/// Per-run bookkeeping. Only terminal detection writes to it; everyone else
/// reads through the accessors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    player: String,
    score: u64,
    reputation: i32,
    deliveries: u32,
    deliveries_per_level: u32,
    reputation_penalty: i32,
    reputation_bonus: i32,
    delivery_points: u64,
    level_bonus: u64,
    outcome: Option<Outcome>,
}

impl Session {
    pub fn new(
        player: impl Into<String>,
        scoring: &ScoringConfig,
        customers: Option<&CustomerConfig>,
    ) -> Self {
        let rules = customers.cloned().unwrap_or_default();
        Session {
            player: player.into(),
            score: 0,
            reputation: scoring.starting_reputation.min(MAX_REPUTATION),
            deliveries: 0,
            deliveries_per_level: rules.deliveries_per_level.max(1),
            reputation_penalty: rules.reputation_penalty,
            reputation_bonus: rules.reputation_bonus,
            delivery_points: scoring.delivery_points,
            level_bonus: scoring.level_bonus,
            outcome: None,
        }
    }

    pub fn player(&self) -> &str {
        &self.player
    }

    pub fn score(&self) -> u64 {
        self.score
    }

    pub fn reputation(&self) -> i32 {
        self.reputation
    }

    pub fn deliveries(&self) -> u32 {
        self.deliveries
    }

    /// Derived from completed deliveries; drives spawn rate, patience and
    /// intruder speed.
    pub fn difficulty(&self) -> u32 {
        self.deliveries / self.deliveries_per_level
    }

    pub fn outcome(&self) -> Option<Outcome> {
        self.outcome
    }

    /// Scores at the difficulty in force when the item was handed over.
    pub(crate) fn record_delivery(&mut self) {
        let level = u64::from(self.difficulty());
        let points = self.delivery_points.saturating_add(self.level_bonus.saturating_mul(level));
        self.score = self.score.saturating_add(points);
        self.deliveries = self.deliveries.saturating_add(1);
        self.reputation = self
            .reputation
            .saturating_add(self.reputation_bonus)
            .min(MAX_REPUTATION);
    }

    pub(crate) fn record_expiry(&mut self) {
        self.reputation = self.reputation.saturating_sub(self.reputation_penalty);
    }

    pub(crate) fn finish(&mut self, outcome: Outcome) {
        self.outcome.get_or_insert(outcome);
    }

    pub fn final_record(&self) -> ScoreRecord {
        ScoreRecord {
            name: self.player.clone(),
            score: self.score,
            deliveries: self.deliveries,
        }
    }
}

/// One leaderboard line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreRecord {
    pub name: String,
    pub score: u64,
    pub deliveries: u32,
}

/// Best runs, highest score first, capped at a fixed number of entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Leaderboard {
    entries: Vec<ScoreRecord>,
    capacity: usize,
}

impl Leaderboard {
    pub fn new(capacity: usize) -> Self {
        Leaderboard {
            entries: Vec::new(),
            capacity,
        }
    }

    /// Rebuilds a leaderboard from persisted records, re-sorting and truncating.
    pub fn from_records(records: Vec<ScoreRecord>, capacity: usize) -> Self {
        let mut board = Leaderboard {
            entries: records,
            capacity,
        };
        board.normalize();
        board
    }

    /// Inserts a finished run. Returns its rank (0-based) if it made the cut.
    pub fn record(&mut self, record: ScoreRecord) -> Option<usize> {
        // Ties keep earlier entries ahead.
        let rank = self.entries.partition_point(|e| e.score >= record.score);
        self.entries.insert(rank, record);
        self.entries.truncate(self.capacity);
        (rank < self.entries.len()).then_some(rank)
    }

    pub fn entries(&self) -> &[ScoreRecord] {
        &self.entries
    }

    /// Entries of page `page` when showing `per_page` at a time.
    pub fn page(&self, page: usize, per_page: usize) -> &[ScoreRecord] {
        let start = page.saturating_mul(per_page).min(self.entries.len());
        let end = start.saturating_add(per_page).min(self.entries.len());
        &self.entries[start..end]
    }

    pub fn page_count(&self, per_page: usize) -> usize {
        self.entries.len().div_ceil(per_page.max(1)).max(1)
    }

    fn normalize(&mut self) {
        self.entries.sort_by(|a, b| b.score.cmp(&a.score));
        self.entries.truncate(self.capacity);
    }
}
