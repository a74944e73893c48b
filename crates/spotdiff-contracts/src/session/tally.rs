use serde::{Deserialize, Serialize};

const POINTS_PER_SUCCESS: u64 = 10;
const STREAK_MILESTONE: u64 = 5;
const ROUNDS_PER_REST: u64 = 10;

/// Wrong taps allowed in a single-mode round before the answer is revealed.
pub const MISSES_BEFORE_REVEAL: u32 = 3;

/// Score bookkeeping for one game, reset on return to menu.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundTally {
    pub rounds_played: u64,
    pub score: u64,
    pub streak: u64,
    pub best_streak: u64,
}

impl RoundTally {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, success: bool) {
        self.rounds_played += 1;
        if success {
            self.score += POINTS_PER_SUCCESS;
            self.streak += 1;
            self.best_streak = self.best_streak.max(self.streak);
        } else {
            self.streak = 0;
        }
    }

    /// True right after a round that completed a multiple-of-five streak.
    pub fn at_streak_milestone(&self) -> bool {
        self.streak > 0 && self.streak % STREAK_MILESTONE == 0
    }

    pub fn should_rest(&self) -> bool {
        self.rounds_played > 0 && self.rounds_played % ROUNDS_PER_REST == 0
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
