//! Match, Side, MatchStatus and scoring rules for bracket matches.

use crate::models::bracket::BracketId;
use crate::models::registration::{RegistrationId, TournamentId};
use crate::models::seed::SeedReference;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a match.
pub type MatchId = Uuid;

/// One side of a match.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub enum Side {
    A,
    B,
}

impl Side {
    pub fn other(self) -> Side {
        match self {
            Side::A => Side::B,
            Side::B => Side::A,
        }
    }

    /// Slot a child match feeds into its parent: even orders go to A, odd to B.
    pub fn for_child_order(order: u32) -> Side {
        if order % 2 == 0 {
            Side::A
        } else {
            Side::B
        }
    }
}

/// Lifecycle of a match.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    #[default]
    Scheduled,
    Live,
    Finished,
}

/// Group tag carried by round-robin matches.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Pool {
    pub id: Uuid,
    pub name: String,
}

/// Points scored by each side in one game (set).
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct GameScore {
    pub a: u32,
    pub b: u32,
}

/// Scoring rules attached to a match.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct MatchRules {
    pub best_of: u8,
    pub points_to_win: u8,
    pub win_by_two: bool,
}

impl Default for MatchRules {
    fn default() -> Self {
        Self {
            best_of: 3,
            points_to_win: 11,
            win_by_two: true,
        }
    }
}

impl MatchRules {
    /// Snap unsupported values back to the defaults (best of 1/3/5, 11/15/21 points).
    pub fn sanitized(self) -> Self {
        let defaults = Self::default();
        Self {
            best_of: if [1, 3, 5].contains(&self.best_of) {
                self.best_of
            } else {
                defaults.best_of
            },
            points_to_win: if [11, 15, 21].contains(&self.points_to_win) {
                self.points_to_win
            } else {
                defaults.points_to_win
            },
            win_by_two: self.win_by_two,
        }
    }
}

/// A node of the bracket graph.
///
/// `pair_*` holds the resolved entrant of a side, `seed_*` the typed reference it is
/// resolved from. A side with neither is an open slot waiting for a draw.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BracketMatch {
    pub id: MatchId,
    pub tournament_id: TournamentId,
    pub bracket_id: BracketId,
    /// Stage of the owning bracket, copied so references can be matched without a lookup.
    pub stage: u32,
    pub round: u32,
    pub order: u32,
    pub round_key: String,
    pub pair_a: Option<RegistrationId>,
    pub pair_b: Option<RegistrationId>,
    pub seed_a: Option<SeedReference>,
    pub seed_b: Option<SeedReference>,
    pub previous_a: Option<MatchId>,
    pub previous_b: Option<MatchId>,
    pub next_match: Option<MatchId>,
    pub next_slot: Option<Side>,
    pub status: MatchStatus,
    pub winner: Option<Side>,
    pub game_scores: Vec<GameScore>,
    pub pool: Option<Pool>,
    /// Round-robin round for group matches.
    pub rr_round: Option<u32>,
    pub rules: MatchRules,
    pub finished_at: Option<DateTime<Utc>>,
}

impl BracketMatch {
    pub fn new(
        tournament_id: TournamentId,
        bracket_id: BracketId,
        stage: u32,
        round: u32,
        order: u32,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            tournament_id,
            bracket_id,
            stage,
            round,
            order,
            round_key: String::new(),
            pair_a: None,
            pair_b: None,
            seed_a: None,
            seed_b: None,
            previous_a: None,
            previous_b: None,
            next_match: None,
            next_slot: None,
            status: MatchStatus::Scheduled,
            winner: None,
            game_scores: Vec::new(),
            pool: None,
            rr_round: None,
            rules: MatchRules::default(),
            finished_at: None,
        }
    }

    pub fn pair(&self, side: Side) -> Option<RegistrationId> {
        match side {
            Side::A => self.pair_a,
            Side::B => self.pair_b,
        }
    }

    pub fn pair_mut(&mut self, side: Side) -> &mut Option<RegistrationId> {
        match side {
            Side::A => &mut self.pair_a,
            Side::B => &mut self.pair_b,
        }
    }

    pub fn seed(&self, side: Side) -> Option<&SeedReference> {
        match side {
            Side::A => self.seed_a.as_ref(),
            Side::B => self.seed_b.as_ref(),
        }
    }

    pub fn previous(&self, side: Side) -> Option<MatchId> {
        match side {
            Side::A => self.previous_a,
            Side::B => self.previous_b,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.status == MatchStatus::Finished
    }

    /// Entrant on the winning side, if the match is finished with a winner.
    pub fn winner_id(&self) -> Option<RegistrationId> {
        if !self.is_finished() {
            return None;
        }
        self.winner.and_then(|w| self.pair(w))
    }

    /// Entrant on the losing side, if the match is finished with a winner.
    pub fn loser_id(&self) -> Option<RegistrationId> {
        if !self.is_finished() {
            return None;
        }
        self.winner.and_then(|w| self.pair(w.other()))
    }

    /// Total points per side over all games.
    pub fn points(&self) -> (u32, u32) {
        self.game_scores
            .iter()
            .fold((0, 0), |(a, b), g| (a + g.a, b + g.b))
    }

    /// Games won per side.
    pub fn sets(&self) -> (u32, u32) {
        self.game_scores.iter().fold((0, 0), |(a, b), g| {
            if g.a > g.b {
                (a + 1, b)
            } else if g.b > g.a {
                (a, b + 1)
            } else {
                (a, b)
            }
        })
    }

    pub fn involves(&self, id: RegistrationId) -> bool {
        self.pair_a == Some(id) || self.pair_b == Some(id)
    }
}
