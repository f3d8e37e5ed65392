//! Registration (entrant) and derived SkillRecord data structures.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a registration (one entrant: a player or a team).
pub type RegistrationId = Uuid;

/// Unique identifier for a tournament.
pub type TournamentId = Uuid;

/// An entrant registered for a tournament.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Registration {
    pub id: RegistrationId,
    pub tournament_id: TournamentId,
    pub name: String,
    /// Rating snapshot taken at registration time (0..10 scale).
    pub rating: Option<f64>,
    /// Explicit seed number set by the organiser (1 = top seed).
    pub seed: Option<u32>,
    /// External ranking position (1 = best).
    pub rank: Option<u32>,
    pub paid: bool,
}

impl Registration {
    /// Create a paid registration with no rating or seed.
    pub fn new(tournament_id: TournamentId, name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            tournament_id,
            name: name.into(),
            rating: None,
            seed: None,
            rank: None,
            paid: true,
        }
    }

    pub fn with_rating(mut self, rating: f64) -> Self {
        self.rating = Some(rating);
        self
    }

    pub fn with_seed(mut self, seed: u32) -> Self {
        self.seed = Some(seed);
        self
    }
}

/// Draw-time tags attached to a skill record.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SkillMeta {
    pub pot: Option<usize>,
    pub seed: Option<u32>,
    pub rank: Option<u32>,
}

/// Normalised strength of an entrant, derived from rating and match history.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SkillRecord {
    pub id: RegistrationId,
    /// Blended strength in [0, 1].
    pub skill: f64,
    pub matches: u32,
    pub set_win_pct: f64,
    pub point_margin: f64,
    pub recent_form: f64,
    pub meta: SkillMeta,
}

impl SkillRecord {
    /// Record for an entrant nothing is known about.
    pub fn neutral(id: RegistrationId) -> Self {
        Self {
            id,
            skill: 0.5,
            matches: 0,
            set_win_pct: 0.5,
            point_margin: 0.0,
            recent_form: 0.5,
            meta: SkillMeta::default(),
        }
    }
}
