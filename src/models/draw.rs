//! Draw session state: board, cursor, pool and settings.

use crate::models::bracket::{BracketError, BracketId};
use crate::models::game::{MatchId, Side};
use crate::models::registration::{RegistrationId, SkillRecord, TournamentId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

/// Unique identifier for a draw session.
pub type SessionId = Uuid;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrawMode {
    Group,
    Knockout,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    #[default]
    Active,
    Committed,
    Canceled,
}

/// State of one board slot.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", content = "id", rename_all = "snake_case")]
pub enum Slot {
    #[default]
    Empty,
    /// Never filled; stands for "no opponent".
    Bye,
    /// Fed by another match or group; not part of the draw.
    Reserved,
    Taken(RegistrationId),
}

impl Slot {
    pub fn entrant(&self) -> Option<RegistrationId> {
        match self {
            Slot::Taken(id) => Some(*id),
            Slot::Empty | Slot::Bye | Slot::Reserved => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Slot::Empty)
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct GroupBoard {
    pub key: String,
    pub slots: Vec<Slot>,
}

impl GroupBoard {
    pub fn members(&self) -> impl Iterator<Item = RegistrationId> + '_ {
        self.slots.iter().filter_map(Slot::entrant)
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct KnockoutPair {
    pub index: usize,
    /// Round-1 match this pair is written to on commit.
    pub match_id: Option<MatchId>,
    pub a: Slot,
    pub b: Slot,
}

impl KnockoutPair {
    pub fn slot(&self, side: Side) -> Slot {
        match side {
            Side::A => self.a,
            Side::B => self.b,
        }
    }
}

/// Slots to fill: group buckets or knockout pairs.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Board {
    Groups { groups: Vec<GroupBoard> },
    Knockout { round: u32, pairs: Vec<KnockoutPair> },
}

/// Position of the next slot to fill.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Cursor {
    Group { group: usize, slot: usize },
    Pair { pair: usize, side: Side },
    Done,
}

impl Board {
    /// First empty slot: row-major over groups, A before B over pairs.
    pub fn first_empty(&self) -> Cursor {
        match self {
            Board::Groups { groups } => {
                for (gi, g) in groups.iter().enumerate() {
                    if let Some(si) = g.slots.iter().position(Slot::is_empty) {
                        return Cursor::Group { group: gi, slot: si };
                    }
                }
                Cursor::Done
            }
            Board::Knockout { pairs, .. } => {
                for (pi, p) in pairs.iter().enumerate() {
                    if p.a.is_empty() {
                        return Cursor::Pair { pair: pi, side: Side::A };
                    }
                    if p.b.is_empty() {
                        return Cursor::Pair { pair: pi, side: Side::B };
                    }
                }
                Cursor::Done
            }
        }
    }

    pub fn slot_at(&self, cursor: Cursor) -> Option<Slot> {
        match (self, cursor) {
            (Board::Groups { groups }, Cursor::Group { group, slot }) => {
                groups.get(group).and_then(|g| g.slots.get(slot)).copied()
            }
            (Board::Knockout { pairs, .. }, Cursor::Pair { pair, side }) => {
                pairs.get(pair).map(|p| p.slot(side))
            }
            _ => None,
        }
    }

    /// Put `id` into the empty slot at `cursor`.
    pub fn place(&mut self, cursor: Cursor, id: RegistrationId) -> Result<(), BracketError> {
        let slot = match (self, cursor) {
            (Board::Groups { groups }, Cursor::Group { group, slot }) => {
                groups.get_mut(group).and_then(|g| g.slots.get_mut(slot))
            }
            (Board::Knockout { pairs, .. }, Cursor::Pair { pair, side }) => {
                pairs.get_mut(pair).map(|p| match side {
                    Side::A => &mut p.a,
                    Side::B => &mut p.b,
                })
            }
            _ => None,
        };
        match slot {
            Some(s) if s.is_empty() => {
                *s = Slot::Taken(id);
                Ok(())
            }
            _ => Err(BracketError::NoOpenSlot),
        }
    }

    pub fn open_slots(&self) -> usize {
        match self {
            Board::Groups { groups } => groups
                .iter()
                .map(|g| g.slots.iter().filter(|s| s.is_empty()).count())
                .sum(),
            Board::Knockout { pairs, .. } => pairs
                .iter()
                .map(|p| usize::from(p.a.is_empty()) + usize::from(p.b.is_empty()))
                .sum(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.open_slots() == 0
    }
}

/// Which metric pots are cut by.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PotBy {
    #[default]
    Skill,
    Rank,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Lookahead {
    pub enabled: bool,
    pub width: usize,
}

impl Default for Lookahead {
    fn default() -> Self {
        Self {
            enabled: true,
            width: 5,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DrawConstraints {
    pub balance_skill_across_groups: bool,
    pub target_group_avg_skill: f64,
    pub use_pots: bool,
    pub pot_by: PotBy,
    pub pot_count: Option<usize>,
    /// Seeds 1..=N are protected; 0 disables seed protection.
    pub protect_top_seeds: u32,
    pub avoid_rematch_within_days: u32,
    pub balance_skill_in_pair: bool,
    pub pair_target_skill_diff: f64,
    /// Protected seeds may not meet before this many rounds have been played.
    pub max_rounds_seed_separation: u32,
}

impl Default for DrawConstraints {
    fn default() -> Self {
        Self {
            balance_skill_across_groups: true,
            target_group_avg_skill: 0.5,
            use_pots: false,
            pot_by: PotBy::Skill,
            pot_count: None,
            protect_top_seeds: 0,
            avoid_rematch_within_days: 90,
            balance_skill_in_pair: true,
            pair_target_skill_diff: 0.12,
            max_rounds_seed_separation: 1,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DrawWeights {
    pub skill_avg_variance: f64,
    pub skill_std: f64,
    pub pot_clash: f64,
    pub seed_clash: f64,
    pub rematch: f64,
    pub ko_skill_diff: f64,
}

impl Default for DrawWeights {
    fn default() -> Self {
        Self {
            skill_avg_variance: 1.0,
            skill_std: 0.6,
            pot_clash: 0.7,
            seed_clash: 1.2,
            rematch: 1.0,
            ko_skill_diff: 0.9,
        }
    }
}

/// Tuning for one draw session.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DrawSettings {
    /// Noise seed; filled from the start time when absent so a session stays reproducible.
    pub seed: Option<u64>,
    /// Amplitude of the tie-breaking noise; 0 disables it.
    pub randomness: f64,
    pub lookahead: Lookahead,
    pub constraints: DrawConstraints,
    pub weights: DrawWeights,
    /// History window (days) for the recent-form part of the skill estimate.
    pub recent_days: u32,
}

impl Default for DrawSettings {
    fn default() -> Self {
        Self {
            seed: None,
            randomness: 0.02,
            lookahead: Lookahead::default(),
            constraints: DrawConstraints::default(),
            weights: DrawWeights::default(),
            recent_days: 120,
        }
    }
}

/// One placement made during the session.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Reveal {
    pub step: u64,
    pub cursor: Cursor,
    pub registration_id: RegistrationId,
}

/// An in-progress assignment of entrants to a bracket's slots.
///
/// Owned by the caller; nothing is written to the repository until commit.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DrawSession {
    pub id: SessionId,
    pub tournament_id: TournamentId,
    pub bracket_id: BracketId,
    pub mode: DrawMode,
    pub board: Board,
    pub cursor: Cursor,
    pub pool: Vec<RegistrationId>,
    pub settings: DrawSettings,
    pub status: SessionStatus,
    /// Incremented by every `advance`; callers echo it back to reject stale calls.
    pub step: u64,
    pub started_at: DateTime<Utc>,
    pub reveals: Vec<Reveal>,
    /// Skill of every entrant of the session, with pot/seed tags.
    #[serde(skip)]
    pub skills: HashMap<RegistrationId, SkillRecord>,
    /// Opponents met inside the rematch window.
    #[serde(skip)]
    pub recent_opponents: HashMap<RegistrationId, HashSet<RegistrationId>>,
}

impl DrawSession {
    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }
}
