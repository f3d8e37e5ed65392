//! Bracket, Group and BracketError.

use crate::models::game::{MatchId, MatchRules, Side};
use crate::models::registration::{RegistrationId, TournamentId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a bracket (one stage container of matches).
pub type BracketId = Uuid;

/// Errors that can occur while building, drawing or propagating brackets.
#[derive(Clone, Debug, PartialEq)]
pub enum BracketError {
    /// Knockout needs at least two entrants.
    InvalidDrawSize(usize),
    /// Requested rounds need more paid entrants than the tournament has.
    TooManyRounds { requested: u32, allowed: u32 },
    /// A seed points at the same or a later stage/round than its match.
    MalformedSeed { round: u32, order: u32, side: Side },
    /// A declared first-round seed names a pair the bracket does not have.
    SeedOutOfRange { pair: usize, pairs: usize },
    /// Group sizing inputs are missing or unusable.
    InvalidGroupPlan,
    BracketNotFound(BracketId),
    MatchNotFound(MatchId),
    SessionNotFound(Uuid),
    RegistrationNotFound(RegistrationId),
    /// Operation does not apply to this kind of bracket.
    WrongBracketType,
    /// Draw session was already committed or canceled.
    SessionNotActive,
    /// `advance` was called with an outdated step counter.
    StaleStep { expected: u64, got: u64 },
    /// The chosen entrant is not in the session pool.
    NotInPool(RegistrationId),
    /// Pool is empty; nothing left to draw.
    EmptyPool,
    /// Every slot is filled but entrants remain in the pool.
    NoOpenSlot,
    /// Draw pool and open slots differ in size, so the board could never be committed.
    PoolMismatch { pool: usize, open_slots: usize },
    /// Commit attempted while slots are still open or entrants undrawn.
    BoardIncomplete { open_slots: usize, remaining: usize },
    /// A draw commit found the side already held by another entrant.
    SlotTaken { match_id: MatchId, side: Side },
    /// Result cannot be recorded (missing side, bad winner).
    InvalidResult(String),
    /// Underlying store failed.
    Storage(String),
}

impl std::fmt::Display for BracketError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BracketError::InvalidDrawSize(n) => {
                write!(f, "Draw size must be at least 2 (got {})", n)
            }
            BracketError::TooManyRounds { requested, allowed } => write!(
                f,
                "Requested {} rounds but paid entrants only allow {}",
                requested, allowed
            ),
            BracketError::MalformedSeed { round, order, side } => write!(
                f,
                "Seed {:?} of match R{}#{} must reference an earlier stage or round",
                side,
                round,
                order + 1
            ),
            BracketError::SeedOutOfRange { pair, pairs } => write!(
                f,
                "Seed for pair {} is outside the first round (1..={})",
                pair, pairs
            ),
            BracketError::InvalidGroupPlan => write!(f, "Cannot plan groups with the provided parameters"),
            BracketError::BracketNotFound(_) => write!(f, "Bracket not found"),
            BracketError::MatchNotFound(_) => write!(f, "Match not found"),
            BracketError::SessionNotFound(_) => write!(f, "Draw session not found"),
            BracketError::RegistrationNotFound(_) => write!(f, "Registration not found"),
            BracketError::WrongBracketType => write!(f, "Operation not supported for this bracket type"),
            BracketError::SessionNotActive => write!(f, "Draw session is not active"),
            BracketError::StaleStep { expected, got } => {
                write!(f, "Stale draw step: expected {}, got {}", expected, got)
            }
            BracketError::NotInPool(_) => write!(f, "Entrant is not in the draw pool"),
            BracketError::EmptyPool => write!(f, "Pool is empty"),
            BracketError::NoOpenSlot => write!(f, "No open slot left on the board"),
            BracketError::PoolMismatch { pool, open_slots } => write!(
                f,
                "Draw pool has {} entrant(s) for {} open slot(s)",
                pool, open_slots
            ),
            BracketError::BoardIncomplete {
                open_slots,
                remaining,
            } => write!(
                f,
                "Cannot commit: {} open slot(s), {} entrant(s) not drawn",
                open_slots, remaining
            ),
            BracketError::SlotTaken { side, .. } => {
                write!(f, "Side {:?} of a drawn match is already taken", side)
            }
            BracketError::InvalidResult(msg) => write!(f, "Invalid result: {}", msg),
            BracketError::Storage(msg) => write!(f, "Storage error: {}", msg),
        }
    }
}

impl std::error::Error for BracketError {}

/// Kind of bracket. Fixed at creation.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BracketType {
    Knockout,
    RoundElim,
    Group,
}

/// When groupRank references into a group may be filled.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupFeed {
    /// As soon as an entrant who has played holds the rank.
    #[default]
    Provisional,
    /// Only once every match of the group is finished.
    WhenComplete,
}

/// Size information recorded at build time.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct BracketMeta {
    pub draw_size: usize,
    pub max_rounds: u32,
    pub expected_first_round_matches: usize,
    /// Bye slots planned for a group draw.
    pub byes: usize,
}

/// One named bucket of a group bracket.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub id: Uuid,
    /// "A", "B", ...
    pub name: String,
    pub expected_size: usize,
    pub registrations: Vec<RegistrationId>,
}

/// A stage container: owns a set of matches of one format.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Bracket {
    pub id: BracketId,
    pub tournament_id: TournamentId,
    pub name: String,
    pub bracket_type: BracketType,
    pub stage: u32,
    pub order: u32,
    pub groups: Vec<Group>,
    pub meta: BracketMeta,
    pub rules: MatchRules,
    pub group_feed: GroupFeed,
    /// Group brackets only: play every pairing twice with sides swapped.
    pub double_round_robin: bool,
}

impl Bracket {
    pub fn new(
        tournament_id: TournamentId,
        name: impl Into<String>,
        bracket_type: BracketType,
        stage: u32,
        order: u32,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            tournament_id,
            name: name.into(),
            bracket_type,
            stage,
            order,
            groups: Vec::new(),
            meta: BracketMeta::default(),
            rules: MatchRules::default(),
            group_feed: GroupFeed::default(),
            double_round_robin: false,
        }
    }

    /// Find a group by code ("A"), 1-based position ("1") or alias ("B1", "G1").
    pub fn find_group(&self, token: &str) -> Option<(usize, &Group)> {
        use crate::models::seed::normalize_group_token;
        let wanted = normalize_group_token(token);
        self.groups.iter().enumerate().find(|(i, g)| {
            normalize_group_token(&g.name) == wanted || (i + 1).to_string() == wanted
        })
    }
}

/// Code of the `index`-th group: A..Z, then AA, AB, ...
pub fn group_code(index: usize) -> String {
    let mut n = index;
    let mut out = Vec::new();
    loop {
        out.push((b'A' + (n % 26) as u8) as char);
        if n < 26 {
            break;
        }
        n = n / 26 - 1;
    }
    out.iter().rev().collect()
}
