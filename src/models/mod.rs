//! Data structures for brackets: matches, seed references, registrations, draw sessions.

mod bracket;
mod draw;
mod game;
mod registration;
mod seed;

pub use bracket::{
    group_code, Bracket, BracketError, BracketId, BracketMeta, BracketType, Group, GroupFeed,
};
pub use draw::{
    Board, Cursor, DrawConstraints, DrawMode, DrawSession, DrawSettings, DrawWeights, GroupBoard,
    KnockoutPair, Lookahead, PotBy, Reveal, SessionId, SessionStatus, Slot,
};
pub use game::{BracketMatch, GameScore, MatchId, MatchRules, MatchStatus, Pool, Side};
pub use registration::{Registration, RegistrationId, SkillMeta, SkillRecord, TournamentId};
pub use seed::{
    normalize_group_token, GroupRankRef, SeedKey, SeedReference, SeedSource, StageMatchRef,
};
