//! Progressive round-elimination ladder: losers of each round play on, winners leave.

use crate::logic::topology::{persist, BuiltBracket};
use crate::models::{
    Bracket, BracketError, BracketMatch, BracketType, MatchRules, SeedReference, TournamentId,
};
use crate::repository::BracketRepository;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoundElimOptions {
    pub name: String,
    pub stage: u32,
    pub order: u32,
    /// Entrants in round 1.
    pub draw_size: usize,
    pub max_rounds: u32,
    /// Round-1 seeds by position: pair `i` takes positions `2i` and `2i + 1`.
    /// Missing positions inside `draw_size` stay open for a draw.
    pub seeds: Vec<SeedReference>,
    pub rules: MatchRules,
    /// Overrides by round (index 0 is round 1).
    pub round_rules: Vec<Option<MatchRules>>,
}

impl Default for RoundElimOptions {
    fn default() -> Self {
        Self {
            name: "Play-off".to_string(),
            stage: 1,
            order: 1,
            draw_size: 2,
            max_rounds: 1,
            seeds: Vec::new(),
            rules: MatchRules::default(),
            round_rules: Vec::new(),
        }
    }
}

impl RoundElimOptions {
    pub fn new(draw_size: usize, max_rounds: u32) -> Self {
        Self {
            draw_size,
            max_rounds,
            ..Self::default()
        }
    }
}

/// Most ladder rounds `paid` entrants can fill: `floor(log2(paid))`.
pub fn allowed_rounds(paid: usize) -> u32 {
    if paid < 2 {
        0
    } else {
        paid.ilog2()
    }
}

/// Build a round-elimination ladder.
///
/// Round 1 has `ceil(N / 2)` matches; an odd last entrant faces a bye. Round `r > 1`
/// has `floor(pairs(r - 1) / 2)` matches, both sides seeded with losers of round
/// `r - 1`; a source index past the end of that round is a bye.
pub fn build_round_elim<R: BracketRepository + ?Sized>(
    repo: &R,
    tournament_id: TournamentId,
    options: RoundElimOptions,
) -> Result<BuiltBracket, BracketError> {
    let n = options.draw_size;
    if n < 2 {
        return Err(BracketError::InvalidDrawSize(n));
    }
    let requested = options.max_rounds.max(1);
    let allowed = allowed_rounds(repo.paid_entrant_count(tournament_id)?);
    if requested > allowed {
        return Err(BracketError::TooManyRounds { requested, allowed });
    }

    let base_rules = options.rules.sanitized();
    let rules_for = |round: u32| -> MatchRules {
        options
            .round_rules
            .get((round - 1) as usize)
            .copied()
            .flatten()
            .map(MatchRules::sanitized)
            .unwrap_or(base_rules)
    };

    let mut bracket = Bracket::new(
        tournament_id,
        options.name.clone(),
        BracketType::RoundElim,
        options.stage,
        options.order,
    );
    bracket.rules = base_rules;
    bracket.meta.draw_size = n;
    bracket.meta.expected_first_round_matches = n.div_ceil(2);

    let stage = options.stage;
    let mut matches = Vec::new();
    let mut pairs = n.div_ceil(2);
    for i in 0..pairs {
        let mut m = BracketMatch::new(tournament_id, bracket.id, stage, 1, i as u32);
        m.round_key = "V1".to_string();
        m.rules = rules_for(1);
        m.seed_a = options.seeds.get(2 * i).cloned();
        m.seed_b = if 2 * i + 1 < n {
            options.seeds.get(2 * i + 1).cloned()
        } else {
            Some(SeedReference::bye())
        };
        matches.push(m);
    }

    let mut round = 1;
    while round < requested {
        let prev_pairs = pairs;
        pairs = prev_pairs / 2;
        if pairs == 0 {
            break;
        }
        round += 1;
        for i in 0..pairs {
            let left = 2 * i;
            let right = 2 * i + 1;
            let mut m = BracketMatch::new(tournament_id, bracket.id, stage, round, i as u32);
            m.round_key = format!("V{}", round);
            m.rules = rules_for(round);
            m.seed_a = Some(SeedReference::loser_of(stage, round - 1, left as u32));
            m.seed_b = Some(if right < prev_pairs {
                SeedReference::loser_of(stage, round - 1, right as u32)
            } else {
                SeedReference::bye()
            });
            matches.push(m);
        }
    }
    bracket.meta.max_rounds = round;

    log::info!(
        "Building round-elimination bracket '{}': {} entrants, {} round(s), {} matches",
        bracket.name,
        n,
        round,
        matches.len()
    );
    persist(repo, bracket, matches)
}
