//! Knockout (single-elimination) bracket: a balanced binary tree over 2^k first-round slots.

use crate::logic::topology::{persist, round_key_by_pairs, BuiltBracket};
use crate::models::{
    Bracket, BracketError, BracketMatch, BracketType, MatchRules, RegistrationId, SeedReference,
    Side, TournamentId,
};
use crate::repository::BracketRepository;
use serde::{Deserialize, Serialize};

/// Explicit seeds for one first-round pair (1-based `pair`).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FirstRoundSeed {
    pub pair: usize,
    pub a: Option<SeedReference>,
    pub b: Option<SeedReference>,
}

/// What an undeclared first-round side becomes.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnfilledSlots {
    /// Every undeclared side is a bye.
    #[default]
    Bye,
    /// The `draw_size` spread positions stay open for a draw; only padding is a bye.
    Open,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KnockoutOptions {
    pub name: String,
    pub stage: u32,
    pub order: u32,
    pub draw_size: usize,
    pub seeds: Vec<FirstRoundSeed>,
    pub unfilled: UnfilledSlots,
    pub rules: MatchRules,
    pub semi_rules: Option<MatchRules>,
    pub final_rules: Option<MatchRules>,
    pub third_place: bool,
    pub third_place_rules: Option<MatchRules>,
}

impl Default for KnockoutOptions {
    fn default() -> Self {
        Self {
            name: "Knockout".to_string(),
            stage: 1,
            order: 1,
            draw_size: 2,
            seeds: Vec::new(),
            unfilled: UnfilledSlots::Bye,
            rules: MatchRules::default(),
            semi_rules: None,
            final_rules: None,
            third_place: false,
            third_place_rules: None,
        }
    }
}

impl KnockoutOptions {
    pub fn new(draw_size: usize) -> Self {
        Self {
            draw_size,
            ..Self::default()
        }
    }

    /// Seed `entrants` (strongest first) with [`spread_seeds`]. Grows `draw_size` to fit them.
    pub fn with_entrants(mut self, entrants: &[RegistrationId]) -> Self {
        self.draw_size = self.draw_size.max(entrants.len());
        self.seeds = spread_seeds(entrants, bracket_size(self.draw_size));
        self
    }
}

/// First-round slot count for a draw: next power of two, at least 2.
pub fn bracket_size(draw_size: usize) -> usize {
    draw_size.max(2).next_power_of_two()
}

/// Side positions, in fill order, that `count` entrants occupy in a bracket of `size`.
///
/// A sides of every pair first, then B sides from the last pair backward, so byes fall
/// against the entrants placed first and no pair gets two byes while `count > size / 2`.
pub fn spread_positions(count: usize, size: usize) -> Vec<(usize, Side)> {
    let half = size / 2;
    (0..half)
        .map(|i| (i, Side::A))
        .chain((0..half).rev().map(|i| (i, Side::B)))
        .take(count)
        .collect()
}

/// First-round seeds placing `entrants` at [`spread_positions`].
pub fn spread_seeds(entrants: &[RegistrationId], size: usize) -> Vec<FirstRoundSeed> {
    let half = size / 2;
    let mut seeds: Vec<FirstRoundSeed> = (0..half)
        .map(|i| FirstRoundSeed {
            pair: i + 1,
            a: None,
            b: None,
        })
        .collect();
    for (n, (pair, side)) in spread_positions(entrants.len(), size).into_iter().enumerate() {
        let seed = SeedReference::registration(entrants[n], format!("Seed {}", n + 1));
        match side {
            Side::A => seeds[pair].a = Some(seed),
            Side::B => seeds[pair].b = Some(seed),
        }
    }
    seeds
}

/// Build a knockout bracket and resolve its first-round entrants.
///
/// Round 1 has `size / 2` matches; each later round pairs consecutive matches of the
/// previous one, linking `previous_*` downward and `next_match`/`next_slot` upward.
pub fn build_knockout<R: BracketRepository + ?Sized>(
    repo: &R,
    tournament_id: TournamentId,
    options: KnockoutOptions,
) -> Result<BuiltBracket, BracketError> {
    if options.draw_size < 2 {
        return Err(BracketError::InvalidDrawSize(options.draw_size));
    }
    let size = bracket_size(options.draw_size);
    let rounds = size.trailing_zeros();
    let first_pairs = size / 2;
    if let Some(bad) = options
        .seeds
        .iter()
        .find(|s| s.pair == 0 || s.pair > first_pairs)
    {
        return Err(BracketError::SeedOutOfRange {
            pair: bad.pair,
            pairs: first_pairs,
        });
    }

    let base_rules = options.rules.sanitized();
    let semi_rules = options.semi_rules.map(MatchRules::sanitized);
    let final_rules = options.final_rules.map(MatchRules::sanitized);
    let rules_for = |round: u32, order: u32| -> MatchRules {
        if round == rounds && order == 0 {
            if let Some(r) = final_rules {
                return r;
            }
        }
        if rounds >= 2 && round == rounds - 1 {
            if let Some(r) = semi_rules {
                return r;
            }
        }
        base_rules
    };

    let open: Vec<(usize, Side)> = match options.unfilled {
        UnfilledSlots::Bye => Vec::new(),
        UnfilledSlots::Open => spread_positions(options.draw_size, size),
    };
    let default_seed = |pair: usize, side: Side| -> Option<SeedReference> {
        if open.contains(&(pair, side)) {
            None
        } else {
            Some(SeedReference::bye())
        }
    };

    let mut bracket = Bracket::new(
        tournament_id,
        options.name.clone(),
        BracketType::Knockout,
        options.stage,
        options.order,
    );
    bracket.rules = base_rules;
    bracket.meta.draw_size = size;
    bracket.meta.max_rounds = rounds;
    bracket.meta.expected_first_round_matches = first_pairs;

    // Arena: rounds[r - 1][order].
    let mut arena: Vec<Vec<BracketMatch>> = Vec::with_capacity(rounds as usize);
    let first: Vec<BracketMatch> = (0..first_pairs)
        .map(|i| {
            let declared = options.seeds.iter().find(|s| s.pair == i + 1);
            let mut m = BracketMatch::new(tournament_id, bracket.id, options.stage, 1, i as u32);
            m.round_key = round_key_by_pairs(first_pairs);
            m.seed_a = declared
                .and_then(|s| s.a.clone())
                .or_else(|| default_seed(i, Side::A));
            m.seed_b = declared
                .and_then(|s| s.b.clone())
                .or_else(|| default_seed(i, Side::B));
            m.rules = rules_for(1, i as u32);
            m
        })
        .collect();
    arena.push(first);

    for round in 2..=rounds {
        let prev = &mut arena[(round - 2) as usize];
        let pairs = prev.len() / 2;
        let mut current = Vec::with_capacity(pairs);
        for i in 0..pairs {
            let mut m = BracketMatch::new(tournament_id, bracket.id, options.stage, round, i as u32);
            m.round_key = round_key_by_pairs(pairs);
            m.rules = rules_for(round, i as u32);
            m.previous_a = Some(prev[2 * i].id);
            m.previous_b = Some(prev[2 * i + 1].id);
            prev[2 * i].next_match = Some(m.id);
            prev[2 * i].next_slot = Some(Side::A);
            prev[2 * i + 1].next_match = Some(m.id);
            prev[2 * i + 1].next_slot = Some(Side::B);
            current.push(m);
        }
        arena.push(current);
    }

    if options.third_place && rounds >= 2 {
        let semi_round = rounds - 1;
        let mut m = BracketMatch::new(tournament_id, bracket.id, options.stage, rounds, 1);
        m.round_key = "3RD".to_string();
        m.seed_a = Some(SeedReference::loser_of(options.stage, semi_round, 0));
        m.seed_b = Some(SeedReference::loser_of(options.stage, semi_round, 1));
        m.rules = options
            .third_place_rules
            .map(MatchRules::sanitized)
            .or(final_rules)
            .or(semi_rules)
            .unwrap_or(base_rules);
        arena[(rounds - 1) as usize].push(m);
    }

    let matches: Vec<BracketMatch> = arena.into_iter().flatten().collect();
    log::info!(
        "Building knockout bracket '{}': size {}, {} rounds, {} matches",
        bracket.name,
        size,
        rounds,
        matches.len()
    );
    persist(repo, bracket, matches)
}
