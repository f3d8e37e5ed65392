//! Shared pieces of the bracket builders: result shape, seed validation, persistence.

use crate::logic::propagation::resolve_bracket;
use crate::models::{Bracket, BracketError, BracketMatch, Side};
use crate::repository::BracketRepository;
use serde::Serialize;
use std::collections::BTreeMap;

/// A freshly built bracket and its matches grouped by round.
#[derive(Clone, Debug, Serialize)]
pub struct BuiltBracket {
    pub bracket: Bracket,
    pub matches_by_round: BTreeMap<u32, Vec<BracketMatch>>,
}

impl BuiltBracket {
    pub fn match_count(&self) -> usize {
        self.matches_by_round.values().map(Vec::len).sum()
    }

    pub fn round(&self, round: u32) -> &[BracketMatch] {
        self.matches_by_round
            .get(&round)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// Round key by number of matches in the round: F, SF, QF, R16, R32, ...
pub fn round_key_by_pairs(pairs: usize) -> String {
    match pairs {
        1 => "F".to_string(),
        2 => "SF".to_string(),
        4 => "QF".to_string(),
        n => format!("R{}", n * 2),
    }
}

/// Reject any seed that is not strictly upstream of the match carrying it.
pub fn validate_seeds(matches: &[BracketMatch]) -> Result<(), BracketError> {
    for m in matches {
        for side in [Side::A, Side::B] {
            if let Some(seed) = m.seed(side) {
                if !seed.is_upstream_of(m.stage, m.round) {
                    return Err(BracketError::MalformedSeed {
                        round: m.round,
                        order: m.order,
                        side,
                    });
                }
            }
        }
    }
    Ok(())
}

/// Store a complete skeleton, resolve what can be resolved, and read it back.
pub(crate) fn persist<R: BracketRepository + ?Sized>(
    repo: &R,
    bracket: Bracket,
    matches: Vec<BracketMatch>,
) -> Result<BuiltBracket, BracketError> {
    validate_seeds(&matches)?;
    let bracket_id = bracket.id;
    repo.create_bracket(bracket)?;
    repo.insert_matches(matches)?;
    resolve_bracket(repo, bracket_id)?;

    let bracket = repo.bracket(bracket_id)?;
    let mut matches_by_round: BTreeMap<u32, Vec<BracketMatch>> = BTreeMap::new();
    for m in repo.matches_for_bracket(bracket_id)? {
        matches_by_round.entry(m.round).or_default().push(m);
    }
    Ok(BuiltBracket {
        bracket,
        matches_by_round,
    })
}
