//! Draw penalties: how badly a candidate fits the slot under the cursor. Lower is better.

use crate::models::{
    Board, Cursor, DrawSettings, PotBy, RegistrationId, Side, SkillRecord, Slot,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::collections::{HashMap, HashSet};

/// Everything scoring reads besides the board.
pub struct ScoringContext<'a> {
    pub skills: &'a HashMap<RegistrationId, SkillRecord>,
    pub recent_opponents: &'a HashMap<RegistrationId, HashSet<RegistrationId>>,
    pub settings: &'a DrawSettings,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct ScoredCandidate {
    pub registration_id: RegistrationId,
    pub score: f64,
}

struct Profile {
    skill: f64,
    pot: Option<usize>,
    seed: Option<u32>,
}

impl ScoringContext<'_> {
    fn profile(&self, id: RegistrationId) -> Profile {
        match self.skills.get(&id) {
            Some(rec) => Profile {
                skill: rec.skill,
                pot: rec.meta.pot,
                seed: rec.meta.seed,
            },
            None => Profile {
                skill: 0.5,
                pot: None,
                seed: None,
            },
        }
    }

    fn is_protected(&self, seed: Option<u32>) -> bool {
        let top = self.settings.constraints.protect_top_seeds;
        top > 0 && seed.map_or(false, |s| s > 0 && s <= top)
    }

    fn met_recently(&self, a: RegistrationId, b: RegistrationId) -> bool {
        self.settings.constraints.avoid_rematch_within_days > 0
            && self
                .recent_opponents
                .get(&a)
                .map_or(false, |set| set.contains(&b))
    }
}

/// Tag every record with a pot (0 = strongest) cut from a descending order.
pub fn assign_pots(skills: &mut HashMap<RegistrationId, SkillRecord>, pot_count: usize, pot_by: PotBy) {
    let pot_count = pot_count.max(1);
    let mut order: Vec<(RegistrationId, f64, u32)> = skills
        .values()
        .map(|r| (r.id, r.skill, r.meta.rank.unwrap_or(u32::MAX)))
        .collect();
    match pot_by {
        PotBy::Skill => order.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0))),
        PotBy::Rank => order.sort_by(|a, b| a.2.cmp(&b.2).then(a.0.cmp(&b.0))),
    }
    let chunk = order.len().div_ceil(pot_count).max(1);
    for (idx, (id, _, _)) in order.into_iter().enumerate() {
        if let Some(rec) = skills.get_mut(&id) {
            rec.meta.pot = Some((idx / chunk).min(pot_count - 1));
        }
    }
}

/// Number entrants by descending skill when seed protection is on and at least 60% of
/// them carry no explicit seed.
pub fn ensure_seeds(skills: &mut HashMap<RegistrationId, SkillRecord>, protect_top_seeds: u32) {
    if protect_top_seeds == 0 || skills.is_empty() {
        return;
    }
    let unseeded = skills.values().filter(|r| r.meta.seed.is_none()).count();
    if (unseeded as f64) / (skills.len() as f64) < 0.6 {
        return;
    }
    let mut order: Vec<(RegistrationId, f64)> = skills.values().map(|r| (r.id, r.skill)).collect();
    order.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
    for (i, (id, _)) in order.into_iter().enumerate() {
        if let Some(rec) = skills.get_mut(&id) {
            rec.meta.seed = Some(i as u32 + 1);
        }
    }
}

fn group_penalty(ctx: &ScoringContext<'_>, board: &Board, group: usize, candidate: RegistrationId) -> f64 {
    let Board::Groups { groups } = board else {
        return 0.0;
    };
    let Some(g) = groups.get(group) else {
        return 0.0;
    };
    let members: Vec<RegistrationId> = g.members().collect();
    let c = &ctx.settings.constraints;
    let w = &ctx.settings.weights;
    let me = ctx.profile(candidate);
    let mut penalty = 0.0;

    if c.balance_skill_across_groups {
        let size = members.len() as f64;
        let sum: f64 = members.iter().map(|&m| ctx.profile(m).skill).sum();
        let new_avg = (sum + me.skill) / (size + 1.0);
        penalty += w.skill_avg_variance * (new_avg - c.target_group_avg_skill).abs();
        penalty += w.skill_std * (me.skill - new_avg).abs();
    }

    if c.use_pots {
        if let Some(pot) = me.pot {
            let pot_count = c.pot_count.filter(|&p| p > 0).unwrap_or(groups.len().max(1));
            let same_pot = members.iter().filter(|&&m| ctx.profile(m).pot == Some(pot)).count();
            let ideal = (members.len() + 1).div_ceil(pot_count);
            if same_pot + 1 > ideal {
                penalty += w.pot_clash * (same_pot + 1 - ideal) as f64;
            }
        }
    }

    if ctx.is_protected(me.seed) && members.iter().any(|&m| ctx.is_protected(ctx.profile(m).seed)) {
        penalty += w.seed_clash;
    }

    let rematches = members.iter().filter(|&&m| ctx.met_recently(candidate, m)).count();
    penalty += w.rematch * rematches as f64;
    penalty
}

fn knockout_penalty(ctx: &ScoringContext<'_>, board: &Board, pair: usize, side: Side, candidate: RegistrationId) -> f64 {
    let Board::Knockout { round, pairs } = board else {
        return 0.0;
    };
    let me = ctx.profile(candidate);
    let rival = pairs.get(pair).and_then(|p| p.slot(side.other()).entrant());
    let Some(rival) = rival else {
        // First side of a pair: mild pull toward the middle.
        return (me.skill - 0.5).abs() * 0.1;
    };

    let c = &ctx.settings.constraints;
    let w = &ctx.settings.weights;
    let them = ctx.profile(rival);
    if *round <= c.max_rounds_seed_separation && ctx.is_protected(me.seed) && ctx.is_protected(them.seed) {
        return f64::INFINITY;
    }

    let mut penalty = 0.0;
    if c.balance_skill_in_pair {
        let diff = (me.skill - them.skill).abs();
        penalty += w.ko_skill_diff * (diff - c.pair_target_skill_diff).max(0.0);
    }
    if ctx.met_recently(candidate, rival) {
        penalty += w.rematch;
    }
    penalty
}

/// Penalty of putting `candidate` at `cursor`. Infinite means forbidden.
pub fn score_candidate(ctx: &ScoringContext<'_>, board: &Board, cursor: Cursor, candidate: RegistrationId) -> f64 {
    match cursor {
        Cursor::Group { group, .. } => group_penalty(ctx, board, group, candidate),
        Cursor::Pair { pair, side } => knockout_penalty(ctx, board, pair, side, candidate),
        Cursor::Done => 0.0,
    }
}

/// Lookahead cost of a choice that leaves no allowed candidate for the following slot.
const DEAD_END_PENALTY: f64 = 1_000.0;

/// Best penalty reachable at the following slot after placing `chosen` on a copy of the board.
/// When every follower is forbidden there, the choice costs [`DEAD_END_PENALTY`].
fn best_next_score(
    ctx: &ScoringContext<'_>,
    board: &Board,
    cursor: Cursor,
    chosen: RegistrationId,
    followers: &[RegistrationId],
) -> f64 {
    let mut sim = board.clone();
    if sim.place(cursor, chosen).is_err() {
        return 0.0;
    }
    let next = sim.first_empty();
    if next == Cursor::Done || followers.is_empty() {
        return 0.0;
    }
    let best = followers
        .iter()
        .map(|&id| score_candidate(ctx, &sim, next, id))
        .fold(f64::INFINITY, f64::min);
    if best.is_finite() {
        best
    } else {
        DEAD_END_PENALTY
    }
}

/// Rank `pool` for the slot at `cursor`: penalty plus seeded noise, stable-sorted,
/// then the top `lookahead.width` re-scored one step ahead.
pub fn rank_candidates(
    ctx: &ScoringContext<'_>,
    board: &Board,
    cursor: Cursor,
    pool: &[RegistrationId],
    noise_seed: u64,
) -> Vec<ScoredCandidate> {
    let amplitude = ctx.settings.randomness.max(0.0);
    let mut rng = StdRng::seed_from_u64(noise_seed);
    let mut scored: Vec<ScoredCandidate> = pool
        .iter()
        .map(|&id| {
            let noise = if amplitude > 0.0 {
                (rng.gen::<f64>() - 0.5) * amplitude
            } else {
                0.0
            };
            ScoredCandidate {
                registration_id: id,
                score: score_candidate(ctx, board, cursor, id) + noise,
            }
        })
        .collect();
    scored.sort_by(|a, b| a.score.total_cmp(&b.score));

    let lookahead = ctx.settings.lookahead;
    if !lookahead.enabled || scored.len() < 2 || lookahead.width == 0 {
        return scored;
    }
    let width = lookahead.width.min(scored.len());
    let order: Vec<RegistrationId> = scored.iter().map(|c| c.registration_id).collect();
    let mut refined: Vec<ScoredCandidate> = scored[..width]
        .iter()
        .map(|c| {
            let followers: Vec<RegistrationId> = order
                .iter()
                .copied()
                .filter(|&id| id != c.registration_id)
                .take(lookahead.width)
                .collect();
            let next = best_next_score(ctx, board, cursor, c.registration_id, &followers);
            ScoredCandidate {
                registration_id: c.registration_id,
                score: c.score + 0.5 * next,
            }
        })
        .collect();
    refined.sort_by(|a, b| a.score.total_cmp(&b.score));
    refined.extend_from_slice(&scored[width..]);
    refined
}

/// Mixes the session seed with the step so each pick draws fresh but reproducible noise.
pub fn step_seed(seed: u64, step: u64) -> u64 {
    seed ^ step.wrapping_add(1).wrapping_mul(0x9E37_79B9_7F4A_7C15)
}

/// Board slots filled with `Taken` entrants, for skill lookups.
pub fn placed_entrants(board: &Board) -> Vec<RegistrationId> {
    match board {
        Board::Groups { groups } => groups.iter().flat_map(|g| g.members()).collect(),
        Board::Knockout { pairs, .. } => pairs
            .iter()
            .flat_map(|p| [p.a, p.b])
            .filter_map(|s: Slot| s.entrant())
            .collect(),
    }
}
