//! Group brackets: bucket sizing and round-robin match generation.

use crate::logic::planner::{plan_groups, PlannerPolicy};
use crate::logic::topology::{persist, BuiltBracket};
use crate::models::{
    group_code, Bracket, BracketError, BracketId, BracketMatch, BracketType, Group, GroupFeed,
    MatchRules, Pool, RegistrationId, TournamentId,
};
use crate::repository::{BracketRepository, WriteBatch};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Inputs for [`build_group`]. Sizing is taken from the first usable source:
/// `group_sizes`, then `total_teams` (or the number of `registrations`) through the
/// planner, then a uniform `group_count` x `group_size`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupOptions {
    pub name: String,
    pub stage: u32,
    pub order: u32,
    pub group_count: Option<usize>,
    pub group_size: Option<usize>,
    pub total_teams: Option<usize>,
    pub group_sizes: Vec<usize>,
    pub policy: PlannerPolicy,
    /// Entrants to place straight away, in order; leave empty to draw later.
    pub registrations: Vec<RegistrationId>,
    pub double_round_robin: bool,
    pub rules: MatchRules,
    pub feed: GroupFeed,
}

impl Default for GroupOptions {
    fn default() -> Self {
        Self {
            name: "Groups".to_string(),
            stage: 1,
            order: 1,
            group_count: None,
            group_size: None,
            total_teams: None,
            group_sizes: Vec::new(),
            policy: PlannerPolicy::default(),
            registrations: Vec::new(),
            double_round_robin: false,
            rules: MatchRules::default(),
            feed: GroupFeed::Provisional,
        }
    }
}

impl GroupOptions {
    pub fn uniform(group_count: usize, group_size: usize) -> Self {
        Self {
            group_count: Some(group_count),
            group_size: Some(group_size),
            ..Self::default()
        }
    }
}

fn resolve_sizes(options: &GroupOptions) -> Result<(Vec<usize>, usize), BracketError> {
    let explicit: Vec<usize> = options.group_sizes.iter().copied().filter(|&s| s > 0).collect();
    if !explicit.is_empty() {
        return Ok((explicit, 0));
    }

    let teams = options
        .total_teams
        .filter(|&n| n > 0)
        .or_else(|| Some(options.registrations.len()).filter(|&n| n > 0));
    if let Some(n) = teams {
        let mut policy = options.policy;
        policy.group_size = options.group_size.or(policy.group_size);
        policy.group_count = options.group_count.or(policy.group_count);
        let plan = plan_groups(n, &policy);
        if plan.group_sizes.is_empty() {
            return Err(BracketError::InvalidGroupPlan);
        }
        return Ok((plan.group_sizes, plan.byes));
    }

    match (options.group_count, options.group_size) {
        (Some(count), Some(size)) if count > 0 && size > 0 => Ok((vec![size; count], 0)),
        _ => Err(BracketError::InvalidGroupPlan),
    }
}

/// Bye slots per group: one at a time, starting from the last group.
pub fn bye_counts(sizes: &[usize], byes: usize) -> Vec<usize> {
    let mut out = vec![0; sizes.len()];
    let mut left = byes;
    while left > 0 {
        let before = left;
        for (i, size) in sizes.iter().enumerate().rev() {
            if left == 0 {
                break;
            }
            if out[i] < *size {
                out[i] += 1;
                left -= 1;
            }
        }
        if left == before {
            break;
        }
    }
    out
}

/// Circle-method round-robin schedule. Each inner vector is one round.
///
/// With an odd count a phantom entrant is added; whoever meets it sits the round out.
pub fn round_robin_rounds(ids: &[RegistrationId]) -> Vec<Vec<(RegistrationId, RegistrationId)>> {
    if ids.len() < 2 {
        return Vec::new();
    }
    let mut ring: Vec<Option<RegistrationId>> = ids.iter().copied().map(Some).collect();
    if ring.len() % 2 == 1 {
        ring.push(None);
    }
    let n = ring.len();
    let mut rounds = Vec::with_capacity(n - 1);
    for r in 0..n - 1 {
        let mut pairs = Vec::with_capacity(n / 2);
        for i in 0..n / 2 {
            if let (Some(a), Some(b)) = (ring[i], ring[n - 1 - i]) {
                // Alternate the fixed entrant's side so it is not always A.
                if i == 0 && r % 2 == 1 {
                    pairs.push((b, a));
                } else {
                    pairs.push((a, b));
                }
            }
        }
        rounds.push(pairs);
        if let Some(last) = ring.pop() {
            ring.insert(1, last);
        }
    }
    rounds
}

/// Round-robin matches for every group of `bracket` from its current members.
///
/// `round` and `rr_round` are the round-robin round; `order` runs across the whole bracket.
pub fn round_robin_matches(bracket: &Bracket) -> Vec<BracketMatch> {
    let mut out = Vec::new();
    let mut order = 0u32;
    for group in &bracket.groups {
        let schedule = round_robin_rounds(&group.registrations);
        let legs = if bracket.double_round_robin { 2 } else { 1 };
        let per_leg = schedule.len() as u32;
        for leg in 0..legs {
            for (r, pairs) in schedule.iter().enumerate() {
                let rr_round = leg * per_leg + r as u32 + 1;
                for &(a, b) in pairs {
                    let (a, b) = if leg == 1 { (b, a) } else { (a, b) };
                    let mut m = BracketMatch::new(
                        bracket.tournament_id,
                        bracket.id,
                        bracket.stage,
                        rr_round,
                        order,
                    );
                    order += 1;
                    m.round_key = format!("G{}-R{}", group.name, rr_round);
                    m.pair_a = Some(a);
                    m.pair_b = Some(b);
                    m.pool = Some(Pool {
                        id: group.id,
                        name: group.name.clone(),
                    });
                    m.rr_round = Some(rr_round);
                    m.rules = bracket.rules;
                    out.push(m);
                }
            }
        }
    }
    out
}

/// Build a group bracket. Matches are generated only when entrants are given.
pub fn build_group<R: BracketRepository + ?Sized>(
    repo: &R,
    tournament_id: TournamentId,
    options: GroupOptions,
) -> Result<BuiltBracket, BracketError> {
    let (sizes, byes) = resolve_sizes(&options)?;

    let mut bracket = Bracket::new(
        tournament_id,
        options.name.clone(),
        BracketType::Group,
        options.stage,
        options.order,
    );
    bracket.rules = options.rules.sanitized();
    bracket.group_feed = options.feed;
    bracket.double_round_robin = options.double_round_robin;
    bracket.meta.draw_size = sizes.iter().sum();
    bracket.meta.byes = byes;
    bracket.groups = sizes
        .iter()
        .enumerate()
        .map(|(i, &size)| Group {
            id: Uuid::new_v4(),
            name: group_code(i),
            expected_size: size,
            registrations: Vec::new(),
        })
        .collect();

    let mut matches = Vec::new();
    if !options.registrations.is_empty() {
        let byes_per_group = bye_counts(&sizes, byes);
        let mut entrants = options.registrations.iter().copied();
        for (group, bye_slots) in bracket.groups.iter_mut().zip(byes_per_group) {
            let take = group.expected_size.saturating_sub(bye_slots);
            group.registrations.extend(entrants.by_ref().take(take));
        }
        let unplaced = entrants.count();
        if unplaced > 0 {
            log::warn!(
                "Group bracket '{}': {} entrant(s) did not fit the planned groups",
                bracket.name,
                unplaced
            );
        }
        matches = round_robin_matches(&bracket);
    }

    log::info!(
        "Building group bracket '{}': {} group(s) sized {:?}, {} bye(s), {} matches",
        bracket.name,
        sizes.len(),
        sizes,
        byes,
        matches.len()
    );
    persist(repo, bracket, matches)
}

/// Generate round-robin matches for a group bracket whose members were set after build.
///
/// Does nothing if the bracket already has matches.
pub fn generate_group_matches<R: BracketRepository + ?Sized>(
    repo: &R,
    bracket_id: BracketId,
) -> Result<Vec<BracketMatch>, BracketError> {
    let bracket = repo.bracket(bracket_id)?;
    if bracket.bracket_type != BracketType::Group {
        return Err(BracketError::WrongBracketType);
    }
    if !repo.matches_for_bracket(bracket_id)?.is_empty() {
        log::debug!("Group bracket {} already has matches", bracket_id);
        return Ok(Vec::new());
    }
    let matches = round_robin_matches(&bracket);
    repo.write_batch(WriteBatch {
        brackets: Vec::new(),
        inserts: matches.clone(),
        fills: Vec::new(),
    })?;
    log::info!("Generated {} group match(es) for bracket {}", matches.len(), bracket_id);
    Ok(matches)
}
