//! Seed resolution: turn typed references into entrants as their sources finish.
//!
//! Every write goes through [`BracketRepository::fill_slot`], so a slot is only ever
//! filled once. A different value for an already filled slot is logged and skipped.

use crate::logic::standings::standings_for_group;
use crate::models::{
    BracketError, BracketId, BracketMatch, BracketType, GameScore, GroupFeed, GroupRankRef,
    MatchId, MatchStatus, RegistrationId, SeedKey, SeedReference, SeedSource, Side,
    StageMatchRef,
};
use crate::repository::{BracketRepository, SlotFill};
use chrono::Utc;
use serde::Serialize;
use std::collections::{HashSet, VecDeque};

/// What one propagation run changed.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct PropagationReport {
    pub updated_slots: usize,
    pub conflicts: usize,
    /// Matches finished without play because of byes.
    pub auto_advanced: usize,
}

impl PropagationReport {
    fn absorb(&mut self, other: PropagationReport) {
        self.updated_slots += other.updated_slots;
        self.conflicts += other.conflicts;
        self.auto_advanced += other.auto_advanced;
    }
}

/// Current answer for one side's reference.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Resolution {
    Entrant(RegistrationId),
    /// Resolved to nobody: the side is a bye.
    NoEntrant,
    /// Source not decided yet, or an open draw slot.
    Unresolved,
}

fn outcome_of(source: &BracketMatch, winner: bool) -> Resolution {
    if !source.is_finished() {
        return Resolution::Unresolved;
    }
    let id = if winner {
        source.winner_id()
    } else {
        source.loser_id()
    };
    id.map_or(Resolution::NoEntrant, Resolution::Entrant)
}

/// The match a stage reference points at, as seen from `target`.
///
/// Same-stage references stay inside the target's bracket. Across stages, a match of the
/// target's own bracket wins, then the first bracket of the stage by order.
fn find_stage_match<R: BracketRepository + ?Sized>(
    repo: &R,
    target: &BracketMatch,
    r: &StageMatchRef,
) -> Result<Option<BracketMatch>, BracketError> {
    let candidates: Vec<BracketMatch> = repo
        .matches_for_tournament(target.tournament_id)?
        .into_iter()
        .filter(|m| m.stage == r.stage && m.round == r.round && m.order == r.order)
        .collect();
    if let Some(own) = candidates.iter().find(|m| m.bracket_id == target.bracket_id) {
        return Ok(Some(own.clone()));
    }
    if r.stage == target.stage || candidates.len() <= 1 {
        return Ok(if r.stage == target.stage {
            None
        } else {
            candidates.into_iter().next()
        });
    }
    for bracket in repo.brackets_for_tournament(target.tournament_id)? {
        if let Some(m) = candidates.iter().find(|m| m.bracket_id == bracket.id) {
            return Ok(Some(m.clone()));
        }
    }
    Ok(None)
}

fn resolve_group_rank<R: BracketRepository + ?Sized>(
    repo: &R,
    target: &BracketMatch,
    g: &GroupRankRef,
) -> Result<Resolution, BracketError> {
    let brackets = repo.brackets_for_tournament(target.tournament_id)?;
    for bracket in brackets
        .iter()
        .filter(|b| b.stage == g.stage && b.bracket_type == BracketType::Group)
    {
        let Some((index, _)) = bracket.find_group(&g.group_code) else {
            continue;
        };
        let matches = repo.matches_for_bracket(bracket.id)?;
        let Some(standings) = standings_for_group(bracket, &matches, index) else {
            continue;
        };
        if bracket.group_feed == GroupFeed::WhenComplete && !standings.complete {
            return Ok(Resolution::Unresolved);
        }
        return Ok(match standings.at_rank(g.rank) {
            Some(id) => Resolution::Entrant(id),
            None if standings.complete => Resolution::NoEntrant,
            None => Resolution::Unresolved,
        });
    }
    log::warn!(
        "Seed {}#{} of match {} points at no group in stage {}",
        g.group_code,
        g.rank,
        target.id,
        g.stage
    );
    Ok(Resolution::Unresolved)
}

fn resolve_seed<R: BracketRepository + ?Sized>(
    repo: &R,
    target: &BracketMatch,
    seed: &SeedReference,
) -> Result<Resolution, BracketError> {
    match &seed.source {
        SeedSource::Bye => Ok(Resolution::NoEntrant),
        SeedSource::Registration(id) => Ok(Resolution::Entrant(*id)),
        SeedSource::StageMatchWinner(r) | SeedSource::StageMatchLoser(r) => {
            let winner = matches!(seed.source, SeedSource::StageMatchWinner(_));
            match find_stage_match(repo, target, r)? {
                Some(source) => Ok(outcome_of(&source, winner)),
                None => {
                    log::warn!("Seed {} of match {} has no source match", seed.label, target.id);
                    Ok(Resolution::Unresolved)
                }
            }
        }
        SeedSource::GroupRank(g) => resolve_group_rank(repo, target, g),
    }
}

fn resolve_side<R: BracketRepository + ?Sized>(
    repo: &R,
    m: &BracketMatch,
    side: Side,
) -> Result<Resolution, BracketError> {
    if let Some(seed) = m.seed(side) {
        return resolve_seed(repo, m, seed);
    }
    match m.previous(side) {
        Some(prev) => Ok(outcome_of(&repo.get_match(prev)?, true)),
        None => Ok(Resolution::Unresolved),
    }
}

#[derive(Clone, Copy, Eq, PartialEq)]
enum SideState {
    Present,
    Absent,
    Unknown,
}

/// Fill what can be filled on one unfinished match and auto-advance byes.
/// Returns whether the match got finished here.
fn evaluate<R: BracketRepository + ?Sized>(
    repo: &R,
    match_id: MatchId,
    report: &mut PropagationReport,
) -> Result<bool, BracketError> {
    let m = repo.get_match(match_id)?;
    if m.is_finished() {
        return Ok(false);
    }

    let mut states = [SideState::Unknown; 2];
    for (i, side) in [Side::A, Side::B].into_iter().enumerate() {
        let resolution = resolve_side(repo, &m, side)?;
        states[i] = match resolution {
            Resolution::Entrant(id) => {
                match repo.fill_slot(m.id, side, id)? {
                    SlotFill::Filled => {
                        report.updated_slots += 1;
                        log::debug!("Match {} side {:?} <- {}", m.id, side, id);
                    }
                    SlotFill::Unchanged => {}
                    SlotFill::Conflict(existing) => {
                        report.conflicts += 1;
                        log::warn!(
                            "Match {} side {:?} already holds {}; skipping {}",
                            m.id,
                            side,
                            existing,
                            id
                        );
                    }
                }
                SideState::Present
            }
            _ if m.pair(side).is_some() => SideState::Present,
            Resolution::NoEntrant => SideState::Absent,
            Resolution::Unresolved => SideState::Unknown,
        };
    }

    let winner = match states {
        [SideState::Present, SideState::Absent] => Some(Side::A),
        [SideState::Absent, SideState::Present] => Some(Side::B),
        [SideState::Absent, SideState::Absent] => None,
        _ => return Ok(false),
    };
    let finished = repo.update_match(m.id, &mut |stored| {
        if stored.is_finished() {
            return false;
        }
        stored.status = MatchStatus::Finished;
        stored.winner = winner;
        stored.finished_at = Some(Utc::now());
        true
    })?;
    if finished {
        report.auto_advanced += 1;
        log::debug!("Match {} finished by bye (winner {:?})", m.id, winner);
    }
    Ok(finished)
}

/// Matches whose sides may depend on `source`.
fn dependents_of<R: BracketRepository + ?Sized>(
    repo: &R,
    source: &BracketMatch,
) -> Result<Vec<MatchId>, BracketError> {
    let mut out: Vec<MatchId> = Vec::new();
    out.extend(source.next_match);

    let key = SeedKey::StageMatch(StageMatchRef {
        stage: source.stage,
        round: source.round,
        order: source.order,
    });
    out.extend(
        repo.find_matches_referencing(source.tournament_id, &key)?
            .into_iter()
            .map(|m| m.id),
    );

    if let Some(pool) = &source.pool {
        let bracket = repo.bracket(source.bracket_id)?;
        if let Some(index) = bracket.groups.iter().position(|g| g.id == pool.id) {
            for code in [bracket.groups[index].name.clone(), (index + 1).to_string()] {
                let key = SeedKey::Group {
                    stage: bracket.stage,
                    group_code: code,
                };
                out.extend(
                    repo.find_matches_referencing(source.tournament_id, &key)?
                        .into_iter()
                        .map(|m| m.id),
                );
            }
        }
    }

    let mut seen = HashSet::new();
    out.retain(|id| *id != source.id && seen.insert(*id));
    Ok(out)
}

fn cascade<R: BracketRepository + ?Sized>(
    repo: &R,
    start: impl IntoIterator<Item = MatchId>,
    report: &mut PropagationReport,
) -> Result<(), BracketError> {
    let mut queue: VecDeque<MatchId> = start.into_iter().collect();
    let mut done: HashSet<MatchId> = HashSet::new();
    while let Some(id) = queue.pop_front() {
        if !done.insert(id) {
            continue;
        }
        let source = repo.get_match(id)?;
        if !source.is_finished() {
            continue;
        }
        for dependent in dependents_of(repo, &source)? {
            if evaluate(repo, dependent, report)? {
                queue.push_back(dependent);
            }
        }
    }
    Ok(())
}

/// Re-evaluate everything that depends on a finished match. Safe to call repeatedly.
pub fn on_match_finished<R: BracketRepository + ?Sized>(
    repo: &R,
    match_id: MatchId,
) -> Result<PropagationReport, BracketError> {
    let mut report = PropagationReport::default();
    cascade(repo, [match_id], &mut report)?;
    if report.updated_slots > 0 || report.conflicts > 0 {
        log::info!(
            "Propagated match {}: {} slot(s) filled, {} conflict(s), {} bye advance(s)",
            match_id,
            report.updated_slots,
            report.conflicts,
            report.auto_advanced
        );
    }
    Ok(report)
}

/// Resolve every side of a bracket that can be resolved now, then cascade.
///
/// Run after construction and after a draw commit.
pub fn resolve_bracket<R: BracketRepository + ?Sized>(
    repo: &R,
    bracket_id: BracketId,
) -> Result<PropagationReport, BracketError> {
    let mut report = PropagationReport::default();
    for m in repo.matches_for_bracket(bracket_id)? {
        evaluate(repo, m.id, &mut report)?;
    }
    let finished: Vec<MatchId> = repo
        .matches_for_bracket(bracket_id)?
        .into_iter()
        .filter(BracketMatch::is_finished)
        .map(|m| m.id)
        .collect();
    let mut cascaded = PropagationReport::default();
    cascade(repo, finished, &mut cascaded)?;
    report.absorb(cascaded);
    log::debug!(
        "Resolved bracket {}: {} slot(s) filled, {} bye advance(s)",
        bracket_id,
        report.updated_slots,
        report.auto_advanced
    );
    Ok(report)
}

/// Record a played result and propagate it.
///
/// `scores` may be empty; when given, the games they describe must agree with `winner`.
/// A finished match only accepts the same winner again; reset it first to change it.
pub fn record_result<R: BracketRepository + ?Sized>(
    repo: &R,
    match_id: MatchId,
    winner: Side,
    scores: Vec<GameScore>,
) -> Result<PropagationReport, BracketError> {
    let m = repo.get_match(match_id)?;
    if m.pair_a.is_none() || m.pair_b.is_none() {
        return Err(BracketError::InvalidResult(
            "both sides must hold an entrant".to_string(),
        ));
    }
    if m.is_finished() {
        if m.winner == Some(winner) {
            return on_match_finished(repo, match_id);
        }
        return Err(BracketError::InvalidResult(
            "match already finished with another winner; reset it first".to_string(),
        ));
    }
    let mut check = m.clone();
    check.game_scores = scores.clone();
    let (sets_a, sets_b) = check.sets();
    let agrees = match winner {
        Side::A => sets_a > sets_b,
        Side::B => sets_b > sets_a,
    };
    if !scores.is_empty() && !agrees {
        return Err(BracketError::InvalidResult(format!(
            "scores give {}-{} in games but winner is {:?}",
            sets_a, sets_b, winner
        )));
    }

    repo.update_match(match_id, &mut |stored| {
        stored.game_scores = scores.clone();
        stored.winner = Some(winner);
        stored.status = MatchStatus::Finished;
        stored.finished_at = Some(Utc::now());
        true
    })?;
    log::info!("Match {} finished, winner {:?}", match_id, winner);
    on_match_finished(repo, match_id)
}

/// Sides of `dependent` whose stage reference resolves to `source`.
fn sides_fed_by<R: BracketRepository + ?Sized>(
    repo: &R,
    source: &BracketMatch,
    dependent: &BracketMatch,
) -> Result<Vec<Side>, BracketError> {
    let mut sides = Vec::new();
    for side in [Side::A, Side::B] {
        let Some(seed) = dependent.seed(side) else {
            continue;
        };
        let (SeedSource::StageMatchWinner(r) | SeedSource::StageMatchLoser(r)) = &seed.source else {
            continue;
        };
        if find_stage_match(repo, dependent, r)?.map_or(false, |m| m.id == source.id) {
            sides.push(side);
        }
    }
    Ok(sides)
}

/// Clear the result of a match and everything fed from it.
///
/// Follows `next_match` edges and stage winner/loser references. The start match keeps
/// its entrants; each downstream match loses the slots it was fed and its result.
/// Returns how many matches were touched.
pub fn reset_chain_from<R: BracketRepository + ?Sized>(
    repo: &R,
    match_id: MatchId,
) -> Result<usize, BracketError> {
    let clear = |id: MatchId, sides: &[Side]| {
        repo.update_match(id, &mut |m| {
            for side in sides {
                *m.pair_mut(*side) = None;
            }
            m.status = MatchStatus::Scheduled;
            m.winner = None;
            m.game_scores.clear();
            m.finished_at = None;
            true
        })
    };

    clear(match_id, &[])?;
    let mut visited = HashSet::from([match_id]);
    let mut queue = VecDeque::from([match_id]);
    while let Some(id) = queue.pop_front() {
        let source = repo.get_match(id)?;
        let mut fed: Vec<(MatchId, Vec<Side>)> = Vec::new();
        if let (Some(next), Some(slot)) = (source.next_match, source.next_slot) {
            fed.push((next, vec![slot]));
        }
        let key = SeedKey::StageMatch(StageMatchRef {
            stage: source.stage,
            round: source.round,
            order: source.order,
        });
        for dependent in repo.find_matches_referencing(source.tournament_id, &key)? {
            let sides = sides_fed_by(repo, &source, &dependent)?;
            if !sides.is_empty() {
                fed.push((dependent.id, sides));
            }
        }
        for (dependent, sides) in fed {
            clear(dependent, &sides)?;
            if visited.insert(dependent) {
                queue.push_back(dependent);
            }
        }
    }
    let touched = visited.len();
    log::info!("Reset {} match(es) starting at {}", touched, match_id);
    Ok(touched)
}
