//! Draw sessions: fill a bracket's open slots one pick at a time, then commit.
//!
//! A session is a plain value owned by the caller. Skills, pots, seeds and rematch data
//! are loaded once at start, so `next_candidate` never touches the repository.

use crate::logic::group_stage::{bye_counts, round_robin_matches};
use crate::logic::propagation::{resolve_bracket, PropagationReport};
use crate::logic::scoring::{
    assign_pots, ensure_seeds, placed_entrants, rank_candidates, step_seed, ScoredCandidate,
    ScoringContext,
};
use crate::logic::skill::{estimate_skills, recent_opponents};
use crate::models::{
    Board, Bracket, BracketError, BracketId, BracketMatch, BracketType, DrawMode, DrawSession,
    DrawSettings, GroupBoard, KnockoutPair, RegistrationId, Reveal, SessionId, SessionStatus,
    Side, SkillRecord, Slot,
};
use crate::repository::{BracketRepository, PairFill, WriteBatch};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::HashSet;
use uuid::Uuid;

fn group_board(bracket: &Bracket) -> Board {
    let sizes: Vec<usize> = bracket.groups.iter().map(|g| g.expected_size).collect();
    let byes = bye_counts(&sizes, bracket.meta.byes);
    let groups = bracket
        .groups
        .iter()
        .zip(byes)
        .map(|(g, bye_slots)| {
            let size = g.expected_size.max(g.registrations.len());
            let mut slots: Vec<Slot> = g.registrations.iter().map(|&id| Slot::Taken(id)).collect();
            let open = size - slots.len();
            let byes_here = bye_slots.min(open);
            slots.extend(std::iter::repeat(Slot::Empty).take(open - byes_here));
            slots.extend(std::iter::repeat(Slot::Bye).take(byes_here));
            GroupBoard {
                key: g.name.clone(),
                slots,
            }
        })
        .collect();
    Board::Groups { groups }
}

fn first_round_slot(m: &BracketMatch, side: Side) -> Slot {
    if let Some(id) = m.pair(side) {
        return Slot::Taken(id);
    }
    match m.seed(side) {
        Some(seed) if seed.is_bye() => Slot::Bye,
        Some(_) => Slot::Reserved,
        None if m.previous(side).is_some() => Slot::Reserved,
        None => Slot::Empty,
    }
}

fn knockout_board(matches: &[BracketMatch]) -> Board {
    let pairs = matches
        .iter()
        .filter(|m| m.round == 1)
        .enumerate()
        .map(|(index, m)| KnockoutPair {
            index,
            match_id: Some(m.id),
            a: first_round_slot(m, Side::A),
            b: first_round_slot(m, Side::B),
        })
        .collect();
    Board::Knockout { round: 1, pairs }
}

/// Open a draw on `bracket_id`.
///
/// `pool` defaults to the tournament's paid registrations not already on the board. An
/// explicit pool may only name registrations of the tournament, and the pool must exactly
/// fill the open slots.
pub fn start_draw<R: BracketRepository + ?Sized>(
    repo: &R,
    bracket_id: BracketId,
    settings: DrawSettings,
    pool: Option<Vec<RegistrationId>>,
) -> Result<DrawSession, BracketError> {
    start_draw_at(repo, bracket_id, settings, pool, Utc::now())
}

/// [`start_draw`] with an explicit clock, for reproducible sessions.
pub fn start_draw_at<R: BracketRepository + ?Sized>(
    repo: &R,
    bracket_id: BracketId,
    mut settings: DrawSettings,
    pool: Option<Vec<RegistrationId>>,
    now: DateTime<Utc>,
) -> Result<DrawSession, BracketError> {
    let bracket = repo.bracket(bracket_id)?;
    let (mode, board) = match bracket.bracket_type {
        BracketType::Group => (DrawMode::Group, group_board(&bracket)),
        BracketType::Knockout | BracketType::RoundElim => (
            DrawMode::Knockout,
            knockout_board(&repo.matches_for_bracket(bracket_id)?),
        ),
    };

    let placed = placed_entrants(&board);
    let placed_set: HashSet<RegistrationId> = placed.iter().copied().collect();
    let registrations = repo.registrations(bracket.tournament_id)?;
    let pool: Vec<RegistrationId> = match pool {
        Some(ids) => {
            let known: HashSet<RegistrationId> = registrations.iter().map(|r| r.id).collect();
            if let Some(missing) = ids.iter().find(|id| !known.contains(id)) {
                return Err(BracketError::RegistrationNotFound(*missing));
            }
            let mut seen = HashSet::new();
            ids.into_iter()
                .filter(|id| !placed_set.contains(id) && seen.insert(*id))
                .collect()
        }
        None => registrations
            .into_iter()
            .filter(|r| r.paid && !placed_set.contains(&r.id))
            .map(|r| r.id)
            .collect(),
    };
    if pool.len() != board.open_slots() {
        return Err(BracketError::PoolMismatch {
            pool: pool.len(),
            open_slots: board.open_slots(),
        });
    }

    let seed = settings
        .seed
        .unwrap_or_else(|| now.timestamp_millis().unsigned_abs());
    settings.seed = Some(seed);

    let everyone: Vec<RegistrationId> = pool.iter().chain(placed.iter()).copied().collect();
    let mut skills = estimate_skills(repo, &everyone, settings.recent_days, now)?;
    let constraints = settings.constraints;
    if mode == DrawMode::Group && constraints.use_pots {
        let groups = match &board {
            Board::Groups { groups } => groups.len(),
            Board::Knockout { .. } => 0,
        };
        let pot_count = constraints
            .pot_count
            .filter(|&p| p > 0)
            .unwrap_or(if groups > 0 { groups } else { 4 });
        assign_pots(&mut skills, pot_count, constraints.pot_by);
    }
    ensure_seeds(&mut skills, constraints.protect_top_seeds);

    let recent = if constraints.avoid_rematch_within_days > 0 {
        let since = now - Duration::days(i64::from(constraints.avoid_rematch_within_days));
        recent_opponents(repo, &everyone, since)?
    } else {
        Default::default()
    };

    let cursor = board.first_empty();
    log::info!(
        "Draw session started on bracket {} ({:?}): {} in pool, {} open slot(s), seed {}",
        bracket_id,
        mode,
        pool.len(),
        board.open_slots(),
        seed
    );
    Ok(DrawSession {
        id: Uuid::new_v4(),
        tournament_id: bracket.tournament_id,
        bracket_id,
        mode,
        board,
        cursor,
        pool,
        settings,
        status: SessionStatus::Active,
        step: 0,
        started_at: now,
        reveals: Vec::new(),
        skills,
        recent_opponents: recent,
    })
}

fn ensure_active(session: &DrawSession) -> Result<(), BracketError> {
    if session.is_active() {
        Ok(())
    } else {
        Err(BracketError::SessionNotActive)
    }
}

/// All pool entrants ranked for the current slot, best first.
pub fn rank_pool(session: &DrawSession) -> Result<Vec<ScoredCandidate>, BracketError> {
    ensure_active(session)?;
    if session.pool.is_empty() {
        return Err(BracketError::EmptyPool);
    }
    if session.board.slot_at(session.cursor).map_or(true, |s| !s.is_empty()) {
        return Err(BracketError::NoOpenSlot);
    }
    let ctx = ScoringContext {
        skills: &session.skills,
        recent_opponents: &session.recent_opponents,
        settings: &session.settings,
    };
    let seed = step_seed(session.settings.seed.unwrap_or_default(), session.step);
    Ok(rank_candidates(
        &ctx,
        &session.board,
        session.cursor,
        &session.pool,
        seed,
    ))
}

/// Best candidate for the slot under the cursor. Does not change the session.
pub fn next_candidate(session: &DrawSession) -> Result<RegistrationId, BracketError> {
    let ranked = rank_pool(session)?;
    let best = ranked.first().ok_or(BracketError::EmptyPool)?;
    if best.score.is_infinite() {
        log::warn!(
            "Session {}: no candidate satisfies the hard constraints at {:?}; picking {} anyway",
            session.id,
            session.cursor,
            best.registration_id
        );
    } else {
        log::debug!(
            "Session {} step {}: suggest {} (score {:.4})",
            session.id,
            session.step,
            best.registration_id,
            best.score
        );
    }
    Ok(best.registration_id)
}

/// Place `chosen` at the cursor and move on.
///
/// When `expected_step` is given it must equal the session's step, which rejects
/// duplicated or out-of-order calls.
pub fn advance(
    session: &mut DrawSession,
    chosen: RegistrationId,
    expected_step: Option<u64>,
) -> Result<Reveal, BracketError> {
    ensure_active(session)?;
    if let Some(got) = expected_step {
        if got != session.step {
            return Err(BracketError::StaleStep {
                expected: session.step,
                got,
            });
        }
    }
    if !session.pool.contains(&chosen) {
        return Err(BracketError::NotInPool(chosen));
    }
    let cursor = session.cursor;
    session.board.place(cursor, chosen)?;
    session.pool.retain(|id| *id != chosen);
    session.step += 1;
    session.cursor = session.board.first_empty();
    let reveal = Reveal {
        step: session.step,
        cursor,
        registration_id: chosen,
    };
    session.reveals.push(reveal);
    log::debug!("Session {} placed {} at {:?}", session.id, chosen, cursor);
    Ok(reveal)
}

/// Run `next_candidate` + `advance` until the board or the pool runs out.
pub fn auto_complete(session: &mut DrawSession) -> Result<usize, BracketError> {
    let mut placed = 0;
    while !session.pool.is_empty() && !session.board.is_complete() {
        let pick = next_candidate(session)?;
        let step = session.step;
        advance(session, pick, Some(step))?;
        placed += 1;
    }
    Ok(placed)
}

/// Write the finished board in one batch and resolve what follows from it.
pub fn commit_draw<R: BracketRepository + ?Sized>(
    repo: &R,
    session: &mut DrawSession,
) -> Result<PropagationReport, BracketError> {
    ensure_active(session)?;
    let open_slots = session.board.open_slots();
    if open_slots > 0 || !session.pool.is_empty() {
        return Err(BracketError::BoardIncomplete {
            open_slots,
            remaining: session.pool.len(),
        });
    }

    let report = match &session.board {
        Board::Groups { groups } => {
            let mut bracket = repo.bracket(session.bracket_id)?;
            for (group, board) in bracket.groups.iter_mut().zip(groups) {
                group.registrations = board.members().collect();
            }
            let inserts = if repo.matches_for_bracket(bracket.id)?.is_empty() {
                round_robin_matches(&bracket)
            } else {
                log::warn!(
                    "Bracket {} already has matches; committing groups without new fixtures",
                    bracket.id
                );
                Vec::new()
            };
            repo.write_batch(WriteBatch {
                brackets: vec![bracket],
                inserts,
                fills: Vec::new(),
            })?;
            PropagationReport::default()
        }
        Board::Knockout { pairs, .. } => {
            let fills: Vec<PairFill> = pairs
                .iter()
                .filter_map(|pair| pair.match_id.map(|id| (id, pair)))
                .flat_map(|(match_id, pair)| {
                    [Side::A, Side::B].into_iter().filter_map(move |side| {
                        pair.slot(side).entrant().map(|entrant| PairFill {
                            match_id,
                            side,
                            entrant,
                        })
                    })
                })
                .collect();
            repo.write_batch(WriteBatch {
                brackets: Vec::new(),
                inserts: Vec::new(),
                fills,
            })?;
            resolve_bracket(repo, session.bracket_id)?
        }
    };

    session.status = SessionStatus::Committed;
    log::info!(
        "Draw session {} committed to bracket {} after {} step(s)",
        session.id,
        session.bracket_id,
        session.step
    );
    Ok(report)
}

/// Abandon a session. Nothing was written, so nothing is undone.
pub fn cancel_draw(session: &mut DrawSession) -> Result<(), BracketError> {
    ensure_active(session)?;
    session.status = SessionStatus::Canceled;
    log::info!("Draw session {} canceled at step {}", session.id, session.step);
    Ok(())
}

/// Compact view of a session for status queries.
#[derive(Clone, Debug, Serialize)]
pub struct DrawSummary {
    pub session_id: SessionId,
    pub bracket_id: BracketId,
    pub status: SessionStatus,
    pub step: u64,
    pub open_slots: usize,
    pub remaining: usize,
    pub started_at: DateTime<Utc>,
    pub reveals: Vec<Reveal>,
}

impl DrawSummary {
    pub fn of(session: &DrawSession) -> Self {
        Self {
            session_id: session.id,
            bracket_id: session.bracket_id,
            status: session.status,
            step: session.step,
            open_slots: session.board.open_slots(),
            remaining: session.pool.len(),
            started_at: session.started_at,
            reveals: session.reveals.clone(),
        }
    }
}

/// Latest session of a bracket, preferring an active one.
pub fn latest_session_for_bracket<'a>(
    sessions: impl IntoIterator<Item = &'a DrawSession>,
    bracket_id: BracketId,
) -> Option<&'a DrawSession> {
    sessions
        .into_iter()
        .filter(|s| s.bracket_id == bracket_id)
        .max_by_key(|s| (s.is_active(), s.started_at))
}

/// Skill records of the session's entrants, strongest first.
pub fn skill_breakdown(session: &DrawSession) -> Vec<SkillRecord> {
    let mut out: Vec<SkillRecord> = session.skills.values().cloned().collect();
    out.sort_by(|a, b| b.skill.total_cmp(&a.skill).then(a.id.cmp(&b.id)));
    out
}
