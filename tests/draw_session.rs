//! Integration tests for draw sessions: picks, determinism, commit and cancel.

use bracket_draw_web::{
    advance, auto_complete, build_group, build_knockout, cancel_draw, commit_draw,
    latest_session_for_bracket, next_candidate, skill_breakdown, start_draw_at, BracketError,
    BracketId, BracketRepository, DrawSettings, GroupOptions, KnockoutOptions, MatchStatus,
    MemoryRepository, Registration, RegistrationId, SessionStatus, Side, TournamentId, UnfilledSlots,
};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use uuid::Uuid;

fn repo_with_rated(ratings: &[f64]) -> (MemoryRepository, TournamentId, Vec<RegistrationId>) {
    let repo = MemoryRepository::new();
    let tid = Uuid::new_v4();
    let mut ids = Vec::new();
    for (i, r) in ratings.iter().enumerate() {
        let reg = Registration::new(tid, format!("Team {i}")).with_rating(*r);
        ids.push(reg.id);
        repo.add_registration(reg).unwrap();
    }
    (repo, tid, ids)
}

fn open_knockout(repo: &MemoryRepository, tid: TournamentId, draw_size: usize) -> BracketId {
    let mut options = KnockoutOptions::new(draw_size);
    options.unfilled = UnfilledSlots::Open;
    build_knockout(repo, tid, options).unwrap().bracket.id
}

fn quiet_settings(seed: u64) -> DrawSettings {
    DrawSettings {
        seed: Some(seed),
        randomness: 0.0,
        ..DrawSettings::default()
    }
}

fn now() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2025-03-01T12:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

const RATINGS: [f64; 8] = [9.0, 8.5, 7.0, 6.5, 5.0, 4.0, 3.5, 2.0];

#[test]
fn knockout_draw_fills_every_open_slot() {
    let (repo, tid, ids) = repo_with_rated(&RATINGS);
    let bracket = open_knockout(&repo, tid, 8);
    let mut session = start_draw_at(&repo, bracket, quiet_settings(1), None, now()).unwrap();
    assert_eq!(session.pool.len(), 8);
    assert_eq!(session.board.open_slots(), 8);

    assert_eq!(auto_complete(&mut session).unwrap(), 8);
    assert!(session.board.is_complete());
    assert_eq!(session.reveals.len(), 8);
    commit_draw(&repo, &mut session).unwrap();
    assert_eq!(session.status, SessionStatus::Committed);

    let placed: HashSet<RegistrationId> = repo
        .matches_for_bracket(bracket)
        .unwrap()
        .into_iter()
        .filter(|m| m.round == 1)
        .flat_map(|m| [m.pair_a.unwrap(), m.pair_b.unwrap()])
        .collect();
    assert_eq!(placed, ids.into_iter().collect());
}

#[test]
fn identical_settings_give_identical_draws() {
    let (repo, tid, _) = repo_with_rated(&RATINGS);
    let settings = DrawSettings {
        seed: Some(99),
        randomness: 0.05,
        ..DrawSettings::default()
    };
    let mut runs = Vec::new();
    for _ in 0..2 {
        let bracket = open_knockout(&repo, tid, 8);
        let mut session = start_draw_at(&repo, bracket, settings, None, now()).unwrap();
        auto_complete(&mut session).unwrap();
        runs.push(session.reveals.iter().map(|r| r.registration_id).collect::<Vec<_>>());
    }
    assert_eq!(runs[0], runs[1]);
}

#[test]
fn next_does_not_change_the_session() {
    let (repo, tid, _) = repo_with_rated(&RATINGS);
    let bracket = open_knockout(&repo, tid, 8);
    let session = start_draw_at(&repo, bracket, quiet_settings(3), None, now()).unwrap();
    let first = next_candidate(&session).unwrap();
    let second = next_candidate(&session).unwrap();
    assert_eq!(first, second);
    assert_eq!(session.step, 0);
    assert_eq!(session.pool.len(), 8);
    assert!(session.reveals.is_empty());
}

#[test]
fn protected_seeds_do_not_meet_in_round_one() {
    let repo = MemoryRepository::new();
    let tid = Uuid::new_v4();
    let regs = vec![
        Registration::new(tid, "One").with_rating(9.0).with_seed(1),
        Registration::new(tid, "Two").with_rating(8.0).with_seed(2),
        Registration::new(tid, "Three").with_rating(5.0),
        Registration::new(tid, "Four").with_rating(4.0),
    ];
    let seeded: Vec<RegistrationId> = regs[..2].iter().map(|r| r.id).collect();
    for r in regs {
        repo.add_registration(r).unwrap();
    }
    let bracket = open_knockout(&repo, tid, 4);
    let mut settings = quiet_settings(5);
    settings.constraints.protect_top_seeds = 2;

    let mut session = start_draw_at(&repo, bracket, settings, None, now()).unwrap();
    auto_complete(&mut session).unwrap();
    commit_draw(&repo, &mut session).unwrap();

    for m in repo.matches_for_bracket(bracket).unwrap().iter().filter(|m| m.round == 1) {
        let both = [m.pair_a.unwrap(), m.pair_b.unwrap()];
        assert!(!seeded.iter().all(|s| both.contains(s)), "top seeds drawn together");
    }
}

#[test]
fn stale_or_unknown_picks_are_rejected() {
    let (repo, tid, _) = repo_with_rated(&RATINGS);
    let bracket = open_knockout(&repo, tid, 8);
    let mut session = start_draw_at(&repo, bracket, quiet_settings(4), None, now()).unwrap();
    let pick = next_candidate(&session).unwrap();

    assert!(matches!(
        advance(&mut session, pick, Some(5)),
        Err(BracketError::StaleStep { expected: 0, got: 5 })
    ));
    let stranger = Uuid::new_v4();
    assert!(matches!(
        advance(&mut session, stranger, Some(0)),
        Err(BracketError::NotInPool(id)) if id == stranger
    ));

    let reveal = advance(&mut session, pick, Some(0)).unwrap();
    assert_eq!(reveal.step, 1);
    // Replaying the same call is stale now.
    assert!(matches!(
        advance(&mut session, pick, Some(0)),
        Err(BracketError::StaleStep { .. })
    ));
}

#[test]
fn incomplete_commit_writes_nothing() {
    let (repo, tid, _) = repo_with_rated(&RATINGS);
    let bracket = open_knockout(&repo, tid, 8);
    let mut session = start_draw_at(&repo, bracket, quiet_settings(8), None, now()).unwrap();
    for _ in 0..3 {
        let pick = next_candidate(&session).unwrap();
        advance(&mut session, pick, None).unwrap();
    }
    let result = commit_draw(&repo, &mut session);
    assert!(matches!(
        result,
        Err(BracketError::BoardIncomplete { open_slots: 5, remaining: 5 })
    ));
    assert_eq!(session.status, SessionStatus::Active);
    assert!(repo
        .matches_for_bracket(bracket)
        .unwrap()
        .iter()
        .all(|m| m.pair_a.is_none() && m.pair_b.is_none()));
}

#[test]
fn cancel_discards_the_session() {
    let (repo, tid, _) = repo_with_rated(&RATINGS);
    let bracket = open_knockout(&repo, tid, 8);
    let mut session = start_draw_at(&repo, bracket, quiet_settings(2), None, now()).unwrap();
    let pick = next_candidate(&session).unwrap();
    advance(&mut session, pick, None).unwrap();

    cancel_draw(&mut session).unwrap();
    assert_eq!(session.status, SessionStatus::Canceled);
    assert!(matches!(next_candidate(&session), Err(BracketError::SessionNotActive)));
    assert!(matches!(cancel_draw(&mut session), Err(BracketError::SessionNotActive)));
    assert!(repo
        .matches_for_bracket(bracket)
        .unwrap()
        .iter()
        .all(|m| m.pair_a.is_none() && m.pair_b.is_none()));
}

#[test]
fn partial_knockout_draw_advances_byes_on_commit() {
    let (repo, tid, _) = repo_with_rated(&RATINGS[..6]);
    let bracket = open_knockout(&repo, tid, 6);
    let mut session = start_draw_at(&repo, bracket, quiet_settings(6), None, now()).unwrap();
    assert_eq!(session.board.open_slots(), 6);
    auto_complete(&mut session).unwrap();
    let report = commit_draw(&repo, &mut session).unwrap();
    assert_eq!(report.auto_advanced, 2);

    let matches = repo.matches_for_bracket(bracket).unwrap();
    let r1: Vec<_> = matches.iter().filter(|m| m.round == 1).collect();
    assert_eq!(r1[0].status, MatchStatus::Finished);
    assert_eq!(r1[1].status, MatchStatus::Finished);
    assert_eq!(r1[2].status, MatchStatus::Scheduled);
    let semi = matches.iter().find(|m| m.round == 2 && m.order == 0).unwrap();
    assert!(semi.pair_a.is_some() && semi.pair_b.is_some());
}

#[test]
fn group_draw_commits_members_and_fixtures() {
    let (repo, tid, ids) = repo_with_rated(&RATINGS);
    let bracket = build_group(&repo, tid, GroupOptions::uniform(2, 4)).unwrap().bracket.id;
    let mut settings = quiet_settings(11);
    settings.constraints.use_pots = true;
    let mut session = start_draw_at(&repo, bracket, settings, None, now()).unwrap();
    auto_complete(&mut session).unwrap();
    commit_draw(&repo, &mut session).unwrap();

    let stored = repo.bracket(bracket).unwrap();
    let members: HashSet<RegistrationId> = stored
        .groups
        .iter()
        .flat_map(|g| g.registrations.iter().copied())
        .collect();
    assert!(stored.groups.iter().all(|g| g.registrations.len() == 4));
    assert_eq!(members, ids.into_iter().collect());
    assert_eq!(repo.matches_for_bracket(bracket).unwrap().len(), 12);
}

#[test]
fn group_draw_leaves_bye_slots_empty() {
    let (repo, tid, _) = repo_with_rated(&RATINGS[..5]);
    let options = GroupOptions {
        total_teams: Some(5),
        ..GroupOptions::default()
    };
    let bracket = build_group(&repo, tid, options).unwrap().bracket.id;
    let mut session = start_draw_at(&repo, bracket, quiet_settings(12), None, now()).unwrap();
    assert_eq!(session.board.open_slots(), 5);
    auto_complete(&mut session).unwrap();
    commit_draw(&repo, &mut session).unwrap();

    let stored = repo.bracket(bracket).unwrap();
    let sizes: Vec<usize> = stored.groups.iter().map(|g| g.registrations.len()).collect();
    assert_eq!(sizes, vec![3, 2]);
    assert_eq!(repo.matches_for_bracket(bracket).unwrap().len(), 4);
}

#[test]
fn latest_session_prefers_active_and_skills_are_exposed() {
    let (repo, tid, _) = repo_with_rated(&RATINGS);
    let bracket = open_knockout(&repo, tid, 8);
    let mut old = start_draw_at(&repo, bracket, quiet_settings(1), None, now()).unwrap();
    cancel_draw(&mut old).unwrap();
    let current = start_draw_at(&repo, bracket, quiet_settings(1), None, now()).unwrap();

    let sessions = vec![old.clone(), current.clone()];
    let latest = latest_session_for_bracket(&sessions, bracket).unwrap();
    assert_eq!(latest.id, current.id);
    assert!(latest_session_for_bracket(&sessions, Uuid::new_v4()).is_none());

    let skills = skill_breakdown(&current);
    assert_eq!(skills.len(), 8);
    assert!(skills.windows(2).all(|w| w[0].skill >= w[1].skill));
}

fn round_one_pairs(repo: &MemoryRepository, bracket: BracketId) -> Vec<(Option<RegistrationId>, Option<RegistrationId>)> {
    repo.matches_for_bracket(bracket)
        .unwrap()
        .into_iter()
        .filter(|m| m.round == 1)
        .map(|m| (m.pair_a, m.pair_b))
        .collect()
}

#[test]
fn without_noise_the_seed_does_not_matter() {
    let (repo, tid, _) = repo_with_rated(&RATINGS);
    let mut boards = Vec::new();
    let mut picks = Vec::new();
    for seed in [1, 2] {
        let bracket = open_knockout(&repo, tid, 8);
        let mut session = start_draw_at(&repo, bracket, quiet_settings(seed), None, now()).unwrap();
        auto_complete(&mut session).unwrap();
        picks.push(
            session
                .reveals
                .iter()
                .map(|r| (r.step, r.cursor, r.registration_id))
                .collect::<Vec<_>>(),
        );
        commit_draw(&repo, &mut session).unwrap();
        boards.push(round_one_pairs(&repo, bracket));
    }
    assert_eq!(picks[0], picks[1]);
    assert_eq!(boards[0], boards[1]);
}

#[test]
fn commit_is_rejected_whole_when_a_slot_was_taken_meanwhile() {
    let (repo, tid, _) = repo_with_rated(&RATINGS);
    let bracket = open_knockout(&repo, tid, 8);
    let mut session = start_draw_at(&repo, bracket, quiet_settings(9), None, now()).unwrap();
    auto_complete(&mut session).unwrap();

    let last = repo
        .matches_for_bracket(bracket)
        .unwrap()
        .into_iter()
        .filter(|m| m.round == 1)
        .last()
        .unwrap();
    let intruder = Uuid::new_v4();
    repo.fill_slot(last.id, Side::B, intruder).unwrap();

    let result = commit_draw(&repo, &mut session);
    assert!(matches!(
        result,
        Err(BracketError::SlotTaken { match_id, side: Side::B }) if match_id == last.id
    ));
    assert_eq!(session.status, SessionStatus::Active);
    let pairs = round_one_pairs(&repo, bracket);
    assert!(pairs[..3].iter().all(|p| *p == (None, None)));
    assert_eq!(pairs[3], (None, Some(intruder)));
}

#[test]
fn unknown_pool_entrant_is_rejected() {
    let (repo, tid, mut ids) = repo_with_rated(&RATINGS);
    let bracket = open_knockout(&repo, tid, 8);
    let stranger = Uuid::new_v4();
    ids[7] = stranger;
    let result = start_draw_at(&repo, bracket, quiet_settings(1), Some(ids), now());
    assert!(matches!(result, Err(BracketError::RegistrationNotFound(id)) if id == stranger));
}

#[test]
fn pool_must_fit_the_open_slots() {
    let (repo, tid, ids) = repo_with_rated(&RATINGS);
    let bracket = open_knockout(&repo, tid, 8);
    let result = start_draw_at(&repo, bracket, quiet_settings(1), Some(ids[..6].to_vec()), now());
    assert!(matches!(
        result,
        Err(BracketError::PoolMismatch { pool: 6, open_slots: 8 })
    ));
}
