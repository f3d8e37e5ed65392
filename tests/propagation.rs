//! Integration tests for seed resolution and result propagation.

use bracket_draw_web::{
    build_group, build_knockout, on_match_finished, record_result, reset_chain_from,
    BracketError, BracketMatch, BracketRepository, BuiltBracket, FirstRoundSeed, GameScore,
    GroupFeed, GroupOptions, KnockoutOptions, MatchStatus, MemoryRepository, RegistrationId,
    SeedReference, Side, TournamentId,
};
use uuid::Uuid;

fn ids(n: usize) -> Vec<RegistrationId> {
    (0..n).map(|_| Uuid::new_v4()).collect()
}

fn knockout(repo: &MemoryRepository, tid: TournamentId, entrants: &[RegistrationId]) -> BuiltBracket {
    build_knockout(repo, tid, KnockoutOptions::new(entrants.len()).with_entrants(entrants)).unwrap()
}

fn fetch(repo: &MemoryRepository, m: &BracketMatch) -> BracketMatch {
    repo.get_match(m.id).unwrap()
}

fn second_stage(repo: &MemoryRepository, tid: TournamentId, a: SeedReference, b: SeedReference) -> BracketMatch {
    let mut options = KnockoutOptions::new(2);
    options.stage = 2;
    options.seeds = vec![FirstRoundSeed {
        pair: 1,
        a: Some(a),
        b: Some(b),
    }];
    build_knockout(repo, tid, options).unwrap().round(1)[0].clone()
}

#[test]
fn winner_moves_to_parent_slot() {
    let repo = MemoryRepository::new();
    let entrants = ids(4);
    let built = knockout(&repo, Uuid::new_v4(), &entrants);
    let r1 = built.round(1);
    let fin = &built.round(2)[0];

    let report = record_result(&repo, r1[1].id, Side::B, Vec::new()).unwrap();
    assert_eq!(report.updated_slots, 1);
    let f = fetch(&repo, fin);
    assert_eq!(f.pair_a, None);
    assert_eq!(f.pair_b, r1[1].pair_b);
}

#[test]
fn repeated_finish_is_idempotent() {
    let repo = MemoryRepository::new();
    let entrants = ids(4);
    let built = knockout(&repo, Uuid::new_v4(), &entrants);
    let r1 = built.round(1);
    record_result(&repo, r1[0].id, Side::A, Vec::new()).unwrap();
    let after_once = repo.matches_for_bracket(built.bracket.id).unwrap();

    let again = on_match_finished(&repo, r1[0].id).unwrap();
    assert_eq!(again.updated_slots, 0);
    assert_eq!(again.conflicts, 0);
    assert_eq!(repo.matches_for_bracket(built.bracket.id).unwrap(), after_once);

    // Recording the same winner again is accepted and changes nothing.
    let same = record_result(&repo, r1[0].id, Side::A, Vec::new()).unwrap();
    assert_eq!(same.updated_slots, 0);
}

#[test]
fn stage_winner_reference_fills_exact_matches_only() {
    let repo = MemoryRepository::new();
    let tid = Uuid::new_v4();
    let entrants = ids(8);
    let first = knockout(&repo, tid, &entrants);

    let waits_on_target = second_stage(&repo, tid, SeedReference::winner_of(1, 2, 0), SeedReference::bye());
    let waits_elsewhere = second_stage(&repo, tid, SeedReference::winner_of(1, 2, 1), SeedReference::bye());

    for m in first.round(1)[..2].iter() {
        record_result(&repo, m.id, Side::A, Vec::new()).unwrap();
    }
    let semi = fetch(&repo, &first.round(2)[0]);
    record_result(&repo, semi.id, Side::A, Vec::new()).unwrap();

    let target = fetch(&repo, &waits_on_target);
    assert_eq!(target.pair_a, semi.pair_a);
    // The bye on the other side lets the entrant advance.
    assert_eq!(target.status, MatchStatus::Finished);
    assert_eq!(target.winner, Some(Side::A));

    let other = fetch(&repo, &waits_elsewhere);
    assert_eq!(other.pair_a, None);
    assert_eq!(other.status, MatchStatus::Scheduled);
}

#[test]
fn conflicting_fill_is_skipped_and_counted() {
    let repo = MemoryRepository::new();
    let entrants = ids(4);
    let built = knockout(&repo, Uuid::new_v4(), &entrants);
    let r1 = built.round(1);
    let intruder = Uuid::new_v4();

    let mut fin = fetch(&repo, &built.round(2)[0]);
    fin.pair_a = Some(intruder);
    repo.put_match(fin.clone()).unwrap();

    let report = record_result(&repo, r1[0].id, Side::A, Vec::new()).unwrap();
    assert_eq!(report.conflicts, 1);
    assert_eq!(report.updated_slots, 0);
    assert_eq!(fetch(&repo, &fin).pair_a, Some(intruder));

    // The cascade carries on for unaffected slots.
    record_result(&repo, r1[1].id, Side::A, Vec::new()).unwrap();
    assert_eq!(fetch(&repo, &fin).pair_b, r1[1].pair_a);
}

#[test]
fn double_bye_finishes_without_winner_and_frees_the_rival() {
    let repo = MemoryRepository::new();
    let entrant = Uuid::new_v4();
    let mut options = KnockoutOptions::new(4);
    options.seeds = vec![FirstRoundSeed {
        pair: 1,
        a: Some(SeedReference::registration(entrant, "Seed 1")),
        b: None,
    }];
    let built = build_knockout(&repo, Uuid::new_v4(), options).unwrap();

    let empty = &built.round(1)[1];
    assert_eq!(empty.status, MatchStatus::Finished);
    assert_eq!(empty.winner, None);

    let fin = &built.round(2)[0];
    assert_eq!(fin.pair_a, Some(entrant));
    assert_eq!(fin.status, MatchStatus::Finished);
    assert_eq!(fin.winner, Some(Side::A));
}

#[test]
fn loser_of_a_bye_match_is_a_bye() {
    let repo = MemoryRepository::new();
    let tid = Uuid::new_v4();
    let entrants = ids(3);
    let first = knockout(&repo, tid, &entrants);
    // Pair 1 is entrant 0 against a bye.
    let bye_match = &first.round(1)[0];
    assert_eq!(bye_match.status, MatchStatus::Finished);

    let consolation = second_stage(
        &repo,
        tid,
        SeedReference::loser_of(1, 1, 0),
        SeedReference::loser_of(1, 1, 1),
    );
    let c = fetch(&repo, &consolation);
    assert_eq!(c.pair_a, None);
    assert_eq!(c.status, MatchStatus::Scheduled);

    let played = &first.round(1)[1];
    record_result(&repo, played.id, Side::A, Vec::new()).unwrap();
    let c = fetch(&repo, &consolation);
    assert_eq!(c.pair_b, played.pair_b);
    assert_eq!(c.status, MatchStatus::Finished);
    assert_eq!(c.winner, Some(Side::B));
}

fn group_of_three(repo: &MemoryRepository, tid: TournamentId, feed: GroupFeed) -> BuiltBracket {
    let options = GroupOptions {
        group_sizes: vec![3],
        registrations: ids(3),
        feed,
        ..GroupOptions::default()
    };
    build_group(repo, tid, options).unwrap()
}

#[test]
fn group_rank_skips_entrants_without_matches() {
    let repo = MemoryRepository::new();
    let tid = Uuid::new_v4();
    let groups = group_of_three(&repo, tid, GroupFeed::Provisional);
    let ko = second_stage(
        &repo,
        tid,
        SeedReference::group_rank(1, "A", 1),
        SeedReference::group_rank(1, "A", 3),
    );

    let first = groups.round(1)[0].clone();
    record_result(&repo, first.id, Side::A, Vec::new()).unwrap();

    let k = fetch(&repo, &ko);
    assert_eq!(k.pair_a, first.pair_a);
    // Only two entrants have played: rank 3 stays empty.
    assert_eq!(k.pair_b, None);
    let idle = groups.bracket.groups[0]
        .registrations
        .iter()
        .find(|id| !first.involves(**id))
        .copied()
        .unwrap();
    assert_ne!(k.pair_b, Some(idle));
}

#[test]
fn group_aliases_resolve_like_codes() {
    let repo = MemoryRepository::new();
    let tid = Uuid::new_v4();
    let groups = group_of_three(&repo, tid, GroupFeed::Provisional);
    let ko = second_stage(
        &repo,
        tid,
        SeedReference::group_rank(1, "G1", 1),
        SeedReference::group_rank(1, "a", 2),
    );
    let first = groups.round(1)[0].clone();
    record_result(&repo, first.id, Side::B, vec![GameScore { a: 8, b: 11 }]).unwrap();

    let k = fetch(&repo, &ko);
    assert_eq!(k.pair_a, first.pair_b);
    assert_eq!(k.pair_b, first.pair_a);
}

#[test]
fn when_complete_feed_waits_for_the_whole_group() {
    let repo = MemoryRepository::new();
    let tid = Uuid::new_v4();
    let groups = group_of_three(&repo, tid, GroupFeed::WhenComplete);
    let ko = second_stage(
        &repo,
        tid,
        SeedReference::group_rank(1, "A", 1),
        SeedReference::group_rank(1, "A", 2),
    );
    let matches: Vec<BracketMatch> = groups.matches_by_round.values().flatten().cloned().collect();

    record_result(&repo, matches[0].id, Side::A, Vec::new()).unwrap();
    record_result(&repo, matches[1].id, Side::A, Vec::new()).unwrap();
    let k = fetch(&repo, &ko);
    assert_eq!((k.pair_a, k.pair_b), (None, None));

    record_result(&repo, matches[2].id, Side::A, Vec::new()).unwrap();
    let k = fetch(&repo, &ko);
    assert!(k.pair_a.is_some() && k.pair_b.is_some());
    assert_ne!(k.pair_a, k.pair_b);
}

#[test]
fn reset_clears_the_downstream_chain() {
    let repo = MemoryRepository::new();
    let entrants = ids(4);
    let built = knockout(&repo, Uuid::new_v4(), &entrants);
    let r1 = built.round(1);
    let fin = &built.round(2)[0];

    record_result(&repo, r1[0].id, Side::A, Vec::new()).unwrap();
    record_result(&repo, r1[1].id, Side::A, Vec::new()).unwrap();
    record_result(&repo, fin.id, Side::B, Vec::new()).unwrap();

    let touched = reset_chain_from(&repo, r1[0].id).unwrap();
    assert_eq!(touched, 2);

    let start = fetch(&repo, &r1[0]);
    assert_eq!(start.status, MatchStatus::Scheduled);
    assert!(start.pair_a.is_some() && start.pair_b.is_some());
    let f = fetch(&repo, fin);
    assert_eq!(f.pair_a, None);
    assert_eq!(f.pair_b, r1[1].pair_a);
    assert_eq!(f.status, MatchStatus::Scheduled);
    assert_eq!(f.winner, None);

    record_result(&repo, r1[0].id, Side::B, Vec::new()).unwrap();
    assert_eq!(fetch(&repo, fin).pair_a, r1[0].pair_b);
}

#[test]
fn reset_also_clears_the_third_place_match() {
    let repo = MemoryRepository::new();
    let entrants = ids(4);
    let mut options = KnockoutOptions::new(4).with_entrants(&entrants);
    options.third_place = true;
    let built = build_knockout(&repo, Uuid::new_v4(), options).unwrap();
    let semi = &built.round(1)[0];
    let fin = &built.round(2)[0];
    let third = &built.round(2)[1];
    assert_eq!(third.round_key, "3RD");

    record_result(&repo, semi.id, Side::A, Vec::new()).unwrap();
    assert_eq!(fetch(&repo, third).pair_a, semi.pair_b);

    let touched = reset_chain_from(&repo, semi.id).unwrap();
    assert_eq!(touched, 3);
    assert_eq!(fetch(&repo, third).pair_a, None);
    assert_eq!(fetch(&repo, fin).pair_a, None);

    let report = record_result(&repo, semi.id, Side::B, Vec::new()).unwrap();
    assert_eq!(report.conflicts, 0);
    assert_eq!(fetch(&repo, fin).pair_a, semi.pair_b);
    assert_eq!(fetch(&repo, third).pair_a, semi.pair_a);
}

#[test]
fn bad_results_are_rejected() {
    let repo = MemoryRepository::new();
    let entrants = ids(4);
    let built = knockout(&repo, Uuid::new_v4(), &entrants);
    let r1 = built.round(1);
    let fin = &built.round(2)[0];

    let wrong_scores = record_result(&repo, r1[0].id, Side::A, vec![GameScore { a: 3, b: 11 }]);
    assert!(matches!(wrong_scores, Err(BracketError::InvalidResult(_))));

    let empty_side = record_result(&repo, fin.id, Side::A, Vec::new());
    assert!(matches!(empty_side, Err(BracketError::InvalidResult(_))));

    record_result(&repo, r1[0].id, Side::A, Vec::new()).unwrap();
    let flipped = record_result(&repo, r1[0].id, Side::B, Vec::new());
    assert!(matches!(flipped, Err(BracketError::InvalidResult(_))));

    let missing = record_result(&repo, Uuid::new_v4(), Side::A, Vec::new());
    assert!(matches!(missing, Err(BracketError::MatchNotFound(_))));
}
