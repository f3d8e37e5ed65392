//! Integration tests for knockout tree construction.

use bracket_draw_web::{
    build_knockout, spread_positions, BracketError, BracketMatch, BracketType, FirstRoundSeed,
    KnockoutOptions, MatchRules, MatchStatus, MemoryRepository, RegistrationId, SeedReference,
    Side,
};
use std::collections::HashMap;
use uuid::Uuid;

fn ids(n: usize) -> Vec<RegistrationId> {
    (0..n).map(|_| Uuid::new_v4()).collect()
}

fn all_matches(built: &bracket_draw_web::BuiltBracket) -> Vec<BracketMatch> {
    built.matches_by_round.values().flatten().cloned().collect()
}

#[test]
fn draw_size_below_two_is_rejected() {
    let repo = MemoryRepository::new();
    let result = build_knockout(&repo, Uuid::new_v4(), KnockoutOptions::new(1));
    assert!(matches!(result, Err(BracketError::InvalidDrawSize(1))));
}

#[test]
fn five_entrants_make_an_eight_slot_tree_with_three_byes() {
    let repo = MemoryRepository::new();
    let entrants = ids(5);
    let built = build_knockout(&repo, Uuid::new_v4(), KnockoutOptions::new(5).with_entrants(&entrants)).unwrap();

    assert_eq!(built.bracket.bracket_type, BracketType::Knockout);
    assert_eq!(built.bracket.meta.draw_size, 8);
    assert_eq!(built.bracket.meta.max_rounds, 3);
    assert_eq!(built.round(1).len(), 4);
    assert_eq!(built.match_count(), 7);

    let byes = built
        .round(1)
        .iter()
        .flat_map(|m| [m.seed_a.as_ref(), m.seed_b.as_ref()])
        .filter(|s| s.map_or(false, SeedReference::is_bye))
        .count();
    assert_eq!(byes, 3);
}

#[test]
fn tree_is_connected_with_one_root() {
    let repo = MemoryRepository::new();
    for n in 2..=20 {
        let built = build_knockout(&repo, Uuid::new_v4(), KnockoutOptions::new(n)).unwrap();
        let size = n.next_power_of_two();
        let matches = all_matches(&built);
        assert_eq!(matches.len(), size - 1, "n={n}");
        let by_id: HashMap<_, _> = matches.iter().map(|m| (m.id, m)).collect();

        let roots: Vec<_> = matches.iter().filter(|m| m.next_match.is_none()).collect();
        assert_eq!(roots.len(), 1, "n={n}");
        assert_eq!(roots[0].round, built.bracket.meta.max_rounds);

        for m in &matches {
            if let (Some(parent), Some(slot)) = (m.next_match, m.next_slot) {
                let p = by_id[&parent];
                assert_eq!(p.round, m.round + 1);
                assert_eq!(p.previous(slot), Some(m.id));
                assert_eq!(slot, Side::for_child_order(m.order));
            }
            for side in [Side::A, Side::B] {
                if let Some(prev) = m.previous(side) {
                    assert_eq!(by_id[&prev].next_match, Some(m.id));
                }
            }
        }
    }
}

#[test]
fn byes_auto_advance_into_round_two() {
    let repo = MemoryRepository::new();
    let entrants = ids(5);
    let built = build_knockout(&repo, Uuid::new_v4(), KnockoutOptions::new(5).with_entrants(&entrants)).unwrap();

    // Entrants 0..3 sit on A sides, entrant 4 on the B side of the last pair.
    let r1 = built.round(1);
    assert_eq!(r1[0].pair_a, Some(entrants[0]));
    assert_eq!(r1[3].pair_a, Some(entrants[3]));
    assert_eq!(r1[3].pair_b, Some(entrants[4]));
    for m in &r1[..3] {
        assert_eq!(m.status, MatchStatus::Finished);
        assert_eq!(m.winner, Some(Side::A));
    }
    assert_eq!(r1[3].status, MatchStatus::Scheduled);

    let r2 = built.round(2);
    assert_eq!(r2[0].pair_a, Some(entrants[0]));
    assert_eq!(r2[0].pair_b, Some(entrants[1]));
    assert_eq!(r2[1].pair_a, Some(entrants[2]));
    assert_eq!(r2[1].pair_b, None);
}

#[test]
fn spread_never_gives_a_double_bye() {
    for n in 2..=32usize {
        let size = n.next_power_of_two();
        let filled = spread_positions(n, size);
        for pair in 0..size / 2 {
            assert!(filled.contains(&(pair, Side::A)) || filled.contains(&(pair, Side::B)), "n={n}");
        }
    }
}

#[test]
fn seed_pointing_at_same_round_is_malformed() {
    let repo = MemoryRepository::new();
    let mut options = KnockoutOptions::new(4);
    options.seeds = vec![FirstRoundSeed {
        pair: 1,
        a: Some(SeedReference::winner_of(1, 1, 1)),
        b: None,
    }];
    let result = build_knockout(&repo, Uuid::new_v4(), options);
    assert!(matches!(
        result,
        Err(BracketError::MalformedSeed { round: 1, order: 0, side: Side::A })
    ));
}

#[test]
fn seed_from_an_earlier_stage_is_accepted() {
    let repo = MemoryRepository::new();
    let mut options = KnockoutOptions::new(2);
    options.stage = 2;
    options.seeds = vec![FirstRoundSeed {
        pair: 1,
        a: Some(SeedReference::winner_of(1, 3, 0)),
        b: Some(SeedReference::group_rank(1, "A", 1)),
    }];
    let built = build_knockout(&repo, Uuid::new_v4(), options).unwrap();
    let m = &built.round(1)[0];
    assert_eq!(m.pair_a, None);
    assert_eq!(m.pair_b, None);
    assert_eq!(m.status, MatchStatus::Scheduled);
}

#[test]
fn round_keys_and_rule_overrides() {
    let repo = MemoryRepository::new();
    let mut options = KnockoutOptions::new(8);
    options.rules = MatchRules {
        best_of: 4,
        points_to_win: 13,
        win_by_two: false,
    };
    options.semi_rules = Some(MatchRules {
        best_of: 5,
        points_to_win: 11,
        win_by_two: true,
    });
    options.final_rules = Some(MatchRules {
        best_of: 5,
        points_to_win: 21,
        win_by_two: true,
    });
    let built = build_knockout(&repo, Uuid::new_v4(), options).unwrap();

    let r1 = built.round(1);
    assert!(r1.iter().all(|m| m.round_key == "QF"));
    // Unsupported values snap back to defaults; the flag is kept.
    assert_eq!(r1[0].rules.best_of, 3);
    assert_eq!(r1[0].rules.points_to_win, 11);
    assert!(!r1[0].rules.win_by_two);

    let semis = built.round(2);
    assert!(semis.iter().all(|m| m.round_key == "SF" && m.rules.best_of == 5));
    let fin = &built.round(3)[0];
    assert_eq!(fin.round_key, "F");
    assert_eq!(fin.rules.points_to_win, 21);
}

#[test]
fn third_place_match_takes_semi_losers() {
    let repo = MemoryRepository::new();
    let mut options = KnockoutOptions::new(8);
    options.third_place = true;
    let built = build_knockout(&repo, Uuid::new_v4(), options).unwrap();

    let last = built.round(3);
    assert_eq!(last.len(), 2);
    let third = last.iter().find(|m| m.round_key == "3RD").unwrap();
    assert_eq!(third.order, 1);
    assert_eq!(third.seed_a, Some(SeedReference::loser_of(1, 2, 0)));
    assert_eq!(third.seed_b, Some(SeedReference::loser_of(1, 2, 1)));
    assert_eq!(third.next_match, None);
}

#[test]
fn seed_outside_the_first_round_is_rejected() {
    let repo = MemoryRepository::new();
    for pair in [0, 3] {
        let mut options = KnockoutOptions::new(4);
        options.seeds = vec![FirstRoundSeed {
            pair,
            a: Some(SeedReference::registration(Uuid::new_v4(), "late")),
            b: None,
        }];
        let result = build_knockout(&repo, Uuid::new_v4(), options);
        assert!(matches!(
            result,
            Err(BracketError::SeedOutOfRange { pair: p, pairs: 2 }) if p == pair
        ));
    }
}

#[test]
fn entrants_grow_an_undersized_draw() {
    let repo = MemoryRepository::new();
    let entrants = ids(5);
    let options = KnockoutOptions::new(2).with_entrants(&entrants);
    assert_eq!(options.draw_size, 5);

    let built = build_knockout(&repo, Uuid::new_v4(), options).unwrap();
    assert_eq!(built.bracket.meta.draw_size, 8);
    let placed: Vec<RegistrationId> = built
        .round(1)
        .iter()
        .flat_map(|m| [m.pair_a, m.pair_b])
        .flatten()
        .collect();
    assert_eq!(placed.len(), 5);
    assert!(entrants.iter().all(|id| placed.contains(id)));
}
