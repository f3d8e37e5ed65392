//! Integration tests for skill estimation and the rematch window.

use bracket_draw_web::{
    compute_skill_map, estimate_skills, recent_opponents, BracketMatch, GameScore, MatchStatus,
    MemoryRepository, Registration, Side,
};
use chrono::{Duration, Utc};
use std::collections::HashMap;
use uuid::Uuid;

fn finished(a: Uuid, b: Uuid, winner: Side, scores: &[(u32, u32)], days_ago: i64) -> BracketMatch {
    let mut m = BracketMatch::new(Uuid::new_v4(), Uuid::new_v4(), 1, 1, 0);
    m.pair_a = Some(a);
    m.pair_b = Some(b);
    m.status = MatchStatus::Finished;
    m.winner = Some(winner);
    m.game_scores = scores.iter().map(|&(a, b)| GameScore { a, b }).collect();
    m.finished_at = Some(Utc::now() - Duration::days(days_ago));
    m
}

#[test]
fn unknown_entrant_is_neutral() {
    let id = Uuid::new_v4();
    let map = compute_skill_map(&[id], &HashMap::new(), &[], Utc::now());
    let rec = &map[&id];
    assert_eq!(rec.skill, 0.5);
    assert_eq!(rec.matches, 0);
}

#[test]
fn rating_without_history_carries_the_full_confidence_penalty() {
    let id = Uuid::new_v4();
    let ratings = HashMap::from([(id, 1.0)]);
    let map = compute_skill_map(&[id], &ratings, &[], Utc::now());
    assert!((map[&id].skill - 0.61).abs() < 1e-9);
}

#[test]
fn winner_ends_up_stronger_than_loser() {
    let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
    let history = vec![finished(a, b, Side::A, &[(11, 5), (11, 7)], 3)];
    let since = Utc::now() - Duration::days(30);
    let map = compute_skill_map(&[a, b], &HashMap::new(), &history, since);

    assert!(map[&a].skill > map[&b].skill);
    assert_eq!(map[&a].set_win_pct, 1.0);
    assert_eq!(map[&a].point_margin, 10.0);
    assert_eq!(map[&b].point_margin, -10.0);
    assert_eq!(map[&a].recent_form, 1.0);
    assert_eq!(map[&b].recent_form, 0.0);
}

#[test]
fn estimate_reads_ratings_seeds_and_history_from_the_store() {
    let repo = MemoryRepository::new();
    let tid = Uuid::new_v4();
    let strong = Registration::new(tid, "Strong").with_rating(9.0).with_seed(1);
    let weak = Registration::new(tid, "Weak").with_rating(3.0);
    let (s, w) = (strong.id, weak.id);
    repo.add_registration(strong).unwrap();
    repo.add_registration(weak).unwrap();
    repo.put_match(finished(s, w, Side::A, &[(11, 2)], 200)).unwrap();

    let map = estimate_skills(&repo, &[s, w], 120, Utc::now()).unwrap();
    assert!(map[&s].skill > map[&w].skill);
    assert_eq!(map[&s].meta.seed, Some(1));
    assert_eq!(map[&w].meta.seed, None);
    assert_eq!(map[&s].matches, 1);
    // Outside the recent window, so form stays neutral.
    assert_eq!(map[&s].recent_form, 0.5);
}

#[test]
fn recent_opponents_respects_the_window() {
    let repo = MemoryRepository::new();
    let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
    repo.put_match(finished(a, b, Side::A, &[(11, 9)], 10)).unwrap();
    repo.put_match(finished(a, c, Side::B, &[(4, 11)], 400)).unwrap();

    let since = Utc::now() - Duration::days(90);
    let map = recent_opponents(&repo, &[a], since).unwrap();
    assert!(map[&a].contains(&b));
    assert!(!map[&a].contains(&c));
    assert!(map[&b].contains(&a));
}
