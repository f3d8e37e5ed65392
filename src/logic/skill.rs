//! Skill estimation: one normalised strength score per entrant from rating and match history.

use crate::models::{BracketError, BracketMatch, Registration, RegistrationId, SkillMeta, SkillRecord};
use crate::repository::BracketRepository;
use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, HashSet};

/// Matches after which history counts as fully reliable.
const VOLUME_SATURATION: f64 = 20.0;
/// Point margin per match that maps to the ends of the [0, 1] scale.
const MARGIN_SPAN: f64 = 20.0;

fn clamp01(x: f64) -> f64 {
    x.clamp(0.0, 1.0)
}

fn round3(x: f64) -> f64 {
    (x * 1000.0).round() / 1000.0
}

/// Ratings live on a 0..10 scale.
fn normalize_rating(rating: f64) -> f64 {
    clamp01(rating / 10.0)
}

#[derive(Default)]
struct HistoryStats {
    matches: u32,
    sets_won: u32,
    sets_lost: u32,
    points_for: u32,
    points_against: u32,
    recent_won: u32,
    recent_played: u32,
    opponents: HashSet<RegistrationId>,
}

impl HistoryStats {
    fn record(&mut self, opponent: RegistrationId, sets: (u32, u32), points: (u32, u32), recent: bool) {
        self.matches += 1;
        self.sets_won += sets.0;
        self.sets_lost += sets.1;
        self.points_for += points.0;
        self.points_against += points.1;
        if recent {
            self.recent_played += 1;
            if sets.0 > sets.1 {
                self.recent_won += 1;
            }
        }
        self.opponents.insert(opponent);
    }
}

/// Blend rating and history into skill records.
///
/// `ratings` holds normalised base ratings (0..1) for entrants that have one; entrants with
/// neither a rating nor any finished match get the neutral record. Matches finished at or
/// after `recent_since` feed the recent-form component.
pub fn compute_skill_map(
    ids: &[RegistrationId],
    ratings: &HashMap<RegistrationId, f64>,
    history: &[BracketMatch],
    recent_since: DateTime<Utc>,
) -> HashMap<RegistrationId, SkillRecord> {
    let wanted: HashSet<RegistrationId> = ids.iter().copied().collect();
    let mut stats: HashMap<RegistrationId, HistoryStats> = HashMap::new();

    for m in history.iter().filter(|m| m.is_finished()) {
        let (Some(a), Some(b)) = (m.pair_a, m.pair_b) else {
            continue;
        };
        let (set_a, set_b) = m.sets();
        let (pts_a, pts_b) = m.points();
        let recent = m.finished_at.map_or(false, |at| at >= recent_since);
        if wanted.contains(&a) {
            stats
                .entry(a)
                .or_default()
                .record(b, (set_a, set_b), (pts_a, pts_b), recent);
        }
        if wanted.contains(&b) {
            stats
                .entry(b)
                .or_default()
                .record(a, (set_b, set_a), (pts_b, pts_a), recent);
        }
    }

    let mut map = HashMap::with_capacity(ids.len());
    for &id in ids {
        let stat = stats.remove(&id).unwrap_or_default();
        let base = ratings.get(&id).copied();
        if base.is_none() && stat.matches == 0 {
            map.insert(id, SkillRecord::neutral(id));
            continue;
        }
        let base = base.unwrap_or(0.5);

        let set_total = stat.sets_won + stat.sets_lost;
        let set_win_pct = if set_total > 0 {
            f64::from(stat.sets_won) / f64::from(set_total)
        } else {
            0.5
        };

        let point_margin = if stat.matches > 0 {
            (f64::from(stat.points_for) - f64::from(stat.points_against)) / f64::from(stat.matches)
        } else {
            0.0
        };
        let margin_norm = clamp01(0.5 + point_margin / MARGIN_SPAN);

        let strength_of_schedule = if stat.opponents.is_empty() {
            0.5
        } else {
            let sum: f64 = stat
                .opponents
                .iter()
                .map(|o| ratings.get(o).copied().unwrap_or(0.5))
                .sum();
            clamp01(sum / stat.opponents.len() as f64)
        };

        let recent_form = if stat.recent_played > 0 {
            f64::from(stat.recent_won) / f64::from(stat.recent_played)
        } else {
            0.5
        };

        let volume_bonus = (f64::from(stat.matches) / VOLUME_SATURATION).min(1.0);
        let uncertainty = 1.0 - volume_bonus;

        let blended = 0.45 * clamp01(base)
            + 0.20 * clamp01(set_win_pct)
            + 0.15 * margin_norm
            + 0.10 * strength_of_schedule
            + 0.07 * clamp01(recent_form)
            + 0.03 * volume_bonus;
        // Flat confidence penalty for thin history.
        let skill = blended - 0.10 * uncertainty;

        map.insert(
            id,
            SkillRecord {
                id,
                skill: round3(clamp01(skill)),
                matches: stat.matches,
                set_win_pct: round3(set_win_pct),
                point_margin: round3(point_margin),
                recent_form: round3(recent_form),
                meta: SkillMeta::default(),
            },
        );
    }
    map
}

fn base_ratings<R: BracketRepository + ?Sized>(
    repo: &R,
    registrations: &[Registration],
) -> Result<HashMap<RegistrationId, f64>, BracketError> {
    let mut out = HashMap::new();
    for reg in registrations {
        let rating = match repo.rating(reg.id)? {
            Some(r) => Some(r),
            None => reg.rating,
        };
        if let Some(r) = rating {
            out.insert(reg.id, normalize_rating(r));
        }
    }
    Ok(out)
}

/// Skill records for `ids` from the repository's ratings and history.
///
/// Explicit seeds and ranks on the registrations are copied into each record's meta.
pub fn estimate_skills<R: BracketRepository + ?Sized>(
    repo: &R,
    ids: &[RegistrationId],
    recent_days: u32,
    now: DateTime<Utc>,
) -> Result<HashMap<RegistrationId, SkillRecord>, BracketError> {
    if ids.is_empty() {
        return Ok(HashMap::new());
    }
    let registrations = repo.registrations_by_ids(ids)?;
    let mut ratings = base_ratings(repo, &registrations)?;
    let history = repo.match_history(ids, None)?;

    // Opponents' base ratings feed strength of schedule.
    let known: HashSet<RegistrationId> = ratings.keys().copied().collect();
    let opponent_ids: Vec<RegistrationId> = history
        .iter()
        .flat_map(|m| [m.pair_a, m.pair_b])
        .flatten()
        .filter(|id| !known.contains(id))
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();
    if !opponent_ids.is_empty() {
        let opponents = repo.registrations_by_ids(&opponent_ids)?;
        ratings.extend(base_ratings(repo, &opponents)?);
    }

    let recent_since = now - Duration::days(i64::from(recent_days.max(1)));
    let mut map = compute_skill_map(ids, &ratings, &history, recent_since);
    for reg in &registrations {
        if let Some(rec) = map.get_mut(&reg.id) {
            rec.meta.seed = reg.seed;
            rec.meta.rank = reg.rank;
        }
    }
    log::debug!("Estimated skill for {} entrant(s)", map.len());
    Ok(map)
}

/// Opponents each entrant met in matches finished since `since`.
pub fn recent_opponents<R: BracketRepository + ?Sized>(
    repo: &R,
    ids: &[RegistrationId],
    since: DateTime<Utc>,
) -> Result<HashMap<RegistrationId, HashSet<RegistrationId>>, BracketError> {
    let mut map: HashMap<RegistrationId, HashSet<RegistrationId>> = HashMap::new();
    for m in repo.match_history(ids, Some(since))? {
        if let (Some(a), Some(b)) = (m.pair_a, m.pair_b) {
            map.entry(a).or_default().insert(b);
            map.entry(b).or_default().insert(a);
        }
    }
    Ok(map)
}
