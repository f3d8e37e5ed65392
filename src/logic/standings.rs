//! Group standings from finished round-robin matches.

use crate::models::{Bracket, BracketError, BracketId, BracketMatch, BracketType, RegistrationId, Side};
use crate::repository::BracketRepository;
use serde::Serialize;
use std::cmp::Reverse;
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct StandingRow {
    pub registration_id: RegistrationId,
    pub played: u32,
    pub wins: u32,
    pub losses: u32,
    pub points_for: u32,
    pub points_against: u32,
}

impl StandingRow {
    pub fn point_diff(&self) -> i64 {
        i64::from(self.points_for) - i64::from(self.points_against)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GroupStandings {
    pub group_id: Uuid,
    pub code: String,
    /// Ranked rows; entrants who have not played are absent.
    pub rows: Vec<StandingRow>,
    /// Every match of the group is finished.
    pub complete: bool,
}

impl GroupStandings {
    /// Entrant at 1-based `rank`, if someone who has played holds it.
    pub fn at_rank(&self, rank: u32) -> Option<RegistrationId> {
        if rank == 0 {
            return None;
        }
        self.rows.get((rank - 1) as usize).map(|r| r.registration_id)
    }
}

/// Rank the entrants of finished matches: wins, point difference, points for, then id.
pub fn rank_entrants<'a>(matches: impl IntoIterator<Item = &'a BracketMatch>) -> Vec<StandingRow> {
    let mut table: HashMap<RegistrationId, StandingRow> = HashMap::new();
    for m in matches.into_iter().filter(|m| m.is_finished()) {
        let (Some(a), Some(b)) = (m.pair_a, m.pair_b) else {
            continue;
        };
        let (pts_a, pts_b) = m.points();
        for (id, side, pf, pa) in [(a, Side::A, pts_a, pts_b), (b, Side::B, pts_b, pts_a)] {
            let row = table.entry(id).or_insert_with(|| StandingRow {
                registration_id: id,
                ..StandingRow::default()
            });
            row.played += 1;
            row.points_for += pf;
            row.points_against += pa;
            match m.winner {
                Some(w) if w == side => row.wins += 1,
                Some(_) => row.losses += 1,
                None => {}
            }
        }
    }
    let mut rows: Vec<StandingRow> = table.into_values().collect();
    rows.sort_by_key(|r| {
        (
            Reverse(r.wins),
            Reverse(r.point_diff()),
            Reverse(r.points_for),
            r.registration_id,
        )
    });
    rows
}

/// Standings of group `index` given all matches of its bracket.
pub fn standings_for_group(bracket: &Bracket, matches: &[BracketMatch], index: usize) -> Option<GroupStandings> {
    let group = bracket.groups.get(index)?;
    let in_group: Vec<&BracketMatch> = matches
        .iter()
        .filter(|m| m.pool.as_ref().map_or(false, |p| p.id == group.id))
        .collect();
    let complete = !in_group.is_empty() && in_group.iter().all(|m| m.is_finished());
    Some(GroupStandings {
        group_id: group.id,
        code: group.name.clone(),
        rows: rank_entrants(in_group),
        complete,
    })
}

/// Standings for every group of a group bracket.
pub fn group_standings<R: BracketRepository + ?Sized>(
    repo: &R,
    bracket_id: BracketId,
) -> Result<Vec<GroupStandings>, BracketError> {
    let bracket = repo.bracket(bracket_id)?;
    if bracket.bracket_type != BracketType::Group {
        return Err(BracketError::WrongBracketType);
    }
    let matches = repo.matches_for_bracket(bracket_id)?;
    Ok((0..bracket.groups.len())
        .filter_map(|i| standings_for_group(&bracket, &matches, i))
        .collect())
}
