//! Storage seam: the repository interface the core runs against, plus an in-memory store.

use crate::models::{
    Bracket, BracketError, BracketId, BracketMatch, MatchId, Registration, RegistrationId,
    SeedKey, Side, TournamentId,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Outcome of a conditional slot write.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SlotFill {
    /// Slot was empty and now holds the entrant.
    Filled,
    /// Slot already held this entrant.
    Unchanged,
    /// Slot holds a different entrant; nothing was written.
    Conflict(RegistrationId),
}

/// One entrant to write into an empty match side.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PairFill {
    pub match_id: MatchId,
    pub side: Side,
    pub entrant: RegistrationId,
}

/// Everything a draw commit writes, applied as one unit.
///
/// `fills` only land in empty sides (or sides already holding the same entrant); any
/// other holder rejects the whole batch.
#[derive(Clone, Debug, Default)]
pub struct WriteBatch {
    pub brackets: Vec<Bracket>,
    pub inserts: Vec<BracketMatch>,
    pub fills: Vec<PairFill>,
}

/// Abstract store for brackets, matches and the entrant data the draw needs.
///
/// All calls are synchronous. Implementations must make `update_match` atomic per
/// match so concurrent propagation into disjoint slots needs no extra locking.
pub trait BracketRepository: Send + Sync {
    fn registrations(&self, tournament_id: TournamentId) -> Result<Vec<Registration>, BracketError>;

    fn registrations_by_ids(&self, ids: &[RegistrationId]) -> Result<Vec<Registration>, BracketError>;

    fn paid_entrant_count(&self, tournament_id: TournamentId) -> Result<usize, BracketError>;

    /// External rating (0..10 scale) for an entrant, if the rating service knows it.
    fn rating(&self, id: RegistrationId) -> Result<Option<f64>, BracketError>;

    /// Finished matches involving any of `ids`, optionally only those finished at or after `since`.
    fn match_history(
        &self,
        ids: &[RegistrationId],
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<BracketMatch>, BracketError>;

    fn create_bracket(&self, bracket: Bracket) -> Result<(), BracketError>;

    fn bracket(&self, id: BracketId) -> Result<Bracket, BracketError>;

    /// Brackets of a tournament ordered by (stage, order).
    fn brackets_for_tournament(&self, tournament_id: TournamentId) -> Result<Vec<Bracket>, BracketError>;

    fn save_bracket(&self, bracket: Bracket) -> Result<(), BracketError>;

    fn insert_matches(&self, matches: Vec<BracketMatch>) -> Result<(), BracketError>;

    fn get_match(&self, id: MatchId) -> Result<BracketMatch, BracketError>;

    /// Matches of a bracket ordered by (round, order).
    fn matches_for_bracket(&self, bracket_id: BracketId) -> Result<Vec<BracketMatch>, BracketError>;

    fn matches_for_tournament(&self, tournament_id: TournamentId) -> Result<Vec<BracketMatch>, BracketError>;

    /// Apply `apply` to the stored match under the store's lock. `apply` returns whether it
    /// changed anything; the result is passed through.
    fn update_match(
        &self,
        id: MatchId,
        apply: &mut dyn FnMut(&mut BracketMatch) -> bool,
    ) -> Result<bool, BracketError>;

    /// Apply a batch of bracket/match writes all-or-nothing.
    fn write_batch(&self, batch: WriteBatch) -> Result<(), BracketError>;

    /// Matches of a tournament with a seed waiting on `key`.
    fn find_matches_referencing(
        &self,
        tournament_id: TournamentId,
        key: &SeedKey,
    ) -> Result<Vec<BracketMatch>, BracketError> {
        Ok(self
            .matches_for_tournament(tournament_id)?
            .into_iter()
            .filter(|m| {
                [Side::A, Side::B].iter().any(|&side| {
                    m.seed(side)
                        .and_then(|s| s.key())
                        .map_or(false, |k| seed_key_matches(&k, key))
                })
            })
            .collect())
    }

    /// Write `entrant` into `side` of a match only if that side is empty.
    fn fill_slot(
        &self,
        match_id: MatchId,
        side: Side,
        entrant: RegistrationId,
    ) -> Result<SlotFill, BracketError> {
        let mut outcome = SlotFill::Unchanged;
        self.update_match(match_id, &mut |m| {
            let slot = m.pair_mut(side);
            outcome = match *slot {
                None => {
                    *slot = Some(entrant);
                    SlotFill::Filled
                }
                Some(cur) if cur == entrant => SlotFill::Unchanged,
                Some(cur) => SlotFill::Conflict(cur),
            };
            outcome == SlotFill::Filled
        })?;
        Ok(outcome)
    }
}

fn seed_key_matches(seed: &SeedKey, wanted: &SeedKey) -> bool {
    use crate::models::normalize_group_token;
    match (seed, wanted) {
        (SeedKey::StageMatch(a), SeedKey::StageMatch(b)) => a == b,
        (
            SeedKey::Group { stage: sa, group_code: ga },
            SeedKey::Group { stage: sb, group_code: gb },
        ) => sa == sb && normalize_group_token(ga) == normalize_group_token(gb),
        _ => false,
    }
}

#[derive(Default)]
struct Store {
    registrations: Vec<Registration>,
    ratings: HashMap<RegistrationId, f64>,
    brackets: HashMap<BracketId, Bracket>,
    matches: HashMap<MatchId, BracketMatch>,
}

/// Process-local repository. Also used by tests.
#[derive(Default)]
pub struct MemoryRepository {
    inner: RwLock<Store>,
}

/// One row of a registrations CSV file.
#[derive(Debug, Deserialize)]
struct RegistrationRow {
    tournament_id: TournamentId,
    name: String,
    rating: Option<f64>,
    seed: Option<u32>,
    #[serde(default = "default_paid")]
    paid: bool,
}

fn default_paid() -> bool {
    true
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Store>, BracketError> {
        self.inner
            .read()
            .map_err(|_| BracketError::Storage("lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Store>, BracketError> {
        self.inner
            .write()
            .map_err(|_| BracketError::Storage("lock poisoned".to_string()))
    }

    pub fn add_registration(&self, registration: Registration) -> Result<(), BracketError> {
        self.write()?.registrations.push(registration);
        Ok(())
    }

    pub fn set_rating(&self, id: RegistrationId, rating: f64) -> Result<(), BracketError> {
        self.write()?.ratings.insert(id, rating);
        Ok(())
    }

    /// Overwrite a stored match (test setup, result import).
    pub fn put_match(&self, m: BracketMatch) -> Result<(), BracketError> {
        self.write()?.matches.insert(m.id, m);
        Ok(())
    }

    /// Import registrations from CSV with header `tournament_id,name,rating,seed,paid`.
    /// Returns how many rows were added.
    pub fn load_registrations_csv<R: std::io::Read>(&self, reader: R) -> Result<usize, BracketError> {
        let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
        let mut rows = Vec::new();
        for row in rdr.deserialize::<RegistrationRow>() {
            let row = row.map_err(|e| BracketError::Storage(e.to_string()))?;
            let mut reg = Registration::new(row.tournament_id, row.name);
            reg.rating = row.rating;
            reg.seed = row.seed;
            reg.paid = row.paid;
            rows.push(reg);
        }
        let added = rows.len();
        self.write()?.registrations.extend(rows);
        Ok(added)
    }
}

impl BracketRepository for MemoryRepository {
    fn registrations(&self, tournament_id: TournamentId) -> Result<Vec<Registration>, BracketError> {
        Ok(self
            .read()?
            .registrations
            .iter()
            .filter(|r| r.tournament_id == tournament_id)
            .cloned()
            .collect())
    }

    fn registrations_by_ids(&self, ids: &[RegistrationId]) -> Result<Vec<Registration>, BracketError> {
        let store = self.read()?;
        Ok(ids
            .iter()
            .filter_map(|id| store.registrations.iter().find(|r| r.id == *id).cloned())
            .collect())
    }

    fn paid_entrant_count(&self, tournament_id: TournamentId) -> Result<usize, BracketError> {
        Ok(self
            .read()?
            .registrations
            .iter()
            .filter(|r| r.tournament_id == tournament_id && r.paid)
            .count())
    }

    fn rating(&self, id: RegistrationId) -> Result<Option<f64>, BracketError> {
        Ok(self.read()?.ratings.get(&id).copied())
    }

    fn match_history(
        &self,
        ids: &[RegistrationId],
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<BracketMatch>, BracketError> {
        let store = self.read()?;
        let mut out: Vec<BracketMatch> = store
            .matches
            .values()
            .filter(|m| m.is_finished() && ids.iter().any(|id| m.involves(*id)))
            .filter(|m| match (since, m.finished_at) {
                (Some(since), Some(at)) => at >= since,
                (Some(_), None) => false,
                (None, _) => true,
            })
            .cloned()
            .collect();
        out.sort_by_key(|m| (m.finished_at, m.id));
        Ok(out)
    }

    fn create_bracket(&self, bracket: Bracket) -> Result<(), BracketError> {
        self.write()?.brackets.insert(bracket.id, bracket);
        Ok(())
    }

    fn bracket(&self, id: BracketId) -> Result<Bracket, BracketError> {
        self.read()?
            .brackets
            .get(&id)
            .cloned()
            .ok_or(BracketError::BracketNotFound(id))
    }

    fn brackets_for_tournament(&self, tournament_id: TournamentId) -> Result<Vec<Bracket>, BracketError> {
        let mut out: Vec<Bracket> = self
            .read()?
            .brackets
            .values()
            .filter(|b| b.tournament_id == tournament_id)
            .cloned()
            .collect();
        out.sort_by_key(|b| (b.stage, b.order, b.id));
        Ok(out)
    }

    fn save_bracket(&self, bracket: Bracket) -> Result<(), BracketError> {
        let mut store = self.write()?;
        if !store.brackets.contains_key(&bracket.id) {
            return Err(BracketError::BracketNotFound(bracket.id));
        }
        store.brackets.insert(bracket.id, bracket);
        Ok(())
    }

    fn insert_matches(&self, matches: Vec<BracketMatch>) -> Result<(), BracketError> {
        let mut store = self.write()?;
        for m in matches {
            store.matches.insert(m.id, m);
        }
        Ok(())
    }

    fn get_match(&self, id: MatchId) -> Result<BracketMatch, BracketError> {
        self.read()?
            .matches
            .get(&id)
            .cloned()
            .ok_or(BracketError::MatchNotFound(id))
    }

    fn matches_for_bracket(&self, bracket_id: BracketId) -> Result<Vec<BracketMatch>, BracketError> {
        let mut out: Vec<BracketMatch> = self
            .read()?
            .matches
            .values()
            .filter(|m| m.bracket_id == bracket_id)
            .cloned()
            .collect();
        out.sort_by_key(|m| (m.round, m.order));
        Ok(out)
    }

    fn matches_for_tournament(&self, tournament_id: TournamentId) -> Result<Vec<BracketMatch>, BracketError> {
        let mut out: Vec<BracketMatch> = self
            .read()?
            .matches
            .values()
            .filter(|m| m.tournament_id == tournament_id)
            .cloned()
            .collect();
        out.sort_by_key(|m| (m.stage, m.round, m.order, m.id));
        Ok(out)
    }

    fn update_match(
        &self,
        id: MatchId,
        apply: &mut dyn FnMut(&mut BracketMatch) -> bool,
    ) -> Result<bool, BracketError> {
        let mut store = self.write()?;
        let m = store
            .matches
            .get_mut(&id)
            .ok_or(BracketError::MatchNotFound(id))?;
        Ok(apply(m))
    }

    fn write_batch(&self, batch: WriteBatch) -> Result<(), BracketError> {
        let mut store = self.write()?;
        // Validate everything before touching the store.
        if let Some(b) = batch.brackets.iter().find(|b| !store.brackets.contains_key(&b.id)) {
            return Err(BracketError::BracketNotFound(b.id));
        }
        for fill in &batch.fills {
            let m = store
                .matches
                .get(&fill.match_id)
                .ok_or(BracketError::MatchNotFound(fill.match_id))?;
            if m.pair(fill.side).map_or(false, |held| held != fill.entrant) {
                return Err(BracketError::SlotTaken {
                    match_id: fill.match_id,
                    side: fill.side,
                });
            }
        }
        for b in batch.brackets {
            store.brackets.insert(b.id, b);
        }
        for m in batch.inserts {
            store.matches.insert(m.id, m);
        }
        for fill in batch.fills {
            if let Some(m) = store.matches.get_mut(&fill.match_id) {
                *m.pair_mut(fill.side) = Some(fill.entrant);
            }
        }
        Ok(())
    }
}

