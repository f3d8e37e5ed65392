//! Typed seed references: how a match side gets its entrant before it is known.

use crate::models::registration::RegistrationId;
use serde::{Deserialize, Serialize};

/// Address of a match by stage, round and order (all as stored on the match).
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub struct StageMatchRef {
    #[serde(rename = "stageIndex")]
    pub stage: u32,
    pub round: u32,
    pub order: u32,
}

/// A finishing position inside a named group of an earlier stage.
#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub struct GroupRankRef {
    pub stage: u32,
    #[serde(rename = "groupCode")]
    pub group_code: String,
    /// 1-based rank.
    pub rank: u32,
}

/// Where a side's entrant comes from.
#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "ref", rename_all = "camelCase")]
pub enum SeedSource {
    /// No opponent; the other side advances without playing.
    Bye,
    Registration(RegistrationId),
    StageMatchWinner(StageMatchRef),
    StageMatchLoser(StageMatchRef),
    GroupRank(GroupRankRef),
}

/// A seed source plus its display label.
#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub struct SeedReference {
    pub source: SeedSource,
    #[serde(default)]
    pub label: String,
}

/// Lookup key used to find every match that depends on a given source.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum SeedKey {
    StageMatch(StageMatchRef),
    Group { stage: u32, group_code: String },
}

impl SeedReference {
    pub fn bye() -> Self {
        Self {
            source: SeedSource::Bye,
            label: "BYE".to_string(),
        }
    }

    pub fn registration(id: RegistrationId, label: impl Into<String>) -> Self {
        Self {
            source: SeedSource::Registration(id),
            label: label.into(),
        }
    }

    pub fn winner_of(stage: u32, round: u32, order: u32) -> Self {
        Self {
            source: SeedSource::StageMatchWinner(StageMatchRef {
                stage,
                round,
                order,
            }),
            label: format!("W-V{}-T{}", round, order + 1),
        }
    }

    pub fn loser_of(stage: u32, round: u32, order: u32) -> Self {
        Self {
            source: SeedSource::StageMatchLoser(StageMatchRef {
                stage,
                round,
                order,
            }),
            label: format!("L-V{}-T{}", round, order + 1),
        }
    }

    pub fn group_rank(stage: u32, group_code: impl Into<String>, rank: u32) -> Self {
        let group_code = group_code.into();
        let label = format!("{}#{}", group_code, rank);
        Self {
            source: SeedSource::GroupRank(GroupRankRef {
                stage,
                group_code,
                rank,
            }),
            label,
        }
    }

    pub fn is_bye(&self) -> bool {
        matches!(self.source, SeedSource::Bye)
    }

    /// Whether this reference may be used by a match at `stage`/`round`.
    ///
    /// Match references must point to an earlier stage, or an earlier round of the
    /// same stage. Group ranks must come from an earlier stage.
    pub fn is_upstream_of(&self, stage: u32, round: u32) -> bool {
        match &self.source {
            SeedSource::Bye | SeedSource::Registration(_) => true,
            SeedSource::StageMatchWinner(r) | SeedSource::StageMatchLoser(r) => {
                r.round >= 1 && (r.stage < stage || (r.stage == stage && r.round < round))
            }
            SeedSource::GroupRank(g) => {
                g.rank >= 1 && !g.group_code.trim().is_empty() && g.stage < stage
            }
        }
    }

    /// Key of the source this reference waits on, if it waits on anything.
    pub fn key(&self) -> Option<SeedKey> {
        match &self.source {
            SeedSource::Bye | SeedSource::Registration(_) => None,
            SeedSource::StageMatchWinner(r) | SeedSource::StageMatchLoser(r) => {
                Some(SeedKey::StageMatch(*r))
            }
            SeedSource::GroupRank(g) => Some(SeedKey::Group {
                stage: g.stage,
                group_code: g.group_code.clone(),
            }),
        }
    }
}

/// Normalise a group token: trims, upper-cases, and reduces "B2"/"G2"/"Group 2" to "2".
pub fn normalize_group_token(token: &str) -> String {
    let up = token.trim().to_uppercase();
    let digits: String = up
        .chars()
        .rev()
        .take_while(|c| c.is_ascii_digit())
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    match digits.parse::<u64>() {
        Ok(n) => n.to_string(),
        Err(_) => up,
    }
}
