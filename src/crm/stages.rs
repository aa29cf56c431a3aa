//! Funnel board construction.
//!
//! Tenants configure their own funnel columns (`FunnelStageCustom`), each of which
//! aliases one canonical stage. Several custom stages may alias the same canonical
//! value; only the lowest-position one is primary and receives leads.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CanonicalStage {
    New,
    Contacted,
    Qualified,
    Proposal,
    Negotiation,
    Won,
    Lost,
}

impl CanonicalStage {
    pub const ALL: [CanonicalStage; 7] = [
        Self::New,
        Self::Contacted,
        Self::Qualified,
        Self::Proposal,
        Self::Negotiation,
        Self::Won,
        Self::Lost,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Contacted => "contacted",
            Self::Qualified => "qualified",
            Self::Proposal => "proposal",
            Self::Negotiation => "negotiation",
            Self::Won => "won",
            Self::Lost => "lost",
        }
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Won | Self::Lost)
    }
}

impl FromStr for CanonicalStage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|stage| stage.as_str() == s)
            .ok_or_else(|| format!("unknown funnel stage '{s}'"))
    }
}

impl std::fmt::Display for CanonicalStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunnelStageCustom {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub position: i32,
    pub enum_value: CanonicalStage,
    pub name: String,
    pub is_active: bool,
}

/// Anything that sits in a funnel column.
pub trait Staged {
    fn stage(&self) -> CanonicalStage;
}

/// Canonical stage -> the single custom stage representing it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrimaryStageMap {
    by_stage: HashMap<CanonicalStage, Uuid>,
    ordered: Vec<Uuid>,
}

impl PrimaryStageMap {
    pub fn build(stages: &[FunnelStageCustom]) -> Self {
        let mut sorted: Vec<&FunnelStageCustom> = stages.iter().filter(|s| s.is_active).collect();
        // stable: equal positions keep input order
        sorted.sort_by_key(|s| s.position);

        let mut map = Self::default();
        for stage in sorted {
            if !map.by_stage.contains_key(&stage.enum_value) {
                map.by_stage.insert(stage.enum_value, stage.id);
                map.ordered.push(stage.id);
            }
        }
        map
    }

    pub fn primary_for(&self, stage: CanonicalStage) -> Option<Uuid> {
        self.by_stage.get(&stage).copied()
    }

    pub fn is_primary(&self, stage_id: Uuid) -> bool {
        self.ordered.contains(&stage_id)
    }

    /// Primary stage ids in ascending position order.
    pub fn primary_ids(&self) -> &[Uuid] {
        &self.ordered
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BoardColumn<L> {
    pub stage: FunnelStageCustom,
    pub items: Vec<L>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StageBoard<L> {
    pub columns: Vec<BoardColumn<L>>,
    /// Items whose canonical stage has no configured custom stage.
    pub dropped: usize,
}

impl<L> StageBoard<L> {
    pub fn column(&self, stage_id: Uuid) -> Option<&BoardColumn<L>> {
        self.columns.iter().find(|c| c.stage.id == stage_id)
    }

    pub fn placed(&self) -> usize {
        self.columns.iter().map(|c| c.items.len()).sum()
    }
}

/// Groups items under their primary stage. Every primary stage gets a column,
/// including empty ones; items without a configured stage are dropped.
pub fn group_by_primary_stage<L: Staged>(
    stages: &[FunnelStageCustom],
    items: Vec<L>,
) -> StageBoard<L> {
    let primary = PrimaryStageMap::build(stages);
    let by_id: HashMap<Uuid, &FunnelStageCustom> = stages.iter().map(|s| (s.id, s)).collect();

    let mut grouped: HashMap<Uuid, Vec<L>> =
        primary.primary_ids().iter().map(|id| (*id, Vec::new())).collect();
    let mut dropped = 0;

    for item in items {
        match primary.primary_for(item.stage()).and_then(|id| grouped.get_mut(&id)) {
            Some(bucket) => bucket.push(item),
            None => dropped += 1,
        }
    }

    if dropped > 0 {
        log::debug!("{dropped} item(s) have no configured funnel stage and were left off the board");
    }

    let columns = primary
        .primary_ids()
        .iter()
        .filter_map(|id| {
            let stage = by_id.get(id)?;
            Some(BoardColumn {
                stage: (*stage).clone(),
                items: grouped.remove(id).unwrap_or_default(),
            })
        })
        .collect();

    StageBoard { columns, dropped }
}
