use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl Urgency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl FromStr for Urgency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            other => Err(format!("unknown urgency '{other}'")),
        }
    }
}

/// Service level targets, counted in wall-clock hours from creation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlaConfig {
    #[serde(default)]
    pub response_hours: Option<u32>,
    #[serde(default)]
    pub resolution_hours: Option<u32>,
}

impl SlaConfig {
    pub fn response_due(&self, created_at: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.response_hours
            .map(|h| created_at + Duration::hours(i64::from(h)))
    }

    pub fn resolution_due(&self, created_at: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.resolution_hours
            .map(|h| created_at + Duration::hours(i64::from(h)))
    }

    /// A demand completed after its resolution deadline stays breached.
    pub fn is_breached(
        &self,
        created_at: DateTime<Utc>,
        completed_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> bool {
        match self.resolution_due(created_at) {
            Some(due) => completed_at.unwrap_or(now) > due,
            None => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DemandBoard {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub name: String,
    pub default_column_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DemandColumn {
    pub id: Uuid,
    pub board_id: Uuid,
    pub name: String,
    pub position: i32,
    pub is_final: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Demand {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub board_id: Uuid,
    pub column_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub assignee_ids: Vec<Uuid>,
    pub urgency: Urgency,
    pub labels: Vec<String>,
    pub sla_config: Option<SlaConfig>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Demand {
    pub fn sla_breached(&self, now: DateTime<Utc>) -> bool {
        self.sla_config
            .map(|sla| sla.is_breached(self.created_at, self.completed_at, now))
            .unwrap_or(false)
    }

    /// Assignees that should hear about a change made by `actor`.
    pub fn audience(&self, actor: Uuid) -> Vec<Uuid> {
        self.assignee_ids
            .iter()
            .copied()
            .filter(|id| *id != actor)
            .collect()
    }
}

/// One column transition. Rows are never updated or deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DemandHistory {
    pub id: Uuid,
    pub demand_id: Uuid,
    pub from_column_id: Uuid,
    pub to_column_id: Uuid,
    pub moved_by: Uuid,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DemandComment {
    pub id: Uuid,
    pub demand_id: Uuid,
    pub author_id: Uuid,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Assignment,
    StatusChange,
    Comment,
    Update,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Assignment => "assignment",
            Self::StatusChange => "status_change",
            Self::Comment => "comment",
            Self::Update => "update",
        }
    }
}

impl FromStr for NotificationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "assignment" => Ok(Self::Assignment),
            "status_change" => Ok(Self::StatusChange),
            "comment" => Ok(Self::Comment),
            "update" => Ok(Self::Update),
            other => Err(format!("unknown notification kind '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DemandNotification {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub demand_id: Uuid,
    pub recipient_id: Uuid,
    pub kind: NotificationKind,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
}

impl DemandNotification {
    pub fn batch(
        demand: &Demand,
        recipients: &[Uuid],
        kind: NotificationKind,
        message: &str,
    ) -> Vec<Self> {
        let now = Utc::now();
        recipients
            .iter()
            .map(|recipient| Self {
                id: Uuid::new_v4(),
                organization_id: demand.organization_id,
                demand_id: demand.id,
                recipient_id: *recipient,
                kind,
                message: message.to_string(),
                created_at: now,
                read_at: None,
            })
            .collect()
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateDemandRequest {
    pub board_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    #[serde(default)]
    pub assignee_ids: Vec<Uuid>,
    #[serde(default)]
    pub urgency: Urgency,
    #[serde(default)]
    pub labels: Vec<String>,
    pub sla_config: Option<SlaConfig>,
    pub organization_id: Option<Uuid>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateDemandRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub urgency: Option<Urgency>,
    pub labels: Option<Vec<String>>,
    pub sla_config: Option<SlaConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MoveDemandRequest {
    pub from_column_id: Uuid,
    pub to_column_id: Uuid,
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AssignDemandRequest {
    pub assignee_ids: Vec<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct CommentRequest {
    pub body: String,
}
