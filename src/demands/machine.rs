//! Demand lifecycle. Columns are data; a column flagged `is_final` is terminal.
//!
//! Moving between columns is the only way to change a demand's status. Every move
//! appends its own history row, so two concurrent moves both leave an audit entry
//! while the column itself ends up with whichever write landed last.

use chrono::Utc;
use uuid::Uuid;

use crate::tenancy::TenantContext;

use super::error::DemandError;
use super::notifications::NotificationDispatcher;
use super::types::*;
use super::DemandRepository;

/// Column a new demand starts in: the board default when it belongs to the board,
/// otherwise the lowest-position column.
pub fn initial_column<'a>(
    board: &DemandBoard,
    columns: &'a [DemandColumn],
) -> Option<&'a DemandColumn> {
    board
        .default_column_id
        .and_then(|id| columns.iter().find(|c| c.id == id && c.board_id == board.id))
        .or_else(|| {
            columns
                .iter()
                .filter(|c| c.board_id == board.id)
                .min_by_key(|c| c.position)
        })
}

async fn load_demand<R: DemandRepository + ?Sized>(
    repo: &R,
    ctx: &TenantContext,
    demand_id: Uuid,
) -> Result<Demand, DemandError> {
    repo.find_demand(ctx.organization_id, demand_id)
        .await?
        .ok_or(DemandError::DemandNotFound(demand_id))
}

async fn load_column<R: DemandRepository + ?Sized>(
    repo: &R,
    column_id: Uuid,
) -> Result<DemandColumn, DemandError> {
    repo.find_column(column_id)
        .await?
        .ok_or(DemandError::ColumnNotFound(column_id))
}

pub async fn create_demand<R: DemandRepository + ?Sized>(
    repo: &R,
    notifier: &NotificationDispatcher,
    ctx: &TenantContext,
    req: CreateDemandRequest,
) -> Result<Demand, DemandError> {
    ctx.ensure_write()?;
    if let Some(org) = req.organization_id {
        ctx.ensure_organization(org)?;
    }

    let title = req.title.trim();
    if title.is_empty() {
        return Err(DemandError::Validation("title is required".to_string()));
    }

    let board = repo
        .find_board(ctx.organization_id, req.board_id)
        .await?
        .ok_or(DemandError::BoardNotFound(req.board_id))?;
    let columns = repo.list_columns(board.id).await?;
    let column = initial_column(&board, &columns)
        .ok_or_else(|| DemandError::Validation(format!("board {} has no columns", board.id)))?;

    let mut assignee_ids = req.assignee_ids;
    assignee_ids.sort();
    assignee_ids.dedup();

    let now = Utc::now();
    let demand = Demand {
        id: Uuid::new_v4(),
        organization_id: ctx.organization_id,
        board_id: board.id,
        column_id: column.id,
        title: title.to_string(),
        description: req.description,
        assignee_ids,
        urgency: req.urgency,
        labels: req.labels,
        sla_config: req.sla_config,
        created_by: ctx.user_id,
        created_at: now,
        updated_at: now,
        completed_at: column.is_final.then_some(now),
    };
    repo.insert_demand(&demand).await?;
    log::info!(
        "Created demand {} on board {} in column {}",
        demand.id,
        board.id,
        column.name
    );

    let message = format!("You were assigned to '{}'", demand.title);
    notifier.dispatch(DemandNotification::batch(
        &demand,
        &demand.audience(ctx.user_id),
        NotificationKind::Assignment,
        &message,
    ));
    Ok(demand)
}

pub async fn move_demand<R: DemandRepository + ?Sized>(
    repo: &R,
    notifier: &NotificationDispatcher,
    ctx: &TenantContext,
    demand_id: Uuid,
    req: MoveDemandRequest,
) -> Result<Demand, DemandError> {
    ctx.ensure_write()?;

    let demand = load_demand(repo, ctx, demand_id).await?;
    let from = load_column(repo, req.from_column_id).await?;
    let to = load_column(repo, req.to_column_id).await?;

    if from.board_id != demand.board_id {
        return Err(DemandError::BoardMismatch {
            board: demand.board_id,
            to: from.id,
        });
    }
    if to.board_id != from.board_id {
        return Err(DemandError::BoardMismatch {
            board: from.board_id,
            to: to.id,
        });
    }
    if from.id != demand.column_id {
        log::debug!(
            "Demand {} moved from stale column {} (current {})",
            demand.id,
            from.id,
            demand.column_id
        );
    }

    let now = Utc::now();
    let completed_at = if to.is_final {
        Some(demand.completed_at.unwrap_or(now))
    } else {
        None
    };
    let entry = DemandHistory {
        id: Uuid::new_v4(),
        demand_id: demand.id,
        from_column_id: from.id,
        to_column_id: to.id,
        moved_by: ctx.user_id,
        reason: req.reason.filter(|r| !r.trim().is_empty()),
        created_at: now,
    };

    let moved = repo
        .apply_move(ctx.organization_id, &entry, completed_at)
        .await?
        .ok_or(DemandError::DemandNotFound(demand_id))?;
    log::info!(
        "Demand {} moved {} -> {} by {}",
        moved.id,
        from.name,
        to.name,
        ctx.user_id
    );

    let message = format!("'{}' moved to {}", moved.title, to.name);
    notifier.dispatch(DemandNotification::batch(
        &moved,
        &moved.audience(ctx.user_id),
        NotificationKind::StatusChange,
        &message,
    ));
    Ok(moved)
}

/// Adds assignees; existing ones are kept. Only newly added users are notified.
pub async fn assign_demand<R: DemandRepository + ?Sized>(
    repo: &R,
    notifier: &NotificationDispatcher,
    ctx: &TenantContext,
    demand_id: Uuid,
    req: AssignDemandRequest,
) -> Result<Demand, DemandError> {
    ctx.ensure_write()?;
    let mut demand = load_demand(repo, ctx, demand_id).await?;

    let mut added = Vec::new();
    for user in req.assignee_ids {
        if !demand.assignee_ids.contains(&user) {
            demand.assignee_ids.push(user);
            added.push(user);
        }
    }
    if added.is_empty() {
        return Ok(demand);
    }

    demand.updated_at = Utc::now();
    repo.save_demand(&demand).await?;

    let recipients: Vec<Uuid> = added.into_iter().filter(|u| *u != ctx.user_id).collect();
    let message = format!("You were assigned to '{}'", demand.title);
    notifier.dispatch(DemandNotification::batch(
        &demand,
        &recipients,
        NotificationKind::Assignment,
        &message,
    ));
    Ok(demand)
}

pub async fn update_demand<R: DemandRepository + ?Sized>(
    repo: &R,
    notifier: &NotificationDispatcher,
    ctx: &TenantContext,
    demand_id: Uuid,
    req: UpdateDemandRequest,
) -> Result<Demand, DemandError> {
    ctx.ensure_write()?;
    let mut demand = load_demand(repo, ctx, demand_id).await?;

    if let Some(title) = req.title {
        let title = title.trim();
        if title.is_empty() {
            return Err(DemandError::Validation("title is required".to_string()));
        }
        demand.title = title.to_string();
    }
    if let Some(description) = req.description {
        demand.description = Some(description).filter(|d| !d.trim().is_empty());
    }
    if let Some(urgency) = req.urgency {
        demand.urgency = urgency;
    }
    if let Some(labels) = req.labels {
        demand.labels = labels;
    }
    if let Some(sla) = req.sla_config {
        demand.sla_config = Some(sla);
    }
    demand.updated_at = Utc::now();
    repo.save_demand(&demand).await?;

    let message = format!("'{}' was updated", demand.title);
    notifier.dispatch(DemandNotification::batch(
        &demand,
        &demand.audience(ctx.user_id),
        NotificationKind::Update,
        &message,
    ));
    Ok(demand)
}

pub async fn comment_on_demand<R: DemandRepository + ?Sized>(
    repo: &R,
    notifier: &NotificationDispatcher,
    ctx: &TenantContext,
    demand_id: Uuid,
    req: CommentRequest,
) -> Result<DemandComment, DemandError> {
    ctx.ensure_write()?;
    let demand = load_demand(repo, ctx, demand_id).await?;

    let body = req.body.trim();
    if body.is_empty() {
        return Err(DemandError::Validation("comment body is required".to_string()));
    }

    let comment = DemandComment {
        id: Uuid::new_v4(),
        demand_id: demand.id,
        author_id: ctx.user_id,
        body: body.to_string(),
        created_at: Utc::now(),
    };
    repo.insert_comment(&comment).await?;

    let mut recipients = demand.audience(ctx.user_id);
    if demand.created_by != ctx.user_id && !recipients.contains(&demand.created_by) {
        recipients.push(demand.created_by);
    }
    let message = format!("New comment on '{}'", demand.title);
    notifier.dispatch(DemandNotification::batch(
        &demand,
        &recipients,
        NotificationKind::Comment,
        &message,
    ));
    Ok(comment)
}

pub async fn get_demand<R: DemandRepository + ?Sized>(
    repo: &R,
    ctx: &TenantContext,
    demand_id: Uuid,
) -> Result<Demand, DemandError> {
    load_demand(repo, ctx, demand_id).await
}

/// Transitions oldest first.
pub async fn demand_history<R: DemandRepository + ?Sized>(
    repo: &R,
    ctx: &TenantContext,
    demand_id: Uuid,
) -> Result<Vec<DemandHistory>, DemandError> {
    let demand = load_demand(repo, ctx, demand_id).await?;
    let mut history = repo.list_history(demand.id).await?;
    history.sort_by_key(|h| h.created_at);
    Ok(history)
}
