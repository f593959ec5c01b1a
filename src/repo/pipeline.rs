//! Pipeline board: stages as columns, applications as cards ordered by
//! `position` inside each column.

use serde::Serialize;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::repo::applications::{self, ApplicationRow};
use crate::repo::stages::{self, StageRow};

#[derive(Debug, Serialize)]
pub struct BoardColumn {
    #[serde(flatten)]
    pub stage: StageRow,
    pub applications: Vec<ApplicationRow>,
}

/// Result of a successful move, used for the audit entry and notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveOutcome {
    pub from_stage: Uuid,
    pub to_stage: Uuid,
    pub position: i32,
    pub assigned_to: Option<Uuid>,
}

#[derive(Debug, thiserror::Error)]
pub enum MoveError {
    #[error("application not found")]
    ApplicationNotFound,
    #[error("stage not found")]
    StageNotFound,
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

impl From<MoveError> for crate::error::ApiError {
    fn from(err: MoveError) -> Self {
        match err {
            MoveError::ApplicationNotFound => Self::NotFound("application".into()),
            MoveError::StageNotFound => Self::NotFound("stage".into()),
            MoveError::Db(e) => e.into(),
        }
    }
}

pub async fn board(pool: &PgPool) -> Result<Vec<BoardColumn>, sqlx::Error> {
    let stages = stages::list(pool).await?;
    let cards = sqlx::query_as::<_, ApplicationRow>(&format!(
        "{} ORDER BY a.position, a.updated_at DESC",
        applications::SELECT
    ))
    .fetch_all(pool)
    .await?;

    Ok(group_by_stage(stages, cards))
}

fn group_by_stage(stages: Vec<StageRow>, cards: Vec<ApplicationRow>) -> Vec<BoardColumn> {
    let mut columns: Vec<BoardColumn> = stages
        .into_iter()
        .map(|stage| BoardColumn {
            stage,
            applications: Vec::new(),
        })
        .collect();

    for card in cards {
        if let Some(column) = columns.iter_mut().find(|c| c.stage.id == card.stage_id) {
            column.applications.push(card);
        }
    }
    columns
}

/// Clamp a requested slot to `0..=len`; `None` means the end of the column.
pub fn target_slot(requested: Option<i32>, column_len: i32) -> i32 {
    requested.map_or(column_len, |p| p.clamp(0, column_len))
}

/// Move an application to `stage_id` at `position` inside one transaction.
#[tracing::instrument(skip(pool), err)]
pub async fn move_application(
    pool: &PgPool,
    application_id: Uuid,
    stage_id: Uuid,
    position: Option<i32>,
) -> Result<MoveOutcome, MoveError> {
    let mut tx = pool.begin().await?;
    let outcome = move_within(&mut *tx, application_id, stage_id, position).await?;
    tx.commit().await?;
    Ok(outcome)
}

/// Move steps on an open transaction; the caller commits.
///
/// The application row is locked first, then the gap it leaves is closed and
/// a slot is opened in the target column. Moving within the same column
/// reorders it. Nothing is written when the application or stage is unknown.
pub async fn move_within(
    conn: &mut PgConnection,
    application_id: Uuid,
    stage_id: Uuid,
    position: Option<i32>,
) -> Result<MoveOutcome, MoveError> {
    let current: Option<(Uuid, i32, Option<Uuid>)> = sqlx::query_as(
        "SELECT stage_id, position, assigned_to FROM applications WHERE id = $1 FOR UPDATE",
    )
    .bind(application_id)
    .fetch_optional(&mut *conn)
    .await?;
    let Some((from_stage, from_position, assigned_to)) = current else {
        return Err(MoveError::ApplicationNotFound);
    };

    let stage_exists: bool =
        sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM pipeline_stages WHERE id = $1)")
            .bind(stage_id)
            .fetch_one(&mut *conn)
            .await?;
    if !stage_exists {
        return Err(MoveError::StageNotFound);
    }

    // Close the gap in the source column.
    sqlx::query(
        "UPDATE applications SET position = position - 1
         WHERE stage_id = $1 AND position > $2 AND id <> $3",
    )
    .bind(from_stage)
    .bind(from_position)
    .bind(application_id)
    .execute(&mut *conn)
    .await?;

    let column_len: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM applications WHERE stage_id = $1 AND id <> $2",
    )
    .bind(stage_id)
    .bind(application_id)
    .fetch_one(&mut *conn)
    .await?;
    let slot = target_slot(position, i32::try_from(column_len).unwrap_or(i32::MAX));

    sqlx::query(
        "UPDATE applications SET position = position + 1
         WHERE stage_id = $1 AND position >= $2 AND id <> $3",
    )
    .bind(stage_id)
    .bind(slot)
    .bind(application_id)
    .execute(&mut *conn)
    .await?;

    sqlx::query("UPDATE applications SET stage_id = $2, position = $3 WHERE id = $1")
        .bind(application_id)
        .bind(stage_id)
        .bind(slot)
        .execute(&mut *conn)
        .await?;

    Ok(MoveOutcome {
        from_stage,
        to_stage: stage_id,
        position: slot,
        assigned_to,
    })
}
