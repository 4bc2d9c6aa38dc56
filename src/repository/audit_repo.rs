//! Audit repository (审计数据访问)

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::{stream::BoxStream, StreamExt};
use sqlx::{postgres::PgRow, PgConnection, PgPool, Row};
use uuid::Uuid;

use crate::{
    error::AppError,
    models::moderation::{
        AuditFilter, KickReport, LogEntryId, ModerationAction, ReportStatus,
    },
};

/// 审计存储接口（只追加）
///
/// 同一群组内的条目按追加顺序编号，查询时按编号倒序返回。
#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn append(&self, action: &ModerationAction) -> Result<LogEntryId, AppError>;

    /// 在同一个事务中写入踢出操作和对应的报告
    async fn append_kick(
        &self,
        action: &ModerationAction,
        report: &KickReport,
    ) -> Result<LogEntryId, AppError>;

    /// 按群组查询，最新的在前；每次调用都会重新开始读取
    fn list_by_group(
        &self,
        group_id: Uuid,
        filter: AuditFilter,
    ) -> BoxStream<'_, Result<ModerationAction, AppError>>;

    async fn get_kick_report(&self, report_id: Uuid) -> Result<Option<KickReport>, AppError>;

    async fn list_kick_reports(
        &self,
        status: Option<ReportStatus>,
    ) -> Result<Vec<KickReport>, AppError>;

    /// 记录成员关系移除已完成；已经记录过时返回 Conflict
    async fn mark_removal_completed(
        &self,
        report_id: Uuid,
        completed_at: DateTime<Utc>,
    ) -> Result<KickReport, AppError>;

    /// Pending -> Reviewed；报告不是 Pending 时返回 Conflict
    async fn mark_report_reviewed(
        &self,
        report_id: Uuid,
        reviewer_id: Uuid,
        reviewed_at: DateTime<Utc>,
    ) -> Result<KickReport, AppError>;
}

const LIST_ACTIONS_SQL: &str = r#"
    SELECT seq, id, group_id, actor_id, actor_role, target_user_id, kind, reason, detail, occurred_at
    FROM moderation_actions
    WHERE group_id = $1
      AND ($2::text IS NULL OR kind = $2)
      AND ($3::uuid IS NULL OR actor_id = $3)
      AND ($4::uuid IS NULL OR target_user_id = $4)
    ORDER BY seq DESC
"#;

const REPORT_COLUMNS: &str = "id, group_id, moderator_id, target_user_id, reason, notes, status, \
                              created_at, reviewed_by, reviewed_at, removal_completed_at";

/// PostgreSQL 实现
pub struct PgAuditStore {
    db: PgPool,
}

impl PgAuditStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

async fn insert_action(
    conn: &mut PgConnection,
    action: &ModerationAction,
) -> Result<LogEntryId, AppError> {
    let detail = serde_json::to_value(&action.detail)
        .map_err(|e| AppError::Internal(format!("Failed to encode action detail: {}", e)))?;

    let seq: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO moderation_actions (
            id, group_id, actor_id, actor_role, target_user_id, kind, reason, detail, occurred_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING seq
        "#,
    )
    .bind(action.id)
    .bind(action.group_id)
    .bind(action.actor_id)
    .bind(action.actor_role.as_str())
    .bind(action.target_user_id)
    .bind(action.kind().as_str())
    .bind(&action.reason)
    .bind(detail)
    .bind(action.occurred_at)
    .fetch_one(conn)
    .await?;

    Ok(LogEntryId(seq))
}

fn action_from_row(row: &PgRow) -> Result<ModerationAction, AppError> {
    let actor_role: String = row.try_get("actor_role")?;
    let detail: serde_json::Value = row.try_get("detail")?;

    Ok(ModerationAction {
        id: row.try_get("id")?,
        group_id: row.try_get("group_id")?,
        actor_id: row.try_get("actor_id")?,
        actor_role: actor_role.parse().map_err(AppError::Store)?,
        target_user_id: row.try_get("target_user_id")?,
        reason: row.try_get("reason")?,
        detail: serde_json::from_value(detail)
            .map_err(|e| AppError::Store(format!("Malformed action detail: {}", e)))?,
        occurred_at: row.try_get("occurred_at")?,
    })
}

fn report_from_row(row: &PgRow) -> Result<KickReport, AppError> {
    let status: String = row.try_get("status")?;

    Ok(KickReport {
        id: row.try_get("id")?,
        group_id: row.try_get("group_id")?,
        moderator_id: row.try_get("moderator_id")?,
        target_user_id: row.try_get("target_user_id")?,
        reason: row.try_get("reason")?,
        notes: row.try_get("notes")?,
        status: status.parse().map_err(AppError::Store)?,
        created_at: row.try_get("created_at")?,
        reviewed_by: row.try_get("reviewed_by")?,
        reviewed_at: row.try_get("reviewed_at")?,
        removal_completed_at: row.try_get("removal_completed_at")?,
    })
}

#[async_trait]
impl AuditStore for PgAuditStore {
    async fn append(&self, action: &ModerationAction) -> Result<LogEntryId, AppError> {
        let mut conn = self.db.acquire().await?;
        insert_action(&mut conn, action).await
    }

    async fn append_kick(
        &self,
        action: &ModerationAction,
        report: &KickReport,
    ) -> Result<LogEntryId, AppError> {
        let mut tx = self.db.begin().await?;

        let entry_id = insert_action(&mut tx, action).await?;

        sqlx::query(
            r#"
            INSERT INTO kick_reports (
                id, group_id, moderator_id, target_user_id, reason, notes, status, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(report.id)
        .bind(report.group_id)
        .bind(report.moderator_id)
        .bind(report.target_user_id)
        .bind(&report.reason)
        .bind(&report.notes)
        .bind(report.status.as_str())
        .bind(report.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(entry_id)
    }

    fn list_by_group(
        &self,
        group_id: Uuid,
        filter: AuditFilter,
    ) -> BoxStream<'_, Result<ModerationAction, AppError>> {
        sqlx::query(LIST_ACTIONS_SQL)
            .bind(group_id)
            .bind(filter.kind.map(|k| k.as_str()))
            .bind(filter.actor_id)
            .bind(filter.target_user_id)
            .fetch(&self.db)
            .map(|row| {
                row.map_err(AppError::from)
                    .and_then(|row| action_from_row(&row))
            })
            .boxed()
    }

    async fn get_kick_report(&self, report_id: Uuid) -> Result<Option<KickReport>, AppError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM kick_reports WHERE id = $1",
            REPORT_COLUMNS
        ))
        .bind(report_id)
        .fetch_optional(&self.db)
        .await?;

        row.as_ref().map(report_from_row).transpose()
    }

    async fn list_kick_reports(
        &self,
        status: Option<ReportStatus>,
    ) -> Result<Vec<KickReport>, AppError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM kick_reports WHERE ($1::text IS NULL OR status = $1) \
             ORDER BY created_at DESC",
            REPORT_COLUMNS
        ))
        .bind(status.map(|s| s.as_str()))
        .fetch_all(&self.db)
        .await?;

        rows.iter().map(report_from_row).collect()
    }

    async fn mark_removal_completed(
        &self,
        report_id: Uuid,
        completed_at: DateTime<Utc>,
    ) -> Result<KickReport, AppError> {
        let row = sqlx::query(&format!(
            "UPDATE kick_reports SET removal_completed_at = $2 \
             WHERE id = $1 AND removal_completed_at IS NULL RETURNING {}",
            REPORT_COLUMNS
        ))
        .bind(report_id)
        .bind(completed_at)
        .fetch_optional(&self.db)
        .await?;

        if let Some(row) = row {
            return report_from_row(&row);
        }

        match self.get_kick_report(report_id).await? {
            Some(_) => Err(AppError::conflict("kick already completed")),
            None => Err(AppError::not_found("kick report")),
        }
    }

    async fn mark_report_reviewed(
        &self,
        report_id: Uuid,
        reviewer_id: Uuid,
        reviewed_at: DateTime<Utc>,
    ) -> Result<KickReport, AppError> {
        let row = sqlx::query(&format!(
            "UPDATE kick_reports SET status = 'reviewed', reviewed_by = $2, reviewed_at = $3 \
             WHERE id = $1 AND status = 'pending' RETURNING {}",
            REPORT_COLUMNS
        ))
        .bind(report_id)
        .bind(reviewer_id)
        .bind(reviewed_at)
        .fetch_optional(&self.db)
        .await?;

        if let Some(row) = row {
            return report_from_row(&row);
        }

        match self.get_kick_report(report_id).await? {
            Some(_) => Err(AppError::conflict("kick report already reviewed")),
            None => Err(AppError::not_found("kick report")),
        }
    }
}
