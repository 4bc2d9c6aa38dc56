//! 审计日志服务

use chrono::{DateTime, Utc};
use futures::{stream::BoxStream, StreamExt, TryStreamExt};
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    error::AppError,
    models::moderation::{AuditFilter, KickReport, LogEntryId, ModerationAction, ReportStatus},
    repository::AuditStore,
};

pub struct AuditService {
    store: Arc<dyn AuditStore>,
}

impl AuditService {
    pub fn new(store: Arc<dyn AuditStore>) -> Self {
        Self { store }
    }

    /// 追加一条审计记录
    pub async fn append(&self, action: &ModerationAction) -> Result<LogEntryId, AppError> {
        let entry_id = self.store.append(action).await?;
        record_action(action, entry_id);
        Ok(entry_id)
    }

    /// 踢出操作与报告一起写入
    pub async fn append_kick(
        &self,
        action: &ModerationAction,
        report: &KickReport,
    ) -> Result<LogEntryId, AppError> {
        let entry_id = self.store.append_kick(action, report).await?;
        record_action(action, entry_id);
        Ok(entry_id)
    }

    /// 按群组查询，最新的在前
    pub fn list_by_group(
        &self,
        group_id: Uuid,
        filter: AuditFilter,
    ) -> BoxStream<'_, Result<ModerationAction, AppError>> {
        self.store.list_by_group(group_id, filter)
    }

    /// 取一页审计记录
    pub async fn list_page(
        &self,
        group_id: Uuid,
        filter: AuditFilter,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<ModerationAction>, AppError> {
        self.store
            .list_by_group(group_id, filter)
            .skip(offset)
            .take(limit)
            .try_collect()
            .await
    }

    // ==================== Kick Reports ====================

    pub async fn get_kick_report(&self, report_id: Uuid) -> Result<KickReport, AppError> {
        self.store
            .get_kick_report(report_id)
            .await?
            .ok_or_else(|| AppError::not_found("kick report"))
    }

    pub async fn list_kick_reports(
        &self,
        status: Option<ReportStatus>,
    ) -> Result<Vec<KickReport>, AppError> {
        self.store.list_kick_reports(status).await
    }

    pub async fn mark_removal_completed(
        &self,
        report_id: Uuid,
        completed_at: DateTime<Utc>,
    ) -> Result<KickReport, AppError> {
        self.store.mark_removal_completed(report_id, completed_at).await
    }

    pub async fn mark_report_reviewed(
        &self,
        report_id: Uuid,
        reviewer_id: Uuid,
        reviewed_at: DateTime<Utc>,
    ) -> Result<KickReport, AppError> {
        let report = self
            .store
            .mark_report_reviewed(report_id, reviewer_id, reviewed_at)
            .await?;

        tracing::info!(
            report_id = %report_id,
            reviewer_id = %reviewer_id,
            "Kick report reviewed"
        );
        Ok(report)
    }
}

fn record_action(action: &ModerationAction, entry_id: LogEntryId) {
    tracing::info!(
        entry_id = entry_id.0,
        group_id = %action.group_id,
        actor_id = %action.actor_id,
        actor_role = %action.actor_role,
        target_user_id = %action.target_user_id,
        action = %action.kind(),
        "Moderation action recorded"
    );
    metrics::counter!("moderation.actions", "kind" => action.kind().as_str()).increment(1);
}
