//! 审核服务
//!
//! 每个操作的顺序都是：校验输入 -> 读取目标角色 -> 鉴权 -> 写入成员存储 -> 追加审计。
//! 鉴权失败时不会发生任何写入；存储写入失败时不会追加审计记录。
//! 存储错误原样返回给调用方，由调用方决定是否重试。

use chrono::Duration;
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    clock::Clock,
    error::AppError,
    models::{
        moderation::{
            ActionDetail, Ban, Decision, KickReport, LogEntryId, ModerationAction,
            ModerationKind, ReportStatus,
        },
        role::{GroupMember, Role},
    },
    repository::MembershipStore,
    services::{AuditService, PermissionService},
};

/// 默认封禁时长（30 分钟）
pub const DEFAULT_BAN_DURATION_SECS: i64 = 30 * 60;
pub const MAX_BAN_DURATION_SECS: i64 = 30 * 24 * 3600;
pub const MAX_REASON_LEN: usize = 500;
pub const MAX_NOTES_LEN: usize = 2000;

pub struct ModerationService {
    members: Arc<dyn MembershipStore>,
    audit: Arc<AuditService>,
    permissions: PermissionService,
    clock: Arc<dyn Clock>,
    default_ban_duration: Duration,
    max_ban_duration: Duration,
}

impl ModerationService {
    pub fn new(
        members: Arc<dyn MembershipStore>,
        audit: Arc<AuditService>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            members,
            audit,
            permissions: PermissionService::new(),
            clock,
            default_ban_duration: Duration::seconds(DEFAULT_BAN_DURATION_SECS),
            max_ban_duration: Duration::seconds(MAX_BAN_DURATION_SECS),
        }
    }

    pub fn with_default_ban_duration(mut self, duration: Duration) -> Self {
        self.default_ban_duration = duration;
        self
    }

    pub fn with_max_ban_duration(mut self, duration: Duration) -> Self {
        self.max_ban_duration = duration;
        self
    }

    pub fn default_ban_duration(&self) -> Duration {
        self.default_ban_duration
    }

    /// 解析操作者在群组中的角色，只以成员存储为准（全局管理员由存储解析为 Admin）。
    /// 非成员不能执行任何审核操作
    pub async fn actor_role(&self, actor_id: Uuid, group_id: Uuid) -> Result<Role, AppError> {
        self.members
            .get_role(actor_id, group_id)
            .await?
            .ok_or(AppError::Forbidden)
    }

    /// 不属于任何群组的操作（报告审核、广播）使用的角色
    pub async fn global_role(&self, actor_id: Uuid) -> Result<Role, AppError> {
        if self.members.is_global_admin(actor_id).await? {
            Ok(Role::Admin)
        } else {
            Ok(Role::Member)
        }
    }

    async fn target_role(&self, group_id: Uuid, target_user_id: Uuid) -> Result<Role, AppError> {
        self.members
            .get_role(target_user_id, group_id)
            .await?
            .ok_or_else(|| AppError::not_found("member"))
    }

    /// 询问操作者能否对目标执行操作
    pub async fn authorize(
        &self,
        actor_id: Uuid,
        actor_role: Role,
        group_id: Uuid,
        target_user_id: Uuid,
        kind: ModerationKind,
    ) -> Result<Decision, AppError> {
        if actor_id == target_user_id {
            return Ok(self
                .permissions
                .check(actor_id, actor_role, kind, target_user_id, actor_role));
        }

        let target_role = self.target_role(group_id, target_user_id).await?;
        Ok(self
            .permissions
            .check(actor_id, actor_role, kind, target_user_id, target_role))
    }

    /// 读取目标角色并鉴权，返回鉴权时的目标角色（用于后续的条件写入）
    async fn authorize_or_deny(
        &self,
        actor_id: Uuid,
        actor_role: Role,
        group_id: Uuid,
        target_user_id: Uuid,
        kind: ModerationKind,
    ) -> Result<Role, AppError> {
        // 对自己操作时不需要读取目标角色
        if actor_id == target_user_id {
            self.permissions
                .require(actor_id, actor_role, kind, target_user_id, actor_role)?;
        }

        let target_role = self.target_role(group_id, target_user_id).await?;
        self.permissions
            .require(actor_id, actor_role, kind, target_user_id, target_role)?;
        Ok(target_role)
    }

    /// 封禁成员
    ///
    /// `duration` 为空时使用默认时长。重复封禁以最后一次为准，不叠加。
    pub async fn ban_user(
        &self,
        actor_id: Uuid,
        actor_role: Role,
        group_id: Uuid,
        target_user_id: Uuid,
        reason: &str,
        duration: Option<Duration>,
    ) -> Result<Ban, AppError> {
        let reason = validate_reason(reason)?;
        let duration = duration.unwrap_or(self.default_ban_duration);
        if duration <= Duration::zero() {
            return Err(AppError::validation("ban duration must be positive"));
        }
        if duration > self.max_ban_duration {
            return Err(AppError::Validation(format!(
                "ban duration must be at most {} seconds",
                self.max_ban_duration.num_seconds()
            )));
        }

        let target_role = self
            .authorize_or_deny(actor_id, actor_role, group_id, target_user_id, ModerationKind::BanUser)
            .await?;

        let now = self.clock.now();
        let ban = Ban {
            user_id: target_user_id,
            group_id,
            banned_by: actor_id,
            reason: reason.clone(),
            expires_at: now + duration,
            created_at: now,
        };
        self.members.set_ban(&ban, target_role).await?;

        let action = ModerationAction {
            id: Uuid::new_v4(),
            group_id,
            actor_id,
            actor_role,
            target_user_id,
            reason: Some(reason),
            detail: ActionDetail::BanUser {
                duration_secs: duration.num_seconds(),
            },
            occurred_at: now,
        };
        self.append_after_write(&action).await?;

        Ok(ban)
    }

    /// 踢出成员并生成待审核报告
    ///
    /// 先在一个事务中写入审计记录和报告，再移除成员关系，最后标记移除完成。
    /// 目标角色在鉴权之后发生变化时返回 `AppError::Conflict`，报告保持未完成状态；
    /// 其他移除失败返回 `AppError::Consistency`。两种情况都可以通过
    /// [`Self::complete_kick`] 重新鉴权后完成剩余步骤。
    pub async fn kick_user(
        &self,
        actor_id: Uuid,
        actor_role: Role,
        group_id: Uuid,
        target_user_id: Uuid,
        reason: &str,
        notes: Option<&str>,
    ) -> Result<KickReport, AppError> {
        let reason = validate_reason(reason)?;
        let notes = validate_notes(notes)?;

        let target_role = self
            .authorize_or_deny(actor_id, actor_role, group_id, target_user_id, ModerationKind::KickUser)
            .await?;

        let now = self.clock.now();
        let report = KickReport {
            id: Uuid::new_v4(),
            group_id,
            moderator_id: actor_id,
            target_user_id,
            reason: reason.clone(),
            notes: notes.clone(),
            status: ReportStatus::Pending,
            created_at: now,
            reviewed_by: None,
            reviewed_at: None,
            removal_completed_at: None,
        };
        let action = ModerationAction {
            id: Uuid::new_v4(),
            group_id,
            actor_id,
            actor_role,
            target_user_id,
            reason: Some(reason),
            detail: ActionDetail::KickUser {
                report_id: report.id,
                notes,
            },
            occurred_at: now,
        };

        self.audit.append_kick(&action, &report).await?;

        match self
            .members
            .remove_membership(target_user_id, group_id, target_role)
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!(
                    report_id = %report.id,
                    group_id = %group_id,
                    target_user_id = %target_user_id,
                    "Kicked member had already left the group"
                );
            }
            Err(AppError::Conflict(message)) => {
                tracing::warn!(
                    report_id = %report.id,
                    group_id = %group_id,
                    target_user_id = %target_user_id,
                    "Target role changed during kick, removal left pending"
                );
                return Err(AppError::Conflict(format!(
                    "kick report {} recorded but not applied: {}",
                    report.id, message
                )));
            }
            Err(e) => {
                tracing::error!(
                    report_id = %report.id,
                    group_id = %group_id,
                    target_user_id = %target_user_id,
                    error = %e,
                    "Kick recorded but membership removal failed, manual review required"
                );
                metrics::counter!("moderation.consistency_violations", "kind" => "kick")
                    .increment(1);
                return Err(AppError::Consistency(format!(
                    "kick report {} recorded but membership removal failed: {}",
                    report.id, e
                )));
            }
        }

        self.finish_removal(report.id).await
    }

    /// 完成一次未生效的踢出（移除成员关系），不会产生新的审计记录或报告
    ///
    /// 按当前角色重新鉴权：操作者必须是报告中的版主或管理员，且此刻仍有权踢出目标。
    /// 已经完成的报告返回 `AppError::Conflict`，重新入群的成员不会被再次移除。
    pub async fn complete_kick(&self, actor_id: Uuid, report_id: Uuid) -> Result<KickReport, AppError> {
        let report = self.audit.get_kick_report(report_id).await?;

        let actor_role = self.actor_role(actor_id, report.group_id).await?;
        if actor_role != Role::Admin && report.moderator_id != actor_id {
            return Err(AppError::Forbidden);
        }

        if !report.is_removal_pending() {
            return Err(AppError::conflict("kick already completed"));
        }

        let target_role = self
            .members
            .get_role(report.target_user_id, report.group_id)
            .await?;

        let removed = match target_role {
            Some(target_role) => {
                self.permissions.require(
                    actor_id,
                    actor_role,
                    ModerationKind::KickUser,
                    report.target_user_id,
                    target_role,
                )?;
                self.members
                    .remove_membership(report.target_user_id, report.group_id, target_role)
                    .await?
            }
            None => false,
        };

        let report = self.finish_removal(report_id).await?;
        tracing::info!(
            report_id = %report_id,
            actor_id = %actor_id,
            removed = removed,
            "Kick completed"
        );
        Ok(report)
    }

    /// 成员关系已移除后标记报告；此时失败意味着报告仍显示为未完成
    async fn finish_removal(&self, report_id: Uuid) -> Result<KickReport, AppError> {
        self.audit
            .mark_removal_completed(report_id, self.clock.now())
            .await
            .map_err(|e| {
                tracing::error!(
                    report_id = %report_id,
                    error = %e,
                    "Membership removed but kick report not marked, manual review required"
                );
                metrics::counter!("moderation.consistency_violations", "kind" => "kick")
                    .increment(1);
                AppError::Consistency(format!(
                    "kick report {} applied but not marked complete: {}",
                    report_id, e
                ))
            })
    }

    /// 授予版主
    pub async fn grant_moderator(
        &self,
        actor_id: Uuid,
        actor_role: Role,
        group_id: Uuid,
        target_user_id: Uuid,
    ) -> Result<(), AppError> {
        self.change_role(
            actor_id,
            actor_role,
            group_id,
            target_user_id,
            ModerationKind::GrantModerator,
            Role::Moderator,
        )
        .await
    }

    /// 撤销版主
    pub async fn revoke_moderator(
        &self,
        actor_id: Uuid,
        actor_role: Role,
        group_id: Uuid,
        target_user_id: Uuid,
    ) -> Result<(), AppError> {
        self.change_role(
            actor_id,
            actor_role,
            group_id,
            target_user_id,
            ModerationKind::RevokeModerator,
            Role::Member,
        )
        .await
    }

    async fn change_role(
        &self,
        actor_id: Uuid,
        actor_role: Role,
        group_id: Uuid,
        target_user_id: Uuid,
        kind: ModerationKind,
        new_role: Role,
    ) -> Result<(), AppError> {
        let target_role = self
            .authorize_or_deny(actor_id, actor_role, group_id, target_user_id, kind)
            .await?;

        self.members
            .set_role(target_user_id, group_id, target_role, new_role)
            .await?;

        let detail = match kind {
            ModerationKind::GrantModerator => ActionDetail::GrantModerator,
            _ => ActionDetail::RevokeModerator,
        };
        let action = ModerationAction {
            id: Uuid::new_v4(),
            group_id,
            actor_id,
            actor_role,
            target_user_id,
            reason: None,
            detail,
            occurred_at: self.clock.now(),
        };
        self.append_after_write(&action).await?;

        Ok(())
    }

    /// 删除消息的审计与鉴权；消息本身由消息服务删除
    pub async fn delete_message(
        &self,
        actor_id: Uuid,
        actor_role: Role,
        group_id: Uuid,
        author_id: Uuid,
        message_id: Uuid,
        reason: Option<&str>,
    ) -> Result<ModerationAction, AppError> {
        let reason = validate_notes(reason)?;

        self.authorize_or_deny(actor_id, actor_role, group_id, author_id, ModerationKind::DeleteMessage)
            .await?;

        let action = ModerationAction {
            id: Uuid::new_v4(),
            group_id,
            actor_id,
            actor_role,
            target_user_id: author_id,
            reason,
            detail: ActionDetail::DeleteMessage { message_id },
            occurred_at: self.clock.now(),
        };
        self.audit.append(&action).await?;

        Ok(action)
    }

    /// 当前仍然生效的封禁
    pub async fn active_ban(&self, group_id: Uuid, user_id: Uuid) -> Result<Option<Ban>, AppError> {
        let now = self.clock.now();
        Ok(self
            .members
            .get_ban(user_id, group_id)
            .await?
            .filter(|ban| ban.is_active_at(now)))
    }

    /// 消息发送前的封禁检查
    pub async fn is_currently_banned(&self, group_id: Uuid, user_id: Uuid) -> Result<bool, AppError> {
        Ok(self.active_ban(group_id, user_id).await?.is_some())
    }

    pub async fn list_members(&self, group_id: Uuid) -> Result<Vec<GroupMember>, AppError> {
        self.members.list_members(group_id).await
    }

    // ==================== Kick Reports ====================

    pub async fn list_kick_reports(
        &self,
        actor_role: Role,
        status: Option<ReportStatus>,
    ) -> Result<Vec<KickReport>, AppError> {
        self.permissions.require_admin(actor_role)?;
        self.audit.list_kick_reports(status).await
    }

    pub async fn review_kick_report(
        &self,
        actor_id: Uuid,
        actor_role: Role,
        report_id: Uuid,
    ) -> Result<KickReport, AppError> {
        self.permissions.require_admin(actor_role)?;
        self.audit
            .mark_report_reviewed(report_id, actor_id, self.clock.now())
            .await
    }

    /// 成员存储已写入后追加审计；此时失败意味着状态变更没有审计记录
    async fn append_after_write(&self, action: &ModerationAction) -> Result<LogEntryId, AppError> {
        self.audit.append(action).await.map_err(|e| {
            tracing::error!(
                action_id = %action.id,
                group_id = %action.group_id,
                action = %action.kind(),
                error = %e,
                "State changed but audit append failed, manual review required"
            );
            metrics::counter!("moderation.consistency_violations", "kind" => action.kind().as_str())
                .increment(1);
            AppError::Consistency(format!(
                "{} applied but audit append failed: {}",
                action.kind(),
                e
            ))
        })
    }
}

/// 原因必填：去掉首尾空白后不能为空
fn validate_reason(reason: &str) -> Result<String, AppError> {
    let reason = reason.trim();
    if reason.is_empty() {
        return Err(AppError::validation("reason is required"));
    }
    if reason.chars().count() > MAX_REASON_LEN {
        return Err(AppError::Validation(format!(
            "reason must be at most {} characters",
            MAX_REASON_LEN
        )));
    }
    Ok(reason.to_string())
}

/// 可选文本：空白视为未填写
fn validate_notes(notes: Option<&str>) -> Result<Option<String>, AppError> {
    match notes.map(str::trim).filter(|n| !n.is_empty()) {
        Some(n) if n.chars().count() > MAX_NOTES_LEN => Err(AppError::Validation(format!(
            "notes must be at most {} characters",
            MAX_NOTES_LEN
        ))),
        other => Ok(other.map(str::to_string)),
    }
}
