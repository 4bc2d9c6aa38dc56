//! Moderation domain models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;
use validator::Validate;

use super::role::{Permission, Role};

/// 审核操作类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModerationKind {
    BanUser,
    KickUser,
    GrantModerator,
    RevokeModerator,
    DeleteMessage,
}

impl ModerationKind {
    pub const ALL: [ModerationKind; 5] = [
        ModerationKind::BanUser,
        ModerationKind::KickUser,
        ModerationKind::GrantModerator,
        ModerationKind::RevokeModerator,
        ModerationKind::DeleteMessage,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModerationKind::BanUser => "member.ban",
            ModerationKind::KickUser => "member.kick",
            ModerationKind::GrantModerator => "moderator.grant",
            ModerationKind::RevokeModerator => "moderator.revoke",
            ModerationKind::DeleteMessage => "message.delete",
        }
    }

    /// Ban and Kick must carry a non-empty reason
    pub fn requires_reason(&self) -> bool {
        matches!(self, ModerationKind::BanUser | ModerationKind::KickUser)
    }
}

impl fmt::Display for ModerationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModerationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ModerationKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| format!("unknown moderation action: {}", s))
    }
}

/// Kind-specific payload of a moderation action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionDetail {
    BanUser { duration_secs: i64 },
    KickUser { report_id: Uuid, notes: Option<String> },
    GrantModerator,
    RevokeModerator,
    DeleteMessage { message_id: Uuid },
}

impl ActionDetail {
    pub fn kind(&self) -> ModerationKind {
        match self {
            ActionDetail::BanUser { .. } => ModerationKind::BanUser,
            ActionDetail::KickUser { .. } => ModerationKind::KickUser,
            ActionDetail::GrantModerator => ModerationKind::GrantModerator,
            ActionDetail::RevokeModerator => ModerationKind::RevokeModerator,
            ActionDetail::DeleteMessage { .. } => ModerationKind::DeleteMessage,
        }
    }
}

/// Audit record of one authorized moderation action. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModerationAction {
    pub id: Uuid,
    pub group_id: Uuid,
    pub actor_id: Uuid,
    /// Role at the time of the action, never re-derived
    pub actor_role: Role,
    pub target_user_id: Uuid,
    pub reason: Option<String>,
    pub detail: ActionDetail,
    pub occurred_at: DateTime<Utc>,
}

impl ModerationAction {
    pub fn kind(&self) -> ModerationKind {
        self.detail.kind()
    }
}

/// Position of an entry in the audit log
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LogEntryId(pub i64);

/// Audit log filters
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuditFilter {
    pub kind: Option<ModerationKind>,
    pub actor_id: Option<Uuid>,
    pub target_user_id: Option<Uuid>,
}

impl AuditFilter {
    pub fn by_kind(kind: ModerationKind) -> Self {
        Self {
            kind: Some(kind),
            ..Default::default()
        }
    }

    pub fn matches(&self, action: &ModerationAction) -> bool {
        self.kind.map_or(true, |k| k == action.kind())
            && self.actor_id.map_or(true, |id| id == action.actor_id)
            && self.target_user_id.map_or(true, |id| id == action.target_user_id)
    }
}

/// 拒绝原因，对应鉴权规则
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum DenialReason {
    SelfTarget,
    TargetIsAdmin,
    MissingPermission { permission: Permission },
    TargetIsModerator,
    TargetRoleMismatch { expected: Role, actual: Role },
}

impl DenialReason {
    /// 稳定的短标识，用于指标标签
    pub fn code(&self) -> &'static str {
        match self {
            DenialReason::SelfTarget => "self_target",
            DenialReason::TargetIsAdmin => "target_is_admin",
            DenialReason::MissingPermission { .. } => "missing_permission",
            DenialReason::TargetIsModerator => "target_is_moderator",
            DenialReason::TargetRoleMismatch { .. } => "target_role_mismatch",
        }
    }
}

impl fmt::Display for DenialReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DenialReason::SelfTarget => write!(f, "you cannot moderate yourself"),
            DenialReason::TargetIsAdmin => write!(f, "administrators cannot be moderated"),
            DenialReason::MissingPermission { permission } => {
                write!(f, "missing permission {}", permission)
            }
            DenialReason::TargetIsModerator => {
                write!(f, "moderators must be demoted before they can be kicked")
            }
            DenialReason::TargetRoleMismatch { expected, actual } => {
                write!(f, "target must be a {} but is a {}", expected, actual)
            }
        }
    }
}

/// Outcome of an authorization check
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Decision {
    Allowed,
    Denied { reason: DenialReason },
}

impl Decision {
    pub fn denied(reason: DenialReason) -> Self {
        Decision::Denied { reason }
    }

    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed)
    }
}

/// Time-boxed ban of a user in one group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ban {
    pub user_id: Uuid,
    pub group_id: Uuid,
    pub banned_by: Uuid,
    pub reason: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Ban {
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

/// 踢出报告状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    #[default]
    Pending,
    Reviewed,
}

impl ReportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportStatus::Pending => "pending",
            ReportStatus::Reviewed => "reviewed",
        }
    }
}

impl FromStr for ReportStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ReportStatus::Pending),
            "reviewed" => Ok(ReportStatus::Reviewed),
            other => Err(format!("unknown report status: {}", other)),
        }
    }
}

/// Report produced by every kick, visible to admins only
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KickReport {
    pub id: Uuid,
    pub group_id: Uuid,
    pub moderator_id: Uuid,
    pub target_user_id: Uuid,
    pub reason: String,
    pub notes: Option<String>,
    pub status: ReportStatus,
    pub created_at: DateTime<Utc>,
    pub reviewed_by: Option<Uuid>,
    pub reviewed_at: Option<DateTime<Utc>>,
    /// 成员关系移除完成的时间；为空表示踢出尚未生效
    pub removal_completed_at: Option<DateTime<Utc>>,
}

impl KickReport {
    pub fn is_removal_pending(&self) -> bool {
        self.removal_completed_at.is_none()
    }
}

// ==================== Request DTOs ====================

/// 鉴权询问请求
#[derive(Debug, Deserialize)]
pub struct AuthorizeRequest {
    pub target_user_id: Uuid,
    pub action: ModerationKind,
}

/// 封禁请求
#[derive(Debug, Deserialize, Validate)]
pub struct BanUserRequest {
    pub target_user_id: Uuid,
    #[validate(length(max = 500, message = "reason must be at most 500 characters"))]
    pub reason: String,
    /// 封禁时长（秒），缺省时使用配置的默认值
    #[validate(range(min = 1, message = "duration_secs must be positive"))]
    pub duration_secs: Option<i64>,
}

/// 踢出请求
#[derive(Debug, Deserialize, Validate)]
pub struct KickUserRequest {
    pub target_user_id: Uuid,
    #[validate(length(max = 500, message = "reason must be at most 500 characters"))]
    pub reason: String,
    #[validate(length(max = 2000, message = "notes must be at most 2000 characters"))]
    pub notes: Option<String>,
}

/// 删除消息请求
#[derive(Debug, Deserialize, Validate)]
pub struct DeleteMessageRequest {
    pub author_id: Uuid,
    #[validate(length(max = 2000))]
    pub reason: Option<String>,
}

/// 授予版主请求
#[derive(Debug, Deserialize)]
pub struct GrantModeratorRequest {
    pub user_id: Uuid,
}

/// 审计日志查询参数
#[derive(Debug, Default, Deserialize)]
pub struct AuditLogQuery {
    pub kind: Option<ModerationKind>,
    pub actor_id: Option<Uuid>,
    pub target_user_id: Option<Uuid>,
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: usize,
}

impl AuditLogQuery {
    pub fn filter(&self) -> AuditFilter {
        AuditFilter {
            kind: self.kind,
            actor_id: self.actor_id,
            target_user_id: self.target_user_id,
        }
    }
}

/// 踢出报告查询参数
#[derive(Debug, Default, Deserialize)]
pub struct KickReportQuery {
    pub status: Option<ReportStatus>,
}
