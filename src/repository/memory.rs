//! In-memory stores
//! 用于测试和无数据库的嵌入式场景，语义与 PostgreSQL 实现保持一致

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::{
    stream::{self, BoxStream},
    StreamExt,
};
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    error::AppError,
    models::{
        community::{Community, CommunityUniverse, SubGroup},
        moderation::{AuditFilter, Ban, KickReport, LogEntryId, ModerationAction, ReportStatus},
        role::{GroupMember, Role},
    },
    repository::{AuditStore, CommunityDirectory, MembershipStore},
};

// ==================== Membership ====================

#[derive(Default)]
struct MembershipState {
    global_admins: HashSet<Uuid>,
    /// group_id -> members in join order
    members: HashMap<Uuid, Vec<GroupMember>>,
    bans: HashMap<(Uuid, Uuid), Ban>,
}

impl MembershipState {
    fn stored_role(&self, user_id: Uuid, group_id: Uuid) -> Option<Role> {
        self.members
            .get(&group_id)?
            .iter()
            .find(|m| m.user_id == user_id)
            .map(|m| m.role)
    }

    fn check_expected(&self, user_id: Uuid, group_id: Uuid, expected: Role) -> Result<(), AppError> {
        match self.stored_role(user_id, group_id) {
            Some(role) if role == expected => Ok(()),
            Some(role) => Err(AppError::Conflict(format!(
                "expected role {} but found {}",
                expected, role
            ))),
            None => Err(AppError::not_found("member")),
        }
    }
}

#[derive(Default)]
pub struct InMemoryMembershipStore {
    state: RwLock<MembershipState>,
}

impl InMemoryMembershipStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置全局管理员
    pub async fn add_global_admin(&self, user_id: Uuid) {
        self.state.write().await.global_admins.insert(user_id);
    }

    /// 添加成员（已存在时覆盖角色）
    pub async fn add_member(&self, group_id: Uuid, user_id: Uuid, role: Role) {
        let mut state = self.state.write().await;
        let members = state.members.entry(group_id).or_default();
        match members.iter_mut().find(|m| m.user_id == user_id) {
            Some(member) => member.role = role,
            None => members.push(GroupMember { user_id, role }),
        }
    }
}

#[async_trait]
impl MembershipStore for InMemoryMembershipStore {
    async fn get_role(&self, user_id: Uuid, group_id: Uuid) -> Result<Option<Role>, AppError> {
        let state = self.state.read().await;
        if state.global_admins.contains(&user_id) {
            return Ok(Some(Role::Admin));
        }
        Ok(state.stored_role(user_id, group_id))
    }

    async fn is_global_admin(&self, user_id: Uuid) -> Result<bool, AppError> {
        Ok(self.state.read().await.global_admins.contains(&user_id))
    }

    async fn set_role(
        &self,
        user_id: Uuid,
        group_id: Uuid,
        expected: Role,
        role: Role,
    ) -> Result<(), AppError> {
        let mut state = self.state.write().await;
        state.check_expected(user_id, group_id, expected)?;

        if let Some(member) = state
            .members
            .get_mut(&group_id)
            .and_then(|members| members.iter_mut().find(|m| m.user_id == user_id))
        {
            member.role = role;
        }
        Ok(())
    }

    async fn remove_membership(
        &self,
        user_id: Uuid,
        group_id: Uuid,
        expected: Role,
    ) -> Result<bool, AppError> {
        let mut state = self.state.write().await;
        match state.check_expected(user_id, group_id, expected) {
            Ok(()) => {}
            Err(AppError::NotFound(_)) => return Ok(false),
            Err(e) => return Err(e),
        }

        if let Some(members) = state.members.get_mut(&group_id) {
            members.retain(|m| m.user_id != user_id);
        }
        Ok(true)
    }

    async fn get_ban(&self, user_id: Uuid, group_id: Uuid) -> Result<Option<Ban>, AppError> {
        Ok(self.state.read().await.bans.get(&(group_id, user_id)).cloned())
    }

    async fn set_ban(&self, ban: &Ban, expected: Role) -> Result<(), AppError> {
        let mut state = self.state.write().await;
        state.check_expected(ban.user_id, ban.group_id, expected)?;
        state.bans.insert((ban.group_id, ban.user_id), ban.clone());
        Ok(())
    }

    async fn list_members(&self, group_id: Uuid) -> Result<Vec<GroupMember>, AppError> {
        let state = self.state.read().await;
        let members = state
            .members
            .get(&group_id)
            .map(|members| {
                members
                    .iter()
                    .map(|m| GroupMember {
                        user_id: m.user_id,
                        role: if state.global_admins.contains(&m.user_id) {
                            Role::Admin
                        } else {
                            m.role
                        },
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(members)
    }
}

// ==================== Audit ====================

#[derive(Default)]
struct AuditState {
    next_seq: i64,
    actions: Vec<(LogEntryId, ModerationAction)>,
    reports: Vec<KickReport>,
}

impl AuditState {
    fn push(&mut self, action: &ModerationAction) -> LogEntryId {
        self.next_seq += 1;
        let entry_id = LogEntryId(self.next_seq);
        self.actions.push((entry_id, action.clone()));
        entry_id
    }
}

#[derive(Default)]
pub struct InMemoryAuditStore {
    state: RwLock<AuditState>,
}

impl InMemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 全部条目数（所有群组）
    pub async fn len(&self) -> usize {
        self.state.read().await.actions.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl AuditStore for InMemoryAuditStore {
    async fn append(&self, action: &ModerationAction) -> Result<LogEntryId, AppError> {
        Ok(self.state.write().await.push(action))
    }

    async fn append_kick(
        &self,
        action: &ModerationAction,
        report: &KickReport,
    ) -> Result<LogEntryId, AppError> {
        let mut state = self.state.write().await;
        if state.reports.iter().any(|r| r.id == report.id) {
            return Err(AppError::conflict("kick report already exists"));
        }
        let entry_id = state.push(action);
        state.reports.push(report.clone());
        Ok(entry_id)
    }

    fn list_by_group(
        &self,
        group_id: Uuid,
        filter: AuditFilter,
    ) -> BoxStream<'_, Result<ModerationAction, AppError>> {
        stream::once(async move {
            let state = self.state.read().await;
            state
                .actions
                .iter()
                .rev()
                .filter(|(_, a)| a.group_id == group_id && filter.matches(a))
                .map(|(_, a)| Ok(a.clone()))
                .collect::<Vec<_>>()
        })
        .flat_map(stream::iter)
        .boxed()
    }

    async fn get_kick_report(&self, report_id: Uuid) -> Result<Option<KickReport>, AppError> {
        Ok(self
            .state
            .read()
            .await
            .reports
            .iter()
            .find(|r| r.id == report_id)
            .cloned())
    }

    async fn list_kick_reports(
        &self,
        status: Option<ReportStatus>,
    ) -> Result<Vec<KickReport>, AppError> {
        let state = self.state.read().await;
        Ok(state
            .reports
            .iter()
            .rev()
            .filter(|r| status.map_or(true, |s| r.status == s))
            .cloned()
            .collect())
    }

    async fn mark_removal_completed(
        &self,
        report_id: Uuid,
        completed_at: DateTime<Utc>,
    ) -> Result<KickReport, AppError> {
        let mut state = self.state.write().await;
        let report = state
            .reports
            .iter_mut()
            .find(|r| r.id == report_id)
            .ok_or_else(|| AppError::not_found("kick report"))?;

        if report.removal_completed_at.is_some() {
            return Err(AppError::conflict("kick already completed"));
        }

        report.removal_completed_at = Some(completed_at);
        Ok(report.clone())
    }

    async fn mark_report_reviewed(
        &self,
        report_id: Uuid,
        reviewer_id: Uuid,
        reviewed_at: DateTime<Utc>,
    ) -> Result<KickReport, AppError> {
        let mut state = self.state.write().await;
        let report = state
            .reports
            .iter_mut()
            .find(|r| r.id == report_id)
            .ok_or_else(|| AppError::not_found("kick report"))?;

        if report.status != ReportStatus::Pending {
            return Err(AppError::conflict("kick report already reviewed"));
        }

        report.status = ReportStatus::Reviewed;
        report.reviewed_by = Some(reviewer_id);
        report.reviewed_at = Some(reviewed_at);
        Ok(report.clone())
    }
}

// ==================== Communities ====================

#[derive(Default)]
pub struct InMemoryCommunityDirectory {
    universe: RwLock<CommunityUniverse>,
}

impl InMemoryCommunityDirectory {
    pub fn new(universe: CommunityUniverse) -> Self {
        Self {
            universe: RwLock::new(universe),
        }
    }

    pub async fn insert_community(
        &self,
        community: Community,
        sub_groups: Vec<SubGroup>,
    ) -> Result<(), AppError> {
        self.universe
            .write()
            .await
            .insert_community(community, sub_groups)
    }

    pub async fn replace(&self, universe: CommunityUniverse) {
        *self.universe.write().await = universe;
    }
}

#[async_trait]
impl CommunityDirectory for InMemoryCommunityDirectory {
    async fn load_universe(&self) -> Result<CommunityUniverse, AppError> {
        Ok(self.universe.read().await.clone())
    }
}
