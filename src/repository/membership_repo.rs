//! Membership repository (成员与封禁数据访问)

use async_trait::async_trait;
use sqlx::{postgres::PgRow, PgPool, Row};
use uuid::Uuid;

use crate::{
    error::AppError,
    models::{moderation::Ban, role::{GroupMember, Role}},
};

/// 成员存储接口
///
/// 角色与封禁写入都带有鉴权时读到的角色（`expected`），
/// 只有当前状态仍然一致时才写入，否则返回 `AppError::Conflict`。
#[async_trait]
pub trait MembershipStore: Send + Sync {
    /// 用户在群组中的角色，全局管理员在任何群组中都是 Admin；非成员返回 None
    async fn get_role(&self, user_id: Uuid, group_id: Uuid) -> Result<Option<Role>, AppError>;

    /// 是否为全局管理员（角色的唯一来源，令牌中的声明不参与鉴权）
    async fn is_global_admin(&self, user_id: Uuid) -> Result<bool, AppError>;

    async fn set_role(
        &self,
        user_id: Uuid,
        group_id: Uuid,
        expected: Role,
        role: Role,
    ) -> Result<(), AppError>;

    /// 移除成员关系；成员已不存在时返回 Ok(false)
    async fn remove_membership(
        &self,
        user_id: Uuid,
        group_id: Uuid,
        expected: Role,
    ) -> Result<bool, AppError>;

    async fn get_ban(&self, user_id: Uuid, group_id: Uuid) -> Result<Option<Ban>, AppError>;

    /// 写入封禁，覆盖之前的记录
    async fn set_ban(&self, ban: &Ban, expected: Role) -> Result<(), AppError>;

    async fn list_members(&self, group_id: Uuid) -> Result<Vec<GroupMember>, AppError>;
}

/// PostgreSQL 实现
pub struct PgMembershipStore {
    db: PgPool,
}

impl PgMembershipStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// 成员当前角色（不考虑全局管理员）
    async fn stored_role(&self, user_id: Uuid, group_id: Uuid) -> Result<Option<Role>, AppError> {
        let role: Option<String> = sqlx::query_scalar(
            "SELECT role FROM group_members WHERE user_id = $1 AND group_id = $2",
        )
        .bind(user_id)
        .bind(group_id)
        .fetch_optional(&self.db)
        .await?;

        role.map(|r| parse_role(&r)).transpose()
    }
}

fn parse_role(value: &str) -> Result<Role, AppError> {
    value.parse::<Role>().map_err(AppError::Store)
}

fn ban_from_row(row: &PgRow) -> Result<Ban, AppError> {
    Ok(Ban {
        user_id: row.try_get("user_id")?,
        group_id: row.try_get("group_id")?,
        banned_by: row.try_get("banned_by")?,
        reason: row.try_get("reason")?,
        expires_at: row.try_get("expires_at")?,
        created_at: row.try_get("created_at")?,
    })
}

#[async_trait]
impl MembershipStore for PgMembershipStore {
    async fn get_role(&self, user_id: Uuid, group_id: Uuid) -> Result<Option<Role>, AppError> {
        let role: Option<String> = sqlx::query_scalar(
            r#"
            SELECT CASE
                WHEN EXISTS (SELECT 1 FROM global_admins WHERE user_id = $1) THEN 'admin'
                ELSE (SELECT role FROM group_members WHERE user_id = $1 AND group_id = $2)
            END
            "#,
        )
        .bind(user_id)
        .bind(group_id)
        .fetch_one(&self.db)
        .await?;

        role.map(|r| parse_role(&r)).transpose()
    }

    async fn is_global_admin(&self, user_id: Uuid) -> Result<bool, AppError> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM global_admins WHERE user_id = $1)",
        )
        .bind(user_id)
        .fetch_one(&self.db)
        .await?;

        Ok(exists)
    }

    async fn set_role(
        &self,
        user_id: Uuid,
        group_id: Uuid,
        expected: Role,
        role: Role,
    ) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            UPDATE group_members
            SET role = $4, updated_at = NOW()
            WHERE user_id = $1 AND group_id = $2 AND role = $3
            "#,
        )
        .bind(user_id)
        .bind(group_id)
        .bind(expected.as_str())
        .bind(role.as_str())
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(());
        }

        match self.stored_role(user_id, group_id).await? {
            Some(current) => Err(AppError::Conflict(format!(
                "expected role {} but found {}",
                expected, current
            ))),
            None => Err(AppError::not_found("member")),
        }
    }

    async fn remove_membership(
        &self,
        user_id: Uuid,
        group_id: Uuid,
        expected: Role,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            "DELETE FROM group_members WHERE user_id = $1 AND group_id = $2 AND role = $3",
        )
        .bind(user_id)
        .bind(group_id)
        .bind(expected.as_str())
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(true);
        }

        match self.stored_role(user_id, group_id).await? {
            Some(current) => Err(AppError::Conflict(format!(
                "expected role {} but found {}",
                expected, current
            ))),
            None => Ok(false),
        }
    }

    async fn get_ban(&self, user_id: Uuid, group_id: Uuid) -> Result<Option<Ban>, AppError> {
        let row = sqlx::query(
            r#"
            SELECT user_id, group_id, banned_by, reason, expires_at, created_at
            FROM group_bans
            WHERE user_id = $1 AND group_id = $2
            "#,
        )
        .bind(user_id)
        .bind(group_id)
        .fetch_optional(&self.db)
        .await?;

        row.as_ref().map(ban_from_row).transpose()
    }

    async fn set_ban(&self, ban: &Ban, expected: Role) -> Result<(), AppError> {
        let mut tx = self.db.begin().await?;

        let current: Option<String> = sqlx::query_scalar(
            "SELECT role FROM group_members WHERE user_id = $1 AND group_id = $2 FOR UPDATE",
        )
        .bind(ban.user_id)
        .bind(ban.group_id)
        .fetch_optional(&mut *tx)
        .await?;

        match current.as_deref().map(parse_role).transpose()? {
            Some(role) if role == expected => {}
            Some(role) => {
                return Err(AppError::Conflict(format!(
                    "expected role {} but found {}",
                    expected, role
                )))
            }
            None => return Err(AppError::not_found("member")),
        }

        sqlx::query(
            r#"
            INSERT INTO group_bans (user_id, group_id, banned_by, reason, expires_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (group_id, user_id) DO UPDATE
            SET banned_by = EXCLUDED.banned_by,
                reason = EXCLUDED.reason,
                expires_at = EXCLUDED.expires_at,
                created_at = EXCLUDED.created_at
            "#,
        )
        .bind(ban.user_id)
        .bind(ban.group_id)
        .bind(ban.banned_by)
        .bind(&ban.reason)
        .bind(ban.expires_at)
        .bind(ban.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn list_members(&self, group_id: Uuid) -> Result<Vec<GroupMember>, AppError> {
        let rows = sqlx::query(
            r#"
            SELECT m.user_id,
                   CASE WHEN a.user_id IS NOT NULL THEN 'admin' ELSE m.role END AS role
            FROM group_members m
            LEFT JOIN global_admins a ON a.user_id = m.user_id
            WHERE m.group_id = $1
            ORDER BY m.joined_at
            "#,
        )
        .bind(group_id)
        .fetch_all(&self.db)
        .await?;

        rows.iter()
            .map(|row| -> Result<GroupMember, AppError> {
                let role: String = row.try_get("role")?;
                Ok(GroupMember {
                    user_id: row.try_get("user_id")?,
                    role: parse_role(&role)?,
                })
            })
            .collect()
    }
}
