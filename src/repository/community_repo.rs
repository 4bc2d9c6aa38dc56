//! Community repository (社区目录数据访问)

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use uuid::Uuid;

use crate::{
    error::AppError,
    models::community::{Community, CommunityUniverse, SubGroup},
};

/// 社区目录：提供广播目标选择所需的社区与子群组快照
#[async_trait]
pub trait CommunityDirectory: Send + Sync {
    async fn load_universe(&self) -> Result<CommunityUniverse, AppError>;
}

pub struct PgCommunityDirectory {
    db: PgPool,
}

impl PgCommunityDirectory {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl CommunityDirectory for PgCommunityDirectory {
    async fn load_universe(&self) -> Result<CommunityUniverse, AppError> {
        let sub_group_rows = sqlx::query(
            r#"
            SELECT id, community_id, name, member_count
            FROM sub_groups
            ORDER BY community_id, position
            "#,
        )
        .fetch_all(&self.db)
        .await?;

        let mut children: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
        let mut sub_groups = Vec::with_capacity(sub_group_rows.len());
        for row in &sub_group_rows {
            let sub_group = SubGroup {
                id: row.try_get("id")?,
                community_id: row.try_get("community_id")?,
                name: row.try_get("name")?,
                member_count: row.try_get("member_count")?,
            };
            children
                .entry(sub_group.community_id)
                .or_default()
                .push(sub_group.id);
            sub_groups.push(sub_group);
        }

        let community_rows =
            sqlx::query("SELECT id, name, city, member_count FROM communities ORDER BY name")
                .fetch_all(&self.db)
                .await?;

        let mut communities = Vec::with_capacity(community_rows.len());
        for row in &community_rows {
            let id: Uuid = row.try_get("id")?;
            communities.push(Community {
                id,
                name: row.try_get("name")?,
                city: row.try_get("city")?,
                member_count: row.try_get("member_count")?,
                sub_group_ids: children.remove(&id).unwrap_or_default(),
            });
        }

        tracing::debug!(
            communities = communities.len(),
            sub_groups = sub_groups.len(),
            "Community universe loaded"
        );

        CommunityUniverse::new(communities, sub_groups)
    }
}
