//! Community and sub-group domain models

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use uuid::Uuid;
use validator::Validate;

use crate::error::AppError;

/// Community (top level of the broadcast hierarchy)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Community {
    pub id: Uuid,
    pub name: String,
    pub city: String,
    pub member_count: i64,
    /// Ordered child sub-group ids
    pub sub_group_ids: Vec<Uuid>,
}

/// Sub-group, belongs to exactly one community
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubGroup {
    pub id: Uuid,
    pub community_id: Uuid,
    pub name: String,
    pub member_count: i64,
}

/// Snapshot of every community and sub-group a bulk action can reach.
///
/// Construction validates the parent links, so a universe never holds an
/// orphan sub-group or a sub-group listed under two communities.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommunityUniverse {
    communities: Vec<Community>,
    community_index: HashMap<Uuid, usize>,
    sub_groups: BTreeMap<Uuid, SubGroup>,
}

impl CommunityUniverse {
    pub fn empty() -> Self {
        Self::default()
    }

    /// 由社区和子群组构建，校验父子引用
    pub fn new(communities: Vec<Community>, sub_groups: Vec<SubGroup>) -> Result<Self, AppError> {
        let mut universe = Self::empty();
        let mut by_community: HashMap<Uuid, Vec<SubGroup>> = HashMap::new();

        for sub_group in sub_groups {
            by_community
                .entry(sub_group.community_id)
                .or_default()
                .push(sub_group);
        }

        for community in communities {
            let children = by_community.remove(&community.id).unwrap_or_default();
            universe.insert_community(community, children)?;
        }

        if let Some(orphan) = by_community.values().flatten().next() {
            return Err(AppError::Validation(format!(
                "sub-group {} references unknown community {}",
                orphan.id, orphan.community_id
            )));
        }

        Ok(universe)
    }

    /// 添加一个社区及其子群组
    pub fn insert_community(
        &mut self,
        community: Community,
        sub_groups: Vec<SubGroup>,
    ) -> Result<(), AppError> {
        if self.community_index.contains_key(&community.id) {
            return Err(AppError::Validation(format!(
                "community {} already exists",
                community.id
            )));
        }

        let mut listed = HashSet::with_capacity(community.sub_group_ids.len());
        if let Some(dup) = community.sub_group_ids.iter().find(|id| !listed.insert(**id)) {
            return Err(AppError::Validation(format!(
                "community {} lists sub-group {} more than once",
                community.id, dup
            )));
        }

        let mut seen = HashSet::with_capacity(sub_groups.len());
        for sub_group in &sub_groups {
            if !seen.insert(sub_group.id) {
                return Err(AppError::Validation(format!(
                    "sub-group {} provided more than once",
                    sub_group.id
                )));
            }
            if sub_group.community_id != community.id {
                return Err(AppError::Validation(format!(
                    "sub-group {} does not belong to community {}",
                    sub_group.id, community.id
                )));
            }
            if !community.sub_group_ids.contains(&sub_group.id) {
                return Err(AppError::Validation(format!(
                    "sub-group {} is not listed by community {}",
                    sub_group.id, community.id
                )));
            }
            if self.sub_groups.contains_key(&sub_group.id) {
                return Err(AppError::Validation(format!(
                    "sub-group {} already belongs to another community",
                    sub_group.id
                )));
            }
        }

        if community.sub_group_ids.len() != sub_groups.len() {
            return Err(AppError::Validation(format!(
                "community {} lists {} sub-groups but {} were provided",
                community.id,
                community.sub_group_ids.len(),
                sub_groups.len()
            )));
        }

        for sub_group in sub_groups {
            self.sub_groups.insert(sub_group.id, sub_group);
        }
        self.community_index
            .insert(community.id, self.communities.len());
        self.communities.push(community);

        Ok(())
    }

    pub fn communities(&self) -> &[Community] {
        &self.communities
    }

    pub fn community(&self, id: &Uuid) -> Option<&Community> {
        self.community_index
            .get(id)
            .map(|index| &self.communities[*index])
    }

    pub fn sub_group(&self, id: &Uuid) -> Option<&SubGroup> {
        self.sub_groups.get(id)
    }

    pub fn contains_sub_group(&self, id: &Uuid) -> bool {
        self.sub_groups.contains_key(id)
    }

    /// 社区的子群组（按社区定义的顺序）
    pub fn children(&self, community_id: &Uuid) -> &[Uuid] {
        self.community(community_id)
            .map(|c| c.sub_group_ids.as_slice())
            .unwrap_or(&[])
    }

    pub fn sub_group_ids(&self) -> impl Iterator<Item = &Uuid> {
        self.sub_groups.keys()
    }

    pub fn sub_group_count(&self) -> usize {
        self.sub_groups.len()
    }
}

/// 一次选择操作（用户在广播界面上的一次点击）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum SelectionOp {
    ToggleCommunity { id: Uuid },
    ToggleSubGroup { id: Uuid },
    SelectAll { enabled: bool },
}

/// 按顺序重放选择操作，得到广播目标
#[derive(Debug, Deserialize, Validate)]
pub struct ResolveTargetsRequest {
    #[validate(length(max = 1000, message = "at most 1000 selection operations"))]
    pub operations: Vec<SelectionOp>,
}
