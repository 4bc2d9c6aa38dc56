//! 广播目标选择
//!
//! 社区与子群组的选择状态。勾选社区会级联到它的所有子群组，
//! 勾选单个子群组不会反向影响社区的选中状态。
//! 全选是一种模式而不是快照：全选期间新加入的子群组也会被包含。

use serde::Serialize;
use std::collections::BTreeSet;
use uuid::Uuid;

use crate::models::community::{CommunityUniverse, SelectionOp};

/// 当前的选择模式
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum TargetSelection {
    All,
    Explicit {
        communities: BTreeSet<Uuid>,
        sub_groups: BTreeSet<Uuid>,
    },
}

impl Default for TargetSelection {
    fn default() -> Self {
        Self::Explicit {
            communities: BTreeSet::new(),
            sub_groups: BTreeSet::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TargetSetResolver {
    universe: CommunityUniverse,
    selection: TargetSelection,
}

impl TargetSetResolver {
    pub fn new(universe: CommunityUniverse) -> Self {
        Self {
            universe,
            selection: TargetSelection::default(),
        }
    }

    pub fn universe(&self) -> &CommunityUniverse {
        &self.universe
    }

    pub fn selection(&self) -> &TargetSelection {
        &self.selection
    }

    pub fn is_select_all(&self) -> bool {
        matches!(self.selection, TargetSelection::All)
    }

    /// 替换社区目录（例如远程刷新），不改动已有的选择
    pub fn replace_universe(&mut self, universe: CommunityUniverse) {
        self.universe = universe;
    }

    pub fn universe_mut(&mut self) -> &mut CommunityUniverse {
        &mut self.universe
    }

    /// 在显式选择上修改；处于全选模式时先退回到空的显式选择
    fn update_explicit(&mut self, f: impl FnOnce(&mut BTreeSet<Uuid>, &mut BTreeSet<Uuid>)) {
        let (mut communities, mut sub_groups) = match std::mem::take(&mut self.selection) {
            TargetSelection::All => (BTreeSet::new(), BTreeSet::new()),
            TargetSelection::Explicit {
                communities,
                sub_groups,
            } => (communities, sub_groups),
        };
        f(&mut communities, &mut sub_groups);
        self.selection = TargetSelection::Explicit {
            communities,
            sub_groups,
        };
    }

    /// 切换社区：连同它的全部子群组一起选中或取消
    pub fn toggle_community(&mut self, community_id: Uuid) {
        let Some(community) = self.universe.community(&community_id) else {
            tracing::debug!(community_id = %community_id, "Ignoring toggle of unknown community");
            return;
        };
        let children = community.sub_group_ids.clone();

        self.update_explicit(|communities, sub_groups| {
            if communities.remove(&community_id) {
                for child in &children {
                    sub_groups.remove(child);
                }
            } else {
                communities.insert(community_id);
                sub_groups.extend(children);
            }
        });
    }

    /// 切换单个子群组，不影响社区选中状态
    pub fn toggle_sub_group(&mut self, sub_group_id: Uuid) {
        if !self.universe.contains_sub_group(&sub_group_id) {
            tracing::debug!(sub_group_id = %sub_group_id, "Ignoring toggle of unknown sub-group");
            return;
        }

        self.update_explicit(|_, sub_groups| {
            if !sub_groups.remove(&sub_group_id) {
                sub_groups.insert(sub_group_id);
            }
        });
    }

    /// 开启或关闭全选；两种情况下显式选择都被清空
    pub fn set_select_all(&mut self, enabled: bool) {
        self.selection = if enabled {
            TargetSelection::All
        } else {
            TargetSelection::default()
        };
    }

    pub fn apply(&mut self, op: SelectionOp) {
        match op {
            SelectionOp::ToggleCommunity { id } => self.toggle_community(id),
            SelectionOp::ToggleSubGroup { id } => self.toggle_sub_group(id),
            SelectionOp::SelectAll { enabled } => self.set_select_all(enabled),
        }
    }

    pub fn selected_community_ids(&self) -> BTreeSet<Uuid> {
        match &self.selection {
            TargetSelection::All => BTreeSet::new(),
            TargetSelection::Explicit { communities, .. } => communities.clone(),
        }
    }

    pub fn selected_sub_group_ids(&self) -> BTreeSet<Uuid> {
        match &self.selection {
            TargetSelection::All => BTreeSet::new(),
            TargetSelection::Explicit { sub_groups, .. } => sub_groups.clone(),
        }
    }

    /// 最终要发送的子群组集合
    ///
    /// 显式模式下只返回仍然存在于目录中的子群组，已删除的 ID 保留在选择中但不会生效。
    pub fn effective_targets(&self) -> BTreeSet<Uuid> {
        match &self.selection {
            TargetSelection::All => self.universe.sub_group_ids().copied().collect(),
            TargetSelection::Explicit { sub_groups, .. } => sub_groups
                .iter()
                .filter(|id| self.universe.contains_sub_group(id))
                .copied()
                .collect(),
        }
    }

    pub fn selected_count(&self) -> usize {
        self.effective_targets().len()
    }
}
