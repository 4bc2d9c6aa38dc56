//! Role and permission domain models

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Role of a user inside a group.
///
/// `Admin` is global and applies to every group the user can reach,
/// `Moderator` is bound to a single group by a grant, `Member` is the default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Moderator,
    Member,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Admin, Role::Moderator, Role::Member];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Moderator => "moderator",
            Role::Member => "member",
        }
    }

    /// 角色对应的权限集合
    pub fn permissions(&self) -> PermissionSet {
        permissions_for(*self)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "moderator" => Ok(Role::Moderator),
            "member" => Ok(Role::Member),
            other => Err(format!("unknown role: {}", other)),
        }
    }
}

/// Single capability flag of a [`PermissionSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    DeleteMessages,
    BanUsers,
    KickUsers,
    AddModerators,
    RemoveModerators,
    ManageGroup,
}

impl Permission {
    pub const ALL: [Permission; 6] = [
        Permission::DeleteMessages,
        Permission::BanUsers,
        Permission::KickUsers,
        Permission::AddModerators,
        Permission::RemoveModerators,
        Permission::ManageGroup,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::DeleteMessages => "delete_messages",
            Permission::BanUsers => "ban_users",
            Permission::KickUsers => "kick_users",
            Permission::AddModerators => "add_moderators",
            Permission::RemoveModerators => "remove_moderators",
            Permission::ManageGroup => "manage_group",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Permissions derived from a role. Never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct PermissionSet {
    pub can_delete_messages: bool,
    pub can_ban_users: bool,
    pub can_kick_users: bool,
    pub can_add_moderators: bool,
    pub can_remove_moderators: bool,
    pub can_manage_group: bool,
}

impl PermissionSet {
    pub fn has(&self, permission: Permission) -> bool {
        match permission {
            Permission::DeleteMessages => self.can_delete_messages,
            Permission::BanUsers => self.can_ban_users,
            Permission::KickUsers => self.can_kick_users,
            Permission::AddModerators => self.can_add_moderators,
            Permission::RemoveModerators => self.can_remove_moderators,
            Permission::ManageGroup => self.can_manage_group,
        }
    }

    /// 已授予的权限列表
    pub fn granted(&self) -> Vec<Permission> {
        Permission::ALL
            .into_iter()
            .filter(|p| self.has(*p))
            .collect()
    }

    pub fn is_superset_of(&self, other: &PermissionSet) -> bool {
        Permission::ALL
            .into_iter()
            .all(|p| !other.has(p) || self.has(p))
    }
}

/// 角色到权限的静态映射
pub fn permissions_for(role: Role) -> PermissionSet {
    match role {
        Role::Admin => PermissionSet {
            can_delete_messages: true,
            can_ban_users: true,
            can_kick_users: true,
            can_add_moderators: true,
            can_remove_moderators: true,
            can_manage_group: true,
        },
        Role::Moderator => PermissionSet {
            can_delete_messages: true,
            can_ban_users: true,
            can_kick_users: true,
            can_add_moderators: false,
            can_remove_moderators: false,
            can_manage_group: false,
        },
        Role::Member => PermissionSet::default(),
    }
}

/// Membership row as returned by the membership store
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupMember {
    pub user_id: Uuid,
    pub role: Role,
}
