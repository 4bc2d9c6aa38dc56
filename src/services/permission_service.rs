//! 权限检查服务
//!
//! 所有审核操作的鉴权都集中在 [`authorize`]，调用方只需要询问结果，
//! 不在各处重复角色判断。规则按顺序求值，第一条失败的规则决定拒绝原因：
//!
//! 1. 不能对自己操作
//! 2. 不能对管理员操作
//! 3. 封禁/踢出需要对应权限
//! 4. 踢出的目标不能是版主（需先撤销版主）
//! 5. 授予版主需要权限，且目标当前是普通成员
//! 6. 撤销版主需要权限，且目标当前是版主

use uuid::Uuid;

use crate::{
    error::AppError,
    models::{
        moderation::{Decision, DenialReason, ModerationKind},
        role::{permissions_for, Permission, Role},
    },
};

/// 纯函数鉴权，不读取任何外部状态
pub fn authorize(
    actor_id: Uuid,
    actor_role: Role,
    kind: ModerationKind,
    target_user_id: Uuid,
    target_role: Role,
) -> Decision {
    if actor_id == target_user_id {
        return Decision::denied(DenialReason::SelfTarget);
    }

    if target_role == Role::Admin {
        return Decision::denied(DenialReason::TargetIsAdmin);
    }

    let permissions = permissions_for(actor_role);
    let require = |permission: Permission| -> Result<(), DenialReason> {
        if permissions.has(permission) {
            Ok(())
        } else {
            Err(DenialReason::MissingPermission { permission })
        }
    };
    let require_target = |expected: Role| -> Result<(), DenialReason> {
        if target_role == expected {
            Ok(())
        } else {
            Err(DenialReason::TargetRoleMismatch {
                expected,
                actual: target_role,
            })
        }
    };

    let outcome = match kind {
        ModerationKind::BanUser => require(Permission::BanUsers),
        ModerationKind::KickUser => require(Permission::KickUsers).and_then(|_| {
            if target_role == Role::Moderator {
                Err(DenialReason::TargetIsModerator)
            } else {
                Ok(())
            }
        }),
        ModerationKind::GrantModerator => {
            require(Permission::AddModerators).and_then(|_| require_target(Role::Member))
        }
        ModerationKind::RevokeModerator => {
            require(Permission::RemoveModerators).and_then(|_| require_target(Role::Moderator))
        }
        ModerationKind::DeleteMessage => require(Permission::DeleteMessages),
    };

    match outcome {
        Ok(()) => Decision::Allowed,
        Err(reason) => Decision::denied(reason),
    }
}

/// 鉴权入口：记录拒绝日志与指标
#[derive(Debug, Default, Clone, Copy)]
pub struct PermissionService;

impl PermissionService {
    pub fn new() -> Self {
        Self
    }

    pub fn check(
        &self,
        actor_id: Uuid,
        actor_role: Role,
        kind: ModerationKind,
        target_user_id: Uuid,
        target_role: Role,
    ) -> Decision {
        let decision = authorize(actor_id, actor_role, kind, target_user_id, target_role);

        if let Decision::Denied { reason } = &decision {
            tracing::warn!(
                actor_id = %actor_id,
                actor_role = %actor_role,
                action = %kind,
                target_user_id = %target_user_id,
                target_role = %target_role,
                rule = reason.code(),
                "Moderation denied"
            );
            metrics::counter!("moderation.denials", "reason" => reason.code()).increment(1);
        }

        decision
    }

    /// 鉴权失败时返回 `AppError::Denied`
    pub fn require(
        &self,
        actor_id: Uuid,
        actor_role: Role,
        kind: ModerationKind,
        target_user_id: Uuid,
        target_role: Role,
    ) -> Result<(), AppError> {
        match self.check(actor_id, actor_role, kind, target_user_id, target_role) {
            Decision::Allowed => Ok(()),
            Decision::Denied { reason } => Err(AppError::Denied(reason)),
        }
    }

    /// 仅管理员可见的视图（踢出报告等）
    pub fn require_admin(&self, actor_role: Role) -> Result<(), AppError> {
        if actor_role == Role::Admin {
            Ok(())
        } else {
            Err(AppError::Forbidden)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids() -> (Uuid, Uuid) {
        (Uuid::new_v4(), Uuid::new_v4())
    }

    #[test]
    fn test_self_target_always_denied() {
        let actor = Uuid::new_v4();
        for role in Role::ALL {
            for kind in ModerationKind::ALL {
                for target_role in Role::ALL {
                    assert_eq!(
                        authorize(actor, role, kind, actor, target_role),
                        Decision::denied(DenialReason::SelfTarget)
                    );
                }
            }
        }
    }

    #[test]
    fn test_admin_target_always_denied() {
        let (actor, target) = ids();
        for role in Role::ALL {
            for kind in ModerationKind::ALL {
                assert_eq!(
                    authorize(actor, role, kind, target, Role::Admin),
                    Decision::denied(DenialReason::TargetIsAdmin)
                );
            }
        }
    }

    #[test]
    fn test_member_cannot_moderate() {
        let (actor, target) = ids();
        assert_eq!(
            authorize(actor, Role::Member, ModerationKind::BanUser, target, Role::Member),
            Decision::denied(DenialReason::MissingPermission {
                permission: Permission::BanUsers
            })
        );
        assert_eq!(
            authorize(actor, Role::Member, ModerationKind::KickUser, target, Role::Member),
            Decision::denied(DenialReason::MissingPermission {
                permission: Permission::KickUsers
            })
        );
    }

    #[test]
    fn test_moderator_cannot_kick_moderator() {
        let (actor, target) = ids();
        assert_eq!(
            authorize(actor, Role::Moderator, ModerationKind::KickUser, target, Role::Moderator),
            Decision::denied(DenialReason::TargetIsModerator)
        );
        assert_eq!(
            authorize(actor, Role::Admin, ModerationKind::KickUser, target, Role::Moderator),
            Decision::denied(DenialReason::TargetIsModerator)
        );
        assert!(authorize(actor, Role::Moderator, ModerationKind::KickUser, target, Role::Member)
            .is_allowed());
    }

    #[test]
    fn test_moderator_can_ban_moderator() {
        let (actor, target) = ids();
        assert!(
            authorize(actor, Role::Moderator, ModerationKind::BanUser, target, Role::Moderator)
                .is_allowed()
        );
    }

    #[test]
    fn test_grant_requires_member_target() {
        let (actor, target) = ids();
        assert!(
            authorize(actor, Role::Admin, ModerationKind::GrantModerator, target, Role::Member)
                .is_allowed()
        );
        assert_eq!(
            authorize(actor, Role::Admin, ModerationKind::GrantModerator, target, Role::Moderator),
            Decision::denied(DenialReason::TargetRoleMismatch {
                expected: Role::Member,
                actual: Role::Moderator,
            })
        );
        assert_eq!(
            authorize(actor, Role::Moderator, ModerationKind::GrantModerator, target, Role::Member),
            Decision::denied(DenialReason::MissingPermission {
                permission: Permission::AddModerators
            })
        );
    }

    #[test]
    fn test_revoke_requires_moderator_target() {
        let (actor, target) = ids();
        assert!(authorize(
            actor,
            Role::Admin,
            ModerationKind::RevokeModerator,
            target,
            Role::Moderator
        )
        .is_allowed());
        assert_eq!(
            authorize(actor, Role::Admin, ModerationKind::RevokeModerator, target, Role::Member),
            Decision::denied(DenialReason::TargetRoleMismatch {
                expected: Role::Moderator,
                actual: Role::Member,
            })
        );
    }

    #[test]
    fn test_authorize_is_idempotent() {
        let (actor, target) = ids();
        for role in Role::ALL {
            for kind in ModerationKind::ALL {
                for target_role in Role::ALL {
                    assert_eq!(
                        authorize(actor, role, kind, target, target_role),
                        authorize(actor, role, kind, target, target_role)
                    );
                }
            }
        }
    }

    #[test]
    fn test_require_admin() {
        let service = PermissionService::new();
        assert!(service.require_admin(Role::Admin).is_ok());
        assert!(matches!(
            service.require_admin(Role::Moderator),
            Err(AppError::Forbidden)
        ));
    }
}
