//! Business logic services layer

pub mod audit_service;
pub mod moderation_service;
pub mod permission_service;
pub mod target_resolver;

pub use audit_service::AuditService;
pub use moderation_service::ModerationService;
pub use permission_service::PermissionService;
pub use target_resolver::{TargetSelection, TargetSetResolver};
