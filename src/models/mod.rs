//! 数据模型模块
//! 角色与权限、审核操作、社区层级

pub mod community;
pub mod moderation;
pub mod role;
