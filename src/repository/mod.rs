//! Storage layer
//! 成员、审计、社区目录的存储接口，以及 PostgreSQL 与内存实现

pub mod audit_repo;
pub mod community_repo;
pub mod membership_repo;
pub mod memory;

pub use audit_repo::*;
pub use community_repo::*;
pub use membership_repo::*;
pub use memory::*;
