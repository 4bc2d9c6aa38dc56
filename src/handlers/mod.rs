//! HTTP 处理器模块

pub mod audit;
pub mod broadcast;
pub mod health;
pub mod moderation;
pub mod reports;
