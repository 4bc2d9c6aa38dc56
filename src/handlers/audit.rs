//! 审计日志的 HTTP 处理器

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    auth::AuthContext,
    error::AppError,
    middleware::AppState,
    models::{moderation::AuditLogQuery, role::Role},
};

/// 查询群组审计日志（最新的在前），仅版主与管理员可见
pub async fn list_audit_logs(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
    Path(group_id): Path<Uuid>,
    Query(query): Query<AuditLogQuery>,
) -> Result<impl IntoResponse, AppError> {
    let role = state
        .moderation_service
        .actor_role(auth_context.user_id, group_id)
        .await?;
    if role == Role::Member {
        return Err(AppError::Forbidden);
    }

    let max_limit = state.config.moderation.audit_page_limit;
    let limit = query.limit.unwrap_or(max_limit).clamp(1, max_limit);

    let logs = state
        .audit_service
        .list_page(group_id, query.filter(), query.offset, limit)
        .await?;

    Ok(Json(json!({
        "logs": logs,
        "count": logs.len(),
        "offset": query.offset,
        "limit": limit,
    })))
}
