//! 踢出报告的 HTTP 处理器（仅管理员）

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    auth::AuthContext, error::AppError, middleware::AppState,
    models::moderation::KickReportQuery,
};

pub async fn list_kick_reports(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
    Query(query): Query<KickReportQuery>,
) -> Result<impl IntoResponse, AppError> {
    let role = state.moderation_service.global_role(auth_context.user_id).await?;
    let reports = state
        .moderation_service
        .list_kick_reports(role, query.status)
        .await?;

    Ok(Json(json!({
        "reports": reports,
        "count": reports.len()
    })))
}

pub async fn review_kick_report(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
    Path(report_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let role = state.moderation_service.global_role(auth_context.user_id).await?;
    let report = state
        .moderation_service
        .review_kick_report(auth_context.user_id, role, report_id)
        .await?;

    Ok(Json(json!({ "report": report })))
}

/// 完成踢出中未生效的成员移除，报告的发起版主或群组管理员可调用
pub async fn complete_kick(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
    Path(report_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let report = state
        .moderation_service
        .complete_kick(auth_context.user_id, report_id)
        .await?;

    Ok(Json(json!({ "report": report })))
}
