//! 广播目标解析的 HTTP 处理器

use axum::{extract::State, response::IntoResponse, Json};
use serde_json::json;
use std::sync::Arc;
use validator::Validate;

use crate::{
    auth::AuthContext, error::AppError, middleware::AppState,
    models::community::ResolveTargetsRequest, models::role::Role, services::TargetSetResolver,
};

/// 按顺序重放选择操作并返回最终的子群组集合，仅全局管理员可用
pub async fn resolve_targets(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
    Json(req): Json<ResolveTargetsRequest>,
) -> Result<impl IntoResponse, AppError> {
    let role = state.moderation_service.global_role(auth_context.user_id).await?;
    if role != Role::Admin {
        return Err(AppError::Forbidden);
    }
    req.validate()?;

    let universe = state.community_directory.load_universe().await?;
    let mut resolver = TargetSetResolver::new(universe);
    for op in req.operations {
        resolver.apply(op);
    }

    let targets = resolver.effective_targets();

    tracing::info!(
        actor_id = %auth_context.user_id,
        select_all = resolver.is_select_all(),
        target_count = targets.len(),
        "Broadcast targets resolved"
    );

    Ok(Json(json!({
        "select_all": resolver.is_select_all(),
        "selected_community_ids": resolver.selected_community_ids(),
        "sub_group_ids": targets,
        "selected_count": targets.len(),
    })))
}
