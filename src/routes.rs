//! 路由注册
//! 创建所有 API 路由并应用中间件

use axum::{
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{handlers, middleware::AppState};

/// 创建应用路由
pub fn create_router(state: Arc<AppState>) -> Router {
    // 公开端点（健康检查）
    let public_routes = Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/ready", get(handlers::health::readiness_check));

    // 需要认证的路由
    let authenticated_routes = Router::new()
        // 群组审核
        .route(
            "/api/v1/groups/{group_id}/moderation/authorize",
            post(handlers::moderation::authorize),
        )
        .route(
            "/api/v1/groups/{group_id}/members",
            get(handlers::moderation::list_members),
        )
        .route(
            "/api/v1/groups/{group_id}/bans",
            post(handlers::moderation::ban_user),
        )
        .route(
            "/api/v1/groups/{group_id}/bans/{user_id}",
            get(handlers::moderation::get_ban_status),
        )
        .route(
            "/api/v1/groups/{group_id}/kicks",
            post(handlers::moderation::kick_user),
        )
        .route(
            "/api/v1/groups/{group_id}/messages/{message_id}/delete",
            post(handlers::moderation::delete_message),
        )
        .route(
            "/api/v1/groups/{group_id}/moderators",
            post(handlers::moderation::grant_moderator),
        )
        .route(
            "/api/v1/groups/{group_id}/moderators/{user_id}",
            delete(handlers::moderation::revoke_moderator),
        )

        // 审计日志
        .route(
            "/api/v1/groups/{group_id}/audit-logs",
            get(handlers::audit::list_audit_logs),
        )

        // 踢出报告（管理员）
        .route("/api/v1/kick-reports", get(handlers::reports::list_kick_reports))
        .route(
            "/api/v1/kick-reports/{report_id}/review",
            post(handlers::reports::review_kick_report),
        )
        .route(
            "/api/v1/kick-reports/{report_id}/complete",
            post(handlers::reports::complete_kick),
        )

        // 广播目标
        .route(
            "/api/v1/broadcasts/targets",
            post(handlers::broadcast::resolve_targets),
        )
        .layer(axum::middleware::from_fn_with_state(
            state.jwt_service.clone(),
            crate::auth::middleware::jwt_auth_middleware,
        ));

    // 组合所有路由
    Router::new()
        .merge(public_routes)
        .merge(authenticated_routes)
        .layer(axum::middleware::from_fn(crate::middleware::request_tracking_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
