//! 群组审核的 HTTP 处理器

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::{
    auth::AuthContext,
    error::AppError,
    middleware::AppState,
    models::moderation::{
        AuthorizeRequest, BanUserRequest, DeleteMessageRequest, GrantModeratorRequest,
        KickUserRequest,
    },
    models::role::Role,
};

/// 操作者在该群组中的角色（以成员存储为准，令牌中的角色声明不参与鉴权）
async fn actor_role(state: &AppState, auth: &AuthContext, group_id: Uuid) -> Result<Role, AppError> {
    state
        .moderation_service
        .actor_role(auth.user_id, group_id)
        .await
}

/// 询问操作者能否执行某个操作（不做任何修改）
pub async fn authorize(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
    Path(group_id): Path<Uuid>,
    Json(req): Json<AuthorizeRequest>,
) -> Result<impl IntoResponse, AppError> {
    let role = actor_role(&state, &auth_context, group_id).await?;

    let decision = state
        .moderation_service
        .authorize(auth_context.user_id, role, group_id, req.target_user_id, req.action)
        .await?;

    Ok(Json(json!({
        "action": req.action,
        "actor_role": role,
        "target_user_id": req.target_user_id,
        "result": decision,
    })))
}

/// 群组成员列表
pub async fn list_members(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
    Path(group_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    actor_role(&state, &auth_context, group_id).await?;

    let members = state.moderation_service.list_members(group_id).await?;

    Ok(Json(json!({
        "members": members,
        "count": members.len()
    })))
}

/// 封禁成员
pub async fn ban_user(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
    Path(group_id): Path<Uuid>,
    Json(req): Json<BanUserRequest>,
) -> Result<impl IntoResponse, AppError> {
    req.validate()?;
    let role = actor_role(&state, &auth_context, group_id).await?;

    let ban = state
        .moderation_service
        .ban_user(
            auth_context.user_id,
            role,
            group_id,
            req.target_user_id,
            &req.reason,
            req.duration_secs.map(chrono::Duration::seconds),
        )
        .await?;

    Ok((StatusCode::CREATED, Json(json!({ "ban": ban }))))
}

/// 查询成员当前是否被封禁（消息发送前调用），仅群组成员可查询
pub async fn get_ban_status(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
    Path((group_id, user_id)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse, AppError> {
    actor_role(&state, &auth_context, group_id).await?;

    let ban = state.moderation_service.active_ban(group_id, user_id).await?;

    Ok(Json(json!({
        "user_id": user_id,
        "group_id": group_id,
        "banned": ban.is_some(),
        "expires_at": ban.map(|b| b.expires_at),
    })))
}

/// 踢出成员
pub async fn kick_user(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
    Path(group_id): Path<Uuid>,
    Json(req): Json<KickUserRequest>,
) -> Result<impl IntoResponse, AppError> {
    req.validate()?;
    let role = actor_role(&state, &auth_context, group_id).await?;

    let report = state
        .moderation_service
        .kick_user(
            auth_context.user_id,
            role,
            group_id,
            req.target_user_id,
            &req.reason,
            req.notes.as_deref(),
        )
        .await?;

    Ok((StatusCode::CREATED, Json(json!({ "report": report }))))
}

/// 删除消息（记录审计，消息本身由消息服务删除）
pub async fn delete_message(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
    Path((group_id, message_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<DeleteMessageRequest>,
) -> Result<impl IntoResponse, AppError> {
    req.validate()?;
    let role = actor_role(&state, &auth_context, group_id).await?;

    let action = state
        .moderation_service
        .delete_message(
            auth_context.user_id,
            role,
            group_id,
            req.author_id,
            message_id,
            req.reason.as_deref(),
        )
        .await?;

    Ok(Json(json!({ "action": action })))
}

/// 授予版主
pub async fn grant_moderator(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
    Path(group_id): Path<Uuid>,
    Json(req): Json<GrantModeratorRequest>,
) -> Result<impl IntoResponse, AppError> {
    let role = actor_role(&state, &auth_context, group_id).await?;

    state
        .moderation_service
        .grant_moderator(auth_context.user_id, role, group_id, req.user_id)
        .await?;

    Ok(Json(json!({
        "user_id": req.user_id,
        "role": Role::Moderator,
    })))
}

/// 撤销版主
pub async fn revoke_moderator(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
    Path((group_id, user_id)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse, AppError> {
    let role = actor_role(&state, &auth_context, group_id).await?;

    state
        .moderation_service
        .revoke_moderator(auth_context.user_id, role, group_id, user_id)
        .await?;

    Ok(Json(json!({
        "user_id": user_id,
        "role": Role::Member,
    })))
}
