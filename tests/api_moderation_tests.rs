//! 审核 API 集成测试（内存存储）

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

mod common;
use common::{create_test_app_state, setup, token_for, universe_with, TestContext};

use community_moderation::{
    middleware::AppState,
    models::{community::CommunityUniverse, role::Role},
    repository::MembershipStore,
    routes,
};
use std::sync::Arc;

async fn app() -> (Router, Arc<AppState>, TestContext) {
    app_with_universe(CommunityUniverse::empty()).await
}

async fn app_with_universe(universe: CommunityUniverse) -> (Router, Arc<AppState>, TestContext) {
    let ctx = setup().await;
    let state = create_test_app_state(&ctx, universe);
    (routes::create_router(state.clone()), state, ctx)
}

async fn send(
    app: Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

#[tokio::test]
async fn test_health_endpoint() {
    let (app, _, _) = app().await;

    let (status, json) = send(app, "GET", "/health", None, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert!(json["version"].is_string());
}

#[tokio::test]
async fn test_readiness_without_database() {
    let (app, _, _) = app().await;

    let (status, json) = send(app, "GET", "/ready", None, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["ready"], true);
    assert_eq!(json["checks"][0]["name"], "memory_store");
}

#[tokio::test]
async fn test_requires_token() {
    let (app, _, ctx) = app().await;

    let uri = format!("/api/v1/groups/{}/members", ctx.group.group_id);
    let (status, json) = send(app, "GET", &uri, None, None).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["error"]["code"], 401);
}

#[tokio::test]
async fn test_authorize_endpoint() {
    let (app, state, ctx) = app().await;
    let g = &ctx.group;
    let token = token_for(&state, g.moderator_id, false);

    let uri = format!("/api/v1/groups/{}/moderation/authorize", g.group_id);
    let (status, json) = send(
        app.clone(),
        "POST",
        &uri,
        Some(&token),
        Some(json!({ "target_user_id": g.member_id, "action": "kick_user" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["actor_role"], "moderator");
    assert_eq!(json["result"]["decision"], "allowed");

    let (status, json) = send(
        app,
        "POST",
        &uri,
        Some(&token),
        Some(json!({ "target_user_id": g.admin_id, "action": "ban_user" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["result"]["decision"], "denied");
    assert_eq!(json["result"]["reason"]["rule"], "target_is_admin");
}

#[tokio::test]
async fn test_ban_and_status() {
    let (app, state, ctx) = app().await;
    let g = &ctx.group;
    let token = token_for(&state, g.moderator_id, false);

    let (status, json) = send(
        app.clone(),
        "POST",
        &format!("/api/v1/groups/{}/bans", g.group_id),
        Some(&token),
        Some(json!({ "target_user_id": g.member_id, "reason": "spam", "duration_secs": 300 })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["ban"]["user_id"], g.member_id.to_string());

    let (status, json) = send(
        app,
        "GET",
        &format!("/api/v1/groups/{}/bans/{}", g.group_id, g.member_id),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["banned"], true);
}

#[tokio::test]
async fn test_denied_ban_returns_reason() {
    let (app, state, ctx) = app().await;
    let g = &ctx.group;
    let token = token_for(&state, g.member_id, false);

    let (status, json) = send(
        app,
        "POST",
        &format!("/api/v1/groups/{}/bans", g.group_id),
        Some(&token),
        Some(json!({ "target_user_id": g.other_member_id, "reason": "spam" })),
    )
    .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json["error"]["reason"]["rule"], "missing_permission");
    assert_eq!(json["error"]["retryable"], false);
}

#[tokio::test]
async fn test_blank_reason_is_bad_request() {
    let (app, state, ctx) = app().await;
    let g = &ctx.group;
    let token = token_for(&state, g.moderator_id, false);

    let (status, _) = send(
        app,
        "POST",
        &format!("/api/v1/groups/{}/kicks", g.group_id),
        Some(&token),
        Some(json!({ "target_user_id": g.member_id, "reason": "  " })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(ctx.audit_store.is_empty().await);
}

#[tokio::test]
async fn test_non_member_actor_forbidden() {
    let (app, state, ctx) = app().await;
    let token = token_for(&state, Uuid::new_v4(), false);

    let (status, _) = send(
        app,
        "GET",
        &format!("/api/v1/groups/{}/members", ctx.group.group_id),
        Some(&token),
        None,
    )
    .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_kick_then_admin_reviews_report() {
    let (app, state, ctx) = app().await;
    let g = &ctx.group;
    let moderator_token = token_for(&state, g.moderator_id, false);
    let admin_token = token_for(&state, g.admin_id, true);

    let (status, json) = send(
        app.clone(),
        "POST",
        &format!("/api/v1/groups/{}/kicks", g.group_id),
        Some(&moderator_token),
        Some(json!({ "target_user_id": g.member_id, "reason": "harassment", "notes": "see logs" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["report"]["status"], "pending");
    let report_id = json["report"]["id"].as_str().unwrap().to_string();

    // 版主不能查看报告
    let (status, _) = send(
        app.clone(),
        "GET",
        "/api/v1/kick-reports",
        Some(&moderator_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, json) = send(
        app.clone(),
        "GET",
        "/api/v1/kick-reports?status=pending",
        Some(&admin_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["count"], 1);

    let (status, json) = send(
        app.clone(),
        "POST",
        &format!("/api/v1/kick-reports/{}/review", report_id),
        Some(&admin_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["report"]["status"], "reviewed");

    let (status, _) = send(
        app,
        "POST",
        &format!("/api/v1/kick-reports/{}/review", report_id),
        Some(&admin_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_grant_revoke_and_audit_log() {
    let (app, state, ctx) = app().await;
    let g = &ctx.group;
    let admin_token = token_for(&state, g.admin_id, true);

    let (status, json) = send(
        app.clone(),
        "POST",
        &format!("/api/v1/groups/{}/moderators", g.group_id),
        Some(&admin_token),
        Some(json!({ "user_id": g.member_id })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["role"], "moderator");

    let (status, _) = send(
        app.clone(),
        "DELETE",
        &format!("/api/v1/groups/{}/moderators/{}", g.group_id, g.member_id),
        Some(&admin_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, json) = send(
        app.clone(),
        "GET",
        &format!(
            "/api/v1/groups/{}/audit-logs?kind=grant_moderator",
            g.group_id
        ),
        Some(&admin_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["count"], 1);
    assert_eq!(json["logs"][0]["detail"]["type"], "grant_moderator");

    // 普通成员不能查看审计日志
    let member_token = token_for(&state, g.other_member_id, false);
    let (status, _) = send(
        app,
        "GET",
        &format!("/api/v1/groups/{}/audit-logs", g.group_id),
        Some(&member_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_delete_message_endpoint() {
    let (app, state, ctx) = app().await;
    let g = &ctx.group;
    let token = token_for(&state, g.moderator_id, false);
    let message_id = Uuid::new_v4();

    let (status, json) = send(
        app,
        "POST",
        &format!("/api/v1/groups/{}/messages/{}/delete", g.group_id, message_id),
        Some(&token),
        Some(json!({ "author_id": g.member_id })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["action"]["detail"]["message_id"], message_id.to_string());
}

#[tokio::test]
async fn test_resolve_broadcast_targets() {
    let (universe, communities) = universe_with(&[2, 3, 1]);
    let (app, state, ctx) = app_with_universe(universe).await;
    let admin_token = token_for(&state, ctx.group.admin_id, true);

    let body = json!({
        "operations": [
            { "op": "toggle_community", "id": communities[0].id },
            { "op": "toggle_community", "id": communities[1].id },
            { "op": "toggle_sub_group", "id": communities[1].sub_group_ids[0] },
        ]
    });
    let (status, json) = send(
        app.clone(),
        "POST",
        "/api/v1/broadcasts/targets",
        Some(&admin_token),
        Some(body),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["selected_count"], 4);
    assert_eq!(json["select_all"], false);

    let (status, json) = send(
        app.clone(),
        "POST",
        "/api/v1/broadcasts/targets",
        Some(&admin_token),
        Some(json!({ "operations": [{ "op": "select_all", "enabled": true }] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["selected_count"], 6);

    let moderator_token = token_for(&state, ctx.group.moderator_id, false);
    let (status, _) = send(
        app,
        "POST",
        "/api/v1/broadcasts/targets",
        Some(&moderator_token),
        Some(json!({ "operations": [] })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_admin_claim_in_token_grants_nothing() {
    let (app, state, ctx) = app().await;
    let g = &ctx.group;
    let claimed_admin = token_for(&state, g.member_id, true);

    let (status, json) = send(
        app.clone(),
        "POST",
        &format!("/api/v1/groups/{}/moderators", g.group_id),
        Some(&claimed_admin),
        Some(json!({ "user_id": g.other_member_id })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json["error"]["reason"]["rule"], "missing_permission");
    assert_eq!(json["error"]["reason"]["permission"], "add_moderators");

    let (status, _) = send(
        app.clone(),
        "GET",
        "/api/v1/kick-reports",
        Some(&claimed_admin),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(
        app.clone(),
        "POST",
        "/api/v1/broadcasts/targets",
        Some(&claimed_admin),
        Some(json!({ "operations": [] })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // 存储中的角色仍是普通成员，版主可以封禁
    let moderator_token = token_for(&state, g.moderator_id, false);
    let (status, _) = send(
        app,
        "POST",
        &format!("/api/v1/groups/{}/bans", g.group_id),
        Some(&moderator_token),
        Some(json!({ "target_user_id": g.member_id, "reason": "spam" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn test_store_admin_without_claim_is_admin() {
    let (app, state, ctx) = app().await;
    let g = &ctx.group;
    let token = token_for(&state, g.admin_id, false);

    let (status, json) = send(
        app,
        "POST",
        &format!("/api/v1/groups/{}/moderators", g.group_id),
        Some(&token),
        Some(json!({ "user_id": g.member_id })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["role"], "moderator");
}

#[tokio::test]
async fn test_ban_status_requires_membership() {
    let (app, state, ctx) = app().await;
    let g = &ctx.group;
    let outsider = token_for(&state, Uuid::new_v4(), false);

    let (status, _) = send(
        app.clone(),
        "GET",
        &format!("/api/v1/groups/{}/bans/{}", g.group_id, g.member_id),
        Some(&outsider),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let member_token = token_for(&state, g.other_member_id, false);
    let (status, json) = send(
        app,
        "GET",
        &format!("/api/v1/groups/{}/bans/{}", g.group_id, g.member_id),
        Some(&member_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["banned"], false);
}

#[tokio::test]
async fn test_complete_applied_kick_conflicts() {
    let (app, state, ctx) = app().await;
    let g = &ctx.group;
    let moderator_token = token_for(&state, g.moderator_id, false);

    let (status, json) = send(
        app.clone(),
        "POST",
        &format!("/api/v1/groups/{}/kicks", g.group_id),
        Some(&moderator_token),
        Some(json!({ "target_user_id": g.member_id, "reason": "harassment" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(json["report"]["removal_completed_at"].is_string());
    let report_id = json["report"]["id"].as_str().unwrap().to_string();

    ctx.members
        .add_member(g.group_id, g.member_id, Role::Member)
        .await;

    let (status, _) = send(
        app,
        "POST",
        &format!("/api/v1/kick-reports/{}/complete", report_id),
        Some(&moderator_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(ctx.members.list_members(g.group_id).await.unwrap().len(), 3);
}
