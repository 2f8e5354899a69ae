//! Admin-only analytics and moderation API.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use scribe_store::{
    BlockedIp, Comment, DailyCount, DailyPlatformCount, IpActivity, NewComment, Overview, Paged,
    PlatformCount, PostDetail, PostStats, UserSummary,
};

use crate::api::CommentBody;
use crate::error::ApiError;
use crate::extract::{ClientIp, RequireAdmin};
use crate::server::{now, AppState};

const DEFAULT_PER_PAGE: usize = 20;
const MAX_PER_PAGE: usize = 100;
const DEFAULT_DAYS: u32 = 30;
const MAX_DAYS: u32 = 365;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/analytics/overview", get(overview))
        .route("/api/analytics/chart", get(chart))
        .route("/api/analytics/shares_by_platform", get(shares_by_platform))
        .route("/api/analytics/daily_shares_platform", get(daily_shares_platform))
        .route("/api/analytics/posts", get(posts))
        .route("/api/analytics/posts/{slug}", get(post_detail))
        .route("/api/admin/comments", get(comments))
        .route("/api/admin/comments/reply", post(reply))
        .route("/api/admin/users", get(users))
        .route("/api/admin/users/{id}/ban", post(ban))
        .route("/api/admin/users/{id}/unban", post(unban))
        .route("/api/admin/users/{id}/comments", get(user_comments))
        .route("/api/admin/users/{id}/comments/delete_all", post(delete_user_comments))
        .route("/api/admin/blocked_ips", get(blocked_ips))
        .route("/api/admin/blocked_ips/lookup", get(lookup_ip))
        .route("/api/admin/blocked_ips/action", post(block_action))
        .route("/api/admin/blocked_ips/{id}/analysis", get(blocked_activity))
        .route("/api/admin/blocked_ips/{id}/unblock", post(unblock))
}

#[derive(Debug, Default, Deserialize)]
struct ListQuery {
    page: Option<usize>,
    per_page: Option<usize>,
    slug: Option<String>,
}

impl ListQuery {
    fn page(&self) -> usize {
        self.page.unwrap_or(1).max(1)
    }

    fn per_page(&self) -> usize {
        self.per_page.unwrap_or(DEFAULT_PER_PAGE).clamp(1, MAX_PER_PAGE)
    }
}

#[derive(Debug, Default, Deserialize)]
struct DaysQuery {
    days: Option<u32>,
}

impl DaysQuery {
    fn days(&self) -> u32 {
        self.days.unwrap_or(DEFAULT_DAYS).clamp(1, MAX_DAYS)
    }
}

async fn overview(
    State(state): State<Arc<AppState>>,
    _admin: RequireAdmin,
) -> Result<Json<Overview>, ApiError> {
    Ok(Json(state.store.overview()?))
}

async fn chart(
    State(state): State<Arc<AppState>>,
    _admin: RequireAdmin,
    Query(query): Query<DaysQuery>,
) -> Result<Json<DailyCount>, ApiError> {
    Ok(Json(state.store.daily(query.days(), now())?))
}

async fn shares_by_platform(
    State(state): State<Arc<AppState>>,
    _admin: RequireAdmin,
) -> Result<Json<Vec<PlatformCount>>, ApiError> {
    Ok(Json(state.store.shares_by_platform()?))
}

async fn daily_shares_platform(
    State(state): State<Arc<AppState>>,
    _admin: RequireAdmin,
    Query(query): Query<DaysQuery>,
) -> Result<Json<Vec<DailyPlatformCount>>, ApiError> {
    Ok(Json(state.store.daily_shares_by_platform(query.days(), now())?))
}

async fn posts(
    State(state): State<Arc<AppState>>,
    _admin: RequireAdmin,
    Query(query): Query<ListQuery>,
) -> Result<Json<Paged<PostStats>>, ApiError> {
    Ok(Json(state.store.posts_page(query.page(), query.per_page())?))
}

async fn post_detail(
    State(state): State<Arc<AppState>>,
    _admin: RequireAdmin,
    Path(slug): Path<String>,
    Query(query): Query<DaysQuery>,
) -> Result<Json<PostDetail>, ApiError> {
    Ok(Json(state.store.post_detail(&slug, query.days(), now())?))
}

async fn comments(
    State(state): State<Arc<AppState>>,
    _admin: RequireAdmin,
    Query(query): Query<ListQuery>,
) -> Result<Json<Paged<Comment>>, ApiError> {
    let slug = query.slug.as_deref().filter(|s| !s.is_empty());
    Ok(Json(state.store.admin_comments(slug, query.page(), query.per_page())?))
}

/// Reply as the admin to any comment. Admin replies skip the rate limit.
async fn reply(
    State(state): State<Arc<AppState>>,
    ClientIp(ip): ClientIp,
    RequireAdmin(admin): RequireAdmin,
    Json(body): Json<CommentBody>,
) -> Result<(StatusCode, Json<Comment>), ApiError> {
    let parent_id = body
        .parent_id
        .ok_or_else(|| ApiError::BadRequest("parent_id is required".to_string()))?;
    let parent = state
        .store
        .comment(parent_id)?
        .ok_or_else(|| ApiError::NotFound("Comment".to_string()))?;

    let comment = state.store.add_comment(
        &NewComment {
            slug: parent.slug,
            parent_id: Some(parent.id),
            user_id: admin.id,
            author_name: admin.name.clone(),
            author_avatar: admin.avatar_url.clone(),
            content: body.content,
            ip,
        },
        now(),
    )?;
    Ok((StatusCode::CREATED, Json(comment)))
}

async fn users(
    State(state): State<Arc<AppState>>,
    _admin: RequireAdmin,
    Query(query): Query<ListQuery>,
) -> Result<Json<Paged<UserSummary>>, ApiError> {
    Ok(Json(state.store.users_page(query.page(), query.per_page())?))
}

async fn ban(
    State(state): State<Arc<AppState>>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    if id == admin.id {
        return Err(ApiError::BadRequest("Admins cannot ban themselves".to_string()));
    }
    state.store.set_banned(id, true)?;
    tracing::info!(user = id, admin = admin.id, "User banned");
    Ok(StatusCode::NO_CONTENT)
}

async fn unban(
    State(state): State<Arc<AppState>>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.store.set_banned(id, false)?;
    tracing::info!(user = id, admin = admin.id, "User unbanned");
    Ok(StatusCode::NO_CONTENT)
}

async fn user_comments(
    State(state): State<Arc<AppState>>,
    _admin: RequireAdmin,
    Path(id): Path<i64>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Paged<Comment>>, ApiError> {
    if state.store.user(id)?.is_none() {
        return Err(ApiError::NotFound("User".to_string()));
    }
    Ok(Json(state.store.user_comments(id, query.page(), query.per_page())?))
}

#[derive(Debug, Serialize)]
struct Deleted {
    deleted: usize,
}

async fn delete_user_comments(
    State(state): State<Arc<AppState>>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<i64>,
) -> Result<Json<Deleted>, ApiError> {
    if state.store.user(id)?.is_none() {
        return Err(ApiError::NotFound("User".to_string()));
    }
    let deleted = state.store.delete_all_user_comments(id)?;
    tracing::info!(user = id, admin = admin.id, deleted, "Deleted all comments by user");
    Ok(Json(Deleted { deleted }))
}

async fn blocked_ips(
    State(state): State<Arc<AppState>>,
    _admin: RequireAdmin,
    Query(query): Query<ListQuery>,
) -> Result<Json<Paged<BlockedIp>>, ApiError> {
    Ok(Json(state.store.blocked_ips(query.page(), query.per_page())?))
}

#[derive(Debug, Deserialize)]
struct LookupQuery {
    #[serde(default)]
    ip: String,
}

async fn lookup_ip(
    State(state): State<Arc<AppState>>,
    _admin: RequireAdmin,
    Query(query): Query<LookupQuery>,
) -> Result<Json<IpActivity>, ApiError> {
    let ip = query.ip.trim();
    if ip.is_empty() {
        return Err(ApiError::BadRequest("ip is required".to_string()));
    }
    Ok(Json(state.store.ip_lookup(ip)?))
}

async fn blocked_activity(
    State(state): State<Arc<AppState>>,
    _admin: RequireAdmin,
    Path(id): Path<i64>,
) -> Result<Json<IpActivity>, ApiError> {
    Ok(Json(state.store.blocked_ip_activity(id)?))
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
enum BlockAction {
    Block,
    Unblock,
}

#[derive(Debug, Deserialize)]
struct BlockRequest {
    action: BlockAction,
    ip: Option<String>,
    comment_id: Option<i64>,
    label: Option<String>,
    reason: Option<String>,
}

#[derive(Debug, Serialize)]
struct BlockOutcome {
    blocked: bool,
    entry: Option<BlockedIp>,
}

/// Block by address or by the address behind a comment; unblock by address.
async fn block_action(
    State(state): State<Arc<AppState>>,
    RequireAdmin(admin): RequireAdmin,
    Json(request): Json<BlockRequest>,
) -> Result<Json<BlockOutcome>, ApiError> {
    let ip = request.ip.as_deref().map(str::trim).filter(|ip| !ip.is_empty());
    let reason = request.reason.as_deref();

    let outcome = match (request.action, ip, request.comment_id) {
        (BlockAction::Block, Some(ip), _) => {
            let entry = state
                .store
                .block_ip(ip, request.label.as_deref(), reason, now())?;
            BlockOutcome { blocked: true, entry: Some(entry) }
        }
        (BlockAction::Block, None, Some(comment_id)) => {
            let entry = state.store.block_comment_author(comment_id, reason, now())?;
            BlockOutcome { blocked: true, entry: Some(entry) }
        }
        (BlockAction::Unblock, Some(ip), _) => {
            if !state.store.unblock_address(ip)? {
                return Err(ApiError::NotFound("Blocked IP".to_string()));
            }
            BlockOutcome { blocked: false, entry: None }
        }
        (BlockAction::Block, None, None) => {
            return Err(ApiError::BadRequest("ip or comment_id is required".to_string()));
        }
        (BlockAction::Unblock, None, _) => {
            return Err(ApiError::BadRequest("ip is required to unblock".to_string()));
        }
    };

    tracing::info!(admin = admin.id, action = ?request.action, "Blocked IP list changed");
    Ok(Json(outcome))
}

async fn unblock(
    State(state): State<Arc<AppState>>,
    _admin: RequireAdmin,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.store.unblock_ip(id)?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::tests::{body_json, json_request, send, sign_in, test_state};
    use axum::body::Body;
    use axum::http::{header, Request};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn admin_get(uri: &str, cookie: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .header(header::COOKIE, cookie)
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn analytics_require_admin() {
        let temp = tempfile::tempdir().unwrap();
        let state = test_state(temp.path());
        let (_, reader) = sign_in(&state, "reader");

        let response = send(&state, admin_get("/api/analytics/overview", "")).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = send(&state, admin_get("/api/analytics/overview", &reader)).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn reports_analytics() {
        let temp = tempfile::tempdir().unwrap();
        let state = test_state(temp.path());
        let (_, admin) = sign_in(&state, "admin");
        let now = now();
        state.store.record_view("hello-world", "192.0.2.1", now).unwrap();
        state.store.record_view("hello-world", "192.0.2.1", now).unwrap();
        state.store.record_share("hello-world", "reddit", "192.0.2.1", now).unwrap();

        let data = body_json(send(&state, admin_get("/api/analytics/overview", &admin)).await).await;
        assert_eq!(data["total_views"], 2);
        assert_eq!(data["unique_views"], 1);
        assert_eq!(data["total_shares"], 1);

        let data = body_json(send(&state, admin_get("/api/analytics/chart?days=7", &admin)).await).await;
        assert_eq!(data["views"].as_array().unwrap().len(), 7);

        let data = body_json(
            send(&state, admin_get("/api/analytics/shares_by_platform", &admin)).await,
        )
        .await;
        assert_eq!(data, json!([{ "platform": "reddit", "count": 1 }]));

        let data = body_json(
            send(&state, admin_get("/api/analytics/daily_shares_platform?days=3", &admin)).await,
        )
        .await;
        assert_eq!(data.as_array().unwrap().len(), 3);

        let data = body_json(send(&state, admin_get("/api/analytics/posts", &admin)).await).await;
        assert_eq!(data["items"][0]["slug"], "hello-world");

        let data = body_json(
            send(&state, admin_get("/api/analytics/posts/hello-world", &admin)).await,
        )
        .await;
        assert_eq!(data["stats"]["views"], 2);
    }

    #[tokio::test]
    async fn moderates_users_and_comments() {
        let temp = tempfile::tempdir().unwrap();
        let state = test_state(temp.path());
        let (_, admin) = sign_in(&state, "admin");
        let (reader, reader_cookie) = sign_in(&state, "reader");

        let created = body_json(
            send(
                &state,
                json_request("POST", "/api/comments/second", Some(&reader_cookie), json!({ "content": "spam" })),
            )
            .await,
        )
        .await;

        let response = send(
            &state,
            json_request(
                "POST",
                "/api/admin/comments/reply",
                Some(&admin),
                json!({ "parent_id": created["id"], "content": "Please don't" }),
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(body_json(response).await["slug"], "second");

        let data = body_json(send(&state, admin_get("/api/admin/comments?slug=second", &admin)).await).await;
        assert_eq!(data["total"], 2);

        let data = body_json(send(&state, admin_get("/api/admin/users", &admin)).await).await;
        assert_eq!(data["total"], 2);

        let uri = format!("/api/admin/users/{}/ban", reader.id);
        let response = send(&state, json_request("POST", &uri, Some(&admin), json!({}))).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(state.store.user(reader.id).unwrap().unwrap().banned);

        let uri = format!("/api/admin/users/{}/unban", reader.id);
        send(&state, json_request("POST", &uri, Some(&admin), json!({}))).await;
        assert!(!state.store.user(reader.id).unwrap().unwrap().banned);

        let uri = format!("/api/admin/users/{}/comments", reader.id);
        let data = body_json(send(&state, admin_get(&uri, &admin)).await).await;
        assert_eq!(data["items"][0]["content"], "spam");

        let uri = format!("/api/admin/users/{}/comments/delete_all", reader.id);
        let data = body_json(send(&state, json_request("POST", &uri, Some(&admin), json!({}))).await).await;
        assert_eq!(data["deleted"], 1);

        let response = send(&state, admin_get("/api/admin/users/999/comments", &admin)).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn blocks_and_unblocks_addresses() {
        let temp = tempfile::tempdir().unwrap();
        let state = test_state(temp.path());
        let (_, admin) = sign_in(&state, "admin");
        let (_, reader) = sign_in(&state, "reader");

        let created = body_json(
            send(
                &state,
                json_request("POST", "/api/comments/second", Some(&reader), json!({ "content": "hi" })),
            )
            .await,
        )
        .await;

        let response = send(
            &state,
            json_request(
                "POST",
                "/api/admin/blocked_ips/action",
                Some(&admin),
                json!({ "action": "block", "comment_id": created["id"], "reason": "spam" }),
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let outcome = body_json(response).await;
        assert_eq!(outcome["blocked"], true);

        let analysis = format!("/api/admin/blocked_ips/{}/analysis", outcome["entry"]["id"]);
        let response = send(&state, admin_get(&analysis, &reader)).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let data = body_json(send(&state, admin_get(&analysis, &admin)).await).await;
        assert_eq!(data["blocked"], true);
        assert_eq!(data["comments"][0]["content"], "hi");
        let response = send(&state, admin_get("/api/admin/blocked_ips/999/analysis", &admin)).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        // Requests in tests come from 203.0.113.10
        let data = body_json(
            send(&state, admin_get("/api/admin/blocked_ips/lookup?ip=203.0.113.10", &admin)).await,
        )
        .await;
        assert_eq!(data["blocked"], true);
        assert_eq!(data["comments"].as_array().unwrap().len(), 1);

        let response = send(
            &state,
            json_request(
                "POST",
                "/api/admin/blocked_ips/action",
                Some(&admin),
                json!({ "action": "unblock", "ip": "203.0.113.10" }),
            ),
        )
        .await;
        assert_eq!(body_json(response).await["blocked"], false);

        let response = send(
            &state,
            json_request(
                "POST",
                "/api/admin/blocked_ips/action",
                Some(&admin),
                json!({ "action": "block", "ip": "198.51.100.1", "label": "scraper" }),
            ),
        )
        .await;
        let id = body_json(response).await["entry"]["id"].as_i64().unwrap();

        let data = body_json(send(&state, admin_get("/api/admin/blocked_ips", &admin)).await).await;
        assert_eq!(data["items"][0]["label"], "scraper");

        let uri = format!("/api/admin/blocked_ips/{id}/unblock");
        let response = send(&state, json_request("POST", &uri, Some(&admin), json!({}))).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        let response = send(&state, json_request("POST", &uri, Some(&admin), json!({}))).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = send(
            &state,
            json_request("POST", "/api/admin/blocked_ips/action", Some(&admin), json!({ "action": "unblock" })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
