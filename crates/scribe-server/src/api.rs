//! Public JSON API: search, comments and share tracking.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use scribe_content::Post;
use scribe_store::{Comment, CommentEdit, NewComment, User};

use crate::error::ApiError;
use crate::extract::{ClientIp, RequireUser};
use crate::pages::SearchQuery;
use crate::server::{now, AppState};

pub fn routes() -> Router<Arc<AppState>> {
    // Comment routes share one parameter name: a post slug for GET/POST, a comment id otherwise.
    Router::new()
        .route("/api/search", get(search))
        .route(
            "/api/comments/{key}",
            get(list_comments)
                .post(create_comment)
                .put(edit_comment)
                .delete(delete_comment),
        )
        .route("/api/comments/{key}/history", get(comment_history))
        .route("/api/share/{slug}", post(share))
}

#[derive(Debug, Serialize)]
struct SearchHit {
    title: String,
    slug: String,
    date: String,
    summary: String,
    tags: Vec<String>,
    image: Option<String>,
}

impl From<Post> for SearchHit {
    fn from(post: Post) -> Self {
        Self {
            title: post.title,
            slug: post.slug,
            date: post.date,
            summary: post.summary,
            tags: post.tags,
            image: post.image,
        }
    }
}

#[derive(Debug, Serialize)]
struct SearchResults {
    results: Vec<SearchHit>,
}

async fn search(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SearchQuery>,
) -> Json<SearchResults> {
    let posts = state.catalog.read().await.search(&query.q);
    Json(SearchResults {
        results: posts.into_iter().map(SearchHit::from).collect(),
    })
}

#[derive(Debug, Serialize)]
struct CommentList {
    comments: Vec<Comment>,
    count: i64,
}

/// The stored slug of a post, accepting the `.html` form of the path.
async fn post_slug(state: &AppState, key: &str) -> Option<String> {
    state.catalog.read().await.get(key).map(|post| post.slug.clone())
}

async fn list_comments(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> Result<Json<CommentList>, ApiError> {
    let slug = post_slug(&state, &key).await.unwrap_or(key);
    Ok(Json(CommentList {
        comments: state.store.comments_for(&slug)?,
        count: state.store.comment_count(&slug)?,
    }))
}

#[derive(Debug, Deserialize)]
pub(crate) struct CommentBody {
    #[serde(alias = "comment_text")]
    pub content: String,
    #[serde(default)]
    pub parent_id: Option<i64>,
}

/// Banned users and blocked addresses may not write comments.
pub(crate) fn ensure_can_comment(state: &AppState, user: &User, ip: &str) -> Result<(), ApiError> {
    if user.banned {
        return Err(ApiError::Forbidden("Your account is banned from commenting".to_string()));
    }
    if state.store.is_blocked(ip)? {
        return Err(ApiError::Forbidden("Commenting is blocked from this address".to_string()));
    }
    Ok(())
}

async fn create_comment(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    ClientIp(ip): ClientIp,
    RequireUser(user): RequireUser,
    Json(body): Json<CommentBody>,
) -> Result<(StatusCode, Json<Comment>), ApiError> {
    let slug = post_slug(&state, &key)
        .await
        .ok_or_else(|| ApiError::NotFound("Post".to_string()))?;
    ensure_can_comment(&state, &user, &ip)?;

    let now = now();
    state
        .store
        .check_comment_rate(user.id, &ip, now, state.config.rate_limit)?;

    let comment = state.store.add_comment(
        &NewComment {
            slug,
            parent_id: body.parent_id,
            user_id: user.id,
            author_name: user.name.clone(),
            author_avatar: user.avatar_url.clone(),
            content: body.content,
            ip,
        },
        now,
    )?;

    tracing::info!(id = comment.id, slug = %comment.slug, user = user.id, "Comment posted");
    Ok((StatusCode::CREATED, Json(comment)))
}

fn comment_id(key: &str) -> Result<i64, ApiError> {
    key.parse()
        .map_err(|_| ApiError::BadRequest(format!("Invalid comment id: {key}")))
}

async fn edit_comment(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    ClientIp(ip): ClientIp,
    RequireUser(user): RequireUser,
    Json(body): Json<CommentBody>,
) -> Result<Json<Comment>, ApiError> {
    let id = comment_id(&key)?;
    ensure_can_comment(&state, &user, &ip)?;

    let comment = state.store.edit_comment(id, &user, &body.content, now())?;
    Ok(Json(comment))
}

async fn delete_comment(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    RequireUser(user): RequireUser,
) -> Result<StatusCode, ApiError> {
    let id = comment_id(&key)?;
    state.store.soft_delete_comment(id, &user)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Edit history is visible to the comment's author and to admins only.
async fn comment_history(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    RequireUser(user): RequireUser,
) -> Result<Json<Vec<CommentEdit>>, ApiError> {
    let id = comment_id(&key)?;
    let comment = match state.store.comment(id)? {
        Some(comment) if !comment.deleted => comment,
        _ => return Err(ApiError::NotFound("Comment".to_string())),
    };
    if !user.is_admin && comment.user_id != Some(user.id) {
        return Err(ApiError::Forbidden("Not your comment".to_string()));
    }
    Ok(Json(state.store.comment_history(id)?))
}

#[derive(Debug, Deserialize)]
struct ShareBody {
    platform: String,
}

async fn share(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    ClientIp(ip): ClientIp,
    Json(body): Json<ShareBody>,
) -> Result<StatusCode, ApiError> {
    let slug = post_slug(&state, &key)
        .await
        .ok_or_else(|| ApiError::NotFound("Post".to_string()))?;
    state.store.record_share(&slug, &body.platform, &ip, now())?;
    Ok(StatusCode::NO_CONTENT)
}
