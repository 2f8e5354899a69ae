//! HTML pages, the RSS feed and the stylesheet.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::routing::get;
use axum::Router;
use serde::Deserialize;

use scribe_content::{render_rss, FeedConfig};
use scribe_static::{AssetPipeline, DEFAULT_CSS};

use crate::error::ApiError;
use crate::extract::{ClientIp, MaybeUser};
use crate::server::{now, AppState};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(index))
        .route("/posts/{slug}", get(post))
        .route("/tags", get(tags))
        .route("/tags/{tag}", get(tag))
        .route("/search", get(search))
        .route("/admin", get(admin))
        .route("/feed.rss", get(feed))
        .route("/style.css", get(stylesheet))
}

#[derive(Debug, Deserialize)]
struct PageQuery {
    page: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SearchQuery {
    #[serde(default)]
    pub q: String,
}

async fn index(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PageQuery>,
) -> Result<Html<String>, ApiError> {
    let catalog = state.catalog.read().await;
    let page = catalog.page(query.page.unwrap_or(1), state.config.per_page);
    Ok(Html(state.templates.index(state.layout(), &page)?))
}

async fn post(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
    ClientIp(ip): ClientIp,
) -> Result<Response, ApiError> {
    let Some(post) = state.catalog.read().await.get(&slug).cloned() else {
        return Ok(Redirect::to("/").into_response());
    };

    if let Err(e) = state.store.record_view(&post.slug, &ip, now()) {
        tracing::warn!("Failed to record view of {}: {}", post.slug, e);
    }

    let html = state
        .templates
        .post(state.layout(), &post, &post.content_html)?;
    Ok(Html(html).into_response())
}

async fn tags(State(state): State<Arc<AppState>>) -> Result<Html<String>, ApiError> {
    let tags = state.catalog.read().await.tags();
    Ok(Html(state.templates.tags(state.layout(), &tags)?))
}

async fn tag(
    State(state): State<Arc<AppState>>,
    Path(tag): Path<String>,
) -> Result<Html<String>, ApiError> {
    let catalog = state.catalog.read().await;
    let posts = catalog.by_tag(&tag);
    let name = catalog.tag_name(&tag);
    Ok(Html(state.templates.tag(state.layout(), &name, &posts)?))
}

async fn search(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SearchQuery>,
) -> Result<Html<String>, ApiError> {
    let results = state.catalog.read().await.search(&query.q);
    let html = state
        .templates
        .search(state.layout(), query.q.trim(), Some(&results))?;
    Ok(Html(html))
}

async fn admin(
    State(state): State<Arc<AppState>>,
    MaybeUser(user): MaybeUser,
) -> Result<Response, ApiError> {
    match user {
        None => Ok(Redirect::to("/login").into_response()),
        Some(user) if !user.is_admin => {
            Err(ApiError::Forbidden("Admin access required".to_string()))
        }
        Some(_) => Ok(Html(state.templates.admin(state.layout())?).into_response()),
    }
}

async fn feed(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let site = &state.config.site;
    let rss = render_rss(
        state.catalog.read().await.all(),
        &FeedConfig {
            title: site.title.clone(),
            description: site.description.clone(),
            link: site.url.clone(),
            language: site.language.clone(),
        },
    );
    ([(header::CONTENT_TYPE, "application/rss+xml; charset=utf-8")], rss)
}

async fn stylesheet(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let source = match &state.config.stylesheet {
        Some(path) => tokio::fs::read_to_string(path).await.ok(),
        None => None,
    };
    let css = AssetPipeline::stylesheet(source.as_deref().unwrap_or(DEFAULT_CSS), false);
    ([(header::CONTENT_TYPE, "text/css; charset=utf-8")], css)
}
