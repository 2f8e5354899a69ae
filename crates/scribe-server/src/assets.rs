//! Post assets, with compressed images held in a short-lived cache.

use std::path::{Component, Path as FsPath, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use bytes::Bytes;
use moka::future::Cache;
use serde::Deserialize;

use scribe_static::{content_type, is_compressible, ImageSize};

use crate::error::ApiError;
use crate::server::AppState;

const IMAGE_CACHE_TTL: Duration = Duration::from_secs(60 * 60);
const IMAGE_CACHE_BYTES: u64 = 256 * 1024 * 1024;

/// Compressed images keyed by file and requested size.
pub type ImageCache = Cache<(PathBuf, ImageSize), Bytes>;

pub fn image_cache() -> ImageCache {
    Cache::builder()
        .weigher(|_key, value: &Bytes| u32::try_from(value.len()).unwrap_or(u32::MAX))
        .max_capacity(IMAGE_CACHE_BYTES)
        .time_to_live(IMAGE_CACHE_TTL)
        .build()
}

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/assets/{*path}", get(shared_asset))
        .route("/posts/assets/{*path}", get(shared_asset))
        .route("/posts/{slug}/{*path}", get(post_asset))
}

#[derive(Debug, Deserialize)]
struct SizeQuery {
    size: Option<String>,
}

async fn shared_asset(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
    Query(query): Query<SizeQuery>,
) -> Result<Response, ApiError> {
    let dir = state.config.posts_dir.join("assets");
    serve(&state, &dir, &path, ImageSize::from_query(query.size.as_deref())).await
}

/// Files from a post's own `{slug}-assets` folder.
async fn post_asset(
    State(state): State<Arc<AppState>>,
    Path((folder, path)): Path<(String, String)>,
    Query(query): Query<SizeQuery>,
) -> Result<Response, ApiError> {
    if !folder.ends_with("-assets") || !is_plain_relative(FsPath::new(&folder)) {
        return Err(ApiError::NotFound("Asset".to_string()));
    }

    let dir = state.config.posts_dir.join(&folder);
    serve(&state, &dir, &path, ImageSize::from_query(query.size.as_deref())).await
}

/// Only normal components: no `..`, root or prefix.
fn is_plain_relative(path: &FsPath) -> bool {
    path.components().all(|c| matches!(c, Component::Normal(_)))
}

async fn serve(
    state: &AppState,
    dir: &FsPath,
    relative: &str,
    size: ImageSize,
) -> Result<Response, ApiError> {
    let relative = FsPath::new(relative);
    if relative.as_os_str().is_empty() || !is_plain_relative(relative) {
        return Err(ApiError::BadRequest("Invalid asset path".to_string()));
    }

    let file = dir.join(relative);
    if !file.is_file() {
        return Err(ApiError::NotFound("Asset".to_string()));
    }

    let body = if state.config.compress_images && is_compressible(&file) {
        compressed(state, file.clone(), size).await?
    } else {
        Bytes::from(
            tokio::fs::read(&file)
                .await
                .map_err(|e| ApiError::Internal(format!("{}: {}", file.display(), e)))?,
        )
    };

    Ok((
        [
            (header::CONTENT_TYPE, content_type(&file)),
            (header::CACHE_CONTROL, "public, max-age=3600"),
        ],
        body,
    )
        .into_response())
}

async fn compressed(state: &AppState, file: PathBuf, size: ImageSize) -> Result<Bytes, ApiError> {
    let compressor = state.config.images.clone();
    let key = (file.clone(), size);

    state
        .images
        .try_get_with(key, async move {
            let path = file.clone();
            let bytes = tokio::task::spawn_blocking(move || {
                compressor.compress_or_original(&path, size)
            })
            .await
            .map_err(std::io::Error::other)??;

            tracing::debug!("Compressed {} ({:?}, {} bytes)", file.display(), size, bytes.len());
            Ok::<_, std::io::Error>(Bytes::from(bytes))
        })
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))
}
