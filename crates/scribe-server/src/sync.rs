//! Mirrors wasteof.money comment threads into the local comment store.
//!
//! Posts opt in with a `wasteof: <post id>` frontmatter field. A background task
//! walks every linked thread on a fixed interval. Only one process syncs at a
//! time: each pass first takes an exclusive advisory lock on `sync.lock` in the
//! data directory and skips the pass if another process holds it.

use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use fs2::FileExt;
use serde::Deserialize;
use tokio::task::JoinHandle;

use scribe_content::html::strip_tags;
use scribe_store::{ExternalComment, Store, StoreError};

use crate::server::{now, AppState};

/// Lock file name inside the data directory.
pub const LOCK_FILE: &str = "sync.lock";

/// Upper bound on pages fetched per thread.
const MAX_PAGES: u32 = 100;

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub enabled: bool,
    /// Seconds between passes
    pub interval_secs: u64,
    /// API root without a trailing slash
    pub api_base: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_secs: 300,
            api_base: "https://api.wasteof.money".to_string(),
        }
    }
}

/// Errors that can occur while syncing.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Lock file error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Deserialize)]
pub struct Poster {
    pub name: String,
}

/// A comment as returned by the wasteof API.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteComment {
    #[serde(rename = "_id")]
    pub id: String,
    pub poster: Poster,
    #[serde(default)]
    pub parent: Option<String>,
    /// HTML body
    pub content: String,
    /// Milliseconds since the epoch
    pub time: i64,
    #[serde(default, rename = "hasReplies")]
    pub has_replies: bool,
}

/// One page of comments or replies.
#[derive(Debug, Clone, Deserialize)]
pub struct CommentPage {
    pub comments: Vec<RemoteComment>,
    #[serde(default = "last_by_default")]
    pub last: bool,
}

fn last_by_default() -> bool {
    true
}

/// Where mirrored comments come from.
pub trait CommentSource: Send + Sync {
    /// Top-level comments on a post, 1-based pages.
    fn comments(
        &self,
        post_id: &str,
        page: u32,
    ) -> impl Future<Output = Result<CommentPage, SyncError>> + Send;

    /// Replies to a comment, 1-based pages.
    fn replies(
        &self,
        comment_id: &str,
        page: u32,
    ) -> impl Future<Output = Result<CommentPage, SyncError>> + Send;

    fn avatar_url(&self, _user: &str) -> Option<String> {
        None
    }
}

/// HTTP client for the wasteof.money API.
#[derive(Debug, Clone)]
pub struct WasteofClient {
    http: reqwest::Client,
    base: String,
}

impl WasteofClient {
    pub fn new(http: reqwest::Client, base: &str) -> Self {
        Self {
            http,
            base: base.trim_end_matches('/').to_string(),
        }
    }

    async fn page(&self, url: String) -> Result<CommentPage, SyncError> {
        tracing::debug!("Fetching {}", url);
        let page = self
            .http
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(page)
    }
}

impl CommentSource for WasteofClient {
    async fn comments(&self, post_id: &str, page: u32) -> Result<CommentPage, SyncError> {
        self.page(format!("{}/posts/{}/comments?page={}", self.base, post_id, page))
            .await
    }

    async fn replies(&self, comment_id: &str, page: u32) -> Result<CommentPage, SyncError> {
        self.page(format!(
            "{}/comments/{}/replies?page={}",
            self.base, comment_id, page
        ))
        .await
    }

    fn avatar_url(&self, user: &str) -> Option<String> {
        Some(format!("{}/users/{}/picture", self.base, user))
    }
}

/// Exclusive advisory lock on the sync lock file, released on drop.
#[derive(Debug)]
pub struct SyncLock {
    file: File,
}

impl SyncLock {
    /// Take the lock without blocking. `None` means another holder has it.
    pub fn try_acquire(path: &Path) -> Result<Option<Self>, SyncError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)?;

        match FileExt::try_lock_exclusive(&file) {
            Ok(()) => Ok(Some(Self { file })),
            Err(e) if e.kind() == fs2::lock_contended_error().kind() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for SyncLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            tracing::warn!("Failed to release sync lock: {}", e);
        }
    }
}

/// Counts from one sync pass.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct SyncReport {
    pub posts: usize,
    pub comments: usize,
    pub failed: usize,
}

/// Fetch every page of a paged listing.
async fn all_pages<F, Fut>(mut fetch: F) -> Result<Vec<RemoteComment>, SyncError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<CommentPage, SyncError>>,
{
    let mut comments = Vec::new();
    for page in 1..=MAX_PAGES {
        let batch = fetch(page).await?;
        let done = batch.last || batch.comments.is_empty();
        comments.extend(batch.comments);
        if done {
            break;
        }
    }
    Ok(comments)
}

fn to_external(
    source: &impl CommentSource,
    slug: &str,
    comment: &RemoteComment,
    parent: Option<&str>,
) -> ExternalComment {
    ExternalComment {
        slug: slug.to_string(),
        external_id: comment.id.clone(),
        parent_external_id: parent.map(str::to_string),
        author_name: comment.poster.name.clone(),
        author_avatar: source.avatar_url(&comment.poster.name),
        content: strip_tags(&comment.content).trim().to_string(),
        created_at: comment.time / 1000,
    }
}

/// Mirror one post's thread, replies included. Returns the number of comments stored.
pub async fn sync_post<S: CommentSource>(
    store: &Store,
    source: &S,
    slug: &str,
    post_id: &str,
) -> Result<usize, SyncError> {
    let mut stored = 0;
    // Comments whose replies still need fetching; parents are stored before their replies
    let mut pending = VecDeque::new();

    for comment in all_pages(|page| source.comments(post_id, page)).await? {
        store.upsert_external_comment(&to_external(source, slug, &comment, None))?;
        stored += 1;
        if comment.has_replies {
            pending.push_back(comment.id);
        }
    }

    while let Some(parent) = pending.pop_front() {
        for reply in all_pages(|page| source.replies(&parent, page)).await? {
            store.upsert_external_comment(&to_external(source, slug, &reply, Some(&parent)))?;
            stored += 1;
            if reply.has_replies {
                pending.push_back(reply.id);
            }
        }
    }

    Ok(stored)
}

/// One pass over every linked post, or `None` when another process holds the lock.
pub async fn sync_once<S: CommentSource>(
    store: &Store,
    source: &S,
    links: &[(String, String)],
    lock_path: &Path,
) -> Result<Option<SyncReport>, SyncError> {
    let Some(_lock) = SyncLock::try_acquire(lock_path)? else {
        tracing::debug!("Sync lock held elsewhere, skipping this pass");
        return Ok(None);
    };

    let mut report = SyncReport::default();
    for (slug, post_id) in links {
        match sync_post(store, source, slug, post_id).await {
            Ok(count) => {
                store.mark_synced(post_id, now(), None)?;
                report.posts += 1;
                report.comments += count;
            }
            Err(e) => {
                tracing::warn!("Failed to sync comments for {}: {}", slug, e);
                store.mark_synced(post_id, now(), Some(&e.to_string()))?;
                report.failed += 1;
            }
        }
    }

    Ok(Some(report))
}

/// Run sync passes in the background for as long as the server lives.
pub fn spawn<S: CommentSource + 'static>(state: Arc<AppState>, source: S) -> JoinHandle<()> {
    tokio::spawn(async move {
        let period = Duration::from_secs(state.config.sync.interval_secs.max(1));
        let lock_path = state.config.data_dir.join(LOCK_FILE);

        loop {
            let links = state.catalog.read().await.wasteof_links();
            match sync_once(&state.store, &source, &links, &lock_path).await {
                Ok(Some(report)) => tracing::info!(
                    posts = report.posts,
                    comments = report.comments,
                    failed = report.failed,
                    "Synced wasteof comments"
                ),
                Ok(None) => {}
                Err(e) => tracing::warn!("Comment sync failed: {}", e),
            }
            tokio::time::sleep(period).await;
        }
    })
}
