//! SQLite storage for the dynamic blog server.
//!
//! A single [`Store`] wraps one connection behind a mutex. Each concern
//! (analytics, comments, users and sessions, moderation, sync bookkeeping)
//! adds its methods to `Store` from its own module.

pub mod analytics;
pub mod comments;
pub mod error;
pub mod moderation;
pub mod schema;
pub mod sync;
pub mod users;

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::Connection;
use serde::Serialize;
use sha2::{Digest, Sha256};

pub use analytics::{
    DailyCount, DailyPlatformCount, DayShares, DayViews, Overview, PlatformCount, PostDetail,
    PostStats, UNIQUE_VIEW_WINDOW_SECS,
};
pub use comments::{
    Comment, CommentEdit, CommentSource, ExternalComment, NewComment, RateLimit, MAX_COMMENT_LENGTH,
};
pub use error::StoreError;
pub use moderation::{BlockedIp, IpActivity};
pub use sync::SyncState;
pub use users::{OAuthProfile, User, UserSummary, SESSION_TTL_SECS};

/// SQLite-backed storage.
pub struct Store {
    conn: Mutex<Connection>,
    ip_salt: String,
}

impl Store {
    /// Open or create the database at `path` and apply the schema.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StoreError::Invalid(format!("{}: {}", parent.display(), e)))?;
            }
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;

        tracing::debug!("Opened database at {}", path.display());
        Self::with_connection(conn)
    }

    /// Create an in-memory database (used by tests).
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        schema::migrate(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
            ip_salt: String::new(),
        })
    }

    /// Salt mixed into every anonymized IP hash.
    pub fn with_ip_salt(mut self, salt: impl Into<String>) -> Self {
        self.ip_salt = salt.into();
        self
    }

    /// One-way hash of a client IP; raw addresses are never stored.
    pub fn anonymize_ip(&self, ip: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.ip_salt.as_bytes());
        hasher.update(b":");
        hasher.update(ip.trim().as_bytes());
        hex::encode(hasher.finalize())
    }

    pub(crate) fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }
}

/// One page of rows.
#[derive(Debug, Clone, Serialize)]
pub struct Paged<T> {
    pub items: Vec<T>,
    /// 1-based page number
    pub page: usize,
    pub per_page: usize,
    pub total: usize,
    pub total_pages: usize,
}

impl<T> Paged<T> {
    pub fn new(items: Vec<T>, page: usize, per_page: usize, total: usize) -> Self {
        Self {
            items,
            page,
            per_page,
            total,
            total_pages: total.div_ceil(per_page.max(1)).max(1),
        }
    }
}

/// `(limit, offset)` for a 1-based page.
pub(crate) fn page_bounds(page: usize, per_page: usize) -> (i64, i64) {
    let per_page = per_page.max(1);
    let page = page.max(1);
    (per_page as i64, ((page - 1) * per_page) as i64)
}
