//! Dynamic blog server.
//!
//! Serves the same pages as the static build, plus threaded comments behind
//! OAuth login, view and share analytics, an admin API, compressed images and
//! a background mirror of wasteof.money comment threads.

pub mod admin;
pub mod api;
pub mod assets;
pub mod auth;
pub mod error;
pub mod extract;
pub mod pages;
pub mod server;
pub mod sync;
pub mod watcher;

pub use auth::{OAuthProviders, ProviderConfig, SESSION_COOKIE};
pub use error::{ApiError, ServerError};
pub use server::{router, AppState, BlogServer, ServerConfig};
pub use sync::{sync_once, CommentSource, SyncConfig, SyncError, SyncLock, WasteofClient};
pub use watcher::{FileWatcher, WatchEvent};
