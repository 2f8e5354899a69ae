//! Blog server: shared state, router and startup.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;

use scribe_content::Catalog;
use scribe_static::{ImageCompressor, Layout, SiteInfo, TemplateEngine};
use scribe_store::{RateLimit, Store};

use crate::assets::{self, ImageCache};
use crate::auth::{self, OAuthProviders, ProviderConfig};
use crate::error::ServerError;
use crate::sync::{self, SyncConfig, WasteofClient};
use crate::watcher::{FileWatcher, WatchEvent};
use crate::{admin, api, pages};

/// Configuration for the blog server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Open browser on start
    pub open: bool,

    /// Directory of Markdown posts and their asset folders
    pub posts_dir: PathBuf,

    /// Site stylesheet; the built-in one is served when missing
    pub stylesheet: Option<PathBuf>,

    /// Directory of template overrides
    pub template_dir: Option<PathBuf>,

    /// SQLite database file
    pub database: PathBuf,

    /// Directory for runtime files such as the sync lock
    pub data_dir: PathBuf,

    pub site: SiteInfo,

    /// Posts per listing page
    pub per_page: usize,

    pub include_drafts: bool,

    /// Compress images before serving them
    pub compress_images: bool,

    pub images: ImageCompressor,

    /// Comment rate limit per user or address
    pub rate_limit: RateLimit,

    /// Salt for anonymized IP hashes
    pub ip_salt: String,

    pub oauth: Vec<ProviderConfig>,

    /// Admins as `provider:id` or email
    pub admins: Vec<String>,

    pub sync: SyncConfig,

    /// Mark cookies `Secure` (serve over HTTPS)
    pub secure_cookies: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            open: false,
            posts_dir: PathBuf::from("posts"),
            stylesheet: Some(PathBuf::from("style.css")),
            template_dir: None,
            database: PathBuf::from("data/blog.db"),
            data_dir: PathBuf::from("data"),
            site: SiteInfo::default(),
            per_page: 10,
            include_drafts: false,
            compress_images: true,
            images: ImageCompressor::default(),
            rate_limit: RateLimit::default(),
            ip_salt: String::new(),
            oauth: Vec::new(),
            admins: Vec::new(),
            sync: SyncConfig::default(),
            secure_cookies: false,
        }
    }
}

/// State shared by every handler.
pub struct AppState {
    pub config: ServerConfig,
    pub catalog: RwLock<Catalog>,
    pub store: Store,
    pub templates: TemplateEngine,
    pub images: ImageCache,
    pub oauth: OAuthProviders,
    pub http: reqwest::Client,
}

impl AppState {
    /// Load posts and templates and open the database named in `config`.
    pub fn new(config: ServerConfig) -> Result<Self, ServerError> {
        let store = Store::open(&config.database)?;
        Self::with_store(config, store)
    }

    /// Like [`AppState::new`] with an already open store.
    pub fn with_store(config: ServerConfig, store: Store) -> Result<Self, ServerError> {
        let catalog = Catalog::load(&config.posts_dir, config.include_drafts)?;
        tracing::info!("Loaded {} posts", catalog.len());

        let templates = match &config.template_dir {
            Some(dir) if dir.is_dir() => TemplateEngine::with_overrides(dir)?,
            _ => TemplateEngine::new()?,
        };

        let oauth = OAuthProviders::new(&config.oauth, &config.site.url)?;
        let http = reqwest::Client::builder()
            .user_agent(concat!("scribe/", env!("CARGO_PKG_VERSION")))
            .timeout(std::time::Duration::from_secs(30))
            .build()?;

        Ok(Self {
            store: store.with_ip_salt(config.ip_salt.clone()),
            catalog: RwLock::new(catalog),
            templates,
            images: assets::image_cache(),
            oauth,
            http,
            config,
        })
    }

    pub fn layout(&self) -> Layout<'_> {
        Layout::server(&self.config.site)
    }

    /// Re-read the posts directory. On failure the previous catalog stays in place.
    pub async fn reload_catalog(&self) {
        match Catalog::load(&self.config.posts_dir, self.config.include_drafts) {
            Ok(catalog) => {
                let count = catalog.len();
                *self.catalog.write().await = catalog;
                tracing::info!("Reloaded {} posts", count);
            }
            Err(e) => tracing::warn!("Keeping previous posts: {}", e),
        }
    }
}

/// How often expired sessions are removed from the database.
const SESSION_SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Remove expired sessions now and then every sweep interval.
pub fn spawn_session_sweeper(state: Arc<AppState>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SESSION_SWEEP_INTERVAL);
        loop {
            ticker.tick().await;
            match state.store.purge_expired_sessions(now()) {
                Ok(0) => {}
                Ok(removed) => tracing::info!(removed, "Purged expired sessions"),
                Err(e) => tracing::warn!("Session purge failed: {}", e),
            }
        }
    })
}

/// Current Unix time in seconds.
pub fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Build the application router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(pages::routes())
        .merge(assets::routes())
        .merge(api::routes())
        .merge(admin::routes())
        .merge(auth::routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// The dynamic blog server.
pub struct BlogServer {
    config: ServerConfig,
}

impl BlogServer {
    /// Create a new blog server.
    pub fn new(config: ServerConfig) -> Self {
        Self { config }
    }

    /// Start serving until Ctrl-C.
    pub async fn start(self) -> Result<(), ServerError> {
        let addr_text = format!("{}:{}", self.config.host, self.config.port);
        let addr: SocketAddr = addr_text
            .parse()
            .map_err(|_| ServerError::InvalidAddress(addr_text.clone()))?;

        let open_browser = self.config.open;
        let state = Arc::new(AppState::new(self.config)?);

        // Set up file watcher
        let mut watch_paths = vec![state.config.posts_dir.clone()];
        watch_paths.extend(state.config.stylesheet.clone());

        let (watcher, mut rx) =
            FileWatcher::new(&watch_paths).map_err(|e| ServerError::WatchError(e.to_string()))?;

        let state_clone = Arc::clone(&state);
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                match &event {
                    WatchEvent::Posts(paths) => tracing::info!("{} post files changed", paths.len()),
                    WatchEvent::Assets(paths) => tracing::debug!("Assets changed: {:?}", paths),
                }
                state_clone.reload_catalog().await;
                state_clone.images.invalidate_all();
            }
            // Keep watcher alive
            drop(watcher);
        });

        spawn_session_sweeper(Arc::clone(&state));

        if state.config.sync.enabled {
            let client = WasteofClient::new(state.http.clone(), &state.config.sync.api_base);
            sync::spawn(Arc::clone(&state), client);
        }

        let app = router(Arc::clone(&state));

        tracing::info!("Starting blog server at http://{}", addr);

        if open_browser {
            let url = format!("http://{}", addr);
            if let Err(e) = open::that(&url) {
                tracing::warn!("Could not open browser: {}", e);
            }
        }

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::BindError(addr, e.to_string()))?;

        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| ServerError::BindError(addr, e.to_string()))?;

        tracing::info!("Server stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl-C: {}", e);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;

    use axum::body::Body;
    use axum::http::{header, Request, Response, StatusCode};
    use tower::ServiceExt;

    use scribe_store::{OAuthProfile, User};

    use crate::auth::SESSION_COOKIE;

    pub(crate) fn write_post(dir: &Path, slug: &str, title: &str, tags: &str) {
        fs::write(
            dir.join(format!("{slug}.md")),
            format!("---\ntitle: {title}\ndate: 2024-03-01\ntags: [{tags}]\nwasteof: w-{slug}\n---\n\nBody of {title}.\n"),
        )
        .unwrap();
    }

    /// A state over a temp posts directory with two posts and an in-memory store.
    pub(crate) fn test_state(dir: &Path) -> Arc<AppState> {
        let posts = dir.join("posts");
        fs::create_dir_all(&posts).unwrap();
        write_post(&posts, "hello-world", "Hello World", "rust, web");
        write_post(&posts, "second", "Second Post", "rust");

        let config = ServerConfig {
            posts_dir: posts,
            stylesheet: None,
            data_dir: dir.join("data"),
            admins: vec!["test:admin".to_string()],
            ..Default::default()
        };
        Arc::new(AppState::with_store(config, Store::open_in_memory().unwrap()).unwrap())
    }

    /// Sign in a user and return them with a ready `Cookie` header value.
    pub(crate) fn sign_in(state: &AppState, id: &str) -> (User, String) {
        let profile = OAuthProfile {
            provider: "test".to_string(),
            provider_id: id.to_string(),
            name: format!("user {id}"),
            email: None,
            avatar_url: None,
        };
        let admin = crate::auth::is_admin(&state.config.admins, &profile);
        let user = state.store.upsert_user(&profile, admin, now()).unwrap();
        let token = state.store.create_session(user.id, now()).unwrap();
        (user, format!("{SESSION_COOKIE}={token}"))
    }

    pub(crate) async fn send(state: &Arc<AppState>, request: Request<Body>) -> Response<Body> {
        router(Arc::clone(state)).oneshot(request).await.unwrap()
    }

    pub(crate) async fn body_text(response: Response<Body>) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    pub(crate) async fn body_json(response: Response<Body>) -> serde_json::Value {
        serde_json::from_str(&body_text(response).await).unwrap()
    }

    pub(crate) fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    pub(crate) fn json_request(
        method: &str,
        uri: &str,
        cookie: Option<&str>,
        body: serde_json::Value,
    ) -> Request<Body> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .header("x-forwarded-for", "203.0.113.10");
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    #[test]
    fn creates_server_with_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 8080);
        assert_eq!(config.rate_limit.max, 5);
        BlogServer::new(config);
    }

    #[tokio::test]
    async fn reloads_catalog_from_disk() {
        let temp = tempfile::tempdir().unwrap();
        let state = test_state(temp.path());
        assert_eq!(state.catalog.read().await.len(), 2);

        write_post(&temp.path().join("posts"), "third", "Third", "misc");
        state.reload_catalog().await;

        assert_eq!(state.catalog.read().await.len(), 3);
        let response = send(&state, get("/posts/third")).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn sweeper_purges_expired_sessions() {
        let temp = tempfile::tempdir().unwrap();
        let state = test_state(temp.path());
        let (user, cookie) = sign_in(&state, "reader");
        state.store.create_session(user.id, 0).unwrap();

        let sweeper = spawn_session_sweeper(Arc::clone(&state));
        tokio::time::sleep(Duration::from_millis(100)).await;
        sweeper.abort();

        assert_eq!(state.store.purge_expired_sessions(now()).unwrap(), 0);
        let token = cookie.trim_start_matches(&format!("{SESSION_COOKIE}="));
        assert!(state.store.session_user(token, now()).unwrap().is_some());
    }
}
