//! `blog.toml` configuration.
//!
//! Every section is optional. Command-line flags override file values, and OAuth
//! client secrets may be left out of the file and supplied through
//! `SCRIBE_OAUTH_<NAME>_SECRET` instead.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use scribe_server::{ProviderConfig, ServerConfig, SyncConfig};
use scribe_static::{BuildConfig, ImageCompressor, SiteInfo};
use scribe_store::RateLimit;

/// Configuration file structure (blog.toml).
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct ConfigFile {
    pub site: SiteSection,
    pub paths: PathsSection,
    pub build: BuildSection,
    pub server: ServerSection,
    pub comments: CommentsSection,
    pub sync: SyncSection,
    pub images: ImagesSection,
    pub oauth: Vec<ProviderConfig>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SiteSection {
    pub title: String,
    pub description: String,
    pub url: String,
    pub author: String,
    pub language: String,
}

impl Default for SiteSection {
    fn default() -> Self {
        let site = SiteInfo::default();
        Self {
            title: site.title,
            description: site.description,
            url: site.url,
            author: site.author,
            language: site.language,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct PathsSection {
    pub posts: PathBuf,
    pub output: PathBuf,
    pub stylesheet: PathBuf,
    pub templates: Option<PathBuf>,
    pub data: PathBuf,
    /// Defaults to `blog.db` inside the data directory
    pub database: Option<PathBuf>,
}

impl Default for PathsSection {
    fn default() -> Self {
        Self {
            posts: PathBuf::from("posts"),
            output: PathBuf::from("dist"),
            stylesheet: PathBuf::from("style.css"),
            templates: None,
            data: PathBuf::from("data"),
            database: None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct BuildSection {
    pub minify: bool,
    pub compress_images: bool,
    pub per_page: usize,
    pub drafts: bool,
}

impl Default for BuildSection {
    fn default() -> Self {
        Self {
            minify: true,
            compress_images: true,
            per_page: 10,
            drafts: false,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub host: String,
    pub port: u16,
    pub secure_cookies: bool,
    /// `provider:id` or email of each admin
    pub admins: Vec<String>,
    pub ip_salt: Option<String>,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            secure_cookies: false,
            admins: Vec::new(),
            ip_salt: None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct CommentsSection {
    /// Comments allowed per window
    pub rate_limit: u32,
    pub rate_window_secs: i64,
}

impl Default for CommentsSection {
    fn default() -> Self {
        let limit = RateLimit::default();
        Self {
            rate_limit: limit.max,
            rate_window_secs: limit.window_secs,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SyncSection {
    pub enabled: bool,
    pub interval_secs: u64,
    pub api_base: String,
}

impl Default for SyncSection {
    fn default() -> Self {
        let sync = SyncConfig::default();
        Self {
            enabled: sync.enabled,
            interval_secs: sync.interval_secs,
            api_base: sync.api_base,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ImagesSection {
    pub max_width: u32,
    pub max_height: u32,
    pub quality: u8,
}

impl Default for ImagesSection {
    fn default() -> Self {
        let images = ImageCompressor::default();
        Self {
            max_width: images.max_width,
            max_height: images.max_height,
            quality: images.quality,
        }
    }
}

impl ConfigFile {
    /// Load configuration from `path` if it exists.
    /// Returns an error if the file exists but is malformed.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let config: ConfigFile = toml::from_str(&content)
                .with_context(|| format!("Failed to parse {}", path.display()))?;
            tracing::info!("Loaded config from {}", path.display());
            config
        } else {
            tracing::debug!("No {} found, using defaults", path.display());
            ConfigFile::default()
        };

        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Fill secrets missing from the file from the environment.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        for provider in &mut self.oauth {
            if provider.client_secret.is_empty() {
                if let Some(secret) = lookup(&secret_env_var(&provider.name)) {
                    provider.client_secret = secret;
                }
            }
        }

        if self.server.ip_salt.is_none() {
            self.server.ip_salt = lookup("SCRIBE_IP_SALT");
        }
    }

    pub fn site(&self) -> SiteInfo {
        SiteInfo {
            title: self.site.title.clone(),
            description: self.site.description.clone(),
            url: self.site.url.trim_end_matches('/').to_string(),
            author: self.site.author.clone(),
            language: self.site.language.clone(),
        }
    }

    fn images(&self) -> ImageCompressor {
        ImageCompressor {
            max_width: self.images.max_width,
            max_height: self.images.max_height,
            quality: self.images.quality,
        }
    }

    pub fn build_config(&self) -> BuildConfig {
        BuildConfig {
            posts_dir: self.paths.posts.clone(),
            output_dir: self.paths.output.clone(),
            stylesheet: Some(self.paths.stylesheet.clone()),
            template_dir: self.paths.templates.clone(),
            site: self.site(),
            per_page: self.build.per_page,
            minify: self.build.minify,
            compress_images: self.build.compress_images,
            images: self.images(),
            include_drafts: self.build.drafts,
        }
    }

    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            host: self.server.host.clone(),
            port: self.server.port,
            open: false,
            posts_dir: self.paths.posts.clone(),
            stylesheet: Some(self.paths.stylesheet.clone()),
            template_dir: self.paths.templates.clone(),
            database: self
                .paths
                .database
                .clone()
                .unwrap_or_else(|| self.paths.data.join("blog.db")),
            data_dir: self.paths.data.clone(),
            site: self.site(),
            per_page: self.build.per_page,
            include_drafts: self.build.drafts,
            compress_images: self.build.compress_images,
            images: self.images(),
            rate_limit: RateLimit {
                max: self.comments.rate_limit,
                window_secs: self.comments.rate_window_secs,
            },
            ip_salt: self.server.ip_salt.clone().unwrap_or_default(),
            oauth: self.oauth.clone(),
            admins: self.server.admins.clone(),
            sync: SyncConfig {
                enabled: self.sync.enabled,
                interval_secs: self.sync.interval_secs,
                api_base: self.sync.api_base.clone(),
            },
            secure_cookies: self.server.secure_cookies,
        }
    }
}

/// `SCRIBE_OAUTH_<NAME>_SECRET` with the provider name upper-cased.
fn secret_env_var(provider: &str) -> String {
    let name: String = provider
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
        .collect();
    format!("SCRIBE_OAUTH_{name}_SECRET")
}
