//! Static site builder.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use rayon::prelude::*;
use serde::Serialize;

use scribe_content::html::rewrite_asset_paths;
use scribe_content::{render_rss, Catalog, CatalogError, FeedConfig, Post, TagSummary};

use crate::assets::{AssetPipeline, DEFAULT_CSS};
use crate::images::ImageCompressor;
use crate::templates::{Layout, SiteInfo, TemplateEngine, TemplateError};

/// Configuration for building a static site.
#[derive(Debug, Clone)]
pub struct BuildConfig {
    /// Directory of Markdown posts and their asset folders
    pub posts_dir: PathBuf,

    /// Output directory
    pub output_dir: PathBuf,

    /// Site stylesheet; the built-in one is used when missing
    pub stylesheet: Option<PathBuf>,

    /// Directory of template overrides
    pub template_dir: Option<PathBuf>,

    pub site: SiteInfo,

    /// Posts per listing page
    pub per_page: usize,

    /// Minify style.css
    pub minify: bool,

    /// Compress images while copying assets
    pub compress_images: bool,

    pub images: ImageCompressor,

    pub include_drafts: bool,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            posts_dir: PathBuf::from("posts"),
            output_dir: PathBuf::from("dist"),
            stylesheet: Some(PathBuf::from("style.css")),
            template_dir: None,
            site: SiteInfo::default(),
            per_page: 10,
            minify: true,
            compress_images: true,
            images: ImageCompressor::default(),
            include_drafts: false,
        }
    }
}

/// Result of a build operation.
#[derive(Debug)]
pub struct BuildResult {
    /// Number of HTML pages generated
    pub pages: usize,

    /// Number of posts rendered
    pub posts: usize,

    /// Number of distinct tags
    pub tags: usize,

    /// Number of asset files copied
    pub assets: usize,

    /// Total build time in milliseconds
    pub duration_ms: u64,

    /// Output directory
    pub output_dir: PathBuf,
}

/// Errors that can occur during build.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error("Failed to read {0}")]
    ReadError(String),

    #[error("Failed to write output: {0}")]
    WriteError(String),
}

/// One HTML page of the output.
enum PageJob<'a> {
    Index(usize),
    Post(&'a Post),
    TagsIndex,
    Tag(&'a TagSummary),
    Search,
}

/// Entry in `search-index.json`.
#[derive(Serialize)]
struct SearchEntry<'a> {
    title: &'a str,
    slug: &'a str,
    summary: &'a str,
    tags: &'a [String],
    date: &'a str,
}

/// Static site builder.
pub struct StaticBuilder {
    config: BuildConfig,
    templates: TemplateEngine,
}

impl StaticBuilder {
    /// Create a new static builder.
    pub fn new(config: BuildConfig) -> Result<Self, BuildError> {
        let templates = match &config.template_dir {
            Some(dir) if dir.is_dir() => TemplateEngine::with_overrides(dir)?,
            _ => TemplateEngine::new()?,
        };

        Ok(Self { config, templates })
    }

    /// Build the static site.
    pub async fn build(&self) -> Result<BuildResult, BuildError> {
        let start = Instant::now();

        fs::create_dir_all(&self.config.output_dir)
            .map_err(|e| BuildError::WriteError(e.to_string()))?;

        let catalog = Catalog::load(&self.config.posts_dir, self.config.include_drafts)?;
        let tags = catalog.tags();
        tracing::info!("Loaded {} posts with {} tags", catalog.len(), tags.len());

        let per_page = self.config.per_page.max(1);
        let index_pages = catalog.len().div_ceil(per_page).max(1);

        let mut jobs: Vec<PageJob<'_>> = (1..=index_pages).map(PageJob::Index).collect();
        jobs.extend(catalog.all().iter().map(PageJob::Post));
        jobs.push(PageJob::TagsIndex);
        jobs.extend(tags.iter().map(PageJob::Tag));
        jobs.push(PageJob::Search);

        // Render and write pages in parallel
        let results: Vec<Result<(), BuildError>> = jobs
            .par_iter()
            .map(|job| self.build_page(job, &catalog))
            .collect();

        for result in results {
            result?;
        }

        self.generate_search_index(&catalog)?;
        self.generate_feed(&catalog)?;
        self.generate_sitemap(&catalog, &tags)?;
        self.generate_stylesheet()?;
        let assets = self.copy_assets()?;

        let duration = start.elapsed();

        Ok(BuildResult {
            pages: jobs.len(),
            posts: catalog.len(),
            tags: tags.len(),
            assets,
            duration_ms: duration.as_millis() as u64,
            output_dir: self.config.output_dir.clone(),
        })
    }

    /// Render a single page and write it to its output path.
    fn build_page(&self, job: &PageJob<'_>, catalog: &Catalog) -> Result<(), BuildError> {
        let site = &self.config.site;

        let (relative, html) = match job {
            PageJob::Index(1) => (
                PathBuf::from("index.html"),
                self.templates
                    .index(Layout::static_page(site, 0), &catalog.page(1, self.config.per_page))?,
            ),
            PageJob::Index(n) => (
                PathBuf::from("page").join(n.to_string()).join("index.html"),
                self.templates
                    .index(Layout::static_page(site, 2), &catalog.page(*n, self.config.per_page))?,
            ),
            PageJob::Post(post) => {
                // Posts live one level down, so shared assets need a `../` prefix
                let content = rewrite_asset_paths(&post.content_html, "../");
                (
                    PathBuf::from("posts").join(post.filename()),
                    self.templates
                        .post(Layout::static_page(site, 1), post, &content)?,
                )
            }
            PageJob::TagsIndex => (
                PathBuf::from("tags").join("index.html"),
                self.templates
                    .tags(Layout::static_page(site, 1), &catalog.tags())?,
            ),
            PageJob::Tag(tag) => (
                PathBuf::from("tags").join(format!("{}.html", tag.slug)),
                self.templates.tag(
                    Layout::static_page(site, 1),
                    &tag.name,
                    &catalog.by_tag(&tag.slug),
                )?,
            ),
            PageJob::Search => (
                PathBuf::from("search.html"),
                self.templates
                    .search(Layout::static_page(site, 0), "", None)?,
            ),
        };

        self.write(&relative, html)
    }

    fn write(&self, relative: &Path, contents: impl AsRef<[u8]>) -> Result<(), BuildError> {
        let path = self.config.output_dir.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| BuildError::WriteError(e.to_string()))?;
        }
        fs::write(&path, contents)
            .map_err(|e| BuildError::WriteError(format!("{}: {}", path.display(), e)))
    }

    /// Generate search index.
    fn generate_search_index(&self, catalog: &Catalog) -> Result<(), BuildError> {
        let index: Vec<SearchEntry<'_>> = catalog
            .all()
            .iter()
            .map(|post| SearchEntry {
                title: &post.title,
                slug: &post.slug,
                summary: &post.summary,
                tags: &post.tags,
                date: &post.date,
            })
            .collect();

        let json = serde_json::to_string_pretty(&index)
            .map_err(|e| BuildError::WriteError(e.to_string()))?;

        self.write(Path::new("search-index.json"), json)
    }

    fn generate_feed(&self, catalog: &Catalog) -> Result<(), BuildError> {
        let site = &self.config.site;
        let feed = render_rss(
            catalog.all(),
            &FeedConfig {
                title: site.title.clone(),
                description: site.description.clone(),
                link: site.url.clone(),
                language: site.language.clone(),
            },
        );

        self.write(Path::new("feed.rss"), feed)
    }

    /// Generate sitemap.
    fn generate_sitemap(&self, catalog: &Catalog, tags: &[TagSummary]) -> Result<(), BuildError> {
        let base = self.config.site.url.trim_end_matches('/');

        let mut locations = vec![format!("{}/", base), format!("{}/tags/index.html", base)];
        locations.extend(
            catalog
                .all()
                .iter()
                .map(|post| format!("{}/posts/{}", base, post.filename())),
        );
        locations.extend(
            tags.iter()
                .map(|tag| format!("{}/tags/{}.html", base, tag.slug)),
        );

        let urls: Vec<String> = locations
            .iter()
            .map(|loc| {
                format!(
                    "  <url>\n    <loc>{}</loc>\n  </url>",
                    scribe_content::feed::xml_escape(loc)
                )
            })
            .collect();

        let sitemap = format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
{}
</urlset>"#,
            urls.join("\n")
        );

        self.write(Path::new("sitemap.xml"), sitemap)?;

        // Also generate robots.txt
        let robots = format!("User-agent: *\nAllow: /\nSitemap: {}/sitemap.xml\n", base);
        self.write(Path::new("robots.txt"), robots)
    }

    fn generate_stylesheet(&self) -> Result<(), BuildError> {
        let source = match &self.config.stylesheet {
            Some(path) if path.is_file() => fs::read_to_string(path)
                .map_err(|e| BuildError::ReadError(format!("{}: {}", path.display(), e)))?,
            Some(path) => {
                tracing::warn!("Stylesheet not found: {}, using built-in", path.display());
                DEFAULT_CSS.to_string()
            }
            None => DEFAULT_CSS.to_string(),
        };

        self.write(
            Path::new("style.css"),
            AssetPipeline::stylesheet(&source, self.config.minify),
        )
    }

    /// Copy `posts/assets` to `assets/` and every `posts/{slug}-assets` alongside its post.
    fn copy_assets(&self) -> Result<usize, BuildError> {
        let compressor = self
            .config
            .compress_images
            .then_some(&self.config.images);
        let mut copied = 0;

        let shared = self.config.posts_dir.join("assets");
        if shared.is_dir() {
            copied += AssetPipeline::copy_dir(
                &shared,
                &self.config.output_dir.join("assets"),
                compressor,
            )
            .map_err(|e| BuildError::WriteError(e.to_string()))?;
        }

        let entries = fs::read_dir(&self.config.posts_dir)
            .map_err(|e| BuildError::ReadError(format!("{}: {}", self.config.posts_dir.display(), e)))?;

        for entry in entries.filter_map(|e| e.ok()) {
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().to_string();
            if !path.is_dir() || !name.ends_with("-assets") {
                continue;
            }

            copied += AssetPipeline::copy_dir(
                &path,
                &self.config.output_dir.join("posts").join(&name),
                compressor,
            )
            .map_err(|e| BuildError::WriteError(e.to_string()))?;
        }

        Ok(copied)
    }
}
