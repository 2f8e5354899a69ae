//! Post catalog: every post in the posts directory, newest first.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::html::{strip_tags, summarize, take_lead_image};
use crate::parser::{parse_post, ParseError, TocEntry};

/// Maximum summary length in characters.
pub const SUMMARY_LENGTH: usize = 150;

/// A blog post derived from a Markdown file.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Post {
    /// File stem of the source Markdown file
    pub slug: String,
    pub title: String,
    /// Publication date as written (`YYYY-MM-DD` by convention)
    pub date: String,
    pub tags: Vec<String>,
    pub summary: String,
    /// Social card description (frontmatter description, else the summary)
    pub description: String,
    /// Banner image path relative to the site root, or an absolute URL
    pub image: Option<String>,
    /// Rendered body without the banner paragraph
    pub content_html: String,
    pub toc: Vec<TocEntry>,
    /// Linked wasteof.money post id
    pub wasteof: Option<String>,
    pub draft: bool,
}

impl Post {
    /// Build a post from Markdown source.
    pub fn from_source(slug: &str, source: &str) -> Result<Self, ParseError> {
        let doc = parse_post(source)?;
        let fm = doc.frontmatter.unwrap_or_default();

        let (lead_image, content_html) = match fm.image {
            Some(image) => (Some(image), doc.html.clone()),
            None => take_lead_image(&doc.html),
        };

        let summary = fm
            .summary
            .clone()
            .unwrap_or_else(|| summarize(&strip_tags(&doc.html), SUMMARY_LENGTH));

        Ok(Self {
            slug: slug.to_string(),
            title: fm.title.unwrap_or_else(|| "Untitled".to_string()),
            date: fm
                .date
                .unwrap_or_else(|| chrono::Local::now().format("%Y-%m-%d").to_string()),
            tags: fm.tags,
            description: fm.description.unwrap_or_else(|| summary.clone()),
            summary,
            image: lead_image.map(|src| site_relative_image(slug, &src)),
            content_html,
            toc: doc.toc,
            wasteof: fm.wasteof.as_deref().map(wasteof_post_id),
            draft: fm.draft,
        })
    }

    /// Output filename used by the static builder.
    pub fn filename(&self) -> String {
        format!("{}.html", self.slug)
    }

    /// Whether the post carries a tag with the given slug.
    pub fn has_tag(&self, slug: &str) -> bool {
        self.tags.iter().any(|t| tag_slug(t) == slug)
    }
}

/// Image paths in Markdown are relative to the post page; the catalog stores
/// them relative to the site root so listings can use them too.
fn site_relative_image(slug: &str, src: &str) -> String {
    let src = src.trim_start_matches("./");
    if src.contains("://") || src.starts_with('/') {
        src.to_string()
    } else if src.starts_with(&format!("{}-assets/", slug)) {
        format!("posts/{}", src)
    } else if let Some(rest) = src.strip_prefix("posts/assets/") {
        format!("assets/{}", rest)
    } else {
        src.to_string()
    }
}

/// Accept either a bare id or a `https://wasteof.money/posts/{id}` link.
fn wasteof_post_id(raw: &str) -> String {
    let raw = raw.trim().trim_end_matches('/');
    match raw.rsplit_once("/posts/") {
        Some((_, id)) => id.to_string(),
        None => raw.to_string(),
    }
}

/// Convert a tag name to its URL slug.
pub fn tag_slug(name: &str) -> String {
    name.trim().to_lowercase().replace(' ', "-")
}

/// A tag with the number of posts carrying it.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TagSummary {
    pub name: String,
    pub slug: String,
    pub count: usize,
}

/// One page of a listing.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// 1-based page number
    pub page: usize,
    pub per_page: usize,
    pub total: usize,
    pub total_pages: usize,
}

impl<T> Page<T> {
    pub fn has_next(&self) -> bool {
        self.page < self.total_pages
    }

    pub fn has_prev(&self) -> bool {
        self.page > 1
    }
}

/// Paginate a slice, clamping the page number into range.
pub fn paginate<T: Clone>(items: &[T], page: usize, per_page: usize) -> Page<T> {
    let per_page = per_page.max(1);
    let total = items.len();
    let total_pages = total.div_ceil(per_page).max(1);
    let page = page.clamp(1, total_pages);
    let start = (page - 1) * per_page;

    Page {
        items: items.iter().skip(start).take(per_page).cloned().collect(),
        page,
        per_page,
        total,
        total_pages,
    }
}

/// Errors that can occur when loading the catalog.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Posts directory not found: {0}")]
    DirectoryNotFound(PathBuf),

    #[error("Failed to read {path}: {message}")]
    Read { path: PathBuf, message: String },
}

/// All posts, sorted by date descending.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    posts: Vec<Post>,
}

impl Catalog {
    /// Load every `*.md` file directly inside `posts_dir`.
    ///
    /// Files that fail to parse are logged and skipped.
    pub fn load(posts_dir: &Path, include_drafts: bool) -> Result<Self, CatalogError> {
        if !posts_dir.is_dir() {
            return Err(CatalogError::DirectoryNotFound(posts_dir.to_path_buf()));
        }

        let entries = fs::read_dir(posts_dir).map_err(|e| CatalogError::Read {
            path: posts_dir.to_path_buf(),
            message: e.to_string(),
        })?;

        let mut posts = Vec::new();
        for entry in entries.filter_map(|e| e.ok()) {
            let path = entry.path();
            if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some("md") {
                continue;
            }

            let Some(slug) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };

            let source = fs::read_to_string(&path).map_err(|e| CatalogError::Read {
                path: path.clone(),
                message: e.to_string(),
            })?;

            match Post::from_source(slug, &source) {
                Ok(post) if post.draft && !include_drafts => {
                    tracing::debug!("Skipping draft {}", path.display());
                }
                Ok(post) => posts.push(post),
                Err(e) => tracing::warn!("Skipping {}: {}", path.display(), e),
            }
        }

        tracing::debug!("Loaded {} posts from {}", posts.len(), posts_dir.display());

        Ok(Self::from_posts(posts))
    }

    /// Build a catalog from already-parsed posts.
    pub fn from_posts(mut posts: Vec<Post>) -> Self {
        posts.sort_by(|a, b| b.date.cmp(&a.date).then_with(|| a.slug.cmp(&b.slug)));
        Self { posts }
    }

    pub fn all(&self) -> &[Post] {
        &self.posts
    }

    pub fn len(&self) -> usize {
        self.posts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.posts.is_empty()
    }

    /// Look up a post by slug. A trailing `.html` is ignored.
    pub fn get(&self, slug: &str) -> Option<&Post> {
        let slug = slug.strip_suffix(".html").unwrap_or(slug);
        self.posts.iter().find(|p| p.slug == slug)
    }

    /// All tags with post counts, sorted by name.
    ///
    /// Tags that differ only in case or spacing share one entry, named as in
    /// the newest post that uses them.
    pub fn tags(&self) -> Vec<TagSummary> {
        let mut tags: Vec<TagSummary> = Vec::new();

        for post in &self.posts {
            let mut seen: Vec<String> = Vec::new();
            for tag in &post.tags {
                let slug = tag_slug(tag);
                if seen.contains(&slug) {
                    continue;
                }
                match tags.iter_mut().find(|t| t.slug == slug) {
                    Some(existing) => existing.count += 1,
                    None => tags.push(TagSummary {
                        name: tag.clone(),
                        slug: slug.clone(),
                        count: 1,
                    }),
                }
                seen.push(slug);
            }
        }

        tags.sort_by(|a, b| a.name.cmp(&b.name));
        tags
    }

    /// Posts carrying a tag, matched by slug and then by name.
    pub fn by_tag(&self, tag: &str) -> Vec<Post> {
        let wanted = tag.to_lowercase();

        let tagged: Vec<Post> = self
            .posts
            .iter()
            .filter(|p| p.has_tag(&wanted))
            .cloned()
            .collect();

        if !tagged.is_empty() {
            return tagged;
        }

        let name = wanted.replace('-', " ");
        self.posts
            .iter()
            .filter(|p| p.tags.iter().any(|t| t.to_lowercase() == name))
            .cloned()
            .collect()
    }

    /// Display name for a tag slug, falling back to the de-slugged text.
    pub fn tag_name(&self, tag: &str) -> String {
        let wanted = tag.to_lowercase();
        self.posts
            .iter()
            .flat_map(|p| p.tags.iter())
            .find(|t| tag_slug(t) == wanted)
            .cloned()
            .unwrap_or_else(|| wanted.replace('-', " "))
    }

    /// Case-insensitive substring search over title, summary and tags.
    pub fn search(&self, query: &str) -> Vec<Post> {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return Vec::new();
        }

        self.posts
            .iter()
            .filter(|p| {
                p.title.to_lowercase().contains(&query)
                    || p.summary.to_lowercase().contains(&query)
                    || p.tags.iter().any(|t| t.to_lowercase().contains(&query))
            })
            .cloned()
            .collect()
    }

    /// One page of the post listing.
    pub fn page(&self, page: usize, per_page: usize) -> Page<Post> {
        paginate(&self.posts, page, per_page)
    }

    /// `(slug, wasteof post id)` for every post linked to wasteof.money.
    pub fn wasteof_links(&self) -> Vec<(String, String)> {
        self.posts
            .iter()
            .filter_map(|p| p.wasteof.clone().map(|id| (p.slug.clone(), id)))
            .collect()
    }
}
