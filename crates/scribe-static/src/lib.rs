//! Static site generator for the blog.
//!
//! Renders the post catalog to plain HTML files, copies and compresses assets,
//! and writes the feed, sitemap and search index alongside.

pub mod assets;
pub mod builder;
pub mod images;
pub mod templates;

pub use assets::{AssetPipeline, DEFAULT_CSS};
pub use builder::{BuildConfig, BuildError, BuildResult, StaticBuilder};
pub use images::{content_type, is_compressible, ImageCompressor, ImageError, ImageSize};
pub use templates::{Layout, SiteInfo, TemplateEngine, TemplateError};
