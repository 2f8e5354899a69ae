//! Blog content: Markdown posts with frontmatter and inline widgets.
//!
//! This crate turns a directory of Markdown files into a [`Catalog`] of rendered
//! posts, and provides the tag, search, pagination and RSS views over it that
//! both the static builder and the server use.

pub mod catalog;
pub mod feed;
pub mod frontmatter;
pub mod html;
pub mod parser;
pub mod widgets;

pub use catalog::{paginate, tag_slug, Catalog, CatalogError, Page, Post, TagSummary};
pub use feed::{render_rss, FeedConfig};
pub use frontmatter::Frontmatter;
pub use parser::{parse_post, render_markdown, ParseError, ParsedDoc, TocEntry};
pub use widgets::{expand_widgets, Widget};
