//! Markdown post parser.

use std::collections::HashMap;

use pulldown_cmark::{html, CowStr, Event, Options, Parser, Tag, TagEnd};
use serde::Serialize;

use crate::frontmatter::{extract_frontmatter, Frontmatter, FrontmatterError};
use crate::widgets::expand_widgets;

/// A parsed Markdown document.
#[derive(Debug, Clone)]
pub struct ParsedDoc {
    /// Parsed frontmatter (if present)
    pub frontmatter: Option<Frontmatter>,

    /// Markdown content (without frontmatter, widgets expanded)
    pub content: String,

    /// Rendered HTML body
    pub html: String,

    /// Table of contents entries
    pub toc: Vec<TocEntry>,
}

/// A table of contents entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TocEntry {
    /// Heading text
    pub title: String,
    /// Anchor ID
    pub id: String,
    /// Heading level (1-6)
    pub level: u8,
}

/// Errors that can occur when parsing a post.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("Frontmatter error: {0}")]
    Frontmatter(#[from] FrontmatterError),
}

fn markdown_options() -> Options {
    Options::ENABLE_TABLES
        | Options::ENABLE_FOOTNOTES
        | Options::ENABLE_STRIKETHROUGH
        | Options::ENABLE_TASKLISTS
}

/// Parse a Markdown post.
///
/// Extracts frontmatter, expands inline widgets, renders HTML and builds a table of contents.
pub fn parse_post(source: &str) -> Result<ParsedDoc, ParseError> {
    let (frontmatter, body) = extract_frontmatter(source)?;

    let content = expand_widgets(body);
    let toc = collect_toc(&content);
    let html = render_with_anchors(&content, &toc);

    Ok(ParsedDoc {
        frontmatter,
        content,
        html,
        toc,
    })
}

/// Render Markdown to HTML without heading anchors.
pub fn render_markdown(content: &str) -> String {
    let parser = Parser::new_ext(content, markdown_options());

    let mut html_output = String::new();
    html::push_html(&mut html_output, parser);

    html_output
}

fn collect_toc(content: &str) -> Vec<TocEntry> {
    let mut toc = Vec::new();
    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut current_heading: Option<(u8, String)> = None;

    for event in Parser::new_ext(content, markdown_options()) {
        match event {
            Event::Start(Tag::Heading { level, .. }) => {
                current_heading = Some((level as u8, String::new()));
            }

            Event::Text(text) | Event::Code(text) => {
                if let Some((_, ref mut heading_text)) = current_heading {
                    heading_text.push_str(&text);
                }
            }

            Event::End(TagEnd::Heading(_)) => {
                if let Some((level, title)) = current_heading.take() {
                    let base = slugify(&title);
                    let count = seen.entry(base.clone()).or_insert(0);
                    let id = if *count == 0 {
                        base
                    } else {
                        format!("{}-{}", base, count)
                    };
                    *count += 1;
                    toc.push(TocEntry { title, id, level });
                }
            }

            _ => {}
        }
    }

    toc
}

fn render_with_anchors(content: &str, toc: &[TocEntry]) -> String {
    let mut ids = toc.iter().map(|entry| entry.id.clone());

    let parser = Parser::new_ext(content, markdown_options()).map(|event| match event {
        Event::Start(Tag::Heading {
            level,
            id,
            classes,
            attrs,
        }) => {
            let generated = ids.next();
            Event::Start(Tag::Heading {
                level,
                id: id.or_else(|| generated.map(CowStr::from)),
                classes,
                attrs,
            })
        }
        other => other,
    });

    let mut html_output = String::new();
    html::push_html(&mut html_output, parser);

    html_output
}

/// Convert a heading to a URL-safe slug.
pub fn slugify(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() {
                c
            } else if c.is_whitespace() || c == '-' || c == '_' {
                '-'
            } else {
                '\0'
            }
        })
        .filter(|c| *c != '\0')
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_complete_post() {
        let source = r#"---
title: Shipping it
date: 2024-05-02
---

# Shipping it

Some text.

## Details

More text with `code`.
"#;

        let doc = parse_post(source).unwrap();

        let fm = doc.frontmatter.unwrap();
        assert_eq!(fm.title.as_deref(), Some("Shipping it"));

        assert_eq!(doc.toc.len(), 2);
        assert_eq!(doc.toc[0].id, "shipping-it");
        assert_eq!(doc.toc[0].level, 1);
        assert_eq!(doc.toc[1].title, "Details");
        assert_eq!(doc.toc[1].level, 2);

        assert!(doc.html.contains(r#"<h1 id="shipping-it">Shipping it</h1>"#));
        assert!(doc.html.contains(r#"<h2 id="details">Details</h2>"#));
        assert!(doc.html.contains("<code>code</code>"));
    }

    #[test]
    fn deduplicates_heading_ids() {
        let doc = parse_post("## Notes\n\n## Notes\n").unwrap();

        assert_eq!(doc.toc[0].id, "notes");
        assert_eq!(doc.toc[1].id, "notes-1");
        assert!(doc.html.contains(r#"id="notes-1""#));
    }

    #[test]
    fn expands_widgets_before_rendering() {
        let doc = parse_post("Intro\n\n[[youtube: dQw4w9WgXcQ]]\n\nOutro").unwrap();

        assert!(doc.html.contains("youtube-nocookie.com/embed/dQw4w9WgXcQ"));
        assert!(doc.html.contains("<p>Outro</p>"));
    }

    #[test]
    fn parses_without_frontmatter() {
        let doc = parse_post("# Just Markdown\n\nNo frontmatter.").unwrap();

        assert!(doc.frontmatter.is_none());
        assert_eq!(doc.toc.len(), 1);
        assert_eq!(doc.toc[0].title, "Just Markdown");
    }

    #[test]
    fn renders_markdown() {
        let html = render_markdown("# Hello\n\nWorld");

        assert!(html.contains("<h1>Hello</h1>"));
        assert!(html.contains("<p>World</p>"));
    }

    #[test]
    fn slugify_works() {
        assert_eq!(slugify("Hello World"), "hello-world");
        assert_eq!(slugify("API Reference"), "api-reference");
        assert_eq!(slugify("Button (Primary)"), "button-primary");
        assert_eq!(slugify("  Multiple   Spaces  "), "multiple-spaces");
    }
}
