//! Frontmatter extraction and parsing.

use serde::{Deserialize, Deserializer};
use serde_yaml::Value;

/// Parsed frontmatter from a Markdown post.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct Frontmatter {
    /// Post title
    #[serde(default, deserialize_with = "scalar_string")]
    pub title: Option<String>,

    /// Publication date, conventionally `YYYY-MM-DD`
    #[serde(default, deserialize_with = "scalar_string")]
    pub date: Option<String>,

    /// Tags as written by the author
    #[serde(default, deserialize_with = "tag_list")]
    pub tags: Vec<String>,

    /// Hand-written summary (otherwise derived from the body)
    #[serde(default, deserialize_with = "scalar_string")]
    pub summary: Option<String>,

    /// Page description for social cards
    #[serde(default, deserialize_with = "scalar_string")]
    pub description: Option<String>,

    /// Banner image override
    #[serde(default, deserialize_with = "scalar_string")]
    pub image: Option<String>,

    /// Linked wasteof.money post whose comments are mirrored
    #[serde(default, deserialize_with = "scalar_string")]
    pub wasteof: Option<String>,

    /// Drafts are skipped unless explicitly included
    #[serde(default)]
    pub draft: bool,
}

/// Extract frontmatter from Markdown content.
///
/// Returns the parsed frontmatter and the remaining content after the frontmatter block.
/// Invalid YAML is not fatal: the block is re-read line by line as `key: value` pairs,
/// which is how hand-written headers like `title: Rust: a retrospective` end up parsing.
pub fn extract_frontmatter(source: &str) -> Result<(Option<Frontmatter>, &str), FrontmatterError> {
    let trimmed = source.trim_start();

    if !trimmed.starts_with("---") {
        return Ok((None, source));
    }

    // Find the closing ---
    let after_open = &trimmed[3..];
    let Some(close_pos) = after_open.find("\n---") else {
        return Err(FrontmatterError::Unclosed);
    };

    let yaml_content = after_open[..close_pos].trim();
    let remaining = &after_open[close_pos + 4..];
    // Drop the rest of the closing fence line
    let remaining = match remaining.find('\n') {
        Some(pos) if remaining[..pos].trim().is_empty() => &remaining[pos + 1..],
        _ => remaining,
    };

    let frontmatter = if yaml_content.is_empty() {
        Frontmatter::default()
    } else {
        match serde_yaml::from_str::<Frontmatter>(yaml_content) {
            Ok(fm) => fm,
            Err(e) => {
                tracing::debug!("Frontmatter is not valid YAML ({}), using line parser", e);
                parse_lines(yaml_content)
            }
        }
    };

    Ok((Some(frontmatter), remaining.trim_start()))
}

/// Lenient `key: value` parser used when the block is not valid YAML.
fn parse_lines(block: &str) -> Frontmatter {
    let mut fm = Frontmatter::default();

    for line in block.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        let text = || Some(unquote(value).to_string()).filter(|s| !s.is_empty());

        match key.trim().to_lowercase().as_str() {
            "title" => fm.title = text(),
            "date" => fm.date = text(),
            "summary" => fm.summary = text(),
            "description" => fm.description = text(),
            "image" => fm.image = text(),
            "wasteof" => fm.wasteof = text(),
            "tags" => fm.tags = split_tags(value),
            "draft" => fm.draft = matches!(value, "true" | "yes"),
            _ => {}
        }
    }

    fm
}

/// Split `[a, "b"]` or `a, b` into clean tag names.
fn split_tags(raw: &str) -> Vec<String> {
    let raw = raw.trim();
    let raw = raw
        .strip_prefix('[')
        .and_then(|r| r.strip_suffix(']'))
        .unwrap_or(raw);

    raw.split(',')
        .map(unquote)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

fn unquote(s: &str) -> &str {
    s.trim().trim_matches(|c| c == '"' || c == '\'').trim()
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn scalar_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(scalar_to_string(&value).filter(|s| !s.is_empty()))
}

fn tag_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    let tags = match value {
        Value::Sequence(items) => items
            .iter()
            .filter_map(scalar_to_string)
            .map(|t| unquote(&t).to_string())
            .filter(|t| !t.is_empty())
            .collect(),
        Value::String(s) => split_tags(&s),
        _ => Vec::new(),
    };
    Ok(tags)
}

/// Errors that can occur when parsing frontmatter.
#[derive(Debug, thiserror::Error)]
pub enum FrontmatterError {
    #[error("Unclosed frontmatter block - missing closing ---")]
    Unclosed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_valid_frontmatter() {
        let source = r#"---
title: Hello Blog
date: 2024-03-01
tags: [rust, "web dev"]
wasteof: 65f0c0ffee
---

# Hello
"#;

        let (fm, content) = extract_frontmatter(source).unwrap();
        let fm = fm.unwrap();

        assert_eq!(fm.title.as_deref(), Some("Hello Blog"));
        assert_eq!(fm.date.as_deref(), Some("2024-03-01"));
        assert_eq!(fm.tags, vec!["rust", "web dev"]);
        assert_eq!(fm.wasteof.as_deref(), Some("65f0c0ffee"));
        assert!(!fm.draft);
        assert!(content.starts_with("# Hello"));
    }

    #[test]
    fn accepts_comma_separated_tags() {
        let source = "---\ntitle: T\ntags: one, two ,, 'three'\n---\nbody";

        let (fm, content) = extract_frontmatter(source).unwrap();

        assert_eq!(fm.unwrap().tags, vec!["one", "two", "three"]);
        assert_eq!(content, "body");
    }

    #[test]
    fn falls_back_on_invalid_yaml() {
        let source = "---\ntitle: Rust: a retrospective\ndate: 2023-12-31\ntags: [a, b]\n---\nText";

        let (fm, content) = extract_frontmatter(source).unwrap();
        let fm = fm.unwrap();

        assert_eq!(fm.title.as_deref(), Some("Rust: a retrospective"));
        assert_eq!(fm.date.as_deref(), Some("2023-12-31"));
        assert_eq!(fm.tags, vec!["a", "b"]);
        assert_eq!(content, "Text");
    }

    #[test]
    fn numeric_scalars_become_strings() {
        let source = "---\ntitle: 1984\n---\n";

        let (fm, _) = extract_frontmatter(source).unwrap();

        assert_eq!(fm.unwrap().title.as_deref(), Some("1984"));
    }

    #[test]
    fn handles_no_frontmatter() {
        let source = "# Just Markdown\n\nNo frontmatter here.";

        let (fm, content) = extract_frontmatter(source).unwrap();

        assert!(fm.is_none());
        assert_eq!(content, source);
    }

    #[test]
    fn errors_on_unclosed_frontmatter() {
        let source = "---\ntitle: Test\n# No closing";

        let result = extract_frontmatter(source);

        assert!(matches!(result, Err(FrontmatterError::Unclosed)));
    }
}
