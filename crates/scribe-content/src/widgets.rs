//! Inline widget expansion.
//!
//! Widgets are written on a line of their own, e.g. `[[compare: before.jpg | after.jpg]]`,
//! and are replaced by raw HTML blocks before the Markdown is rendered.

use regex::Regex;
use std::sync::LazyLock;

use crate::html::escape;

/// A recognised inline widget.
#[derive(Debug, Clone, PartialEq)]
pub enum Widget {
    /// Embedded YouTube video by id
    YouTube(String),
    /// Before/after image slider
    Compare { before: String, after: String },
    /// Side-by-side synchronised videos
    VideoCompare { left: String, right: String },
    /// Grid of images
    Gallery(Vec<String>),
    /// Audio player
    Audio(String),
}

impl Widget {
    /// Build a widget from its name and raw argument string.
    ///
    /// Returns `None` for unknown names or malformed arguments, in which case
    /// the source line is left as written.
    pub fn parse(name: &str, args: &str) -> Option<Self> {
        let parts: Vec<String> = args
            .split('|')
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect();

        match (name, parts.as_slice()) {
            ("youtube", [id]) => youtube_id(id).map(Widget::YouTube),
            ("compare", [before, after]) => Some(Widget::Compare {
                before: before.clone(),
                after: after.clone(),
            }),
            ("video-compare", [left, right]) => Some(Widget::VideoCompare {
                left: left.clone(),
                right: right.clone(),
            }),
            ("gallery", items) if !items.is_empty() => Some(Widget::Gallery(items.to_vec())),
            ("audio", [src]) => Some(Widget::Audio(src.clone())),
            _ => None,
        }
    }

    /// Render the widget as a single-line HTML block.
    pub fn to_html(&self) -> String {
        match self {
            Widget::YouTube(id) => format!(
                r#"<div class="widget video-embed"><iframe src="https://www.youtube-nocookie.com/embed/{}" title="YouTube video" loading="lazy" allowfullscreen></iframe></div>"#,
                escape(id)
            ),
            Widget::Compare { before, after } => format!(
                r#"<div class="widget comparison-container"><div class="comparison-wrapper"><img class="comparison-image-before" src="{}" alt="Before"><img class="comparison-image-over" src="{}" alt="After"><div class="comparison-slider"></div></div></div>"#,
                escape(before),
                escape(after)
            ),
            Widget::VideoCompare { left, right } => format!(
                r#"<div class="widget comparison-container video-comparison"><video src="{}" muted playsinline></video><video src="{}" muted playsinline></video><div class="comp-controls"><button class="comp-play-btn" type="button">Play</button><div class="comp-progress-container"><div class="comp-progress-bar"></div></div></div></div>"#,
                escape(left),
                escape(right)
            ),
            Widget::Gallery(items) => {
                let images: String = items
                    .iter()
                    .map(|src| format!(r#"<img src="{}" alt="" loading="lazy">"#, escape(src)))
                    .collect();
                format!(r#"<div class="widget gallery">{}</div>"#, images)
            }
            Widget::Audio(src) => format!(
                r#"<div class="widget audio-player"><audio controls preload="metadata" src="{}"></audio></div>"#,
                escape(src)
            ),
        }
    }
}

/// Accept a bare id or a youtube.com / youtu.be URL.
fn youtube_id(raw: &str) -> Option<String> {
    static ID_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"^[A-Za-z0-9_-]{6,20}$").expect("Invalid youtube id regex")
    });
    static URL_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?:youtu\.be/|[?&]v=|/embed/)([A-Za-z0-9_-]{6,20})")
            .expect("Invalid youtube url regex")
    });

    if ID_RE.is_match(raw) {
        return Some(raw.to_string());
    }
    URL_RE
        .captures(raw)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Replace widget lines in Markdown with their HTML.
///
/// Lines inside fenced code blocks are never expanded.
pub fn expand_widgets(markdown: &str) -> String {
    static WIDGET_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"^\s*\[\[([a-z][a-z-]*)\s*:\s*(.*?)\s*\]\]\s*$").expect("Invalid widget regex")
    });

    let mut output = String::with_capacity(markdown.len());
    let mut open_fence: Option<(char, usize)> = None;

    for line in markdown.split_inclusive('\n') {
        if let Some((marker, len, rest)) = fence(line) {
            match open_fence {
                None => {
                    open_fence = Some((marker, len));
                    output.push_str(line);
                    continue;
                }
                // A fence closes only on the same marker, at least as long, with no info string
                Some((open, open_len)) if open == marker && len >= open_len && rest.is_empty() => {
                    open_fence = None;
                    output.push_str(line);
                    continue;
                }
                Some(_) => {}
            }
        }

        let widget = if open_fence.is_some() {
            None
        } else {
            WIDGET_RE
                .captures(line.trim_end_matches(['\r', '\n']))
                .and_then(|caps| Widget::parse(&caps[1], &caps[2]))
        };

        match widget {
            Some(widget) => {
                output.push('\n');
                output.push_str(&widget.to_html());
                output.push_str("\n\n");
            }
            None => output.push_str(line),
        }
    }

    output
}

/// The marker character, run length and trailing text of a fence line.
fn fence(line: &str) -> Option<(char, usize, &str)> {
    let trimmed = line.trim_start();
    let marker = trimmed.chars().next().filter(|c| *c == '`' || *c == '~')?;
    let len = trimmed.chars().take_while(|c| *c == marker).count();
    if len < 3 {
        return None;
    }
    Some((marker, len, trimmed[len..].trim()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_compare() {
        let widget = Widget::parse("compare", " a.jpg | b.jpg ").unwrap();

        assert_eq!(
            widget,
            Widget::Compare {
                before: "a.jpg".to_string(),
                after: "b.jpg".to_string(),
            }
        );
    }

    #[test]
    fn rejects_malformed_arguments() {
        assert!(Widget::parse("compare", "only-one.jpg").is_none());
        assert!(Widget::parse("youtube", "not a valid id!").is_none());
        assert!(Widget::parse("gallery", " | ").is_none());
        assert!(Widget::parse("unknown", "x").is_none());
    }

    #[test]
    fn extracts_youtube_id_from_urls() {
        assert_eq!(
            youtube_id("https://www.youtube.com/watch?v=dQw4w9WgXcQ&t=3"),
            Some("dQw4w9WgXcQ".to_string())
        );
        assert_eq!(
            youtube_id("https://youtu.be/dQw4w9WgXcQ"),
            Some("dQw4w9WgXcQ".to_string())
        );
    }

    #[test]
    fn expands_widget_lines() {
        let md = "Before\n\n[[gallery: a.jpg | b.jpg]]\nAfter\n";

        let out = expand_widgets(md);

        assert!(out.contains(r#"<div class="widget gallery"><img src="a.jpg""#));
        assert!(out.contains(r#"<img src="b.jpg""#));
        assert!(out.ends_with("\n\nAfter\n"));
    }

    #[test]
    fn leaves_code_fences_alone() {
        let md = "```\n[[audio: x.mp3]]\n```\n";

        assert_eq!(expand_widgets(md), md);
    }

    #[test]
    fn fences_close_only_on_their_own_marker() {
        let md = "~~~markdown\n```\n[[audio: x.mp3]]\n~~~\n[[audio: y.mp3]]\n";

        let out = expand_widgets(md);

        assert!(out.contains("[[audio: x.mp3]]"));
        assert!(!out.contains("[[audio: y.mp3]]"));
        assert!(out.contains(r#"src="y.mp3""#));
    }

    #[test]
    fn escapes_attribute_values() {
        let html = Widget::Audio(r#"x.mp3" onload="alert(1)"#.to_string()).to_html();

        assert!(html.contains("x.mp3&quot; onload=&quot;alert(1)"));
    }

    #[test]
    fn keeps_unknown_widgets_verbatim() {
        let md = "[[sparkles: lots]]\n";

        assert_eq!(expand_widgets(md), md);
    }
}
