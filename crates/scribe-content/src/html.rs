//! Helpers for post-processing rendered HTML.

use regex::{Captures, Regex};
use std::sync::LazyLock;

/// Escape HTML special characters including single quotes.
pub fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}

/// Reduce rendered HTML to plain text.
///
/// Headings are dropped entirely so summaries start with the first paragraph.
pub fn strip_tags(html: &str) -> String {
    static HEADING_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?s)<h[1-6][^>]*>.*?</h[1-6]>").expect("Invalid heading regex")
    });
    static TAG_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"<[^>]+>").expect("Invalid tag regex"));

    let without_headings = HEADING_RE.replace_all(html, " ");
    let text = TAG_RE.replace_all(&without_headings, " ");

    let text = text
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&amp;", "&");

    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Truncate text to `limit` characters, appending `...` when shortened.
pub fn summarize(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let cut: String = text.chars().take(limit).collect();
    format!("{}...", cut.trim_end())
}

/// Find the `src` of the first image in the HTML.
pub fn extract_first_image(html: &str) -> Option<String> {
    static IMG_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r#"<img\b[^>]*?\bsrc=["']([^"']+)["']"#).expect("Invalid img regex")
    });

    IMG_RE
        .captures(html)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Remove the first paragraph that holds only an image.
///
/// Returns that image's src (without a leading `../`) and the remaining HTML.
pub fn take_lead_image(html: &str) -> (Option<String>, String) {
    static LEAD_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r#"<p>\s*<img\b[^>]*?\bsrc=["'](?:\.\./)?([^"']+)["'][^>]*>\s*</p>\n?"#)
            .expect("Invalid lead image regex")
    });

    match LEAD_RE.captures(html) {
        Some(caps) => {
            let whole = caps.get(0).map(|m| m.range()).unwrap_or(0..0);
            let src = caps.get(1).map(|m| m.as_str().to_string());
            let mut rest = String::with_capacity(html.len());
            rest.push_str(&html[..whole.start]);
            rest.push_str(&html[whole.end..]);
            (src, rest)
        }
        None => (None, html.to_string()),
    }
}

/// Prefix relative `assets/` references, for pages rendered one directory deep.
pub fn rewrite_asset_paths(html: &str, prefix: &str) -> String {
    static ASSET_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r#"\b(src|href)=(["'])assets/"#).expect("Invalid asset regex")
    });

    ASSET_RE
        .replace_all(html, |caps: &Captures| {
            format!("{}={}{}assets/", &caps[1], &caps[2], prefix)
        })
        .into_owned()
}

/// Resolve relative `src`/`href` values against the post directory of `site`.
///
/// Used where HTML leaves the site, e.g. feed readers.
pub fn absolutize_urls(html: &str, site: &str) -> String {
    static URL_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r#"\b(src|href)="([^"]*)""#).expect("Invalid url regex")
    });

    let site = site.trim_end_matches('/');

    URL_RE
        .replace_all(html, |caps: &Captures| {
            let attr = &caps[1];
            let url = &caps[2];
            format!(r#"{}="{}""#, attr, absolute_url(site, url))
        })
        .into_owned()
}

/// Turn a post-relative or root-relative URL into an absolute one.
pub fn absolute_url(site: &str, url: &str) -> String {
    let site = site.trim_end_matches('/');
    if url.is_empty()
        || url.starts_with('#')
        || url.contains("://")
        || url.starts_with("mailto:")
        || url.starts_with("data:")
    {
        url.to_string()
    } else if let Some(rooted) = url.strip_prefix('/') {
        format!("{}/{}", site, rooted)
    } else if let Some(parent) = url.strip_prefix("../") {
        format!("{}/{}", site, parent)
    } else {
        format!("{}/posts/{}", site, url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn strips_tags_and_headings() {
        let html = "<h1>Title</h1>\n<p>Hello <em>there</em> &amp; welcome</p>";

        assert_eq!(strip_tags(html), "Hello there & welcome");
    }

    #[test]
    fn summarizes_long_text() {
        assert_eq!(summarize("short", 10), "short");
        assert_eq!(summarize("abcdefghij klm", 10), "abcdefghij...");
        assert_eq!(summarize("héllo wörld", 5), "héllo...");
    }

    #[test]
    fn takes_lead_image() {
        let html = "<p>Intro</p>\n<p><img src=\"../assets/banner.jpg\" alt=\"b\" /></p>\n<p>Body</p>\n";

        let (src, rest) = take_lead_image(html);

        assert_eq!(src.as_deref(), Some("assets/banner.jpg"));
        assert_eq!(rest, "<p>Intro</p>\n<p>Body</p>\n");
    }

    #[test]
    fn inline_images_are_not_lead_images() {
        let html = "<p>Look <img src=\"x.png\" /> here</p>";

        let (src, rest) = take_lead_image(html);

        assert!(src.is_none());
        assert_eq!(rest, html);
        assert_eq!(extract_first_image(html).as_deref(), Some("x.png"));
    }

    #[test]
    fn rewrites_asset_paths() {
        let html = r#"<img src="assets/a.png"><a href='assets/b.pdf'>b</a><img src="https://x/assets/c.png">"#;

        assert_eq!(
            rewrite_asset_paths(html, "../"),
            r#"<img src="../assets/a.png"><a href='../assets/b.pdf'>b</a><img src="https://x/assets/c.png">"#
        );
    }

    #[test]
    fn absolutizes_urls() {
        let site = "https://blog.example.com/";

        assert_eq!(
            absolute_url(site, "assets/a.png"),
            "https://blog.example.com/posts/assets/a.png"
        );
        assert_eq!(
            absolute_url(site, "../assets/a.png"),
            "https://blog.example.com/assets/a.png"
        );
        assert_eq!(absolute_url(site, "/tags"), "https://blog.example.com/tags");
        assert_eq!(absolute_url(site, "#top"), "#top");

        let html = r#"<a href="https://other.site/">x</a><img src="hello-assets/p.jpg">"#;
        assert_eq!(
            absolutize_urls(html, site),
            r#"<a href="https://other.site/">x</a><img src="https://blog.example.com/posts/hello-assets/p.jpg">"#
        );
    }
}
