//! RSS 2.0 feed generation.

use chrono::{DateTime, NaiveDate, Utc};

use crate::catalog::Post;
use crate::html::{absolute_url, absolutize_urls};

/// Channel-level feed settings.
#[derive(Debug, Clone)]
pub struct FeedConfig {
    pub title: String,
    pub description: String,
    /// Public site URL, e.g. `https://blog.example.com`
    pub link: String,
    pub language: String,
}

/// Render an RSS 2.0 document for the given posts.
pub fn render_rss(posts: &[Post], config: &FeedConfig) -> String {
    let site = config.link.trim_end_matches('/');

    let mut items = String::new();
    for post in posts {
        let link = format!("{}/posts/{}", site, post.slug);

        let mut content = String::new();
        if let Some(image) = &post.image {
            content.push_str(&format!(
                r#"<p><img src="{}" alt="{}"></p>"#,
                absolute_url(site, &format!("/{}", image.trim_start_matches('/'))),
                xml_escape(&post.title)
            ));
        }
        content.push_str(&absolutize_urls(&post.content_html, site));

        let categories: String = post
            .tags
            .iter()
            .map(|tag| format!("      <category>{}</category>\n", xml_escape(tag)))
            .collect();

        items.push_str(&format!(
            "    <item>\n      <title>{}</title>\n      <link>{}</link>\n      <guid isPermaLink=\"true\">{}</guid>\n      <pubDate>{}</pubDate>\n      <description>{}</description>\n{}      <content:encoded><![CDATA[{}]]></content:encoded>\n    </item>\n",
            xml_escape(&post.title),
            link,
            link,
            pub_date(&post.date),
            xml_escape(&post.summary),
            categories,
            cdata_safe(&content),
        ));
    }

    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<rss version=\"2.0\" xmlns:content=\"http://purl.org/rss/1.0/modules/content/\">\n  <channel>\n    <title>{}</title>\n    <link>{}</link>\n    <description>{}</description>\n    <language>{}</language>\n{}  </channel>\n</rss>\n",
        xml_escape(&config.title),
        site,
        xml_escape(&config.description),
        xml_escape(&config.language),
        items
    )
}

/// RFC 2822 date for a `YYYY-MM-DD` post date, falling back to now.
fn pub_date(date: &str) -> String {
    let parsed: Option<DateTime<Utc>> = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc());

    parsed.unwrap_or_else(Utc::now).to_rfc2822()
}

/// A literal `]]>` would terminate the CDATA section early.
fn cdata_safe(input: &str) -> String {
    input.replace("]]>", "]]]]><![CDATA[>")
}

pub fn xml_escape(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
