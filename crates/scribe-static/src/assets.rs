//! Stylesheet and asset directory processing.

use std::fs;
use std::path::Path;

use walkdir::WalkDir;

use crate::images::{is_compressible, ImageCompressor, ImageSize};

/// Asset pipeline utilities.
pub struct AssetPipeline;

impl AssetPipeline {
    /// Minify CSS using lightningcss.
    pub fn minify_css(css: &str) -> Result<String, String> {
        use lightningcss::stylesheet::{ParserOptions, PrinterOptions, StyleSheet};

        let stylesheet = StyleSheet::parse(css, ParserOptions::default())
            .map_err(|e| format!("CSS parse error: {}", e))?;

        let minified = stylesheet
            .to_css(PrinterOptions {
                minify: true,
                ..Default::default()
            })
            .map_err(|e| format!("CSS minify error: {}", e))?;

        Ok(minified.code)
    }

    /// The site stylesheet, minified when asked. Falls back to the source on parse errors.
    pub fn stylesheet(source: &str, minify: bool) -> String {
        if !minify {
            return source.to_string();
        }

        match Self::minify_css(source) {
            Ok(css) => css,
            Err(e) => {
                tracing::warn!("Keeping unminified style.css: {}", e);
                source.to_string()
            }
        }
    }

    /// Copy every file under `from` into `to`, compressing images when a compressor is given.
    ///
    /// Returns the number of files written.
    pub fn copy_dir(
        from: &Path,
        to: &Path,
        compressor: Option<&ImageCompressor>,
    ) -> std::io::Result<usize> {
        let mut copied = 0;

        for entry in WalkDir::new(from)
            .follow_links(true)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }

            let relative = path.strip_prefix(from).unwrap_or(path);
            let target = to.join(relative);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }

            match compressor {
                Some(compressor) if is_compressible(path) => {
                    let bytes = compressor.compress_or_original(path, ImageSize::Full)?;
                    fs::write(&target, bytes)?;
                }
                _ => {
                    fs::copy(path, &target)?;
                }
            }
            copied += 1;
        }

        tracing::debug!("Copied {} files from {}", copied, from.display());
        Ok(copied)
    }
}

/// Stylesheet written by `scribe init` and used when a site has none.
pub const DEFAULT_CSS: &str = r#":root {
  --background: #fdfcfa;
  --foreground: #1d1d1f;
  --muted: #6b6b70;
  --border: #e4e2dd;
  --accent: #b4462c;
  --content-width: 42rem;
}

@media (prefers-color-scheme: dark) {
  :root {
    --background: #141416;
    --foreground: #ececec;
    --muted: #9a9aa0;
    --border: #2c2c30;
    --accent: #f08b6c;
  }
}

* {
  box-sizing: border-box;
}

body {
  margin: 0;
  font-family: system-ui, -apple-system, sans-serif;
  background: var(--background);
  color: var(--foreground);
  line-height: 1.65;
}

a {
  color: var(--accent);
}

.site-header,
.site-footer,
main {
  max-width: var(--content-width);
  margin: 0 auto;
  padding: 1.5rem 1rem;
}

.site-header {
  display: flex;
  justify-content: space-between;
  align-items: baseline;
  border-bottom: 1px solid var(--border);
}

.site-header nav a {
  margin-left: 1rem;
}

.site-title {
  font-weight: 700;
  font-size: 1.25rem;
  color: var(--foreground);
  text-decoration: none;
}

.post-list {
  list-style: none;
  padding: 0;
}

.post-card {
  display: grid;
  grid-template-columns: 1fr 8rem;
  gap: 1rem;
  padding: 1.25rem 0;
  border-bottom: 1px solid var(--border);
}

.post-card img {
  width: 100%;
  border-radius: 0.375rem;
}

.post-meta,
.tag-list {
  color: var(--muted);
  font-size: 0.875rem;
}

.tag {
  display: inline-block;
  margin-right: 0.5rem;
}

.post-banner {
  width: 100%;
  border-radius: 0.5rem;
}

.post-content img,
.post-content video {
  max-width: 100%;
  height: auto;
}

.post-content pre {
  overflow-x: auto;
  padding: 1rem;
  border: 1px solid var(--border);
  border-radius: 0.375rem;
}

.toc {
  font-size: 0.875rem;
  border-left: 2px solid var(--border);
  padding-left: 1rem;
}

.toc-level-3 {
  margin-left: 1rem;
}

.widget {
  margin: 1.5rem 0;
}

.widget-youtube {
  position: relative;
  aspect-ratio: 16 / 9;
}

.widget-youtube iframe {
  position: absolute;
  inset: 0;
  width: 100%;
  height: 100%;
  border: 0;
}

.widget-compare,
.widget-video-compare {
  display: grid;
  grid-template-columns: 1fr 1fr;
  gap: 0.5rem;
}

.widget-compare img,
.widget-video-compare video,
.widget-gallery img {
  width: 100%;
}

.widget-gallery {
  display: grid;
  grid-template-columns: repeat(auto-fill, minmax(10rem, 1fr));
  gap: 0.5rem;
}

.widget-audio audio {
  width: 100%;
}

.pagination {
  display: flex;
  justify-content: space-between;
  margin: 2rem 0;
}

.comments {
  margin-top: 3rem;
  border-top: 1px solid var(--border);
}

.comment {
  margin: 1rem 0;
}

.comment .replies {
  margin-left: 1.5rem;
  border-left: 2px solid var(--border);
  padding-left: 1rem;
}

.comment textarea,
.comment-form textarea {
  width: 100%;
  min-height: 5rem;
}

.admin table {
  width: 100%;
  border-collapse: collapse;
}

.admin td,
.admin th {
  padding: 0.375rem;
  border-bottom: 1px solid var(--border);
  text-align: left;
}
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn minifies_css() {
        let css = r#"
.button {
    background-color: blue;
    padding: 10px;
}
        "#;

        let minified = AssetPipeline::minify_css(css).unwrap();

        assert!(!minified.contains('\n'));
        assert!(minified.contains(".button"));
    }

    #[test]
    fn default_stylesheet_minifies() {
        let minified = AssetPipeline::stylesheet(DEFAULT_CSS, true);

        assert!(minified.len() < DEFAULT_CSS.len());
        assert!(minified.contains(".post-card"));
    }

    #[test]
    fn unminified_stylesheet_is_unchanged() {
        assert_eq!(AssetPipeline::stylesheet("a { b: c }", false), "a { b: c }");
    }

    #[test]
    fn copies_nested_files() {
        let temp = tempdir().unwrap();
        let from = temp.path().join("assets");
        let to = temp.path().join("out/assets");
        fs::create_dir_all(from.join("sub")).unwrap();
        fs::write(from.join("a.txt"), "a").unwrap();
        fs::write(from.join("sub/b.txt"), "b").unwrap();
        fs::write(from.join("broken.png"), "not a png").unwrap();

        let copied =
            AssetPipeline::copy_dir(&from, &to, Some(&ImageCompressor::default())).unwrap();

        assert_eq!(copied, 3);
        assert_eq!(fs::read_to_string(to.join("sub/b.txt")).unwrap(), "b");
        assert_eq!(fs::read_to_string(to.join("broken.png")).unwrap(), "not a png");
    }
}
