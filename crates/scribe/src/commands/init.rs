//! Initialize a blog in the current directory.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use scribe_static::DEFAULT_CSS;

/// Run the init command. Files land next to the config file.
pub async fn run(config_path: &Path, yes: bool) -> Result<()> {
    tracing::info!("Initializing scribe...");

    let root = match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let config_name = config_path.file_name().unwrap_or("blog.toml".as_ref());

    let created = scaffold(root, Path::new(config_name), yes)?;
    if created == 0 {
        tracing::warn!("Nothing to do; all files exist. Use --yes to overwrite.");
        return Ok(());
    }

    tracing::info!("Initialization complete!");
    tracing::info!("Run 'scribe serve' to start the server or 'scribe build' for a static site.");

    Ok(())
}

/// Write the starter files under `root`, returning how many were written.
fn scaffold(root: &Path, config_name: &Path, yes: bool) -> Result<usize> {
    let assets_dir = root.join("posts").join("assets");
    fs::create_dir_all(&assets_dir).context("Failed to create posts directory")?;

    let files = [
        (config_name.to_path_buf(), DEFAULT_CONFIG),
        (Path::new("posts").join("hello-world.md"), DEFAULT_POST),
        (Path::new("style.css").to_path_buf(), DEFAULT_CSS),
    ];

    let mut created = 0;
    for (relative, content) in files {
        let path = root.join(&relative);
        if path.exists() && !yes {
            tracing::debug!("Keeping existing {}", relative.display());
            continue;
        }
        fs::write(&path, content)
            .with_context(|| format!("Failed to write {}", relative.display()))?;
        tracing::info!("Created {}", relative.display());
        created += 1;
    }

    Ok(created)
}

const DEFAULT_CONFIG: &str = r#"# Scribe configuration

[site]
title = "My Blog"
description = "Notes and projects"
# Public URL, used for feeds, social cards and OAuth callbacks
url = "http://127.0.0.1:8080"
author = "Me"

[paths]
posts = "posts"
output = "dist"
stylesheet = "style.css"
data = "data"

[build]
minify = true
compress_images = true
per_page = 10

[server]
host = "127.0.0.1"
port = 8080
# Admins as "provider:id" or email
admins = []
# Set this or SCRIBE_IP_SALT to anonymize stored addresses
# ip_salt = ""

[comments]
rate_limit = 5
rate_window_secs = 600

[sync]
# Mirror comment threads from wasteof.money posts named in frontmatter
enabled = false
interval_secs = 300

# [[oauth]]
# name = "github"
# client_id = ""
# Secret from SCRIBE_OAUTH_GITHUB_SECRET when left out
"#;

const DEFAULT_POST: &str = r#"---
title: Hello World
date: 2024-01-01
tags: [meta]
summary: The first post on this blog.
---

# Hello World

This is your first post. Posts live in `posts/` as Markdown files with
frontmatter at the top.

Images and other files go in `posts/assets/` and are compressed when served.

## Widgets

A line on its own can embed media:

[[youtube: dQw4w9WgXcQ]]
"#;
