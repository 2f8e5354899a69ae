//! Template engine for rendering blog pages.
//!
//! The same templates serve the static build and the dynamic server. Each render
//! gets a [`Layout`] that says how deep the page sits (`root`) and whether
//! dynamic features (comments, login, admin, server-side search) are available.
//! Link helpers registered on the environment read both to produce the right URLs.

use std::fs;
use std::path::Path;

use minijinja::value::Value;
use minijinja::{context, path_loader, Environment, State};
use serde::Serialize;

use scribe_content::html::{absolute_url, escape};
use scribe_content::{Page, Post, TagSummary};

/// Names of the built-in templates, in load order.
pub const TEMPLATE_NAMES: &[&str] = &[
    "base.html",
    "index.html",
    "post.html",
    "tags.html",
    "tag.html",
    "search.html",
    "admin.html",
    "login.html",
];

/// Site-wide values available to every template as `site`.
#[derive(Debug, Clone, Serialize)]
pub struct SiteInfo {
    pub title: String,
    pub description: String,
    /// Public URL without a trailing slash
    pub url: String,
    pub author: String,
    pub language: String,
}

impl Default for SiteInfo {
    fn default() -> Self {
        Self {
            title: "My Blog".to_string(),
            description: String::new(),
            url: "http://localhost:8080".to_string(),
            author: String::new(),
            language: "en".to_string(),
        }
    }
}

/// Where a page is rendered from.
#[derive(Debug, Clone, Copy)]
pub struct Layout<'a> {
    pub site: &'a SiteInfo,
    /// Prefix that reaches the site root from this page: `""`, `"../"` or `"/"`
    pub root: &'a str,
    pub dynamic: bool,
}

impl<'a> Layout<'a> {
    /// A page in the static output, `depth` directories below the root.
    pub fn static_page(site: &'a SiteInfo, depth: usize) -> Self {
        const ROOTS: [&str; 3] = ["", "../", "../../"];
        Self {
            site,
            root: ROOTS[depth.min(ROOTS.len() - 1)],
            dynamic: false,
        }
    }

    /// A page served by the dynamic server.
    pub fn server(site: &'a SiteInfo) -> Self {
        Self {
            site,
            root: "/",
            dynamic: true,
        }
    }
}

/// Errors that can occur when loading or rendering templates.
#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("Failed to read template {path}: {message}")]
    Read { path: String, message: String },

    #[error("Template error: {0}")]
    Render(#[from] minijinja::Error),
}

/// Template engine using minijinja.
pub struct TemplateEngine {
    env: Environment<'static>,
}

impl TemplateEngine {
    /// Create a template engine with the built-in templates.
    pub fn new() -> Result<Self, TemplateError> {
        Self::build(None)
    }

    /// Like [`TemplateEngine::new`], but files in `dir` replace built-ins of the same name.
    ///
    /// Other templates in `dir` are loaded on demand, so overrides can include partials.
    pub fn with_overrides(dir: &Path) -> Result<Self, TemplateError> {
        Self::build(Some(dir))
    }

    fn build(overrides: Option<&Path>) -> Result<Self, TemplateError> {
        let mut env = Environment::new();

        for (name, builtin) in TEMPLATE_NAMES.iter().zip(BUILTIN_TEMPLATES) {
            let source = match overrides.map(|dir| dir.join(name)) {
                Some(path) if path.is_file() => {
                    tracing::debug!("Using template override {}", path.display());
                    fs::read_to_string(&path).map_err(|e| TemplateError::Read {
                        path: path.display().to_string(),
                        message: e.to_string(),
                    })?
                }
                _ => builtin.to_string(),
            };
            env.add_template_owned(name.to_string(), source)?;
        }

        if let Some(dir) = overrides {
            env.set_loader(path_loader(dir));
        }

        env.add_function("post_url", post_url);
        env.add_function("tag_url", tag_url);
        env.add_function("page_url", page_url);
        env.add_function("link", link);
        env.add_filter("asset_url", asset_url);

        Ok(Self { env })
    }

    /// Render any template with the layout values plus `ctx`.
    pub fn render(&self, name: &str, layout: Layout<'_>, ctx: Value) -> Result<String, TemplateError> {
        let tmpl = self.env.get_template(name)?;
        let html = tmpl.render(context! {
            site => layout.site,
            root => layout.root,
            dynamic => layout.dynamic,
            ..ctx
        })?;
        Ok(html)
    }

    /// One page of the post listing.
    pub fn index(&self, layout: Layout<'_>, page: &Page<Post>) -> Result<String, TemplateError> {
        self.render(
            "index.html",
            layout,
            context! {
                title => &layout.site.title,
                posts => &page.items,
                page => page,
                has_next => page.has_next(),
                has_prev => page.has_prev(),
            },
        )
    }

    /// A full post with social card metadata.
    pub fn post(
        &self,
        layout: Layout<'_>,
        post: &Post,
        content_html: &str,
    ) -> Result<String, TemplateError> {
        let url = format!("{}/posts/{}", layout.site.url.trim_end_matches('/'), post.slug);
        let image = post.image.as_deref().map(|image| {
            let rooted = format!("/{}", image.trim_start_matches('/'));
            safe_url(absolute_url(&layout.site.url, &rooted))
        });

        self.render(
            "post.html",
            layout,
            context! {
                title => &post.title,
                post => post,
                content => content_html,
                og => context! {
                    title => &post.title,
                    description => &post.description,
                    url => safe_url(url),
                    image => image,
                },
            },
        )
    }

    pub fn tags(&self, layout: Layout<'_>, tags: &[TagSummary]) -> Result<String, TemplateError> {
        self.render(
            "tags.html",
            layout,
            context! { title => "Tags", tags => tags },
        )
    }

    pub fn tag(&self, layout: Layout<'_>, name: &str, posts: &[Post]) -> Result<String, TemplateError> {
        self.render(
            "tag.html",
            layout,
            context! { title => format!("Tagged \"{}\"", name), tag => name, posts => posts },
        )
    }

    /// The search page. Static builds search client-side, so `results` is only set by the server.
    pub fn search(
        &self,
        layout: Layout<'_>,
        query: &str,
        results: Option<&[Post]>,
    ) -> Result<String, TemplateError> {
        self.render(
            "search.html",
            layout,
            context! { title => "Search", query => query, results => results },
        )
    }

    pub fn admin(&self, layout: Layout<'_>) -> Result<String, TemplateError> {
        self.render("admin.html", layout, context! { title => "Admin" })
    }

    /// Sign-in page listing the configured OAuth providers.
    pub fn login(&self, layout: Layout<'_>, providers: &[&str]) -> Result<String, TemplateError> {
        self.render(
            "login.html",
            layout,
            context! { title => "Sign in", providers => providers },
        )
    }
}

fn link_base(state: &State) -> (String, bool) {
    let root = state
        .lookup("root")
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_else(|| "/".to_string());
    let dynamic = state.lookup("dynamic").map(|v| v.is_true()).unwrap_or(false);
    (root, dynamic)
}

/// Attribute-safe URL. Autoescape would also encode `/`, so links are escaped here instead.
fn safe_url(url: String) -> Value {
    Value::from_safe_string(escape(&url))
}

fn post_url(state: &State, slug: &str) -> Value {
    safe_url(match link_base(state) {
        (root, true) => format!("{root}posts/{slug}"),
        (root, false) => format!("{root}posts/{slug}.html"),
    })
}

fn tag_url(state: &State, slug: &str) -> Value {
    safe_url(match link_base(state) {
        (root, true) => format!("{root}tags/{slug}"),
        (root, false) => format!("{root}tags/{slug}.html"),
    })
}

fn page_url(state: &State, page: usize) -> Value {
    safe_url(match (link_base(state), page) {
        ((root, true), 0 | 1) => root,
        ((root, true), n) => format!("{root}?page={n}"),
        ((root, false), 0 | 1) => format!("{root}index.html"),
        ((root, false), n) => format!("{root}page/{n}/index.html"),
    })
}

/// Fixed site pages by name (`home`, `tags`, `search`, `feed`, `style`, `login`);
/// anything else is treated as a root-relative path.
fn link(state: &State, name: &str) -> Value {
    let (root, dynamic) = link_base(state);
    let path = match (name, dynamic) {
        ("home", true) => "",
        ("home", false) => "index.html",
        ("tags", true) => "tags",
        ("tags", false) => "tags/index.html",
        ("search", true) => "search",
        ("search", false) => "search.html",
        ("feed", _) => "feed.rss",
        ("style", _) => "style.css",
        ("login", _) => "login",
        (other, _) => other,
    };
    safe_url(format!("{root}{path}"))
}

/// Resolve a site-relative asset path against `root`.
///
/// With `size`, the server is asked for that variant; static builds keep the full image.
fn asset_url(state: &State, path: &str, size: Option<&str>) -> Value {
    if path.contains("://") || path.starts_with("data:") {
        return safe_url(path.to_string());
    }

    let (root, dynamic) = link_base(state);
    let url = match path.strip_prefix('/') {
        Some(rooted) if dynamic => format!("/{rooted}"),
        Some(rooted) => format!("{root}{rooted}"),
        None => format!("{root}{path}"),
    };

    match size {
        Some(size) if dynamic => safe_url(format!("{url}?size={size}")),
        _ => safe_url(url),
    }
}

const BUILTIN_TEMPLATES: [&str; 8] = [
    BASE_TEMPLATE,
    INDEX_TEMPLATE,
    POST_TEMPLATE,
    TAGS_TEMPLATE,
    TAG_TEMPLATE,
    SEARCH_TEMPLATE,
    ADMIN_TEMPLATE,
    LOGIN_TEMPLATE,
];

const BASE_TEMPLATE: &str = r##"<!DOCTYPE html>
<html lang="{{ site.language }}">
<head>
  <meta charset="utf-8">
  <meta name="viewport" content="width=device-width, initial-scale=1">
  <title>{% if title != site.title %}{{ title }} - {% endif %}{{ site.title }}</title>
  <meta name="description" content="{% block description %}{{ site.description }}{% endblock %}">
  {% block meta %}{% endblock %}
  <link rel="stylesheet" href="{{ link('style') }}">
  <link rel="alternate" type="application/rss+xml" title="{{ site.title }}" href="{{ link('feed') }}">
</head>
<body>
  <header class="site-header">
    <a class="site-title" href="{{ link('home') }}">{{ site.title }}</a>
    <nav>
      <a href="{{ link('tags') }}">Tags</a>
      <a href="{{ link('search') }}">Search</a>
      <a href="{{ link('feed') }}">RSS</a>
      {% if dynamic %}<a id="account" href="{{ link('login') }}">Sign in</a>{% endif %}
    </nav>
  </header>
  <main>
    {% block content %}{% endblock %}
  </main>
  <footer class="site-footer">
    {% if site.author %}&copy; {{ site.author }}{% endif %}
  </footer>
  {% if dynamic %}
  <script>
  window.scribeUser = null;
  fetch("/api/auth/status").then(r => r.json()).then(data => {
    window.scribeUser = data.authenticated ? data.user : null;
    const account = document.getElementById("account");
    if (data.authenticated && account) {
      account.textContent = data.user.name + " (sign out)";
      account.href = "/logout";
    }
    document.dispatchEvent(new CustomEvent("scribe:auth", { detail: data }));
  });
  </script>
  {% endif %}
  {% block scripts %}{% endblock %}
</body>
</html>"##;

const INDEX_TEMPLATE: &str = r##"{% extends "base.html" %}
{% block content %}
<ul class="post-list">
{% for post in posts %}
  <li class="post-card">
    <div>
      <h2><a href="{{ post_url(post.slug) }}">{{ post.title }}</a></h2>
      <div class="post-meta">{{ post.date }}{% for tag in post.tags %} <a class="tag" href="{{ tag_url(tag | lower | replace(' ', '-')) }}">#{{ tag }}</a>{% endfor %}</div>
      <p>{{ post.summary }}</p>
    </div>
    {% if post.image %}<img src="{{ post.image | asset_url('thumbnail') }}" alt="" loading="lazy">{% endif %}
  </li>
{% else %}
  <li>No posts yet.</li>
{% endfor %}
</ul>
<nav class="pagination">
  {% if has_prev %}<a rel="prev" href="{{ page_url(page.page - 1) }}">&larr; Newer</a>{% else %}<span></span>{% endif %}
  <span>Page {{ page.page }} of {{ page.total_pages }}</span>
  {% if has_next %}<a rel="next" href="{{ page_url(page.page + 1) }}">Older &rarr;</a>{% else %}<span></span>{% endif %}
</nav>
{% endblock %}"##;

const POST_TEMPLATE: &str = r##"{% extends "base.html" %}
{% block description %}{{ og.description }}{% endblock %}
{% block meta %}
  <link rel="canonical" href="{{ og.url }}">
  <meta property="og:type" content="article">
  <meta property="og:title" content="{{ og.title }}">
  <meta property="og:description" content="{{ og.description }}">
  <meta property="og:url" content="{{ og.url }}">
  {% if og.image %}<meta property="og:image" content="{{ og.image }}">{% endif %}
  <meta name="twitter:card" content="{% if og.image %}summary_large_image{% else %}summary{% endif %}">
  <meta name="twitter:title" content="{{ og.title }}">
  <meta name="twitter:description" content="{{ og.description }}">
  {% if og.image %}<meta name="twitter:image" content="{{ og.image }}">{% endif %}
{% endblock %}
{% block content %}
<article class="post" data-slug="{{ post.slug }}">
  <h1>{{ post.title }}</h1>
  <div class="post-meta">{{ post.date }}{% for tag in post.tags %} <a class="tag" href="{{ tag_url(tag | lower | replace(' ', '-')) }}">#{{ tag }}</a>{% endfor %}</div>
  {% if post.image %}<img class="post-banner" src="{{ post.image | asset_url }}" alt="">{% endif %}
  {% if post.toc | length > 2 %}
  <nav class="toc">
    <ul>
    {% for entry in post.toc %}
      <li class="toc-level-{{ entry.level }}"><a href="#{{ entry.id }}">{{ entry.title }}</a></li>
    {% endfor %}
    </ul>
  </nav>
  {% endif %}
  <div class="post-content">
    {{ content | safe }}
  </div>
</article>
{% if dynamic %}
<section class="share">
  {% for platform in ["twitter", "mastodon", "reddit", "copy"] %}
  <button type="button" data-platform="{{ platform }}">{{ platform | title }}</button>
  {% endfor %}
</section>
<section class="comments" id="comments">
  <h2>Comments</h2>
  <div id="comments-list"></div>
  <form class="comment-form" id="comment-form" hidden>
    <p id="reply-indicator" hidden>Replying to <span id="reply-to"></span> <button type="button" id="cancel-reply">cancel</button></p>
    <textarea id="comment-text" maxlength="2000" placeholder="Leave a comment..."></textarea>
    <button type="submit">Post</button>
    <span id="comment-status"></span>
  </form>
  <p id="signin-banner"><a href="{{ link('login') }}">Sign in</a> to comment.</p>
</section>
{% endif %}
{% endblock %}
{% block scripts %}
{% if dynamic %}
<script>
(() => {
  const slug = {{ post.slug | tojson }};
  const list = document.getElementById("comments-list");
  const form = document.getElementById("comment-form");
  const text = document.getElementById("comment-text");
  const status = document.getElementById("comment-status");
  let parentId = null;

  function render(comment) {
    const el = document.createElement("div");
    el.className = "comment";
    const head = document.createElement("div");
    head.className = "post-meta";
    head.textContent = comment.author_name + " · " + new Date(comment.created_at * 1000).toLocaleString()
      + (comment.edited_at ? " (edited)" : "") + (comment.source === "wasteof" ? " · wasteof" : "");
    const body = document.createElement("p");
    body.textContent = comment.content;
    el.append(head, body);
    if (!comment.deleted && window.scribeUser) {
      const reply = document.createElement("button");
      reply.textContent = "reply";
      reply.onclick = () => {
        parentId = comment.id;
        document.getElementById("reply-to").textContent = comment.author_name;
        document.getElementById("reply-indicator").hidden = false;
        text.focus();
      };
      el.append(reply);
      if (window.scribeUser.id === comment.user_id) {
        const edit = document.createElement("button");
        edit.textContent = "edit";
        edit.onclick = async () => {
          const content = prompt("Edit comment", comment.content);
          if (content === null || content.trim() === comment.content) return;
          const res = await fetch("/api/comments/" + comment.id, {
            method: "PUT",
            headers: { "Content-Type": "application/json" },
            body: JSON.stringify({ content }),
          });
          if (!res.ok) status.textContent = (await res.json()).error;
          load();
        };
        el.append(edit);
      }
      if (window.scribeUser.id === comment.user_id || window.scribeUser.is_admin) {
        const del = document.createElement("button");
        del.textContent = "delete";
        del.onclick = async () => {
          if (confirm("Delete this comment?")) {
            await fetch("/api/comments/" + comment.id, { method: "DELETE" });
            load();
          }
        };
        el.append(del);
      }
    }
    if (comment.replies && comment.replies.length) {
      const replies = document.createElement("div");
      replies.className = "replies";
      comment.replies.forEach(r => replies.append(render(r)));
      el.append(replies);
    }
    return el;
  }

  async function load() {
    const data = await (await fetch("/api/comments/" + encodeURIComponent(slug))).json();
    list.textContent = "";
    if (!data.comments.length) list.textContent = "No comments yet.";
    data.comments.forEach(c => list.append(render(c)));
  }

  document.getElementById("cancel-reply").onclick = () => {
    parentId = null;
    document.getElementById("reply-indicator").hidden = true;
  };

  form.onsubmit = async (event) => {
    event.preventDefault();
    const res = await fetch("/api/comments/" + encodeURIComponent(slug), {
      method: "POST",
      headers: { "Content-Type": "application/json" },
      body: JSON.stringify({ content: text.value, parent_id: parentId }),
    });
    const data = await res.json();
    status.textContent = res.ok ? "" : data.error;
    if (res.ok) {
      text.value = "";
      parentId = null;
      document.getElementById("reply-indicator").hidden = true;
      load();
    }
  };

  document.querySelectorAll(".share button").forEach(button => {
    button.onclick = () => {
      const platform = button.dataset.platform;
      fetch("/api/share/" + encodeURIComponent(slug), {
        method: "POST",
        headers: { "Content-Type": "application/json" },
        body: JSON.stringify({ platform }),
      });
      const url = encodeURIComponent({{ og.url | tojson }});
      const targets = {
        twitter: "https://twitter.com/intent/tweet?url=" + url,
        mastodon: "https://mastodonshare.com/?url=" + url,
        reddit: "https://www.reddit.com/submit?url=" + url,
      };
      if (targets[platform]) window.open(targets[platform], "_blank");
      else navigator.clipboard.writeText({{ og.url | tojson }});
    };
  });

  document.addEventListener("scribe:auth", (event) => {
    form.hidden = !event.detail.authenticated;
    document.getElementById("signin-banner").hidden = event.detail.authenticated;
    load();
  });
  load();
})();
</script>
{% endif %}
{% endblock %}"##;

const LOGIN_TEMPLATE: &str = r##"{% extends "base.html" %}
{% block content %}
<h1>Sign in</h1>
<ul class="provider-list">
{% for provider in providers %}
  <li><a href="{{ link('login/' ~ provider) }}">Continue with {{ provider | capitalize }}</a></li>
{% else %}
  <li>Sign-in is not configured.</li>
{% endfor %}
</ul>
{% endblock %}"##;

const TAGS_TEMPLATE: &str = r##"{% extends "base.html" %}
{% block content %}
<h1>Tags</h1>
<ul class="tag-list">
{% for tag in tags %}
  <li><a href="{{ tag_url(tag.slug) }}">{{ tag.name }}</a> ({{ tag.count }})</li>
{% else %}
  <li>No tags yet.</li>
{% endfor %}
</ul>
{% endblock %}"##;

const TAG_TEMPLATE: &str = r##"{% extends "base.html" %}
{% block content %}
<h1>Posts tagged "{{ tag }}"</h1>
<ul class="post-list">
{% for post in posts %}
  <li class="post-card">
    <div>
      <h2><a href="{{ post_url(post.slug) }}">{{ post.title }}</a></h2>
      <div class="post-meta">{{ post.date }}</div>
      <p>{{ post.summary }}</p>
    </div>
    {% if post.image %}<img src="{{ post.image | asset_url('thumbnail') }}" alt="" loading="lazy">{% endif %}
  </li>
{% else %}
  <li>No posts with this tag.</li>
{% endfor %}
</ul>
{% endblock %}"##;

const SEARCH_TEMPLATE: &str = r##"{% extends "base.html" %}
{% block content %}
<h1>Search</h1>
<form action="{{ link('search') }}" method="get">
  <input type="search" id="search-input" name="q" value="{{ query }}" placeholder="Search posts" autofocus>
</form>
<ul class="post-list" id="search-results">
{% if results is not none %}
{% for post in results %}
  <li class="post-card"><div>
    <h2><a href="{{ post_url(post.slug) }}">{{ post.title }}</a></h2>
    <div class="post-meta">{{ post.date }}</div>
    <p>{{ post.summary }}</p>
  </div></li>
{% else %}
  {% if query %}<li>No results for "{{ query }}".</li>{% endif %}
{% endfor %}
{% endif %}
</ul>
{% endblock %}
{% block scripts %}
{% if not dynamic %}
<script>
(async () => {
  const index = await (await fetch("{{ link('search-index.json') }}")).json();
  const input = document.getElementById("search-input");
  const results = document.getElementById("search-results");
  function show() {
    const q = input.value.trim().toLowerCase();
    results.textContent = "";
    if (!q) return;
    index.filter(p => p.title.toLowerCase().includes(q) || p.summary.toLowerCase().includes(q)
        || p.tags.some(t => t.toLowerCase().includes(q)))
      .forEach(p => {
        const li = document.createElement("li");
        const a = document.createElement("a");
        a.href = "{{ link('posts/') }}" + p.slug + ".html";
        a.textContent = p.title;
        li.append(a);
        results.append(li);
      });
  }
  input.addEventListener("input", show);
  input.form.addEventListener("submit", (e) => { e.preventDefault(); show(); });
  show();
})();
</script>
{% endif %}
{% endblock %}"##;

const ADMIN_TEMPLATE: &str = r##"{% extends "base.html" %}
{% block content %}
<div class="admin">
  <h1>Admin</h1>
  <section><h2>Overview</h2><div id="overview"></div></section>
  <section><h2>Posts</h2><table id="posts"></table></section>
  <section><h2>Recent comments</h2><table id="comments"></table></section>
  <section><h2>Users</h2><table id="users"></table></section>
  <section>
    <h2>Blocked addresses</h2>
    <form id="block-form"><input name="ip" placeholder="IP address"> <button>Look up</button></form>
    <div id="lookup"></div>
    <table id="blocked"></table>
  </section>
</div>
{% endblock %}
{% block scripts %}
<script>
(() => {
  const get = async (url) => (await fetch(url)).json();
  const post = (url, body) => fetch(url, {
    method: "POST",
    headers: { "Content-Type": "application/json" },
    body: body ? JSON.stringify(body) : undefined,
  });

  function table(id, rows, columns, actions) {
    const el = document.getElementById(id);
    el.textContent = "";
    rows.forEach(row => {
      const tr = document.createElement("tr");
      columns.forEach(col => {
        const td = document.createElement("td");
        td.textContent = row[col] ?? "";
        tr.append(td);
      });
      (actions || []).forEach(([label, handler]) => {
        const td = document.createElement("td");
        const b = document.createElement("button");
        b.textContent = label;
        b.onclick = async () => { await handler(row); refresh(); };
        td.append(b);
        tr.append(td);
      });
      el.append(tr);
    });
  }

  async function refresh() {
    const o = await get("/api/analytics/overview");
    document.getElementById("overview").textContent =
      `${o.total_views} views (${o.unique_views} unique), ${o.total_shares} shares, ${o.total_comments} comments, ${o.total_users} users`;
    table("posts", (await get("/api/analytics/posts")).items, ["slug", "views", "unique_views", "shares", "comments"]);
    table("comments", (await get("/api/admin/comments")).items, ["slug", "author_name", "content"], [
      ["delete", c => fetch("/api/comments/" + c.id, { method: "DELETE" })],
      ["block", c => post("/api/admin/blocked_ips/action", { comment_id: c.id, action: "block" })],
    ]);
    table("users", (await get("/api/admin/users")).items, ["name", "provider", "comment_count", "banned"], [
      ["ban", u => post(`/api/admin/users/${u.id}/ban`)],
      ["unban", u => post(`/api/admin/users/${u.id}/unban`)],
      ["purge", u => post(`/api/admin/users/${u.id}/comments/delete_all`)],
    ]);
    table("blocked", (await get("/api/admin/blocked_ips")).items, ["label", "reason"], [
      ["activity", async b => {
        const data = await get(`/api/admin/blocked_ips/${b.id}/analysis`);
        document.getElementById("lookup").textContent =
          `${b.label ?? "entry " + b.id}: ${data.views} views, ${data.shares} shares, ${data.comments.length} comments`;
      }],
      ["unblock", b => post(`/api/admin/blocked_ips/${b.id}/unblock`)],
    ]);
  }

  document.getElementById("block-form").onsubmit = async (event) => {
    event.preventDefault();
    const ip = event.target.ip.value.trim();
    const data = await get("/api/admin/blocked_ips/lookup?ip=" + encodeURIComponent(ip));
    const out = document.getElementById("lookup");
    out.textContent = `${data.views} views, ${data.shares} shares, ${data.comments.length} comments, ${data.blocked ? "blocked" : "not blocked"} `;
    const b = document.createElement("button");
    b.textContent = data.blocked ? "unblock" : "block";
    b.onclick = async () => {
      await post("/api/admin/blocked_ips/action", { ip, action: data.blocked ? "unblock" : "block" });
      refresh();
    };
    out.append(b);
  };

  refresh();
})();
</script>
{% endblock %}"##;
