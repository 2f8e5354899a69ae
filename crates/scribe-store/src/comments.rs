//! Threaded comments with soft deletion, edit history and rate limiting.

use std::collections::HashMap;

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;

use crate::users::User;
use crate::{page_bounds, Paged, Store, StoreError};

/// Longest accepted comment body, in characters.
pub const MAX_COMMENT_LENGTH: usize = 2000;

/// Where a comment was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CommentSource {
    /// Posted on this blog
    Local,
    /// Mirrored from wasteof.money
    Wasteof,
}

impl CommentSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Wasteof => "wasteof",
        }
    }

    fn from_db(value: &str) -> Self {
        match value {
            "wasteof" => Self::Wasteof,
            _ => Self::Local,
        }
    }
}

/// A comment, optionally with its replies attached.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Comment {
    pub id: i64,
    pub slug: String,
    pub parent_id: Option<i64>,
    pub user_id: Option<i64>,
    pub author_name: String,
    pub author_avatar: Option<String>,
    pub content: String,
    pub source: CommentSource,
    pub external_id: Option<String>,
    pub created_at: i64,
    pub edited_at: Option<i64>,
    pub deleted: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub replies: Vec<Comment>,
}

/// A locally written comment.
#[derive(Debug, Clone)]
pub struct NewComment {
    pub slug: String,
    pub parent_id: Option<i64>,
    pub user_id: i64,
    pub author_name: String,
    pub author_avatar: Option<String>,
    pub content: String,
    pub ip: String,
}

/// A comment fetched from an external platform.
#[derive(Debug, Clone)]
pub struct ExternalComment {
    pub slug: String,
    pub external_id: String,
    pub parent_external_id: Option<String>,
    pub author_name: String,
    pub author_avatar: Option<String>,
    pub content: String,
    pub created_at: i64,
}

/// A previous revision of an edited comment.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CommentEdit {
    pub previous_content: String,
    pub edited_at: i64,
}

/// At most `max` comments per `window_secs`, per user or IP.
#[derive(Debug, Clone, Copy)]
pub struct RateLimit {
    pub max: u32,
    pub window_secs: i64,
}

impl Default for RateLimit {
    fn default() -> Self {
        Self {
            max: 5,
            window_secs: 600,
        }
    }
}

const COMMENT_COLUMNS: &str = "id, slug, parent_id, user_id, author_name, author_avatar, content, \
     source, external_id, created_at, edited_at, deleted";

fn comment_from_row(row: &Row<'_>) -> rusqlite::Result<Comment> {
    let source: String = row.get(7)?;
    Ok(Comment {
        id: row.get(0)?,
        slug: row.get(1)?,
        parent_id: row.get(2)?,
        user_id: row.get(3)?,
        author_name: row.get(4)?,
        author_avatar: row.get(5)?,
        content: row.get(6)?,
        source: CommentSource::from_db(&source),
        external_id: row.get(8)?,
        created_at: row.get(9)?,
        edited_at: row.get(10)?,
        deleted: row.get(11)?,
        replies: Vec::new(),
    })
}

fn validate_content(content: &str) -> Result<String, StoreError> {
    let content = content.trim();
    if content.is_empty() {
        return Err(StoreError::Invalid("comment is empty".to_string()));
    }
    if content.chars().count() > MAX_COMMENT_LENGTH {
        return Err(StoreError::Invalid(format!(
            "comment is longer than {} characters",
            MAX_COMMENT_LENGTH
        )));
    }
    Ok(content.to_string())
}

fn find_comment(conn: &Connection, id: i64) -> Result<Option<Comment>, StoreError> {
    let comment = conn
        .query_row(
            &format!("SELECT {COMMENT_COLUMNS} FROM comments WHERE id = ?1"),
            params![id],
            comment_from_row,
        )
        .optional()?;
    Ok(comment)
}

fn query_comments(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<Comment>, StoreError> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, comment_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Arrange flat rows (oldest first) into reply trees.
///
/// Deleted comments survive only as redacted placeholders above live replies.
fn build_threads(rows: Vec<Comment>) -> Vec<Comment> {
    let mut children: HashMap<Option<i64>, Vec<Comment>> = HashMap::new();
    for comment in rows {
        children.entry(comment.parent_id).or_default().push(comment);
    }

    fn attach(
        parent: Option<i64>,
        children: &mut HashMap<Option<i64>, Vec<Comment>>,
    ) -> Vec<Comment> {
        let Some(level) = children.remove(&parent) else {
            return Vec::new();
        };

        level
            .into_iter()
            .filter_map(|mut comment| {
                comment.replies = attach(Some(comment.id), children);
                if comment.deleted {
                    if comment.replies.is_empty() {
                        return None;
                    }
                    comment.content = String::new();
                    comment.author_name = "[deleted]".to_string();
                    comment.author_avatar = None;
                    comment.user_id = None;
                }
                Some(comment)
            })
            .collect()
    }

    attach(None, &mut children)
}

impl Store {
    /// Post a local comment. Replies must point at a comment on the same post.
    pub fn add_comment(&self, new: &NewComment, now: i64) -> Result<Comment, StoreError> {
        let content = validate_content(&new.content)?;
        let ip_hash = self.anonymize_ip(&new.ip);
        let conn = self.conn()?;

        if let Some(parent_id) = new.parent_id {
            let parent = find_comment(&conn, parent_id)?;
            match parent {
                Some(parent) if parent.slug == new.slug => {}
                _ => return Err(StoreError::ParentNotFound(parent_id.to_string())),
            }
        }

        conn.execute(
            "INSERT INTO comments (slug, parent_id, user_id, author_name, author_avatar, content, source, ip_hash, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'local', ?7, ?8)",
            params![
                new.slug,
                new.parent_id,
                new.user_id,
                new.author_name,
                new.author_avatar,
                content,
                ip_hash,
                now
            ],
        )?;
        let id = conn.last_insert_rowid();

        tracing::info!(id, slug = %new.slug, user_id = new.user_id, "Comment posted");

        find_comment(&conn, id)?.ok_or(StoreError::NotFound("Comment"))
    }

    pub fn comment(&self, id: i64) -> Result<Option<Comment>, StoreError> {
        let conn = self.conn()?;
        find_comment(&conn, id)
    }

    /// Comment threads for a post, oldest first at every level.
    pub fn comments_for(&self, slug: &str) -> Result<Vec<Comment>, StoreError> {
        let conn = self.conn()?;
        let rows = query_comments(
            &conn,
            &format!(
                "SELECT {COMMENT_COLUMNS} FROM comments WHERE slug = ?1 ORDER BY created_at, id"
            ),
            params![slug],
        )?;
        Ok(build_threads(rows))
    }

    /// Live comment count for a post.
    pub fn comment_count(&self, slug: &str) -> Result<i64, StoreError> {
        let conn = self.conn()?;
        let count = conn.query_row(
            "SELECT COUNT(*) FROM comments WHERE slug = ?1 AND deleted = 0",
            params![slug],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Reject the comment if the user or IP already hit the limit in the window.
    pub fn check_comment_rate(
        &self,
        user_id: i64,
        ip: &str,
        now: i64,
        limit: RateLimit,
    ) -> Result<(), StoreError> {
        let ip_hash = self.anonymize_ip(ip);
        let since = now - limit.window_secs;
        let conn = self.conn()?;

        let (count, oldest): (i64, Option<i64>) = conn.query_row(
            "SELECT COUNT(*), MIN(created_at) FROM comments
             WHERE source = 'local' AND created_at > ?1 AND (user_id = ?2 OR ip_hash = ?3)",
            params![since, user_id, ip_hash],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        if count >= i64::from(limit.max) {
            let retry_after = oldest
                .map(|t| t + limit.window_secs - now)
                .unwrap_or(limit.window_secs)
                .max(1);
            tracing::warn!(user_id, count, retry_after, "Comment rate limit hit");
            return Err(StoreError::RateLimited { retry_after });
        }

        Ok(())
    }

    /// Replace a comment's content, keeping the previous text in the edit history.
    pub fn edit_comment(
        &self,
        id: i64,
        editor: &User,
        content: &str,
        now: i64,
    ) -> Result<Comment, StoreError> {
        let content = validate_content(content)?;
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let existing = find_comment(&tx, id)?
            .filter(|c| !c.deleted)
            .ok_or(StoreError::NotFound("Comment"))?;
        if existing.user_id != Some(editor.id) {
            return Err(StoreError::Forbidden);
        }

        tx.execute(
            "INSERT INTO comment_edits (comment_id, previous_content, edited_at) VALUES (?1, ?2, ?3)",
            params![id, existing.content, now],
        )?;
        tx.execute(
            "UPDATE comments SET content = ?1, edited_at = ?2 WHERE id = ?3",
            params![content, now, id],
        )?;

        let updated = find_comment(&tx, id)?.ok_or(StoreError::NotFound("Comment"))?;
        tx.commit()?;

        Ok(updated)
    }

    /// Previous revisions of a comment, oldest first.
    pub fn comment_history(&self, id: i64) -> Result<Vec<CommentEdit>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT previous_content, edited_at FROM comment_edits WHERE comment_id = ?1 ORDER BY edited_at, id",
        )?;
        let edits = stmt
            .query_map(params![id], |row| {
                Ok(CommentEdit {
                    previous_content: row.get(0)?,
                    edited_at: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(edits)
    }

    /// Mark a comment deleted. Authors may delete their own; admins any.
    pub fn soft_delete_comment(&self, id: i64, actor: &User) -> Result<(), StoreError> {
        let conn = self.conn()?;

        let existing = find_comment(&conn, id)?.ok_or(StoreError::NotFound("Comment"))?;
        if !actor.is_admin && existing.user_id != Some(actor.id) {
            return Err(StoreError::Forbidden);
        }

        conn.execute("UPDATE comments SET deleted = 1 WHERE id = ?1", params![id])?;
        tracing::info!(id, actor = actor.id, "Comment deleted");
        Ok(())
    }

    /// All comments for moderation, newest first, optionally for one post.
    pub fn admin_comments(
        &self,
        slug: Option<&str>,
        page: usize,
        per_page: usize,
    ) -> Result<Paged<Comment>, StoreError> {
        let conn = self.conn()?;
        let (limit, offset) = page_bounds(page, per_page);

        let (total, items) = match slug {
            Some(slug) => {
                let total: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM comments WHERE slug = ?1",
                    params![slug],
                    |row| row.get(0),
                )?;
                let items = query_comments(
                    &conn,
                    &format!(
                        "SELECT {COMMENT_COLUMNS} FROM comments WHERE slug = ?1
                         ORDER BY created_at DESC, id DESC LIMIT ?2 OFFSET ?3"
                    ),
                    params![slug, limit, offset],
                )?;
                (total, items)
            }
            None => {
                let total: i64 =
                    conn.query_row("SELECT COUNT(*) FROM comments", [], |row| row.get(0))?;
                let items = query_comments(
                    &conn,
                    &format!(
                        "SELECT {COMMENT_COLUMNS} FROM comments
                         ORDER BY created_at DESC, id DESC LIMIT ?1 OFFSET ?2"
                    ),
                    params![limit, offset],
                )?;
                (total, items)
            }
        };

        Ok(Paged::new(items, page.max(1), per_page, total as usize))
    }

    /// One user's comments, newest first.
    pub fn user_comments(
        &self,
        user_id: i64,
        page: usize,
        per_page: usize,
    ) -> Result<Paged<Comment>, StoreError> {
        let conn = self.conn()?;
        let (limit, offset) = page_bounds(page, per_page);

        let total: i64 = conn.query_row(
            "SELECT COUNT(*) FROM comments WHERE user_id = ?1",
            params![user_id],
            |row| row.get(0),
        )?;
        let items = query_comments(
            &conn,
            &format!(
                "SELECT {COMMENT_COLUMNS} FROM comments WHERE user_id = ?1
                 ORDER BY created_at DESC, id DESC LIMIT ?2 OFFSET ?3"
            ),
            params![user_id, limit, offset],
        )?;

        Ok(Paged::new(items, page.max(1), per_page, total as usize))
    }

    /// Soft-delete every comment by a user, returning how many changed.
    pub fn delete_all_user_comments(&self, user_id: i64) -> Result<usize, StoreError> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE comments SET deleted = 1 WHERE user_id = ?1 AND deleted = 0",
            params![user_id],
        )?;
        tracing::info!(user_id, changed, "Deleted all comments for user");
        Ok(changed)
    }

    /// Insert or refresh a mirrored comment, keyed by its external id.
    pub fn upsert_external_comment(&self, comment: &ExternalComment) -> Result<i64, StoreError> {
        let conn = self.conn()?;

        let parent_id: Option<i64> = match &comment.parent_external_id {
            Some(parent) => {
                let id = conn
                    .query_row(
                        "SELECT id FROM comments WHERE external_id = ?1",
                        params![parent],
                        |row| row.get(0),
                    )
                    .optional()?;
                Some(id.ok_or_else(|| StoreError::ParentNotFound(parent.clone()))?)
            }
            None => None,
        };

        conn.execute(
            "INSERT INTO comments (slug, parent_id, author_name, author_avatar, content, source, external_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 'wasteof', ?6, ?7)
             ON CONFLICT (external_id) DO UPDATE SET
                 author_name = excluded.author_name,
                 author_avatar = excluded.author_avatar,
                 content = excluded.content",
            params![
                comment.slug,
                parent_id,
                comment.author_name,
                comment.author_avatar,
                comment.content,
                comment.external_id,
                comment.created_at
            ],
        )?;

        let id = conn.query_row(
            "SELECT id FROM comments WHERE external_id = ?1",
            params![comment.external_id],
            |row| row.get(0),
        )?;
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::users::tests::profile;
    use pretty_assertions::assert_eq;

    fn setup() -> (Store, User) {
        let store = Store::open_in_memory().unwrap();
        let user = store.upsert_user(&profile("1"), false, 0).unwrap();
        (store, user)
    }

    fn new_comment(user: &User, slug: &str, parent_id: Option<i64>, content: &str) -> NewComment {
        NewComment {
            slug: slug.to_string(),
            parent_id,
            user_id: user.id,
            author_name: user.name.clone(),
            author_avatar: None,
            content: content.to_string(),
            ip: "198.51.100.7".to_string(),
        }
    }

    #[test]
    fn builds_reply_threads() {
        let (store, user) = setup();

        let root = store
            .add_comment(&new_comment(&user, "post", None, "root"), 10)
            .unwrap();
        let reply = store
            .add_comment(&new_comment(&user, "post", Some(root.id), "reply"), 20)
            .unwrap();
        store
            .add_comment(&new_comment(&user, "post", Some(reply.id), "nested"), 30)
            .unwrap();
        store
            .add_comment(&new_comment(&user, "other", None, "elsewhere"), 40)
            .unwrap();

        let threads = store.comments_for("post").unwrap();

        assert_eq!(threads.len(), 1);
        assert_eq!(threads[0].content, "root");
        assert_eq!(threads[0].replies[0].content, "reply");
        assert_eq!(threads[0].replies[0].replies[0].content, "nested");
        assert_eq!(store.comment_count("post").unwrap(), 3);
    }

    #[test]
    fn parent_must_exist_on_same_post() {
        let (store, user) = setup();
        let other = store
            .add_comment(&new_comment(&user, "other", None, "x"), 1)
            .unwrap();

        let missing = store.add_comment(&new_comment(&user, "post", Some(999), "x"), 2);
        let cross_post = store.add_comment(&new_comment(&user, "post", Some(other.id), "x"), 3);

        assert!(matches!(missing, Err(StoreError::ParentNotFound(_))));
        assert!(matches!(cross_post, Err(StoreError::ParentNotFound(_))));
    }

    #[test]
    fn rejects_empty_and_oversized_content() {
        let (store, user) = setup();

        let empty = store.add_comment(&new_comment(&user, "post", None, "   "), 1);
        let long = "x".repeat(MAX_COMMENT_LENGTH + 1);
        let oversized = store.add_comment(&new_comment(&user, "post", None, &long), 1);

        assert!(matches!(empty, Err(StoreError::Invalid(_))));
        assert!(matches!(oversized, Err(StoreError::Invalid(_))));
    }

    #[test]
    fn deleted_comments_with_replies_become_placeholders() {
        let (store, user) = setup();
        let root = store
            .add_comment(&new_comment(&user, "post", None, "secret"), 1)
            .unwrap();
        store
            .add_comment(&new_comment(&user, "post", Some(root.id), "reply"), 2)
            .unwrap();
        let lonely = store
            .add_comment(&new_comment(&user, "post", None, "lonely"), 3)
            .unwrap();

        store.soft_delete_comment(root.id, &user).unwrap();
        store.soft_delete_comment(lonely.id, &user).unwrap();

        let threads = store.comments_for("post").unwrap();
        assert_eq!(threads.len(), 1);
        assert!(threads[0].deleted);
        assert_eq!(threads[0].content, "");
        assert_eq!(threads[0].author_name, "[deleted]");
        assert_eq!(threads[0].replies[0].content, "reply");
    }

    #[test]
    fn only_author_or_admin_may_delete() {
        let (store, author) = setup();
        let stranger = store.upsert_user(&profile("2"), false, 0).unwrap();
        let admin = store.upsert_user(&profile("3"), true, 0).unwrap();
        let comment = store
            .add_comment(&new_comment(&author, "post", None, "mine"), 1)
            .unwrap();

        assert!(matches!(
            store.soft_delete_comment(comment.id, &stranger),
            Err(StoreError::Forbidden)
        ));
        store.soft_delete_comment(comment.id, &admin).unwrap();
        assert!(store.comment(comment.id).unwrap().unwrap().deleted);
    }

    #[test]
    fn edits_keep_history() {
        let (store, user) = setup();
        let stranger = store.upsert_user(&profile("2"), false, 0).unwrap();
        let comment = store
            .add_comment(&new_comment(&user, "post", None, "first"), 1)
            .unwrap();

        let edited = store.edit_comment(comment.id, &user, "second", 5).unwrap();
        store.edit_comment(comment.id, &user, "third", 9).unwrap();

        assert_eq!(edited.content, "second");
        assert_eq!(edited.edited_at, Some(5));
        assert_eq!(
            store.comment_history(comment.id).unwrap(),
            vec![
                CommentEdit {
                    previous_content: "first".to_string(),
                    edited_at: 5
                },
                CommentEdit {
                    previous_content: "second".to_string(),
                    edited_at: 9
                },
            ]
        );
        assert!(matches!(
            store.edit_comment(comment.id, &stranger, "hijack", 10),
            Err(StoreError::Forbidden)
        ));
    }

    #[test]
    fn enforces_rate_limit_per_window() {
        let (store, user) = setup();
        let limit = RateLimit {
            max: 3,
            window_secs: 600,
        };

        for i in 0..3 {
            store.check_comment_rate(user.id, "198.51.100.7", 100 + i, limit).unwrap();
            store
                .add_comment(&new_comment(&user, "post", None, "spam"), 100 + i)
                .unwrap();
        }

        let err = store
            .check_comment_rate(user.id, "198.51.100.7", 200, limit)
            .unwrap_err();
        assert!(matches!(err, StoreError::RateLimited { retry_after: 500 }));

        // A different account on the same IP is limited too
        let other = store.upsert_user(&profile("2"), false, 0).unwrap();
        assert!(store
            .check_comment_rate(other.id, "198.51.100.7", 200, limit)
            .is_err());

        // The window slides
        store
            .check_comment_rate(user.id, "198.51.100.7", 100 + 600, limit)
            .unwrap();
    }

    #[test]
    fn paginates_admin_and_user_listings() {
        let (store, user) = setup();
        for i in 0..5 {
            let slug = if i % 2 == 0 { "a" } else { "b" };
            store
                .add_comment(&new_comment(&user, slug, None, &format!("c{i}")), i)
                .unwrap();
        }

        let all = store.admin_comments(None, 1, 2).unwrap();
        assert_eq!(all.total, 5);
        assert_eq!(all.items[0].content, "c4");

        let only_a = store.admin_comments(Some("a"), 1, 10).unwrap();
        assert_eq!(only_a.total, 3);

        let mine = store.user_comments(user.id, 3, 2).unwrap();
        assert_eq!(mine.items.len(), 1);
        assert_eq!(mine.items[0].content, "c0");

        assert_eq!(store.delete_all_user_comments(user.id).unwrap(), 5);
        assert_eq!(store.comment_count("a").unwrap(), 0);
    }

    #[test]
    fn mirrors_external_comments_idempotently() {
        let store = Store::open_in_memory().unwrap();
        let root = ExternalComment {
            slug: "post".to_string(),
            external_id: "w1".to_string(),
            parent_external_id: None,
            author_name: "jeffalo".to_string(),
            author_avatar: None,
            content: "hi".to_string(),
            created_at: 50,
        };
        let reply = ExternalComment {
            external_id: "w2".to_string(),
            parent_external_id: Some("w1".to_string()),
            content: "hello".to_string(),
            ..root.clone()
        };

        let first = store.upsert_external_comment(&root).unwrap();
        let again = store
            .upsert_external_comment(&ExternalComment {
                content: "hi (edited)".to_string(),
                ..root.clone()
            })
            .unwrap();
        store.upsert_external_comment(&reply).unwrap();

        assert_eq!(first, again);
        let threads = store.comments_for("post").unwrap();
        assert_eq!(threads.len(), 1);
        assert_eq!(threads[0].source, CommentSource::Wasteof);
        assert_eq!(threads[0].content, "hi (edited)");
        assert_eq!(threads[0].replies[0].content, "hello");

        let orphan = ExternalComment {
            external_id: "w9".to_string(),
            parent_external_id: Some("missing".to_string()),
            ..root
        };
        assert!(matches!(
            store.upsert_external_comment(&orphan),
            Err(StoreError::ParentNotFound(_))
        ));
    }
}
