//! IP blocking and per-IP activity lookups.
//!
//! Addresses are stored only as salted hashes, so a block matches an IP without
//! the database ever holding it. The optional label is free text for the admin.

use rusqlite::{params, OptionalExtension};
use serde::Serialize;

use crate::{page_bounds, Comment, Paged, Store, StoreError};

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct BlockedIp {
    pub id: i64,
    pub ip_hash: String,
    pub label: Option<String>,
    pub reason: Option<String>,
    pub created_at: i64,
}

/// What a single address has done on the site.
#[derive(Debug, Clone, Serialize)]
pub struct IpActivity {
    pub ip_hash: String,
    pub blocked: bool,
    pub views: i64,
    pub shares: i64,
    pub comments: Vec<Comment>,
}

impl Store {
    /// Block an address. Blocking an already blocked address updates its label and reason.
    pub fn block_ip(
        &self,
        ip: &str,
        label: Option<&str>,
        reason: Option<&str>,
        now: i64,
    ) -> Result<BlockedIp, StoreError> {
        if ip.trim().is_empty() {
            return Err(StoreError::Invalid("ip is required".to_string()));
        }
        let ip_hash = self.anonymize_ip(ip);
        self.block_hash(&ip_hash, label, reason, now)
    }

    /// Block whatever address a comment was posted from.
    pub fn block_comment_author(
        &self,
        comment_id: i64,
        reason: Option<&str>,
        now: i64,
    ) -> Result<BlockedIp, StoreError> {
        let (ip_hash, author): (Option<String>, String) = {
            let conn = self.conn()?;
            conn.query_row(
                "SELECT ip_hash, author_name FROM comments WHERE id = ?1",
                params![comment_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?
            .ok_or(StoreError::NotFound("Comment"))?
        };

        let ip_hash = ip_hash.ok_or_else(|| {
            StoreError::Invalid("comment has no recorded address".to_string())
        })?;
        let label = format!("comment #{comment_id} by {author}");
        self.block_hash(&ip_hash, Some(&label), reason, now)
    }

    fn block_hash(
        &self,
        ip_hash: &str,
        label: Option<&str>,
        reason: Option<&str>,
        now: i64,
    ) -> Result<BlockedIp, StoreError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO blocked_ips (ip_hash, label, reason, created_at) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (ip_hash) DO UPDATE SET label = excluded.label, reason = excluded.reason",
            params![ip_hash, label, reason, now],
        )?;

        let blocked = conn.query_row(
            "SELECT id, ip_hash, label, reason, created_at FROM blocked_ips WHERE ip_hash = ?1",
            params![ip_hash],
            |row| {
                Ok(BlockedIp {
                    id: row.get(0)?,
                    ip_hash: row.get(1)?,
                    label: row.get(2)?,
                    reason: row.get(3)?,
                    created_at: row.get(4)?,
                })
            },
        )?;

        tracing::info!(id = blocked.id, "Blocked address");
        Ok(blocked)
    }

    pub fn unblock_ip(&self, id: i64) -> Result<(), StoreError> {
        let conn = self.conn()?;
        let removed = conn.execute("DELETE FROM blocked_ips WHERE id = ?1", params![id])?;
        if removed == 0 {
            return Err(StoreError::NotFound("Blocked IP"));
        }
        Ok(())
    }

    /// Remove the block on an address. Returns whether one existed.
    pub fn unblock_address(&self, ip: &str) -> Result<bool, StoreError> {
        let ip_hash = self.anonymize_ip(ip);
        let conn = self.conn()?;
        let removed = conn.execute("DELETE FROM blocked_ips WHERE ip_hash = ?1", params![ip_hash])?;
        Ok(removed > 0)
    }

    /// Blocked addresses, newest first.
    pub fn blocked_ips(&self, page: usize, per_page: usize) -> Result<Paged<BlockedIp>, StoreError> {
        let conn = self.conn()?;
        let (limit, offset) = page_bounds(page, per_page);

        let total: i64 = conn.query_row("SELECT COUNT(*) FROM blocked_ips", [], |r| r.get(0))?;
        let mut stmt = conn.prepare(
            "SELECT id, ip_hash, label, reason, created_at FROM blocked_ips
             ORDER BY created_at DESC, id DESC LIMIT ?1 OFFSET ?2",
        )?;
        let items = stmt
            .query_map(params![limit, offset], |row| {
                Ok(BlockedIp {
                    id: row.get(0)?,
                    ip_hash: row.get(1)?,
                    label: row.get(2)?,
                    reason: row.get(3)?,
                    created_at: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Paged::new(items, page.max(1), per_page, total as usize))
    }

    pub fn is_blocked(&self, ip: &str) -> Result<bool, StoreError> {
        let ip_hash = self.anonymize_ip(ip);
        let conn = self.conn()?;
        let found: Option<i64> = conn
            .query_row(
                "SELECT id FROM blocked_ips WHERE ip_hash = ?1",
                params![ip_hash],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Views, shares and comments recorded for an address.
    pub fn ip_lookup(&self, ip: &str) -> Result<IpActivity, StoreError> {
        let blocked = self.is_blocked(ip)?;
        self.activity(self.anonymize_ip(ip), blocked)
    }

    /// Activity behind a block entry, for blocks made without a raw address.
    pub fn blocked_ip_activity(&self, id: i64) -> Result<IpActivity, StoreError> {
        let ip_hash: String = {
            let conn = self.conn()?;
            conn.query_row(
                "SELECT ip_hash FROM blocked_ips WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?
            .ok_or(StoreError::NotFound("Blocked IP"))?
        };
        self.activity(ip_hash, true)
    }

    fn activity(&self, ip_hash: String, blocked: bool) -> Result<IpActivity, StoreError> {
        let (views, shares, ids) = {
            let conn = self.conn()?;
            let views: i64 = conn.query_row(
                "SELECT COUNT(*) FROM views WHERE ip_hash = ?1",
                params![ip_hash],
                |r| r.get(0),
            )?;
            let shares: i64 = conn.query_row(
                "SELECT COUNT(*) FROM shares WHERE ip_hash = ?1",
                params![ip_hash],
                |r| r.get(0),
            )?;
            let mut stmt = conn.prepare(
                "SELECT id FROM comments WHERE ip_hash = ?1 ORDER BY created_at DESC, id DESC",
            )?;
            let ids = stmt
                .query_map(params![ip_hash], |row| row.get::<_, i64>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            (views, shares, ids)
        };

        let mut comments = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(comment) = self.comment(id)? {
                comments.push(comment);
            }
        }

        Ok(IpActivity {
            ip_hash,
            blocked,
            views,
            shares,
            comments,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::users::tests::profile;
    use crate::NewComment;

    #[test]
    fn blocks_and_unblocks_addresses() {
        let store = Store::open_in_memory().unwrap().with_ip_salt("salt");

        let blocked = store
            .block_ip("203.0.113.5", Some("spammer"), Some("links"), 10)
            .unwrap();
        assert!(store.is_blocked("203.0.113.5").unwrap());
        assert!(!store.is_blocked("203.0.113.6").unwrap());

        // Re-blocking updates in place
        let again = store
            .block_ip("203.0.113.5", Some("spammer"), Some("more links"), 20)
            .unwrap();
        assert_eq!(again.id, blocked.id);
        assert_eq!(again.reason.as_deref(), Some("more links"));
        assert_eq!(store.blocked_ips(1, 10).unwrap().total, 1);

        store.unblock_ip(blocked.id).unwrap();
        assert!(!store.is_blocked("203.0.113.5").unwrap());
        assert!(matches!(
            store.unblock_ip(blocked.id),
            Err(StoreError::NotFound(_))
        ));
        assert!(store.block_ip("  ", None, None, 0).is_err());
    }

    #[test]
    fn unblocks_by_address() {
        let store = Store::open_in_memory().unwrap();
        store.block_ip("198.51.100.7", None, None, 1).unwrap();

        assert!(store.unblock_address("198.51.100.7").unwrap());
        assert!(!store.unblock_address("198.51.100.7").unwrap());
        assert!(!store.is_blocked("198.51.100.7").unwrap());
    }

    #[test]
    fn blocks_comment_author_and_looks_up_activity() {
        let store = Store::open_in_memory().unwrap();
        let user = store.upsert_user(&profile("1"), false, 0).unwrap();
        let comment = store
            .add_comment(
                &NewComment {
                    slug: "post".to_string(),
                    parent_id: None,
                    user_id: user.id,
                    author_name: user.name.clone(),
                    author_avatar: None,
                    content: "buy now".to_string(),
                    ip: "192.0.2.1".to_string(),
                },
                5,
            )
            .unwrap();
        store.record_view("post", "192.0.2.1", 1).unwrap();

        let blocked = store
            .block_comment_author(comment.id, Some("spam"), 10)
            .unwrap();
        assert_eq!(blocked.label.as_deref(), Some("comment #1 by user-1"));
        assert!(store.is_blocked("192.0.2.1").unwrap());

        let activity = store.ip_lookup("192.0.2.1").unwrap();
        assert!(activity.blocked);
        assert_eq!(activity.views, 1);
        assert_eq!(activity.shares, 0);
        assert_eq!(activity.comments.len(), 1);
        assert_eq!(activity.comments[0].content, "buy now");

        assert!(matches!(
            store.block_comment_author(999, None, 10),
            Err(StoreError::NotFound(_))
        ));

        let by_entry = store.blocked_ip_activity(blocked.id).unwrap();
        assert!(by_entry.blocked);
        assert_eq!(by_entry.ip_hash, activity.ip_hash);
        assert_eq!(by_entry.views, 1);
        assert_eq!(by_entry.comments.len(), 1);
        assert!(matches!(
            store.blocked_ip_activity(999),
            Err(StoreError::NotFound(_))
        ));
    }
}
