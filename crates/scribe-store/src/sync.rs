//! Bookkeeping for mirrored comment threads.

use rusqlite::{params, OptionalExtension};
use serde::Serialize;

use crate::{Store, StoreError};

/// When an external thread was last pulled, and how that went.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SyncState {
    pub post_id: String,
    pub last_synced: i64,
    pub last_error: Option<String>,
}

impl Store {
    pub fn sync_state(&self, post_id: &str) -> Result<Option<SyncState>, StoreError> {
        let conn = self.conn()?;
        let state = conn
            .query_row(
                "SELECT post_id, last_synced, last_error FROM sync_state WHERE post_id = ?1",
                params![post_id],
                |row| {
                    Ok(SyncState {
                        post_id: row.get(0)?,
                        last_synced: row.get(1)?,
                        last_error: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(state)
    }

    /// Record a sync attempt; `error` is `None` on success.
    pub fn mark_synced(
        &self,
        post_id: &str,
        now: i64,
        error: Option<&str>,
    ) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO sync_state (post_id, last_synced, last_error) VALUES (?1, ?2, ?3)
             ON CONFLICT (post_id) DO UPDATE SET
                 last_synced = excluded.last_synced,
                 last_error = excluded.last_error",
            params![post_id, now, error],
        )?;
        Ok(())
    }
}
