//! Users, OAuth identities and login sessions.

use rand::RngCore;
use rusqlite::{params, OptionalExtension, Row};
use serde::Serialize;

use crate::{page_bounds, Paged, Store, StoreError};

/// Sessions last 30 days.
pub const SESSION_TTL_SECS: i64 = 30 * 24 * 60 * 60;

/// Profile returned by an OAuth provider after login.
#[derive(Debug, Clone, PartialEq)]
pub struct OAuthProfile {
    pub provider: String,
    pub provider_id: String,
    pub name: String,
    pub email: Option<String>,
    pub avatar_url: Option<String>,
}

/// A signed-in commenter.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct User {
    pub id: i64,
    pub provider: String,
    pub provider_id: String,
    pub name: String,
    pub email: Option<String>,
    pub avatar_url: Option<String>,
    pub is_admin: bool,
    pub banned: bool,
    pub created_at: i64,
    pub last_login: i64,
}

/// A user with their comment count, for the admin list.
#[derive(Debug, Clone, Serialize)]
pub struct UserSummary {
    #[serde(flatten)]
    pub user: User,
    pub comment_count: i64,
}

const USER_COLUMNS: &str =
    "id, provider, provider_id, name, email, avatar_url, is_admin, banned, created_at, last_login";

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        provider: row.get(1)?,
        provider_id: row.get(2)?,
        name: row.get(3)?,
        email: row.get(4)?,
        avatar_url: row.get(5)?,
        is_admin: row.get(6)?,
        banned: row.get(7)?,
        created_at: row.get(8)?,
        last_login: row.get(9)?,
    })
}

impl Store {
    /// Insert or refresh a user by `(provider, provider_id)`.
    ///
    /// The admin flag is recomputed on every login so config changes take effect.
    pub fn upsert_user(
        &self,
        profile: &OAuthProfile,
        is_admin: bool,
        now: i64,
    ) -> Result<User, StoreError> {
        let conn = self.conn()?;

        conn.execute(
            "INSERT INTO users (provider, provider_id, name, email, avatar_url, is_admin, created_at, last_login)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
             ON CONFLICT (provider, provider_id) DO UPDATE SET
                 name = excluded.name,
                 email = excluded.email,
                 avatar_url = excluded.avatar_url,
                 is_admin = excluded.is_admin,
                 last_login = excluded.last_login",
            params![
                profile.provider,
                profile.provider_id,
                profile.name,
                profile.email,
                profile.avatar_url,
                is_admin,
                now
            ],
        )?;

        let user = conn.query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE provider = ?1 AND provider_id = ?2"),
            params![profile.provider, profile.provider_id],
            user_from_row,
        )?;

        Ok(user)
    }

    pub fn user(&self, id: i64) -> Result<Option<User>, StoreError> {
        let conn = self.conn()?;
        let user = conn
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                params![id],
                user_from_row,
            )
            .optional()?;
        Ok(user)
    }

    /// Users ordered by most recent login.
    pub fn users_page(&self, page: usize, per_page: usize) -> Result<Paged<UserSummary>, StoreError> {
        let conn = self.conn()?;
        let (limit, offset) = page_bounds(page, per_page);

        let total: i64 = conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {USER_COLUMNS},
                    (SELECT COUNT(*) FROM comments c WHERE c.user_id = users.id AND c.deleted = 0)
             FROM users ORDER BY last_login DESC, id DESC LIMIT ?1 OFFSET ?2"
        ))?;
        let items = stmt
            .query_map(params![limit, offset], |row| {
                Ok(UserSummary {
                    user: user_from_row(row)?,
                    comment_count: row.get(10)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Paged::new(items, page.max(1), per_page, total as usize))
    }

    /// Ban or unban a user. Banning also ends their sessions.
    pub fn set_banned(&self, user_id: i64, banned: bool) -> Result<(), StoreError> {
        let conn = self.conn()?;

        let changed = conn.execute(
            "UPDATE users SET banned = ?1 WHERE id = ?2",
            params![banned, user_id],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound("User"));
        }

        if banned {
            conn.execute("DELETE FROM sessions WHERE user_id = ?1", params![user_id])?;
        }

        tracing::info!(user_id, banned, "Updated ban status");
        Ok(())
    }

    /// Start a session and return its opaque token.
    pub fn create_session(&self, user_id: i64, now: i64) -> Result<String, StoreError> {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        let token = hex::encode(bytes);

        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO sessions (token, user_id, created_at, expires_at) VALUES (?1, ?2, ?3, ?4)",
            params![token, user_id, now, now + SESSION_TTL_SECS],
        )?;

        Ok(token)
    }

    /// The user behind a live session token.
    pub fn session_user(&self, token: &str, now: i64) -> Result<Option<User>, StoreError> {
        let conn = self.conn()?;
        let user = conn
            .query_row(
                "SELECT u.id, u.provider, u.provider_id, u.name, u.email, u.avatar_url,
                        u.is_admin, u.banned, u.created_at, u.last_login
                 FROM sessions s JOIN users u ON u.id = s.user_id
                 WHERE s.token = ?1 AND s.expires_at > ?2",
                params![token, now],
                user_from_row,
            )
            .optional()?;
        Ok(user)
    }

    pub fn delete_session(&self, token: &str) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.execute("DELETE FROM sessions WHERE token = ?1", params![token])?;
        Ok(())
    }

    /// Drop expired sessions, returning how many were removed.
    pub fn purge_expired_sessions(&self, now: i64) -> Result<usize, StoreError> {
        let conn = self.conn()?;
        let removed = conn.execute("DELETE FROM sessions WHERE expires_at <= ?1", params![now])?;
        Ok(removed)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn profile(id: &str) -> OAuthProfile {
        OAuthProfile {
            provider: "github".to_string(),
            provider_id: id.to_string(),
            name: format!("user-{id}"),
            email: Some(format!("{id}@example.com")),
            avatar_url: None,
        }
    }

    #[test]
    fn identity_is_unique_per_provider() {
        let store = Store::open_in_memory().unwrap();

        let first = store.upsert_user(&profile("42"), false, 100).unwrap();
        let mut renamed = profile("42");
        renamed.name = "New Name".to_string();
        let second = store.upsert_user(&renamed, true, 200).unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.name, "New Name");
        assert!(second.is_admin);
        assert_eq!(second.created_at, 100);
        assert_eq!(second.last_login, 200);

        let mut other_provider = profile("42");
        other_provider.provider = "google".to_string();
        let third = store.upsert_user(&other_provider, false, 300).unwrap();
        assert_ne!(third.id, first.id);
    }

    #[test]
    fn sessions_expire() {
        let store = Store::open_in_memory().unwrap();
        let user = store.upsert_user(&profile("1"), false, 0).unwrap();

        let token = store.create_session(user.id, 1_000).unwrap();
        assert_eq!(token.len(), 64);

        let found = store.session_user(&token, 2_000).unwrap().unwrap();
        assert_eq!(found.id, user.id);

        assert!(store
            .session_user(&token, 1_000 + SESSION_TTL_SECS)
            .unwrap()
            .is_none());
        assert_eq!(store.purge_expired_sessions(1_000 + SESSION_TTL_SECS).unwrap(), 1);
    }

    #[test]
    fn logout_deletes_session() {
        let store = Store::open_in_memory().unwrap();
        let user = store.upsert_user(&profile("1"), false, 0).unwrap();
        let token = store.create_session(user.id, 0).unwrap();

        store.delete_session(&token).unwrap();

        assert!(store.session_user(&token, 1).unwrap().is_none());
    }

    #[test]
    fn banning_ends_sessions() {
        let store = Store::open_in_memory().unwrap();
        let user = store.upsert_user(&profile("1"), false, 0).unwrap();
        let token = store.create_session(user.id, 0).unwrap();

        store.set_banned(user.id, true).unwrap();

        assert!(store.user(user.id).unwrap().unwrap().banned);
        assert!(store.session_user(&token, 1).unwrap().is_none());
        assert!(matches!(
            store.set_banned(999, true),
            Err(StoreError::NotFound("User"))
        ));
    }

    #[test]
    fn lists_users_by_last_login() {
        let store = Store::open_in_memory().unwrap();
        store.upsert_user(&profile("a"), false, 10).unwrap();
        store.upsert_user(&profile("b"), false, 20).unwrap();
        store.upsert_user(&profile("c"), false, 5).unwrap();

        let page = store.users_page(1, 2).unwrap();

        assert_eq!(page.total, 3);
        assert_eq!(page.total_pages, 2);
        assert_eq!(page.items[0].user.provider_id, "b");
        assert_eq!(page.items[1].user.provider_id, "a");
        assert_eq!(page.items[0].comment_count, 0);
    }
}
