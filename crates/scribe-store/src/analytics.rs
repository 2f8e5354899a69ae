//! Page views and share counts.

use chrono::{DateTime, Duration, NaiveDate};
use rusqlite::{params, Connection};
use serde::Serialize;
use std::collections::HashMap;

use crate::{page_bounds, Paged, Store, StoreError};

/// Repeat views from the same IP within this window are not unique.
pub const UNIQUE_VIEW_WINDOW_SECS: i64 = 30 * 60;

const TOP_POSTS: i64 = 10;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PostStats {
    pub slug: String,
    pub views: i64,
    pub unique_views: i64,
    pub shares: i64,
    pub comments: i64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PlatformCount {
    pub platform: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Overview {
    pub total_views: i64,
    pub unique_views: i64,
    pub total_shares: i64,
    pub total_comments: i64,
    pub total_users: i64,
    pub top_posts: Vec<PostStats>,
    pub top_platforms: Vec<PlatformCount>,
}

/// Views on one UTC day.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DayViews {
    pub date: String,
    pub views: i64,
    pub unique_views: i64,
}

/// Shares on one UTC day.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DayShares {
    pub date: String,
    pub shares: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DailyCount {
    pub views: Vec<DayViews>,
    pub shares: Vec<DayShares>,
}

/// Per-platform share counts on one UTC day.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DailyPlatformCount {
    pub date: String,
    pub platforms: Vec<PlatformCount>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PostDetail {
    pub stats: PostStats,
    pub daily: DailyCount,
    pub platforms: Vec<PlatformCount>,
}

fn day_string(ts: i64) -> String {
    DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.date_naive())
        .unwrap_or_default()
        .format("%Y-%m-%d")
        .to_string()
}

/// The last `days` UTC dates ending at `now`, oldest first, and the unix time the first starts.
fn day_range(days: u32, now: i64) -> (Vec<String>, i64) {
    let days = days.max(1);
    let today = DateTime::from_timestamp(now, 0)
        .map(|dt| dt.date_naive())
        .unwrap_or_default();
    let first: NaiveDate = today - Duration::days(i64::from(days) - 1);

    let dates = first
        .iter_days()
        .take(days as usize)
        .map(|d| d.format("%Y-%m-%d").to_string())
        .collect();
    let start = first
        .and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc().timestamp())
        .unwrap_or(0);

    (dates, start)
}

fn daily_counts(
    conn: &Connection,
    slug: Option<&str>,
    days: u32,
    now: i64,
) -> Result<DailyCount, StoreError> {
    let (dates, since) = day_range(days, now);

    let mut views: HashMap<String, (i64, i64)> = HashMap::new();
    let mut stmt = conn.prepare(
        "SELECT created_at, is_unique FROM views
         WHERE created_at >= ?1 AND (?2 IS NULL OR slug = ?2)",
    )?;
    let rows = stmt.query_map(params![since, slug], |row| {
        Ok((row.get::<_, i64>(0)?, row.get::<_, bool>(1)?))
    })?;
    for row in rows {
        let (ts, unique) = row?;
        let entry = views.entry(day_string(ts)).or_default();
        entry.0 += 1;
        if unique {
            entry.1 += 1;
        }
    }

    let mut shares: HashMap<String, i64> = HashMap::new();
    let mut stmt = conn.prepare(
        "SELECT created_at FROM shares WHERE created_at >= ?1 AND (?2 IS NULL OR slug = ?2)",
    )?;
    let rows = stmt.query_map(params![since, slug], |row| row.get::<_, i64>(0))?;
    for ts in rows {
        *shares.entry(day_string(ts?)).or_default() += 1;
    }

    Ok(DailyCount {
        views: dates
            .iter()
            .map(|date| {
                let (views, unique_views) = views.get(date).copied().unwrap_or_default();
                DayViews {
                    date: date.clone(),
                    views,
                    unique_views,
                }
            })
            .collect(),
        shares: dates
            .iter()
            .map(|date| DayShares {
                date: date.clone(),
                shares: shares.get(date).copied().unwrap_or_default(),
            })
            .collect(),
    })
}

fn platform_counts(conn: &Connection, slug: Option<&str>) -> Result<Vec<PlatformCount>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT platform, COUNT(*) AS n FROM shares
         WHERE (?1 IS NULL OR slug = ?1)
         GROUP BY platform ORDER BY n DESC, platform",
    )?;
    let rows = stmt
        .query_map(params![slug], |row| {
            Ok(PlatformCount {
                platform: row.get(0)?,
                count: row.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Per-post stats across every slug that has views, shares or comments.
const POST_STATS_SQL: &str = "
    WITH slugs AS (
        SELECT slug FROM views UNION SELECT slug FROM shares UNION SELECT slug FROM comments
    )
    SELECT s.slug,
           (SELECT COUNT(*) FROM views v WHERE v.slug = s.slug) AS views,
           (SELECT COUNT(*) FROM views v WHERE v.slug = s.slug AND v.is_unique = 1),
           (SELECT COUNT(*) FROM shares h WHERE h.slug = s.slug),
           (SELECT COUNT(*) FROM comments c WHERE c.slug = s.slug AND c.deleted = 0)
    FROM slugs s";

fn stats_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<PostStats> {
    Ok(PostStats {
        slug: row.get(0)?,
        views: row.get(1)?,
        unique_views: row.get(2)?,
        shares: row.get(3)?,
        comments: row.get(4)?,
    })
}

impl Store {
    /// Record a page view. Returns whether it counted as unique.
    pub fn record_view(&self, slug: &str, ip: &str, now: i64) -> Result<bool, StoreError> {
        let ip_hash = self.anonymize_ip(ip);
        let conn = self.conn()?;

        let recent: i64 = conn.query_row(
            "SELECT COUNT(*) FROM views WHERE slug = ?1 AND ip_hash = ?2 AND created_at > ?3",
            params![slug, ip_hash, now - UNIQUE_VIEW_WINDOW_SECS],
            |row| row.get(0),
        )?;
        let unique = recent == 0;

        conn.execute(
            "INSERT INTO views (slug, ip_hash, is_unique, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![slug, ip_hash, unique, now],
        )?;

        Ok(unique)
    }

    /// Record a share to `platform`.
    pub fn record_share(
        &self,
        slug: &str,
        platform: &str,
        ip: &str,
        now: i64,
    ) -> Result<(), StoreError> {
        let platform = platform.trim().to_lowercase();
        if platform.is_empty() {
            return Err(StoreError::Invalid("platform is required".to_string()));
        }

        let ip_hash = self.anonymize_ip(ip);
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO shares (slug, platform, ip_hash, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![slug, platform, ip_hash, now],
        )?;
        Ok(())
    }

    /// Site-wide totals and the top posts by views.
    pub fn overview(&self) -> Result<Overview, StoreError> {
        let conn = self.conn()?;

        let (total_views, unique_views): (i64, i64) = conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(is_unique), 0) FROM views",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        let total_shares: i64 = conn.query_row("SELECT COUNT(*) FROM shares", [], |r| r.get(0))?;
        let total_comments: i64 = conn.query_row(
            "SELECT COUNT(*) FROM comments WHERE deleted = 0",
            [],
            |r| r.get(0),
        )?;
        let total_users: i64 = conn.query_row("SELECT COUNT(*) FROM users", [], |r| r.get(0))?;

        let mut stmt = conn.prepare(&format!(
            "{POST_STATS_SQL} ORDER BY views DESC, s.slug LIMIT ?1"
        ))?;
        let top_posts = stmt
            .query_map(params![TOP_POSTS], stats_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        let mut top_platforms = platform_counts(&conn, None)?;
        top_platforms.truncate(TOP_POSTS as usize);

        Ok(Overview {
            total_views,
            unique_views,
            total_shares,
            total_comments,
            total_users,
            top_posts,
            top_platforms,
        })
    }

    /// Zero-filled daily views and shares for the last `days` days.
    pub fn daily(&self, days: u32, now: i64) -> Result<DailyCount, StoreError> {
        let conn = self.conn()?;
        daily_counts(&conn, None, days, now)
    }

    /// All-time share counts per platform.
    pub fn shares_by_platform(&self) -> Result<Vec<PlatformCount>, StoreError> {
        let conn = self.conn()?;
        platform_counts(&conn, None)
    }

    /// Per-platform share counts for each of the last `days` days.
    pub fn daily_shares_by_platform(
        &self,
        days: u32,
        now: i64,
    ) -> Result<Vec<DailyPlatformCount>, StoreError> {
        let (dates, since) = day_range(days, now);
        let conn = self.conn()?;

        let mut by_day: HashMap<String, HashMap<String, i64>> = HashMap::new();
        let mut stmt =
            conn.prepare("SELECT created_at, platform FROM shares WHERE created_at >= ?1")?;
        let rows = stmt.query_map(params![since], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
        })?;
        for row in rows {
            let (ts, platform) = row?;
            *by_day
                .entry(day_string(ts))
                .or_default()
                .entry(platform)
                .or_default() += 1;
        }

        Ok(dates
            .into_iter()
            .map(|date| {
                let mut platforms: Vec<PlatformCount> = by_day
                    .remove(&date)
                    .unwrap_or_default()
                    .into_iter()
                    .map(|(platform, count)| PlatformCount { platform, count })
                    .collect();
                platforms.sort_by(|a, b| b.count.cmp(&a.count).then(a.platform.cmp(&b.platform)));
                DailyPlatformCount { date, platforms }
            })
            .collect())
    }

    /// Stats for every post with activity, most viewed first.
    pub fn posts_page(&self, page: usize, per_page: usize) -> Result<Paged<PostStats>, StoreError> {
        let conn = self.conn()?;
        let (limit, offset) = page_bounds(page, per_page);

        let total: i64 = conn.query_row(
            "SELECT COUNT(*) FROM (SELECT slug FROM views UNION SELECT slug FROM shares UNION SELECT slug FROM comments)",
            [],
            |row| row.get(0),
        )?;

        let mut stmt = conn.prepare(&format!(
            "{POST_STATS_SQL} ORDER BY views DESC, s.slug LIMIT ?1 OFFSET ?2"
        ))?;
        let items = stmt
            .query_map(params![limit, offset], stats_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Paged::new(items, page.max(1), per_page, total as usize))
    }

    /// Stats, daily series and platform split for one post.
    pub fn post_detail(&self, slug: &str, days: u32, now: i64) -> Result<PostDetail, StoreError> {
        let conn = self.conn()?;

        let stats = conn.query_row(
            "SELECT ?1,
                    (SELECT COUNT(*) FROM views WHERE slug = ?1),
                    (SELECT COUNT(*) FROM views WHERE slug = ?1 AND is_unique = 1),
                    (SELECT COUNT(*) FROM shares WHERE slug = ?1),
                    (SELECT COUNT(*) FROM comments WHERE slug = ?1 AND deleted = 0)",
            params![slug],
            stats_from_row,
        )?;

        Ok(PostDetail {
            stats,
            daily: daily_counts(&conn, Some(slug), days, now)?,
            platforms: platform_counts(&conn, Some(slug))?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const DAY: i64 = 24 * 60 * 60;
    // 2024-03-10T12:00:00Z
    const NOW: i64 = 1_710_072_000;

    #[test]
    fn repeat_views_within_window_are_not_unique() {
        let store = Store::open_in_memory().unwrap();

        assert!(store.record_view("post", "1.1.1.1", NOW).unwrap());
        assert!(!store.record_view("post", "1.1.1.1", NOW + 60).unwrap());
        assert!(store.record_view("post", "2.2.2.2", NOW + 60).unwrap());
        assert!(store.record_view("other", "1.1.1.1", NOW + 60).unwrap());
        assert!(store
            .record_view("post", "1.1.1.1", NOW + 60 + UNIQUE_VIEW_WINDOW_SECS)
            .unwrap());

        let overview = store.overview().unwrap();
        assert_eq!(overview.total_views, 5);
        assert_eq!(overview.unique_views, 4);
        assert_eq!(overview.top_posts[0].slug, "post");
        assert_eq!(overview.top_posts[0].views, 4);
    }

    #[test]
    fn daily_series_is_zero_filled() {
        let store = Store::open_in_memory().unwrap();
        store.record_view("post", "1.1.1.1", NOW).unwrap();
        store.record_view("post", "1.1.1.1", NOW - 2 * DAY).unwrap();
        store.record_share("post", "Twitter", "1.1.1.1", NOW).unwrap();

        let daily = store.daily(3, NOW).unwrap();

        assert_eq!(
            daily.views,
            vec![
                DayViews {
                    date: "2024-03-08".to_string(),
                    views: 1,
                    unique_views: 1
                },
                DayViews {
                    date: "2024-03-09".to_string(),
                    views: 0,
                    unique_views: 0
                },
                DayViews {
                    date: "2024-03-10".to_string(),
                    views: 1,
                    unique_views: 1
                },
            ]
        );
        assert_eq!(daily.shares[2].shares, 1);
    }

    #[test]
    fn groups_shares_by_platform() {
        let store = Store::open_in_memory().unwrap();
        store.record_share("a", "twitter", "1", NOW).unwrap();
        store.record_share("a", "twitter", "2", NOW).unwrap();
        store.record_share("b", "mastodon", "1", NOW - DAY).unwrap();
        assert!(store.record_share("b", "  ", "1", NOW).is_err());

        assert_eq!(
            store.shares_by_platform().unwrap(),
            vec![
                PlatformCount {
                    platform: "twitter".to_string(),
                    count: 2
                },
                PlatformCount {
                    platform: "mastodon".to_string(),
                    count: 1
                },
            ]
        );

        let daily = store.daily_shares_by_platform(2, NOW).unwrap();
        assert_eq!(daily[0].platforms[0].platform, "mastodon");
        assert_eq!(daily[1].platforms[0].count, 2);
    }

    #[test]
    fn post_detail_and_paging() {
        let store = Store::open_in_memory().unwrap();
        store.record_view("a", "1", NOW).unwrap();
        store.record_view("a", "2", NOW).unwrap();
        store.record_view("b", "1", NOW).unwrap();
        store.record_share("c", "reddit", "1", NOW).unwrap();

        let page = store.posts_page(1, 2).unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.items[0].slug, "a");

        let detail = store.post_detail("a", 7, NOW).unwrap();
        assert_eq!(detail.stats.views, 2);
        assert_eq!(detail.stats.unique_views, 2);
        assert_eq!(detail.daily.views.len(), 7);
        assert_eq!(detail.daily.views[6].views, 2);
        assert!(detail.platforms.is_empty());

        let empty = store.post_detail("missing", 7, NOW).unwrap();
        assert_eq!(empty.stats.views, 0);
    }
}
