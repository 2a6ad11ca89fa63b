//! Social activity query functions.
//!
//! The feed owns these tables; the revenue pipeline only counts rows inside
//! a period window. Insert helpers exist for the feed integration and tests.

use std::collections::BTreeMap;

use rusqlite::Connection;
use tally_types::PeriodWindow;

use crate::Result;

/// Raw per-user activity counts for one window.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivityCounts {
    pub posts_created: u32,
    pub comments_replies_created: u32,
    pub likes_received: u32,
    pub follows_received: u32,
}

/// Insert a post, returning its id.
pub fn insert_post(conn: &Connection, user_id: &str, created_at: i64) -> Result<i64> {
    conn.execute(
        "INSERT INTO posts (user_id, created_at) VALUES (?1, ?2)",
        rusqlite::params![user_id, created_at],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Insert a reply to a post, returning its id.
pub fn insert_reply(conn: &Connection, post_id: i64, user_id: &str, created_at: i64) -> Result<i64> {
    conn.execute(
        "INSERT INTO replies (post_id, user_id, created_at) VALUES (?1, ?2, ?3)",
        rusqlite::params![post_id, user_id, created_at],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Like a post.
pub fn like_post(conn: &Connection, user_id: &str, post_id: i64, created_at: i64) -> Result<()> {
    conn.execute(
        "INSERT INTO likes (user_id, post_id, created_at) VALUES (?1, ?2, ?3)",
        rusqlite::params![user_id, post_id, created_at],
    )?;
    Ok(())
}

/// Like a reply.
pub fn like_reply(conn: &Connection, user_id: &str, reply_id: i64, created_at: i64) -> Result<()> {
    conn.execute(
        "INSERT INTO likes (user_id, reply_id, created_at) VALUES (?1, ?2, ?3)",
        rusqlite::params![user_id, reply_id, created_at],
    )?;
    Ok(())
}

/// Record a follow.
pub fn follow(conn: &Connection, follower_id: &str, following_id: &str, created_at: i64) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO follows (follower_id, following_id, created_at) VALUES (?1, ?2, ?3)",
        rusqlite::params![follower_id, following_id, created_at],
    )?;
    Ok(())
}

/// Count every user's activity inside `window`.
///
/// Likes are attributed to the author of the liked post or reply; a user
/// liking their own content does not count.
pub fn counts_for_window(
    conn: &Connection,
    window: &PeriodWindow,
) -> Result<BTreeMap<String, ActivityCounts>> {
    let from = window.start_ts();
    let until = window.end_ts_exclusive();
    let mut counts: BTreeMap<String, ActivityCounts> = BTreeMap::new();

    let grouped = |sql: &str| -> Result<Vec<(String, u32)>> {
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt
            .query_map(rusqlite::params![from, until], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, u32>(1)?))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    };

    for (user, n) in grouped(
        "SELECT user_id, COUNT(*) FROM posts
         WHERE created_at >= ?1 AND created_at < ?2 GROUP BY user_id",
    )? {
        counts.entry(user).or_default().posts_created = n;
    }

    for (user, n) in grouped(
        "SELECT user_id, COUNT(*) FROM replies
         WHERE created_at >= ?1 AND created_at < ?2 GROUP BY user_id",
    )? {
        counts.entry(user).or_default().comments_replies_created = n;
    }

    for (user, n) in grouped(
        "SELECT owner, COUNT(*) FROM (
             SELECT p.user_id AS owner FROM likes l JOIN posts p ON l.post_id = p.id
             WHERE l.created_at >= ?1 AND l.created_at < ?2 AND l.user_id != p.user_id
             UNION ALL
             SELECT r.user_id AS owner FROM likes l JOIN replies r ON l.reply_id = r.id
             WHERE l.created_at >= ?1 AND l.created_at < ?2 AND l.user_id != r.user_id
         ) GROUP BY owner",
    )? {
        counts.entry(user).or_default().likes_received = n;
    }

    for (user, n) in grouped(
        "SELECT following_id, COUNT(*) FROM follows
         WHERE created_at >= ?1 AND created_at < ?2 GROUP BY following_id",
    )? {
        counts.entry(user).or_default().follows_received = n;
    }

    Ok(counts)
}
