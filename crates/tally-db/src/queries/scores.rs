//! Interaction score query functions.

use rusqlite::{Connection, OptionalExtension, Row};
use tally_types::{InteractionScore, PeriodWindow};

use super::window_cols;
use crate::{now_secs, Result};

fn map_score(row: &Row<'_>) -> rusqlite::Result<InteractionScore> {
    Ok(InteractionScore {
        user_id: row.get(0)?,
        window: window_cols(row, 1)?,
        posts_created: row.get(3)?,
        comments_replies_created: row.get(4)?,
        likes_received: row.get(5)?,
        follows_received: row.get(6)?,
        total_score: row.get(7)?,
        is_pro_eligible: row.get(8)?,
    })
}

/// Insert or overwrite a user's score for the period.
pub fn upsert(conn: &Connection, score: &InteractionScore) -> Result<()> {
    conn.execute(
        "INSERT INTO interaction_scores
         (user_id, period_start, period_end, posts_created, comments_replies_created,
          likes_received, follows_received, total_score, is_pro_eligible, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
         ON CONFLICT (user_id, period_start, period_end) DO UPDATE SET
             posts_created = excluded.posts_created,
             comments_replies_created = excluded.comments_replies_created,
             likes_received = excluded.likes_received,
             follows_received = excluded.follows_received,
             total_score = excluded.total_score,
             is_pro_eligible = excluded.is_pro_eligible,
             updated_at = excluded.updated_at",
        rusqlite::params![
            score.user_id,
            score.window.start(),
            score.window.end(),
            score.posts_created,
            score.comments_replies_created,
            score.likes_received,
            score.follows_received,
            score.total_score,
            score.is_pro_eligible,
            now_secs(),
        ],
    )?;
    Ok(())
}

/// List a period's scores, highest first.
pub fn list_for_period(conn: &Connection, window: &PeriodWindow) -> Result<Vec<InteractionScore>> {
    let mut stmt = conn.prepare(
        "SELECT user_id, period_start, period_end, posts_created, comments_replies_created,
                likes_received, follows_received, total_score, is_pro_eligible
         FROM interaction_scores
         WHERE period_start = ?1 AND period_end = ?2
         ORDER BY total_score DESC, user_id",
    )?;
    let rows = stmt
        .query_map(rusqlite::params![window.start(), window.end()], map_score)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Fetch one user's score.
pub fn get(conn: &Connection, user_id: &str, window: &PeriodWindow) -> Result<Option<InteractionScore>> {
    let score = conn
        .query_row(
            "SELECT user_id, period_start, period_end, posts_created, comments_replies_created,
                    likes_received, follows_received, total_score, is_pro_eligible
             FROM interaction_scores
             WHERE user_id = ?1 AND period_start = ?2 AND period_end = ?3",
            rusqlite::params![user_id, window.start(), window.end()],
            map_score,
        )
        .optional()?;
    Ok(score)
}

/// Delete a user's score row for the period.
pub fn delete(conn: &Connection, user_id: &str, window: &PeriodWindow) -> Result<()> {
    conn.execute(
        "DELETE FROM interaction_scores WHERE user_id = ?1 AND period_start = ?2 AND period_end = ?3",
        rusqlite::params![user_id, window.start(), window.end()],
    )?;
    Ok(())
}
