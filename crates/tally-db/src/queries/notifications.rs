//! In-app notification query functions.

use rusqlite::{Connection, Row};
use tally_types::PeriodWindow;

use super::window_cols;
use crate::{now_secs, Result};

/// A notification to record.
#[derive(Debug, Clone, PartialEq)]
pub struct NewNotification {
    pub user_id: String,
    pub notification_type: String,
    pub window: PeriodWindow,
    pub amount_sol: f64,
    pub title: String,
    pub message: String,
}

/// A stored notification.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub id: i64,
    pub user_id: String,
    pub notification_type: String,
    pub window: PeriodWindow,
    pub amount_sol: f64,
    pub title: String,
    pub message: String,
    pub created_at: i64,
    pub is_read: bool,
}

fn map_notification(row: &Row<'_>) -> rusqlite::Result<Notification> {
    Ok(Notification {
        id: row.get(0)?,
        user_id: row.get(1)?,
        notification_type: row.get(2)?,
        window: window_cols(row, 3)?,
        amount_sol: row.get(5)?,
        title: row.get(6)?,
        message: row.get(7)?,
        created_at: row.get(8)?,
        is_read: row.get(9)?,
    })
}

/// Record a notification. One row per (user, type, period): a re-run
/// refreshes the amount and text instead of adding a duplicate. Returns
/// `true` when the row is new.
pub fn upsert(conn: &Connection, n: &NewNotification) -> Result<bool> {
    let inserted = conn.execute(
        "INSERT INTO notifications
         (user_id, notification_type, period_start, period_end, amount_sol, title, message, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
         ON CONFLICT (user_id, notification_type, period_start, period_end) DO NOTHING",
        rusqlite::params![
            n.user_id,
            n.notification_type,
            n.window.start(),
            n.window.end(),
            n.amount_sol,
            n.title,
            n.message,
            now_secs(),
        ],
    )?;
    if inserted > 0 {
        return Ok(true);
    }
    conn.execute(
        "UPDATE notifications SET amount_sol = ?5, title = ?6, message = ?7
         WHERE user_id = ?1 AND notification_type = ?2 AND period_start = ?3 AND period_end = ?4",
        rusqlite::params![
            n.user_id,
            n.notification_type,
            n.window.start(),
            n.window.end(),
            n.amount_sol,
            n.title,
            n.message,
        ],
    )?;
    Ok(false)
}

/// A user's notifications, newest first.
pub fn list_for_user(conn: &Connection, user_id: &str) -> Result<Vec<Notification>> {
    let mut stmt = conn.prepare(
        "SELECT id, user_id, notification_type, period_start, period_end, amount_sol,
                title, message, created_at, is_read
         FROM notifications WHERE user_id = ?1
         ORDER BY created_at DESC, id DESC",
    )?;
    let rows = stmt
        .query_map([user_id], map_notification)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note(amount: f64) -> NewNotification {
        NewNotification {
            user_id: "alice".into(),
            notification_type: "payout_available".into(),
            window: PeriodWindow::parse("2025-01-01", "2025-01-15").expect("window"),
            amount_sol: amount,
            title: "Payout available".into(),
            message: format!("You earned {amount} SOL"),
        }
    }

    #[test]
    fn test_upsert_is_idempotent() {
        let conn = crate::open_memory().expect("open");
        assert!(upsert(&conn, &note(1.0)).expect("insert"));
        assert!(!upsert(&conn, &note(2.0)).expect("refresh"));
        let rows = list_for_user(&conn, "alice").expect("list");
        assert_eq!(rows.len(), 1);
        assert!((rows[0].amount_sol - 2.0).abs() < f64::EPSILON);
        assert!(!rows[0].is_read);
    }

    #[test]
    fn test_distinct_types_kept() {
        let conn = crate::open_memory().expect("open");
        upsert(&conn, &note(1.0)).expect("insert");
        let mut other = note(0.5);
        other.notification_type = "referral_bonus".into();
        upsert(&conn, &other).expect("insert");
        assert_eq!(list_for_user(&conn, "alice").expect("list").len(), 2);
        assert!(list_for_user(&conn, "bob").expect("list").is_empty());
    }
}
