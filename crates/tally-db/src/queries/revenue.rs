//! Internal platform revenue query functions (featured tokens, Pro
//! subscriptions).

use rusqlite::Connection;
use tally_types::PeriodWindow;

use crate::Result;

/// Subscription status counted as revenue and eligibility.
pub const ACTIVE_STATUS: &str = "active";

/// Record a Pro subscription (billing flow).
pub fn insert_subscription(
    conn: &Connection,
    user_id: &str,
    price_sol: f64,
    status: &str,
    starts_at: i64,
    expires_at: Option<i64>,
    created_at: i64,
) -> Result<()> {
    conn.execute(
        "INSERT INTO pro_subscriptions (user_id, price_sol, status, starts_at, expires_at, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        rusqlite::params![user_id, price_sol, status, starts_at, expires_at, created_at],
    )?;
    Ok(())
}

/// Record a featured-token promotion purchase.
pub fn insert_featured_token(
    conn: &Connection,
    token_address: &str,
    promotion_price: f64,
    created_at: i64,
) -> Result<()> {
    conn.execute(
        "INSERT INTO featured_tokens (token_address, promotion_price, created_at) VALUES (?1, ?2, ?3)",
        rusqlite::params![token_address, promotion_price, created_at],
    )?;
    Ok(())
}

/// Sum of featured-token promotion prices created in the window.
pub fn featured_token_revenue(conn: &Connection, window: &PeriodWindow) -> Result<f64> {
    let total: f64 = conn.query_row(
        "SELECT COALESCE(SUM(promotion_price), 0.0) FROM featured_tokens
         WHERE created_at >= ?1 AND created_at < ?2",
        rusqlite::params![window.start_ts(), window.end_ts_exclusive()],
        |row| row.get(0),
    )?;
    Ok(total)
}

/// Sum of active Pro subscription prices created in the window.
pub fn subscription_revenue(conn: &Connection, window: &PeriodWindow) -> Result<f64> {
    let total: f64 = conn.query_row(
        "SELECT COALESCE(SUM(price_sol), 0.0) FROM pro_subscriptions
         WHERE status = ?3 AND created_at >= ?1 AND created_at < ?2",
        rusqlite::params![window.start_ts(), window.end_ts_exclusive(), ACTIVE_STATUS],
        |row| row.get(0),
    )?;
    Ok(total)
}

/// Users holding an active subscription that overlaps the window.
pub fn pro_eligible_users(conn: &Connection, window: &PeriodWindow) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT user_id FROM pro_subscriptions
         WHERE status = ?3 AND starts_at < ?2 AND (expires_at IS NULL OR expires_at >= ?1)
         ORDER BY user_id",
    )?;
    let users = stmt
        .query_map(
            rusqlite::params![window.start_ts(), window.end_ts_exclusive(), ACTIVE_STATUS],
            |row| row.get(0),
        )?
        .collect::<std::result::Result<Vec<String>, _>>()?;
    Ok(users)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window() -> PeriodWindow {
        PeriodWindow::parse("2025-01-01", "2025-01-15").expect("window")
    }

    #[test]
    fn test_revenue_sums_only_window() {
        let conn = crate::open_memory().expect("open");
        let w = window();
        insert_featured_token(&conn, "tokA", 1.5, w.start_ts()).expect("insert");
        insert_featured_token(&conn, "tokB", 2.0, w.end_ts_exclusive()).expect("insert");
        insert_subscription(&conn, "alice", 0.5, "active", w.start_ts(), None, w.start_ts() + 10)
            .expect("insert");
        insert_subscription(&conn, "bob", 0.5, "cancelled", w.start_ts(), None, w.start_ts() + 10)
            .expect("insert");

        assert!((featured_token_revenue(&conn, &w).expect("sum") - 1.5).abs() < 1e-12);
        assert!((subscription_revenue(&conn, &w).expect("sum") - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_empty_revenue_is_zero() {
        let conn = crate::open_memory().expect("open");
        assert_eq!(featured_token_revenue(&conn, &window()).expect("sum"), 0.0);
        assert_eq!(subscription_revenue(&conn, &window()).expect("sum"), 0.0);
    }

    #[test]
    fn test_pro_eligibility_overlap() {
        let conn = crate::open_memory().expect("open");
        let w = window();
        let day = 86_400;
        // Started before, still running
        insert_subscription(&conn, "alice", 0.5, "active", w.start_ts() - 30 * day, None, 0)
            .expect("insert");
        // Expired before the window
        insert_subscription(&conn, "bob", 0.5, "active", 0, Some(w.start_ts() - 1), 0)
            .expect("insert");
        // Starts after the window
        insert_subscription(&conn, "carol", 0.5, "active", w.end_ts_exclusive(), None, 0)
            .expect("insert");
        // Expires mid-window
        insert_subscription(&conn, "dave", 0.5, "active", 0, Some(w.start_ts() + day), 0)
            .expect("insert");

        let users = pro_eligible_users(&conn, &w).expect("eligible");
        assert_eq!(users, vec!["alice".to_string(), "dave".to_string()]);
    }
}
