//! Interaction scoring.
//!
//! Weighted engagement score for one period:
//!
//! ```text
//! score = posts * 3.0
//!       + comments_replies * 1.0
//!       + follows_received * 0.5
//!       + likes_received * 0.25
//! ```
//!
//! Candidates are every Pro-eligible user plus every user with activity in
//! the window. Non-eligible users are recorded with `is_pro_eligible =
//! false` and never paid. A run fully replaces the period's score rows.

use std::collections::BTreeSet;

use serde::Serialize;
use tally_db::queries::activity::{self, ActivityCounts};
use tally_db::queries::{revenue as revenue_store, scores as score_store};
use tally_db::rusqlite::Connection;
use tally_types::{InteractionScore, PeriodWindow};

use crate::Result;

/// Weight per post created.
pub const W_POSTS: f64 = 3.0;

/// Weight per comment or reply created.
pub const W_COMMENTS: f64 = 1.0;

/// Weight per follower gained.
pub const W_FOLLOWS: f64 = 0.5;

/// Weight per like received.
pub const W_LIKES: f64 = 0.25;

/// Weighted score of a set of counts.
pub fn score(counts: &ActivityCounts) -> f64 {
    f64::from(counts.posts_created) * W_POSTS
        + f64::from(counts.comments_replies_created) * W_COMMENTS
        + f64::from(counts.follows_received) * W_FOLLOWS
        + f64::from(counts.likes_received) * W_LIKES
}

/// Summary of a scoring run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoringReport {
    pub users_scored: usize,
    pub eligible_users: usize,
    pub total_eligible_score: f64,
    pub removed: usize,
    pub scores: Vec<InteractionScore>,
}

/// Recompute every candidate's score for the period.
pub fn compute_scores(conn: &Connection, window: &PeriodWindow) -> Result<ScoringReport> {
    let tx = conn.unchecked_transaction()?;

    let eligible: BTreeSet<String> = revenue_store::pro_eligible_users(&tx, window)?
        .into_iter()
        .collect();
    let mut counts = activity::counts_for_window(&tx, window)?;
    for user in &eligible {
        counts.entry(user.clone()).or_default();
    }

    let mut scores = Vec::with_capacity(counts.len());
    for (user_id, c) in counts {
        let s = InteractionScore {
            is_pro_eligible: eligible.contains(&user_id),
            user_id,
            window: *window,
            posts_created: c.posts_created,
            comments_replies_created: c.comments_replies_created,
            likes_received: c.likes_received,
            follows_received: c.follows_received,
            total_score: score(&c),
        };
        score_store::upsert(&tx, &s)?;
        scores.push(s);
    }

    let mut removed = 0;
    for stale in score_store::list_for_period(&tx, window)? {
        if !scores.iter().any(|s| s.user_id == stale.user_id) {
            score_store::delete(&tx, &stale.user_id, window)?;
            removed += 1;
        }
    }
    tx.commit()?;

    scores.sort_by(|a, b| {
        b.total_score
            .total_cmp(&a.total_score)
            .then_with(|| a.user_id.cmp(&b.user_id))
    });
    let eligible_scores = scores.iter().filter(|s| s.is_pro_eligible);
    let total_eligible_score = eligible_scores.clone().map(|s| s.total_score).sum();

    let report = ScoringReport {
        users_scored: scores.len(),
        eligible_users: eligible_scores.count(),
        total_eligible_score,
        removed,
        scores,
    };
    tracing::info!(
        period = %window,
        users = report.users_scored,
        eligible = report.eligible_users,
        total_score = report.total_eligible_score,
        removed,
        "computed interaction scores"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window() -> PeriodWindow {
        PeriodWindow::parse("2025-01-01", "2025-01-15").expect("window")
    }

    #[test]
    fn test_score_formula() {
        let counts = ActivityCounts {
            posts_created: 2,
            comments_replies_created: 3,
            follows_received: 4,
            likes_received: 8,
        };
        assert!((score(&counts) - 13.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_compute_scores_marks_eligibility() {
        let conn = tally_db::open_memory().expect("open");
        let w = window();
        let t = w.start_ts() + 60;
        revenue_store::insert_subscription(&conn, "alice", 0.5, "active", t, None, t).expect("sub");
        revenue_store::insert_subscription(&conn, "carol", 0.5, "active", t, None, t).expect("sub");
        let post = activity::insert_post(&conn, "alice", t).expect("post");
        activity::like_post(&conn, "bob", post, t).expect("like");
        activity::insert_post(&conn, "bob", t).expect("post");

        let report = compute_scores(&conn, &w).expect("scores");
        assert_eq!(report.users_scored, 3);
        assert_eq!(report.eligible_users, 2);
        assert!((report.total_eligible_score - 3.25).abs() < f64::EPSILON);

        let bob = score_store::get(&conn, "bob", &w).expect("get").expect("bob row");
        assert!(!bob.is_pro_eligible);
        let carol = score_store::get(&conn, "carol", &w).expect("get").expect("carol row");
        assert!(carol.is_pro_eligible);
        assert_eq!(carol.total_score, 0.0);
    }

    #[test]
    fn test_rerun_removes_stale_rows() {
        let conn = tally_db::open_memory().expect("open");
        let w = window();
        score_store::upsert(
            &conn,
            &InteractionScore {
                user_id: "ghost".into(),
                window: w,
                posts_created: 9,
                comments_replies_created: 0,
                likes_received: 0,
                follows_received: 0,
                total_score: 27.0,
                is_pro_eligible: true,
            },
        )
        .expect("seed");

        let report = compute_scores(&conn, &w).expect("scores");
        assert_eq!(report.removed, 1);
        assert!(score_store::get(&conn, "ghost", &w).expect("get").is_none());
    }

    #[test]
    fn test_rerun_is_stable() {
        let conn = tally_db::open_memory().expect("open");
        let w = window();
        let t = w.start_ts();
        revenue_store::insert_subscription(&conn, "alice", 0.5, "active", t, None, t).expect("sub");
        activity::insert_post(&conn, "alice", t).expect("post");

        let first = compute_scores(&conn, &w).expect("first");
        let second = compute_scores(&conn, &w).expect("second");
        assert_eq!(first.scores, second.scores);
        assert_eq!(score_store::list_for_period(&conn, &w).expect("list").len(), 1);
    }
}
