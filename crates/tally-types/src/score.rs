//! Interaction scores.

use serde::{Deserialize, Serialize};

use crate::{PeriodWindow, UserId};

/// A user's engagement counts and weighted score for one period.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InteractionScore {
    /// Scored user.
    pub user_id: UserId,
    /// Scored window.
    pub window: PeriodWindow,
    /// Top-level posts created in the window.
    pub posts_created: u32,
    /// Comments and replies created in the window.
    pub comments_replies_created: u32,
    /// Likes received on the user's posts and replies.
    pub likes_received: u32,
    /// New followers gained in the window.
    pub follows_received: u32,
    /// Weighted score.
    pub total_score: f64,
    /// Held an active Pro subscription overlapping the window.
    pub is_pro_eligible: bool,
}
