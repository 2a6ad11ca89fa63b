//! SQL schema definitions.

/// Complete schema for the Tally v1 database.
pub const SCHEMA_V1: &str = r#"
-- ============================================================
-- Collaborator inputs (written by feed, billing and signup flows)
-- ============================================================

CREATE TABLE IF NOT EXISTS profiles (
    user_id TEXT PRIMARY KEY,
    username TEXT,
    payout_wallet_address TEXT,
    updated_at INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS pro_subscriptions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id TEXT NOT NULL,
    price_sol REAL NOT NULL,
    status TEXT NOT NULL,
    starts_at INTEGER NOT NULL,
    expires_at INTEGER,
    created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_pro_subscriptions_user ON pro_subscriptions(user_id);

CREATE TABLE IF NOT EXISTS featured_tokens (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    token_address TEXT NOT NULL,
    promotion_price REAL NOT NULL,
    created_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS posts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id TEXT NOT NULL,
    created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_posts_user ON posts(user_id, created_at);

CREATE TABLE IF NOT EXISTS replies (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    post_id INTEGER NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
    user_id TEXT NOT NULL,
    created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_replies_user ON replies(user_id, created_at);

CREATE TABLE IF NOT EXISTS likes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id TEXT NOT NULL,
    post_id INTEGER REFERENCES posts(id) ON DELETE CASCADE,
    reply_id INTEGER REFERENCES replies(id) ON DELETE CASCADE,
    created_at INTEGER NOT NULL,
    CHECK ((post_id IS NULL) != (reply_id IS NULL))
);

CREATE INDEX IF NOT EXISTS idx_likes_post ON likes(post_id);
CREATE INDEX IF NOT EXISTS idx_likes_reply ON likes(reply_id);

CREATE TABLE IF NOT EXISTS follows (
    follower_id TEXT NOT NULL,
    following_id TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    PRIMARY KEY (follower_id, following_id)
);

CREATE INDEX IF NOT EXISTS idx_follows_following ON follows(following_id, created_at);

CREATE TABLE IF NOT EXISTS referrals (
    referred_user_id TEXT PRIMARY KEY,
    referrer_id TEXT NOT NULL,
    created_at INTEGER NOT NULL DEFAULT 0,
    CHECK (referrer_id != referred_user_id)
);

CREATE INDEX IF NOT EXISTS idx_referrals_referrer ON referrals(referrer_id);

-- ============================================================
-- Revenue distribution
-- ============================================================

CREATE TABLE IF NOT EXISTS periods (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    period_start TEXT NOT NULL,
    period_end TEXT NOT NULL,
    period_name TEXT NOT NULL,
    year INTEGER NOT NULL,
    month INTEGER NOT NULL,
    period_number INTEGER NOT NULL,
    is_current INTEGER NOT NULL DEFAULT 0,
    is_future INTEGER NOT NULL DEFAULT 0,
    pumpfun_creator_wallet TEXT,
    revenue_status TEXT NOT NULL DEFAULT 'pending',
    pumpfun_fees_sol REAL NOT NULL DEFAULT 0,
    platform_revenue_sol REAL NOT NULL DEFAULT 0,
    pumpfun_pool_sol REAL NOT NULL DEFAULT 0,
    platform_pool_sol REAL NOT NULL DEFAULT 0,
    referral_bonus_pool_sol REAL NOT NULL DEFAULT 0,
    total_pool_sol REAL NOT NULL DEFAULT 0,
    calculated_at INTEGER,
    UNIQUE (period_start, period_end),
    CHECK (period_start < period_end)
);

CREATE TABLE IF NOT EXISTS interaction_scores (
    user_id TEXT NOT NULL,
    period_start TEXT NOT NULL,
    period_end TEXT NOT NULL,
    posts_created INTEGER NOT NULL,
    comments_replies_created INTEGER NOT NULL,
    likes_received INTEGER NOT NULL,
    follows_received INTEGER NOT NULL,
    total_score REAL NOT NULL,
    is_pro_eligible INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    PRIMARY KEY (user_id, period_start, period_end)
);

CREATE TABLE IF NOT EXISTS user_payouts (
    user_id TEXT NOT NULL,
    period_start TEXT NOT NULL,
    period_end TEXT NOT NULL,
    pumpfun_share_sol REAL NOT NULL,
    platform_share_sol REAL NOT NULL,
    total_payout_sol REAL NOT NULL,
    referral_bonus_sol REAL NOT NULL,
    final_payout_sol REAL NOT NULL,
    payout_status TEXT NOT NULL DEFAULT 'pending',
    payment_tx_hash TEXT,
    updated_at INTEGER NOT NULL,
    PRIMARY KEY (user_id, period_start, period_end)
);

CREATE TABLE IF NOT EXISTS referral_payouts (
    referrer_id TEXT NOT NULL,
    referred_user_id TEXT NOT NULL,
    period_start TEXT NOT NULL,
    period_end TEXT NOT NULL,
    referral_bonus_sol REAL NOT NULL,
    payout_status TEXT NOT NULL DEFAULT 'pending',
    payment_tx_hash TEXT,
    updated_at INTEGER NOT NULL,
    PRIMARY KEY (referrer_id, referred_user_id, period_start, period_end)
);

CREATE INDEX IF NOT EXISTS idx_referral_payouts_period
    ON referral_payouts(period_start, period_end, referrer_id);

CREATE TABLE IF NOT EXISTS notifications (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id TEXT NOT NULL,
    notification_type TEXT NOT NULL,
    period_start TEXT NOT NULL,
    period_end TEXT NOT NULL,
    amount_sol REAL NOT NULL,
    title TEXT NOT NULL,
    message TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    is_read INTEGER NOT NULL DEFAULT 0,
    UNIQUE (user_id, notification_type, period_start, period_end)
);
"#;
