//! Integration test fixtures for the Tally pipeline.
//!
//! The tests in `tests/` drive the pipeline end to end across the workspace
//! crates against an in-memory database:
//! ```sh
//! cargo test -p tally-integration-tests
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tally_db::queries::{activity, periods as period_store, profiles, revenue};
use tally_db::rusqlite::Connection;
use tally_revenue::pumpfun::{CreatorFeeSource, FeeBucket};
use tally_revenue::RevenueError;
use tally_settlement::{TransferClient, TransferError};
use tally_types::{PeriodWindow, WalletAddress};

/// Creator wallet recorded on generated test periods.
pub const CREATOR_WALLET: &str = "Creator1111111111111111111111111111111111111";

/// A valid recipient address.
pub const RECIPIENT: &str = "4Nd1mBQtrMJVYVfKf2PJy9NZUZdTAsp7D4xWLs4gDB4T";

/// First half of January 2025.
pub fn january_first_half() -> PeriodWindow {
    PeriodWindow::parse("2025-01-01", "2025-01-15").expect("window")
}

/// Noon UTC on `date`, as Unix seconds.
pub fn ts(date: &str) -> i64 {
    tally_types::parse_date(date)
        .expect("date")
        .and_hms_opt(12, 0, 0)
        .expect("time")
        .and_utc()
        .timestamp()
}

/// Database with the 2025 periods generated.
pub fn db_with_periods() -> Connection {
    let conn = tally_db::open_memory().expect("open DB");
    let today = tally_types::parse_date("2025-03-01").expect("date");
    tally_revenue::periods::generate_year(&conn, 2025, today, Some(CREATOR_WALLET))
        .expect("generate periods");
    conn
}

/// A user with a profile and a Pro subscription bought before the window.
pub fn pro_user(conn: &Connection, user: &str) {
    profiles::upsert(conn, user, None).expect("profile");
    revenue::insert_subscription(conn, user, 1.0, "active", ts("2024-12-01"), None, ts("2024-12-01"))
        .expect("subscription");
}

/// `n` posts by `user` on `date`.
pub fn posts(conn: &Connection, user: &str, n: usize, date: &str) {
    for _ in 0..n {
        activity::insert_post(conn, user, ts(date)).expect("post");
    }
}

pub fn set_wallet(conn: &Connection, user: &str, wallet: &str) {
    profiles::set_payout_wallet(conn, user, Some(wallet)).expect("wallet");
}

/// Stored period for `window`.
pub fn period(conn: &Connection, window: &PeriodWindow) -> tally_types::Period {
    period_store::by_window(conn, window).expect("period")
}

/// Fee API returning fixed buckets.
pub struct StaticFees(pub Vec<FeeBucket>);

impl StaticFees {
    /// One bucket on `date` worth `fee` SOL.
    pub fn single(date: &str, fee: f64) -> Self {
        Self(vec![FeeBucket {
            date: tally_types::parse_date(date).expect("date"),
            creator_fee_sol: fee,
            num_trades: Some(1),
        }])
    }
}

impl CreatorFeeSource for StaticFees {
    fn fetch_fee_buckets(&self, _wallet: &str) -> tally_revenue::Result<Vec<FeeBucket>> {
        Ok(self.0.clone())
    }
}

/// Fee API that is down.
pub struct DownFees;

impl CreatorFeeSource for DownFees {
    fn fetch_fee_buckets(&self, _wallet: &str) -> tally_revenue::Result<Vec<FeeBucket>> {
        Err(RevenueError::Upstream("fee API returned 503".into()))
    }
}

/// Transfer client that counts calls and waits before answering.
pub struct SlowTransfer {
    pub calls: AtomicUsize,
    pub delay: Duration,
    pub outcome: Result<String, TransferError>,
}

impl SlowTransfer {
    pub fn confirming(delay: Duration) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            delay,
            outcome: Ok(signature(1)),
        }
    }

    pub fn failing_with(outcome: TransferError) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
            outcome: Err(outcome),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl TransferClient for SlowTransfer {
    fn platform_wallet(&self) -> WalletAddress {
        WalletAddress::from_bytes([9u8; 32])
    }

    fn transfer(&self, _to: &WalletAddress, _lamports: u64) -> Result<String, TransferError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(self.delay);
        self.outcome.clone()
    }
}

/// A well-formed base58 transaction signature.
pub fn signature(seed: u8) -> String {
    bs58::encode([seed; 64]).into_string()
}
