//! Creator-fee API client.
//!
//! `GET {base}/v1/creators/{wallet}/fees?interval=24h&limit=N` returns daily
//! fee buckets. Requests use a bounded timeout and body size, follow no
//! redirects, and are never retried: a failure aborts the current stage.

use std::io::Read;
use std::time::Duration;

use chrono::{DateTime, NaiveDate};
use serde::Deserialize;
use serde_json::Value;
use tally_types::parse_date;

use crate::{RevenueError, Result};

/// Default creator-fee API base URL.
pub const DEFAULT_API_BASE_URL: &str = "https://swap-api.pump.fun";

/// Default number of daily buckets requested.
pub const DEFAULT_BUCKET_LIMIT: usize = 90;

/// Maximum accepted response body.
const MAX_RESPONSE_BYTES: usize = 1024 * 1024;

/// Timestamps above this are treated as milliseconds.
const MILLIS_THRESHOLD: i64 = 100_000_000_000;

/// One daily fee bucket.
#[derive(Debug, Clone, PartialEq)]
pub struct FeeBucket {
    pub date: NaiveDate,
    pub creator_fee_sol: f64,
    pub num_trades: Option<u64>,
}

/// Anything that can supply creator-fee buckets for a wallet.
pub trait CreatorFeeSource {
    /// Fetch the most recent daily buckets for `wallet`.
    fn fetch_fee_buckets(&self, wallet: &str) -> Result<Vec<FeeBucket>>;

    /// The number of buckets requested per call, if bounded.
    fn bucket_limit(&self) -> Option<usize> {
        None
    }
}

/// Creator-fee client configuration.
#[derive(Debug, Clone)]
pub struct PumpfunConfig {
    pub base_url: String,
    pub timeout: Duration,
    pub bucket_limit: usize,
}

impl Default for PumpfunConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_BASE_URL.to_string(),
            timeout: Duration::from_secs(10),
            bucket_limit: DEFAULT_BUCKET_LIMIT,
        }
    }
}

/// Blocking HTTP client for the creator-fee API.
pub struct PumpfunFeeClient {
    config: PumpfunConfig,
    client: reqwest::blocking::Client,
}

impl PumpfunFeeClient {
    pub fn new(config: PumpfunConfig) -> Result<Self> {
        if config.timeout.is_zero() {
            return Err(RevenueError::Validation("fee API timeout must be > 0".into()));
        }
        if config.bucket_limit == 0 {
            return Err(RevenueError::Validation("fee API bucket limit must be > 0".into()));
        }
        let client = reqwest::blocking::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(config.timeout)
            .build()
            .map_err(|e| RevenueError::Upstream(format!("failed to create HTTP client: {e}")))?;
        Ok(Self { config, client })
    }

    fn url(&self, wallet: &str) -> String {
        format!(
            "{}/v1/creators/{}/fees?interval=24h&limit={}",
            self.config.base_url.trim_end_matches('/'),
            wallet,
            self.config.bucket_limit
        )
    }
}

impl CreatorFeeSource for PumpfunFeeClient {
    fn fetch_fee_buckets(&self, wallet: &str) -> Result<Vec<FeeBucket>> {
        let response = self
            .client
            .get(self.url(wallet))
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .map_err(|e| RevenueError::Upstream(format!("creator-fee request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RevenueError::Upstream(format!(
                "creator-fee API returned {status}"
            )));
        }
        if let Some(len) = response.content_length() {
            if len > MAX_RESPONSE_BYTES as u64 {
                return Err(RevenueError::Upstream(format!(
                    "creator-fee response too large: {len} bytes"
                )));
            }
        }

        let mut body = Vec::new();
        response
            .take((MAX_RESPONSE_BYTES + 1) as u64)
            .read_to_end(&mut body)
            .map_err(|e| RevenueError::Upstream(format!("failed to read creator-fee response: {e}")))?;
        if body.len() > MAX_RESPONSE_BYTES {
            return Err(RevenueError::Upstream(format!(
                "creator-fee response too large: >{MAX_RESPONSE_BYTES} bytes"
            )));
        }

        parse_buckets(&body)
    }

    fn bucket_limit(&self) -> Option<usize> {
        Some(self.config.bucket_limit)
    }
}

#[derive(Deserialize)]
struct RawBucket {
    bucket: Value,
    #[serde(rename = "creatorFeeSOL", default)]
    creator_fee_sol: Value,
    #[serde(rename = "numTrades", default)]
    num_trades: Value,
}

/// Parse a creator-fee response body.
///
/// Accepts a bare array or an object wrapping it under `data` or `buckets`.
pub fn parse_buckets(body: &[u8]) -> Result<Vec<FeeBucket>> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| RevenueError::Upstream(format!("malformed creator-fee response: {e}")))?;
    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("data").or_else(|| map.remove("buckets")) {
            Some(Value::Array(items)) => items,
            _ => {
                return Err(RevenueError::Upstream(
                    "creator-fee response has no bucket array".into(),
                ))
            }
        },
        _ => {
            return Err(RevenueError::Upstream(
                "creator-fee response is not an array".into(),
            ))
        }
    };

    items
        .into_iter()
        .map(|item| {
            let raw: RawBucket = serde_json::from_value(item)
                .map_err(|e| RevenueError::Upstream(format!("malformed fee bucket: {e}")))?;
            Ok(FeeBucket {
                date: bucket_date(&raw.bucket)?,
                creator_fee_sol: fee_amount(&raw.creator_fee_sol)?,
                num_trades: raw.num_trades.as_u64(),
            })
        })
        .collect()
}

fn bucket_date(value: &Value) -> Result<NaiveDate> {
    let bad = || RevenueError::Upstream(format!("unrecognised bucket date {value}"));
    match value {
        Value::String(s) => {
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Ok(dt.naive_utc().date());
            }
            s.get(..10)
                .and_then(|prefix| parse_date(prefix).ok())
                .ok_or_else(bad)
        }
        Value::Number(n) => {
            let raw = n.as_i64().ok_or_else(bad)?;
            let secs = if raw > MILLIS_THRESHOLD { raw / 1000 } else { raw };
            DateTime::from_timestamp(secs, 0)
                .map(|dt| dt.date_naive())
                .ok_or_else(bad)
        }
        _ => Err(bad()),
    }
}

fn fee_amount(value: &Value) -> Result<f64> {
    let amount = match value {
        Value::Null => 0.0,
        Value::Number(n) => n.as_f64().unwrap_or_default(),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| RevenueError::Upstream(format!("non-numeric creator fee '{s}'")))?,
        other => {
            return Err(RevenueError::Upstream(format!(
                "non-numeric creator fee {other}"
            )))
        }
    };
    if !amount.is_finite() || amount < 0.0 {
        return Err(RevenueError::Upstream(format!("invalid creator fee {amount}")));
    }
    Ok(amount)
}
