//! Sequential pipeline run for one period.
//!
//! ```text
//! ValidatePeriod → ScoreInteractions → ComputeExternalFees →
//! ComputeInternalFees → ComputePayouts → ComputeReferrals → Notify → Done
//! ```
//!
//! The first failing stage ends the run as `Failed(step, reason)` and no
//! later stage executes. Writes of earlier stages stay in place; every stage
//! is an idempotent recompute, so recovery is re-running the whole period.

use chrono::NaiveDate;
use serde::Serialize;
use serde_json::Value;
use tally_db::queries::periods as period_store;
use tally_db::rusqlite::Connection;
use tally_types::{Period, PeriodWindow, RevenueStatus};

use crate::notify::NotificationSink;
use crate::payouts::{self, BalanceCheck};
use crate::pumpfun::CreatorFeeSource;
use crate::{fees, notify, periods, referrals, scoring, RevenueError, Result};

/// Pipeline stages in execution order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    ValidatePeriod,
    ScoreInteractions,
    ComputeExternalFees,
    ComputeInternalFees,
    ComputePayouts,
    ComputeReferrals,
    Notify,
}

impl Stage {
    /// Every stage, in order.
    pub const ALL: [Stage; 7] = [
        Stage::ValidatePeriod,
        Stage::ScoreInteractions,
        Stage::ComputeExternalFees,
        Stage::ComputeInternalFees,
        Stage::ComputePayouts,
        Stage::ComputeReferrals,
        Stage::Notify,
    ];

    /// 1-based position in the pipeline.
    pub fn step(self) -> usize {
        self as usize + 1
    }

    pub fn name(self) -> &'static str {
        match self {
            Stage::ValidatePeriod => "Validate period",
            Stage::ScoreInteractions => "Calculate interaction scores",
            Stage::ComputeExternalFees => "Calculate pump.fun creator fees",
            Stage::ComputeInternalFees => "Calculate platform fees",
            Stage::ComputePayouts => "Calculate user payouts",
            Stage::ComputeReferrals => "Calculate referral payouts",
            Stage::Notify => "Send payout notifications",
        }
    }
}

/// Result of one stage.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepResult {
    pub step: usize,
    pub name: &'static str,
    pub stage: Stage,
    pub success: bool,
    pub error: Option<String>,
    pub details: Value,
}

/// Terminal state of a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RunState {
    Done,
    Failed { step: usize, reason: String },
}

/// Ordered stage results plus the final balance check.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrchestrationReport {
    pub window: Option<PeriodWindow>,
    pub period_name: Option<String>,
    pub steps: Vec<StepResult>,
    pub state: RunState,
    pub balance: Option<BalanceCheck>,
}

impl OrchestrationReport {
    pub fn success(&self) -> bool {
        self.state == RunState::Done
    }
}

/// Runs the pipeline against one database.
pub struct Orchestrator<'a> {
    conn: &'a Connection,
    fees: &'a dyn CreatorFeeSource,
    sink: &'a dyn NotificationSink,
    default_creator_wallet: Option<String>,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        conn: &'a Connection,
        fees: &'a dyn CreatorFeeSource,
        sink: &'a dyn NotificationSink,
    ) -> Self {
        Self {
            conn,
            fees,
            sink,
            default_creator_wallet: None,
        }
    }

    /// Creator wallet used when a period has none recorded.
    pub fn with_default_creator_wallet(mut self, wallet: Option<String>) -> Self {
        self.default_creator_wallet = wallet.filter(|w| !w.trim().is_empty());
        self
    }

    /// Run every stage for `requested`, or for the most recently ended,
    /// uncalculated period when `None`.
    pub fn run(&self, requested: Option<PeriodWindow>, today: NaiveDate) -> OrchestrationReport {
        let mut steps = Vec::with_capacity(Stage::ALL.len());

        let period = match self.validate(requested, today) {
            Ok(period) => {
                steps.push(ok(Stage::ValidatePeriod, to_details(&period)));
                period
            }
            Err(e) => {
                steps.push(failed(Stage::ValidatePeriod, &e));
                tracing::warn!(error = %e, "orchestration rejected period");
                return OrchestrationReport {
                    window: requested,
                    period_name: None,
                    steps,
                    state: fail_state(Stage::ValidatePeriod, &e),
                    balance: None,
                };
            }
        };
        let window = period.window;
        tracing::info!(period = %window, name = %period.period_name, "orchestration started");

        let mut state = RunState::Done;
        for stage in Stage::ALL.into_iter().skip(1) {
            match self.run_stage(stage, &period) {
                Ok(details) => steps.push(ok(stage, details)),
                Err(e) => {
                    tracing::warn!(period = %window, step = stage.step(), stage = stage.name(), error = %e, "orchestration halted");
                    steps.push(failed(stage, &e));
                    state = fail_state(stage, &e);
                    break;
                }
            }
        }

        let payouts_ran = steps
            .iter()
            .any(|s| s.stage == Stage::ComputePayouts && s.success);
        let balance = if payouts_ran {
            payouts::verify_balance(self.conn, &window)
                .map_err(|e| tracing::error!(period = %window, error = %e, "balance check failed"))
                .ok()
        } else {
            None
        };

        let (status, calculated_at) = match state {
            RunState::Done => (RevenueStatus::Calculated, Some(tally_db::now_secs())),
            RunState::Failed { .. } => (RevenueStatus::Failed, None),
        };
        if let Err(e) = period_store::set_status(self.conn, &window, status, calculated_at) {
            tracing::error!(period = %window, error = %e, "failed to record period status");
        }
        tracing::info!(period = %window, status = status.as_str(), "orchestration finished");

        OrchestrationReport {
            window: Some(window),
            period_name: Some(period.period_name),
            steps,
            state,
            balance,
        }
    }

    fn validate(&self, requested: Option<PeriodWindow>, today: NaiveDate) -> Result<Period> {
        let period = match requested {
            Some(window) => periods::by_window(self.conn, &window)?,
            None => periods::latest_uncalculated(self.conn, today)?,
        };
        if period.window.end() >= today {
            tracing::warn!(period = %period.window, %today, "period has not ended yet");
        }
        period_store::set_status(self.conn, &period.window, RevenueStatus::Processing, None)?;
        Ok(period)
    }

    fn run_stage(&self, stage: Stage, period: &Period) -> Result<Value> {
        let window = &period.window;
        match stage {
            Stage::ValidatePeriod => Ok(to_details(period)),
            Stage::ScoreInteractions => {
                scoring::compute_scores(self.conn, window).map(|r| to_details(&r))
            }
            Stage::ComputeExternalFees => {
                let wallet = period
                    .pumpfun_creator_wallet
                    .as_deref()
                    .or(self.default_creator_wallet.as_deref());
                fees::compute_external_fees(self.conn, self.fees, window, wallet)
                    .map(|r| to_details(&r))
            }
            Stage::ComputeInternalFees => {
                fees::compute_platform_fees(self.conn, window).map(|r| to_details(&r))
            }
            Stage::ComputePayouts => {
                payouts::compute_payouts(self.conn, window).map(|r| to_details(&r))
            }
            Stage::ComputeReferrals => {
                referrals::compute_referrals(self.conn, window).map(|r| to_details(&r))
            }
            Stage::Notify => notify::notify_period(self.conn, window, self.sink).map(|r| to_details(&r)),
        }
    }
}

fn to_details<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or_default()
}

fn ok(stage: Stage, details: Value) -> StepResult {
    StepResult {
        step: stage.step(),
        name: stage.name(),
        stage,
        success: true,
        error: None,
        details,
    }
}

fn failed(stage: Stage, err: &RevenueError) -> StepResult {
    StepResult {
        step: stage.step(),
        name: stage.name(),
        stage,
        success: false,
        error: Some(err.to_string()),
        details: Value::Null,
    }
}

fn fail_state(stage: Stage, err: &RevenueError) -> RunState {
    RunState::Failed {
        step: stage.step(),
        reason: err.to_string(),
    }
}
