//! Scheduler
//!
//! Interval-gated, single-flight triggers for the fund cycle and the gas
//! check. A poller calls both tick methods; each decides whether its task
//! is due and refuses to start a second run while one is in progress.

use crate::gas_monitor::{GasCheckOutcome, GasMonitor};
use crate::monitor::{FundCycleReport, FundMonitor};
use crate::state_manager::StateManager;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::time::{sleep, Duration, Instant};
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CycleKind {
    FundCycle,
    GasCheck,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CyclePhase {
    Idle,
    Running,
}

/// In-process run state per cycle kind. Never persisted: a restart always
/// starts Idle and relies on the persisted timestamps instead.
#[derive(Default)]
pub struct CycleRegistry {
    phases: DashMap<CycleKind, CyclePhase>,
}

impl CycleRegistry {
    pub fn phase(&self, kind: CycleKind) -> CyclePhase {
        self.phases
            .get(&kind)
            .map(|phase| *phase)
            .unwrap_or(CyclePhase::Idle)
    }

    /// Moves `kind` from Idle to Running. The returned guard moves it back
    /// when dropped, whatever happened in between.
    pub fn try_begin(&self, kind: CycleKind) -> Option<CycleGuard<'_>> {
        let mut phase = self.phases.entry(kind).or_insert(CyclePhase::Idle);
        if *phase == CyclePhase::Running {
            return None;
        }
        *phase = CyclePhase::Running;
        Some(CycleGuard {
            registry: self,
            kind,
        })
    }
}

pub struct CycleGuard<'a> {
    registry: &'a CycleRegistry,
    kind: CycleKind,
}

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        self.registry.phases.insert(self.kind, CyclePhase::Idle);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome<T> {
    NotDue { remaining: ChronoDuration },
    AlreadyRunning,
    Completed(T),
    Failed(String),
}

fn remaining_until_due(
    last: Option<DateTime<Utc>>,
    interval_seconds: u64,
    now: DateTime<Utc>,
) -> Option<ChronoDuration> {
    let last = last?;
    let interval = ChronoDuration::seconds(i64::try_from(interval_seconds).unwrap_or(i64::MAX));
    let elapsed = now - last;
    if elapsed >= interval {
        None
    } else {
        Some(interval - elapsed)
    }
}

/// `now` advanced by the time spent since `started`, so the next interval
/// counts from completion.
fn completed_at(now: DateTime<Utc>, started: Instant) -> DateTime<Utc> {
    now + ChronoDuration::from_std(started.elapsed()).unwrap_or_else(|_| ChronoDuration::zero())
}

pub struct Scheduler {
    monitor: Arc<FundMonitor>,
    gas_monitor: Arc<GasMonitor>,
    state: Arc<StateManager>,
    cycles: CycleRegistry,
    fund_cycle_interval_seconds: u64,
    gas_check_interval_seconds: u64,
}

impl Scheduler {
    pub fn new(
        monitor: Arc<FundMonitor>,
        gas_monitor: Arc<GasMonitor>,
        state: Arc<StateManager>,
        fund_cycle_interval_seconds: u64,
        gas_check_interval_seconds: u64,
    ) -> Self {
        Self {
            monitor,
            gas_monitor,
            state,
            cycles: CycleRegistry::default(),
            fund_cycle_interval_seconds,
            gas_check_interval_seconds,
        }
    }

    pub fn phase(&self, kind: CycleKind) -> CyclePhase {
        self.cycles.phase(kind)
    }

    pub async fn should_run_fund_cycle(&self, now: DateTime<Utc>) -> bool {
        let state = self.state.fetch_snapshot().await;
        remaining_until_due(state.last_fund_cycle_at, self.fund_cycle_interval_seconds, now)
            .is_none()
    }

    pub async fn should_run_gas_check(&self, now: DateTime<Utc>) -> bool {
        let state = self.state.fetch_snapshot().await;
        remaining_until_due(state.last_gas_check_at, self.gas_check_interval_seconds, now)
            .is_none()
    }

    pub async fn tick_fund_cycle(&self) -> TickOutcome<FundCycleReport> {
        self.tick_fund_cycle_at(Utc::now()).await
    }

    pub async fn tick_gas_check(&self) -> TickOutcome<GasCheckOutcome> {
        self.tick_gas_check_at(Utc::now()).await
    }

    pub async fn tick_fund_cycle_at(&self, now: DateTime<Utc>) -> TickOutcome<FundCycleReport> {
        let state = self.state.fetch_snapshot().await;
        if let Some(remaining) =
            remaining_until_due(state.last_fund_cycle_at, self.fund_cycle_interval_seconds, now)
        {
            return TickOutcome::NotDue { remaining };
        }
        let Some(_guard) = self.cycles.try_begin(CycleKind::FundCycle) else {
            info!("Fund cycle already running, skipping tick");
            return TickOutcome::AlreadyRunning;
        };

        info!("Starting fund cycle");
        let started = Instant::now();
        let result = self.monitor.run_fund_cycle().await;

        if let Ok(report) = &result {
            if report.hot_wallet_created {
                if let Err(e) = self.state.mark_hot_wallet_generated().await {
                    error!("Failed to record hot wallet generation: {:#}", e);
                }
            }
        }
        // Recorded on failure too, so an unrecoverable condition waits for
        // the next interval instead of retrying on every tick.
        if let Err(e) = self.state.record_fund_cycle(completed_at(now, started)).await {
            error!("Failed to persist fund cycle timestamp: {:#}", e);
        }

        match result {
            Ok(report) => {
                info!("Fund cycle complete");
                TickOutcome::Completed(report)
            }
            Err(e) => {
                error!("Fund cycle failed: {}", e);
                TickOutcome::Failed(e.to_string())
            }
        }
    }

    pub async fn tick_gas_check_at(&self, now: DateTime<Utc>) -> TickOutcome<GasCheckOutcome> {
        let state = self.state.fetch_snapshot().await;
        if let Some(remaining) =
            remaining_until_due(state.last_gas_check_at, self.gas_check_interval_seconds, now)
        {
            return TickOutcome::NotDue { remaining };
        }
        let Some(_guard) = self.cycles.try_begin(CycleKind::GasCheck) else {
            info!("Gas check already running, skipping tick");
            return TickOutcome::AlreadyRunning;
        };

        let started = Instant::now();
        let result = self.gas_monitor.check().await;
        if let Err(e) = self.state.record_gas_check(completed_at(now, started)).await {
            error!("Failed to persist gas check timestamp: {:#}", e);
        }

        match result {
            Ok(outcome) => TickOutcome::Completed(outcome),
            Err(e) => {
                warn!("Gas check failed: {}", e);
                TickOutcome::Failed(e.to_string())
            }
        }
    }

    /// Polls both triggers every `poll_interval` until the future is dropped.
    pub async fn run_polling(&self, poll_interval: Duration) {
        info!(
            "Starting poll loop (every {}s, fund cycle every {}s, gas check every {}s)",
            poll_interval.as_secs(),
            self.fund_cycle_interval_seconds,
            self.gas_check_interval_seconds
        );
        loop {
            self.tick_gas_check().await;
            self.tick_fund_cycle().await;
            sleep(poll_interval).await;
        }
    }
}
