mod common;

use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use common::{
    addr, base_roles, harness, harness_with, test_config, usdc, FailingAgent, MockChain, ESCROW,
    HOT, USDC,
};
use fund_orchestrator::config::SEPOLIA_CHAIN_ID;
use fund_orchestrator::engine::FundEngine;
use fund_orchestrator::gas_monitor::GasCheckOutcome;
use fund_orchestrator::role_registry::RoleRegistry;
use fund_orchestrator::scheduler::{CycleKind, CyclePhase, Scheduler, TickOutcome};
use fund_orchestrator::state_manager::StateManager;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

const DAY: u64 = 86_400;
const HOUR: u64 = 3_600;

fn assert_recorded_after(recorded: Option<chrono::DateTime<Utc>>, start: chrono::DateTime<Utc>) {
    let recorded = recorded.expect("timestamp recorded");
    assert!(recorded >= start);
    assert!(recorded < start + ChronoDuration::seconds(5));
}

async fn create_test_scheduler(engine: &FundEngine) -> (Scheduler, Arc<StateManager>, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let state = Arc::new(
        StateManager::load(temp_dir.path().join("state.json"))
            .await
            .unwrap(),
    );
    let scheduler = Scheduler::new(
        engine.monitor.clone(),
        engine.gas_monitor.clone(),
        state.clone(),
        DAY,
        HOUR,
    );
    (scheduler, state, temp_dir)
}

#[tokio::test]
async fn test_first_tick_runs_and_records_timestamp() {
    let h = harness();
    h.chain.add_slot(1, addr(USDC), None);
    h.chain.set_token(addr(USDC), addr(ESCROW), usdc(100));
    let (scheduler, state, _temp_dir) = create_test_scheduler(&h.engine).await;
    let now = Utc.with_ymd_and_hms(2026, 6, 1, 0, 0, 0).unwrap();

    let outcome = scheduler.tick_fund_cycle_at(now).await;

    let TickOutcome::Completed(report) = outcome else {
        panic!("first tick should run the cycle");
    };
    assert_eq!(report.hot_wallet, addr(HOT));
    assert!(!report.hot_wallet_created);
    assert_eq!(report.withdrawal.unwrap().withdrawn_count(), 1);
    assert_recorded_after(state.fetch_snapshot().await.last_fund_cycle_at, now);
    assert_eq!(scheduler.phase(CycleKind::FundCycle), CyclePhase::Idle);
}

#[tokio::test]
async fn test_not_due_before_interval() {
    let h = harness();
    let (scheduler, state, _temp_dir) = create_test_scheduler(&h.engine).await;
    let last = Utc.with_ymd_and_hms(2026, 6, 1, 0, 0, 0).unwrap();
    state.record_fund_cycle(last).await.unwrap();

    let now = last + ChronoDuration::seconds(100);
    assert!(!scheduler.should_run_fund_cycle(now).await);
    assert_eq!(
        scheduler.tick_fund_cycle_at(now).await,
        TickOutcome::NotDue {
            remaining: ChronoDuration::seconds(DAY as i64 - 100)
        }
    );
    assert_eq!(h.chain.slot_reads(), 0);

    let due = last + ChronoDuration::seconds(DAY as i64);
    assert!(scheduler.should_run_fund_cycle(due).await);
}

#[tokio::test]
async fn test_single_flight_guard() {
    let h = harness();
    h.chain.add_slot(1, addr(USDC), None);
    h.chain.set_token(addr(USDC), addr(ESCROW), usdc(100));
    h.chain.set_slot_delay(Duration::from_millis(50));
    let (scheduler, _state, _temp_dir) = create_test_scheduler(&h.engine).await;
    let now = Utc::now();

    let (first, second) = tokio::join!(
        scheduler.tick_fund_cycle_at(now),
        scheduler.tick_fund_cycle_at(now)
    );

    let outcomes = [first, second];
    let completed = outcomes
        .iter()
        .filter(|o| matches!(o, TickOutcome::Completed(_)))
        .count();
    let skipped = outcomes
        .iter()
        .filter(|o| matches!(o, TickOutcome::AlreadyRunning))
        .count();
    assert_eq!((completed, skipped), (1, 1));
    assert_eq!(h.chain.withdrawals().len(), 1);
    assert_eq!(scheduler.phase(CycleKind::FundCycle), CyclePhase::Idle);
}

#[tokio::test]
async fn test_fund_cycle_and_gas_check_are_independent() {
    let h = harness();
    h.chain.set_slot_delay(Duration::from_millis(50));
    let (scheduler, _state, _temp_dir) = create_test_scheduler(&h.engine).await;
    let now = Utc::now();

    let (fund, gas) = tokio::join!(
        scheduler.tick_fund_cycle_at(now),
        scheduler.tick_gas_check_at(now)
    );

    assert!(matches!(fund, TickOutcome::Completed(_)));
    assert!(!matches!(gas, TickOutcome::AlreadyRunning));
}

#[tokio::test]
async fn test_failed_cycle_still_records_timestamp() {
    let chain = Arc::new(MockChain::new());
    let registry = Arc::new(RoleRegistry::new(base_roles(false), Arc::new(FailingAgent)));
    let engine = FundEngine::new(
        Arc::new(test_config()),
        registry,
        chain.clone(),
        chain.clone(),
        chain.clone(),
    );
    let (scheduler, state, _temp_dir) = create_test_scheduler(&engine).await;
    let now = Utc.with_ymd_and_hms(2026, 6, 1, 0, 0, 0).unwrap();

    let outcome = scheduler.tick_fund_cycle_at(now).await;

    assert!(matches!(outcome, TickOutcome::Failed(_)));
    assert_recorded_after(state.fetch_snapshot().await.last_fund_cycle_at, now);
    assert_eq!(scheduler.phase(CycleKind::FundCycle), CyclePhase::Idle);
    // nothing was attempted without a hot wallet
    assert_eq!(chain.write_count(), 0);

    // and the next tick inside the interval does not retry
    assert!(matches!(
        scheduler
            .tick_fund_cycle_at(now + ChronoDuration::seconds(60))
            .await,
        TickOutcome::NotDue { .. }
    ));
}

#[tokio::test]
async fn test_generated_hot_wallet_is_recorded() {
    let h = harness_with(test_config(), base_roles(false));
    let (scheduler, state, _temp_dir) = create_test_scheduler(&h.engine).await;

    let outcome = scheduler.tick_fund_cycle().await;

    let TickOutcome::Completed(report) = outcome else {
        panic!("cycle should complete");
    };
    assert!(report.hot_wallet_created);
    assert!(state.fetch_snapshot().await.hot_wallet_generated);
    assert_eq!(h.agent.generated_roles(), vec!["hot".to_string()]);
}

#[tokio::test]
async fn test_gas_check_interval() {
    let mut config = test_config();
    config.pool_overrides.clear();
    config.blockchain.chain_id = SEPOLIA_CHAIN_ID;
    let h = harness_with(config, base_roles(true));
    let (scheduler, state, _temp_dir) = create_test_scheduler(&h.engine).await;
    let now = Utc.with_ymd_and_hms(2026, 6, 1, 0, 0, 0).unwrap();

    assert_eq!(
        scheduler.tick_gas_check_at(now).await,
        TickOutcome::Completed(GasCheckOutcome::NoPool)
    );
    assert_recorded_after(state.fetch_snapshot().await.last_gas_check_at, now);
    assert!(matches!(
        scheduler
            .tick_gas_check_at(now + ChronoDuration::seconds(HOUR as i64 - 1))
            .await,
        TickOutcome::NotDue { .. }
    ));
    assert!(matches!(
        scheduler
            .tick_gas_check_at(now + ChronoDuration::seconds(HOUR as i64 + 5))
            .await,
        TickOutcome::Completed(_)
    ));
}

#[tokio::test]
async fn test_interval_counts_from_cycle_completion() {
    let h = harness();
    h.chain.add_slot(1, addr(USDC), None);
    h.chain.set_slot_delay(Duration::from_millis(200));
    let (scheduler, state, _temp_dir) = create_test_scheduler(&h.engine).await;
    let now = Utc.with_ymd_and_hms(2026, 6, 1, 0, 0, 0).unwrap();

    assert!(matches!(
        scheduler.tick_fund_cycle_at(now).await,
        TickOutcome::Completed(_)
    ));

    let recorded = state.fetch_snapshot().await.last_fund_cycle_at.unwrap();
    assert!(recorded >= now + ChronoDuration::milliseconds(200));
    // a poll exactly one interval after the start is still early
    assert!(!scheduler
        .should_run_fund_cycle(now + ChronoDuration::seconds(DAY as i64))
        .await);
}
