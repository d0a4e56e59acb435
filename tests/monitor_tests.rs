mod common;

use common::{
    addr, base_roles, harness, harness_with, test_config, units, usdc, ADMIN, DAI, ESCROW, HOT,
    OPERATOR, USDC,
};
use fund_orchestrator::balance_checker::usd_value;
use fund_orchestrator::config::{RevenueRecipient, RevenueShareConfig};
use fund_orchestrator::types::{AssetId, U256};
use rust_decimal::Decimal;

#[tokio::test]
async fn test_full_cycle_moves_escrow_to_recipients() {
    let mut config = test_config();
    config.revenue_share = RevenueShareConfig {
        enabled: true,
        total_percent: Decimal::from(20),
        recipients: vec![RevenueRecipient {
            role: "dev".to_string(),
            percent: Decimal::from(20),
        }],
    };
    let h = harness_with(config, base_roles(true));
    h.chain.add_slot(1, addr(USDC), None);
    h.chain.set_token(addr(USDC), addr(ESCROW), usdc(1_050));
    h.chain.set_token(addr(USDC), addr(OPERATOR), usdc(50));

    let report = h.engine.monitor.run_fund_cycle().await.unwrap();

    assert_eq!(report.withdrawal.as_ref().unwrap().withdrawn_count(), 1);
    assert!(!report.distribution.has_failures());
    assert_eq!(h.chain.token_of(addr(USDC), addr(ESCROW)), U256::ZERO);
    assert_eq!(h.chain.token_of(addr(USDC), addr(HOT)), U256::ZERO);
    assert_eq!(h.chain.token_of(addr(USDC), addr(common::DEV)), usdc(210));
    assert_eq!(h.chain.token_of(addr(USDC), addr(ADMIN)), usdc(840));
}

#[tokio::test]
async fn test_withdrawal_failure_still_distributes() {
    let mut roles = base_roles(true);
    roles.insert(
        "operator".to_string(),
        fund_orchestrator::role_registry::RoleEntry::watch_only(addr(OPERATOR)),
    );
    let h = harness_with(test_config(), roles);
    h.chain.add_slot(1, addr(USDC), None);
    h.chain.set_token(addr(USDC), addr(HOT), usdc(60));
    h.chain.set_token(addr(USDC), addr(OPERATOR), usdc(50));

    let report = h.engine.monitor.run_fund_cycle().await.unwrap();

    assert!(report.withdrawal.is_err());
    assert_eq!(h.chain.token_of(addr(USDC), addr(ADMIN)), usdc(60));
}

#[tokio::test]
async fn test_balance_report_lists_zero_balances() {
    let h = harness();
    h.chain.add_slot(1, addr(USDC), None);
    h.chain.add_slot(2, addr(DAI), Some(250));
    h.chain.set_token(addr(DAI), addr(HOT), units(4, 18));

    let balances = h
        .engine
        .balances
        .list_all_accepted_asset_balances(addr(HOT))
        .await
        .unwrap();

    assert_eq!(balances.len(), 2);
    assert_eq!(balances[0].asset, AssetId::Token(addr(USDC)));
    assert_eq!(balances[0].raw, U256::ZERO);
    assert_eq!(balances[0].usd_value, Decimal::ZERO);
    assert_eq!(balances[1].symbol, "DAI");
    assert_eq!(balances[1].usd_value, Decimal::from(10));
}

#[test]
fn test_usd_value_rules() {
    let stable = addr(USDC);
    // stable is 1:1 regardless of any price
    assert_eq!(
        usd_value(stable, usdc(3), 6, stable, Some(5_000)).unwrap(),
        Decimal::from(3)
    );
    // unpriced asset with nothing held is worth nothing
    assert_eq!(
        usd_value(addr(DAI), U256::ZERO, 18, stable, None).unwrap(),
        Decimal::ZERO
    );
    // unpriced asset with a balance degrades to 1:1
    assert_eq!(
        usd_value(addr(DAI), units(7, 18), 18, stable, None).unwrap(),
        Decimal::from(7)
    );
    assert_eq!(
        usd_value(addr(DAI), units(2, 18), 18, stable, Some(199)).unwrap(),
        Decimal::new(398, 2)
    );
}
