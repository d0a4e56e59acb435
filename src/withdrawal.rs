//! Withdrawal Step
//!
//! Pulls each accepted asset out of the subscription ledger into the hot
//! wallet. Every asset is its own unit of work: one failure is logged and
//! the rest still run.

use crate::balance_checker::{usd_value, BalanceChecker};
use crate::chain::EscrowLedger;
use crate::error::{FundError, FundResult};
use crate::role_registry::{RoleRegistry, OPERATOR_ROLE};
use crate::rules_engine::{withdrawal_decision, WithdrawDecision};
use crate::types::{AcceptedAsset, Address, AssetId, Signer, B256, U256};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum WithdrawalOutcome {
    Withdrawn { amount: U256, usd_value: Decimal, tx_hash: B256 },
    SkippedZeroBalance,
    SkippedBelowThreshold { usd_value: Decimal },
    Failed(FundError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssetWithdrawal {
    pub asset: Address,
    pub symbol: String,
    pub outcome: WithdrawalOutcome,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WithdrawalReport {
    pub assets: Vec<AssetWithdrawal>,
}

impl WithdrawalReport {
    pub fn withdrawn_count(&self) -> usize {
        self.assets
            .iter()
            .filter(|a| matches!(a.outcome, WithdrawalOutcome::Withdrawn { .. }))
            .count()
    }

    pub fn failed_count(&self) -> usize {
        self.assets
            .iter()
            .filter(|a| matches!(a.outcome, WithdrawalOutcome::Failed(_)))
            .count()
    }
}

pub struct WithdrawalStep {
    ledger: Arc<dyn EscrowLedger>,
    balances: Arc<BalanceChecker>,
    registry: Arc<RoleRegistry>,
    min_withdrawal_usd: Decimal,
}

impl WithdrawalStep {
    pub fn new(
        ledger: Arc<dyn EscrowLedger>,
        balances: Arc<BalanceChecker>,
        registry: Arc<RoleRegistry>,
        min_withdrawal_usd: Decimal,
    ) -> Self {
        Self {
            ledger,
            balances,
            registry,
            min_withdrawal_usd,
        }
    }

    /// Withdraws every eligible asset into `destination`.
    pub async fn run(&self, destination: Address) -> FundResult<WithdrawalReport> {
        let signer = self.registry.resolve_signer(OPERATOR_ROLE).await?;
        let stable = self.balances.stable_asset().await?;
        let accepted = self.balances.list_accepted_assets().await?;
        info!(
            "Withdrawal step: {} accepted assets, threshold ${}",
            accepted.len(),
            self.min_withdrawal_usd
        );

        let mut report = WithdrawalReport::default();
        for asset in accepted {
            let entry = match self.withdraw_asset(&signer, &asset, stable, destination).await {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Withdrawal of {} failed: {}", asset.asset, e);
                    AssetWithdrawal {
                        asset: asset.asset,
                        symbol: asset.asset.to_string(),
                        outcome: WithdrawalOutcome::Failed(e),
                    }
                }
            };
            report.assets.push(entry);
        }

        info!(
            "Withdrawal step complete: {} withdrawn, {} failed",
            report.withdrawn_count(),
            report.failed_count()
        );
        Ok(report)
    }

    async fn withdraw_asset(
        &self,
        signer: &Signer,
        asset: &AcceptedAsset,
        stable: Address,
        destination: Address,
    ) -> FundResult<AssetWithdrawal> {
        let escrow = self.ledger.contract_address();
        let held = self
            .balances
            .get_balance(AssetId::Token(asset.asset), escrow)
            .await?;
        let value = usd_value(asset.asset, held.raw, held.decimals, stable, asset.price_cents)?;

        let outcome = match withdrawal_decision(held.raw, value, self.min_withdrawal_usd) {
            WithdrawDecision::SkipZeroBalance => {
                info!("{}: escrow balance is zero, skipping", held.symbol);
                WithdrawalOutcome::SkippedZeroBalance
            }
            WithdrawDecision::SkipBelowThreshold => {
                info!(
                    "{}: ${} below withdrawal threshold ${}, skipping",
                    held.symbol, value, self.min_withdrawal_usd
                );
                WithdrawalOutcome::SkippedBelowThreshold { usd_value: value }
            }
            WithdrawDecision::Withdraw => {
                let receipt = self
                    .ledger
                    .withdraw(signer, asset.asset, destination)
                    .await?
                    .ensure_success()?;
                info!(
                    "{}: withdrew {} (${}) tx={:?}",
                    held.symbol, held.raw, value, receipt.tx_hash
                );
                WithdrawalOutcome::Withdrawn {
                    amount: held.raw,
                    usd_value: value,
                    tx_hash: receipt.tx_hash,
                }
            }
        };

        Ok(AssetWithdrawal {
            asset: asset.asset,
            symbol: held.symbol,
            outcome,
        })
    }
}
