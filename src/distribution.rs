//! Distribution Step
//!
//! Four sub-steps, always in this order: gas top-up, buffer top-up,
//! revenue share, remainder sweep. The sweep sends everything left in the
//! hot wallet to the default recipient, so it must run last.

use crate::balance_checker::BalanceChecker;
use crate::config::{percent_to_bps, FundCycleConfig, RevenueShareConfig};
use crate::error::{FundError, FundResult};
use crate::role_registry::{RoleRegistry, HOT_ROLE, OPERATOR_ROLE};
use crate::rules_engine::{
    buffer_decision, gas_topup_decision, split_revenue, BufferDecision, GasTopUpDecision,
};
use crate::tx_emitter::{TransferRecord, TxEmitter};
use crate::types::{to_raw_units, Address, AssetId, NATIVE_DECIMALS, U256};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum GasTopUpOutcome {
    NotNeeded,
    Sent(TransferRecord),
    OperatorReserveTooLow { operator_balance: U256, required: U256 },
}

#[derive(Debug, Clone, PartialEq)]
pub enum BufferOutcome {
    AboveTarget,
    Sent(TransferRecord),
    InsufficientHotBalance { needed: U256, available: U256 },
}

#[derive(Debug, Clone, PartialEq)]
pub enum PayoutOutcome {
    Sent(TransferRecord),
    ZeroShare,
    Skipped(FundError),
    Failed(FundError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecipientPayout {
    pub role: String,
    pub amount: U256,
    pub outcome: PayoutOutcome,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssetShare {
    pub asset: Address,
    pub balance: U256,
    pub total_share: U256,
    pub payouts: Vec<RecipientPayout>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RevenueShareOutcome {
    Disabled,
    Distributed {
        assets: Vec<AssetShare>,
        failed_assets: Vec<(Address, FundError)>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SweptAsset {
    pub asset: Address,
    pub amount: U256,
    pub outcome: Result<TransferRecord, FundError>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RemainderOutcome {
    pub recipient: Address,
    pub swept: Vec<SweptAsset>,
    pub failed_reads: Vec<(Address, FundError)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DistributionReport {
    pub gas_topup: FundResult<GasTopUpOutcome>,
    pub buffer_topup: FundResult<BufferOutcome>,
    pub revenue_share: FundResult<RevenueShareOutcome>,
    pub remainder: FundResult<RemainderOutcome>,
}

impl DistributionReport {
    pub fn has_failures(&self) -> bool {
        self.gas_topup.is_err()
            || self.buffer_topup.is_err()
            || self.revenue_share.is_err()
            || self.remainder.is_err()
    }
}

pub struct Distributor {
    balances: Arc<BalanceChecker>,
    emitter: Arc<TxEmitter>,
    registry: Arc<RoleRegistry>,
    cycle: FundCycleConfig,
    revenue: RevenueShareConfig,
    default_recipient: String,
}

impl Distributor {
    pub fn new(
        balances: Arc<BalanceChecker>,
        emitter: Arc<TxEmitter>,
        registry: Arc<RoleRegistry>,
        cycle: FundCycleConfig,
        revenue: RevenueShareConfig,
        default_recipient: String,
    ) -> Self {
        Self {
            balances,
            emitter,
            registry,
            cycle,
            revenue,
            default_recipient,
        }
    }

    /// Runs the four sub-steps in order. A failing sub-step is recorded and
    /// the next one still runs.
    pub async fn run(&self, hot: Address) -> DistributionReport {
        let gas_topup = self.gas_topup(hot).await;
        if let Err(e) = &gas_topup {
            warn!("Gas top-up failed: {}", e);
        }
        let buffer_topup = self.buffer_topup(hot).await;
        if let Err(e) = &buffer_topup {
            warn!("Buffer top-up failed: {}", e);
        }
        let revenue_share = self.revenue_share(hot).await;
        if let Err(e) = &revenue_share {
            warn!("Revenue share failed: {}", e);
        }
        let remainder = self.sweep_remainder(hot).await;
        if let Err(e) = &remainder {
            warn!("Remainder sweep failed: {}", e);
        }

        DistributionReport {
            gas_topup,
            buffer_topup,
            revenue_share,
            remainder,
        }
    }

    /// Operator tops up the hot wallet's gas when it falls below target.
    pub async fn gas_topup(&self, hot: Address) -> FundResult<GasTopUpOutcome> {
        let target = to_raw_units(self.cycle.hot_gas_target, NATIVE_DECIMALS)?;
        let operator = self.registry.resolve_address(OPERATOR_ROLE).await?;
        let hot_native = self.balances.get_balance(AssetId::Native, hot).await?.raw;
        let operator_native = self.balances.get_balance(AssetId::Native, operator).await?.raw;

        match gas_topup_decision(hot_native, operator_native, target) {
            GasTopUpDecision::NotNeeded => Ok(GasTopUpOutcome::NotNeeded),
            GasTopUpDecision::OperatorReserveTooLow {
                operator_balance,
                required,
            } => {
                warn!(
                    "Hot wallet gas low ({}) but operator holds {}, needs {} to top up safely",
                    hot_native, operator_balance, required
                );
                Ok(GasTopUpOutcome::OperatorReserveTooLow {
                    operator_balance,
                    required,
                })
            }
            GasTopUpDecision::TopUp(amount) => {
                info!("Hot wallet gas {} below target {}, topping up", hot_native, target);
                let record = self
                    .emitter
                    .emit_transfer(OPERATOR_ROLE, hot, AssetId::Native, amount)
                    .await?;
                Ok(GasTopUpOutcome::Sent(record))
            }
        }
    }

    /// Hot wallet restores the operator's stable buffer, all or nothing.
    pub async fn buffer_topup(&self, hot: Address) -> FundResult<BufferOutcome> {
        let stable = AssetId::Token(self.balances.stable_asset().await?);
        let operator = self.registry.resolve_address(OPERATOR_ROLE).await?;
        let operator_balance = self.balances.get_balance(stable, operator).await?;
        let target = to_raw_units(self.cycle.stable_buffer_target, operator_balance.decimals)?;
        let hot_stable = self.balances.get_balance(stable, hot).await?.raw;

        match buffer_decision(operator_balance.raw, target, hot_stable) {
            BufferDecision::AboveTarget => Ok(BufferOutcome::AboveTarget),
            BufferDecision::InsufficientHotBalance { needed, available } => {
                warn!(
                    "Operator {} buffer short by {} but hot wallet holds only {}, skipping",
                    operator_balance.symbol, needed, available
                );
                Ok(BufferOutcome::InsufficientHotBalance { needed, available })
            }
            BufferDecision::TopUp(shortfall) => {
                let record = self
                    .emitter
                    .emit_transfer(HOT_ROLE, operator, stable, shortfall)
                    .await?;
                Ok(BufferOutcome::Sent(record))
            }
        }
    }

    /// Splits every non-zero accepted asset in the hot wallet among the
    /// configured recipients. The last recipient absorbs rounding.
    pub async fn revenue_share(&self, hot: Address) -> FundResult<RevenueShareOutcome> {
        if !self.revenue.is_active() {
            return Ok(RevenueShareOutcome::Disabled);
        }
        let total_bps = self.revenue.total_bps()?;
        let recipient_bps = self
            .revenue
            .recipients
            .iter()
            .map(|r| percent_to_bps(r.percent))
            .collect::<FundResult<Vec<_>>>()?;

        let mut assets = Vec::new();
        let mut failed_assets = Vec::new();
        for accepted in self.balances.list_accepted_assets().await? {
            let asset = AssetId::Token(accepted.asset);
            let balance = match self.balances.get_balance(asset, hot).await {
                Ok(balance) => balance.raw,
                Err(e) => {
                    warn!("Revenue share: reading {} failed: {}", accepted.asset, e);
                    failed_assets.push((accepted.asset, e));
                    continue;
                }
            };
            if balance.is_zero() {
                continue;
            }

            let split = split_revenue(balance, total_bps, &recipient_bps)?;
            info!(
                "Revenue share of {}: {} of {} across {} recipients",
                accepted.asset,
                split.total_share,
                balance,
                split.shares.len()
            );

            let mut payouts = Vec::with_capacity(split.shares.len());
            for (recipient, amount) in self.revenue.recipients.iter().zip(split.shares) {
                let outcome = self.pay_recipient(&recipient.role, asset, amount).await;
                payouts.push(RecipientPayout {
                    role: recipient.role.clone(),
                    amount,
                    outcome,
                });
            }
            assets.push(AssetShare {
                asset: accepted.asset,
                balance,
                total_share: split.total_share,
                payouts,
            });
        }

        Ok(RevenueShareOutcome::Distributed {
            assets,
            failed_assets,
        })
    }

    async fn pay_recipient(&self, role: &str, asset: AssetId, amount: U256) -> PayoutOutcome {
        if amount.is_zero() {
            return PayoutOutcome::ZeroShare;
        }
        let to = match self.registry.resolve_address(role).await {
            Ok(to) => to,
            Err(e) => {
                warn!("Revenue recipient '{}' not resolvable, skipping: {}", role, e);
                return PayoutOutcome::Skipped(e);
            }
        };
        match self.emitter.emit_transfer(HOT_ROLE, to, asset, amount).await {
            Ok(record) => PayoutOutcome::Sent(record),
            Err(e) => {
                warn!("Revenue payout to '{}' failed: {}", role, e);
                PayoutOutcome::Failed(e)
            }
        }
    }

    /// Sends every remaining accepted-asset balance to the default recipient.
    pub async fn sweep_remainder(&self, hot: Address) -> FundResult<RemainderOutcome> {
        let recipient = self.registry.resolve_address(&self.default_recipient).await?;
        let mut swept = Vec::new();
        let mut failed_reads = Vec::new();

        for accepted in self.balances.list_accepted_assets().await? {
            let asset = AssetId::Token(accepted.asset);
            let amount = match self.balances.get_balance(asset, hot).await {
                Ok(balance) => balance.raw,
                Err(e) => {
                    warn!("Remainder sweep: reading {} failed: {}", accepted.asset, e);
                    failed_reads.push((accepted.asset, e));
                    continue;
                }
            };
            if amount.is_zero() {
                continue;
            }
            let outcome = self
                .emitter
                .emit_transfer(HOT_ROLE, recipient, asset, amount)
                .await;
            if let Err(e) = &outcome {
                warn!("Remainder sweep of {} failed: {}", accepted.asset, e);
            }
            swept.push(SweptAsset {
                asset: accepted.asset,
                amount,
                outcome,
            });
        }

        Ok(RemainderOutcome {
            recipient,
            swept,
            failed_reads,
        })
    }
}
