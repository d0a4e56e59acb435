//! Fund Monitor
//!
//! Orchestrates one fund cycle: make sure the hot wallet exists, withdraw
//! from the ledger into it, then run the distribution sub-steps.

use crate::distribution::{DistributionReport, Distributor};
use crate::error::FundResult;
use crate::role_registry::{RoleRegistry, HOT_ROLE};
use crate::types::{truncate_address, Address};
use crate::withdrawal::{WithdrawalReport, WithdrawalStep};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct FundCycleReport {
    pub hot_wallet: Address,
    pub hot_wallet_created: bool,
    pub withdrawal: FundResult<WithdrawalReport>,
    pub distribution: DistributionReport,
}

pub struct FundMonitor {
    registry: Arc<RoleRegistry>,
    withdrawal: Arc<WithdrawalStep>,
    distributor: Arc<Distributor>,
}

impl FundMonitor {
    pub fn new(
        registry: Arc<RoleRegistry>,
        withdrawal: Arc<WithdrawalStep>,
        distributor: Arc<Distributor>,
    ) -> Self {
        Self {
            registry,
            withdrawal,
            distributor,
        }
    }

    /// Runs withdrawal then distribution, strictly in sequence.
    ///
    /// Only failing to obtain the hot wallet aborts the cycle; step failures
    /// are carried in the report.
    pub async fn run_fund_cycle(&self) -> FundResult<FundCycleReport> {
        let existed = self.registry.contains(HOT_ROLE).await;
        let hot = self.registry.ensure_intermediary_wallet().await?;
        info!("Starting fund cycle via hot wallet {}", truncate_address(&hot));

        let withdrawal = self.withdrawal.run(hot).await;
        if let Err(e) = &withdrawal {
            warn!("Withdrawal step failed: {}", e);
        }

        let distribution = self.distributor.run(hot).await;

        Ok(FundCycleReport {
            hot_wallet: hot,
            hot_wallet_created: !existed,
            withdrawal,
            distribution,
        })
    }
}
