//! Wires the collaborators and configuration into the step components.
//! The CLI and the scheduler both go through the same instances.

use crate::balance_checker::BalanceChecker;
use crate::chain::{AmmRouter, ChainClient, EscrowLedger};
use crate::config::Config;
use crate::distribution::Distributor;
use crate::gas_monitor::GasMonitor;
use crate::monitor::FundMonitor;
use crate::role_registry::RoleRegistry;
use crate::swap::SwapExecutor;
use crate::tx_emitter::TxEmitter;
use crate::withdrawal::WithdrawalStep;
use std::sync::Arc;

pub struct FundEngine {
    pub config: Arc<Config>,
    pub registry: Arc<RoleRegistry>,
    pub chain: Arc<dyn ChainClient>,
    pub ledger: Arc<dyn EscrowLedger>,
    pub balances: Arc<BalanceChecker>,
    pub emitter: Arc<TxEmitter>,
    pub swapper: Arc<SwapExecutor>,
    pub withdrawal: Arc<WithdrawalStep>,
    pub distributor: Arc<Distributor>,
    pub gas_monitor: Arc<GasMonitor>,
    pub monitor: Arc<FundMonitor>,
}

impl FundEngine {
    pub fn new(
        config: Arc<Config>,
        registry: Arc<RoleRegistry>,
        chain: Arc<dyn ChainClient>,
        ledger: Arc<dyn EscrowLedger>,
        amm: Arc<dyn AmmRouter>,
    ) -> Self {
        let balances = Arc::new(BalanceChecker::new(
            chain.clone(),
            ledger.clone(),
            config.blockchain.native_symbol.clone(),
            config.blockchain.usdc_address,
        ));
        let emitter = Arc::new(TxEmitter::new(chain.clone(), registry.clone()));
        let swapper = Arc::new(SwapExecutor::new(chain.clone(), amm.clone()));

        let withdrawal = Arc::new(WithdrawalStep::new(
            ledger.clone(),
            balances.clone(),
            registry.clone(),
            config.fund_cycle.min_withdrawal_usd,
        ));
        let distributor = Arc::new(Distributor::new(
            balances.clone(),
            emitter.clone(),
            registry.clone(),
            config.fund_cycle.clone(),
            config.revenue_share.clone(),
            config.default_recipient.clone(),
        ));
        let gas_monitor = Arc::new(GasMonitor::new(
            balances.clone(),
            amm,
            swapper.clone(),
            registry.clone(),
            config.pool_for_chain(),
            config.fund_cycle.clone(),
        ));
        let monitor = Arc::new(FundMonitor::new(
            registry.clone(),
            withdrawal.clone(),
            distributor.clone(),
        ));

        Self {
            config,
            registry,
            chain,
            ledger,
            balances,
            emitter,
            swapper,
            withdrawal,
            distributor,
            gas_monitor,
            monitor,
        }
    }
}
