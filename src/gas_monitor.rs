//! Gas Monitor
//!
//! Keeps the operator wallet funded with native gas. Price comes from the
//! chain's stable/native pool; chains without a pool are skipped.

use crate::balance_checker::BalanceChecker;
use crate::chain::AmmRouter;
use crate::config::{ChainPoolConfig, FundCycleConfig};
use crate::error::{FundError, FundResult};
use crate::role_registry::{RoleRegistry, OPERATOR_ROLE};
use crate::swap::{SwapExecutor, SwapReceipt};
use crate::types::{
    to_decimal_units, to_raw_units, Address, AssetId, PairReserves, NATIVE_DECIMALS, U256,
};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum GasCheckOutcome {
    /// No price-discovery pair configured for this chain.
    NoPool,
    Healthy { usd_value: Decimal },
    InsufficientStable { available: U256, required: U256 },
    Swapped { receipt: SwapReceipt, new_balance: U256 },
}

/// USD per whole native unit, from the pair's reserves.
pub fn native_price_usd(
    reserves: &PairReserves,
    stable: Address,
    stable_decimals: u8,
) -> FundResult<Decimal> {
    let (stable_reserve, native_reserve) = reserves.oriented(stable)?;
    if native_reserve.is_zero() {
        return Err(FundError::SlippageExceeded(
            "pool has no native liquidity".to_string(),
        ));
    }
    let stable_units = to_decimal_units(stable_reserve, stable_decimals)?;
    let native_units = to_decimal_units(native_reserve, NATIVE_DECIMALS)?;
    stable_units
        .checked_div(native_units)
        .ok_or(FundError::Overflow("native price"))
}

pub struct GasMonitor {
    balances: Arc<BalanceChecker>,
    amm: Arc<dyn AmmRouter>,
    swapper: Arc<SwapExecutor>,
    registry: Arc<RoleRegistry>,
    pool: Option<ChainPoolConfig>,
    cycle: FundCycleConfig,
}

impl GasMonitor {
    pub fn new(
        balances: Arc<BalanceChecker>,
        amm: Arc<dyn AmmRouter>,
        swapper: Arc<SwapExecutor>,
        registry: Arc<RoleRegistry>,
        pool: Option<ChainPoolConfig>,
        cycle: FundCycleConfig,
    ) -> Self {
        Self {
            balances,
            amm,
            swapper,
            registry,
            pool,
            cycle,
        }
    }

    pub async fn check(&self) -> FundResult<GasCheckOutcome> {
        let signer = self.registry.resolve_signer(OPERATOR_ROLE).await?;
        let Some(pool) = self.pool else {
            info!("No pool configured for this chain, skipping gas check");
            return Ok(GasCheckOutcome::NoPool);
        };
        let Some(pair) = pool.price_pair() else {
            info!("No price-discovery pair for this chain, skipping gas check");
            return Ok(GasCheckOutcome::NoPool);
        };

        let native = self.balances.get_balance(AssetId::Native, signer.address).await?;
        let stable_meta = self.balances.token_metadata(pool.stable_asset).await?;

        let reserves = self.amm.pair_reserves(pair).await?;
        let price = native_price_usd(&reserves, pool.stable_asset, stable_meta.decimals)?;
        let native_units = to_decimal_units(native.raw, NATIVE_DECIMALS)?;
        let usd_value = native_units
            .checked_mul(price)
            .ok_or(FundError::Overflow("gas valuation"))?;
        info!(
            "Operator gas: {} {} (${:.2} at ${:.2}/{})",
            native_units,
            native.symbol,
            usd_value,
            price,
            native.symbol
        );

        if usd_value >= self.cycle.low_gas_usd_threshold {
            return Ok(GasCheckOutcome::Healthy { usd_value });
        }

        // Only a low balance needs the stable side.
        let stable_balance = self
            .balances
            .get_balance(AssetId::Token(pool.stable_asset), signer.address)
            .await?;
        let required = to_raw_units(self.cycle.gas_swap_amount, stable_balance.decimals)?;
        if stable_balance.raw < required {
            warn!(
                "Operator gas low (${:.2}) but only {} {} available, {} needed for swap",
                usd_value, stable_balance.raw, stable_balance.symbol, required
            );
            return Ok(GasCheckOutcome::InsufficientStable {
                available: stable_balance.raw,
                required,
            });
        }

        let receipt = self
            .swapper
            .swap_to_native(
                &pool,
                pool.stable_asset,
                required,
                &signer,
                self.cycle.slippage_bps,
                self.cycle.swap_deadline_seconds,
            )
            .await?;
        let new_balance = self
            .balances
            .get_balance(AssetId::Native, signer.address)
            .await?
            .raw;
        info!(
            "Gas swap confirmed tx={:?}, operator now holds {} {}",
            receipt.tx_hash,
            to_decimal_units(new_balance, NATIVE_DECIMALS)?,
            native.symbol
        );
        Ok(GasCheckOutcome::Swapped {
            receipt,
            new_balance,
        })
    }
}
