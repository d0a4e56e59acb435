//! AMM Swap Executor
//!
//! Converts a token into the chain's native asset through a Uniswap-V2
//! style constant-product pool. Failed swaps are never retried here; the
//! caller's next tick is the retry.

use crate::chain::{AmmRouter, ChainClient};
use crate::config::ChainPoolConfig;
use crate::error::{FundError, FundResult};
use crate::rules_engine::min_amount_out;
use crate::types::{truncate_address, Address, PairReserves, Signer, B256, U256};
use std::sync::Arc;
use tracing::{info, warn};

/// Uniswap V2 charges 0.3% on the input amount.
const FEE_NUMERATOR: u64 = 997;
const FEE_DENOMINATOR: u64 = 1_000;

/// Expected output for selling `amount_in` of `asset_in` into the pair.
pub fn quote(reserves: &PairReserves, asset_in: Address, amount_in: U256) -> FundResult<U256> {
    let (reserve_in, reserve_out) = reserves.oriented(asset_in)?;
    if reserve_in.is_zero() || reserve_out.is_zero() {
        return Err(FundError::SlippageExceeded(format!(
            "pair {}/{} has no liquidity",
            reserves.token0, reserves.token1
        )));
    }
    let overflow = || FundError::Overflow("constant product quote");
    let amount_in_with_fee = amount_in
        .checked_mul(U256::from(FEE_NUMERATOR))
        .ok_or_else(overflow)?;
    let numerator = amount_in_with_fee
        .checked_mul(reserve_out)
        .ok_or_else(overflow)?;
    let denominator = reserve_in
        .checked_mul(U256::from(FEE_DENOMINATOR))
        .and_then(|scaled| scaled.checked_add(amount_in_with_fee))
        .ok_or_else(overflow)?;
    Ok(numerator / denominator)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapReceipt {
    pub tx_hash: B256,
    pub amount_in: U256,
    pub expected_out: U256,
    pub min_out: U256,
    pub approval_tx: Option<B256>,
}

pub struct SwapExecutor {
    chain: Arc<dyn ChainClient>,
    amm: Arc<dyn AmmRouter>,
}

impl SwapExecutor {
    pub fn new(chain: Arc<dyn ChainClient>, amm: Arc<dyn AmmRouter>) -> Self {
        Self { chain, amm }
    }

    pub async fn quote_pool(
        &self,
        pool: &ChainPoolConfig,
        asset_in: Address,
        amount_in: U256,
    ) -> FundResult<U256> {
        let pair = pool
            .price_pair()
            .ok_or_else(|| FundError::not_found("pool pair for this chain"))?;
        let reserves = self.amm.pair_reserves(pair).await?;
        quote(&reserves, asset_in, amount_in)
    }

    /// Raises the router allowance to the maximum when it is short, as its
    /// own confirmed transaction.
    async fn ensure_allowance(
        &self,
        signer: &Signer,
        token: Address,
        spender: Address,
        amount: U256,
    ) -> FundResult<Option<B256>> {
        let current = self.chain.allowance(token, signer.address, spender).await?;
        if current >= amount {
            return Ok(None);
        }

        info!(
            "Approving router {} to spend {} for {}",
            truncate_address(&spender),
            token,
            signer.role
        );
        let receipt = self
            .chain
            .approve(signer, token, spender, U256::MAX)
            .await?
            .ensure_success()?;

        let after = self.chain.allowance(token, signer.address, spender).await?;
        if after < amount {
            return Err(FundError::InsufficientFunds(format!(
                "allowance {after} still below {amount} after approval"
            )));
        }
        Ok(Some(receipt.tx_hash))
    }

    /// Sells `amount_in` of `asset_in` for native asset delivered to the signer.
    pub async fn swap_to_native(
        &self,
        pool: &ChainPoolConfig,
        asset_in: Address,
        amount_in: U256,
        signer: &Signer,
        slippage_bps: u32,
        deadline_seconds: u64,
    ) -> FundResult<SwapReceipt> {
        let balance = self.chain.token_balance(asset_in, signer.address).await?;
        if balance < amount_in {
            return Err(FundError::InsufficientFunds(format!(
                "{} holds {balance} of {asset_in}, swap needs {amount_in}",
                signer.role
            )));
        }

        let approval_tx = self
            .ensure_allowance(signer, asset_in, pool.router, amount_in)
            .await?;

        let expected_out = self.quote_pool(pool, asset_in, amount_in).await?;
        let min_out = min_amount_out(expected_out, slippage_bps)?;
        let deadline =
            (chrono::Utc::now().timestamp().max(0) as u64).saturating_add(deadline_seconds);

        info!(
            "Swapping {} of {} for native (expected {}, min {})",
            amount_in, asset_in, expected_out, min_out
        );
        let receipt = self
            .amm
            .swap_exact_tokens_for_native(
                signer,
                pool.router,
                amount_in,
                min_out,
                vec![asset_in, pool.wrapped_native],
                signer.address,
                deadline,
            )
            .await?;
        if !receipt.success {
            warn!("Swap {:?} reverted below minimum output {}", receipt.tx_hash, min_out);
            return Err(FundError::SlippageExceeded(format!(
                "swap {:?} reverted with min_out {min_out}",
                receipt.tx_hash
            )));
        }

        Ok(SwapReceipt {
            tx_hash: receipt.tx_hash,
            amount_in,
            expected_out,
            min_out,
            approval_tx,
        })
    }
}
