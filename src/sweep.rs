//! Bulk sweep
//!
//! Diagnostic operation, not part of the scheduled cycle: empties one asset
//! from several wallets into a single destination. Transfers run in
//! parallel, one per source wallet; each wallet signs its own transaction
//! so no two branches share a nonce sequence.

use crate::balance_checker::BalanceChecker;
use crate::error::{FundError, FundResult};
use crate::tx_emitter::{TransferRecord, TxEmitter};
use crate::types::{Address, AssetId, U256};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum SweepOutcome {
    Sent(TransferRecord),
    NothingToSweep,
    Failed(FundError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct WalletSweep {
    pub role: String,
    pub outcome: SweepOutcome,
}

/// Sweeps `asset` from every role in `sources` to `destination`. For the
/// native asset `native_reserve` is left behind to pay for the transfer.
pub async fn sweep_all(
    emitter: Arc<TxEmitter>,
    balances: Arc<BalanceChecker>,
    sources: Vec<(String, Address)>,
    asset: AssetId,
    destination: Address,
    native_reserve: U256,
) -> FundResult<Vec<WalletSweep>> {
    let mut signers = HashSet::new();
    for (role, address) in &sources {
        if !signers.insert(*address) {
            return Err(FundError::ConfigurationInvalid(format!(
                "role '{role}' shares its wallet with another source"
            )));
        }
    }

    let mut tasks = JoinSet::new();
    for (role, address) in sources {
        if address == destination {
            continue;
        }
        let emitter = emitter.clone();
        let balances = balances.clone();
        tasks.spawn(async move {
            let outcome = sweep_wallet(
                &emitter,
                &balances,
                &role,
                address,
                asset,
                destination,
                native_reserve,
            )
            .await
            .unwrap_or_else(|e| {
                warn!("Sweep from '{}' failed: {}", role, e);
                SweepOutcome::Failed(e)
            });
            WalletSweep { role, outcome }
        });
    }

    let mut results = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(result) => results.push(result),
            Err(e) => warn!("Sweep task aborted: {}", e),
        }
    }
    results.sort_by(|a, b| a.role.cmp(&b.role));
    info!("Bulk sweep finished for {} wallets", results.len());
    Ok(results)
}

async fn sweep_wallet(
    emitter: &TxEmitter,
    balances: &BalanceChecker,
    role: &str,
    address: Address,
    asset: AssetId,
    destination: Address,
    native_reserve: U256,
) -> FundResult<SweepOutcome> {
    let balance = balances.get_balance(asset, address).await?.raw;
    let amount = if asset.is_native() {
        balance.saturating_sub(native_reserve)
    } else {
        balance
    };
    if amount.is_zero() {
        return Ok(SweepOutcome::NothingToSweep);
    }
    let record = emitter.emit_transfer(role, destination, asset, amount).await?;
    Ok(SweepOutcome::Sent(record))
}
