//! Transaction Emitter
//!
//! Signs and submits value transfers between wallets on behalf of a role,
//! waiting for confirmation before returning.

use crate::chain::ChainClient;
use crate::error::{FundError, FundResult};
use crate::role_registry::RoleRegistry;
use crate::types::{truncate_address, Address, AssetId, B256, U256};
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRecord {
    pub from_role: String,
    pub from: Address,
    pub to: Address,
    pub asset: AssetId,
    pub amount: U256,
    pub tx_hash: B256,
}

impl TransferRecord {
    pub fn format_log(&self) -> String {
        format!(
            "{} {} from {} ({}) to {} tx={:?}",
            self.amount,
            self.asset,
            self.from_role,
            truncate_address(&self.from),
            truncate_address(&self.to),
            self.tx_hash
        )
    }
}

pub struct TxEmitter {
    chain: Arc<dyn ChainClient>,
    registry: Arc<RoleRegistry>,
}

impl TxEmitter {
    pub fn new(chain: Arc<dyn ChainClient>, registry: Arc<RoleRegistry>) -> Self {
        Self { chain, registry }
    }

    /// Transfer `amount` of `asset` from the wallet behind `from_role`.
    pub async fn emit_transfer(
        &self,
        from_role: &str,
        to: Address,
        asset: AssetId,
        amount: U256,
    ) -> FundResult<TransferRecord> {
        if amount.is_zero() {
            return Err(FundError::InsufficientFunds(format!(
                "refusing zero-amount transfer of {asset} from '{from_role}'"
            )));
        }
        let signer = self.registry.resolve_signer(from_role).await?;

        let receipt = self
            .chain
            .transfer(&signer, asset, to, amount)
            .await?
            .ensure_success()?;

        let record = TransferRecord {
            from_role: from_role.to_string(),
            from: signer.address,
            to,
            asset,
            amount,
            tx_hash: receipt.tx_hash,
        };
        info!("TRANSFER CONFIRMED: {}", record.format_log());
        Ok(record)
    }
}
