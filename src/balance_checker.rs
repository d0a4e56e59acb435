//! Balance & Valuation Resolver
//!
//! Reads balances and values them in USD. Values are recomputed on every
//! call; nothing here caches a price.

use crate::chain::{ChainClient, EscrowLedger};
use crate::error::{FundError, FundResult};
use crate::types::{
    to_decimal_units, AcceptedAsset, Address, AssetBalance, AssetId, RawBalance, TokenMetadata,
    NATIVE_DECIMALS, U256,
};
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct BalanceChecker {
    chain: Arc<dyn ChainClient>,
    ledger: Arc<dyn EscrowLedger>,
    native_symbol: String,
    stable_override: Option<Address>,
}

impl BalanceChecker {
    pub fn new(
        chain: Arc<dyn ChainClient>,
        ledger: Arc<dyn EscrowLedger>,
        native_symbol: String,
        stable_override: Option<Address>,
    ) -> Self {
        Self {
            chain,
            ledger,
            native_symbol,
            stable_override,
        }
    }

    pub async fn get_balance(&self, asset: AssetId, wallet: Address) -> FundResult<RawBalance> {
        match asset {
            AssetId::Native => Ok(RawBalance {
                raw: self.chain.native_balance(wallet).await?,
                decimals: NATIVE_DECIMALS,
                symbol: self.native_symbol.clone(),
            }),
            AssetId::Token(token) => {
                let raw = self.chain.token_balance(token, wallet).await?;
                let meta = self.chain.token_metadata(token).await?;
                Ok(RawBalance {
                    raw,
                    decimals: meta.decimals,
                    symbol: meta.symbol,
                })
            }
        }
    }

    pub async fn token_metadata(&self, token: Address) -> FundResult<TokenMetadata> {
        self.chain.token_metadata(token).await
    }

    /// The designated stable asset: configured address, else the ledger's.
    pub async fn stable_asset(&self) -> FundResult<Address> {
        match self.stable_override {
            Some(addr) => Ok(addr),
            None => self.ledger.stable_asset().await,
        }
    }

    /// Active payment slots, de-duplicated by underlying asset. The first
    /// slot registered for an asset supplies its price.
    pub async fn list_accepted_assets(&self) -> FundResult<Vec<AcceptedAsset>> {
        let mut seen = HashSet::new();
        let mut assets = Vec::new();
        for slot_id in self.ledger.active_slot_ids().await? {
            let slot = self.ledger.slot(slot_id).await?;
            if !slot.active || slot.asset.is_zero() {
                continue;
            }
            if !seen.insert(slot.asset) {
                debug!("Slot {} shares asset {}, skipping", slot_id, slot.asset);
                continue;
            }
            let price_cents = self.ledger.slot_price_cents(slot_id).await?;
            assets.push(AcceptedAsset {
                asset: slot.asset,
                slot_id,
                price_cents,
            });
        }
        Ok(assets)
    }

    /// USD value of `raw` units of `asset`, priced from the ledger.
    pub async fn get_usd_value(
        &self,
        asset: Address,
        raw: U256,
        decimals: u8,
    ) -> FundResult<Decimal> {
        let stable = self.stable_asset().await?;
        let price_cents = self
            .list_accepted_assets()
            .await?
            .into_iter()
            .find(|accepted| accepted.asset == asset)
            .and_then(|accepted| accepted.price_cents);
        usd_value(asset, raw, decimals, stable, price_cents)
    }

    /// Every accepted asset held by `wallet`, zero balances included.
    pub async fn list_all_accepted_asset_balances(
        &self,
        wallet: Address,
    ) -> FundResult<Vec<AssetBalance>> {
        let stable = self.stable_asset().await?;
        let mut balances = Vec::new();
        for accepted in self.list_accepted_assets().await? {
            let balance = self.get_balance(AssetId::Token(accepted.asset), wallet).await?;
            let usd = usd_value(
                accepted.asset,
                balance.raw,
                balance.decimals,
                stable,
                accepted.price_cents,
            )?;
            balances.push(AssetBalance {
                asset: AssetId::Token(accepted.asset),
                symbol: balance.symbol,
                decimals: balance.decimals,
                raw: balance.raw,
                usd_value: usd,
            });
        }
        Ok(balances)
    }
}

/// Stable asset is valued 1:1. Anything else uses the ledger's cents price;
/// a missing price on a non-zero balance degrades to 1:1 with a warning.
pub fn usd_value(
    asset: Address,
    raw: U256,
    decimals: u8,
    stable: Address,
    price_cents: Option<u64>,
) -> FundResult<Decimal> {
    let units = to_decimal_units(raw, decimals)?;
    if asset == stable {
        return Ok(units);
    }
    match price_cents {
        Some(cents) => units
            .checked_mul(Decimal::from(cents))
            .map(|cents_value| cents_value / Decimal::ONE_HUNDRED)
            .ok_or(FundError::Overflow("usd valuation")),
        None if raw.is_zero() => Ok(Decimal::ZERO),
        None => {
            warn!(
                "No price recorded for {}, valuing 1:1 as stable (degraded)",
                asset
            );
            Ok(units)
        }
    }
}
