//! Collaborator seams
//!
//! Everything the engine needs from the chain, the subscription ledger and
//! the AMM goes through these traits. Every write waits for confirmation
//! before returning.

use crate::error::FundResult;
use crate::types::{
    Address, AssetId, PairReserves, PaymentSlot, Signer, TokenMetadata, TxReceipt, U256,
};
use async_trait::async_trait;

#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn native_balance(&self, owner: Address) -> FundResult<U256>;

    async fn token_balance(&self, token: Address, owner: Address) -> FundResult<U256>;

    async fn token_metadata(&self, token: Address) -> FundResult<TokenMetadata>;

    async fn allowance(&self, token: Address, owner: Address, spender: Address)
        -> FundResult<U256>;

    async fn approve(
        &self,
        signer: &Signer,
        token: Address,
        spender: Address,
        amount: U256,
    ) -> FundResult<TxReceipt>;

    async fn transfer(
        &self,
        signer: &Signer,
        asset: AssetId,
        to: Address,
        amount: U256,
    ) -> FundResult<TxReceipt>;
}

/// The subscription ledger holding collected payments.
#[async_trait]
pub trait EscrowLedger: Send + Sync {
    fn contract_address(&self) -> Address;

    async fn active_slot_ids(&self) -> FundResult<Vec<U256>>;

    async fn slot(&self, slot_id: U256) -> FundResult<PaymentSlot>;

    /// Recorded price in USD cents, `None` when the slot has no price.
    async fn slot_price_cents(&self, slot_id: U256) -> FundResult<Option<u64>>;

    async fn stable_asset(&self) -> FundResult<Address>;

    async fn set_stable_asset(&self, signer: &Signer, asset: Address) -> FundResult<TxReceipt>;

    async fn withdraw(&self, signer: &Signer, asset: Address, to: Address)
        -> FundResult<TxReceipt>;
}

#[async_trait]
pub trait AmmRouter: Send + Sync {
    async fn pair_reserves(&self, pair: Address) -> FundResult<PairReserves>;

    /// Sells `amount_in` of `path[0]` for native asset delivered to `to`.
    #[allow(clippy::too_many_arguments)]
    async fn swap_exact_tokens_for_native(
        &self,
        signer: &Signer,
        router: Address,
        amount_in: U256,
        min_out: U256,
        path: Vec<Address>,
        to: Address,
        deadline: u64,
    ) -> FundResult<TxReceipt>;
}
