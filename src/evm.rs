//! JSON-RPC backed collaborators
//!
//! Implements the chain, ledger and AMM seams against an EVM node with
//! `alloy`. Reads share one provider; writes build a signing provider for
//! the role that is sending.

use crate::chain::{AmmRouter, ChainClient, EscrowLedger};
use crate::error::{FundError, FundResult};
use crate::types::{
    Address, AssetId, PairReserves, PaymentSlot, Signer, TokenMetadata, TxReceipt, U256,
};
use alloy::network::{EthereumWallet, TransactionBuilder};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::rpc::types::TransactionRequest;
use alloy::signers::local::PrivateKeySigner;
use alloy::sol;
use alloy::transports::http::reqwest::Url;
use async_trait::async_trait;
use tracing::debug;

sol! {
    #[allow(missing_docs)]
    #[sol(rpc)]
    interface IERC20 {
        function balanceOf(address owner) external view returns (uint256);
        function decimals() external view returns (uint8);
        function symbol() external view returns (string);
        function allowance(address owner, address spender) external view returns (uint256);
        function approve(address spender, uint256 amount) external returns (bool);
        function transfer(address to, uint256 amount) external returns (bool);
    }
}

sol! {
    #[allow(missing_docs)]
    #[sol(rpc)]
    interface ISubscriptionLedger {
        function getActivePaymentSlotIds() external view returns (uint256[] memory);
        function paymentSlots(uint256 slotId) external view returns (address token, bool active);
        function slotPriceUsdCents(uint256 slotId) external view returns (uint256);
        function stableToken() external view returns (address);
        function setStableToken(address token) external;
        function withdraw(address token, address to) external;
    }
}

sol! {
    #[allow(missing_docs)]
    #[sol(rpc)]
    interface IUniswapV2Pair {
        function token0() external view returns (address);
        function token1() external view returns (address);
        function getReserves() external view returns (uint112 reserve0, uint112 reserve1, uint32 blockTimestampLast);
    }
}

sol! {
    #[allow(missing_docs)]
    #[sol(rpc)]
    interface IUniswapV2Router02 {
        function swapExactTokensForETH(
            uint256 amountIn,
            uint256 amountOutMin,
            address[] calldata path,
            address to,
            uint256 deadline
        ) external returns (uint256[] memory amounts);
    }
}

pub struct EvmClient {
    rpc_url: Url,
    reader: DynProvider,
    ledger_address: Address,
}

impl EvmClient {
    pub fn new(rpc_url: &str, ledger_address: Address) -> FundResult<Self> {
        let rpc_url: Url = rpc_url
            .parse()
            .map_err(|e| FundError::ConfigurationInvalid(format!("rpc url '{rpc_url}': {e}")))?;
        let reader = ProviderBuilder::new().connect_http(rpc_url.clone()).erased();
        Ok(Self {
            rpc_url,
            reader,
            ledger_address,
        })
    }

    fn signing_provider(&self, signer: &Signer) -> FundResult<DynProvider> {
        let local: PrivateKeySigner = signer
            .key
            .expose()
            .parse()
            .map_err(|_| FundError::NoSigningCapability(signer.role.clone()))?;
        if local.address() != signer.address {
            return Err(FundError::NoSigningCapability(format!(
                "{} (key does not match {})",
                signer.role, signer.address
            )));
        }
        Ok(ProviderBuilder::new()
            .wallet(EthereumWallet::from(local))
            .connect_http(self.rpc_url.clone())
            .erased())
    }
}

fn to_receipt(receipt: alloy::rpc::types::TransactionReceipt) -> TxReceipt {
    TxReceipt {
        tx_hash: receipt.transaction_hash,
        success: receipt.status(),
    }
}

#[async_trait]
impl ChainClient for EvmClient {
    async fn native_balance(&self, owner: Address) -> FundResult<U256> {
        self.reader.get_balance(owner).await.map_err(FundError::rpc)
    }

    async fn token_balance(&self, token: Address, owner: Address) -> FundResult<U256> {
        IERC20::new(token, &self.reader)
            .balanceOf(owner)
            .call()
            .await
            .map_err(FundError::rpc)
    }

    async fn token_metadata(&self, token: Address) -> FundResult<TokenMetadata> {
        let erc20 = IERC20::new(token, &self.reader);
        let decimals = erc20.decimals().call().await.map_err(FundError::rpc)?;
        let symbol = erc20.symbol().call().await.map_err(FundError::rpc)?;
        Ok(TokenMetadata { symbol, decimals })
    }

    async fn allowance(
        &self,
        token: Address,
        owner: Address,
        spender: Address,
    ) -> FundResult<U256> {
        IERC20::new(token, &self.reader)
            .allowance(owner, spender)
            .call()
            .await
            .map_err(FundError::rpc)
    }

    async fn approve(
        &self,
        signer: &Signer,
        token: Address,
        spender: Address,
        amount: U256,
    ) -> FundResult<TxReceipt> {
        let provider = self.signing_provider(signer)?;
        let pending = IERC20::new(token, &provider)
            .approve(spender, amount)
            .send()
            .await
            .map_err(FundError::rpc)?;
        let receipt = pending.get_receipt().await.map_err(FundError::rpc)?;
        Ok(to_receipt(receipt))
    }

    async fn transfer(
        &self,
        signer: &Signer,
        asset: AssetId,
        to: Address,
        amount: U256,
    ) -> FundResult<TxReceipt> {
        let provider = self.signing_provider(signer)?;
        let receipt = match asset {
            AssetId::Native => {
                let tx = TransactionRequest::default().with_to(to).with_value(amount);
                provider
                    .send_transaction(tx)
                    .await
                    .map_err(FundError::rpc)?
                    .get_receipt()
                    .await
                    .map_err(FundError::rpc)?
            }
            AssetId::Token(token) => IERC20::new(token, &provider)
                .transfer(to, amount)
                .send()
                .await
                .map_err(FundError::rpc)?
                .get_receipt()
                .await
                .map_err(FundError::rpc)?,
        };
        Ok(to_receipt(receipt))
    }
}

#[async_trait]
impl EscrowLedger for EvmClient {
    fn contract_address(&self) -> Address {
        self.ledger_address
    }

    async fn active_slot_ids(&self) -> FundResult<Vec<U256>> {
        ISubscriptionLedger::new(self.ledger_address, &self.reader)
            .getActivePaymentSlotIds()
            .call()
            .await
            .map_err(FundError::rpc)
    }

    async fn slot(&self, slot_id: U256) -> FundResult<PaymentSlot> {
        let slot = ISubscriptionLedger::new(self.ledger_address, &self.reader)
            .paymentSlots(slot_id)
            .call()
            .await
            .map_err(FundError::rpc)?;
        Ok(PaymentSlot {
            id: slot_id,
            asset: slot.token,
            active: slot.active,
        })
    }

    async fn slot_price_cents(&self, slot_id: U256) -> FundResult<Option<u64>> {
        let cents = ISubscriptionLedger::new(self.ledger_address, &self.reader)
            .slotPriceUsdCents(slot_id)
            .call()
            .await
            .map_err(FundError::rpc)?;
        if cents.is_zero() {
            return Ok(None);
        }
        u64::try_from(cents)
            .map(Some)
            .map_err(|_| FundError::Overflow("slot price"))
    }

    async fn stable_asset(&self) -> FundResult<Address> {
        ISubscriptionLedger::new(self.ledger_address, &self.reader)
            .stableToken()
            .call()
            .await
            .map_err(FundError::rpc)
    }

    async fn set_stable_asset(&self, signer: &Signer, asset: Address) -> FundResult<TxReceipt> {
        let provider = self.signing_provider(signer)?;
        let receipt = ISubscriptionLedger::new(self.ledger_address, &provider)
            .setStableToken(asset)
            .send()
            .await
            .map_err(FundError::rpc)?
            .get_receipt()
            .await
            .map_err(FundError::rpc)?;
        Ok(to_receipt(receipt))
    }

    async fn withdraw(
        &self,
        signer: &Signer,
        asset: Address,
        to: Address,
    ) -> FundResult<TxReceipt> {
        let provider = self.signing_provider(signer)?;
        debug!("ledger.withdraw({}, {})", asset, to);
        let receipt = ISubscriptionLedger::new(self.ledger_address, &provider)
            .withdraw(asset, to)
            .send()
            .await
            .map_err(FundError::rpc)?
            .get_receipt()
            .await
            .map_err(FundError::rpc)?;
        Ok(to_receipt(receipt))
    }
}

#[async_trait]
impl AmmRouter for EvmClient {
    async fn pair_reserves(&self, pair: Address) -> FundResult<PairReserves> {
        let contract = IUniswapV2Pair::new(pair, &self.reader);
        let token0 = contract.token0().call().await.map_err(FundError::rpc)?;
        let token1 = contract.token1().call().await.map_err(FundError::rpc)?;
        let reserves = contract.getReserves().call().await.map_err(FundError::rpc)?;
        Ok(PairReserves {
            token0,
            token1,
            reserve0: U256::from(reserves.reserve0),
            reserve1: U256::from(reserves.reserve1),
        })
    }

    async fn swap_exact_tokens_for_native(
        &self,
        signer: &Signer,
        router: Address,
        amount_in: U256,
        min_out: U256,
        path: Vec<Address>,
        to: Address,
        deadline: u64,
    ) -> FundResult<TxReceipt> {
        let provider = self.signing_provider(signer)?;
        let pending = IUniswapV2Router02::new(router, &provider)
            .swapExactTokensForETH(amount_in, min_out, path, to, U256::from(deadline))
            .send()
            .await
            .map_err(|e| {
                // Gas estimation surfaces the router's revert reason.
                let message = e.to_string();
                if message.contains("INSUFFICIENT_OUTPUT_AMOUNT") {
                    FundError::SlippageExceeded(message)
                } else {
                    FundError::RpcFailure(message)
                }
            })?;
        let receipt = pending.get_receipt().await.map_err(FundError::rpc)?;
        Ok(to_receipt(receipt))
    }
}
