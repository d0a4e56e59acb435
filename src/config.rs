//! Configuration
//!
//! Loaded once at startup, validated, and handed to every component by
//! reference. Nothing reads configuration from ambient state.

use crate::error::{FundError, FundResult};
use crate::types::Address;
use alloy::primitives::address;
use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

pub const SEPOLIA_CHAIN_ID: u64 = 11_155_111;
pub const MAINNET_CHAIN_ID: u64 = 1;
pub const DEFAULT_SLIPPAGE_BPS: u32 = 200;
pub const DEFAULT_SWAP_DEADLINE_SECONDS: u64 = 1_200;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub blockchain: BlockchainConfig,
    #[serde(default)]
    pub fund_cycle: FundCycleConfig,
    #[serde(default)]
    pub revenue_share: RevenueShareConfig,
    /// Chain id (as string key) to pool configuration, taking precedence
    /// over the built-in defaults.
    #[serde(default)]
    pub pool_overrides: HashMap<String, ChainPoolConfig>,
    #[serde(default = "default_recipient")]
    pub default_recipient: String,
    #[serde(default = "default_addressbook")]
    pub addressbook: PathBuf,
    #[serde(default = "default_agent_socket")]
    pub agent_socket: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockchainConfig {
    #[serde(default = "default_chain_id")]
    pub chain_id: u64,
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,
    pub subscription_contract: Address,
    /// Stable asset used for buffers and gas swaps. When absent the
    /// ledger's designated stable asset is used.
    #[serde(default)]
    pub usdc_address: Option<Address>,
    #[serde(default = "default_native_symbol")]
    pub native_symbol: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FundCycleConfig {
    pub fund_cycle_interval_seconds: u64,
    pub gas_check_interval_seconds: u64,
    pub min_withdrawal_usd: Decimal,
    pub low_gas_usd_threshold: Decimal,
    /// Stable units swapped into native gas when the operator runs low.
    pub gas_swap_amount: Decimal,
    /// Stable units the operator wallet should hold.
    pub stable_buffer_target: Decimal,
    /// Native units: the hot wallet floor and the amount sent to restore it.
    pub hot_gas_target: Decimal,
    pub slippage_bps: u32,
    pub swap_deadline_seconds: u64,
}

impl Default for FundCycleConfig {
    fn default() -> Self {
        Self {
            fund_cycle_interval_seconds: 86_400,
            gas_check_interval_seconds: 3_600,
            min_withdrawal_usd: dec(10, 0),
            low_gas_usd_threshold: dec(5, 0),
            gas_swap_amount: dec(10, 0),
            stable_buffer_target: dec(50, 0),
            // 0.0005 native, roughly $1 of gas
            hot_gas_target: dec(5, 4),
            slippage_bps: DEFAULT_SLIPPAGE_BPS,
            swap_deadline_seconds: DEFAULT_SWAP_DEADLINE_SECONDS,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RevenueShareConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub total_percent: Decimal,
    #[serde(default)]
    pub recipients: Vec<RevenueRecipient>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RevenueRecipient {
    pub role: String,
    pub percent: Decimal,
}

/// Percentage to basis points, rounded half away from zero.
pub fn percent_to_bps(percent: Decimal) -> FundResult<u64> {
    use rust_decimal::prelude::ToPrimitive;
    (percent * Decimal::ONE_HUNDRED)
        .round()
        .to_u64()
        .ok_or_else(|| {
            FundError::ConfigurationInvalid(format!("percentage {percent} out of range"))
        })
}

impl RevenueShareConfig {
    pub fn is_active(&self) -> bool {
        self.enabled && !self.recipients.is_empty()
    }

    pub fn total_bps(&self) -> FundResult<u64> {
        percent_to_bps(self.total_percent)
    }

    /// Recipient basis points must add up to the total, otherwise shares
    /// are silently skewed against `total_percent`.
    pub fn validate(&self) -> FundResult<()> {
        if !self.enabled {
            return Ok(());
        }
        if self.total_percent <= Decimal::ZERO || self.total_percent > Decimal::ONE_HUNDRED {
            return Err(FundError::ConfigurationInvalid(format!(
                "revenue share total_percent {} must be in (0, 100]",
                self.total_percent
            )));
        }

        let mut seen = HashSet::new();
        let mut sum_bps = 0u64;
        for recipient in &self.recipients {
            if recipient.percent <= Decimal::ZERO {
                return Err(FundError::ConfigurationInvalid(format!(
                    "revenue share for '{}' must be positive",
                    recipient.role
                )));
            }
            if !seen.insert(recipient.role.as_str()) {
                return Err(FundError::ConfigurationInvalid(format!(
                    "revenue share recipient '{}' listed twice",
                    recipient.role
                )));
            }
            sum_bps += percent_to_bps(recipient.percent)?;
        }

        let total_bps = self.total_bps()?;
        if !self.recipients.is_empty() && sum_bps != total_bps {
            return Err(FundError::ConfigurationInvalid(format!(
                "revenue share recipients sum to {sum_bps} bps but total_percent is {total_bps} bps"
            )));
        }
        Ok(())
    }
}

/// Per-chain AMM configuration used for gas swaps and price discovery.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChainPoolConfig {
    pub router: Address,
    pub wrapped_native: Address,
    pub stable_asset: Address,
    #[serde(default)]
    pub stable_native_pair: Option<Address>,
}

impl ChainPoolConfig {
    /// The pair used for price discovery, if the chain has a usable one.
    pub fn price_pair(&self) -> Option<Address> {
        self.stable_native_pair.filter(|pair| !pair.is_zero())
    }
}

fn builtin_pool(chain_id: u64) -> Option<ChainPoolConfig> {
    match chain_id {
        // Uniswap V2
        MAINNET_CHAIN_ID => Some(ChainPoolConfig {
            router: address!("7a250d5630B4cF539739dF2C5dAcb4c659F2488D"),
            wrapped_native: address!("C02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2"),
            stable_asset: address!("A0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48"),
            stable_native_pair: Some(address!("B4e16d0168e52d35CaCD2c6185b44281Ec28C9Dc")),
        }),
        // No liquid pool on the testnet
        SEPOLIA_CHAIN_ID => Some(ChainPoolConfig {
            router: Address::ZERO,
            wrapped_native: address!("fFf9976782d46CC05630D1f6eBAb18b2324d6B14"),
            stable_asset: Address::ZERO,
            stable_native_pair: None,
        }),
        _ => None,
    }
}

impl Config {
    pub async fn load(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config =
            serde_json::from_str(&content).context("Failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> FundResult<()> {
        self.revenue_share.validate()?;
        if self.fund_cycle.slippage_bps >= 10_000 {
            return Err(FundError::ConfigurationInvalid(format!(
                "slippage_bps {} must be below 10000",
                self.fund_cycle.slippage_bps
            )));
        }
        if self.default_recipient.trim().is_empty() {
            return Err(FundError::ConfigurationInvalid(
                "default_recipient must name a role".to_string(),
            ));
        }
        for key in self.pool_overrides.keys() {
            key.parse::<u64>().map_err(|_| {
                FundError::ConfigurationInvalid(format!(
                    "pool override key '{key}' is not a chain id"
                ))
            })?;
        }
        Ok(())
    }

    /// Override for this chain, else the built-in default.
    pub fn pool_for_chain(&self) -> Option<ChainPoolConfig> {
        let chain_id = self.blockchain.chain_id;
        self.pool_overrides
            .iter()
            .find(|(key, _)| key.parse::<u64>().ok() == Some(chain_id))
            .map(|(_, pool)| *pool)
            .or_else(|| builtin_pool(chain_id))
    }
}

fn dec(num: i64, scale: u32) -> Decimal {
    Decimal::new(num, scale)
}

fn default_chain_id() -> u64 {
    SEPOLIA_CHAIN_ID
}

fn default_rpc_url() -> String {
    "https://ethereum-sepolia-rpc.publicnode.com".to_string()
}

fn default_native_symbol() -> String {
    "ETH".to_string()
}

fn default_recipient() -> String {
    "admin".to_string()
}

fn default_addressbook() -> PathBuf {
    PathBuf::from("addressbook.json")
}

fn default_agent_socket() -> PathBuf {
    PathBuf::from("/run/fund-agent.sock")
}
