//! Core data types for the fund orchestrator

use crate::error::{FundError, FundResult};
pub use alloy::primitives::{Address, B256, U256};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const NATIVE_DECIMALS: u8 = 18;

/// A fungible asset: the chain's native gas asset or an ERC-20 contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AssetId {
    Native,
    Token(Address),
}

impl AssetId {
    pub fn token_address(&self) -> Option<Address> {
        match self {
            AssetId::Native => None,
            AssetId::Token(addr) => Some(*addr),
        }
    }

    pub fn is_native(&self) -> bool {
        matches!(self, AssetId::Native)
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssetId::Native => write!(f, "native"),
            AssetId::Token(addr) => write!(f, "{addr}"),
        }
    }
}

impl FromStr for AssetId {
    type Err = FundError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "native" | "eth" => Ok(AssetId::Native),
            other => other
                .parse::<Address>()
                .map(AssetId::Token)
                .map_err(|_| FundError::InvalidAddress(s.to_string())),
        }
    }
}

impl Serialize for AssetId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for AssetId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Opaque signing key reference as handed out by the privileged agent.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyHandle(String);

impl KeyHandle {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for KeyHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("KeyHandle([REDACTED])")
    }
}

/// A role resolved to something that can sign transactions.
#[derive(Debug, Clone)]
pub struct Signer {
    pub role: String,
    pub address: Address,
    pub key: KeyHandle,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenMetadata {
    pub symbol: String,
    pub decimals: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawBalance {
    pub raw: U256,
    pub decimals: u8,
    pub symbol: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssetBalance {
    pub asset: AssetId,
    pub symbol: String,
    pub decimals: u8,
    pub raw: U256,
    pub usd_value: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxReceipt {
    pub tx_hash: B256,
    pub success: bool,
}

impl TxReceipt {
    /// Turns a reverted receipt into an error.
    pub fn ensure_success(self) -> FundResult<Self> {
        if self.success {
            Ok(self)
        } else {
            Err(FundError::TransactionReverted(format!("{:?}", self.tx_hash)))
        }
    }
}

/// A payment slot registered on the subscription ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaymentSlot {
    pub id: U256,
    pub asset: Address,
    pub active: bool,
}

/// An accepted asset after de-duplicating payment slots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptedAsset {
    pub asset: Address,
    pub slot_id: U256,
    pub price_cents: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PairReserves {
    pub token0: Address,
    pub token1: Address,
    pub reserve0: U256,
    pub reserve1: U256,
}

impl PairReserves {
    /// Returns `(reserve_in, reserve_out)` for a swap selling `asset_in`.
    pub fn oriented(&self, asset_in: Address) -> FundResult<(U256, U256)> {
        if asset_in == self.token0 {
            Ok((self.reserve0, self.reserve1))
        } else if asset_in == self.token1 {
            Ok((self.reserve1, self.reserve0))
        } else {
            Err(FundError::not_found(format!(
                "asset {asset_in} in pair {}/{}",
                self.token0, self.token1
            )))
        }
    }
}

pub fn truncate_address(address: &Address) -> String {
    let full = address.to_string();
    if full.len() <= 10 {
        return full;
    }
    format!("{}...{}", &full[..6], &full[full.len() - 4..])
}

fn pow10(decimals: u8) -> FundResult<U256> {
    U256::from(10u64)
        .checked_pow(U256::from(decimals))
        .ok_or(FundError::Overflow("decimal scale"))
}

/// Converts a raw integer amount into whole units.
pub fn to_decimal_units(raw: U256, decimals: u8) -> FundResult<Decimal> {
    let scale = pow10(decimals)?;
    let whole = raw / scale;
    let frac = raw % scale;
    let whole = u128::try_from(whole)
        .ok()
        .and_then(|w| i128::try_from(w).ok())
        .and_then(|w| Decimal::try_from_i128_with_scale(w, 0).ok())
        .ok_or(FundError::Overflow("decimal conversion"))?;

    // Keep at most 28 fractional digits so the mantissa fits.
    let (frac, frac_scale) = if decimals > 28 {
        (frac / pow10(decimals - 28)?, 28u32)
    } else {
        (frac, u32::from(decimals))
    };
    let frac = u128::try_from(frac)
        .ok()
        .and_then(|f| i128::try_from(f).ok())
        .and_then(|f| Decimal::try_from_i128_with_scale(f, frac_scale).ok())
        .ok_or(FundError::Overflow("decimal conversion"))?;

    whole
        .checked_add(frac)
        .ok_or(FundError::Overflow("decimal conversion"))
}

/// Converts whole units into a raw integer amount, truncating extra precision.
pub fn to_raw_units(amount: Decimal, decimals: u8) -> FundResult<U256> {
    if amount.is_sign_negative() {
        return Err(FundError::ConfigurationInvalid(format!(
            "negative amount {amount}"
        )));
    }
    let whole = amount.trunc();
    let frac = amount - whole;
    let whole = whole.to_u128().ok_or(FundError::Overflow("raw conversion"))?;
    let raw_whole = U256::from(whole)
        .checked_mul(pow10(decimals)?)
        .ok_or(FundError::Overflow("raw conversion"))?;

    let frac = frac.trunc_with_scale(frac.scale().min(u32::from(decimals)));
    let frac_digits = frac.mantissa().unsigned_abs();
    let frac_raw = U256::from(frac_digits) * pow10(decimals - frac.scale() as u8)?;

    raw_whole
        .checked_add(frac_raw)
        .ok_or(FundError::Overflow("raw conversion"))
}
