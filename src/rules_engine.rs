//! Rules Engine
//!
//! Pure decisions behind the fund cycle: when to withdraw, when and how much
//! to top up, and how revenue is split. No I/O happens here, so every rule
//! is testable on plain integers.

use crate::error::{FundError, FundResult};
use crate::types::U256;
use rust_decimal::Decimal;

pub const BPS_DENOMINATOR: u64 = 10_000;

/// The operator must keep this multiple of a gas top-up after sending it.
pub const OPERATOR_GAS_RESERVE_MULTIPLE: u64 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WithdrawDecision {
    Withdraw,
    SkipZeroBalance,
    SkipBelowThreshold,
}

/// Withdraw when the escrow holds something worth at least `min_usd`.
pub fn withdrawal_decision(raw: U256, usd_value: Decimal, min_usd: Decimal) -> WithdrawDecision {
    if raw.is_zero() {
        WithdrawDecision::SkipZeroBalance
    } else if usd_value < min_usd {
        WithdrawDecision::SkipBelowThreshold
    } else {
        WithdrawDecision::Withdraw
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GasTopUpDecision {
    NotNeeded,
    TopUp(U256),
    OperatorReserveTooLow { operator_balance: U256, required: U256 },
}

pub fn gas_topup_decision(
    hot_native: U256,
    operator_native: U256,
    target: U256,
) -> GasTopUpDecision {
    if hot_native >= target {
        return GasTopUpDecision::NotNeeded;
    }
    // amount sent plus the reserve the operator keeps afterwards
    let required = target.saturating_mul(U256::from(OPERATOR_GAS_RESERVE_MULTIPLE + 1));
    if operator_native < required {
        GasTopUpDecision::OperatorReserveTooLow {
            operator_balance: operator_native,
            required,
        }
    } else {
        GasTopUpDecision::TopUp(target)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferDecision {
    AboveTarget,
    TopUp(U256),
    InsufficientHotBalance { needed: U256, available: U256 },
}

/// Send the operator's shortfall from the hot wallet, all or nothing.
pub fn buffer_decision(operator_stable: U256, target: U256, hot_stable: U256) -> BufferDecision {
    if operator_stable >= target {
        return BufferDecision::AboveTarget;
    }
    let shortfall = target - operator_stable;
    if hot_stable < shortfall {
        BufferDecision::InsufficientHotBalance {
            needed: shortfall,
            available: hot_stable,
        }
    } else {
        BufferDecision::TopUp(shortfall)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevenueSplit {
    pub total_share: U256,
    /// One share per recipient, in configured order.
    pub shares: Vec<U256>,
}

/// Splits `balance` by basis points.
///
/// `total_share = balance * total_bps / 10000`. Every recipient but the last
/// gets `total_share * bps_i / total_bps`; the last gets what is left, so
/// the shares always add up to `total_share` exactly.
pub fn split_revenue(
    balance: U256,
    total_bps: u64,
    recipient_bps: &[u64],
) -> FundResult<RevenueSplit> {
    if recipient_bps.is_empty() {
        return Err(FundError::ConfigurationInvalid(
            "revenue share has no recipients".to_string(),
        ));
    }
    if total_bps == 0 || total_bps > BPS_DENOMINATOR {
        return Err(FundError::ConfigurationInvalid(format!(
            "revenue share total of {total_bps} bps is out of range"
        )));
    }
    let sum: u64 = recipient_bps.iter().sum();
    if sum != total_bps {
        return Err(FundError::ConfigurationInvalid(format!(
            "recipient shares sum to {sum} bps, expected {total_bps} bps"
        )));
    }

    let total_share = balance
        .checked_mul(U256::from(total_bps))
        .ok_or(FundError::Overflow("revenue share"))?
        / U256::from(BPS_DENOMINATOR);

    let mut shares = Vec::with_capacity(recipient_bps.len());
    let mut distributed = U256::ZERO;
    for bps in &recipient_bps[..recipient_bps.len() - 1] {
        let share = total_share
            .checked_mul(U256::from(*bps))
            .ok_or(FundError::Overflow("revenue share"))?
            / U256::from(total_bps);
        distributed += share;
        shares.push(share);
    }
    shares.push(total_share - distributed);

    Ok(RevenueSplit {
        total_share,
        shares,
    })
}

/// `expected * (10000 - slippage_bps) / 10000`
pub fn min_amount_out(expected: U256, slippage_bps: u32) -> FundResult<U256> {
    let keep = BPS_DENOMINATOR
        .checked_sub(u64::from(slippage_bps))
        .ok_or_else(|| FundError::ConfigurationInvalid(format!("slippage of {slippage_bps} bps")))?;
    Ok(expected
        .checked_mul(U256::from(keep))
        .ok_or(FundError::Overflow("minimum output"))?
        / U256::from(BPS_DENOMINATOR))
}
