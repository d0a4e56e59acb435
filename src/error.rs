//! Error taxonomy for fund movement
//!
//! Callers match on the variant to decide whether a failure is a skip, a
//! retry-on-next-tick condition or a misconfiguration.

use thiserror::Error;

pub type FundResult<T> = Result<T, FundError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FundError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("role '{0}' has no signing capability")]
    NoSigningCapability(String),

    #[error("role '{0}' is immutable")]
    ImmutableRole(String),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("insufficient funds: {0}")]
    InsufficientFunds(String),

    #[error("slippage exceeded: {0}")]
    SlippageExceeded(String),

    #[error("rpc failure: {0}")]
    RpcFailure(String),

    #[error("transaction {0} reverted")]
    TransactionReverted(String),

    #[error("invalid configuration: {0}")]
    ConfigurationInvalid(String),

    #[error("privileged agent failure: {0}")]
    AgentFailure(String),

    #[error("arithmetic overflow in {0}")]
    Overflow(&'static str),
}

impl FundError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn rpc(err: impl std::fmt::Display) -> Self {
        Self::RpcFailure(err.to_string())
    }
}
