//! Fund Orchestrator
//!
//! Moves subscription revenue out of an on-chain ledger through an
//! intermediary hot wallet, tops up operating buffers, pays revenue shares
//! and keeps the operator funded with gas.

pub mod agent;
pub mod balance_checker;
pub mod chain;
pub mod config;
pub mod distribution;
pub mod engine;
pub mod error;
pub mod evm;
pub mod gas_monitor;
pub mod monitor;
pub mod role_registry;
pub mod rules_engine;
pub mod scheduler;
pub mod state_manager;
pub mod swap;
pub mod sweep;
pub mod tx_emitter;
pub mod types;
pub mod withdrawal;
