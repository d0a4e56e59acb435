#![allow(dead_code)]

use async_trait::async_trait;
use fund_orchestrator::agent::{GeneratedKey, PrivilegedAgent};
use fund_orchestrator::chain::{AmmRouter, ChainClient, EscrowLedger};
use fund_orchestrator::config::Config;
use fund_orchestrator::engine::FundEngine;
use fund_orchestrator::error::{FundError, FundResult};
use fund_orchestrator::role_registry::{RoleEntry, RoleRegistry};
use fund_orchestrator::swap::quote;
use fund_orchestrator::types::{
    Address, AssetId, KeyHandle, PairReserves, PaymentSlot, Signer, TokenMetadata, TxReceipt,
    B256, U256,
};
use serde_json::json;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub fn addr(n: u8) -> Address {
    Address::with_last_byte(n)
}

pub const OPERATOR: u8 = 0x01;
pub const HOT: u8 = 0x02;
pub const ADMIN: u8 = 0x03;
pub const DEV: u8 = 0x04;
pub const BROKER: u8 = 0x05;
pub const ESCROW: u8 = 0xE0;
pub const USDC: u8 = 0x10;
pub const DAI: u8 = 0x11;
pub const WETH: u8 = 0x20;
pub const PAIR: u8 = 0x30;
pub const ROUTER: u8 = 0x31;

/// `n` whole units at `decimals`.
pub fn units(n: u64, decimals: u8) -> U256 {
    U256::from(n) * U256::from(10u64).pow(U256::from(decimals))
}

pub fn usdc(n: u64) -> U256 {
    units(n, 6)
}

pub fn eth(n: u64) -> U256 {
    units(n, 18)
}

#[derive(Debug, Clone, PartialEq)]
pub struct Transfer {
    pub from: Address,
    pub to: Address,
    pub asset: AssetId,
    pub amount: U256,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Swap {
    pub amount_in: U256,
    pub min_out: U256,
    pub path: Vec<Address>,
    pub to: Address,
}

#[derive(Default)]
struct MockState {
    native: HashMap<Address, U256>,
    tokens: HashMap<(Address, Address), U256>,
    metadata: HashMap<Address, TokenMetadata>,
    allowances: HashMap<(Address, Address, Address), U256>,
    slots: Vec<PaymentSlot>,
    prices: HashMap<U256, u64>,
    stable: Address,
    reserves: HashMap<Address, PairReserves>,
    transfers: Vec<Transfer>,
    withdrawals: Vec<(Address, Address)>,
    approvals: usize,
    swaps: Vec<Swap>,
    failing_withdrawals: HashSet<Address>,
    failing_reads: HashSet<Address>,
    price_impact_bps: u64,
    slot_delay: Option<Duration>,
    tx_counter: u64,
}

fn debit<K: std::hash::Hash + Eq>(
    map: &mut HashMap<K, U256>,
    key: K,
    amount: U256,
) -> FundResult<()> {
    let balance = map.entry(key).or_default();
    if *balance < amount {
        return Err(FundError::InsufficientFunds(format!(
            "balance {balance} below {amount}"
        )));
    }
    *balance -= amount;
    Ok(())
}

fn credit<K: std::hash::Hash + Eq>(map: &mut HashMap<K, U256>, key: K, amount: U256) {
    *map.entry(key).or_default() += amount;
}

/// In-memory chain, ledger and AMM. Balances move when transfers,
/// withdrawals and swaps succeed, so multi-step flows can be followed.
pub struct MockChain {
    state: Mutex<MockState>,
    ledger: Address,
    slot_reads: AtomicU64,
}

impl MockChain {
    pub fn new() -> Self {
        let chain = Self {
            state: Mutex::new(MockState::default()),
            ledger: addr(ESCROW),
            slot_reads: AtomicU64::new(0),
        };
        chain.add_token(addr(USDC), "USDC", 6);
        chain.add_token(addr(DAI), "DAI", 18);
        chain.add_token(addr(WETH), "WETH", 18);
        chain.state.lock().unwrap().stable = addr(USDC);
        chain
    }

    pub fn add_token(&self, token: Address, symbol: &str, decimals: u8) {
        self.state.lock().unwrap().metadata.insert(
            token,
            TokenMetadata {
                symbol: symbol.to_string(),
                decimals,
            },
        );
    }

    pub fn add_slot(&self, id: u64, asset: Address, price_cents: Option<u64>) {
        let mut state = self.state.lock().unwrap();
        state.slots.push(PaymentSlot {
            id: U256::from(id),
            asset,
            active: true,
        });
        if let Some(cents) = price_cents {
            state.prices.insert(U256::from(id), cents);
        }
    }

    pub fn add_inactive_slot(&self, id: u64, asset: Address) {
        self.state.lock().unwrap().slots.push(PaymentSlot {
            id: U256::from(id),
            asset,
            active: false,
        });
    }

    pub fn set_native(&self, owner: Address, amount: U256) {
        self.state.lock().unwrap().native.insert(owner, amount);
    }

    pub fn set_token(&self, token: Address, owner: Address, amount: U256) {
        self.state.lock().unwrap().tokens.insert((token, owner), amount);
    }

    pub fn set_reserves(&self, pair: Address, reserves: PairReserves) {
        self.state.lock().unwrap().reserves.insert(pair, reserves);
    }

    pub fn fail_withdrawal_of(&self, asset: Address) {
        self.state.lock().unwrap().failing_withdrawals.insert(asset);
    }

    pub fn fail_reads_of(&self, token: Address) {
        self.state.lock().unwrap().failing_reads.insert(token);
    }

    /// The pool moves against us by this much between quote and swap.
    pub fn set_price_impact_bps(&self, bps: u64) {
        self.state.lock().unwrap().price_impact_bps = bps;
    }

    /// Makes listing slots yield for `delay`, so a cycle stays in flight.
    pub fn set_slot_delay(&self, delay: Duration) {
        self.state.lock().unwrap().slot_delay = Some(delay);
    }

    pub fn native_of(&self, owner: Address) -> U256 {
        self.state
            .lock()
            .unwrap()
            .native
            .get(&owner)
            .copied()
            .unwrap_or_default()
    }

    pub fn token_of(&self, token: Address, owner: Address) -> U256 {
        self.state
            .lock()
            .unwrap()
            .tokens
            .get(&(token, owner))
            .copied()
            .unwrap_or_default()
    }

    pub fn transfers(&self) -> Vec<Transfer> {
        self.state.lock().unwrap().transfers.clone()
    }

    pub fn withdrawals(&self) -> Vec<(Address, Address)> {
        self.state.lock().unwrap().withdrawals.clone()
    }

    pub fn swaps(&self) -> Vec<Swap> {
        self.state.lock().unwrap().swaps.clone()
    }

    pub fn approvals(&self) -> usize {
        self.state.lock().unwrap().approvals
    }

    pub fn slot_reads(&self) -> u64 {
        self.slot_reads.load(Ordering::SeqCst)
    }

    pub fn write_count(&self) -> usize {
        let state = self.state.lock().unwrap();
        state.transfers.len() + state.withdrawals.len() + state.swaps.len() + state.approvals
    }

    fn receipt(state: &mut MockState, success: bool) -> TxReceipt {
        state.tx_counter += 1;
        TxReceipt {
            tx_hash: B256::left_padding_from(&state.tx_counter.to_be_bytes()),
            success,
        }
    }
}

#[async_trait]
impl ChainClient for MockChain {
    async fn native_balance(&self, owner: Address) -> FundResult<U256> {
        Ok(self.native_of(owner))
    }

    async fn token_balance(&self, token: Address, owner: Address) -> FundResult<U256> {
        if self.state.lock().unwrap().failing_reads.contains(&token) {
            return Err(FundError::rpc(format!("balanceOf {token} timed out")));
        }
        Ok(self.token_of(token, owner))
    }

    async fn token_metadata(&self, token: Address) -> FundResult<TokenMetadata> {
        self.state
            .lock()
            .unwrap()
            .metadata
            .get(&token)
            .cloned()
            .ok_or_else(|| FundError::rpc(format!("no code at {token}")))
    }

    async fn allowance(
        &self,
        token: Address,
        owner: Address,
        spender: Address,
    ) -> FundResult<U256> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .allowances
            .get(&(token, owner, spender))
            .copied()
            .unwrap_or_default())
    }

    async fn approve(
        &self,
        signer: &Signer,
        token: Address,
        spender: Address,
        amount: U256,
    ) -> FundResult<TxReceipt> {
        let mut state = self.state.lock().unwrap();
        state
            .allowances
            .insert((token, signer.address, spender), amount);
        state.approvals += 1;
        Ok(Self::receipt(&mut state, true))
    }

    async fn transfer(
        &self,
        signer: &Signer,
        asset: AssetId,
        to: Address,
        amount: U256,
    ) -> FundResult<TxReceipt> {
        let mut state = self.state.lock().unwrap();
        match asset {
            AssetId::Native => {
                debit(&mut state.native, signer.address, amount)?;
                credit(&mut state.native, to, amount);
            }
            AssetId::Token(token) => {
                debit(&mut state.tokens, (token, signer.address), amount)?;
                credit(&mut state.tokens, (token, to), amount);
            }
        }
        state.transfers.push(Transfer {
            from: signer.address,
            to,
            asset,
            amount,
        });
        Ok(Self::receipt(&mut state, true))
    }
}

#[async_trait]
impl EscrowLedger for MockChain {
    fn contract_address(&self) -> Address {
        self.ledger
    }

    async fn active_slot_ids(&self) -> FundResult<Vec<U256>> {
        self.slot_reads.fetch_add(1, Ordering::SeqCst);
        let delay = self.state.lock().unwrap().slot_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self
            .state
            .lock()
            .unwrap()
            .slots
            .iter()
            .filter(|slot| slot.active)
            .map(|slot| slot.id)
            .collect())
    }

    async fn slot(&self, slot_id: U256) -> FundResult<PaymentSlot> {
        self.state
            .lock()
            .unwrap()
            .slots
            .iter()
            .find(|slot| slot.id == slot_id)
            .copied()
            .ok_or_else(|| FundError::not_found(format!("slot {slot_id}")))
    }

    async fn slot_price_cents(&self, slot_id: U256) -> FundResult<Option<u64>> {
        Ok(self.state.lock().unwrap().prices.get(&slot_id).copied())
    }

    async fn stable_asset(&self) -> FundResult<Address> {
        Ok(self.state.lock().unwrap().stable)
    }

    async fn set_stable_asset(&self, _signer: &Signer, asset: Address) -> FundResult<TxReceipt> {
        let mut state = self.state.lock().unwrap();
        state.stable = asset;
        Ok(Self::receipt(&mut state, true))
    }

    async fn withdraw(
        &self,
        _signer: &Signer,
        asset: Address,
        to: Address,
    ) -> FundResult<TxReceipt> {
        let mut state = self.state.lock().unwrap();
        if state.failing_withdrawals.contains(&asset) {
            return Err(FundError::rpc(format!("withdraw({asset}) execution reverted")));
        }
        let held = state
            .tokens
            .remove(&(asset, self.ledger))
            .unwrap_or_default();
        credit(&mut state.tokens, (asset, to), held);
        state.withdrawals.push((asset, to));
        Ok(Self::receipt(&mut state, true))
    }
}

#[async_trait]
impl AmmRouter for MockChain {
    async fn pair_reserves(&self, pair: Address) -> FundResult<PairReserves> {
        self.state
            .lock()
            .unwrap()
            .reserves
            .get(&pair)
            .copied()
            .ok_or_else(|| FundError::rpc(format!("no pair at {pair}")))
    }

    async fn swap_exact_tokens_for_native(
        &self,
        signer: &Signer,
        _router: Address,
        amount_in: U256,
        min_out: U256,
        path: Vec<Address>,
        to: Address,
        _deadline: u64,
    ) -> FundResult<TxReceipt> {
        let mut state = self.state.lock().unwrap();
        let token_in = path[0];
        let reserves = *state
            .reserves
            .values()
            .next()
            .ok_or_else(|| FundError::rpc("no pair"))?;
        let quoted = quote(&reserves, token_in, amount_in)?;
        let out = quoted * U256::from(10_000 - state.price_impact_bps) / U256::from(10_000u64);
        if out < min_out {
            return Ok(Self::receipt(&mut state, false));
        }
        debit(&mut state.tokens, (token_in, signer.address), amount_in)?;
        credit(&mut state.native, to, out);
        state.swaps.push(Swap {
            amount_in,
            min_out,
            path,
            to,
        });
        Ok(Self::receipt(&mut state, true))
    }
}

/// Records key generation and addressbook writes.
#[derive(Default)]
pub struct MockAgent {
    generated: Mutex<Vec<String>>,
    persisted: Mutex<Vec<BTreeMap<String, RoleEntry>>>,
}

impl MockAgent {
    pub fn generated_roles(&self) -> Vec<String> {
        self.generated.lock().unwrap().clone()
    }

    pub fn persisted(&self) -> Vec<BTreeMap<String, RoleEntry>> {
        self.persisted.lock().unwrap().clone()
    }
}

#[async_trait]
impl PrivilegedAgent for MockAgent {
    async fn generate_key(&self, role: &str) -> FundResult<GeneratedKey> {
        let mut generated = self.generated.lock().unwrap();
        generated.push(role.to_string());
        Ok(GeneratedKey {
            address: addr(0xA0 + generated.len() as u8),
            key: KeyHandle::new(format!("generated-{role}")),
        })
    }

    async fn persist_addressbook(&self, entries: &BTreeMap<String, RoleEntry>) -> FundResult<()> {
        self.persisted.lock().unwrap().push(entries.clone());
        Ok(())
    }
}

pub fn signing(n: u8) -> RoleEntry {
    RoleEntry::signing(addr(n), KeyHandle::new(format!("key-{n}")))
}

/// Operator, admin, dev and broker; `with_hot` adds the hot wallet.
pub fn base_roles(with_hot: bool) -> BTreeMap<String, RoleEntry> {
    let mut roles = BTreeMap::new();
    roles.insert("operator".to_string(), signing(OPERATOR));
    roles.insert("admin".to_string(), RoleEntry::watch_only(addr(ADMIN)));
    roles.insert("dev".to_string(), RoleEntry::watch_only(addr(DEV)));
    roles.insert("broker".to_string(), RoleEntry::watch_only(addr(BROKER)));
    if with_hot {
        roles.insert("hot".to_string(), signing(HOT));
    }
    roles
}

pub fn test_config() -> Config {
    serde_json::from_value(json!({
        "blockchain": {
            "chain_id": 1,
            "rpc_url": "http://localhost:8545",
            "subscription_contract": addr(ESCROW),
            "usdc_address": addr(USDC),
        },
        "fund_cycle": {
            "min_withdrawal_usd": "10",
            "low_gas_usd_threshold": "5",
            "gas_swap_amount": "10",
            "stable_buffer_target": "50",
            "hot_gas_target": "0.0005",
        },
        "pool_overrides": {
            "1": {
                "router": addr(ROUTER),
                "wrapped_native": addr(WETH),
                "stable_asset": addr(USDC),
                "stable_native_pair": addr(PAIR),
            }
        },
        "default_recipient": "admin",
    }))
    .unwrap()
}

/// USDC/WETH pool pricing native at $2000.
pub fn usdc_weth_reserves() -> PairReserves {
    PairReserves {
        token0: addr(USDC),
        token1: addr(WETH),
        reserve0: usdc(2_000_000),
        reserve1: eth(1_000),
    }
}

pub struct Harness {
    pub chain: Arc<MockChain>,
    pub agent: Arc<MockAgent>,
    pub registry: Arc<RoleRegistry>,
    pub engine: FundEngine,
}

pub fn harness_with(config: Config, roles: BTreeMap<String, RoleEntry>) -> Harness {
    let chain = Arc::new(MockChain::new());
    let agent = Arc::new(MockAgent::default());
    let registry = Arc::new(RoleRegistry::new(roles, agent.clone()));
    let engine = FundEngine::new(
        Arc::new(config),
        registry.clone(),
        chain.clone(),
        chain.clone(),
        chain.clone(),
    );
    Harness {
        chain,
        agent,
        registry,
        engine,
    }
}

pub fn harness() -> Harness {
    harness_with(test_config(), base_roles(true))
}

/// An agent whose socket is gone.
pub struct FailingAgent;

#[async_trait]
impl PrivilegedAgent for FailingAgent {
    async fn generate_key(&self, _role: &str) -> FundResult<GeneratedKey> {
        Err(FundError::AgentFailure("connection refused".to_string()))
    }

    async fn persist_addressbook(&self, _entries: &BTreeMap<String, RoleEntry>) -> FundResult<()> {
        Err(FundError::AgentFailure("connection refused".to_string()))
    }
}
