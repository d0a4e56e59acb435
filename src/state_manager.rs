//! State Manager
//!
//! Persists cycle timestamps so intervals survive restarts. Writes go to a
//! temp file, are fsynced, then renamed over the state file.
//!
//! There is no cross-process lock: run one instance per state file.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, info};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CycleState {
    #[serde(default)]
    pub last_fund_cycle_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_gas_check_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub hot_wallet_generated: bool,
    #[serde(default)]
    pub last_update: Option<DateTime<Utc>>,
}

pub struct StateManager {
    state: Arc<RwLock<CycleState>>,
    state_file_path: PathBuf,
}

impl StateManager {
    /// Loads state from the disk
    pub async fn load(state_file_path: PathBuf) -> Result<Self> {
        let state = if state_file_path.exists() {
            info!("Loading cycle state from {}", state_file_path.display());
            let content = fs::read_to_string(&state_file_path)
                .await
                .context("Failed to read state file")?;

            serde_json::from_str::<CycleState>(&content).context("Failed to parse state file.")?
        } else {
            info!("No state found, creating new state.");
            CycleState::default()
        };

        debug!(
            "last_fund_cycle_at={:?} last_gas_check_at={:?} hot_wallet_generated={}",
            state.last_fund_cycle_at, state.last_gas_check_at, state.hot_wallet_generated
        );

        Ok(Self {
            state: Arc::new(RwLock::new(state)),
            state_file_path,
        })
    }

    pub async fn record_fund_cycle(&self, at: DateTime<Utc>) -> Result<()> {
        let mut state = self.state.write().await;
        state.last_fund_cycle_at = Some(at);
        state.last_update = Some(Utc::now());
        self.persist_locked(&state)
            .await
            .context("Failed to persist state after fund cycle")
    }

    pub async fn record_gas_check(&self, at: DateTime<Utc>) -> Result<()> {
        let mut state = self.state.write().await;
        state.last_gas_check_at = Some(at);
        state.last_update = Some(Utc::now());
        self.persist_locked(&state)
            .await
            .context("Failed to persist state after gas check")
    }

    pub async fn mark_hot_wallet_generated(&self) -> Result<()> {
        let mut state = self.state.write().await;
        if state.hot_wallet_generated {
            return Ok(());
        }
        state.hot_wallet_generated = true;
        state.last_update = Some(Utc::now());
        self.persist_locked(&state).await
    }

    /// Store the state to a disk.
    async fn persist_locked(&self, state: &CycleState) -> Result<()> {
        let json = serde_json::to_string_pretty(state).context("Failed to serialize state")?;

        let temp_path = self.state_file_path.with_extension("json.tmp");

        fs::write(&temp_path, &json)
            .await
            .context("Failed to write temporary state file")?;

        let file = fs::File::open(&temp_path).await?;
        file.sync_all().await.context("Failed to fsync state file")?;

        fs::rename(&temp_path, &self.state_file_path)
            .await
            .context("Failed to rename state file")?;

        debug!("State persisted to {}", self.state_file_path.display());

        Ok(())
    }

    pub async fn fetch_snapshot(&self) -> CycleState {
        self.state.read().await.clone()
    }
}
