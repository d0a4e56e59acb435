//! Role Registry
//!
//! Sole authority mapping role names (operator, hot, treasury, ...) to
//! addresses and signing keys. Other components address wallets by role.

use crate::agent::PrivilegedAgent;
use crate::error::{FundError, FundResult};
use crate::types::{truncate_address, Address, KeyHandle, Signer};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

pub const OPERATOR_ROLE: &str = "operator";
pub const ADMIN_ROLE: &str = "admin";
pub const HOT_ROLE: &str = "hot";
pub const DEV_ROLE: &str = "dev";
pub const BROKER_ROLE: &str = "broker";

/// Roles that the mutation interface never touches.
pub const IMMUTABLE_ROLES: [&str; 5] = [OPERATOR_ROLE, ADMIN_ROLE, HOT_ROLE, DEV_ROLE, BROKER_ROLE];

pub fn is_immutable_role(role: &str) -> bool {
    IMMUTABLE_ROLES.contains(&role)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoleEntry {
    pub address: Address,
    #[serde(default)]
    pub signable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<KeyHandle>,
}

impl RoleEntry {
    pub fn watch_only(address: Address) -> Self {
        Self {
            address,
            signable: false,
            key: None,
        }
    }

    pub fn signing(address: Address, key: KeyHandle) -> Self {
        Self {
            address,
            signable: true,
            key: Some(key),
        }
    }
}

pub struct RoleRegistry {
    entries: RwLock<BTreeMap<String, RoleEntry>>,
    agent: Arc<dyn PrivilegedAgent>,
}

impl RoleRegistry {
    pub fn new(entries: BTreeMap<String, RoleEntry>, agent: Arc<dyn PrivilegedAgent>) -> Self {
        Self {
            entries: RwLock::new(entries),
            agent,
        }
    }

    /// Loads the addressbook written by the privileged agent.
    pub async fn load(path: &Path, agent: Arc<dyn PrivilegedAgent>) -> anyhow::Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read addressbook {}", path.display()))?;
        let entries: BTreeMap<String, RoleEntry> =
            serde_json::from_str(&content).context("Failed to parse addressbook")?;
        info!("Loaded {} roles from {}", entries.len(), path.display());
        Ok(Self::new(entries, agent))
    }

    pub async fn list(&self) -> BTreeMap<String, RoleEntry> {
        self.entries.read().await.clone()
    }

    pub async fn contains(&self, role: &str) -> bool {
        self.entries.read().await.contains_key(role)
    }

    /// A literal `0x` address is validated and returned as-is; anything else
    /// is treated as a role name.
    pub async fn resolve_address(&self, identifier: &str) -> FundResult<Address> {
        let identifier = identifier.trim();
        if identifier.starts_with("0x") || identifier.starts_with("0X") {
            return identifier
                .parse::<Address>()
                .map_err(|_| FundError::InvalidAddress(identifier.to_string()));
        }
        self.entries
            .read()
            .await
            .get(identifier)
            .map(|entry| entry.address)
            .ok_or_else(|| FundError::not_found(format!("role '{identifier}'")))
    }

    pub async fn resolve_signer(&self, role: &str) -> FundResult<Signer> {
        let entries = self.entries.read().await;
        let entry = entries
            .get(role)
            .ok_or_else(|| FundError::not_found(format!("role '{role}'")))?;
        match (&entry.key, entry.signable) {
            (Some(key), true) => Ok(Signer {
                role: role.to_string(),
                address: entry.address,
                key: key.clone(),
            }),
            _ => Err(FundError::NoSigningCapability(role.to_string())),
        }
    }

    /// Returns the hot wallet, generating it through the agent on first use.
    ///
    /// Not safe against concurrent first calls; the scheduler's single-flight
    /// guard is what keeps that from happening.
    pub async fn ensure_intermediary_wallet(&self) -> FundResult<Address> {
        if let Some(entry) = self.entries.read().await.get(HOT_ROLE) {
            return Ok(entry.address);
        }

        info!("No '{}' wallet registered, requesting key generation", HOT_ROLE);
        let generated = self.agent.generate_key(HOT_ROLE).await?;
        self.entries.write().await.insert(
            HOT_ROLE.to_string(),
            RoleEntry::signing(generated.address, generated.key),
        );
        info!(
            "Registered '{}' wallet {}",
            HOT_ROLE,
            truncate_address(&generated.address)
        );
        Ok(generated.address)
    }

    fn reject_immutable(role: &str) -> FundResult<()> {
        if is_immutable_role(role) {
            warn!("Refusing to mutate immutable role '{}'", role);
            return Err(FundError::ImmutableRole(role.to_string()));
        }
        if role.trim().is_empty() {
            return Err(FundError::ConfigurationInvalid(
                "role name must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    // Mutations persist a copy first and only swap it in once the agent
    // has stored it.
    pub async fn add(&self, role: &str, entry: RoleEntry) -> FundResult<()> {
        Self::reject_immutable(role)?;
        let mut entries = self.entries.write().await;
        if entries.contains_key(role) {
            return Err(FundError::ConfigurationInvalid(format!(
                "role '{role}' already exists"
            )));
        }
        let mut next = entries.clone();
        next.insert(role.to_string(), entry);
        self.agent.persist_addressbook(&next).await?;
        *entries = next;
        info!("Added role '{}'", role);
        Ok(())
    }

    pub async fn update(&self, role: &str, address: Address) -> FundResult<()> {
        Self::reject_immutable(role)?;
        let mut entries = self.entries.write().await;
        if !entries.contains_key(role) {
            return Err(FundError::not_found(format!("role '{role}'")));
        }
        let mut next = entries.clone();
        // A new address invalidates the old key.
        next.insert(role.to_string(), RoleEntry::watch_only(address));
        self.agent.persist_addressbook(&next).await?;
        *entries = next;
        info!("Updated role '{}' to {}", role, truncate_address(&address));
        Ok(())
    }

    pub async fn delete(&self, role: &str) -> FundResult<()> {
        Self::reject_immutable(role)?;
        let mut entries = self.entries.write().await;
        let mut next = entries.clone();
        if next.remove(role).is_none() {
            return Err(FundError::not_found(format!("role '{role}'")));
        }
        self.agent.persist_addressbook(&next).await?;
        *entries = next;
        info!("Deleted role '{}'", role);
        Ok(())
    }

    /// Generates a fresh signing key for `role`; the agent registers it.
    pub async fn generate(&self, role: &str) -> FundResult<Address> {
        Self::reject_immutable(role)?;
        if self.contains(role).await {
            return Err(FundError::ConfigurationInvalid(format!(
                "role '{role}' already exists"
            )));
        }
        let generated = self.agent.generate_key(role).await?;
        self.entries.write().await.insert(
            role.to_string(),
            RoleEntry::signing(generated.address, generated.key),
        );
        info!("Generated role '{}' at {}", role, truncate_address(&generated.address));
        Ok(generated.address)
    }
}
