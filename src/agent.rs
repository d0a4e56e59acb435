//! Privileged agent client
//!
//! Key generation and addressbook writes happen in a separate,
//! privilege-separated process. Requests travel over a Unix socket as a
//! 4-byte big-endian length prefix followed by a JSON payload.

use crate::error::{FundError, FundResult};
use crate::role_registry::RoleEntry;
use crate::types::{Address, KeyHandle};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::UnixStream;
use tracing::debug;

pub const MAX_FRAME_LEN: usize = 1024 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "action", content = "params", rename_all = "snake_case")]
pub enum AgentAction {
    /// Generate a key under `role` and register it in the addressbook.
    GenerateKey { role: String },
    PersistAddressbook { entries: BTreeMap<String, RoleEntry> },
}

impl AgentAction {
    pub fn name(&self) -> &'static str {
        match self {
            AgentAction::GenerateKey { .. } => "generate_key",
            AgentAction::PersistAddressbook { .. } => "persist_addressbook",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentRequest {
    pub id: u64,
    #[serde(flatten)]
    pub action: AgentAction,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentResponse {
    pub id: u64,
    pub ok: bool,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeneratedKey {
    pub address: Address,
    pub key: KeyHandle,
}

#[async_trait]
pub trait PrivilegedAgent: Send + Sync {
    async fn generate_key(&self, role: &str) -> FundResult<GeneratedKey>;

    async fn persist_addressbook(&self, entries: &BTreeMap<String, RoleEntry>) -> FundResult<()>;
}

pub fn encode_frame<T: Serialize>(message: &T) -> FundResult<Vec<u8>> {
    let payload = serde_json::to_vec(message)
        .map_err(|e| FundError::AgentFailure(format!("encode: {e}")))?;
    if payload.len() > MAX_FRAME_LEN {
        return Err(FundError::AgentFailure(format!(
            "frame of {} bytes exceeds {MAX_FRAME_LEN}",
            payload.len()
        )));
    }
    let mut frame = Vec::with_capacity(4 + payload.len());
    frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

pub async fn read_frame<R, T>(reader: &mut R) -> FundResult<T>
where
    R: AsyncRead + Unpin,
    T: for<'de> Deserialize<'de>,
{
    let mut len_buf = [0u8; 4];
    reader
        .read_exact(&mut len_buf)
        .await
        .map_err(|e| FundError::AgentFailure(format!("read length: {e}")))?;
    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_FRAME_LEN {
        return Err(FundError::AgentFailure(format!(
            "frame of {len} bytes exceeds {MAX_FRAME_LEN}"
        )));
    }

    let mut payload = vec![0u8; len];
    reader
        .read_exact(&mut payload)
        .await
        .map_err(|e| FundError::AgentFailure(format!("read payload: {e}")))?;
    serde_json::from_slice(&payload).map_err(|e| FundError::AgentFailure(format!("decode: {e}")))
}

pub async fn write_frame<W, T>(writer: &mut W, message: &T) -> FundResult<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let frame = encode_frame(message)?;
    writer
        .write_all(&frame)
        .await
        .map_err(|e| FundError::AgentFailure(format!("write: {e}")))?;
    writer
        .flush()
        .await
        .map_err(|e| FundError::AgentFailure(format!("flush: {e}")))
}

/// Sends one request over an established stream and interprets the reply.
pub async fn exchange<S>(stream: &mut S, action: AgentAction) -> FundResult<serde_json::Value>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let request = AgentRequest {
        id: rand::random(),
        action,
    };
    debug!("agent request {} id={}", request.action.name(), request.id);
    write_frame(stream, &request).await?;

    let response: AgentResponse = read_frame(stream).await?;
    if response.id != request.id {
        return Err(FundError::AgentFailure(format!(
            "response id {} does not match request {}",
            response.id, request.id
        )));
    }
    if !response.ok {
        return Err(FundError::AgentFailure(
            response
                .error
                .unwrap_or_else(|| format!("{} failed", request.action.name())),
        ));
    }
    Ok(response.result.unwrap_or(serde_json::Value::Null))
}

/// Agent reachable over a local Unix socket, one connection per request.
pub struct SocketAgent {
    socket_path: PathBuf,
}

impl SocketAgent {
    pub fn new(socket_path: PathBuf) -> Self {
        Self { socket_path }
    }

    async fn request(&self, action: AgentAction) -> FundResult<serde_json::Value> {
        let mut stream = UnixStream::connect(&self.socket_path).await.map_err(|e| {
            FundError::AgentFailure(format!("connect {}: {e}", self.socket_path.display()))
        })?;
        exchange(&mut stream, action).await
    }
}

#[async_trait]
impl PrivilegedAgent for SocketAgent {
    async fn generate_key(&self, role: &str) -> FundResult<GeneratedKey> {
        let result = self
            .request(AgentAction::GenerateKey {
                role: role.to_string(),
            })
            .await?;
        serde_json::from_value(result)
            .map_err(|e| FundError::AgentFailure(format!("generate_key result: {e}")))
    }

    async fn persist_addressbook(&self, entries: &BTreeMap<String, RoleEntry>) -> FundResult<()> {
        self.request(AgentAction::PersistAddressbook {
            entries: entries.clone(),
        })
        .await
        .map(|_| ())
    }
}
