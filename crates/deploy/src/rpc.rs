//! JSON-RPC gateway to the validator cluster.
//!
//! [`HttpGateway`] is the production [`ChainGateway`]: every operation is a
//! JSON-RPC call over HTTP with a per-call timeout. Wire-level errors are
//! mapped onto the typed [`GatewayError`] kinds exactly once, here at the
//! boundary; nothing downstream ever inspects message text.

use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::Engine;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use crate::config::DeployConfig;
use crate::gateway::{AccountId, AccountInfo, BufferInfo, ChainGateway, GatewayError, Signature};

/// Interval between confirmation polls.
const CONFIRM_POLL_INTERVAL: Duration = Duration::from_millis(400);

/// Maximum time to wait for a submitted transaction to confirm.
const CONFIRM_TIMEOUT: Duration = Duration::from_secs(30);

// Error codes reported by the cluster's RPC surface.
const RPC_SIMULATION_FAILED: i64 = -32002;
const RPC_INSUFFICIENT_FUNDS: i64 = -32003;
const RPC_INVALID_AUTHORITY: i64 = -32004;
const RPC_ACCOUNT_NOT_FOUND: i64 = -32005;

/// [`ChainGateway`] implementation speaking JSON-RPC over HTTP(S).
pub struct HttpGateway {
    client: reqwest::Client,
    url: String,
    authority: AccountId,
}

impl HttpGateway {
    /// Build a gateway from configuration: validates the cluster URL,
    /// loads the authority identity from the keypair file, and configures
    /// the HTTP client with the per-call timeout.
    pub fn from_config(config: &DeployConfig) -> Result<Self> {
        config.validate()?;

        let authority = load_authority(&config.keypair_path)?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.rpc_timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        tracing::debug!(
            url = %config.cluster_url,
            authority = %authority,
            "Gateway initialized"
        );

        Ok(Self {
            client,
            url: config.cluster_url.clone(),
            authority,
        })
    }

    /// Make a JSON-RPC call and deserialize the result.
    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Vec<Value>,
    ) -> Result<T, GatewayError> {
        let response = self
            .client
            .post(&self.url)
            .json(&json!({
                "jsonrpc": "2.0",
                "method": method,
                "params": params,
                "id": 1
            }))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GatewayError::Timeout
                } else {
                    GatewayError::Transport(e.to_string())
                }
            })?;

        let body: Value = response
            .json()
            .await
            .map_err(|e| GatewayError::Transport(format!("malformed {method} response: {e}")))?;

        if let Some(error) = body.get("error") {
            let code = error.get("code").and_then(Value::as_i64).unwrap_or(0);
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_string();
            return Err(map_rpc_error(code, message));
        }

        let result = body
            .get("result")
            .cloned()
            .ok_or_else(|| GatewayError::Transport(format!("no result in {method} response")))?;

        serde_json::from_value(result).map_err(|e| {
            GatewayError::Transport(format!("failed to deserialize {method} result: {e}"))
        })
    }

    /// Submit a transaction-shaped call and wait for its confirmation.
    async fn submit_and_confirm(
        &self,
        method: &str,
        params: Vec<Value>,
    ) -> Result<(), GatewayError> {
        let result: SubmitResult = self.call(method, params).await?;
        let signature = Signature::new(result.signature);
        tracing::debug!(method, signature = %signature, "Transaction submitted");
        self.confirm(&signature).await
    }
}

/// Map a wire-level RPC error onto a typed gateway error.
///
/// The undersized-account case is surfaced by the cluster as a simulation
/// failure, so that one mapping has to look at the message; every other kind
/// is classified by code alone.
fn map_rpc_error(code: i64, message: String) -> GatewayError {
    match code {
        RPC_SIMULATION_FAILED if message.contains("account data too small") => {
            GatewayError::AccountDataTooSmall
        }
        RPC_SIMULATION_FAILED => GatewayError::Simulation(message),
        RPC_INSUFFICIENT_FUNDS => GatewayError::InsufficientFunds(message),
        RPC_INVALID_AUTHORITY => GatewayError::InvalidAuthority(message),
        RPC_ACCOUNT_NOT_FOUND => GatewayError::AccountNotFound(message),
        _ => GatewayError::Rpc { code, message },
    }
}

/// Load the authority address from a keypair file.
///
/// Keypair management is external to this tool; we only need the public
/// half, which is the last 32 bytes of the standard 64-byte JSON array.
fn load_authority(path: &Path) -> Result<AccountId> {
    let content = std::fs::read_to_string(path)
        .context(format!("Failed to read keypair from {}", path.display()))?;
    let bytes: Vec<u8> =
        serde_json::from_str(&content).context("Failed to parse keypair file as a byte array")?;

    if bytes.len() != 64 {
        anyhow::bail!(
            "Keypair file {} must contain 64 bytes, got {}",
            path.display(),
            bytes.len()
        );
    }

    Ok(AccountId::new(hex::encode(&bytes[32..])))
}

#[derive(Debug, Deserialize)]
struct SubmitResult {
    signature: String,
}

#[derive(Debug, Deserialize)]
struct CreateAccountResult {
    account: String,
}

#[derive(Debug, Deserialize)]
struct SignatureStatusResult {
    confirmed: bool,
}

#[derive(Debug, Deserialize)]
struct AccountInfoResult {
    #[serde(rename = "dataLen")]
    data_len: u64,
    #[serde(rename = "contentHash")]
    content_hash: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BufferEntry {
    account: String,
    #[serde(rename = "dataLen")]
    data_len: u64,
}

/// A missing account comes back as a null result rather than an error.
fn account_info_from(result: Option<AccountInfoResult>) -> AccountInfo {
    match result {
        Some(info) => AccountInfo {
            exists: true,
            capacity: info.data_len,
            content_hash: info.content_hash,
        },
        None => AccountInfo {
            exists: false,
            capacity: 0,
            content_hash: None,
        },
    }
}

#[async_trait]
impl ChainGateway for HttpGateway {
    fn authority(&self) -> &AccountId {
        &self.authority
    }

    async fn create_account(
        &self,
        size: u64,
        authority: &AccountId,
    ) -> Result<AccountId, GatewayError> {
        let result: CreateAccountResult = self
            .call(
                "createAccount",
                vec![json!(size), json!(authority.as_str())],
            )
            .await?;
        Ok(AccountId::new(result.account))
    }

    async fn write_chunk(
        &self,
        account: &AccountId,
        offset: u64,
        bytes: &[u8],
    ) -> Result<Signature, GatewayError> {
        let data = base64::engine::general_purpose::STANDARD.encode(bytes);
        let result: SubmitResult = self
            .call(
                "writeAccount",
                vec![json!(account.as_str()), json!(offset), json!(data)],
            )
            .await?;
        Ok(Signature::new(result.signature))
    }

    async fn confirm(&self, signature: &Signature) -> Result<(), GatewayError> {
        let start = Instant::now();

        // A submission reported as accepted is only provisional until the
        // cluster confirms it; poll until it does or the window closes.
        loop {
            if start.elapsed() > CONFIRM_TIMEOUT {
                return Err(GatewayError::Timeout);
            }

            let status: SignatureStatusResult = self
                .call("getSignatureStatus", vec![json!(signature.as_str())])
                .await?;

            if status.confirmed {
                return Ok(());
            }

            tracing::trace!(signature = %signature, "Not yet confirmed, polling...");
            tokio::time::sleep(CONFIRM_POLL_INTERVAL).await;
        }
    }

    async fn activate_program(
        &self,
        program: &AccountId,
        buffer: &AccountId,
    ) -> Result<(), GatewayError> {
        self.submit_and_confirm(
            "activateProgram",
            vec![
                json!(program.as_str()),
                json!(buffer.as_str()),
                json!(self.authority.as_str()),
            ],
        )
        .await
    }

    async fn extend_program(
        &self,
        program: &AccountId,
        extra_bytes: u64,
    ) -> Result<(), GatewayError> {
        self.submit_and_confirm(
            "extendProgram",
            vec![
                json!(program.as_str()),
                json!(extra_bytes),
                json!(self.authority.as_str()),
            ],
        )
        .await
    }

    async fn get_account_info(&self, account: &AccountId) -> Result<AccountInfo, GatewayError> {
        let result: Option<AccountInfoResult> = self
            .call("getAccountInfo", vec![json!(account.as_str())])
            .await?;
        Ok(account_info_from(result))
    }

    async fn close_account(&self, account: &AccountId) -> Result<(), GatewayError> {
        self.submit_and_confirm(
            "closeAccount",
            vec![json!(account.as_str()), json!(self.authority.as_str())],
        )
        .await
    }

    async fn list_buffers(&self, authority: &AccountId) -> Result<Vec<BufferInfo>, GatewayError> {
        let entries: Vec<BufferEntry> = self
            .call("listBuffers", vec![json!(authority.as_str())])
            .await?;
        Ok(entries
            .into_iter()
            .map(|e| BufferInfo {
                account: AccountId::new(e.account),
                capacity: e.data_len,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    #[test]
    fn test_map_rpc_error_classification() {
        assert!(matches!(
            map_rpc_error(
                RPC_SIMULATION_FAILED,
                "account data too small for instruction".into()
            ),
            GatewayError::AccountDataTooSmall
        ));
        assert!(matches!(
            map_rpc_error(RPC_SIMULATION_FAILED, "blockhash not found".into()),
            GatewayError::Simulation(_)
        ));
        assert!(matches!(
            map_rpc_error(RPC_INSUFFICIENT_FUNDS, "balance too low".into()),
            GatewayError::InsufficientFunds(_)
        ));
        assert!(matches!(
            map_rpc_error(RPC_INVALID_AUTHORITY, "signer mismatch".into()),
            GatewayError::InvalidAuthority(_)
        ));
        assert!(matches!(
            map_rpc_error(RPC_ACCOUNT_NOT_FOUND, "unknown account".into()),
            GatewayError::AccountNotFound(_)
        ));
        assert!(matches!(
            map_rpc_error(-32600, "invalid request".into()),
            GatewayError::Rpc { code: -32600, .. }
        ));
    }

    #[test]
    fn test_account_info_from_null_result() {
        let info = account_info_from(None);
        assert!(!info.exists);
        assert_eq!(info.capacity, 0);
        assert!(info.content_hash.is_none());
    }

    #[test]
    fn test_account_info_from_present_result() {
        let info = account_info_from(Some(AccountInfoResult {
            data_len: 4096,
            content_hash: Some("abc123".into()),
        }));
        assert!(info.exists);
        assert_eq!(info.capacity, 4096);
        assert_eq!(info.content_hash.as_deref(), Some("abc123"));
    }

    #[test]
    fn test_load_authority_from_keypair() {
        let dir = TempDir::new("slipway-keypair").expect("Failed to create temp dir");
        let path = dir.path().join("id.json");

        let keypair: Vec<u8> = (0..64).collect();
        std::fs::write(&path, serde_json::to_string(&keypair).unwrap())
            .expect("Failed to write keypair");

        let authority = load_authority(&path).expect("Failed to load authority");
        assert_eq!(authority.as_str(), hex::encode(&keypair[32..]));
    }

    #[test]
    fn test_load_authority_rejects_short_keypair() {
        let dir = TempDir::new("slipway-keypair").expect("Failed to create temp dir");
        let path = dir.path().join("id.json");
        std::fs::write(&path, "[1, 2, 3]").expect("Failed to write keypair");

        assert!(load_authority(&path).is_err());
    }

    #[test]
    fn test_load_authority_missing_file() {
        let dir = TempDir::new("slipway-keypair").expect("Failed to create temp dir");
        assert!(load_authority(&dir.path().join("nope.json")).is_err());
    }
}
