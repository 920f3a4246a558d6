//! The boundary to the remote validator cluster.
//!
//! Everything the pipeline does on-chain goes through [`ChainGateway`]. The
//! production implementation is [`HttpGateway`](crate::HttpGateway); tests
//! substitute an in-memory one.

use async_trait::async_trait;
use derive_more::{Deref, Display, From};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// On-chain account address in the cluster's string encoding.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, Deref, Display, From, Serialize, Deserialize,
)]
pub struct AccountId(String);

impl AccountId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Signature of a submitted transaction, used to poll for confirmation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deref, Display, From)]
pub struct Signature(String);

impl Signature {
    pub fn new(sig: impl Into<String>) -> Self {
        Self(sig.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Snapshot of an on-chain account as reported by the cluster.
#[derive(Debug, Clone)]
pub struct AccountInfo {
    pub exists: bool,
    /// Allocated byte capacity of the account's data region.
    pub capacity: u64,
    /// Content hash of the executable data, when the cluster exposes one.
    pub content_hash: Option<String>,
}

/// A staging buffer account owned by an authority.
#[derive(Debug, Clone)]
pub struct BufferInfo {
    pub account: AccountId,
    pub capacity: u64,
}

/// Errors reported by the cluster boundary.
///
/// Classification is explicit per kind: [`GatewayError::is_transient`] is the
/// single source of truth for what the retry machinery may re-attempt.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("account not found: {0}")]
    AccountNotFound(String),

    /// The target account's data region is smaller than the operation
    /// requires. Never blindly retried: the orchestrator routes this back
    /// through the size reconciler instead.
    #[error("account data too small for requested operation")]
    AccountDataTooSmall,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("request timed out")]
    Timeout,

    #[error("transaction simulation failed: {0}")]
    Simulation(String),

    #[error("insufficient funds: {0}")]
    InsufficientFunds(String),

    #[error("invalid authority: {0}")]
    InvalidAuthority(String),

    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },
}

impl GatewayError {
    /// Whether the error is safe to retry with backoff. Everything not
    /// listed here is permanent for the current attempt.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::Timeout | Self::Simulation(_)
        )
    }
}

/// Operations the pipeline consumes from the remote cluster.
///
/// All methods are potentially slow network calls and may fail transiently
/// or permanently; see [`GatewayError::is_transient`]. Implementations are
/// expected to confirm mutating operations before returning, except
/// [`write_chunk`](ChainGateway::write_chunk) which returns a [`Signature`]
/// to be confirmed separately so chunk uploads can overlap.
#[async_trait]
pub trait ChainGateway: Send + Sync {
    /// Address of the signing authority this gateway submits with.
    fn authority(&self) -> &AccountId;

    /// Create an account with `size` bytes of data capacity, owned by
    /// `authority`.
    async fn create_account(
        &self,
        size: u64,
        authority: &AccountId,
    ) -> Result<AccountId, GatewayError>;

    /// Write `bytes` into `account` starting at `offset`. Idempotent for a
    /// fixed `(offset, bytes)` pair, which is what makes chunk retries safe.
    async fn write_chunk(
        &self,
        account: &AccountId,
        offset: u64,
        bytes: &[u8],
    ) -> Result<Signature, GatewayError>;

    /// Block until the transaction behind `signature` is confirmed.
    async fn confirm(&self, signature: &Signature) -> Result<(), GatewayError>;

    /// Atomically swap the staged `buffer` contents into `program`. On
    /// success the cluster closes the buffer; callers must not close it
    /// again.
    async fn activate_program(
        &self,
        program: &AccountId,
        buffer: &AccountId,
    ) -> Result<(), GatewayError>;

    /// Grow `program`'s data capacity by `extra_bytes`.
    async fn extend_program(
        &self,
        program: &AccountId,
        extra_bytes: u64,
    ) -> Result<(), GatewayError>;

    async fn get_account_info(&self, account: &AccountId) -> Result<AccountInfo, GatewayError>;

    /// Close `account`, releasing its balance back to the authority.
    async fn close_account(&self, account: &AccountId) -> Result<(), GatewayError>;

    /// List open staging buffers owned by `authority`.
    async fn list_buffers(&self, authority: &AccountId) -> Result<Vec<BufferInfo>, GatewayError>;
}
