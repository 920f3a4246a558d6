//! Error taxonomy for the deployment pipeline.
//!
//! Each pipeline stage has its own error kind so callers can tell a fatal
//! failure from one that already exhausted its retry budget. Transient vs.
//! permanent classification lives on [`GatewayError`](crate::GatewayError);
//! everything in this module is terminal for the attempt that produced it.

use std::path::PathBuf;

use thiserror::Error;

use crate::gateway::GatewayError;

/// Failures locating or reading the compiled artifact. Never retried.
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("artifact not found: {0}")]
    NotFound(PathBuf),

    #[error("failed to read artifact {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("artifact is empty: {0}")]
    Empty(PathBuf),
}

/// Failures while staging the artifact into a buffer account.
///
/// By the time one of these is returned the staging buffer has already been
/// closed (best-effort).
#[derive(Debug, Error)]
pub enum StageError {
    #[error("failed to allocate buffer account: {0}")]
    Allocate(GatewayError),

    #[error("chunk at offset {offset} failed after {attempts} attempts: {source}")]
    Chunk {
        offset: u64,
        attempts: u32,
        source: GatewayError,
    },

    #[error("chunk at offset {offset} was never confirmed: {source}")]
    Confirm { offset: u64, source: GatewayError },

    #[error("staging cancelled")]
    Cancelled,
}

/// Failures while reconciling program account capacity.
#[derive(Debug, Error)]
pub enum ExtendError {
    #[error("failed to query program account: {0}")]
    Query(GatewayError),

    #[error("failed to extend program account: {0}")]
    Extend(GatewayError),

    /// The gateway reported the extension as successful but a re-query still
    /// shows insufficient capacity. Must not be silently accepted.
    #[error("extension did not take effect: capacity {capacity} still below required {required}")]
    NotApplied { required: u64, capacity: u64 },
}

/// Terminal failure of a deployment attempt.
#[derive(Debug, Error)]
pub enum DeployError {
    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    #[error(transparent)]
    Stage(#[from] StageError),

    #[error(transparent)]
    Extend(#[from] ExtendError),

    #[error("activation failed after {attempts} attempts: {source}")]
    Activation { attempts: u32, source: GatewayError },

    #[error("post-activation read-back failed: {0}")]
    Verification(GatewayError),

    /// The on-chain content does not match the artifact even though the
    /// cluster reported activation as successful. Funds and state have
    /// already moved; this requires manual investigation.
    #[error("on-chain program does not match artifact: expected sha256:{expected}, found {actual}")]
    VerificationMismatch { expected: String, actual: String },

    #[error("deployment cancelled")]
    Cancelled,
}
