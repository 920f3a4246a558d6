//! The deployment state machine.
//!
//! An attempt moves `Building → Staged → SizeVerified → Activated →
//! Verified`, with `Failed` reachable from any non-terminal phase. Whatever
//! happens, every buffer the attempt created and activation did not consume
//! is closed before control returns.

use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use backon::Retryable;
use chrono::{DateTime, Utc};
use rand::Rng;
use tokio::sync::watch;

use crate::artifact::Artifact;
use crate::buffer::{BufferHandle, BufferManager};
use crate::config::DeployConfig;
use crate::error::{DeployError, ExtendError, StageError};
use crate::gateway::{AccountId, ChainGateway, GatewayError};
use crate::reconcile::SizeReconciler;

/// Phases of a deployment attempt.
///
/// `Verified` is the successful terminal phase; `Failed` the unsuccessful
/// one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum Phase {
    Building,
    Staged,
    SizeVerified,
    Activated,
    Verified,
    Failed,
}

/// Record of a completed deployment attempt.
#[derive(Debug, Clone)]
pub struct DeployReport {
    /// Generated attempt label, used to correlate log lines.
    pub label: String,
    pub program: AccountId,
    pub phase: Phase,
    /// Total transient-error retries across all remote operations.
    pub retries: u32,
    pub artifact_hash: String,
    /// Whether verification compared content hashes, or had to fall back to
    /// existence and capacity checks because the cluster exposes no hash.
    pub hash_checked: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl fmt::Display for DeployReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Deployment {}: {}", self.label, self.phase)?;
        writeln!(f, "  program:  {}", self.program)?;
        writeln!(f, "  artifact: sha256:{}", self.artifact_hash)?;
        writeln!(
            f,
            "  verified: {}",
            if self.hash_checked {
                "content hash"
            } else {
                "existence + capacity (cluster exposes no content hash)"
            }
        )?;
        write!(
            f,
            "  retries:  {} ({} ms)",
            self.retries,
            (self.finished_at - self.started_at).num_milliseconds()
        )
    }
}

/// Mutable state of an in-flight attempt, tracked so the cleanup path knows
/// what to release.
struct Attempt {
    phase: Phase,
    buffer: Option<BufferHandle>,
}

/// Top-level deployment orchestrator.
///
/// Holds the gateway and configuration for a pipeline; independent attempts
/// may run concurrently for different programs, each owning its buffers
/// exclusively.
pub struct DeployOrchestrator<G> {
    gateway: Arc<G>,
    buffers: BufferManager<G>,
    reconciler: SizeReconciler<G>,
    config: DeployConfig,
}

impl<G: ChainGateway> DeployOrchestrator<G> {
    pub fn new(gateway: Arc<G>, config: DeployConfig) -> Self {
        let buffers = BufferManager::new(gateway.clone(), &config);
        let reconciler = SizeReconciler::new(gateway.clone(), config.min_extend_bytes);
        Self {
            gateway,
            buffers,
            reconciler,
            config,
        }
    }

    /// Run one full deployment attempt.
    ///
    /// Cancellation via `cancel` is observed at phase boundaries and between
    /// chunk submissions; cancelled or not, the buffer cleanup path always
    /// runs before this returns.
    pub async fn deploy(
        &self,
        artifact_path: &Path,
        program: &AccountId,
        cancel: watch::Receiver<bool>,
    ) -> Result<DeployReport, DeployError> {
        let label = attempt_label();
        let started_at = Utc::now();
        let retries = AtomicU32::new(0);

        tracing::info!(label = %label, program = %program, "Starting deployment attempt...");

        let mut attempt = Attempt {
            phase: Phase::Building,
            buffer: None,
        };

        let result = self
            .run_pipeline(artifact_path, program, &cancel, &retries, &mut attempt)
            .await;

        // Cleanup guarantee: close whatever buffer this attempt still owns,
        // on success, failure and cancellation alike. Activation consumes
        // the buffer on success, in which case there is nothing left here.
        if let Some(buffer) = attempt.buffer.take() {
            self.buffers.discard(&buffer.id).await;
        }

        let finished_at = Utc::now();
        match result {
            Ok((artifact_hash, hash_checked)) => {
                let report = DeployReport {
                    label,
                    program: program.clone(),
                    phase: Phase::Verified,
                    retries: retries.load(Ordering::Relaxed),
                    artifact_hash,
                    hash_checked,
                    started_at,
                    finished_at,
                };
                tracing::info!(
                    label = %report.label,
                    program = %program,
                    retries = report.retries,
                    "Deployment verified"
                );
                Ok(report)
            }
            Err(err) => {
                tracing::error!(
                    label = %label,
                    program = %program,
                    phase = %Phase::Failed,
                    reached = %attempt.phase,
                    error = %err,
                    "Deployment attempt failed"
                );
                Err(err)
            }
        }
    }

    async fn run_pipeline(
        &self,
        artifact_path: &Path,
        program: &AccountId,
        cancel: &watch::Receiver<bool>,
        retries: &AtomicU32,
        attempt: &mut Attempt,
    ) -> Result<(String, bool), DeployError> {
        let artifact = Artifact::load(artifact_path)?;
        tracing::info!(
            path = %artifact.path().display(),
            len = artifact.len(),
            hash = %artifact.hash(),
            "Artifact loaded"
        );
        ensure_live(cancel)?;

        // Building -> Staged
        let staged = match self.buffers.stage(&artifact, cancel, retries).await {
            Ok(handle) => handle,
            Err(StageError::Cancelled) => return Err(DeployError::Cancelled),
            Err(err) => return Err(err.into()),
        };
        attempt.phase = Phase::Staged;
        attempt.buffer = Some(staged.clone());
        tracing::info!(buffer = %staged.id, chunks = staged.chunks, "Artifact staged");
        ensure_live(cancel)?;

        // Staged -> SizeVerified
        self.reconciler
            .ensure_capacity(program, artifact.len())
            .await?;
        attempt.phase = Phase::SizeVerified;
        ensure_live(cancel)?;

        // SizeVerified -> Activated
        self.activate(program, &staged, retries).await?;
        attempt.phase = Phase::Activated;
        // The cluster closed the buffer when it consumed it; dropping our
        // claim keeps the cleanup path from double-closing.
        attempt.buffer = None;
        tracing::info!(program = %program, "Program activated");
        ensure_live(cancel)?;

        // Activated -> Verified
        self.verify(program, &artifact).await
    }

    /// Activate the staged buffer, retrying transient failures with backoff.
    ///
    /// An activation rejected for undersized account data is not blindly
    /// retried: it re-runs the size reconciler once and resumes from the
    /// size check. A second rejection after that is terminal.
    async fn activate(
        &self,
        program: &AccountId,
        staged: &BufferHandle,
        retries: &AtomicU32,
    ) -> Result<(), DeployError> {
        let mut remediated = false;
        loop {
            let outcome = (|| async { self.gateway.activate_program(program, &staged.id).await })
                .retry(self.config.retry.backoff())
                .when(GatewayError::is_transient)
                .notify(|err, delay| {
                    retries.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(error = %err, delay = ?delay, "Activation failed, retrying...");
                })
                .await;

            match outcome {
                Ok(()) => return Ok(()),
                Err(GatewayError::AccountDataTooSmall) if !remediated => {
                    tracing::warn!(
                        program = %program,
                        "Activation rejected: account data too small, reconciling size..."
                    );
                    self.reconciler.ensure_capacity(program, staged.len).await?;
                    remediated = true;
                }
                Err(source) => {
                    return Err(DeployError::Activation {
                        attempts: self.config.retry.max_retries + 1,
                        source,
                    });
                }
            }
        }
    }

    /// Read the program back and check it against the artifact.
    async fn verify(
        &self,
        program: &AccountId,
        artifact: &Artifact,
    ) -> Result<(String, bool), DeployError> {
        let info = self
            .gateway
            .get_account_info(program)
            .await
            .map_err(DeployError::Verification)?;

        let expected = artifact.hash().to_string();
        match info.content_hash {
            Some(actual) if actual == expected => {
                tracing::info!(program = %program, hash = %expected, "On-chain content verified");
                Ok((expected, true))
            }
            Some(actual) => Err(DeployError::VerificationMismatch { expected, actual }),
            None => {
                // The cluster does not expose a content hash; the best we
                // can check is that the account exists and can hold the
                // artifact.
                if info.exists && info.capacity >= artifact.len() {
                    tracing::warn!(
                        program = %program,
                        "Cluster exposes no content hash, verified by existence and capacity only"
                    );
                    Ok((expected, false))
                } else {
                    Err(DeployError::VerificationMismatch {
                        expected,
                        actual: format!(
                            "account missing or undersized (capacity {})",
                            info.capacity
                        ),
                    })
                }
            }
        }
    }

    /// Operator-gated manual extension; returns the capacity after the
    /// extension is applied.
    pub async fn extend(&self, program: &AccountId, bytes: u64) -> Result<u64, ExtendError> {
        self.gateway
            .extend_program(program, bytes)
            .await
            .map_err(ExtendError::Extend)?;

        let info = self
            .gateway
            .get_account_info(program)
            .await
            .map_err(ExtendError::Query)?;
        Ok(info.capacity)
    }
}

fn ensure_live(cancel: &watch::Receiver<bool>) -> Result<(), DeployError> {
    if *cancel.borrow() {
        Err(DeployError::Cancelled)
    } else {
        Ok(())
    }
}

/// Memorable attempt label, e.g. "slip-quiet-harbor-4821".
fn attempt_label() -> String {
    let name = names::Generator::default()
        .next()
        .unwrap_or_else(|| "attempt".to_string());
    format!("slip-{}-{}", name, rand::rng().random_range(1000..=9999))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_display() {
        assert_eq!(Phase::Building.to_string(), "Building");
        assert_eq!(Phase::SizeVerified.to_string(), "SizeVerified");
        assert_eq!(Phase::Failed.to_string(), "Failed");
    }

    #[test]
    fn test_attempt_labels_are_prefixed_and_unique_enough() {
        let a = attempt_label();
        let b = attempt_label();
        assert!(a.starts_with("slip-"));
        assert!(b.starts_with("slip-"));
        // Two draws colliding on both name and suffix is vanishingly rare.
        assert_ne!(a, b);
    }

    #[test]
    fn test_report_display_mentions_outcome() {
        let now = Utc::now();
        let report = DeployReport {
            label: "slip-test-0001".to_string(),
            program: AccountId::new("prog"),
            phase: Phase::Verified,
            retries: 2,
            artifact_hash: "deadbeef".to_string(),
            hash_checked: true,
            started_at: now,
            finished_at: now,
        };

        let rendered = report.to_string();
        assert!(rendered.contains("Verified"));
        assert!(rendered.contains("sha256:deadbeef"));
        assert!(rendered.contains("retries:  2"));
    }
}
