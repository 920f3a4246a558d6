//! slipway-deploy - Deployment pipeline for executable programs.
//!
//! This crate orchestrates deploying a compiled bytecode artifact to a
//! program account on a remote validator cluster: stage the artifact into a
//! transient buffer, reconcile the target account's capacity, activate, and
//! verify the result. Transient failures are retried with backoff and
//! staging buffers are closed on every exit path.

mod artifact;
pub use artifact::{Artifact, content_hash};

mod buffer;
pub use buffer::{BufferHandle, BufferManager};

mod config;
pub use config::{DeployConfig, RetryConfig, SLIPCONF_FILENAME, default_keypair_path};

mod error;
pub use error::{ArtifactError, DeployError, ExtendError, StageError};

mod gateway;
pub use gateway::{AccountId, AccountInfo, BufferInfo, ChainGateway, GatewayError, Signature};

mod orchestrator;
pub use orchestrator::{DeployOrchestrator, DeployReport, Phase};

mod reconcile;
pub use reconcile::SizeReconciler;

mod rpc;
pub use rpc::HttpGateway;

mod status;
pub use status::{ProgramStatus, program_status, render_buffers};
