//! slipway is a CLI tool to deploy executable programs to a remote
//! validator cluster.

mod cli;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use tokio::sync::watch;

use cli::{Cli, Command};
use slipway_deploy::{
    AccountId, ChainGateway, DeployConfig, DeployOrchestrator, HttpGateway, SLIPCONF_FILENAME,
    program_status, render_buffers,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize the logger.
    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity)
        .init();

    // `init` runs before any config loading; it writes the file the other
    // commands would read.
    if let Command::Init { path } = &cli.command {
        let target = path.join(SLIPCONF_FILENAME);
        if target.exists() {
            anyhow::bail!("Configuration file already exists: {}", target.display());
        }
        DeployConfig::default().save_to_file(&target)?;
        println!("Wrote {}", target.display());
        return Ok(());
    }

    let config = load_config(&cli)?;
    let gateway = Arc::new(HttpGateway::from_config(&config)?);

    match cli.command {
        Command::Deploy {
            artifact,
            program_id,
        } => {
            let program = AccountId::new(program_id);
            let orchestrator = DeployOrchestrator::new(gateway, config);

            let (cancel_tx, cancel_rx) = watch::channel(false);

            // Ctrl-C flips the cancellation signal; the orchestrator still
            // runs its buffer cleanup before reporting.
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::warn!("Interrupt received, cancelling deployment...");
                    let _ = cancel_tx.send(true);
                }
            });

            match orchestrator.deploy(&artifact, &program, cancel_rx).await {
                Ok(report) => println!("{report}"),
                Err(err) => {
                    tracing::error!(error = %err, "Deployment failed");
                    std::process::exit(cli::exit_code(&err) as i32);
                }
            }
        }

        Command::Extend { program_id, bytes } => {
            let program = AccountId::new(program_id);
            let orchestrator = DeployOrchestrator::new(gateway, config);

            let capacity = orchestrator
                .extend(&program, bytes)
                .await
                .context("Failed to extend program account")?;
            println!("{} capacity is now {} bytes", program, capacity);
        }

        Command::Status {
            program_id,
            buffers,
        } => {
            if buffers {
                let authority = gateway.authority().clone();
                let open = gateway
                    .list_buffers(&authority)
                    .await
                    .context("Failed to list buffer accounts")?;

                if open.is_empty() {
                    println!("No open buffer accounts for {}", authority);
                } else {
                    println!("{}", render_buffers(&authority, &open));
                }
            } else {
                // Clap guarantees program_id is present when --buffers is not.
                let program = AccountId::new(program_id.expect("program_id required"));
                let status = program_status(gateway.as_ref(), &program)
                    .await
                    .context("Failed to query program status")?;
                println!("{status}");
            }
        }

        Command::Init { .. } => unreachable!("handled above"),
    }

    Ok(())
}

/// Layered configuration: serialized defaults, then Slipway.toml, then
/// SLIPWAY_* environment variables, then explicit CLI flags.
fn load_config(cli: &Cli) -> Result<DeployConfig> {
    let figment = Figment::from(Serialized::defaults(DeployConfig::default()));
    let figment = match &cli.config {
        Some(path) => figment.merge(Toml::file_exact(path)),
        None => figment.merge(Toml::file(SLIPCONF_FILENAME)),
    };

    let mut config: DeployConfig = figment
        .merge(Env::prefixed("SLIPWAY_"))
        .extract()
        .context("Failed to load configuration")?;

    if let Some(url) = &cli.cluster_url {
        config.cluster_url = url.clone();
    }
    if let Some(keypair) = &cli.keypair {
        config.keypair_path = keypair.clone();
    }

    config.validate()?;
    Ok(config)
}
