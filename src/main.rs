// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

use anyhow::{Context, Result};
use clap::Parser;
use hostnet_nsg::{
    azure::{credential::http_client, ArmClient},
    config::{Cli, Settings},
    constants::{TOKEN_REQUEST_TIMEOUT_SECS, TOKIO_WORKER_THREADS},
    controller::Controller,
    http,
    kubernetes::{self, pod_changes, KubePodSource},
    metrics,
    reconciler::Reconciler,
};
use std::time::Duration;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{debug, error, info};

fn main() -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(TOKIO_WORKER_THREADS)
        .thread_name("hostnet-nsg")
        .enable_all()
        .build()?;

    runtime.block_on(async_main())
}

/// Format: timestamp file:line LEVEL message
///
/// Respects `RUST_LOG` (default `info`) and `RUST_LOG_FORMAT=json`.
fn init_logging() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let log_format = std::env::var("RUST_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    match log_format.to_lowercase().as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .json()
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .with_ansi(true)
                .compact()
                .init();
        }
    }
}

async fn async_main() -> Result<()> {
    init_logging();
    info!("Starting hostNetwork NSG controller");

    let cli = Cli::parse();
    let settings = Settings::load(&cli).context("invalid configuration")?;
    info!(
        subnet = %settings.subnet,
        cloud = ?settings.cloud,
        credential = settings.credential.kind(),
        label = %settings.marker_label,
        prefix = %settings.rules.prefix,
        "Configuration loaded"
    );

    metrics::init();

    debug!("Initializing Kubernetes client");
    let client = kubernetes::client(settings.kubeconfig.as_deref()).await?;

    let token_client = http_client(Duration::from_secs(TOKEN_REQUEST_TIMEOUT_SECS))?;
    let credential = settings
        .credential
        .clone()
        .into_credential(settings.cloud, token_client);
    let arm = ArmClient::new(
        settings.cloud.resource_manager_endpoint(),
        credential,
        settings.poll,
    )?;

    let reconciler = Reconciler::new(
        KubePodSource::new(client.clone(), &settings.marker_label),
        arm,
        settings.subnet.clone(),
        settings.marker_label.clone(),
        settings.rules.clone(),
    );
    let controller = Controller::new(reconciler, settings.marker_label.clone(), settings.cooldown);

    let mut sigterm = signal(SignalKind::terminate())?;

    tokio::select! {
        result = controller.run(pod_changes(client)) => {
            error!("CRITICAL: controller exited unexpectedly: {:?}", result);
            result?;
            anyhow::bail!("controller exited unexpectedly without error")
        }
        result = http::serve(settings.metrics_address) => {
            error!("CRITICAL: metrics server exited unexpectedly: {:?}", result);
            result?;
            anyhow::bail!("metrics server exited unexpectedly without error")
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received SIGINT, shutting down");
        }
        _ = sigterm.recv() => {
            info!("Received SIGTERM, shutting down");
        }
    }

    Ok(())
}
