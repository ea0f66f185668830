//! Replica claim webhook server

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum_server::tls_rustls::RustlsConfig;
use axum_server::Handle;
use clap::Parser;
use kube::core::GroupVersionResource;
use kube::Client;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use claim_replica_webhook::client::KubeClaimClient;
use claim_replica_webhook::config::{
    WebhookConfig, DEFAULT_CLAIM_SUFFIX, DEFAULT_MANAGED_LABEL_KEY, DEFAULT_MANAGED_LABEL_VALUE,
    DEFAULT_TARGET_NODE,
};
use claim_replica_webhook::mutation::PodMutator;
use claim_replica_webhook::webhook::{webhook_router, WebhookState};
use claim_replica_webhook::{DEFAULT_LISTEN_ADDR, DEFAULT_TLS_CERT_FILE, DEFAULT_TLS_KEY_FILE};

/// Mutating admission webhook pointing managed Pods at replica claims
#[derive(Parser, Debug)]
#[command(name = "claim-replica-webhook", version, about, long_about = None)]
struct Cli {
    /// Address the HTTPS server binds to
    #[arg(long, env = "REPLICA_WEBHOOK_LISTEN_ADDR", default_value = DEFAULT_LISTEN_ADDR)]
    listen_addr: SocketAddr,

    /// Directory holding the serving certificate and key
    #[arg(long, env = "REPLICA_WEBHOOK_TLS_DIR", default_value = "/etc/webhook/certs")]
    tls_dir: PathBuf,

    /// Certificate file name inside the TLS directory
    #[arg(long, env = "REPLICA_WEBHOOK_TLS_CERT_FILE", default_value = DEFAULT_TLS_CERT_FILE)]
    tls_cert_file: String,

    /// Private key file name inside the TLS directory
    #[arg(long, env = "REPLICA_WEBHOOK_TLS_KEY_FILE", default_value = DEFAULT_TLS_KEY_FILE)]
    tls_key_file: String,

    /// Node managed Pods are pinned to via kubernetes.io/hostname
    #[arg(long, env = "REPLICA_WEBHOOK_TARGET_NODE", default_value = DEFAULT_TARGET_NODE)]
    target_node: String,

    /// Label key identifying managed Pods
    #[arg(long, env = "REPLICA_WEBHOOK_LABEL_KEY", default_value = DEFAULT_MANAGED_LABEL_KEY)]
    label_key: String,

    /// Label value identifying managed Pods
    #[arg(long, env = "REPLICA_WEBHOOK_LABEL_VALUE", default_value = DEFAULT_MANAGED_LABEL_VALUE)]
    label_value: String,

    /// Suffix appended to claim names to derive replica claims
    #[arg(long, env = "REPLICA_WEBHOOK_CLAIM_SUFFIX", default_value = DEFAULT_CLAIM_SUFFIX)]
    claim_suffix: String,

    /// Budget in milliseconds for claim reconciliation per admission
    #[arg(long, env = "REPLICA_WEBHOOK_RECONCILE_TIMEOUT_MS", default_value = "5000")]
    reconcile_timeout_ms: u64,

    /// Emit logs as JSON
    #[arg(long, env = "REPLICA_WEBHOOK_LOG_JSON")]
    log_json: bool,
}

impl Cli {
    fn webhook_config(&self) -> WebhookConfig {
        WebhookConfig {
            target_node: self.target_node.clone(),
            managed_label_key: self.label_key.clone(),
            managed_label_value: self.label_value.clone(),
            claim_suffix: self.claim_suffix.clone(),
            pod_resource: GroupVersionResource::gvr("", "v1", "pods"),
            reconcile_timeout: Duration::from_millis(self.reconcile_timeout_ms),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
        eprintln!("CRITICAL: Failed to install crypto provider: {:?}", e);
        std::process::exit(1);
    }

    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let config = cli.webhook_config();
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;

    tracing::info!(
        target_node = %config.target_node,
        label = %format!("{}={}", config.managed_label_key, config.managed_label_value),
        claim_suffix = %config.claim_suffix,
        "Replica claim webhook starting..."
    );

    let client = Client::try_default()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create Kubernetes client: {}", e))?;

    let mutator = PodMutator::new(config, Arc::new(KubeClaimClient::new(client)));
    let router = webhook_router(Arc::new(WebhookState::new(mutator)));

    let cert_path = cli.tls_dir.join(&cli.tls_cert_file);
    let key_path = cli.tls_dir.join(&cli.tls_key_file);
    let tls_config = RustlsConfig::from_pem_file(&cert_path, &key_path)
        .await
        .map_err(|e| {
            anyhow::anyhow!(
                "Failed to load TLS material from {:?} and {:?}: {}",
                cert_path,
                key_path,
                e
            )
        })?;

    let handle = Handle::new();
    tokio::spawn(shutdown_on_signal(handle.clone()));

    tracing::info!(addr = %cli.listen_addr, "Serving webhook over HTTPS");
    axum_server::bind_rustls(cli.listen_addr, tls_config)
        .handle(handle)
        .serve(router.into_make_service())
        .await
        .map_err(|e| anyhow::anyhow!("HTTPS server error: {}", e))?;

    tracing::info!("Replica claim webhook shutting down");
    Ok(())
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}

/// Stop accepting connections on SIGINT/SIGTERM and let in-flight reviews finish
async fn shutdown_on_signal(handle: Handle) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to listen for ctrl-c");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
    handle.graceful_shutdown(Some(Duration::from_secs(10)));
}
