//! Gatehouse - publishes served models behind an authenticated, rate-limited edge gateway

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use gatehouse_api::{start_server, AppState, ServerConfig};
use gatehouse_common::telemetry::{init_telemetry, TelemetryConfig};
use gatehouse_common::{mesh, KubeResourceStore};
use gatehouse_publisher::{PlatformConfig, Publisher};
use kube::Client;
use tracing::info;

/// Gatehouse - model publishing service
#[derive(Parser, Debug)]
#[command(name = "gatehouse", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Serve the publishing API (default mode)
    Serve(ServeArgs),
}

/// Serve mode arguments
#[derive(Parser, Debug)]
struct ServeArgs {
    /// Address to bind the API server
    #[arg(long, env = "GATEHOUSE_ADDR", default_value = "0.0.0.0:8080")]
    addr: SocketAddr,

    /// Operator tokens (comma separated)
    #[arg(long, env = "GATEHOUSE_OPERATOR_TOKENS", value_delimiter = ',', hide_env_values = true)]
    operator_tokens: Vec<String>,

    /// Public hostname used when a publish request names none
    #[arg(long, env = "GATEHOUSE_DEFAULT_HOSTNAME", default_value = "inference.platform.local")]
    default_hostname: String,

    /// URL scheme advertised in external URLs
    #[arg(long, default_value = "https")]
    external_scheme: String,

    /// Shared edge Gateway name
    #[arg(long, default_value = mesh::EDGE_GATEWAY_NAME)]
    gateway_name: String,

    /// Namespace of the edge Gateway and per-model routing objects
    #[arg(long, default_value = mesh::EDGE_GATEWAY_NAMESPACE)]
    gateway_namespace: String,

    /// TLS secret referenced by HTTPS listeners
    #[arg(long, default_value = mesh::EDGE_TLS_SECRET)]
    tls_secret_name: String,

    /// Mesh entry Service routes forward to
    #[arg(long, default_value = mesh::MESH_ENTRY_SERVICE)]
    mesh_service: String,

    /// Namespace of the mesh entry Service
    #[arg(long, default_value = mesh::MESH_ENTRY_NAMESPACE)]
    mesh_namespace: String,

    /// Port of the mesh entry Service
    #[arg(long, default_value_t = mesh::MESH_ENTRY_PORT)]
    mesh_port: u16,

    /// Namespace holding the key index
    #[arg(long, env = "GATEHOUSE_SYSTEM_NAMESPACE", default_value = gatehouse_common::GATEHOUSE_SYSTEM_NAMESPACE)]
    system_namespace: String,

    /// Namespace label identifying tenant namespaces
    #[arg(long, default_value = gatehouse_common::LABEL_TENANT)]
    tenant_label: String,

    /// Namespaces scanned when tenant namespaces cannot be listed (comma separated)
    #[arg(long, env = "GATEHOUSE_FALLBACK_TENANTS", value_delimiter = ',', default_value = "default")]
    fallback_tenants: Vec<String>,

    /// Seconds a tenant namespace listing is reused
    #[arg(long, default_value_t = 30)]
    tenant_cache_ttl_secs: u64,

    /// Days an issued key stays valid; 0 = never expires
    #[arg(long, env = "GATEHOUSE_KEY_TTL_DAYS", default_value_t = 365)]
    key_ttl_days: u64,

    /// Remove edge listeners for hostnames no published model uses
    #[arg(long, env = "GATEHOUSE_RETRACT_UNUSED_HOSTNAMES")]
    retract_unused_hostnames: bool,

    /// Human-readable logs instead of JSON
    #[arg(long)]
    text_logs: bool,
}

impl ServeArgs {
    fn platform_config(&self) -> anyhow::Result<PlatformConfig> {
        Ok(PlatformConfig {
            default_hostname: self.default_hostname.clone(),
            external_scheme: self.external_scheme.clone(),
            gateway_name: self.gateway_name.clone(),
            gateway_namespace: self.gateway_namespace.clone(),
            tls_secret_name: self.tls_secret_name.clone(),
            mesh_service: self.mesh_service.clone(),
            mesh_namespace: self.mesh_namespace.clone(),
            mesh_port: self.mesh_port,
            system_namespace: self.system_namespace.clone(),
            tenant_label: self.tenant_label.clone(),
            fallback_tenant_namespaces: self.fallback_tenants.clone(),
            tenant_cache_ttl: Duration::from_secs(self.tenant_cache_ttl_secs),
            key_ttl: key_ttl(self.key_ttl_days)?,
            retract_unused_hostnames: self.retract_unused_hostnames,
        })
    }
}

/// Key lifetime for a day count; 0 means keys never expire
fn key_ttl(days: u64) -> anyhow::Result<Option<Duration>> {
    if days == 0 {
        return Ok(None);
    }
    days.checked_mul(SECONDS_PER_DAY)
        .map(|secs| Some(Duration::from_secs(secs)))
        .ok_or_else(|| anyhow::anyhow!("--key-ttl-days {} is too large", days))
}

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // The kube client's TLS stack needs a process-wide crypto provider
    if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
        eprintln!("CRITICAL: Failed to install aws-lc-rs crypto provider: {:?}", e);
        std::process::exit(1);
    }

    let cli = Cli::parse();
    let args = match cli.command {
        Some(Commands::Serve(args)) => args,
        None => ServeArgs::parse_from(["gatehouse"]),
    };

    init_telemetry(TelemetryConfig {
        json_logs: !args.text_logs,
        ..Default::default()
    })?;

    run_server(args).await
}

/// Connect to the cluster and serve the API until shutdown
async fn run_server(args: ServeArgs) -> anyhow::Result<()> {
    let client = Client::try_default()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create Kubernetes client: {}", e))?;
    let store = Arc::new(KubeResourceStore::new(client));

    let platform = args.platform_config()?;
    info!(
        gateway = %format!("{}/{}", platform.gateway_namespace, platform.gateway_name),
        default_hostname = %platform.default_hostname,
        operator_tokens = args.operator_tokens.len(),
        "Starting gatehouse"
    );
    if args.operator_tokens.is_empty() {
        tracing::warn!("no operator tokens configured; only read endpoints are usable");
    }

    let publisher = Publisher::new(store, platform);
    let state = AppState::new(publisher, &args.operator_tokens);
    start_server(ServerConfig { addr: args.addr }, state).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_ttl_days() {
        assert_eq!(key_ttl(0).unwrap(), None);
        assert_eq!(key_ttl(2).unwrap(), Some(Duration::from_secs(2 * SECONDS_PER_DAY)));
        assert!(key_ttl(u64::MAX).is_err());
    }
}
