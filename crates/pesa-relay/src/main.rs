//! # pesa-relay
//!
//! Payment-status relay binary. Loads settings, wires the gateway client
//! and serves webhooks plus the `/ws/payments` subscriber stream until
//! Ctrl-C.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use pesa_auth::{CredentialCache, TokenProvider};
use pesa_gateway::DarajaClient;
use pesa_logging::LogLevel;
use pesa_server::config::ServerConfig;
use pesa_server::server::PesaServer;
use pesa_settings::PesaSettings;

/// Payment-status relay server.
#[derive(Parser, Debug)]
#[command(name = "pesa-relay", about = "M-Pesa payment-status relay")]
struct Cli {
    /// Settings file (defaults to `~/.pesa/settings.json`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Environment file read before settings (defaults to `./.env` when present).
    #[arg(long)]
    env_file: Option<PathBuf>,

    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Log as JSON lines.
    #[arg(long)]
    json_logs: bool,
}

impl Cli {
    /// Load `.env` into the process environment. Variables that are already
    /// set win. Returns the file that was read.
    fn load_env_file(&self) -> Result<Option<PathBuf>> {
        match &self.env_file {
            Some(path) => {
                dotenvy::from_path(path)
                    .with_context(|| format!("Failed to load env file {}", path.display()))?;
                Ok(Some(path.clone()))
            }
            None => Ok(dotenvy::dotenv().ok()),
        }
    }

    fn load_settings(&self) -> Result<PesaSettings> {
        let path = self.config.clone().unwrap_or_else(pesa_settings::settings_path);
        let mut settings = pesa_settings::load_settings_from_path(&path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?;
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if self.json_logs {
            settings.logging.json = true;
        }
        Ok(settings)
    }
}

fn build_gateway(settings: &PesaSettings) -> Result<Arc<DarajaClient>> {
    let gateway = &settings.gateway;
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(gateway.api_timeout_secs))
        .build()
        .context("Failed to build HTTP client")?;
    let cache = Arc::new(CredentialCache::with_margin(Duration::from_secs(
        gateway.token_expiry_margin_secs,
    )));
    let tokens = Arc::new(TokenProvider::new(
        http.clone(),
        gateway.oauth_url(),
        gateway.consumer_key.clone(),
        gateway.consumer_secret.clone(),
        cache,
    ));
    Ok(Arc::new(DarajaClient::new(http, gateway.clone(), tokens)))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let env_file = cli.load_env_file()?;
    let settings = cli.load_settings()?;

    pesa_logging::init_subscriber(
        LogLevel::from_str_lossy(&settings.logging.level),
        settings.logging.json,
    );
    if let Some(path) = env_file {
        tracing::info!(path = %path.display(), "loaded environment file");
    }

    // The hub and webhooks work without gateway credentials; only payment
    // initiation needs them.
    if let Err(e) = settings.validate() {
        tracing::warn!(error = %e, "gateway settings incomplete, payment initiation will fail");
    }

    let metrics = pesa_server::metrics::install_recorder()
        .context("Failed to install Prometheus metrics recorder")?;

    let gateway = build_gateway(&settings)?;
    tracing::info!(gateway = ?gateway, "gateway client ready");

    let config = ServerConfig::from(&settings.server);
    let handle = PesaServer::new(config, gateway)
        .with_metrics(metrics)
        .listen()
        .await
        .context("Failed to bind listener")?;

    tracing::info!(addr = %handle.addr(), "payment relay started");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    tracing::info!("shutdown signal received");
    let report = handle.shutdown(None).await;
    if !report.is_clean() {
        tracing::warn!(
            failed = ?report.failed,
            aborted = ?report.aborted,
            "some relay tasks did not stop cleanly"
        );
    }
    tracing::info!("payment relay stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_overrides_settings() {
        let dir = tempfile::tempdir().unwrap();
        let cli = Cli::parse_from([
            "pesa-relay",
            "--config",
            dir.path().join("missing.json").to_str().unwrap(),
            "--host",
            "127.0.0.1",
            "--port",
            "9100",
            "--json-logs",
        ]);
        let settings = cli.load_settings().unwrap();
        assert_eq!(settings.server.host, "127.0.0.1");
        assert_eq!(settings.server.port, 9100);
        assert!(settings.logging.json);
    }

    #[test]
    fn cli_defaults_leave_settings_alone() {
        let cli = Cli::parse_from(["pesa-relay"]);
        assert!(cli.config.is_none());
        assert!(cli.env_file.is_none());
        assert!(cli.host.is_none());
        assert!(cli.port.is_none());
        assert!(!cli.json_logs);
    }

    #[test]
    fn env_file_feeds_settings_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let env_path = dir.path().join("relay.env");
        std::fs::write(&env_path, "INITIATOR_NAME=dotenv-initiator\n").unwrap();
        let cli = Cli::parse_from([
            "pesa-relay",
            "--env-file",
            env_path.to_str().unwrap(),
            "--config",
            dir.path().join("missing.json").to_str().unwrap(),
        ]);

        let loaded = cli.load_env_file().unwrap();
        assert_eq!(loaded.as_deref(), Some(env_path.as_path()));
        assert_eq!(
            std::env::var("INITIATOR_NAME").as_deref(),
            Ok("dotenv-initiator")
        );
        let settings = cli.load_settings().unwrap();
        assert_eq!(settings.gateway.initiator_name, "dotenv-initiator");
    }

    #[test]
    fn missing_explicit_env_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let cli = Cli::parse_from([
            "pesa-relay",
            "--env-file",
            dir.path().join("absent.env").to_str().unwrap(),
        ]);
        let err = cli.load_env_file().unwrap_err();
        assert!(err.to_string().contains("absent.env"), "{err}");
    }

    #[test]
    fn gateway_client_builds_from_defaults() {
        let settings = PesaSettings::default();
        assert!(build_gateway(&settings).is_ok());
    }
}
