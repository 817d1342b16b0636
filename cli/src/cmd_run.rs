//! The `run` command: wire ledger, clients, scanners, sinks, and the
//! engine, then tick until cancelled.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::Args;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use chainwatch_algorand::{AlgodClient, HttpAlgodClient};
use chainwatch_core::{SourceScanner, WatchError};
use chainwatch_engine::Engine;
use chainwatch_evm::{load_abi_dirs, EvmClient, HttpEvmClient};
use chainwatch_ledger::{Ledger, SqliteLedger};
use chainwatch_observability::{init_tracing, HealthState, Probe, WatchMetrics};
use chainwatch_sink::{HttpSender, Sender};

#[derive(Args)]
pub struct RunArgs {
    /// Process one tick and exit
    #[arg(long)]
    pub once: bool,
    /// Evaluate rules but do not send to sinks
    #[arg(long)]
    pub dry_run: bool,
    /// Start from this height/round (overrides configured start specs)
    #[arg(long, default_value_t = 0)]
    pub from: u64,
    /// Stop once every source reached this height/round (0 = run forever)
    #[arg(long, default_value_t = 0)]
    pub to: u64,
    /// Serve /healthz and /metrics on this address (e.g. 127.0.0.1:8080)
    #[arg(long)]
    pub health: Option<SocketAddr>,
    /// Log level directive (e.g. "info" or "debug,sqlx=warn")
    #[arg(long, default_value = "info")]
    pub log_level: String,
    /// Emit JSON structured logs
    #[arg(long)]
    pub log_json: bool,
    /// Seconds between ticks
    #[arg(long, default_value_t = 1)]
    pub interval: u64,
}

struct LedgerProbe(Arc<dyn Ledger>);

#[async_trait]
impl Probe for LedgerProbe {
    async fn ping(&self) -> Result<(), WatchError> {
        self.0.ping().await
    }
}

struct EvmProbe(Arc<HttpEvmClient>);

#[async_trait]
impl Probe for EvmProbe {
    async fn ping(&self) -> Result<(), WatchError> {
        self.0.header_by_number(None).await.map(|_| ())
    }
}

struct AlgodProbe(Arc<HttpAlgodClient>);

#[async_trait]
impl Probe for AlgodProbe {
    async fn ping(&self) -> Result<(), WatchError> {
        self.0.last_round().await.map(|_| ())
    }
}

pub async fn run(config_path: &str, args: RunArgs) -> Result<()> {
    init_tracing(&args.log_level, args.log_json);

    let cfg = chainwatch_config::load(config_path).context("load config")?;
    let rules = cfg.rule_specs()?;

    let ledger: Arc<dyn Ledger> = Arc::new(
        SqliteLedger::open(&cfg.global.db_path)
            .await
            .context("open ledger")?,
    );

    let mut scanners: Vec<Arc<dyn SourceScanner>> = Vec::new();
    let mut probes: Vec<(String, Arc<dyn Probe>)> =
        vec![("db".to_string(), Arc::new(LedgerProbe(ledger.clone())) as _)];

    for src in &cfg.sources {
        match src.kind.to_ascii_lowercase().as_str() {
            "evm" => {
                let client = Arc::new(HttpEvmClient::new(&src.rpc_url)?);
                let catalog = load_abi_dirs(&src.abi_dirs)?;
                let start = if args.from > 0 {
                    args.from.to_string()
                } else {
                    src.start_block.clone()
                };
                let scanner = chainwatch_evm::Scanner::new(
                    client.clone(),
                    ledger.clone(),
                    &src.id,
                    start,
                    cfg.confirmations("evm"),
                    &rules,
                    &catalog,
                )?;
                scanners.push(Arc::new(scanner));
                probes.push((format!("rpc_{}", src.id), Arc::new(EvmProbe(client)) as _));
            }
            "algorand" => {
                let token = if src.algod_token.is_empty() {
                    None
                } else {
                    Some(src.algod_token.clone())
                };
                let client = Arc::new(HttpAlgodClient::new(&src.algod_url, token)?);
                let start = if args.from > 0 {
                    args.from.to_string()
                } else {
                    src.start_round.clone()
                };
                let scanner = chainwatch_algorand::Scanner::new(
                    client.clone(),
                    ledger.clone(),
                    &src.id,
                    start,
                    cfg.confirmations("algorand"),
                    &rules,
                )?;
                scanners.push(Arc::new(scanner));
                probes.push((format!("rpc_{}", src.id), Arc::new(AlgodProbe(client)) as _));
            }
            other => {
                anyhow::bail!("source {}: unsupported type {other:?}", src.id);
            }
        }
    }

    let mut sinks: HashMap<String, Arc<dyn Sender>> = HashMap::new();
    for sink in &cfg.sinks {
        let sender: Arc<dyn Sender> = match sink.kind.to_ascii_lowercase().as_str() {
            "slack" => Arc::new(HttpSender::slack(&sink.id, &sink.webhook_url, &sink.template)?),
            "teams" => Arc::new(HttpSender::teams(&sink.id, &sink.webhook_url, &sink.template)?),
            "webhook" => Arc::new(HttpSender::webhook(
                &sink.id,
                &sink.url,
                &sink.method,
                &sink.template,
            )?),
            _ => continue,
        };
        sinks.insert(sink.id.clone(), sender);
    }

    let metrics = Arc::new(WatchMetrics::new());
    if let Some(addr) = args.health {
        let state = Arc::new(HealthState {
            probes,
            metrics: Some(metrics.clone()),
        });
        info!(%addr, "health/metrics server enabled");
        tokio::spawn(async move {
            if let Err(e) = chainwatch_observability::serve(addr, state).await {
                error!(error = %e, "health server stopped");
            }
        });
    }

    let mut engine = Engine::new(ledger, scanners, sinks, rules, args.dry_run, args.to)?;

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });
    }

    info!(dry_run = args.dry_run, once = args.once, "chainwatch running");
    loop {
        match engine.tick().await {
            Ok(stats) => {
                metrics.blocks_processed.inc();
                metrics.alerts_sent.inc_by(stats.sent);
                metrics.alerts_dropped.inc_by(stats.dropped());
                info!(
                    events = stats.events,
                    sent = stats.sent,
                    dropped = stats.dropped(),
                    reorgs = stats.reorgs,
                    "tick complete"
                );
            }
            Err(e) => {
                // Transient per-tick failures are logged and retried next
                // tick; only construction-time errors abort the process.
                metrics.errors.inc();
                error!(error = %e, "tick failed");
            }
        }

        if args.once {
            break;
        }
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("shutdown requested");
                break;
            }
            _ = tokio::time::sleep(Duration::from_secs(args.interval.max(1))) => {}
        }
    }

    Ok(())
}
