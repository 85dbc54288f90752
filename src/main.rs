// SPDX-License-Identifier: MIT

use clap::Parser;
use equilibra::app::config::GlobalSettings;
use equilibra::app::logging::setup_logging;
use equilibra::common::metrics::EngineStats;
use equilibra::domain::constants::NATIVE_TOKEN;
use equilibra::domain::error::AppError;
use equilibra::infrastructure::data::Database;
use equilibra::infrastructure::network::price_feed::PriceFeed;
use equilibra::infrastructure::network::provider::ConnectionFactory;
use equilibra::infrastructure::network::relayer::Relayer;
use equilibra::infrastructure::network::treasury::TreasuryReader;
use equilibra::services::rebalance::notifier::Notifier;
use equilibra::services::rebalance::{
    Engine, MultiSig, ProposalService, Scheduler, ServiceDefaults,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[command(author, version, about = "equilibra treasury rebalancing engine")]
struct Cli {
    /// Path to config file (default: config.{toml,yaml,...})
    #[arg(long)]
    config: Option<String>,

    /// Do not submit transactions, only log what would be executed
    #[arg(long, default_value_t = false)]
    dry_run: bool,

    /// Metrics port (overrides config/env)
    #[arg(long)]
    metrics_port: Option<u16>,

    /// Disable the periodic allocation check (notifier/facade only)
    #[arg(long, default_value_t = false)]
    no_scheduler: bool,
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let cli = Cli::parse();

    let settings = GlobalSettings::load_with_path(cli.config.as_deref())?;
    let log_level = if settings.debug { "debug" } else { "info" };
    setup_logging(log_level, false);

    let dry_run = settings.dry_run || cli.dry_run;
    let metrics_port = cli.metrics_port.unwrap_or(settings.metrics_port);
    let scheduler_enabled = settings.scheduler_enabled && !cli.no_scheduler;

    let provider = ConnectionFactory::http(&settings.rpc_url)?;
    let reader = Arc::new(TreasuryReader::new(
        provider.clone(),
        settings.treasury_controller,
        settings.chain_id,
    ));
    let feed = PriceFeed::new(provider.clone(), settings.chainlink_feed_addresses()?);
    let store = Arc::new(Database::new(&settings.database_url()).await?);

    let relayer = match settings.relayer_signer()? {
        Some(signer) => {
            let relayer = Relayer::new(
                &settings.rpc_url,
                provider.clone(),
                signer,
                settings.treasury_controller,
                settings.receipt_policy(),
                dry_run,
            )?;
            tracing::info!(
                relayer = %relayer.signer_address(),
                dry_run,
                "Relayer initialized"
            );
            Some(Arc::new(relayer))
        }
        None => {
            tracing::info!("No relayer key configured; execution disabled");
            None
        }
    };

    let multisig = if settings.multisig_enabled() {
        tracing::info!(owners = settings.owners.len(), "Multisig confirmation enabled");
        Some(MultiSig::new(settings.owners.clone(), store.clone()))
    } else {
        None
    };

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let stats = Arc::new(EngineStats::default());

    let defaults = ServiceDefaults {
        token: settings.tokens.first().copied().unwrap_or(NATIVE_TOKEN),
        strategy: settings.default_strategy,
    };
    let service = Arc::new(ProposalService::new(
        store.clone(),
        multisig,
        relayer,
        events_tx.clone(),
        stats.clone(),
        defaults,
        settings.auto_execute,
    ));

    if reader.is_connected().await {
        match reader.is_strategy_whitelisted(settings.default_strategy).await {
            Ok(true) => {}
            Ok(false) => tracing::warn!(
                strategy = %settings.default_strategy,
                "Default strategy is not whitelisted on the controller"
            ),
            Err(e) => tracing::warn!(error = %e, "Strategy whitelist check failed"),
        }
    } else {
        tracing::warn!(rpc = %settings.rpc_url, "Chain not reachable at startup; checks will retry");
    }

    let scheduler = if scheduler_enabled {
        Some(Scheduler::new(
            reader,
            feed,
            store,
            service.clone(),
            settings.decision_config()?,
            settings.tokens.clone(),
            settings.check_interval(),
            events_tx.clone(),
            stats.clone(),
        ))
    } else {
        None
    };

    let notifier = Notifier::new(
        settings.discord_webhook_url.clone(),
        settings.telegram_bot_token.clone(),
        settings.telegram_chat_id.clone(),
    );

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown signal received");
            signal_token.cancel();
        }
    });

    tracing::info!(
        chain_id = settings.chain_id,
        controller = %settings.treasury_controller,
        execution = service.execution_enabled(),
        multisig = service.multisig_enabled(),
        "Equilibra engine starting"
    );

    Engine::new(scheduler, notifier, events_rx, stats, metrics_port, shutdown)
        .run()
        .await
}
