use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use trend_bot::config;
use trend_bot::core::engine::Engine;
use trend_bot::core::volatility::InstrumentSpec;
use trend_bot::execution::PaperBroker;
use trend_bot::logging;

/// How often the replay watcher checks whether every feed has run out.
const REPLAY_POLL: Duration = Duration::from_millis(250);

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    let config_dir = std::env::var("BOT_CONFIG_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config"));

    let config = config::load_config(&config_dir)?;
    let _guard = logging::init_tracing(&config.app.logging)?;

    info!(
        instruments = config.trading.instruments.len(),
        timeframe = config.trading.timeframe.as_str(),
        min_confidence = config.signals.scoring.min_confidence,
        tag = config.trading.tag,
        "trend bot starting"
    );

    let specs: Vec<InstrumentSpec> = config
        .trading
        .instruments
        .iter()
        .map(InstrumentSpec::from_config)
        .collect();
    for spec in &specs {
        info!(
            symbol = %spec.symbol,
            class = spec.class.as_str(),
            pip = %spec.pip,
            "instrument configured"
        );
    }

    let broker = Arc::new(
        PaperBroker::from_data_dir(&config.trading.paper, specs)
            .context("failed to load paper replay data")?,
    );

    let shutdown = CancellationToken::new();
    let mut engine = Engine::new(&config, broker.clone(), broker.clone(), shutdown.clone());

    // Ctrl-C
    {
        let token = shutdown.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("received Ctrl+C, initiating shutdown"),
                Err(e) => error!(error = %e, "failed to listen for Ctrl+C"),
            }
            token.cancel();
        });
    }

    // Replay end
    let watcher = {
        let token = shutdown.clone();
        let broker = broker.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(REPLAY_POLL) => {
                        if broker.exhausted().await {
                            info!("paper replay exhausted, initiating shutdown");
                            token.cancel();
                            break;
                        }
                    }
                }
            }
        })
    };

    let result = engine.run().await;
    shutdown.cancel();
    let _ = watcher.await;

    match &result {
        Ok(()) => info!("trend bot shut down cleanly"),
        Err(e) => error!(error = %e, "engine exited with error"),
    }
    result
}
