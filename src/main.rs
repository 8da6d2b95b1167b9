use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use evoguard::config::{AppConfig, ConfigManager};
use evoguard::data::{CsvConnector, MarketDataWindow, SyntheticMarket};
use evoguard::engines::generation::{EvolutionScheduler, ProgressMessage, TerminationReason};
use evoguard::engines::risk::{PositionSnapshot, RiskController, RiskMonitor, SharedLiveState};
use evoguard::execution::{ChannelExecutionSink, ExecutionSignal};
use evoguard::services::{Checkpointer, EvolutionRunner};
use evoguard::storage::JsonSnapshotStore;
use std::path::PathBuf;
use std::sync::mpsc::channel;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "evoguard", about = "Evolve options market-making parameters behind a risk gate")]
struct Cli {
    /// TOML config; `EVOGUARD__*` environment variables override it.
    #[arg(long, env = "EVOGUARD_CONFIG")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run evolution against CSV or synthetic market data.
    Run {
        #[arg(long)]
        csv: Option<PathBuf>,
        #[arg(long, default_value = "SPX")]
        symbol: String,
        /// Bars of seeded random-walk data to use instead of a CSV.
        #[arg(long, default_value_t = 500)]
        synthetic_bars: usize,
        #[arg(long)]
        seed: Option<u64>,
        #[arg(long)]
        generations: Option<usize>,
        /// Snapshot file for resuming interrupted runs.
        #[arg(long)]
        snapshot: Option<PathBuf>,
    },
    /// Load and validate a config file.
    CheckConfig,
    /// Write the default configuration as TOML.
    WriteDefaultConfig { path: PathBuf },
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let manager = ConfigManager::new();
    if let Some(path) = &cli.config {
        manager
            .load_from_file(path)
            .with_context(|| format!("loading {}", path.display()))?;
    }

    match cli.command {
        Command::Run {
            csv,
            symbol,
            synthetic_bars,
            seed,
            generations,
            snapshot,
        } => {
            manager.update(|c| {
                if seed.is_some() {
                    c.evolution.seed = seed;
                }
                if let Some(n) = generations {
                    c.evolution.num_generations = n;
                }
            })?;
            let config = manager.get();
            let window = match csv {
                Some(path) => CsvConnector::load_window(&path, &symbol, None)
                    .with_context(|| format!("loading market data from {}", path.display()))?,
                None => SyntheticMarket::random_walk(
                    &symbol,
                    synthetic_bars,
                    100.0,
                    0.18,
                    config.evolution.seed.unwrap_or(7),
                )?,
            };
            run_evolution(config, window, snapshot)?;
        }
        Command::CheckConfig => {
            let config = manager.get();
            config.validate()?;
            println!(
                "ok: {} genes, population {}, {} generations",
                config.genes.genes.len(),
                config.evolution.population_size,
                config.evolution.num_generations
            );
        }
        Command::WriteDefaultConfig { path } => {
            if path.exists() {
                bail!("{} already exists", path.display());
            }
            ConfigManager::new().save_to_file(&path)?;
            println!("wrote {}", path.display());
        }
    }
    Ok(())
}

fn run_evolution(
    config: AppConfig,
    window: MarketDataWindow,
    snapshot: Option<PathBuf>,
) -> anyhow::Result<()> {
    let window = Arc::new(window);
    let (signal_tx, signal_rx) = channel::<ExecutionSignal>();
    let (alert_tx, alert_rx) = channel();

    let controller = Arc::new(RiskController::new(
        config.risk.clone(),
        Arc::new(ChannelExecutionSink::new(signal_tx)),
        Some(alert_tx),
    ));

    let signal_log = thread::spawn(move || {
        for signal in signal_rx {
            log::info!("execution signal: {:?}", signal);
        }
    });
    let alert_log = thread::spawn(move || {
        for alert in alert_rx {
            log::warn!("risk alert: {:?}", alert);
        }
    });

    let scheduler = EvolutionScheduler::new(
        &config,
        Arc::clone(&window),
        controller.clone(),
        controller.view(),
    )?;
    let checkpointer = snapshot.map(|path| {
        Checkpointer::new(Arc::new(JsonSnapshotStore::new(path)), Arc::clone(&controller))
    });

    let live_state = Arc::new(SharedLiveState::new());
    let monitor = RiskMonitor::spawn(
        Arc::clone(&controller),
        live_state.clone(),
        Duration::from_millis(config.risk.monitor_interval_ms),
    )?;

    let mut runner = EvolutionRunner::start(scheduler, checkpointer)?;
    let summary = loop {
        while let Some(message) = runner.poll_progress() {
            if let ProgressMessage::GenerationComplete {
                generation,
                best_fitness,
                hof_size,
            } = message
            {
                println!(
                    "generation {:>3}  best {:>10.4}  hall of fame {}",
                    generation, best_fitness, hof_size
                );
            }
        }
        if let Some(result) = runner.try_get_results() {
            break result?;
        }
        thread::sleep(Duration::from_millis(50));
    };

    // Watch the surviving elite on their simulated exposure.
    let market = evoguard::engines::risk::MarketSnapshot::from_window(&window);
    for genome in &summary.final_population.members {
        if let Some(exposure) = &genome.exposure {
            live_state.update(genome.id, PositionSnapshot::from_exposure(exposure), market.clone());
        }
    }
    RiskMonitor::run_cycle(&controller, live_state.as_ref());
    let cycles = monitor.stop();

    let risk = controller.summary();
    println!(
        "finished: {} generations ({})",
        summary.generations_completed,
        match summary.termination {
            TerminationReason::GenerationLimit => "generation limit",
            TerminationReason::Converged => "converged",
            TerminationReason::Cancelled => "cancelled",
        }
    );
    if let Some(best) = &summary.best {
        println!("best genome {} fitness {:.4}", best.id, best.scalar_fitness());
        for (gene, value) in &best.values {
            println!("  {:<24} {:.6}", gene, value);
        }
    }
    println!(
        "risk: {} tracked, {} approved, {} quarantined, {} rejected, {} critical alerts, {} monitor cycles",
        risk.tracked, risk.approved, risk.quarantined, risk.rejected, risk.critical_alerts, cycles
    );

    drop(runner);
    drop(controller);
    let _ = signal_log.join();
    let _ = alert_log.join();
    Ok(())
}
