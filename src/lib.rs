pub mod channels;      // Inter-component communication channels
pub mod command;       // Control commands
pub mod config;        // Configuration management
pub mod coordinator;   // Single-flight access to the inverter
pub mod error;         // Error types
pub mod fronius;       // Fronius GEN24 register profile and control
pub mod modbus;        // Modbus TCP client, transport and register codec
pub mod options;       // Command line options parsing
pub mod prelude;       // Common imports and types
pub mod scheduler;     // Periodic poll requests
pub mod status_writer; // Latest telemetry snapshot on disk

const CARGO_PKG_VERSION: &str = env!("CARGO_PKG_VERSION");

use crate::prelude::*;

use crate::coordinator::Coordinator;
use crate::fronius::solar_api::SolarApi;
use crate::options::Action;
use crate::scheduler::Scheduler;
use crate::status_writer::StatusWriter;
use std::time::Duration;

fn init_logger(level: &str) {
    let result = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {} {}] {}",
                chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f"),
                record.level(),
                record.module_path().unwrap_or(""),
                record.args()
            )
        })
        .write_style(env_logger::WriteStyle::Never)
        .try_init();

    if let Err(e) = result {
        eprintln!("Failed to initialize logger: {}", e);
    }
}

pub async fn app(options: Options) -> Result<()> {
    let config = Config::new(options.config_file.clone())?;

    init_logger(config.loglevel());
    info!("fronius-bridge {} starting with config file: {}", CARGO_PKG_VERSION, options.config_file);
    config.log_summary();

    let channels = Channels::new();
    let coordinator = Coordinator::new(FroniusClient::from_config(&config), channels.clone());

    coordinator.init().await?;

    if config.solar_api && coordinator.with_client(|c| c.storage_configured()).await {
        match SolarApi::for_host(config.inverter().host(), config.request_timeout()) {
            Ok(api) => {
                let mut client = coordinator.client().await;
                client.read_storage_info(&api).await;
            }
            Err(e) => warn!("Solar API unavailable: {:#}", e),
        }
    }

    let action = options.action();
    let result = match action.command() {
        Some(command) => run_command(&coordinator, command).await,
        None if action == Action::Read => read_once(&coordinator).await,
        None => run(&config, &options, &coordinator, channels).await,
    };

    coordinator.close().await;
    result
}

async fn read_once(coordinator: &Coordinator<TcpTransport>) -> Result<()> {
    let report = coordinator
        .refresh()
        .await
        .ok_or_else(|| anyhow!("inverter busy"))?;

    if !report.success() {
        bail!("inverter block could not be read");
    }

    let snapshot = coordinator.with_client(|c| c.snapshot()).await;
    println!("{}", serde_json::to_string_pretty(&snapshot)?);

    Ok(())
}

async fn run_command(coordinator: &Coordinator<TcpTransport>, command: Command) -> Result<()> {
    // storage mode and limits are tracked from the first poll
    coordinator.refresh().await;

    match coordinator.process_command(command.clone()).await? {
        Some(outcome) => {
            println!("{}: {:?}", command.to_result_topic(), outcome);
            if outcome == CommandOutcome::Rejected {
                bail!("{} rejected", command.to_result_topic());
            }
        }
        None => bail!("inverter busy"),
    }

    Ok(())
}

async fn run(
    config: &Config,
    options: &Options,
    coordinator: &Coordinator<TcpTransport>,
    channels: Channels,
) -> Result<()> {
    let coordinator_handle = {
        let coordinator = coordinator.clone();
        tokio::spawn(async move {
            if let Err(e) = coordinator.start().await {
                error!("Coordinator task failed: {}", e);
            }
        })
    };

    let status_handle = match config.status_file() {
        Some(path) => {
            let writer = StatusWriter::new(path)?;
            let channels = channels.clone();
            Some(tokio::spawn(async move {
                if let Err(e) = writer.start(channels).await {
                    error!("Status writer failed: {}", e);
                }
            }))
        }
        None => None,
    };

    let scheduler = Scheduler::new(config.scan_interval(), channels.clone());
    let scheduler_handle = tokio::spawn(async move {
        if let Err(e) = scheduler.start().await {
            error!("Scheduler task failed: {}", e);
        }
    });

    match options.runtime {
        Some(secs) => {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(secs)) => info!("runtime limit reached"),
                _ = tokio::signal::ctrl_c() => info!("Shutdown signal received"),
            }
        }
        None => {
            tokio::signal::ctrl_c().await?;
            info!("Shutdown signal received");
        }
    }

    coordinator.stop();

    if let Err(e) = coordinator_handle.await {
        error!("Error waiting for coordinator task: {}", e);
    }
    if let Err(e) = scheduler_handle.await {
        error!("Error waiting for scheduler task: {}", e);
    }
    if let Some(handle) = status_handle {
        if let Err(e) = handle.await {
            error!("Error waiting for status writer: {}", e);
        }
    }

    coordinator.stats().print_summary();
    info!("Shutdown complete");

    Ok(())
}
