use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use relayd::brand::{build_actuator, build_rn62, Ch340Relay, RelayActuator, RelayBrand};
use relayd::config::{self, AppConfig, ConfigStore};
use relayd::relay::{ActuationResult, RelayEngine};
use relayd::server::{self, CommandServer, Forwarder};
use relayd::utils::{bind_addr, bind_tokio_listener};

/// Log level for the application
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Verbose,
    Debug,
    Trace,
}

/// relayd command line arguments
#[derive(Parser, Debug)]
#[command(name = "relayd")]
#[command(version, about = "USB-HID, serial and GPIO relay actuation daemon", long_about = None)]
struct CliArgs {
    /// Configuration file (default: $RELAYD_CONFIG or /etc/relayd/config.json)
    #[arg(short = 'c', long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, verbose, debug, trace)
    #[arg(short = 'l', long, value_name = "LEVEL", default_value = "info", global = true)]
    log_level: LogLevel,

    /// Increase verbosity (-v for verbose, -vv for debug, -vvv for trace)
    #[arg(short = 'v', long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the command socket
    Serve {
        /// Listen address (overrides config)
        #[arg(short = 'a', long, value_name = "ADDRESS")]
        address: Option<String>,

        /// Listen port (overrides config)
        #[arg(short = 'p', long, value_name = "PORT")]
        port: Option<u16>,

        /// Also run the HTTP forwarder
        #[arg(long)]
        forward: bool,
    },

    /// Actuate a relay on this host and print the result
    Trigger {
        relay: u32,

        /// Hold duration in milliseconds
        #[arg(short = 'd', long, value_name = "MS")]
        duration: Option<u64>,
    },

    /// Actuate a relay through a brand-specific actuator
    Send {
        /// Relay brand (rn-62, raspberry-embed, jetson-embed, desktop-embed, ch340, local)
        #[arg(short = 'b', long)]
        brand: Option<String>,

        /// Remote host for network brands
        #[arg(long, value_name = "ADDRESS")]
        ip: Option<String>,

        /// Remote port for network brands
        #[arg(long, value_name = "PORT")]
        port: Option<u16>,

        /// CH340 converter index when several are attached
        #[arg(long, value_name = "INDEX")]
        device_index: Option<usize>,

        /// Pulse every relay at once (rn-62 only)
        #[arg(long, conflicts_with = "relay")]
        all: bool,

        #[arg(required_unless_present = "all")]
        relay: Option<u32>,

        /// Hold duration in milliseconds
        #[arg(short = 'd', long, value_name = "MS")]
        duration: Option<u64>,
    },

    /// Run only the HTTP forwarder
    Forward {
        /// Listen address (overrides config)
        #[arg(short = 'a', long, value_name = "ADDRESS")]
        address: Option<String>,

        /// Listen port (overrides config)
        #[arg(short = 'p', long, value_name = "PORT")]
        port: Option<u16>,

        /// Command socket to forward to, host:port (overrides config)
        #[arg(short = 't', long, value_name = "ADDR")]
        target: Option<String>,
    },

    /// List relay device candidates with their stable keys
    Devices,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();
    init_logging(args.log_level, args.verbose);

    let config_path = config::config_path(args.config);
    let config_store = ConfigStore::load(&config_path).await?;
    let mut config = (*config_store.get()).clone();
    tracing::debug!("Configuration loaded from {}", config_path.display());

    match args.command {
        Command::Serve {
            address,
            port,
            forward,
        } => {
            if let Some(address) = address {
                config.server.bind_address = address;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            serve(&config, forward).await
        }
        Command::Trigger { relay, duration } => {
            let engine = RelayEngine::from_config(&config)?;
            report(&format!("relay {}", relay), engine.trigger(relay, duration).await)
        }
        Command::Send {
            brand,
            ip,
            port,
            device_index,
            all,
            relay,
            duration,
        } => {
            let brand: RelayBrand = brand
                .or_else(|| config.brand.default.clone())
                .unwrap_or_else(|| RelayBrand::Local.to_string())
                .parse()?;

            let Some(relay) = relay else {
                if brand != RelayBrand::Rn62 {
                    anyhow::bail!("--all is only supported by rn-62, not {}", brand);
                }
                tracing::info!("Sending all relays via rn-62");
                let client = build_rn62(ip, port, &config)?;
                return report("all relays", client.trigger_all().await);
            };
            let actuator: Arc<dyn RelayActuator> = match brand {
                RelayBrand::Ch340 => {
                    Arc::new(Ch340Relay::from_config(&config)?.with_device_index(device_index))
                }
                _ => build_actuator(brand, ip, port, &config)?,
            };
            tracing::info!("Sending relay {} via {}", relay, actuator.name());
            report(&format!("relay {}", relay), actuator.trigger(relay, duration).await)
        }
        Command::Forward {
            address,
            port,
            target,
        } => {
            if let Some(address) = address {
                config.forwarder.bind_address = address;
            }
            if let Some(port) = port {
                config.forwarder.port = port;
            }
            if let Some(target) = target {
                config.forwarder.target = target;
            }
            tokio::select! {
                result = run_forwarder(&config) => result,
                _ = shutdown_signal() => Ok(()),
            }
        }
        Command::Devices => {
            let engine = RelayEngine::from_config(&config)?;
            let devices = engine.list_devices();
            println!("{}", serde_json::to_string_pretty(&devices)?);
            Ok(())
        }
    }
}

/// Run the command socket (and optionally the forwarder) until Ctrl+C
async fn serve(config: &AppConfig, with_forwarder: bool) -> anyhow::Result<()> {
    tracing::info!("Starting relayd v{}", env!("CARGO_PKG_VERSION"));

    let engine = Arc::new(RelayEngine::from_config(config)?);
    let addr = bind_addr(&config.server.bind_address, config.server.port)?;
    let listener = bind_tokio_listener(addr)?;
    let server = Arc::new(CommandServer::new(
        engine,
        Duration::from_millis(config.server.read_timeout_ms),
    ));

    let forwarder = async {
        if with_forwarder {
            run_forwarder(config).await
        } else {
            std::future::pending().await
        }
    };

    tokio::select! {
        result = server.serve(listener) => {
            if let Err(e) = result {
                tracing::error!("Command socket error: {}", e);
            }
        }
        result = forwarder => {
            if let Err(e) = result {
                tracing::error!("Forwarder error: {}", e);
            }
        }
        _ = shutdown_signal() => {}
    }

    tracing::info!("Server shutdown complete");
    Ok(())
}

async fn run_forwarder(config: &AppConfig) -> anyhow::Result<()> {
    let fwd = &config.forwarder;
    let addr = bind_addr(&fwd.bind_address, fwd.port)?;
    let listener = bind_tokio_listener(addr)?;
    let forwarder = Arc::new(Forwarder::new(
        fwd.target.clone(),
        Duration::from_millis(fwd.timeout_ms),
    ));

    tracing::info!("Starting HTTP forwarder on {} -> {}", addr, fwd.target);
    axum::serve(listener, server::create_router(forwarder)).await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to install CTRL+C handler: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

/// Print the result as JSON; a failed actuation is a failed command
fn report(target: &str, result: ActuationResult) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(&result)?);
    if result.success {
        Ok(())
    } else {
        anyhow::bail!("{} did not actuate", target)
    }
}

fn init_logging(level: LogLevel, verbose_count: u8) {
    // Verbose count overrides log level
    let effective_level = match verbose_count {
        0 => level,
        1 => LogLevel::Verbose,
        2 => LogLevel::Debug,
        _ => LogLevel::Trace,
    };

    let filter = match effective_level {
        LogLevel::Error => "relayd=error,tower_http=error",
        LogLevel::Warn => "relayd=warn,tower_http=warn",
        LogLevel::Info => "relayd=info,tower_http=info",
        LogLevel::Verbose => "relayd=debug,tower_http=info",
        LogLevel::Debug => "relayd=debug,tower_http=debug",
        LogLevel::Trace => "relayd=trace,tower_http=debug",
    };

    // Environment variable takes highest priority
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into());

    // Logs go to stderr so `trigger`/`devices` output stays parseable
    if let Err(err) = tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init()
    {
        eprintln!("failed to initialize tracing: {}", err);
    }
}
