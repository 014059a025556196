//! # AnyIO Ethernet Engine Binary
//!
//! Brings up AnyIO Ethernet boards and runs the register cycle.
//!
//! # Usage
//!
//! ```bash
//! # Boards from the config file
//! anyio_eth --config-file /etc/anyio/eth.toml
//!
//! # Boards from the command line, identify and print summaries
//! anyio_eth --board-ip 10.10.10.10 --board-ip 10.10.10.11 --identify-only --json
//!
//! # Simulated boards, 1000 cycles, per-packet tracing
//! anyio_eth --board-ip 10.10.10.10 --simulate --cycles 1000 --trace-packets
//! ```

use anyio_common::config::{ConfigError, ConfigLoader};
use anyio_common::consts::DEFAULT_CONFIG_PATH;
use anyio_common::llio::interface::{RegisterError, Registrar};
use anyio_common::llio::types::{BoardSummary, MacAddr};
use anyio_eth::config::{BoardConfig, EthConfig};
use anyio_eth::core::EthCore;
use anyio_eth::guard::PermissiveGuard;
use anyio_eth::session::BringUp;
use anyio_eth::transport::Connector;
use anyio_eth::transport::sim::{SimConnector, SimHandle};
use anyio_eth::transport::udp::UdpConnector;
use clap::Parser;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use tracing::{Level, error, info};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::Directive;

/// AnyIO Ethernet Engine - LBP16 register I/O for AnyIO Ethernet boards
#[derive(Parser, Debug)]
#[command(name = "anyio_eth")]
#[command(version)]
#[command(about = "LBP16 register I/O engine for AnyIO Ethernet FPGA boards")]
#[command(long_about = None)]
struct Args {
    /// Path to the configuration file.
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config_file: PathBuf,

    /// Board IP address (can be specified multiple times, replaces the
    /// boards from the config file)
    #[arg(long = "board-ip", action = clap::ArgAction::Append)]
    board_ips: Vec<Ipv4Addr>,

    /// Configuration string for the board at the same position
    #[arg(long = "board-config", action = clap::ArgAction::Append)]
    board_configs: Vec<String>,

    /// Talk to in-process simulated boards instead of the network
    #[arg(short = 's', long)]
    simulate: bool,

    /// Bring boards up, print their summaries and exit
    #[arg(long)]
    identify_only: bool,

    /// Stop after this many cycles
    #[arg(long)]
    cycles: Option<u64>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Log every packet
    #[arg(long)]
    trace_packets: bool,

    /// Output logs in JSON format
    #[arg(long)]
    json: bool,
}

/// Accepts every board and logs what it was told.
struct LogRegistrar;

impl Registrar for LogRegistrar {
    fn register(&mut self, summary: &BoardSummary, config: &str) -> Result<(), RegisterError> {
        info!(
            board = %summary.name,
            ident = %summary.board_name,
            ip = %summary.address,
            connectors = summary.profile.num_connectors(),
            pins = summary.profile.total_pins(),
            fpga = %summary.profile.fpga_part,
            config,
            "register"
        );
        Ok(())
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    if let Err(e) = run() {
        error!("anyio_eth startup failed: {}", e);
        std::process::exit(1);
    }
    Ok(())
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = load_config(&args);
    setup_tracing(&args, config.as_ref().ok());
    let config = config?;

    info!("AnyIO Ethernet Engine v{} starting...", env!("CARGO_PKG_VERSION"));

    let mut connector: Box<dyn Connector> = if args.simulate {
        info!("Simulation mode enabled");
        Box::new(simulated_network(&config))
    } else {
        Box::new(UdpConnector)
    };

    let mut bring_up = BringUp::new(config.timing.transport(), config.timing.immediate_timeout());
    let mut session = bring_up.run(
        &config.requests(),
        connector.as_mut(),
        &mut LogRegistrar,
        Box::new(PermissiveGuard),
    )?;

    if args.identify_only {
        let summaries = session.summaries();
        println!("{}", serde_json::to_string_pretty(&summaries)?);
        session.shutdown();
        return Ok(());
    }

    let watches: Vec<Vec<u16>> = config.boards.iter().map(|b| b.watch.clone()).collect();
    let mut core = EthCore::new(session, config.timing, &watches);

    let running = core.running_flag();
    ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        running.store(false, Ordering::SeqCst);
    })?;

    if let Err(e) = core.run(args.cycles) {
        error!("RT loop error: {}", e);
    }
    let stats = core.stats();
    info!(
        cycles = stats.cycle_count,
        avg_us = stats.avg_cycle_time_us(),
        max_us = stats.max_cycle_time_us,
        violations = stats.timing_violations,
        "cycle statistics"
    );
    core.shutdown();

    info!("AnyIO Ethernet Engine shutdown complete");
    Ok(())
}

/// Config file, with boards replaced by `--board-ip` when given.
fn load_config(args: &Args) -> Result<EthConfig, ConfigError> {
    let mut config = match EthConfig::load(&args.config_file) {
        Ok(config) => config,
        Err(ConfigError::FileNotFound) if !args.board_ips.is_empty() => {
            EthConfig::new("anyio_eth", Vec::new())
        }
        Err(e) => return Err(e),
    };

    if !args.board_ips.is_empty() {
        config.boards = args
            .board_ips
            .iter()
            .enumerate()
            .map(|(idx, &ip)| BoardConfig {
                config: args.board_configs.get(idx).cloned().unwrap_or_default(),
                ..BoardConfig::new(ip)
            })
            .collect();
    }
    config.validate()?;
    Ok(config)
}

/// One simulated 7I92 per configured board.
fn simulated_network(config: &EthConfig) -> SimConnector {
    let mut connector = SimConnector::new();
    for board in &config.boards {
        let [a, b, c, d] = board.ip.octets();
        let handle = SimHandle::new("7I92", MacAddr([0x00, 0x60, 0x1B, b ^ a, c, d]));
        for &address in &board.watch {
            handle.set_register_u32(address, u32::from(address));
        }
        connector.add_board(board.ip, handle);
    }
    connector
}

/// Setup tracing subscriber based on CLI arguments and the config file.
fn setup_tracing(args: &Args, config: Option<&EthConfig>) {
    let directive: Directive = if args.trace_packets {
        Level::TRACE.into()
    } else if args.verbose {
        Level::DEBUG.into()
    } else {
        let level = config.map(|c| c.shared.log_level.as_directive()).unwrap_or("info");
        level.parse().unwrap_or_else(|_| Level::INFO.into())
    };

    let filter = EnvFilter::from_default_env().add_directive(directive);

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }
}
