//! rust_vna CLI: S-parameter acquisition and S→Z conversion.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use rust_vna::config::{VnaConfig, DEFAULT_CONFIG_PATH};
use rust_vna::instrument::{Channel, SimulatedVna, VisaChannel};
use rust_vna::measurement::{parse_parameters, Acquisition, MeasurementParameter};
use rust_vna::network::{dataset_from_sweep, s_to_z_sweep, sweep_from_dataset, PortImpedances};
use rust_vna::session::MeasurementSession;
use rust_vna::storage::{read_csv, write_csv, CsvWriter};
use rust_vna::logging;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "rust_vna")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Override the configured log level
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List reachable instruments
    Scan {
        /// Use the built-in simulated analyzer
        #[arg(long)]
        simulate: bool,
    },

    /// Configure traces and acquire S-parameter sweeps
    Measure {
        /// VISA resource; defaults to the configured one, then the first scanned
        #[arg(short, long)]
        resource: Option<String>,

        /// Use the built-in simulated analyzer
        #[arg(long)]
        simulate: bool,

        /// Parameters to measure, comma separated (e.g. S11,S21)
        #[arg(short, long, value_delimiter = ',')]
        params: Option<Vec<String>>,

        /// Number of acquisitions; 0 runs until Ctrl-C
        #[arg(short = 'n', long, default_value = "1")]
        count: usize,

        /// Pause between acquisitions in milliseconds
        #[arg(long, default_value = "0")]
        interval_ms: u64,

        /// Output directory for CSV files
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// File name for a single acquisition; defaults to the timestamp
        #[arg(long)]
        name: Option<String>,
    },

    /// Convert a stored S-parameter file to Z-parameters
    Convert {
        /// CSV file written by `measure`
        #[arg(short, long)]
        input: PathBuf,

        /// Number of ports of the network
        #[arg(long, default_value = "2")]
        ports: usize,

        /// Reference impedance per port in ohms, comma separated
        #[arg(long, value_delimiter = ',')]
        z0: Option<Vec<f64>>,

        /// Output file; defaults to `<input>_Z.csv`
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = VnaConfig::load_from(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;
    if let Some(level) = cli.log_level {
        config.application.log_level = level;
        config.validate().context("Invalid --log-level")?;
    }
    logging::init(&config.application.log_level);

    match cli.command {
        Commands::Scan { simulate } => scan(&config, simulate),
        Commands::Measure {
            resource,
            simulate,
            params,
            count,
            interval_ms,
            output,
            name,
        } => {
            if name.is_some() && count != 1 {
                bail!("--name can only be used with --count 1");
            }
            let parameters = match params {
                Some(labels) => parse_parameters(&labels[..])?,
                None => config.parameters()?,
            };
            let output = output.unwrap_or_else(|| config.output_dir());
            let run = MeasureRun {
                resource: measure_resource(resource, &config, simulate),
                name,
                parameters,
                count,
                interval: Duration::from_millis(interval_ms),
                writer: CsvWriter::new(output),
            };
            measure(config, simulate, run).await
        }
        Commands::Convert {
            input,
            ports,
            z0,
            output,
        } => convert(&config, &input, ports, z0, output),
    }
}

fn open_channel(config: &VnaConfig, simulate: bool) -> Box<dyn Channel> {
    if simulate {
        Box::new(SimulatedVna::new())
    } else {
        Box::new(
            VisaChannel::new()
                .with_timeout(config.instrument.timeout_ms)
                .with_write_terminator(config.instrument.write_terminator.clone()),
        )
    }
}

/// Resource to connect to: the command line first, then the configuration.
///
/// The configured resource names real hardware, so it is not used with the
/// simulated analyzer.
fn measure_resource(cli: Option<String>, config: &VnaConfig, simulate: bool) -> Option<String> {
    match cli {
        Some(resource) => Some(resource),
        None if simulate => None,
        None => config.instrument.resource.clone(),
    }
}

fn scan(config: &VnaConfig, simulate: bool) -> Result<()> {
    let mut channel = open_channel(config, simulate);
    let resources = channel.scan().context("Resource scan failed")?;
    if resources.is_empty() {
        println!("No instruments found");
    }
    for resource in resources {
        println!("{}", resource);
    }
    Ok(())
}

struct MeasureRun {
    resource: Option<String>,
    name: Option<String>,
    parameters: Vec<MeasurementParameter>,
    count: usize,
    interval: Duration,
    writer: CsvWriter,
}

async fn measure(config: VnaConfig, simulate: bool, run: MeasureRun) -> Result<()> {
    let stop = Arc::new(AtomicBool::new(false));

    let signal_stop = Arc::clone(&stop);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Ctrl-C received, stopping after the current acquisition");
            signal_stop.store(true, Ordering::SeqCst);
        }
    });

    let channel = open_channel(&config, simulate);
    let session_config = config.session_config();
    let taken = tokio::task::spawn_blocking(move || -> Result<usize> {
        let session = MeasurementSession::new(channel, session_config)?;
        acquisition_loop(session, &run, &stop)
    })
    .await
    .context("Measurement task panicked")??;

    info!(acquisitions = taken, "Measurement finished");
    Ok(())
}

fn acquisition_loop<C: Channel>(
    mut session: MeasurementSession<C>,
    run: &MeasureRun,
    stop: &AtomicBool,
) -> Result<usize> {
    session
        .connect(run.resource.as_deref())
        .context("Failed to connect to instrument")?;
    session
        .configure(&run.parameters)
        .context("Failed to configure traces")?;

    let mut taken = 0;
    while !stop.load(Ordering::SeqCst) && (run.count == 0 || taken < run.count) {
        let acquisition = session.acquire().context("Acquisition failed")?;
        let path = match &run.name {
            Some(name) => run.writer.write_as(&acquisition, name)?,
            None => run.writer.write(&acquisition)?,
        };
        println!("{}", path.display());
        taken += 1;

        let deadline = Instant::now() + run.interval;
        while Instant::now() < deadline && !stop.load(Ordering::SeqCst) {
            std::thread::sleep(deadline.saturating_duration_since(Instant::now()).min(Duration::from_millis(50)));
        }
    }

    session.close()?;
    Ok(taken)
}

fn convert(
    config: &VnaConfig,
    input: &Path,
    n_ports: usize,
    z0: Option<Vec<f64>>,
    output: Option<PathBuf>,
) -> Result<()> {
    let ports = match z0 {
        Some(values) if values.len() == 1 => PortImpedances::uniform(n_ports, values[0])?,
        Some(values) => PortImpedances::from_real(&values)?,
        None => config.port_impedances(n_ports)?,
    };
    if ports.len() != n_ports {
        bail!(
            "{} reference impedances given for a {}-port network",
            ports.len(),
            n_ports
        );
    }

    let stored = read_csv(input).with_context(|| format!("Failed to read {}", input.display()))?;
    let s_sweep = sweep_from_dataset(&stored.dataset, n_ports)?;
    let z_sweep = s_to_z_sweep(&s_sweep, &ports)?;
    let z_dataset = dataset_from_sweep(stored.dataset.stimulus().to_vec(), &z_sweep, 'Z')?;

    let (resource, identity) = stored
        .metadata
        .map(|m| (m.resource, m.identity))
        .unwrap_or_default();
    let z = Acquisition::new(z_dataset, resource, identity);

    let output = output.unwrap_or_else(|| {
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "converted".into());
        input.with_file_name(format!("{}_Z.csv", stem))
    });
    write_csv(&output, &z.dataset, Some(&z.metadata))?;
    println!("{}", output.display());
    Ok(())
}
