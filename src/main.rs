//! ncmeter - send or receive one file through netcat and measure it
//!
//! Every completed transfer produces one record (time, bytes, KB/s, CPU%).
//! Records can be printed as JSON lines or exported as CSV.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ncmeter::cli::{CommonOpts, PeerOpts};
use ncmeter::config::{init_settings, load_settings, to_toml, Settings};
use ncmeter::log::format_real;
use ncmeter::logger::open_logger;
use ncmeter::progress::TransferSpinner;
use ncmeter::runner::expand_args;
use ncmeter::{
    CommandTransport, MetricsRecorder, SessionController, SessionEvent, TransferLog,
    TransferRequest,
};

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "ncmeter - netcat file transfer with throughput and CPU metrics"
)]
struct Args {
    #[command(flatten)]
    common: CommonOpts,

    /// Print the copy program command line before each transfer
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Send FILE to a listening peer
    Send {
        file: PathBuf,
        #[command(flatten)]
        peer: PeerOpts,
        #[command(flatten)]
        run: RunOpts,
    },
    /// Listen on a port and write what arrives to a file
    Receive {
        /// Port to listen on
        #[arg(short = 'p', long)]
        port: Option<String>,
        /// Destination file (default: received_file)
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,
        #[command(flatten)]
        run: RunOpts,
    },
    /// Show effective settings, or write defaults with --init
    Config {
        #[arg(long)]
        init: bool,
        /// Let --init replace an existing settings file
        #[arg(long, requires = "init")]
        force: bool,
    },
}

#[derive(clap::Args, Debug)]
struct RunOpts {
    /// Run the same transfer this many times
    #[arg(long, default_value_t = 1)]
    repeat: u32,

    /// Write the collected records to this CSV file
    #[arg(long)]
    export: Option<PathBuf>,

    /// One JSON object per completed transfer instead of the table
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    ctrlc::set_handler(move || {
        eprintln!("\nInterrupted by user. Exiting (Ctrl-C)...");
        // 128 + SIGINT
        std::process::exit(130);
    })
    .context("Error setting Ctrl-C handler")?;

    let args = Args::parse();
    let config_path = args.common.config_path();
    let mut settings = load_settings(&config_path)?;
    args.common.apply(&mut settings);

    match args.command {
        Command::Config { init, force } => config_main(&config_path, &settings, init, force),
        Command::Send { file, peer, run } => {
            peer.apply(&mut settings);
            let request = TransferRequest::Send {
                host: settings.host.clone(),
                port: settings.port.clone(),
                source: Some(file),
            };
            transfer_main(&settings, request, &run, args.verbose)
        }
        Command::Receive { port, output, run } => {
            if let Some(p) = port {
                settings.port = p;
            }
            let request = TransferRequest::Receive {
                port: settings.port.clone(),
                destination: output.unwrap_or_else(|| settings.receive_output.clone()),
            };
            transfer_main(&settings, request, &run, args.verbose)
        }
    }
}

fn config_main(path: &Path, settings: &Settings, init: bool, force: bool) -> Result<()> {
    if init {
        init_settings(path, force)?;
        println!("Wrote default settings to {}", path.display());
        return Ok(());
    }
    println!("# {}", path.display());
    print!("{}", to_toml(settings)?);
    Ok(())
}

fn transfer_main(
    settings: &Settings,
    request: TransferRequest,
    opts: &RunOpts,
    verbose: bool,
) -> Result<()> {
    let logger = open_logger(settings.log_file.as_deref());
    let transport = Arc::new(CommandTransport::new(settings.transport.clone()));
    let mut session = SessionController::new(transport, MetricsRecorder::with_system_cpu())
        .with_logger(logger);

    let rounds = opts.repeat.max(1);
    let mut failures = 0u32;
    for _ in 0..rounds {
        if verbose {
            eprintln!("[cmd] {}", command_line(settings, &request));
        }
        let spinner = if opts.json {
            TransferSpinner::hidden()
        } else {
            TransferSpinner::new(&format!("{} {}", verb(&request), request.target()))
        };
        if let Err(e) = session.start(request.clone()) {
            spinner.finish_error(&e.to_string());
            session.acknowledge();
            failures += 1;
            continue;
        }
        match session.wait() {
            Some(SessionEvent::Completed(record)) => {
                spinner.finish_success(&record);
                if opts.json {
                    println!("{}", serde_json::to_string(&record)?);
                }
            }
            Some(SessionEvent::Failed { message, .. }) => {
                spinner.finish_error(&message);
                failures += 1;
            }
            _ => {}
        }
        session.acknowledge();
    }

    if !opts.json && !session.log().is_empty() {
        print_table(session.log());
    }
    let mut export_failed = false;
    if let Some(path) = &opts.export {
        match session.export_csv(path) {
            Ok(rows) => eprintln!("Exported {} rows to {}", rows, path.display()),
            Err(e) => {
                eprintln!("Export failed: {}", e);
                export_failed = true;
            }
        }
    }
    run_outcome(failures, rounds, export_failed)
}

/// Non-zero exit when any transfer or the export failed.
fn run_outcome(failures: u32, rounds: u32, export_failed: bool) -> Result<()> {
    match (failures, export_failed) {
        (0, false) => Ok(()),
        (0, true) => anyhow::bail!("CSV export failed"),
        (n, false) => anyhow::bail!("{} of {} transfers failed", n, rounds),
        (n, true) => anyhow::bail!("{} of {} transfers failed, and CSV export failed", n, rounds),
    }
}

fn verb(request: &TransferRequest) -> &'static str {
    match request {
        TransferRequest::Send { .. } => "Sending to",
        TransferRequest::Receive { .. } => "Receiving on",
    }
}

fn command_line(settings: &Settings, request: &TransferRequest) -> String {
    let t = &settings.transport;
    let args = match request {
        TransferRequest::Send { host, port, .. } => expand_args(&t.send_args, host, port),
        TransferRequest::Receive { port, .. } => expand_args(&t.receive_args, "", port),
    };
    let mut line = t.program.clone();
    for a in args {
        line.push(' ');
        line.push_str(&a);
    }
    line
}

fn print_table(log: &TransferLog) {
    println!(
        "{:<10} {:>18} {:>18} {:>8}",
        "Time", "Bytes Transferred", "Throughput (KB/s)", "CPU (%)"
    );
    for r in log.records() {
        println!(
            "{:<10} {:>18} {:>18} {:>8}",
            r.time_label(),
            r.byte_count(),
            format_real(r.throughput_kbps()),
            format_real(f64::from(r.cpu_percent()))
        );
    }
}
