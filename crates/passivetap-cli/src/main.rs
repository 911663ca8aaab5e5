use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::{debug, info};

use passivetap_core::whitelist::DomainWhitelist;
use passivetap_core::{Aggregator, PacketSource, PcapFileSource};

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("PASSIVETAP_BUILD_COMMIT"),
    " ",
    env!("PASSIVETAP_BUILD_DATE"),
    ")"
);

#[derive(Parser, Debug)]
#[command(name = "passivetap")]
#[command(version, long_version = LONG_VERSION)]
#[command(
    about = "Passive traffic monitor: aggregate captures into update records.",
    long_about = None,
    after_help = "Examples:\n  passivetap pcap process capture.pcap -o updates.txt\n  passivetap pcap process capture.pcapng --stdout --interval 60\n  passivetap pcap process capture.pcap -o updates.txt --whitelist domains.txt --stats"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Operations on PCAP/PCAPNG inputs (offline replay).
    Pcap {
        #[command(subcommand)]
        command: PcapCommands,
    },
}

#[derive(Subcommand, Debug)]
enum PcapCommands {
    /// Replay a capture through the aggregator and write update records.
    #[command(
        after_help = "Examples:\n  passivetap pcap process capture.pcap -o updates.txt\n  passivetap pcap process capture.pcapng --stdout --interval 60"
    )]
    Process {
        /// Path to a .pcap or .pcapng file
        input: PathBuf,

        /// Output path for the concatenated update records
        #[arg(short = 'o', long, required_unless_present = "stdout")]
        output: Option<PathBuf>,

        /// Write update records to stdout
        #[arg(long, conflicts_with = "output")]
        stdout: bool,

        /// Seconds of capture time between update records
        #[arg(long, default_value_t = 30)]
        interval: u32,

        /// Domain whitelist file, one suffix per line
        #[arg(long)]
        whitelist: Option<PathBuf>,

        /// Print aggregate counters as JSON to stderr when done
        #[arg(long)]
        stats: bool,

        /// Suppress non-error output
        #[arg(long)]
        quiet: bool,
    },
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Pcap { command } => match command {
            PcapCommands::Process {
                input,
                output,
                stdout,
                interval,
                whitelist,
                stats,
                quiet,
            } => cmd_pcap_process(input, output, stdout, interval, whitelist, stats, quiet),
        },
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {}", err.message);
            if let Some(hint) = err.hint {
                eprintln!("hint: {}", hint);
            }
            ExitCode::from(2)
        }
    }
}

#[derive(Debug)]
struct CliError {
    message: String,
    hint: Option<String>,
}

impl CliError {
    fn new(message: impl Into<String>, hint: Option<String>) -> Self {
        Self {
            message: message.into(),
            hint,
        }
    }
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

impl From<anyhow::Error> for CliError {
    fn from(err: anyhow::Error) -> Self {
        CliError::new(err.to_string(), None)
    }
}

fn cmd_pcap_process(
    input: PathBuf,
    output: Option<PathBuf>,
    stdout: bool,
    interval: u32,
    whitelist: Option<PathBuf>,
    stats: bool,
    quiet: bool,
) -> Result<(), CliError> {
    validate_input_file(&input)?;

    let mut aggregator = match whitelist {
        Some(path) => {
            let text = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read whitelist: {}", path.display()))?;
            Aggregator::with_whitelist(Box::new(DomainWhitelist::parse(&text)))
        }
        None => Aggregator::new(),
    };

    let mut source = PcapFileSource::open(&input)
        .map_err(|err| CliError::new(format!("failed to open capture: {err}"), None))?;

    let mut writer: Box<dyn Write> = if stdout {
        Box::new(std::io::stdout().lock())
    } else {
        let path = output.as_ref().ok_or_else(|| {
            CliError::new(
                "missing output path",
                Some("use -o/--output or --stdout".to_string()),
            )
        })?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create output directory: {}", parent.display())
                })?;
            }
        }
        let file = fs::File::create(path)
            .with_context(|| format!("Failed to create output file: {}", path.display()))?;
        Box::new(std::io::BufWriter::new(file))
    };

    let mut next_update_at: Option<i64> = None;
    let mut last_seen: i64 = 0;
    loop {
        let event = match source.next_packet() {
            Ok(Some(event)) => event,
            Ok(None) => break,
            Err(err) => {
                return Err(CliError::new(
                    format!("capture replay failed: {err}"),
                    Some("the file may be truncated or corrupt".to_string()),
                ));
            }
        };

        last_seen = event.timeval.sec;
        match next_update_at {
            None => next_update_at = Some(event.timeval.sec + interval as i64),
            Some(deadline) if event.timeval.sec >= deadline => {
                aggregator
                    .write_update(&mut writer, event.timeval.sec)
                    .context("failed to write update record")?;
                next_update_at = Some(event.timeval.sec + interval as i64);
            }
            Some(_) => {}
        }

        if let Err(err) = aggregator.handle_packet(&event) {
            // Per-packet failures are expected on real traffic.
            debug!("packet discarded: {err}");
        }
    }

    aggregator
        .write_update(&mut writer, last_seen)
        .context("failed to write final update record")?;
    writer.flush().context("failed to flush output")?;
    drop(writer);

    let snapshot = aggregator.stats();
    info!(
        "processed {} packets ({} ignored), wrote {} updates",
        snapshot.packets_processed, snapshot.packets_ignored, snapshot.updates_written
    );
    if stats {
        let json = serde_json::to_string(&snapshot).context("failed to serialize stats")?;
        eprintln!("{json}");
    }
    if !quiet {
        match output {
            Some(path) => eprintln!(
                "OK: {} updates written -> {}",
                snapshot.updates_written,
                path.display()
            ),
            None => {}
        }
    }
    Ok(())
}

fn validate_input_file(input: &PathBuf) -> Result<(), CliError> {
    if !input.exists() {
        return Err(CliError::new(
            format!("input file not found: {}", input.display()),
            Some("use a .pcap or .pcapng file".to_string()),
        ));
    }
    if !input.is_file() {
        return Err(CliError::new(
            format!("input is not a file: {}", input.display()),
            Some("use a .pcap or .pcapng file".to_string()),
        ));
    }
    let ext = input
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();
    if ext != "pcap" && ext != "pcapng" {
        return Err(CliError::new(
            format!("unsupported input format '{}'", input.display()),
            Some("expected a .pcap or .pcapng file".to_string()),
        ));
    }
    Ok(())
}
