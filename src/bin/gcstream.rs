use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use log::warn;

use gcstream::config::{DEFAULT_MAX_IN_FLIGHT, DEFAULT_SPEED};
use gcstream::{guess_device, CancellationToken, Config, InputSource, Summary};

#[derive(Parser, Debug)]
#[command(
    version,
    about = "Streams gcode to a serial device, pacing commands by the device's confirmations"
)]
struct Args {
    /// Serial line speed.
    #[arg(short, long, default_value_t = DEFAULT_SPEED)]
    speed: u32,

    /// File to dump. If no file is specified, or the file is "-", gcode is
    /// read from standard input.
    #[arg(short, long, default_value = "-")]
    file: PathBuf,

    /// Maximum number of messages to send without receipt confirmation.
    /// Unsafe, but necessary for certain broken firmware.
    #[arg(short = 'u', long, value_name = "NUMBER", default_value_t = DEFAULT_MAX_IN_FLIGHT)]
    max_unconfirmed: usize,

    /// Quiet/noninteractive mode; no output unless an error occurs.
    #[arg(short, long)]
    quiet: bool,

    /// Prints serial I/O.
    #[arg(short, long)]
    verbose: bool,

    /// Filter out non-meaningful chars. May stress noncompliant gcode
    /// interpreters.
    #[arg(short, long)]
    compress: bool,

    /// Give up if a command is not confirmed within this many seconds. By
    /// default we wait forever.
    #[arg(long, value_name = "SECONDS")]
    ack_timeout: Option<u64>,

    /// Serial device. Defaults to the most likely USB serial device.
    device: Option<String>,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(gcstream::Error::Cancelled) => {
            eprintln!("Caught a fatal signal, cleaning up.");
            ExitCode::FAILURE
        }
        Err(e) => {
            eprintln!("{e}");
            eprintln!("Giving up.");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> gcstream::Result<()> {
    let device = match &args.device {
        Some(device) => device.clone(),
        None => {
            if !args.quiet {
                println!("Guessing a likely USB serial device...");
            }
            guess_device()?
        }
    };

    let input = InputSource::open(&args.file)?;
    let config = Config {
        speed: args.speed,
        max_in_flight: args.max_unconfirmed,
        compress: args.compress,
        verbose: args.verbose,
        quiet: args.quiet,
        interactive: input.is_interactive(),
        ack_timeout: args.ack_timeout.map(Duration::from_secs),
        ..Config::default()
    };

    if !config.quiet {
        println!("Serial device:\t{device}");
        println!("Line speed:\t{}", config.speed);
        println!("Gcode file:\t{}", input.name().display());
        if input.is_stdin() {
            if config.interactive {
                println!("Will read gcode from standard input; enter Ctrl-D (EOF) to finish.");
            } else {
                println!("Will read gcode from standard input");
            }
        }
    }

    let cancel = CancellationToken::new();
    let handler_token = cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || handler_token.cancel()) {
        // Not fatal: we just lose the clean shutdown on Ctrl-C.
        warn!("unable to install signal handler: {e}");
    }

    let started = time::OffsetDateTime::now_utc();
    let summary = gcstream::stream(&device, input, &config, cancel, std::io::stdout())?;
    if !config.quiet {
        print_summary(&summary, started);
    }
    Ok(())
}

fn print_summary(summary: &Summary, started: time::OffsetDateTime) {
    let finished = time::OffsetDateTime::now_utc();
    let format = time::macros::format_description!(
        version = 2,
        "[year]-[month]-[day]T[hour]:[minute]:[second]"
    );
    let formatted_date_time = finished
        .format(&format)
        .unwrap_or_else(|_| finished.unix_timestamp().to_string());
    println!("Successfully completed!");
    println!(
        "{formatted_date_time}: sent {} lines in {}s ({} resent after device reset)",
        summary.lines_sent,
        (finished - started).whole_seconds(),
        summary.retransmissions
    );
}
