//! The `gnm-collector` executable (spec §6): a single binary that either
//! runs the scheduler continuously, or runs exactly one cycle and exits
//! (`once` mode).
//!
//! # Usage
//!
//! Use the `--help` flag for the full option listing.
//!
//! # Exit codes
//!
//! - `0` — clean shutdown (signal-triggered, or `once` mode completed).
//! - `1` — fatal configuration error.
//! - `2` — fatal datastore error (too many consecutive failed cycles).
//! - `3` — an unhandled internal error.

use getopts::Options;

use gnm_collector::common::{init_logging, setup_panic_handler};
use gnm_collector::config::Snapshot;
use gnm_collector::errors::RunError;
use gnm_collector::scheduler::Scheduler;

const DEFAULT_CONFIG_DIR: &str = "/etc/gnm-collector";
const DEFAULT_LOG_DIR: &str = "/var/log/gnm-collector";

fn print_usage(program: &str, opts: &Options) -> ! {
    let brief = format!("Usage: {program} [options] [once]");
    print!("{}", opts.usage(&brief));
    std::process::exit(0)
}

fn main() {
    setup_panic_handler();

    let args: Vec<String> = std::env::args().collect();
    let program = args[0].clone();

    let mut opts = Options::new();
    opts.optflag("h", "help", "print this help menu");
    opts.optflag("V", "version", "print the version");
    opts.optopt("c", "config", "config directory", "DIR");

    let matches = match opts.parse(&args[1..]) {
        Ok(m) => m,
        Err(e) => {
            eprintln!("{e}");
            print_usage(&program, &opts);
        }
    };

    if matches.opt_present("h") {
        print_usage(&program, &opts);
    }
    if matches.opt_present("V") {
        println!("{}", env!("CARGO_PKG_VERSION"));
        std::process::exit(0);
    }

    let config_dir = matches
        .opt_str("c")
        .unwrap_or_else(|| DEFAULT_CONFIG_DIR.to_string());
    let once = matches.free.first().map(String::as_str) == Some("once");

    let exit_code = match run(&config_dir, once) {
        Ok(()) => 0,
        Err(RunError::Config(e)) => {
            eprintln!("fatal configuration error: {e}");
            1
        }
        Err(RunError::Datastore(e)) => {
            eprintln!("fatal datastore error: {e}");
            2
        }
        Err(RunError::Io(e)) => {
            eprintln!("unhandled internal error: {e}");
            3
        }
    };
    std::process::exit(exit_code);
}

#[tokio::main]
async fn run(config_dir: &str, once: bool) -> Result<(), RunError> {
    let _logging_guard = init_logging(tracing::Level::INFO, DEFAULT_LOG_DIR);
    let snapshot = Snapshot::load(config_dir)?;

    tracing::info!(
        services = snapshot.services.len(),
        hosts = snapshot.hosts.len(),
        "configuration loaded"
    );

    gnm_collector::metrics::install("0.0.0.0:9898".parse().expect("static address is valid"));

    let mut scheduler = Scheduler::new(snapshot).await?;
    if once {
        scheduler.run_once().await
    } else {
        scheduler.run().await
    }
}
