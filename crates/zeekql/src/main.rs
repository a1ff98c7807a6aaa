//! zeekql command-line entry point
//!
//! `zeekql [OPTIONS] <PATTERN>... <QUERY>`: every argument but the last is a
//! file regex, the last is the SQL query. Results go to stdout; status,
//! warnings and timings go to stderr.

use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use std::path::PathBuf;
use std::process::ExitCode;
use zeekql::config::{DEFAULT_BATCH_SIZE, DEFAULT_HEADER_LINES, DEFAULT_SCAN_LINES};
use zeekql::{FileDiscoverer, QueryConfig};
use zeekql_logging::{init_logging, LogConfig};

mod cli;

use cli::error::HelpfulError;

#[derive(Parser, Debug)]
#[command(
    name = "zeekql",
    version,
    about = "Run SQL over Zeek logs without loading them into a database",
    after_help = "Each log type becomes a view named after its #path, e.g.\n  \
                  zeekql 'conn\\.' \"SELECT \\\"id.orig_h\\\", count(*) FROM conn GROUP BY 1\""
)]
struct Cli {
    /// File regexes followed by the SQL query (the query is always last).
    /// Options must come before the first pattern.
    #[arg(
        value_name = "PATTERN... QUERY",
        num_args = 2..,
        required = true,
        allow_hyphen_values = true,
        trailing_var_arg = true
    )]
    args: Vec<String>,

    /// Directory that relative patterns are matched under
    #[arg(short = 'C', long = "directory", env = "ZEEKQL_DIR", value_name = "DIR")]
    directory: Option<PathBuf>,

    /// Rows fetched and written per batch
    #[arg(long, env = "ZEEKQL_BATCH_SIZE", default_value_t = DEFAULT_BATCH_SIZE)]
    batch_size: usize,

    /// Header lines before the first data line
    #[arg(long, env = "ZEEKQL_HEADER_LINES", default_value_t = DEFAULT_HEADER_LINES)]
    header_lines: usize,

    /// Lines scanned for #path, #fields and #types
    #[arg(long, env = "ZEEKQL_SCAN_LINES", default_value_t = DEFAULT_SCAN_LINES)]
    scan_lines: usize,

    /// Also write logs to a size-rotated file in this directory
    #[arg(long, env = "ZEEKQL_LOG_DIR", value_name = "DIR")]
    log_dir: Option<PathBuf>,

    /// Enable verbose logging (debug to stderr)
    #[arg(short = 'v', long, conflicts_with = "quiet")]
    verbose: bool,

    /// Only report warnings and errors on stderr
    #[arg(short = 'q', long)]
    quiet: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(err) = init_logging(LogConfig {
        app_name: "zeekql",
        verbose: cli.verbose,
        quiet: cli.quiet,
        log_dir: cli.log_dir.clone(),
    }) {
        eprintln!("Warning: {:#}", err);
    }

    let mut config = match QueryConfig::from_args(cli.args) {
        Ok(config) => config,
        Err(err) => usage_error(err),
    };
    config.batch_size = cli.batch_size;
    config.header_lines = cli.header_lines;
    config.scan_lines = cli.scan_lines;
    if let Err(err) = config.validate() {
        usage_error(err);
    }

    let discoverer = match FileDiscoverer::new(&config.patterns, &config.base_dir) {
        Ok(discoverer) => discoverer,
        Err(err) => usage_error(err),
    };

    if let Some(dir) = &cli.directory {
        if let Err(err) = std::env::set_current_dir(dir) {
            eprint!("{}", HelpfulError::directory_not_found(dir, &err.to_string()));
            return ExitCode::from(2);
        }
    }

    match cli::query::run(&config, &discoverer) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            match err.downcast_ref::<HelpfulError>() {
                Some(helpful) => eprint!("{}", helpful),
                None => eprintln!("Error: {:#}", err),
            }
            ExitCode::from(1)
        }
    }
}

/// Report a usage problem the way clap does and exit with status 2.
fn usage_error(err: impl std::fmt::Display) -> ! {
    Cli::command()
        .error(ErrorKind::ValueValidation, err.to_string())
        .exit()
}
