//! CLI arguments for psjungle.
//!
//! `-w` and `-k` take optional values that may be glued to the flag (`-w2`,
//! `-k9`), and a bare flag must not swallow the target that follows it
//! (`-w 1234`, `-k nginx`). [`preprocess_args`] rewrites these forms into
//! `--watch=VALUE` / `--kill=VALUE` before clap sees them.

use clap::{Parser, ValueEnum};
use psjungle::Signal;
use std::path::PathBuf;

/// Log level options for CLI parsing
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Configuration format options for output
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ConfigFormat {
    Yaml,
    Json,
    Toml,
}

/// Main CLI arguments structure
#[derive(Parser, Debug)]
#[command(
    name = "psjungle",
    about = "Show the process tree around a PID, a port, or a name pattern",
    long_about = "Show the process tree around a PID, a port, or a name pattern.\n\n\
                  Each target is printed with its ancestors and all of its descendants, \
                  the target line highlighted. Targets can be refreshed on an interval \
                  and signalled after display.",
    version,
    after_help = "Examples:\n  psjungle 1234\n  psjungle :8080 --host 127.0.0.1\n  \
                  psjungle -s nginx\n  psjungle -w2 -k hup 'node.*server'"
)]
pub struct Args {
    /// PID, :PORT, or name/regex pattern. Several targets must all be PIDs.
    #[arg(value_name = "TARGET")]
    pub targets: Vec<String>,

    /// Refresh every SECS seconds
    #[arg(short = 'w', long, value_name = "SECS", num_args = 0..=1, require_equals = true)]
    pub watch: Option<Option<f64>>,

    /// Print without tree prefixes
    #[arg(short = 'f', long)]
    pub flat: bool,

    /// Match patterns as case-insensitive literal substrings
    #[arg(short = 's', long)]
    pub strict: bool,

    /// Match regex patterns case-sensitively
    #[arg(long)]
    pub case_sensitive: bool,

    /// Only match :PORT sockets listening on this host
    #[arg(short = 'H', long)]
    pub host: Option<String>,

    /// Send SIGNAL (name or number, default term) to every displayed target
    #[arg(short = 'k', long, value_name = "SIGNAL", num_args = 0..=1, require_equals = true)]
    pub kill: Option<Option<String>>,

    /// Print the signals that would be sent instead of sending them
    #[arg(long)]
    pub dry_run: bool,

    /// Do not highlight the target line
    #[arg(long)]
    pub no_color: bool,

    /// procfs mount point
    #[arg(long, value_name = "PATH")]
    pub proc_root: Option<PathBuf>,

    /// Abort a process scan after SECS seconds
    #[arg(long, value_name = "SECS")]
    pub scan_timeout: Option<f64>,

    /// Path to JSON test data file (uses synthetic data instead of /proc)
    #[arg(short = 't', long)]
    pub test_data_file: Option<PathBuf>,

    /// Write the current process and socket tables as JSON and exit
    #[arg(long, value_name = "PATH")]
    pub dump_snapshot: Option<PathBuf>,

    /// Log level (logs go to stderr)
    #[arg(long, value_enum)]
    pub log_level: Option<LogLevel>,

    /// Config file (YAML/JSON/TOML)
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Disable all config file loading
    #[arg(long)]
    pub no_config: bool,

    /// Print effective merged config and exit
    #[arg(long)]
    pub show_config: bool,

    /// Output format for --show-config
    #[arg(long, value_enum, default_value = "yaml")]
    pub config_format: ConfigFormat,

    /// Validate config and exit (return code 1 on error)
    #[arg(long)]
    pub check_config: bool,
}

fn is_number(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

fn is_interval(s: &str) -> bool {
    match s.split_once('.') {
        Some((whole, frac)) => is_number(whole) && is_number(frac),
        None => is_number(s),
    }
}

/// Rewrites the glued and bare forms of `-w` and `-k`. The first element is
/// the program name and is kept as is.
pub fn preprocess_args<I>(args: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut input = args.into_iter();
    let mut out: Vec<String> = input.next().into_iter().collect();
    let rest: Vec<String> = input.collect();

    let mut i = 0;
    while i < rest.len() {
        let arg = rest[i].as_str();
        i += 1;

        if arg == "--" {
            out.extend(rest[i - 1..].iter().cloned());
            break;
        }

        if let Some(value) = arg.strip_prefix("-w").filter(|v| !v.is_empty()) {
            let value = value.strip_prefix('=').unwrap_or(value);
            if is_interval(value) {
                out.push(format!("--watch={value}"));
                continue;
            }
        }

        if let Some(value) = arg.strip_prefix("-k").filter(|v| !v.is_empty()) {
            let value = value.strip_prefix('=').unwrap_or(value);
            out.push(format!("--kill={value}"));
            continue;
        }

        match arg {
            // A bare -w never takes the next argument; it is a target.
            "-w" => out.push("--watch".to_string()),
            // The long form does take a separate interval.
            "--watch" => match rest.get(i) {
                Some(next) if is_interval(next) => {
                    out.push(format!("--watch={next}"));
                    i += 1;
                }
                _ => out.push("--watch".to_string()),
            },
            "-k" => match rest.get(i) {
                Some(next) if Signal::is_signal_name(next) || is_number(next) => {
                    out.push(format!("--kill={next}"));
                    i += 1;
                }
                _ => out.push("--kill".to_string()),
            },
            _ => out.push(arg.to_string()),
        }
    }
    out
}
