//! psjungle - focused process trees
//!
//! Entry point: argument preprocessing, config resolution, logging setup and
//! dispatch to the one-shot or watch cycle.

mod cli;
mod config;

use anyhow::Context;
use clap::{CommandFactory, Parser};
use psjungle::{
    parse_specifiers, watch, ConnectionSource, CycleContext, DryRunSender, KillSender,
    MatchOptions, Matcher, ProcFs, ProcessSource, RenderOptions, Renderer, Signal,
    SignalSender, SnapshotFile, WatchOptions,
};
use std::io::{self, IsTerminal, Write};
use std::process::ExitCode;
use tracing::{debug, info, level_filters::LevelFilter};

use cli::{preprocess_args, Args, LogLevel};
use config::{resolve_config, show_config, validate_effective_config, Config};

/// Initializes tracing on stderr so tree output on stdout stays clean.
fn setup_logging(level: LogLevel) {
    let filter = match level {
        LogLevel::Off => LevelFilter::OFF,
        LogLevel::Error => LevelFilter::ERROR,
        LogLevel::Warn => LevelFilter::WARN,
        LogLevel::Info => LevelFilter::INFO,
        LogLevel::Debug => LevelFilter::DEBUG,
        LogLevel::Trace => LevelFilter::TRACE,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(filter)
        .with_writer(io::stderr)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {e}");
    }
}

/// Status line shown in watch mode: the invocation as typed.
fn watch_header(raw: &[String]) -> String {
    let mut header = String::from("psjungle");
    for arg in raw.iter().skip(1) {
        header.push(' ');
        header.push_str(arg);
    }
    header
}

fn resolve_signal(args: &Args, config: &Config) -> psjungle::Result<Option<Signal>> {
    match &args.kill {
        None => Ok(None),
        Some(None) => config.default_signal().map(Some),
        Some(Some(value)) => value.parse().map(Some),
    }
}

fn run(args: &Args, raw: &[String]) -> anyhow::Result<ExitCode> {
    let config = resolve_config(args)?;

    // Early exit for show/check modes
    if args.check_config {
        if let Err(e) = validate_effective_config(&config) {
            eprintln!("❌ {}", e);
            return Ok(ExitCode::FAILURE);
        }
        println!("✅ Configuration is valid");
        return Ok(ExitCode::SUCCESS);
    }
    if args.show_config {
        show_config(&config, args.config_format)?;
        return Ok(ExitCode::SUCCESS);
    }

    setup_logging(config.log_level());
    if let Err(e) = validate_effective_config(&config) {
        eprintln!("❌ {}", e);
        return Ok(ExitCode::FAILURE);
    }

    let procfs = ProcFs::new(config.proc_root()).with_timeout(config.scan_timeout());
    let test_data = match &config.test_data_file {
        Some(path) => Some(
            SnapshotFile::load(path)
                .with_context(|| format!("failed to load test data from {}", path.display()))?,
        ),
        None => None,
    };
    let processes: &dyn ProcessSource = match &test_data {
        Some(data) => data,
        None => &procfs,
    };
    let connections: &dyn ConnectionSource = match &test_data {
        Some(data) => data,
        None => &procfs,
    };

    if let Some(path) = &args.dump_snapshot {
        let file = SnapshotFile::capture(processes, connections)?;
        file.save(path)
            .with_context(|| format!("failed to write snapshot to {}", path.display()))?;
        info!(
            "Wrote {} processes and {} connections to {}",
            file.processes.len(),
            file.connections.len(),
            path.display()
        );
        return Ok(ExitCode::SUCCESS);
    }

    if args.targets.is_empty() {
        Args::command().print_help()?;
        return Ok(ExitCode::FAILURE);
    }

    // Input errors surface before anything is printed.
    let specifiers = parse_specifiers(&args.targets)?;
    let signal = resolve_signal(args, &config)?;

    let sender: &dyn SignalSender = if args.dry_run || test_data.is_some() {
        &DryRunSender
    } else {
        &KillSender
    };

    let color = config.color.unwrap_or(true) && io::stdout().is_terminal();
    let ctx = CycleContext {
        processes,
        connections,
        specifiers,
        matcher: Matcher::new(MatchOptions {
            strict: config.strict.unwrap_or(false),
            case_insensitive: config.case_insensitive.unwrap_or(true),
            host: args.host.clone(),
            ..MatchOptions::default()
        }),
        renderer: Renderer::new(RenderOptions {
            flat: config.flat.unwrap_or(false),
            color,
        }),
        signal,
        sender,
    };
    debug!("Resolved specifiers: {:?}", ctx.specifiers);

    let mut out = io::stdout().lock();
    if args.watch.is_some() {
        let options = WatchOptions {
            interval: config.watch_interval(),
            header: watch_header(raw),
            max_cycles: None,
        };
        watch(&ctx, &options, &mut out)?;
    } else {
        ctx.run_cycle(&mut out)?;
    }
    Ok(ExitCode::SUCCESS)
}

/// Main application entry point.
fn main() -> ExitCode {
    let raw: Vec<String> = std::env::args().collect();
    let args = Args::parse_from(preprocess_args(raw.clone()));

    match run(&args, &raw) {
        Ok(code) => code,
        Err(e) => {
            let _ = report_error(&e, &mut io::stdout(), &mut io::stderr());
            ExitCode::FAILURE
        }
    }
}

/// An empty match set is ordinary output; everything else is an error.
fn report_error(e: &anyhow::Error, out: &mut dyn Write, err: &mut dyn Write) -> io::Result<()> {
    match e.downcast_ref::<psjungle::Error>() {
        Some(psjungle::Error::NoProcessesFound) => writeln!(out, "{e}"),
        _ => writeln!(err, "Error: {e:#}"),
    }
}
