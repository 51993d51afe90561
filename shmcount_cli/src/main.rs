//! # shmcountctl
//!
//! Inspect and drive shmcount counter segments from the command line.

use chrono::{DateTime, SecondsFormat, Utc};
use clap::{Parser, Subcommand};
use common::consts::DEFAULT_CONFIG_PATH;
use common::prelude::*;
use serde::Deserialize;
use shmcount::clock::days_to_system_time;
use shmcount::{NO_CREATOR_PID, SegmentDiscovery, SegmentInfo, SharedCounter};
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "shmcountctl", version, about = "Inspect and drive shared instance counters")]
struct Cli {
    /// Configuration file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override the shm directory from the configuration
    #[arg(long, global = true)]
    shm_dir: Option<PathBuf>,

    /// Print machine-readable JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List every counter segment
    List,
    /// Show one counter without attaching to it
    Inspect { identifier: String },
    /// Attach and stay attached until Enter is pressed or the timeout ends
    Hold {
        identifier: String,
        #[arg(long)]
        seconds: Option<u64>,
    },
    /// Bump the count by one outside the attach accounting
    Incr { identifier: String },
    /// Lower the count by one outside the attach accounting
    Decr { identifier: String },
    /// Write UTF-8 text into the shared user data
    Write {
        identifier: String,
        offset: usize,
        text: String,
    },
    /// Read bytes from the shared user data
    Read {
        identifier: String,
        offset: usize,
        len: usize,
    },
}

#[derive(Debug, Deserialize)]
struct CliConfig {
    shared: SharedConfig,
    #[serde(default)]
    counter: CounterConfig,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            shared: SharedConfig {
                log_level: LogLevel::default(),
                service_name: "shmcountctl".to_string(),
            },
            counter: CounterConfig::default(),
        }
    }
}

/// Load the explicit config file, else the default path if present, else defaults.
fn load_config(explicit: Option<&Path>) -> Result<CliConfig, ConfigError> {
    let config = match explicit {
        Some(path) => CliConfig::load(path)?,
        None => match CliConfig::load(Path::new(DEFAULT_CONFIG_PATH)) {
            Ok(config) => config,
            Err(ConfigError::FileNotFound) => CliConfig::default(),
            Err(e) => return Err(e),
        },
    };
    config.shared.validate()?;
    config.counter.validate()?;
    Ok(config)
}

fn filter_directive(level: LogLevel) -> &'static str {
    match level {
        LogLevel::Trace => "trace",
        LogLevel::Debug => "debug",
        LogLevel::Info => "info",
        LogLevel::Warn => "warn",
        LogLevel::Error => "error",
    }
}

#[derive(Debug, Clone, Copy)]
enum Adjustment {
    Increment,
    Decrement,
}

/// Count transition as seen by other processes.
///
/// `previous` includes the tool's own temporary attach, which is gone again
/// once the command finishes.
fn describe_adjustment(previous: u32, adjustment: Adjustment) -> String {
    let before = previous.wrapping_sub(1);
    let after = match adjustment {
        Adjustment::Increment => before.wrapping_add(1),
        Adjustment::Decrement => before.wrapping_sub(1),
    };
    format!("{before} -> {after}")
}

fn format_days(days: f64) -> String {
    match days_to_system_time(days) {
        Some(time) => DateTime::<Utc>::from(time).to_rfc3339_opts(SecondsFormat::Millis, true),
        None => format!("{days} days"),
    }
}

fn print_info(info: &SegmentInfo) {
    println!("{} ({})", info.name, info.path.display());
    println!("  instances:   {}", info.instance_count);
    match info.creator_pid {
        Some(pid) => println!(
            "  creator:     {} ({})",
            pid,
            if info.creator_alive { "alive" } else { "exited" }
        ),
        None => println!("  creator:     none"),
    }
    println!("  created:     {}", format_days(info.creation_time));
    println!("  last access: {}", format_days(info.last_access_time));
    println!("  user data:   {} bytes", info.user_data_size);
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn run(cli: Cli, counter_config: CounterConfig) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Command::List => {
            let segments = SegmentDiscovery::new(counter_config).list_segments()?;
            if cli.json {
                return print_json(&segments);
            }
            if segments.is_empty() {
                println!("No counters found");
            }
            for info in &segments {
                print_info(info);
            }
        }
        Command::Inspect { identifier } => {
            let info = SegmentDiscovery::new(counter_config).inspect(&identifier)?;
            if cli.json {
                return print_json(&info);
            }
            print_info(&info);
        }
        Command::Hold {
            identifier,
            seconds,
        } => {
            let counter = SharedCounter::create_with(&identifier, &counter_config)?;
            let creator = counter.creator_pid()?;
            info!(
                "Attached to {} as instance #{}",
                counter.identifier(),
                counter.initial_count() + 1
            );
            println!(
                "initial count {}, live count {}, creator {}",
                counter.initial_count(),
                counter.instance_count()?,
                if creator == NO_CREATOR_PID {
                    "none".to_string()
                } else {
                    creator.to_string()
                }
            );

            match seconds {
                Some(secs) => std::thread::sleep(Duration::from_secs(secs)),
                None => {
                    println!("Press Enter to detach");
                    let mut line = String::new();
                    std::io::stdin().lock().read_line(&mut line)?;
                }
            }
            counter.close()?;
            info!("Detached from {}", identifier);
        }
        Command::Incr { identifier } => {
            let counter = SharedCounter::create_with(&identifier, &counter_config)?;
            let previous = counter.increment_count()?;
            counter.close()?;
            println!("{}", describe_adjustment(previous, Adjustment::Increment));
        }
        Command::Decr { identifier } => {
            let counter = SharedCounter::create_with(&identifier, &counter_config)?;
            let previous = counter.decrement_count()?;
            counter.close()?;
            println!("{}", describe_adjustment(previous, Adjustment::Decrement));
        }
        Command::Write {
            identifier,
            offset,
            text,
        } => {
            let counter = SharedCounter::create_with(&identifier, &counter_config)?;
            let guard = counter.lock()?;
            guard.write_user_data(offset, text.as_bytes())?;
            guard.unlock()?;
            println!("Wrote {} bytes at offset {}", text.len(), offset);
            counter.close()?;
        }
        Command::Read {
            identifier,
            offset,
            len,
        } => {
            let counter = SharedCounter::create_with(&identifier, &counter_config)?;
            let mut buf = vec![0u8; len];
            let guard = counter.lock()?;
            guard.read_user_data(offset, &mut buf)?;
            guard.unlock()?;
            counter.close()?;

            if cli.json {
                return print_json(&buf);
            }
            println!("{}", String::from_utf8_lossy(&buf).trim_end_matches('\0'));
        }
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directive(config.shared.log_level)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let mut counter_config = config.counter;
    if let Some(dir) = &cli.shm_dir {
        counter_config.shm_dir = dir.clone();
    }

    run(cli, counter_config)
}
