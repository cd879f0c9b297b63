// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! InfluxDB Output CLI
//!
//! Reads JSON events, one per line, and delivers them to InfluxDB.
//!
//! # Usage
//!
//! ```bash
//! # Stream events from stdin
//! tail -F events.jsonl | influxdb-output --config output.yaml
//!
//! # Replay a file
//! influxdb-output --config output.yaml --input events.jsonl
//!
//! # Generate and check a configuration
//! influxdb-output gen-config --output output.yaml
//! influxdb-output validate --config output.yaml
//! ```

use clap::{Parser, Subcommand};
use influxdb_output::config::RetryConfig;
use influxdb_output::{Event, InfluxSink, SinkConfig, SinkError, SinkStatsSnapshot, ValueType};
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tracing_subscriber::EnvFilter;

/// InfluxDB event output
#[derive(Parser, Debug)]
#[command(name = "influxdb-output")]
#[command(about = "Batching InfluxDB output for JSON event streams")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Read events from this file instead of stdin
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Statistics reporting interval (seconds, 0 to disable)
    #[arg(long, default_value = "0")]
    stats_interval: u64,

    /// Seconds to wait for pending deliveries on shutdown (0 waits forever)
    #[arg(long, default_value = "30")]
    drain_timeout: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate example configuration file
    GenConfig {
        /// Output file path
        #[arg(short, long, default_value = "influxdb-output.yaml")]
        output: PathBuf,
    },

    /// Validate a configuration file
    Validate {
        /// Configuration file path
        #[arg(short, long)]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Logs go to stderr; stdout carries statistics.
    let filter = EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if let Some(cmd) = args.command {
        return match cmd {
            Commands::GenConfig { output } => cmd_gen_config(output),
            Commands::Validate { config } => cmd_validate(config),
        };
    }

    let config_path = args
        .config
        .as_ref()
        .ok_or("Missing --config (see `influxdb-output gen-config`)")?;
    let config = SinkConfig::from_file(config_path)?;
    let sink = InfluxSink::connect(&config)?;

    let input: Box<dyn AsyncRead + Unpin + Send> = match &args.input {
        Some(path) => Box::new(tokio::fs::File::open(path).await?),
        None => Box::new(tokio::io::stdin()),
    };
    let mut lines = BufReader::new(input).lines();

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut stats_tick = tokio::time::interval(Duration::from_secs(args.stats_interval.max(1)));
    stats_tick.tick().await;

    let mut line_no = 0u64;
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                line_no += 1;
                if line.trim().is_empty() {
                    continue;
                }
                match Event::from_json_str(&line) {
                    Ok(event) => sink.receive(&event)?,
                    Err(e) => tracing::warn!("Skipping line {}: {}", line_no, e),
                }
            }
            _ = stats_tick.tick(), if args.stats_interval > 0 => {
                print_stats(&sink.stats());
            }
            _ = &mut ctrl_c => {
                eprintln!("\nShutting down...");
                break;
            }
        }
    }

    let result = if args.drain_timeout > 0 {
        sink.shutdown_timeout(Duration::from_secs(args.drain_timeout))
            .await
    } else {
        sink.shutdown().await
    };

    match result {
        Ok(_) | Err(SinkError::Delivery { .. }) => {}
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

fn cmd_gen_config(output: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let config = SinkConfig::new("localhost", "logstash")
        .data_point("message", "%{@message}")
        .data_point("host", "%{host}")
        .event_data_points_key("influxdb_data_points")
        .type_prefix(ValueType::Integer, "i_")
        .type_prefix(ValueType::Float, "f_")
        .type_prefix(ValueType::Boolean, "b_")
        .buffer(100, Duration::from_secs(1))
        .retry(RetryConfig::default());

    let content = format!(
        r#"# InfluxDB Output Configuration
# Generated by influxdb-output gen-config

{}"#,
        config.to_yaml()?
    );

    std::fs::write(&output, content)?;
    println!("Generated configuration file: {}", output.display());
    Ok(())
}

fn cmd_validate(config_path: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    match SinkConfig::from_file(&config_path) {
        Ok(config) => {
            println!("Configuration valid!");
            println!();
            println!(
                "Server: {}:{} (db: {})",
                config.influxdb.host, config.influxdb.port, config.influxdb.db
            );
            println!("Series: {}", config.series);
            println!("Data points: {}", config.data_points.len());
            for (name, template) in config.data_points.iter() {
                println!("  {} = {}", name, template);
            }
            if let Some(key) = &config.event_data_points_key {
                println!("Dynamic data points key: {}", key);
            }
            println!(
                "Buffer: {} points / {:?}",
                config.buffer.max_items,
                config.buffer.max_interval()
            );
            match config.retry.max_attempts {
                Some(n) => println!("Retry: up to {} attempts", n),
                None => println!("Retry: until delivered"),
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("Configuration invalid: {}", e);
            std::process::exit(1);
        }
    }
}

fn print_stats(stats: &SinkStatsSnapshot) {
    println!(
        "--- Output Statistics ---\n  {} points admitted, {} delivered ({:.1} pts/s), {} in flight, {} dropped, {} retries",
        stats.points_admitted,
        stats.points_flushed,
        stats.points_per_second(),
        stats.points_in_flight,
        stats.points_dropped,
        stats.delivery_retries
    );
}
