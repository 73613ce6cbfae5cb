// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Wirecheck CLI
//!
//! Runs conformance suites against endpoint processes, aggregates
//! benchmark output and hosts reference endpoints.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

use commands::endpoint::EndpointArgs;

/// Wirecheck - wire-compatibility checks for ZeroMQ-style sockets
#[derive(Parser)]
#[command(name = "wirecheck")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the scenarios of a suite file
    Verify {
        /// Path to the suite file
        #[arg(short, long, default_value = "wirecheck.yaml")]
        config: PathBuf,

        /// Only run the named scenario (repeatable)
        #[arg(short, long)]
        scenario: Vec<String>,
    },

    /// Validate a suite file without running it
    Validate {
        /// Path to the suite file
        #[arg(short, long, default_value = "wirecheck.yaml")]
        config: PathBuf,
    },

    /// Summarise criterion results as markdown
    Aggregate {
        /// Criterion output directory
        #[arg(long, default_value = "target/criterion")]
        criterion_dir: PathBuf,

        /// Write the summary here as well as to stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Implementation tag compared against its counterpart
        #[arg(long, default_value = "inproc")]
        tag: String,

        /// Name substituted for the tag to find the counterpart benchmark
        #[arg(long, default_value = "reference")]
        counterpart: String,

        /// Benchmarks whose names contain this are highlighted
        #[arg(long, default_value = "pipelined")]
        highlight: String,
    },

    /// Run a reference endpoint speaking the harness conventions
    Endpoint(EndpointArgs),
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Endpoints keep stdout for READY/RECV lines, so logs go to stderr.
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(log_level)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Verify { config, scenario } => commands::verify::execute(&config, &scenario).await,
        Commands::Validate { config } => commands::validate::execute(&config).await,
        Commands::Aggregate {
            criterion_dir,
            output,
            tag,
            counterpart,
            highlight,
        } => {
            commands::aggregate::execute(&criterion_dir, output.as_deref(), tag, counterpart, highlight)
                .await
        }
        Commands::Endpoint(args) => commands::endpoint::execute(args).await,
    }
}
