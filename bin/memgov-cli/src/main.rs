// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # memgov
//!
//! Command-line tooling for the memory-governed execution node.
//!
//! ## Usage
//! ```bash
//! # Run a synthetic workload
//! memgov run --fragments 4 --batches 1000 --batch-bytes 64K --memory-budget 1G
//!
//! # Run it with a fault-injection control document installed
//! memgov run --controls ./controls.json --repeat 3
//!
//! # Validate a control document and list its rules
//! memgov controls ./controls.json
//! ```

mod commands;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "memgov",
    about = "Memory governance and fault injection for query execution",
    version,
    author
)]
struct Cli {
    /// Path to a TOML configuration file (overrides CLI arguments).
    #[arg(short, long, global = true)]
    config: Option<std::path::PathBuf>,

    /// Enable verbose logging (repeat for more: -v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a synthetic workload as one or more queries on a local node.
    Run {
        /// Root allocator limit (e.g., "512M", "1G").
        #[arg(short = 'b', long, default_value = "1G")]
        memory_budget: String,

        /// Per-query allocator limit.
        #[arg(long, default_value = "256M")]
        query_budget: String,

        /// Per-fragment allocator limit.
        #[arg(long, default_value = "64M")]
        fragment_budget: String,

        /// Number of concurrent fragments per query.
        #[arg(short, long, default_value_t = 4)]
        fragments: usize,

        /// Batches processed by each fragment.
        #[arg(long, default_value_t = 1000)]
        batches: usize,

        /// Bytes reserved per batch (e.g., "64K").
        #[arg(long, default_value = "64K")]
        batch_bytes: String,

        /// Batches each fragment holds at once.
        #[arg(long, default_value_t = 1)]
        retain: usize,

        /// Fault-injection control document (JSON) to install before running.
        #[arg(long)]
        controls: Option<std::path::PathBuf>,

        /// Number of queries to run.
        #[arg(long, default_value_t = 1)]
        repeat: usize,

        /// Include internal causes in reported errors.
        #[arg(long)]
        verbose_errors: bool,
    },

    /// Validate a fault-injection control document and list its rules.
    Controls {
        /// Path to the JSON control document.
        file: std::path::PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing/logging based on verbosity.
    commands::init_tracing(cli.verbose);

    match cli.command {
        Commands::Run {
            memory_budget,
            query_budget,
            fragment_budget,
            fragments,
            batches,
            batch_bytes,
            retain,
            controls,
            repeat,
            verbose_errors,
        } => {
            let args = commands::run::RunArgs {
                config: cli.config,
                memory_budget,
                query_budget,
                fragment_budget,
                fragments,
                batches,
                batch_bytes,
                retain,
                controls,
                repeat,
                verbose_errors,
            };
            commands::run::execute(args).await
        }
        Commands::Controls { file } => commands::controls::execute(file),
    }
}
