// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `memgov run` command: drive a synthetic workload through a node.
//!
//! ```text
//! ExecNode<Stopped> → start → <Running> → run × repeat → shutdown
//! ```

use anyhow::Context;
use memory_manager::MemoryBudget;
use query_runtime::{ExecNode, FragmentSpec, QueryError, RuntimeConfig, Workload};
use std::path::PathBuf;

pub struct RunArgs {
    pub config: Option<PathBuf>,
    pub memory_budget: String,
    pub query_budget: String,
    pub fragment_budget: String,
    pub fragments: usize,
    pub batches: usize,
    pub batch_bytes: String,
    pub retain: usize,
    pub controls: Option<PathBuf>,
    pub repeat: usize,
    pub verbose_errors: bool,
}

pub async fn execute(args: RunArgs) -> anyhow::Result<()> {
    // ── Configuration ──────────────────────────────────────────
    let mut config = match &args.config {
        Some(path) => RuntimeConfig::from_file(path)?,
        None => RuntimeConfig {
            memory_budget: args.memory_budget.clone(),
            query_budget: args.query_budget.clone(),
            fragment_budget: args.fragment_budget.clone(),
            verbose_errors: args.verbose_errors,
            ..Default::default()
        },
    };
    if let Some(path) = &args.controls {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read control document '{}'", path.display()))?;
        config.controls = Some(json);
    }

    let batch_bytes = MemoryBudget::parse(&args.batch_bytes)
        .map_err(|e| anyhow::anyhow!("invalid --batch-bytes: {e}"))?
        .as_bytes();
    let workload = Workload::new(
        "synthetic",
        (0..args.fragments)
            .map(|i| FragmentSpec::new(format!("fragment-{i}"), args.batches, batch_bytes).retaining(args.retain))
            .collect(),
    );

    println!("  Config:");
    println!("   Endpoint:  {}", config.endpoint());
    println!("   Budgets:   node {}, query {}, fragment {}", config.memory_budget, config.query_budget, config.fragment_budget);
    println!("   Workload:  {} fragments × {} batches × {} bytes", args.fragments, args.batches, batch_bytes);
    println!();

    let node = ExecNode::new(config).start()?;
    for rule in node.registry().rule_snapshots() {
        println!("   Injection: {}", rule.rule);
    }

    // ── Queries ────────────────────────────────────────────────
    let mut failed = 0;
    for i in 1..=args.repeat {
        match node.run(&workload).await {
            Ok(outcome) => {
                println!("  [{i}/{}] {}", args.repeat, outcome.metrics.summary());
            }
            Err(QueryError::User(error)) => {
                failed += 1;
                let wire = node.render(&error);
                println!("  [{i}/{}] failed:", args.repeat);
                println!("   {}", serde_json::to_string_pretty(&wire)?);
            }
            Err(e) => return Err(e.into()),
        }
    }
    println!();

    for rule in node.registry().rule_snapshots() {
        println!("   {} after {} calls: {}", rule.rule.site, rule.calls, rule.state);
    }

    let stats = node.shutdown()?;
    println!("  Node Stats:");
    println!("   {}", stats.summary());

    if failed > 0 {
        anyhow::bail!("{failed} of {} queries failed", args.repeat);
    }
    Ok(())
}
