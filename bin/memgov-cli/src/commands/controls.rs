// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `memgov controls` command: validate a control document.

use anyhow::Context;
use injection::{ControlSet, RuleState};
use memory_manager::INJECTION_SITES;
use std::path::PathBuf;

pub fn execute(file: PathBuf) -> anyhow::Result<()> {
    let json = std::fs::read_to_string(&file)
        .with_context(|| format!("cannot read control document '{}'", file.display()))?;
    let rules = injection::parse_controls(&json)
        .with_context(|| format!("invalid control document '{}'", file.display()))?;
    let set = ControlSet::new(rules).context("rules cannot be installed together")?;

    println!("  {} rule(s) in {}", set.len(), file.display());
    println!();
    for snapshot in set.snapshots() {
        let rule = &snapshot.rule;
        let known = INJECTION_SITES.contains(&rule.site);
        println!("   {rule}");
        if snapshot.state == RuleState::ArmedFiring {
            println!("     fires on the first matching call");
        }
        if !known {
            println!("     warning: no allocation site named '{}' exists; this rule never fires", rule.site);
            tracing::warn!(site = %rule.site, "rule targets an unknown site");
        }
    }

    Ok(())
}
