// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Node configuration loaded from TOML files or constructed programmatically.
//!
//! # TOML Format
//! ```toml
//! address = "10.0.0.5"
//! user_port = 31010
//! memory_budget = "1G"
//! query_budget = "256M"
//! fragment_budget = "64M"
//! num_threads = 4
//! verbose_errors = false
//! controls = '{"injections": []}'
//! ```

use crate::QueryError;
use injection::Endpoint;
use memory_manager::MemoryBudget;
use std::path::Path;

/// Configuration for one execution node.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RuntimeConfig {
    /// Address this node is known by.
    pub address: String,
    /// Port clients connect to; together with `address` this is the node's
    /// endpoint for injection matching.
    pub user_port: u16,
    /// Limit of the node's root allocator (human-readable, e.g. `"1G"`).
    pub memory_budget: String,
    /// Limit of each query's allocator.
    pub query_budget: String,
    /// Limit of each fragment's allocator.
    pub fragment_budget: String,
    /// Number of worker threads (defaults to number of online CPU cores).
    pub num_threads: Option<usize>,
    /// Whether wire errors include the internal cause.
    #[serde(default)]
    pub verbose_errors: bool,
    /// Fault-injection control document installed at start-up.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub controls: Option<String>,
}

impl RuntimeConfig {
    /// Loads configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, QueryError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            QueryError::Config(format!("cannot read config '{}': {e}", path.display()))
        })?;
        Self::from_toml(&content)
    }

    /// Parses configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, QueryError> {
        toml::from_str(toml_str).map_err(|e| QueryError::Config(format!("TOML parse error: {e}")))
    }

    /// Serialises configuration to TOML.
    pub fn to_toml(&self) -> Result<String, QueryError> {
        toml::to_string_pretty(self)
            .map_err(|e| QueryError::Config(format!("TOML serialise error: {e}")))
    }

    /// The endpoint this node evaluates injection rules against.
    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new(self.address.clone(), self.user_port)
    }

    /// Parses the root allocator's limit.
    pub fn parse_budget(&self) -> Result<MemoryBudget, QueryError> {
        parse_named("memory_budget", &self.memory_budget)
    }

    /// Parses the per-query limit.
    pub fn parse_query_budget(&self) -> Result<MemoryBudget, QueryError> {
        parse_named("query_budget", &self.query_budget)
    }

    /// Parses the per-fragment limit.
    pub fn parse_fragment_budget(&self) -> Result<MemoryBudget, QueryError> {
        parse_named("fragment_budget", &self.fragment_budget)
    }

    /// Resolves the number of worker threads.
    pub fn resolve_threads(&self) -> usize {
        self.num_threads.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        })
    }

    /// Checks every budget parses and the controls, if any, are valid.
    pub fn validate(&self) -> Result<(), QueryError> {
        self.parse_budget()?;
        self.parse_query_budget()?;
        self.parse_fragment_budget()?;
        if let Some(controls) = &self.controls {
            injection::parse_controls(controls)?;
        }
        Ok(())
    }
}

fn parse_named(field: &str, value: &str) -> Result<MemoryBudget, QueryError> {
    MemoryBudget::parse(value).map_err(|e| QueryError::Config(format!("invalid {field}: {e}")))
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            address: "localhost".to_string(),
            user_port: 31010,
            memory_budget: "1G".to_string(),
            query_budget: "256M".to_string(),
            fragment_budget: "64M".to_string(),
            num_threads: None,
            verbose_errors: false,
            controls: None,
        }
    }
}
