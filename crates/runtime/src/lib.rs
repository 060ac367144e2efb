// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # query-runtime
//!
//! The execution side of memory governance: runs queries on a node under a
//! hierarchy of allocators and turns allocator failures into client errors.
//!
//! The runtime brings together:
//! - An [`Allocator`](memory_manager::Allocator) tree from `memory-manager`:
//!   node root, one child per query, one grandchild per fragment.
//! - An [`InjectionRegistry`](injection::InjectionRegistry) from `injection`,
//!   snapshotted once per query.
//! - The [`AllocationBoundary`], the single place where a failed reservation
//!   becomes a `RESOURCE` [`UserError`] carrying [`MEMORY_ERROR_MSG`].
//!
//! # Type-State Lifecycle
//! ```text
//! ExecNode<Stopped> → ExecNode<Running> → (shutdown)
//! ```
//! Transitions are compile-time checked.
//!
//! # Async Execution
//! Queries are driven by `tokio`; fragments run on blocking worker threads,
//! bounded by the configured thread count.

mod classifier;
mod config;
mod error;
mod executor;
mod metrics;
mod user_error;
mod workload;

pub use classifier::{classify, AllocationBoundary};
pub use config::RuntimeConfig;
pub use error::QueryError;
pub use executor::{ExecNode, NodeState, QueryOutcome, Running, Stopped};
pub use metrics::{FragmentMetrics, QueryMetrics};
pub use user_error::{ErrorType, UserError, WireError, MEMORY_ERROR_MSG};
pub use workload::{FragmentSpec, Workload};
