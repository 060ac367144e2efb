// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # injection
//!
//! Deterministic fault injection for fixed call sites in execution code.
//!
//! Tests install [`InjectionRule`]s ("at this site, on this endpoint, let
//! `skip` calls through, then fail `fire` calls") into an
//! [`InjectionRegistry`]. Code under test asks an [`InjectionPoint`] for a
//! [`Verdict`] at each call; no rule means [`Verdict::Pass`].
//!
//! # Key Components
//!
//! - [`InjectionSite`] — a `{site_class, descriptor}` lookup key.
//! - [`InjectionRule`] / [`RuleState`] — one fault and its
//!   skipping → firing → exhausted lifecycle.
//! - [`ControlSet`] — an installed rule set with atomic per-rule counters.
//! - [`InjectionRegistry`] — the resettable holder of the active set
//!   (`install` / `clear` / `snapshot`).
//! - [`ControlsDocument`] — the JSON control format used by tooling.
//!
//! There is no process-global registry: callers construct one and bind it
//! where it is needed, which keeps tests isolated from each other.

mod controls;
mod defect;
mod endpoint;
mod error;
mod registry;
mod rule;
mod site;

pub use controls::{parse_controls, ControlsDocument, InjectionEntry, PortValue, EXCEPTION_INJECTION};
pub use defect::DefectKind;
pub use endpoint::Endpoint;
pub use error::InjectionError;
pub use registry::{ControlSet, InjectionPoint, InjectionRegistry, RuleSnapshot, Verdict};
pub use rule::{InjectionRule, RuleState};
pub use site::InjectionSite;
