// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The injection registry and site evaluator.
//!
//! ```text
//! InjectionRegistry ── install()/clear() ──► Arc<ControlSet>  (swapped whole)
//!        │                                        │
//!        │ snapshot()                             │ evaluate(site, endpoint)
//!        ▼                                        ▼
//!   query context ─────────────────────► ArmedRule { rule, calls: AtomicU64 }
//! ```
//!
//! A [`ControlSet`] is immutable apart from its per-rule counters. Installing
//! new rules swaps in a fresh set, so a query that captured a snapshot keeps
//! evaluating against the rules it started with.

use crate::{DefectKind, Endpoint, InjectionError, InjectionRule, InjectionSite, RuleState};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Outcome of evaluating a call at an injection site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Proceed normally.
    Pass,
    /// Fail the call with the given defect.
    Fail(DefectKind),
}

impl Verdict {
    /// Whether the call should proceed.
    pub fn is_pass(&self) -> bool {
        matches!(self, Verdict::Pass)
    }
}

/// Anything that can decide whether a call at a site should fail.
///
/// Implemented by [`InjectionRegistry`] (consults the currently installed
/// rules) and [`ControlSet`] (a fixed snapshot).
pub trait InjectionPoint: Send + Sync {
    /// Evaluates one call at `site` on `endpoint`, advancing the matching
    /// rule's counter if there is one.
    fn evaluate(&self, site: &InjectionSite, endpoint: Option<&Endpoint>) -> Verdict;
}

/// A rule together with its call counter.
#[derive(Debug)]
struct ArmedRule {
    rule: InjectionRule,
    calls: AtomicU64,
}

/// Point-in-time view of one installed rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleSnapshot {
    /// The rule as installed.
    pub rule: InjectionRule,
    /// Matching calls evaluated so far.
    pub calls: u64,
    /// Lifecycle state for the next matching call.
    pub state: RuleState,
}

/// An installed, non-conflicting set of rules with their counters.
#[derive(Debug, Default)]
pub struct ControlSet {
    rules: Vec<ArmedRule>,
}

impl ControlSet {
    /// A set with no rules: every evaluation passes.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Validates `rules` and arms them with zeroed counters.
    ///
    /// Fails if any rule is invalid or two rules overlap on the same
    /// (site, endpoint) pair.
    pub fn new(rules: Vec<InjectionRule>) -> Result<Self, InjectionError> {
        for (i, rule) in rules.iter().enumerate() {
            rule.validate()?;
            if let Some(other) = rules[..i].iter().find(|r| r.overlaps(rule)) {
                let endpoint = rule
                    .target
                    .as_ref()
                    .or(other.target.as_ref())
                    .map(ToString::to_string)
                    .unwrap_or_else(|| "*".to_string());
                return Err(InjectionError::ConflictingRules {
                    site: rule.site.to_string(),
                    endpoint,
                });
            }
        }

        Ok(Self {
            rules: rules
                .into_iter()
                .map(|rule| ArmedRule {
                    rule,
                    calls: AtomicU64::new(0),
                })
                .collect(),
        })
    }

    /// Number of installed rules.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Returns `true` if no rules are installed.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Returns the current counter and state of every rule.
    pub fn snapshots(&self) -> Vec<RuleSnapshot> {
        self.rules
            .iter()
            .map(|armed| {
                let calls = armed.calls.load(Ordering::Acquire);
                RuleSnapshot {
                    rule: armed.rule.clone(),
                    calls,
                    state: armed.rule.state_after(calls),
                }
            })
            .collect()
    }
}

impl InjectionPoint for ControlSet {
    fn evaluate(&self, site: &InjectionSite, endpoint: Option<&Endpoint>) -> Verdict {
        let Some(armed) = self.rules.iter().find(|a| a.rule.matches(site, endpoint)) else {
            return Verdict::Pass;
        };

        // The counter advances before the decision, so concurrent callers
        // each observe a distinct call number.
        let nth = armed.calls.fetch_add(1, Ordering::AcqRel).saturating_add(1);
        if armed.rule.fires_on(nth) {
            tracing::info!(
                site = %site,
                call = nth,
                defect = %armed.rule.defect,
                "injecting fault"
            );
            Verdict::Fail(armed.rule.defect)
        } else {
            Verdict::Pass
        }
    }
}

/// Explicitly scoped, resettable holder of the active [`ControlSet`].
///
/// # Example
/// ```
/// use injection::{DefectKind, InjectionPoint, InjectionRegistry, InjectionRule, InjectionSite, Verdict};
///
/// const SITE: InjectionSite = InjectionSite::from_static("demo::Reader", "next");
///
/// let registry = InjectionRegistry::new();
/// registry
///     .install(vec![InjectionRule::new(SITE, DefectKind::IoError).skip(1)])
///     .unwrap();
///
/// assert_eq!(registry.evaluate(&SITE, None), Verdict::Pass);
/// assert_eq!(registry.evaluate(&SITE, None), Verdict::Fail(DefectKind::IoError));
/// assert_eq!(registry.evaluate(&SITE, None), Verdict::Pass);
/// ```
#[derive(Debug, Default)]
pub struct InjectionRegistry {
    current: RwLock<Arc<ControlSet>>,
}

impl InjectionRegistry {
    /// Creates a registry with no rules installed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the active rule set. Counters start at zero.
    ///
    /// Must be called before the queries it is meant to affect start;
    /// queries already running keep their snapshot.
    pub fn install(&self, rules: Vec<InjectionRule>) -> Result<(), InjectionError> {
        let set = ControlSet::new(rules)?;
        for rule in &set.rules {
            tracing::info!("installed injection rule: {}", rule.rule);
        }
        *self.current.write() = Arc::new(set);
        Ok(())
    }

    /// Parses a JSON control document and installs its rules.
    pub fn install_controls(&self, json: &str) -> Result<(), InjectionError> {
        self.install(crate::parse_controls(json)?)
    }

    /// Removes all rules and counters.
    pub fn clear(&self) {
        *self.current.write() = Arc::new(ControlSet::empty());
        tracing::debug!("injection rules cleared");
    }

    /// Returns the active rule set, for binding to a single query.
    pub fn snapshot(&self) -> Arc<ControlSet> {
        Arc::clone(&*self.current.read())
    }

    /// Returns `true` if no rules are installed.
    pub fn is_empty(&self) -> bool {
        self.current.read().is_empty()
    }

    /// Returns the counter and state of every active rule.
    pub fn rule_snapshots(&self) -> Vec<RuleSnapshot> {
        self.current.read().snapshots()
    }
}

impl InjectionPoint for InjectionRegistry {
    fn evaluate(&self, site: &InjectionSite, endpoint: Option<&Endpoint>) -> Verdict {
        let set = self.snapshot();
        set.evaluate(site, endpoint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SITE: InjectionSite = InjectionSite::from_static("test::Allocator", "buffer");
    const OTHER: InjectionSite = InjectionSite::from_static("test::Allocator", "other");

    fn outcomes(point: &dyn InjectionPoint, n: usize, endpoint: Option<&Endpoint>) -> Vec<bool> {
        (0..n).map(|_| point.evaluate(&SITE, endpoint).is_pass()).collect()
    }

    #[test]
    fn test_no_rules_always_pass() {
        let registry = InjectionRegistry::new();
        assert!(registry.is_empty());
        assert!(outcomes(&registry, 10, None).iter().all(|p| *p));
    }

    #[test]
    fn test_skip_fire_law() {
        for skip in 0..4u64 {
            for fire in 1..4u64 {
                let registry = InjectionRegistry::new();
                registry
                    .install(vec![InjectionRule::new(SITE, DefectKind::OutOfMemory)
                        .skip(skip)
                        .fire(fire)])
                    .unwrap();

                let total = (skip + fire + 3) as usize;
                let passes = outcomes(&registry, total, None);
                for (i, pass) in passes.iter().enumerate() {
                    let nth = i as u64 + 1;
                    let expect_fail = nth > skip && nth <= skip + fire;
                    assert_eq!(!pass, expect_fail, "skip={skip} fire={fire} call={nth}");
                }
            }
        }
    }

    #[test]
    fn test_fail_carries_defect() {
        let registry = InjectionRegistry::new();
        registry
            .install(vec![InjectionRule::new(SITE, DefectKind::NullReference)])
            .unwrap();
        assert_eq!(
            registry.evaluate(&SITE, None),
            Verdict::Fail(DefectKind::NullReference)
        );
    }

    #[test]
    fn test_other_site_not_counted() {
        let registry = InjectionRegistry::new();
        registry
            .install(vec![InjectionRule::new(SITE, DefectKind::OutOfMemory).skip(1)])
            .unwrap();

        assert!(registry.evaluate(&OTHER, None).is_pass());
        assert!(registry.evaluate(&OTHER, None).is_pass());
        assert_eq!(registry.rule_snapshots()[0].calls, 0);
        assert!(registry.evaluate(&SITE, None).is_pass());
        assert!(!registry.evaluate(&SITE, None).is_pass());
    }

    #[test]
    fn test_endpoint_scoping() {
        let e1 = Endpoint::new("node-1", 31010);
        let e2 = Endpoint::new("node-2", 31010);
        let registry = InjectionRegistry::new();
        registry
            .install(vec![InjectionRule::new(SITE, DefectKind::OutOfMemory).on(e1.clone())])
            .unwrap();

        assert!(outcomes(&registry, 5, Some(&e2)).iter().all(|p| *p));
        assert_eq!(registry.rule_snapshots()[0].calls, 0);
        assert!(!registry.evaluate(&SITE, Some(&e1)).is_pass());
    }

    #[test]
    fn test_distinct_endpoints_do_not_conflict() {
        let registry = InjectionRegistry::new();
        let result = registry.install(vec![
            InjectionRule::new(SITE, DefectKind::OutOfMemory).on(Endpoint::new("a", 1)),
            InjectionRule::new(SITE, DefectKind::IoError).on(Endpoint::new("b", 1)),
        ]);
        assert!(result.is_ok());
        assert_eq!(
            registry.evaluate(&SITE, Some(&Endpoint::new("b", 1))),
            Verdict::Fail(DefectKind::IoError)
        );
    }

    #[test]
    fn test_conflicting_rules_rejected() {
        let registry = InjectionRegistry::new();
        let err = registry
            .install(vec![
                InjectionRule::new(SITE, DefectKind::OutOfMemory),
                InjectionRule::new(SITE, DefectKind::IoError).on(Endpoint::new("a", 1)),
            ])
            .unwrap_err();
        assert!(matches!(err, InjectionError::ConflictingRules { ref endpoint, .. } if endpoint == "a:1"));
        // The previous (empty) set stays active.
        assert!(registry.is_empty());
    }

    #[test]
    fn test_install_replaces_and_resets() {
        let registry = InjectionRegistry::new();
        registry
            .install(vec![InjectionRule::new(SITE, DefectKind::OutOfMemory).skip(2)])
            .unwrap();
        registry.evaluate(&SITE, None);
        registry.evaluate(&SITE, None);
        assert_eq!(registry.rule_snapshots()[0].state, RuleState::ArmedFiring);

        registry
            .install(vec![InjectionRule::new(SITE, DefectKind::OutOfMemory).skip(2)])
            .unwrap();
        let snap = &registry.rule_snapshots()[0];
        assert_eq!(snap.calls, 0);
        assert_eq!(snap.state, RuleState::ArmedSkipping);
    }

    #[test]
    fn test_clear() {
        let registry = InjectionRegistry::new();
        registry
            .install(vec![InjectionRule::new(SITE, DefectKind::OutOfMemory)])
            .unwrap();
        registry.clear();
        assert!(registry.is_empty());
        assert!(registry.evaluate(&SITE, None).is_pass());
    }

    #[test]
    fn test_snapshot_isolated_from_later_installs() {
        let registry = InjectionRegistry::new();
        registry
            .install(vec![InjectionRule::new(SITE, DefectKind::OutOfMemory).skip(1)])
            .unwrap();
        let running = registry.snapshot();

        registry.clear();

        assert!(running.evaluate(&SITE, None).is_pass());
        assert_eq!(running.evaluate(&SITE, None), Verdict::Fail(DefectKind::OutOfMemory));
        assert!(registry.evaluate(&SITE, None).is_pass());
    }

    #[test]
    fn test_snapshot_shares_counters_with_registry() {
        let registry = InjectionRegistry::new();
        registry
            .install(vec![InjectionRule::new(SITE, DefectKind::OutOfMemory).skip(1)])
            .unwrap();
        let snapshot = registry.snapshot();

        assert!(snapshot.evaluate(&SITE, None).is_pass());
        assert!(!registry.evaluate(&SITE, None).is_pass());
        assert_eq!(registry.rule_snapshots()[0].state, RuleState::Exhausted);
    }

    #[test]
    fn test_concurrent_evaluation_fires_exactly_fire_times() {
        let registry = Arc::new(InjectionRegistry::new());
        registry
            .install(vec![InjectionRule::new(SITE, DefectKind::OutOfMemory)
                .skip(100)
                .fire(7)])
            .unwrap();

        let failures: usize = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let registry = Arc::clone(&registry);
                    s.spawn(move || {
                        (0..50)
                            .filter(|_| !registry.evaluate(&SITE, None).is_pass())
                            .count()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).sum()
        });

        assert_eq!(failures, 7);
        assert_eq!(registry.rule_snapshots()[0].calls, 400);
    }
}
