// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Injection rules and their per-rule state machine.
//!
//! ```text
//!  ArmedSkipping ──(calls > skip)──► ArmedFiring ──(calls > skip+fire)──► Exhausted
//! ```
//!
//! A rule with `skip = 0` starts in `ArmedFiring`. Transitions happen only on
//! matching evaluations and never go backwards.

use crate::{DefectKind, Endpoint, InjectionError, InjectionSite};
use std::fmt;

/// One configured fault: "at `site` on `target`, let `skip` calls through,
/// then fail the next `fire` calls with `defect`".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InjectionRule {
    /// Endpoint the rule is scoped to; `None` matches any endpoint.
    pub target: Option<Endpoint>,
    /// Site the rule is attached to.
    pub site: InjectionSite,
    /// Number of matching calls that pass before the rule fires.
    pub skip: u64,
    /// Number of matching calls that fail once skipping is over.
    pub fire: u64,
    /// Defect raised while firing.
    pub defect: DefectKind,
}

impl InjectionRule {
    /// Creates a rule that fires once, immediately, on any endpoint.
    pub fn new(site: InjectionSite, defect: DefectKind) -> Self {
        Self {
            target: None,
            site,
            skip: 0,
            fire: 1,
            defect,
        }
    }

    /// Lets the first `n` matching calls pass.
    pub fn skip(mut self, n: u64) -> Self {
        self.skip = n;
        self
    }

    /// Fails `n` matching calls after skipping.
    pub fn fire(mut self, n: u64) -> Self {
        self.fire = n;
        self
    }

    /// Scopes the rule to a single endpoint.
    pub fn on(mut self, endpoint: Endpoint) -> Self {
        self.target = Some(endpoint);
        self
    }

    /// Whether this rule applies to a call at `site` on `endpoint`.
    pub fn matches(&self, site: &InjectionSite, endpoint: Option<&Endpoint>) -> bool {
        if &self.site != site {
            return false;
        }
        match &self.target {
            None => true,
            Some(target) => endpoint == Some(target),
        }
    }

    /// Whether this rule and `other` could both match one (site, endpoint) pair.
    pub fn overlaps(&self, other: &InjectionRule) -> bool {
        if self.site != other.site {
            return false;
        }
        match (&self.target, &other.target) {
            (Some(a), Some(b)) => a == b,
            _ => true,
        }
    }

    /// Checks the rule's own invariants.
    pub fn validate(&self) -> Result<(), InjectionError> {
        if self.fire == 0 {
            return Err(InjectionError::InvalidFireCount {
                site: self.site.to_string(),
            });
        }
        Ok(())
    }

    /// The state reached after `calls` matching evaluations.
    pub fn state_after(&self, calls: u64) -> RuleState {
        if calls < self.skip {
            RuleState::ArmedSkipping
        } else if calls < self.skip.saturating_add(self.fire) {
            RuleState::ArmedFiring
        } else {
            RuleState::Exhausted
        }
    }

    /// Whether the `nth` matching call (1-based) fails.
    pub fn fires_on(&self, nth: u64) -> bool {
        nth > self.skip && nth <= self.skip.saturating_add(self.fire)
    }
}

impl fmt::Display for InjectionRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let target = self
            .target
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_else(|| "*".to_string());
        write!(
            f,
            "{} on {target}: skip {}, fire {} × {}",
            self.site, self.skip, self.fire, self.defect
        )
    }
}

/// Where a rule is in its lifecycle, describing the *next* matching call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleState {
    /// The next matching call passes and counts toward `skip`.
    ArmedSkipping,
    /// The next matching call fails.
    ArmedFiring,
    /// Every further matching call passes.
    Exhausted,
}

impl fmt::Display for RuleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RuleState::ArmedSkipping => "armed-skipping",
            RuleState::ArmedFiring => "armed-firing",
            RuleState::Exhausted => "exhausted",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SITE: InjectionSite = InjectionSite::from_static("test::Site", "call");

    #[test]
    fn test_builder() {
        let rule = InjectionRule::new(SITE, DefectKind::NullReference)
            .skip(3)
            .fire(2)
            .on(Endpoint::new("h", 1));
        assert_eq!(rule.skip, 3);
        assert_eq!(rule.fire, 2);
        assert_eq!(rule.target, Some(Endpoint::new("h", 1)));
    }

    #[test]
    fn test_state_progression() {
        let rule = InjectionRule::new(SITE, DefectKind::OutOfMemory).skip(2).fire(2);
        let states: Vec<_> = (0..6).map(|c| rule.state_after(c)).collect();
        assert_eq!(
            states,
            vec![
                RuleState::ArmedSkipping,
                RuleState::ArmedSkipping,
                RuleState::ArmedFiring,
                RuleState::ArmedFiring,
                RuleState::Exhausted,
                RuleState::Exhausted,
            ]
        );
    }

    #[test]
    fn test_zero_skip_starts_firing() {
        let rule = InjectionRule::new(SITE, DefectKind::OutOfMemory);
        assert_eq!(rule.state_after(0), RuleState::ArmedFiring);
        assert!(rule.fires_on(1));
        assert!(!rule.fires_on(2));
    }

    #[test]
    fn test_fires_on_window() {
        let rule = InjectionRule::new(SITE, DefectKind::OutOfMemory).skip(200).fire(1);
        assert!(!rule.fires_on(200));
        assert!(rule.fires_on(201));
        assert!(!rule.fires_on(202));
    }

    #[test]
    fn test_huge_counts_do_not_overflow() {
        let rule = InjectionRule::new(SITE, DefectKind::OutOfMemory)
            .skip(u64::MAX - 1)
            .fire(u64::MAX);
        assert_eq!(rule.state_after(u64::MAX - 1), RuleState::ArmedFiring);
        assert!(rule.fires_on(u64::MAX));
    }

    #[test]
    fn test_zero_fire_invalid() {
        let rule = InjectionRule::new(SITE, DefectKind::OutOfMemory).fire(0);
        assert!(matches!(rule.validate(), Err(InjectionError::InvalidFireCount { .. })));
    }

    #[test]
    fn test_matching_and_wildcards() {
        let e1 = Endpoint::new("a", 1);
        let e2 = Endpoint::new("b", 2);
        let any = InjectionRule::new(SITE, DefectKind::OutOfMemory);
        let scoped = InjectionRule::new(SITE, DefectKind::OutOfMemory).on(e1.clone());

        assert!(any.matches(&SITE, Some(&e2)));
        assert!(any.matches(&SITE, None));
        assert!(scoped.matches(&SITE, Some(&e1)));
        assert!(!scoped.matches(&SITE, Some(&e2)));
        assert!(!scoped.matches(&SITE, None));
        assert!(!any.matches(&InjectionSite::new("other", "call"), Some(&e1)));
    }

    #[test]
    fn test_overlap() {
        let e1 = Endpoint::new("a", 1);
        let e2 = Endpoint::new("b", 2);
        let on_e1 = InjectionRule::new(SITE, DefectKind::OutOfMemory).on(e1.clone());
        let on_e2 = InjectionRule::new(SITE, DefectKind::OutOfMemory).on(e2);
        let any = InjectionRule::new(SITE, DefectKind::OutOfMemory);

        assert!(!on_e1.overlaps(&on_e2));
        assert!(on_e1.overlaps(&on_e1.clone()));
        assert!(any.overlaps(&on_e1));
        assert!(on_e2.overlaps(&any));
    }
}
