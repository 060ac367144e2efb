// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Injection site identifiers.

use std::borrow::Cow;
use std::fmt;

/// A fixed location in execution code where a fault may be injected.
///
/// Composed of the owning component (`site_class`) and the call site within
/// it (`descriptor`). Sites compiled into a crate are `const`:
///
/// ```
/// use injection::InjectionSite;
///
/// const SPILL_SITE: InjectionSite = InjectionSite::from_static("sort::Spiller", "spill");
/// assert_eq!(SPILL_SITE.to_string(), "sort::Spiller:spill");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InjectionSite {
    site_class: Cow<'static, str>,
    descriptor: Cow<'static, str>,
}

impl InjectionSite {
    /// Creates a site from owned or borrowed strings (used when parsing controls).
    pub fn new(site_class: impl Into<String>, descriptor: impl Into<String>) -> Self {
        Self {
            site_class: Cow::Owned(site_class.into()),
            descriptor: Cow::Owned(descriptor.into()),
        }
    }

    /// Creates a site from static strings, usable in `const` context.
    pub const fn from_static(site_class: &'static str, descriptor: &'static str) -> Self {
        Self {
            site_class: Cow::Borrowed(site_class),
            descriptor: Cow::Borrowed(descriptor),
        }
    }

    /// The component owning this site.
    pub fn site_class(&self) -> &str {
        &self.site_class
    }

    /// The call site within the component.
    pub fn descriptor(&self) -> &str {
        &self.descriptor
    }
}

impl fmt::Display for InjectionSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.site_class, self.descriptor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_and_owned_are_equal() {
        const SITE: InjectionSite = InjectionSite::from_static("a::B", "c");
        assert_eq!(SITE, InjectionSite::new("a::B", "c"));
    }

    #[test]
    fn test_descriptor_distinguishes() {
        assert_ne!(InjectionSite::new("a", "x"), InjectionSite::new("a", "y"));
        assert_ne!(InjectionSite::new("a", "x"), InjectionSite::new("b", "x"));
    }
}
