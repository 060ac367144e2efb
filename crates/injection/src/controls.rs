// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The JSON control document used by test and operator tooling.
//!
//! # Format
//! ```json
//! {"injections": [{
//!   "address": "10.0.0.5", "port": "31010",
//!   "type": "exception",
//!   "siteClass": "memory_manager::Allocator", "desc": "child-buffer",
//!   "nSkip": 200, "nFire": 1,
//!   "exceptionClass": "out-of-memory"
//! }]}
//! ```
//!
//! `address` and `port` are optional (together); `port` may be a string or a
//! number. Unknown fields are ignored.

use crate::{DefectKind, Endpoint, InjectionError, InjectionRule, InjectionSite};

/// The only injection type the registry executes.
pub const EXCEPTION_INJECTION: &str = "exception";

/// A parsed control document.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ControlsDocument {
    /// Injection entries, in document order.
    #[serde(default)]
    pub injections: Vec<InjectionEntry>,
}

/// A port written either as a JSON number or a JSON string.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum PortValue {
    Number(u16),
    Text(String),
}

impl PortValue {
    fn resolve(&self) -> Result<u16, InjectionError> {
        match self {
            PortValue::Number(n) => Ok(*n),
            PortValue::Text(s) => s
                .trim()
                .parse()
                .map_err(|_| InjectionError::InvalidPort(s.clone())),
        }
    }
}

/// One entry of the `injections` list, as written on the wire.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InjectionEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<PortValue>,
    #[serde(rename = "type")]
    pub injection_type: String,
    pub site_class: String,
    pub desc: String,
    pub n_skip: u64,
    pub n_fire: u64,
    pub exception_class: String,
}

impl InjectionEntry {
    /// Builds an exception entry for `site` that synthesizes `defect`.
    pub fn exception(site: &InjectionSite, defect: DefectKind) -> Self {
        Self {
            address: None,
            port: None,
            injection_type: EXCEPTION_INJECTION.to_string(),
            site_class: site.site_class().to_string(),
            desc: site.descriptor().to_string(),
            n_skip: 0,
            n_fire: 1,
            exception_class: defect.name().to_string(),
        }
    }

    /// Scopes the entry to one endpoint.
    pub fn on(mut self, endpoint: &Endpoint) -> Self {
        self.address = Some(endpoint.address.clone());
        self.port = Some(PortValue::Text(endpoint.port.to_string()));
        self
    }

    /// Sets the skip and fire counts.
    pub fn counts(mut self, n_skip: u64, n_fire: u64) -> Self {
        self.n_skip = n_skip;
        self.n_fire = n_fire;
        self
    }

    /// Resolves this entry into a validated rule.
    pub fn to_rule(&self) -> Result<InjectionRule, InjectionError> {
        let site = InjectionSite::new(self.site_class.clone(), self.desc.clone());

        if self.injection_type != EXCEPTION_INJECTION {
            return Err(InjectionError::UnsupportedType(self.injection_type.clone()));
        }

        let target = match (&self.address, &self.port) {
            (Some(address), Some(port)) => Some(Endpoint::new(address.clone(), port.resolve()?)),
            (None, None) => None,
            _ => {
                return Err(InjectionError::IncompleteEndpoint {
                    site: site.to_string(),
                })
            }
        };

        let rule = InjectionRule {
            target,
            site,
            skip: self.n_skip,
            fire: self.n_fire,
            defect: self.exception_class.parse()?,
        };
        rule.validate()?;
        Ok(rule)
    }
}

impl ControlsDocument {
    /// Parses a control document from JSON.
    pub fn from_json(json: &str) -> Result<Self, InjectionError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serialises the document to JSON.
    pub fn to_json(&self) -> Result<String, InjectionError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Resolves every entry into a rule, failing on the first invalid one.
    pub fn to_rules(&self) -> Result<Vec<InjectionRule>, InjectionError> {
        self.injections.iter().map(InjectionEntry::to_rule).collect()
    }
}

/// Parses a JSON control document straight into rules.
pub fn parse_controls(json: &str) -> Result<Vec<InjectionRule>, InjectionError> {
    ControlsDocument::from_json(json)?.to_rules()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{"injections":[{
        "address":"10.0.0.5","port":"31010","type":"exception",
        "siteClass":"memory_manager::Allocator","desc":"child-buffer",
        "nSkip":200,"nFire":1,"exceptionClass":"null-reference"
    }]}"#;

    #[test]
    fn test_parse_sample() {
        let rules = parse_controls(SAMPLE).unwrap();
        assert_eq!(rules.len(), 1);
        let rule = &rules[0];
        assert_eq!(rule.target, Some(Endpoint::new("10.0.0.5", 31010)));
        assert_eq!(rule.site, InjectionSite::new("memory_manager::Allocator", "child-buffer"));
        assert_eq!(rule.skip, 200);
        assert_eq!(rule.fire, 1);
        assert_eq!(rule.defect, DefectKind::NullReference);
    }

    #[test]
    fn test_numeric_port() {
        let json = r#"{"injections":[{"address":"h","port":9,"type":"exception",
            "siteClass":"s","desc":"d","nSkip":0,"nFire":1,"exceptionClass":"oom"}]}"#;
        let rules = parse_controls(json).unwrap();
        assert_eq!(rules[0].target, Some(Endpoint::new("h", 9)));
    }

    #[test]
    fn test_wildcard_endpoint() {
        let json = r#"{"injections":[{"type":"exception","siteClass":"s","desc":"d",
            "nSkip":0,"nFire":3,"exceptionClass":"io-error"}]}"#;
        let rules = parse_controls(json).unwrap();
        assert_eq!(rules[0].target, None);
        assert_eq!(rules[0].fire, 3);
    }

    #[test]
    fn test_unknown_fields_ignored() {
        let json = r#"{"trace":true,"injections":[{"type":"exception","siteClass":"s",
            "desc":"d","nSkip":1,"nFire":1,"exceptionClass":"oom","comment":"x"}]}"#;
        assert_eq!(parse_controls(json).unwrap().len(), 1);
    }

    #[test]
    fn test_missing_injections_is_empty() {
        assert!(parse_controls("{}").unwrap().is_empty());
    }

    #[test]
    fn test_missing_required_field() {
        let json = r#"{"injections":[{"type":"exception","siteClass":"s",
            "nSkip":1,"nFire":1,"exceptionClass":"oom"}]}"#;
        let err = parse_controls(json).unwrap_err();
        assert!(matches!(err, InjectionError::MalformedControls(ref m) if m.contains("desc")));
    }

    #[test]
    fn test_negative_skip_rejected() {
        let json = r#"{"injections":[{"type":"exception","siteClass":"s","desc":"d",
            "nSkip":-1,"nFire":1,"exceptionClass":"oom"}]}"#;
        assert!(matches!(
            parse_controls(json),
            Err(InjectionError::MalformedControls(_))
        ));
    }

    #[test]
    fn test_unsupported_type() {
        let json = r#"{"injections":[{"type":"pause","siteClass":"s","desc":"d",
            "nSkip":0,"nFire":1,"exceptionClass":"oom"}]}"#;
        assert!(matches!(
            parse_controls(json),
            Err(InjectionError::UnsupportedType(ref t)) if t == "pause"
        ));
    }

    #[test]
    fn test_unknown_defect() {
        let json = r#"{"injections":[{"type":"exception","siteClass":"s","desc":"d",
            "nSkip":0,"nFire":1,"exceptionClass":"StackOverflow"}]}"#;
        assert!(matches!(parse_controls(json), Err(InjectionError::UnknownDefect(_))));
    }

    #[test]
    fn test_zero_fire_rejected() {
        let json = r#"{"injections":[{"type":"exception","siteClass":"s","desc":"d",
            "nSkip":0,"nFire":0,"exceptionClass":"oom"}]}"#;
        assert!(matches!(
            parse_controls(json),
            Err(InjectionError::InvalidFireCount { .. })
        ));
    }

    #[test]
    fn test_address_without_port() {
        let json = r#"{"injections":[{"address":"h","type":"exception","siteClass":"s",
            "desc":"d","nSkip":0,"nFire":1,"exceptionClass":"oom"}]}"#;
        assert!(matches!(
            parse_controls(json),
            Err(InjectionError::IncompleteEndpoint { .. })
        ));
    }

    #[test]
    fn test_bad_port() {
        let json = r#"{"injections":[{"address":"h","port":"http","type":"exception",
            "siteClass":"s","desc":"d","nSkip":0,"nFire":1,"exceptionClass":"oom"}]}"#;
        assert!(matches!(parse_controls(json), Err(InjectionError::InvalidPort(_))));
    }

    #[test]
    fn test_builder_produces_parseable_document() {
        const SITE: InjectionSite = InjectionSite::from_static("memory_manager::Allocator", "child-buffer");
        let endpoint = Endpoint::new("node-1", 31010);
        let doc = ControlsDocument {
            injections: vec![InjectionEntry::exception(&SITE, DefectKind::OutOfMemory)
                .on(&endpoint)
                .counts(5, 2)],
        };
        let rules = parse_controls(&doc.to_json().unwrap()).unwrap();
        assert_eq!(
            rules,
            vec![InjectionRule::new(SITE, DefectKind::OutOfMemory)
                .skip(5)
                .fire(2)
                .on(endpoint)]
        );
    }
}
