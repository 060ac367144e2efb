// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The closed set of defects a rule can synthesize.

use crate::InjectionError;
use std::fmt;
use std::str::FromStr;

/// A defect variant resolved from its configured name at parse time.
///
/// # Parsing
/// Names are case-insensitive and accept kebab-case or CamelCase:
/// `"out-of-memory"` / `"OutOfMemory"`, `"null-reference"` / `"NullReference"`,
/// `"illegal-state"`, `"illegal-argument"`, `"io-error"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DefectKind {
    /// Genuine resource exhaustion.
    OutOfMemory,
    /// A dereference of a missing value.
    NullReference,
    /// An operation invoked in the wrong state.
    IllegalState,
    /// An operation invoked with a bad argument.
    IllegalArgument,
    /// An I/O failure.
    IoError,
}

impl DefectKind {
    /// Every defect kind, in declaration order.
    pub const ALL: [DefectKind; 5] = [
        DefectKind::OutOfMemory,
        DefectKind::NullReference,
        DefectKind::IllegalState,
        DefectKind::IllegalArgument,
        DefectKind::IoError,
    ];

    /// Canonical configuration name.
    pub fn name(&self) -> &'static str {
        match self {
            DefectKind::OutOfMemory => "out-of-memory",
            DefectKind::NullReference => "null-reference",
            DefectKind::IllegalState => "illegal-state",
            DefectKind::IllegalArgument => "illegal-argument",
            DefectKind::IoError => "io-error",
        }
    }

    /// Whether this defect is a genuine exhaustion condition.
    pub fn is_exhaustion(&self) -> bool {
        matches!(self, DefectKind::OutOfMemory)
    }
}

impl fmt::Display for DefectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DefectKind {
    type Err = InjectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalised: String = s
            .trim()
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .flat_map(char::to_lowercase)
            .collect();

        match normalised.as_str() {
            "outofmemory" | "oom" => Ok(DefectKind::OutOfMemory),
            "nullreference" | "null" => Ok(DefectKind::NullReference),
            "illegalstate" => Ok(DefectKind::IllegalState),
            "illegalargument" => Ok(DefectKind::IllegalArgument),
            "ioerror" | "io" => Ok(DefectKind::IoError),
            _ => Err(InjectionError::UnknownDefect(s.to_string())),
        }
    }
}
