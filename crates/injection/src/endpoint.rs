// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Network endpoint identity.

use std::fmt;

/// The address/port pair identifying one execution node in a cluster.
///
/// Rules may target a single endpoint, and classified errors report the
/// endpoint they originated on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Endpoint {
    /// Host name or IP address.
    pub address: String,
    /// User-facing port of the node.
    pub port: u16,
}

impl Endpoint {
    /// Creates an endpoint from an address and port.
    pub fn new(address: impl Into<String>, port: u16) -> Self {
        Self {
            address: address.into(),
            port,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.address, self.port)
    }
}
