//! Identifiers for units of work.
//!
//! The queue is generic over anything implementing [`DispatchKey`]. Validity
//! is an explicit property of the key rather than a comparison against a
//! zero value, so "no key" can never be confused with a real key.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::Hash;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Port assumed when an instance key is written without one.
pub const DEFAULT_PORT: u16 = 3306;

/// A comparable, immutable value naming one unit of work.
///
/// Keys are opaque to the queue; logs and spans show them through `Debug`.
pub trait DispatchKey: Clone + Eq + Hash + fmt::Debug + Send + Sync + 'static {
    /// Whether this key names real work. Invalid keys are dropped on arrival.
    fn is_valid(&self) -> bool;
}

impl DispatchKey for String {
    fn is_valid(&self) -> bool {
        !self.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Instance Key
// ---------------------------------------------------------------------------

/// A host/port pair identifying a database instance to process.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InstanceKey {
    pub hostname: String,
    pub port: u16,
}

impl InstanceKey {
    pub fn new(hostname: impl Into<String>, port: u16) -> Self {
        Self {
            hostname: hostname.into(),
            port,
        }
    }

    /// The reserved key. Producers must never send it.
    pub fn empty() -> Self {
        Self::default()
    }
}

impl DispatchKey for InstanceKey {
    fn is_valid(&self) -> bool {
        !self.hostname.is_empty()
    }
}

impl fmt::Display for InstanceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.hostname, self.port)
    }
}

impl FromStr for InstanceKey {
    type Err = Error;

    /// Parse `host:port` or a bare `host` (port defaults to [`DEFAULT_PORT`]).
    /// Whitespace-only input yields the reserved empty key.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Ok(Self::empty());
        }

        match s.rsplit_once(':') {
            Some((host, port)) => {
                let port = port
                    .parse::<u16>()
                    .map_err(|e| Error::Other(format!("invalid port in instance key '{s}': {e}")))?;
                if host.is_empty() {
                    return Err(Error::Other(format!("missing hostname in instance key '{s}'")));
                }
                Ok(Self::new(host, port))
            }
            None => Ok(Self::new(s, DEFAULT_PORT)),
        }
    }
}
