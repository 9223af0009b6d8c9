//! Storage tier identifiers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CacheError;

/// A named storage scope with its own size cap and default TTL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// In-process map; fastest, lost with the process.
    Memory,
    /// Session-scoped storage.
    Session,
    /// Durable storage; survives restarts.
    Durable,
}

impl Tier {
    /// All tiers, fastest first.
    pub const ALL: [Tier; 3] = [Tier::Memory, Tier::Session, Tier::Durable];

    /// Tier order used by reads when the caller does not pick tiers.
    pub const DEFAULT_READ_ORDER: [Tier; 3] = [Tier::Memory, Tier::Durable, Tier::Session];

    /// Tiers written by `set` when the caller does not pick tiers.
    pub const DEFAULT_WRITE_SET: [Tier; 2] = [Tier::Memory, Tier::Durable];

    /// Returns the tier name used in logs, metrics labels and stats.
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Memory => "memory",
            Tier::Session => "session",
            Tier::Durable => "durable",
        }
    }

    /// Position in [`Tier::ALL`], used to index per-tier counters.
    pub fn index(&self) -> usize {
        match self {
            Tier::Memory => 0,
            Tier::Session => 1,
            Tier::Durable => 2,
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Tier::Memory),
            "session" => Ok(Tier::Session),
            "durable" | "local" => Ok(Tier::Durable),
            other => Err(CacheError::invalid_config("tier", format!("unknown tier '{other}'"))),
        }
    }
}
