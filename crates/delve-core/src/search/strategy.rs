use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// How the orchestrator spreads one query across its providers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SearchStrategy {
    /// Providers in priority order; first non-empty answer wins.
    #[default]
    Fallback,
    /// Every provider at once; all hits are merged.
    Parallel,
    /// Next provider in rotation, falling back to the rest on a miss.
    #[serde(alias = "round_robin")]
    RoundRobin,
    /// Providers ranked by observed health, then fallback order.
    #[serde(alias = "best_first")]
    BestFirst,
}

impl SearchStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchStrategy::Fallback => "fallback",
            SearchStrategy::Parallel => "parallel",
            SearchStrategy::RoundRobin => "round-robin",
            SearchStrategy::BestFirst => "best-first",
        }
    }
}

impl fmt::Display for SearchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SearchStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "fallback" => Ok(SearchStrategy::Fallback),
            "parallel" => Ok(SearchStrategy::Parallel),
            "round-robin" => Ok(SearchStrategy::RoundRobin),
            "best-first" => Ok(SearchStrategy::BestFirst),
            other => Err(format!("unknown search strategy '{other}'")),
        }
    }
}
