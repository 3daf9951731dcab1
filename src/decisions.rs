//! Per-company analyst decisions.
//!
//! A decision is set from request handlers that run concurrently, so the
//! store is injected as `Arc<dyn DecisionStore>` rather than held in a
//! global. The in-memory implementation serialises writers per key through
//! `DashMap`'s shard locks.

use crate::error::EsgError;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Cooperate,
    Suspend,
}

impl Decision {
    pub fn as_str(self) -> &'static str {
        match self {
            Decision::Cooperate => "cooperate",
            Decision::Suspend => "suspend",
        }
    }

    /// Parse user input. Empty input means "clear the decision".
    pub fn parse_optional(input: &str) -> Result<Option<Self>, EsgError> {
        match input.trim() {
            "" => Ok(None),
            s => s.parse().map(Some),
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Decision {
    type Err = EsgError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cooperate" => Ok(Decision::Cooperate),
            "suspend" => Ok(Decision::Suspend),
            other => Err(EsgError::InvalidConfig(format!(
                "Decision must be 'cooperate', 'suspend', or empty, got {other:?}"
            ))),
        }
    }
}

/// Storage for company decisions.
pub trait DecisionStore: Send + Sync {
    fn get(&self, company: &str) -> Option<Decision>;

    /// Set or, with `None`, clear the decision for `company`.
    fn set(&self, company: &str, decision: Option<Decision>);

    fn clear(&self, company: &str) {
        self.set(company, None);
    }

    /// Snapshot of every decision, ordered by company.
    fn all(&self) -> BTreeMap<String, Decision>;
}

/// Process-local [`DecisionStore`]. Contents are lost on exit.
#[derive(Debug, Default)]
pub struct InMemoryDecisionStore {
    decisions: DashMap<String, Decision>,
}

impl InMemoryDecisionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DecisionStore for InMemoryDecisionStore {
    fn get(&self, company: &str) -> Option<Decision> {
        self.decisions.get(company).map(|d| *d)
    }

    fn set(&self, company: &str, decision: Option<Decision>) {
        match decision {
            Some(d) => {
                self.decisions.insert(company.to_string(), d);
            }
            None => {
                self.decisions.remove(company);
            }
        }
    }

    fn all(&self) -> BTreeMap<String, Decision> {
        self.decisions
            .iter()
            .map(|e| (e.key().clone(), *e.value()))
            .collect()
    }
}
