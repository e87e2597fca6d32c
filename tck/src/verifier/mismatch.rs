//! Disagreement reports.
//!
//! A [`Mismatch`] records the expected value and what each source returned,
//! so a convergence timeout shows both observations.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::sources::SourceKind;

/// What one source returned for a check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "detail")]
pub enum Observed {
    /// The source answered with this value
    Value(String),
    /// The read itself failed
    ReadError(String),
}

impl fmt::Display for Observed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(v) => write!(f, "{}", v),
            Self::ReadError(e) => write!(f, "read error ({})", e),
        }
    }
}

/// One source's observation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    /// Source that was read
    pub source: SourceKind,
    /// What it returned
    pub observed: Observed,
}

/// A check that did not hold, with what every source reported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mismatch {
    /// Checked quantity, e.g. `hbar balance of 0.0.1001`
    pub subject: String,
    /// Expected value
    pub expected: String,
    /// Observations from both sources, including those that agreed
    pub observations: Vec<Observation>,
}

impl Mismatch {
    /// Build from a subject and expected value.
    pub fn new(subject: impl Into<String>, expected: impl ToString) -> Self {
        Self {
            subject: subject.into(),
            expected: expected.to_string(),
            observations: Vec::new(),
        }
    }

    /// Record an observation.
    pub fn observe(mut self, source: SourceKind, observed: Observed) -> Self {
        self.observations.push(Observation { source, observed });
        self
    }

    /// Observation of one source, if recorded.
    pub fn observed_by(&self, source: SourceKind) -> Option<&Observed> {
        self.observations
            .iter()
            .find(|o| o.source == source)
            .map(|o| &o.observed)
    }
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: expected {}", self.subject, self.expected)?;
        for observation in &self.observations {
            write!(f, ", {} saw {}", observation.source, observation.observed)?;
        }
        Ok(())
    }
}

impl std::error::Error for Mismatch {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_lists_both_sources() {
        let mismatch = Mismatch::new("hbar balance of 0.0.1001", 0)
            .observe(SourceKind::Consensus, Observed::Value("0".to_string()))
            .observe(SourceKind::Mirror, Observed::ReadError("404".to_string()));

        assert_eq!(
            mismatch.to_string(),
            "hbar balance of 0.0.1001: expected 0, consensus saw 0, mirror saw read error (404)"
        );
        assert_eq!(
            mismatch.observed_by(SourceKind::Mirror),
            Some(&Observed::ReadError("404".to_string()))
        );
    }
}
