//! Results returned to publish callers.

use serde::{Deserialize, Serialize};

use crate::error::StreamError;

/// Broker-assigned identifier of an acknowledged message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Outcome of one batch publish.
///
/// When several events fail, `error` holds whichever failure completed
/// first. That choice depends on scheduling and is not stable across runs.
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    /// Number of events handed to dispatch units.
    pub attempted: usize,
    /// Number of events acknowledged by the broker.
    pub succeeded: usize,
    /// One representative failure, if any unit or the market refresh failed.
    pub error: Option<StreamError>,
}

impl BatchReport {
    /// Report for a batch stopped before fan-out.
    pub fn aborted(error: StreamError) -> Self {
        Self { attempted: 0, succeeded: 0, error: Some(error) }
    }

    pub fn failed(&self) -> usize {
        self.attempted - self.succeeded
    }

    /// True when every attempted event was acknowledged and nothing failed.
    pub fn is_complete(&self) -> bool {
        self.error.is_none() && self.succeeded == self.attempted
    }
}

impl std::fmt::Display for BatchReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "attempted={} succeeded={}", self.attempted, self.succeeded)?;
        if let Some(e) = &self.error {
            write!(f, " error={e}")?;
        }
        Ok(())
    }
}
