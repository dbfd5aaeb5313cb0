//! Final outcome of a run.

use std::fmt;
use std::time::Duration;

use serde::{Serialize, Serializer};
use tally_summary::AggregateReport;

use crate::RunState;

/// Whether every planned page contributed to the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Completeness {
    Complete,
    Partial {
        /// The run was stopped before every page was fetched.
        cancelled: bool,
        /// Pages abandoned after a fatal error.
        pages_skipped: u64,
    },
}

impl Completeness {
    #[must_use]
    pub fn from_state(state: &RunState) -> Self {
        if !state.cancelled && state.pages_failed == 0 {
            Self::Complete
        } else {
            Self::Partial {
                cancelled: state.cancelled,
                pages_skipped: state.pages_failed,
            }
        }
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Complete)
    }
}

impl fmt::Display for Completeness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::Complete => f.write_str("complete"),
            Self::Partial {
                cancelled: true,
                pages_skipped: 0,
            } => f.write_str("partial: cancelled"),
            Self::Partial {
                cancelled: true,
                pages_skipped,
            } => write!(f, "partial: cancelled, {pages_skipped} page(s) skipped"),
            Self::Partial {
                cancelled: false,
                pages_skipped,
            } => write!(f, "partial: {pages_skipped} page(s) skipped"),
        }
    }
}

/// Everything a run produced: the rankings plus how they were obtained.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    #[serde(flatten)]
    pub aggregate: AggregateReport,
    pub state: RunState,
    #[serde(rename = "elapsed_seconds", serialize_with = "as_secs_f64")]
    pub elapsed: Duration,
    pub completeness: Completeness,
}

impl RunReport {
    #[must_use]
    pub fn new(aggregate: AggregateReport, state: RunState, elapsed: Duration) -> Self {
        let completeness = Completeness::from_state(&state);
        Self {
            aggregate,
            state,
            elapsed,
            completeness,
        }
    }
}

fn as_secs_f64<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(duration.as_secs_f64())
}
