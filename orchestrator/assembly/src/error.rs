// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use crate::domain::assembly::TeardownReport;
use std::time::Duration;
use thiserror::Error;
use troupe_core::domain::member::MemberSnapshot;
use troupe_core::domain::platform::RealizationError;
use troupe_core::domain::schema::ConfigurationError;

/// Why an assembly could not be realized.
///
/// Every variant raised after submission carries the report of the rollback
/// that closed the members which did realize; no member is left running.
#[derive(Debug, Error)]
pub enum AssemblyError {
    #[error("invalid assembly configuration: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("{} member(s) failed to realize: {}", .failures.len(), join_failures(.failures))]
    Realization {
        failures: Vec<RealizationError>,
        rollback: TeardownReport,
    },

    #[error("members not realized within {timeout:?}: {}", .outstanding.join(", "))]
    RealizationTimeout {
        timeout: Duration,
        outstanding: Vec<String>,
        rollback: TeardownReport,
    },

    #[error("assembly not stable within {timeout:?} after {evaluations} evaluation(s)")]
    StabilityTimeout {
        timeout: Duration,
        evaluations: usize,
        last_observed: Vec<MemberSnapshot>,
        rollback: TeardownReport,
    },

    #[error("assembly realization cancelled")]
    Cancelled { rollback: TeardownReport },
}

impl AssemblyError {
    /// Rollback report, for every error raised after submission.
    pub fn rollback(&self) -> Option<&TeardownReport> {
        match self {
            Self::Configuration(_) => None,
            Self::Realization { rollback, .. }
            | Self::RealizationTimeout { rollback, .. }
            | Self::StabilityTimeout { rollback, .. }
            | Self::Cancelled { rollback } => Some(rollback),
        }
    }

    /// Short label used for metrics and events.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration",
            Self::Realization { .. } => "realization",
            Self::RealizationTimeout { .. } => "realization_timeout",
            Self::StabilityTimeout { .. } => "stability_timeout",
            Self::Cancelled { .. } => "cancelled",
        }
    }
}

fn join_failures(failures: &[RealizationError]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_realization_error_names_every_failed_member() {
        let err = AssemblyError::Realization {
            failures: vec![
                RealizationError {
                    member: "server-2".to_string(),
                    ordinal: 1,
                    reason: "exit code 1".to_string(),
                },
                RealizationError {
                    member: "server-4".to_string(),
                    ordinal: 3,
                    reason: "no such file".to_string(),
                },
            ],
            rollback: TeardownReport::default(),
        };

        let message = err.to_string();
        assert!(message.starts_with("2 member(s) failed to realize"));
        assert!(message.contains("server-2"));
        assert!(message.contains("server-4"));
        assert_eq!(err.reason(), "realization");
        assert!(err.rollback().is_some());
    }

    #[test]
    fn test_configuration_error_has_no_rollback() {
        let err = AssemblyError::from(ConfigurationError::BlankExecutable);
        assert!(err.rollback().is_none());
        assert_eq!(err.reason(), "configuration");
    }
}
