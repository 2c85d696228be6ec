// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use crate::domain::schema::Schema;
use crate::domain::value_generator::Environment;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlatformError {
    #[error("Failed to spawn application: {0}")]
    SpawnFailed(String),
    #[error("Failed to terminate application: {0}")]
    TerminationFailed(String),
    #[error("Platform unavailable: {0}")]
    Unavailable(String),
}

/// A member that could not be realized.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("member '{member}' (#{ordinal}) failed to realize: {reason}")]
pub struct RealizationError {
    pub member: String,
    pub ordinal: usize,
    pub reason: String,
}

/// Everything a platform needs to start one member.
#[derive(Debug, Clone)]
pub struct MemberSpec {
    ordinal: usize,
    name: String,
    schema: Arc<Schema>,
    environment: Environment,
}

impl MemberSpec {
    pub fn new(ordinal: usize, name: impl Into<String>, schema: Arc<Schema>, environment: Environment) -> Self {
        Self {
            ordinal,
            name: name.into(),
            schema,
            environment,
        }
    }

    /// Position of the member in its assembly, from 0.
    pub fn ordinal(&self) -> usize {
        self.ordinal
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Environment resolved for this member only.
    pub fn environment(&self) -> &Environment {
        &self.environment
    }
}

/// Platform-specific handle to a running application.
#[async_trait]
pub trait ApplicationProcess: Send + Sync + fmt::Debug {
    fn pid(&self) -> Option<u32> {
        None
    }

    /// Stops the application. Called at most once per process.
    async fn terminate(&self) -> Result<(), PlatformError>;

    /// Allows predicates and interceptors to reach the concrete handle.
    fn as_any(&self) -> &dyn Any;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberState {
    Starting,
    Realized,
    Closing,
    Closed,
    Failed,
}

impl fmt::Display for MemberState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Starting => "starting",
            Self::Realized => "realized",
            Self::Closing => "closing",
            Self::Closed => "closed",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Turns member specs into running applications.
///
/// Must be safe to call concurrently for distinct specs.
#[async_trait]
pub trait Platform: Send + Sync {
    fn name(&self) -> &str;

    async fn realize(&self, spec: &MemberSpec) -> Result<Box<dyn ApplicationProcess>, PlatformError>;
}
