// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Assembly Manifest Types
//
// Kubernetes-style declarative description of an assembly:
// - apiVersion/kind/metadata/spec envelope
// - assembly-wide timing (timeout, poll interval, parallelism)
// - member templates, each realized `count` times

use crate::domain::options::{ConfigRegistry, DisplayName, Parallelism, PollInterval, Timeout};
use crate::domain::schema::SchemaBuilder;
use crate::domain::value_generator::ValueSource;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::time::Duration;

pub const API_VERSION: &str = "troupe/v1";
pub const KIND: &str = "Assembly";

/// Top-level assembly manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssemblyManifest {
    /// API version (must be "troupe/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "Assembly")
    pub kind: String,

    pub metadata: ManifestMetadata,

    pub spec: AssemblySpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssemblySpec {
    /// Bound on realization and on stability polling
    #[serde(default, with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Duration>,

    /// Delay between stability evaluations
    #[serde(default, with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub poll_interval: Option<Duration>,

    /// Maximum concurrent realizations (unbounded when absent)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parallelism: Option<NonZeroUsize>,

    #[serde(default)]
    pub members: Vec<MemberTemplate>,
}

/// One group of identical members
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberTemplate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    #[serde(default = "default_count")]
    pub count: usize,

    pub executable: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_directory: Option<PathBuf>,

    #[serde(default)]
    pub redirect_error_stream: bool,

    #[serde(default)]
    pub arguments: Vec<String>,

    /// Variables are registered in manifest order
    #[serde(default)]
    pub environment: IndexMap<String, EnvironmentValue>,
}

fn default_count() -> usize {
    1
}

/// YAML scalar accepted wherever a value is expected
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScalarValue {
    Text(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(value) => f.write_str(value),
            Self::Integer(value) => write!(f, "{}", value),
            Self::Float(value) => write!(f, "{}", value),
            Self::Boolean(value) => write!(f, "{}", value),
        }
    }
}

/// Fixed scalar, or a single-key map selecting a generator:
/// `{ sequence: [..] }`, `{ cycle: [..] }` or `{ counter: <start> }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EnvironmentValue {
    Fixed(ScalarValue),
    /// One element per member, fails once exhausted
    Sequence { sequence: Vec<ScalarValue> },
    /// One element per member, starting over at the end
    Cycle { cycle: Vec<ScalarValue> },
    /// Increments per member from the given start
    Counter { counter: u64 },
}

impl EnvironmentValue {
    pub fn to_source(&self) -> ValueSource {
        match self {
            Self::Fixed(value) => ValueSource::fixed(value),
            Self::Sequence { sequence } => {
                ValueSource::sequence(sequence.iter().map(ToString::to_string).collect::<Vec<_>>())
            }
            Self::Cycle { cycle } => ValueSource::cycle(cycle),
            Self::Counter { counter } => ValueSource::counter(*counter),
        }
    }
}

impl AssemblyManifest {
    pub fn validate(&self) -> Result<(), String> {
        if self.api_version != API_VERSION {
            return Err(format!(
                "Unsupported apiVersion '{}', expected '{}'",
                self.api_version, API_VERSION
            ));
        }
        if self.kind != KIND {
            return Err(format!("Unsupported kind '{}', expected '{}'", self.kind, KIND));
        }
        if self.metadata.name.trim().is_empty() {
            return Err("metadata.name must not be empty".to_string());
        }
        for (index, member) in self.spec.members.iter().enumerate() {
            if member.executable.trim().is_empty() {
                return Err(format!("spec.members[{}].executable must not be empty", index));
            }
            if member.count == 0 {
                return Err(format!("spec.members[{}].count must be at least 1", index));
            }
        }
        Ok(())
    }

    /// Assembly-wide options declared by the manifest
    pub fn options(&self) -> ConfigRegistry {
        let mut options = ConfigRegistry::new();
        if let Some(timeout) = self.spec.timeout {
            options.add(Timeout(timeout));
        }
        if let Some(poll_interval) = self.spec.poll_interval {
            options.add(PollInterval(poll_interval));
        }
        if let Some(parallelism) = self.spec.parallelism {
            options.add(Parallelism(parallelism));
        }
        options
    }

    /// One `(count, builder)` pair per member template, in manifest order
    pub fn schema_builders(&self) -> Vec<(usize, SchemaBuilder)> {
        self.spec
            .members
            .iter()
            .map(|template| (template.count, template.to_builder()))
            .collect()
    }
}

impl MemberTemplate {
    pub fn to_builder(&self) -> SchemaBuilder {
        let mut builder = SchemaBuilder::new(self.executable.clone());
        builder
            .redirect_error_stream(self.redirect_error_stream)
            .args(self.arguments.iter().cloned());
        if let Some(directory) = &self.working_directory {
            builder.working_directory(directory.clone());
        }
        if let Some(name) = &self.display_name {
            builder.option(DisplayName::new(name.clone()));
        }
        for (name, value) in &self.environment {
            builder.env(name.clone(), value.to_source());
        }
        builder
    }
}
