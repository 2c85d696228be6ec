// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Per-member Value Generation
//!
//! A [`ValueGenerator`] maps names (typically environment variables) to a
//! [`ValueSource`]. Every realized member takes one [`ValueGenerator::snapshot`],
//! which reads fixed values as-is and advances every sequence by one step, so
//! members of the same group get successive ports, seeds or ids.
//!
//! Sequence state lives behind an `Arc`, so clones of a generator (and the
//! builders and schemas holding them) draw from the same sequence and never
//! hand out the same element twice.
//!
//! A one-shot sequence that runs out fails with
//! [`ValueGeneratorError::Exhausted`]; use [`ValueSource::cycle`] for values
//! that should repeat.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValueGeneratorError {
    #[error("no value source registered for '{name}'")]
    Unknown { name: String },
    #[error("value sequence for '{name}' is exhausted")]
    Exhausted { name: String },
}

type BoxedValues = Box<dyn Iterator<Item = String> + Send>;

/// Where the value for one name comes from.
#[derive(Clone)]
pub enum ValueSource {
    Fixed(String),
    Sequence(SharedSequence),
}

/// Sequence of values shared by every clone that refers to it.
#[derive(Clone)]
pub struct SharedSequence {
    description: &'static str,
    values: Arc<Mutex<BoxedValues>>,
}

impl SharedSequence {
    fn new(description: &'static str, values: BoxedValues) -> Self {
        Self {
            description,
            values: Arc::new(Mutex::new(values)),
        }
    }

    fn next(&self) -> Option<String> {
        self.values.lock().next()
    }

    /// Whether `other` is a handle to the very same sequence.
    pub fn same_as(&self, other: &SharedSequence) -> bool {
        Arc::ptr_eq(&self.values, &other.values)
    }
}

impl fmt::Debug for SharedSequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedSequence")
            .field("kind", &self.description)
            .finish_non_exhaustive()
    }
}

impl ValueSource {
    pub fn fixed(value: impl ToString) -> Self {
        Self::Fixed(value.to_string())
    }

    /// One-shot sequence, consumed one element per member.
    pub fn sequence<I>(values: I) -> Self
    where
        I: IntoIterator + 'static,
        I::Item: ToString,
        I::IntoIter: Send + 'static,
    {
        let values = values.into_iter().map(|value| value.to_string());
        Self::Sequence(SharedSequence::new("sequence", Box::new(values)))
    }

    /// Restartable sequence: starts over after the last element. An empty
    /// list behaves like an exhausted sequence.
    pub fn cycle<I>(values: I) -> Self
    where
        I: IntoIterator,
        I::Item: ToString,
    {
        let values: Vec<String> = values.into_iter().map(|value| value.to_string()).collect();
        Self::Sequence(SharedSequence::new("cycle", Box::new(values.into_iter().cycle())))
    }

    /// Unbounded counter starting at `start` (ports, node ids).
    pub fn counter(start: u64) -> Self {
        Self::Sequence(SharedSequence::new(
            "counter",
            Box::new((start..).map(|value| value.to_string())),
        ))
    }

    fn next_value(&self, name: &str) -> Result<String, ValueGeneratorError> {
        match self {
            Self::Fixed(value) => Ok(value.clone()),
            Self::Sequence(sequence) => sequence.next().ok_or_else(|| ValueGeneratorError::Exhausted {
                name: name.to_string(),
            }),
        }
    }
}

impl fmt::Debug for ValueSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed(value) => f.debug_tuple("Fixed").field(value).finish(),
            Self::Sequence(sequence) => f.debug_tuple("Sequence").field(sequence).finish(),
        }
    }
}

impl From<&str> for ValueSource {
    fn from(value: &str) -> Self {
        Self::Fixed(value.to_string())
    }
}

impl From<String> for ValueSource {
    fn from(value: String) -> Self {
        Self::Fixed(value)
    }
}

/// Resolved `name → value` pairs for one member, in registration order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment(Vec<(String, String)>);

impl Environment {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(key, value)| (key.as_str(), value.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, String)> for Environment {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[derive(Debug, Clone, Default)]
pub struct ValueGenerator {
    entries: Vec<(String, ValueSource)>,
}

impl ValueGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `source` for `name`. Re-registering a name replaces its
    /// source but keeps its original position.
    pub fn set(&mut self, name: impl Into<String>, source: impl Into<ValueSource>) -> &mut Self {
        let name = name.into();
        let source = source.into();
        match self.entries.iter_mut().find(|(key, _)| *key == name) {
            Some(entry) => entry.1 = source,
            None => self.entries.push((name, source)),
        }
        self
    }

    /// Next value for `name`; advances the name's sequence, if it has one.
    pub fn resolve(&self, name: &str) -> Result<String, ValueGeneratorError> {
        let (_, source) = self
            .entries
            .iter()
            .find(|(key, _)| key == name)
            .ok_or_else(|| ValueGeneratorError::Unknown {
                name: name.to_string(),
            })?;
        source.next_value(name)
    }

    /// Resolves every name once, in registration order.
    ///
    /// Sequences advanced before an exhausted one are not rewound.
    pub fn snapshot(&self) -> Result<Environment, ValueGeneratorError> {
        self.entries
            .iter()
            .map(|(name, source)| source.next_value(name).map(|value| (name.clone(), value)))
            .collect()
    }

    /// Overlays `other`'s entries onto this generator. Sequences are shared,
    /// not consumed.
    pub fn merge(&mut self, other: &ValueGenerator) -> &mut Self {
        for (name, source) in &other.entries {
            self.set(name.clone(), source.clone());
        }
        self
    }

    pub fn source(&self, name: &str) -> Option<&ValueSource> {
        self.entries
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, source)| source)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.source(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_value_is_stable() {
        let mut generator = ValueGenerator::new();
        generator.set("ROLE", "storage");

        assert_eq!(generator.resolve("ROLE").unwrap(), "storage");
        assert_eq!(generator.resolve("ROLE").unwrap(), "storage");
    }

    #[test]
    fn test_snapshots_walk_the_sequence_then_fail() {
        let mut generator = ValueGenerator::new();
        generator
            .set("ROLE", "storage")
            .set("PORT", ValueSource::sequence([9000, 9001, 9002]));

        let ports: Vec<String> = (0..3)
            .map(|_| generator.snapshot().unwrap().get("PORT").unwrap().to_string())
            .collect();
        assert_eq!(ports, vec!["9000", "9001", "9002"]);

        assert_eq!(
            generator.snapshot(),
            Err(ValueGeneratorError::Exhausted { name: "PORT".to_string() })
        );
    }

    #[test]
    fn test_snapshot_keeps_registration_order() {
        let mut generator = ValueGenerator::new();
        generator.set("B", "2").set("A", "1").set("B", "3");

        let environment = generator.snapshot().unwrap();
        let pairs: Vec<(&str, &str)> = environment.iter().collect();
        assert_eq!(pairs, vec![("B", "3"), ("A", "1")]);
    }

    #[test]
    fn test_cycle_restarts() {
        let mut generator = ValueGenerator::new();
        generator.set("ZONE", ValueSource::cycle(["a", "b"]));

        let zones: Vec<String> = (0..5).map(|_| generator.resolve("ZONE").unwrap()).collect();
        assert_eq!(zones, vec!["a", "b", "a", "b", "a"]);
    }

    #[test]
    fn test_empty_cycle_is_exhausted() {
        let mut generator = ValueGenerator::new();
        generator.set("ZONE", ValueSource::cycle(Vec::<String>::new()));

        assert!(matches!(
            generator.resolve("ZONE"),
            Err(ValueGeneratorError::Exhausted { .. })
        ));
    }

    #[test]
    fn test_unknown_name() {
        let generator = ValueGenerator::new();
        assert_eq!(
            generator.resolve("MISSING"),
            Err(ValueGeneratorError::Unknown { name: "MISSING".to_string() })
        );
    }

    #[test]
    fn test_merge_overlays_without_consuming() {
        let mut base = ValueGenerator::new();
        base.set("ROLE", "storage").set("PORT", "1");

        let mut overlay = ValueGenerator::new();
        overlay.set("PORT", ValueSource::counter(7000)).set("EXTRA", "x");

        base.merge(&overlay);

        // The counter was not advanced by the merge.
        assert_eq!(overlay.resolve("PORT").unwrap(), "7000");
        assert_eq!(base.resolve("PORT").unwrap(), "7001");
        assert_eq!(base.names().collect::<Vec<_>>(), vec!["ROLE", "PORT", "EXTRA"]);
    }

    #[test]
    fn test_clones_share_sequence_state() {
        let mut generator = ValueGenerator::new();
        generator.set("ID", ValueSource::counter(1));
        let copy = generator.clone();

        assert_eq!(generator.resolve("ID").unwrap(), "1");
        assert_eq!(copy.resolve("ID").unwrap(), "2");

        match (generator.source("ID"), copy.source("ID")) {
            (Some(ValueSource::Sequence(a)), Some(ValueSource::Sequence(b))) => assert!(a.same_as(b)),
            other => panic!("expected sequences, got {:?}", other),
        }
    }
}
