// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Typed Options and the `ConfigRegistry`
//!
//! Options are small value objects that each belong to a capability family,
//! identified by a stable [`OptionKind`]. A [`ConfigRegistry`] keeps any number
//! of values per kind in insertion order and falls back to the kind's default
//! factory when nothing was added.
//!
//! | Operation | Behaviour when the kind is absent |
//! |-----------|-----------------------------------|
//! | [`ConfigRegistry::get`] | default value (if the kind declares one), else `None` |
//! | [`ConfigRegistry::get_all`] | `[default]` (if declared), else empty |
//! | [`ConfigRegistry::remove`] | no-op, returns `false` |

use parking_lot::Mutex;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

/// Stable identifier for a family of options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OptionKind(&'static str);

impl OptionKind {
    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    pub fn as_str(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for OptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// A value that can be stored in a [`ConfigRegistry`].
///
/// Every implementing type declares the kind it is indexed under and,
/// optionally, a default produced lazily when a registry holds no value of
/// that kind.
pub trait ConfigOption: Clone + PartialEq + fmt::Debug + Send + Sync + 'static {
    const KIND: OptionKind;

    fn default_value() -> Option<Self> {
        None
    }
}

trait ErasedOption: Send + Sync + fmt::Debug {
    fn as_any(&self) -> &dyn Any;
    fn eq_erased(&self, other: &dyn ErasedOption) -> bool;
}

impl<T: ConfigOption> ErasedOption for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn eq_erased(&self, other: &dyn ErasedOption) -> bool {
        other.as_any().downcast_ref::<T>().is_some_and(|other| other == self)
    }
}

type ErasedValue = Arc<dyn ErasedOption>;

/// Ordered, type-indexed, multi-value configuration container.
#[derive(Default)]
pub struct ConfigRegistry {
    values: HashMap<OptionKind, Vec<ErasedValue>>,
    /// Kinds in first-insertion order, so iteration is deterministic.
    order: Vec<OptionKind>,
    /// Defaults materialized by `get`/`get_all`; private to this registry.
    defaults: Mutex<HashMap<OptionKind, Option<ErasedValue>>>,
}

impl ConfigRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `value` after any existing values of the same kind.
    pub fn add<T: ConfigOption>(&mut self, value: T) -> &mut Self {
        let kind = T::KIND;
        if !self.values.contains_key(&kind) {
            self.order.push(kind);
        }
        self.values.entry(kind).or_default().push(Arc::new(value));
        self
    }

    /// Appends `value` unless an equal value of the same kind is present.
    pub fn add_if_absent<T: ConfigOption>(&mut self, value: T) -> &mut Self {
        let present = self
            .values
            .get(&T::KIND)
            .is_some_and(|values| values.iter().any(|existing| value.eq_erased(existing.as_ref())));
        if !present {
            self.add(value);
        }
        self
    }

    /// Removes every value equal to `value`. Returns whether anything was removed.
    pub fn remove<T: ConfigOption>(&mut self, value: &T) -> bool {
        let kind = T::KIND;
        let Some(values) = self.values.get_mut(&kind) else {
            return false;
        };
        let before = values.len();
        values.retain(|existing| !value.eq_erased(existing.as_ref()));
        let removed = values.len() != before;
        if values.is_empty() {
            self.values.remove(&kind);
            self.order.retain(|k| *k != kind);
        }
        removed
    }

    /// Removes every value of kind `T`.
    pub fn clear<T: ConfigOption>(&mut self) {
        self.values.remove(&T::KIND);
        self.order.retain(|k| *k != T::KIND);
    }

    /// The most recently added value of kind `T`, or its default.
    pub fn get<T: ConfigOption>(&self) -> Option<T> {
        match self.values.get(&T::KIND).and_then(|values| values.last()) {
            Some(value) => downcast::<T>(value),
            None => self.default_of::<T>(),
        }
    }

    /// Every value of kind `T` in insertion order.
    pub fn get_all<T: ConfigOption>(&self) -> Vec<T> {
        match self.values.get(&T::KIND) {
            Some(values) => values.iter().filter_map(downcast::<T>).collect(),
            None => self.default_of::<T>().into_iter().collect(),
        }
    }

    /// Whether a value of kind `T` was explicitly added (defaults don't count).
    pub fn contains<T: ConfigOption>(&self) -> bool {
        self.values.contains_key(&T::KIND)
    }

    /// Appends all of `other`'s values after this registry's own.
    pub fn merge(&mut self, other: &ConfigRegistry) -> &mut Self {
        for kind in &other.order {
            if let Some(values) = other.values.get(kind) {
                if !self.values.contains_key(kind) {
                    self.order.push(*kind);
                }
                self.values
                    .entry(*kind)
                    .or_default()
                    .extend(values.iter().cloned());
            }
        }
        self
    }

    /// Kinds with at least one explicit value, in first-insertion order.
    pub fn kinds(&self) -> impl Iterator<Item = OptionKind> + '_ {
        self.order.iter().copied()
    }

    /// Number of explicitly added values across all kinds.
    pub fn len(&self) -> usize {
        self.values.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn default_of<T: ConfigOption>(&self) -> Option<T> {
        let mut defaults = self.defaults.lock();
        let slot = defaults
            .entry(T::KIND)
            .or_insert_with(|| T::default_value().map(|value| Arc::new(value) as ErasedValue));
        slot.as_ref().and_then(downcast::<T>)
    }
}

fn downcast<T: ConfigOption>(value: &ErasedValue) -> Option<T> {
    let found = value.as_any().downcast_ref::<T>().cloned();
    if found.is_none() {
        tracing::warn!(
            kind = %T::KIND,
            expected = std::any::type_name::<T>(),
            "option kind is shared by more than one type; ignoring mismatched value"
        );
    }
    found
}

impl Clone for ConfigRegistry {
    fn clone(&self) -> Self {
        Self {
            values: self.values.clone(),
            order: self.order.clone(),
            defaults: Mutex::new(HashMap::new()),
        }
    }
}

impl fmt::Debug for ConfigRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for kind in &self.order {
            if let Some(values) = self.values.get(kind) {
                map.entry(&kind.as_str(), values);
            }
        }
        map.finish()
    }
}

// ============================================================================
// Standard options
// ============================================================================

/// Upper bound on how long a phase of assembly construction may take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeout(pub Duration);

impl Timeout {
    pub const DEFAULT: Duration = Duration::from_secs(60);

    pub fn as_duration(&self) -> Duration {
        self.0
    }
}

impl ConfigOption for Timeout {
    const KIND: OptionKind = OptionKind::new("timeout");

    fn default_value() -> Option<Self> {
        Some(Self(Self::DEFAULT))
    }
}

/// Delay between two stability evaluations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollInterval(pub Duration);

impl PollInterval {
    pub const DEFAULT: Duration = Duration::from_millis(250);

    pub fn as_duration(&self) -> Duration {
        self.0
    }
}

impl ConfigOption for PollInterval {
    const KIND: OptionKind = OptionKind::new("poll-interval");

    fn default_value() -> Option<Self> {
        Some(Self(Self::DEFAULT))
    }
}

/// Maximum number of members realized at the same time. Unbounded when absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Parallelism(pub NonZeroUsize);

impl ConfigOption for Parallelism {
    const KIND: OptionKind = OptionKind::new("parallelism");
}

/// Base name for members realized from a schema (`<name>-<ordinal>`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayName(pub String);

impl DisplayName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }
}

impl ConfigOption for DisplayName {
    const KIND: OptionKind = OptionKind::new("display-name");
}
