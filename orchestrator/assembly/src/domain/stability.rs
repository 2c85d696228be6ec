// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Stability Predicates
//!
//! A [`StabilityPredicate`] decides whether a fully realized member set is
//! ready for use. It is stored as an ordinary option in the assembly's
//! [`ConfigRegistry`](troupe_core::domain::options::ConfigRegistry), so the
//! last predicate added wins and an assembly with no predicate is stable as
//! soon as every member is realized.
//!
//! The engine never calls a predicate before every member is `Realized`.
//! A predicate that errors or panics is read as "not stable yet".

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::warn;
use troupe_core::domain::member::Member;
use troupe_core::domain::options::{ConfigOption, OptionKind};

type PredicateFn = dyn Fn(&[Arc<Member>]) -> anyhow::Result<bool> + Send + Sync;

#[derive(Clone)]
pub struct StabilityPredicate {
    name: Arc<str>,
    check: Arc<PredicateFn>,
}

impl StabilityPredicate {
    pub fn new<F>(name: impl Into<Arc<str>>, check: F) -> Self
    where
        F: Fn(&[Arc<Member>]) -> anyhow::Result<bool> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            check: Arc::new(check),
        }
    }

    /// Stable as soon as every member is realized.
    pub fn always() -> Self {
        Self::new("always", |_| Ok(true))
    }

    /// Never stable; realization always ends in a stability timeout.
    pub fn never() -> Self {
        Self::new("never", |_| Ok(false))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Runs the check. An error or a panic counts as "not stable yet".
    pub fn evaluate(&self, members: &[Arc<Member>]) -> bool {
        match panic::catch_unwind(AssertUnwindSafe(|| (self.check)(members))) {
            Ok(Ok(stable)) => stable,
            Ok(Err(e)) => {
                warn!(predicate = %self.name, "Stability predicate failed, treating as unstable: {:#}", e);
                false
            }
            Err(payload) => {
                warn!(
                    predicate = %self.name,
                    "Stability predicate panicked, treating as unstable: {}",
                    panic_message(payload.as_ref())
                );
                false
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

impl PartialEq for StabilityPredicate {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.check, &other.check)
    }
}

impl fmt::Debug for StabilityPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("StabilityPredicate").field(&self.name).finish()
    }
}

impl ConfigOption for StabilityPredicate {
    const KIND: OptionKind = OptionKind::new("stability-predicate");

    fn default_value() -> Option<Self> {
        Some(Self::always())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use troupe_core::domain::options::ConfigRegistry;

    #[test]
    fn test_registry_defaults_to_always_stable() {
        let registry = ConfigRegistry::new();
        let predicate = registry.get::<StabilityPredicate>().unwrap();

        assert_eq!(predicate.name(), "always");
        assert!(predicate.evaluate(&[]));
    }

    #[test]
    fn test_last_predicate_wins() {
        let mut registry = ConfigRegistry::new();
        registry
            .add(StabilityPredicate::always())
            .add(StabilityPredicate::never());

        let predicate = registry.get::<StabilityPredicate>().unwrap();
        assert_eq!(predicate.name(), "never");
        assert!(!predicate.evaluate(&[]));
    }

    #[test]
    fn test_error_is_treated_as_unstable() {
        let predicate = StabilityPredicate::new("broken", |_| anyhow::bail!("health endpoint unreachable"));
        assert!(!predicate.evaluate(&[]));
    }

    #[test]
    fn test_panic_is_treated_as_unstable() {
        let predicate = StabilityPredicate::new("indexing", |members| Ok(members[5].is_closed()));
        assert!(!predicate.evaluate(&[]));

        let predicate = StabilityPredicate::new("formatted", |_| panic!("lost {} members", 2));
        assert!(!predicate.evaluate(&[]));
    }

    #[test]
    fn test_equality_is_identity() {
        let predicate = StabilityPredicate::always();
        let copy = predicate.clone();

        assert_eq!(predicate, copy);
        assert_ne!(predicate, StabilityPredicate::always());

        let mut registry = ConfigRegistry::new();
        registry.add_if_absent(predicate.clone()).add_if_absent(copy);
        assert_eq!(registry.get_all::<StabilityPredicate>().len(), 1);
    }
}
