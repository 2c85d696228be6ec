// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Member Lifecycle Notification
//!
//! Interceptors observe three points in a member's life:
//!
//! | Event | Fired |
//! |-------|-------|
//! | [`LifecycleEvent::Realized`] | right after the platform hands back a live process, before anyone else sees the member |
//! | [`LifecycleEvent::Closing`] | right before termination, while the member is still queryable |
//! | [`LifecycleEvent::Closed`] | after termination, exactly once, whatever happened before |
//!
//! Interceptors run one after another in registration order. An interceptor
//! error is captured as an [`InterceptorFailure`]; it never stops the
//! remaining interceptors nor the lifecycle transition itself.

use crate::domain::member::Member;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleEvent {
    Realized,
    Closing,
    Closed,
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Realized => "realized",
            Self::Closing => "closing",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Observer of member lifecycle events. Every callback defaults to a no-op.
#[async_trait]
pub trait LifecycleInterceptor: Send + Sync {
    /// Name used when reporting failures of this interceptor.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    async fn on_realized(&self, _member: &Member) -> anyhow::Result<()> {
        Ok(())
    }

    async fn on_closing(&self, _member: &Member) -> anyhow::Result<()> {
        Ok(())
    }

    async fn on_closed(&self, _member: &Member) -> anyhow::Result<()> {
        Ok(())
    }
}

/// A captured interceptor error. Never fatal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterceptorFailure {
    pub interceptor: String,
    pub member: String,
    pub event: LifecycleEvent,
    pub message: String,
}

impl fmt::Display for InterceptorFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "interceptor '{}' failed on {} of '{}': {}",
            self.interceptor, self.event, self.member, self.message
        )
    }
}

/// Ordered list of interceptors for one member.
#[derive(Clone, Default)]
pub struct LifecycleNotifier {
    interceptors: Vec<Arc<dyn LifecycleInterceptor>>,
}

impl LifecycleNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, interceptor: Arc<dyn LifecycleInterceptor>) -> &mut Self {
        self.interceptors.push(interceptor);
        self
    }

    pub fn len(&self) -> usize {
        self.interceptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interceptors.is_empty()
    }

    /// Delivers `event` to every interceptor and returns the failures.
    pub async fn notify(&self, event: LifecycleEvent, member: &Member) -> Vec<InterceptorFailure> {
        let mut failures = Vec::new();
        for interceptor in &self.interceptors {
            let outcome = match event {
                LifecycleEvent::Realized => interceptor.on_realized(member).await,
                LifecycleEvent::Closing => interceptor.on_closing(member).await,
                LifecycleEvent::Closed => interceptor.on_closed(member).await,
            };
            if let Err(e) = outcome {
                warn!(
                    interceptor = interceptor.name(),
                    member = member.name(),
                    %event,
                    "Lifecycle interceptor failed: {:#}",
                    e
                );
                failures.push(InterceptorFailure {
                    interceptor: interceptor.name().to_string(),
                    member: member.name().to_string(),
                    event,
                    message: format!("{:#}", e),
                });
            }
        }
        failures
    }
}

impl FromIterator<Arc<dyn LifecycleInterceptor>> for LifecycleNotifier {
    fn from_iter<T: IntoIterator<Item = Arc<dyn LifecycleInterceptor>>>(iter: T) -> Self {
        Self {
            interceptors: iter.into_iter().collect(),
        }
    }
}

impl fmt::Debug for LifecycleNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.interceptors.iter().map(|i| i.name()))
            .finish()
    }
}
