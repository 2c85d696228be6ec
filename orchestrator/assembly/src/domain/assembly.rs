// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Assembly Aggregate
//!
//! - [`Assembly`]: the members of one successful realization, together with
//!   the predicate, timeout and poll interval that produced it.
//! - [`TeardownReport`]: what happened while closing a set of members.
//!
//! # Invariants
//!
//! - The member list never changes once the assembly is returned.
//! - Every member is closed at most once, however many times and from however
//!   many tasks [`Assembly::close`] is called.
//! - Members are closed concurrently; one member failing to terminate never
//!   keeps the others running.

use chrono::Utc;
use futures::future::join_all;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};
use troupe_core::domain::events::{AssemblyId, AssemblyLifecycleEvent};
use troupe_core::domain::lifecycle::InterceptorFailure;
use troupe_core::domain::member::{CloseError, Member, MemberSnapshot};
use troupe_core::infrastructure::event_bus::EventBus;

use crate::domain::stability::StabilityPredicate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssemblyState {
    Building,
    Stable,
    Degraded,
    Closed,
}

impl fmt::Display for AssemblyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Building => "building",
            Self::Stable => "stable",
            Self::Degraded => "degraded",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Outcome of closing a set of members.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TeardownReport {
    /// Members that ended up `Closed`, including those whose termination failed.
    pub closed: usize,
    pub close_errors: Vec<CloseError>,
    /// For a rollback, also the failures raised while members were realized.
    pub interceptor_failures: Vec<InterceptorFailure>,
}

impl TeardownReport {
    /// No termination failed and no interceptor complained.
    pub fn is_clean(&self) -> bool {
        self.close_errors.is_empty() && self.interceptor_failures.is_empty()
    }
}

impl fmt::Display for TeardownReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} member(s) closed, {} close error(s), {} interceptor failure(s)",
            self.closed,
            self.close_errors.len(),
            self.interceptor_failures.len()
        )
    }
}

/// At least one member failed to terminate. Every member is closed anyway.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("assembly teardown was not clean: {report}")]
pub struct TeardownError {
    pub report: TeardownReport,
}

/// Closes every member concurrently and collects what went wrong.
pub(crate) async fn teardown(members: &[Arc<Member>]) -> TeardownReport {
    let outcomes = join_all(members.iter().map(|member| member.close())).await;

    let mut report = TeardownReport::default();
    for outcome in outcomes {
        report.closed += 1;
        match outcome {
            Ok(failures) => report.interceptor_failures.extend(failures),
            Err(e) => {
                report.interceptor_failures.extend(e.interceptor_failures.iter().cloned());
                report.close_errors.push(e);
            }
        }
    }
    debug!(
        closed = report.closed,
        close_errors = report.close_errors.len(),
        "Teardown finished"
    );
    report
}

/// A realized, stable set of members.
pub struct Assembly {
    id: AssemblyId,
    members: Vec<Arc<Member>>,
    predicate: StabilityPredicate,
    timeout: Duration,
    poll_interval: Duration,
    evaluations: usize,
    interceptor_failures: Vec<InterceptorFailure>,
    state: Mutex<AssemblyState>,
    close_started: AtomicBool,
    event_bus: Option<EventBus>,
}

impl Assembly {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        id: AssemblyId,
        members: Vec<Arc<Member>>,
        predicate: StabilityPredicate,
        timeout: Duration,
        poll_interval: Duration,
        evaluations: usize,
        interceptor_failures: Vec<InterceptorFailure>,
        event_bus: Option<EventBus>,
    ) -> Self {
        Self {
            id,
            members,
            predicate,
            timeout,
            poll_interval,
            evaluations,
            interceptor_failures,
            state: Mutex::new(AssemblyState::Stable),
            close_started: AtomicBool::new(false),
            event_bus,
        }
    }

    pub fn id(&self) -> AssemblyId {
        self.id
    }

    /// Members in ordinal order.
    pub fn members(&self) -> &[Arc<Member>] {
        &self.members
    }

    pub fn member(&self, name: &str) -> Option<&Arc<Member>> {
        self.members.iter().find(|member| member.name() == name)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn state(&self) -> AssemblyState {
        *self.state.lock()
    }

    pub fn snapshot(&self) -> Vec<MemberSnapshot> {
        self.members.iter().map(|member| member.snapshot()).collect()
    }

    pub fn predicate(&self) -> &StabilityPredicate {
        &self.predicate
    }

    /// Re-runs the stability predicate against the current members.
    pub fn is_stable(&self) -> bool {
        if self.state() == AssemblyState::Closed {
            return false;
        }
        self.members.is_empty() || self.predicate.evaluate(&self.members)
    }

    /// Predicate evaluations it took to converge.
    pub fn evaluations(&self) -> usize {
        self.evaluations
    }

    /// Interceptor failures observed while members were realized.
    pub fn interceptor_failures(&self) -> &[InterceptorFailure] {
        &self.interceptor_failures
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Closes every member. Only the first call does any work; any later or
    /// concurrent call returns an empty, clean report.
    pub async fn close(&self) -> Result<TeardownReport, TeardownError> {
        if self.close_started.swap(true, Ordering::AcqRel) {
            debug!(assembly_id = %self.id, "Assembly already closing; ignoring close");
            return Ok(TeardownReport::default());
        }

        info!(assembly_id = %self.id, members = self.members.len(), "Closing assembly");
        let report = teardown(&self.members).await;
        *self.state.lock() = AssemblyState::Closed;

        if let Some(bus) = &self.event_bus {
            bus.publish_assembly_event(AssemblyLifecycleEvent::AssemblyClosed {
                assembly_id: self.id,
                closed_at: Utc::now(),
            });
        }

        if report.close_errors.is_empty() {
            info!(assembly_id = %self.id, "Assembly closed");
            Ok(report)
        } else {
            warn!(assembly_id = %self.id, "Assembly closed with errors: {}", report);
            Err(TeardownError { report })
        }
    }
}

impl Drop for Assembly {
    fn drop(&mut self) {
        if !self.close_started.load(Ordering::Acquire) && !self.members.is_empty() {
            warn!(
                assembly_id = %self.id,
                members = self.members.len(),
                "Assembly dropped without being closed; members may still be running"
            );
        }
    }
}

impl fmt::Debug for Assembly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Assembly")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("members", &self.members)
            .field("predicate", &self.predicate)
            .finish()
    }
}
