// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Assembly Engine
//!
//! Turns an [`AssemblyPlan`] into a stable [`Assembly`] in two phases.
//!
//! **Realization.** Every member spec is submitted to the [`Platform`] on its
//! own tokio task, at most `Parallelism` at a time. A failing member never
//! stops the others; once all of them have settled, any failure rolls the
//! whole assembly back. Waiting is bounded by `Timeout` measured from
//! submission.
//!
//! **Convergence.** The [`StabilityPredicate`] is evaluated over the complete
//! member set, then again every `PollInterval` until it holds or `Timeout`
//! (measured from the first evaluation) runs out.
//!
//! Cancellation is honoured in both phases. Realization tasks still running
//! when the engine gives up are handed to a reaper task which closes whatever
//! they produce, so an abandoned member never outlives its assembly.
//!
//! | Outcome | Error | Rollback |
//! |---------|-------|----------|
//! | a member failed | [`AssemblyError::Realization`] | realized members |
//! | realization too slow | [`AssemblyError::RealizationTimeout`] | realized members + reaper |
//! | never stable | [`AssemblyError::StabilityTimeout`] | every member |
//! | cancelled | [`AssemblyError::Cancelled`] | realized members + reaper |

use chrono::Utc;
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinError;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use troupe_core::domain::events::{AssemblyId, AssemblyLifecycleEvent};
use troupe_core::domain::lifecycle::{InterceptorFailure, LifecycleInterceptor, LifecycleNotifier};
use troupe_core::domain::member::{Member, Realized};
use troupe_core::domain::options::{Parallelism, PollInterval, Timeout};
use troupe_core::domain::platform::{MemberSpec, Platform, RealizationError};
use troupe_core::infrastructure::event_bus::{EventBus, EventBusInterceptor};

use crate::domain::assembly::{teardown, Assembly, TeardownReport};
use crate::domain::plan::AssemblyPlan;
use crate::domain::stability::StabilityPredicate;
use crate::error::AssemblyError;

type Settled = (usize, String, Result<Result<Realized, RealizationError>, JoinError>);
type Pending = FuturesUnordered<BoxFuture<'static, Settled>>;

enum Step {
    Settled(Settled),
    Cancelled,
    TimedOut,
}

/// Members realized so far and what their interceptors reported.
#[derive(Default)]
struct Realization {
    members: Vec<Arc<Member>>,
    failures: Vec<RealizationError>,
    interceptor_failures: Vec<InterceptorFailure>,
}

pub struct AssemblyEngine {
    platform: Arc<dyn Platform>,
    event_bus: Option<EventBus>,
}

impl AssemblyEngine {
    pub fn new(platform: Arc<dyn Platform>) -> Self {
        Self {
            platform,
            event_bus: None,
        }
    }

    /// Publishes assembly events on `bus` and bridges member events onto it.
    pub fn with_event_bus(mut self, bus: EventBus) -> Self {
        self.event_bus = Some(bus);
        self
    }

    pub fn platform(&self) -> &Arc<dyn Platform> {
        &self.platform
    }

    pub fn event_bus(&self) -> Option<&EventBus> {
        self.event_bus.as_ref()
    }

    pub async fn realize(
        &self,
        plan: AssemblyPlan,
        cancel: CancellationToken,
    ) -> Result<Assembly, AssemblyError> {
        let assembly_id = AssemblyId::new();
        let (specs, options, interceptors) = plan.into_parts();

        let timeout = options.get::<Timeout>().map_or(Timeout::DEFAULT, |t| t.0);
        let poll_interval = options.get::<PollInterval>().map_or(PollInterval::DEFAULT, |p| p.0);
        let predicate = options
            .get::<StabilityPredicate>()
            .unwrap_or_else(StabilityPredicate::always);
        let permits = options
            .get::<Parallelism>()
            .map_or(specs.len().max(1), |p| p.0.get());

        info!(
            assembly_id = %assembly_id,
            members = specs.len(),
            timeout_ms = timeout.as_millis() as u64,
            poll_interval_ms = poll_interval.as_millis() as u64,
            predicate = predicate.name(),
            "Realizing assembly"
        );
        self.publish(AssemblyLifecycleEvent::AssemblyBuilding {
            assembly_id,
            members: specs.len(),
            started_at: Utc::now(),
        });

        let started = Instant::now();
        let mut realization = match self
            .realize_members(assembly_id, specs, &interceptors, permits, timeout, &cancel)
            .await
        {
            Ok(realization) => realization,
            Err(e) => return Err(self.fail(assembly_id, e)),
        };

        if !realization.failures.is_empty() {
            warn!(
                assembly_id = %assembly_id,
                failed = realization.failures.len(),
                realized = realization.members.len(),
                "Member realization failed; rolling back"
            );
            let rollback = roll_back(&realization.members, realization.interceptor_failures).await;
            return Err(self.fail(
                assembly_id,
                AssemblyError::Realization {
                    failures: realization.failures,
                    rollback,
                },
            ));
        }

        realization.members.sort_by_key(|member| member.ordinal());
        let members = realization.members;

        let convergence = self
            .converge(
                assembly_id,
                &members,
                &realization.interceptor_failures,
                &predicate,
                timeout,
                poll_interval,
                &cancel,
            )
            .await;
        let evaluations = match convergence {
            Ok(evaluations) => evaluations,
            Err(e) => return Err(self.fail(assembly_id, e)),
        };

        let elapsed = started.elapsed();
        metrics::counter!("troupe_assemblies_stable_total").increment(1);
        metrics::histogram!("troupe_assembly_convergence_seconds").record(elapsed.as_secs_f64());
        info!(
            assembly_id = %assembly_id,
            members = members.len(),
            evaluations,
            elapsed_ms = elapsed.as_millis() as u64,
            "Assembly stable"
        );
        self.publish(AssemblyLifecycleEvent::AssemblyStable {
            assembly_id,
            members: members.len(),
            evaluations,
            elapsed_ms: elapsed.as_millis() as u64,
            stable_at: Utc::now(),
        });

        Ok(Assembly::new(
            assembly_id,
            members,
            predicate,
            timeout,
            poll_interval,
            evaluations,
            realization.interceptor_failures,
            self.event_bus.clone(),
        ))
    }

    /// Submits every spec and waits for all of them to settle.
    ///
    /// Returns `Err` only for cancellation and timeout, after rolling back.
    async fn realize_members(
        &self,
        assembly_id: AssemblyId,
        specs: Vec<MemberSpec>,
        interceptors: &[Arc<dyn LifecycleInterceptor>],
        permits: usize,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<Realization, AssemblyError> {
        let deadline = Instant::now() + timeout;
        let semaphore = Arc::new(Semaphore::new(permits));
        let bridge = self
            .event_bus
            .clone()
            .map(|bus| Arc::new(EventBusInterceptor::new(bus, assembly_id)) as Arc<dyn LifecycleInterceptor>);

        let mut outstanding = BTreeMap::new();
        let mut pending: Pending = FuturesUnordered::new();
        for spec in specs {
            let ordinal = spec.ordinal();
            let name = spec.name().to_string();
            let notifier: LifecycleNotifier = spec
                .schema()
                .interceptors()
                .iter()
                .chain(interceptors)
                .chain(bridge.as_ref())
                .cloned()
                .collect();

            let platform = self.platform.clone();
            let semaphore = semaphore.clone();
            let handle = tokio::spawn(async move {
                // The semaphore is never closed
                let _permit = semaphore.acquire_owned().await.map_err(|e| RealizationError {
                    member: spec.name().to_string(),
                    ordinal: spec.ordinal(),
                    reason: e.to_string(),
                })?;
                Member::launch(platform.as_ref(), spec, notifier).await
            });

            outstanding.insert(ordinal, name.clone());
            pending.push(async move { (ordinal, name, handle.await) }.boxed());
        }

        let mut realization = Realization::default();
        while !pending.is_empty() {
            let step = tokio::select! {
                biased;
                _ = cancel.cancelled() => Step::Cancelled,
                _ = sleep_until(deadline) => Step::TimedOut,
                Some(settled) = pending.next() => Step::Settled(settled),
            };

            match step {
                Step::Settled((ordinal, name, outcome)) => {
                    outstanding.remove(&ordinal);
                    match outcome {
                        Ok(Ok(realized)) => {
                            metrics::counter!("troupe_members_realized_total").increment(1);
                            realization.interceptor_failures.extend(realized.interceptor_failures);
                            realization.members.push(realized.member);
                        }
                        Ok(Err(failure)) => {
                            metrics::counter!("troupe_member_realization_failures_total").increment(1);
                            warn!(assembly_id = %assembly_id, member = %name, ordinal, "{}", failure);
                            realization.failures.push(failure);
                        }
                        Err(join_error) => {
                            metrics::counter!("troupe_member_realization_failures_total").increment(1);
                            error!(assembly_id = %assembly_id, member = %name, ordinal, "Realization task died: {}", join_error);
                            realization.failures.push(RealizationError {
                                member: name,
                                ordinal,
                                reason: format!("realization task failed: {}", join_error),
                            });
                        }
                    }
                }
                Step::Cancelled => {
                    warn!(assembly_id = %assembly_id, outstanding = outstanding.len(), "Realization cancelled");
                    spawn_reaper(assembly_id, pending);
                    let rollback = roll_back(&realization.members, realization.interceptor_failures).await;
                    return Err(AssemblyError::Cancelled { rollback });
                }
                Step::TimedOut => {
                    let outstanding: Vec<String> = outstanding.into_values().collect();
                    warn!(assembly_id = %assembly_id, ?outstanding, "Realization timed out");
                    spawn_reaper(assembly_id, pending);
                    let rollback = roll_back(&realization.members, realization.interceptor_failures).await;
                    return Err(AssemblyError::RealizationTimeout {
                        timeout,
                        outstanding,
                        rollback,
                    });
                }
            }
        }

        Ok(realization)
    }

    /// Polls the predicate until it holds. Returns the number of evaluations.
    ///
    /// `realized_failures` are the interceptor failures seen while realizing
    /// `members`; a rollback reports them ahead of its own.
    #[allow(clippy::too_many_arguments)]
    async fn converge(
        &self,
        assembly_id: AssemblyId,
        members: &[Arc<Member>],
        realized_failures: &[InterceptorFailure],
        predicate: &StabilityPredicate,
        timeout: Duration,
        poll_interval: Duration,
        cancel: &CancellationToken,
    ) -> Result<usize, AssemblyError> {
        if members.is_empty() {
            debug!(assembly_id = %assembly_id, "No members; assembly is trivially stable");
            return Ok(0);
        }

        let deadline = Instant::now() + timeout;
        let mut evaluations = 0;
        loop {
            if cancel.is_cancelled() {
                return Err(self.cancelled(assembly_id, members, realized_failures).await);
            }

            evaluations += 1;
            let stable = predicate.evaluate(members);
            debug!(assembly_id = %assembly_id, evaluation = evaluations, stable, "Stability evaluated");
            if stable {
                return Ok(evaluations);
            }

            let now = Instant::now();
            if now >= deadline {
                let reason = format!("not stable within {:?}", timeout);
                warn!(assembly_id = %assembly_id, evaluations, "Assembly {}; rolling back", reason);
                self.publish(AssemblyLifecycleEvent::AssemblyDegraded {
                    assembly_id,
                    reason,
                    degraded_at: Utc::now(),
                });
                let last_observed = members.iter().map(|member| member.snapshot()).collect();
                let rollback = roll_back(members, realized_failures.to_vec()).await;
                return Err(AssemblyError::StabilityTimeout {
                    timeout,
                    evaluations,
                    last_observed,
                    rollback,
                });
            }

            let wake = (now + poll_interval).min(deadline);
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {}
                _ = sleep_until(wake) => {}
            }
        }
    }

    async fn cancelled(
        &self,
        assembly_id: AssemblyId,
        members: &[Arc<Member>],
        realized_failures: &[InterceptorFailure],
    ) -> AssemblyError {
        warn!(assembly_id = %assembly_id, "Stability polling cancelled; rolling back");
        let rollback = roll_back(members, realized_failures.to_vec()).await;
        AssemblyError::Cancelled { rollback }
    }

    fn fail(&self, assembly_id: AssemblyId, error: AssemblyError) -> AssemblyError {
        metrics::counter!("troupe_assemblies_failed_total", "reason" => error.reason()).increment(1);
        if let Some(rollback) = error.rollback() {
            log_rollback(assembly_id, rollback);
        }
        error!(assembly_id = %assembly_id, reason = error.reason(), "Assembly failed: {}", error);
        self.publish(AssemblyLifecycleEvent::AssemblyFailed {
            assembly_id,
            reason: error.to_string(),
            failed_at: Utc::now(),
        });
        error
    }

    fn publish(&self, event: AssemblyLifecycleEvent) {
        if let Some(bus) = &self.event_bus {
            bus.publish_assembly_event(event);
        }
    }
}

fn log_rollback(assembly_id: AssemblyId, rollback: &TeardownReport) {
    if rollback.is_clean() {
        info!(assembly_id = %assembly_id, closed = rollback.closed, "Rollback complete");
        return;
    }
    for e in &rollback.close_errors {
        warn!(assembly_id = %assembly_id, member = %e.member, "Rollback close failed: {}", e.source);
    }
    for failure in &rollback.interceptor_failures {
        warn!(assembly_id = %assembly_id, "Rollback interceptor failure: {}", failure);
    }
}

/// Closes `members` and reports `realized_failures` ahead of the teardown's own.
async fn roll_back(members: &[Arc<Member>], mut realized_failures: Vec<InterceptorFailure>) -> TeardownReport {
    let mut report = teardown(members).await;
    realized_failures.append(&mut report.interceptor_failures);
    report.interceptor_failures = realized_failures;
    report
}

/// Waits for abandoned realization tasks and closes any member they produce.
fn spawn_reaper(assembly_id: AssemblyId, mut pending: Pending) {
    if pending.is_empty() {
        return;
    }
    debug!(assembly_id = %assembly_id, abandoned = pending.len(), "Handing abandoned members to reaper");
    tokio::spawn(async move {
        while let Some((_, name, outcome)) = pending.next().await {
            if let Ok(Ok(realized)) = outcome {
                info!(assembly_id = %assembly_id, member = %name, "Closing member realized after assembly was abandoned");
                if let Err(e) = realized.member.close().await {
                    warn!(assembly_id = %assembly_id, member = %name, "Reaper failed to close member: {}", e);
                }
            }
        }
    });
}
