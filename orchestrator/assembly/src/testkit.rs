// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Test Kit
//!
//! In-memory collaborators for exercising assemblies without spawning real
//! processes. Enabled for this crate's own tests and, through the `testkit`
//! feature, for downstream test suites.
//!
//! - [`ScriptedPlatform`]: realizes members instantly or after a delay, fails
//!   or panics on chosen member names, and tracks how many processes are
//!   still alive.
//! - [`RecordingInterceptor`]: remembers every lifecycle notification and can
//!   be told to fail on one event.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use troupe_core::domain::lifecycle::{LifecycleEvent, LifecycleInterceptor};
use troupe_core::domain::member::Member;
use troupe_core::domain::platform::{ApplicationProcess, MemberSpec, Platform, PlatformError};

#[derive(Debug, Default)]
struct Counters {
    realize_calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    live: AtomicUsize,
    terminations: AtomicUsize,
}

/// Platform whose behaviour is scripted per member name.
#[derive(Debug, Default)]
pub struct ScriptedPlatform {
    failing: HashSet<String>,
    panicking: HashSet<String>,
    stuck: HashSet<String>,
    delays: HashMap<String, Duration>,
    default_delay: Duration,
    counters: Arc<Counters>,
    next_pid: AtomicU32,
    realized: Mutex<Vec<String>>,
}

impl ScriptedPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Realizing `member` fails with [`PlatformError::SpawnFailed`].
    pub fn fail(mut self, member: impl Into<String>) -> Self {
        self.failing.insert(member.into());
        self
    }

    /// The realization task for `member` panics.
    pub fn panic_on(mut self, member: impl Into<String>) -> Self {
        self.panicking.insert(member.into());
        self
    }

    /// Terminating `member` fails with [`PlatformError::TerminationFailed`].
    pub fn fail_termination(mut self, member: impl Into<String>) -> Self {
        self.stuck.insert(member.into());
        self
    }

    pub fn delay(mut self, member: impl Into<String>, delay: Duration) -> Self {
        self.delays.insert(member.into(), delay);
        self
    }

    /// Delay applied to every member without its own delay.
    pub fn default_delay(mut self, delay: Duration) -> Self {
        self.default_delay = delay;
        self
    }

    pub fn realize_calls(&self) -> usize {
        self.counters.realize_calls.load(Ordering::SeqCst)
    }

    /// Highest number of realizations observed running at the same time.
    pub fn peak_concurrency(&self) -> usize {
        self.counters.peak_in_flight.load(Ordering::SeqCst)
    }

    /// Processes realized and not yet successfully terminated.
    pub fn live_processes(&self) -> usize {
        self.counters.live.load(Ordering::SeqCst)
    }

    pub fn terminations(&self) -> usize {
        self.counters.terminations.load(Ordering::SeqCst)
    }

    /// Names of successfully realized members, in completion order.
    pub fn realized(&self) -> Vec<String> {
        self.realized.lock().clone()
    }
}

#[async_trait]
impl Platform for ScriptedPlatform {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn realize(&self, spec: &MemberSpec) -> Result<Box<dyn ApplicationProcess>, PlatformError> {
        let name = spec.name();
        self.counters.realize_calls.fetch_add(1, Ordering::SeqCst);
        let in_flight = self.counters.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.counters.peak_in_flight.fetch_max(in_flight, Ordering::SeqCst);

        let delay = self.delays.get(name).copied().unwrap_or(self.default_delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.counters.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.panicking.contains(name) {
            panic!("scripted panic while realizing '{}'", name);
        }
        if self.failing.contains(name) {
            return Err(PlatformError::SpawnFailed(format!("scripted failure for '{}'", name)));
        }

        self.counters.live.fetch_add(1, Ordering::SeqCst);
        self.realized.lock().push(name.to_string());
        Ok(Box::new(SimulatedProcess {
            name: name.to_string(),
            pid: 1000 + self.next_pid.fetch_add(1, Ordering::SeqCst),
            stuck: self.stuck.contains(name),
            counters: self.counters.clone(),
        }))
    }
}

/// Process handed out by [`ScriptedPlatform`].
#[derive(Debug)]
pub struct SimulatedProcess {
    name: String,
    pid: u32,
    stuck: bool,
    counters: Arc<Counters>,
}

impl SimulatedProcess {
    pub fn name(&self) -> &str {
        &self.name
    }
}

#[async_trait]
impl ApplicationProcess for SimulatedProcess {
    fn pid(&self) -> Option<u32> {
        Some(self.pid)
    }

    async fn terminate(&self) -> Result<(), PlatformError> {
        self.counters.terminations.fetch_add(1, Ordering::SeqCst);
        if self.stuck {
            return Err(PlatformError::TerminationFailed(format!(
                "'{}' ignored the termination request",
                self.name
            )));
        }
        self.counters.live.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Interceptor that records `(event, member name)` for every notification.
#[derive(Debug)]
pub struct RecordingInterceptor {
    name: String,
    fail_on: Option<LifecycleEvent>,
    events: Mutex<Vec<(LifecycleEvent, String)>>,
}

impl RecordingInterceptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fail_on: None,
            events: Mutex::new(Vec::new()),
        }
    }

    /// Records `event` as usual, then reports a failure.
    pub fn failing_on(mut self, event: LifecycleEvent) -> Self {
        self.fail_on = Some(event);
        self
    }

    pub fn events(&self) -> Vec<(LifecycleEvent, String)> {
        self.events.lock().clone()
    }

    pub fn count(&self, event: LifecycleEvent) -> usize {
        self.events.lock().iter().filter(|(e, _)| *e == event).count()
    }

    /// Events seen for one member, in order.
    pub fn events_for(&self, member: &str) -> Vec<LifecycleEvent> {
        self.events
            .lock()
            .iter()
            .filter(|(_, name)| name == member)
            .map(|(event, _)| *event)
            .collect()
    }

    fn record(&self, event: LifecycleEvent, member: &Member) -> anyhow::Result<()> {
        self.events.lock().push((event, member.name().to_string()));
        if self.fail_on == Some(event) {
            anyhow::bail!("{} rejected {} of '{}'", self.name, event, member.name());
        }
        Ok(())
    }
}

#[async_trait]
impl LifecycleInterceptor for RecordingInterceptor {
    fn name(&self) -> &str {
        &self.name
    }

    async fn on_realized(&self, member: &Member) -> anyhow::Result<()> {
        self.record(LifecycleEvent::Realized, member)
    }

    async fn on_closing(&self, member: &Member) -> anyhow::Result<()> {
        self.record(LifecycleEvent::Closing, member)
    }

    async fn on_closed(&self, member: &Member) -> anyhow::Result<()> {
        self.record(LifecycleEvent::Closed, member)
    }
}
