// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Members
//!
//! A [`Member`] wraps the process handle returned by a [`Platform`] together
//! with the spec it was realized from and its lifecycle state. The member, not
//! the platform, owns interceptor notification, which keeps the ordering
//! guarantees in one place:
//!
//! - `on_realized` fires inside [`Member::launch`], before the member is
//!   returned to anyone.
//! - [`Member::close`] moves `Realized → Closing → Closed`, firing
//!   `on_closing` before termination and `on_closed` after it. Only the first
//!   call does any work; later or concurrent calls are no-ops.

use crate::domain::lifecycle::{InterceptorFailure, LifecycleEvent, LifecycleNotifier};
use crate::domain::platform::{
    ApplicationProcess, MemberSpec, MemberState, Platform, PlatformError, RealizationError,
};
use crate::domain::schema::Schema;
use crate::domain::value_generator::Environment;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MemberId(pub Uuid);

impl MemberId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MemberId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A member failed to terminate. The member is still considered closed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("member '{member}' failed to close: {source}")]
pub struct CloseError {
    pub member: String,
    #[source]
    pub source: PlatformError,
    /// Interceptor failures observed while closing this member.
    pub interceptor_failures: Vec<InterceptorFailure>,
}

/// Point-in-time view of a member, for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberSnapshot {
    pub id: MemberId,
    pub name: String,
    pub ordinal: usize,
    pub state: MemberState,
    pub pid: Option<u32>,
}

/// Outcome of a successful [`Member::launch`].
#[derive(Debug)]
pub struct Realized {
    pub member: Arc<Member>,
    pub interceptor_failures: Vec<InterceptorFailure>,
}

pub struct Member {
    id: MemberId,
    spec: MemberSpec,
    process: Box<dyn ApplicationProcess>,
    notifier: LifecycleNotifier,
    state: Mutex<MemberState>,
    close_started: AtomicBool,
    realized_at: DateTime<Utc>,
}

impl Member {
    /// Asks `platform` to realize `spec`, then notifies `on_realized`.
    pub async fn launch(
        platform: &dyn Platform,
        spec: MemberSpec,
        notifier: LifecycleNotifier,
    ) -> Result<Realized, RealizationError> {
        debug!(
            member = spec.name(),
            ordinal = spec.ordinal(),
            platform = platform.name(),
            "Realizing member"
        );

        let process = platform.realize(&spec).await.map_err(|e| RealizationError {
            member: spec.name().to_string(),
            ordinal: spec.ordinal(),
            reason: e.to_string(),
        })?;

        let member = Arc::new(Member {
            id: MemberId::new(),
            spec,
            process,
            notifier,
            state: Mutex::new(MemberState::Realized),
            close_started: AtomicBool::new(false),
            realized_at: Utc::now(),
        });

        let interceptor_failures = member.notifier.notify(LifecycleEvent::Realized, &member).await;
        info!(member = member.name(), id = %member.id, pid = ?member.pid(), "Member realized");

        Ok(Realized {
            member,
            interceptor_failures,
        })
    }

    pub fn id(&self) -> MemberId {
        self.id
    }

    pub fn name(&self) -> &str {
        self.spec.name()
    }

    pub fn ordinal(&self) -> usize {
        self.spec.ordinal()
    }

    pub fn spec(&self) -> &MemberSpec {
        &self.spec
    }

    pub fn schema(&self) -> &Schema {
        self.spec.schema()
    }

    pub fn environment(&self) -> &Environment {
        self.spec.environment()
    }

    pub fn process(&self) -> &dyn ApplicationProcess {
        self.process.as_ref()
    }

    pub fn pid(&self) -> Option<u32> {
        self.process.pid()
    }

    pub fn state(&self) -> MemberState {
        *self.state.lock()
    }

    pub fn realized_at(&self) -> DateTime<Utc> {
        self.realized_at
    }

    pub fn is_closed(&self) -> bool {
        self.state() == MemberState::Closed
    }

    pub fn snapshot(&self) -> MemberSnapshot {
        MemberSnapshot {
            id: self.id,
            name: self.name().to_string(),
            ordinal: self.ordinal(),
            state: self.state(),
            pid: self.pid(),
        }
    }

    /// Terminates the member, notifying interceptors around termination.
    ///
    /// Returns the interceptor failures on success. A failed termination
    /// still leaves the member `Closed` and still fires `on_closed`.
    pub async fn close(&self) -> Result<Vec<InterceptorFailure>, CloseError> {
        if self.close_started.swap(true, Ordering::AcqRel) {
            debug!(member = self.name(), "Member already closing; ignoring close");
            return Ok(Vec::new());
        }

        self.set_state(MemberState::Closing);
        let mut interceptor_failures = self.notifier.notify(LifecycleEvent::Closing, self).await;

        let terminated = self.process.terminate().await;

        self.set_state(MemberState::Closed);
        interceptor_failures.extend(self.notifier.notify(LifecycleEvent::Closed, self).await);

        match terminated {
            Ok(()) => {
                info!(member = self.name(), id = %self.id, "Member closed");
                Ok(interceptor_failures)
            }
            Err(source) => {
                warn!(member = self.name(), id = %self.id, "Member failed to close cleanly: {}", source);
                Err(CloseError {
                    member: self.name().to_string(),
                    source,
                    interceptor_failures,
                })
            }
        }
    }

    fn set_state(&self, state: MemberState) {
        *self.state.lock() = state;
    }
}

impl fmt::Debug for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Member")
            .field("id", &self.id)
            .field("name", &self.name())
            .field("state", &self.state())
            .field("process", &self.process)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::lifecycle::LifecycleInterceptor;
    use crate::domain::schema::SchemaBuilder;
    use async_trait::async_trait;
    use std::any::Any;
    use std::sync::atomic::AtomicUsize;

    #[derive(Debug, Default)]
    struct FakeProcess {
        terminations: AtomicUsize,
        fail_termination: bool,
    }

    #[async_trait]
    impl ApplicationProcess for FakeProcess {
        fn pid(&self) -> Option<u32> {
            Some(42)
        }

        async fn terminate(&self) -> Result<(), PlatformError> {
            self.terminations.fetch_add(1, Ordering::SeqCst);
            if self.fail_termination {
                Err(PlatformError::TerminationFailed("stuck".to_string()))
            } else {
                Ok(())
            }
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    struct FakePlatform {
        fail: bool,
        fail_termination: bool,
    }

    #[async_trait]
    impl Platform for FakePlatform {
        fn name(&self) -> &str {
            "fake"
        }

        async fn realize(&self, _spec: &MemberSpec) -> Result<Box<dyn ApplicationProcess>, PlatformError> {
            if self.fail {
                return Err(PlatformError::SpawnFailed("no such executable".to_string()));
            }
            Ok(Box::new(FakeProcess {
                fail_termination: self.fail_termination,
                ..Default::default()
            }))
        }
    }

    #[derive(Default)]
    struct StateRecorder {
        seen: Mutex<Vec<(LifecycleEvent, MemberState)>>,
    }

    #[async_trait]
    impl LifecycleInterceptor for StateRecorder {
        async fn on_realized(&self, member: &Member) -> anyhow::Result<()> {
            self.seen.lock().push((LifecycleEvent::Realized, member.state()));
            Ok(())
        }

        async fn on_closing(&self, member: &Member) -> anyhow::Result<()> {
            self.seen.lock().push((LifecycleEvent::Closing, member.state()));
            anyhow::bail!("closing hook failure")
        }

        async fn on_closed(&self, member: &Member) -> anyhow::Result<()> {
            self.seen.lock().push((LifecycleEvent::Closed, member.state()));
            Ok(())
        }
    }

    fn spec(name: &str) -> MemberSpec {
        let schema = Arc::new(SchemaBuilder::new("server").build().unwrap());
        MemberSpec::new(0, name, schema, Environment::default())
    }

    fn fake(member: &Member) -> &FakeProcess {
        member.process().as_any().downcast_ref::<FakeProcess>().unwrap()
    }

    #[tokio::test]
    async fn test_launch_and_close_walk_the_lifecycle() {
        let recorder = Arc::new(StateRecorder::default());
        let notifier: LifecycleNotifier = [recorder.clone() as Arc<dyn LifecycleInterceptor>].into_iter().collect();
        let platform = FakePlatform { fail: false, fail_termination: false };

        let realized = Member::launch(&platform, spec("server-1"), notifier).await.unwrap();
        assert!(realized.interceptor_failures.is_empty());
        let member = realized.member;
        assert_eq!(member.state(), MemberState::Realized);
        assert_eq!(member.snapshot().pid, Some(42));

        let failures = member.close().await.unwrap();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].event, LifecycleEvent::Closing);
        assert_eq!(member.state(), MemberState::Closed);

        assert_eq!(
            *recorder.seen.lock(),
            vec![
                (LifecycleEvent::Realized, MemberState::Realized),
                (LifecycleEvent::Closing, MemberState::Closing),
                (LifecycleEvent::Closed, MemberState::Closed),
            ]
        );
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let platform = FakePlatform { fail: false, fail_termination: false };
        let member = Member::launch(&platform, spec("server-1"), LifecycleNotifier::new())
            .await
            .unwrap()
            .member;

        member.close().await.unwrap();
        member.close().await.unwrap();

        assert_eq!(fake(&member).terminations.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_termination_still_closes() {
        let recorder = Arc::new(StateRecorder::default());
        let notifier: LifecycleNotifier = [recorder.clone() as Arc<dyn LifecycleInterceptor>].into_iter().collect();
        let platform = FakePlatform { fail: false, fail_termination: true };
        let member = Member::launch(&platform, spec("server-1"), notifier).await.unwrap().member;

        let err = member.close().await.unwrap_err();
        assert_eq!(err.member, "server-1");
        assert_eq!(err.source, PlatformError::TerminationFailed("stuck".to_string()));
        assert_eq!(err.interceptor_failures.len(), 1);
        assert!(member.is_closed());
        assert!(recorder
            .seen
            .lock()
            .iter()
            .any(|(event, _)| *event == LifecycleEvent::Closed));
    }

    #[tokio::test]
    async fn test_platform_failure_becomes_realization_error() {
        let platform = FakePlatform { fail: true, fail_termination: false };
        let err = Member::launch(&platform, spec("server-2"), LifecycleNotifier::new())
            .await
            .unwrap_err();

        assert_eq!(err.member, "server-2");
        assert_eq!(err.ordinal, 0);
        assert!(err.reason.contains("no such executable"));
    }
}
