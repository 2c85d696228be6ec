// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;
use parking_lot::Mutex;
use std::any::Any;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use troupe_core::domain::events::{AssemblyId, MemberLifecycleEvent};
use troupe_core::domain::lifecycle::{LifecycleEvent, LifecycleInterceptor, LifecycleNotifier};
use troupe_core::domain::member::Member;
use troupe_core::domain::platform::{ApplicationProcess, MemberSpec, Platform, PlatformError};
use troupe_core::domain::schema::SchemaBuilder;
use troupe_core::domain::value_generator::ValueSource;
use troupe_core::infrastructure::event_bus::{DomainEvent, EventBus, EventBusInterceptor};

#[derive(Debug)]
struct NoopProcess;

#[async_trait]
impl ApplicationProcess for NoopProcess {
    async fn terminate(&self) -> Result<(), PlatformError> {
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

struct NoopPlatform;

#[async_trait]
impl Platform for NoopPlatform {
    fn name(&self) -> &str {
        "noop"
    }

    async fn realize(&self, _spec: &MemberSpec) -> Result<Box<dyn ApplicationProcess>, PlatformError> {
        Ok(Box::new(NoopProcess))
    }
}

/// Appends `label:event` to a shared journal, failing on one chosen event.
struct Journal {
    label: &'static str,
    entries: Arc<Mutex<Vec<String>>>,
    fail_on: Option<LifecycleEvent>,
}

impl Journal {
    fn record(&self, event: LifecycleEvent) -> anyhow::Result<()> {
        self.entries.lock().push(format!("{}:{}", self.label, event));
        if self.fail_on == Some(event) {
            anyhow::bail!("{} refused {}", self.label, event);
        }
        Ok(())
    }
}

#[async_trait]
impl LifecycleInterceptor for Journal {
    fn name(&self) -> &str {
        self.label
    }

    async fn on_realized(&self, _member: &Member) -> anyhow::Result<()> {
        self.record(LifecycleEvent::Realized)
    }

    async fn on_closing(&self, _member: &Member) -> anyhow::Result<()> {
        self.record(LifecycleEvent::Closing)
    }

    async fn on_closed(&self, _member: &Member) -> anyhow::Result<()> {
        self.record(LifecycleEvent::Closed)
    }
}

fn member_spec(name: &str) -> MemberSpec {
    let mut builder = SchemaBuilder::new("/usr/bin/server");
    builder.env("PORT", ValueSource::counter(7000));
    let schema = Arc::new(builder.build().unwrap());
    let environment = schema.resolve_environment().unwrap();
    MemberSpec::new(0, name, schema, environment)
}

#[tokio::test]
async fn test_interceptors_run_in_registration_order_despite_failures() {
    let entries = Arc::new(Mutex::new(Vec::new()));
    let mut notifier = LifecycleNotifier::new();
    notifier
        .register(Arc::new(Journal {
            label: "first",
            entries: entries.clone(),
            fail_on: Some(LifecycleEvent::Closing),
        }))
        .register(Arc::new(Journal {
            label: "second",
            entries: entries.clone(),
            fail_on: None,
        }));

    let realized = Member::launch(&NoopPlatform, member_spec("server-1"), notifier)
        .await
        .unwrap();
    let failures = realized.member.close().await.unwrap();

    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].interceptor, "first");
    assert_eq!(failures[0].member, "server-1");
    assert!(failures[0].message.contains("refused closing"));

    assert_eq!(
        *entries.lock(),
        vec![
            "first:realized",
            "second:realized",
            "first:closing",
            "second:closing",
            "first:closed",
            "second:closed",
        ]
    );
}

#[tokio::test]
async fn test_event_bus_interceptor_publishes_member_lifecycle() {
    let bus = EventBus::new(16);
    let assembly_id = AssemblyId::new();
    let mut receiver = bus.subscribe();
    let notifier: LifecycleNotifier = [Arc::new(EventBusInterceptor::new(bus.clone(), assembly_id)) as Arc<dyn LifecycleInterceptor>]
        .into_iter()
        .collect();

    let member = Member::launch(&NoopPlatform, member_spec("server-1"), notifier)
        .await
        .unwrap()
        .member;
    assert_eq!(member.environment().get("PORT"), Some("7000"));
    member.close().await.unwrap();

    let mut kinds = Vec::new();
    for _ in 0..3 {
        let event = timeout(Duration::from_secs(1), receiver.recv())
            .await
            .expect("Timed out waiting for member event")
            .unwrap();
        match event {
            DomainEvent::Member(event) => {
                assert_eq!(event.member(), "server-1");
                assert_eq!(event.assembly_id(), assembly_id);
                kinds.push(match event {
                    MemberLifecycleEvent::MemberRealized { .. } => "realized",
                    MemberLifecycleEvent::MemberClosing { .. } => "closing",
                    MemberLifecycleEvent::MemberClosed { .. } => "closed",
                });
            }
            other => panic!("Unexpected event: {:?}", other),
        }
    }

    assert_eq!(kinds, ["realized", "closing", "closed"]);
}

#[tokio::test]
async fn test_member_events_serialize_for_external_consumers() {
    let bus = EventBus::new(4);
    let assembly_id = AssemblyId::new();
    let mut receiver = bus.subscribe();
    let notifier: LifecycleNotifier = [Arc::new(EventBusInterceptor::new(bus.clone(), assembly_id)) as Arc<dyn LifecycleInterceptor>]
        .into_iter()
        .collect();

    let _member = Member::launch(&NoopPlatform, member_spec("server-7"), notifier)
        .await
        .unwrap();

    let event = receiver.recv().await.unwrap();
    let json = serde_json::to_value(&event).unwrap();
    assert_eq!(json["type"], "member");
    assert_eq!(json["MemberRealized"]["member"], "server-7");
    assert_eq!(json["MemberRealized"]["assembly_id"], assembly_id.to_string());
}
