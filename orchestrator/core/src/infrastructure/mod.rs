// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod event_bus;
pub mod assembly_manifest_parser;

pub use assembly_manifest_parser::AssemblyManifestParser;
pub use event_bus::{EventBus, EventBusError, EventBusInterceptor};
