// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # `troupe-core`: Schemas, Options and Member Lifecycle
//!
//! Building blocks for describing out-of-process applications and tracking
//! the members realized from them. The assembly engine lives in
//! `troupe-assembly`; this crate has no opinion on how many members run
//! together or when they are ready.
//!
//! ## Crate Layout
//!
//! | Module | Layer | Contents |
//! |--------|-------|----------|
//! | [`domain`] | Domain | `ConfigRegistry`, `ValueGenerator`, `SchemaBuilder`, `Member`, `Platform` contract, lifecycle events, manifest types |
//! | [`infrastructure`] | Infrastructure | `EventBus`, `AssemblyManifestParser` |

pub mod domain;
pub mod infrastructure;

pub use domain::*;
