// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # `troupe-assembly`: Assembly Realization and Convergence
//!
//! Realizes a group of out-of-process members concurrently and waits until
//! they form a usable whole (an **Assembly**), or rolls everything back.
//!
//! ## Crate Layout
//!
//! | Module | Layer | Contents |
//! |--------|-------|----------|
//! | [`domain`] | Domain | `Assembly`, `AssemblyPlan`, `StabilityPredicate`, `TeardownReport` |
//! | [`application`] | Application | `AssemblyEngine`, `AssemblyBuilder` |
//! | [`error`] | Domain | `AssemblyError` |
//! | `testkit` | Test support | `ScriptedPlatform`, `RecordingInterceptor` (feature `testkit`) |
//!
//! ## Key Concepts
//!
//! - **Realization**: every member is submitted to the platform at once (or
//!   `Parallelism` at a time). One failure rolls back the whole assembly once
//!   the others have settled.
//! - **Convergence**: the stability predicate is polled over the complete
//!   member set until it holds or the timeout expires.
//! - **Rollback**: every error after submission closes every member that was
//!   realized; callers never see a partial assembly.

pub mod domain;
pub mod application;
pub mod error;

#[cfg(any(test, feature = "testkit"))]
pub mod testkit;

pub use application::{AssemblyBuilder, AssemblyEngine};
pub use domain::*;
pub use error::AssemblyError;
