// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Application Layer
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Assembly use cases: plan, realize, converge

pub mod builder;
pub mod engine;

pub use builder::AssemblyBuilder;
pub use engine::AssemblyEngine;
