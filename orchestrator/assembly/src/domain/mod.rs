// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Assembly Domain Layer
//!
//! | Module | Key Types |
//! |--------|-----------|
//! | [`assembly`] | `Assembly`, `AssemblyState`, `TeardownReport`, `TeardownError` |
//! | [`plan`] | `AssemblyPlan` |
//! | [`stability`] | `StabilityPredicate` |

pub mod assembly;
pub mod plan;
pub mod stability;

pub use assembly::{Assembly, AssemblyState, TeardownError, TeardownReport};
pub use plan::AssemblyPlan;
pub use stability::StabilityPredicate;
