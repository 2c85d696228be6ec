// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain Layer
//!
//! Value objects and aggregates shared by every assembly.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Schemas, options, environment generation, member lifecycle

pub mod options;
pub mod value_generator;
pub mod schema;
pub mod lifecycle;
pub mod platform;
pub mod member;
pub mod events;
pub mod manifest;
