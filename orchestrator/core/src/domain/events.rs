// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use crate::domain::member::MemberId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssemblyId(pub Uuid);

impl AssemblyId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for AssemblyId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AssemblyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Member events carry the id of the assembly the member was realized for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum MemberLifecycleEvent {
    MemberRealized {
        assembly_id: AssemblyId,
        member_id: MemberId,
        member: String,
        ordinal: usize,
        pid: Option<u32>,
        realized_at: DateTime<Utc>,
    },
    MemberClosing {
        assembly_id: AssemblyId,
        member_id: MemberId,
        member: String,
        closing_at: DateTime<Utc>,
    },
    MemberClosed {
        assembly_id: AssemblyId,
        member_id: MemberId,
        member: String,
        closed_at: DateTime<Utc>,
    },
}

impl MemberLifecycleEvent {
    pub fn member(&self) -> &str {
        match self {
            Self::MemberRealized { member, .. }
            | Self::MemberClosing { member, .. }
            | Self::MemberClosed { member, .. } => member,
        }
    }

    pub fn assembly_id(&self) -> AssemblyId {
        match self {
            Self::MemberRealized { assembly_id, .. }
            | Self::MemberClosing { assembly_id, .. }
            | Self::MemberClosed { assembly_id, .. } => *assembly_id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AssemblyLifecycleEvent {
    AssemblyBuilding {
        assembly_id: AssemblyId,
        members: usize,
        started_at: DateTime<Utc>,
    },
    AssemblyStable {
        assembly_id: AssemblyId,
        members: usize,
        evaluations: usize,
        elapsed_ms: u64,
        stable_at: DateTime<Utc>,
    },
    AssemblyDegraded {
        assembly_id: AssemblyId,
        reason: String,
        degraded_at: DateTime<Utc>,
    },
    AssemblyFailed {
        assembly_id: AssemblyId,
        reason: String,
        failed_at: DateTime<Utc>,
    },
    AssemblyClosed {
        assembly_id: AssemblyId,
        closed_at: DateTime<Utc>,
    },
}

impl AssemblyLifecycleEvent {
    pub fn assembly_id(&self) -> AssemblyId {
        match self {
            Self::AssemblyBuilding { assembly_id, .. }
            | Self::AssemblyStable { assembly_id, .. }
            | Self::AssemblyDegraded { assembly_id, .. }
            | Self::AssemblyFailed { assembly_id, .. }
            | Self::AssemblyClosed { assembly_id, .. } => *assembly_id,
        }
    }
}
