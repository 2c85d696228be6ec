// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use std::fmt;
use std::sync::Arc;
use troupe_core::domain::lifecycle::LifecycleInterceptor;
use troupe_core::domain::options::ConfigRegistry;
use troupe_core::domain::platform::MemberSpec;

/// Fully resolved input of one realization: member specs with their
/// environments already drawn, assembly-level options and interceptors.
///
/// Usually produced by
/// [`AssemblyBuilder::plan`](crate::application::builder::AssemblyBuilder::plan).
#[derive(Clone, Default)]
pub struct AssemblyPlan {
    members: Vec<MemberSpec>,
    options: ConfigRegistry,
    interceptors: Vec<Arc<dyn LifecycleInterceptor>>,
}

impl AssemblyPlan {
    pub fn new(members: Vec<MemberSpec>, options: ConfigRegistry) -> Self {
        Self {
            members,
            options,
            interceptors: Vec::new(),
        }
    }

    /// Adds an interceptor notified for every member, after the member
    /// schema's own interceptors.
    pub fn with_interceptor(mut self, interceptor: Arc<dyn LifecycleInterceptor>) -> Self {
        self.interceptors.push(interceptor);
        self
    }

    pub fn members(&self) -> &[MemberSpec] {
        &self.members
    }

    pub fn options(&self) -> &ConfigRegistry {
        &self.options
    }

    pub fn interceptors(&self) -> &[Arc<dyn LifecycleInterceptor>] {
        &self.interceptors
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub(crate) fn into_parts(
        self,
    ) -> (Vec<MemberSpec>, ConfigRegistry, Vec<Arc<dyn LifecycleInterceptor>>) {
        (self.members, self.options, self.interceptors)
    }
}

impl fmt::Debug for AssemblyPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssemblyPlan")
            .field(
                "members",
                &self.members.iter().map(MemberSpec::name).collect::<Vec<_>>(),
            )
            .field("options", &self.options)
            .field(
                "interceptors",
                &self.interceptors.iter().map(|i| i.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}
