// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Assembly Builder
//!
//! Collects member groups (a schema builder and a member count), assembly-wide
//! options and interceptors, then resolves them into an [`AssemblyPlan`].
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Turn declarative member groups into per-member specs
//!
//! # Member names
//!
//! Members are named `<display name>-<n>`, `n` counting from 1 for every
//! display name across all groups, so two groups sharing an executable still
//! produce distinct names.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use troupe_core::domain::lifecycle::LifecycleInterceptor;
use troupe_core::domain::manifest::AssemblyManifest;
use troupe_core::domain::options::{ConfigOption, ConfigRegistry};
use troupe_core::domain::platform::MemberSpec;
use troupe_core::domain::schema::{ConfigurationError, SchemaBuilder};

use crate::application::engine::AssemblyEngine;
use crate::domain::assembly::Assembly;
use crate::domain::plan::AssemblyPlan;
use crate::domain::stability::StabilityPredicate;
use crate::error::AssemblyError;

#[derive(Clone, Default)]
pub struct AssemblyBuilder {
    groups: Vec<(usize, SchemaBuilder)>,
    options: ConfigRegistry,
    interceptors: Vec<Arc<dyn LifecycleInterceptor>>,
}

impl AssemblyBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder pre-filled from a parsed manifest.
    pub fn from_manifest(manifest: &AssemblyManifest) -> Self {
        let mut builder = Self::new();
        builder.options = manifest.options();
        for (count, schema) in manifest.schema_builders() {
            builder.include(count, &schema);
        }
        builder
    }

    /// Adds `count` members realized from a snapshot of `schema` taken now.
    pub fn include(&mut self, count: usize, schema: &SchemaBuilder) -> &mut Self {
        self.groups.push((count, schema.clone()));
        self
    }

    pub fn option<T: ConfigOption>(&mut self, option: T) -> &mut Self {
        self.options.add(option);
        self
    }

    pub fn option_if_absent<T: ConfigOption>(&mut self, option: T) -> &mut Self {
        self.options.add_if_absent(option);
        self
    }

    pub fn stability(&mut self, predicate: StabilityPredicate) -> &mut Self {
        self.option(predicate)
    }

    /// Notified for every member, after the member schema's own interceptors.
    pub fn interceptor(&mut self, interceptor: Arc<dyn LifecycleInterceptor>) -> &mut Self {
        self.interceptors.push(interceptor);
        self
    }

    pub fn options(&self) -> &ConfigRegistry {
        &self.options
    }

    /// Total number of members across all groups.
    pub fn member_count(&self) -> usize {
        self.groups.iter().map(|(count, _)| count).sum()
    }

    /// Resolves every member's name and environment.
    ///
    /// Environment sequences advance once per member, so each call draws
    /// fresh values. Fails before anything is submitted to a platform.
    pub fn plan(&self) -> Result<AssemblyPlan, ConfigurationError> {
        let mut members = Vec::with_capacity(self.member_count());
        let mut options = ConfigRegistry::new();
        let mut next_index: HashMap<String, usize> = HashMap::new();

        for (count, builder) in &self.groups {
            if *count == 0 {
                return Err(ConfigurationError::InvalidMemberCount {
                    schema: builder.executable().to_string(),
                });
            }

            let schema = Arc::new(builder.build()?);
            options.merge(schema.options());
            let base = schema.display_name();

            for _ in 0..*count {
                let index = next_index.entry(base.clone()).or_insert(0);
                *index += 1;
                let name = format!("{}-{}", base, index);
                let environment = schema
                    .resolve_environment()
                    .map_err(|source| ConfigurationError::Environment {
                        member: name.clone(),
                        source,
                    })?;
                members.push(MemberSpec::new(members.len(), name, schema.clone(), environment));
            }
        }

        // Assembly-level values come last so they win over schema values
        options.merge(&self.options);
        debug!(members = members.len(), "Assembly plan resolved");

        Ok(self
            .interceptors
            .iter()
            .cloned()
            .fold(AssemblyPlan::new(members, options), AssemblyPlan::with_interceptor))
    }

    /// Plans and realizes the assembly on `engine`.
    pub async fn build(
        &self,
        engine: &AssemblyEngine,
        cancel: CancellationToken,
    ) -> Result<Assembly, AssemblyError> {
        let plan = self.plan()?;
        engine.realize(plan, cancel).await
    }
}

impl fmt::Debug for AssemblyBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssemblyBuilder")
            .field("groups", &self.groups)
            .field("options", &self.options)
            .field(
                "interceptors",
                &self.interceptors.iter().map(|i| i.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}
