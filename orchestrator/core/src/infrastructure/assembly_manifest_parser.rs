// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Assembly Manifest YAML Parser
//!
//! Parses assembly YAML manifests into [`AssemblyManifest`] domain objects.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Parse external YAML → Domain objects
//!
//! # Manifest Format
//!
//! ```yaml
//! apiVersion: troupe/v1
//! kind: Assembly
//! metadata:
//!   name: storage-cluster
//! spec:
//!   timeout: 30s
//!   pollInterval: 100ms
//!   members:
//!     - displayName: storage
//!       count: 3
//!       executable: java
//!       environment:
//!         ROLE: storage
//!         PORT: { counter: 9000 }
//! ```

use crate::domain::manifest::AssemblyManifest;
use anyhow::{anyhow, Context, Result};
use std::path::Path;

pub struct AssemblyManifestParser;

impl AssemblyManifestParser {
    /// Parse assembly manifest from YAML string
    pub fn parse_yaml(yaml: &str) -> Result<AssemblyManifest> {
        let manifest: AssemblyManifest = serde_yaml::from_str(yaml)
            .context("Failed to parse YAML manifest")?;

        manifest.validate()
            .map_err(|e| anyhow!("Manifest validation failed: {}", e))?;

        Ok(manifest)
    }

    /// Parse assembly manifest from YAML file
    pub fn parse_file<P: AsRef<Path>>(path: P) -> Result<AssemblyManifest> {
        let yaml = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read manifest file: {:?}", path.as_ref()))?;

        Self::parse_yaml(&yaml)
    }

    /// Serialize assembly manifest to YAML string
    pub fn to_yaml(manifest: &AssemblyManifest) -> Result<String> {
        serde_yaml::to_string(manifest)
            .context("Failed to serialize manifest to YAML")
    }
}
