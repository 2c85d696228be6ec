// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Application Schemas
//!
//! A [`SchemaBuilder`] accumulates everything needed to launch one kind of
//! out-of-process application: executable, working directory, environment
//! template, arguments, typed options and lifecycle interceptors.
//! [`SchemaBuilder::build`] validates the accumulated state and takes an
//! immutable [`Schema`] snapshot. Later builder mutations never leak into
//! schemas that were already built.
//!
//! Cloning a builder yields an independent copy: options and arguments are
//! deep-copied, interceptors are shared handles, and environment sequences
//! keep drawing from the same underlying sequence.
//!
//! ```
//! use troupe_core::domain::options::DisplayName;
//! use troupe_core::domain::schema::SchemaBuilder;
//! use troupe_core::domain::value_generator::ValueSource;
//!
//! let mut builder = SchemaBuilder::new("java");
//! builder
//!     .working_directory("/opt/storage")
//!     .env("ROLE", "storage")
//!     .env("PORT", ValueSource::counter(9000))
//!     .args(["-server", "-Xmx512m"])
//!     .option(DisplayName::new("storage"));
//!
//! let schema = builder.build().unwrap();
//! assert_eq!(schema.arguments(), ["-server", "-Xmx512m"]);
//! ```

use crate::domain::lifecycle::LifecycleInterceptor;
use crate::domain::options::{ConfigOption, ConfigRegistry, DisplayName};
use crate::domain::value_generator::{Environment, ValueGenerator, ValueGeneratorError, ValueSource};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("executable name must not be blank")]
    BlankExecutable,
    #[error("invalid environment variable name '{0}'")]
    InvalidEnvironmentName(String),
    #[error("argument {index} contains a NUL byte")]
    InvalidArgument { index: usize },
    #[error("member count for '{schema}' must be at least 1")]
    InvalidMemberCount { schema: String },
    #[error("failed to resolve environment for member '{member}': {source}")]
    Environment {
        member: String,
        #[source]
        source: ValueGeneratorError,
    },
}

/// Immutable description of one out-of-process application.
#[derive(Clone)]
pub struct Schema {
    executable: String,
    working_directory: Option<PathBuf>,
    environment: ValueGenerator,
    error_stream_redirected: bool,
    arguments: Vec<String>,
    options: ConfigRegistry,
    interceptors: Vec<Arc<dyn LifecycleInterceptor>>,
}

impl Schema {
    pub fn executable(&self) -> &str {
        &self.executable
    }

    pub fn working_directory(&self) -> Option<&Path> {
        self.working_directory.as_deref()
    }

    /// Unresolved environment template; see [`Schema::resolve_environment`].
    pub fn environment_template(&self) -> &ValueGenerator {
        &self.environment
    }

    pub fn is_error_stream_redirected(&self) -> bool {
        self.error_stream_redirected
    }

    pub fn arguments(&self) -> &[String] {
        &self.arguments
    }

    pub fn options(&self) -> &ConfigRegistry {
        &self.options
    }

    pub fn interceptors(&self) -> &[Arc<dyn LifecycleInterceptor>] {
        &self.interceptors
    }

    /// Base name for members realized from this schema: the [`DisplayName`]
    /// option if present, otherwise the executable's file name.
    pub fn display_name(&self) -> String {
        if let Some(DisplayName(name)) = self.options.get::<DisplayName>() {
            return name;
        }
        Path::new(&self.executable)
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.executable.clone())
    }

    /// Takes the environment for one member. Advances every sequence.
    pub fn resolve_environment(&self) -> Result<Environment, ValueGeneratorError> {
        self.environment.snapshot()
    }
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema")
            .field("executable", &self.executable)
            .field("working_directory", &self.working_directory)
            .field("environment", &self.environment)
            .field("error_stream_redirected", &self.error_stream_redirected)
            .field("arguments", &self.arguments)
            .field("options", &self.options)
            .field(
                "interceptors",
                &self.interceptors.iter().map(|i| i.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// Fluent, single-threaded accumulator for a [`Schema`].
#[derive(Clone)]
pub struct SchemaBuilder {
    executable: String,
    working_directory: Option<PathBuf>,
    environment: ValueGenerator,
    error_stream_redirected: bool,
    arguments: Vec<String>,
    options: ConfigRegistry,
    interceptors: Vec<Arc<dyn LifecycleInterceptor>>,
}

impl SchemaBuilder {
    pub fn new(executable: impl Into<String>) -> Self {
        Self {
            executable: executable.into(),
            working_directory: None,
            environment: ValueGenerator::new(),
            error_stream_redirected: false,
            arguments: Vec::new(),
            options: ConfigRegistry::new(),
            interceptors: Vec::new(),
        }
    }

    pub fn working_directory(&mut self, directory: impl Into<PathBuf>) -> &mut Self {
        self.working_directory = Some(directory.into());
        self
    }

    /// Sets one environment variable to a fixed value or a [`ValueSource`].
    pub fn env(&mut self, name: impl Into<String>, source: impl Into<ValueSource>) -> &mut Self {
        self.environment.set(name, source);
        self
    }

    /// Adds or overrides variables with those of `environment`.
    pub fn environment(&mut self, environment: &ValueGenerator) -> &mut Self {
        self.environment.merge(environment);
        self
    }

    pub fn redirect_error_stream(&mut self, redirect: bool) -> &mut Self {
        self.error_stream_redirected = redirect;
        self
    }

    pub fn arg(&mut self, argument: impl Into<String>) -> &mut Self {
        self.arguments.push(argument.into());
        self
    }

    pub fn args<I, S>(&mut self, arguments: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.arguments.extend(arguments.into_iter().map(Into::into));
        self
    }

    /// Replaces the whole argument list.
    pub fn set_args<I, S>(&mut self, arguments: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.arguments.clear();
        self.args(arguments)
    }

    pub fn option<T: ConfigOption>(&mut self, option: T) -> &mut Self {
        self.options.add(option);
        self
    }

    pub fn option_if_absent<T: ConfigOption>(&mut self, option: T) -> &mut Self {
        self.options.add_if_absent(option);
        self
    }

    pub fn remove_option<T: ConfigOption>(&mut self, option: &T) -> &mut Self {
        self.options.remove(option);
        self
    }

    /// Replaces every option with those of `options`.
    pub fn set_options(&mut self, options: ConfigRegistry) -> &mut Self {
        self.options = options;
        self
    }

    pub fn interceptor(&mut self, interceptor: Arc<dyn LifecycleInterceptor>) -> &mut Self {
        self.interceptors.push(interceptor);
        self
    }

    pub fn executable(&self) -> &str {
        &self.executable
    }

    pub fn arguments(&self) -> &[String] {
        &self.arguments
    }

    pub fn options(&self) -> &ConfigRegistry {
        &self.options
    }

    pub fn build(&self) -> Result<Schema, ConfigurationError> {
        if self.executable.trim().is_empty() {
            return Err(ConfigurationError::BlankExecutable);
        }
        if let Some(name) = self
            .environment
            .names()
            .find(|name| name.is_empty() || name.contains('=') || name.contains('\0'))
        {
            return Err(ConfigurationError::InvalidEnvironmentName(name.to_string()));
        }
        if let Some(index) = self.arguments.iter().position(|arg| arg.contains('\0')) {
            return Err(ConfigurationError::InvalidArgument { index });
        }

        Ok(Schema {
            executable: self.executable.clone(),
            working_directory: self.working_directory.clone(),
            environment: self.environment.clone(),
            error_stream_redirected: self.error_stream_redirected,
            arguments: self.arguments.clone(),
            options: self.options.clone(),
            interceptors: self.interceptors.clone(),
        })
    }
}

impl fmt::Debug for SchemaBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaBuilder")
            .field("executable", &self.executable)
            .field("arguments", &self.arguments)
            .field("options", &self.options)
            .field("interceptors", &self.interceptors.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::options::Timeout;
    use std::time::Duration;

    #[test]
    fn test_copy_is_independent_of_original() {
        let mut original = SchemaBuilder::new("java");
        original.arg("-server");

        let mut copy = original.clone();
        copy.arg("-Xmx1g").option(Timeout(Duration::from_secs(5)));

        assert_eq!(original.arguments(), ["-server"]);
        assert_eq!(copy.arguments(), ["-server", "-Xmx1g"]);
        assert!(!original.options().contains::<Timeout>());
    }

    #[test]
    fn test_build_is_a_snapshot() {
        let mut builder = SchemaBuilder::new("java");
        builder.arg("first").env("ROLE", "a");
        let schema = builder.build().unwrap();

        builder.arg("second").env("ROLE", "b").redirect_error_stream(true);

        assert_eq!(schema.arguments(), ["first"]);
        assert_eq!(schema.resolve_environment().unwrap().get("ROLE"), Some("a"));
        assert!(!schema.is_error_stream_redirected());
    }

    #[test]
    fn test_set_args_replaces() {
        let mut builder = SchemaBuilder::new("java");
        builder.args(["a", "b"]).set_args(["c"]);
        assert_eq!(builder.arguments(), ["c"]);
    }

    #[test]
    fn test_blank_executable_is_rejected() {
        assert_eq!(
            SchemaBuilder::new("  ").build().unwrap_err(),
            ConfigurationError::BlankExecutable
        );
    }

    #[test]
    fn test_invalid_environment_name_is_rejected() {
        let mut builder = SchemaBuilder::new("java");
        builder.env("A=B", "x");
        assert_eq!(
            builder.build().unwrap_err(),
            ConfigurationError::InvalidEnvironmentName("A=B".to_string())
        );
    }

    #[test]
    fn test_nul_argument_is_rejected() {
        let mut builder = SchemaBuilder::new("java");
        builder.arg("ok").arg("bad\0arg");
        assert_eq!(
            builder.build().unwrap_err(),
            ConfigurationError::InvalidArgument { index: 1 }
        );
    }

    #[test]
    fn test_display_name_defaults_to_executable_file_name() {
        let schema = SchemaBuilder::new("/usr/bin/redis-server").build().unwrap();
        assert_eq!(schema.display_name(), "redis-server");

        let mut named = SchemaBuilder::new("/usr/bin/redis-server");
        named.option(DisplayName::new("cache"));
        assert_eq!(named.build().unwrap().display_name(), "cache");
    }

    #[test]
    fn test_remove_and_replace_options() {
        let mut builder = SchemaBuilder::new("java");
        builder
            .option(Timeout(Duration::from_secs(1)))
            .option_if_absent(Timeout(Duration::from_secs(1)))
            .remove_option(&Timeout(Duration::from_secs(1)));
        assert!(!builder.options().contains::<Timeout>());

        let mut replacement = ConfigRegistry::new();
        replacement.add(DisplayName::new("x"));
        builder.set_options(replacement);
        assert_eq!(builder.options().get::<DisplayName>(), Some(DisplayName::new("x")));
    }
}
