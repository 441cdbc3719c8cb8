use std::path::PathBuf;

use super::spec::{ProcessConfig, ResourceHints};

/// Builder for [`ProcessConfig`] with fluent API.
#[derive(Clone, Debug)]
pub struct ProcessConfigBuilder {
    inner: ProcessConfig,
}

impl ProcessConfigBuilder {
    /// Creates a new builder for the given program.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            inner: ProcessConfig::new(program),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.inner.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inner.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.inner.env.insert(key.into(), value.into());
        self
    }

    /// Do not inherit the engine's environment.
    pub fn clear_env(mut self) -> Self {
        self.inner.clear_env = true;
        self
    }

    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.inner.cwd = Some(dir.into());
        self
    }

    pub fn resources(mut self, hints: ResourceHints) -> Self {
        self.inner.resources = Some(hints);
        self
    }

    pub fn build(self) -> ProcessConfig {
        self.inner
    }
}

impl ProcessConfig {
    /// Creates a builder for constructing a [`ProcessConfig`] with fluent API.
    pub fn builder(program: impl Into<PathBuf>) -> ProcessConfigBuilder {
        ProcessConfigBuilder::new(program)
    }
}
