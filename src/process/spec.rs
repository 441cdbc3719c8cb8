//! # Launch description for one supervised process.
//!
//! A [`ProcessConfig`] is immutable once an [`Instance`](crate::Instance) is
//! created from it. The same value is handed to the backend on every restart.
//!
//! ## Example
//! ```rust
//! use procvisor::ProcessConfig;
//!
//! let cfg = ProcessConfig::builder("sleep")
//!     .arg("100")
//!     .env("RUST_LOG", "info")
//!     .cwd("/tmp")
//!     .build();
//!
//! assert_eq!(cfg.program(), std::path::Path::new("sleep"));
//! assert_eq!(cfg.args(), ["100"]);
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;

/// Advisory resource hints.
///
/// The engine does not enforce them (no cgroups); backends may use them for
/// placement or just report them.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ResourceHints {
    /// Expected CPU share, in cores.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpus: Option<f64>,
    /// Expected memory ceiling, in bytes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_bytes: Option<u64>,
}

/// What to launch for an instance.
#[derive(Clone, Debug, PartialEq)]
pub struct ProcessConfig {
    pub(super) program: PathBuf,
    pub(super) args: Vec<String>,
    pub(super) env: BTreeMap<String, String>,
    pub(super) clear_env: bool,
    pub(super) cwd: Option<PathBuf>,
    pub(super) resources: Option<ResourceHints>,
}

impl ProcessConfig {
    /// Creates a config that runs `program` with no arguments in the engine's
    /// own working directory and environment.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
            clear_env: false,
            cwd: None,
            resources: None,
        }
    }

    /// Command path (resolved through `PATH` by the native backend when relative).
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Argument list, not including the program itself.
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Extra environment variables.
    pub fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    /// If true the child does not inherit the engine's environment.
    pub fn clear_env(&self) -> bool {
        self.clear_env
    }

    /// Working directory, if set.
    pub fn cwd(&self) -> Option<&Path> {
        self.cwd.as_deref()
    }

    /// Resource hints, if any.
    pub fn resources(&self) -> Option<&ResourceHints> {
        self.resources.as_ref()
    }

    /// Program and arguments joined for display.
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.display().to_string())
            .chain(self.args.iter().cloned())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_line_joins_program_and_args() {
        let cfg = ProcessConfig::builder("/bin/echo").args(["a", "b c"]).build();
        assert_eq!(cfg.command_line(), "/bin/echo a b c");
    }

    #[test]
    fn defaults_inherit_everything() {
        let cfg = ProcessConfig::new("true");
        assert!(cfg.args().is_empty());
        assert!(cfg.env().is_empty());
        assert!(!cfg.clear_env());
        assert!(cfg.cwd().is_none());
        assert!(cfg.resources().is_none());
    }
}
