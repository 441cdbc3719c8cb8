//! # Process launch descriptions.
//!
//! - [`ProcessConfig`] what to launch (program, args, env, cwd, resource hints)
//! - [`ProcessConfigBuilder`] fluent construction
//! - [`ResourceHints`] advisory limits a backend may honor or report

mod spec;
mod spec_builder;

pub use spec::{ProcessConfig, ResourceHints};
pub use spec_builder::ProcessConfigBuilder;
