//! # Optional dependency gate
//!
//! Some capabilities of `iactpipe` are backed by crates that are only compiled in when the
//! corresponding cargo feature is enabled. This module decides, **at the call site**, whether such
//! a capability can run, and produces a distinguished [`OptionalDependencyError`] otherwise.
//!
//! ## Overview
//! -----------------
//! | Capability                   | Cargo feature | Backing crate(s)           |
//! |------------------------------|---------------|----------------------------|
//! | Parquet event-source backend | `parquet`     | `parquet`, `arrow-array`   |
//! | Table rendering              | `display`     | `comfy-table`              |
//! | Progress reporting           | `progress`    | `indicatif`                |
//!
//! The `all` feature enables every group at once. A minimal build compiles none of them; nothing
//! fails at start-up, the error only surfaces when a gated function is actually called.
//!
//! ## Example
//! -----------------
//! ```rust
//! use iactpipe::optional_deps::{require, OptionalDependency};
//!
//! match require(OptionalDependency::Visualization, "render a star table") {
//!     Ok(()) => println!("comfy-table is compiled in"),
//!     Err(e) => println!("{e}"),
//! }
//! ```
use std::fmt;

use thiserror::Error;

/// Optional component groups that can be enabled through cargo features.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OptionalDependency {
    /// Columnar event-source backend.
    Parquet,
    /// Tabular rendering of catalogs and distributions.
    Visualization,
    /// Progress bar while processing events.
    Progress,
}

impl OptionalDependency {
    /// Every optional group, in declaration order.
    pub const ALL: [OptionalDependency; 3] = [
        OptionalDependency::Parquet,
        OptionalDependency::Visualization,
        OptionalDependency::Progress,
    ];

    /// Name of the cargo feature that enables this group.
    pub fn feature(&self) -> &'static str {
        match self {
            OptionalDependency::Parquet => "parquet",
            OptionalDependency::Visualization => "display",
            OptionalDependency::Progress => "progress",
        }
    }

    /// Name of the crate providing the capability.
    pub fn crate_name(&self) -> &'static str {
        match self {
            OptionalDependency::Parquet => "parquet",
            OptionalDependency::Visualization => "comfy-table",
            OptionalDependency::Progress => "indicatif",
        }
    }

    /// Whether the group was compiled into this build.
    pub fn is_available(&self) -> bool {
        match self {
            OptionalDependency::Parquet => cfg!(feature = "parquet"),
            OptionalDependency::Visualization => cfg!(feature = "display"),
            OptionalDependency::Progress => cfg!(feature = "progress"),
        }
    }
}

impl fmt::Display for OptionalDependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            OptionalDependency::Parquet => "parquet event source",
            OptionalDependency::Visualization => "visualization",
            OptionalDependency::Progress => "progress reporting",
        };
        write!(f, "{label}")
    }
}

/// Raised when a capability is invoked while its optional component is not compiled in.
///
/// The message names the missing crate and the cargo feature that resolves the problem.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error(
    "cannot {context}: {dependency} requires the optional crate `{crate_name}`; \
     rebuild with `--features {feature}` (or `--features all`)",
    crate_name = .dependency.crate_name(),
    feature = .dependency.feature()
)]
pub struct OptionalDependencyError {
    pub dependency: OptionalDependency,
    pub context: String,
}

impl OptionalDependencyError {
    pub fn new(dependency: OptionalDependency, context: impl Into<String>) -> Self {
        Self {
            dependency,
            context: context.into(),
        }
    }
}

/// Check that `dependency` is compiled in before running the capability described by `context`.
///
/// Arguments
/// -----------------
/// * `dependency` – The optional group the caller needs.
/// * `context` – Short description of the requested action, used in the error message.
///
/// Return
/// ----------
/// * `Ok(())` when the feature is enabled, otherwise an [`OptionalDependencyError`].
pub fn require(
    dependency: OptionalDependency,
    context: &str,
) -> Result<(), OptionalDependencyError> {
    if dependency.is_available() {
        Ok(())
    } else {
        log::debug!("optional dependency {dependency} unavailable for '{context}'");
        Err(OptionalDependencyError::new(dependency, context))
    }
}

/// List the optional groups compiled into this build.
pub fn available_features() -> Vec<OptionalDependency> {
    OptionalDependency::ALL
        .into_iter()
        .filter(OptionalDependency::is_available)
        .collect()
}
