//! Skipper Manifest - Rendering and difference analysis
//!
//! Two pure components used by the release service:
//!
//! - [`ManifestRenderer`] merges a package's default values with caller
//!   overrides, substitutes them into the package templates, and parses the
//!   result into an ordered [`Manifest`](skipper_types::Manifest).
//! - [`analyze`] compares a deployed manifest with a candidate and derives
//!   the set of applications that need a new instance.
//!
//! ## Usage
//!
//! ```no_run
//! use skipper_manifest::{analyze, ManifestRenderer};
//! use skipper_types::{ConfigValues, Package};
//!
//! # fn example(package: &Package, current: &skipper_types::Manifest) -> skipper_manifest::Result<()> {
//! let renderer = ManifestRenderer::new();
//! let candidate = renderer.render(package, &ConfigValues::new("log:\n  level: DEBUG"))?;
//! let diff = analyze(current, &candidate);
//! println!("{diff}");
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod diff;
pub mod document;
pub mod error;
pub mod kinds;
pub mod renderer;
pub mod template;
pub mod values;

// Re-exports
pub use diff::{analyze, AppChange, AppDiff, FieldChange, ManifestDiff, PropertiesDiff, ValueChange};
pub use document::{parse_documents, to_yaml};
pub use error::{ManifestError, Result};
pub use kinds::KindRegistry;
pub use renderer::ManifestRenderer;
