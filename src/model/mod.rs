//! Core data types for packages, findings, and scan results.
//!
//! This module contains the fundamental types used throughout regwatch:
//!
//! - [`PackageId`] - The canonical `name@version` identity
//! - [`PackageInfo`] - Resolved registry metadata for a version
//! - [`Findings`] - The four detector-output collections
//! - [`ScanReport`] - Complete result of scanning one version
//!
//! # Example
//!
//! ```
//! use regwatch::model::PackageId;
//!
//! let id = PackageId::new("@types/node", "20.1.0");
//! assert_eq!(id.canonical(), "@types/node@20.1.0");
//! assert_eq!(PackageId::parse(&id.canonical()), Some(id));
//! ```

mod findings;
mod package;

pub use findings::*;
pub use package::*;
