//! ngxps-pkg: Package installation for the nginx build
//!
//! Provides the package manager abstraction (apt/dpkg), archive inspection and
//! the nginx + pagespeed + naxsi source build.

pub mod apt;
pub mod archive;
pub mod build;
pub mod error;
pub mod traits;
pub mod types;

pub use apt::AptManager;
pub use build::SourceBuild;
pub use error::PackageError;
pub use traits::PackageManager;
pub use types::{Artifacts, PackageManagerType, SourceArchives};
