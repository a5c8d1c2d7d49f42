//! ngxps-nginx: Host operations for nginx with pagespeed and naxsi
//!
//! Implements the `Actions` the reconciliation engine drives: package install
//! or source build, template rendering, sites, the cache tmpfs, DH parameters
//! and service control through systemd or an init script.

pub mod actions;
pub mod dhparam;
pub mod fingerprint;
pub mod install;
pub mod layout;
pub mod service;
pub mod sites;
pub mod templates;
pub mod tmpfs;

pub use actions::NginxActions;
pub use install::Installer;
pub use layout::Layout;
pub use service::{InitSystem, Service};
pub use sites::SiteDirectory;
pub use templates::Templates;
pub use tmpfs::CacheMount;

#[cfg(test)]
mod testing;
