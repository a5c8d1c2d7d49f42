//! Site directories under `sites-enabled/`

use std::path::PathBuf;

use ngxps_core::detector::keys;
use ngxps_core::{ActionError, ChangeDetector, SiteContext};
use tracing::{debug, info};

use crate::fingerprint;
use crate::layout::Layout;
use crate::templates::{self, SITE_FILES, Templates};

/// The `sites-enabled/` directory and the per-site files it holds
pub struct SiteDirectory {
    root: PathBuf,
}

impl SiteDirectory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &std::path::Path {
        &self.root
    }

    /// Render the three files of `site` into its directory
    ///
    /// # Errors
    /// Returns an error if the name is not a plain directory name or a file
    /// cannot be rendered
    pub fn add(
        &self,
        templates: &Templates,
        layout: &Layout,
        site: &SiteContext,
    ) -> Result<(), ActionError> {
        if !site.has_valid_name() {
            return Err(ActionError::io(
                self.root.join(&site.service_name),
                "invalid site name",
            ));
        }

        let dir = self.root.join(&site.service_name);
        let data = templates::site_data(layout, site)?;
        for (template, file) in SITE_FILES {
            templates.render_to(template, &data, &dir.join(file))?;
        }

        debug!(site = %site.service_name, "site rendered");
        Ok(())
    }

    /// Remove every site directory not named in `names`
    ///
    /// Returns whether the fingerprint of the remaining site files differs
    /// from the one recorded by the previous call.
    ///
    /// # Errors
    /// Returns an error if a directory cannot be listed or removed
    pub fn enable(
        &self,
        names: &[String],
        detector: &mut ChangeDetector,
    ) -> Result<bool, ActionError> {
        for site in self.list()? {
            if names.contains(&site) {
                continue;
            }
            let path = self.root.join(&site);
            if path.is_dir() {
                std::fs::remove_dir_all(&path).map_err(|e| ActionError::io(&path, e))?;
            } else {
                std::fs::remove_file(&path).map_err(|e| ActionError::io(&path, e))?;
            }
            info!(site = %site, "site removed");
        }

        let files = fingerprint::tree(&self.root)?;
        Ok(detector.changed(keys::SITES_FILES, &files)?)
    }

    /// Names of the entries under `sites-enabled/`, sorted
    ///
    /// # Errors
    /// Returns an error if the directory exists but cannot be read
    pub fn list(&self) -> Result<Vec<String>, ActionError> {
        if !self.root.is_dir() {
            return Ok(Vec::new());
        }

        let entries = std::fs::read_dir(&self.root).map_err(|e| ActionError::io(&self.root, e))?;
        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| ActionError::io(&self.root, e))?;
            names.push(entry.file_name().to_string_lossy().to_string());
        }
        names.sort();
        Ok(names)
    }
}
