//! Configuration templates and the data they are rendered with

use std::path::Path;

use handlebars::Handlebars;
use ngxps_core::{ActionError, SiteContext, UnitConfig};
use serde::Serialize;
use serde_json::{Map, Value, json};
use tracing::debug;

use crate::layout::Layout;

pub const NGINX_CONF: &str = "conf/nginx.conf";
pub const SSL_CONF: &str = "conf/ssl.conf";
pub const PAGESPEED_CONF: &str = "conf/pagespeed.conf";
pub const NAXSI_CORE_RULES: &str = "conf/naxsi_core.rules";
pub const CACHE_CONF: &str = "conf/cache.conf";
pub const SITE_NAXSI_RULES: &str = "sites/naxsi.rules";
pub const SITE_PAGESPEED_CONF: &str = "sites/pagespeed.conf";
pub const SITE_CONF: &str = "sites/site.conf";
pub const SYSTEMD_UNIT: &str = "init/nginx.service";
pub const INIT_SCRIPT: &str = "init/nginx";

/// Files rendered by `configure`, relative to the conf directory
pub const GLOBAL_FILES: [(&str, &str); 4] = [
    (NGINX_CONF, "nginx.conf"),
    (SSL_CONF, "ssl.conf"),
    (PAGESPEED_CONF, "pagespeed.conf"),
    (NAXSI_CORE_RULES, "naxsi_core.rules"),
];

/// Files rendered for each site, relative to the site directory
pub const SITE_FILES: [(&str, &str); 3] = [
    (SITE_NAXSI_RULES, "naxsi.rules"),
    (SITE_PAGESPEED_CONF, "pagespeed.conf"),
    (SITE_CONF, "site.conf"),
];

const SOURCES: [(&str, &str); 10] = [
    (NGINX_CONF, include_str!("../templates/conf/nginx.conf.hbs")),
    (SSL_CONF, include_str!("../templates/conf/ssl.conf.hbs")),
    (PAGESPEED_CONF, include_str!("../templates/conf/pagespeed.conf.hbs")),
    (NAXSI_CORE_RULES, include_str!("../templates/conf/naxsi_core.rules.hbs")),
    (CACHE_CONF, include_str!("../templates/conf/cache.conf.hbs")),
    (SITE_NAXSI_RULES, include_str!("../templates/sites/naxsi.rules.hbs")),
    (SITE_PAGESPEED_CONF, include_str!("../templates/sites/pagespeed.conf.hbs")),
    (SITE_CONF, include_str!("../templates/sites/site.conf.hbs")),
    (SYSTEMD_UNIT, include_str!("../templates/init/nginx.service.hbs")),
    (INIT_SCRIPT, include_str!("../templates/init/nginx.hbs")),
];

/// Registry of the embedded templates
pub struct Templates {
    registry: Handlebars<'static>,
}

impl Templates {
    /// Parse every embedded template
    ///
    /// # Errors
    /// Returns an error if a template does not parse
    pub fn new() -> Result<Self, ActionError> {
        let mut registry = Handlebars::new();
        // nginx syntax is not HTML
        registry.register_escape_fn(handlebars::no_escape);

        for (name, source) in SOURCES {
            registry
                .register_template_string(name, source)
                .map_err(|e| ActionError::Template {
                    template: name.to_string(),
                    message: e.to_string(),
                })?;
        }

        Ok(Self { registry })
    }

    /// Render a template to a string
    ///
    /// # Errors
    /// Returns an error if the template is unknown or rendering fails
    pub fn render<T: Serialize>(&self, name: &str, data: &T) -> Result<String, ActionError> {
        self.registry
            .render(name, data)
            .map_err(|e| ActionError::Template {
                template: name.to_string(),
                message: e.to_string(),
            })
    }

    /// Render a template into `path`
    ///
    /// The file is only written when its content differs. Returns whether it
    /// was written.
    ///
    /// # Errors
    /// Returns an error if rendering or writing fails
    pub fn render_to<T: Serialize>(
        &self,
        name: &str,
        data: &T,
        path: &Path,
    ) -> Result<bool, ActionError> {
        let content = self.render(name, data)?;

        if let Ok(existing) = std::fs::read_to_string(path)
            && existing == content
        {
            return Ok(false);
        }

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ActionError::io(parent, e))?;
        }
        std::fs::write(path, content).map_err(|e| ActionError::io(path, e))?;
        debug!(template = name, path = %path.display(), "rendered");

        Ok(true)
    }
}

fn paths(layout: &Layout) -> Map<String, Value> {
    let mut data = Map::new();
    data.insert("prefix".into(), json!(layout.prefix.display().to_string()));
    data.insert(
        "cache_path".into(),
        json!(layout.cache_path.display().to_string()),
    );
    data
}

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

fn merge(mut base: Map<String, Value>, overrides: Map<String, Value>) -> Map<String, Value> {
    base.extend(overrides);
    base
}

/// Data for the global configuration files
///
/// Operator variables override the built-in defaults; the layout paths
/// override both.
///
/// # Errors
/// Returns an error if the configuration cannot be represented as JSON
pub fn global_data(layout: &Layout, config: &UnitConfig) -> Result<Map<String, Value>, ActionError> {
    let defaults = json!({
        "worker_processes": "auto",
        "worker_connections": 1024,
        "keepalive_timeout": 65,
        "client_max_body_size": "1m",
        "gzip": true,
        "ssl_protocols": "TLSv1.2",
        "ssl_ciphers": "HIGH:!aNULL:!MD5",
        "ssl_session_cache": "10m",
        "ssl_session_timeout": "10m",
        "pagespeed": true,
        "pagespeed_rewrite_level": "CoreFilters",
        "pagespeed_filters": "collapse_whitespace,remove_comments",
    });
    let entries = config.entries()?;
    Ok(merge(merge(object(defaults), entries), paths(layout)))
}

/// Data for one site's files
///
/// # Errors
/// Returns an error if the site context cannot be represented as JSON
pub fn site_data(layout: &Layout, site: &SiteContext) -> Result<Map<String, Value>, ActionError> {
    let defaults = json!({
        "port": 80,
        "server_name": "_",
        "pagespeed": true,
        "naxsi_learning": false,
    });
    let context = serde_json::to_value(site).map_err(|e| ActionError::Template {
        template: SITE_CONF.to_string(),
        message: e.to_string(),
    })?;
    Ok(merge(merge(object(defaults), object(context)), paths(layout)))
}

/// Data for `cache.conf`; no peers renders the file cache variant
#[must_use]
pub fn cache_data(layout: &Layout, peers: &[String]) -> Map<String, Value> {
    let mut data = paths(layout);
    data.insert("memcached_servers".into(), json!(peers.join(",")));
    data.insert("memcached_threads".into(), json!(1));
    data
}

/// Data for the boot-time unit
#[must_use]
pub fn init_data(layout: &Layout) -> Map<String, Value> {
    paths(layout)
}
