use std::path::Path;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

pub const DEFAULT_GALLERY_URL: &str = "https://n8n.io/workflows";
pub const DEFAULT_API_URL: &str = "https://api.n8n.io/api/templates/workflows";
pub const DEFAULT_SITEMAP_URL: &str = "https://n8n.io/sitemap-workflows.xml";
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub gallery_url: String,
    pub api_url: String,
    pub sitemap_url: String,
    pub user_agent: String,
    pub timeout_secs: u64,
    /// Try the template API when nothing is embedded in the page.
    pub api_fallback: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            gallery_url: DEFAULT_GALLERY_URL.to_string(),
            api_url: DEFAULT_API_URL.to_string(),
            sitemap_url: DEFAULT_SITEMAP_URL.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout_secs: 30,
            api_fallback: true,
        }
    }
}

impl Settings {
    /// Defaults, then `gallery.toml` (or `path`), then `GALLERY_*` env vars.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let d = Settings::default();
        let mut builder = Config::builder()
            .set_default("gallery_url", d.gallery_url)?
            .set_default("api_url", d.api_url)?
            .set_default("sitemap_url", d.sitemap_url)?
            .set_default("user_agent", d.user_agent)?
            .set_default("timeout_secs", d.timeout_secs)?
            .set_default("api_fallback", d.api_fallback)?;

        builder = match path {
            Some(p) => builder.add_source(File::from(p).required(true)),
            None => builder.add_source(File::with_name("gallery").required(false)),
        };

        builder
            .add_source(Environment::with_prefix("GALLERY").try_parsing(true))
            .build()?
            .try_deserialize()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn page_url(&self, id: &str) -> String {
        format!("{}/{}", self.gallery_url.trim_end_matches('/'), id)
    }

    pub fn api_workflow_url(&self, id: &str) -> String {
        format!("{}/{}", self.api_url.trim_end_matches('/'), id)
    }
}
