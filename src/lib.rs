//! Scrape workflow templates from the n8n gallery into canonical records.

pub mod config;
pub mod error;
pub mod fetch;
pub mod parser;
pub mod record;
pub mod scraper;
pub mod sitemap;
pub mod synthetic;

pub use config::Settings;
pub use error::{ErrorKind, FetchError, NormalizeError, ScrapeError};
pub use fetch::{Fetch, HttpFetcher};
pub use parser::extract::Strategy;
pub use record::{Connection, Node, Violation, WorkflowMeta, WorkflowRecord, WorkflowStats};
pub use scraper::{progress_bar, scrape_batch, scrape_workflow, BatchStats, ScrapedWorkflow};
pub use synthetic::{generate, SynthOptions};
