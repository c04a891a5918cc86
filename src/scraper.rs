use chrono::{DateTime, Utc};
use indicatif::style::TemplateError;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use tracing::{info, warn};

use crate::config::Settings;
use crate::error::{ErrorKind, ScrapeError};
use crate::fetch::{self, Fetch};
use crate::parser::{self, extract::Strategy};
use crate::record::{Violation, WorkflowRecord};

/// A canonical record plus where and how it was obtained.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapedWorkflow {
    pub url: String,
    pub strategy: Strategy,
    pub scraped_at: DateTime<Utc>,
    pub violations: Vec<Violation>,
    pub record: WorkflowRecord,
}

/// Fetch, extract and normalize one workflow.
pub async fn scrape_workflow<F: Fetch>(
    fetcher: &F,
    settings: &Settings,
    id: &str,
) -> Result<ScrapedWorkflow, ScrapeError> {
    let id = id.trim();
    info!("Scraping workflow {}", id);

    let html = fetch::fetch_page(fetcher, settings, id)
        .await
        .map_err(|source| ScrapeError::SourceUnavailable {
            id: id.to_string(),
            source,
        })?;

    let (strategy, record) = parser::process_page(fetcher, settings, id, &html).await?;
    let violations = record.validate();

    info!(
        "Workflow {}: {} nodes, {} connections via {}",
        id,
        record.stats().node_count,
        record.stats().connection_count,
        strategy
    );

    Ok(ScrapedWorkflow {
        url: settings.page_url(id),
        strategy,
        scraped_at: Utc::now(),
        violations,
        record,
    })
}

/// Batch stats returned after completion.
#[derive(Debug, Default, PartialEq)]
pub struct BatchStats {
    pub total: usize,
    pub ok: usize,
    pub unavailable: usize,
    pub unextractable: usize,
    pub malformed: usize,
}

impl BatchStats {
    fn count(&mut self, kind: ErrorKind) {
        match kind {
            ErrorKind::SourceUnavailable => self.unavailable += 1,
            ErrorKind::Unextractable => self.unextractable += 1,
            ErrorKind::Malformed => self.malformed += 1,
        }
    }
}

/// Progress bar for a batch of `len` workflows.
pub fn progress_bar(len: u64) -> Result<ProgressBar, TemplateError> {
    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} {msg} ({per_sec}, eta {eta})")?
            .progress_chars("=> "),
    );
    Ok(pb)
}

/// Scrape `ids` one after another, handing each record to `emit` and
/// advancing `pb`.
///
/// Unavailable and unextractable workflows are logged and skipped. Malformed
/// payloads are skipped too unless `strict`, which stops the batch.
pub async fn scrape_batch<F, E>(
    fetcher: &F,
    settings: &Settings,
    ids: &[String],
    strict: bool,
    pb: &ProgressBar,
    mut emit: E,
) -> Result<BatchStats, ScrapeError>
where
    F: Fetch,
    E: FnMut(&ScrapedWorkflow),
{

    let mut stats = BatchStats {
        total: ids.len(),
        ..BatchStats::default()
    };

    for id in ids {
        pb.set_message(id.clone());
        match scrape_workflow(fetcher, settings, id).await {
            Ok(scraped) => {
                stats.ok += 1;
                emit(&scraped);
            }
            Err(e) if strict && e.kind() == ErrorKind::Malformed => {
                pb.finish_and_clear();
                return Err(e);
            }
            Err(e) => {
                warn!("Skipping {}: {}", id, e);
                stats.count(e.kind());
            }
        }
        pb.inc(1);
    }

    pb.finish_and_clear();
    info!(
        "Scraped {} workflows ({} ok, {} unavailable, {} unextractable, {} malformed)",
        stats.total, stats.ok, stats.unavailable, stats.unextractable, stats.malformed
    );
    Ok(stats)
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::stub::StubFetcher;

    fn fixture(name: &str) -> String {
        std::fs::read_to_string(format!("tests/fixtures/{}.html", name)).unwrap()
    }

    fn settings() -> Settings {
        Settings {
            api_fallback: false,
            ..Settings::default()
        }
    }

    fn fetcher() -> StubFetcher {
        let s = Settings::default();
        StubFetcher::default()
            .with(&s.page_url("1001"), &fixture("window_workflow"))
            .with(&s.page_url("1002"), &fixture("nuxt_state"))
            .with(&s.page_url("1003"), &fixture("json_ld"))
            .with(&s.page_url("1004"), &fixture("no_payload"))
            .with(&s.page_url("1005"), &fixture("missing_target"))
            .with(&s.page_url("1006"), &fixture("no_payload"))
            .with(
                &s.api_workflow_url("1006"),
                r#"{"workflow": {"id": 1006, "name": "Via API", "workflow": {
                    "nodes": [{"id": "a", "name": "Cron", "type": "n8n-nodes-base.cron"},
                              {"id": "b", "name": "HTTP", "type": "n8n-nodes-base.httpRequest"}],
                    "connections": {"Cron": {"main": [[{"node": "HTTP", "type": "main", "index": 0}]]}}}}}"#,
            )
    }

    #[tokio::test]
    async fn window_workflow_page() {
        let got = scrape_workflow(&fetcher(), &settings(), "1001").await.unwrap();
        let r = &got.record;
        assert_eq!(got.strategy, Strategy::WindowWorkflow);
        assert_eq!(got.url, "https://n8n.io/workflows/1001");
        assert_eq!(r.name(), "Send new leads to Slack");
        assert_eq!(r.meta().category.as_deref(), Some("Sales"));
        assert!(r.meta().tags.contains("Slack"));
        assert_eq!(r.stats().node_count, r.nodes().len());
        assert_eq!(r.stats().connection_count, r.connections().len());
        assert_eq!(r.connections().len(), 2);
        assert!(got.violations.is_empty());
    }

    #[tokio::test]
    async fn nuxt_page() {
        let got = scrape_workflow(&fetcher(), &settings(), "1002").await.unwrap();
        assert_eq!(got.strategy, Strategy::NuxtState);
        assert_eq!(got.record.nodes().len(), 2);
        assert!(got.record.is_valid());
    }

    #[tokio::test]
    async fn json_ld_page() {
        let got = scrape_workflow(&fetcher(), &settings(), "1003").await.unwrap();
        assert_eq!(got.strategy, Strategy::JsonLd);
        assert_eq!(got.record.name(), "Daily weather report");
        assert_eq!(got.record.connections().len(), 1);
    }

    #[tokio::test]
    async fn page_without_payload_is_unextractable() {
        let err = scrape_workflow(&fetcher(), &settings(), "1004").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unextractable);
        let ScrapeError::Unextractable { attempts, .. } = err else {
            unreachable!()
        };
        assert_eq!(attempts.len(), 4);
    }

    #[tokio::test]
    async fn missing_target_is_malformed() {
        let err = scrape_workflow(&fetcher(), &settings(), "1005").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Malformed);
    }

    #[tokio::test]
    async fn api_fallback() {
        let got = scrape_workflow(&fetcher(), &Settings::default(), "1006").await.unwrap();
        assert_eq!(got.strategy, Strategy::TemplateApi);
        assert_eq!(got.record.name(), "Via API");
        assert_eq!(got.record.connections()[0].target, "b");
    }

    #[tokio::test]
    async fn unknown_page_is_unavailable() {
        let err = scrape_workflow(&fetcher(), &settings(), "9999").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SourceUnavailable);
    }

    #[tokio::test]
    async fn batch_skips_failures() {
        let ids: Vec<String> = ["1001", "1004", "1005", "9999", "1002"].map(String::from).to_vec();
        let mut names = Vec::new();
        let stats = scrape_batch(&fetcher(), &settings(), &ids, false, &ProgressBar::hidden(), |s| {
            names.push(s.record.id().to_string())
        })
        .await
        .unwrap();
        assert_eq!(
            stats,
            BatchStats { total: 5, ok: 2, unavailable: 1, unextractable: 1, malformed: 1 }
        );
        assert_eq!(names, vec!["1001", "1002"]);
    }

    #[test]
    fn progress_bar_template_is_valid() {
        let pb = progress_bar(3).unwrap();
        assert_eq!(pb.length(), Some(3));
    }

    #[tokio::test]
    async fn strict_batch_stops_on_malformed() {
        let ids: Vec<String> = ["1001", "1005", "1002"].map(String::from).to_vec();
        let mut seen = 0;
        let err = scrape_batch(&fetcher(), &settings(), &ids, true, &ProgressBar::hidden(), |_| {
            seen += 1
        })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Malformed);
        assert_eq!(seen, 1);
    }
}
