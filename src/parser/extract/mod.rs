pub mod api;
pub mod json_ld;
pub mod nuxt;
pub mod window;

use std::fmt;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::page::Page;
use crate::config::Settings;
use crate::error::Attempt;
use crate::fetch::Fetch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    WindowWorkflow,
    NuxtState,
    JsonLd,
    TemplateApi,
}

/// Fallback order: page-embedded sources, then the template API.
pub const CHAIN: [Strategy; 4] = [
    Strategy::WindowWorkflow,
    Strategy::NuxtState,
    Strategy::JsonLd,
    Strategy::TemplateApi,
];

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Strategy::WindowWorkflow => "window-workflow",
            Strategy::NuxtState => "nuxt-state",
            Strategy::JsonLd => "json-ld",
            Strategy::TemplateApi => "template-api",
        };
        f.write_str(name)
    }
}

/// What a single strategy produced.
#[derive(Debug, Clone, PartialEq)]
pub enum Extraction {
    Payload(Value),
    NotApplicable(String),
}

#[derive(Debug, Clone)]
pub struct Extracted {
    pub strategy: Strategy,
    pub payload: Value,
}

/// Run the strategies in [`CHAIN`] order and stop at the first payload.
/// On exhaustion returns every attempt with its reason.
pub async fn run_chain<F: Fetch>(
    fetcher: &F,
    settings: &Settings,
    id: &str,
    page: &Page,
) -> Result<Extracted, Vec<Attempt>> {
    let mut attempts = Vec::with_capacity(CHAIN.len());

    for strategy in CHAIN {
        let result = match strategy {
            Strategy::WindowWorkflow => window::extract(page),
            Strategy::NuxtState => nuxt::extract(page),
            Strategy::JsonLd => json_ld::extract(page),
            Strategy::TemplateApi if settings.api_fallback => {
                api::extract(fetcher, settings, id).await
            }
            Strategy::TemplateApi => Extraction::NotApplicable("disabled".into()),
        };

        match result {
            Extraction::Payload(payload) => {
                info!("Extracted workflow {} via {}", id, strategy);
                return Ok(Extracted { strategy, payload });
            }
            Extraction::NotApplicable(reason) => {
                debug!("{} not applicable for {}: {}", strategy, id, reason);
                attempts.push(Attempt { strategy, reason });
            }
        }
    }

    Err(attempts)
}

/// Parse the JSON value assigned after `marker` in a script body,
/// e.g. `window.__WORKFLOW__ = {...};`. Anything after the value is ignored.
///
/// Reads (`if (!window.__WORKFLOW__)`) and comparisons (`==`) are skipped;
/// the first real assignment wins.
fn assigned_json(body: &str, marker: &str) -> Option<Result<Value, String>> {
    let mut found = false;
    for (at, _) in body.match_indices(marker) {
        found = true;
        let rest = body[at + marker.len()..].trim_start();
        if let Some(value) = rest.strip_prefix('=').filter(|r| !r.starts_with('=')) {
            return Some(first_json_value(value.trim_start()));
        }
    }
    found.then(|| Err(format!("{} is not assigned", marker)))
}

/// Read one JSON value from the front of `text`, ignoring trailing content.
fn first_json_value(text: &str) -> Result<Value, String> {
    serde_json::Deserializer::from_str(text)
        .into_iter::<Value>()
        .next()
        .unwrap_or_else(|| Err(serde::de::Error::custom("no JSON value")))
        .map_err(|e| e.to_string())
}

/// Shared body of the two `window.*` strategies: first script that carries
/// the marker and parses wins; parse failures are logged and remembered.
fn from_window_marker(
    page: &Page,
    marker: &str,
    select: impl Fn(Value) -> Result<Value, String>,
) -> Extraction {
    let mut last_error = None;
    for script in page.scripts_containing(marker) {
        match assigned_json(&script.body, marker) {
            Some(Ok(value)) => match select(value) {
                Ok(payload) => return Extraction::Payload(payload),
                Err(e) => last_error = Some(e),
            },
            Some(Err(e)) => {
                warn!("Failed to parse {}: {}", marker, e);
                last_error = Some(e);
            }
            None => {}
        }
    }
    Extraction::NotApplicable(last_error.unwrap_or_else(|| format!("no {} script", marker)))
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::stub::StubFetcher;
    use crate::parser::page::scan;

    #[test]
    fn assigned_json_ignores_trailing_script() {
        let body = r#"window.__WORKFLOW__ = {"nodes": [], "note": "};"}; window.other = 1;"#;
        let value = assigned_json(body, "window.__WORKFLOW__").unwrap().unwrap();
        assert_eq!(value["note"], "};");
    }

    #[test]
    fn assigned_json_missing_marker() {
        assert!(assigned_json("var x = 1;", "window.__WORKFLOW__").is_none());
    }

    #[test]
    fn assigned_json_skips_reads_and_comparisons() {
        let body = r#"if (window.__WORKFLOW__ == null) { window.__WORKFLOW__ = {"id": 3}; }"#;
        let value = assigned_json(body, "window.__WORKFLOW__").unwrap().unwrap();
        assert_eq!(value["id"], 3);

        let res = assigned_json("if (window.__WORKFLOW__ === undefined) {}", "window.__WORKFLOW__");
        assert_eq!(res, Some(Err("window.__WORKFLOW__ is not assigned".into())));
    }

    #[test]
    fn assigned_json_invalid() {
        let res = assigned_json("window.__NUXT__=(function(a){return {}})(1)", "window.__NUXT__");
        assert!(res.unwrap().is_err());
    }

    #[test]
    fn strategy_names() {
        let names: Vec<String> = CHAIN.iter().map(|s| s.to_string()).collect();
        assert_eq!(names, vec!["window-workflow", "nuxt-state", "json-ld", "template-api"]);
    }

    #[tokio::test]
    async fn first_success_wins() {
        let html = r#"
            <script>window.__WORKFLOW__ = {"nodes": [{"id": "a"}], "connections": {}};</script>
            <script type="application/ld+json">{"mainEntity": {"code": "{\"nodes\": []}"}}</script>
        "#;
        let page = scan(html);
        let got = run_chain(&StubFetcher::default(), &Settings::default(), "1", &page)
            .await
            .unwrap();
        assert_eq!(got.strategy, Strategy::WindowWorkflow);
        assert_eq!(got.payload["nodes"][0]["id"], "a");
    }

    #[tokio::test]
    async fn falls_through_to_api() {
        let settings = Settings::default();
        let fetcher = StubFetcher::default().with(
            &settings.api_workflow_url("9"),
            r#"{"workflow": {"id": 9, "workflow": {"nodes": [], "connections": {}}}}"#,
        );
        let page = scan("<html><script>window.__WORKFLOW__ = broken;</script></html>");
        let got = run_chain(&fetcher, &settings, "9", &page).await.unwrap();
        assert_eq!(got.strategy, Strategy::TemplateApi);
    }

    #[tokio::test]
    async fn exhaustion_lists_every_attempt() {
        let settings = Settings {
            api_fallback: false,
            ..Settings::default()
        };
        let page = scan("<html><body>nothing here</body></html>");
        let attempts = run_chain(&StubFetcher::default(), &settings, "1", &page)
            .await
            .unwrap_err();
        let tried: Vec<Strategy> = attempts.iter().map(|a| a.strategy).collect();
        assert_eq!(tried, CHAIN.to_vec());
        assert_eq!(attempts[3].reason, "disabled");
    }
}
