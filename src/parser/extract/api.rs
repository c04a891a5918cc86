use serde_json::Value;
use tracing::warn;

use super::{first_json_value, Extraction};
use crate::config::Settings;
use crate::fetch::Fetch;

/// Template API: `GET <api_url>/<id>` answers with the workflow as JSON.
/// Any failure here only means this strategy does not apply.
pub async fn extract<F: Fetch>(fetcher: &F, settings: &Settings, id: &str) -> Extraction {
    let url = settings.api_workflow_url(id);
    let body = match fetcher.get(&url).await {
        Ok(body) => body,
        Err(e) => {
            warn!("Template API unavailable for {}: {}", id, e);
            return Extraction::NotApplicable(e.to_string());
        }
    };

    match first_json_value(&body) {
        Ok(v @ Value::Object(_)) if v.get("workflow").is_some() || v.get("nodes").is_some() => {
            Extraction::Payload(v)
        }
        Ok(_) => Extraction::NotApplicable("API response holds no workflow".into()),
        Err(e) => Extraction::NotApplicable(format!("API response is not JSON: {}", e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::stub::StubFetcher;

    #[tokio::test]
    async fn json_response() {
        let settings = Settings::default();
        let fetcher = StubFetcher::default()
            .with(&settings.api_workflow_url("5"), r#"{"workflow": {"id": 5}}"#);
        assert!(matches!(extract(&fetcher, &settings, "5").await, Extraction::Payload(_)));
    }

    #[tokio::test]
    async fn missing_is_not_applicable() {
        let settings = Settings::default();
        let got = extract(&StubFetcher::default(), &settings, "5").await;
        assert!(matches!(got, Extraction::NotApplicable(r) if r.contains("404")));
    }

    #[tokio::test]
    async fn html_error_page() {
        let settings = Settings::default();
        let fetcher = StubFetcher::default()
            .with(&settings.api_workflow_url("5"), "<html>Not found</html>");
        assert!(matches!(
            extract(&fetcher, &settings, "5").await,
            Extraction::NotApplicable(_)
        ));
    }

    #[tokio::test]
    async fn unrelated_json() {
        let settings = Settings::default();
        let fetcher = StubFetcher::default()
            .with(&settings.api_workflow_url("5"), r#"{"error": "gone"}"#);
        assert_eq!(
            extract(&fetcher, &settings, "5").await,
            Extraction::NotApplicable("API response holds no workflow".into())
        );
    }
}
