use serde_json::Value;
use tracing::warn;

use super::{first_json_value, Extraction};
use crate::parser::page::Page;

const LD_JSON: &str = "application/ld+json";

/// Structured-data block: `mainEntity.code` carries the workflow, either as a
/// JSON string or inline.
pub fn extract(page: &Page) -> Extraction {
    let mut reason = format!("no {} script", LD_JSON);

    for script in page.scripts_of_type(LD_JSON) {
        let doc = match first_json_value(script.body.trim()) {
            Ok(doc) => doc,
            Err(e) => {
                warn!("Failed to parse JSON-LD: {}", e);
                reason = e;
                continue;
            }
        };

        for entity in entities(&doc) {
            let Some(code) = entity.get("mainEntity").and_then(|m| m.get("code")) else {
                reason = "no mainEntity.code".into();
                continue;
            };
            match code {
                Value::String(s) => match first_json_value(s) {
                    Ok(v @ Value::Object(_)) => return Extraction::Payload(v),
                    Ok(_) => reason = "mainEntity.code is not an object".into(),
                    Err(e) => {
                        warn!("Failed to parse JSON-LD mainEntity.code: {}", e);
                        reason = e;
                    }
                },
                Value::Object(_) => return Extraction::Payload(code.clone()),
                _ => reason = "mainEntity.code is not an object".into(),
            }
        }
    }

    Extraction::NotApplicable(reason)
}

/// Top-level document, array items, and `@graph` members.
fn entities(doc: &Value) -> Vec<&Value> {
    let top: Vec<&Value> = match doc {
        Value::Array(items) => items.iter().collect(),
        other => vec![other],
    };
    let mut all = Vec::new();
    for item in top {
        all.push(item);
        if let Some(graph) = item.get("@graph").and_then(Value::as_array) {
            all.extend(graph.iter());
        }
    }
    all
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::page::scan;

    #[test]
    fn code_as_string() {
        let page = scan(
            r#"<script type="application/ld+json">
            {"@type": "SoftwareSourceCode", "mainEntity": {"code": "{\"nodes\": [{\"id\": \"x\"}]}"}}
            </script>"#,
        );
        let Extraction::Payload(v) = extract(&page) else {
            panic!("expected payload");
        };
        assert_eq!(v["nodes"][0]["id"], "x");
    }

    #[test]
    fn code_in_graph() {
        let page = scan(
            r#"<script type="application/ld+json">
            {"@graph": [{"@type": "WebPage"}, {"mainEntity": {"code": {"nodes": []}}}]}
            </script>"#,
        );
        assert!(matches!(extract(&page), Extraction::Payload(_)));
    }

    #[test]
    fn unrelated_ld_json() {
        let page = scan(r#"<script type="application/ld+json">{"@type": "Organization"}</script>"#);
        assert_eq!(extract(&page), Extraction::NotApplicable("no mainEntity.code".into()));
    }

    #[test]
    fn plain_script_ignored() {
        let page = scan(r#"<script>{"mainEntity": {"code": "{}"}}</script>"#);
        assert!(matches!(extract(&page), Extraction::NotApplicable(_)));
    }
}
