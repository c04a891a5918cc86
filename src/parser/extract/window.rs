use serde_json::Value;

use super::{from_window_marker, Extraction};
use crate::parser::page::Page;

const MARKER: &str = "window.__WORKFLOW__";

/// `window.__WORKFLOW__ = {...}` holds the workflow export as-is.
pub fn extract(page: &Page) -> Extraction {
    from_window_marker(page, MARKER, |value| match value {
        Value::Object(_) => Ok(value),
        _ => Err(format!("{} is not an object", MARKER)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::page::scan;

    #[test]
    fn object_payload() {
        let page = scan(r#"<script>window.__WORKFLOW__={"name":"A","nodes":[]};</script>"#);
        let Extraction::Payload(v) = extract(&page) else {
            panic!("expected payload");
        };
        assert_eq!(v["name"], "A");
    }

    #[test]
    fn later_script_used_when_first_is_broken() {
        let page = scan(
            r#"<script>window.__WORKFLOW__ = {oops};</script>
               <script>window.__WORKFLOW__ = {"nodes": []};</script>"#,
        );
        assert!(matches!(extract(&page), Extraction::Payload(_)));
    }

    #[test]
    fn guarded_assignment() {
        let page = scan(
            r#"<script>if (!window.__WORKFLOW__) { window.__WORKFLOW__ = {"nodes":[{"id":"a"}],"connections":{}}; }</script>"#,
        );
        let Extraction::Payload(v) = extract(&page) else {
            panic!("expected payload");
        };
        assert_eq!(v["nodes"][0]["id"], "a");
    }

    #[test]
    fn array_is_not_applicable() {
        let page = scan("<script>window.__WORKFLOW__ = [1, 2];</script>");
        assert!(matches!(extract(&page), Extraction::NotApplicable(_)));
    }

    #[test]
    fn absent() {
        let page = scan("<script>console.log(1)</script>");
        assert_eq!(
            extract(&page),
            Extraction::NotApplicable("no window.__WORKFLOW__ script".into())
        );
    }
}
