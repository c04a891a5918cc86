use serde_json::Value;

use super::{from_window_marker, Extraction};
use crate::parser::page::Page;

const MARKER: &str = "window.__NUXT__";

/// Nuxt page state: the workflow sits under the first `data[]` entry that
/// has a `workflow` object.
pub fn extract(page: &Page) -> Extraction {
    from_window_marker(page, MARKER, |state| {
        let data = state
            .get("data")
            .and_then(Value::as_array)
            .ok_or_else(|| format!("{} has no data array", MARKER))?;

        data.iter()
            .filter_map(|item| item.get("workflow"))
            .find(|w| w.is_object())
            .cloned()
            .ok_or_else(|| format!("{} data holds no workflow", MARKER))
    })
}
