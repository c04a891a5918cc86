pub mod extract;
pub mod normalize;
pub mod page;

use crate::config::Settings;
use crate::error::ScrapeError;
use crate::fetch::Fetch;
use crate::record::WorkflowRecord;
use extract::Strategy;

/// Two-stage pipeline: html → strategy chain → canonical record.
pub async fn process_page<F: Fetch>(
    fetcher: &F,
    settings: &Settings,
    id: &str,
    html: &str,
) -> Result<(Strategy, WorkflowRecord), ScrapeError> {
    let page = page::scan(html);

    let extracted = extract::run_chain(fetcher, settings, id, &page)
        .await
        .map_err(|attempts| ScrapeError::Unextractable {
            id: id.to_string(),
            attempts,
        })?;

    let record = normalize::normalize(id, &extracted.payload, &page.meta()).map_err(|source| {
        ScrapeError::Malformed {
            id: id.to_string(),
            source,
        }
    })?;

    Ok((extracted.strategy, record))
}
