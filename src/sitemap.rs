use std::collections::HashSet;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use quick_xml::events::Event;
use quick_xml::Reader;
use regex::Regex;
use tracing::{debug, info};

use crate::config::Settings;
use crate::fetch::Fetch;

static WORKFLOW_URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^https?://[^/]+/workflows/(\d+)(?:-[^/]*)?/?$").unwrap());

/// Fetch the gallery sitemap and return workflow ids in sitemap order.
///
/// A sitemap index is followed one level down.
pub async fn fetch_workflow_ids<F: Fetch>(fetcher: &F, settings: &Settings) -> Result<Vec<String>> {
    info!("Fetching gallery sitemap: {}", settings.sitemap_url);
    let xml = fetcher
        .get(&settings.sitemap_url)
        .await
        .context("Failed to fetch gallery sitemap")?;

    let root = parse_sitemap(&xml)?;
    let mut pages = root.pages;
    for child in &root.children {
        debug!("Following child sitemap {}", child);
        let xml = fetcher
            .get(child)
            .await
            .with_context(|| format!("Failed to fetch child sitemap {}", child))?;
        pages.extend(parse_sitemap(&xml)?.pages);
    }
    info!(
        "Total URLs in sitemap: {} ({} child sitemaps)",
        pages.len(),
        root.children.len()
    );

    let ids = workflow_ids(&pages);
    info!("Workflow pages after filtering: {}", ids.len());
    Ok(ids)
}

/// Keep workflow detail pages only (not /workflows/categories/..., etc.), deduplicated.
fn workflow_ids(urls: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    urls.iter()
        .filter_map(|url| Some(WORKFLOW_URL_RE.captures(url)?.get(1)?.as_str().to_string()))
        .filter(|id| seen.insert(id.clone()))
        .collect()
}

#[derive(Debug, Default, PartialEq)]
struct Sitemap {
    /// `<urlset><url><loc>`
    pages: Vec<String>,
    /// `<sitemapindex><sitemap><loc>`
    children: Vec<String>,
}

#[derive(Clone, Copy)]
enum Entry {
    Page,
    Child,
}

/// Collect `<loc>` values of a urlset or a sitemap index.
fn parse_sitemap(xml: &str) -> Result<Sitemap> {
    let mut reader = Reader::from_str(xml);
    let mut sitemap = Sitemap::default();
    let mut entry = None;
    let mut loc: Option<String> = None;

    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"url" => entry = Some(Entry::Page),
                b"sitemap" => entry = Some(Entry::Child),
                b"loc" if entry.is_some() => loc = Some(String::new()),
                _ => {}
            },
            Event::Text(t) => {
                if let Some(buf) = loc.as_mut() {
                    buf.push_str(&t.unescape()?);
                }
            }
            Event::CData(c) => {
                if let Some(buf) = loc.as_mut() {
                    buf.push_str(&String::from_utf8_lossy(&c));
                }
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"loc" => {
                    let url = loc.take().map(|u| u.trim().to_string()).unwrap_or_default();
                    match entry {
                        _ if url.is_empty() => {}
                        Some(Entry::Page) => sitemap.pages.push(url),
                        Some(Entry::Child) => sitemap.children.push(url),
                        None => {}
                    }
                }
                b"url" | b"sitemap" => entry = None,
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(sitemap)
}
