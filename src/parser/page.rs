use std::collections::HashMap;
use std::sync::LazyLock;

use regex::{Captures, Regex};

static SCRIPT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<script\b([^>]*)>(.*?)</script\s*>").unwrap());
static META_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?is)<meta\b([^>]*)/?>").unwrap());
static TITLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<title\b[^>]*>(.*?)</title\s*>").unwrap());
static ATTR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"([A-Za-z_:][-A-Za-z0-9_:.]*)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'=<>`]+))"#)
        .unwrap()
});
static TITLE_SUFFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)^(.+?)\s*\|\s*n8n").unwrap());
static NUMERIC_ENTITY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&#(?:[xX]([0-9a-fA-F]{1,6})|([0-9]{1,7}));").unwrap());

#[derive(Debug, Clone)]
pub struct Script {
    pub attrs: HashMap<String, String>,
    pub body: String,
}

impl Script {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).map(String::as_str)
    }
}

#[derive(Debug, Clone)]
pub struct MetaTag {
    pub attrs: HashMap<String, String>,
}

impl MetaTag {
    fn content_for(&self, key: &str, value: &str) -> Option<&str> {
        let matches = self
            .attrs
            .get(key)
            .is_some_and(|v| v.eq_ignore_ascii_case(value));
        if matches {
            self.attrs.get("content").map(String::as_str)
        } else {
            None
        }
    }
}

/// The parts of a gallery page the extractors care about.
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub scripts: Vec<Script>,
    pub metas: Vec<MetaTag>,
    pub title: Option<String>,
}

/// Metadata read from `<title>` and `<meta>` tags.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageMeta {
    pub title: Option<String>,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub category: Option<String>,
}

pub fn scan(html: &str) -> Page {
    let scripts = SCRIPT_RE
        .captures_iter(html)
        .map(|caps| Script {
            attrs: parse_attrs(&caps[1]),
            body: caps[2].to_string(),
        })
        .collect();

    let metas = META_RE
        .captures_iter(html)
        .map(|caps| MetaTag {
            attrs: parse_attrs(&caps[1]),
        })
        .collect();

    let title = TITLE_RE
        .captures(html)
        .map(|caps| decode_entities(caps[1].trim()))
        .filter(|t| !t.is_empty());

    Page {
        scripts,
        metas,
        title,
    }
}

impl Page {
    pub fn meta(&self) -> PageMeta {
        let title = self.title.as_ref().map(|t| match TITLE_SUFFIX_RE.captures(t) {
            Some(caps) => caps[1].trim().to_string(),
            None => t.clone(),
        });

        let description = self
            .metas
            .iter()
            .find_map(|m| m.content_for("name", "description"))
            .map(str::to_string)
            .filter(|d| !d.is_empty());

        let tags = self
            .metas
            .iter()
            .filter_map(|m| m.content_for("property", "article:tag"))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect();

        let category = self
            .metas
            .iter()
            .find_map(|m| m.content_for("property", "article:section"))
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());

        PageMeta {
            title,
            description,
            tags,
            category,
        }
    }

    /// Script bodies containing `marker`, in document order.
    pub fn scripts_containing<'a>(&'a self, marker: &'a str) -> impl Iterator<Item = &'a Script> {
        self.scripts.iter().filter(move |s| s.body.contains(marker))
    }

    /// Scripts whose `type` is `mime`, ignoring parameters such as `; charset=utf-8`.
    pub fn scripts_of_type<'a>(&'a self, mime: &'a str) -> impl Iterator<Item = &'a Script> {
        self.scripts.iter().filter(move |s| {
            s.attr("type")
                .and_then(|t| t.split(';').next())
                .is_some_and(|t| t.trim().eq_ignore_ascii_case(mime))
        })
    }
}

fn parse_attrs(raw: &str) -> HashMap<String, String> {
    ATTR_RE
        .captures_iter(raw)
        .map(|caps| {
            let value = caps
                .get(2)
                .or_else(|| caps.get(3))
                .or_else(|| caps.get(4))
                .map(|m| m.as_str())
                .unwrap_or_default();
            (caps[1].to_ascii_lowercase(), decode_entities(value))
        })
        .collect()
}

/// Decode numeric references and the named entities that show up in titles
/// and meta content. `&amp;` goes last so `&amp;lt;` stays `&lt;`.
pub fn decode_entities(s: &str) -> String {
    let named = s
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&nbsp;", " ")
        .replace("&ndash;", "\u{2013}")
        .replace("&mdash;", "\u{2014}");

    NUMERIC_ENTITY_RE
        .replace_all(&named, |caps: &Captures| {
            let code = match (caps.get(1), caps.get(2)) {
                (Some(hex), _) => u32::from_str_radix(hex.as_str(), 16).ok(),
                (_, Some(dec)) => dec.as_str().parse().ok(),
                _ => None,
            };
            code.and_then(char::from_u32)
                .map(String::from)
                .unwrap_or_else(|| caps[0].to_string())
        })
        .replace("&amp;", "&")
}

// ── Tests ──
