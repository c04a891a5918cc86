use std::collections::{BTreeSet, HashMap, HashSet};

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::page::PageMeta;
use crate::error::NormalizeError;
use crate::record::{Connection, Node, NodeFlags, Position, WorkflowMeta, WorkflowRecord};

type Object = Map<String, Value>;

const MAX_NESTING: usize = 3;
const METADATA_KEYS: &[&str] = &["condition", "description", "label"];

/// Map any supported payload shape onto a [`WorkflowRecord`].
///
/// Page metadata only fills fields the payload leaves empty.
pub fn normalize(id: &str, payload: &Value, page: &PageMeta) -> Result<WorkflowRecord, NormalizeError> {
    let root = payload.as_object().ok_or(NormalizeError::NotAnObject)?;
    let layers = nesting(root);

    // Innermost object that looks like a full graph, else the outermost with nodes.
    let graph_at = layers
        .iter()
        .rposition(|o| o.get("nodes").is_some_and(Value::is_array) && o.contains_key("connections"))
        .or_else(|| layers.iter().position(|o| o.get("nodes").is_some_and(Value::is_array)))
        .ok_or(NormalizeError::MissingNodes)?;
    let graph = layers[graph_at];

    // Metadata lookups walk from the graph outward.
    let scope: Vec<&Object> = layers[..=graph_at].iter().rev().copied().collect();

    let nodes = parse_nodes(graph)?;
    let refs = NodeRefs::new(&nodes);
    let connections = parse_connections(graph.get("connections"), &refs)?;

    let meta = build_meta(id, &scope, page);
    let record = WorkflowRecord::new(meta, nodes, connections);

    for v in record.validate() {
        warn!("Workflow {}: {}", id, v);
    }
    Ok(record)
}

/// `payload`, `payload.workflow`, `payload.workflow.workflow`, ...
fn nesting(root: &Object) -> Vec<&Object> {
    let mut layers = vec![root];
    let mut current = root;
    while layers.len() <= MAX_NESTING {
        match current.get("workflow").and_then(Value::as_object) {
            Some(inner) => {
                layers.push(inner);
                current = inner;
            }
            None => break,
        }
    }
    layers
}

/// First value under `keys` that `read` accepts, searching `scope` in order.
/// Blank or mistyped values fall through to the next key or layer.
fn lookup<'a, T>(
    scope: &[&'a Object],
    keys: &[&str],
    read: impl Fn(&'a Value) -> Option<T>,
) -> Option<T> {
    scope
        .iter()
        .find_map(|o| keys.iter().find_map(|k| o.get(*k).and_then(&read)))
}

fn text(v: &Value) -> Option<&str> {
    v.as_str().map(str::trim).filter(|s| !s.is_empty())
}

fn text_field(obj: &Object, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|k| obj.get(*k).and_then(text))
        .map(str::to_string)
}

// ── Metadata ──

fn build_meta(id: &str, scope: &[&Object], page: &PageMeta) -> WorkflowMeta {
    let name = lookup(scope, &["name", "title"], text)
        .map(str::to_string)
        .or_else(|| page.title.clone())
        .unwrap_or_else(|| format!("Workflow {}", id));

    let description = lookup(scope, &["description"], text)
        .map(str::to_string)
        .or_else(|| page.description.clone())
        .unwrap_or_default();

    let mut tags: BTreeSet<String> = lookup(scope, &["tags"], Value::as_array)
        .map(|items| items.iter().filter_map(tag_name).collect())
        .unwrap_or_default();
    tags.extend(page.tags.iter().cloned());

    let category = lookup(scope, &["category"], text)
        .map(str::to_string)
        .or_else(|| {
            lookup(scope, &["categories"], |v| v.as_array()?.iter().find_map(tag_name))
        })
        .or_else(|| page.category.clone());

    let version = lookup(scope, &["version", "versionId"], scalar_string);

    let settings = lookup(scope, &["settings"], Value::as_object)
        .cloned()
        .unwrap_or_default();

    WorkflowMeta {
        id: id.to_string(),
        name,
        description,
        category,
        tags,
        version,
        created_at: timestamp_field(scope, &["createdAt", "created_at", "created"]),
        updated_at: timestamp_field(scope, &["updatedAt", "updated_at", "updated"]),
        settings,
    }
}

fn tag_name(v: &Value) -> Option<String> {
    let name = match v {
        Value::String(s) => s.as_str(),
        Value::Object(o) => o.get("name")?.as_str()?,
        _ => return None,
    };
    let name = name.trim();
    (!name.is_empty()).then(|| name.to_string())
}

fn timestamp_field(scope: &[&Object], keys: &[&str]) -> Option<DateTime<Utc>> {
    let parsed = lookup(scope, keys, parse_timestamp);
    if parsed.is_none() {
        if let Some(raw) = lookup(scope, keys, |v| (!v.is_null()).then_some(v)) {
            debug!("Unreadable timestamp {:?} in {:?}", raw, keys);
        }
    }
    parsed
}

/// RFC 3339, `YYYY-MM-DD HH:MM:SS[.f]`, `YYYY-MM-DD`, or epoch seconds/millis.
pub fn parse_timestamp(v: &Value) -> Option<DateTime<Utc>> {
    match v {
        Value::Number(n) => from_epoch(n.as_f64()?),
        Value::String(s) => {
            let s = s.trim();
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Some(dt.with_timezone(&Utc));
            }
            for fmt in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
                if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
                    return Some(naive.and_utc());
                }
            }
            if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
                return date.and_hms_opt(0, 0, 0).map(|d| d.and_utc());
            }
            s.parse::<f64>().ok().and_then(from_epoch)
        }
        _ => None,
    }
}

fn from_epoch(n: f64) -> Option<DateTime<Utc>> {
    if !n.is_finite() || n < 0.0 {
        return None;
    }
    if n > 1e11 {
        DateTime::from_timestamp_millis(n as i64)
    } else {
        DateTime::from_timestamp(n as i64, 0)
    }
}

// ── Nodes ──

fn parse_nodes(graph: &Object) -> Result<Vec<Node>, NormalizeError> {
    let items = graph
        .get("nodes")
        .and_then(Value::as_array)
        .ok_or(NormalizeError::MissingNodes)?;

    let mut seen = HashSet::with_capacity(items.len());
    let mut nodes = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        let node = parse_node(i, item)?;
        if !seen.insert(node.id.clone()) {
            return Err(NormalizeError::DuplicateNodeId(node.id));
        }
        nodes.push(node);
    }
    Ok(nodes)
}

fn parse_node(index: usize, item: &Value) -> Result<Node, NormalizeError> {
    let obj = item.as_object().ok_or(NormalizeError::NodeNotAnObject(index))?;

    let id = obj
        .get("id")
        .and_then(scalar_string)
        .ok_or(NormalizeError::NodeMissingId(index))?;

    let name = text_field(obj, &["name"]).unwrap_or_else(|| id.clone());
    let node_type = text_field(obj, &["type", "nodeType"]).unwrap_or_else(|| "unknown".into());

    let type_version = ["typeVersion", "type_version", "version"]
        .iter()
        .find_map(|k| obj.get(*k).and_then(number))
        .unwrap_or(1.0);

    let position = match obj.get("position") {
        None | Some(Value::Null) => Position::default(),
        Some(p) => parse_position(p).ok_or_else(|| NormalizeError::BadPosition { node: id.clone() })?,
    };

    let flags = NodeFlags {
        disabled: flag(obj, "disabled"),
        execute_once: flag(obj, "executeOnce"),
        always_output_data: flag(obj, "alwaysOutputData"),
        retry_on_fail: flag(obj, "retryOnFail"),
        custom: flag(obj, "isCustom"),
    };

    Ok(Node {
        id,
        name,
        display_name: text_field(obj, &["displayName", "display_name"]),
        notes: text_field(obj, &["notes", "description"]),
        node_type,
        type_version,
        parameters: object_or_empty(obj.get("parameters")),
        position,
        flags,
        credentials: object_or_empty(obj.get("credentials")),
    })
}

fn parse_position(v: &Value) -> Option<Position> {
    match v {
        Value::Array(xy) if xy.len() >= 2 => Some(Position {
            x: number(&xy[0])?,
            y: number(&xy[1])?,
        }),
        Value::Object(o) => Some(Position {
            x: number(o.get("x")?)?,
            y: number(o.get("y")?)?,
        }),
        _ => None,
    }
}

fn flag(obj: &Object, key: &str) -> bool {
    match obj.get(key) {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
        Some(Value::Number(n)) => n.as_f64().is_some_and(|n| n != 0.0),
        _ => false,
    }
}

fn object_or_empty(v: Option<&Value>) -> Object {
    v.and_then(Value::as_object).cloned().unwrap_or_default()
}

fn number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Non-empty string, or a number rendered as one.
fn scalar_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

// ── Connections ──

/// Resolves connection endpoints that may name a node by id or by name.
struct NodeRefs<'a> {
    ids: HashSet<&'a str>,
    by_name: HashMap<&'a str, &'a str>,
}

impl<'a> NodeRefs<'a> {
    fn new(nodes: &'a [Node]) -> Self {
        NodeRefs {
            ids: nodes.iter().map(|n| n.id.as_str()).collect(),
            by_name: nodes.iter().map(|n| (n.name.as_str(), n.id.as_str())).collect(),
        }
    }

    /// Unknown references come back verbatim so validation can report them.
    fn resolve(&self, reference: &str) -> String {
        if self.ids.contains(reference) {
            reference.to_string()
        } else if let Some(id) = self.by_name.get(reference) {
            id.to_string()
        } else {
            reference.to_string()
        }
    }
}

fn parse_connections(raw: Option<&Value>, refs: &NodeRefs) -> Result<Vec<Connection>, NormalizeError> {
    match raw {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Object(by_source)) => {
            let mut out = Vec::new();
            for (i, (source_ref, outputs)) in by_source.iter().enumerate() {
                if source_ref.trim().is_empty() {
                    return Err(NormalizeError::ConnectionMissingSource(i));
                }
                let source = refs.resolve(source_ref);
                match outputs {
                    // n8n export: { kind: [[target, ...] per output port] }
                    Value::Object(by_kind) => {
                        for (kind, ports) in by_kind {
                            let ports = ports.as_array().ok_or_else(|| {
                                NormalizeError::BadConnections(format!(
                                    "{:?}.{} is not a list of ports",
                                    source_ref, kind
                                ))
                            })?;
                            for (port, targets) in ports.iter().enumerate() {
                                let targets = match targets {
                                    Value::Null => continue,
                                    Value::Array(t) => t,
                                    _ => {
                                        return Err(NormalizeError::BadConnections(format!(
                                            "{:?}.{}[{}] is not a list",
                                            source_ref, kind, port
                                        )))
                                    }
                                };
                                for entry in targets {
                                    out.push(target_entry(entry, &source, Some(kind.as_str()), port as u32, refs)?);
                                }
                            }
                        }
                    }
                    // Flat: [target, ...]
                    Value::Array(targets) => {
                        for entry in targets {
                            let port = entry
                                .get("sourceIndex")
                                .or_else(|| entry.get("outputIndex"))
                                .and_then(index)
                                .unwrap_or(0);
                            out.push(target_entry(entry, &source, None, port, refs)?);
                        }
                    }
                    other => {
                        return Err(NormalizeError::BadConnections(format!(
                            "{:?} maps to {}",
                            source_ref,
                            type_name(other)
                        )))
                    }
                }
            }
            Ok(out)
        }
        Some(Value::Array(edges)) => edges
            .iter()
            .enumerate()
            .map(|(i, edge)| {
                let source = endpoint(edge, &["source", "from"])
                    .ok_or(NormalizeError::ConnectionMissingSource(i))?;
                let port = edge.get("sourceIndex").and_then(index).unwrap_or(0);
                target_entry(edge, &refs.resolve(&source), None, port, refs)
            })
            .collect(),
        Some(other) => Err(NormalizeError::BadConnections(format!(
            "connections is {}",
            type_name(other)
        ))),
    }
}

fn target_entry(
    entry: &Value,
    source: &str,
    kind: Option<&str>,
    port: u32,
    refs: &NodeRefs,
) -> Result<Connection, NormalizeError> {
    let missing = || NormalizeError::ConnectionMissingTarget {
        source_node: source.to_string(),
        output: port,
    };
    if !entry.is_object() {
        return Err(missing());
    }
    let target = endpoint(entry, &["node", "target", "to"]).ok_or_else(missing)?;

    let kind = entry
        .get("type")
        .and_then(Value::as_str)
        .or(kind)
        .unwrap_or("main")
        .to_string();

    let target_index = entry
        .get("index")
        .or_else(|| entry.get("targetIndex"))
        .and_then(index)
        .unwrap_or(0);

    let metadata: Object = METADATA_KEYS
        .iter()
        .filter_map(|k| {
            entry
                .get(*k)
                .filter(|v| !v.is_null() && v.as_str() != Some(""))
                .map(|v| (k.to_string(), v.clone()))
        })
        .collect();

    Ok(Connection {
        source: source.to_string(),
        target: refs.resolve(&target),
        kind,
        source_index: port,
        target_index,
        metadata: (!metadata.is_empty()).then_some(metadata),
    })
}

fn endpoint(entry: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| entry.get(*k).and_then(scalar_string))
}

fn index(v: &Value) -> Option<u32> {
    number(v).filter(|n| *n >= 0.0).map(|n| n as u32)
}

fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

// ── Tests ──
