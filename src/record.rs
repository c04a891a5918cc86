use std::collections::{BTreeMap, BTreeSet, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Workflow-level metadata of a canonical record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowMeta {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub settings: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NodeFlags {
    pub disabled: bool,
    pub execute_once: bool,
    pub always_output_data: bool,
    pub retry_on_fail: bool,
    pub custom: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: String,
    pub name: String,
    /// Label the gallery shows for the node type, e.g. `Slack`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Author notes or node description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(rename = "type")]
    pub node_type: String,
    pub type_version: f64,
    #[serde(default)]
    pub parameters: Map<String, Value>,
    #[serde(default)]
    pub position: Position,
    #[serde(default)]
    pub flags: NodeFlags,
    #[serde(default)]
    pub credentials: Map<String, Value>,
}

const BUILTIN_PREFIXES: &[&str] = &["n8n-nodes-base.", "@n8n/"];

impl Node {
    /// Community or self-hosted node types, or nodes explicitly flagged custom.
    pub fn is_custom(&self) -> bool {
        self.flags.custom
            || (self.node_type != "unknown"
                && !BUILTIN_PREFIXES.iter().any(|p| self.node_type.starts_with(p)))
    }

    pub fn is_trigger(&self) -> bool {
        let t = self.node_type.to_lowercase();
        t.ends_with("trigger") || t.ends_with(".webhook")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    pub source: String,
    pub target: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub source_index: u32,
    pub target_index: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowStats {
    pub node_count: usize,
    pub connection_count: usize,
    pub has_custom_nodes: bool,
    pub disabled_node_count: usize,
    pub trigger_count: usize,
    pub node_types: BTreeMap<String, usize>,
}

impl WorkflowStats {
    fn tally(nodes: &[Node], connections: &[Connection]) -> Self {
        let mut node_types = BTreeMap::new();
        for node in nodes {
            *node_types.entry(node.node_type.clone()).or_insert(0) += 1;
        }
        WorkflowStats {
            node_count: nodes.len(),
            connection_count: connections.len(),
            has_custom_nodes: nodes.iter().any(Node::is_custom),
            disabled_node_count: nodes.iter().filter(|n| n.flags.disabled).count(),
            trigger_count: nodes.iter().filter(|n| n.is_trigger()).count(),
            node_types,
        }
    }
}

/// Canonical workflow record. Built once through [`WorkflowRecord::new`] and
/// read-only afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowRecord {
    #[serde(flatten)]
    meta: WorkflowMeta,
    nodes: Vec<Node>,
    connections: Vec<Connection>,
    stats: WorkflowStats,
}

impl WorkflowRecord {
    pub fn new(meta: WorkflowMeta, nodes: Vec<Node>, connections: Vec<Connection>) -> Self {
        let stats = WorkflowStats::tally(&nodes, &connections);
        WorkflowRecord {
            meta,
            nodes,
            connections,
            stats,
        }
    }

    pub fn meta(&self) -> &WorkflowMeta {
        &self.meta
    }

    pub fn id(&self) -> &str {
        &self.meta.id
    }

    pub fn name(&self) -> &str {
        &self.meta.name
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    pub fn stats(&self) -> &WorkflowStats {
        &self.stats
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Structural checks shared by scraped and synthetic records.
    /// An empty result means the record is valid.
    pub fn validate(&self) -> Vec<Violation> {
        let mut violations = Vec::new();
        let mut ids = HashSet::with_capacity(self.nodes.len());

        for node in &self.nodes {
            if !ids.insert(node.id.as_str()) {
                violations.push(Violation::DuplicateNodeId { node: node.id.clone() });
            }
        }

        for (index, c) in self.connections.iter().enumerate() {
            if !ids.contains(c.source.as_str()) {
                violations.push(Violation::DanglingSource {
                    index,
                    node: c.source.clone(),
                });
            }
            if !ids.contains(c.target.as_str()) {
                violations.push(Violation::DanglingTarget {
                    index,
                    node: c.target.clone(),
                });
            }
        }

        if self.stats != WorkflowStats::tally(&self.nodes, &self.connections) {
            violations.push(Violation::StatsMismatch);
        }

        violations
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Violation {
    #[error("duplicate node id {node:?}")]
    DuplicateNodeId { node: String },
    #[error("connection #{index} references unknown source node {node:?}")]
    DanglingSource { index: usize, node: String },
    #[error("connection #{index} references unknown target node {node:?}")]
    DanglingTarget { index: usize, node: String },
    #[error("stats do not match node/connection lists")]
    StatsMismatch,
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str, node_type: &str) -> Node {
        Node {
            id: id.to_string(),
            name: id.to_string(),
            display_name: None,
            notes: None,
            node_type: node_type.to_string(),
            type_version: 1.0,
            parameters: Map::new(),
            position: Position::default(),
            flags: NodeFlags::default(),
            credentials: Map::new(),
        }
    }

    fn edge(source: &str, target: &str) -> Connection {
        Connection {
            source: source.to_string(),
            target: target.to_string(),
            kind: "main".to_string(),
            source_index: 0,
            target_index: 0,
            metadata: None,
        }
    }

    fn meta(id: &str) -> WorkflowMeta {
        WorkflowMeta {
            id: id.to_string(),
            name: format!("Workflow {}", id),
            description: String::new(),
            category: None,
            tags: BTreeSet::new(),
            version: None,
            created_at: None,
            updated_at: None,
            settings: Map::new(),
        }
    }

    #[test]
    fn stats_follow_lists() {
        let nodes = vec![
            node("a", "n8n-nodes-base.webhook"),
            node("b", "n8n-nodes-base.set"),
            node("c", "n8n-nodes-base.set"),
        ];
        let record = WorkflowRecord::new(meta("1"), nodes, vec![edge("a", "b"), edge("b", "c")]);
        let s = record.stats();
        assert_eq!(s.node_count, 3);
        assert_eq!(s.connection_count, 2);
        assert_eq!(s.trigger_count, 1);
        assert_eq!(s.node_types.get("n8n-nodes-base.set"), Some(&2));
        assert!(!s.has_custom_nodes);
        assert!(record.is_valid());
    }

    #[test]
    fn community_node_is_custom() {
        let record = WorkflowRecord::new(
            meta("2"),
            vec![node("a", "n8n-nodes-acme.thing")],
            Vec::new(),
        );
        assert!(record.stats().has_custom_nodes);
    }

    #[test]
    fn dangling_endpoints_reported() {
        let record = WorkflowRecord::new(
            meta("3"),
            vec![node("a", "n8n-nodes-base.set")],
            vec![edge("a", "ghost"), edge("phantom", "a")],
        );
        let v = record.validate();
        assert_eq!(v.len(), 2);
        assert!(v.contains(&Violation::DanglingTarget { index: 0, node: "ghost".into() }));
        assert!(v.contains(&Violation::DanglingSource { index: 1, node: "phantom".into() }));
    }

    #[test]
    fn duplicate_ids_reported() {
        let record = WorkflowRecord::new(
            meta("4"),
            vec![node("a", "n8n-nodes-base.set"), node("a", "n8n-nodes-base.set")],
            Vec::new(),
        );
        assert_eq!(record.validate(), vec![Violation::DuplicateNodeId { node: "a".into() }]);
    }

    #[test]
    fn tampered_stats_detected() {
        let record = WorkflowRecord::new(meta("5"), vec![node("a", "n8n-nodes-base.set")], Vec::new());
        let mut json = serde_json::to_value(&record).unwrap();
        json["stats"]["nodeCount"] = 7.into();
        let tampered: WorkflowRecord = serde_json::from_value(json).unwrap();
        assert_eq!(tampered.validate(), vec![Violation::StatsMismatch]);
    }

    #[test]
    fn serializes_camel_case() {
        let record = WorkflowRecord::new(meta("6"), vec![node("a", "n8n-nodes-base.set")], Vec::new());
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["id"], "6");
        assert_eq!(json["stats"]["nodeCount"], 1);
        assert_eq!(json["nodes"][0]["type"], "n8n-nodes-base.set");
        assert_eq!(json["nodes"][0]["typeVersion"], 1.0);
        assert!(json["nodes"][0].get("displayName").is_none());
    }

    #[test]
    fn node_labels_serialized_when_present() {
        let mut n = node("a", "n8n-nodes-base.slack");
        n.display_name = Some("Slack".into());
        n.notes = Some("Posts to #leads".into());
        let record = WorkflowRecord::new(meta("7"), vec![n], Vec::new());
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["nodes"][0]["displayName"], "Slack");
        assert_eq!(json["nodes"][0]["notes"], "Posts to #leads");
    }
}
