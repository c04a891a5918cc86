use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde_json::{json, Map, Value};

use crate::record::{Connection, Node, NodeFlags, Position, WorkflowMeta, WorkflowRecord};

const TRIGGER_TYPES: &[&str] = &[
    "n8n-nodes-base.webhook",
    "n8n-nodes-base.scheduleTrigger",
    "n8n-nodes-base.manualTrigger",
];

const NODE_TYPES: &[&str] = &[
    "n8n-nodes-base.function",
    "n8n-nodes-base.if",
    "n8n-nodes-base.switch",
    "n8n-nodes-base.set",
    "n8n-nodes-base.emailSend",
    "n8n-nodes-base.slack",
    "n8n-nodes-base.httpRequest",
    "n8n-nodes-base.postgres",
    "n8n-nodes-base.mySql",
    "n8n-nodes-base.mongoDb",
    "n8n-nodes-base.redis",
    "n8n-nodes-base.awsS3",
];

const CATEGORIES: &[&str] = &["Sales", "Marketing", "Engineering", "IT Ops", "Finance"];

/// 2023-01-01T00:00:00Z
const EPOCH_BASE: i64 = 1_672_531_200;

#[derive(Debug, Clone, PartialEq)]
pub struct SynthOptions {
    pub seed: u64,
    /// `None` picks 3..=6 from the seed.
    pub node_count: Option<usize>,
    /// Probability of each extra forward edge beyond the main chain.
    pub density: f64,
}

impl Default for SynthOptions {
    fn default() -> Self {
        SynthOptions {
            seed: 0,
            node_count: None,
            density: 0.2,
        }
    }
}

/// Build a reproducible workflow record. Same options, same record.
pub fn generate(opts: &SynthOptions) -> WorkflowRecord {
    let mut rng = StdRng::seed_from_u64(opts.seed);
    let density = if opts.density.is_finite() {
        opts.density.clamp(0.0, 1.0)
    } else {
        0.0
    };
    let count = opts.node_count.unwrap_or_else(|| rng.gen_range(3..=6));

    let nodes: Vec<Node> = (0..count).map(|i| synth_node(&mut rng, opts.seed, i)).collect();

    let mut connections = Vec::new();
    for i in 1..count {
        connections.push(edge(&nodes[i - 1], &nodes[i], 0));
    }
    // Extra edges only point forward, so the graph stays acyclic.
    for from in 0..count {
        for to in from + 2..count {
            if rng.gen_bool(density) {
                let port = if is_branching(&nodes[from]) { 1 } else { 0 };
                connections.push(edge(&nodes[from], &nodes[to], port));
            }
        }
    }

    let created = DateTime::from_timestamp(EPOCH_BASE, 0).unwrap_or_default()
        + Duration::minutes(rng.gen_range(0..525_600));
    let updated = created + Duration::minutes(rng.gen_range(0..43_200));

    let tags: BTreeSet<String> = nodes
        .iter()
        .filter_map(|n| n.node_type.rsplit('.').next())
        .take(3)
        .map(str::to_string)
        .collect();

    let mut settings = Map::new();
    settings.insert("saveManualExecutions".into(), Value::Bool(true));
    settings.insert("callerPolicy".into(), json!("any"));

    let meta = WorkflowMeta {
        id: format!("synthetic-{}", opts.seed),
        name: format!("Synthetic workflow {}", opts.seed),
        description: format!("Generated workflow with {} nodes", count),
        category: CATEGORIES.choose(&mut rng).map(|c| c.to_string()),
        tags,
        version: Some("1.0".into()),
        created_at: Some(created),
        updated_at: Some(updated),
        settings,
    };

    WorkflowRecord::new(meta, nodes, connections)
}

fn synth_node(rng: &mut StdRng, seed: u64, i: usize) -> Node {
    let pool = if i == 0 { TRIGGER_TYPES } else { NODE_TYPES };
    let node_type = pool.choose(rng).copied().unwrap_or("n8n-nodes-base.noOp");
    let short = node_type.rsplit('.').next().unwrap_or(node_type);

    let mut parameters = Map::new();
    parameters.insert("param1".into(), json!(format!("value{}", i)));
    parameters.insert("param2".into(), json!(seed));

    Node {
        id: format!("node_{}", i),
        name: format!("{} {}", short, i + 1),
        display_name: Some(short.to_string()),
        notes: None,
        node_type: node_type.to_string(),
        type_version: 1.0,
        parameters,
        position: Position {
            x: i as f64 * 200.0,
            y: 300.0 + rng.gen_range(-2..=2) as f64 * 100.0,
        },
        flags: NodeFlags::default(),
        credentials: Map::new(),
    }
}

fn is_branching(node: &Node) -> bool {
    node.node_type.ends_with(".if") || node.node_type.ends_with(".switch")
}

fn edge(from: &Node, to: &Node, port: u32) -> Connection {
    let metadata = from.node_type.ends_with(".if").then(|| {
        let mut m = Map::new();
        let label = if port == 0 { "true" } else { "false" };
        m.insert("label".into(), json!(label));
        m
    });
    Connection {
        source: from.id.clone(),
        target: to.id.clone(),
        kind: "main".into(),
        source_index: port,
        target_index: 0,
        metadata,
    }
}

// ── Tests ──
