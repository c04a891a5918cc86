use std::fmt;

use thiserror::Error;

use crate::parser::extract::Strategy;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid url for {0:?}")]
    InvalidUrl(String),
    #[error("timed out fetching {url}")]
    Timeout { url: String },
    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

impl FetchError {
    pub fn from_reqwest(url: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout { url: url.to_string() }
        } else if let Some(status) = err.status() {
            FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            }
        } else {
            FetchError::Transport {
                url: url.to_string(),
                source: err,
            }
        }
    }
}

/// Payload is missing required structure.
#[derive(Debug, Error, PartialEq)]
pub enum NormalizeError {
    #[error("payload is not a JSON object")]
    NotAnObject,
    #[error("payload has no node list")]
    MissingNodes,
    #[error("node #{0} is not an object")]
    NodeNotAnObject(usize),
    #[error("node #{0} has no id")]
    NodeMissingId(usize),
    #[error("duplicate node id {0:?}")]
    DuplicateNodeId(String),
    #[error("node {node:?} has an unreadable position")]
    BadPosition { node: String },
    #[error("connections have an unsupported shape: {0}")]
    BadConnections(String),
    #[error("connection #{0} has no source node")]
    ConnectionMissingSource(usize),
    #[error("connection from {source_node:?} (output {output}) has no target node")]
    ConnectionMissingTarget { source_node: String, output: u32 },
}

/// One failed extraction attempt, kept for the unextractable report.
#[derive(Debug, Clone)]
pub struct Attempt {
    pub strategy: Strategy,
    pub reason: String,
}

impl fmt::Display for Attempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.strategy, self.reason)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    SourceUnavailable,
    Unextractable,
    Malformed,
}

#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("source unavailable for workflow {id}: {source}")]
    SourceUnavailable {
        id: String,
        #[source]
        source: FetchError,
    },
    #[error("workflow {id} is unextractable ({})", join_attempts(.attempts))]
    Unextractable { id: String, attempts: Vec<Attempt> },
    #[error("malformed payload for workflow {id}: {source}")]
    Malformed {
        id: String,
        #[source]
        source: NormalizeError,
    },
}

impl ScrapeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ScrapeError::SourceUnavailable { .. } => ErrorKind::SourceUnavailable,
            ScrapeError::Unextractable { .. } => ErrorKind::Unextractable,
            ScrapeError::Malformed { .. } => ErrorKind::Malformed,
        }
    }
}

fn join_attempts(attempts: &[Attempt]) -> String {
    attempts
        .iter()
        .map(|a| a.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}
