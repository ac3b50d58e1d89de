//! Time-indexed node series and bracket search
//!
//! A `NodeSeries` is the ordered sample sequence of one run. Lookups are
//! seeded with the caller's last known index so that the common case
//! (replay time moving forward a few milliseconds per tick) is O(1), while
//! scrubbing backwards falls back to a binary search over the whole series.

use crate::model::Node;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum SeriesError {
    #[error("node {index} at {timestamp} ms is earlier than the previous node at {previous} ms")]
    OutOfOrder {
        index: usize,
        timestamp: f64,
        previous: f64,
    },

    #[error("node {index} has a non-finite timestamp")]
    InvalidTimestamp { index: usize },
}

/// Result of locating a replay time within the series
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    /// Series has no nodes
    Empty,
    /// Time is earlier than the first node
    BeforeStart,
    /// `nodes[prev].timestamp <= t < nodes[next].timestamp`, `next == prev + 1`
    Within { prev: usize, next: usize },
    /// Time is at or past the last node
    Finished,
}

/// Ordered, immutable-by-default sequence of nodes
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeSeries {
    nodes: Vec<Node>,
}

impl NodeSeries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a series, verifying timestamps never go backwards.
    pub fn from_nodes(nodes: Vec<Node>) -> Result<Self, SeriesError> {
        let mut series = Self {
            nodes: Vec::with_capacity(nodes.len()),
        };
        series.extend(nodes)?;
        Ok(series)
    }

    /// Append a node. Equal timestamps are accepted.
    pub fn push(&mut self, node: Node) -> Result<(), SeriesError> {
        let index = self.nodes.len();
        if !node.timestamp.is_finite() {
            return Err(SeriesError::InvalidTimestamp { index });
        }
        if let Some(last) = self.nodes.last() {
            if node.timestamp < last.timestamp {
                return Err(SeriesError::OutOfOrder {
                    index,
                    timestamp: node.timestamp,
                    previous: last.timestamp,
                });
            }
        }
        self.nodes.push(node);
        Ok(())
    }

    /// Append several nodes. A rejected node leaves the series unchanged.
    pub fn extend<I: IntoIterator<Item = Node>>(&mut self, nodes: I) -> Result<(), SeriesError> {
        let len = self.nodes.len();
        for node in nodes {
            if let Err(e) = self.push(node) {
                self.nodes.truncate(len);
                return Err(e);
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Node> {
        self.nodes.get(index)
    }

    pub fn first(&self) -> Option<&Node> {
        self.nodes.first()
    }

    pub fn last(&self) -> Option<&Node> {
        self.nodes.last()
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Duration covered by the series, in milliseconds
    pub fn duration(&self) -> f64 {
        match (self.nodes.first(), self.nodes.last()) {
            (Some(first), Some(last)) => last.timestamp - first.timestamp,
            _ => 0.0,
        }
    }

    /// Index of the first node with `timestamp >= t` (may be `len()`)
    pub fn lower_bound(&self, t: f64) -> usize {
        self.nodes.partition_point(|n| n.timestamp < t)
    }

    /// Index of the first node with `timestamp > t` (may be `len()`)
    pub fn upper_bound(&self, t: f64) -> usize {
        self.nodes.partition_point(|n| n.timestamp <= t)
    }

    /// Locate the bracket for `t`, searching forward from `hint` when possible.
    pub fn lookup(&self, t: f64, hint: usize) -> Lookup {
        let (first, last) = match (self.nodes.first(), self.nodes.last()) {
            (Some(first), Some(last)) => (first, last),
            _ => return Lookup::Empty,
        };

        if t.is_nan() || t < first.timestamp {
            return Lookup::BeforeStart;
        }
        if t >= last.timestamp {
            return Lookup::Finished;
        }

        let next = match self.nodes.get(hint) {
            Some(seed) if seed.timestamp <= t => {
                // Common case: the node after the hint already brackets t
                match self.nodes.get(hint + 1) {
                    Some(n) if n.timestamp > t => hint + 1,
                    _ => hint + 1 + self.nodes[hint + 1..].partition_point(|n| n.timestamp <= t),
                }
            }
            _ => self.upper_bound(t),
        };

        // first.timestamp <= t < last.timestamp guarantees 1 <= next < len
        Lookup::Within {
            prev: next - 1,
            next,
        }
    }
}
